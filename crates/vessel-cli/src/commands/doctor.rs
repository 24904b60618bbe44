use super::{missing_for_plan, EXIT_FAILURE, EXIT_SUCCESS};
use std::path::{Path, PathBuf};
use vessel_core::{default_config_path, load_plan, Settings};
use vessel_runtime::format_missing;
use vessel_schema::ReleaseDoc;
use vessel_store::{AtomicInstaller, DirectFs, PrefixLock, ReleaseLayout};

pub struct DoctorArgs<'a> {
    pub pkgs: Option<&'a Path>,
    pub repo: Option<&'a Path>,
    pub prefix: Option<&'a Path>,
    pub release: Option<&'a str>,
    pub config: Option<&'a Path>,
}

pub fn run(args: &DoctorArgs<'_>, settings: &Settings, json_output: bool) -> Result<u8, String> {
    let mut checks: Vec<Check> = Vec::new();
    let mut all_pass = true;

    check_config(args.config, &mut checks);
    match (args.pkgs, args.repo) {
        (Some(pkgs), Some(repo)) => check_release(pkgs, repo, settings, &mut checks, &mut all_pass),
        _ => checks.push(Check::info(
            "release_prereqs",
            "No manifest given; tool checks skipped",
        )),
    }

    if let Some(prefix) = args.prefix {
        if prefix.is_dir() {
            checks.push(Check::pass("prefix_exists", "Prefix directory exists"));
            if let Some(release) = args.release {
                check_slot(prefix, release, &mut checks, &mut all_pass);
            }
            check_disk_space(prefix, &mut checks);
        } else {
            checks.push(Check::info(
                "prefix_exists",
                "Prefix does not exist (will be created on first install)",
            ));
        }
    }

    print_results(&checks, all_pass, json_output)
}

fn check_config(explicit: Option<&Path>, checks: &mut Vec<Check>) {
    let path: Option<PathBuf> = explicit
        .map(Path::to_path_buf)
        .or_else(|| default_config_path().filter(|p| p.is_file()));
    match path {
        Some(p) => checks.push(Check::info(
            "config",
            &format!("Settings loaded from {}", p.display()),
        )),
        None => checks.push(Check::info("config", "Using built-in settings")),
    }
}

fn check_release(
    pkgs: &Path,
    repo: &Path,
    settings: &Settings,
    checks: &mut Vec<Check>,
    all_pass: &mut bool,
) {
    let plan = match load_plan(pkgs, repo) {
        Ok((_, plan)) => {
            checks.push(Check::pass(
                "release_resolves",
                &format!("Release resolves to {} packages", plan.len()),
            ));
            plan
        }
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail("release_resolves", &e.to_string()));
            return;
        }
    };

    let missing = missing_for_plan(&plan, &settings.tools, settings.sudo);
    if missing.is_empty() {
        checks.push(Check::pass(
            "release_prereqs",
            "Build prerequisites satisfied",
        ));
    } else {
        *all_pass = false;
        checks.push(Check::fail("release_prereqs", &format_missing(&missing)));
    }
}

fn check_slot(prefix: &Path, release: &str, checks: &mut Vec<Check>, all_pass: &mut bool) {
    let layout = match ReleaseLayout::new(prefix, release) {
        Ok(l) => l,
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail("release_slot", &e.to_string()));
            return;
        }
    };
    let fs_ops = DirectFs::new();
    let installer = AtomicInstaller::new(layout.clone(), &fs_ops);

    match installer.observe() {
        Ok(status) => {
            if status.live {
                let described = layout.live().join(release);
                match ReleaseDoc::read_from_file(&described) {
                    Ok(doc) => checks.push(Check::pass(
                        "release_slot",
                        &format!(
                            "{} is installed ({} packages)",
                            layout.live().display(),
                            doc.packages.len()
                        ),
                    )),
                    Err(e) => checks.push(Check::warn(
                        "release_slot",
                        &format!(
                            "{} is installed without a readable descriptor: {e}",
                            layout.live().display()
                        ),
                    )),
                }
            } else {
                checks.push(Check::info(
                    "release_slot",
                    &format!("{release} is not installed"),
                ));
            }
            if let Some(state) = status.pending {
                checks.push(Check::warn(
                    "install_journal",
                    &format!("Interrupted install ({state}); run `vessel recover`"),
                ));
            } else if status.hidden || status.retired {
                checks.push(Check::warn(
                    "install_journal",
                    "Leftover trees from an earlier install; run `vessel recover`",
                ));
            } else {
                checks.push(Check::pass("install_journal", "No install in progress"));
            }
        }
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail(
                "release_slot",
                &format!("Cannot inspect release slot: {e}"),
            ));
        }
    }

    match PrefixLock::is_held(&layout.lock_file()) {
        Ok(false) => checks.push(Check::pass("release_lock", "Release lock is free")),
        Ok(true) => checks.push(Check::warn(
            "release_lock",
            "Release lock is held by another process",
        )),
        Err(e) => checks.push(Check::warn(
            "release_lock",
            &format!("Cannot check release lock: {e}"),
        )),
    }
}

fn print_results(checks: &[Check], all_pass: bool, json_output: bool) -> Result<u8, String> {
    if json_output {
        let json = serde_json::json!({
            "healthy": all_pass,
            "checks": checks.iter().map(|c| serde_json::json!({
                "name": c.name,
                "status": c.status,
                "message": c.message,
            })).collect::<Vec<_>>(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).map_err(|e| e.to_string())?
        );
    } else {
        println!("Vessel Doctor\n");
        for check in checks {
            let icon = match check.status {
                "pass" => "✓",
                "fail" => "✗",
                "warn" => "⚠",
                _ => "ℹ",
            };
            println!("  {icon} {}", check.message);
        }
        println!();
        if all_pass {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }
    Ok(if all_pass { EXIT_SUCCESS } else { EXIT_FAILURE })
}

struct Check {
    name: &'static str,
    status: &'static str,
    message: String,
}

impl Check {
    fn new(name: &'static str, status: &'static str, message: &str) -> Self {
        Self {
            name,
            status,
            message: message.to_owned(),
        }
    }

    fn pass(name: &'static str, message: &str) -> Self {
        Self::new(name, "pass", message)
    }

    fn fail(name: &'static str, message: &str) -> Self {
        Self::new(name, "fail", message)
    }

    fn warn(name: &'static str, message: &str) -> Self {
        Self::new(name, "warn", message)
    }

    fn info(name: &'static str, message: &str) -> Self {
        Self::new(name, "info", message)
    }
}

fn check_disk_space(prefix: &Path, checks: &mut Vec<Check>) {
    let Ok(c_path) = std::ffi::CString::new(prefix.to_string_lossy().as_bytes()) else {
        return;
    };

    // SAFETY: zeroed statvfs is a valid initial state for the struct.
    #[allow(unsafe_code, clippy::undocumented_unsafe_blocks)]
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    // SAFETY: the path is NUL-terminated and the output struct is only read
    // after the call reports success.
    #[allow(unsafe_code, clippy::undocumented_unsafe_blocks)]
    let ret = unsafe { libc::statvfs(c_path.as_ptr(), &raw mut stat) };
    if ret != 0 {
        return;
    }

    #[allow(clippy::unnecessary_cast)]
    let avail_mb = (stat.f_bavail as u64 * stat.f_frsize as u64) / (1024 * 1024);

    if avail_mb < 512 {
        checks.push(Check::fail(
            "disk_space",
            &format!("Low disk space on prefix: {avail_mb} MB available"),
        ));
    } else if avail_mb < 4096 {
        checks.push(Check::warn(
            "disk_space",
            &format!("Prefix has {avail_mb} MB available; a release needs two copies"),
        ));
    } else {
        checks.push(Check::pass(
            "disk_space",
            &format!("Disk space: {} GB available", avail_mb / 1024),
        ));
    }
}
