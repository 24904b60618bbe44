use super::{
    colorize_stage, json_pretty, missing_for_plan, spin_fail, spin_ok, spinner, EXIT_FIXUP_ERROR,
    EXIT_SUCCESS,
};
use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use vessel_core::{
    load_plan, run_release, FixupPolicy, PhaseSelection, ReleaseOptions, ReleaseReport, Settings,
    Stage,
};
use vessel_runtime::{format_missing, ProcessRunner, SystemRunner};

#[derive(Debug, Args)]
pub struct ReleaseArgs {
    /// Release manifest mapping package names to pinned versions.
    pub pkgs: PathBuf,
    /// Package catalogue describing how each version is fetched and built.
    pub repo: PathBuf,
    /// Shared installation prefix.
    #[arg(short, long)]
    pub prefix: PathBuf,
    /// Release name; installed as `<prefix>/<release>`.
    #[arg(short, long)]
    pub release: String,
    /// Directory for per-package build directories [default: <workspace>/tmp].
    #[arg(short, long)]
    pub tmp: Option<PathBuf>,
    /// Download cache [default: <workspace>/cache].
    #[arg(short, long)]
    pub cache: Option<PathBuf>,
    /// Parallel fetches and builds, also passed to make.
    #[arg(short, long)]
    pub jobs: Option<usize>,
    /// Fetch sources; stop afterwards unless --build is also given.
    #[arg(short, long, default_value_t = false)]
    pub download: bool,
    /// Build the release; stop afterwards unless --install is also given.
    #[arg(short, long, default_value_t = false)]
    pub build: bool,
    /// Install a previously built release.
    #[arg(short, long, default_value_t = false)]
    pub install: bool,
    /// Stage and describe the release without touching the prefix.
    #[arg(short = 'n', long, default_value_t = false)]
    pub dry_run: bool,
    #[arg(long)]
    pub cmake: Option<String>,
    #[arg(long)]
    pub pip: Option<String>,
    #[arg(long)]
    pub git: Option<String>,
    /// Python version for PYTHONPATH when the manifest has no `python` entry.
    #[arg(long)]
    pub pyver: Option<String>,
    /// Modify the prefix through sudo.
    #[arg(long, default_value_t = false)]
    pub sudo: bool,
    /// Local staging directory [default: current directory].
    #[arg(long)]
    pub workspace: Option<PathBuf>,
    /// Program run as `<postinst> <prefix>/<release>` after installation.
    #[arg(short = 'P', long)]
    pub postinst: Option<PathBuf>,
    /// Executable under `root/bin` to wrap with a shim (repeatable).
    #[arg(long = "shim")]
    pub shims: Vec<String>,
    /// What to do when a post-install fixup fails.
    #[arg(long)]
    pub fixup_policy: Option<FixupPolicy>,
}

impl ReleaseArgs {
    /// Merge the flags over `settings`. Relative defaults hang off the
    /// workspace, which defaults to `cwd`.
    pub fn into_options(self, mut settings: Settings, cwd: &Path) -> ReleaseOptions {
        if let Some(jobs) = self.jobs {
            settings.jobs = jobs;
        }
        if let Some(pyver) = self.pyver {
            settings.pyver = pyver;
        }
        if let Some(cmake) = self.cmake {
            settings.tools.cmake = cmake;
        }
        if let Some(pip) = self.pip {
            settings.tools.pip = pip;
        }
        if let Some(git) = self.git {
            settings.tools.git = git;
        }
        if let Some(policy) = self.fixup_policy {
            settings.fixup_policy = policy;
        }
        settings.sudo |= self.sudo;
        settings.shims.extend(self.shims);

        let workspace = self
            .workspace
            .map_or_else(|| cwd.to_path_buf(), |w| cwd.join(w));
        ReleaseOptions {
            manifest: cwd.join(self.pkgs),
            catalogue: cwd.join(self.repo),
            prefix: cwd.join(self.prefix),
            release: self.release,
            cache: self.cache.map_or_else(|| workspace.join("cache"), |c| cwd.join(c)),
            build_root: self.tmp.map_or_else(|| workspace.join("tmp"), |t| cwd.join(t)),
            template_dir: cwd.to_path_buf(),
            workspace,
            phases: PhaseSelection {
                download: self.download,
                build: self.build,
                install: self.install,
                dry_run: self.dry_run,
            },
            settings,
            postinst: self.postinst,
        }
    }
}

fn preflight(opts: &ReleaseOptions) -> Result<(), String> {
    let (_, plan) = load_plan(&opts.manifest, &opts.catalogue).map_err(|e| e.to_string())?;
    let missing = missing_for_plan(&plan, &opts.settings.tools, opts.settings.sudo);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(format_missing(&missing))
    }
}

fn summary(report: &ReleaseReport) -> String {
    match report.stage {
        Stage::Resolved => format!("release {} resolved", report.release),
        Stage::Fetched => format!("release {} fetched", report.release),
        Stage::Built => format!("release {} built", report.release),
        Stage::Staged => format!("release {} staged (dry run)", report.release),
        Stage::Installed => format!(
            "release {} installed at {}",
            report.release,
            report.prefix.join(&report.release).display()
        ),
    }
}

fn print_human(report: &ReleaseReport) {
    let stage = serde_json::to_value(report.stage)
        .ok()
        .and_then(|v| v.as_str().map(str::to_owned))
        .unwrap_or_default();
    println!("stage: {}", colorize_stage(&stage));
    println!("packages: {} (python {})", report.packages, report.pyver);
    if let Some(fetch) = &report.fetch {
        println!(
            "fetched: {} new, {} cached, {} without source",
            fetch.fetched.len(),
            fetch.cached.len(),
            fetch.skipped.len()
        );
    }
    if let Some(build) = &report.build {
        println!("built: {} packages in {} waves", build.built.len(), build.waves);
    }
    if let Some(capture) = &report.capture {
        for missing in &capture.missing_templates {
            println!("⚠ no template {}", missing.display());
        }
    }
    if let Some(install) = &report.install {
        if let Some(leftover) = &install.leftover {
            println!("⚠ previous release left at {}", leftover.display());
        }
    }
    if let Some(fixup) = &report.fixup {
        println!(
            "fixups: {} reinstalled, {} scripts rewritten, {} shims",
            fixup.reinstalled.len(),
            fixup.rewritten.len(),
            fixup.shims.len()
        );
        for failure in &fixup.failures {
            println!("✗ {failure}");
        }
        if fixup.stopped_early {
            println!("⚠ remaining fixups skipped");
        }
    }
    if let Some(err) = &report.postinst_error {
        println!("✗ post-install hook: {err}");
    }
}

pub fn run(args: ReleaseArgs, settings: Settings, json: bool) -> Result<u8, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("cannot determine the working directory: {e}"))?;
    let opts = args.into_options(settings, &cwd);
    if std::env::var("VESSEL_SKIP_PREREQS").as_deref() == Ok("1") {
        info!("skipping prerequisite checks");
    } else {
        preflight(&opts)?;
    }

    let pb = if json {
        None
    } else {
        Some(spinner(&format!("building release {}...", opts.release)))
    };
    let runner: Arc<dyn ProcessRunner> = Arc::new(SystemRunner);
    let report = match run_release(&opts, runner) {
        Ok(r) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, &summary(&r));
            }
            r
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, &format!("release {} failed", opts.release));
            }
            return Err(e.to_string());
        }
    };

    if json {
        println!("{}", json_pretty(&report)?);
    } else {
        print_human(&report);
    }
    Ok(if report.post_install_failures() > 0 {
        EXIT_FIXUP_ERROR
    } else {
        EXIT_SUCCESS
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: ReleaseArgs,
    }

    fn parse(argv: &[&str]) -> ReleaseArgs {
        let mut full = vec!["vessel", "pkgs.yml", "repo.yml"];
        full.extend_from_slice(argv);
        Harness::parse_from(full).args
    }

    #[test]
    fn defaults_hang_off_workspace() {
        let args = parse(&["-p", "/prog/res", "-r", "2024.01"]);
        let opts = args.into_options(Settings::default(), Path::new("/work"));
        assert_eq!(opts.manifest, PathBuf::from("/work/pkgs.yml"));
        assert_eq!(opts.workspace, PathBuf::from("/work"));
        assert_eq!(opts.cache, PathBuf::from("/work/cache"));
        assert_eq!(opts.build_root, PathBuf::from("/work/tmp"));
        assert_eq!(opts.prefix, PathBuf::from("/prog/res"));
        assert_eq!(opts.phases, PhaseSelection::default());
    }

    #[test]
    fn flags_override_settings() {
        let args = parse(&[
            "-p", "p", "-r", "r", "-j", "6", "--pip", "/opt/pip", "--pyver", "3.8", "--sudo",
            "--shim", "python", "--fixup-policy", "stop-at-first", "--workspace", "ws", "-b", "-i",
        ]);
        let settings = Settings {
            shims: vec!["ipython".to_owned()],
            ..Settings::default()
        };
        let opts = args.into_options(settings, Path::new("/cwd"));
        assert_eq!(opts.settings.jobs, 6);
        assert_eq!(opts.settings.tools.pip, "/opt/pip");
        assert_eq!(opts.settings.tools.git, "git");
        assert_eq!(opts.settings.pyver, "3.8");
        assert!(opts.settings.sudo);
        assert_eq!(opts.settings.shims, vec!["ipython", "python"]);
        assert_eq!(opts.settings.fixup_policy, FixupPolicy::StopAtFirst);
        assert_eq!(opts.workspace, PathBuf::from("/cwd/ws"));
        assert_eq!(opts.cache, PathBuf::from("/cwd/ws/cache"));
        assert_eq!(opts.template_dir, PathBuf::from("/cwd"));
        assert!(opts.phases.build && opts.phases.install);
    }
}
