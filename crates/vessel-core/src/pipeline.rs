use crate::builder::{build_all, BuildSettings, BuildSummary};
use crate::capture::{capture_environment, CaptureReport, ENABLE_SCRIPTS};
use crate::concurrency::check_shutdown;
use crate::config::Settings;
use crate::fetcher::{fetch_all, FetchSummary};
use crate::fixup::{run_fixups, FixupInputs, FixupReport};
use crate::CoreError;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use vessel_runtime::{
    run_checked, CommandSpec, ProcessRunner, RuntimeEnv, ScriptShims, SudoFs,
};
use vessel_schema::{
    parse_catalogue_file, parse_manifest_file, resolve, BuildPlan, Manifest,
};
use vessel_store::{
    AtomicInstaller, DirectFs, DownloadCache, FsOps, InstallOutcome, RecoveryAction,
    ReleaseLayout, WorkspaceLayout,
};

/// Which phases of the pipeline a run performs.
///
/// With no selector set, a run fetches, builds and installs. Selectors
/// restrict it, and let separate invocations pick up where an earlier one
/// left its artifacts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseSelection {
    pub download: bool,
    pub build: bool,
    pub install: bool,
    /// Stage and describe the release but leave the prefix untouched.
    pub dry_run: bool,
}

impl PhaseSelection {
    pub fn runs_fetch(&self) -> bool {
        self.download || (!self.build && !self.install)
    }

    pub fn stops_after_fetch(&self) -> bool {
        self.download && !self.build
    }

    pub fn runs_build(&self) -> bool {
        self.build || !self.install
    }

    pub fn stops_after_build(&self) -> bool {
        self.build && !self.install
    }
}

/// The last stage a run completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Resolved,
    Fetched,
    Built,
    /// Captured into the workspace without touching the prefix.
    Staged,
    Installed,
}

pub struct ReleaseOptions {
    pub manifest: PathBuf,
    pub catalogue: PathBuf,
    pub prefix: PathBuf,
    pub release: String,
    pub cache: PathBuf,
    /// Parent of the per-package build directories.
    pub build_root: PathBuf,
    pub workspace: PathBuf,
    /// Where activation templates are looked up when the workspace is new.
    pub template_dir: PathBuf,
    pub phases: PhaseSelection,
    pub settings: Settings,
    pub postinst: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallSummary {
    pub live: PathBuf,
    pub exchanged: bool,
    pub replaced: bool,
    pub leftover: Option<PathBuf>,
    pub recovered: String,
}

impl From<InstallOutcome> for InstallSummary {
    fn from(o: InstallOutcome) -> Self {
        Self {
            live: o.live,
            exchanged: o.exchanged,
            replaced: o.replaced,
            leftover: o.leftover,
            recovered: o.recovered.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseReport {
    pub release: String,
    pub prefix: PathBuf,
    pub packages: usize,
    pub pyver: String,
    pub stage: Stage,
    pub fetch: Option<FetchSummary>,
    pub build: Option<BuildSummary>,
    pub capture: Option<CaptureReport>,
    pub install: Option<InstallSummary>,
    pub fixup: Option<FixupReport>,
    pub postinst_error: Option<String>,
}

impl ReleaseReport {
    /// Failures that happened after cutover: the new release is live but
    /// not fully consistent.
    pub fn post_install_failures(&self) -> usize {
        self.fixup.as_ref().map_or(0, |f| f.failures.len())
            + usize::from(self.postinst_error.is_some())
    }
}

/// `major.minor` of the manifest's `python` entry, or `fallback`.
pub fn interpreter_version(manifest: &Manifest, fallback: &str) -> String {
    manifest
        .version_of("python")
        .map_or_else(|| fallback.to_owned(), |v| v.major_minor())
}

fn absolute(path: &Path) -> Result<PathBuf, CoreError> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Create the workspace if needed and seed it with the activation templates
/// from `template_dir` that it does not have yet.
fn prepare_workspace(workspace: &WorkspaceLayout, template_dir: &Path) -> Result<(), CoreError> {
    fs::create_dir_all(workspace.workspace())?;
    if template_dir == workspace.workspace() {
        return Ok(());
    }
    for name in ENABLE_SCRIPTS {
        let target = workspace.enable_template(name);
        let source = template_dir.join(format!("{name}.in"));
        if !target.exists() && source.is_file() {
            fs::copy(&source, &target)?;
            debug!("copied {} into workspace", source.display());
        }
    }
    Ok(())
}

fn installer_fs(sudo: bool, runner: &Arc<dyn ProcessRunner>) -> Box<dyn FsOps> {
    if sudo {
        Box::new(SudoFs::new(Arc::clone(runner)))
    } else {
        Box::new(DirectFs::new())
    }
}

/// Parse the manifest and catalogue and resolve them. Runs no subprocess.
pub fn load_plan(manifest: &Path, catalogue: &Path) -> Result<(Manifest, BuildPlan), CoreError> {
    let manifest = parse_manifest_file(manifest)?;
    let catalogue = parse_catalogue_file(catalogue)?;
    let plan = resolve(&manifest, &catalogue)?;
    Ok((manifest, plan))
}

/// Run the release pipeline.
///
/// Resolution happens before any subprocess runs. Failures up to and
/// including the cutover are returned as errors and leave the previous
/// release live; failures after it are collected in the report.
pub fn run_release(
    opts: &ReleaseOptions,
    runner: Arc<dyn ProcessRunner>,
) -> Result<ReleaseReport, CoreError> {
    let settings = &opts.settings;
    let layout = ReleaseLayout::new(absolute(&opts.prefix)?, opts.release.clone())?;
    let (manifest, plan) = load_plan(&opts.manifest, &opts.catalogue)?;
    let pyver = interpreter_version(&manifest, &settings.pyver);
    info!(
        "release {} with {} packages, python {pyver}",
        layout.release(),
        plan.len()
    );

    let mut report = ReleaseReport {
        release: layout.release().to_owned(),
        prefix: layout.prefix().to_path_buf(),
        packages: plan.len(),
        pyver: pyver.clone(),
        stage: Stage::Resolved,
        fetch: None,
        build: None,
        capture: None,
        install: None,
        fixup: None,
        postinst_error: None,
    };

    let jobs = settings.effective_jobs();
    let cache = DownloadCache::new(absolute(&opts.cache)?);
    let phases = opts.phases;

    if phases.runs_fetch() {
        check_shutdown("fetch")?;
        report.fetch = Some(fetch_all(&plan, &cache, &settings.tools, runner.as_ref(), jobs)?);
        report.stage = Stage::Fetched;
        if phases.stops_after_fetch() {
            return Ok(report);
        }
    }

    let workspace = WorkspaceLayout::new(absolute(&opts.workspace)?, layout.clone());
    prepare_workspace(&workspace, &opts.template_dir)?;

    if phases.runs_build() {
        check_shutdown("build")?;
        let build_root = absolute(&opts.build_root)?;
        let build_settings = BuildSettings {
            workspace: &workspace,
            cache: &cache,
            build_root: &build_root,
            tools: &settings.tools,
            jobs,
        };
        report.build = Some(build_all(&plan, &build_settings, runner.as_ref())?);
        report.stage = Stage::Built;
        if phases.stops_after_build() {
            return Ok(report);
        }
    }

    report.capture = Some(capture_environment(&workspace, &plan, &pyver)?);
    if phases.dry_run {
        info!("dry run: release staged in {}", workspace.staged().display());
        report.stage = Stage::Staged;
        return Ok(report);
    }

    check_shutdown("install")?;
    let fs_ops = installer_fs(settings.sudo, &runner);
    let installer = AtomicInstaller::new(layout.clone(), fs_ops.as_ref());
    let outcome = installer.install(&workspace.staged())?;
    if let Some(leftover) = &outcome.leftover {
        warn!("previous release left at {}", leftover.display());
    }
    report.install = Some(outcome.into());
    report.stage = Stage::Installed;

    let root = layout.live_root();
    let env = RuntimeEnv::for_installed_root(&root, &pyver, &RuntimeEnv::inherited());
    let shims = ScriptShims::new(settings.shims.iter().cloned());
    let inputs = FixupInputs {
        root: &root,
        plan: &plan,
        cache: &cache,
        env: &env,
        tools: &settings.tools,
        sudo: settings.sudo,
        policy: settings.fixup_policy,
        shims: &shims,
    };
    report.fixup = Some(run_fixups(&inputs, runner.as_ref()));

    if let Some(hook) = &opts.postinst {
        let cmd = CommandSpec::new(hook.to_string_lossy()).path_arg(&layout.live());
        info!("running post-install hook {}", hook.display());
        if let Err(e) = run_checked(runner.as_ref(), &cmd) {
            warn!("post-install hook failed: {e}");
            report.postinst_error = Some(e.to_string());
        }
    }
    Ok(report)
}

/// Resume or roll back an interrupted install of `release` under `prefix`.
pub fn recover_release(
    prefix: &Path,
    release: &str,
    sudo: bool,
    runner: Arc<dyn ProcessRunner>,
) -> Result<RecoveryAction, CoreError> {
    let layout = ReleaseLayout::new(absolute(prefix)?, release)?;
    let fs_ops = installer_fs(sudo, &runner);
    let action = AtomicInstaller::new(layout, fs_ops.as_ref()).recover()?;
    info!("{release}: {action}");
    Ok(action)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vessel_schema::parse_manifest_str;

    #[test]
    fn default_selection_runs_everything() {
        let p = PhaseSelection::default();
        assert!(p.runs_fetch() && p.runs_build());
        assert!(!p.stops_after_fetch() && !p.stops_after_build());
    }

    #[test]
    fn download_only_stops_after_fetch() {
        let p = PhaseSelection {
            download: true,
            ..PhaseSelection::default()
        };
        assert!(p.runs_fetch());
        assert!(p.stops_after_fetch());
    }

    #[test]
    fn download_and_build_stop_before_install() {
        let p = PhaseSelection {
            download: true,
            build: true,
            ..PhaseSelection::default()
        };
        assert!(p.runs_fetch() && !p.stops_after_fetch());
        assert!(p.runs_build() && p.stops_after_build());
    }

    #[test]
    fn install_only_skips_fetch_and_build() {
        let p = PhaseSelection {
            install: true,
            ..PhaseSelection::default()
        };
        assert!(!p.runs_fetch());
        assert!(!p.runs_build());
    }

    #[test]
    fn build_and_install_skip_fetch() {
        let p = PhaseSelection {
            build: true,
            install: true,
            ..PhaseSelection::default()
        };
        assert!(!p.runs_fetch());
        assert!(p.runs_build() && !p.stops_after_build());
    }

    #[test]
    fn interpreter_version_from_manifest() {
        let with = parse_manifest_str("python: 3.8.6-builtin\nnumpy: 1.19.2\n").unwrap();
        assert_eq!(interpreter_version(&with, "3.11"), "3.8");
        let without = parse_manifest_str("numpy: 1.19.2\n").unwrap();
        assert_eq!(interpreter_version(&without, "3.11"), "3.11");
    }

    #[test]
    fn workspace_is_seeded_with_templates() {
        let dir = tempfile::tempdir().unwrap();
        let templates = dir.path().join("src");
        fs::create_dir(&templates).unwrap();
        fs::write(templates.join("enable.in"), "x").unwrap();
        let ws = WorkspaceLayout::new(
            dir.path().join("new/ws"),
            ReleaseLayout::new("/p", "r").unwrap(),
        );
        prepare_workspace(&ws, &templates).unwrap();
        assert!(ws.workspace().join("enable.in").is_file());
        assert!(!ws.workspace().join("enable.csh.in").exists());
    }
}
