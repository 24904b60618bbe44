use crate::concurrency::check_shutdown;
use crate::fetcher::{artifact_path, thread_pool};
use crate::graph::DependencyGraph;
use crate::CoreError;
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use vessel_runtime::{select_method, BuildContext, ProcessRunner, RuntimeError, Tools};
use vessel_schema::{package_key, BuildPlan, PackageSpec};
use vessel_store::{DownloadCache, WorkspaceLayout};

pub struct BuildSettings<'a> {
    pub workspace: &'a WorkspaceLayout,
    pub cache: &'a DownloadCache,
    /// Parent of the per-package build directories.
    pub build_root: &'a Path,
    pub tools: &'a Tools,
    pub jobs: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildSummary {
    /// Package keys in the order their builds finished, wave by wave.
    pub built: Vec<String>,
    pub waves: usize,
    pub staged_root: PathBuf,
}

fn build_dir_for(build_root: &Path, spec: &PackageSpec) -> PathBuf {
    build_root.join(format!("{}-build", package_key(&spec.name, &spec.version)))
}

fn reset_dir(path: &Path) -> Result<(), std::io::Error> {
    match fs::remove_dir_all(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    fs::create_dir_all(path)
}

fn build_one(
    spec: &PackageSpec,
    settings: &BuildSettings<'_>,
    runner: &dyn ProcessRunner,
) -> Result<String, CoreError> {
    let key = package_key(&spec.name, &spec.version);
    let wrap = |source: RuntimeError| CoreError::Build {
        package: spec.name.to_string(),
        version: spec.version.to_string(),
        source,
    };

    let build_dir = build_dir_for(settings.build_root, spec);
    reset_dir(&build_dir).map_err(|e| wrap(e.into()))?;
    let artifact = artifact_path(settings.cache, spec);
    let fakeroot = settings.workspace.fakeroot();
    let root = settings.workspace.target().live_root();
    let ctx = BuildContext {
        spec,
        artifact: artifact.as_deref(),
        build_dir: &build_dir,
        fakeroot: &fakeroot,
        root: &root,
        cache_root: settings.cache.root(),
        jobs: settings.jobs,
        tools: settings.tools,
    };

    info!("building {key} ({})", spec.build_method);
    select_method(spec.build_method)
        .build(&ctx, runner)
        .map_err(wrap)?;

    if let Err(e) = fs::remove_dir_all(&build_dir) {
        warn!("failed to remove build directory {}: {e}", build_dir.display());
    }
    debug!("built {key}");
    Ok(key)
}

/// Build every package of the plan into the workspace fakeroot, then move
/// the finished tree to the staged release root.
///
/// Packages run in dependency waves, each wave on a pool of `jobs` threads.
/// The first failure stops the run after its wave; the fakeroot and the
/// failed package's build directory are left for inspection.
pub fn build_all(
    plan: &BuildPlan,
    settings: &BuildSettings<'_>,
    runner: &dyn ProcessRunner,
) -> Result<BuildSummary, CoreError> {
    let graph = DependencyGraph::from_plan(plan)?;
    let waves = graph.waves();
    let specs: Vec<&PackageSpec> = plan.iter().collect();
    let workspace = settings.workspace;

    reset_dir(&workspace.fakeroot())?;
    fs::create_dir_all(workspace.fakeroot_root())?;
    fs::create_dir_all(settings.build_root)?;

    let pool = thread_pool(settings.jobs)?;
    let mut built = Vec::with_capacity(specs.len());
    for (n, wave) in waves.iter().enumerate() {
        check_shutdown("build")?;
        debug!("build wave {}/{}: {} packages", n + 1, waves.len(), wave.len());
        let keys = pool.install(|| {
            wave.par_iter()
                .map(|&i| build_one(specs[i], settings, runner))
                .collect::<Result<Vec<_>, CoreError>>()
        })?;
        built.extend(keys);
    }

    let staged_root = workspace.staged_root();
    fs::create_dir_all(workspace.staged())?;
    match fs::remove_dir_all(&staged_root) {
        Ok(()) => debug!("replaced previous staged tree {}", staged_root.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    fs::rename(workspace.fakeroot_root(), &staged_root)?;
    fs::remove_dir_all(workspace.fakeroot())?;
    info!("staged {} packages in {}", built.len(), staged_root.display());

    Ok(BuildSummary {
        built,
        waves: waves.len(),
        staged_root,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use vessel_runtime::MockRunner;
    use vessel_schema::{parse_catalogue_str, parse_manifest_str, resolve};
    use vessel_store::ReleaseLayout;

    const CATALOGUE: &str = r#"
base:
  "1":
    maintainer: m@x
    make: cmake
    source: https://git.example.com/base
app:
  "2":
    maintainer: m@x
    make: cmake
    source: https://git.example.com/app
    depends: [base]
tool:
  "3":
    maintainer: m@x
    make: cmake
    source: https://git.example.com/tool
"#;

    struct Fixture {
        dir: tempfile::TempDir,
        workspace: WorkspaceLayout,
        cache: DownloadCache,
        plan: BuildPlan,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let target = ReleaseLayout::new("/opt/rel", "r1").unwrap();
        let workspace = WorkspaceLayout::new(dir.path().join("ws"), target);
        let cache = DownloadCache::new(dir.path().join("cache"));
        let plan = resolve(
            &parse_manifest_str("app: \"2\"\nbase: \"1\"\ntool: \"3\"\n").unwrap(),
            &parse_catalogue_str(CATALOGUE, None).unwrap(),
        )
        .unwrap();
        Fixture {
            dir,
            workspace,
            cache,
            plan,
        }
    }

    #[test]
    fn dependencies_build_first_and_tree_is_staged() {
        let f = fixture();
        let build_root = f.dir.path().join("tmp");
        let order = Arc::new(Mutex::new(Vec::new()));
        let seen = order.clone();
        let installed = f.workspace.fakeroot_root();
        let runner = MockRunner::new().on_run(move |cmd| {
            if cmd.arguments().first().map(String::as_str) == Some("install") {
                let dir = cmd.working_dir().unwrap().to_path_buf();
                seen.lock().unwrap().push(dir.file_name().unwrap().to_string_lossy().into_owned());
                fs::create_dir_all(installed.join("lib"))?;
                fs::write(installed.join("lib").join(dir.file_name().unwrap()), "so")?;
            }
            Ok(())
        });
        let tools = Tools::default();
        let settings = BuildSettings {
            workspace: &f.workspace,
            cache: &f.cache,
            build_root: &build_root,
            tools: &tools,
            jobs: 2,
        };

        let summary = build_all(&f.plan, &settings, &runner).unwrap();
        assert_eq!(summary.waves, 2);
        assert_eq!(summary.built.last().map(String::as_str), Some("app-2"));

        let order = order.lock().unwrap().clone();
        let pos = |k: &str| order.iter().position(|o| o == k).unwrap();
        assert!(pos("base-1-build") < pos("app-2-build"));

        assert!(f.workspace.staged_root().join("lib/app-2-build").exists());
        assert!(!f.workspace.fakeroot().exists());
        assert!(!build_root.join("app-2-build").exists());
        assert_eq!(runner.invocations_of("make").len(), 6);
        assert!(runner
            .calls()
            .iter()
            .all(|c| c.working_dir().is_some_and(|d| d.starts_with(&build_root))));
    }

    #[test]
    fn failed_build_stops_and_keeps_fakeroot() {
        let f = fixture();
        let build_root = f.dir.path().join("tmp");
        let runner = MockRunner::new().failing_on("tool-3-build");
        let tools = Tools::default();
        let settings = BuildSettings {
            workspace: &f.workspace,
            cache: &f.cache,
            build_root: &build_root,
            tools: &tools,
            jobs: 1,
        };

        let err = build_all(&f.plan, &settings, &runner).unwrap_err();
        match &err {
            CoreError::Build { package, version, .. } => {
                assert_eq!(package, "tool");
                assert_eq!(version, "3");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(f.workspace.fakeroot().exists());
        assert!(!f.workspace.staged_root().exists());
        assert!(build_root.join("tool-3-build").exists());
        // `app` depends on `base`, which shares the failing wave.
        assert!(runner
            .command_lines()
            .iter()
            .all(|l| !l.contains("app-2")));
    }
}
