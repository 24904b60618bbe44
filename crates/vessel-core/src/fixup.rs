//! Post-cutover repairs of the installed tree.
//!
//! Tools installed by pip embed the path of the interpreter that installed
//! them, which during the build was the one in the fakeroot. After cutover
//! those packages are reinstalled against the live tree, remaining python
//! interpreter lines are rewritten, and shims are generated. None of this
//! can undo the cutover: failures are collected in a [`FixupReport`].

use crate::fetcher::artifact_path;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};
use vessel_runtime::{
    fixup_python_shebangs, select_method, ProcessRunner, ReinstallContext, RuntimeEnv,
    ShimGenerator, Tools,
};
use vessel_schema::{package_key, BuildPlan};
use vessel_store::DownloadCache;

/// What to do after the first failed fixup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FixupPolicy {
    /// Attempt every remaining fixup and report all failures.
    #[default]
    ContinueAll,
    /// Skip everything after the first failure.
    StopAtFirst,
}

impl fmt::Display for FixupPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FixupPolicy::ContinueAll => write!(f, "continue-all"),
            FixupPolicy::StopAtFirst => write!(f, "stop-at-first"),
        }
    }
}

impl FromStr for FixupPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "continue-all" => Ok(FixupPolicy::ContinueAll),
            "stop-at-first" => Ok(FixupPolicy::StopAtFirst),
            other => Err(format!(
                "unknown fixup policy '{other}' (expected continue-all or stop-at-first)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FixupStep {
    Reinstall,
    Shebangs,
    Shims,
}

impl fmt::Display for FixupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FixupStep::Reinstall => write!(f, "reinstall"),
            FixupStep::Shebangs => write!(f, "interpreter lines"),
            FixupStep::Shims => write!(f, "shims"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixupFailure {
    pub step: FixupStep,
    /// `name-version` for per-package steps.
    pub package: Option<String>,
    pub message: String,
}

impl fmt::Display for FixupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.package {
            Some(p) => write!(f, "{} of {p}: {}", self.step, self.message),
            None => write!(f, "{}: {}", self.step, self.message),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FixupReport {
    pub reinstalled: Vec<String>,
    pub rewritten: Vec<PathBuf>,
    pub shims: Vec<PathBuf>,
    pub failures: Vec<FixupFailure>,
    /// Set when [`FixupPolicy::StopAtFirst`] skipped the remaining fixups.
    pub stopped_early: bool,
}

impl FixupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Record a failure; returns whether the run should stop.
    fn fail(&mut self, policy: FixupPolicy, failure: FixupFailure) -> bool {
        warn!("fixup failed: {failure}");
        self.failures.push(failure);
        if policy == FixupPolicy::StopAtFirst {
            self.stopped_early = true;
            return true;
        }
        false
    }
}

pub struct FixupInputs<'a> {
    /// The installed root, `prefix/<release>/root`.
    pub root: &'a Path,
    pub plan: &'a BuildPlan,
    pub cache: &'a DownloadCache,
    pub env: &'a RuntimeEnv,
    pub tools: &'a Tools,
    pub sudo: bool,
    pub policy: FixupPolicy,
    pub shims: &'a dyn ShimGenerator,
}

pub fn run_fixups(inputs: &FixupInputs<'_>, runner: &dyn ProcessRunner) -> FixupReport {
    let mut report = FixupReport::default();
    let policy = inputs.policy;

    info!("reinstalling interpreter-dependent packages against {}", inputs.root.display());
    for spec in inputs.plan.interpreter_dependent() {
        let key = package_key(&spec.name, &spec.version);
        let artifact = artifact_path(inputs.cache, spec);
        let ctx = ReinstallContext {
            spec,
            root: inputs.root,
            artifact: artifact.as_deref(),
            env: inputs.env,
            tools: inputs.tools,
            sudo: inputs.sudo,
        };
        match select_method(spec.build_method).reinstall_against(&ctx, runner) {
            Ok(true) => report.reinstalled.push(key),
            Ok(false) => {}
            Err(e) => {
                let failure = FixupFailure {
                    step: FixupStep::Reinstall,
                    package: Some(key),
                    message: e.to_string(),
                };
                if report.fail(policy, failure) {
                    return report;
                }
            }
        }
    }

    let bin = inputs.root.join("bin");
    match fixup_python_shebangs(&bin, &bin.join("python")) {
        Ok(paths) => report.rewritten = paths,
        Err(e) => {
            let failure = FixupFailure {
                step: FixupStep::Shebangs,
                package: None,
                message: e.to_string(),
            };
            if report.fail(policy, failure) {
                return report;
            }
        }
    }

    match inputs.shims.generate(inputs.root) {
        Ok(paths) => report.shims = paths,
        Err(e) => {
            let failure = FixupFailure {
                step: FixupStep::Shims,
                package: None,
                message: e.to_string(),
            };
            report.fail(policy, failure);
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;
    use vessel_runtime::{MockRunner, ScriptShims};
    use vessel_schema::{parse_catalogue_str, parse_manifest_str, resolve};

    const CATALOGUE: &str = r#"
numpy:
  "1.19.2":
    maintainer: a@x
    make: pip
    source: pypi
six:
  "1.15.0":
    maintainer: a@x
    make: pip
    source: pypi
libecl:
  "2.9":
    maintainer: b@x
    make: cmake
    source: https://git.example.com/libecl
"#;

    fn plan() -> BuildPlan {
        resolve(
            &parse_manifest_str("numpy: 1.19.2\nsix: 1.15.0\nlibecl: \"2.9\"\n").unwrap(),
            &parse_catalogue_str(CATALOGUE, None).unwrap(),
        )
        .unwrap()
    }

    fn root_with_script(dir: &Path) -> PathBuf {
        let root = dir.join("root");
        fs::create_dir_all(root.join("bin")).unwrap();
        fs::write(root.join("bin/f2py"), "#!/build/fakeroot/bin/python\nimport numpy\n").unwrap();
        root
    }

    fn run(root: &Path, runner: &MockRunner, policy: FixupPolicy) -> FixupReport {
        let plan = plan();
        let cache = DownloadCache::new("/cache");
        let env = RuntimeEnv::for_installed_root(root, "3.8", &BTreeMap::new());
        let tools = Tools::default();
        let shims = ScriptShims::default();
        let inputs = FixupInputs {
            root,
            plan: &plan,
            cache: &cache,
            env: &env,
            tools: &tools,
            sudo: false,
            policy,
            shims: &shims,
        };
        run_fixups(&inputs, runner)
    }

    #[test]
    fn reinstalls_pip_packages_and_rewrites_scripts() {
        let dir = tempfile::tempdir().unwrap();
        let root = root_with_script(dir.path());
        let runner = MockRunner::new();

        let report = run(&root, &runner, FixupPolicy::ContinueAll);
        assert!(report.is_clean());
        assert_eq!(report.reinstalled, vec!["numpy-1.19.2", "six-1.15.0"]);
        assert_eq!(report.rewritten, vec![root.join("bin/f2py")]);
        assert_eq!(runner.invocations_of("pip").len(), 2);
        assert!(runner.command_lines()[0].contains("--find-links /cache/numpy-1.19.2"));
        assert!(fs::read_to_string(root.join("bin/f2py"))
            .unwrap()
            .starts_with(&format!("#!{}\n", root.join("bin/python").display())));
    }

    #[test]
    fn continue_all_attempts_everything() {
        let dir = tempfile::tempdir().unwrap();
        let root = root_with_script(dir.path());
        let runner = MockRunner::new().failing_on("numpy==");

        let report = run(&root, &runner, FixupPolicy::ContinueAll);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].package.as_deref(), Some("numpy-1.19.2"));
        assert!(report.failures[0].message.contains("pip install numpy==1.19.2"));
        assert_eq!(report.reinstalled, vec!["six-1.15.0"]);
        assert_eq!(report.rewritten.len(), 1);
        assert!(!report.stopped_early);
    }

    #[test]
    fn stop_at_first_skips_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let root = root_with_script(dir.path());
        let runner = MockRunner::new().failing_on("numpy==");

        let report = run(&root, &runner, FixupPolicy::StopAtFirst);
        assert_eq!(report.failures.len(), 1);
        assert!(report.stopped_early);
        assert!(report.reinstalled.is_empty());
        assert!(report.rewritten.is_empty());
        assert_eq!(runner.call_count(), 1);
        assert!(fs::read_to_string(root.join("bin/f2py"))
            .unwrap()
            .starts_with("#!/build/fakeroot"));
    }

    #[test]
    fn policy_parses_from_kebab_case() {
        assert_eq!("stop-at-first".parse::<FixupPolicy>(), Ok(FixupPolicy::StopAtFirst));
        assert_eq!(FixupPolicy::ContinueAll.to_string(), "continue-all");
        assert!("sometimes".parse::<FixupPolicy>().is_err());
    }
}
