use crate::fixup::FixupPolicy;
use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use vessel_runtime::Tools;

pub const DEFAULT_PYVER: &str = "3.11";

/// User settings read from `~/.config/vessel/config.toml`.
///
/// Every field is optional in the file; command-line flags override them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub tools: Tools,
    /// Parallel jobs for fetches and builds; `0` means one per CPU.
    pub jobs: usize,
    /// Interpreter version used when the manifest has no `python` entry.
    pub pyver: String,
    /// Executables under `root/bin` to wrap with shims after install.
    pub shims: Vec<String>,
    pub fixup_policy: FixupPolicy,
    pub sudo: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tools: Tools::default(),
            jobs: 0,
            pyver: DEFAULT_PYVER.to_owned(),
            shims: Vec::new(),
            fixup_policy: FixupPolicy::default(),
            sudo: false,
        }
    }
}

impl Settings {
    pub fn from_toml_str(input: &str, origin: &Path) -> Result<Self, CoreError> {
        toml::from_str(input).map_err(|e| CoreError::Config {
            path: origin.display().to_string(),
            message: e.to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::Config {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&content, path)
    }

    /// Load `explicit` if given (it must exist), otherwise the default file
    /// if it exists, otherwise the built-in defaults.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self, CoreError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match default_config_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// The job count with `0` resolved to the number of CPUs.
    pub fn effective_jobs(&self) -> usize {
        if self.jobs > 0 {
            return self.jobs;
        }
        std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    Some(PathBuf::from(home).join(".config/vessel/config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let settings = Settings::from_toml_str("", Path::new("c.toml")).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.pyver, "3.11");
        assert_eq!(settings.fixup_policy, FixupPolicy::ContinueAll);
    }

    #[test]
    fn partial_tools_keep_other_defaults() {
        let input = r#"
jobs = 8
shims = ["python", "ipython"]
fixup_policy = "stop-at-first"

[tools]
pip = "/opt/py/bin/pip3"
"#;
        let settings = Settings::from_toml_str(input, Path::new("c.toml")).unwrap();
        assert_eq!(settings.jobs, 8);
        assert_eq!(settings.effective_jobs(), 8);
        assert_eq!(settings.tools.pip, "/opt/py/bin/pip3");
        assert_eq!(settings.tools.git, "git");
        assert_eq!(settings.shims, vec!["python", "ipython"]);
        assert_eq!(settings.fixup_policy, FixupPolicy::StopAtFirst);
    }

    #[test]
    fn unknown_key_is_rejected_with_path() {
        let err = Settings::from_toml_str("job = 3\n", Path::new("/etc/v.toml")).unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("config error: /etc/v.toml"), "{msg}");
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(Settings::load_or_default(Some(&path)).is_err());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "pyver = \"3.8\"\nsudo = true\n").unwrap();
        let settings = Settings::load_or_default(Some(&path)).unwrap();
        assert_eq!(settings.pyver, "3.8");
        assert!(settings.sudo);
    }

    #[test]
    fn zero_jobs_means_cpu_count() {
        assert!(Settings::default().effective_jobs() >= 1);
    }
}
