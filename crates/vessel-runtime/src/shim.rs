use crate::command::shell_quote;
use crate::RuntimeError;
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Directory under `bin/` holding the real executables behind shims.
pub const SHIMMED_DIR: &str = ".shimmed";

pub trait ShimGenerator {
    /// Produce wrappers under `root/bin`. Returns the wrapper paths written.
    fn generate(&self, root: &Path) -> Result<Vec<PathBuf>, RuntimeError>;
}

/// `/bin/sh` wrappers that put the release's library directories on
/// `LD_LIBRARY_PATH` and `exec` the real binary.
#[derive(Debug, Clone, Default)]
pub struct ScriptShims {
    entry_points: Vec<String>,
}

impl ScriptShims {
    pub fn new(entry_points: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            entry_points: entry_points.into_iter().map(Into::into).collect(),
        }
    }

    fn script(root: &Path, real: &Path) -> String {
        let lib = shell_quote(&root.join("lib").to_string_lossy());
        let lib64 = shell_quote(&root.join("lib64").to_string_lossy());
        format!(
            "#!/bin/sh\n\
             LD_LIBRARY_PATH={lib}:{lib64}${{LD_LIBRARY_PATH:+:$LD_LIBRARY_PATH}}\n\
             export LD_LIBRARY_PATH\n\
             exec {} \"$@\"\n",
            shell_quote(&real.to_string_lossy())
        )
    }
}

impl ShimGenerator for ScriptShims {
    fn generate(&self, root: &Path) -> Result<Vec<PathBuf>, RuntimeError> {
        let bin = root.join("bin");
        let shimmed = bin.join(SHIMMED_DIR);
        let mut written = Vec::new();

        for name in &self.entry_points {
            let wrapper = bin.join(name);
            let real = shimmed.join(name);
            let script = Self::script(root, &real);

            // Anything at `bin/<name>` other than our own wrapper is a real
            // binary, possibly newer than the one already moved aside.
            let is_wrapper = fs::read(&wrapper).is_ok_and(|c| c == script.as_bytes());
            if wrapper.is_file() && !is_wrapper {
                fs::create_dir_all(&shimmed)?;
                fs::rename(&wrapper, &real)?;
            } else if !real.exists() {
                warn!("no executable {} to shim", wrapper.display());
                continue;
            }

            let mut tmp = tempfile::NamedTempFile::new_in(&bin)?;
            tmp.write_all(script.as_bytes())?;
            tmp.as_file()
                .set_permissions(fs::Permissions::from_mode(0o755))?;
            tmp.persist(&wrapper).map_err(|e| RuntimeError::Io(e.error))?;
            debug!("shim {} -> {}", wrapper.display(), real.display());
            written.push(wrapper);
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn root_with_tool(dir: &Path) -> PathBuf {
        let root = dir.join("root");
        fs::create_dir_all(root.join("bin")).unwrap();
        fs::write(
            root.join("bin/tool"),
            "#!/bin/sh\necho \"$LD_LIBRARY_PATH|$*\"\n",
        )
        .unwrap();
        fs::set_permissions(root.join("bin/tool"), fs::Permissions::from_mode(0o755)).unwrap();
        root
    }

    #[test]
    fn wrapper_injects_library_path_and_forwards_args() {
        let dir = tempfile::tempdir().unwrap();
        let root = root_with_tool(dir.path());

        let written = ScriptShims::new(["tool"]).generate(&root).unwrap();
        assert_eq!(written, vec![root.join("bin/tool")]);
        assert!(root.join("bin/.shimmed/tool").exists());

        let out = Command::new(root.join("bin/tool"))
            .args(["a", "b c"])
            .env("LD_LIBRARY_PATH", "/host/lib")
            .output()
            .unwrap();
        let stdout = String::from_utf8(out.stdout).unwrap();
        let expected = format!(
            "{}:{}:/host/lib|a b c\n",
            root.join("lib").display(),
            root.join("lib64").display()
        );
        assert_eq!(stdout, expected);
    }

    #[test]
    fn regenerating_keeps_the_real_binary() {
        let dir = tempfile::tempdir().unwrap();
        let root = root_with_tool(dir.path());
        let shims = ScriptShims::new(["tool"]);
        shims.generate(&root).unwrap();
        shims.generate(&root).unwrap();

        let real = fs::read_to_string(root.join("bin/.shimmed/tool")).unwrap();
        assert!(real.contains("echo"));
        assert!(!root.join("bin/.shimmed/.shimmed").exists());
    }

    #[test]
    fn reinstalled_binary_replaces_the_shimmed_one() {
        let dir = tempfile::tempdir().unwrap();
        let root = root_with_tool(dir.path());
        let shims = ScriptShims::new(["tool"]);
        shims.generate(&root).unwrap();

        fs::write(root.join("bin/tool"), "#!/bin/sh\necho fresh\n").unwrap();
        fs::set_permissions(root.join("bin/tool"), fs::Permissions::from_mode(0o755)).unwrap();
        shims.generate(&root).unwrap();

        let real = fs::read_to_string(root.join("bin/.shimmed/tool")).unwrap();
        assert_eq!(real, "#!/bin/sh\necho fresh\n");
        let out = Command::new(root.join("bin/tool")).output().unwrap();
        assert_eq!(String::from_utf8(out.stdout).unwrap(), "fresh\n");
    }

    #[test]
    fn missing_entry_point_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let root = root_with_tool(dir.path());
        let written = ScriptShims::new(["absent"]).generate(&root).unwrap();
        assert!(written.is_empty());
        assert!(!root.join("bin/.shimmed").exists());
    }
}
