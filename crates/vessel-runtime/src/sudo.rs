use crate::command::{run_checked, CommandSpec, ProcessRunner};
use std::io;
use std::path::Path;
use std::sync::Arc;
use vessel_store::FsOps;

/// Filesystem operations on the prefix performed through `sudo`.
///
/// There is no atomic exchange here; the installer falls back to the classic
/// rename sequence.
pub struct SudoFs {
    runner: Arc<dyn ProcessRunner>,
}

impl SudoFs {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }

    fn run(&self, spec: &CommandSpec) -> io::Result<()> {
        run_checked(self.runner.as_ref(), spec)
            .map(|_| ())
            .map_err(io::Error::other)
    }
}

impl FsOps for SudoFs {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.run(
            &CommandSpec::new("mv")
                .arg("-T")
                .path_arg(from)
                .path_arg(to)
                .sudo(true),
        )
    }

    fn exchange(&self, _a: &Path, _b: &Path) -> io::Result<bool> {
        Ok(false)
    }

    fn remove_tree(&self, path: &Path) -> io::Result<()> {
        self.run(
            &CommandSpec::new("rm")
                .args(["-rf", "--"])
                .path_arg(path)
                .sudo(true),
        )
    }

    fn copy_tree(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.run(
            &CommandSpec::new("cp")
                .args(["-a", "-T"])
                .path_arg(from)
                .path_arg(to)
                .sudo(true),
        )
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        self.run(&CommandSpec::new("mkdir").arg("-p").path_arg(path).sudo(true))
    }

    fn name(&self) -> &'static str {
        "sudo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRunner;

    #[test]
    fn operations_run_through_sudo() {
        let runner = Arc::new(MockRunner::new());
        let fs_ops = SudoFs::new(runner.clone());
        fs_ops.create_dir_all(Path::new("/p")).unwrap();
        fs_ops.copy_tree(Path::new("/w/rel"), Path::new("/p/.rel")).unwrap();
        fs_ops.rename(Path::new("/p/rel"), Path::new("/p/rel.delete")).unwrap();
        fs_ops.remove_tree(Path::new("/p/rel.delete")).unwrap();
        assert!(!fs_ops.exchange(Path::new("/a"), Path::new("/b")).unwrap());

        assert_eq!(
            runner.command_lines(),
            vec![
                "sudo mkdir -p /p",
                "sudo cp -a -T /w/rel /p/.rel",
                "sudo mv -T /p/rel /p/rel.delete",
                "sudo rm -rf -- /p/rel.delete",
            ]
        );
    }

    #[test]
    fn failures_become_io_errors() {
        let runner = Arc::new(MockRunner::new().failing_on("mv"));
        let fs_ops = SudoFs::new(runner);
        let err = fs_ops
            .rename(Path::new("/p/a"), Path::new("/p/b"))
            .unwrap_err();
        assert!(err.to_string().contains("mv -T /p/a /p/b"));
    }
}
