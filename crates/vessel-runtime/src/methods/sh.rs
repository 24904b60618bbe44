use super::{BuildBackend, BuildContext};
use crate::command::{run_checked, CommandSpec, ProcessRunner};
use crate::RuntimeError;
use vessel_schema::BuildMethod;
use vessel_store::copy_tree;

/// Runs the package's own build script with the release's layout as arguments.
///
/// The fetched source is copied into the build directory first so the script
/// can build in place without touching the shared cache.
pub struct ShBackend;

impl ShBackend {
    fn script_command(ctx: &BuildContext<'_>) -> Result<CommandSpec, RuntimeError> {
        let makefile = ctx
            .spec
            .makefile
            .as_deref()
            .ok_or_else(|| RuntimeError::MissingInput {
                package: ctx.spec.name.to_string(),
                version: ctx.spec.version.to_string(),
                reason: "sh build without a makefile".to_owned(),
            })?;
        let staged_root = ctx.staged_root();
        Ok(CommandSpec::new(&ctx.tools.bash)
            .path_arg(makefile)
            .arg("--prefix")
            .path_arg(ctx.root)
            .arg("--fakeroot")
            .path_arg(ctx.fakeroot)
            .arg("--python")
            .path_arg(&staged_root.join("bin").join("python"))
            .arg("--pip")
            .arg(&ctx.tools.pip)
            .arg("--jobs")
            .arg(ctx.jobs.max(1).to_string())
            .arg("--cmake")
            .arg(&ctx.tools.cmake)
            .args(ctx.spec.build_options.iter().cloned())
            .cwd(ctx.build_dir))
    }
}

impl BuildBackend for ShBackend {
    fn method(&self) -> BuildMethod {
        BuildMethod::Sh
    }

    fn build(&self, ctx: &BuildContext<'_>, runner: &dyn ProcessRunner) -> Result<(), RuntimeError> {
        let cmd = Self::script_command(ctx)?;
        if let Some(source) = ctx.artifact {
            copy_tree(source, ctx.build_dir)?;
        }
        run_checked(runner, &cmd)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::methods::test_support::spec;
    use crate::mock::MockRunner;
    use crate::tools::Tools;
    use std::fs;
    use std::path::Path;

    #[test]
    fn script_gets_layout_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("cache/pkg-1.0");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("configure"), "#!/bin/sh\n").unwrap();
        let build_dir = dir.path().join("build");
        fs::create_dir(&build_dir).unwrap();

        let spec = spec("    make: sh\n    makefile: build.sh\n    source: git://x\n    makeopts: --shared\n");
        let tools = Tools::default();
        let ctx = BuildContext {
            spec: &spec,
            artifact: Some(&source),
            build_dir: &build_dir,
            fakeroot: Path::new("/w/f"),
            root: Path::new("/p/rel/root"),
            cache_root: Path::new("/c"),
            jobs: 4,
            tools: &tools,
        };
        let runner = MockRunner::new();
        ShBackend.build(&ctx, &runner).unwrap();

        assert!(build_dir.join("configure").exists());
        let call = &runner.calls()[0];
        assert_eq!(call.program(), "bash");
        assert_eq!(call.working_dir(), Some(build_dir.as_path()));
        assert_eq!(
            call.arguments(),
            [
                "/repo/build.sh",
                "--prefix",
                "/p/rel/root",
                "--fakeroot",
                "/w/f",
                "--python",
                "/w/f/p/rel/root/bin/python",
                "--pip",
                "pip",
                "--jobs",
                "4",
                "--cmake",
                "cmake",
                "--shared"
            ]
        );
    }
}
