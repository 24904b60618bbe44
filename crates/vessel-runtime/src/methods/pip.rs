use super::{BuildBackend, BuildContext, ReinstallContext};
use crate::command::{run_checked, CommandSpec, ProcessRunner};
use crate::RuntimeError;
use tracing::debug;
use vessel_schema::{BuildMethod, PackageSpec};

/// Installs a downloaded distribution with pip, never resolving dependencies
/// and never touching the network.
pub struct PipBackend;

fn requirement(spec: &PackageSpec) -> String {
    format!("{}=={}", spec.name, spec.version.pip_version())
}

impl PipBackend {
    fn install_command(ctx: &BuildContext<'_>) -> Result<CommandSpec, RuntimeError> {
        let artifact = ctx.require_artifact()?;
        Ok(CommandSpec::new(&ctx.tools.pip)
            .arg("install")
            .arg(requirement(ctx.spec))
            .arg("--root")
            .path_arg(ctx.fakeroot)
            .arg("--prefix")
            .path_arg(ctx.root)
            .args(["--no-index", "--no-deps", "--ignore-installed", "--cache-dir"])
            .path_arg(ctx.cache_root)
            .arg("--find-links")
            .path_arg(artifact)
            .args(ctx.spec.build_options.iter().cloned()))
    }

    pub(crate) fn reinstall_command(ctx: &ReinstallContext<'_>) -> Result<CommandSpec, RuntimeError> {
        let artifact = ctx.artifact.ok_or_else(|| RuntimeError::MissingInput {
            package: ctx.spec.name.to_string(),
            version: ctx.spec.version.to_string(),
            reason: "reinstall needs the downloaded distribution".to_owned(),
        })?;
        Ok(CommandSpec::new(&ctx.tools.pip)
            .arg("install")
            .arg(requirement(ctx.spec))
            .arg("--prefix")
            .path_arg(ctx.root)
            .args(["--force-reinstall", "--no-index", "--no-deps", "--find-links"])
            .path_arg(artifact)
            .args(ctx.spec.build_options.iter().cloned())
            .runtime_env(ctx.env)
            .sudo(ctx.sudo))
    }
}

impl BuildBackend for PipBackend {
    fn method(&self) -> BuildMethod {
        BuildMethod::Pip
    }

    fn build(&self, ctx: &BuildContext<'_>, runner: &dyn ProcessRunner) -> Result<(), RuntimeError> {
        run_checked(runner, &Self::install_command(ctx)?)?;
        Ok(())
    }

    fn reinstall_against(
        &self,
        ctx: &ReinstallContext<'_>,
        runner: &dyn ProcessRunner,
    ) -> Result<bool, RuntimeError> {
        debug!("reinstalling {} against {}", ctx.spec.name, ctx.root.display());
        run_checked(runner, &Self::reinstall_command(ctx)?)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::RuntimeEnv;
    use crate::methods::test_support::spec;
    use crate::mock::MockRunner;
    use crate::tools::Tools;
    use std::collections::BTreeMap;
    use std::path::Path;

    #[test]
    fn build_installs_into_fakeroot_offline() {
        let spec = spec("    make: pip\n    makeopts: --no-compile\n");
        let tools = Tools::default();
        let ctx = BuildContext {
            spec: &spec,
            artifact: Some(Path::new("/c/pkg-1.0")),
            build_dir: Path::new("/t/pkg-1.0"),
            fakeroot: Path::new("/w/rel.fakeroot"),
            root: Path::new("/p/rel/root"),
            cache_root: Path::new("/c"),
            jobs: 1,
            tools: &tools,
        };
        let runner = MockRunner::new();
        PipBackend.build(&ctx, &runner).unwrap();
        assert_eq!(
            runner.command_lines(),
            vec![
                "pip install pkg==1.0 --root /w/rel.fakeroot --prefix /p/rel/root --no-index --no-deps --ignore-installed --cache-dir /c --find-links /c/pkg-1.0 --no-compile"
            ]
        );
    }

    #[test]
    fn reinstall_runs_with_runtime_env() {
        let spec = spec("    make: pip\n");
        let tools = Tools::default();
        let env = RuntimeEnv::for_installed_root(Path::new("/p/rel/root"), "3.8", &BTreeMap::new());
        let ctx = ReinstallContext {
            spec: &spec,
            root: Path::new("/p/rel/root"),
            artifact: Some(Path::new("/c/pkg-1.0")),
            env: &env,
            tools: &tools,
            sudo: false,
        };
        let runner = MockRunner::new();
        assert!(PipBackend.reinstall_against(&ctx, &runner).unwrap());

        let call = &runner.calls()[0];
        assert_eq!(
            call.arguments(),
            [
                "install",
                "pkg==1.0",
                "--prefix",
                "/p/rel/root",
                "--force-reinstall",
                "--no-index",
                "--no-deps",
                "--find-links",
                "/c/pkg-1.0"
            ]
        );
        assert_eq!(
            call.env_vars().get("PATH").map(String::as_str),
            Some("/p/rel/root/bin")
        );
    }

    #[test]
    fn reinstall_with_sudo_wraps_argv() {
        let spec = spec("    make: pip\n");
        let tools = Tools::default();
        let env = RuntimeEnv::default().with("PATH", "/r/bin");
        let ctx = ReinstallContext {
            spec: &spec,
            root: Path::new("/r"),
            artifact: Some(Path::new("/c/pkg-1.0")),
            env: &env,
            tools: &tools,
            sudo: true,
        };
        let cmd = PipBackend::reinstall_command(&ctx).unwrap();
        assert_eq!(&cmd.argv()[..4], ["sudo", "env", "PATH=/r/bin", "pip"]);
    }
}
