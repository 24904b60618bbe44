use super::{BuildBackend, BuildContext};
use crate::command::{run_checked, CommandSpec, ProcessRunner};
use crate::RuntimeError;
use vessel_schema::BuildMethod;

/// Out-of-tree CMake configure, `make -j<N>`, then `make install` under DESTDIR.
pub struct CmakeBackend;

impl CmakeBackend {
    fn commands(ctx: &BuildContext<'_>) -> Result<Vec<CommandSpec>, RuntimeError> {
        let source = ctx.require_artifact()?;
        let configure = CommandSpec::new(&ctx.tools.cmake)
            .path_arg(source)
            .arg(format!("-DCMAKE_INSTALL_PREFIX={}", ctx.root.display()))
            .arg("-DCMAKE_BUILD_TYPE=Release")
            .args(ctx.spec.build_options.iter().cloned())
            .cwd(ctx.build_dir);
        let make = CommandSpec::new(&ctx.tools.make)
            .arg(format!("-j{}", ctx.jobs.max(1)))
            .cwd(ctx.build_dir);
        let install = CommandSpec::new(&ctx.tools.make)
            .arg("install")
            .arg(format!("DESTDIR={}", ctx.fakeroot.display()))
            .cwd(ctx.build_dir);
        Ok(vec![configure, make, install])
    }
}

impl BuildBackend for CmakeBackend {
    fn method(&self) -> BuildMethod {
        BuildMethod::Cmake
    }

    fn build(&self, ctx: &BuildContext<'_>, runner: &dyn ProcessRunner) -> Result<(), RuntimeError> {
        for cmd in Self::commands(ctx)? {
            run_checked(runner, &cmd)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::methods::test_support::spec;
    use crate::mock::MockRunner;
    use crate::tools::Tools;
    use std::path::Path;

    #[test]
    fn configure_make_install_in_build_dir() {
        let spec = spec("    make: cmake\n    source: git://x\n    makeopts: -DFOO=ON\n");
        let tools = Tools::default();
        let ctx = BuildContext {
            spec: &spec,
            artifact: Some(Path::new("/c/pkg-1.0")),
            build_dir: Path::new("/t/pkg-1.0-build"),
            fakeroot: Path::new("/w/rel.fakeroot"),
            root: Path::new("/p/rel/root"),
            cache_root: Path::new("/c"),
            jobs: 8,
            tools: &tools,
        };
        let runner = MockRunner::new();
        CmakeBackend.build(&ctx, &runner).unwrap();
        assert_eq!(
            runner.command_lines(),
            vec![
                "cd /t/pkg-1.0-build && cmake /c/pkg-1.0 -DCMAKE_INSTALL_PREFIX=/p/rel/root -DCMAKE_BUILD_TYPE=Release -DFOO=ON",
                "cd /t/pkg-1.0-build && make -j8",
                "cd /t/pkg-1.0-build && make install DESTDIR=/w/rel.fakeroot",
            ]
        );
    }

    #[test]
    fn stops_at_first_failing_step() {
        let spec = spec("    make: cmake\n    source: git://x\n");
        let tools = Tools::default();
        let ctx = BuildContext {
            spec: &spec,
            artifact: Some(Path::new("/c/pkg-1.0")),
            build_dir: Path::new("/t/b"),
            fakeroot: Path::new("/w/f"),
            root: Path::new("/p/r/root"),
            cache_root: Path::new("/c"),
            jobs: 0,
            tools: &tools,
        };
        let runner = MockRunner::new().failing_on("make -j1");
        assert!(CmakeBackend.build(&ctx, &runner).is_err());
        assert_eq!(runner.call_count(), 2);
    }
}
