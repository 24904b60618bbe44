use crate::command::{run_checked, CommandSpec, ProcessRunner};
use crate::methods::FetchContext;
use crate::RuntimeError;
use tracing::debug;
use vessel_schema::{FetchKind, PackageSpec};

/// The command that materializes `spec` into `ctx.dest`, if it has a source.
pub fn fetch_command(ctx: &FetchContext<'_>) -> Result<Option<CommandSpec>, RuntimeError> {
    let spec = ctx.spec;
    match spec.fetch {
        None => Ok(None),
        Some(FetchKind::Git) => {
            let source = spec.source.as_deref().ok_or_else(|| missing(spec, "git fetch without a source"))?;
            Ok(Some(
                CommandSpec::new(&ctx.tools.git)
                    .args(["clone", "-b", spec.version.as_str(), "-q", "--recursive", "--"])
                    .arg(source)
                    .path_arg(ctx.dest),
            ))
        }
        Some(FetchKind::Pip) => Ok(Some(
            CommandSpec::new(&ctx.tools.pip)
                .arg("download")
                .arg(format!("{}=={}", spec.name, spec.version.pip_version()))
                .args(["--no-deps", "--dest"])
                .path_arg(ctx.dest),
        )),
    }
}

/// Populate `ctx.dest` with the package's source or distribution. Packages
/// without a fetch strategy produce nothing.
pub fn fetch_artifact(
    ctx: &FetchContext<'_>,
    runner: &dyn ProcessRunner,
) -> Result<(), RuntimeError> {
    match fetch_command(ctx)? {
        Some(cmd) => {
            debug!("fetching {} {}", ctx.spec.name, ctx.spec.version);
            run_checked(runner, &cmd)?;
            Ok(())
        }
        None => Ok(()),
    }
}

fn missing(spec: &PackageSpec, reason: &str) -> RuntimeError {
    RuntimeError::MissingInput {
        package: spec.name.to_string(),
        version: spec.version.to_string(),
        reason: reason.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRunner;
    use crate::tools::Tools;
    use std::path::Path;
    use vessel_schema::parse_catalogue_str;

    fn spec(yaml: &str, name: &str, version: &str) -> PackageSpec {
        parse_catalogue_str(yaml, None)
            .unwrap()
            .get(name, version)
            .unwrap()
            .clone()
    }

    #[test]
    fn git_clones_version_as_branch() {
        let spec = spec(
            "ecl:\n  \"2.9.1\":\n    maintainer: a@x\n    make: cmake\n    source: https://example.com/ecl\n",
            "ecl",
            "2.9.1",
        );
        let tools = Tools::default();
        let ctx = FetchContext {
            spec: &spec,
            dest: Path::new("/cache/.ecl-2.9.1.tmp"),
            tools: &tools,
        };
        let cmd = fetch_command(&ctx).unwrap().unwrap();
        assert_eq!(
            cmd.argv(),
            vec![
                "git",
                "clone",
                "-b",
                "2.9.1",
                "-q",
                "--recursive",
                "--",
                "https://example.com/ecl",
                "/cache/.ecl-2.9.1.tmp"
            ]
        );
    }

    #[test]
    fn pip_downloads_without_dependencies() {
        let spec = spec(
            "numpy:\n  \"1.19.2+py3\":\n    maintainer: a@x\n    make: pip\n    source: pypi\n",
            "numpy",
            "1.19.2+py3",
        );
        let tools = Tools {
            pip: "/opt/py/bin/pip".to_owned(),
            ..Tools::default()
        };
        let ctx = FetchContext {
            spec: &spec,
            dest: Path::new("/d"),
            tools: &tools,
        };
        let runner = MockRunner::new();
        fetch_artifact(&ctx, &runner).unwrap();
        assert_eq!(
            runner.command_lines(),
            vec!["/opt/py/bin/pip download numpy==1.19.2 --no-deps --dest /d"]
        );
    }

    #[test]
    fn local_package_fetches_nothing() {
        let spec = spec("meta:\n  \"1\":\n    maintainer: a@x\n    make: noop\n", "meta", "1");
        let tools = Tools::default();
        let ctx = FetchContext {
            spec: &spec,
            dest: Path::new("/d"),
            tools: &tools,
        };
        let runner = MockRunner::new();
        fetch_artifact(&ctx, &runner).unwrap();
        assert_eq!(runner.call_count(), 0);
    }
}
