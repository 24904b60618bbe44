use super::{BuildBackend, BuildContext};
use crate::command::{run_checked, CommandSpec, ProcessRunner};
use crate::RuntimeError;
use vessel_schema::BuildMethod;

/// Copies the fetched tree verbatim into the staged root.
pub struct RsyncBackend;

impl BuildBackend for RsyncBackend {
    fn method(&self) -> BuildMethod {
        BuildMethod::Rsync
    }

    fn build(&self, ctx: &BuildContext<'_>, runner: &dyn ProcessRunner) -> Result<(), RuntimeError> {
        let source = ctx.require_artifact()?;
        let cmd = CommandSpec::new(&ctx.tools.rsync)
            .args(["-am", "--exclude=.git"])
            .arg(format!("{}/", source.display()))
            .path_arg(&ctx.staged_root());
        run_checked(runner, &cmd)?;
        Ok(())
    }
}
