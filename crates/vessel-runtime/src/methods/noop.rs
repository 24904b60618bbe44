use super::{BuildBackend, BuildContext};
use crate::command::ProcessRunner;
use crate::RuntimeError;
use tracing::debug;
use vessel_schema::BuildMethod;

/// Packages that exist only to be recorded in the release descriptor.
pub struct NoopBackend;

impl BuildBackend for NoopBackend {
    fn method(&self) -> BuildMethod {
        BuildMethod::Noop
    }

    fn build(&self, ctx: &BuildContext<'_>, _runner: &dyn ProcessRunner) -> Result<(), RuntimeError> {
        debug!("{} {}: nothing to build", ctx.spec.name, ctx.spec.version);
        Ok(())
    }
}
