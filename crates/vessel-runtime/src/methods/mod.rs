//! One build backend per [`BuildMethod`].

mod cmake;
mod noop;
mod pip;
mod rsync;
mod sh;

pub use cmake::CmakeBackend;
pub use noop::NoopBackend;
pub use pip::PipBackend;
pub use rsync::RsyncBackend;
pub use sh::ShBackend;

use crate::command::ProcessRunner;
use crate::env::RuntimeEnv;
use crate::tools::Tools;
use crate::RuntimeError;
use std::path::{Path, PathBuf};
use vessel_schema::{BuildMethod, PackageSpec};
use vessel_store::reroot;

/// Inputs for materializing one package into the download cache.
pub struct FetchContext<'a> {
    pub spec: &'a PackageSpec,
    /// Empty directory to fill; published into the cache afterwards.
    pub dest: &'a Path,
    pub tools: &'a Tools,
}

/// Inputs for building one package into the staging fakeroot.
pub struct BuildContext<'a> {
    pub spec: &'a PackageSpec,
    /// The package's cache entry, when it has one.
    pub artifact: Option<&'a Path>,
    /// Package-scoped scratch directory, created empty by the caller.
    pub build_dir: &'a Path,
    pub fakeroot: &'a Path,
    /// Final location of the installed tree, `prefix/<release>/root`.
    pub root: &'a Path,
    pub cache_root: &'a Path,
    pub jobs: usize,
    pub tools: &'a Tools,
}

impl BuildContext<'_> {
    /// Where `root` lands inside the fakeroot.
    pub fn staged_root(&self) -> PathBuf {
        reroot(self.fakeroot, self.root)
    }

    pub(crate) fn require_artifact(&self) -> Result<&Path, RuntimeError> {
        self.artifact.ok_or_else(|| RuntimeError::MissingInput {
            package: self.spec.name.to_string(),
            version: self.spec.version.to_string(),
            reason: format!("{} build needs a fetched source", self.spec.build_method),
        })
    }
}

/// Inputs for redoing a package against the installed tree after cutover.
pub struct ReinstallContext<'a> {
    pub spec: &'a PackageSpec,
    /// Installed root, `prefix/<release>/root`.
    pub root: &'a Path,
    pub artifact: Option<&'a Path>,
    pub env: &'a RuntimeEnv,
    pub tools: &'a Tools,
    pub sudo: bool,
}

pub trait BuildBackend: Send + Sync {
    fn method(&self) -> BuildMethod;

    /// Fill `ctx.dest` with the package's artifact.
    fn fetch(&self, ctx: &FetchContext<'_>, runner: &dyn ProcessRunner) -> Result<(), RuntimeError> {
        crate::fetch::fetch_artifact(ctx, runner)
    }

    /// Build and install into the fakeroot. Must not write outside
    /// `ctx.build_dir` and `ctx.fakeroot`.
    fn build(&self, ctx: &BuildContext<'_>, runner: &dyn ProcessRunner) -> Result<(), RuntimeError>;

    /// Redo the install against the live tree so that embedded interpreter
    /// paths point into it. Returns whether anything was run.
    fn reinstall_against(
        &self,
        _ctx: &ReinstallContext<'_>,
        _runner: &dyn ProcessRunner,
    ) -> Result<bool, RuntimeError> {
        Ok(false)
    }
}

pub fn select_method(method: BuildMethod) -> &'static dyn BuildBackend {
    match method {
        BuildMethod::Cmake => &CmakeBackend,
        BuildMethod::Pip => &PipBackend,
        BuildMethod::Sh => &ShBackend,
        BuildMethod::Rsync => &RsyncBackend,
        BuildMethod::Noop => &NoopBackend,
    }
}
