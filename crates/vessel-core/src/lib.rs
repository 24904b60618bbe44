//! Release pipeline orchestration for Vessel.
//!
//! This crate ties together manifest resolution, the download cache, the
//! per-method build backends and the atomic installer into the release
//! pipeline: fetch, dependency-ordered parallel builds into a staging
//! fakeroot, environment capture, cutover, and the post-cutover fixups
//! (interpreter reinstalls, shebang rewriting, shims, post-install hook).

pub mod builder;
pub mod capture;
pub mod concurrency;
pub mod config;
pub mod fetcher;
pub mod fixup;
pub mod graph;
pub mod pipeline;

pub use builder::{build_all, BuildSettings, BuildSummary};
pub use capture::{capture_environment, render_template, CaptureReport, ENABLE_SCRIPTS};
pub use concurrency::{check_shutdown, install_signal_handler, shutdown_requested};
pub use config::{default_config_path, Settings, DEFAULT_PYVER};
pub use fetcher::{artifact_path, fetch_all, FetchSummary};
pub use fixup::{run_fixups, FixupFailure, FixupInputs, FixupPolicy, FixupReport, FixupStep};
pub use graph::DependencyGraph;
pub use pipeline::{
    interpreter_version, load_plan, recover_release, run_release, InstallSummary, PhaseSelection,
    ReleaseOptions, ReleaseReport, Stage,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("manifest error: {0}")]
    Manifest(#[from] vessel_schema::ManifestError),
    #[error("resolution error: {0}")]
    Resolution(#[from] vessel_schema::ResolutionError),
    #[error("fetch of {package} {version} failed: {source}")]
    Fetch {
        package: String,
        version: String,
        #[source]
        source: vessel_runtime::RuntimeError,
    },
    #[error("build of {package} {version} failed: {source}")]
    Build {
        package: String,
        version: String,
        #[source]
        source: vessel_runtime::RuntimeError,
    },
    #[error("install error: {0}")]
    Install(#[from] vessel_store::InstallError),
    #[error("store error: {0}")]
    Store(#[from] vessel_store::StoreError),
    #[error("runtime error: {0}")]
    Runtime(#[from] vessel_runtime::RuntimeError),
    #[error("config error: {path}: {message}")]
    Config { path: String, message: String },
    #[error("dependency cycle between: {0}")]
    Cycle(String),
    #[error("interrupted before {0}")]
    Interrupted(&'static str),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
