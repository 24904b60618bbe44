//! Release layout, download cache, install journal, and atomic installation for Vessel.
//!
//! This crate owns everything that touches the shared prefix: `ReleaseLayout`
//! and `WorkspaceLayout` name the directories of one release, `DownloadCache`
//! holds fetched artifacts keyed by package and version, `InstallJournal`
//! records an in-flight install, and `AtomicInstaller` swaps a staged tree into
//! the prefix through an `FsOps` implementation.

pub mod cache;
pub mod fsops;
pub mod install;
pub mod journal;
pub mod layout;
pub mod lock;

pub use cache::DownloadCache;
pub use fsops::{copy_tree, DirectFs, FsOps};
pub use install::{AtomicInstaller, InstallError, InstallOutcome, RecoveryAction, SlotStatus};
pub use journal::{InstallJournal, InstallRecord, InstallState};
pub use layout::{reroot, validate_release_name, ReleaseLayout, WorkspaceLayout};
pub use lock::PrefixLock;

use std::path::Path;
use thiserror::Error;

/// Fsync a directory so that a preceding `rename()` is durable.
///
/// POSIX does not promise rename durability without it.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid release name: {0}")]
    InvalidName(String),
    #[error("lock acquisition failed: {0}")]
    LockFailed(String),
    #[error("{path} is not a directory")]
    NotADirectory { path: String },
}
