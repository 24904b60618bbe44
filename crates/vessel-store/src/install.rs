use crate::fsops::FsOps;
use crate::journal::{InstallJournal, InstallRecord, InstallState};
use crate::layout::ReleaseLayout;
use crate::lock::PrefixLock;
use crate::StoreError;
use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("staged release {} does not exist", .0.display())]
    MissingStage(PathBuf),
    #[error("install of '{release}' failed while {step}; the previous release is still live: {source}")]
    PreCutover {
        release: String,
        step: &'static str,
        #[source]
        source: io::Error,
    },
    #[error(
        "install of '{release}' failed and the previous release could not be moved back from {}: {source}; run `vessel recover`",
        .retired.display()
    )]
    RestoreFailed {
        release: String,
        retired: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What recovery found and did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Nothing was pending.
    Nothing,
    /// Leftover `.delete` or hidden trees from a finished install were removed.
    RemovedStrays,
    /// An install interrupted before cutover was undone; the old release is live.
    RolledBack,
    /// An install interrupted after cutover was finished; the new release is live.
    RolledForward,
}

impl std::fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoveryAction::Nothing => write!(f, "nothing to recover"),
            RecoveryAction::RemovedStrays => write!(f, "removed leftover trees"),
            RecoveryAction::RolledBack => write!(f, "rolled back interrupted install"),
            RecoveryAction::RolledForward => write!(f, "completed interrupted install"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    pub live: PathBuf,
    /// The previous release was swapped out with a single atomic exchange.
    pub exchanged: bool,
    /// A previous release existed and was retired.
    pub replaced: bool,
    /// A retired tree that could not be removed.
    pub leftover: Option<PathBuf>,
    pub recovered: RecoveryAction,
}

/// Which of the slot's paths currently exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotStatus {
    pub live: bool,
    pub hidden: bool,
    pub retired: bool,
    pub pending: Option<InstallState>,
}

fn ino_of(path: &Path) -> Option<u64> {
    fs::symlink_metadata(path).ok().map(|m| m.ino())
}

fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Swaps a staged release into `prefix/<release>`.
///
/// Readers of the canonical path see either the complete old tree or the
/// complete new one. The rename of the new tree onto the canonical path (or
/// the exchange with the old one) is the only cutover point; everything
/// before it is undone on failure, everything after it is only reported.
pub struct AtomicInstaller<'a> {
    layout: ReleaseLayout,
    fs: &'a dyn FsOps,
    journal: InstallJournal,
}

impl<'a> AtomicInstaller<'a> {
    pub fn new(layout: ReleaseLayout, fs: &'a dyn FsOps) -> Self {
        let journal = InstallJournal::new(&layout);
        Self {
            layout,
            fs,
            journal,
        }
    }

    #[inline]
    pub fn layout(&self) -> &ReleaseLayout {
        &self.layout
    }

    pub fn observe(&self) -> Result<SlotStatus, StoreError> {
        Ok(SlotStatus {
            live: exists(&self.layout.live()),
            hidden: exists(&self.layout.hidden()),
            retired: exists(&self.layout.retired()),
            pending: self.journal.load()?.map(|r| r.state),
        })
    }

    /// Install the tree at `staged` as the release.
    pub fn install(&self, staged: &Path) -> Result<InstallOutcome, InstallError> {
        if !staged.is_dir() {
            return Err(InstallError::MissingStage(staged.to_path_buf()));
        }
        if !self.prefix_is_dir()? {
            self.fs
                .create_dir_all(self.layout.prefix())
                .map_err(StoreError::Io)?;
            info!("created prefix {}", self.layout.prefix().display());
        }
        let _lock = PrefixLock::acquire_best_effort(&self.layout.lock_file())?;
        let recovered = self.recover_locked()?;

        let live = self.layout.live();
        let hidden = self.layout.hidden();
        let retired = self.layout.retired();
        info!(
            "installing {} into {} via {} operations",
            self.layout.release(),
            self.layout.prefix().display(),
            self.fs.name()
        );

        let mut record = self.journal.begin(&self.layout)?;

        self.fs
            .remove_tree(&hidden)
            .map_err(|e| self.abort("clearing the hidden tree", e))?;
        self.fs
            .copy_tree(staged, &hidden)
            .map_err(|e| self.abort("copying the staged tree", e))?;
        if let Some(rec) = record.as_mut() {
            rec.staged_ino = ino_of(&hidden);
            if let Err(e) = self.journal.advance(rec, InstallState::Staged) {
                let io = io::Error::other(e.to_string());
                return Err(self.abort("journaling the staged tree", io));
            }
        }

        let replaced = exists(&live);
        let mut exchanged = false;
        if replaced {
            match self.fs.exchange(&hidden, &live) {
                Ok(true) => exchanged = true,
                Ok(false) => self.classic_cutover(&mut record)?,
                Err(e) => return Err(self.abort("exchanging the release trees", e)),
            }
        } else {
            self.fs
                .rename(&hidden, &live)
                .map_err(|e| self.abort("activating the new release", e))?;
        }
        self.advance_after_cutover(&mut record, InstallState::Cutover);
        info!("cutover complete: {} is live", live.display());

        let mut leftover = None;
        if exchanged {
            if let Err(e) = self.fs.rename(&hidden, &retired) {
                warn!(
                    "failed to retire previous release at {}: {e}",
                    hidden.display()
                );
                leftover = Some(hidden);
            }
        }
        if leftover.is_none() && exists(&retired) {
            if let Err(e) = self.fs.remove_tree(&retired) {
                warn!("failed to remove {}: {e}", retired.display());
                leftover = Some(retired);
            }
        }
        self.advance_after_cutover(&mut record, InstallState::Complete);
        if let Err(e) = self.journal.clear() {
            warn!("failed to clear install journal: {e}");
        }

        Ok(InstallOutcome {
            live,
            exchanged,
            replaced,
            leftover,
            recovered,
        })
    }

    /// Resume or undo an interrupted install and remove leftover trees.
    pub fn recover(&self) -> Result<RecoveryAction, InstallError> {
        if !self.prefix_is_dir()? {
            debug!("{} does not exist", self.layout.prefix().display());
            return Ok(RecoveryAction::Nothing);
        }
        let _lock = PrefixLock::acquire_best_effort(&self.layout.lock_file())?;
        self.recover_locked()
    }

    /// Whether the prefix exists. A prefix path that is not a directory is
    /// an error.
    fn prefix_is_dir(&self) -> Result<bool, StoreError> {
        let prefix = self.layout.prefix();
        match fs::metadata(prefix) {
            Ok(m) if m.is_dir() => Ok(true),
            Ok(_) => Err(StoreError::NotADirectory {
                path: prefix.display().to_string(),
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn classic_cutover(&self, record: &mut Option<InstallRecord>) -> Result<(), InstallError> {
        let live = self.layout.live();
        let hidden = self.layout.hidden();
        let retired = self.layout.retired();

        self.fs
            .rename(&live, &retired)
            .map_err(|e| self.abort("retiring the previous release", e))?;
        if let Some(rec) = record.as_mut() {
            if let Err(e) = self.journal.advance(rec, InstallState::OldRetired) {
                warn!("failed to journal retirement: {e}");
            }
        }

        if let Err(e) = self.fs.rename(&hidden, &live) {
            return match self.fs.rename(&retired, &live) {
                Ok(()) => Err(self.abort("activating the new release", e)),
                Err(restore) => {
                    warn!("activation failed: {e}");
                    Err(InstallError::RestoreFailed {
                        release: self.layout.release().to_owned(),
                        retired,
                        source: restore,
                    })
                }
            };
        }
        Ok(())
    }

    fn advance_after_cutover(&self, record: &mut Option<InstallRecord>, state: InstallState) {
        if let Some(rec) = record.as_mut() {
            if let Err(e) = self.journal.advance(rec, state) {
                warn!("failed to journal {state}: {e}");
            }
        }
    }

    /// Undo a pre-cutover failure and build the error describing it.
    fn abort(&self, step: &'static str, source: io::Error) -> InstallError {
        let hidden = self.layout.hidden();
        if let Err(e) = self.fs.remove_tree(&hidden) {
            warn!("failed to remove {}: {e}", hidden.display());
        }
        if let Err(e) = self.journal.clear() {
            warn!("failed to clear install journal: {e}");
        }
        InstallError::PreCutover {
            release: self.layout.release().to_owned(),
            step,
            source,
        }
    }

    fn recover_locked(&self) -> Result<RecoveryAction, InstallError> {
        let live = self.layout.live();
        let hidden = self.layout.hidden();
        let retired = self.layout.retired();

        let record = self.journal.load()?;
        let new_ino = record.as_ref().and_then(|r| r.staged_ino);
        if let Some(rec) = &record {
            info!(
                "found interrupted install of {} (op_id={}, state={})",
                rec.release, rec.op_id, rec.state
            );
        }

        let action = if new_ino.is_some() && ino_of(&live) == new_ino {
            self.discard(&hidden)?;
            self.discard_retired(&retired);
            RecoveryAction::RolledForward
        } else if !exists(&live) && exists(&retired) {
            self.discard(&hidden)?;
            self.fs
                .rename(&retired, &live)
                .map_err(|e| InstallError::RestoreFailed {
                    release: self.layout.release().to_owned(),
                    retired: retired.clone(),
                    source: e,
                })?;
            RecoveryAction::RolledBack
        } else {
            let strays = exists(&hidden) || exists(&retired);
            self.discard(&hidden)?;
            self.discard_retired(&retired);
            match (record.is_some(), strays) {
                (true, _) => RecoveryAction::RolledBack,
                (false, true) => RecoveryAction::RemovedStrays,
                (false, false) => RecoveryAction::Nothing,
            }
        };

        self.journal.clear()?;
        if action != RecoveryAction::Nothing {
            info!("recovery of {}: {action}", self.layout.release());
        }
        Ok(action)
    }

    fn discard(&self, path: &Path) -> Result<(), InstallError> {
        if exists(path) {
            debug!("discarding {}", path.display());
            self.fs
                .remove_tree(path)
                .map_err(|e| InstallError::PreCutover {
                    release: self.layout.release().to_owned(),
                    step: "removing a leftover tree",
                    source: e,
                })?;
        }
        Ok(())
    }

    fn discard_retired(&self, retired: &Path) {
        if exists(retired) {
            if let Err(e) = self.fs.remove_tree(retired) {
                warn!("failed to remove {}: {e}", retired.display());
            }
        }
    }
}
