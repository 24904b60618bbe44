use crate::layout::ReleaseLayout;
use crate::StoreError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Progress of an install, in the order the steps happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallState {
    /// Copying the staged tree into the hidden sibling.
    Staging,
    /// The hidden sibling holds the complete new tree.
    Staged,
    /// The previous release was renamed aside; the canonical path is empty.
    OldRetired,
    /// The canonical path holds the new tree.
    Cutover,
    /// The retired tree is gone.
    Complete,
}

impl std::fmt::Display for InstallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstallState::Staging => write!(f, "staging"),
            InstallState::Staged => write!(f, "staged"),
            InstallState::OldRetired => write!(f, "old-retired"),
            InstallState::Cutover => write!(f, "cutover"),
            InstallState::Complete => write!(f, "complete"),
        }
    }
}

/// A persisted in-flight install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallRecord {
    pub op_id: String,
    pub release: String,
    pub prefix: PathBuf,
    pub state: InstallState,
    /// Inode of the new tree, known once staging completed. Renames keep it,
    /// so it identifies the new tree under whichever name it ended up.
    pub staged_ino: Option<u64>,
    pub started_at: String,
    pub updated_at: String,
}

/// Journal of the install currently running against one release slot.
///
/// The installer writes a record before touching the prefix, updates it as
/// each step lands, and removes it on completion. A record left behind means
/// the install was interrupted.
pub struct InstallJournal {
    path: PathBuf,
}

impl InstallJournal {
    pub fn new(layout: &ReleaseLayout) -> Self {
        Self {
            path: layout.journal_file(),
        }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start a record for `layout`. Returns `Ok(None)` when the prefix does not
    /// let us write the journal; the install then runs unjournaled.
    pub fn begin(&self, layout: &ReleaseLayout) -> Result<Option<InstallRecord>, StoreError> {
        let now = chrono::Utc::now();
        let record = InstallRecord {
            op_id: format!(
                "{}-{}",
                now.format("%Y%m%d%H%M%S%3f"),
                &blake3::hash(layout.release().as_bytes()).to_hex()[..8]
            ),
            release: layout.release().to_owned(),
            prefix: layout.prefix().to_path_buf(),
            state: InstallState::Staging,
            staged_ino: None,
            started_at: now.to_rfc3339(),
            updated_at: now.to_rfc3339(),
        };
        match self.write(&record) {
            Ok(()) => {
                debug!("journal begin: {} (op_id={})", record.release, record.op_id);
                Ok(Some(record))
            }
            Err(StoreError::Io(e)) if e.kind() == io::ErrorKind::PermissionDenied => {
                warn!(
                    "cannot write install journal {}: {e}; continuing without one",
                    self.path.display()
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub fn advance(&self, record: &mut InstallRecord, state: InstallState) -> Result<(), StoreError> {
        record.state = state;
        record.updated_at = chrono::Utc::now().to_rfc3339();
        self.write(record)?;
        debug!("journal {}: {state}", record.op_id);
        Ok(())
    }

    /// Read the pending record, if any. A corrupt record is removed and
    /// treated as absent.
    pub fn load(&self) -> Result<Option<InstallRecord>, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&content) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!("corrupt install journal {}: {e}", self.path.display());
                let _ = fs::remove_file(&self.path);
                Ok(None)
            }
        }
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("journal cleared: {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, record: &InstallRecord) -> Result<(), StoreError> {
        let dir = self.path.parent().unwrap_or(Path::new("."));
        let content = serde_json::to_string_pretty(record)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| StoreError::Io(e.error))?;
        crate::fsync_dir(dir)?;
        Ok(())
    }
}
