use crate::StoreError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use tracing::{debug, warn};

/// Advisory exclusive lock on one release slot. Released on drop.
pub struct PrefixLock {
    lock_file: File,
}

fn open_lock_file(lock_path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(lock_path)
}

fn unwritable(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::PermissionDenied || e.raw_os_error() == Some(libc::EROFS)
}

impl PrefixLock {
    /// Block until the lock is held.
    pub fn acquire(lock_path: &Path) -> Result<Self, StoreError> {
        let file = open_lock_file(lock_path)?;
        file.lock_exclusive()
            .map_err(|e| StoreError::LockFailed(format!("{}: {e}", lock_path.display())))?;
        debug!("acquired {}", lock_path.display());
        Ok(Self { lock_file: file })
    }

    pub fn try_acquire(lock_path: &Path) -> Result<Option<Self>, StoreError> {
        let file = open_lock_file(lock_path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { lock_file: file })),
            Err(_) => Ok(None),
        }
    }

    /// Like [`acquire`](Self::acquire), but a prefix the invoking user cannot
    /// write to yields `Ok(None)` and a warning instead of an error.
    pub fn acquire_best_effort(lock_path: &Path) -> Result<Option<Self>, StoreError> {
        match open_lock_file(lock_path) {
            Ok(file) => {
                file.lock_exclusive().map_err(|e| {
                    StoreError::LockFailed(format!("{}: {e}", lock_path.display()))
                })?;
                debug!("acquired {}", lock_path.display());
                Ok(Some(Self { lock_file: file }))
            }
            Err(e) if unwritable(&e) => {
                warn!(
                    "cannot create lock {}: {e}; proceeding without it",
                    lock_path.display()
                );
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl PrefixLock {
    /// Whether another process holds the lock. A missing lock file means
    /// nobody does; it is not created.
    pub fn is_held(lock_path: &Path) -> Result<bool, StoreError> {
        let file = match File::open(lock_path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        Ok(FileExt::try_lock_shared(&file).is_err())
    }
}

impl Drop for PrefixLock {
    fn drop(&mut self) {
        let _ = self.lock_file.unlock();
    }
}
