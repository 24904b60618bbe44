use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use vessel_schema::{package_key, PackageName, Version};

/// Shared download cache with one directory per `(name, version)`.
///
/// Entries are populated in a temporary sibling and renamed into place, so a
/// reader either sees a complete entry or none at all.
#[derive(Debug, Clone)]
pub struct DownloadCache {
    root: PathBuf,
}

impl DownloadCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn entry(&self, name: &PackageName, version: &Version) -> PathBuf {
        self.root.join(package_key(name, version))
    }

    pub fn contains(&self, name: &PackageName, version: &Version) -> bool {
        self.entry(name, version).is_dir()
    }

    /// Ensure the entry for `(name, version)` exists, running `fill` on an
    /// empty temporary directory when it does not. Returns the entry path.
    ///
    /// When `fill` fails the temporary directory is removed and no entry is
    /// created. If another process published the entry first, its copy wins.
    pub fn populate<E>(
        &self,
        name: &PackageName,
        version: &Version,
        fill: impl FnOnce(&Path) -> Result<(), E>,
    ) -> Result<PathBuf, E>
    where
        E: From<io::Error>,
    {
        let entry = self.entry(name, version);
        if entry.is_dir() {
            debug!("cache hit: {}", entry.display());
            return Ok(entry);
        }

        fs::create_dir_all(&self.root)?;
        let tmp = tempfile::Builder::new()
            .prefix(&format!(".{}.", package_key(name, version)))
            .tempdir_in(&self.root)?;
        fill(tmp.path())?;

        match fs::rename(tmp.path(), &entry) {
            Ok(()) => {
                crate::fsync_dir(&self.root)?;
                debug!("cache populated: {}", entry.display());
            }
            // A concurrent fetch got there first; `tmp` is dropped and removed.
            Err(_) if entry.is_dir() => {
                debug!("cache entry appeared concurrently: {}", entry.display());
            }
            Err(e) => return Err(e.into()),
        }
        Ok(entry)
    }
}
