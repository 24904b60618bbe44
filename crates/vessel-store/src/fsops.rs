use std::fs;
use std::io;
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// Filesystem mutations the installer performs on the shared prefix.
///
/// Implemented directly by [`DirectFs`] and through privilege escalation by
/// the runtime crate, so the installer never needs to know which one it has.
pub trait FsOps: Send + Sync {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Atomically swap two existing paths. Returns `Ok(false)` when the
    /// platform or filesystem cannot do it, in which case nothing changed.
    fn exchange(&self, a: &Path, b: &Path) -> io::Result<bool>;

    /// Remove a directory tree. A missing path is not an error.
    fn remove_tree(&self, path: &Path) -> io::Result<()>;

    /// Copy `from` to the not-yet-existing `to`, preserving symlinks and modes.
    fn copy_tree(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Create `path` and any missing parents.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    fn name(&self) -> &'static str;
}

/// Operations performed with the invoking user's own permissions.
#[derive(Debug, Clone, Copy)]
pub struct DirectFs {
    exchange: bool,
}

impl DirectFs {
    pub fn new() -> Self {
        Self { exchange: true }
    }

    /// Never use the atomic exchange; always fall back to two renames.
    pub fn classic() -> Self {
        Self { exchange: false }
    }
}

impl Default for DirectFs {
    fn default() -> Self {
        Self::new()
    }
}

impl FsOps for DirectFs {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        debug!("rename {} -> {}", from.display(), to.display());
        fs::rename(from, to)
    }

    fn exchange(&self, a: &Path, b: &Path) -> io::Result<bool> {
        if !self.exchange {
            return Ok(false);
        }
        debug!("exchange {} <-> {}", a.display(), b.display());
        rename_exchange(a, b)
    }

    fn remove_tree(&self, path: &Path) -> io::Result<()> {
        debug!("remove {}", path.display());
        match fs::remove_dir_all(path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    fn copy_tree(&self, from: &Path, to: &Path) -> io::Result<()> {
        debug!("copy {} -> {}", from.display(), to.display());
        copy_tree(from, to)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        debug!("mkdir -p {}", path.display());
        fs::create_dir_all(path)
    }

    fn name(&self) -> &'static str {
        "direct"
    }
}

#[cfg(target_os = "linux")]
fn rename_exchange(a: &Path, b: &Path) -> io::Result<bool> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    const RENAME_EXCHANGE: libc::c_uint = 1 << 1;

    let to_cstring = |p: &Path| {
        CString::new(p.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
    };
    let a = to_cstring(a)?;
    let b = to_cstring(b)?;

    // SAFETY: both pointers come from live CStrings that outlive the call,
    // and renameat2 does not retain them.
    #[allow(unsafe_code)]
    let ret = unsafe {
        libc::syscall(
            libc::SYS_renameat2,
            libc::AT_FDCWD,
            a.as_ptr(),
            libc::AT_FDCWD,
            b.as_ptr(),
            RENAME_EXCHANGE,
        )
    };
    if ret == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::ENOSYS | libc::EINVAL | libc::EOPNOTSUPP) => {
            debug!("RENAME_EXCHANGE unsupported here: {err}");
            Ok(false)
        }
        _ => Err(err),
    }
}

#[cfg(not(target_os = "linux"))]
fn rename_exchange(_a: &Path, _b: &Path) -> io::Result<bool> {
    Ok(false)
}

/// Recursively copy a directory tree. Symlinks are recreated, not followed;
/// file and directory modes are preserved.
pub fn copy_tree(from: &Path, to: &Path) -> io::Result<()> {
    let mut dir_modes = Vec::new();

    for entry in WalkDir::new(from).follow_links(false) {
        let entry = entry.map_err(io::Error::other)?;
        let rel = entry
            .path()
            .strip_prefix(from)
            .map_err(io::Error::other)?;
        let dest = to.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&dest)?;
            let mode = entry.metadata().map_err(io::Error::other)?.permissions();
            dir_modes.push((dest, mode));
        } else if file_type.is_symlink() {
            let target = fs::read_link(entry.path())?;
            symlink(target, &dest)?;
        } else {
            fs::copy(entry.path(), &dest)?;
        }
    }

    // Applied last so read-only directories can still be filled.
    for (dir, mode) in dir_modes.into_iter().rev() {
        fs::set_permissions(&dir, fs::Permissions::from_mode(mode.mode()))?;
    }
    Ok(())
}
