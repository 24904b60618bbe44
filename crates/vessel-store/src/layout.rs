use crate::StoreError;
use std::path::{Component, Path, PathBuf};

/// Release names become directory names next to each other in a shared
/// prefix, so they are restricted to a conservative character set.
pub fn validate_release_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty() || name.len() > 128 {
        return Err(StoreError::InvalidName(
            "release name must be 1-128 characters".to_owned(),
        ));
    }
    if name.starts_with('.') {
        return Err(StoreError::InvalidName(
            "release name must not start with '.'".to_owned(),
        ));
    }
    if name.ends_with(".delete") {
        return Err(StoreError::InvalidName(
            "release name must not end with '.delete'".to_owned(),
        ));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'.')
    {
        return Err(StoreError::InvalidName(
            "release name must match [a-zA-Z0-9._-]".to_owned(),
        ));
    }
    Ok(())
}

/// Place an absolute path underneath `base`, DESTDIR style.
///
/// `reroot("/w/fake", "/opt/rel")` is `/w/fake/opt/rel`.
pub fn reroot(base: &Path, path: &Path) -> PathBuf {
    let mut out = base.to_path_buf();
    for component in path.components() {
        match component {
            Component::RootDir | Component::Prefix(_) | Component::CurDir => {}
            other => out.push(other),
        }
    }
    out
}

/// Paths of one release slot inside the shared prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseLayout {
    prefix: PathBuf,
    release: String,
}

impl ReleaseLayout {
    pub fn new(prefix: impl Into<PathBuf>, release: impl Into<String>) -> Result<Self, StoreError> {
        let release = release.into();
        validate_release_name(&release)?;
        Ok(Self {
            prefix: prefix.into(),
            release,
        })
    }

    #[inline]
    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    #[inline]
    pub fn release(&self) -> &str {
        &self.release
    }

    /// `prefix/<release>`: the path readers use.
    #[inline]
    pub fn live(&self) -> PathBuf {
        self.prefix.join(&self.release)
    }

    #[inline]
    pub fn live_root(&self) -> PathBuf {
        self.live().join("root")
    }

    /// `prefix/.<release>`: where the new tree is assembled before cutover.
    #[inline]
    pub fn hidden(&self) -> PathBuf {
        self.prefix.join(format!(".{}", self.release))
    }

    /// `prefix/<release>.delete`: the retired tree awaiting removal.
    #[inline]
    pub fn retired(&self) -> PathBuf {
        self.prefix.join(format!("{}.delete", self.release))
    }

    #[inline]
    pub fn journal_file(&self) -> PathBuf {
        self.prefix.join(format!(".{}.journal", self.release))
    }

    #[inline]
    pub fn lock_file(&self) -> PathBuf {
        self.prefix.join(format!(".{}.lock", self.release))
    }
}

/// Paths of the local build workspace for one release.
///
/// Builds install into a fakeroot that mirrors the final location of the
/// release; the finished tree is then moved to `<workspace>/<release>/root`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceLayout {
    workspace: PathBuf,
    target: ReleaseLayout,
}

impl WorkspaceLayout {
    pub fn new(workspace: impl Into<PathBuf>, target: ReleaseLayout) -> Self {
        Self {
            workspace: workspace.into(),
            target,
        }
    }

    #[inline]
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    #[inline]
    pub fn target(&self) -> &ReleaseLayout {
        &self.target
    }

    /// `<workspace>/<release>`: the staged release, handed to the installer.
    #[inline]
    pub fn staged(&self) -> PathBuf {
        self.workspace.join(self.target.release())
    }

    #[inline]
    pub fn staged_root(&self) -> PathBuf {
        self.staged().join("root")
    }

    #[inline]
    pub fn fakeroot(&self) -> PathBuf {
        self.workspace.join(format!("{}.fakeroot", self.target.release()))
    }

    /// The installed root as seen through the fakeroot.
    #[inline]
    pub fn fakeroot_root(&self) -> PathBuf {
        reroot(&self.fakeroot(), &self.target.live_root())
    }

    /// The release descriptor, `<release>/<release>`.
    #[inline]
    pub fn release_doc(&self) -> PathBuf {
        self.staged().join(self.target.release())
    }

    #[inline]
    pub fn enable_template(&self, file: &str) -> PathBuf {
        self.workspace.join(format!("{file}.in"))
    }
}
