//! Locally cached artifacts

use std::path::{Path, PathBuf};

/// What kind of filesystem object satisfies an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// An executable file
    Binary,
    /// A non-empty directory (exported packages)
    Directory,
}

/// A versioned artifact at a known local path
///
/// Presence is always read from the filesystem, never remembered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRecord {
    pub name: String,
    pub version: String,
    pub path: PathBuf,
    pub kind: ArtifactKind,
}

impl ArtifactRecord {
    pub fn binary(name: impl Into<String>, version: impl Into<String>, path: PathBuf) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            path,
            kind: ArtifactKind::Binary,
        }
    }

    pub fn directory(name: impl Into<String>, version: impl Into<String>, path: PathBuf) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            path,
            kind: ArtifactKind::Directory,
        }
    }

    /// The path exists
    pub fn is_present(&self) -> bool {
        self.path.exists()
    }

    /// The path exists and is usable: executable for binaries, non-empty for directories
    pub fn is_satisfied(&self) -> bool {
        match self.kind {
            ArtifactKind::Binary => self.path.is_file() && is_executable(&self.path),
            ArtifactKind::Directory => std::fs::read_dir(&self.path)
                .map(|mut entries| entries.next().is_some())
                .unwrap_or(false),
        }
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Add the owner execute bit to a file
#[cfg(unix)]
pub(crate) fn mark_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = std::fs::metadata(path)?.permissions();
    permissions.set_mode(permissions.mode() | 0o100);
    std::fs::set_permissions(path, permissions)
}

#[cfg(not(unix))]
pub(crate) fn mark_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
