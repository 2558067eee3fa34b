//! Atomic, permission-aware file writes.
//!
//! Every artifact is written to a temporary file in the destination
//! directory and renamed into place, so a crash leaves either the old
//! file or the new one, never a truncated one.

use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::debug;

use crate::error::{CredError, Result};

/// Permission class of a managed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    /// Owner read/write only (secrets, private keys)
    Private,
    /// World-readable, owner-writable (certificates, bundles, serials)
    Public,
}

impl FileMode {
    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            Self::Private => 0o600,
            Self::Public => 0o644,
        }
    }
}

/// Write `contents` to `path` atomically with the given mode.
///
/// Private files never exist on disk with wider permissions than 0600,
/// not even transiently.
pub fn write_atomic(path: &Path, contents: &[u8], mode: FileMode) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| CredError::write_verification(path, "path has no parent directory"))?;
    fs::create_dir_all(parent).map_err(|e| CredError::io(parent, e))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".tmp-")
        .tempfile_in(parent)
        .map_err(|e| CredError::io(parent, e))?;

    set_mode(tmp.path(), FileMode::Private)?;
    tmp.write_all(contents).map_err(|e| CredError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| CredError::io(tmp.path(), e))?;
    if mode != FileMode::Private {
        set_mode(tmp.path(), mode)?;
    }

    tmp.persist(path).map_err(|e| CredError::io(path, e.error))?;
    debug!(path = %path.display(), mode = %format!("{:o}", mode.bits()), "wrote file");
    Ok(())
}

/// Check that `path` exists, is non-empty and holds exactly `expected_len` bytes.
pub fn verify_written(path: &Path, expected_len: usize) -> Result<()> {
    let meta = fs::metadata(path)
        .map_err(|_| CredError::write_verification(path, "file is missing after write"))?;
    let len = usize::try_from(meta.len()).unwrap_or(usize::MAX);
    if len == 0 {
        return Err(CredError::write_verification(path, "file is empty after write"));
    }
    if len != expected_len {
        return Err(CredError::write_verification(
            path,
            format!("expected {expected_len} bytes, found {len}"),
        ));
    }
    Ok(())
}

/// Atomic write followed by a size check.
pub fn write_verified(path: &Path, contents: &[u8], mode: FileMode) -> Result<()> {
    write_atomic(path, contents, mode)?;
    verify_written(path, contents.len())
}

/// Permission bits (`0o777` mask) of a file.
#[cfg(unix)]
pub fn mode_of(path: &Path) -> Result<u32> {
    use std::os::unix::fs::PermissionsExt;
    let meta = fs::metadata(path).map_err(|e| CredError::io(path, e))?;
    Ok(meta.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
pub fn mode_of(path: &Path) -> Result<u32> {
    fs::metadata(path).map_err(|e| CredError::io(path, e))?;
    Ok(FileMode::Private.bits())
}

#[cfg(unix)]
pub fn set_mode(path: &Path, mode: FileMode) -> Result<()> {
    set_mode_bits(path, mode.bits())
}

#[cfg(not(unix))]
pub fn set_mode(_path: &Path, _mode: FileMode) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
pub fn set_mode_bits(path: &Path, bits: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(bits)).map_err(|e| CredError::io(path, e))
}

#[cfg(not(unix))]
pub fn set_mode_bits(_path: &Path, _bits: u32) -> Result<()> {
    Ok(())
}

/// True if `dir` is missing or holds no entries.
pub fn is_empty_dir(dir: &Path) -> Result<bool> {
    match fs::read_dir(dir) {
        Ok(mut entries) => Ok(entries.next().is_none()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
        Err(e) => Err(CredError::io(dir, e)),
    }
}

/// Remove a directory tree if it exists.
pub fn remove_dir_if_exists(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CredError::io(dir, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_atomic_private() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("keys/secret.txt");
        write_verified(&path, b"hunter2hunter2", FileMode::Private).unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"hunter2hunter2");
        #[cfg(unix)]
        assert_eq!(mode_of(&path).unwrap(), 0o600);
    }

    #[test]
    fn test_write_atomic_public_replaces() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ca.crt");
        write_atomic(&path, b"old", FileMode::Public).unwrap();
        write_atomic(&path, b"new contents", FileMode::Public).unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"new contents");
        #[cfg(unix)]
        assert_eq!(mode_of(&path).unwrap(), 0o644);

        // No temp files left behind
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn test_verify_written_detects_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("short.txt");
        fs::write(&path, b"abc").unwrap();

        assert!(verify_written(&path, 3).is_ok());
        let err = verify_written(&path, 10).unwrap_err();
        assert!(matches!(err, CredError::WriteVerificationFailure { .. }));

        let missing = verify_written(&dir.path().join("nope"), 1).unwrap_err();
        assert!(matches!(missing, CredError::WriteVerificationFailure { .. }));
    }

    #[test]
    fn test_is_empty_dir() {
        let dir = TempDir::new().unwrap();
        assert!(is_empty_dir(&dir.path().join("missing")).unwrap());
        assert!(is_empty_dir(dir.path()).unwrap());
        fs::write(dir.path().join("x"), b"1").unwrap();
        assert!(!is_empty_dir(dir.path()).unwrap());
    }
}
