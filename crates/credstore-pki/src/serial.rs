//! Per-authority serial number trackers.
//!
//! The tracker file holds the next serial to hand out, as uppercase hex
//! followed by a newline.

use credstore_core::fs::{write_verified, FileMode};
use credstore_core::{CredError, Result};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Monotonic serial counter backed by a file.
#[derive(Debug, Clone)]
pub struct SerialCounter {
    path: PathBuf,
    next: u64,
}

impl SerialCounter {
    /// First serial handed out by a fresh authority.
    pub const INITIAL: u64 = 0x1000;

    /// Counter for a brand new authority; nothing is read from disk.
    pub fn fresh(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            next: Self::INITIAL,
        }
    }

    /// Read the counter from disk. A missing tracker restarts at [`Self::INITIAL`].
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let next = match std::fs::read_to_string(&path) {
            Ok(content) => u64::from_str_radix(content.trim(), 16)
                .map_err(|e| CredError::cert_parse(&path, format!("invalid serial: {e}")))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "serial tracker missing, restarting");
                Self::INITIAL
            }
            Err(e) => return Err(CredError::io(&path, e)),
        };
        Ok(Self { path, next })
    }

    /// Hand out the next serial.
    pub fn allocate(&mut self) -> u64 {
        let serial = self.next;
        self.next = self.next.saturating_add(1);
        serial
    }

    pub const fn peek(&self) -> u64 {
        self.next
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the counter atomically.
    pub fn persist(&self) -> Result<()> {
        let content = format!("{:X}\n", self.next);
        write_verified(&self.path, content.as_bytes(), FileMode::Public)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_serials_are_monotonic_across_loads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("intermediate-ca.serial");

        let mut counter = SerialCounter::fresh(&path);
        assert_eq!(counter.allocate(), 0x1000);
        assert_eq!(counter.allocate(), 0x1001);
        counter.persist().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1002\n");

        let mut reloaded = SerialCounter::load(&path).unwrap();
        assert_eq!(reloaded.allocate(), 0x1002);
    }

    #[test]
    fn test_missing_tracker_restarts() {
        let dir = TempDir::new().unwrap();
        let counter = SerialCounter::load(dir.path().join("none.serial")).unwrap();
        assert_eq!(counter.peek(), SerialCounter::INITIAL);
    }

    #[test]
    fn test_corrupt_tracker_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("root-ca.serial");
        std::fs::write(&path, "zz\n").unwrap();
        assert!(SerialCounter::load(&path).is_err());
    }
}
