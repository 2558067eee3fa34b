//! Advisory lock around runs that mutate the store.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{CredError, Result};
use crate::layout::StoreLayout;

/// Held for the duration of a mutating run; the lock file is removed on drop.
#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
}

impl StoreLock {
    /// Create the lock file exclusively, failing with [`CredError::Locked`] if it exists.
    pub fn acquire(layout: &StoreLayout) -> Result<Self> {
        fs::create_dir_all(layout.root()).map_err(|e| CredError::io(layout.root(), e))?;
        let path = layout.lock_path();

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let holder = fs::read_to_string(&path)
                    .ok()
                    .and_then(|content| content.trim().parse().ok());
                return Err(CredError::Locked { path, holder });
            }
            Err(e) => return Err(CredError::io(&path, e)),
        };
        writeln!(file, "{}", std::process::id()).map_err(|e| CredError::io(&path, e))?;

        debug!(path = %path.display(), "acquired store lock");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to release store lock");
        }
    }
}
