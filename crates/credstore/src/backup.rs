//! Snapshots of `keys/` and `certs/`.
//!
//! A snapshot is copied into `.backup-<id>.partial` and renamed to
//! `backup-<id>` once complete, so an interrupted snapshot is never
//! listed or restored.

use chrono::{DateTime, NaiveDateTime, Utc};
use credstore_core::fs::{is_empty_dir, remove_dir_if_exists, set_mode, FileMode};
use credstore_core::layout::{BACKUP_PREFIX, CERTS_DIR, KEYS_DIR};
use credstore_core::{CredError, Result, StoreLayout};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const ID_FORMAT: &str = "%Y%m%d_%H%M%S";

/// One finished snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupInfo {
    pub id: String,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub key_count: usize,
    pub cert_count: usize,
    #[serde(skip)]
    sequence: u32,
}

/// Asks the operator to approve a destructive step.
pub trait Confirmer {
    fn confirm(&self, prompt: &str) -> Result<bool>;
}

/// Result of a restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub backup: BackupInfo,
    /// False if the snapshot was kept after restoring
    pub consumed: bool,
}

/// Parse `YYYYMMDD_HHMMSS_mmm[-N]`.
fn parse_id(id: &str) -> Option<(DateTime<Utc>, u32)> {
    let (stamp, sequence) = match id.split_once('-') {
        Some((stamp, n)) => (stamp, n.parse().ok()?),
        None => (id, 0),
    };
    let (seconds, millis) = stamp.rsplit_once('_')?;
    let millis: i64 = millis.parse().ok()?;
    let naive = NaiveDateTime::parse_from_str(seconds, ID_FORMAT).ok()?;
    let at = naive.and_utc() + chrono::Duration::milliseconds(millis);
    Some((at, sequence))
}

fn count_files(dir: &Path) -> usize {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_file())
        .count()
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

/// Copy a directory tree, skipping hidden entries (staging and temp files).
fn copy_tree(from: &Path, to: &Path) -> Result<usize> {
    let mut copied = 0;
    for entry in WalkDir::new(from).into_iter().filter_entry(|e| !is_hidden(e)) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(from).to_path_buf();
            CredError::io(&path, std::io::Error::other(e.to_string()))
        })?;
        let relative = entry.path().strip_prefix(from).unwrap_or(entry.path());
        let target = to.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| CredError::io(&target, e))?;
        } else if entry.file_type().is_file() {
            fs::copy(entry.path(), &target).map_err(|e| CredError::io(entry.path(), e))?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Reset modes after a restore: private for keys, public for certificates.
fn reapply_modes(layout: &StoreLayout) -> Result<()> {
    for entry in WalkDir::new(layout.keys_dir()).into_iter().filter_map(std::result::Result::ok) {
        if entry.file_type().is_file() {
            set_mode(entry.path(), FileMode::Private)?;
        }
    }
    for entry in WalkDir::new(layout.certs_dir()).into_iter().filter_map(std::result::Result::ok) {
        if entry.file_type().is_file() {
            let private = entry.path().extension().is_some_and(|ext| ext == "key");
            set_mode(
                entry.path(),
                if private { FileMode::Private } else { FileMode::Public },
            )?;
        }
    }
    Ok(())
}

/// Creates, lists, restores and deletes snapshots.
#[derive(Debug)]
pub struct BackupManager<'a> {
    layout: &'a StoreLayout,
}

impl<'a> BackupManager<'a> {
    pub const fn new(layout: &'a StoreLayout) -> Self {
        Self { layout }
    }

    fn store_is_empty(&self) -> Result<bool> {
        Ok(is_empty_dir(&self.layout.keys_dir())? && is_empty_dir(&self.layout.certs_dir())?)
    }

    fn next_id(&self) -> String {
        let base = Utc::now().format("%Y%m%d_%H%M%S_%3f").to_string();
        let taken = |id: &str| {
            self.layout.backup_dir(id).exists() || self.layout.partial_backup_dir(id).exists()
        };
        if !taken(&base) {
            return base;
        }
        let mut n = 1u32;
        loop {
            let id = format!("{base}-{n}");
            if !taken(&id) {
                return id;
            }
            n += 1;
        }
    }

    /// Copy the live store into a new snapshot. `None` if there is nothing to copy.
    pub fn snapshot(&self) -> Result<Option<BackupInfo>> {
        if self.store_is_empty()? {
            info!("store is empty, no backup needed");
            return Ok(None);
        }

        let id = self.next_id();
        let partial = self.layout.partial_backup_dir(&id);
        fs::create_dir_all(&partial).map_err(|e| CredError::io(&partial, e))?;

        let copy = || -> Result<(usize, usize)> {
            let mut counts = (0, 0);
            if self.layout.keys_dir().is_dir() {
                counts.0 = copy_tree(&self.layout.keys_dir(), &partial.join(KEYS_DIR))?;
            }
            if self.layout.certs_dir().is_dir() {
                counts.1 = copy_tree(&self.layout.certs_dir(), &partial.join(CERTS_DIR))?;
            }
            Ok(counts)
        };

        let (key_count, cert_count) = match copy() {
            Ok(counts) => counts,
            Err(e) => {
                if let Err(cleanup) = remove_dir_if_exists(&partial) {
                    warn!(path = %partial.display(), error = %cleanup, "failed to remove partial backup");
                }
                return Err(e);
            }
        };

        let path = self.layout.backup_dir(&id);
        fs::rename(&partial, &path).map_err(|e| CredError::io(&partial, e))?;
        info!(backup = %id, keys = key_count, certs = cert_count, "created backup");

        let (created_at, sequence) = parse_id(&id).unwrap_or((Utc::now(), 0));
        Ok(Some(BackupInfo {
            id,
            path,
            created_at,
            key_count,
            cert_count,
            sequence,
        }))
    }

    /// Finished snapshots, newest first.
    pub fn list_backups(&self) -> Result<Vec<BackupInfo>> {
        let root = self.layout.root();
        let entries = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CredError::io(root, e)),
        };

        let mut backups = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| CredError::io(root, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(id) = name.strip_prefix(BACKUP_PREFIX) else {
                continue;
            };
            if !entry.path().is_dir() {
                continue;
            }
            let Some((created_at, sequence)) = parse_id(id) else {
                debug!(dir = %name, "ignoring directory with unparseable backup id");
                continue;
            };
            let path = entry.path();
            backups.push(BackupInfo {
                id: id.to_string(),
                key_count: count_files(&path.join(KEYS_DIR)),
                cert_count: count_files(&path.join(CERTS_DIR)),
                path,
                created_at,
                sequence,
            });
        }

        backups.sort_by(|a, b| (b.created_at, b.sequence).cmp(&(a.created_at, a.sequence)));
        Ok(backups)
    }

    fn find(&self, id: &str) -> Result<BackupInfo> {
        self.list_backups()?
            .into_iter()
            .find(|b| b.id == id)
            .ok_or_else(|| CredError::UnknownBackup(id.to_string()))
    }

    /// Restore the newest snapshot.
    ///
    /// Unless `confirmed`, the operator must approve through `confirmer`;
    /// declining yields [`CredError::Cancelled`]. The snapshot is deleted
    /// afterwards unless `keep` is set.
    pub fn restore_latest(&self, confirmed: bool, confirmer: &dyn Confirmer, keep: bool) -> Result<RestoreReport> {
        let latest = self
            .list_backups()?
            .into_iter()
            .next()
            .ok_or_else(|| CredError::BackupNotFound {
                root: self.layout.root().to_path_buf(),
            })?;
        self.restore_from(latest, confirmed, confirmer, keep)
    }

    /// Restore a named snapshot.
    pub fn restore(&self, id: &str, confirmed: bool, confirmer: &dyn Confirmer, keep: bool) -> Result<RestoreReport> {
        let backup = self.find(id)?;
        self.restore_from(backup, confirmed, confirmer, keep)
    }

    fn restore_from(
        &self,
        backup: BackupInfo,
        confirmed: bool,
        confirmer: &dyn Confirmer,
        keep: bool,
    ) -> Result<RestoreReport> {
        if !confirmed {
            let prompt = format!(
                "Restore backup {} ({} keys, {} certs)? This overwrites the current keys/ and certs/",
                backup.id, backup.key_count, backup.cert_count
            );
            if !confirmer.confirm(&prompt)? {
                info!(backup = %backup.id, "restore declined");
                return Err(CredError::Cancelled);
            }
        }

        // Assemble the replacement next to the live store, then swap.
        let staging = self.layout.root().join(".restore.partial");
        remove_dir_if_exists(&staging)?;
        for dir in [KEYS_DIR, CERTS_DIR] {
            let from = backup.path.join(dir);
            if from.is_dir() {
                copy_tree(&from, &staging.join(dir))?;
            }
        }

        for dir in [KEYS_DIR, CERTS_DIR] {
            let live = self.layout.root().join(dir);
            remove_dir_if_exists(&live)?;
            let staged = staging.join(dir);
            if staged.is_dir() {
                fs::rename(&staged, &live).map_err(|e| CredError::io(&staged, e))?;
            }
        }
        remove_dir_if_exists(&staging)?;
        reapply_modes(self.layout)?;
        info!(backup = %backup.id, "restored backup");

        if !keep {
            remove_dir_if_exists(&backup.path)?;
            info!(backup = %backup.id, "consumed backup removed");
        }
        Ok(RestoreReport {
            backup,
            consumed: !keep,
        })
    }

    /// Delete a named snapshot.
    pub fn delete(&self, id: &str) -> Result<BackupInfo> {
        let backup = self.find(id)?;
        remove_dir_if_exists(&backup.path)?;
        info!(backup = %backup.id, "deleted backup");
        Ok(backup)
    }
}
