//! On-disk layout of the credential store.
//!
//! ```text
//! <root>/
//!   keys/<secret>.txt
//!   certs/root-ca.{key,crt,serial}
//!   certs/intermediate-ca.{key,crt,serial}
//!   certs/ca-bundle.crt
//!   certs/<service>/server.{key,crt}
//!   certs/<service>/server-chain.crt
//!   certs/<service>/server-chain-no-root.crt
//!   backup-<id>/{keys,certs}
//! ```

use std::path::{Path, PathBuf};

/// Directory holding secret files.
pub const KEYS_DIR: &str = "keys";
/// Directory holding PKI material.
pub const CERTS_DIR: &str = "certs";
/// Prefix of finished snapshot directories.
pub const BACKUP_PREFIX: &str = "backup-";
/// Lock file guarding mutating runs.
pub const LOCK_FILE: &str = ".credstore.lock";

/// Which signing authority a path belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    /// Self-signed root CA
    Root,
    /// Intermediate CA signed by the root
    Intermediate,
}

impl Authority {
    /// File stem used for this authority's artifacts.
    #[must_use]
    pub const fn stem(self) -> &'static str {
        match self {
            Self::Root => "root-ca",
            Self::Intermediate => "intermediate-ca",
        }
    }
}

/// Paths for every artifact the store manages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn keys_dir(&self) -> PathBuf {
        self.root.join(KEYS_DIR)
    }

    pub fn certs_dir(&self) -> PathBuf {
        self.root.join(CERTS_DIR)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    /// Secret file for a catalog name, e.g. `keys/redis_password.txt`.
    pub fn secret_path(&self, name: &str) -> PathBuf {
        self.keys_dir().join(format!("{name}.txt"))
    }

    pub fn authority_key(&self, authority: Authority) -> PathBuf {
        self.certs_dir().join(format!("{}.key", authority.stem()))
    }

    pub fn authority_cert(&self, authority: Authority) -> PathBuf {
        self.certs_dir().join(format!("{}.crt", authority.stem()))
    }

    pub fn authority_serial(&self, authority: Authority) -> PathBuf {
        self.certs_dir().join(format!("{}.serial", authority.stem()))
    }

    pub fn ca_bundle(&self) -> PathBuf {
        self.certs_dir().join("ca-bundle.crt")
    }

    pub fn service_dir(&self, service: &str) -> PathBuf {
        self.certs_dir().join(service)
    }

    /// Staging directory a service is assembled in before being swapped into place.
    pub fn service_staging_dir(&self, service: &str) -> PathBuf {
        self.certs_dir().join(format!(".{service}.staging"))
    }

    pub fn service_files(&self, service: &str) -> ServiceFiles {
        ServiceFiles::in_dir(self.service_dir(service))
    }

    pub fn backup_dir(&self, id: &str) -> PathBuf {
        self.root.join(format!("{BACKUP_PREFIX}{id}"))
    }

    /// Directory a snapshot is copied into before it is complete.
    pub fn partial_backup_dir(&self, id: &str) -> PathBuf {
        self.root.join(format!(".{BACKUP_PREFIX}{id}.partial"))
    }
}

/// The four files that make up an issued service certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceFiles {
    pub key: PathBuf,
    pub cert: PathBuf,
    pub chain: PathBuf,
    pub chain_no_root: PathBuf,
}

impl ServiceFiles {
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            key: dir.join("server.key"),
            cert: dir.join("server.crt"),
            chain: dir.join("server-chain.crt"),
            chain_no_root: dir.join("server-chain-no-root.crt"),
        }
    }

    /// All files, private key first.
    pub fn all(&self) -> [&Path; 4] {
        [&self.key, &self.cert, &self.chain, &self.chain_no_root]
    }

    pub fn is_complete(&self) -> bool {
        self.all().iter().all(|p| p.is_file())
    }
}
