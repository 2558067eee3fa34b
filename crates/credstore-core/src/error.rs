use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for credential store operations
pub type Result<T> = std::result::Result<T, CredError>;

/// Errors that can occur while generating, backing up or verifying credentials
#[derive(Error, Debug)]
pub enum CredError {
    /// A required cryptographic or filesystem primitive is unavailable
    #[error("missing dependency: {0}")]
    MissingDependency(String),

    /// A deterministic secret could not be resolved without prompting
    #[error("missing secret input: {label} (pass it on the command line or set {env_var})")]
    MissingSecretInput {
        /// Human-readable name of the secret
        label: String,
        /// Environment variable consulted for the secret
        env_var: String,
    },

    /// A file was absent, empty or of the wrong size after being written
    #[error("write verification failed for {}: {reason}", path.display())]
    WriteVerificationFailure {
        /// File that failed verification
        path: PathBuf,
        /// What the post-write check found
        reason: String,
    },

    /// An operation was invoked before its prerequisites exist
    #[error("prerequisite missing: {0}")]
    PrerequisiteMissing(String),

    /// Restore was requested but no snapshot exists
    #[error("no backup found under {}", root.display())]
    BackupNotFound {
        /// Store root that was searched
        root: PathBuf,
    },

    /// A specific snapshot id does not exist
    #[error("backup not found: {0}")]
    UnknownBackup(String),

    /// Another invocation holds the store lock
    #[error(
        "credential store is locked by {} ({}); remove the file if that run is no longer active",
        holder.map_or_else(|| "another run".to_string(), |pid| format!("process {pid}")),
        path.display()
    )]
    Locked {
        /// Lock file path
        path: PathBuf,
        /// Process id recorded in the lock file, if readable
        holder: Option<u32>,
    },

    /// Filesystem error with the path it occurred on
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Path being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Key generation or signing failed
    #[error("crypto error: {0}")]
    Crypto(String),

    /// A certificate or key file could not be parsed
    #[error("failed to parse {}: {reason}", path.display())]
    CertParse {
        /// File being parsed
        path: PathBuf,
        /// Parser message
        reason: String,
    },

    /// Configuration is invalid
    #[error("configuration error: {0}")]
    Config(String),

    /// The operator declined a confirmation
    #[error("operation cancelled")]
    Cancelled,
}

impl CredError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Build a write verification failure.
    pub fn write_verification(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::WriteVerificationFailure {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Build a certificate parse failure.
    pub fn cert_parse(path: impl AsRef<Path>, reason: impl ToString) -> Self {
        Self::CertParse {
            path: path.as_ref().to_path_buf(),
            reason: reason.to_string(),
        }
    }

    /// Returns true if the operator chose to stop rather than something failing
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
