//! # credstore
//!
//! Local credential store for a web platform: database and cache
//! passwords, signing secrets, OIDC client secrets and an internal PKI
//! for service-to-service TLS, all written as files with strict modes.
//!
//! ## Layout
//!
//! ```text
//! <store_root>/
//!   keys/<secret>.txt                       (600)
//!   certs/{root,intermediate}-ca.{key,crt,serial}
//!   certs/ca-bundle.crt                     (644)
//!   certs/<service>/server*.{key,crt}
//!   backup-<id>/                            (snapshot of keys/ and certs/)
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use credstore::{Generator, GenerateOptions, NoPrompt, ProcessEnv, Settings};
//!
//! let settings = Settings::load("credstore.toml".as_ref())?;
//! let options = GenerateOptions { pki: true, non_interactive: true, ..Default::default() };
//! let report = Generator::new(&settings, &options, &ProcessEnv, &NoPrompt).run()?;
//! println!("{} secrets written", report.written());
//! ```

pub mod backup;
pub mod config;
pub mod inventory;
pub mod pipeline;
pub mod resolver;
pub mod secrets;
pub mod verify;

pub use backup::{BackupInfo, BackupManager, Confirmer, RestoreReport};
pub use config::{GenerateOptions, PkiSettings, Settings};
pub use inventory::{ArtifactStatus, Inventory};
pub use pipeline::{GenerateReport, Generator, PkiResult, SecretResult, ServiceResult};
pub use resolver::{
    DeterministicSecretResolver, Environment, NoPrompt, ProcessEnv, Prompter, ResolvedSecret,
    SecretOrigin,
};
pub use secrets::{SecretGenerator, SecretStatus, SecretStore, WriteOutcome};
pub use verify::{Deficiency, DeficiencyKind, VerifyReport, Verifier};

pub use credstore_core::{CredError, Result, StoreLayout, StoreLock};
pub use credstore_pki::{CaOutcome, KeyAlgorithm};
