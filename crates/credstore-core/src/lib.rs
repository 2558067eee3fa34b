//! # credstore-core
//!
//! Shared building blocks for the credstore crates: the error taxonomy,
//! the persisted layout, the secret catalog with its length policy, atomic
//! permission-aware writes and the advisory store lock.

pub mod catalog;
pub mod error;
pub mod fs;
pub mod layout;
pub mod lock;

pub use catalog::{
    Catalog, ExtraSecret, PolicyTable, SecretEncoding, SecretKind, SecretOriginPolicy, SecretSpec,
};
pub use error::{CredError, Result};
pub use fs::FileMode;
pub use layout::{Authority, ServiceFiles, StoreLayout};
pub use lock::StoreLock;
