//! # credstore-cli
//!
//! Operator command line for the credstore credential store.
//!
//! ## Commands
//!
//! - **generate** (default): create missing secrets, optionally the PKI with `--pki`
//! - **verify**: check presence, length, modes, expiry and chains
//! - **backup** / **backups** / **restore**: snapshot management
//! - **list**: show every secret and PKI artifact
//!
//! Reports render as tables, JSON or YAML (`--output`).

pub mod cli;
pub mod config;
pub mod output;

pub use cli::run;
