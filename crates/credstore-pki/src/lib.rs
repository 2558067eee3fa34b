//! # credstore-pki
//!
//! Internal certificate authority for service-to-service TLS.
//!
//! ## Architecture
//!
//! ```text
//! ROOT CA (10 years, signs only the intermediate)
//!    │
//!    └── INTERMEDIATE CA (5 years, pathlen:0)
//!           ├── postgres  server cert (1 year)
//!           ├── redis     server cert (1 year)
//!           └── temporal  server cert (1 year)
//! ```
//!
//! Every certificate below the root is issued from a certificate signing
//! request; requests live only in memory. Each authority keeps a serial
//! tracker next to its certificate.
//!
//! ## Example
//!
//! ```rust,ignore
//! use credstore_core::StoreLayout;
//! use credstore_pki::{CaSettings, CertificateAuthorityManager, ServiceCertificateIssuer};
//!
//! let layout = StoreLayout::new("infra/secrets");
//! CertificateAuthorityManager::new(&layout, &CaSettings::default())
//!     .ensure_root_and_intermediate(false)?;
//!
//! let mut issuer = ServiceCertificateIssuer::open(&layout, KeyAlgorithm::Rsa2048)?;
//! issuer.issue(&SanProfile::for_service("postgres", &PlatformNaming::default()))?;
//! issuer.build_ca_bundle()?;
//! ```

mod authority;
mod intermediate;
pub mod inspect;
mod keys;
mod root;
mod san;
mod serial;
mod service;
mod signing;

pub use authority::{CaOutcome, CaSettings, CaState, CertificateAuthorityManager};
pub use intermediate::IntermediateCa;
pub use keys::{generate_key, load_key, GeneratedKey};
pub use root::RootCa;
pub use san::{PlatformNaming, SanProfile, DEFAULT_SERVICES};
pub use serial::SerialCounter;
pub use service::{IssueStage, IssuedService, ServiceCertificateIssuer};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Certificate metadata read back from issued material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateInfo {
    /// Serial number (uppercase hex)
    pub serial: String,
    /// Subject common name
    pub subject: String,
    /// Issuer common name
    pub issuer: String,
    /// Not valid before
    pub not_before: DateTime<Utc>,
    /// Not valid after
    pub not_after: DateTime<Utc>,
    /// SHA-256 of the DER encoding (hex)
    pub fingerprint: String,
    /// Position in the chain
    pub cert_type: CertificateType,
}

impl CertificateInfo {
    /// True if the certificate expires within `window` of `now`.
    pub fn expires_within(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        self.not_after - now < window
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.not_after <= now
    }
}

/// Type of certificate in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateType {
    /// Self-signed root, signs only the intermediate
    Root,
    /// Intermediate, signs service certificates
    Intermediate,
    /// Leaf certificate presented by an internal service
    Service,
}

/// Key algorithm choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum KeyAlgorithm {
    /// ECDSA with P-256 curve (fast, used by tests)
    EcdsaP256,
    /// ECDSA with P-384 curve
    EcdsaP384,
    /// RSA 2048-bit (service certificates)
    #[default]
    Rsa2048,
    /// RSA 4096-bit (certificate authorities)
    Rsa4096,
}

impl std::fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EcdsaP256 => write!(f, "ECDSA P-256"),
            Self::EcdsaP384 => write!(f, "ECDSA P-384"),
            Self::Rsa2048 => write!(f, "RSA-2048"),
            Self::Rsa4096 => write!(f, "RSA-4096"),
        }
    }
}

/// Validity period presets.
#[derive(Debug, Clone, Copy)]
pub enum ValidityPeriod {
    /// Root CA: 10 years
    Root,
    /// Intermediate CA: 5 years
    Intermediate,
    /// Service certificate: 1 year
    Service,
}

impl ValidityPeriod {
    /// Get the number of days for this validity period.
    pub const fn days(self) -> u32 {
        match self {
            Self::Root => 10 * 365,
            Self::Intermediate => 5 * 365,
            Self::Service => 365,
        }
    }

    pub const fn for_type(cert_type: CertificateType) -> Self {
        match cert_type {
            CertificateType::Root => Self::Root,
            CertificateType::Intermediate => Self::Intermediate,
            CertificateType::Service => Self::Service,
        }
    }
}
