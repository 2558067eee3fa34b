//! The set of secrets the store knows about, and how each one is encoded.
//!
//! Every secret kind has exactly one encoding policy:
//!
//! | Kind | Encoding | Stored length |
//! |---|---|---|
//! | database / cache password | alphanumeric, 24 chars | 24 |
//! | session / CSRF signing secret | 32 random bytes, URL-safe base64, unpadded | 43 |
//! | backup encryption password | punctuated charset, 32 chars | 32 |
//! | OIDC client secret | as supplied by the operator | >= 1 |

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{CredError, Result};

/// Length of generated database and cache passwords.
pub const PASSWORD_LEN: usize = 24;
/// Random bytes behind each signing secret.
pub const SIGNING_SECRET_BYTES: usize = 32;
/// Length of backup encryption passwords.
pub const BACKUP_PASSWORD_LEN: usize = 32;

/// How random material is rendered into a secret file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecretEncoding {
    /// `[A-Za-z0-9]`, safe to embed in connection URLs; length counts characters
    Alphanumeric,
    /// Alphanumerics plus shell- and URL-tame punctuation; length counts characters
    Punctuated,
    /// Standard padded base64 of `length` random bytes
    Base64,
    /// Unpadded URL-safe base64 of `length` random bytes
    UrlSafeBase64,
    /// Lowercase hex of `length` random bytes
    Hex,
}

impl SecretEncoding {
    /// Number of characters written for a given `length` parameter.
    #[must_use]
    pub const fn encoded_len(self, length: usize) -> usize {
        match self {
            Self::Alphanumeric | Self::Punctuated => length,
            Self::Base64 => length.div_ceil(3) * 4,
            Self::UrlSafeBase64 => (length * 4).div_ceil(3),
            Self::Hex => length * 2,
        }
    }
}

/// What a secret is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecretKind {
    DatabasePassword,
    CachePassword,
    SigningSecret,
    BackupPassword,
    OidcClientSecret,
    /// Declared in configuration
    Custom,
}

impl SecretKind {
    /// Display group used when listing secrets.
    #[must_use]
    pub const fn group(self) -> &'static str {
        match self {
            Self::DatabasePassword => "Database",
            Self::CachePassword => "Cache",
            Self::SigningSecret => "Signing",
            Self::BackupPassword => "Backup",
            Self::OidcClientSecret => "OIDC",
            Self::Custom => "Custom",
        }
    }
}

/// Where a secret's value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretOriginPolicy {
    /// Generated from the system random source
    Random {
        encoding: SecretEncoding,
        length: usize,
    },
    /// Supplied by the operator (flag, environment, user-secrets file or prompt)
    External {
        /// Human-readable label used in prompts and errors
        label: String,
        /// Conventional environment variable
        env_var: String,
    },
}

/// One entry of the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretSpec {
    /// File stem under `keys/`
    pub name: String,
    pub kind: SecretKind,
    pub origin: SecretOriginPolicy,
    /// Minimum acceptable length of the stored (trimmed) value
    pub min_length: usize,
}

impl SecretSpec {
    fn random(name: &str, kind: SecretKind, encoding: SecretEncoding, length: usize) -> Self {
        Self {
            name: name.to_string(),
            kind,
            origin: SecretOriginPolicy::Random { encoding, length },
            min_length: encoding.encoded_len(length),
        }
    }

    fn external(name: &str, label: &str, env_var: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: SecretKind::OidcClientSecret,
            origin: SecretOriginPolicy::External {
                label: label.to_string(),
                env_var: env_var.to_string(),
            },
            min_length: 1,
        }
    }

    pub const fn is_external(&self) -> bool {
        matches!(self.origin, SecretOriginPolicy::External { .. })
    }
}

/// An additional random secret declared in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraSecret {
    pub name: String,
    pub encoding: SecretEncoding,
    /// Characters for character encodings, random bytes for byte encodings
    pub length: usize,
}

/// Ordered set of secrets managed by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    secrets: Vec<SecretSpec>,
}

impl Catalog {
    /// The eleven secrets every deployment needs.
    pub fn standard() -> Self {
        use SecretEncoding::{Alphanumeric, UrlSafeBase64};
        use SecretKind::{CachePassword, DatabasePassword, SigningSecret};

        let secrets = vec![
            SecretSpec::random("postgres_password", DatabasePassword, Alphanumeric, PASSWORD_LEN),
            SecretSpec::random("postgres_app_user_pw", DatabasePassword, Alphanumeric, PASSWORD_LEN),
            SecretSpec::random("postgres_app_ro_pw", DatabasePassword, Alphanumeric, PASSWORD_LEN),
            SecretSpec::random("postgres_app_owner_pw", DatabasePassword, Alphanumeric, PASSWORD_LEN),
            SecretSpec::random("postgres_temporal_pw", DatabasePassword, Alphanumeric, PASSWORD_LEN),
            SecretSpec::random("redis_password", CachePassword, Alphanumeric, PASSWORD_LEN),
            SecretSpec::random("session_signing_secret", SigningSecret, UrlSafeBase64, SIGNING_SECRET_BYTES),
            SecretSpec::random("csrf_signing_secret", SigningSecret, UrlSafeBase64, SIGNING_SECRET_BYTES),
            SecretSpec::external(
                "oidc_google_client_secret",
                "Google OIDC client secret",
                "OIDC_GOOGLE_CLIENT_SECRET",
            ),
            SecretSpec::external(
                "oidc_microsoft_client_secret",
                "Microsoft OIDC client secret",
                "OIDC_MICROSOFT_CLIENT_SECRET",
            ),
            SecretSpec::external(
                "oidc_keycloak_client_secret",
                "Keycloak OIDC client secret",
                "OIDC_KEYCLOAK_CLIENT_SECRET",
            ),
        ];

        Self { secrets }
    }

    /// Standard catalog plus configured extras.
    pub fn with_extras(extras: &[ExtraSecret]) -> Result<Self> {
        let mut catalog = Self::standard();
        for extra in extras {
            validate_name(&extra.name)?;
            if extra.length == 0 {
                return Err(CredError::Config(format!(
                    "extra secret {} has zero length",
                    extra.name
                )));
            }
            if catalog.get(&extra.name).is_some() {
                return Err(CredError::Config(format!(
                    "extra secret {} collides with an existing secret",
                    extra.name
                )));
            }
            let kind = if extra.encoding == SecretEncoding::Punctuated {
                SecretKind::BackupPassword
            } else {
                SecretKind::Custom
            };
            catalog.secrets.push(SecretSpec::random(
                &extra.name,
                kind,
                extra.encoding,
                extra.length,
            ));
        }
        Ok(catalog)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SecretSpec> {
        self.secrets.iter()
    }

    pub fn get(&self, name: &str) -> Option<&SecretSpec> {
        self.secrets.iter().find(|s| s.name == name)
    }

    pub fn random(&self) -> impl Iterator<Item = &SecretSpec> {
        self.secrets.iter().filter(|s| !s.is_external())
    }

    pub fn external(&self) -> impl Iterator<Item = &SecretSpec> {
        self.secrets.iter().filter(|s| s.is_external())
    }

    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    /// Minimum lengths keyed by secret name.
    pub fn policy(&self) -> PolicyTable {
        PolicyTable {
            minimums: self
                .secrets
                .iter()
                .map(|s| (s.name.clone(), s.min_length))
                .collect(),
        }
    }
}

/// Static mapping from secret name to minimum acceptable length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTable {
    minimums: BTreeMap<String, usize>,
}

impl PolicyTable {
    pub fn min_length(&self, name: &str) -> Option<usize> {
        self.minimums.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.minimums.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(CredError::Config(format!(
            "invalid secret name {name:?}: use lowercase letters, digits and underscores"
        )))
    }
}
