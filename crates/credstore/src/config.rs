//! Settings file and per-run options.

use credstore_core::{Catalog, CredError, ExtraSecret, Result, StoreLayout};
use credstore_pki::{CaSettings, KeyAlgorithm, PlatformNaming, DEFAULT_SERVICES};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File-backed settings. Every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory holding `keys/`, `certs/` and snapshots
    pub store_root: PathBuf,
    /// Dotenv-style file with operator-supplied secrets
    pub user_secrets_file: Option<PathBuf>,
    pub pki: PkiSettings,
    /// Additional random secrets
    pub extra_secrets: Vec<ExtraSecret>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_root: PathBuf::from("infra/secrets"),
            user_secrets_file: None,
            pki: PkiSettings::default(),
            extra_secrets: Vec::new(),
        }
    }
}

/// Certificate authority and service certificate settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PkiSettings {
    pub root_key: KeyAlgorithm,
    pub intermediate_key: KeyAlgorithm,
    pub service_key: KeyAlgorithm,
    /// Services that get a certificate
    pub services: Vec<String>,
    pub organization: String,
    pub platform_namespace: String,
    pub resource_prefix: String,
}

impl Default for PkiSettings {
    fn default() -> Self {
        let ca = CaSettings::default();
        let naming = PlatformNaming::default();
        Self {
            root_key: ca.root_key,
            intermediate_key: ca.intermediate_key,
            service_key: KeyAlgorithm::Rsa2048,
            services: DEFAULT_SERVICES.iter().map(ToString::to_string).collect(),
            organization: ca.organization,
            platform_namespace: naming.namespace,
            resource_prefix: naming.resource_prefix,
        }
    }
}

impl Settings {
    /// Load settings from a TOML file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| CredError::io(path, e))?;
            let settings = Self::from_toml(&content)
                .map_err(|e| CredError::Config(format!("{}: {e}", path.display())))?;
            debug!(path = %path.display(), "loaded settings");
            Ok(settings)
        } else {
            debug!(path = %path.display(), "settings file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Parse and validate TOML settings.
    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: Self = toml::from_str(content).map_err(|e| CredError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        for service in &self.pki.services {
            let valid = !service.is_empty()
                && !service.starts_with('.')
                && service
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
            if !valid {
                return Err(CredError::Config(format!("invalid service name {service:?}")));
            }
        }
        self.catalog().map(|_| ())
    }

    pub fn layout(&self) -> StoreLayout {
        StoreLayout::new(&self.store_root)
    }

    /// Explicit user-secrets path, or `<store_root>/user-secrets.env`.
    pub fn user_secrets_path(&self) -> PathBuf {
        self.user_secrets_file
            .clone()
            .unwrap_or_else(|| self.store_root.join("user-secrets.env"))
    }

    /// Standard catalog plus configured extras.
    pub fn catalog(&self) -> Result<Catalog> {
        Catalog::with_extras(&self.extra_secrets)
    }

    pub fn ca_settings(&self) -> CaSettings {
        let org = &self.pki.organization;
        CaSettings {
            root_key: self.pki.root_key,
            intermediate_key: self.pki.intermediate_key,
            organization: org.clone(),
            root_name: format!("{org} Root CA"),
            intermediate_name: format!("{org} Intermediate CA"),
        }
    }

    pub fn naming(&self) -> PlatformNaming {
        PlatformNaming {
            namespace: self.pki.platform_namespace.clone(),
            resource_prefix: self.pki.resource_prefix.clone(),
        }
    }
}

/// Flags for one generate run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateOptions {
    /// Overwrite existing secrets and regenerate CA material
    pub force: bool,
    /// Regenerate CA material only
    pub force_ca: bool,
    /// Also produce the PKI
    pub pki: bool,
    /// Never prompt
    pub non_interactive: bool,
    /// Skip the pre-generation snapshot
    pub no_backup: bool,
    /// Values given at invocation time, keyed by secret name
    pub explicit: BTreeMap<String, String>,
}
