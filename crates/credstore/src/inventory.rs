//! Listing of secrets and PKI artifacts.

use credstore_core::fs::mode_of;
use credstore_core::{Authority, Catalog, Result, StoreLayout};
use credstore_pki::inspect;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::secrets::{SecretStatus, SecretStore};

/// Presence of one PKI file.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactStatus {
    /// Path relative to the store root
    pub path: PathBuf,
    pub present: bool,
    pub mode: Option<String>,
    /// Expiry, for certificate files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_after: Option<chrono::DateTime<chrono::Utc>>,
}

/// Everything the store holds.
#[derive(Debug, Clone, Serialize)]
pub struct Inventory {
    pub secrets: Vec<SecretStatus>,
    pub artifacts: Vec<ArtifactStatus>,
}

fn artifact(layout: &StoreLayout, path: &Path) -> Result<ArtifactStatus> {
    let present = path.is_file();
    let mode = if present {
        Some(format!("{:o}", mode_of(path)?))
    } else {
        None
    };
    let is_cert = path.extension().is_some_and(|ext| ext == "crt");
    let not_after = if present && is_cert {
        inspect::read_pem_certificates(path)
            .ok()
            .and_then(|ders| ders.into_iter().next())
            .and_then(|der| inspect::certificate_info(&der, path).ok())
            .map(|info| info.not_after)
    } else {
        None
    };

    Ok(ArtifactStatus {
        path: path.strip_prefix(layout.root()).unwrap_or(path).to_path_buf(),
        present,
        mode,
        not_after,
    })
}

/// List catalog secrets and, if `certs/` exists, the PKI files for `services`.
pub fn list(layout: &StoreLayout, catalog: &Catalog, services: &[String], show_values: bool) -> Result<Inventory> {
    let store = SecretStore::new(layout);
    let secrets = catalog
        .iter()
        .map(|spec| store.status(spec, show_values))
        .collect::<Result<Vec<_>>>()?;

    let mut artifacts = Vec::new();
    if layout.certs_dir().is_dir() {
        for authority in [Authority::Root, Authority::Intermediate] {
            artifacts.push(artifact(layout, &layout.authority_key(authority))?);
            artifacts.push(artifact(layout, &layout.authority_cert(authority))?);
            artifacts.push(artifact(layout, &layout.authority_serial(authority))?);
        }
        artifacts.push(artifact(layout, &layout.ca_bundle())?);
        for service in services {
            let files = layout.service_files(service);
            for path in files.all() {
                artifacts.push(artifact(layout, path)?);
            }
        }
    }

    Ok(Inventory { secrets, artifacts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use credstore_core::SecretEncoding;
    use tempfile::TempDir;

    #[test]
    fn test_list_without_pki() {
        let dir = TempDir::new().unwrap();
        let layout = StoreLayout::new(dir.path());
        SecretStore::new(&layout)
            .write_random_secret("redis_password", SecretEncoding::Alphanumeric, 24, false)
            .unwrap();

        let inventory = list(&layout, &Catalog::standard(), &[], false).unwrap();
        assert_eq!(inventory.secrets.len(), 11);
        assert_eq!(inventory.secrets.iter().filter(|s| s.present).count(), 1);
        assert!(inventory.artifacts.is_empty());
    }

    #[test]
    fn test_list_reports_missing_artifacts() {
        let dir = TempDir::new().unwrap();
        let layout = StoreLayout::new(dir.path());
        std::fs::create_dir_all(layout.certs_dir()).unwrap();

        let inventory = list(&layout, &Catalog::standard(), &["postgres".to_string()], false).unwrap();
        assert_eq!(inventory.artifacts.len(), 11);
        assert!(inventory.artifacts.iter().all(|a| !a.present));
        assert!(inventory
            .artifacts
            .iter()
            .any(|a| a.path == Path::new("certs/postgres/server-chain-no-root.crt")));
    }
}
