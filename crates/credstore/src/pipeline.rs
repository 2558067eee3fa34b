//! The generate-all run.
//!
//! Steps run in a fixed order and the first fatal error stops the run:
//!
//! 1. resolve operator-supplied secrets (nothing is written before this)
//! 2. snapshot the existing store
//! 3. write random secrets
//! 4. write operator-supplied secrets
//! 5. optionally, CA material, service certificates and the CA bundle

use credstore_core::{Catalog, Result, SecretOriginPolicy, StoreLayout};
use credstore_pki::{
    CaOutcome, CertificateAuthorityManager, IssuedService, SanProfile, ServiceCertificateIssuer,
};
use serde::Serialize;
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::backup::{BackupInfo, BackupManager};
use crate::config::{GenerateOptions, Settings};
use crate::resolver::{DeterministicSecretResolver, Environment, Prompter, SecretOrigin};
use crate::secrets::{SecretStore, WriteOutcome};

/// What happened to one secret.
#[derive(Debug, Clone, Serialize)]
pub struct SecretResult {
    pub name: String,
    pub outcome: WriteOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<SecretOrigin>,
}

/// What happened to one service certificate.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceResult {
    pub service: String,
    pub issued: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_after: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<IssuedService> for ServiceResult {
    fn from(issued: IssuedService) -> Self {
        Self {
            service: issued.service,
            issued: true,
            serial: Some(issued.info.serial),
            not_after: Some(issued.info.not_after),
        }
    }
}

/// PKI portion of a run.
#[derive(Debug, Clone, Serialize)]
pub struct PkiResult {
    pub ca: CaOutcome,
    pub services: Vec<ServiceResult>,
    pub bundle_written: bool,
}

/// Summary of a generate-all run.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateReport {
    pub backup: Option<BackupInfo>,
    pub secrets: Vec<SecretResult>,
    pub pki: Option<PkiResult>,
}

impl GenerateReport {
    pub fn written(&self) -> usize {
        self.secrets
            .iter()
            .filter(|s| s.outcome == WriteOutcome::Written)
            .count()
    }
}

/// Runs generate-all against one store.
pub struct Generator<'a> {
    settings: &'a Settings,
    options: &'a GenerateOptions,
    env: &'a dyn Environment,
    prompter: &'a dyn Prompter,
}

impl std::fmt::Debug for Generator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator")
            .field("store_root", &self.settings.store_root)
            .field("pki", &self.options.pki)
            .finish_non_exhaustive()
    }
}

impl<'a> Generator<'a> {
    pub fn new(
        settings: &'a Settings,
        options: &'a GenerateOptions,
        env: &'a dyn Environment,
        prompter: &'a dyn Prompter,
    ) -> Self {
        Self {
            settings,
            options,
            env,
            prompter,
        }
    }

    pub fn run(&self) -> Result<GenerateReport> {
        let layout = self.settings.layout();
        let catalog = self.settings.catalog()?;
        let store = SecretStore::new(&layout);

        let resolved = self.resolve_external(&catalog, &store)?;

        let backup = if self.options.no_backup {
            debug!("backup skipped by request");
            None
        } else {
            BackupManager::new(&layout).snapshot()?
        };

        let mut secrets = Vec::with_capacity(catalog.len());
        for spec in catalog.random() {
            if let SecretOriginPolicy::Random { encoding, length } = spec.origin {
                let outcome = store.write_random_secret(&spec.name, encoding, length, self.options.force)?;
                secrets.push(SecretResult {
                    name: spec.name.clone(),
                    outcome,
                    origin: None,
                });
            }
        }

        for spec in catalog.external() {
            let result = match resolved.iter().find(|(name, _, _)| *name == spec.name) {
                Some((_, value, origin)) => SecretResult {
                    name: spec.name.clone(),
                    outcome: store.write_secret(&spec.name, value, self.options.force)?,
                    origin: Some(*origin),
                },
                None => SecretResult {
                    name: spec.name.clone(),
                    outcome: WriteOutcome::Kept,
                    origin: None,
                },
            };
            secrets.push(result);
        }

        let pki = if self.options.pki {
            Some(self.generate_pki(&layout)?)
        } else {
            None
        };

        let report = GenerateReport {
            backup,
            secrets,
            pki,
        };
        info!(written = report.written(), total = report.secrets.len(), "generation finished");
        Ok(report)
    }

    /// Resolve every operator-supplied secret that will be written.
    ///
    /// An existing file is kept unless forced, and is then not resolved.
    fn resolve_external(
        &self,
        catalog: &Catalog,
        store: &SecretStore<'_>,
    ) -> Result<Vec<(String, Zeroizing<String>, SecretOrigin)>> {
        let user_secrets = self.settings.user_secrets_path();
        let mut resolver = DeterministicSecretResolver::new(
            &self.options.explicit,
            self.env,
            self.prompter,
            user_secrets,
            self.options.non_interactive,
        );

        let mut resolved = Vec::new();
        for spec in catalog.external() {
            if !self.options.force && store.exists(&spec.name) {
                debug!(secret = %spec.name, "existing secret, not resolving");
                continue;
            }
            if let SecretOriginPolicy::External { label, env_var } = &spec.origin {
                let secret = resolver.resolve(&spec.name, label, env_var)?;
                resolved.push((spec.name.clone(), secret.value, secret.origin));
            }
        }
        Ok(resolved)
    }

    fn generate_pki(&self, layout: &StoreLayout) -> Result<PkiResult> {
        let ca_settings = self.settings.ca_settings();
        let force_ca = self.options.force || self.options.force_ca;
        let ca = CertificateAuthorityManager::new(layout, &ca_settings)
            .ensure_root_and_intermediate(force_ca)?;

        let mut issuer = ServiceCertificateIssuer::open(layout, self.settings.pki.service_key)?
            .with_organization(&self.settings.pki.organization);
        let naming = self.settings.naming();

        let mut services = Vec::with_capacity(self.settings.pki.services.len());
        for service in &self.settings.pki.services {
            let complete = layout.service_files(service).is_complete();
            if complete && !ca.changed() && !self.options.force {
                info!(service = %service, "service certificate already present, keeping it");
                services.push(ServiceResult {
                    service: service.clone(),
                    issued: false,
                    serial: None,
                    not_after: None,
                });
                continue;
            }
            let issued = issuer.issue(&SanProfile::for_service(service, &naming))?;
            services.push(issued.into());
        }

        let any_issued = services.iter().any(|s| s.issued);
        let bundle_written = ca.changed() || any_issued || !layout.ca_bundle().is_file();
        if bundle_written {
            issuer.build_ca_bundle()?;
        }

        Ok(PkiResult {
            ca,
            services,
            bundle_written,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::NoPrompt;
    use crate::verify::Verifier;
    use credstore_core::fs::mode_of;
    use credstore_core::{CredError, ExtraSecret, SecretEncoding};
    use credstore_pki::KeyAlgorithm;
    use std::collections::BTreeMap;
    use std::path::Path;
    use tempfile::TempDir;

    fn settings(root: &Path) -> Settings {
        let mut settings = Settings {
            store_root: root.to_path_buf(),
            ..Settings::default()
        };
        settings.pki.root_key = KeyAlgorithm::EcdsaP256;
        settings.pki.intermediate_key = KeyAlgorithm::EcdsaP256;
        settings.pki.service_key = KeyAlgorithm::EcdsaP256;
        settings
    }

    fn oidc_env() -> BTreeMap<String, String> {
        [
            ("OIDC_GOOGLE_CLIENT_SECRET", "google-secret"),
            ("OIDC_MICROSOFT_CLIENT_SECRET", "microsoft-secret"),
            ("OIDC_KEYCLOAK_CLIENT_SECRET", "keycloak-secret"),
        ]
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
    }

    fn read_keys(layout: &StoreLayout) -> Vec<(String, Vec<u8>)> {
        let mut files: Vec<_> = std::fs::read_dir(layout.keys_dir())
            .unwrap()
            .map(|e| e.unwrap())
            .map(|e| (e.file_name().to_string_lossy().into_owned(), std::fs::read(e.path()).unwrap()))
            .collect();
        files.sort();
        files
    }

    #[test]
    fn test_empty_store_with_pki_then_verify_is_clean() {
        let dir = TempDir::new().unwrap();
        let settings = settings(dir.path());
        let options = GenerateOptions {
            pki: true,
            non_interactive: true,
            ..GenerateOptions::default()
        };
        let env = oidc_env();

        let report = Generator::new(&settings, &options, &env, &NoPrompt).run().unwrap();
        assert!(report.backup.is_none());
        assert_eq!(report.written(), 11);
        let pki = report.pki.unwrap();
        assert_eq!(pki.ca, CaOutcome::Generated);
        assert_eq!(pki.services.len(), 3);
        assert!(pki.bundle_written);

        let layout = settings.layout();
        let keys = read_keys(&layout);
        assert_eq!(keys.len(), 11);
        for (name, _) in &keys {
            #[cfg(unix)]
            assert_eq!(mode_of(&layout.keys_dir().join(name)).unwrap(), 0o600);
        }
        for service in ["postgres", "redis", "temporal"] {
            assert!(layout.service_files(service).is_complete());
        }

        let catalog = settings.catalog().unwrap();
        let verify = Verifier::new(&layout, &catalog, &settings.pki.services)
            .verify_all()
            .unwrap();
        assert!(verify.passed(), "{:?}", verify.deficiencies);
    }

    #[test]
    fn test_extra_secrets_are_generated_verified_and_backed_up() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings(dir.path());
        settings.extra_secrets.push(ExtraSecret {
            name: "grafana_admin_token".to_string(),
            encoding: SecretEncoding::Hex,
            length: 16,
        });
        let options = GenerateOptions {
            non_interactive: true,
            ..GenerateOptions::default()
        };
        let env = oidc_env();
        let layout = settings.layout();
        let catalog = settings.catalog().unwrap();
        let path = layout.secret_path("grafana_admin_token");

        let report = Generator::new(&settings, &options, &env, &NoPrompt).run().unwrap();
        assert_eq!(report.written(), 12);
        let value = std::fs::read_to_string(&path).unwrap();
        assert_eq!(value.len(), 32);
        assert!(value.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(mode_of(&path).unwrap(), 0o600);
        assert!(Verifier::new(&layout, &catalog, &[]).verify_all().unwrap().passed());

        // The next run snapshots the extra secret along with the rest.
        let report = Generator::new(&settings, &options, &env, &NoPrompt).run().unwrap();
        let backup = report.backup.unwrap();
        assert_eq!(backup.key_count, 12);
        assert_eq!(
            std::fs::read_to_string(backup.path.join("keys/grafana_admin_token.txt")).unwrap(),
            value
        );

        SecretStore::new(&layout)
            .write_secret("grafana_admin_token", "short", true)
            .unwrap();
        let verify = Verifier::new(&layout, &catalog, &[]).verify_all().unwrap();
        assert_eq!(verify.deficiencies.len(), 1);
        assert_eq!(verify.deficiencies[0].subject, "grafana_admin_token");
        assert_eq!(
            verify.deficiencies[0].kind,
            crate::verify::DeficiencyKind::TooShort { length: 5, minimum: 32 }
        );
    }

    #[test]
    fn test_second_run_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let settings = settings(dir.path());
        let options = GenerateOptions {
            pki: true,
            non_interactive: true,
            ..GenerateOptions::default()
        };
        let env = oidc_env();
        Generator::new(&settings, &options, &env, &NoPrompt).run().unwrap();
        let layout = settings.layout();
        let before = read_keys(&layout);
        let cert_before = std::fs::read(layout.service_files("redis").cert).unwrap();

        // No OIDC values are available now; existing files must not need them.
        let empty = BTreeMap::new();
        let report = Generator::new(&settings, &options, &empty, &NoPrompt).run().unwrap();
        assert_eq!(report.written(), 0);
        assert!(report.backup.is_some());
        assert_eq!(report.pki.unwrap().ca, CaOutcome::Existing);
        assert_eq!(read_keys(&layout), before);
        assert_eq!(std::fs::read(layout.service_files("redis").cert).unwrap(), cert_before);
    }

    #[test]
    fn test_non_interactive_missing_input_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let settings = settings(dir.path());
        let options = GenerateOptions {
            non_interactive: true,
            ..GenerateOptions::default()
        };
        let mut env = oidc_env();
        env.remove("OIDC_KEYCLOAK_CLIENT_SECRET");

        let err = Generator::new(&settings, &options, &env, &NoPrompt).run().unwrap_err();
        assert!(matches!(err, CredError::MissingSecretInput { ref env_var, .. } if env_var == "OIDC_KEYCLOAK_CLIENT_SECRET"));
        assert!(!settings.layout().keys_dir().exists());
    }

    #[test]
    fn test_explicit_values_win() {
        let dir = TempDir::new().unwrap();
        let settings = settings(dir.path());
        let mut options = GenerateOptions {
            non_interactive: true,
            ..GenerateOptions::default()
        };
        options
            .explicit
            .insert("oidc_google_client_secret".to_string(), "cli-value".to_string());
        let env = oidc_env();

        let report = Generator::new(&settings, &options, &env, &NoPrompt).run().unwrap();
        let google = report
            .secrets
            .iter()
            .find(|s| s.name == "oidc_google_client_secret")
            .unwrap();
        assert_eq!(google.origin, Some(SecretOrigin::Explicit));
        assert_eq!(
            std::fs::read_to_string(settings.layout().secret_path("oidc_google_client_secret")).unwrap(),
            "cli-value"
        );
    }

    #[test]
    fn test_force_ca_reissues_services_but_keeps_secrets() {
        let dir = TempDir::new().unwrap();
        let settings = settings(dir.path());
        let env = oidc_env();
        let mut options = GenerateOptions {
            pki: true,
            non_interactive: true,
            ..GenerateOptions::default()
        };
        Generator::new(&settings, &options, &env, &NoPrompt).run().unwrap();
        let layout = settings.layout();
        let secrets_before = read_keys(&layout);
        let bundle_before = std::fs::read(layout.ca_bundle()).unwrap();

        options.force_ca = true;
        let report = Generator::new(&settings, &options, &env, &NoPrompt).run().unwrap();
        let pki = report.pki.unwrap();
        assert_eq!(pki.ca, CaOutcome::Generated);
        assert!(pki.services.iter().all(|s| s.issued));
        assert_eq!(read_keys(&layout), secrets_before);
        assert_ne!(std::fs::read(layout.ca_bundle()).unwrap(), bundle_before);

        let catalog = settings.catalog().unwrap();
        let verify = Verifier::new(&layout, &catalog, &settings.pki.services)
            .verify_all()
            .unwrap();
        assert!(verify.passed(), "{:?}", verify.deficiencies);
    }

    #[test]
    fn test_force_overwrites_secrets() {
        let dir = TempDir::new().unwrap();
        let settings = settings(dir.path());
        let env = oidc_env();
        let mut options = GenerateOptions {
            non_interactive: true,
            no_backup: true,
            ..GenerateOptions::default()
        };
        Generator::new(&settings, &options, &env, &NoPrompt).run().unwrap();
        let before = read_keys(&settings.layout());

        options.force = true;
        let report = Generator::new(&settings, &options, &env, &NoPrompt).run().unwrap();
        assert!(report.backup.is_none());
        assert_eq!(report.written(), 11);
        let after = read_keys(&settings.layout());
        let redis = |keys: &[(String, Vec<u8>)]| {
            keys.iter().find(|(n, _)| n == "redis_password.txt").unwrap().1.clone()
        };
        assert_ne!(redis(&before), redis(&after));
    }
}
