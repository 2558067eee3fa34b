//! Service certificate issuance.
//!
//! A service is assembled in `certs/.<service>.staging/` and only swapped
//! into `certs/<service>/` once the key, certificate and both chains are
//! on disk. Any failure removes the staging directory, so a service is
//! either fully issued or untouched.

use credstore_core::fs::{remove_dir_if_exists, write_verified, FileMode};
use credstore_core::{Authority, CredError, Result, ServiceFiles, StoreLayout};
use rcgen::CertificateParams;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::keys::generate_key;
use crate::signing::{create_request, distinguished_name};
use crate::{inspect, CertificateInfo, IntermediateCa, KeyAlgorithm, SanProfile, SerialCounter};

/// Progress of a single issuance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueStage {
    Absent,
    KeyGenerated,
    Requested,
    Signed,
    ChainsBuilt,
}

impl std::fmt::Display for IssueStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Absent => "absent",
            Self::KeyGenerated => "key generated",
            Self::Requested => "requested",
            Self::Signed => "signed",
            Self::ChainsBuilt => "chains built",
        };
        f.write_str(s)
    }
}

/// A service certificate that made it into place.
#[derive(Debug, Clone)]
pub struct IssuedService {
    pub service: String,
    pub files: ServiceFiles,
    pub info: CertificateInfo,
    pub sans: Vec<String>,
}

/// Issues leaf certificates from the stored intermediate CA.
#[derive(Debug)]
pub struct ServiceCertificateIssuer {
    layout: StoreLayout,
    algorithm: KeyAlgorithm,
    intermediate: IntermediateCa,
    root_pem: String,
    serials: SerialCounter,
    organization: String,
}

fn read_required(path: &Path, what: &str) -> Result<String> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(CredError::PrerequisiteMissing(
            format!("{what} not found at {}; generate the CA first", path.display()),
        )),
        Err(e) => Err(CredError::io(path, e)),
    }
}

/// Concatenate PEM blocks, one per line run.
fn concat_pem(parts: &[&str]) -> String {
    let mut out = String::new();
    for part in parts {
        out.push_str(part.trim_end());
        out.push('\n');
    }
    out
}

impl ServiceCertificateIssuer {
    /// Load the intermediate CA, root certificate and serial tracker.
    ///
    /// Fails with [`CredError::PrerequisiteMissing`] if the intermediate
    /// or the root certificate is absent.
    pub fn open(layout: &StoreLayout, algorithm: KeyAlgorithm) -> Result<Self> {
        let key_pem = read_required(
            &layout.authority_key(Authority::Intermediate),
            "intermediate CA key",
        )?;
        let cert_pem = read_required(
            &layout.authority_cert(Authority::Intermediate),
            "intermediate CA certificate",
        )?;
        let root_pem = read_required(&layout.authority_cert(Authority::Root), "root CA certificate")?;

        let intermediate = IntermediateCa::load(&cert_pem, &key_pem)?;
        let serials = SerialCounter::load(layout.authority_serial(Authority::Intermediate))?;

        Ok(Self {
            layout: layout.clone(),
            algorithm,
            intermediate,
            root_pem,
            serials,
            organization: String::new(),
        })
    }

    /// Organization placed in every leaf subject.
    #[must_use]
    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = organization.into();
        self
    }

    /// Issue (or reissue) the certificate for one service.
    pub fn issue(&mut self, profile: &SanProfile) -> Result<IssuedService> {
        let service = profile.service.as_str();
        let staging = self.layout.service_staging_dir(service);
        remove_dir_if_exists(&staging)?;

        let mut stage = IssueStage::Absent;
        match self.stage(profile, &staging, &mut stage) {
            Ok((info, sans)) => {
                self.swap_into_place(service, &staging)?;
                info!(service, serial = %info.serial, "issued service certificate");
                Ok(IssuedService {
                    service: service.to_string(),
                    files: self.layout.service_files(service),
                    info,
                    sans,
                })
            }
            Err(e) => {
                warn!(service, %stage, error = %e, "service certificate issuance failed");
                if let Err(cleanup) = remove_dir_if_exists(&staging) {
                    warn!(path = %staging.display(), error = %cleanup, "failed to clean staging directory");
                }
                Err(e)
            }
        }
    }

    fn stage(
        &mut self,
        profile: &SanProfile,
        staging: &Path,
        stage: &mut IssueStage,
    ) -> Result<(CertificateInfo, Vec<String>)> {
        let files = ServiceFiles::in_dir(staging);

        let key = generate_key(self.algorithm)?;
        write_verified(&files.key, key.pem.as_bytes(), FileMode::Private)?;
        *stage = IssueStage::KeyGenerated;

        let mut params = CertificateParams::default();
        params.distinguished_name =
            distinguished_name(&profile.common_name(), &self.organization);
        let csr_pem = create_request(&params, &key.key_pair)?;
        *stage = IssueStage::Requested;

        let serial = self.serials.allocate();
        self.serials.persist()?;
        let sans = profile.entries();
        let certificate = self.intermediate.sign_service(&csr_pem, &sans, serial)?;
        let leaf_pem = certificate.pem();
        write_verified(&files.cert, leaf_pem.as_bytes(), FileMode::Public)?;
        *stage = IssueStage::Signed;

        let intermediate_pem = self.intermediate.certificate_pem();
        let full = concat_pem(&[&leaf_pem, intermediate_pem, &self.root_pem]);
        let no_root = concat_pem(&[&leaf_pem, intermediate_pem]);
        write_verified(&files.chain, full.as_bytes(), FileMode::Public)?;
        write_verified(&files.chain_no_root, no_root.as_bytes(), FileMode::Public)?;
        *stage = IssueStage::ChainsBuilt;

        let info = inspect::certificate_info(certificate.der(), &files.cert)?;
        debug!(service = %profile.service, sans = sans.len(), "staged service certificate");
        Ok((info, sans))
    }

    fn swap_into_place(&self, service: &str, staging: &Path) -> Result<()> {
        let target = self.layout.service_dir(service);
        let retired = self.layout.certs_dir().join(format!(".{service}.old"));
        remove_dir_if_exists(&retired)?;

        if target.exists() {
            std::fs::rename(&target, &retired).map_err(|e| CredError::io(&target, e))?;
        }
        std::fs::rename(staging, &target).map_err(|e| CredError::io(staging, e))?;
        remove_dir_if_exists(&retired)
    }

    /// Write `ca-bundle.crt`: intermediate then root.
    pub fn build_ca_bundle(&self) -> Result<()> {
        let bundle = concat_pem(&[self.intermediate.certificate_pem(), &self.root_pem]);
        let path = self.layout.ca_bundle();
        write_verified(&path, bundle.as_bytes(), FileMode::Public)?;
        info!(path = %path.display(), "wrote CA bundle");
        Ok(())
    }
}
