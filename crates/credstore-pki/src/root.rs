//! Root Certificate Authority.
//!
//! The root signs exactly one thing: the intermediate. Service
//! certificates never chain directly to it.

use credstore_core::{CredError, Result};
use rcgen::{Certificate, CertificateParams, KeyPair};
use zeroize::Zeroizing;

use crate::keys::{generate_key, load_key};
use crate::signing::{apply_profile, distinguished_name, issuer_from_pem, sign_request};
use crate::{inspect, CertificateInfo, CertificateType, KeyAlgorithm};

/// Self-signed root CA.
pub struct RootCa {
    key_pair: KeyPair,
    /// Issuer handle used for signing
    certificate: Certificate,
    cert_pem: String,
    key_pem: Zeroizing<String>,
    pub info: CertificateInfo,
}

impl RootCa {
    /// Generate a new root key and self-signed certificate.
    pub fn generate(
        common_name: &str,
        organization: &str,
        algorithm: KeyAlgorithm,
        serial: u64,
    ) -> Result<Self> {
        let key = generate_key(algorithm)?;

        let mut params = CertificateParams::default();
        params.distinguished_name = distinguished_name(common_name, organization);
        apply_profile(&mut params, CertificateType::Root, serial);

        let certificate = params
            .self_signed(&key.key_pair)
            .map_err(|e| CredError::Crypto(format!("failed to self-sign root CA: {e}")))?;
        let cert_pem = certificate.pem();
        let info = inspect::certificate_info(certificate.der(), "root-ca.crt")?;

        Ok(Self {
            key_pair: key.key_pair,
            certificate,
            cert_pem,
            key_pem: key.pem,
            info,
        })
    }

    /// Load a stored root from its certificate and key PEM.
    pub fn load(cert_pem: &str, key_pem: &str) -> Result<Self> {
        let key_pair = load_key(key_pem)?;
        let der = inspect::first_certificate(cert_pem.as_bytes(), "root-ca.crt")?;
        if !inspect::key_matches_certificate(&key_pair, &der, "root-ca.crt")? {
            return Err(CredError::Crypto(
                "root CA key does not match root CA certificate".to_string(),
            ));
        }
        let info = inspect::certificate_info(&der, "root-ca.crt")?;
        let certificate = issuer_from_pem(cert_pem, &key_pair)?;

        Ok(Self {
            key_pair,
            certificate,
            cert_pem: cert_pem.to_string(),
            key_pem: Zeroizing::new(key_pem.to_string()),
            info,
        })
    }

    /// Sign an intermediate CA request.
    pub fn sign_intermediate(&self, csr_pem: &str, serial: u64) -> Result<Certificate> {
        sign_request(
            csr_pem,
            CertificateType::Intermediate,
            &[],
            serial,
            &self.certificate,
            &self.key_pair,
        )
    }

    pub fn certificate_pem(&self) -> &str {
        &self.cert_pem
    }

    pub fn private_key_pem(&self) -> &str {
        &self.key_pem
    }
}

impl std::fmt::Debug for RootCa {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootCa").field("info", &self.info).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use x509_parser::prelude::*;

    #[test]
    fn test_generate_root() {
        let root = RootCa::generate("Test Root CA", "Test", KeyAlgorithm::EcdsaP256, 0x1000).unwrap();
        assert!(root.certificate_pem().contains("BEGIN CERTIFICATE"));
        assert!(root.private_key_pem().contains("PRIVATE KEY"));
        assert_eq!(root.info.cert_type, CertificateType::Root);
        assert_eq!(root.info.subject, "Test Root CA");
        assert_eq!(root.info.serial, "1000");

        let der = inspect::first_certificate(root.certificate_pem().as_bytes(), "root").unwrap();
        let (_, cert) = parse_x509_certificate(&der).unwrap();
        let bc = cert.basic_constraints().unwrap().unwrap();
        assert!(bc.critical);
        assert!(bc.value.ca);
        let ku = cert.key_usage().unwrap().unwrap();
        assert!(ku.critical);
        assert!(ku.value.key_cert_sign());
        assert!(ku.value.crl_sign());
        assert!(!ku.value.digital_signature());

        let days = (root.info.not_after - root.info.not_before).num_days();
        assert_eq!(days, 3650);
    }

    #[test]
    fn test_load_rejects_mismatched_key() {
        let a = RootCa::generate("A", "Test", KeyAlgorithm::EcdsaP256, 1).unwrap();
        let b = RootCa::generate("B", "Test", KeyAlgorithm::EcdsaP256, 1).unwrap();

        assert!(RootCa::load(a.certificate_pem(), a.private_key_pem()).is_ok());
        assert!(RootCa::load(a.certificate_pem(), b.private_key_pem()).is_err());
    }
}
