//! Intermediate Certificate Authority.
//!
//! Intermediates are signed by the root and do the actual work.
//! They can be replaced without touching the root.

use credstore_core::{CredError, Result};
use rcgen::{Certificate, CertificateParams, KeyPair};
use zeroize::Zeroizing;

use crate::keys::{generate_key, load_key};
use crate::signing::{create_request, distinguished_name, issuer_from_pem, sign_request};
use crate::{inspect, CertificateInfo, CertificateType, KeyAlgorithm, RootCa};

/// Intermediate Certificate Authority.
///
/// Signs service certificates; `pathlen:0` stops it from minting further CAs.
pub struct IntermediateCa {
    /// Key pair for signing
    key_pair: KeyPair,
    /// Issuer handle used for signing
    certificate: Certificate,
    /// Signed certificate as issued by the root
    cert_pem: String,
    /// Private key
    key_pem: Zeroizing<String>,
    /// Metadata
    pub info: CertificateInfo,
}

impl IntermediateCa {
    /// Create a new intermediate CA signed by the root.
    ///
    /// The signing request only exists for the duration of this call.
    pub fn generate(
        common_name: &str,
        organization: &str,
        algorithm: KeyAlgorithm,
        root: &RootCa,
        serial: u64,
    ) -> Result<Self> {
        let key = generate_key(algorithm)?;

        let mut params = CertificateParams::default();
        params.distinguished_name = distinguished_name(common_name, organization);
        let csr_pem = create_request(&params, &key.key_pair)?;

        let certificate = root.sign_intermediate(&csr_pem, serial)?;
        let cert_pem = certificate.pem();
        let info = inspect::certificate_info(certificate.der(), "intermediate-ca.crt")?;

        Ok(Self {
            key_pair: key.key_pair,
            certificate,
            cert_pem,
            key_pem: key.pem,
            info,
        })
    }

    /// Load a stored intermediate from its certificate and key PEM.
    pub fn load(cert_pem: &str, key_pem: &str) -> Result<Self> {
        let key_pair = load_key(key_pem)?;
        let der = inspect::first_certificate(cert_pem.as_bytes(), "intermediate-ca.crt")?;
        if !inspect::key_matches_certificate(&key_pair, &der, "intermediate-ca.crt")? {
            return Err(CredError::Crypto(
                "intermediate CA key does not match intermediate CA certificate".to_string(),
            ));
        }
        let info = inspect::certificate_info(&der, "intermediate-ca.crt")?;
        let certificate = issuer_from_pem(cert_pem, &key_pair)?;

        Ok(Self {
            key_pair,
            certificate,
            cert_pem: cert_pem.to_string(),
            key_pem: Zeroizing::new(key_pem.to_string()),
            info,
        })
    }

    /// Sign a service certificate request with the given SAN entries.
    pub fn sign_service(&self, csr_pem: &str, sans: &[String], serial: u64) -> Result<Certificate> {
        sign_request(
            csr_pem,
            CertificateType::Service,
            sans,
            serial,
            &self.certificate,
            &self.key_pair,
        )
    }

    pub fn certificate_pem(&self) -> &str {
        &self.cert_pem
    }

    /// Get the private key PEM.
    pub fn private_key_pem(&self) -> &str {
        &self.key_pem
    }
}

impl std::fmt::Debug for IntermediateCa {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntermediateCa")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use x509_parser::prelude::*;

    fn root() -> RootCa {
        RootCa::generate("Test Root", "Test", KeyAlgorithm::EcdsaP256, 0x1000).unwrap()
    }

    #[test]
    fn test_generate_intermediate() {
        let root = root();
        let intermediate =
            IntermediateCa::generate("Test Intermediate", "Test", KeyAlgorithm::EcdsaP256, &root, 0x1001)
                .unwrap();

        assert!(intermediate.certificate_pem().contains("BEGIN CERTIFICATE"));
        assert_eq!(intermediate.info.issuer, "Test Root");
        assert_eq!(intermediate.info.cert_type, CertificateType::Intermediate);
        assert_eq!(intermediate.info.serial, "1001");

        let der = inspect::first_certificate(intermediate.certificate_pem().as_bytes(), "i").unwrap();
        let (_, cert) = parse_x509_certificate(&der).unwrap();
        let bc = cert.basic_constraints().unwrap().unwrap();
        assert!(bc.value.ca);
        assert_eq!(bc.value.path_len_constraint, Some(0));

        let root_der = inspect::first_certificate(root.certificate_pem().as_bytes(), "r").unwrap();
        inspect::verify_chain(&[der], &root_der, "chain").unwrap();

        let days = (intermediate.info.not_after - intermediate.info.not_before).num_days();
        assert_eq!(days, 1825);
    }

    #[test]
    fn test_loaded_root_still_signs_verifiable_intermediates() {
        let original = root();
        let reloaded = RootCa::load(original.certificate_pem(), original.private_key_pem()).unwrap();

        let intermediate =
            IntermediateCa::generate("Reissued", "Test", KeyAlgorithm::EcdsaP256, &reloaded, 0x1002)
                .unwrap();
        let der = inspect::first_certificate(intermediate.certificate_pem().as_bytes(), "i").unwrap();
        let root_der = inspect::first_certificate(original.certificate_pem().as_bytes(), "r").unwrap();
        inspect::verify_chain(&[der], &root_der, "chain").unwrap();
    }
}
