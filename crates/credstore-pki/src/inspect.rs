//! Reading issued material back off disk.
//!
//! Everything here works on DER bytes so the same checks apply to freshly
//! issued certificates and to files found in the store.

use chrono::{DateTime, TimeZone, Utc};
use credstore_core::{CredError, Result};
use rcgen::KeyPair;
use ring::digest::{digest, SHA256};
use std::path::Path;
use tracing::debug;
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;

use crate::{CertificateInfo, CertificateType};

/// SHA-256 of DER bytes, lowercase hex.
#[must_use]
pub fn sha256_fingerprint(der: &[u8]) -> String {
    hex::encode(digest(&SHA256, der).as_ref())
}

/// Every `CERTIFICATE` block in a PEM buffer, in file order.
pub fn parse_pem_certificates(bytes: &[u8], path: impl AsRef<Path>) -> Result<Vec<Vec<u8>>> {
    let pems = pem::parse_many(bytes).map_err(|e| CredError::cert_parse(&path, e))?;
    let certs: Vec<Vec<u8>> = pems
        .into_iter()
        .filter(|p| p.tag() == "CERTIFICATE")
        .map(pem::Pem::into_contents)
        .collect();
    debug!(path = %path.as_ref().display(), count = certs.len(), "parsed PEM certificates");
    Ok(certs)
}

/// Read and split a PEM certificate file.
pub fn read_pem_certificates(path: &Path) -> Result<Vec<Vec<u8>>> {
    let bytes = std::fs::read(path).map_err(|e| CredError::io(path, e))?;
    parse_pem_certificates(&bytes, path)
}

/// The first certificate in a PEM buffer.
pub fn first_certificate(bytes: &[u8], path: impl AsRef<Path>) -> Result<Vec<u8>> {
    parse_pem_certificates(bytes, &path)?
        .into_iter()
        .next()
        .ok_or_else(|| CredError::cert_parse(&path, "no certificate found"))
}

fn parse<'a>(der: &'a [u8], path: &Path) -> Result<X509Certificate<'a>> {
    X509Certificate::from_der(der)
        .map(|(_, cert)| cert)
        .map_err(|e| CredError::cert_parse(path, e))
}

fn is_ca(cert: &X509Certificate<'_>) -> bool {
    matches!(cert.basic_constraints(), Ok(Some(bc)) if bc.value.ca)
}

fn common_name(name: &x509_parser::x509::X509Name<'_>) -> String {
    name.iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map_or_else(|| name.to_string(), ToString::to_string)
}

fn asn1_to_utc(t: x509_parser::time::ASN1Time) -> DateTime<Utc> {
    Utc.timestamp_opt(t.timestamp(), 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Extract the metadata the store reports for a certificate.
pub fn certificate_info(der: &[u8], path: impl AsRef<Path>) -> Result<CertificateInfo> {
    let cert = parse(der, path.as_ref())?;

    let self_issued = cert.subject().as_raw() == cert.issuer().as_raw();
    let cert_type = match (is_ca(&cert), self_issued) {
        (true, true) => CertificateType::Root,
        (true, false) => CertificateType::Intermediate,
        (false, _) => CertificateType::Service,
    };

    Ok(CertificateInfo {
        serial: format!("{:X}", cert.serial),
        subject: common_name(cert.subject()),
        issuer: common_name(cert.issuer()),
        not_before: asn1_to_utc(cert.validity().not_before),
        not_after: asn1_to_utc(cert.validity().not_after),
        fingerprint: sha256_fingerprint(der),
        cert_type,
    })
}

/// DNS and IP entries from the subject alternative name extension.
pub fn subject_alt_names(der: &[u8], path: impl AsRef<Path>) -> Result<Vec<String>> {
    use x509_parser::extensions::GeneralName;

    let cert = parse(der, path.as_ref())?;
    let Ok(Some(san)) = cert.subject_alternative_name() else {
        return Ok(Vec::new());
    };

    Ok(san
        .value
        .general_names
        .iter()
        .filter_map(|name| match name {
            GeneralName::DNSName(dns) => Some((*dns).to_string()),
            GeneralName::IPAddress(bytes) => ip_from_bytes(bytes).map(|ip| ip.to_string()),
            _ => None,
        })
        .collect())
}

fn ip_from_bytes(bytes: &[u8]) -> Option<std::net::IpAddr> {
    match bytes.len() {
        4 => <[u8; 4]>::try_from(bytes).ok().map(std::net::IpAddr::from),
        16 => <[u8; 16]>::try_from(bytes).ok().map(std::net::IpAddr::from),
        _ => None,
    }
}

/// True if `key_pair` holds the private half of the certificate's public key.
pub fn key_matches_certificate(key_pair: &KeyPair, der: &[u8], path: impl AsRef<Path>) -> Result<bool> {
    let cert = parse(der, path.as_ref())?;
    Ok(cert.public_key().subject_public_key.data.as_ref() == key_pair.public_key_raw())
}

/// Verify a leaf-first chain up to `anchor`.
///
/// Each certificate must name its successor (or the anchor) as issuer, be
/// signed by it, and every issuer must be a CA. If the chain ends with the
/// anchor itself, the anchor's self-signature is checked as well.
pub fn verify_chain(chain: &[Vec<u8>], anchor: &[u8], path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if chain.is_empty() {
        return Err(CredError::cert_parse(path, "empty certificate chain"));
    }

    let anchor_cert = parse(anchor, path)?;
    let parsed = chain
        .iter()
        .map(|der| parse(der, path))
        .collect::<Result<Vec<_>>>()?;

    for (index, cert) in parsed.iter().enumerate() {
        let is_anchor = chain[index].as_slice() == anchor;
        let issuer = if is_anchor {
            &anchor_cert
        } else {
            parsed.get(index + 1).unwrap_or(&anchor_cert)
        };

        if cert.issuer().as_raw() != issuer.subject().as_raw() {
            return Err(CredError::cert_parse(
                path,
                format!(
                    "certificate {index} ({}) is not issued by {}",
                    common_name(cert.subject()),
                    common_name(issuer.subject())
                ),
            ));
        }
        if !is_ca(issuer) {
            return Err(CredError::cert_parse(
                path,
                format!("issuer {} is not a CA", common_name(issuer.subject())),
            ));
        }
        cert.verify_signature(Some(issuer.public_key())).map_err(|e| {
            CredError::cert_parse(
                path,
                format!("bad signature on {}: {e}", common_name(cert.subject())),
            )
        })?;

        if is_anchor {
            break;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IntermediateCa, KeyAlgorithm, RootCa};

    fn chain() -> (RootCa, IntermediateCa) {
        let root = RootCa::generate("Inspect Root", "Test", KeyAlgorithm::EcdsaP256, 0x1000).unwrap();
        let intermediate =
            IntermediateCa::generate("Inspect Intermediate", "Test", KeyAlgorithm::EcdsaP256, &root, 0x1001)
                .unwrap();
        (root, intermediate)
    }

    fn der(pem: &str) -> Vec<u8> {
        first_certificate(pem.as_bytes(), "test").unwrap()
    }

    #[test]
    fn test_sha256_fingerprint() {
        assert_eq!(
            sha256_fingerprint(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_parse_bundle_keeps_order() {
        let (root, intermediate) = chain();
        let bundle = format!("{}{}", intermediate.certificate_pem(), root.certificate_pem());
        let certs = parse_pem_certificates(bundle.as_bytes(), "bundle").unwrap();
        assert_eq!(certs.len(), 2);
        assert_eq!(certificate_info(&certs[0], "b").unwrap().cert_type, CertificateType::Intermediate);
        assert_eq!(certificate_info(&certs[1], "b").unwrap().cert_type, CertificateType::Root);
    }

    #[test]
    fn test_first_certificate_rejects_empty() {
        assert!(first_certificate(b"", "empty").is_err());
    }

    #[test]
    fn test_chain_with_and_without_anchor() {
        let (root, intermediate) = chain();
        let root_der = der(root.certificate_pem());
        let int_der = der(intermediate.certificate_pem());

        verify_chain(&[int_der.clone()], &root_der, "c").unwrap();
        verify_chain(&[int_der.clone(), root_der.clone()], &root_der, "c").unwrap();
        verify_chain(&[root_der.clone()], &root_der, "c").unwrap();
    }

    #[test]
    fn test_chain_against_foreign_root_fails() {
        let (_, intermediate) = chain();
        let other = RootCa::generate("Other Root", "Test", KeyAlgorithm::EcdsaP256, 1).unwrap();
        let result = verify_chain(
            &[der(intermediate.certificate_pem())],
            &der(other.certificate_pem()),
            "c",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_key_match() {
        let (root, intermediate) = chain();
        let root_key = crate::load_key(root.private_key_pem()).unwrap();
        assert!(key_matches_certificate(&root_key, &der(root.certificate_pem()), "k").unwrap());
        assert!(!key_matches_certificate(&root_key, &der(intermediate.certificate_pem()), "k").unwrap());
    }
}
