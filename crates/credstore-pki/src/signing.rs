//! Certificate profiles and request signing shared by every authority.

use credstore_core::{CredError, Result};
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, CertificateSigningRequestParams,
    DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose,
};

use crate::{CertificateType, ValidityPeriod};

/// Subject name with a common name and, if non-empty, an organization.
pub(crate) fn distinguished_name(common_name: &str, organization: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    if !organization.is_empty() {
        dn.push(DnType::OrganizationName, organization);
    }
    dn
}

/// Apply the extensions, validity and serial for a certificate type.
pub(crate) fn apply_profile(params: &mut CertificateParams, cert_type: CertificateType, serial: u64) {
    match cert_type {
        CertificateType::Root => {
            params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
            params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
            params.extended_key_usages = Vec::new();
        }
        // May sign leaves, never further CAs
        CertificateType::Intermediate => {
            params.is_ca = IsCa::Ca(BasicConstraints::Constrained(0));
            params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
            params.extended_key_usages = Vec::new();
        }
        CertificateType::Service => {
            params.is_ca = IsCa::ExplicitNoCa;
            params.key_usages = vec![
                KeyUsagePurpose::DigitalSignature,
                KeyUsagePurpose::KeyEncipherment,
            ];
            params.extended_key_usages = vec![
                ExtendedKeyUsagePurpose::ServerAuth,
                ExtendedKeyUsagePurpose::ClientAuth,
            ];
        }
    }

    let validity = ValidityPeriod::for_type(cert_type);
    let now = time::OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now + time::Duration::days(i64::from(validity.days()));
    params.serial_number = Some(serial.into());
    params.use_authority_key_identifier_extension = cert_type != CertificateType::Root;
}

/// Subject alternative names from DNS names and IP literals.
pub(crate) fn subject_alt_names(entries: &[String]) -> Result<Vec<rcgen::SanType>> {
    let params = CertificateParams::new(entries.to_vec())
        .map_err(|e| CredError::Crypto(format!("invalid subject alternative name: {e}")))?;
    Ok(params.subject_alt_names)
}

/// Build a PEM certificate signing request for `key_pair`.
pub(crate) fn create_request(params: &CertificateParams, key_pair: &KeyPair) -> Result<String> {
    params
        .serialize_request(key_pair)
        .and_then(|csr| csr.pem())
        .map_err(|e| CredError::Crypto(format!("failed to build signing request: {e}")))
}

/// Sign a PEM request with an issuer, overriding everything but subject and public key.
pub(crate) fn sign_request(
    csr_pem: &str,
    cert_type: CertificateType,
    sans: &[String],
    serial: u64,
    issuer: &Certificate,
    issuer_key: &KeyPair,
) -> Result<Certificate> {
    let mut request = CertificateSigningRequestParams::from_pem(csr_pem)
        .map_err(|e| CredError::Crypto(format!("failed to parse signing request: {e}")))?;

    apply_profile(&mut request.params, cert_type, serial);
    request.params.subject_alt_names = subject_alt_names(sans)?;

    request
        .signed_by(issuer, issuer_key)
        .map_err(|e| CredError::Crypto(format!("failed to sign {cert_type:?} certificate: {e}")))
}

/// Rebuild an issuer handle from a stored CA certificate and its key.
///
/// rcgen signs with an in-memory `Certificate`; re-signing the stored
/// parameters yields one with the same subject and key identifier, while
/// the certificate on disk stays authoritative.
pub(crate) fn issuer_from_pem(cert_pem: &str, key_pair: &KeyPair) -> Result<Certificate> {
    let params = CertificateParams::from_ca_cert_pem(cert_pem)
        .map_err(|e| CredError::Crypto(format!("failed to read CA certificate: {e}")))?;
    params
        .self_signed(key_pair)
        .map_err(|e| CredError::Crypto(format!("failed to load CA signer: {e}")))
}
