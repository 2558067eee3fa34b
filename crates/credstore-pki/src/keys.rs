//! Private key generation and loading.

use credstore_core::{CredError, Result};
use rcgen::KeyPair;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::rand_core::OsRng;
use rsa::RsaPrivateKey;
use tracing::debug;
use zeroize::Zeroizing;

use crate::KeyAlgorithm;

/// A freshly generated key pair together with its PKCS#8 PEM encoding.
pub struct GeneratedKey {
    pub key_pair: KeyPair,
    pub pem: Zeroizing<String>,
}

impl std::fmt::Debug for GeneratedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratedKey").finish_non_exhaustive()
    }
}

/// Generate a new private key.
pub fn generate_key(algorithm: KeyAlgorithm) -> Result<GeneratedKey> {
    debug!(%algorithm, "generating private key");
    match algorithm {
        KeyAlgorithm::EcdsaP256 => generate_ecdsa(&rcgen::PKCS_ECDSA_P256_SHA256),
        KeyAlgorithm::EcdsaP384 => generate_ecdsa(&rcgen::PKCS_ECDSA_P384_SHA384),
        KeyAlgorithm::Rsa2048 => generate_rsa(2048),
        KeyAlgorithm::Rsa4096 => generate_rsa(4096),
    }
}

/// Load a PKCS#8 PEM private key, detecting its algorithm.
pub fn load_key(pem: &str) -> Result<KeyPair> {
    KeyPair::from_pem(pem).map_err(|e| CredError::Crypto(format!("failed to load private key: {e}")))
}

fn generate_ecdsa(alg: &'static rcgen::SignatureAlgorithm) -> Result<GeneratedKey> {
    let key_pair = KeyPair::generate_for(alg)
        .map_err(|e| CredError::Crypto(format!("ECDSA key generation failed: {e}")))?;
    let pem = Zeroizing::new(key_pair.serialize_pem());
    Ok(GeneratedKey { key_pair, pem })
}

fn generate_rsa(bits: usize) -> Result<GeneratedKey> {
    let private = RsaPrivateKey::new(&mut OsRng, bits)
        .map_err(|e| CredError::Crypto(format!("RSA-{bits} key generation failed: {e}")))?;
    let pem = private
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| CredError::Crypto(format!("RSA-{bits} key encoding failed: {e}")))?;
    let key_pair = KeyPair::from_pem_and_sign_algo(&pem, &rcgen::PKCS_RSA_SHA256)
        .map_err(|e| CredError::Crypto(format!("RSA-{bits} key rejected by signer: {e}")))?;
    Ok(GeneratedKey { key_pair, pem })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ecdsa_roundtrip_through_pem() {
        let key = generate_key(KeyAlgorithm::EcdsaP256).unwrap();
        assert!(key.pem.contains("BEGIN PRIVATE KEY"));

        let loaded = load_key(&key.pem).unwrap();
        assert_eq!(loaded.public_key_raw(), key.key_pair.public_key_raw());
    }

    #[test]
    fn test_p384_key() {
        let key = generate_key(KeyAlgorithm::EcdsaP384).unwrap();
        assert!(load_key(&key.pem).is_ok());
    }

    #[test]
    #[ignore = "RSA generation is slow in debug builds"]
    fn test_rsa_2048_key() {
        let key = generate_key(KeyAlgorithm::Rsa2048).unwrap();
        let loaded = load_key(&key.pem).unwrap();
        assert_eq!(loaded.public_key_raw(), key.key_pair.public_key_raw());
    }

    #[test]
    fn test_load_garbage_fails() {
        assert!(load_key("not a key").is_err());
    }
}
