//! Secret generation and persistence under `keys/`.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use credstore_core::fs::{mode_of, write_verified, FileMode};
use credstore_core::{CredError, Result, SecretEncoding, SecretSpec, StoreLayout};
use ring::rand::{SecureRandom, SystemRandom};
use serde::Serialize;
use tracing::{debug, info};
use zeroize::Zeroizing;

const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const PUNCTUATED: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!#%+,-.:=@^_~";

/// What happened to a secret file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteOutcome {
    Written,
    /// File already existed and overwrite was not requested
    Kept,
}

/// Draws random material from the operating system.
#[derive(Debug)]
pub struct SecretGenerator {
    rng: SystemRandom,
}

impl Default for SecretGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretGenerator {
    pub fn new() -> Self {
        Self {
            rng: SystemRandom::new(),
        }
    }

    fn fill(&self, buf: &mut [u8]) -> Result<()> {
        self.rng
            .fill(buf)
            .map_err(|_| CredError::MissingDependency("system random source unavailable".to_string()))
    }

    fn bytes(&self, len: usize) -> Result<Zeroizing<Vec<u8>>> {
        let mut buf = Zeroizing::new(vec![0u8; len]);
        self.fill(&mut buf)?;
        Ok(buf)
    }

    /// `len` characters drawn uniformly from `charset` by rejection sampling.
    fn from_charset(&self, charset: &[u8], len: usize) -> Result<Zeroizing<String>> {
        // Largest multiple of the charset size that fits in a byte.
        let limit = 256 - (256 % charset.len());
        let mut out = Zeroizing::new(String::with_capacity(len));
        let mut buf = Zeroizing::new([0u8; 64]);

        while out.len() < len {
            self.fill(&mut buf[..])?;
            for &b in buf.iter() {
                if usize::from(b) < limit {
                    out.push(char::from(charset[usize::from(b) % charset.len()]));
                    if out.len() == len {
                        break;
                    }
                }
            }
        }
        Ok(out)
    }

    /// Generate a secret value in the given encoding.
    ///
    /// `length` counts characters for character encodings and random bytes
    /// for byte encodings.
    pub fn generate(&self, encoding: SecretEncoding, length: usize) -> Result<Zeroizing<String>> {
        match encoding {
            SecretEncoding::Alphanumeric => self.from_charset(ALPHANUMERIC, length),
            SecretEncoding::Punctuated => self.from_charset(PUNCTUATED, length),
            SecretEncoding::Base64 => Ok(Zeroizing::new(STANDARD.encode(self.bytes(length)?.as_slice()))),
            SecretEncoding::UrlSafeBase64 => Ok(Zeroizing::new(
                URL_SAFE_NO_PAD.encode(self.bytes(length)?.as_slice()),
            )),
            SecretEncoding::Hex => Ok(Zeroizing::new(hex::encode(self.bytes(length)?.as_slice()))),
        }
    }
}

/// Presence and shape of one secret file, for listings.
#[derive(Debug, Clone, Serialize)]
pub struct SecretStatus {
    pub name: String,
    pub group: &'static str,
    pub present: bool,
    pub length: Option<usize>,
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Reads and writes secret files.
#[derive(Debug)]
pub struct SecretStore<'a> {
    layout: &'a StoreLayout,
    generator: SecretGenerator,
}

impl<'a> SecretStore<'a> {
    pub fn new(layout: &'a StoreLayout) -> Self {
        Self {
            layout,
            generator: SecretGenerator::new(),
        }
    }

    pub fn exists(&self, name: &str) -> bool {
        self.layout.secret_path(name).is_file()
    }

    /// Generate and store a random secret unless one already exists.
    pub fn write_random_secret(
        &self,
        name: &str,
        encoding: SecretEncoding,
        length: usize,
        overwrite: bool,
    ) -> Result<WriteOutcome> {
        if !overwrite && self.exists(name) {
            info!(secret = name, "secret already exists, keeping it");
            return Ok(WriteOutcome::Kept);
        }
        let value = self.generator.generate(encoding, length)?;
        self.store(name, &value)?;
        debug!(secret = name, ?encoding, "generated random secret");
        Ok(WriteOutcome::Written)
    }

    /// Store an operator-supplied value unless the file already exists.
    pub fn write_secret(&self, name: &str, value: &str, overwrite: bool) -> Result<WriteOutcome> {
        if !overwrite && self.exists(name) {
            info!(secret = name, "secret already exists, keeping it");
            return Ok(WriteOutcome::Kept);
        }
        self.store(name, value)?;
        Ok(WriteOutcome::Written)
    }

    fn store(&self, name: &str, value: &str) -> Result<()> {
        let path = self.layout.secret_path(name);
        if value.is_empty() {
            return Err(CredError::write_verification(&path, "refusing to write an empty secret"));
        }
        write_verified(&path, value.as_bytes(), FileMode::Private)?;
        info!(secret = name, path = %path.display(), "wrote secret");
        Ok(())
    }

    /// Read a stored secret, trimmed. `None` if the file does not exist.
    pub fn read(&self, name: &str) -> Result<Option<Zeroizing<String>>> {
        let path = self.layout.secret_path(name);
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let content = Zeroizing::new(content);
                Ok(Some(Zeroizing::new(content.trim().to_string())))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CredError::io(&path, e)),
        }
    }

    /// Listing entry for a catalog secret.
    pub fn status(&self, spec: &SecretSpec, show_values: bool) -> Result<SecretStatus> {
        let path = self.layout.secret_path(&spec.name);
        let value = self.read(&spec.name)?;
        let mode = if value.is_some() {
            Some(format!("{:o}", mode_of(&path)?))
        } else {
            None
        };

        Ok(SecretStatus {
            name: spec.name.clone(),
            group: spec.kind.group(),
            present: value.is_some(),
            length: value.as_ref().map(|v| v.len()),
            mode,
            value: value
                .filter(|_| show_values)
                .map(|v| truncate(&v, 40)),
        })
    }
}

fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        value.to_string()
    } else {
        let head: String = value.chars().take(max).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use credstore_core::Catalog;
    use tempfile::TempDir;

    #[test]
    fn test_database_password_shape() {
        let generator = SecretGenerator::new();
        for _ in 0..50 {
            let value = generator.generate(SecretEncoding::Alphanumeric, 24).unwrap();
            assert_eq!(value.len(), 24);
            assert!(value.chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn test_signing_secret_decodes_to_32_bytes() {
        let generator = SecretGenerator::new();
        let value = generator.generate(SecretEncoding::UrlSafeBase64, 32).unwrap();
        assert_eq!(value.len(), 43);
        let decoded = URL_SAFE_NO_PAD.decode(value.as_bytes()).unwrap();
        assert!(decoded.len() >= 32);
    }

    #[test]
    fn test_other_encodings() {
        let generator = SecretGenerator::new();
        assert_eq!(generator.generate(SecretEncoding::Hex, 16).unwrap().len(), 32);
        assert_eq!(generator.generate(SecretEncoding::Base64, 32).unwrap().len(), 44);
        let punctuated = generator.generate(SecretEncoding::Punctuated, 32).unwrap();
        assert_eq!(punctuated.len(), 32);
        assert!(punctuated.bytes().all(|b| PUNCTUATED.contains(&b)));
    }

    #[test]
    fn test_existing_secret_is_kept() {
        let dir = TempDir::new().unwrap();
        let layout = StoreLayout::new(dir.path());
        let store = SecretStore::new(&layout);

        let first = store
            .write_random_secret("redis_password", SecretEncoding::Alphanumeric, 24, false)
            .unwrap();
        assert_eq!(first, WriteOutcome::Written);
        let before = store.read("redis_password").unwrap().unwrap();

        let second = store
            .write_random_secret("redis_password", SecretEncoding::Alphanumeric, 24, false)
            .unwrap();
        assert_eq!(second, WriteOutcome::Kept);
        assert_eq!(store.read("redis_password").unwrap().unwrap(), before);

        store
            .write_random_secret("redis_password", SecretEncoding::Alphanumeric, 24, true)
            .unwrap();
        assert_ne!(store.read("redis_password").unwrap().unwrap(), before);
    }

    #[test]
    fn test_secret_file_is_private_without_newline() {
        let dir = TempDir::new().unwrap();
        let layout = StoreLayout::new(dir.path());
        let store = SecretStore::new(&layout);
        store.write_secret("oidc_google_client_secret", "abc123", false).unwrap();

        let path = layout.secret_path("oidc_google_client_secret");
        assert_eq!(std::fs::read(&path).unwrap(), b"abc123");
        #[cfg(unix)]
        assert_eq!(mode_of(&path).unwrap(), 0o600);
    }

    #[test]
    fn test_empty_value_is_rejected() {
        let dir = TempDir::new().unwrap();
        let layout = StoreLayout::new(dir.path());
        let store = SecretStore::new(&layout);
        let err = store.write_secret("oidc_google_client_secret", "", false).unwrap_err();
        assert!(matches!(err, CredError::WriteVerificationFailure { .. }));
        assert!(!store.exists("oidc_google_client_secret"));
    }

    #[test]
    fn test_status_truncates_values() {
        let dir = TempDir::new().unwrap();
        let layout = StoreLayout::new(dir.path());
        let store = SecretStore::new(&layout);
        let catalog = Catalog::standard();
        let spec = catalog.get("session_signing_secret").unwrap();
        store
            .write_random_secret(&spec.name, SecretEncoding::UrlSafeBase64, 32, false)
            .unwrap();

        let hidden = store.status(spec, false).unwrap();
        assert!(hidden.present);
        assert_eq!(hidden.length, Some(43));
        assert!(hidden.value.is_none());

        let shown = store.status(spec, true).unwrap().value.unwrap();
        assert!(shown.ends_with("..."));
        assert_eq!(shown.chars().count(), 43);

        let missing = store.status(catalog.get("redis_password").unwrap(), true).unwrap();
        assert!(!missing.present);
        assert!(missing.mode.is_none());
    }
}
