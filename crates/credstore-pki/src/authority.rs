//! Root and intermediate CA lifecycle on disk.

use credstore_core::fs::{write_verified, FileMode};
use credstore_core::{Authority, CredError, Result, StoreLayout};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{IntermediateCa, KeyAlgorithm, RootCa, SerialCounter};

/// Key algorithms and naming for the two authorities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaSettings {
    pub root_key: KeyAlgorithm,
    pub intermediate_key: KeyAlgorithm,
    pub organization: String,
    pub root_name: String,
    pub intermediate_name: String,
}

impl Default for CaSettings {
    fn default() -> Self {
        Self {
            root_key: KeyAlgorithm::Rsa4096,
            intermediate_key: KeyAlgorithm::Rsa4096,
            organization: "API Forge".to_string(),
            root_name: "API Forge Root CA".to_string(),
            intermediate_name: "API Forge Intermediate CA".to_string(),
        }
    }
}

/// What CA material is currently on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaState {
    /// Root and intermediate keys and certificates are present
    Complete,
    /// The root is present but the intermediate is not
    RootOnly,
    /// No usable root
    Absent,
}

/// Result of [`CertificateAuthorityManager::ensure_root_and_intermediate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaOutcome {
    /// Existing material was kept
    Existing,
    /// A new root and intermediate were written
    Generated,
    /// The existing root signed a new intermediate
    IntermediateReissued,
}

impl CaOutcome {
    /// True if anything signed by the old intermediate is now stale.
    #[must_use]
    pub const fn changed(self) -> bool {
        !matches!(self, Self::Existing)
    }
}

/// Creates and refreshes the root and intermediate authorities.
#[derive(Debug)]
pub struct CertificateAuthorityManager<'a> {
    layout: &'a StoreLayout,
    settings: &'a CaSettings,
}

impl<'a> CertificateAuthorityManager<'a> {
    pub const fn new(layout: &'a StoreLayout, settings: &'a CaSettings) -> Self {
        Self { layout, settings }
    }

    fn present(&self, authority: Authority) -> bool {
        self.layout.authority_key(authority).is_file() && self.layout.authority_cert(authority).is_file()
    }

    pub fn state(&self) -> CaState {
        match (self.present(Authority::Root), self.present(Authority::Intermediate)) {
            (true, true) => CaState::Complete,
            (true, false) => CaState::RootOnly,
            (false, _) => CaState::Absent,
        }
    }

    /// Make sure both authorities exist.
    ///
    /// With `force`, both are regenerated regardless of what is on disk.
    /// Backing up the previous material is the caller's job.
    pub fn ensure_root_and_intermediate(&self, force: bool) -> Result<CaOutcome> {
        let state = self.state();
        debug!(?state, force, "checking CA material");

        match (state, force) {
            (CaState::Complete, false) => {
                info!("root and intermediate CA already present, skipping");
                Ok(CaOutcome::Existing)
            }
            (CaState::RootOnly, false) => {
                self.reissue_intermediate()?;
                Ok(CaOutcome::IntermediateReissued)
            }
            _ => {
                self.generate_all()?;
                Ok(CaOutcome::Generated)
            }
        }
    }

    fn generate_all(&self) -> Result<()> {
        let s = self.settings;
        info!(root = %s.root_key, intermediate = %s.intermediate_key, "generating certificate authorities");

        // Everything is built in memory before the first write.
        let mut root_serials = SerialCounter::fresh(self.layout.authority_serial(Authority::Root));
        let root = RootCa::generate(&s.root_name, &s.organization, s.root_key, root_serials.allocate())?;
        let intermediate = IntermediateCa::generate(
            &s.intermediate_name,
            &s.organization,
            s.intermediate_key,
            &root,
            root_serials.allocate(),
        )?;

        // Without an intermediate the next run reissues from whichever root is on disk.
        self.remove_intermediate()?;
        self.write_root(&root)?;
        root_serials.persist()?;
        self.write_intermediate(&intermediate)?;
        info!(root = %root.info.fingerprint, intermediate = %intermediate.info.fingerprint, "certificate authorities written");
        Ok(())
    }

    fn reissue_intermediate(&self) -> Result<()> {
        let s = self.settings;
        let cert_path = self.layout.authority_cert(Authority::Root);
        let key_path = self.layout.authority_key(Authority::Root);
        let cert_pem = std::fs::read_to_string(&cert_path).map_err(|e| CredError::io(&cert_path, e))?;
        let key_pem = std::fs::read_to_string(&key_path).map_err(|e| CredError::io(&key_path, e))?;

        let root = RootCa::load(&cert_pem, &key_pem)?;
        let mut root_serials = SerialCounter::load(self.layout.authority_serial(Authority::Root))?;
        info!(root = %root.info.subject, "intermediate CA missing, reissuing from existing root");

        let intermediate = IntermediateCa::generate(
            &s.intermediate_name,
            &s.organization,
            s.intermediate_key,
            &root,
            root_serials.allocate(),
        )?;

        root_serials.persist()?;
        self.write_intermediate(&intermediate)
    }

    fn remove_intermediate(&self) -> Result<()> {
        for path in [
            self.layout.authority_key(Authority::Intermediate),
            self.layout.authority_cert(Authority::Intermediate),
        ] {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "removed previous intermediate"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(CredError::io(&path, e)),
            }
        }
        Ok(())
    }

    fn write_root(&self, root: &RootCa) -> Result<()> {
        write_verified(
            &self.layout.authority_key(Authority::Root),
            root.private_key_pem().as_bytes(),
            FileMode::Private,
        )?;
        write_verified(
            &self.layout.authority_cert(Authority::Root),
            root.certificate_pem().as_bytes(),
            FileMode::Public,
        )
    }

    fn write_intermediate(&self, intermediate: &IntermediateCa) -> Result<()> {
        write_verified(
            &self.layout.authority_key(Authority::Intermediate),
            intermediate.private_key_pem().as_bytes(),
            FileMode::Private,
        )?;
        write_verified(
            &self.layout.authority_cert(Authority::Intermediate),
            intermediate.certificate_pem().as_bytes(),
            FileMode::Public,
        )?;
        SerialCounter::fresh(self.layout.authority_serial(Authority::Intermediate)).persist()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspect;
    use credstore_core::fs::mode_of;
    use tempfile::TempDir;

    fn fast_settings() -> CaSettings {
        CaSettings {
            root_key: KeyAlgorithm::EcdsaP256,
            intermediate_key: KeyAlgorithm::EcdsaP256,
            ..CaSettings::default()
        }
    }

    fn read(path: &std::path::Path) -> Vec<u8> {
        std::fs::read(path).unwrap()
    }

    #[test]
    fn test_generate_writes_all_artifacts() {
        let dir = TempDir::new().unwrap();
        let layout = StoreLayout::new(dir.path());
        let settings = fast_settings();
        let manager = CertificateAuthorityManager::new(&layout, &settings);

        assert_eq!(manager.state(), CaState::Absent);
        assert_eq!(manager.ensure_root_and_intermediate(false).unwrap(), CaOutcome::Generated);
        assert_eq!(manager.state(), CaState::Complete);

        for authority in [Authority::Root, Authority::Intermediate] {
            assert_eq!(mode_of(&layout.authority_key(authority)).unwrap(), 0o600);
            assert_eq!(mode_of(&layout.authority_cert(authority)).unwrap(), 0o644);
            assert_eq!(mode_of(&layout.authority_serial(authority)).unwrap(), 0o644);
        }
        assert_eq!(
            std::fs::read_to_string(layout.authority_serial(Authority::Root)).unwrap(),
            "1002\n"
        );
        assert_eq!(
            std::fs::read_to_string(layout.authority_serial(Authority::Intermediate)).unwrap(),
            "1000\n"
        );

        let root = inspect::read_pem_certificates(&layout.authority_cert(Authority::Root)).unwrap();
        let intermediate =
            inspect::read_pem_certificates(&layout.authority_cert(Authority::Intermediate)).unwrap();
        inspect::verify_chain(&intermediate, &root[0], "chain").unwrap();
    }

    #[test]
    fn test_second_run_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let layout = StoreLayout::new(dir.path());
        let settings = fast_settings();
        let manager = CertificateAuthorityManager::new(&layout, &settings);
        manager.ensure_root_and_intermediate(false).unwrap();
        let before = read(&layout.authority_cert(Authority::Root));

        assert_eq!(manager.ensure_root_and_intermediate(false).unwrap(), CaOutcome::Existing);
        assert_eq!(read(&layout.authority_cert(Authority::Root)), before);
    }

    #[test]
    fn test_force_regenerates() {
        let dir = TempDir::new().unwrap();
        let layout = StoreLayout::new(dir.path());
        let settings = fast_settings();
        let manager = CertificateAuthorityManager::new(&layout, &settings);
        manager.ensure_root_and_intermediate(false).unwrap();
        let before = read(&layout.authority_key(Authority::Root));

        assert_eq!(manager.ensure_root_and_intermediate(true).unwrap(), CaOutcome::Generated);
        assert_ne!(read(&layout.authority_key(Authority::Root)), before);
    }

    #[test]
    fn test_interrupted_regeneration_does_not_leave_old_intermediate() {
        let dir = TempDir::new().unwrap();
        let layout = StoreLayout::new(dir.path());
        let settings = fast_settings();
        let manager = CertificateAuthorityManager::new(&layout, &settings);
        manager.ensure_root_and_intermediate(false).unwrap();
        let root_before = read(&layout.authority_cert(Authority::Root));

        // Persisting the root serial fails after the new root is on disk.
        let serial = layout.authority_serial(Authority::Root);
        std::fs::remove_file(&serial).unwrap();
        std::fs::create_dir(&serial).unwrap();
        std::fs::write(serial.join("blocker"), "x").unwrap();

        assert!(manager.ensure_root_and_intermediate(true).is_err());
        assert_ne!(read(&layout.authority_cert(Authority::Root)), root_before);
        assert!(!layout.authority_key(Authority::Intermediate).exists());
        assert!(!layout.authority_cert(Authority::Intermediate).exists());
        assert_eq!(manager.state(), CaState::RootOnly);
    }

    #[test]
    fn test_missing_intermediate_is_reissued_from_root() {
        let dir = TempDir::new().unwrap();
        let layout = StoreLayout::new(dir.path());
        let settings = fast_settings();
        let manager = CertificateAuthorityManager::new(&layout, &settings);
        manager.ensure_root_and_intermediate(false).unwrap();
        let root_before = read(&layout.authority_cert(Authority::Root));

        std::fs::remove_file(layout.authority_key(Authority::Intermediate)).unwrap();
        assert_eq!(manager.state(), CaState::RootOnly);
        assert_eq!(
            manager.ensure_root_and_intermediate(false).unwrap(),
            CaOutcome::IntermediateReissued
        );
        assert_eq!(read(&layout.authority_cert(Authority::Root)), root_before);

        let root = inspect::read_pem_certificates(&layout.authority_cert(Authority::Root)).unwrap();
        let intermediate =
            inspect::read_pem_certificates(&layout.authority_cert(Authority::Intermediate)).unwrap();
        inspect::verify_chain(&intermediate, &root[0], "chain").unwrap();
        assert_eq!(
            inspect::certificate_info(&intermediate[0], "i").unwrap().serial,
            "1002"
        );
    }
}
