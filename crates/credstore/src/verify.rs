//! Advisory verification of the live store.
//!
//! Nothing here aborts on a finding: every problem becomes a
//! [`Deficiency`] in the report. Permission drift is repaired in place
//! and still reported.

use chrono::{DateTime, Utc};
use credstore_core::fs::{mode_of, set_mode, FileMode};
use credstore_core::{Authority, Catalog, Result, StoreLayout};
use credstore_pki::inspect;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Certificates expiring sooner than this are flagged.
pub const EXPIRY_WINDOW_HOURS: i64 = 24;

/// What is wrong with an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DeficiencyKind {
    Missing,
    TooShort { length: usize, minimum: usize },
    /// Found with the wrong mode; already corrected
    PermissionDrift { found: String, expected: String },
    /// Found with the wrong mode and the repair failed
    RepairFailed { found: String, expected: String, reason: String },
    Expiring { not_after: DateTime<Utc> },
    Expired { not_after: DateTime<Utc> },
    Unreadable { reason: String },
    ChainInvalid { reason: String },
}

impl std::fmt::Display for DeficiencyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing => write!(f, "missing"),
            Self::TooShort { length, minimum } => {
                write!(f, "too short ({length} < {minimum})")
            }
            Self::PermissionDrift { found, expected } => {
                write!(f, "mode {found}, repaired to {expected}")
            }
            Self::RepairFailed { found, expected, reason } => {
                write!(f, "mode {found}, repair to {expected} failed: {reason}")
            }
            Self::Expiring { not_after } => write!(f, "expires soon ({not_after})"),
            Self::Expired { not_after } => write!(f, "expired ({not_after})"),
            Self::Unreadable { reason } => write!(f, "unreadable: {reason}"),
            Self::ChainInvalid { reason } => write!(f, "chain invalid: {reason}"),
        }
    }
}

/// One finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deficiency {
    /// Secret name or path relative to the store root
    pub subject: String,
    pub path: PathBuf,
    #[serde(flatten)]
    pub kind: DeficiencyKind,
}

/// Outcome of a full verification.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VerifyReport {
    /// Number of artifacts inspected
    pub checked: usize,
    pub deficiencies: Vec<Deficiency>,
}

impl VerifyReport {
    pub fn passed(&self) -> bool {
        self.deficiencies.is_empty()
    }

    fn push(&mut self, subject: impl Into<String>, path: &Path, kind: DeficiencyKind) {
        let subject = subject.into();
        warn!(subject = %subject, finding = %kind, "verification finding");
        self.deficiencies.push(Deficiency {
            subject,
            path: path.to_path_buf(),
            kind,
        });
    }
}

/// Which modes a file may have.
#[derive(Debug, Clone, Copy)]
enum ModeRule {
    Exactly(FileMode),
    /// Serial trackers: 644 or 600 are both fine
    Either,
}

impl ModeRule {
    const fn accepts(self, bits: u32) -> bool {
        match self {
            Self::Exactly(mode) => bits == mode.bits(),
            Self::Either => bits == 0o644 || bits == 0o600,
        }
    }

    const fn repair_to(self) -> FileMode {
        match self {
            Self::Exactly(mode) => mode,
            Self::Either => FileMode::Public,
        }
    }
}

/// Checks secrets and PKI artifacts on disk.
#[derive(Debug)]
pub struct Verifier<'a> {
    layout: &'a StoreLayout,
    catalog: &'a Catalog,
    services: &'a [String],
    now: DateTime<Utc>,
    repair: fn(&Path, FileMode) -> Result<()>,
}

impl<'a> Verifier<'a> {
    pub fn new(layout: &'a StoreLayout, catalog: &'a Catalog, services: &'a [String]) -> Self {
        Self {
            layout,
            catalog,
            services,
            now: Utc::now(),
            repair: set_mode,
        }
    }

    /// Check expiry against a fixed instant instead of the current time.
    #[must_use]
    pub const fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    #[cfg(test)]
    const fn with_repair(mut self, repair: fn(&Path, FileMode) -> Result<()>) -> Self {
        self.repair = repair;
        self
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(self.layout.root())
            .unwrap_or(path)
            .display()
            .to_string()
    }

    pub fn verify_all(&self) -> Result<VerifyReport> {
        let mut report = VerifyReport::default();
        self.verify_secrets(&mut report)?;

        if self.layout.certs_dir().is_dir() {
            self.verify_pki(&mut report)?;
        } else {
            debug!("no certs directory, skipping PKI verification");
        }

        info!(
            checked = report.checked,
            deficiencies = report.deficiencies.len(),
            "verification finished"
        );
        Ok(report)
    }

    /// Check the mode, repairing drift. Returns false if the file is missing.
    fn check_mode(&self, report: &mut VerifyReport, subject: &str, path: &Path, rule: ModeRule) -> Result<bool> {
        let bits = match mode_of(path) {
            Ok(bits) => bits,
            Err(_) if !path.exists() => {
                report.push(subject, path, DeficiencyKind::Missing);
                return Ok(false);
            }
            Err(e) => {
                report.push(subject, path, DeficiencyKind::Unreadable { reason: e.to_string() });
                return Ok(false);
            }
        };
        if !rule.accepts(bits) {
            let target = rule.repair_to();
            let found = format!("{bits:o}");
            let expected = format!("{:o}", target.bits());
            let kind = match (self.repair)(path, target) {
                Ok(()) => DeficiencyKind::PermissionDrift { found, expected },
                Err(e) => DeficiencyKind::RepairFailed {
                    found,
                    expected,
                    reason: e.to_string(),
                },
            };
            report.push(subject, path, kind);
        }
        Ok(true)
    }

    fn verify_secrets(&self, report: &mut VerifyReport) -> Result<()> {
        let policy = self.catalog.policy();
        for spec in self.catalog.iter() {
            report.checked += 1;
            let path = self.layout.secret_path(&spec.name);
            if !self.check_mode(report, &spec.name, &path, ModeRule::Exactly(FileMode::Private))? {
                continue;
            }

            let length = match std::fs::read_to_string(&path) {
                Ok(content) => content.trim().len(),
                Err(e) => {
                    report.push(&spec.name, &path, DeficiencyKind::Unreadable { reason: e.to_string() });
                    continue;
                }
            };
            let minimum = policy.min_length(&spec.name).unwrap_or(spec.min_length);
            if length < minimum {
                report.push(&spec.name, &path, DeficiencyKind::TooShort { length, minimum });
            }
        }
        Ok(())
    }

    /// Check one certificate file. Returns its DER blocks if readable.
    fn check_certificate(&self, report: &mut VerifyReport, path: &Path) -> Result<Option<Vec<Vec<u8>>>> {
        report.checked += 1;
        let subject = self.relative(path);
        if !self.check_mode(report, &subject, path, ModeRule::Exactly(FileMode::Public))? {
            return Ok(None);
        }

        let ders = match inspect::read_pem_certificates(path) {
            Ok(ders) if !ders.is_empty() => ders,
            Ok(_) => {
                report.push(&subject, path, DeficiencyKind::Unreadable { reason: "no certificate found".to_string() });
                return Ok(None);
            }
            Err(e) => {
                report.push(&subject, path, DeficiencyKind::Unreadable { reason: e.to_string() });
                return Ok(None);
            }
        };

        match inspect::certificate_info(&ders[0], path) {
            Ok(info) if info.is_expired(self.now) => {
                report.push(&subject, path, DeficiencyKind::Expired { not_after: info.not_after });
            }
            Ok(info) if info.expires_within(self.now, chrono::Duration::hours(EXPIRY_WINDOW_HOURS)) => {
                report.push(&subject, path, DeficiencyKind::Expiring { not_after: info.not_after });
            }
            Ok(_) => {}
            Err(e) => {
                report.push(&subject, path, DeficiencyKind::Unreadable { reason: e.to_string() });
                return Ok(None);
            }
        }
        Ok(Some(ders))
    }

    fn check_file(&self, report: &mut VerifyReport, path: &Path, rule: ModeRule) -> Result<()> {
        report.checked += 1;
        let subject = self.relative(path);
        self.check_mode(report, &subject, path, rule).map(|_| ())
    }

    fn check_chain(&self, report: &mut VerifyReport, path: &Path, chain: &[Vec<u8>], anchor: &[u8]) {
        if let Err(e) = inspect::verify_chain(chain, anchor, path) {
            report.push(self.relative(path), path, DeficiencyKind::ChainInvalid { reason: e.to_string() });
        }
    }

    /// Configured services plus any service directory found on disk.
    fn services(&self) -> Result<BTreeSet<String>> {
        let mut services: BTreeSet<String> = self.services.iter().cloned().collect();
        let certs = self.layout.certs_dir();
        let entries = std::fs::read_dir(&certs).map_err(|e| credstore_core::CredError::io(&certs, e))?;
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.path().is_dir() && !name.starts_with('.') {
                services.insert(name);
            }
        }
        Ok(services)
    }

    fn verify_pki(&self, report: &mut VerifyReport) -> Result<()> {
        let private = ModeRule::Exactly(FileMode::Private);

        let mut anchors = Vec::with_capacity(2);
        for authority in [Authority::Root, Authority::Intermediate] {
            self.check_file(report, &self.layout.authority_key(authority), private)?;
            self.check_file(report, &self.layout.authority_serial(authority), ModeRule::Either)?;
            let cert = self.layout.authority_cert(authority);
            anchors.push((cert.clone(), self.check_certificate(report, &cert)?));
        }

        let root = anchors[0].1.as_ref().map(|ders| ders[0].clone());
        let intermediate = anchors[1].1.as_ref().map(|ders| ders[0].clone());

        if let (Some(root), Some(intermediate)) = (&root, &intermediate) {
            self.check_chain(report, &anchors[1].0, &[intermediate.clone()], root);
        }

        let bundle_path = self.layout.ca_bundle();
        if let Some(bundle) = self.check_certificate(report, &bundle_path)? {
            if let (Some(root), Some(intermediate)) = (&root, &intermediate) {
                if bundle.len() != 2 || &bundle[0] != intermediate || &bundle[1] != root {
                    report.push(
                        self.relative(&bundle_path),
                        &bundle_path,
                        DeficiencyKind::ChainInvalid {
                            reason: "bundle does not hold exactly the intermediate and root".to_string(),
                        },
                    );
                }
            }
        }

        for service in self.services()? {
            let files = self.layout.service_files(&service);
            self.check_file(report, &files.key, private)?;
            self.check_certificate(report, &files.cert)?;

            let chain = self.check_certificate(report, &files.chain)?;
            let no_root = self.check_certificate(report, &files.chain_no_root)?;
            if let Some(root) = &root {
                if let Some(chain) = chain {
                    self.check_chain(report, &files.chain, &chain, root);
                }
                if let Some(no_root) = no_root {
                    self.check_chain(report, &files.chain_no_root, &no_root, root);
                }
            }
        }
        Ok(())
    }
}
