//! Resolution of secrets that only the operator knows.
//!
//! Sources are tried in a fixed order: a value passed on the command
//! line, the process environment, the user-secrets file, and finally an
//! interactive prompt. In non-interactive mode the prompt is skipped and
//! a secret with no value is an error.

use credstore_core::{CredError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zeroize::Zeroizing;

/// Where a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecretOrigin {
    Explicit,
    Environment,
    UserSecretsFile,
    InteractivePrompt,
}

impl std::fmt::Display for SecretOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Explicit => "command line",
            Self::Environment => "environment",
            Self::UserSecretsFile => "user secrets file",
            Self::InteractivePrompt => "prompt",
        })
    }
}

/// A value together with its origin.
#[derive(Debug)]
pub struct ResolvedSecret {
    pub value: Zeroizing<String>,
    pub origin: SecretOrigin,
}

/// Asks the operator for a secret without echoing it.
pub trait Prompter {
    /// `Ok(None)` means the operator gave nothing.
    fn prompt_secret(&self, label: &str) -> Result<Option<Zeroizing<String>>>;
}

/// A prompter for contexts with no terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPrompt;

impl Prompter for NoPrompt {
    fn prompt_secret(&self, _label: &str) -> Result<Option<Zeroizing<String>>> {
        Ok(None)
    }
}

/// Source of environment variables.
pub trait Environment {
    fn var(&self, key: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl Environment for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl Environment for BTreeMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

fn non_empty(value: Option<String>) -> Option<Zeroizing<String>> {
    value
        .map(Zeroizing::new)
        .filter(|v| !v.trim().is_empty())
}

/// Parse a dotenv-style file without touching the process environment.
fn load_user_secrets(path: &Path) -> Result<BTreeMap<String, String>> {
    if !path.is_file() {
        debug!(path = %path.display(), "no user secrets file");
        return Ok(BTreeMap::new());
    }

    let iter = dotenvy::from_path_iter(path)
        .map_err(|e| CredError::Config(format!("failed to open {}: {e}", path.display())))?;
    let mut values = BTreeMap::new();
    for item in iter {
        let (key, value) =
            item.map_err(|e| CredError::Config(format!("failed to parse {}: {e}", path.display())))?;
        values.insert(key, value);
    }
    info!(path = %path.display(), entries = values.len(), "loaded user secrets file");
    Ok(values)
}

/// Resolves operator-supplied secrets.
pub struct DeterministicSecretResolver<'a> {
    explicit: &'a BTreeMap<String, String>,
    env: &'a dyn Environment,
    prompter: &'a dyn Prompter,
    user_secrets_file: PathBuf,
    user_secrets: Option<BTreeMap<String, String>>,
    non_interactive: bool,
}

impl std::fmt::Debug for DeterministicSecretResolver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeterministicSecretResolver")
            .field("user_secrets_file", &self.user_secrets_file)
            .field("non_interactive", &self.non_interactive)
            .finish_non_exhaustive()
    }
}

impl<'a> DeterministicSecretResolver<'a> {
    /// `explicit` maps secret names to values given at invocation time.
    pub fn new(
        explicit: &'a BTreeMap<String, String>,
        env: &'a dyn Environment,
        prompter: &'a dyn Prompter,
        user_secrets_file: impl Into<PathBuf>,
        non_interactive: bool,
    ) -> Self {
        Self {
            explicit,
            env,
            prompter,
            user_secrets_file: user_secrets_file.into(),
            user_secrets: None,
            non_interactive,
        }
    }

    /// Look up `env_var` in the user-secrets file, reading it on first use.
    fn from_user_secrets(&mut self, env_var: &str) -> Result<Option<Zeroizing<String>>> {
        if self.user_secrets.is_none() {
            self.user_secrets = Some(load_user_secrets(&self.user_secrets_file)?);
        }
        Ok(non_empty(
            self.user_secrets
                .as_ref()
                .and_then(|values| values.get(env_var).cloned()),
        ))
    }

    /// Resolve one secret. Empty values count as absent everywhere.
    pub fn resolve(&mut self, name: &str, label: &str, env_var: &str) -> Result<ResolvedSecret> {
        let found = if let Some(value) = non_empty(self.explicit.get(name).cloned()) {
            Some((value, SecretOrigin::Explicit))
        } else if let Some(value) = non_empty(self.env.var(env_var)) {
            Some((value, SecretOrigin::Environment))
        } else if let Some(value) = self.from_user_secrets(env_var)? {
            Some((value, SecretOrigin::UserSecretsFile))
        } else if self.non_interactive {
            None
        } else {
            self.prompter
                .prompt_secret(label)?
                .filter(|v| !v.trim().is_empty())
                .map(|v| (v, SecretOrigin::InteractivePrompt))
        };

        match found {
            Some((value, origin)) => {
                debug!(secret = name, %origin, "resolved secret");
                let value = Zeroizing::new(value.trim().to_string());
                Ok(ResolvedSecret { value, origin })
            }
            None => Err(CredError::MissingSecretInput {
                label: label.to_string(),
                env_var: env_var.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tempfile::TempDir;

    struct Scripted {
        answer: Option<&'static str>,
        calls: Cell<usize>,
    }

    impl Prompter for Scripted {
        fn prompt_secret(&self, _label: &str) -> Result<Option<Zeroizing<String>>> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.answer.map(|a| Zeroizing::new(a.to_string())))
        }
    }

    fn scripted(answer: Option<&'static str>) -> Scripted {
        Scripted {
            answer,
            calls: Cell::new(0),
        }
    }

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    const NAME: &str = "oidc_google_client_secret";
    const LABEL: &str = "Google OIDC client secret";
    const VAR: &str = "OIDC_GOOGLE_CLIENT_SECRET";

    #[test]
    fn test_explicit_beats_environment() {
        let explicit = map(&[(NAME, "from-cli")]);
        let env = map(&[(VAR, "from-env")]);
        let prompter = scripted(Some("from-prompt"));
        let mut resolver = DeterministicSecretResolver::new(&explicit, &env, &prompter, "/nonexistent", false);

        let resolved = resolver.resolve(NAME, LABEL, VAR).unwrap();
        assert_eq!(resolved.value.as_str(), "from-cli");
        assert_eq!(resolved.origin, SecretOrigin::Explicit);
        assert_eq!(prompter.calls.get(), 0);
    }

    #[test]
    fn test_environment_then_user_secrets_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("user-secrets.env");
        std::fs::write(&file, format!("{VAR}=from-file\nOIDC_MICROSOFT_CLIENT_SECRET=\"quoted value\"\n")).unwrap();

        let explicit = BTreeMap::new();
        let env = map(&[(VAR, "")]);
        let prompter = scripted(None);
        let mut resolver = DeterministicSecretResolver::new(&explicit, &env, &prompter, &file, true);

        let google = resolver.resolve(NAME, LABEL, VAR).unwrap();
        assert_eq!(google.value.as_str(), "from-file");
        assert_eq!(google.origin, SecretOrigin::UserSecretsFile);

        let microsoft = resolver
            .resolve("oidc_microsoft_client_secret", "Microsoft", "OIDC_MICROSOFT_CLIENT_SECRET")
            .unwrap();
        assert_eq!(microsoft.value.as_str(), "quoted value");
    }

    #[test]
    fn test_prompt_is_last_resort() {
        let explicit = BTreeMap::new();
        let env = BTreeMap::new();
        let prompter = scripted(Some("typed"));
        let mut resolver = DeterministicSecretResolver::new(&explicit, &env, &prompter, "/nonexistent", false);

        let resolved = resolver.resolve(NAME, LABEL, VAR).unwrap();
        assert_eq!(resolved.origin, SecretOrigin::InteractivePrompt);
        assert_eq!(prompter.calls.get(), 1);
    }

    #[test]
    fn test_non_interactive_never_prompts() {
        let explicit = BTreeMap::new();
        let env = BTreeMap::new();
        let prompter = scripted(Some("typed"));
        let mut resolver = DeterministicSecretResolver::new(&explicit, &env, &prompter, "/nonexistent", true);

        let err = resolver.resolve(NAME, LABEL, VAR).unwrap_err();
        match err {
            CredError::MissingSecretInput { label, env_var } => {
                assert_eq!(label, LABEL);
                assert_eq!(env_var, VAR);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(prompter.calls.get(), 0);
    }

    #[test]
    fn test_empty_prompt_answer_is_missing() {
        let explicit = BTreeMap::new();
        let env = BTreeMap::new();
        let prompter = scripted(Some("   "));
        let mut resolver = DeterministicSecretResolver::new(&explicit, &env, &prompter, "/nonexistent", false);
        assert!(resolver.resolve(NAME, LABEL, VAR).is_err());
    }
}
