//! Command implementations.

pub mod backup;
pub mod backups;
pub mod generate;
pub mod list;
pub mod restore;
pub mod verify;

use credstore::{Confirmer, CredError, Prompter, Settings, StoreLayout, StoreLock};
use dialoguer::{Confirm, Password};
use std::path::Path;
use tracing::warn;
use zeroize::Zeroizing;

use crate::output::OutputFormat;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Settings after `--root` and `--config` are applied
    pub settings: Settings,

    /// Output format
    pub output_format: OutputFormat,
}

impl Context {
    pub fn layout(&self) -> StoreLayout {
        self.settings.layout()
    }

    /// Take the store lock for a mutating command.
    pub fn lock(&self) -> anyhow::Result<StoreLock> {
        Ok(StoreLock::acquire(&self.layout())?)
    }
}

fn terminal_error(err: dialoguer::Error) -> CredError {
    let dialoguer::Error::IO(source) = err;
    CredError::io(Path::new("/dev/tty"), source)
}

/// Reads secrets from the terminal without echo.
///
/// With no terminal attached it answers nothing, so resolution fails with
/// a missing-input error instead of blocking.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn prompt_secret(&self, label: &str) -> credstore::Result<Option<Zeroizing<String>>> {
        if !console::user_attended_stderr() {
            warn!(secret = label, "no terminal attached, cannot prompt");
            return Ok(None);
        }

        let value = Password::new()
            .with_prompt(label)
            .allow_empty_password(true)
            .interact()
            .map_err(terminal_error)?;
        Ok(Some(Zeroizing::new(value)))
    }
}

/// Yes/no confirmation on the terminal, defaulting to no.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalConfirmer;

impl Confirmer for TerminalConfirmer {
    fn confirm(&self, prompt: &str) -> credstore::Result<bool> {
        if !console::user_attended_stderr() {
            warn!("no terminal attached to confirm; pass --yes to skip confirmation");
            return Ok(false);
        }

        Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .map_err(terminal_error)
    }
}
