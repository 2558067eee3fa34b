//! Command-line argument definitions using clap.

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::output::OutputFormat;

/// Local credential store for the API Forge platform
///
/// Generates database and cache passwords, signing secrets, OIDC client
/// secrets and an internal PKI, all written with strict file modes.
/// Running without a subcommand is the same as `credstore generate`.
#[derive(Parser, Debug)]
#[command(name = "credstore")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Store root directory (overrides `store_root` from the settings file)
    #[arg(long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Settings file
    #[arg(short, long, global = true, env = "CREDSTORE_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum)]
    pub output: Option<OutputFormat>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    // Flags for the default generate command
    #[command(flatten)]
    pub generate: GenerateArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create missing secrets and, with --pki, the certificate authority and service certificates
    Generate(GenerateArgs),

    /// Check every secret and PKI artifact, repairing file modes
    Verify(VerifyArgs),

    /// Snapshot keys/ and certs/ into a backup directory
    Backup,

    /// Show every secret and PKI artifact with its status
    List(ListArgs),

    /// List or delete backups
    Backups(BackupsArgs),

    /// Restore a backup over the live store
    Restore(RestoreArgs),
}

// ============================================================================
// Generate command
// ============================================================================

#[derive(Args, Debug, Default, Clone, PartialEq, Eq)]
pub struct GenerateArgs {
    /// Overwrite existing secrets and regenerate the certificate authority
    #[arg(long)]
    pub force: bool,

    /// Regenerate the certificate authority even if present
    #[arg(long)]
    pub force_ca: bool,

    /// Also generate the certificate authority and service certificates
    #[arg(long)]
    pub pki: bool,

    /// Fail instead of prompting for missing OIDC secrets
    #[arg(long)]
    pub non_interactive: bool,

    /// Skip the snapshot taken before writing
    #[arg(long)]
    pub no_backup: bool,

    /// Dotenv-style file with OIDC client secrets
    #[arg(long, value_name = "FILE")]
    pub user_secrets_file: Option<PathBuf>,

    /// Google OIDC client secret
    #[arg(long, value_name = "SECRET")]
    pub oidc_google_secret: Option<String>,

    /// Microsoft OIDC client secret
    #[arg(long, value_name = "SECRET")]
    pub oidc_microsoft_secret: Option<String>,

    /// Keycloak OIDC client secret
    #[arg(long, value_name = "SECRET")]
    pub oidc_keycloak_secret: Option<String>,
}

impl GenerateArgs {
    /// True if no flag was given.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// ============================================================================
// Verify command
// ============================================================================

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Exit with status 2 when any deficiency is found
    #[arg(long)]
    pub strict: bool,
}

// ============================================================================
// List command
// ============================================================================

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Show secret values (truncated to 40 characters)
    #[arg(long)]
    pub show_values: bool,
}

// ============================================================================
// Backups command
// ============================================================================

#[derive(Args, Debug)]
pub struct BackupsArgs {
    #[command(subcommand)]
    pub command: Option<BackupsCommands>,
}

#[derive(Subcommand, Debug)]
pub enum BackupsCommands {
    /// Delete one backup
    Delete {
        /// Backup id as shown by `credstore backups`
        id: String,
    },
}

// ============================================================================
// Restore command
// ============================================================================

#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Backup id to restore (default: the most recent)
    #[arg(long, value_name = "ID")]
    pub backup: Option<String>,

    /// Keep the backup after restoring it
    #[arg(long)]
    pub keep: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_subcommand_takes_generate_flags() {
        let cli = Cli::try_parse_from(["credstore", "--pki", "--non-interactive"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.generate.pki);
        assert!(cli.generate.non_interactive);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["credstore", "verify", "--strict", "-vv", "-o", "json"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.output, Some(OutputFormat::Json));
        assert!(matches!(cli.command, Some(Commands::Verify(VerifyArgs { strict: true }))));
    }

    #[test]
    fn test_root_before_subcommand() {
        let cli = Cli::try_parse_from(["credstore", "--root", "/tmp/store", "list"]).unwrap();
        assert_eq!(cli.root.as_deref(), Some(std::path::Path::new("/tmp/store")));
        assert!(matches!(cli.command, Some(Commands::List(_))));
        assert!(cli.generate.is_empty());
    }

    #[test]
    fn test_backups_delete() {
        let cli = Cli::try_parse_from(["credstore", "backups", "delete", "20260101_000000_000"]).unwrap();
        match cli.command {
            Some(Commands::Backups(BackupsArgs {
                command: Some(BackupsCommands::Delete { id }),
            })) => assert_eq!(id, "20260101_000000_000"),
            other => panic!("unexpected parse: {other:?}"),
        }
    }
}
