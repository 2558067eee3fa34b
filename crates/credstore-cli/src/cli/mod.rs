//! CLI argument parsing and command dispatch.

pub mod args;
pub mod commands;

use anyhow::Result;
use args::{BackupsCommands, Cli, Commands};
use clap::Parser;
use colored::Colorize;
use credstore::CredError;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use crate::config;
use crate::output::OutputFormat;

/// Exit status for `verify --strict` when deficiencies were found.
pub const EXIT_DEFICIENT: u8 = 2;

/// Run the CLI application.
pub fn run() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.verbose);
    if cli.no_color {
        colored::control::set_override(false);
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    match dispatch(cli) {
        Ok(code) => code,
        Err(err) if err.downcast_ref::<CredError>().is_some_and(CredError::is_cancellation) => {
            eprintln!("{}", "Restore cancelled, store left unchanged".yellow());
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{} {:#}", "error:".red().bold(), err);
            ExitCode::FAILURE
        }
    }
}

const fn default_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

/// Logs go to stderr; `RUST_LOG` wins over `-v`.
fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
    {
        eprintln!("warning: failed to initialize logging: {e}");
    }
}

fn dispatch(cli: Cli) -> Result<ExitCode> {
    let settings = config::load_settings(cli.config.as_deref(), cli.root.as_deref())?;

    let ctx = commands::Context {
        settings,
        output_format: cli.output.unwrap_or(OutputFormat::Pretty),
    };

    let command = match cli.command {
        Some(command) => {
            if !cli.generate.is_empty() {
                anyhow::bail!("generate flags must be used with `credstore generate` or without a subcommand");
            }
            command
        }
        None => Commands::Generate(cli.generate),
    };

    match command {
        Commands::Generate(args) => commands::generate::execute(&ctx, args),
        Commands::Verify(args) => commands::verify::execute(&ctx, &args),
        Commands::Backup => commands::backup::execute(&ctx),
        Commands::List(args) => commands::list::execute(&ctx, &args),
        Commands::Backups(args) => match args.command {
            None => commands::backups::list(&ctx),
            Some(BackupsCommands::Delete { id }) => commands::backups::delete(&ctx, &id),
        },
        Commands::Restore(args) => commands::restore::execute(&ctx, &args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(default_filter(0), "warn");
        assert_eq!(default_filter(1), "info");
        assert_eq!(default_filter(2), "debug");
        assert_eq!(default_filter(9), "debug");
    }

    #[test]
    fn test_second_tracing_init_does_not_panic() {
        init_tracing(0);
        init_tracing(1);
    }
}
