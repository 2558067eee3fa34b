//! `credstore restore` - Put a snapshot back over the live store.

use anyhow::Result;
use colored::Colorize;
use credstore::BackupManager;
use std::process::ExitCode;

use super::{Context, TerminalConfirmer};
use crate::cli::args::RestoreArgs;

pub fn execute(ctx: &Context, args: &RestoreArgs) -> Result<ExitCode> {
    let layout = ctx.layout();
    let _lock = ctx.lock()?;
    let manager = BackupManager::new(&layout);

    let report = match &args.backup {
        Some(id) => manager.restore(id, args.yes, &TerminalConfirmer, args.keep)?,
        None => manager.restore_latest(args.yes, &TerminalConfirmer, args.keep)?,
    };

    if !ctx.output_format.emit(&report)? {
        println!(
            "{} {} ({} keys, {} certs)",
            "Restored backup".green().bold(),
            report.backup.id.cyan(),
            report.backup.key_count,
            report.backup.cert_count
        );
        if report.consumed {
            println!("{}", "The backup was removed after restoring (use --keep to retain it)".dimmed());
        }
    }

    Ok(ExitCode::SUCCESS)
}
