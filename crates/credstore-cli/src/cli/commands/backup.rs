//! `credstore backup` - Snapshot the store.

use anyhow::Result;
use colored::Colorize;
use credstore::BackupManager;
use std::process::ExitCode;

use super::Context;

pub fn execute(ctx: &Context) -> Result<ExitCode> {
    let layout = ctx.layout();
    let _lock = ctx.lock()?;
    let backup = BackupManager::new(&layout).snapshot()?;

    if !ctx.output_format.emit(&backup)? {
        match backup {
            Some(info) => println!(
                "{} {} ({} keys, {} certs)",
                "Created backup".green().bold(),
                info.id.cyan(),
                info.key_count,
                info.cert_count
            ),
            None => println!("{}", "Nothing to back up: keys/ and certs/ are empty".dimmed()),
        }
    }

    Ok(ExitCode::SUCCESS)
}
