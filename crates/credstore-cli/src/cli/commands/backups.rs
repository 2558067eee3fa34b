//! `credstore backups` - List or delete snapshots.

use anyhow::Result;
use colored::Colorize;
use credstore::{BackupInfo, BackupManager};
use std::process::ExitCode;
use tabled::{settings::Style, Table, Tabled};

use super::Context;

#[derive(Tabled)]
struct BackupRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Created")]
    created: String,
    #[tabled(rename = "Keys")]
    keys: usize,
    #[tabled(rename = "Certs")]
    certs: usize,
}

impl From<&BackupInfo> for BackupRow {
    fn from(info: &BackupInfo) -> Self {
        Self {
            id: info.id.clone(),
            created: info.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            keys: info.key_count,
            certs: info.cert_count,
        }
    }
}

/// Newest first.
pub fn list(ctx: &Context) -> Result<ExitCode> {
    let layout = ctx.layout();
    let backups = BackupManager::new(&layout).list_backups()?;

    if !ctx.output_format.emit(&backups)? {
        if backups.is_empty() {
            println!("{}", "No backups".dimmed());
        } else {
            let rows: Vec<BackupRow> = backups.iter().map(BackupRow::from).collect();
            let table = Table::new(&rows).with(Style::rounded()).to_string();
            println!("{table}");
        }
    }

    Ok(ExitCode::SUCCESS)
}

pub fn delete(ctx: &Context, id: &str) -> Result<ExitCode> {
    let layout = ctx.layout();
    let _lock = ctx.lock()?;
    let removed = BackupManager::new(&layout).delete(id)?;

    if !ctx.output_format.emit(&removed)? {
        println!("{} {}", "Deleted backup".green().bold(), removed.id.cyan());
    }

    Ok(ExitCode::SUCCESS)
}
