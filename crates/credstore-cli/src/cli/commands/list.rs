//! `credstore list` - Show every secret and PKI artifact.

use anyhow::Result;
use colored::Colorize;
use credstore::inventory;
use std::process::ExitCode;
use tabled::{settings::Style, Table, Tabled};

use super::Context;
use crate::cli::args::ListArgs;
use crate::output::format_time;

#[derive(Tabled)]
struct SecretRow {
    #[tabled(rename = "Group")]
    group: &'static str,
    #[tabled(rename = "Secret")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Length")]
    length: String,
    #[tabled(rename = "Mode")]
    mode: String,
}

#[derive(Tabled)]
struct ValueRow {
    #[tabled(rename = "Secret")]
    name: String,
    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Tabled)]
struct ArtifactRow {
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "Expires")]
    expires: String,
}

fn status(present: bool) -> String {
    if present {
        "present".green().to_string()
    } else {
        "missing".red().to_string()
    }
}

fn dash(value: Option<String>) -> String {
    value.unwrap_or_else(|| "-".to_string())
}

pub fn execute(ctx: &Context, args: &ListArgs) -> Result<ExitCode> {
    let layout = ctx.layout();
    let catalog = ctx.settings.catalog()?;
    let inventory = inventory::list(&layout, &catalog, &ctx.settings.pki.services, args.show_values)?;

    if ctx.output_format.emit(&inventory)? {
        return Ok(ExitCode::SUCCESS);
    }

    println!("{}", "Secrets:".bold().underline());
    let rows: Vec<SecretRow> = inventory
        .secrets
        .iter()
        .map(|s| SecretRow {
            group: s.group,
            name: s.name.clone(),
            status: status(s.present),
            length: dash(s.length.map(|l| l.to_string())),
            mode: dash(s.mode.clone()),
        })
        .collect();
    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");

    if args.show_values {
        let rows: Vec<ValueRow> = inventory
            .secrets
            .iter()
            .filter_map(|s| {
                s.value.as_ref().map(|value| ValueRow {
                    name: s.name.clone(),
                    value: value.clone(),
                })
            })
            .collect();
        if !rows.is_empty() {
            println!();
            println!("{}", "Values:".bold().underline());
            let table = Table::new(&rows).with(Style::rounded()).to_string();
            println!("{table}");
        }
    }

    println!();
    if inventory.artifacts.is_empty() {
        println!("{}", "No PKI (run `credstore generate --pki`)".dimmed());
    } else {
        println!("{}", "PKI:".bold().underline());
        let rows: Vec<ArtifactRow> = inventory
            .artifacts
            .iter()
            .map(|a| ArtifactRow {
                path: a.path.display().to_string(),
                status: status(a.present),
                mode: dash(a.mode.clone()),
                expires: format_time(a.not_after),
            })
            .collect();
        let table = Table::new(&rows).with(Style::rounded()).to_string();
        println!("{table}");
    }

    Ok(ExitCode::SUCCESS)
}
