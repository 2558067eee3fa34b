//! `credstore verify` - Check secrets and PKI artifacts.

use anyhow::Result;
use colored::Colorize;
use credstore::{DeficiencyKind, Verifier, VerifyReport};
use std::process::ExitCode;
use tabled::{settings::Style, Table, Tabled};

use super::Context;
use crate::cli::args::VerifyArgs;
use crate::cli::EXIT_DEFICIENT;

#[derive(Tabled)]
struct DeficiencyRow {
    #[tabled(rename = "Subject")]
    subject: String,
    #[tabled(rename = "Finding")]
    finding: String,
}

pub fn execute(ctx: &Context, args: &VerifyArgs) -> Result<ExitCode> {
    let layout = ctx.layout();
    let catalog = ctx.settings.catalog()?;
    let services = &ctx.settings.pki.services;

    // Mode repairs write to the store.
    let _lock = ctx.lock()?;
    let report = Verifier::new(&layout, &catalog, services).verify_all()?;

    if !ctx.output_format.emit(&report)? {
        print_verify_pretty(&report);
    }

    if args.strict && !report.passed() {
        return Ok(ExitCode::from(EXIT_DEFICIENT));
    }
    Ok(ExitCode::SUCCESS)
}

fn colorize(kind: &DeficiencyKind) -> String {
    let text = kind.to_string();
    match kind {
        DeficiencyKind::PermissionDrift { .. } | DeficiencyKind::Expiring { .. } => {
            text.yellow().to_string()
        }
        _ => text.red().to_string(),
    }
}

fn print_verify_pretty(report: &VerifyReport) {
    if report.passed() {
        println!(
            "{} {} artifact(s) verified, no deficiencies",
            "✓".green().bold(),
            report.checked
        );
        return;
    }

    let rows: Vec<DeficiencyRow> = report
        .deficiencies
        .iter()
        .map(|d| DeficiencyRow {
            subject: d.subject.clone(),
            finding: colorize(&d.kind),
        })
        .collect();
    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");

    let repaired = report
        .deficiencies
        .iter()
        .filter(|d| matches!(d.kind, DeficiencyKind::PermissionDrift { .. }))
        .count();
    println!();
    println!(
        "{} {} deficiency(ies) across {} artifact(s)",
        "Summary:".bold(),
        report.deficiencies.len().to_string().yellow(),
        report.checked
    );
    if repaired > 0 {
        println!("{}", format!("{repaired} file mode(s) repaired in place").dimmed());
    }
}
