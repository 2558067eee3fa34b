//! `credstore generate` - Create missing secrets and, with `--pki`, certificates.

use anyhow::Result;
use colored::Colorize;
use credstore::{CaOutcome, GenerateOptions, GenerateReport, Generator, ProcessEnv, WriteOutcome};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::process::ExitCode;
use std::time::Duration;
use tabled::{settings::Style, Table, Tabled};

use super::{Context, TerminalPrompter};
use crate::cli::args::GenerateArgs;
use crate::output::{format_time, OutputFormat};

#[derive(Tabled)]
struct SecretRow {
    #[tabled(rename = "Secret")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Source")]
    source: String,
}

#[derive(Tabled)]
struct ServiceRow {
    #[tabled(rename = "Service")]
    service: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Serial")]
    serial: String,
    #[tabled(rename = "Expires")]
    expires: String,
}

fn options(args: GenerateArgs) -> GenerateOptions {
    let mut explicit = BTreeMap::new();
    for (name, value) in [
        ("oidc_google_client_secret", args.oidc_google_secret),
        ("oidc_microsoft_client_secret", args.oidc_microsoft_secret),
        ("oidc_keycloak_client_secret", args.oidc_keycloak_secret),
    ] {
        if let Some(value) = value {
            explicit.insert(name.to_string(), value);
        }
    }

    GenerateOptions {
        force: args.force,
        force_ca: args.force_ca,
        pki: args.pki,
        non_interactive: args.non_interactive,
        no_backup: args.no_backup,
        explicit,
    }
}

fn spinner(ctx: &Context, pki: bool) -> ProgressBar {
    if !pki || ctx.output_format != OutputFormat::Pretty {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message("Generating secrets and certificates...");
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

pub fn execute(ctx: &Context, args: GenerateArgs) -> Result<ExitCode> {
    let mut settings = ctx.settings.clone();
    if let Some(path) = &args.user_secrets_file {
        settings.user_secrets_file = Some(path.clone());
    }
    let options = options(args);

    let _lock = ctx.lock()?;

    // The spinner shares stderr with password prompts; it only runs when prompting is off.
    let prompter = TerminalPrompter;
    let pb = spinner(ctx, options.pki && options.non_interactive);
    let result = Generator::new(&settings, &options, &ProcessEnv, &prompter).run();
    pb.finish_and_clear();
    let report = result?;

    if !ctx.output_format.emit(&report)? {
        print_generate_pretty(&report, &settings.store_root);
    }

    Ok(ExitCode::SUCCESS)
}

fn print_generate_pretty(report: &GenerateReport, root: &std::path::Path) {
    println!("{} {}", "Store:".bold(), root.display().to_string().cyan());
    match &report.backup {
        Some(backup) => println!("{} {}", "Backup:".bold(), backup.id),
        None => println!("{} {}", "Backup:".bold(), "none".dimmed()),
    }
    println!();

    let rows: Vec<SecretRow> = report
        .secrets
        .iter()
        .map(|s| SecretRow {
            name: s.name.clone(),
            status: match s.outcome {
                WriteOutcome::Written => "written".green().to_string(),
                WriteOutcome::Kept => "kept".dimmed().to_string(),
            },
            source: s
                .origin
                .map_or_else(|| "-".to_string(), |origin| origin.to_string()),
        })
        .collect();
    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");

    if let Some(pki) = &report.pki {
        println!();
        println!("{} {}", "Certificate authority:".bold(), ca_label(pki.ca));

        let rows: Vec<ServiceRow> = pki
            .services
            .iter()
            .map(|s| ServiceRow {
                service: s.service.clone(),
                status: if s.issued {
                    "issued".green().to_string()
                } else {
                    "kept".dimmed().to_string()
                },
                serial: s.serial.clone().unwrap_or_else(|| "-".to_string()),
                expires: format_time(s.not_after),
            })
            .collect();
        if !rows.is_empty() {
            let table = Table::new(&rows).with(Style::rounded()).to_string();
            println!("{table}");
        }
        if pki.bundle_written {
            println!("{}", "CA bundle rebuilt".dimmed());
        }
    }

    println!();
    println!(
        "{} {} secret(s) written",
        "Done:".green().bold(),
        report.written()
    );
}

fn ca_label(outcome: CaOutcome) -> String {
    match outcome {
        CaOutcome::Existing => "existing".dimmed().to_string(),
        CaOutcome::Generated => "generated".green().to_string(),
        CaOutcome::IntermediateReissued => {
            "intermediate reissued".yellow().to_string()
        }
    }
}
