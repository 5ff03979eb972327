//! dmarc-triage - DMARC Aggregate Report Analyzer
//!
//! This tool extracts, parses, and analyzes DMARC aggregate reports from
//! XML, ZIP, or GZIP files. Each per-source record is classified as good,
//! warning, or error, and totals are summarized per class alongside the
//! published DMARC policy.
//!
//! The tool outputs results in one of three formats: Table, CSV, or JSON.

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use dmarc_triage::models::AggregateResult;
use dmarc_triage::{analyze_report, extract_report, Config};
use prettytable::{row, Cell, Row, Table};
use serde::Serialize;
use std::path::PathBuf;
use std::str::FromStr;

/// CLI arguments for dmarc-triage.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "DMARC aggregate report analyzer in Rust",
    long_about = "dmarc-triage extracts, parses, and analyzes DMARC aggregate reports \
                  (XML, ZIP, or GZIP). Each per-source record is classified as good, \
                  warning, or error and the totals are summarized per class.\n\n\
                  USAGE:\n  dmarc-triage <FILE> [--output <table|csv|json>] [--verbose]"
)]
struct Cli {
    /// Path to a DMARC report file (.xml, .zip, .gz)
    #[arg(value_parser)]
    file: PathBuf,

    /// Output format: table, csv, json
    #[arg(short, long, default_value = "table")]
    output: OutputFormat,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Supported output formats.
#[derive(Debug, Clone)]
enum OutputFormat {
    Table,
    Csv,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid output format: {}", s)),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity.
    env_logger::Builder::from_env(env_logger::Env::default())
        .filter_level(if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    println!(
        "{}\n{}\n",
        "dmarc-triage - DMARC Aggregate Report Analyzer".bold().green(),
        "Classifying authentication outcomes per sending source".dimmed()
    );

    log::info!("Processing file: {}", cli.file.display());
    let config = Config::new().context("Failed to load configuration")?;

    let documents = extract_report(&cli.file, &config).context("Failed to extract report file")?;
    if documents.is_empty() {
        anyhow::bail!("no report documents found in {}", cli.file.display());
    }

    let results: Vec<AggregateResult> = documents
        .iter()
        .map(|xml| analyze_report(xml.as_bytes()))
        .collect();

    match cli.output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        OutputFormat::Csv => write_csv(&results)?,
        OutputFormat::Table => {
            for result in &results {
                render_result(result);
            }
        }
    }

    log::info!("Analysis complete");
    Ok(())
}

/// One CSV line per classified record.
#[derive(Serialize)]
struct CsvRow<'a> {
    source_ip: &'a str,
    count: u64,
    disposition: String,
    spf: String,
    dkim: String,
    header_from: &'a str,
    classification: String,
}

fn write_csv(results: &[AggregateResult]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(std::io::stdout());
    for result in results {
        for classified in &result.records {
            let record = &classified.record;
            wtr.serialize(CsvRow {
                source_ip: &record.source_ip,
                count: record.count,
                disposition: record.disposition.to_string(),
                spf: record.spf.to_string(),
                dkim: record.dkim.to_string(),
                header_from: &record.header_from,
                classification: classified.classification.to_string(),
            })?;
        }
    }
    wtr.flush()?;
    Ok(())
}

fn render_result(result: &AggregateResult) {
    print_metadata(result);

    if !result.errors.is_empty() {
        println!("{}", "Could not analyze report:".bold().red());
        for error in &result.errors {
            println!("  {}", error.red());
        }
        println!();
        return;
    }

    println!("{}", "Summary".bold().blue());
    println!("{}", "----------------------------".dimmed());
    if result.no_send_attempts {
        println!("{}", "No send attempts found in this report.".dimmed());
    } else {
        if result.good.ip_count > 0 {
            println!(
                "{}",
                format!(
                    "{} source IPs ({} messages): fully authenticated",
                    result.good.ip_count, result.good.message_total
                )
                .green()
                .bold()
            );
        }
        if result.warning.ip_count > 0 {
            println!(
                "{}",
                format!(
                    "{} source IPs ({} messages): partially authenticated",
                    result.warning.ip_count, result.warning.message_total
                )
                .yellow()
                .bold()
            );
        }
        if result.error.ip_count > 0 {
            println!(
                "{}",
                format!(
                    "{} source IPs ({} messages): authentication failed",
                    result.error.ip_count, result.error.message_total
                )
                .red()
                .bold()
            );
        }
        println!("{}: {}", "Total messages".bold(), result.total_messages());
    }
    if result.policy_risk {
        println!(
            "{}",
            "DMARC policy is set to 'none': failing messages are not quarantined or rejected."
                .yellow()
                .bold()
        );
    }
    println!();

    let policy = &result.metadata.policy;
    println!("{}", "Published DMARC Policy".bold().blue());
    println!("{}", "----------------------------".dimmed());
    println!("{}: {}", "Policy".bold(), policy.policy);
    println!("{}: {}", "Subdomain Policy".bold(), policy.subdomain_policy);
    println!("{}: {}%", "Percentage Applied".bold(), policy.pct);
    println!("{}: {}", "DKIM Alignment".bold(), policy.adkim);
    println!("{}: {}\n", "SPF Alignment".bold(), policy.aspf);

    if !result.records.is_empty() {
        let mut table = Table::new();
        table.add_row(row![
            "Source IP",
            "Count",
            "Disposition",
            "SPF",
            "DKIM",
            "Header From",
            "Status"
        ]);
        for classified in &result.records {
            let record = &classified.record;
            let header_from = if record.header_from.is_empty() {
                "-"
            } else {
                record.header_from.as_str()
            };
            table.add_row(Row::new(vec![
                Cell::new(&record.source_ip),
                Cell::new(&record.count.to_string()),
                Cell::new(&record.disposition.to_string()),
                Cell::new(&record.spf.to_string()),
                Cell::new(&record.dkim.to_string()),
                Cell::new(header_from),
                Cell::new(&classified.classification.to_string()),
            ]));
        }
        table.printstd();
        println!();
    }
}

fn print_metadata(result: &AggregateResult) {
    let meta = &result.metadata;
    println!("{}", format!("DMARC Report for {}", meta.domain).bold().blue());
    println!("{}", "----------------------------".dimmed());
    println!("{}: {}", "Organization".bold(), meta.org_name);
    if !meta.email.is_empty() {
        println!("{}: {}", "Contact".bold(), meta.email);
    }
    if let Some(range) = &meta.date_range {
        println!(
            "{}: {} - {}",
            "Period".bold(),
            range.begin.format("%Y-%m-%d %H:%M"),
            range.end.format("%Y-%m-%d %H:%M")
        );
    }
    println!();
}
