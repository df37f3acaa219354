// SPDX-License-Identifier: PMPL-1.0-or-later

//! autoharden: security auditing for AI-agent source code
//!
//! Static pattern detection over Python agents, optionally combined with a
//! language model's view of the agent's risks, written back into the source
//! as review comments.

use anyhow::{Context, Result};
use autoharden::audit::{AuditReport, Auditor};
use autoharden::config::AuditConfig;
use autoharden::context::BehaviorProfile;
use autoharden::parser;
use autoharden::report::{self, ReportOutputFormat};
use autoharden::retriever::ThreatIndex;
use autoharden::sink::{Delivery, ResultSink};
use autoharden::types::Severity;
use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "autoharden")]
#[command(version)]
#[command(about = "Hybrid static and LLM-augmented security auditing for AI agents")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file (default: ./autoharden.yaml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct OutputArgs {
    /// Write the report to this file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Report file format; inferred from the output extension when omitted
    #[arg(short, long, value_enum)]
    format: Option<ReportOutputFormat>,

    /// Exit with status 1 when a finding at or above this severity exists
    #[arg(long, value_enum)]
    fail_on: Option<SeverityArg>,
}

#[derive(Subcommand)]
enum Commands {
    /// Static scan of a Python file or directory
    Scan {
        #[arg(value_name = "TARGET")]
        target: PathBuf,

        /// Report only, leave sources untouched
        #[arg(long)]
        no_annotate: bool,

        /// Also send the result to the dashboard
        #[arg(long)]
        publish: bool,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Hybrid audit: model analysis, context-aware detection, annotation
    Audit {
        #[arg(value_name = "TARGET")]
        target: PathBuf,

        /// Report only, leave sources untouched
        #[arg(long)]
        no_annotate: bool,

        /// Leave `<stem>_card.yaml` files untouched
        #[arg(long)]
        no_sidecar: bool,

        /// Do not send the result to the dashboard
        #[arg(long)]
        no_publish: bool,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Show the threat taxonomy entries nearest to a query
    Threats {
        /// Query text (default: the configured audit query)
        #[arg(value_name = "QUERY")]
        query: Option<String>,

        /// Number of entries
        #[arg(short, default_value = "3")]
        k: usize,
    },

    /// Run the structured-output parser over saved model output
    Parse {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum SeverityArg {
    Low,
    Medium,
    Critical,
}

impl From<SeverityArg> for Severity {
    fn from(arg: SeverityArg) -> Self {
        match arg {
            SeverityArg::Low => Severity::Low,
            SeverityArg::Medium => Severity::Medium,
            SeverityArg::Critical => Severity::Critical,
        }
    }
}

fn init_logging(verbose: bool) {
    let log_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();
}

fn publish(config: &AuditConfig, report: &AuditReport) {
    if !config.sink.enabled {
        return;
    }
    match ResultSink::new(&config.sink).publish(report) {
        Ok(Delivery::Posted { url }) => println!("Results sent to {}", url),
        Ok(Delivery::FallbackFile { path }) => {
            println!("Dashboard unreachable, results saved to {}", path.display())
        }
        Err(e) => eprintln!("{} {}", "warning:".yellow(), e),
    }
}

fn finish(report: &AuditReport, output: &OutputArgs) -> Result<ExitCode> {
    report::print_report(report);
    if let Some(path) = &output.output {
        let (format, path) = ReportOutputFormat::resolve(path, output.format);
        report::save_report(report, format, &path)?;
    }

    let failed = output.fail_on.map(Severity::from).is_some_and(|threshold| {
        report.findings().iter().any(|f| f.severity >= threshold)
    });
    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn run_threats(config: &AuditConfig, query: Option<String>, k: usize) {
    let index = ThreatIndex::from_config(&config.retrieval);
    let query = query.unwrap_or_else(|| config.retrieval.query.clone());
    println!("{} {}", "Query:".bold(), query);
    let matches = index.query(&query, k);
    if matches.is_empty() {
        println!("{}", "No threat entries available".yellow());
    }
    for (i, m) in matches.iter().enumerate() {
        println!(
            "\n{}. {} {}",
            i + 1,
            m.entry.title.bold().cyan(),
            format!("(distance {:.3})", m.distance).dimmed()
        );
        println!("{}", m.entry.body);
    }
}

fn run_parse(file: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("reading model output {}", file.display()))?;
    let (stage, result) = parser::parse_with_stage(&raw)?;
    let profile = BehaviorProfile::from_result(&result);

    println!("{} {:?}", "Recovered at stage:".bold(), stage);
    println!("{}", serde_json::to_string_pretty(&result)?);
    println!("\n{}", "Behavior profile:".bold());
    println!("{}", serde_json::to_string_pretty(&profile)?);
    Ok(())
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = AuditConfig::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Scan {
            target,
            no_annotate,
            publish: send,
            output,
        } => {
            config.scan.annotate &= !no_annotate;
            println!("Scanning: {}", target.display());
            let result = Auditor::new(config.clone())
                .scan(&target)
                .with_context(|| format!("scanning {}", target.display()))?;
            let report = AuditReport::File(result);
            if send {
                publish(&config, &report);
            }
            finish(&report, &output)
        }

        Commands::Audit {
            target,
            no_annotate,
            no_sidecar,
            no_publish,
            output,
        } => {
            config.scan.annotate &= !no_annotate;
            config.scan.sidecars &= !no_sidecar;
            println!("Auditing: {}", target.display());
            let auditor = Auditor::hybrid(config.clone())?;
            let report = auditor
                .audit(&target)
                .with_context(|| format!("auditing {}", target.display()))?;
            if !no_publish {
                publish(&config, &report);
            }
            finish(&report, &output)
        }

        Commands::Threats { query, k } => {
            run_threats(&config, query, k);
            Ok(ExitCode::SUCCESS)
        }

        Commands::Parse { file } => {
            run_parse(&file)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
