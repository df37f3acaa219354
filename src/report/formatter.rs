// SPDX-License-Identifier: PMPL-1.0-or-later

//! Report formatting and output

use crate::audit::{AuditReport, AuditResult, DirectoryAudit};
use crate::context::BehaviorProfile;
use crate::report::ReportOutputFormat;
use crate::types::*;
use anyhow::{Context, Result};
use colored::*;
use std::fs;
use std::path::Path;

pub struct ReportFormatter;

fn severity_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "red",
        Severity::Medium => "yellow",
        Severity::Low => "blue",
    }
}

fn rating_color(rating: LetterRating) -> &'static str {
    match rating {
        LetterRating::APlus | LetterRating::A => "green",
        LetterRating::B | LetterRating::C => "yellow",
        LetterRating::D | LetterRating::F => "red",
    }
}

impl ReportFormatter {
    pub fn new() -> Self {
        Self
    }

    pub fn print(&self, report: &AuditReport) {
        println!("\n{}", "=== AUTOHARDEN SECURITY REPORT ===".bold().cyan());
        println!();

        match report {
            AuditReport::File(result) => self.print_result(result),
            AuditReport::Directory(dir) => self.print_directory(dir),
        }
    }

    fn print_result(&self, result: &AuditResult) {
        println!("  Target: {}", result.target.display());
        println!(
            "  Mode: {:?}  |  Files scanned: {}  |  Ruleset: {}",
            result.mode, result.files_scanned, result.ruleset_version
        );
        println!();

        if let Some(profile) = &result.profile {
            self.print_profile(profile);
            println!();
        }

        self.print_findings(&result.findings);
        println!();

        self.print_metrics(&result.metrics);
        println!();

        if result.hardening.effectiveness != Effectiveness::Unknown {
            println!("{}", "HARDENING".bold().yellow());
            println!(
                "  Effectiveness: {:?} ({}/{} findings addressed)",
                result.hardening.effectiveness, result.hardening.addressed, result.hardening.total
            );
            println!();
        }

        if let Some(annotation) = &result.annotation {
            println!(
                "  Annotated {} file(s), {} comment line(s) inserted",
                annotation.files.len(),
                annotation.inserted_lines()
            );
        }
        if let Some(card) = &result.sidecar {
            println!("  Agent card updated: {}", card.display());
        }

        self.print_recommendations(&result.recommendations);
        self.print_warnings(result);
    }

    fn print_profile(&self, profile: &BehaviorProfile) {
        println!("{}", "AGENT BEHAVIOR".bold().yellow());
        if profile.is_empty() {
            println!("  {}", "no risky behavior reported".dimmed());
            return;
        }
        let flags = [
            ("prompt injection", profile.prompt_injection),
            ("user input to model", profile.user_input_to_model),
            ("dynamic tool routing", profile.dynamic_tool_routing),
            ("code execution", profile.code_execution),
            ("file system access", profile.filesystem_access),
            ("network access", profile.network_access),
        ];
        for (label, set) in flags {
            let mark = if set { "yes".red() } else { "no".green() };
            println!("  {:<22} {}", label, mark);
        }
        for (category, multiplier) in &profile.multipliers {
            println!("  multiplier {:?}: {:.1}", category, multiplier);
        }
    }

    fn print_findings(&self, findings: &[Finding]) {
        if findings.is_empty() {
            println!("{}", "No findings".green());
            return;
        }

        println!("{}", "FINDINGS".bold().yellow());
        for (i, finding) in findings.iter().enumerate() {
            let escalated = if finding.is_context_enhanced() {
                " (context)".magenta().to_string()
            } else {
                String::new()
            };
            println!(
                "  {}. [{}]{} {} - {}",
                i + 1,
                finding.severity.to_string().color(severity_color(finding.severity)),
                escalated,
                finding.location().bold(),
                finding.message
            );
            println!("      {}", finding.remediation.dimmed());
        }
    }

    fn print_metrics(&self, metrics: &Metrics) {
        println!("{}", "SCORE".bold().yellow());
        println!(
            "  Critical: {}  Medium: {}  Low: {}  Total: {}",
            metrics.critical.to_string().red(),
            metrics.medium.to_string().yellow(),
            metrics.low.to_string().blue(),
            metrics.total
        );
        println!(
            "  Weighted score: {}  Rating: {}",
            metrics.weighted_score,
            metrics
                .rating
                .to_string()
                .color(rating_color(metrics.rating))
                .bold()
        );
    }

    fn print_recommendations(&self, recommendations: &[String]) {
        if recommendations.is_empty() {
            return;
        }
        println!();
        println!("  Recommendations:");
        for rec in recommendations {
            println!("    - {}", rec);
        }
    }

    fn print_warnings(&self, result: &AuditResult) {
        let warnings = &result.warnings;
        if warnings.is_empty() {
            return;
        }
        println!();
        println!("  {}", "Warnings:".yellow());
        for skipped in &warnings.skipped_files {
            println!("    - skipped {}: {}", skipped.path.display(), skipped.reason);
        }
        for message in &warnings.messages {
            println!("    - {}", message);
        }
        if warnings.annotation_failures > 0 {
            println!("    - {} file(s) could not be annotated", warnings.annotation_failures);
        }
    }

    fn print_directory(&self, dir: &DirectoryAudit) {
        let summary = &dir.summary;
        println!("  Directory: {}", dir.root.display());
        println!(
            "  Files: {}  |  Analysed: {}  |  Failed: {}",
            summary.total_files,
            summary.successful.to_string().green(),
            summary.failed.to_string().red()
        );
        println!(
            "  Findings: {}  |  Context-enhanced: {} ({:.0}%)  |  High-risk agents: {} ({:.0}%)",
            summary.total_findings,
            summary.context_enhanced,
            summary.context_enhancement_rate * 100.0,
            summary.high_risk_agents,
            summary.high_risk_rate * 100.0
        );
        println!(
            "  Average findings per file: {:.1}",
            summary.average_findings_per_file
        );
        println!();

        println!(
            "  {:<48} {:>6} {:>6} {:>6} {:>6}",
            "File", "Total", "Crit", "Med", "Grade"
        );
        println!("  {}", "-".repeat(76));
        for result in &dir.results {
            println!(
                "  {:<48} {:>6} {:>6} {:>6} {:>6}",
                result.target.display().to_string(),
                result.metrics.total,
                result.metrics.critical,
                result.metrics.medium,
                result.metrics.rating.to_string()
            );
        }
        for failure in &dir.failures {
            println!(
                "  {:<48} {}",
                failure.path.display().to_string(),
                format!("ERROR: {}", failure.error).red()
            );
        }

        if !dir.project_findings.is_empty() {
            println!();
            self.print_findings(&dir.project_findings);
        }
        println!();
        self.print_metrics(&dir.metrics);
    }

    pub fn save<P: AsRef<Path>>(
        &self,
        report: &AuditReport,
        format: ReportOutputFormat,
        path: P,
    ) -> Result<()> {
        let path = path.as_ref();
        let text = format.serialize(report)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
        println!("Report saved to: {}", path.display());
        Ok(())
    }
}

impl Default for ReportFormatter {
    fn default() -> Self {
        Self::new()
    }
}
