// SPDX-License-Identifier: PMPL-1.0-or-later

//! Report generation module

pub mod formatter;
pub mod generator;
pub mod output;
pub mod sarif;

use crate::audit::AuditReport;
use anyhow::Result;
use std::path::Path;

pub use formatter::ReportFormatter;
pub use generator::{score, ReportGenerator};
pub use output::ReportOutputFormat;

/// Save report to file in the given format
pub fn save_report<P: AsRef<Path>>(
    report: &AuditReport,
    format: ReportOutputFormat,
    path: P,
) -> Result<()> {
    let formatter = ReportFormatter::new();
    formatter.save(report, format, path)
}

/// Print report to console
pub fn print_report(report: &AuditReport) {
    let formatter = ReportFormatter::new();
    formatter.print(report);
}
