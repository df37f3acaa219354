// SPDX-License-Identifier: PMPL-1.0-or-later

//! Serialization helpers for printed/exported reports

use crate::audit::AuditReport;
use crate::report::sarif;
use anyhow::Result;
use clap::ValueEnum;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportOutputFormat {
    Json,
    Yaml,
    Sarif,
}

impl ReportOutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "json" => Some(ReportOutputFormat::Json),
            "yaml" | "yml" => Some(ReportOutputFormat::Yaml),
            "sarif" => Some(ReportOutputFormat::Sarif),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ReportOutputFormat::Json => "json",
            ReportOutputFormat::Yaml => "yaml",
            ReportOutputFormat::Sarif => "sarif",
        }
    }

    /// Format and final path for `--output`: an explicit format wins, then
    /// the file extension, then JSON. A path without an extension gets the
    /// format's.
    pub fn resolve(path: &Path, explicit: Option<Self>) -> (Self, PathBuf) {
        let from_extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::parse);
        let format = explicit.or(from_extension).unwrap_or(ReportOutputFormat::Json);
        let path = if path.extension().is_none() {
            path.with_extension(format.extension())
        } else {
            path.to_path_buf()
        };
        (format, path)
    }

    pub fn serialize(&self, report: &AuditReport) -> Result<String> {
        match self {
            ReportOutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
            ReportOutputFormat::Yaml => Ok(serde_yaml::to_string(report)?),
            // SARIF carries findings only; metrics and profile are dropped.
            ReportOutputFormat::Sarif => sarif::to_sarif_json(&report.findings()),
        }
    }
}
