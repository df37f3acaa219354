// SPDX-License-Identifier: PMPL-1.0-or-later

//! SARIF 2.1.0 output for GitHub Security tab integration
//!
//! Converts findings into OASIS SARIF format.
//! See: https://docs.oasis-open.org/sarif/sarif/v2.1.0/sarif-v2.1.0.html

use crate::detector::RULESET_VERSION;
use crate::types::{Finding, RiskCategory, Severity};
use anyhow::Result;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

const SARIF_SCHEMA: &str = "https://raw.githubusercontent.com/oasis-tcs/sarif-spec/main/sarif-2.1/schema/sarif-schema-2.1.0.json";
const SARIF_VERSION: &str = "2.1.0";

/// Top-level SARIF log
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifLog {
    #[serde(rename = "$schema")]
    pub schema: String,
    pub version: String,
    pub runs: Vec<SarifRun>,
}

/// A single SARIF run (one tool execution)
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifRun {
    pub tool: SarifTool,
    pub results: Vec<SarifResult>,
}

/// Tool descriptor
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifTool {
    pub driver: SarifToolComponent,
}

/// Tool component with rules
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifToolComponent {
    pub name: String,
    pub version: String,
    pub semantic_version: String,
    pub rules: Vec<SarifRule>,
}

/// Rule descriptor
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifRule {
    pub id: String,
    pub name: String,
    pub short_description: SarifMessage,
    pub default_configuration: SarifConfiguration,
}

/// Configuration with level
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifConfiguration {
    pub level: String,
}

/// A single finding
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifResult {
    pub rule_id: String,
    pub level: String,
    pub message: SarifMessage,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<SarifLocation>,
    pub partial_fingerprints: BTreeMap<String, String>,
}

/// Message with text
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifMessage {
    pub text: String,
}

/// Physical location
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifLocation {
    pub physical_location: SarifPhysicalLocation,
}

/// Physical location with artifact
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifPhysicalLocation {
    pub artifact_location: SarifArtifactLocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<SarifRegion>,
}

/// Artifact URI
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifArtifactLocation {
    pub uri: String,
}

/// Region (line number)
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifRegion {
    pub start_line: usize,
}

/// Map RiskCategory to a stable rule ID
fn rule_id(category: RiskCategory) -> &'static str {
    match category {
        RiskCategory::Execution => "AH001",
        RiskCategory::Filesystem => "AH002",
        RiskCategory::Network => "AH003",
        RiskCategory::Database => "AH004",
        RiskCategory::Configuration => "AH005",
        RiskCategory::Dependency => "AH006",
        RiskCategory::Secrets => "AH007",
        RiskCategory::Debug => "AH008",
        RiskCategory::Injection => "AH009",
        RiskCategory::ToolRouting => "AH010",
        RiskCategory::UserInput => "AH011",
        RiskCategory::Constraint => "AH012",
        RiskCategory::AgentRisk => "AH013",
    }
}

fn rule_description(category: RiskCategory) -> &'static str {
    match category {
        RiskCategory::Execution => "Dynamic code or process execution",
        RiskCategory::Filesystem => "Unrestricted file system operation",
        RiskCategory::Network => "Outbound network access",
        RiskCategory::Database => "Unparameterised database access",
        RiskCategory::Configuration => "Insecure configuration",
        RiskCategory::Dependency => "Risky dependency or project hygiene",
        RiskCategory::Secrets => "Hardcoded secret or sensitive file",
        RiskCategory::Debug => "Debugging hook left in code",
        RiskCategory::Injection => "Local value flowing into a sink",
        RiskCategory::ToolRouting => "Dynamic tool routing",
        RiskCategory::UserInput => "Untrusted user input",
        RiskCategory::Constraint => "Model-suggested constraint",
        RiskCategory::AgentRisk => "Model-reported agent risk",
    }
}

/// Map Severity to SARIF level
fn sarif_level(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "error",
        Severity::Medium => "warning",
        Severity::Low => "note",
    }
}

fn location(finding: &Finding) -> Vec<SarifLocation> {
    let Some(path) = &finding.source_path else {
        return Vec::new();
    };
    vec![SarifLocation {
        physical_location: SarifPhysicalLocation {
            artifact_location: SarifArtifactLocation {
                uri: path.to_string_lossy().replace('\\', "/"),
            },
            region: (finding.line_number > 0).then_some(SarifRegion {
                start_line: finding.line_number,
            }),
        },
    }]
}

/// Convert findings to a SARIF log
pub fn to_sarif(findings: &[&Finding]) -> SarifLog {
    let mut seen_categories = HashSet::new();
    let mut rules = Vec::new();

    for finding in findings {
        if seen_categories.insert(finding.category) {
            rules.push(SarifRule {
                id: rule_id(finding.category).to_string(),
                name: finding.category.as_str().to_string(),
                short_description: SarifMessage {
                    text: rule_description(finding.category).to_string(),
                },
                default_configuration: SarifConfiguration {
                    level: sarif_level(finding.severity).to_string(),
                },
            });
        }
    }

    let results: Vec<SarifResult> = findings
        .iter()
        .map(|finding| SarifResult {
            rule_id: rule_id(finding.category).to_string(),
            level: sarif_level(finding.severity).to_string(),
            message: SarifMessage {
                text: format!("{} ({})", finding.message, finding.remediation),
            },
            locations: location(finding),
            partial_fingerprints: BTreeMap::from([(
                "autoharden/v1".to_string(),
                finding.fingerprint(),
            )]),
        })
        .collect();

    SarifLog {
        schema: SARIF_SCHEMA.to_string(),
        version: SARIF_VERSION.to_string(),
        runs: vec![SarifRun {
            tool: SarifTool {
                driver: SarifToolComponent {
                    name: "autoharden".to_string(),
                    version: RULESET_VERSION.to_string(),
                    semantic_version: env!("CARGO_PKG_VERSION").to_string(),
                    rules,
                },
            },
            results,
        }],
    }
}

/// Serialize findings as a SARIF JSON string
pub fn to_sarif_json(findings: &[&Finding]) -> Result<String> {
    let log = to_sarif(findings);
    let json = serde_json::to_string_pretty(&log)?;
    Ok(json)
}
