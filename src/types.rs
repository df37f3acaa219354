// SPDX-License-Identifier: PMPL-1.0-or-later

//! Core type definitions for autoharden
//!
//! Findings, severities and the structured result the model is asked to
//! produce. Everything here is plain data; behavior lives in the modules
//! that produce and consume it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Severity tiers, totally ordered: `Low < Medium < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 3] = [Severity::Low, Severity::Medium, Severity::Critical];

    /// Score contribution of one finding at this tier.
    pub fn weight(self) -> u64 {
        match self {
            Severity::Low => 1,
            Severity::Medium => 5,
            Severity::Critical => 10,
        }
    }

    /// One tier up, saturating at `Critical`.
    pub fn raised(self) -> Self {
        match self {
            Severity::Low => Severity::Medium,
            Severity::Medium | Severity::Critical => Severity::Critical,
        }
    }

    /// Parse a severity label coming from untrusted model output.
    ///
    /// `high` is folded into `critical`; anything unrecognised is `medium`.
    pub fn parse_lenient(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "critical" | "high" | "severe" => Severity::Critical,
            "low" | "info" | "informational" | "minor" => Severity::Low,
            _ => Severity::Medium,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// What kind of risk a finding describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RiskCategory {
    Execution,
    Filesystem,
    Network,
    Database,
    Configuration,
    Dependency,
    Secrets,
    Debug,
    Injection,
    ToolRouting,
    UserInput,
    /// Constraint reported by the model
    Constraint,
    /// Risk reported by the model
    AgentRisk,
}

impl RiskCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskCategory::Execution => "execution",
            RiskCategory::Filesystem => "filesystem",
            RiskCategory::Network => "network",
            RiskCategory::Database => "database",
            RiskCategory::Configuration => "configuration",
            RiskCategory::Dependency => "dependency",
            RiskCategory::Secrets => "secrets",
            RiskCategory::Debug => "debug",
            RiskCategory::Injection => "injection",
            RiskCategory::ToolRouting => "tool-routing",
            RiskCategory::UserInput => "user-input",
            RiskCategory::Constraint => "constraint",
            RiskCategory::AgentRisk => "agent-risk",
        }
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a finding came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Static,
    Model,
}

/// A single detected risk. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// `None` for model findings that are not tied to a file
    pub source_path: Option<PathBuf>,
    /// 1-based; 0 means the finding is not tied to a line
    pub line_number: usize,
    pub category: RiskCategory,
    pub severity: Severity,
    pub message: String,
    pub remediation: String,
    pub origin: Origin,
    /// Base severity before behavioral escalation, when escalation happened
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalated_from: Option<Severity>,
}

impl Finding {
    pub fn new_static(
        path: &Path,
        line_number: usize,
        category: RiskCategory,
        severity: Severity,
        message: impl Into<String>,
        remediation: impl Into<String>,
    ) -> Self {
        Self {
            source_path: Some(path.to_path_buf()),
            line_number,
            category,
            severity,
            message: message.into(),
            remediation: remediation.into(),
            origin: Origin::Static,
            escalated_from: None,
        }
    }

    pub fn new_model(
        category: RiskCategory,
        severity: Severity,
        message: impl Into<String>,
        remediation: impl Into<String>,
    ) -> Self {
        Self {
            source_path: None,
            line_number: 0,
            category,
            severity,
            message: message.into(),
            remediation: remediation.into(),
            origin: Origin::Model,
            escalated_from: None,
        }
    }

    /// Stable identity over location, category and message.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        if let Some(path) = &self.source_path {
            hasher.update(path.to_string_lossy().as_bytes());
        }
        hasher.update(&(self.line_number as u64).to_le_bytes());
        hasher.update(self.category.as_str().as_bytes());
        hasher.update(self.message.as_bytes());
        hasher.finalize().to_hex().as_str()[..16].to_string()
    }

    pub fn is_context_enhanced(&self) -> bool {
        self.escalated_from.is_some()
    }

    /// `path:line` for display
    pub fn location(&self) -> String {
        match (&self.source_path, self.line_number) {
            (Some(path), 0) => path.display().to_string(),
            (Some(path), line) => format!("{}:{}", path.display(), line),
            (None, _) => "model-analysis".to_string(),
        }
    }
}

/// Letter grade derived from the weighted score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LetterRating {
    #[serde(rename = "A+")]
    APlus,
    A,
    B,
    C,
    D,
    F,
}

impl LetterRating {
    pub fn from_score(score: u64) -> Self {
        match score {
            0 => LetterRating::APlus,
            1..=10 => LetterRating::A,
            11..=25 => LetterRating::B,
            26..=50 => LetterRating::C,
            51..=100 => LetterRating::D,
            _ => LetterRating::F,
        }
    }
}

impl fmt::Display for LetterRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LetterRating::APlus => "A+",
            LetterRating::A => "A",
            LetterRating::B => "B",
            LetterRating::C => "C",
            LetterRating::D => "D",
            LetterRating::F => "F",
        };
        f.write_str(label)
    }
}

/// Aggregated counts and score over a set of findings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    pub total: usize,
    pub critical: usize,
    pub medium: usize,
    pub low: usize,
    pub by_category: BTreeMap<RiskCategory, usize>,
    pub weighted_score: u64,
    pub rating: LetterRating,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            total: 0,
            critical: 0,
            medium: 0,
            low: 0,
            by_category: BTreeMap::new(),
            weighted_score: 0,
            rating: LetterRating::APlus,
        }
    }
}

/// How well the model's hardened snippets cover the static findings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardeningAssessment {
    pub effectiveness: Effectiveness,
    pub addressed: usize,
    pub remaining: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effectiveness {
    High,
    Medium,
    Low,
    Unknown,
}

/// Constraint entry in the model's structured result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConstraint {
    pub description: String,
    pub severity: Severity,
}

/// Risk entry in the model's structured result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRisk {
    pub description: String,
    pub severity: Severity,
    #[serde(default)]
    pub impact: String,
}

/// Structured result recovered from model output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredResult {
    pub constraints: Vec<ModelConstraint>,
    pub risks: Vec<ModelRisk>,
    #[serde(alias = "hardened_code")]
    pub hardened_snippets: Vec<String>,
}

impl StructuredResult {
    /// Model findings are file-less and go to the unattached bucket.
    pub fn to_findings(&self) -> Vec<Finding> {
        let constraints = self.constraints.iter().map(|c| {
            Finding::new_model(
                RiskCategory::Constraint,
                c.severity,
                format!("Constraint: {}", c.description),
                "Review and implement the suggested security measure",
            )
        });
        let risks = self.risks.iter().map(|r| {
            let remediation = if r.impact.trim().is_empty() {
                "Review the security implications".to_string()
            } else {
                r.impact.clone()
            };
            Finding::new_model(
                RiskCategory::AgentRisk,
                r.severity,
                format!("Risk: {}", r.description),
                remediation,
            )
        });
        constraints.chain(risks).collect()
    }
}

/// Python source files are the only ones the walker understands.
pub fn is_python_source(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("py") | Some("pyw")
    )
}
