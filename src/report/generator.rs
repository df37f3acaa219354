// SPDX-License-Identifier: PMPL-1.0-or-later

//! Scoring, recommendations and hardening assessment

use crate::types::*;
use std::collections::BTreeMap;

/// Scores a finding set and derives the advice that goes with it.
pub struct ReportGenerator;

impl ReportGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Severity counts, weighted score and letter rating.
    pub fn score(&self, findings: &[Finding]) -> Metrics {
        let mut by_category: BTreeMap<RiskCategory, usize> = BTreeMap::new();
        let (mut critical, mut medium, mut low) = (0, 0, 0);

        for finding in findings {
            match finding.severity {
                Severity::Critical => critical += 1,
                Severity::Medium => medium += 1,
                Severity::Low => low += 1,
            }
            *by_category.entry(finding.category).or_default() += 1;
        }

        let weighted_score = findings.iter().map(|f| f.severity.weight()).sum();

        Metrics {
            total: findings.len(),
            critical,
            medium,
            low,
            by_category,
            weighted_score,
            rating: LetterRating::from_score(weighted_score),
        }
    }

    /// Fixed rules in declaration order; each fires at most once.
    pub fn recommendations(&self, metrics: &Metrics) -> Vec<String> {
        RULES
            .iter()
            .filter(|rule| (rule.applies)(metrics))
            .map(|rule| rule.text.to_string())
            .collect()
    }

    /// How many findings the model's hardened snippets plausibly address.
    pub fn assess_hardening(&self, findings: &[Finding], snippets: &[String]) -> HardeningAssessment {
        let total = findings.len();
        if total == 0 || snippets.is_empty() {
            return HardeningAssessment {
                effectiveness: Effectiveness::Unknown,
                addressed: 0,
                remaining: total,
                total,
            };
        }

        let lowered: Vec<String> = snippets.iter().map(|s| s.to_lowercase()).collect();
        let addressed = findings
            .iter()
            .filter(|finding| lowered.iter().any(|snippet| addresses(snippet, finding)))
            .count();

        let ratio = addressed as f64 / total as f64;
        let effectiveness = if ratio >= 0.8 {
            Effectiveness::High
        } else if ratio >= 0.5 {
            Effectiveness::Medium
        } else {
            Effectiveness::Low
        };

        HardeningAssessment {
            effectiveness,
            addressed,
            remaining: total - addressed,
            total,
        }
    }
}

impl Default for ReportGenerator {
    fn default() -> Self {
        Self::new()
    }
}

const VALIDATION_VERBS: &[&str] = &["validate", "sanitize", "sanitise", "check", "verify"];
const EXECUTION_FRAGMENTS: &[&str] = &["eval", "exec", "subprocess"];
const SAFE_REPLACEMENTS: &[&str] = &["ast.literal_eval", "subprocess.run", "shlex.quote", "allowed_"];

fn addresses(snippet: &str, finding: &Finding) -> bool {
    let validates = VALIDATION_VERBS.iter().any(|v| snippet.contains(v));
    if validates
        && (snippet.contains(finding.category.as_str()) || snippet.contains(finding.severity.as_str()))
    {
        return true;
    }
    EXECUTION_FRAGMENTS.iter().any(|f| finding.message.contains(f))
        && SAFE_REPLACEMENTS.iter().any(|s| snippet.contains(s))
}

struct Rule {
    applies: fn(&Metrics) -> bool,
    text: &'static str,
}

fn has(metrics: &Metrics, category: RiskCategory) -> bool {
    metrics.by_category.get(&category).copied().unwrap_or(0) > 0
}

const RULES: &[Rule] = &[
    Rule {
        applies: |m| m.critical > 0,
        text: "Fix code-execution paths first: remove eval/exec and shell invocations reachable from agent input",
    },
    Rule {
        applies: |m| has(m, RiskCategory::Execution),
        text: "Replace dynamic execution with explicit dispatch tables or a sandboxed interpreter",
    },
    Rule {
        applies: |m| has(m, RiskCategory::ToolRouting),
        text: "Validate tool names against an allow-list before binding or dispatching them",
    },
    Rule {
        applies: |m| has(m, RiskCategory::UserInput) || has(m, RiskCategory::Injection),
        text: "Validate and sanitise every value that can reach a process, file or model call",
    },
    Rule {
        applies: |m| has(m, RiskCategory::Filesystem),
        text: "Restrict file operations to an allow-listed base directory",
    },
    Rule {
        applies: |m| has(m, RiskCategory::Secrets),
        text: "Move hardcoded secrets to the environment or a secret manager and rotate them",
    },
    Rule {
        applies: |m| has(m, RiskCategory::Database),
        text: "Use parameterised queries for every database call",
    },
    Rule {
        applies: |m| has(m, RiskCategory::Network),
        text: "Use HTTPS with certificate verification and validate outbound URLs",
    },
    Rule {
        applies: |m| has(m, RiskCategory::Configuration),
        text: "Harden configuration: disable debug mode, keep TLS verification, restrict hosts and origins",
    },
    Rule {
        applies: |m| has(m, RiskCategory::Dependency),
        text: "Pin dependencies and avoid unsafe serialization modules",
    },
    Rule {
        applies: |m| has(m, RiskCategory::Debug),
        text: "Remove debugger hooks and stack-trace printing before deployment",
    },
    Rule {
        applies: |m| has(m, RiskCategory::AgentRisk) || has(m, RiskCategory::Constraint),
        text: "Review the model-reported agent risks and adopt the suggested guardrails",
    },
    Rule {
        applies: |m| m.critical == 0 && m.medium > 0,
        text: "No critical findings; schedule the medium-severity items for the next release",
    },
    Rule {
        applies: |m| m.critical == 0 && m.medium == 0 && m.low > 0,
        text: "Only low-severity findings remain; address them opportunistically",
    },
    Rule {
        applies: |m| m.total == 0,
        text: "No issues found; keep scanning on every change",
    },
];

/// Free-function form of [`ReportGenerator::score`].
pub fn score(findings: &[Finding]) -> Metrics {
    ReportGenerator::new().score(findings)
}
