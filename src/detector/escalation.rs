// SPDX-License-Identifier: PMPL-1.0-or-later

//! Context-driven severity escalation
//!
//! A structural match is raised one tier for every escalation category that
//! (a) its signature belongs to, (b) the profile flags as present, and
//! (c) carries a multiplier at or above the category threshold. Raises are
//! cumulative and saturate at critical; nothing is ever lowered.

use crate::context::{BehaviorProfile, EscalationCategory};
use crate::types::Severity;

/// Signature fragments that place a call in a category
fn members(category: EscalationCategory) -> &'static [&'static str] {
    match category {
        EscalationCategory::CodeExecution => &["eval", "exec", "compile", "subprocess"],
        EscalationCategory::UserInput => &["input", "raw_input", "getpass"],
        EscalationCategory::ToolRouting => &["tools_by_name", "bind_tools", "get_tool"],
        EscalationCategory::FileOperations => &["open", "os.remove", "shutil.rmtree"],
    }
}

fn note(category: EscalationCategory) -> &'static str {
    match category {
        EscalationCategory::CodeExecution => {
            " (Agent has code execution capability - implement sandboxing)"
        }
        EscalationCategory::UserInput => {
            " (Agent has prompt injection risk - validate input thoroughly)"
        }
        EscalationCategory::ToolRouting => {
            " (Agent uses dynamic tool routing - implement strict tool validation)"
        }
        EscalationCategory::FileOperations => {
            " (Agent has filesystem access - restrict paths to an allow-list)"
        }
    }
}

/// Outcome of applying the policy to one match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Escalation {
    pub severity: Severity,
    pub remediation: String,
    /// Categories that fired, in policy order
    pub applied: Vec<EscalationCategory>,
}

impl Escalation {
    pub fn raised(&self, base: Severity) -> bool {
        self.severity > base
    }
}

/// Apply the policy to a call match.
pub fn escalate(
    signature: &str,
    base: Severity,
    remediation: &str,
    profile: &BehaviorProfile,
) -> Escalation {
    let mut severity = base;
    let mut text = remediation.to_string();
    let mut applied = Vec::new();

    for category in EscalationCategory::ALL {
        if !profile.flag(category) {
            continue;
        }
        if profile.multiplier(category) < category.threshold() {
            continue;
        }
        if !members(category).iter().any(|m| signature.contains(m)) {
            continue;
        }
        severity = severity.raised();
        text.push_str(note(category));
        applied.push(category);
    }

    Escalation {
        severity,
        remediation: text,
        applied,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::build_profile;
    use crate::types::ModelConstraint;

    fn profile_from(texts: &[&str]) -> BehaviorProfile {
        let constraints: Vec<ModelConstraint> = texts
            .iter()
            .map(|t| ModelConstraint {
                description: t.to_string(),
                severity: Severity::Medium,
            })
            .collect();
        build_profile(&[], &constraints)
    }

    #[test]
    fn test_no_profile_flags_no_change() {
        let out = escalate("open", Severity::Medium, "fix", &BehaviorProfile::default());
        assert_eq!(out.severity, Severity::Medium);
        assert_eq!(out.remediation, "fix");
        assert!(out.applied.is_empty());
    }

    #[test]
    fn test_file_ops_raise_one_tier() {
        let profile = profile_from(&["broad file system access"]);
        let out = escalate("open", Severity::Medium, "fix", &profile);
        assert_eq!(out.severity, Severity::Critical);
        assert!(out.raised(Severity::Medium));
        assert!(out.remediation.contains("filesystem access"));
    }

    #[test]
    fn test_raises_are_cumulative_and_capped() {
        // `subprocess.popen` belongs to code-execution and file-ops
        let profile = profile_from(&["code execution", "file access"]);
        let out = escalate("subprocess.popen", Severity::Low, "fix", &profile);
        assert_eq!(out.applied.len(), 2);
        assert_eq!(out.severity, Severity::Critical);

        let out = escalate("eval", Severity::Critical, "fix", &profile);
        assert_eq!(out.severity, Severity::Critical);
        assert!(!out.raised(Severity::Critical));
        assert!(out.remediation.contains("sandboxing"));
    }

    #[test]
    fn test_never_lowers() {
        let profile = profile_from(&["prompt injection", "dynamic tool routing", "eval", "file system"]);
        for base in Severity::ALL {
            for signature in ["eval", "input", "bind_tools", "open", "requests.get"] {
                assert!(escalate(signature, base, "", &profile).severity >= base);
            }
        }
    }
}
