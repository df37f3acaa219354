// SPDX-License-Identifier: PMPL-1.0-or-later

//! Behavioral context extraction
//!
//! Turns the model's free-text constraints and risks into capability flags
//! and per-category severity multipliers for the detector's escalation
//! policy. Pure and deterministic; built once per audit and then read-only.

use crate::types::{ModelConstraint, ModelRisk, StructuredResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Categories the escalation policy knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationCategory {
    CodeExecution,
    ToolRouting,
    UserInput,
    FileOperations,
}

impl EscalationCategory {
    pub const ALL: [EscalationCategory; 4] = [
        EscalationCategory::CodeExecution,
        EscalationCategory::ToolRouting,
        EscalationCategory::UserInput,
        EscalationCategory::FileOperations,
    ];

    /// Multiplier assigned once the category's flag is set.
    pub fn multiplier(self) -> f64 {
        match self {
            EscalationCategory::CodeExecution => 2.0,
            EscalationCategory::ToolRouting => 1.8,
            EscalationCategory::UserInput => 1.5,
            EscalationCategory::FileOperations => 1.3,
        }
    }

    /// Minimum multiplier for a one-tier raise.
    pub fn threshold(self) -> f64 {
        match self {
            EscalationCategory::FileOperations => 1.3,
            _ => 1.5,
        }
    }
}

const PROMPT_INJECTION_KEYWORDS: &[&str] = &["prompt injection", "user input", "untrusted input"];
const TOOL_ROUTING_KEYWORDS: &[&str] = &["tool routing", "dynamic tool", "tool selection"];
const CODE_EXECUTION_KEYWORDS: &[&str] = &["code execution", "eval", "exec", "compile"];
const FILESYSTEM_KEYWORDS: &[&str] = &["file system", "file access", "file operation"];
const NETWORK_KEYWORDS: &[&str] = &["network", "api", "http", "external"];
const TOOL_MENTION_KEYWORDS: &[&str] = &["tool", "function", "api", "service", "execution"];

static DEF_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"def\s+(\w+)").unwrap());

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BehaviorProfile {
    pub prompt_injection: bool,
    pub user_input_to_model: bool,
    pub dynamic_tool_routing: bool,
    pub code_execution: bool,
    pub filesystem_access: bool,
    pub network_access: bool,
    pub multipliers: BTreeMap<EscalationCategory, f64>,
    /// Lowercased model constraint descriptions
    pub constraints: Vec<String>,
    /// Lowercased model risk descriptions
    pub risks: Vec<String>,
    /// Tool-ish keywords mentioned by the model's risks
    pub tool_mentions: Vec<String>,
    /// Function names defined in hardened snippets
    pub critical_functions: Vec<String>,
}

fn mentions(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| text.contains(keyword))
}

/// Build a profile from the model's risk and constraint lists.
pub fn build_profile(risks: &[ModelRisk], constraints: &[ModelConstraint]) -> BehaviorProfile {
    let mut profile = BehaviorProfile::default();

    let descriptions = constraints
        .iter()
        .map(|c| c.description.to_lowercase())
        .chain(risks.iter().map(|r| r.description.to_lowercase()));

    for text in descriptions {
        if mentions(&text, PROMPT_INJECTION_KEYWORDS) {
            profile.prompt_injection = true;
            profile.user_input_to_model = true;
        }
        if mentions(&text, TOOL_ROUTING_KEYWORDS) {
            profile.dynamic_tool_routing = true;
        }
        if mentions(&text, CODE_EXECUTION_KEYWORDS) {
            profile.code_execution = true;
        }
        if mentions(&text, FILESYSTEM_KEYWORDS) {
            profile.filesystem_access = true;
        }
        if mentions(&text, NETWORK_KEYWORDS) {
            profile.network_access = true;
        }
    }

    profile.constraints = constraints.iter().map(|c| c.description.to_lowercase()).collect();

    for risk in risks {
        let description = risk.description.to_lowercase();
        let impact = risk.impact.to_lowercase();
        for keyword in TOOL_MENTION_KEYWORDS {
            if (description.contains(keyword) || impact.contains(keyword))
                && !profile.tool_mentions.iter().any(|m| m == keyword)
            {
                profile.tool_mentions.push(keyword.to_string());
            }
        }
        profile.risks.push(description);
    }

    for category in EscalationCategory::ALL {
        if profile.flag(category) {
            profile.multipliers.insert(category, category.multiplier());
        }
    }

    profile
}

impl BehaviorProfile {
    /// Profile for a full structured result, including hardened snippets.
    pub fn from_result(result: &StructuredResult) -> Self {
        let mut profile = build_profile(&result.risks, &result.constraints);
        for snippet in &result.hardened_snippets {
            for captures in DEF_NAME.captures_iter(snippet) {
                let name = captures[1].to_string();
                if !profile.critical_functions.contains(&name) {
                    profile.critical_functions.push(name);
                }
            }
        }
        profile
    }

    /// Flag backing an escalation category
    pub fn flag(&self, category: EscalationCategory) -> bool {
        match category {
            EscalationCategory::CodeExecution => self.code_execution,
            EscalationCategory::ToolRouting => self.dynamic_tool_routing,
            EscalationCategory::UserInput => self.prompt_injection,
            EscalationCategory::FileOperations => self.filesystem_access,
        }
    }

    pub fn multiplier(&self, category: EscalationCategory) -> f64 {
        self.multipliers.get(&category).copied().unwrap_or(1.0)
    }

    pub fn is_high_risk(&self) -> bool {
        self.prompt_injection || self.dynamic_tool_routing
    }

    pub fn is_empty(&self) -> bool {
        self.multipliers.is_empty() && !self.network_access
    }
}
