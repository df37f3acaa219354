// SPDX-License-Identifier: PMPL-1.0-or-later

//! Structural matching over walker events

use super::escalation::escalate;
use super::patterns::{
    is_shell_capable, lookup_assignment, lookup_call, lookup_import, SINK_SIGNATURES,
    SUSPICIOUS_NAME_KEYWORDS, TAINTED_PARAMETERS,
};
use crate::context::BehaviorProfile;
use crate::types::{Finding, RiskCategory, Severity};
use crate::walker::{ArgValue, CallSite, SourceEvent, Visitor};
use std::collections::HashSet;
use std::path::Path;
use tracing::trace;

/// Message for a call match, worded by its final tier.
pub fn call_message(severity: Severity, pattern: &str) -> String {
    match severity {
        Severity::Critical => format!("Critical: {}() detected", pattern),
        Severity::Medium => format!("Medium risk: {} usage detected", pattern),
        Severity::Low => format!("Low risk: {} usage detected", pattern),
    }
}

fn tier_message(severity: Severity, subject: &str) -> String {
    match severity {
        Severity::Critical => format!("Critical: {}", subject),
        Severity::Medium => format!("Medium risk: {}", subject),
        Severity::Low => format!("Low risk: {}", subject),
    }
}

pub struct StructuralMatcher<'a> {
    path: &'a Path,
    profile: Option<&'a BehaviorProfile>,
    /// Names bound by assignment or as parameters so far
    locals: HashSet<String>,
    findings: Vec<Finding>,
}

impl<'a> StructuralMatcher<'a> {
    pub fn new(path: &'a Path, profile: Option<&'a BehaviorProfile>) -> Self {
        Self {
            path,
            profile,
            locals: HashSet::new(),
            findings: Vec::new(),
        }
    }

    pub fn into_findings(self) -> Vec<Finding> {
        self.findings
    }

    fn push(
        &mut self,
        line: usize,
        category: RiskCategory,
        severity: Severity,
        message: String,
        remediation: impl Into<String>,
    ) {
        self.findings.push(Finding::new_static(
            self.path,
            line,
            category,
            severity,
            message,
            remediation,
        ));
    }

    fn on_call(&mut self, call: &CallSite) {
        let (prompt_injection, dynamic_routing) = self
            .profile
            .map(|p| (p.prompt_injection, p.dynamic_tool_routing))
            .unwrap_or((false, false));

        if let Some(rule) = lookup_call(&call.signature, prompt_injection, dynamic_routing) {
            let base = rule.tier.base_severity();
            let finding = match self.profile {
                Some(profile) => {
                    let outcome = escalate(&call.signature, base, rule.remediation, profile);
                    let mut finding = Finding::new_static(
                        self.path,
                        call.line,
                        rule.category,
                        outcome.severity,
                        call_message(outcome.severity, rule.signature),
                        outcome.remediation.clone(),
                    );
                    if outcome.raised(base) {
                        trace!(signature = %call.signature, from = %base, to = %outcome.severity, "escalated");
                        finding.escalated_from = Some(base);
                    }
                    finding
                }
                None => Finding::new_static(
                    self.path,
                    call.line,
                    rule.category,
                    base,
                    call_message(base, rule.signature),
                    rule.remediation,
                ),
            };
            self.findings.push(finding);
        }

        if is_shell_capable(&call.signature)
            && call
                .keyword("shell")
                .is_some_and(ArgValue::is_truthy_literal)
        {
            self.push(
                call.line,
                RiskCategory::Execution,
                Severity::Critical,
                format!("Critical: {}() invoked with shell=True", call.signature),
                "Pass an argument list and leave shell=False",
            );
        }

        if SINK_SIGNATURES.contains(&call.signature.as_str()) {
            if let Some(ArgValue::Name(name)) = call.positional.first() {
                if self.locals.contains(name) {
                    self.push(
                        call.line,
                        RiskCategory::Injection,
                        Severity::Medium,
                        format!(
                            "Medium risk: {}() receives variable '{}' that may carry untrusted input",
                            call.signature, name
                        ),
                        format!(
                            "Validate and normalise '{}' before passing it to {}()",
                            name, call.signature
                        ),
                    );
                }
            }
        }
    }

    fn on_function(&mut self, name: &str, params: &[String], line: usize) {
        let lowered = name.to_lowercase();
        if let Some(keyword) = SUSPICIOUS_NAME_KEYWORDS
            .iter()
            .find(|keyword| lowered.contains(*keyword))
        {
            self.push(
                line,
                RiskCategory::Execution,
                Severity::Low,
                tier_message(
                    Severity::Low,
                    &format!("function '{}' name suggests {} behaviour", name, keyword),
                ),
                "Confirm the function cannot be reached with untrusted input",
            );
        }

        for param in params {
            if TAINTED_PARAMETERS.contains(&param.as_str()) {
                self.push(
                    line,
                    RiskCategory::UserInput,
                    Severity::Low,
                    format!(
                        "Low risk: parameter '{}' of {}() may carry untrusted input",
                        param, name
                    ),
                    format!("Validate '{}' at the function boundary", param),
                );
            }
            self.locals.insert(param.clone());
        }
    }
}

impl Visitor for StructuralMatcher<'_> {
    fn visit(&mut self, event: &SourceEvent) {
        match event {
            SourceEvent::Call(call) => self.on_call(call),
            SourceEvent::Import { module, line } => {
                if let Some(rule) = lookup_import(module) {
                    let message = tier_message(rule.severity, &format!("import of {}", module));
                    self.push(*line, rule.category, rule.severity, message, rule.remediation);
                }
            }
            SourceEvent::Assign { targets, line } => {
                for target in targets {
                    if let Some(rule) = lookup_assignment(target) {
                        let message =
                            tier_message(rule.severity, &format!("assignment to {}", target));
                        self.push(*line, rule.category, rule.severity, message, rule.remediation);
                    }
                    if !target.contains('.') {
                        self.locals.insert(target.clone());
                    }
                }
            }
            SourceEvent::FunctionDef { name, params, line } => {
                self.on_function(name, params, *line)
            }
            SourceEvent::ClassDef { .. } => {}
        }
    }
}

