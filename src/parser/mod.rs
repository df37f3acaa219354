// SPDX-License-Identifier: PMPL-1.0-or-later

//! Structured-output recovery for model replies
//!
//! Model replies are free text that usually, but not always, contain the
//! JSON object we asked for. Recovery runs in four stages, each attempted
//! only when the previous one fails:
//!
//! 1. strict decode of the whole reply
//! 2. fence/brace-aware block capture, then syntax repair
//! 3. first `{` to last `}`, then syntax repair
//! 4. greedy `{...}` span, decoded as-is
//!
//! A stage succeeds only when it yields a JSON object. The object is then
//! validated leniently: missing or ill-typed fields become empty lists.

pub mod repair;

use crate::error::{AuditError, Result};
use crate::types::{ModelConstraint, ModelRisk, Severity, StructuredResult};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Which recovery stage produced the object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Direct,
    Captured,
    Boundary,
    Greedy,
}

fn decode_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Run the recovery stages and return the first JSON object found.
pub fn recover_object(raw: &str) -> Option<(Stage, Map<String, Value>)> {
    if let Some(map) = decode_object(raw.trim()) {
        return Some((Stage::Direct, map));
    }

    if let Some(map) = repair::capture_block(raw).and_then(|block| decode_object(&repair::repair(&block))) {
        return Some((Stage::Captured, map));
    }

    if let Some(map) = repair::boundary_span(raw).and_then(|span| decode_object(&repair::repair(span))) {
        return Some((Stage::Boundary, map));
    }

    repair::greedy_span(raw)
        .and_then(decode_object)
        .map(|map| (Stage::Greedy, map))
}

/// Parse a model reply into a [`StructuredResult`].
pub fn parse(raw: &str) -> Result<StructuredResult> {
    parse_with_stage(raw).map(|(_, result)| result)
}

pub fn parse_with_stage(raw: &str) -> Result<(Stage, StructuredResult)> {
    let (stage, map) = recover_object(raw).ok_or_else(|| {
        AuditError::MalformedOutput(format!(
            "no JSON object recoverable from {} bytes of model output",
            raw.len()
        ))
    })?;
    debug!(?stage, "recovered structured output");
    Ok((stage, validate(&map)))
}

fn list<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> &'a [Value] {
    for key in keys {
        match map.get(*key) {
            Some(Value::Array(items)) => return items,
            Some(_) => {
                warn!(field = key, "field is not a list, using empty default");
                return &[];
            }
            None => {}
        }
    }
    warn!(field = keys[0], "missing field, using empty default");
    &[]
}

fn text_field(item: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| item.get(*key))
        .find_map(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn severity_field(item: &Map<String, Value>) -> Severity {
    item.get("severity")
        .and_then(Value::as_str)
        .map(Severity::parse_lenient)
        .unwrap_or(Severity::Medium)
}

/// Description, severity and impact of one list item; bare strings are
/// treated as descriptions.
fn read_item(value: &Value) -> Option<(String, Severity, String)> {
    match value {
        Value::String(s) if !s.trim().is_empty() => {
            Some((s.trim().to_string(), Severity::Medium, String::new()))
        }
        Value::Object(item) => {
            let description = text_field(item, &["description", "constraint", "risk", "title"])?;
            let impact = text_field(item, &["impact"]).unwrap_or_default();
            Some((description, severity_field(item), impact))
        }
        _ => None,
    }
}

/// Fill the three required fields, leniently.
pub fn validate(map: &Map<String, Value>) -> StructuredResult {
    let constraints = list(map, &["constraints"])
        .iter()
        .filter_map(read_item)
        .map(|(description, severity, _)| ModelConstraint {
            description,
            severity,
        })
        .collect();

    let risks = list(map, &["risks"])
        .iter()
        .filter_map(read_item)
        .map(|(description, severity, impact)| ModelRisk {
            description,
            severity,
            impact,
        })
        .collect();

    let hardened_snippets = list(map, &["hardened_snippets", "hardened_code"])
        .iter()
        .filter_map(|value| match value {
            Value::String(s) => Some(s.clone()),
            Value::Object(item) => item.get("code").and_then(Value::as_str).map(str::to_string),
            _ => None,
        })
        .filter(|s| !s.trim().is_empty())
        .collect();

    StructuredResult {
        constraints,
        risks,
        hardened_snippets,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_selection() {
        let (stage, _) = parse_with_stage("{\"risks\": []}").unwrap();
        assert_eq!(stage, Stage::Direct);

        let (stage, _) = parse_with_stage("Sure!\n```json\n{\"risks\": []}\n```").unwrap();
        assert_eq!(stage, Stage::Captured);
    }

    #[test]
    fn test_non_object_is_rejected() {
        assert!(parse("[1, 2, 3]").is_err());
        assert!(parse("\"just a string\"").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn test_lenient_items() {
        let result = parse(
            r#"{"constraints": ["Validate tool names", {"description": "No eval", "severity": "HIGH"}, 7],
                "risks": [{"description": "Prompt injection", "impact": "Data loss"}],
                "hardened_code": ["def safe(): pass", {"code": "ALLOWED = set()"}]}"#,
        )
        .unwrap();
        assert_eq!(result.constraints.len(), 2);
        assert_eq!(result.constraints[0].severity, Severity::Medium);
        assert_eq!(result.constraints[1].severity, Severity::Critical);
        assert_eq!(result.risks[0].severity, Severity::Medium);
        assert_eq!(result.risks[0].impact, "Data loss");
        assert_eq!(result.hardened_snippets.len(), 2);
    }

    #[test]
    fn test_missing_and_mistyped_fields_default() {
        let result = parse(r#"{"constraints": "none", "summary": "ok"}"#).unwrap();
        assert_eq!(result, StructuredResult::default());
    }
}
