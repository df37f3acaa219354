// SPDX-License-Identifier: PMPL-1.0-or-later

//! `<stem>_card.yaml` agent cards next to the source

use crate::error::{AuditError, Result};
use crate::types::StructuredResult;
use serde_json::Value as JsonValue;
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const SECURITY_KEY: &str = "security";

/// `agent.py` → `agent_card.yaml` in the same directory.
pub fn card_path(source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    source.with_file_name(format!("{stem}_card.yaml"))
}

fn read_mapping(path: &Path) -> Result<Mapping> {
    let text = fs::read_to_string(path).map_err(|e| AuditError::file_access(path, e))?;
    match serde_yaml::from_str::<Value>(&text) {
        Ok(Value::Mapping(map)) => Ok(map),
        Ok(Value::Null) => Ok(Mapping::new()),
        Ok(_) => Err(AuditError::parse_structural(path, "agent card is not a mapping")),
        Err(e) => Err(AuditError::parse_structural(path, e.to_string())),
    }
}

/// Card contents without our own `security` section, for the prompt.
pub fn read_card(source: &Path) -> Option<JsonValue> {
    let path = card_path(source);
    if !path.is_file() {
        return None;
    }
    match read_mapping(&path) {
        Ok(mut map) => {
            map.remove(SECURITY_KEY);
            serde_json::to_value(&map).ok()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "agent card unreadable");
            None
        }
    }
}

/// Replace the card's `security` section with the model's guardrails.
/// Returns the card path when one existed and was updated; a missing card
/// is never created.
pub fn update_card(source: &Path, result: &StructuredResult) -> Result<Option<PathBuf>> {
    let path = card_path(source);
    if !path.is_file() {
        return Ok(None);
    }

    let mut card = read_mapping(&path)?;
    let to_yaml = |value: JsonValue| {
        serde_yaml::to_value(value).map_err(|e| AuditError::parse_structural(&path, e.to_string()))
    };

    let mut security = Mapping::new();
    security.insert(
        "constraints".into(),
        to_yaml(serde_json::json!(result.constraints))?,
    );
    security.insert("risks".into(), to_yaml(serde_json::json!(result.risks))?);
    security.insert(
        "suggested_guardrails".into(),
        to_yaml(serde_json::json!(result.hardened_snippets))?,
    );
    card.insert(SECURITY_KEY.into(), Value::Mapping(security));

    let text = serde_yaml::to_string(&card)
        .map_err(|e| AuditError::parse_structural(&path, e.to_string()))?;
    fs::write(&path, text).map_err(|e| AuditError::file_access(&path, e))?;
    info!(path = %path.display(), "guardrails written to agent card");
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_path() {
        assert_eq!(
            card_path(Path::new("agents/router.py")),
            PathBuf::from("agents/router_card.yaml")
        );
    }
}
