// SPDX-License-Identifier: PMPL-1.0-or-later

//! Result delivery and agent-card sidecars

use autoharden::config::SinkConfig;
use autoharden::error::AuditError;
use autoharden::sidecar;
use autoharden::sink::{Delivery, ResultSink};
use autoharden::types::*;
use serde_json::json;
use std::fs;
use tempfile::TempDir;

fn unreachable(fallback: std::path::PathBuf) -> SinkConfig {
    SinkConfig {
        enabled: true,
        // discard port, nothing listens there
        endpoint: "http://127.0.0.1:9".to_string(),
        timeout_secs: 1,
        fallback_path: fallback,
    }
}

#[test]
fn test_unreachable_dashboard_falls_back_to_file() {
    let dir = TempDir::new().unwrap();
    let fallback = dir.path().join("out/latest_scan_results.json");
    let sink = ResultSink::new(&unreachable(fallback.clone()));

    let delivery = sink.publish(&json!({"findings": [], "rating": "A+"})).unwrap();
    assert_eq!(delivery, Delivery::FallbackFile { path: fallback.clone() });

    let saved: serde_json::Value = serde_json::from_str(&fs::read_to_string(&fallback).unwrap()).unwrap();
    assert_eq!(saved["rating"], "A+");
    assert!(saved["timestamp"].is_string());
}

#[test]
fn test_existing_timestamp_is_kept() {
    let dir = TempDir::new().unwrap();
    let fallback = dir.path().join("results.json");
    let sink = ResultSink::new(&unreachable(fallback.clone()));

    sink.publish(&json!({"timestamp": "2026-01-01T00:00:00Z"})).unwrap();
    let saved: serde_json::Value = serde_json::from_str(&fs::read_to_string(&fallback).unwrap()).unwrap();
    assert_eq!(saved["timestamp"], "2026-01-01T00:00:00Z");
}

#[test]
fn test_unwritable_fallback_is_sink_unavailable() {
    let dir = TempDir::new().unwrap();
    // a regular file where the parent directory should be
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, "").unwrap();
    let sink = ResultSink::new(&unreachable(blocker.join("results.json")));

    let err = sink.publish(&json!({})).unwrap_err();
    assert!(matches!(err, AuditError::SinkUnavailable(_)));
    assert!(!err.is_fatal());
}

fn result() -> StructuredResult {
    StructuredResult {
        constraints: vec![ModelConstraint {
            description: "Allow-list tool names".to_string(),
            severity: Severity::Medium,
        }],
        risks: vec![ModelRisk {
            description: "Dynamic tool routing".to_string(),
            severity: Severity::Critical,
            impact: "Arbitrary tool calls".to_string(),
        }],
        hardened_snippets: vec!["ALLOWED_TOOLS = {\"search\"}".to_string()],
    }
}

#[test]
fn test_sidecar_security_section_replaced() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("router.py");
    fs::write(&source, "x = 1\n").unwrap();
    let card = dir.path().join("router_card.yaml");
    fs::write(
        &card,
        "name: router\ntools:\n  - search\nsecurity:\n  stale: true\n",
    )
    .unwrap();

    let updated = sidecar::update_card(&source, &result()).unwrap();
    assert_eq!(updated.as_deref(), Some(card.as_path()));

    let value: serde_yaml::Value = serde_yaml::from_str(&fs::read_to_string(&card).unwrap()).unwrap();
    assert_eq!(value["name"].as_str(), Some("router"));
    assert_eq!(value["tools"][0].as_str(), Some("search"));
    let security = &value["security"];
    assert!(security.get("stale").is_none());
    assert_eq!(
        security["constraints"][0]["description"].as_str(),
        Some("Allow-list tool names")
    );
    assert_eq!(security["risks"][0]["severity"].as_str(), Some("critical"));
    assert_eq!(
        security["suggested_guardrails"][0].as_str(),
        Some("ALLOWED_TOOLS = {\"search\"}")
    );

    // the prompt never sees our own section
    let prompt_card = sidecar::read_card(&source).unwrap();
    assert_eq!(prompt_card["name"], "router");
    assert!(prompt_card.get("security").is_none());
}

#[test]
fn test_missing_sidecar_is_not_created() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("agent.py");
    fs::write(&source, "x = 1\n").unwrap();

    assert_eq!(sidecar::update_card(&source, &result()).unwrap(), None);
    assert!(!sidecar::card_path(&source).exists());
    assert!(sidecar::read_card(&source).is_none());
}
