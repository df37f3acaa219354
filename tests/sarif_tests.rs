// SPDX-License-Identifier: PMPL-1.0-or-later

//! Tests for SARIF 2.1.0 output format

use autoharden::report::sarif;
use autoharden::types::*;
use std::path::Path;

fn make_findings() -> Vec<Finding> {
    vec![
        Finding::new_static(
            Path::new("agents/router.py"),
            10,
            RiskCategory::Execution,
            Severity::Critical,
            "Critical: eval() detected",
            "Avoid eval: use ast.literal_eval or safe parsing",
        ),
        Finding::new_static(
            Path::new("agents/router.py"),
            42,
            RiskCategory::ToolRouting,
            Severity::Medium,
            "Medium risk: bind_tools usage detected",
            "Validate tools before binding to LLM",
        ),
        Finding::new_static(
            Path::new(".env"),
            0,
            RiskCategory::Secrets,
            Severity::Medium,
            "Medium risk: sensitive file '.env' in project tree",
            "Keep secrets out of the repository",
        ),
        Finding::new_model(
            RiskCategory::AgentRisk,
            Severity::Low,
            "Risk: verbose error messages",
            "Review the security implications",
        ),
    ]
}

fn sarif_value(findings: &[Finding]) -> serde_json::Value {
    let refs: Vec<&Finding> = findings.iter().collect();
    let json = sarif::to_sarif_json(&refs).expect("SARIF conversion should succeed");
    serde_json::from_str(&json).expect("SARIF output should be valid JSON")
}

#[test]
fn test_sarif_schema_and_version() {
    let parsed = sarif_value(&make_findings());
    assert_eq!(parsed["version"], "2.1.0");
    assert!(parsed["$schema"].as_str().unwrap().contains("sarif"));
}

#[test]
fn test_sarif_tool_info() {
    let parsed = sarif_value(&make_findings());
    let driver = &parsed["runs"][0]["tool"]["driver"];
    assert_eq!(driver["name"], "autoharden");
    assert_eq!(driver["version"], autoharden::detector::RULESET_VERSION);
    assert_eq!(driver["semanticVersion"], env!("CARGO_PKG_VERSION"));
}

#[test]
fn test_sarif_results_and_levels() {
    let parsed = sarif_value(&make_findings());
    let results = parsed["runs"][0]["results"].as_array().unwrap();
    assert_eq!(results.len(), 4);

    assert_eq!(results[0]["ruleId"], "AH001");
    assert_eq!(results[0]["level"], "error");
    assert_eq!(results[1]["level"], "warning");
    assert_eq!(results[3]["level"], "note");
}

#[test]
fn test_sarif_rules_deduplicated() {
    let mut findings = make_findings();
    findings.push(Finding::new_static(
        Path::new("agents/tools.py"),
        3,
        RiskCategory::Execution,
        Severity::Critical,
        "Critical: exec() detected",
        "Avoid exec: use function dispatch or sandboxing",
    ));
    let parsed = sarif_value(&findings);
    let rules = parsed["runs"][0]["tool"]["driver"]["rules"].as_array().unwrap();
    assert_eq!(rules.len(), 4, "one rule per category");
}

#[test]
fn test_sarif_locations() {
    let parsed = sarif_value(&make_findings());
    let results = parsed["runs"][0]["results"].as_array().unwrap();

    let physical = &results[0]["locations"][0]["physicalLocation"];
    assert_eq!(physical["artifactLocation"]["uri"], "agents/router.py");
    assert_eq!(physical["region"]["startLine"], 10);

    // project-level findings have a file but no line
    let project = &results[2]["locations"][0]["physicalLocation"];
    assert_eq!(project["artifactLocation"]["uri"], ".env");
    assert!(project.get("region").is_none());

    // model findings are not tied to a file
    assert!(results[3].get("locations").is_none());
}

#[test]
fn test_sarif_fingerprints_are_stable() {
    let a = sarif_value(&make_findings());
    let b = sarif_value(&make_findings());
    let fp = |v: &serde_json::Value| v["runs"][0]["results"][0]["partialFingerprints"]["autoharden/v1"].clone();
    assert!(fp(&a).is_string());
    assert_eq!(fp(&a), fp(&b));
    assert_ne!(
        fp(&a),
        a["runs"][0]["results"][1]["partialFingerprints"]["autoharden/v1"]
    );
}

#[test]
fn test_sarif_empty() {
    let parsed = sarif_value(&[]);
    assert!(parsed["runs"][0]["results"].as_array().unwrap().is_empty());
    assert!(parsed["runs"][0]["tool"]["driver"]["rules"]
        .as_array()
        .unwrap()
        .is_empty());
}
