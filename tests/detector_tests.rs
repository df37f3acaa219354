// SPDX-License-Identifier: PMPL-1.0-or-later

//! Static detector behaviour over realistic agent sources

use autoharden::config::ScanConfig;
use autoharden::context::{build_profile, BehaviorProfile};
use autoharden::detector::{self, detect_source};
use autoharden::types::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn profile(constraints: &[&str]) -> BehaviorProfile {
    let constraints: Vec<ModelConstraint> = constraints
        .iter()
        .map(|c| ModelConstraint {
            description: c.to_string(),
            severity: Severity::Medium,
        })
        .collect();
    build_profile(&[], &constraints)
}

fn scan(src: &str, profile: Option<&BehaviorProfile>) -> Vec<Finding> {
    detect_source(Path::new("agent.py"), src, profile).expect("source should parse")
}

#[test]
fn test_critical_beats_medium_for_shared_signature() {
    let findings = scan("import subprocess\nsubprocess.Popen(cmd)\n", None);
    let on_call: Vec<&Finding> = findings.iter().filter(|f| f.line_number == 2).collect();
    assert_eq!(on_call.len(), 1, "one rule per call site: {:?}", on_call);
    assert_eq!(on_call[0].severity, Severity::Critical);
    assert_eq!(on_call[0].message, "Critical: subprocess.Popen() detected");
}

#[test]
fn test_dangerous_import_is_reported() {
    let findings = scan("import pickle\n", None);
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].category, RiskCategory::Dependency);
    assert_eq!(findings[0].severity, Severity::Medium);
}

#[test]
fn test_user_input_tier_is_gated() {
    let src = "name = input(\"Name: \")\n";
    assert!(scan(src, None).is_empty());

    let exposed = profile(&["Sanitise user input before it reaches the model"]);
    let findings = scan(src, Some(&exposed));
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].category, RiskCategory::UserInput);
    // medium base, raised once by the prompt-injection context
    assert_eq!(findings[0].severity, Severity::Critical);
    assert_eq!(findings[0].escalated_from, Some(Severity::Medium));
    assert!(findings[0].remediation.contains("prompt injection risk"));
}

#[test]
fn test_code_execution_context_raises_subprocess_run() {
    let src = "import subprocess\nsubprocess.run(args)\n";
    let plain = scan(src, None);
    let run = plain.iter().find(|f| f.line_number == 2).unwrap();
    assert_eq!(run.severity, Severity::Medium);
    assert!(!run.is_context_enhanced());

    let exec = profile(&["Agent performs code execution on request"]);
    let raised = scan(src, Some(&exec));
    let run = raised.iter().find(|f| f.line_number == 2).unwrap();
    assert_eq!(run.severity, Severity::Critical);
    assert_eq!(run.message, "Critical: subprocess.run() detected");
    assert!(run.is_context_enhanced());
}

#[test]
fn test_tool_routing_context() {
    let src = "llm = model.bind_tools(tools)\n";
    let plain = scan(src, None);
    assert_eq!(plain[0].severity, Severity::Medium);
    assert_eq!(plain[0].category, RiskCategory::ToolRouting);

    let routing = profile(&["Restrict dynamic tool selection to an allow-list"]);
    let raised = scan(src, Some(&routing));
    assert_eq!(raised[0].severity, Severity::Critical);
}

#[test]
fn test_escalation_never_lowers() {
    let exec = profile(&["code execution", "file system access", "prompt injection"]);
    let src = "eval(x)\nopen(p)\nrequests.get(u)\n";
    let plain = scan(src, None);
    let raised = scan(src, Some(&exec));
    for (a, b) in plain.iter().zip(&raised) {
        assert!(b.severity >= a.severity, "{:?} lowered to {:?}", a, b);
    }
}

#[test]
fn test_detect_never_panics_on_hostile_input() {
    let inputs = [
        "",
        "\n\n\n",
        "def (:\n",
        "x = '''unterminated\n",
        "\u{feff}print('bom')\n",
        "f(*)\n",
        "eval(eval(eval(eval(x))))\n",
        "class A:\n  def b(self, data, *payload, **content): return open(data)\n",
        "\0\0\0",
    ];
    for src in inputs {
        let _ = detect_source(Path::new("fuzz.py"), src, None);
    }
}

#[test]
fn test_directory_scan_skips_broken_files() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("good.py"), "eval(x)\n").unwrap();
    fs::write(dir.path().join("bad.py"), "def (:\n").unwrap();
    fs::create_dir(dir.path().join(".venv")).unwrap();
    fs::write(dir.path().join(".venv/lib.py"), "eval(y)\n").unwrap();
    fs::write(dir.path().join("notes.txt"), "eval(z)\n").unwrap();

    let config = ScanConfig {
        project_checks: false,
        ..Default::default()
    };
    let outcome = detector::scan_directory(dir.path(), None, &config);
    assert_eq!(outcome.files_scanned, 1);
    assert_eq!(outcome.skipped.len(), 1);
    assert!(outcome.skipped[0].path.ends_with("bad.py"));
    assert_eq!(outcome.findings.len(), 1);
    assert!(outcome.findings[0]
        .source_path
        .as_ref()
        .unwrap()
        .ends_with("good.py"));
}

#[test]
fn test_windows_1252_source_is_scanned() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("legacy.py");
    let mut bytes = b"# caf".to_vec();
    bytes.push(0xE9);
    bytes.extend_from_slice(b"\nexec(code)\n");
    fs::write(&path, bytes).unwrap();

    let findings = detector::scan_file(&path, None).unwrap();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].line_number, 2);
}

#[test]
fn test_project_pass() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(".env"), "KEY=1\n").unwrap();
    fs::write(dir.path().join(".env.example"), "KEY=\n").unwrap();
    fs::write(dir.path().join("agent.py"), "print('hi')\n").unwrap();

    let outcome = detector::scan_directory(dir.path(), None, &ScanConfig::default());
    let secrets: Vec<&Finding> = outcome
        .findings
        .iter()
        .filter(|f| f.category == RiskCategory::Secrets)
        .collect();
    assert_eq!(secrets.len(), 1);
    assert_eq!(secrets[0].line_number, 0);
    // no .gitignore and no manifest
    assert_eq!(
        outcome
            .findings
            .iter()
            .filter(|f| f.severity == Severity::Low)
            .count(),
        2
    );
}

#[test]
fn test_text_passes_find_secrets_and_sql() {
    let src = "API_KEY = 'sk-abcdefghijklmnopqrstuvwxyz123456'\n\
               cursor.execute(\"SELECT * FROM t WHERE id = %s\" % user_id)\n";
    let findings = scan(src, None);
    assert!(findings
        .iter()
        .any(|f| f.line_number == 1 && f.category == RiskCategory::Secrets));
    assert!(findings
        .iter()
        .any(|f| f.line_number == 2 && f.category == RiskCategory::Database));
}
