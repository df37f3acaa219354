// SPDX-License-Identifier: PMPL-1.0-or-later

//! Project-level checks, run once per scan root

use crate::types::{Finding, RiskCategory, Severity};
use std::path::Path;
use walkdir::WalkDir;

const DEPENDENCY_MANIFESTS: &[&str] = &[
    "requirements.txt",
    "pyproject.toml",
    "setup.py",
    "setup.cfg",
    "Pipfile",
];

/// `.env.*` files that are conventionally committed
const ENV_TEMPLATES: &[&str] = &[".env.example", ".env.sample", ".env.template"];

fn sensitive_severity(name: &str) -> Option<Severity> {
    let lower = name.to_ascii_lowercase();
    if lower == ".env" {
        return Some(Severity::Medium);
    }
    if lower.starts_with(".env.") && !ENV_TEMPLATES.contains(&lower.as_str()) {
        return Some(Severity::Medium);
    }
    if matches!(lower.as_str(), "credentials.json" | "secrets.json" | "id_rsa" | "id_ed25519") {
        return Some(Severity::Critical);
    }
    let key_extension = [".pem", ".key", ".p12", ".pfx"]
        .iter()
        .any(|ext| lower.ends_with(ext));
    key_extension.then_some(Severity::Critical)
}

/// Sensitive files anywhere under `root`, plus missing hygiene files at
/// `root` itself.
pub fn project_findings(root: &Path, skip_dirs: &[String]) -> Vec<Finding> {
    let mut findings = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || !skip_dirs.iter().any(|d| entry.file_name() == d.as_str())
        });

    for entry in walker.filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if let Some(severity) = sensitive_severity(&name) {
            let prefix = match severity {
                Severity::Critical => "Critical",
                _ => "Medium risk",
            };
            findings.push(Finding::new_static(
                entry.path(),
                0,
                RiskCategory::Secrets,
                severity,
                format!("{}: sensitive file '{}' in project tree", prefix, name),
                "Remove it from the repository and list it in .gitignore",
            ));
        }
    }

    if !root.join(".gitignore").is_file() {
        findings.push(Finding::new_static(
            root,
            0,
            RiskCategory::Configuration,
            Severity::Low,
            "Low risk: no .gitignore at project root",
            "Add a .gitignore that excludes secrets and local environments",
        ));
    }

    if !DEPENDENCY_MANIFESTS
        .iter()
        .any(|manifest| root.join(manifest).is_file())
    {
        findings.push(Finding::new_static(
            root,
            0,
            RiskCategory::Dependency,
            Severity::Low,
            "Low risk: no dependency manifest at project root",
            "Pin dependencies in requirements.txt or pyproject.toml",
        ));
    }

    findings
}
