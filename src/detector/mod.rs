// SPDX-License-Identifier: PMPL-1.0-or-later

//! Static risk detector
//!
//! Combines the structural matcher (tree-sitter events against the pattern
//! tables), the raw-text regex passes and the project pass. Detection never
//! fails: a file that cannot be read or parsed is skipped with a warning and
//! reported back to the caller.

pub mod escalation;
pub mod patterns;
pub mod project;
pub mod structural;
pub mod text;

use crate::config::ScanConfig;
use crate::context::BehaviorProfile;
use crate::error::{AuditError, Result};
use crate::types::{is_python_source, Finding};
use crate::walker::SourceTree;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

pub use patterns::RULESET_VERSION;
pub use structural::StructuralMatcher;

/// Findings for one parsed file, ordered by line.
pub fn detect(path: &Path, tree: &SourceTree, profile: Option<&BehaviorProfile>) -> Vec<Finding> {
    let mut matcher = StructuralMatcher::new(path, profile);
    tree.walk(&mut matcher);
    let mut findings = matcher.into_findings();
    findings.extend(text::scan_text(path, tree.source()));
    findings.sort_by_key(|f| f.line_number);
    findings
}

/// Parse then detect.
pub fn detect_source(
    path: &Path,
    source: &str,
    profile: Option<&BehaviorProfile>,
) -> Result<Vec<Finding>> {
    let tree = SourceTree::parse(path, source)?;
    Ok(detect(path, &tree, profile))
}

/// Read a source file, trying UTF-8 first and then Windows-1252.
pub fn read_source(path: &Path) -> Result<String> {
    let raw = fs::read(path).map_err(|e| AuditError::file_access(path, e))?;
    match String::from_utf8(raw) {
        Ok(text) => Ok(text),
        Err(err) => {
            let raw = err.into_bytes();
            let (text, _, had_errors) = encoding_rs::WINDOWS_1252.decode(&raw);
            if had_errors {
                return Err(AuditError::file_access(
                    path,
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "neither UTF-8 nor Windows-1252",
                    ),
                ));
            }
            debug!(path = %path.display(), "decoded as Windows-1252");
            Ok(text.into_owned())
        }
    }
}

pub fn scan_file(path: &Path, profile: Option<&BehaviorProfile>) -> Result<Vec<Finding>> {
    let source = read_source(path)?;
    detect_source(path, &source, profile)
}

/// A file the scan could not process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of scanning a directory tree
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanOutcome {
    pub findings: Vec<Finding>,
    pub files_scanned: usize,
    pub skipped: Vec<SkippedFile>,
}

/// Python files under `root`, sorted, honouring the skip list and size cap.
pub fn collect_python_files(root: &Path, config: &ScanConfig) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || !config
                    .skip_dirs
                    .iter()
                    .any(|d| entry.file_name() == d.as_str())
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_python_source(e.path()))
        .filter(|e| {
            let size = e.metadata().map(|m| m.len()).unwrap_or(0);
            if size > config.max_file_bytes {
                warn!(path = %e.path().display(), size, "file exceeds size cap, skipping");
                false
            } else {
                true
            }
        })
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// Scan every Python file under `root` in parallel, then run the project
/// pass once when enabled.
pub fn scan_directory(
    root: &Path,
    profile: Option<&BehaviorProfile>,
    config: &ScanConfig,
) -> ScanOutcome {
    let files = collect_python_files(root, config);
    debug!(root = %root.display(), files = files.len(), "scanning directory");

    let per_file: Vec<(PathBuf, Result<Vec<Finding>>)> = files
        .par_iter()
        .map(|path| (path.clone(), scan_file(path, profile)))
        .collect();

    let mut outcome = ScanOutcome::default();
    for (path, result) in per_file {
        match result {
            Ok(findings) => {
                outcome.files_scanned += 1;
                outcome.findings.extend(findings);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping file");
                outcome.skipped.push(SkippedFile {
                    path,
                    reason: e.to_string(),
                });
            }
        }
    }

    if config.project_checks {
        outcome
            .findings
            .extend(project::project_findings(root, &config.skip_dirs));
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RiskCategory, Severity};

    fn findings(src: &str) -> Vec<Finding> {
        detect_source(Path::new("agent.py"), src, None).unwrap()
    }

    #[test]
    fn test_eval_is_critical() {
        let f = findings("x = eval(data)\n");
        assert_eq!(f.len(), 1);
        assert_eq!(f[0].severity, Severity::Critical);
        assert_eq!(f[0].message, "Critical: eval() detected");
    }

    #[test]
    fn test_shell_true_is_flagged() {
        let f = findings("import subprocess\nsubprocess.run(\"ls\", shell=True)\n");
        assert!(f
            .iter()
            .any(|f| f.line_number == 2 && f.message.contains("shell=True")));
    }

    #[test]
    fn test_local_flowing_into_sink() {
        let f = findings("def load(path):\n    return open(path)\n");
        assert!(f.iter().any(|f| f.category == RiskCategory::Injection));
        assert!(f.iter().any(|f| f.category == RiskCategory::Filesystem));
    }

    #[test]
    fn test_literal_argument_is_not_tainted() {
        let f = findings("open('config.yaml')\n");
        assert!(!f.iter().any(|f| f.category == RiskCategory::Injection));
    }

    #[test]
    fn test_unparseable_source_is_an_error() {
        assert!(detect_source(Path::new("bad.py"), "def (:\n", None).is_err());
    }

    #[test]
    fn test_findings_sorted_by_line() {
        let f = findings("requests.get(u)\nDEBUG = True\neval(x)\n");
        let lines: Vec<usize> = f.iter().map(|f| f.line_number).collect();
        let mut sorted = lines.clone();
        sorted.sort();
        assert_eq!(lines, sorted);
    }
}
