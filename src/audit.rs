// SPDX-License-Identifier: PMPL-1.0-or-later

//! Audit pipeline
//!
//! `scan` is static only. `audit_file` is the hybrid path: retrieve threat
//! context, ask the model, build the behavior profile, detect with it,
//! annotate, score. `audit_directory` runs `audit_file` over every Python
//! file under a root and aggregates the results. Only configuration errors
//! stop a run; everything else becomes a warning counter on the result.

use crate::annotate::{self, AnnotationReport};
use crate::config::AuditConfig;
use crate::context::BehaviorProfile;
use crate::detector::{self, SkippedFile, RULESET_VERSION};
use crate::error::{AuditError, Result};
use crate::model::{self, AgentCard, GeminiClient, ModelClient};
use crate::report::ReportGenerator;
use crate::retriever::ThreatIndex;
use crate::sidecar;
use crate::types::*;
use crate::walker::SourceTree;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditMode {
    Static,
    Hybrid,
}

/// Soft failures collected during a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditWarnings {
    pub skipped_files: Vec<SkippedFile>,
    pub model_unavailable: usize,
    pub malformed_output: usize,
    pub repair_prompts: usize,
    pub annotation_failures: usize,
    pub sidecar_failures: usize,
    pub messages: Vec<String>,
}

impl AuditWarnings {
    fn record(&mut self, err: &AuditError) {
        match err {
            AuditError::ModelUnavailable(_) => self.model_unavailable += 1,
            AuditError::MalformedOutput(_) => self.malformed_output += 1,
            _ => {}
        }
        self.messages.push(err.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.skipped_files.is_empty() && self.annotation_failures == 0
    }
}

/// Everything one audit invocation produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditResult {
    pub target: PathBuf,
    pub mode: AuditMode,
    pub timestamp: String,
    pub ruleset_version: String,
    pub files_scanned: usize,
    pub findings: Vec<Finding>,
    pub metrics: Metrics,
    pub recommendations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<BehaviorProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_result: Option<StructuredResult>,
    pub hardening: HardeningAssessment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotation: Option<AnnotationReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sidecar: Option<PathBuf>,
    pub warnings: AuditWarnings,
}

impl AuditResult {
    pub fn static_findings(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.origin == Origin::Static)
    }

    pub fn context_enhanced(&self) -> usize {
        self.findings.iter().filter(|f| f.is_context_enhanced()).count()
    }

    pub fn is_high_risk(&self) -> bool {
        self.profile.as_ref().is_some_and(BehaviorProfile::is_high_risk)
    }
}

/// A file the directory audit could not complete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectorySummary {
    pub total_files: usize,
    pub successful: usize,
    pub failed: usize,
    /// Static findings across successful files
    pub total_findings: usize,
    pub context_enhanced: usize,
    pub high_risk_agents: usize,
    pub average_findings_per_file: f64,
    pub context_enhancement_rate: f64,
    pub high_risk_rate: f64,
}

impl DirectorySummary {
    pub fn from_results(results: &[AuditResult], failed: usize) -> Self {
        let successful = results.len();
        let total_findings: usize = results.iter().map(|r| r.static_findings().count()).sum();
        let context_enhanced: usize = results.iter().map(AuditResult::context_enhanced).sum();
        let high_risk_agents = results.iter().filter(|r| r.is_high_risk()).count();

        let ratio = |n: usize, d: usize| if d == 0 { 0.0 } else { n as f64 / d as f64 };

        Self {
            total_files: successful + failed,
            successful,
            failed,
            total_findings,
            context_enhanced,
            high_risk_agents,
            average_findings_per_file: ratio(total_findings, successful),
            context_enhancement_rate: ratio(context_enhanced, total_findings),
            high_risk_rate: ratio(high_risk_agents, successful),
        }
    }
}

/// Aggregate of a directory audit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryAudit {
    pub root: PathBuf,
    pub timestamp: String,
    pub ruleset_version: String,
    pub results: Vec<AuditResult>,
    pub failures: Vec<FileFailure>,
    /// Sensitive-file and hygiene findings for the root
    pub project_findings: Vec<Finding>,
    pub metrics: Metrics,
    pub summary: DirectorySummary,
}

/// What the CLI prints, saves and publishes
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum AuditReport {
    File(AuditResult),
    Directory(DirectoryAudit),
}

impl AuditReport {
    pub fn findings(&self) -> Vec<&Finding> {
        match self {
            AuditReport::File(result) => result.findings.iter().collect(),
            AuditReport::Directory(dir) => dir
                .results
                .iter()
                .flat_map(|r| r.findings.iter())
                .chain(dir.project_findings.iter())
                .collect(),
        }
    }

    pub fn metrics(&self) -> &Metrics {
        match self {
            AuditReport::File(result) => &result.metrics,
            AuditReport::Directory(dir) => &dir.metrics,
        }
    }
}

fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn not_python(path: &Path) -> AuditError {
    AuditError::file_access(
        path,
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a Python source file"),
    )
}

pub struct Auditor {
    config: AuditConfig,
    model: Option<Box<dyn ModelClient>>,
    index: OnceCell<ThreatIndex>,
    generator: ReportGenerator,
}

impl Auditor {
    /// Static-only auditor.
    pub fn new(config: AuditConfig) -> Self {
        Self {
            config,
            model: None,
            index: OnceCell::new(),
            generator: ReportGenerator::new(),
        }
    }

    /// Hybrid auditor talking to the configured Gemini endpoint. Fails when
    /// no API key is configured.
    pub fn hybrid(config: AuditConfig) -> Result<Self> {
        let client = GeminiClient::new(&config.model, config.require_api_key()?);
        Ok(Self::new(config).with_model(Box::new(client)))
    }

    pub fn with_model(mut self, client: Box<dyn ModelClient>) -> Self {
        self.model = Some(client);
        self
    }

    pub fn with_threat_index(self, index: ThreatIndex) -> Self {
        let _ = self.index.set(index);
        self
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    fn finish(
        &self,
        target: &Path,
        mode: AuditMode,
        files_scanned: usize,
        findings: Vec<Finding>,
        snippets: &[String],
    ) -> AuditResult {
        let static_findings: Vec<Finding> = findings
            .iter()
            .filter(|f| f.origin == Origin::Static)
            .cloned()
            .collect();
        let metrics = self.generator.score(&findings);
        AuditResult {
            target: target.to_path_buf(),
            mode,
            timestamp: timestamp(),
            ruleset_version: RULESET_VERSION.to_string(),
            files_scanned,
            recommendations: self.generator.recommendations(&metrics),
            hardening: self.generator.assess_hardening(&static_findings, snippets),
            metrics,
            findings,
            profile: None,
            model_result: None,
            annotation: None,
            sidecar: None,
            warnings: AuditWarnings::default(),
        }
    }

    /// Static scan of a file or a directory tree, annotating when enabled.
    pub fn scan(&self, target: &Path) -> Result<AuditResult> {
        let scan_config = &self.config.scan;
        let (outcome, files) = if target.is_dir() {
            let outcome = detector::scan_directory(target, None, scan_config);
            (outcome, detector::collect_python_files(target, scan_config))
        } else {
            if !is_python_source(target) {
                return Err(not_python(target));
            }
            let outcome = detector::ScanOutcome {
                findings: detector::scan_file(target, None)?,
                files_scanned: 1,
                skipped: Vec::new(),
            };
            (outcome, vec![target.to_path_buf()])
        };
        let findings = outcome.findings;

        let annotation = scan_config
            .annotate
            .then(|| annotate::merge_and_annotate(&findings, &[], &files, &[]));

        let mut result = self.finish(target, AuditMode::Static, outcome.files_scanned, findings, &[]);
        if let Some(report) = &annotation {
            result.warnings.annotation_failures = report.failures.len();
        }
        result.annotation = annotation;
        result.warnings.skipped_files = outcome.skipped;
        info!(
            target = %target.display(),
            findings = result.metrics.total,
            rating = %result.metrics.rating,
            "static scan complete"
        );
        Ok(result)
    }

    /// Ask the model about one file. Soft failures are recorded and yield
    /// `None`; configuration errors propagate.
    fn consult_model(
        &self,
        path: &Path,
        source: &str,
        warnings: &mut AuditWarnings,
    ) -> Result<Option<StructuredResult>> {
        let Some(client) = &self.model else {
            return Ok(None);
        };

        let retrieval = &self.config.retrieval;
        let context = self
            .index
            .get_or_init(|| ThreatIndex::from_config(retrieval))
            .retrieve_context(&retrieval.query, retrieval.top_k);

        let card = AgentCard::for_file(path, sidecar::read_card(path));
        let prompt = model::analysis_prompt(&card, &model::prompt::default_tool_schema(), source, &context);

        match model::analyze(client.as_ref(), &prompt, self.config.model.repair_retry) {
            Ok(analysis) => {
                if analysis.repaired {
                    warnings.repair_prompts += 1;
                }
                Ok(Some(analysis.result))
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "model analysis unavailable, continuing static only");
                warnings.record(&e);
                Ok(None)
            }
        }
    }

    /// Hybrid audit of one Python file.
    pub fn audit_file(&self, path: &Path) -> Result<AuditResult> {
        if !path.is_file() {
            return Err(AuditError::file_access(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "not a file"),
            ));
        }
        if !is_python_source(path) {
            return Err(not_python(path));
        }

        let source = detector::read_source(path)?;
        let tree = SourceTree::parse(path, &source)?;

        let mut warnings = AuditWarnings::default();
        let model_result = self.consult_model(path, &source, &mut warnings)?;
        let profile = model_result.as_ref().map(BehaviorProfile::from_result);

        let static_findings = detector::detect(path, &tree, profile.as_ref());
        let model_findings = model_result
            .as_ref()
            .map(StructuredResult::to_findings)
            .unwrap_or_default();
        let snippets: &[String] = model_result
            .as_ref()
            .map(|r| r.hardened_snippets.as_slice())
            .unwrap_or(&[]);

        let annotation = self.config.scan.annotate.then(|| {
            annotate::merge_and_annotate(
                &static_findings,
                &model_findings,
                &[path.to_path_buf()],
                snippets,
            )
        });

        let mut sidecar_path = None;
        if let Some(result) = model_result.as_ref().filter(|_| self.config.scan.sidecars) {
            match sidecar::update_card(path, result) {
                Ok(updated) => sidecar_path = updated,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "agent card update failed");
                    warnings.sidecar_failures += 1;
                    warnings.record(&e);
                }
            }
        }

        if let Some(report) = &annotation {
            warnings.annotation_failures = report.failures.len();
        }

        let mode = if self.model.is_some() {
            AuditMode::Hybrid
        } else {
            AuditMode::Static
        };
        let findings = static_findings.into_iter().chain(model_findings).collect();
        let mut result = self.finish(path, mode, 1, findings, snippets);
        result.profile = profile;
        result.model_result = model_result;
        result.annotation = annotation;
        result.sidecar = sidecar_path;
        result.warnings = warnings;

        info!(
            path = %path.display(),
            findings = result.metrics.total,
            context_enhanced = result.context_enhanced(),
            "audit complete"
        );
        Ok(result)
    }

    /// Audit every Python file under `root`, sequentially.
    pub fn audit_directory(&self, root: &Path) -> Result<DirectoryAudit> {
        if !root.is_dir() {
            return Err(AuditError::file_access(
                root,
                std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            ));
        }

        let files = detector::collect_python_files(root, &self.config.scan);
        if files.is_empty() {
            warn!(root = %root.display(), "no Python files found");
        }

        let mut results = Vec::new();
        let mut failures = Vec::new();
        for path in &files {
            match self.audit_file(path) {
                Ok(result) => results.push(result),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "file audit failed");
                    failures.push(FileFailure {
                        path: path.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let project_findings = if self.config.scan.project_checks {
            detector::project::project_findings(root, &self.config.scan.skip_dirs)
        } else {
            Vec::new()
        };

        let all: Vec<Finding> = results
            .iter()
            .flat_map(|r| r.findings.iter().cloned())
            .chain(project_findings.iter().cloned())
            .collect();
        let summary = DirectorySummary::from_results(&results, failures.len());

        Ok(DirectoryAudit {
            root: root.to_path_buf(),
            timestamp: timestamp(),
            ruleset_version: RULESET_VERSION.to_string(),
            metrics: self.generator.score(&all),
            results,
            failures,
            project_findings,
            summary,
        })
    }

    /// File or directory, whichever `target` is.
    pub fn audit(&self, target: &Path) -> Result<AuditReport> {
        if target.is_dir() {
            self.audit_directory(target).map(AuditReport::Directory)
        } else {
            self.audit_file(target).map(AuditReport::File)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_with(findings: Vec<Finding>, profile: Option<BehaviorProfile>) -> AuditResult {
        let auditor = Auditor::new(AuditConfig::default());
        let mut result = auditor.finish(Path::new("a.py"), AuditMode::Static, 1, findings, &[]);
        result.profile = profile;
        result
    }

    fn finding(escalated: bool) -> Finding {
        let mut f = Finding::new_static(
            Path::new("a.py"),
            1,
            RiskCategory::Execution,
            Severity::Critical,
            "Critical: eval() detected",
            "fix",
        );
        if escalated {
            f.escalated_from = Some(Severity::Medium);
        }
        f
    }

    #[test]
    fn test_directory_summary_rates() {
        let high_risk = BehaviorProfile {
            prompt_injection: true,
            ..Default::default()
        };
        let results = vec![
            result_with(vec![finding(true), finding(false)], Some(high_risk)),
            result_with(vec![finding(false), finding(false)], None),
        ];
        let summary = DirectorySummary::from_results(&results, 1);
        assert_eq!(summary.total_files, 3);
        assert_eq!(summary.successful, 2);
        assert_eq!(summary.total_findings, 4);
        assert_eq!(summary.context_enhanced, 1);
        assert_eq!(summary.high_risk_agents, 1);
        assert_eq!(summary.average_findings_per_file, 2.0);
        assert_eq!(summary.context_enhancement_rate, 0.25);
        assert_eq!(summary.high_risk_rate, 0.5);
    }

    #[test]
    fn test_empty_summary_has_zero_rates() {
        let summary = DirectorySummary::from_results(&[], 0);
        assert_eq!(summary.average_findings_per_file, 0.0);
        assert_eq!(summary.high_risk_rate, 0.0);
    }
}
