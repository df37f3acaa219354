// SPDX-License-Identifier: PMPL-1.0-or-later

//! Run configuration
//!
//! Everything has a default so an empty or missing `autoharden.yaml` is a
//! valid configuration. Environment variables override the file.

use crate::error::{AuditError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const API_KEY_ENV: &str = "GOOGLE_API_KEY";
const MODEL_ENV: &str = "AUTOHARDEN_MODEL";
const SINK_ENV: &str = "WEBAPP_URL";
const TAXONOMY_ENV: &str = "AUTOHARDEN_TAXONOMY";
const EMBEDDINGS_ENV: &str = "AUTOHARDEN_EMBEDDINGS_URL";
const EMBEDDINGS_KEY_ENV: &str = "AUTOHARDEN_EMBEDDINGS_KEY";

pub const DEFAULT_CONFIG_FILE: &str = "autoharden.yaml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub model: ModelConfig,
    pub sink: SinkConfig,
    pub retrieval: RetrievalConfig,
    pub scan: ScanConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Never written back out
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub name: String,
    pub endpoint: String,
    pub timeout_secs: u64,
    /// Send one repair prompt when the first reply cannot be parsed
    pub repair_retry: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            name: "gemini-2.0-flash".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout_secs: 60,
            repair_retry: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub timeout_secs: u64,
    pub fallback_path: PathBuf,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "http://localhost:5001".to_string(),
            timeout_secs: 5,
            fallback_path: PathBuf::from("latest_scan_results.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Markdown taxonomy; the built-in one is used when unset
    pub taxonomy_path: Option<PathBuf>,
    /// OpenAI-compatible embeddings endpoint; local hashing when unset
    pub embeddings_url: Option<String>,
    #[serde(skip_serializing)]
    pub embeddings_api_key: Option<String>,
    pub embeddings_model: String,
    pub timeout_secs: u64,
    pub top_k: usize,
    pub query: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            taxonomy_path: None,
            embeddings_url: None,
            embeddings_api_key: None,
            embeddings_model: "text-embedding-3-small".to_string(),
            timeout_secs: 30,
            top_k: 3,
            query: "prompt injection, tool misuse, agent execution".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Directory names never descended into
    pub skip_dirs: Vec<String>,
    /// Run the sensitive-file and hygiene checks once per root
    pub project_checks: bool,
    /// Write annotations back into audited files
    pub annotate: bool,
    /// Update `<stem>_card.yaml` sidecars when present
    pub sidecars: bool,
    /// Larger files are skipped
    pub max_file_bytes: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            skip_dirs: [
                ".git",
                "__pycache__",
                ".venv",
                "venv",
                "node_modules",
                "build",
                "dist",
                "site-packages",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            project_checks: true,
            annotate: true,
            sidecars: true,
            max_file_bytes: 2 * 1024 * 1024,
        }
    }
}

impl AuditConfig {
    /// Load from `path`, or from `autoharden.yaml` in the working directory
    /// when present, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    Self::from_file(default)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            AuditError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&text)
            .map_err(|e| AuditError::Configuration(format!("{}: {}", path.display(), e)))
    }

    pub fn from_yaml(text: &str) -> std::result::Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    fn apply_env(&mut self) {
        self.apply_overrides(|key| env::var(key).ok().filter(|v| !v.trim().is_empty()));
    }

    /// Apply overrides from a variable lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(API_KEY_ENV) {
            self.model.api_key = Some(key);
        }
        if let Some(name) = lookup(MODEL_ENV) {
            self.model.name = name;
        }
        if let Some(url) = lookup(SINK_ENV) {
            self.sink.endpoint = url;
        }
        if let Some(path) = lookup(TAXONOMY_ENV) {
            self.retrieval.taxonomy_path = Some(PathBuf::from(path));
        }
        if let Some(url) = lookup(EMBEDDINGS_ENV) {
            self.retrieval.embeddings_url = Some(url);
        }
        if let Some(key) = lookup(EMBEDDINGS_KEY_ENV) {
            self.retrieval.embeddings_api_key = Some(key);
        }
    }

    /// The API key, or a fatal configuration error when the model is needed
    /// and none was supplied.
    pub fn require_api_key(&self) -> Result<&str> {
        self.model.api_key.as_deref().ok_or_else(|| {
            AuditError::Configuration(format!(
                "model analysis requested but {} is not set",
                API_KEY_ENV
            ))
        })
    }
}
