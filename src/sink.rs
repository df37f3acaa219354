// SPDX-License-Identifier: PMPL-1.0-or-later

//! Result sink: POST to the dashboard, fall back to a local JSON file

use crate::config::SinkConfig;
use crate::error::{AuditError, Result};
use crate::http;
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

/// Where a published result ended up
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Delivery {
    Posted { url: String },
    FallbackFile { path: PathBuf },
}

pub struct ResultSink {
    url: String,
    fallback_path: PathBuf,
    agent: ureq::Agent,
}

impl ResultSink {
    pub fn new(config: &SinkConfig) -> Self {
        Self {
            url: format!("{}/api/scan", config.endpoint.trim_end_matches('/')),
            fallback_path: config.fallback_path.clone(),
            agent: http::agent(config.timeout_secs),
        }
    }

    /// Send `result` to the dashboard; on any failure write it to the
    /// fallback file instead.
    pub fn publish<T: Serialize>(&self, result: &T) -> Result<Delivery> {
        let payload = serde_json::to_value(result)
            .map_err(|e| AuditError::SinkUnavailable(format!("unserializable result: {e}")))?;

        match self.agent.post(&self.url).send_json(&payload) {
            Ok(_) => {
                info!(url = %self.url, "results sent to dashboard");
                return Ok(Delivery::Posted {
                    url: self.url.clone(),
                });
            }
            Err(e) => warn!(url = %self.url, error = %http::describe_error(e), "dashboard unreachable"),
        }

        self.write_fallback(payload)
    }

    fn write_fallback(&self, mut payload: Value) -> Result<Delivery> {
        if let Value::Object(map) = &mut payload {
            map.entry("timestamp")
                .or_insert_with(|| Value::String(chrono::Local::now().to_rfc3339()));
        }
        let json = serde_json::to_string_pretty(&payload)
            .map_err(|e| AuditError::SinkUnavailable(e.to_string()))?;

        if let Some(parent) = self.fallback_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                AuditError::SinkUnavailable(format!("{}: {e}", parent.display()))
            })?;
        }
        fs::write(&self.fallback_path, json).map_err(|e| {
            AuditError::SinkUnavailable(format!("{}: {e}", self.fallback_path.display()))
        })?;

        info!(path = %self.fallback_path.display(), "results saved to fallback file");
        Ok(Delivery::FallbackFile {
            path: self.fallback_path.clone(),
        })
    }
}
