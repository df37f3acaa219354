// SPDX-License-Identifier: PMPL-1.0-or-later

//! Gemini `generateContent` client

use super::{ModelClient, Prompt};
use crate::config::ModelConfig;
use crate::error::{AuditError, Result};
use crate::http;
use serde_json::{json, Value};
use tracing::debug;

pub struct GeminiClient {
    url: String,
    api_key: String,
    agent: ureq::Agent,
}

impl GeminiClient {
    pub fn new(config: &ModelConfig, api_key: &str) -> Self {
        Self {
            url: format!(
                "{}/models/{}:generateContent",
                config.endpoint.trim_end_matches('/'),
                config.name
            ),
            api_key: api_key.to_string(),
            agent: http::agent(config.timeout_secs),
        }
    }
}

fn request_body(prompt: &Prompt) -> Value {
    json!({
        "systemInstruction": { "parts": [{ "text": prompt.system }] },
        "contents": [{ "role": "user", "parts": [{ "text": prompt.user }] }],
        "generationConfig": { "temperature": 0.2 }
    })
}

/// Concatenated text parts of the first candidate.
pub fn extract_text(response: &Value) -> Result<String> {
    let parts = response
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            let reason = response
                .pointer("/promptFeedback/blockReason")
                .or_else(|| response.pointer("/candidates/0/finishReason"))
                .and_then(Value::as_str)
                .unwrap_or("no candidates");
            AuditError::ModelUnavailable(format!("empty model response: {reason}"))
        })?;

    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    Ok(text)
}

impl ModelClient for GeminiClient {
    fn generate(&self, prompt: &Prompt) -> Result<String> {
        debug!(url = %self.url, bytes = prompt.user.len(), "calling model");
        let response: Value = self
            .agent
            .post(&self.url)
            .set("x-goog-api-key", &self.api_key)
            .send_json(request_body(prompt))
            .map_err(|e| AuditError::ModelUnavailable(http::describe_error(e)))?
            .into_json()
            .map_err(|e| AuditError::ModelUnavailable(format!("model response: {e}")))?;
        extract_text(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_text_joins_parts() {
        let response = json!({
            "candidates": [{ "content": { "parts": [{ "text": "{\"risks\":" }, { "text": " []}" }] } }]
        });
        assert_eq!(extract_text(&response).unwrap(), "{\"risks\": []}");
    }

    #[test]
    fn test_blocked_prompt_is_unavailable() {
        let response = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        let err = extract_text(&response).unwrap_err();
        assert!(matches!(err, AuditError::ModelUnavailable(ref m) if m.contains("SAFETY")));
    }

    #[test]
    fn test_url_shape() {
        let client = GeminiClient::new(&ModelConfig::default(), "k");
        assert!(client.url.ends_with("/models/gemini-2.0-flash:generateContent"));
    }
}
