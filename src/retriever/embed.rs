// SPDX-License-Identifier: PMPL-1.0-or-later

//! Text embedders for threat retrieval

use crate::error::{AuditError, Result};
use crate::http;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

/// Turns texts into fixed-length vectors. Implementations must return one
/// vector per input, in input order.
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

pub const HASHED_DIMENSIONS: usize = 256;

/// Local feature-hashing bag-of-words embedder. Deterministic and offline;
/// good enough to rank a short taxonomy by keyword overlap.
#[derive(Debug, Clone)]
pub struct HashedEmbedder {
    dimensions: usize,
}

impl HashedEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let lowered = text.to_lowercase();
        for token in lowered
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|t| t.len() > 1)
        {
            let hash = blake3::hash(token.as_bytes());
            let bytes = hash.as_bytes();
            let bucket = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize
                % self.dimensions;
            let sign = if bytes[4] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        normalize(&mut vector);
        vector
    }
}

impl Default for HashedEmbedder {
    fn default() -> Self {
        Self::new(HASHED_DIMENSIONS)
    }
}

impl Embedder for HashedEmbedder {
    fn name(&self) -> &str {
        "hashed"
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Scale to unit length; the zero vector is left alone.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Client for an OpenAI-compatible `/embeddings` endpoint.
pub struct HttpEmbedder {
    url: String,
    model: String,
    api_key: Option<String>,
    agent: ureq::Agent,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    pub fn new(base_url: &str, model: &str, api_key: Option<String>, timeout_secs: u64) -> Self {
        Self {
            url: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
            api_key,
            agent: http::agent(timeout_secs),
        }
    }
}

impl Embedder for HttpEmbedder {
    fn name(&self) -> &str {
        &self.model
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        debug!(url = %self.url, count = texts.len(), "requesting embeddings");
        let mut request = self.agent.post(&self.url);
        if let Some(key) = &self.api_key {
            request = request.set("Authorization", &format!("Bearer {key}"));
        }
        let response = request
            .send_json(json!({ "model": self.model, "input": texts }))
            .map_err(|e| AuditError::ModelUnavailable(http::describe_error(e)))?;
        let mut parsed: EmbeddingResponse = response
            .into_json()
            .map_err(|e| AuditError::ModelUnavailable(format!("embedding response: {e}")))?;

        if parsed.data.len() != texts.len() {
            return Err(AuditError::ModelUnavailable(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }
        parsed.data.sort_by_key(|item| item.index);
        Ok(parsed.data.into_iter().map(|item| item.embedding).collect())
    }
}
