// SPDX-License-Identifier: PMPL-1.0-or-later

//! Threat taxonomy retrieval
//!
//! The taxonomy is split into numbered sections, each embedded once. Queries
//! are answered by exact nearest-neighbour search on L2 distance. Every
//! failure here is soft: the caller gets an empty index or empty context and
//! a warning in the log.

pub mod embed;
pub mod taxonomy;

use crate::config::RetrievalConfig;
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

pub use embed::{Embedder, HashedEmbedder, HttpEmbedder};
pub use taxonomy::{parse_sections, ThreatSection};

/// Agentic threat taxonomy shipped with the binary
pub const DEFAULT_TAXONOMY: &str = include_str!("../../taxonomy/agentic_threats.md");

/// An embedded taxonomy section
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreatEntry {
    pub title: String,
    pub body: String,
    #[serde(skip)]
    pub embedding: Vec<f32>,
}

/// A query hit
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThreatMatch<'a> {
    pub entry: &'a ThreatEntry,
    pub distance: f32,
}

pub struct ThreatIndex {
    entries: Vec<ThreatEntry>,
    embedder: Box<dyn Embedder>,
}

impl ThreatIndex {
    /// Parse and embed a taxonomy. An embedding failure leaves the index
    /// empty.
    pub fn build(taxonomy_text: &str, embedder: Box<dyn Embedder>) -> Self {
        let sections = parse_sections(taxonomy_text);
        if sections.is_empty() {
            warn!("taxonomy has no numbered sections");
            return Self {
                entries: Vec::new(),
                embedder,
            };
        }

        let texts: Vec<String> = sections.iter().map(ThreatSection::embedding_text).collect();
        let entries = match embedder.embed(&texts) {
            Ok(vectors) => {
                let dims = vectors.first().map(Vec::len).unwrap_or(0);
                sections
                    .into_iter()
                    .zip(vectors)
                    .filter(|(section, v)| {
                        let ok = v.len() == dims && dims > 0;
                        if !ok {
                            warn!(title = %section.title, "dropping entry with bad embedding");
                        }
                        ok
                    })
                    .map(|(section, embedding)| ThreatEntry {
                        title: section.title,
                        body: section.body,
                        embedding,
                    })
                    .collect()
            }
            Err(e) => {
                warn!(embedder = embedder.name(), error = %e, "taxonomy embedding failed");
                Vec::new()
            }
        };

        info!(entries = entries.len(), embedder = embedder.name(), "threat index built");
        Self { entries, embedder }
    }

    /// Build from configuration: taxonomy file or the built-in one, HTTP
    /// embedder when an endpoint is configured, local hashing otherwise.
    pub fn from_config(config: &RetrievalConfig) -> Self {
        let text = match &config.taxonomy_path {
            Some(path) => load_taxonomy(path),
            None => DEFAULT_TAXONOMY.to_string(),
        };
        let embedder: Box<dyn Embedder> = match &config.embeddings_url {
            Some(url) => Box::new(HttpEmbedder::new(
                url,
                &config.embeddings_model,
                config.embeddings_api_key.clone(),
                config.timeout_secs,
            )),
            None => Box::new(HashedEmbedder::default()),
        };
        Self::build(&text, embedder)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ThreatEntry] {
        &self.entries
    }

    /// The `min(k, len)` nearest entries by L2 distance, ascending. Ties keep
    /// taxonomy order.
    pub fn query(&self, text: &str, k: usize) -> Vec<ThreatMatch<'_>> {
        if self.entries.is_empty() || k == 0 {
            return Vec::new();
        }
        let query = match self.embedder.embed(&[text.to_string()]) {
            Ok(mut vectors) if !vectors.is_empty() => vectors.swap_remove(0),
            Ok(_) => return Vec::new(),
            Err(e) => {
                warn!(error = %e, "query embedding failed");
                return Vec::new();
            }
        };
        if query.len() != self.entries[0].embedding.len() {
            warn!(
                query = query.len(),
                index = self.entries[0].embedding.len(),
                "query dimension mismatch"
            );
            return Vec::new();
        }

        let mut matches: Vec<ThreatMatch<'_>> = self
            .entries
            .iter()
            .map(|entry| ThreatMatch {
                entry,
                distance: l2_distance(&query, &entry.embedding),
            })
            .collect();
        matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        matches.truncate(k);
        debug!(k, hits = matches.len(), "threat query");
        matches
    }

    /// Bodies of the nearest entries joined by blank lines; empty on any
    /// failure.
    pub fn retrieve_context(&self, query: &str, k: usize) -> String {
        self.query(query, k)
            .iter()
            .map(|m| m.entry.body.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

fn load_taxonomy(path: &Path) -> String {
    match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "threat taxonomy unreadable");
            String::new()
        }
    }
}

pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_taxonomy_loads() {
        let index = ThreatIndex::build(DEFAULT_TAXONOMY, Box::new(HashedEmbedder::default()));
        assert_eq!(index.len(), 10);
        assert!(index.entries()[0].title.starts_with("1."));
    }

    #[test]
    fn test_missing_taxonomy_is_empty() {
        let config = RetrievalConfig {
            taxonomy_path: Some("/nonexistent/threats.md".into()),
            ..Default::default()
        };
        let index = ThreatIndex::from_config(&config);
        assert!(index.is_empty());
        assert_eq!(index.retrieve_context("anything", 3), "");
    }

    #[test]
    fn test_l2_distance() {
        assert_eq!(l2_distance(&[0.0, 3.0], &[4.0, 0.0]), 5.0);
    }
}
