// SPDX-License-Identifier: PMPL-1.0-or-later

//! Threat taxonomy retrieval

use autoharden::config::RetrievalConfig;
use autoharden::error::{AuditError, Result};
use autoharden::retriever::{Embedder, HashedEmbedder, ThreatIndex, DEFAULT_TAXONOMY};
use proptest::prelude::*;
use std::fs;
use tempfile::TempDir;

fn default_index() -> ThreatIndex {
    ThreatIndex::build(DEFAULT_TAXONOMY, Box::new(HashedEmbedder::default()))
}

struct Broken;

impl Embedder for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(AuditError::ModelUnavailable("connection refused".into()))
    }
}

#[test]
fn test_entry_retrieves_itself_first() {
    let index = default_index();
    for entry in index.entries() {
        let text = format!("{}\n{}", entry.title, entry.body);
        let hits = index.query(&text, 1);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entry.title, entry.title);
        assert!(hits[0].distance < 1e-4);
    }
}

#[test]
fn test_topical_query() {
    let index = default_index();
    let hits = index.query("remote code execution through eval and subprocess", 3);
    assert_eq!(hits.len(), 3);
    assert!(hits
        .iter()
        .any(|h| h.entry.title.to_lowercase().contains("code execution")));
}

#[test]
fn test_custom_taxonomy_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("threats.md");
    fs::write(
        &path,
        "# Threats\nintro text, ignored\n\n## 1. Tool Misuse\nAgents call tools they should not.\n\n\
         ## 2. Data Leakage\nSecrets end up in model replies.\n\n\
         ## 3. Empty\n\n",
    )
    .unwrap();

    let config = RetrievalConfig {
        taxonomy_path: Some(path),
        ..Default::default()
    };
    let index = ThreatIndex::from_config(&config);
    assert_eq!(index.len(), 2);
    let context = index.retrieve_context("secrets leaking through replies", 1);
    assert_eq!(context, "Secrets end up in model replies.");
}

#[test]
fn test_failing_embedder_yields_empty_context() {
    let index = ThreatIndex::build(DEFAULT_TAXONOMY, Box::new(Broken));
    assert!(index.is_empty());
    assert!(index.query("anything", 3).is_empty());
    assert_eq!(index.retrieve_context("anything", 3), "");
}

#[test]
fn test_zero_k() {
    assert!(default_index().query("prompt injection", 0).is_empty());
}

proptest! {
    #[test]
    fn prop_query_size_and_order(query in "[a-z ]{0,80}", k in 0usize..15) {
        let index = default_index();
        let hits = index.query(&query, k);
        prop_assert_eq!(hits.len(), k.min(index.len()));
        for pair in hits.windows(2) {
            prop_assert!(pair[0].distance <= pair[1].distance);
        }
    }
}
