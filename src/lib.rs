// SPDX-License-Identifier: PMPL-1.0-or-later

//! autoharden: hybrid static and LLM-augmented security auditing for
//! AI-agent Python code.
//!
//! PIPELINE:
//! 1. **Retriever**: ranks a threat taxonomy against the audit query and
//!    feeds the best matches into the model prompt.
//! 2. **Model + Parser**: asks the model for constraints, risks and hardened
//!    snippets, then recovers that structure from whatever text comes back.
//! 3. **Context**: turns the model's findings into a behavior profile that
//!    escalates static severities.
//! 4. **Detector**: walks the tree-sitter parse of each file against the
//!    versioned pattern tables, plus regex and project-level passes.
//! 5. **Annotate + Report**: writes findings back as comments above the
//!    offending lines, then scores and summarises.

pub mod annotate;
pub mod audit;
pub mod config;
pub mod context;
pub mod detector;
pub mod error;
pub mod http;
pub mod model;
pub mod parser;
pub mod report;
pub mod retriever;
pub mod sidecar;
pub mod sink;
pub mod types;
pub mod walker;

pub use audit::{AuditReport, AuditResult, Auditor, DirectoryAudit};
pub use config::AuditConfig;
pub use error::{AuditError, Result};
