// SPDX-License-Identifier: PMPL-1.0-or-later

//! Language-model collaborator
//!
//! The model is an untrusted text generator behind [`ModelClient`]. Its
//! reply goes through the recovering parser; when nothing can be recovered a
//! single repair prompt is sent before giving up.

pub mod gemini;
pub mod prompt;

use crate::error::{AuditError, Result};
use crate::parser;
use crate::types::StructuredResult;
use tracing::{info, warn};

pub use gemini::GeminiClient;
pub use prompt::{analysis_prompt, repair_prompt, AgentCard, Prompt};

/// Anything that turns a prompt into reply text
pub trait ModelClient: Send + Sync {
    fn generate(&self, prompt: &Prompt) -> Result<String>;
}

/// Outcome of one analysis exchange
#[derive(Debug, Clone)]
pub struct Analysis {
    pub result: StructuredResult,
    /// The repair prompt was needed
    pub repaired: bool,
}

/// Ask for guardrails and parse the reply, with at most one repair round.
pub fn analyze(client: &dyn ModelClient, prompt: &Prompt, repair_retry: bool) -> Result<Analysis> {
    let raw = client.generate(prompt)?;
    match parser::parse(&raw) {
        Ok(result) => Ok(Analysis {
            result,
            repaired: false,
        }),
        Err(AuditError::MalformedOutput(reason)) if repair_retry => {
            warn!(%reason, "model output unparseable, sending repair prompt");
            let retry = client.generate(&repair_prompt(&raw))?;
            let result = parser::parse(&retry)?;
            info!("repair prompt recovered structured output");
            Ok(Analysis {
                result,
                repaired: true,
            })
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Scripted(Mutex<Vec<Result<String>>>);

    impl ModelClient for Scripted {
        fn generate(&self, _prompt: &Prompt) -> Result<String> {
            self.0.lock().unwrap().remove(0)
        }
    }

    fn prompt() -> Prompt {
        Prompt {
            system: String::new(),
            user: String::new(),
        }
    }

    #[test]
    fn test_repair_round() {
        let client = Scripted(Mutex::new(vec![
            Ok("no json here".to_string()),
            Ok("{\"risks\": [{\"description\": \"x\", \"severity\": \"low\"}]}".to_string()),
        ]));
        let analysis = analyze(&client, &prompt(), true).unwrap();
        assert!(analysis.repaired);
        assert_eq!(analysis.result.risks.len(), 1);
    }

    #[test]
    fn test_single_retry_only() {
        let client = Scripted(Mutex::new(vec![
            Ok("still prose".to_string()),
            Ok("more prose".to_string()),
            Ok("{}".to_string()),
        ]));
        let err = analyze(&client, &prompt(), true).unwrap_err();
        assert!(matches!(err, AuditError::MalformedOutput(_)));
        assert_eq!(client.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_no_retry_when_disabled() {
        let client = Scripted(Mutex::new(vec![Ok("prose".to_string())]));
        assert!(analyze(&client, &prompt(), false).is_err());
    }

    #[test]
    fn test_transport_failure_propagates() {
        let client = Scripted(Mutex::new(vec![Err(AuditError::ModelUnavailable(
            "connection refused".into(),
        ))]));
        let err = analyze(&client, &prompt(), true).unwrap_err();
        assert!(!err.is_fatal());
    }
}
