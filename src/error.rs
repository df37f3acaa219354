// SPDX-License-Identifier: PMPL-1.0-or-later

//! Error taxonomy for an audit run
//!
//! Only [`AuditError::Configuration`] may abort a run. Every other kind is
//! caught at a stage boundary and surfaced as a warning or counter on the
//! audit result.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("cannot access {path}: {source}")]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot walk {path}: {reason}")]
    ParseStructural { path: PathBuf, reason: String },

    #[error("model output could not be recovered: {0}")]
    MalformedOutput(String),

    #[error("model backend unavailable: {0}")]
    ModelUnavailable(String),

    #[error("result sink unavailable: {0}")]
    SinkUnavailable(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl AuditError {
    pub fn file_access(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AuditError::FileAccess {
            path: path.into(),
            source,
        }
    }

    pub fn parse_structural(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        AuditError::ParseStructural {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, AuditError::Configuration(_))
    }
}

pub type Result<T> = std::result::Result<T, AuditError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_configuration_is_fatal() {
        assert!(AuditError::Configuration("missing key".into()).is_fatal());
        assert!(!AuditError::MalformedOutput("bad".into()).is_fatal());
        assert!(!AuditError::SinkUnavailable("down".into()).is_fatal());
        assert!(!AuditError::parse_structural("a.py", "syntax").is_fatal());
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(!AuditError::file_access("a.py", io).is_fatal());
    }
}
