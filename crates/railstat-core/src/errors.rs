//! Error types for the analysis pipeline.
//!
//! Only [`AnalyzeError::Io`] stops a stream. Every other kind is scoped to a
//! single line, request or call and is recovered by the caller.

use std::path::PathBuf;

use thiserror::Error;

use crate::model::LineKind;

/// A line carried a known marker but its fields could not be parsed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("malformed {kind} line {line}: {reason}")]
pub struct MalformedLine {
    pub line: usize,
    pub kind: LineKind,
    pub reason: String,
}

impl MalformedLine {
    pub fn new(line: usize, kind: LineKind, reason: impl Into<String>) -> Self {
        Self {
            line,
            kind,
            reason: reason.into(),
        }
    }
}

/// A reconstructed request has neither a URL nor a controller/action pair.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("request completed at line {line} has no url or controller/action")]
pub struct InvalidRequest {
    pub line: usize,
}

/// Sorting was requested on a statistic that does not exist.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown stat field '{name}'")]
pub struct UnknownField {
    pub name: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("failed to read {source_name} at line {line}: {source}")]
    Io {
        source_name: String,
        line: usize,
        #[source]
        source: std::io::Error,
    },
}
