use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Line types the classifier can be asked to recognize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    Started,
    Completed,
}

impl fmt::Display for LineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineKind::Started => f.write_str("started"),
            LineKind::Completed => f.write_str("completed"),
        }
    }
}

/// What a request was addressed to: a URL or a controller/action pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestTarget {
    Url(String),
    ControllerAction { controller: String, action: String },
}

impl RequestTarget {
    pub fn controller_action(controller: impl Into<String>, action: impl Into<String>) -> Self {
        RequestTarget::ControllerAction {
            controller: controller.into(),
            action: action.into(),
        }
    }
}

/// Fields of a line that opens a request.
#[derive(Debug, Clone, PartialEq)]
pub struct StartedLine {
    pub timestamp: NaiveDateTime,
    pub remote_addr: String,
    pub http_method: String,
    pub target: RequestTarget,
}

/// Fields of a line that closes a request. Timings are in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedLine {
    pub timestamp: Option<NaiveDateTime>,
    pub duration_seconds: f64,
    pub http_status: u16,
    pub database_seconds: Option<f64>,
    pub view_seconds: Option<f64>,
    pub target: Option<RequestTarget>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LineEvent {
    Started(StartedLine),
    Completed(CompletedLine),
}

impl LineEvent {
    pub fn kind(&self) -> LineKind {
        match self {
            LineEvent::Started(_) => LineKind::Started,
            LineEvent::Completed(_) => LineKind::Completed,
        }
    }
}

/// A Started line waiting for its Completed line.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRequest {
    pub line: usize,
    pub started: StartedLine,
}

/// One reconstructed request, consumed once by the normalizer and aggregator.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedRequest {
    /// Line number of the Completed line that closed this request.
    pub line: usize,
    pub timestamp: Option<NaiveDateTime>,
    pub duration_seconds: f64,
    pub database_seconds: Option<f64>,
    pub view_seconds: Option<f64>,
    pub http_status: u16,
    pub http_method: Option<String>,
    pub target: Option<RequestTarget>,
}

impl CompletedRequest {
    /// Request time not accounted for by the database. Unknown database time counts as zero.
    pub fn non_database_seconds(&self) -> f64 {
        (self.duration_seconds - self.database_seconds.unwrap_or(0.0)).max(0.0)
    }
}
