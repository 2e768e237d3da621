//! Reconstructs requests from Rails application logs and aggregates their
//! performance per request signature.
//!
//! Pipeline: [`classify`] → [`reconstruct`] → [`signature`] → [`aggregate`],
//! wired together by [`pipeline::Analyzer`].

pub mod aggregate;
pub mod classify;
pub mod config;
pub mod diagnostics;
pub mod errors;
pub mod model;
pub mod pipeline;
pub mod reconstruct;
pub mod signature;

pub use aggregate::{AggregateStats, Aggregator, BlockerPolicy, GlobalStats, StatField};
pub use classify::LineClassifier;
pub use config::AnalyzerConfig;
pub use diagnostics::Diagnostics;
pub use errors::{AnalyzeError, ConfigError, InvalidRequest, MalformedLine, UnknownField};
pub use model::{
    CompletedLine, CompletedRequest, LineEvent, LineKind, PendingRequest, RequestTarget,
    StartedLine,
};
pub use pipeline::{Analysis, Analyzer, StreamReport};
pub use reconstruct::Reconstructor;
pub use signature::{normalize_url, signature};
