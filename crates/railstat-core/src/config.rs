//! Analyzer configuration.
//!
//! ```yaml
//! line_types: [started, completed]
//! estimate_database_time: false
//! blocker:
//!   threshold_seconds: 1.0
//!   min_non_database_share: 0.5
//! ```
//!
//! Every key is optional. Unknown keys are reported with a warning and ignored.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::aggregate::BlockerPolicy;
use crate::classify::LineClassifier;
use crate::errors::ConfigError;
use crate::model::LineKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// `[completed]` alone is the fast pass: no Started lines are parsed.
    pub line_types: Vec<LineKind>,
    pub estimate_database_time: bool,
    pub blocker: BlockerPolicy,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            line_types: vec![LineKind::Started, LineKind::Completed],
            estimate_database_time: false,
            blocker: BlockerPolicy::default(),
        }
    }
}

impl AnalyzerConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let de = serde_yaml::Deserializer::from_str(yaml);
        let config: Self = serde_ignored::deserialize(de, |path| {
            tracing::warn!(key = %path, "ignoring unknown config key");
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.line_types.is_empty() {
            return Err(ConfigError::Invalid(
                "line_types must name at least one line type".into(),
            ));
        }
        if !self.line_types.contains(&LineKind::Completed) {
            return Err(ConfigError::Invalid(
                "line_types must include 'completed'; requests are only emitted on completion"
                    .into(),
            ));
        }
        let threshold = self.blocker.threshold_seconds;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "blocker.threshold_seconds must be a non-negative number, got {}",
                threshold
            )));
        }
        let share = self.blocker.min_non_database_share;
        if !(0.0..1.0).contains(&share) {
            return Err(ConfigError::Invalid(format!(
                "blocker.min_non_database_share must be in [0, 1), got {}",
                share
            )));
        }
        Ok(())
    }

    pub fn classifier(&self) -> LineClassifier {
        LineClassifier::new(self.line_types.iter().copied())
    }

    pub fn is_fast(&self) -> bool {
        !self.line_types.contains(&LineKind::Started)
    }
}
