//! Error types shared by the aggregation, sampling and metric stages.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the harness core.
///
/// Only `InvalidParameter`, `Io`, `Json` and `Pattern` abort a run. The
/// remaining kinds describe a single record or group; stages count them in
/// their stats instead of returning them.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Bad runtime parameter (k = 0, unknown method name, ...). Fatal.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A record is missing a required key or is not a JSON object.
    #[error("malformed record at {location}: {reason}")]
    MalformedRecord { location: String, reason: String },

    /// A record inside an otherwise valid group lacks a usable value.
    #[error("missing field `{field}` in {dataset}/{task_id}")]
    MissingField {
        field: String,
        dataset: String,
        task_id: String,
    },

    /// A metric is undefined for the group (n < 2 or zero variance).
    #[error("degenerate group {dataset}/{task_id}: {reason}")]
    DegenerateGroup {
        dataset: String,
        task_id: String,
        reason: &'static str,
    },

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

impl HarnessError {
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter(message.into())
    }

    pub fn malformed(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            location: location.into(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error stops the whole run.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::InvalidParameter(_) | Self::Io { .. } | Self::Json(_) | Self::Pattern(_) => true,
            Self::MalformedRecord { .. }
            | Self::MissingField { .. }
            | Self::DegenerateGroup { .. } => false,
        }
    }

    /// Short code for logs and summaries.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidParameter(_) => "invalid_parameter",
            Self::MalformedRecord { .. } => "malformed_record",
            Self::MissingField { .. } => "missing_field",
            Self::DegenerateGroup { .. } => "degenerate_group",
            Self::Io { .. } => "io_error",
            Self::Json(_) => "json_error",
            Self::Pattern(_) => "pattern_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_run_level_errors_are_fatal() {
        assert!(HarnessError::invalid_parameter("k must be >= 1").is_fatal());
        assert!(!HarnessError::malformed("a.jsonl:3", "missing dataset").is_fatal());
        let missing = HarnessError::MissingField {
            field: "average_test_score".to_string(),
            dataset: "HE_plus".to_string(),
            task_id: "HumanEval/0".to_string(),
        };
        assert!(!missing.is_fatal());
        assert_eq!(missing.code(), "missing_field");
        assert_eq!(
            missing.to_string(),
            "missing field `average_test_score` in HE_plus/HumanEval/0"
        );
    }
}
