//! Scoring methods under evaluation and how their values are read from records.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::HarnessError;
use crate::record::CandidateRecord;

pub const UTG_SCORE_KEY: &str = "average_test_score";
pub const REWARD_KEY: &str = "reward";
pub const REWARD_SCORE_KEY: &str = "reward_score";

/// Which reward field a `reward` run reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardField {
    /// `reward_score`, falling back to the nested `reward.reward_score`.
    #[default]
    RewardScore,
    /// A numeric top-level `reward`.
    Reward,
}

impl FromStr for RewardField {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "reward_score" => Ok(Self::RewardScore),
            "reward" => Ok(Self::Reward),
            other => Err(HarnessError::invalid_parameter(format!(
                "unknown reward field '{other}'; expected reward or reward_score"
            ))),
        }
    }
}

/// The scoring signal compared against ground truth. One per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ScoringMethod {
    /// Pass rate on generated unit tests (`average_test_score`).
    Utg,
    /// Learned reward model output.
    Reward { field: RewardField },
}

impl ScoringMethod {
    /// Resolve a method name (`utg` or `reward`).
    pub fn parse(name: &str, reward_field: RewardField) -> Result<Self, HarnessError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "utg" => Ok(Self::Utg),
            "reward" => Ok(Self::Reward {
                field: reward_field,
            }),
            other => Err(HarnessError::invalid_parameter(format!(
                "unknown scoring method '{other}'; expected utg or reward"
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Utg => "utg",
            Self::Reward { .. } => "reward",
        }
    }

    /// Field the method reads, as reported in errors and summaries.
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::Utg => UTG_SCORE_KEY,
            Self::Reward {
                field: RewardField::RewardScore,
            } => REWARD_SCORE_KEY,
            Self::Reward {
                field: RewardField::Reward,
            } => REWARD_KEY,
        }
    }

    /// The method's value for `record`, if present and numeric.
    pub fn value(&self, record: &CandidateRecord) -> Option<f64> {
        match self {
            Self::Utg => record.number(UTG_SCORE_KEY),
            Self::Reward {
                field: RewardField::Reward,
            } => record.number(REWARD_KEY),
            Self::Reward {
                field: RewardField::RewardScore,
            } => record.number(REWARD_SCORE_KEY).or_else(|| {
                record
                    .get(REWARD_KEY)
                    .and_then(|reward| reward.get(REWARD_SCORE_KEY))
                    .and_then(Value::as_f64)
                    .filter(|v| v.is_finite())
            }),
        }
    }
}

impl fmt::Display for ScoringMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.field_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> CandidateRecord {
        CandidateRecord::from_value(value).unwrap()
    }

    #[test]
    fn unknown_method_is_invalid_parameter() {
        let err = ScoringMethod::parse("bleu", RewardField::default()).unwrap_err();
        assert!(matches!(err, HarnessError::InvalidParameter(_)));
        assert!("score".parse::<RewardField>().is_err());
    }

    #[test]
    fn reward_score_falls_back_to_nested_object() {
        let method = ScoringMethod::parse("reward", RewardField::RewardScore).unwrap();
        let flat = record(json!({"reward_score": 0.4}));
        let nested = record(json!({"reward": {"reward_score": -7.5, "response": "reward:-7.5"}}));
        assert_eq!(method.value(&flat), Some(0.4));
        assert_eq!(method.value(&nested), Some(-7.5));
    }

    #[test]
    fn reward_field_requires_a_number() {
        let method = ScoringMethod::Reward {
            field: RewardField::Reward,
        };
        assert_eq!(method.value(&record(json!({"reward": 0.25}))), Some(0.25));
        assert_eq!(method.value(&record(json!({"reward": {"reward_score": 1.0}}))), None);
    }

    #[test]
    fn utg_reads_average_test_score() {
        let method = ScoringMethod::parse("UTG", RewardField::default()).unwrap();
        assert_eq!(method.field_name(), "average_test_score");
        assert_eq!(method.value(&record(json!({"average_test_score": 0.5}))), Some(0.5));
        assert_eq!(method.value(&record(json!({"average_test_score": "0.5"}))), None);
    }

    #[test]
    fn reward_field_parses_cli_spelling() {
        assert_eq!("reward-score".parse::<RewardField>().unwrap(), RewardField::RewardScore);
        assert_eq!("reward".parse::<RewardField>().unwrap(), RewardField::Reward);
    }
}
