//! Run configuration: optional JSON file, overridden field by field from the CLI.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::HarnessError;
use crate::metrics::EvalOptions;
use crate::scoring::{RewardField, ScoringMethod};

/// Candidates kept per task when no size is configured.
pub const DEFAULT_SAMPLE_SIZE: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// `utg` or `reward`.
    pub method: Option<String>,
    pub reward_field: Option<RewardField>,
    pub sample_size: Option<usize>,
    pub normalize_scores: Option<bool>,
    pub datasets: Option<Vec<String>>,
}

pub fn load_run_config(path: impl AsRef<Path>) -> Result<RunConfig, HarnessError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|e| HarnessError::io(path, e))?;
    let config: RunConfig = serde_json::from_str(&raw)?;
    Ok(config)
}

impl RunConfig {
    /// Layer `overrides` on top of `self`; set fields in `overrides` win.
    pub fn merge(self, overrides: RunConfig) -> RunConfig {
        RunConfig {
            method: overrides.method.or(self.method),
            reward_field: overrides.reward_field.or(self.reward_field),
            sample_size: overrides.sample_size.or(self.sample_size),
            normalize_scores: overrides.normalize_scores.or(self.normalize_scores),
            datasets: overrides.datasets.or(self.datasets),
        }
    }

    pub fn scoring_method(&self) -> Result<ScoringMethod, HarnessError> {
        ScoringMethod::parse(
            self.method.as_deref().unwrap_or("utg"),
            self.reward_field.unwrap_or_default(),
        )
    }

    pub fn eval_options(&self) -> Result<EvalOptions, HarnessError> {
        let mut opts = EvalOptions::new(self.scoring_method()?);
        opts.normalize_scores = self.normalize_scores.unwrap_or(false);
        opts.datasets = match &self.datasets {
            Some(list) if list.is_empty() => None,
            other => other.clone(),
        };
        Ok(opts)
    }

    pub fn sample_size(&self) -> Result<usize, HarnessError> {
        match self.sample_size.unwrap_or(DEFAULT_SAMPLE_SIZE) {
            0 => Err(HarnessError::invalid_parameter("sample size k must be >= 1")),
            k => Ok(k),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_values_override_file_values() {
        let file: RunConfig = serde_json::from_str(
            r#"{"method": "reward", "reward_field": "reward", "sample_size": 8}"#,
        )
        .unwrap();
        let cli = RunConfig {
            sample_size: Some(3),
            ..RunConfig::default()
        };
        let merged = file.merge(cli);
        assert_eq!(merged.sample_size().unwrap(), 3);
        assert_eq!(
            merged.scoring_method().unwrap(),
            ScoringMethod::Reward {
                field: RewardField::Reward
            }
        );
    }

    #[test]
    fn defaults_are_utg_and_five() {
        let config = RunConfig::default();
        assert_eq!(config.scoring_method().unwrap(), ScoringMethod::Utg);
        assert_eq!(config.sample_size().unwrap(), DEFAULT_SAMPLE_SIZE);
        assert!(!config.eval_options().unwrap().normalize_scores);
    }

    #[test]
    fn bad_values_are_invalid_parameters() {
        let config = RunConfig {
            method: Some("bleu".to_string()),
            sample_size: Some(0),
            ..RunConfig::default()
        };
        assert!(matches!(
            config.scoring_method(),
            Err(HarnessError::InvalidParameter(_))
        ));
        assert!(matches!(
            config.sample_size(),
            Err(HarnessError::InvalidParameter(_))
        ));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let parsed = serde_json::from_str::<RunConfig>(r#"{"k": 5}"#);
        assert!(parsed.is_err());
    }
}
