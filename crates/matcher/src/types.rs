use index::{IndexError, Thresholds};
use serde::{Deserialize, Serialize};
use signature::{SignatureError, WeightProfile};
use thiserror::Error;

/// Threshold used by batch matching when the caller's value is out of range.
pub const DEFAULT_BATCH_THRESHOLD: f32 = 0.6;

/// Runtime knobs for [`crate::Matcher`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Minimum weighted overlap a candidate must exceed.
    #[serde(default = "MatchConfig::default_coefficient_threshold")]
    pub coefficient_threshold: f32,
    /// Maximum channel-average distance on Haar shards. Falls back to
    /// `coefficient_threshold` when unset.
    #[serde(default)]
    pub average_threshold: Option<f32>,
    /// Results kept per single query after the shard merge.
    #[serde(default = "MatchConfig::default_max_results")]
    pub max_results: usize,
    /// Results kept per query in batch mode.
    #[serde(default = "MatchConfig::default_batch_limit")]
    pub batch_limit: usize,
    /// Worker threads; also the batch group size.
    #[serde(default = "MatchConfig::default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub weight_profile: WeightProfile,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            coefficient_threshold: Self::default_coefficient_threshold(),
            average_threshold: None,
            max_results: Self::default_max_results(),
            batch_limit: Self::default_batch_limit(),
            workers: Self::default_workers(),
            weight_profile: WeightProfile::default(),
        }
    }
}

impl MatchConfig {
    pub(crate) fn default_coefficient_threshold() -> f32 {
        0.4
    }

    pub(crate) fn default_max_results() -> usize {
        50
    }

    pub(crate) fn default_batch_limit() -> usize {
        40
    }

    pub(crate) fn default_workers() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    pub fn thresholds(&self) -> Thresholds {
        let coefficient = self.coefficient_threshold;
        Thresholds {
            coefficient,
            average: self.average_threshold.unwrap_or(coefficient),
        }
    }

    /// Batch thresholds outside `[0, 1]` fall back to [`DEFAULT_BATCH_THRESHOLD`].
    pub fn clamp_batch_threshold(value: f32) -> f32 {
        if (0.0..=1.0).contains(&value) {
            value
        } else {
            DEFAULT_BATCH_THRESHOLD
        }
    }

    pub fn validate(&self) -> Result<(), MatchError> {
        if !self.coefficient_threshold.is_finite() {
            return Err(MatchError::InvalidConfig(
                "coefficient_threshold must be finite".into(),
            ));
        }
        if let Some(average) = self.average_threshold {
            if !average.is_finite() {
                return Err(MatchError::InvalidConfig(
                    "average_threshold must be finite".into(),
                ));
            }
        }
        if self.max_results == 0 {
            return Err(MatchError::InvalidConfig(
                "max_results must be greater than zero".into(),
            ));
        }
        if self.batch_limit == 0 {
            return Err(MatchError::InvalidConfig(
                "batch_limit must be greater than zero".into(),
            ));
        }
        if self.workers == 0 {
            return Err(MatchError::InvalidConfig(
                "workers must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("index error: {0}")]
    Index(#[from] IndexError),
    #[error("signature error: {0}")]
    Signature(#[from] SignatureError),
    #[error("worker pool error: {0}")]
    Pool(String),
}
