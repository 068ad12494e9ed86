//! Configuration for bulk import and shard building.
//!
//! [`IngestConfig`] is cheap to clone and deserializes from JSON or YAML with
//! every field optional.
//!
//! ```rust
//! use ingest::IngestConfig;
//!
//! let config = IngestConfig::default();
//! config.validate().expect("defaults are valid");
//! assert_eq!(config.flush_every, 10_000);
//! assert_eq!(config.shard_size, 4_000_000);
//! ```
use index::DEFAULT_MAX_INTEGER_SPACE;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Runtime configuration for ingestion.
///
/// - `flush_every`: records written between explicit flushes of the output
///   stream; also the number of images decoded in parallel per round.
/// - `shard_size`: signatures per index shard.
/// - `max_image_bytes`: source files larger than this are counted as failed.
/// - `max_integer_space`: ceiling on one past the largest feature id of an
///   integer or histogram shard; larger shards fail to build.
///
/// ```rust
/// use ingest::IngestConfig;
///
/// let config: IngestConfig = serde_json::from_str(r#"{"shard_size": 1000}"#).unwrap();
/// assert_eq!(config.shard_size, 1000);
/// assert_eq!(config.flush_every, 10_000);
/// assert!(config.max_image_bytes.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "IngestConfig::default_flush_every")]
    pub flush_every: usize,
    #[serde(default = "IngestConfig::default_shard_size")]
    pub shard_size: usize,
    #[serde(default)]
    pub max_image_bytes: Option<usize>,
    #[serde(default = "IngestConfig::default_max_integer_space")]
    pub max_integer_space: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            flush_every: Self::default_flush_every(),
            shard_size: Self::default_shard_size(),
            max_image_bytes: None,
            max_integer_space: Self::default_max_integer_space(),
        }
    }
}

impl IngestConfig {
    pub(crate) fn default_flush_every() -> usize {
        10_000
    }

    pub(crate) fn default_shard_size() -> usize {
        4_000_000
    }

    pub(crate) fn default_max_integer_space() -> u32 {
        DEFAULT_MAX_INTEGER_SPACE
    }

    /// Check the configuration before any file is touched.
    ///
    /// ```rust
    /// use ingest::{ConfigError, IngestConfig};
    ///
    /// let bad = IngestConfig { shard_size: 0, ..Default::default() };
    /// assert_eq!(bad.validate(), Err(ConfigError::ZeroShardSize));
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flush_every == 0 {
            return Err(ConfigError::ZeroFlushInterval);
        }
        if self.shard_size == 0 {
            return Err(ConfigError::ZeroShardSize);
        }
        if self.shard_size > u32::MAX as usize {
            return Err(ConfigError::ShardSizeTooLarge {
                size: self.shard_size,
            });
        }
        if self.max_image_bytes == Some(0) {
            return Err(ConfigError::ZeroImageLimit);
        }
        if self.max_integer_space == 0 {
            return Err(ConfigError::ZeroIntegerSpace);
        }
        Ok(())
    }
}

/// Rejected [`IngestConfig`] values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("flush_every must be greater than zero")]
    ZeroFlushInterval,

    #[error("shard_size must be greater than zero")]
    ZeroShardSize,

    /// Postings address signatures with `u32` row numbers.
    #[error("shard_size {size} exceeds the u32 row limit")]
    ShardSizeTooLarge { size: usize },

    #[error("max_image_bytes must be greater than zero when set")]
    ZeroImageLimit,

    #[error("max_integer_space must be greater than zero")]
    ZeroIntegerSpace,
}
