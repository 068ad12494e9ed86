//! YAML configuration file support for the `cbir` tool.
//!
//! One file describes every stage: which signature is extracted, how shards
//! are built and opened, how the matcher scores and how bulk imports flush.
//! Every section and field is optional except `version`.
//!
//! ## Example YAML Configuration
//!
//! ```yaml
//! version: "1.0"
//! name: "archive"
//!
//! signature:
//!   kind: haar
//!   profile: sketch
//!
//! index:
//!   disk_paged: true
//!   shard_size: 4000000
//!   shards:
//!     - shards/out-0.hsm
//!     - shards/out-1.hsm
//!
//! matcher:
//!   coefficient_threshold: 0.4
//!   average_threshold: 0.4
//!   max_results: 50
//!   batch_limit: 40
//!   workers: 8
//!
//! ingest:
//!   flush_every: 10000
//!   max_image_bytes: 10485760
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use ingest::IngestConfig;
use matcher::MatchConfig;
use serde::{Deserialize, Serialize};
use signature::{SignatureKind, WeightProfile};
use thiserror::Error;

/// Errors that can occur when loading YAML configuration files
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),
}

/// Top-level YAML configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CbirConfig {
    /// Configuration format version
    pub version: String,

    /// Optional configuration name/description
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub signature: SignatureYamlConfig,

    #[serde(default)]
    pub index: IndexYamlConfig,

    #[serde(default)]
    pub matcher: MatchYamlConfig,

    #[serde(default)]
    pub ingest: IngestYamlConfig,
}

impl CbirConfig {
    /// Load a YAML configuration file from the given path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse YAML configuration from a string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: CbirConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => Ok(()),
            v => Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }?;

        self.index.validate()?;
        self.matcher.validate()?;
        self.ingest.validate()?;

        // the composed runtime configs carry their own checks
        self.match_config()
            .validate()
            .map_err(|err| ConfigLoadError::Validation(err.to_string()))?;
        self.ingest_config()
            .validate()
            .map_err(|err| ConfigLoadError::Validation(err.to_string()))?;
        Ok(())
    }

    /// Matcher settings, with the weight profile taken from `signature`.
    pub fn match_config(&self) -> MatchConfig {
        let defaults = MatchConfig::default();
        MatchConfig {
            coefficient_threshold: self.matcher.coefficient_threshold,
            average_threshold: self.matcher.average_threshold,
            max_results: self.matcher.max_results,
            batch_limit: self.matcher.batch_limit,
            workers: self.matcher.workers.unwrap_or(defaults.workers),
            weight_profile: self.signature.profile,
        }
    }

    /// Import and shard-build settings.
    pub fn ingest_config(&self) -> IngestConfig {
        IngestConfig {
            flush_every: self.ingest.flush_every,
            shard_size: self.index.shard_size,
            max_image_bytes: self.ingest.max_image_bytes,
            max_integer_space: self.ingest.max_integer_space,
        }
    }
}

impl Default for CbirConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            name: None,
            signature: SignatureYamlConfig::default(),
            index: IndexYamlConfig::default(),
            matcher: MatchYamlConfig::default(),
            ingest: IngestYamlConfig::default(),
        }
    }
}

/// Signature extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureYamlConfig {
    #[serde(default = "default_kind")]
    pub kind: SignatureKind,

    /// Weight table used for Haar scoring
    #[serde(default)]
    pub profile: WeightProfile,
}

impl Default for SignatureYamlConfig {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            profile: WeightProfile::default(),
        }
    }
}

/// Shard building and loading
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexYamlConfig {
    /// Page Haar postings in from disk on first use
    #[serde(default)]
    pub disk_paged: bool,

    /// Signatures per shard when building
    #[serde(default = "default_shard_size")]
    pub shard_size: usize,

    /// Shards opened by `query` and `batch` when none are given
    #[serde(default)]
    pub shards: Vec<PathBuf>,
}

impl IndexYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.shard_size == 0 {
            return Err(ConfigLoadError::Validation(
                "index.shard_size must be >= 1".to_string(),
            ));
        }
        if let Some(bad) = self.shards.iter().find(|path| !is_shard_path(path)) {
            return Err(ConfigLoadError::Validation(format!(
                "index.shards entry {} must end in .hsm or .qsm",
                bad.display()
            )));
        }
        Ok(())
    }
}

impl Default for IndexYamlConfig {
    fn default() -> Self {
        Self {
            disk_paged: false,
            shard_size: default_shard_size(),
            shards: Vec::new(),
        }
    }
}

/// Matcher YAML configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchYamlConfig {
    #[serde(default = "default_threshold")]
    pub coefficient_threshold: f32,

    /// Falls back to `coefficient_threshold` when unset
    #[serde(default)]
    pub average_threshold: Option<f32>,

    #[serde(default = "default_max_results")]
    pub max_results: usize,

    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,

    /// Defaults to the available parallelism
    #[serde(default)]
    pub workers: Option<usize>,
}

impl MatchYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.max_results == 0 {
            return Err(ConfigLoadError::Validation(
                "matcher.max_results must be >= 1".to_string(),
            ));
        }
        if self.batch_limit == 0 {
            return Err(ConfigLoadError::Validation(
                "matcher.batch_limit must be >= 1".to_string(),
            ));
        }
        if self.workers == Some(0) {
            return Err(ConfigLoadError::Validation(
                "matcher.workers must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for MatchYamlConfig {
    fn default() -> Self {
        Self {
            coefficient_threshold: default_threshold(),
            average_threshold: None,
            max_results: default_max_results(),
            batch_limit: default_batch_limit(),
            workers: None,
        }
    }
}

/// Bulk import YAML configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestYamlConfig {
    #[serde(default = "default_flush_every")]
    pub flush_every: usize,

    #[serde(default)]
    pub max_image_bytes: Option<usize>,

    /// Ceiling on the coefficient space of integer and histogram shards
    #[serde(default = "default_max_integer_space")]
    pub max_integer_space: u32,
}

impl IngestYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.flush_every == 0 {
            return Err(ConfigLoadError::Validation(
                "ingest.flush_every must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for IngestYamlConfig {
    fn default() -> Self {
        Self {
            flush_every: default_flush_every(),
            max_image_bytes: None,
            max_integer_space: default_max_integer_space(),
        }
    }
}

fn is_shard_path(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("hsm" | "qsm")
    )
}

fn default_kind() -> SignatureKind {
    SignatureKind::Haar
}
fn default_shard_size() -> usize {
    IngestConfig::default().shard_size
}
fn default_max_integer_space() -> u32 {
    IngestConfig::default().max_integer_space
}
fn default_threshold() -> f32 {
    0.4
}
fn default_max_results() -> usize {
    50
}
fn default_batch_limit() -> usize {
    40
}
fn default_flush_every() -> usize {
    IngestConfig::default().flush_every
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_valid_yaml() {
        let yaml = r#"
version: "1.0"
name: "test config"
signature:
  kind: integer
matcher:
  coefficient_threshold: 0.3
"#;

        let config = CbirConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.name, Some("test config".to_string()));
        assert_eq!(config.signature.kind, SignatureKind::Integer);
        assert_eq!(config.signature.profile, WeightProfile::Sketch);
        assert_eq!(config.matcher.coefficient_threshold, 0.3);
        assert_eq!(config.matcher.max_results, 50);
    }

    #[test]
    fn test_load_from_file() {
        let yaml = r#"
version: "1"
index:
  disk_paged: true
  shards: [a.hsm, b.hsm]
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml.as_bytes()).unwrap();

        let config = CbirConfig::from_file(temp_file.path()).unwrap();
        assert!(config.index.disk_paged);
        assert_eq!(
            config.index.shards,
            vec![PathBuf::from("a.hsm"), PathBuf::from("b.hsm")]
        );
    }

    #[test]
    fn test_default_config() {
        let config = CbirConfig::default();
        assert_eq!(config.version, "1.0");
        assert!(config.name.is_none());
        assert!(config.validate().is_ok());
        assert_eq!(config.ingest_config(), IngestConfig::default());
    }

    #[test]
    fn test_unsupported_version() {
        let result = CbirConfig::from_yaml("version: \"2.0\"\n");
        assert!(matches!(result, Err(ConfigLoadError::UnsupportedVersion(v)) if v == "2.0"));
    }

    #[test]
    fn test_matcher_validation() {
        let yaml = r#"
version: "1.0"
matcher:
  max_results: 0
"#;

        let result = CbirConfig::from_yaml(yaml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("max_results must be >= 1"));
    }

    #[test]
    fn test_non_finite_threshold_rejected() {
        let yaml = r#"
version: "1.0"
matcher:
  coefficient_threshold: .nan
"#;

        assert!(matches!(
            CbirConfig::from_yaml(yaml),
            Err(ConfigLoadError::Validation(_))
        ));
    }

    #[test]
    fn test_shard_extension_validation() {
        let yaml = r#"
version: "1.0"
index:
  shards: [out-0.hsm, notes.txt]
"#;

        let result = CbirConfig::from_yaml(yaml);
        assert!(result.unwrap_err().to_string().contains("notes.txt"));
    }

    #[test]
    fn test_runtime_configs() {
        let yaml = r#"
version: "1.0"
signature:
  profile: photo
index:
  shard_size: 1000
matcher:
  coefficient_threshold: 0.5
  average_threshold: 0.2
  batch_limit: 10
  workers: 3
ingest:
  flush_every: 25
  max_image_bytes: 4096
  max_integer_space: 65536
"#;

        let config = CbirConfig::from_yaml(yaml).unwrap();
        let mc = config.match_config();
        assert_eq!(mc.weight_profile, WeightProfile::Photo);
        assert_eq!(mc.workers, 3);
        assert_eq!(mc.batch_limit, 10);
        assert_eq!(mc.thresholds().coefficient, 0.5);
        assert_eq!(mc.thresholds().average, 0.2);

        let ic = config.ingest_config();
        assert_eq!(ic.shard_size, 1000);
        assert_eq!(ic.flush_every, 25);
        assert_eq!(ic.max_image_bytes, Some(4096));
        assert_eq!(ic.max_integer_space, 65536);
    }

    #[test]
    fn test_zero_integer_space_rejected() {
        let yaml = "version: \"1.0\"\ningest:\n  max_integer_space: 0\n";
        let err = CbirConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, ConfigLoadError::Validation(msg) if msg.contains("max_integer_space")));
    }
}
