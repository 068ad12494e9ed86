use index::Thresholds;
use matcher::MatchConfig;
use serde::{Deserialize, Serialize};
use signature::{SignatureKind, WeightProfile};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "CBIR_SERVER";

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Server bind address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum request body (and fetched image) size in MB
    #[serde(default = "default_max_body_size_mb")]
    pub max_body_size_mb: usize,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Shard files (`.hsm` / `.qsm`) to serve
    #[serde(default)]
    pub shards: Vec<PathBuf>,

    /// Page Haar postings in from disk instead of loading them up front
    #[serde(default)]
    pub disk_paged: bool,

    /// Signature extracted from query images
    #[serde(default = "default_signature_kind")]
    pub signature_kind: SignatureKind,

    #[serde(default)]
    pub weight_profile: WeightProfile,

    /// Coefficient threshold used when a request has no usable `lc`
    #[serde(default = "default_threshold")]
    pub coefficient_threshold: f32,

    /// Average threshold used when a request has no usable `le`
    #[serde(default = "default_threshold")]
    pub average_threshold: f32,

    /// Results returned per query
    #[serde(default = "default_result_limit")]
    pub result_limit: usize,

    /// Matcher worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            timeout_secs: default_timeout_secs(),
            max_body_size_mb: default_max_body_size_mb(),
            enable_cors: default_true(),
            log_level: default_log_level(),
            shards: Vec::new(),
            disk_paged: false,
            signature_kind: default_signature_kind(),
            weight_profile: WeightProfile::default(),
            coefficient_threshold: default_threshold(),
            average_threshold: default_threshold(),
            result_limit: default_result_limit(),
            workers: default_workers(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from `.env`, an optional `server.{toml,yaml,json}`
    /// file and `CBIR_SERVER__*` environment variables, in rising priority.
    pub fn load() -> anyhow::Result<Self> {
        // a missing .env is fine
        let _ = dotenvy::dotenv();
        Self::build(config::File::with_name("server").required(false))
    }

    /// Like [`ServerConfig::load`] with an explicit config file.
    pub fn load_from(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        Self::build(config::File::from(path.as_ref()))
    }

    fn build<S>(file: S) -> anyhow::Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let builder = config::Config::builder().add_source(file).add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("shards")
                .try_parsing(true),
        );

        let config: ServerConfig = builder.build()?.try_deserialize()?;
        config.match_config().validate()?;

        if config.shards.is_empty() {
            tracing::warn!("No shards configured, every query will return []");
        }
        Ok(config)
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.bind_addr, self.port);
        Ok(addr_str.parse()?)
    }

    /// Get request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Get max body size in bytes
    pub fn max_body_size(&self) -> usize {
        self.max_body_size_mb * 1024 * 1024
    }

    /// Thresholds for a request, falling back to the configured defaults for
    /// missing or unparseable values.
    pub fn thresholds(&self, lc: Option<&str>, le: Option<&str>) -> Thresholds {
        let parse = |raw: Option<&str>, fallback: f32| {
            raw.and_then(|v| v.trim().parse::<f32>().ok())
                .filter(|v| v.is_finite())
                .unwrap_or(fallback)
        };
        Thresholds {
            coefficient: parse(lc, self.coefficient_threshold),
            average: parse(le, self.average_threshold),
        }
    }

    pub fn match_config(&self) -> MatchConfig {
        MatchConfig {
            coefficient_threshold: self.coefficient_threshold,
            average_threshold: Some(self.average_threshold),
            max_results: self.result_limit,
            workers: self.workers,
            weight_profile: self.weight_profile,
            ..MatchConfig::default()
        }
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    6669
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_body_size_mb() -> usize {
    10
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_signature_kind() -> SignatureKind {
    SignatureKind::Haar
}

fn default_threshold() -> f32 {
    0.4
}

fn default_result_limit() -> usize {
    50
}

fn default_workers() -> usize {
    MatchConfig::default().workers
}
