use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use index::QueryIndex;
use matcher::Matcher;
use std::sync::Arc;
use std::time::Instant;

/// Shared application state
#[derive(Clone)]
pub struct ServerState {
    /// Server configuration
    pub config: Arc<ServerConfig>,

    /// Matcher over every configured shard
    pub matcher: Arc<Matcher>,

    /// Client used to fetch `GET /ciq?url=` images
    pub http: reqwest::Client,

    pub started: Instant,
}

impl ServerState {
    /// Open the configured shards and start the matcher pool.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let matcher = Matcher::open(&config.shards, config.disk_paged, config.match_config())?;
        Self::with_matcher(config, matcher)
    }

    /// Build state around an existing matcher.
    pub fn with_matcher(config: ServerConfig, matcher: Matcher) -> ServerResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|err| ServerError::Config(format!("http client: {err}")))?;

        tracing::info!(
            shards = matcher.shards().len(),
            signatures = matcher.signature_count(),
            disk_paged = config.disk_paged,
            "shards loaded"
        );

        Ok(Self {
            config: Arc::new(config),
            matcher: Arc::new(matcher),
            http,
            started: Instant::now(),
        })
    }

    /// Download a query image, refusing bodies over the configured limit.
    pub async fn fetch(&self, url: &str) -> ServerResult<Vec<u8>> {
        let limit = self.config.max_body_size();
        let response = self.http.get(url).send().await?.error_for_status()?;
        if response.content_length().is_some_and(|len| len as usize > limit) {
            return Err(ServerError::PayloadTooLarge(self.config.max_body_size_mb));
        }
        let bytes = response.bytes().await?;
        if bytes.len() > limit {
            return Err(ServerError::PayloadTooLarge(self.config.max_body_size_mb));
        }
        Ok(bytes.to_vec())
    }

    /// Per-shard summary for health output.
    pub fn shard_summary(&self) -> Vec<ShardSummary> {
        self.matcher
            .shards()
            .iter()
            .map(|shard| ShardSummary {
                kind: shard.kind().as_str(),
                signatures: shard.len(),
            })
            .collect()
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ShardSummary {
    pub kind: &'static str,
    pub signatures: usize,
}
