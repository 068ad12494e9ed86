//! Scatter-gather over index shards.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use index::{sort_results, IndexError, QueryIndex, QueryResult, SparseIndex, Thresholds};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use signature::{ContentHash, Signature, WeightTable};

use crate::metrics::metrics_recorder;
use crate::types::{MatchConfig, MatchError};

#[cfg(test)]
mod tests;

/// Results for one query of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchMatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_hash: Option<ContentHash>,
    pub results: Vec<QueryResult>,
}

/// Queries a fixed set of shards on a dedicated worker pool.
///
/// Shards are shared read-only; a `Matcher` can serve concurrent callers.
pub struct Matcher {
    shards: Vec<Arc<SparseIndex>>,
    weights: &'static WeightTable,
    config: MatchConfig,
    pool: rayon::ThreadPool,
}

impl Matcher {
    pub fn new(shards: Vec<Arc<SparseIndex>>, config: MatchConfig) -> Result<Self, MatchError> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .thread_name(|i| format!("cbir-match-{i}"))
            .build()
            .map_err(|err| MatchError::Pool(err.to_string()))?;
        tracing::info!(
            shards = shards.len(),
            workers = config.workers,
            profile = %config.weight_profile,
            "matcher ready"
        );
        Ok(Self {
            shards,
            weights: WeightTable::shared(config.weight_profile),
            config,
            pool,
        })
    }

    /// Open every shard file, in parallel, and build a matcher over them.
    pub fn open<P: AsRef<Path> + Sync>(
        paths: &[P],
        disk_paged: bool,
        config: MatchConfig,
    ) -> Result<Self, MatchError> {
        let shards = paths
            .par_iter()
            .map(|path| SparseIndex::open(path, disk_paged).map(Arc::new))
            .collect::<Result<Vec<_>, IndexError>>()?;
        Self::new(shards, config)
    }

    pub fn shards(&self) -> &[Arc<SparseIndex>] {
        &self.shards
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn weights(&self) -> &WeightTable {
        self.weights
    }

    /// Total signatures across all shards.
    pub fn signature_count(&self) -> usize {
        self.shards.iter().map(|shard| shard.len()).sum()
    }

    /// Query every shard with the configured thresholds.
    pub fn match_signature(&self, query: &Signature) -> Result<Vec<QueryResult>, MatchError> {
        self.match_signature_with(query, self.config.thresholds(), self.config.max_results)
    }

    /// Query every shard in parallel, merge, sort by score and keep `limit`.
    ///
    /// The first shard error aborts the query.
    pub fn match_signature_with(
        &self,
        query: &Signature,
        thresholds: Thresholds,
        limit: usize,
    ) -> Result<Vec<QueryResult>, MatchError> {
        let started = Instant::now();
        let weights = self.weights;
        let per_shard: Vec<Result<Vec<QueryResult>, IndexError>> = self.pool.install(|| {
            self.shards
                .par_iter()
                .map(|shard| shard.query(query, thresholds, weights))
                .collect()
        });

        let mut results = Vec::new();
        for shard_results in per_shard {
            results.extend(shard_results?);
        }
        sort_results(&mut results);
        results.truncate(limit);

        let latency = started.elapsed();
        if let Some(recorder) = metrics_recorder() {
            recorder.record_query(latency, self.shards.len(), results.len());
        }
        tracing::debug!(
            hits = results.len(),
            latency_us = latency.as_micros() as u64,
            "query complete"
        );
        Ok(results)
    }

    /// Match many queries against every shard.
    ///
    /// Queries run in groups of `workers`, one query per worker, each query
    /// visiting the shards in order. Matches carrying the query's own hash are
    /// skipped and do not count towards `batch_limit`. Output order follows
    /// input order. `threshold` is used for both cut-offs and falls back to
    /// the default when outside `[0, 1]`.
    pub fn match_batch(
        &self,
        queries: &[Signature],
        threshold: f32,
    ) -> Result<Vec<BatchMatch>, MatchError> {
        let started = Instant::now();
        let thresholds = Thresholds::new(MatchConfig::clamp_batch_threshold(threshold));

        let mut out = Vec::with_capacity(queries.len());
        for group in queries.chunks(self.config.workers) {
            let matched: Vec<Result<BatchMatch, MatchError>> = self
                .pool
                .install(|| group.par_iter().map(|q| self.batch_one(q, thresholds)).collect());
            for batch in matched {
                out.push(batch?);
            }
        }

        let hits: usize = out.iter().map(|batch| batch.results.len()).sum();
        let latency = started.elapsed();
        if let Some(recorder) = metrics_recorder() {
            recorder.record_batch(latency, queries.len(), hits);
        }
        tracing::info!(
            queries = queries.len(),
            hits,
            threshold = thresholds.coefficient,
            latency_ms = latency.as_millis() as u64,
            "batch complete"
        );
        Ok(out)
    }

    fn batch_one(&self, query: &Signature, thresholds: Thresholds) -> Result<BatchMatch, MatchError> {
        let mut results = Vec::new();
        for shard in &self.shards {
            results.extend(shard.query(query, thresholds, self.weights)?);
        }
        sort_results(&mut results);

        let query_hash = query.hash();
        let results = results
            .into_iter()
            .filter(|result| Some(result.match_hash) != query_hash)
            .take(self.config.batch_limit)
            .collect();
        Ok(BatchMatch {
            query_hash,
            results,
        })
    }
}

impl std::fmt::Debug for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Matcher")
            .field("shards", &self.shards.len())
            .field("config", &self.config)
            .finish()
    }
}
