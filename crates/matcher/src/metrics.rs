//! Optional hook for observing matcher activity.

use std::sync::{Arc, OnceLock, RwLock};
use std::time::Duration;

/// Receives one call per completed query or batch.
pub trait MatchMetrics: Send + Sync {
    /// A single query fanned out over `shards` shards returned `hits` results.
    fn record_query(&self, latency: Duration, shards: usize, hits: usize);

    /// A batch of `queries` queries finished with `hits` results in total.
    fn record_batch(&self, latency: Duration, queries: usize, hits: usize);
}

static METRICS: OnceLock<RwLock<Option<Arc<dyn MatchMetrics>>>> = OnceLock::new();

fn metrics_lock() -> &'static RwLock<Option<Arc<dyn MatchMetrics>>> {
    METRICS.get_or_init(|| RwLock::new(None))
}

/// Install or clear the process-wide recorder.
pub fn set_match_metrics(recorder: Option<Arc<dyn MatchMetrics>>) {
    let mut guard = metrics_lock()
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = recorder;
}

pub(crate) fn metrics_recorder() -> Option<Arc<dyn MatchMetrics>> {
    metrics_lock()
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}
