use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use signature::haar::CHANNEL_COUNT;
use signature::{ContentHash, Signature, SignatureModel, WeightTable};

use crate::{IndexError, QueryIndex};

/// Share of the score taken by coefficient overlap on Haar shards; the rest
/// rewards close channel averages.
const OVERLAP_SHARE: f32 = 0.8;

/// Acceptance cut-offs for one query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Minimum weighted overlap (`match_weight / total_weight`), exclusive.
    pub coefficient: f32,
    /// Maximum channel-average distance on Haar shards, exclusive.
    pub average: f32,
}

impl Thresholds {
    /// Both cut-offs set to `value`.
    pub fn new(value: f32) -> Self {
        Self {
            coefficient: value,
            average: value,
        }
    }

    pub fn with_average(mut self, average: f32) -> Self {
        self.average = average;
        self
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds::new(0.4)
    }
}

/// One accepted match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Hash of the query signature, when it has one; `null` otherwise.
    #[serde(default)]
    pub query_hash: Option<ContentHash>,
    pub match_hash: ContentHash,
    pub score: f32,
    /// Weighted channel-average distance; `null` outside Haar shards.
    #[serde(default)]
    pub channel_distance: Option<f32>,
    /// Weight shared by query and match.
    pub match_weight: f32,
    /// `query_total + match_total - match_weight`.
    pub total_weight: f32,
}

impl QueryResult {
    pub fn metric_percent(&self) -> f32 {
        if self.total_weight > 0.0 {
            self.match_weight / self.total_weight
        } else {
            0.0
        }
    }
}

/// Stable sort, best score first.
pub fn sort_results(results: &mut [QueryResult]) {
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
}

fn channel_distance(
    query: &[f32; CHANNEL_COUNT],
    candidate: &[f32; CHANNEL_COUNT],
    weights: &WeightTable,
) -> f32 {
    (0..CHANNEL_COUNT)
        .map(|c| weights.dc(c) * (query[c] - candidate[c]).abs())
        .sum()
}

/// Score `query` against every signature of `index`.
///
/// Accumulates the query's feature weights over the posting lists, then keeps
/// signatures whose overlap ratio beats `thresholds.coefficient` and, on Haar
/// shards, whose channel distance stays under `thresholds.average`. Results
/// come back in index order.
pub fn execute_query<I>(
    index: &I,
    query: &Signature,
    thresholds: Thresholds,
    weights: &WeightTable,
) -> Result<Vec<QueryResult>, IndexError>
where
    I: QueryIndex + ?Sized,
{
    let kind = index.kind();
    let query_averages = if kind.is_haar() {
        match query.channel_averages() {
            Some(averages) => Some(averages),
            None => {
                return Err(IndexError::VariantMismatch {
                    index: kind,
                    signature: query.kind(),
                })
            }
        }
    } else if query.channel_averages().is_some() {
        return Err(IndexError::VariantMismatch {
            index: kind,
            signature: query.kind(),
        });
    } else {
        None
    };

    let features = query.features();
    if features.is_empty() {
        return Ok(Vec::new());
    }

    let signatures = index.signatures();
    let mut matched = vec![0.0f32; signatures.len()];
    let mut query_total = 0.0f32;
    for (position, &feature) in features.iter().enumerate() {
        let weight = query.weight_at(position, weights);
        query_total += weight;
        for &posting in index.postings(feature)? {
            if let Some(slot) = matched.get_mut(posting as usize) {
                *slot += weight;
            }
        }
    }

    let query_hash = query.hash();
    let mut results = Vec::new();
    for (meta, &match_weight) in signatures.iter().zip(&matched) {
        let metric_max = query_total + meta.total_weight - match_weight;
        if !(metric_max > 0.0) {
            continue;
        }
        let percent = match_weight / metric_max;
        if !(percent > thresholds.coefficient) {
            continue;
        }

        let distance = match (query_averages, meta.averages.as_ref()) {
            (Some(q), Some(avg)) => Some(channel_distance(q, avg, weights)),
            _ => None,
        };
        let score = match distance {
            Some(d) if !(d < thresholds.average) => continue,
            Some(d) => OVERLAP_SHARE * percent + (1.0 - OVERLAP_SHARE) * (1.0 - d),
            None => percent,
        };

        results.push(QueryResult {
            query_hash,
            match_hash: meta.hash,
            score,
            channel_distance: distance,
            match_weight,
            total_weight: metric_max,
        });
    }

    tracing::trace!(
        index = %kind,
        candidates = signatures.len(),
        accepted = results.len(),
        "query scored"
    );
    Ok(results)
}
