//! # CBIR Matcher
//!
//! Coordinates queries over a set of index shards. A [`Matcher`] owns the
//! shards, an immutable weight table and a fixed-size rayon pool.
//!
//! - [`Matcher::match_signature`] fans one query out to every shard in
//!   parallel, merges the per-shard results, sorts them by score and keeps
//!   `max_results`.
//! - [`Matcher::match_batch`] runs many queries, one per worker, in groups of
//!   `workers`. Self-matches are dropped and each query keeps `batch_limit`
//!   results.
//!
//! ```
//! use std::sync::Arc;
//! use index::SparseIndex;
//! use matcher::{MatchConfig, Matcher};
//! use signature::{IntegerSignature, Signature, SignatureId, SignatureKind, WeightTable};
//!
//! let sigs: Vec<Signature> = vec![
//!     IntegerSignature::new(SignatureId::Ephemeral(1), vec![1, 2, 3]).into(),
//!     IntegerSignature::new(SignatureId::Ephemeral(2), vec![7, 8]).into(),
//! ];
//! let shard = SparseIndex::build(SignatureKind::Integer, &sigs, &WeightTable::default()).unwrap();
//! let matcher = Matcher::new(vec![Arc::new(shard)], MatchConfig::default()).unwrap();
//!
//! let hits = matcher.match_signature(&sigs[0]).unwrap();
//! assert_eq!(hits.len(), 1);
//! assert_eq!(hits[0].score, 1.0);
//! ```

pub mod engine;
pub mod metrics;
pub mod types;

pub use crate::engine::{BatchMatch, Matcher};
pub use crate::metrics::{set_match_metrics, MatchMetrics};
pub use crate::types::{MatchConfig, MatchError, DEFAULT_BATCH_THRESHOLD};
