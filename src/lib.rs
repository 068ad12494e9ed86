//! Workspace umbrella crate for CBIR, content-based image retrieval.
//!
//! This crate stitches the signature, index, matcher and ingest layers
//! together so callers can go from image bytes to ranked matches with one
//! dependency, and hosts the YAML configuration and batch driver used by the
//! `cbir` binary.
//!
//! ```
//! use cbir::{IntegerSignature, MatchConfig, Matcher, Signature, SignatureKind, SparseIndex, WeightTable, ContentHash};
//! use std::sync::Arc;
//!
//! let sig = |tag: &[u8], features: Vec<u32>| {
//!     Signature::from(IntegerSignature::new(ContentHash::of_bytes(tag).into(), features))
//! };
//! let shard = SparseIndex::build(
//!     SignatureKind::Integer,
//!     &[sig(b"a", vec![1, 2, 3]), sig(b"b", vec![2, 3, 4])],
//!     &WeightTable::default(),
//! )
//! .unwrap();
//! let matcher = Matcher::new(vec![Arc::new(shard)], MatchConfig::default()).unwrap();
//!
//! let hits = matcher.match_signature(&sig(b"q", vec![1, 2, 3])).unwrap();
//! assert_eq!(hits[0].match_hash, ContentHash::of_bytes(b"a"));
//! ```

pub mod batch;
pub mod config;

pub use index::{
    execute_query, sort_results, DiskHaarIndex, HaarIndex, IndexError, IndexKind, IntegerIndex,
    QueryIndex, QueryResult, SignatureMeta, SparseIndex, Thresholds,
};
pub use ingest::{
    build_shards, decode_pixels, dump_index, dump_signatures, filter_signatures, import_images,
    import_integer_lines, read_whitelist, signature_from_image, FilterReport, ImportReport,
    IngestConfig, IngestError,
};
pub use matcher::{
    set_match_metrics, BatchMatch, MatchConfig, MatchError, MatchMetrics, Matcher,
    DEFAULT_BATCH_THRESHOLD,
};
pub use signature::{
    compare, ContentHash, HaarSignature, HistogramSignature, HistogramSpace, IntegerSignature,
    PixelBuffer, Signature, SignatureError, SignatureId, SignatureKind, SignatureModel,
    SignatureReader, SignatureWriter, WeightProfile, WeightTable,
};

pub use crate::batch::{format_row, run_batch, BatchOptions, BatchReport};
pub use crate::config::{CbirConfig, ConfigLoadError};

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors surfaced by the umbrella helpers and the batch driver.
#[derive(Debug, Error)]
pub enum CbirError {
    #[error(transparent)]
    Config(#[from] ConfigLoadError),
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot tell what {} holds from its extension", .0.display())]
    UnknownFileKind(PathBuf),
    #[error("no shards to open")]
    NoShards,
}

/// Signature kind stored in a record stream, from its extension.
pub fn stream_kind(path: &Path) -> Option<SignatureKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    SignatureKind::ALL
        .into_iter()
        .find(|kind| kind.stream_extension() == ext)
}

/// Whether `path` names an index shard (`.hsm` / `.qsm`).
pub fn is_shard(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref(),
        Some("hsm" | "qsm")
    )
}

/// Open `shards`, or the configured shards when `shards` is empty, behind a
/// matcher built from `config`.
pub fn open_matcher(config: &CbirConfig, shards: &[PathBuf]) -> Result<Matcher, CbirError> {
    let paths = if shards.is_empty() {
        &config.index.shards
    } else {
        shards
    };
    if paths.is_empty() {
        return Err(CbirError::NoShards);
    }
    Ok(Matcher::open(
        paths,
        config.index.disk_paged,
        config.match_config(),
    )?)
}

/// Extract a `kind` signature from image bytes and match it.
///
/// The result list is capped at the matcher's `max_results`.
pub fn query_image(
    matcher: &Matcher,
    kind: SignatureKind,
    bytes: &[u8],
    thresholds: Thresholds,
) -> Result<Vec<QueryResult>, CbirError> {
    let query = signature_from_image(kind, None, bytes)?;
    Ok(matcher.match_signature_with(&query, thresholds, matcher.config().max_results)?)
}

/// Pairwise similarity of two images under signature `kind`.
pub fn compare_images(
    kind: SignatureKind,
    a: &[u8],
    b: &[u8],
    profile: WeightProfile,
) -> Result<f32, CbirError> {
    let a = signature_from_image(kind, None, a)?;
    let b = signature_from_image(kind, None, b)?;
    Ok(compare(&a, &b, WeightTable::shared(profile)))
}
