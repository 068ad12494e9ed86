//! # CBIR Index
//!
//! Inverted "sparse matrix" indexes over perceptual signatures. Every shard
//! maps each coefficient id to the list of signatures that carry it and keeps
//! a small metadata row per signature (content hash, total weight and, for
//! Haar shards, the three channel averages).
//!
//! ## Variants
//!
//! - [`HaarIndex`]: Haar signatures, postings fully resident.
//! - [`DiskHaarIndex`]: the same `.hsm` shard with only metadata and offsets
//!   resident; postings are paged in from disk on first use and memoized.
//! - [`IntegerIndex`]: integer and histogram signatures (`.qsm`).
//!
//! [`SparseIndex`] is the closed union used by the query coordinator; the
//! [`QueryIndex`] trait is the capability the scoring engine needs.
//!
//! ## Shard Files
//!
//! Shards are little-endian with fixed-width fields and no header, see the
//! `codec` module for the exact layout. Loading validates the CSR
//! invariants and rejects truncated or trailing data.
//!
//! ## Example Usage
//!
//! ```
//! use index::{SparseIndex, Thresholds};
//! use signature::{IntegerSignature, Signature, SignatureKind, WeightTable, ContentHash};
//!
//! let weights = WeightTable::default();
//! let sig = |tag: &[u8], features: Vec<u32>| {
//!     Signature::from(IntegerSignature::new(ContentHash::of_bytes(tag).into(), features))
//! };
//! let shard = SparseIndex::build(
//!     SignatureKind::Integer,
//!     &[sig(b"a", vec![1, 2, 3]), sig(b"b", vec![7, 8])],
//!     &weights,
//! )
//! .unwrap();
//!
//! let results = shard.query(&sig(b"q", vec![1, 2, 3]), Thresholds::new(0.5), &weights).unwrap();
//! assert_eq!(results.len(), 1);
//! assert_eq!(results[0].match_hash, ContentHash::of_bytes(b"a"));
//! ```

mod codec;
mod csr;
mod disk;
mod memory;
mod query;

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use signature::{ContentHash, Signature, SignatureKind, WeightTable};
use thiserror::Error;

pub use crate::disk::DiskHaarIndex;
pub use crate::memory::{HaarIndex, IntegerIndex, DEFAULT_MAX_INTEGER_SPACE};
pub use crate::query::{execute_query, sort_results, QueryResult, Thresholds};

/// Index variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    Haar,
    DiskHaar,
    Integer,
}

impl IndexKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IndexKind::Haar => "haar",
            IndexKind::DiskHaar => "disk_haar",
            IndexKind::Integer => "integer",
        }
    }

    /// Shards holding Haar postings only answer Haar queries.
    pub fn is_haar(self) -> bool {
        matches!(self, IndexKind::Haar | IndexKind::DiskHaar)
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while building, loading or querying an index.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("index format error: {0}")]
    Format(String),

    #[error("coefficient {feature} lies outside index space {space}")]
    CoefficientOutOfRange { feature: u32, space: u32 },

    #[error("{index} index cannot take {signature} signatures")]
    VariantMismatch {
        index: IndexKind,
        signature: SignatureKind,
    },

    #[error("too many {what} for one shard ({count})")]
    Capacity { what: &'static str, count: usize },

    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("postings file lock poisoned")]
    Poisoned,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl IndexError {
    pub fn format<E: fmt::Display>(err: E) -> Self {
        Self::Format(err.to_string())
    }
}

/// Per-signature metadata row, addressed by dense signature index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureMeta {
    pub hash: ContentHash,
    pub total_weight: f32,
    /// Y/I/Q channel averages; Haar shards only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub averages: Option<[f32; 3]>,
}

/// Read access the scoring engine needs from a shard.
pub trait QueryIndex: Send + Sync {
    fn kind(&self) -> IndexKind;

    fn signatures(&self) -> &[SignatureMeta];

    /// Exclusive upper bound on indexed coefficient ids.
    fn coefficient_space(&self) -> u32;

    /// Signature indices carrying `coefficient`; empty outside the space.
    fn postings(&self, coefficient: u32) -> Result<&[u32], IndexError>;

    fn len(&self) -> usize {
        self.signatures().len()
    }

    fn is_empty(&self) -> bool {
        self.signatures().is_empty()
    }
}

/// Any shard variant.
#[derive(Debug)]
pub enum SparseIndex {
    Haar(HaarIndex),
    DiskHaar(DiskHaarIndex),
    Integer(IntegerIndex),
}

impl SparseIndex {
    /// Build a resident shard for signatures of `kind`.
    ///
    /// Haar signatures go into a [`HaarIndex`]; every other kind into an
    /// [`IntegerIndex`]. Signatures receive dense indices in slice order.
    pub fn build(
        kind: SignatureKind,
        signatures: &[Signature],
        weights: &WeightTable,
    ) -> Result<Self, IndexError> {
        Self::build_with_limit(kind, signatures, weights, DEFAULT_MAX_INTEGER_SPACE)
    }

    /// [`SparseIndex::build`] with an explicit ceiling on the coefficient
    /// space of integer shards.
    pub fn build_with_limit(
        kind: SignatureKind,
        signatures: &[Signature],
        weights: &WeightTable,
        max_integer_space: u32,
    ) -> Result<Self, IndexError> {
        match kind {
            SignatureKind::Haar => HaarIndex::build(signatures, weights).map(SparseIndex::Haar),
            _ => IntegerIndex::build_with_limit(signatures, weights, max_integer_space)
                .map(SparseIndex::Integer),
        }
    }

    /// Open a shard file, picking the variant from its extension.
    ///
    /// `.hsm` shards load as [`DiskHaarIndex`] when `disk_paged` is set;
    /// `.qsm` shards always load fully.
    pub fn open(path: impl AsRef<Path>, disk_paged: bool) -> Result<Self, IndexError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        let index = match extension.as_deref() {
            Some("hsm") if disk_paged => SparseIndex::DiskHaar(DiskHaarIndex::open(path)?),
            Some("hsm") => SparseIndex::Haar(HaarIndex::decode(&std::fs::read(path)?)?),
            Some("qsm") => SparseIndex::Integer(IntegerIndex::decode(&std::fs::read(path)?)?),
            _ => {
                return Err(IndexError::Format(format!(
                    "{} is neither an .hsm nor a .qsm shard",
                    path.display()
                )))
            }
        };
        tracing::info!(
            path = %path.display(),
            kind = %index.kind(),
            signatures = index.len(),
            "opened shard"
        );
        Ok(index)
    }

    /// Serialise the shard into `writer`.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), IndexError> {
        match self {
            SparseIndex::Haar(index) => codec::write_haar(index, writer),
            SparseIndex::Integer(index) => codec::write_integer(index, writer),
            SparseIndex::DiskHaar(_) => Err(IndexError::Unsupported(
                "encoding a disk-paged index; load it resident first",
            )),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, IndexError> {
        let mut out = Vec::new();
        self.write_to(&mut out)?;
        Ok(out)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), IndexError> {
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        self.write_to(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Score `query` against this shard. Results are unsorted.
    pub fn query(
        &self,
        query: &Signature,
        thresholds: Thresholds,
        weights: &WeightTable,
    ) -> Result<Vec<QueryResult>, IndexError> {
        execute_query(self, query, thresholds, weights)
    }

    fn inner(&self) -> &dyn QueryIndex {
        match self {
            SparseIndex::Haar(index) => index as &dyn QueryIndex,
            SparseIndex::DiskHaar(index) => index as &dyn QueryIndex,
            SparseIndex::Integer(index) => index as &dyn QueryIndex,
        }
    }
}

impl QueryIndex for SparseIndex {
    fn kind(&self) -> IndexKind {
        self.inner().kind()
    }

    fn signatures(&self) -> &[SignatureMeta] {
        self.inner().signatures()
    }

    fn coefficient_space(&self) -> u32 {
        self.inner().coefficient_space()
    }

    fn postings(&self, coefficient: u32) -> Result<&[u32], IndexError> {
        self.inner().postings(coefficient)
    }
}

impl From<HaarIndex> for SparseIndex {
    fn from(index: HaarIndex) -> Self {
        SparseIndex::Haar(index)
    }
}

impl From<IntegerIndex> for SparseIndex {
    fn from(index: IntegerIndex) -> Self {
        SparseIndex::Integer(index)
    }
}

impl From<DiskHaarIndex> for SparseIndex {
    fn from(index: DiskHaarIndex) -> Self {
        SparseIndex::DiskHaar(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use signature::{IntegerSignature, PixelBuffer, SignatureId};

    fn haar(tag: &[u8], seed: u32) -> Signature {
        let pixels = PixelBuffer::from_fn(128, |x, y| {
            [(x * seed % 251) as u8, (y * 3 + seed) as u8, ((x ^ y) + seed) as u8]
        });
        Signature::from_pixels(SignatureKind::Haar, ContentHash::of_bytes(tag).into(), &pixels)
            .unwrap()
    }

    #[test]
    fn open_dispatches_on_extension() {
        let weights = WeightTable::default();
        let dir = tempfile::tempdir().unwrap();

        let haar_shard = SparseIndex::build(
            SignatureKind::Haar,
            &[haar(b"a", 3), haar(b"b", 5)],
            &weights,
        )
        .unwrap();
        let hsm = dir.path().join("out-0.hsm");
        haar_shard.save(&hsm).unwrap();
        assert_eq!(SparseIndex::open(&hsm, false).unwrap().kind(), IndexKind::Haar);
        assert_eq!(SparseIndex::open(&hsm, true).unwrap().kind(), IndexKind::DiskHaar);

        let int_shard = SparseIndex::build(
            SignatureKind::Integer,
            &[Signature::from(IntegerSignature::new(SignatureId::Ephemeral(1), vec![4]))],
            &weights,
        )
        .unwrap();
        let qsm = dir.path().join("out-0.qsm");
        int_shard.save(&qsm).unwrap();
        assert_eq!(SparseIndex::open(&qsm, true).unwrap().kind(), IndexKind::Integer);

        let other = dir.path().join("out-0.bin");
        std::fs::write(&other, b"").unwrap();
        assert!(matches!(
            SparseIndex::open(&other, false),
            Err(IndexError::Format(_))
        ));
    }

    #[test]
    fn disk_paged_shards_cannot_be_encoded() {
        let weights = WeightTable::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shard.hsm");
        SparseIndex::build(SignatureKind::Haar, &[haar(b"a", 7)], &weights)
            .unwrap()
            .save(&path)
            .unwrap();
        let disk = SparseIndex::open(&path, true).unwrap();
        assert!(matches!(disk.encode(), Err(IndexError::Unsupported(_))));
    }

    #[test]
    fn haar_shards_reject_other_kinds() {
        let weights = WeightTable::default();
        let err = SparseIndex::build(
            SignatureKind::Haar,
            &[Signature::from(IntegerSignature::new(SignatureId::Ephemeral(1), vec![1]))],
            &weights,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            IndexError::VariantMismatch {
                index: IndexKind::Haar,
                signature: SignatureKind::Integer
            }
        ));
    }

    #[test]
    fn index_kind_names() {
        assert_eq!(IndexKind::DiskHaar.to_string(), "disk_haar");
        assert!(IndexKind::DiskHaar.is_haar());
        assert!(!IndexKind::Integer.is_haar());
    }
}
