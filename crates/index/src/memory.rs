//! Fully resident shards.

use signature::haar::COEFFICIENT_SPACE;
use signature::{Signature, SignatureModel, WeightTable};

use crate::csr::Csr;
use crate::{IndexError, IndexKind, QueryIndex, SignatureMeta};

fn check_count(count: usize) -> Result<(), IndexError> {
    if count > u32::MAX as usize {
        return Err(IndexError::Capacity {
            what: "signatures",
            count,
        });
    }
    Ok(())
}

fn meta_of(signature: &Signature, weights: &WeightTable) -> SignatureMeta {
    SignatureMeta {
        hash: signature.id().hash_or_zero(),
        total_weight: signature.total_weight(weights),
        averages: signature.channel_averages().copied(),
    }
}

/// Haar shard with every posting list in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct HaarIndex {
    signatures: Vec<SignatureMeta>,
    csr: Csr,
}

impl HaarIndex {
    /// Index Haar signatures; any other kind is a variant mismatch.
    pub fn build(signatures: &[Signature], weights: &WeightTable) -> Result<Self, IndexError> {
        check_count(signatures.len())?;
        let mut metas = Vec::with_capacity(signatures.len());
        let mut lists = Vec::with_capacity(signatures.len());
        for signature in signatures {
            if signature.as_haar().is_none() {
                return Err(IndexError::VariantMismatch {
                    index: IndexKind::Haar,
                    signature: signature.kind(),
                });
            }
            metas.push(meta_of(signature, weights));
            lists.push(signature.features());
        }
        let csr = Csr::build(COEFFICIENT_SPACE, &lists)?;
        tracing::debug!(
            signatures = metas.len(),
            postings = csr.flat_postings().len(),
            "built haar index"
        );
        Ok(Self {
            signatures: metas,
            csr,
        })
    }

    /// Assemble a shard from decoded parts.
    ///
    /// `offsets` must carry the sentinel and span the full Haar space, and
    /// every row must have channel averages.
    pub fn from_parts(
        signatures: Vec<SignatureMeta>,
        offsets: Vec<u32>,
        postings: Vec<u32>,
    ) -> Result<Self, IndexError> {
        if offsets.len() != COEFFICIENT_SPACE as usize + 1 {
            return Err(IndexError::Format(format!(
                "haar offset table holds {} entries, expected {}",
                offsets.len(),
                COEFFICIENT_SPACE as usize + 1
            )));
        }
        if signatures.iter().any(|meta| meta.averages.is_none()) {
            return Err(IndexError::Format(
                "haar metadata row without channel averages".into(),
            ));
        }
        let csr = Csr::from_parts(offsets, postings, signatures.len())?;
        Ok(Self { signatures, csr })
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, IndexError> {
        crate::codec::read_haar(bytes)
    }

    /// Offsets including the trailing sentinel.
    pub fn offsets(&self) -> &[u32] {
        self.csr.offsets()
    }

    pub fn flat_postings(&self) -> &[u32] {
        self.csr.flat_postings()
    }
}

impl QueryIndex for HaarIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Haar
    }

    fn signatures(&self) -> &[SignatureMeta] {
        &self.signatures
    }

    fn coefficient_space(&self) -> u32 {
        self.csr.space()
    }

    fn postings(&self, coefficient: u32) -> Result<&[u32], IndexError> {
        Ok(self.csr.postings(coefficient))
    }
}

/// Largest integer coefficient space a shard is built with unless told
/// otherwise: 16M ids, a 64 MiB offset table.
pub const DEFAULT_MAX_INTEGER_SPACE: u32 = 1 << 24;

/// Shard for integer and histogram signatures.
///
/// The coefficient space is one past the largest indexed feature id.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegerIndex {
    signatures: Vec<SignatureMeta>,
    csr: Csr,
}

impl IntegerIndex {
    /// Index integer or histogram signatures within
    /// [`DEFAULT_MAX_INTEGER_SPACE`].
    pub fn build(signatures: &[Signature], weights: &WeightTable) -> Result<Self, IndexError> {
        Self::build_with_limit(signatures, weights, DEFAULT_MAX_INTEGER_SPACE)
    }

    /// Index integer or histogram signatures whose coefficient space stays
    /// within `max_space`. Haar signatures are a variant mismatch.
    pub fn build_with_limit(
        signatures: &[Signature],
        weights: &WeightTable,
        max_space: u32,
    ) -> Result<Self, IndexError> {
        check_count(signatures.len())?;
        if let Some(haar) = signatures.iter().find(|s| s.as_haar().is_some()) {
            return Err(IndexError::VariantMismatch {
                index: IndexKind::Integer,
                signature: haar.kind(),
            });
        }
        let space = signatures
            .iter()
            .filter_map(|signature| signature.features().iter().max())
            .max()
            .map_or(0u64, |&max| u64::from(max) + 1);
        if space > u64::from(max_space) {
            return Err(IndexError::Capacity {
                what: "integer coefficients",
                count: space as usize,
            });
        }
        let space = space as u32;

        let metas: Vec<SignatureMeta> = signatures
            .iter()
            .map(|signature| SignatureMeta {
                averages: None,
                ..meta_of(signature, weights)
            })
            .collect();
        let lists: Vec<&[u32]> = signatures.iter().map(|s| s.features()).collect();
        let csr = Csr::build(space, &lists)?;
        tracing::debug!(
            signatures = metas.len(),
            space,
            postings = csr.flat_postings().len(),
            "built integer index"
        );
        Ok(Self {
            signatures: metas,
            csr,
        })
    }

    /// Assemble a shard from decoded parts; `offsets` carries the sentinel.
    pub fn from_parts(
        signatures: Vec<SignatureMeta>,
        offsets: Vec<u32>,
        postings: Vec<u32>,
    ) -> Result<Self, IndexError> {
        let csr = Csr::from_parts(offsets, postings, signatures.len())?;
        Ok(Self { signatures, csr })
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, IndexError> {
        crate::codec::read_integer(bytes)
    }

    pub fn offsets(&self) -> &[u32] {
        self.csr.offsets()
    }

    pub fn flat_postings(&self) -> &[u32] {
        self.csr.flat_postings()
    }
}

impl QueryIndex for IntegerIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Integer
    }

    fn signatures(&self) -> &[SignatureMeta] {
        &self.signatures
    }

    fn coefficient_space(&self) -> u32 {
        self.csr.space()
    }

    fn postings(&self, coefficient: u32) -> Result<&[u32], IndexError> {
        Ok(self.csr.postings(coefficient))
    }
}
