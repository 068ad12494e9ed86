//! Compressed sparse row posting lists.

use crate::IndexError;

/// Posting lists in CSR form: `postings[offsets[c]..offsets[c + 1]]` holds the
/// signature indices carrying coefficient `c`, in insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Csr {
    offsets: Vec<u32>,
    postings: Vec<u32>,
}

impl Csr {
    /// Count, prefix-sum, then scatter each list's index into its coefficients.
    pub(crate) fn build(space: u32, lists: &[&[u32]]) -> Result<Self, IndexError> {
        let mut offsets = vec![0u32; space as usize + 1];
        let mut total: u64 = 0;
        for list in lists {
            for &feature in *list {
                if feature >= space {
                    return Err(IndexError::CoefficientOutOfRange { feature, space });
                }
                offsets[feature as usize + 1] += 1;
            }
            total += list.len() as u64;
        }
        if total > u32::MAX as u64 {
            return Err(IndexError::Capacity {
                what: "postings",
                count: total as usize,
            });
        }

        for c in 0..space as usize {
            offsets[c + 1] += offsets[c];
        }

        let mut cursors = offsets[..space as usize].to_vec();
        let mut postings = vec![0u32; total as usize];
        for (index, list) in lists.iter().enumerate() {
            for &feature in *list {
                let cursor = &mut cursors[feature as usize];
                postings[*cursor as usize] = index as u32;
                *cursor += 1;
            }
        }

        Ok(Self { offsets, postings })
    }

    /// Adopt decoded arrays after checking every structural invariant.
    pub(crate) fn from_parts(
        offsets: Vec<u32>,
        postings: Vec<u32>,
        signature_count: usize,
    ) -> Result<Self, IndexError> {
        validate_offsets(&offsets, postings.len())?;
        if let Some(&bad) = postings.iter().find(|&&p| p as usize >= signature_count) {
            return Err(IndexError::Format(format!(
                "posting {bad} points past {signature_count} signatures"
            )));
        }
        Ok(Self { offsets, postings })
    }

    pub(crate) fn space(&self) -> u32 {
        (self.offsets.len() - 1) as u32
    }

    pub(crate) fn postings(&self, coefficient: u32) -> &[u32] {
        if coefficient >= self.space() {
            return &[];
        }
        let c = coefficient as usize;
        &self.postings[self.offsets[c] as usize..self.offsets[c + 1] as usize]
    }

    pub(crate) fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    pub(crate) fn flat_postings(&self) -> &[u32] {
        &self.postings
    }
}

/// Offsets must be non-empty, non-decreasing and end at the posting count.
pub(crate) fn validate_offsets(offsets: &[u32], postings_len: usize) -> Result<(), IndexError> {
    let Some(&sentinel) = offsets.last() else {
        return Err(IndexError::Format("offset table is empty".into()));
    };
    if let Some(at) = offsets.windows(2).position(|w| w[0] > w[1]) {
        return Err(IndexError::Format(format!(
            "offsets decrease at coefficient {at}"
        )));
    }
    if sentinel as usize != postings_len {
        return Err(IndexError::Format(format!(
            "offset sentinel {sentinel} does not match {postings_len} postings"
        )));
    }
    Ok(())
}
