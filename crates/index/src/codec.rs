//! Shard file layout.
//!
//! All fields are little-endian and fixed width; there is no magic number or
//! version field.
//!
//! ```text
//! .hsm  u32 N
//!       N x ([u8; 16] hash, f32 total_weight, f32 avg_y, f32 avg_i, f32 avg_q)
//!       98304 x u32 offsets          (sentinel omitted)
//!       u32 P, P x u32 postings
//!
//! .qsm  u32 N
//!       N x ([u8; 16] hash, f32 total_weight)
//!       u32 L, L x u32 offsets       (L = space + 1, sentinel included)
//!       u32 P, P x u32 postings
//! ```

use std::io::Write;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use signature::haar::{CHANNEL_COUNT, COEFFICIENT_SPACE};
use signature::{ContentHash, HASH_LEN};

use crate::memory::{HaarIndex, IntegerIndex};
use crate::{IndexError, QueryIndex, SignatureMeta};

pub(crate) const HAAR_ROW_BYTES: usize = HASH_LEN + 4 + 4 * CHANNEL_COUNT;
pub(crate) const INTEGER_ROW_BYTES: usize = HASH_LEN + 4;
/// Stored Haar offsets, sentinel excluded.
pub(crate) const HAAR_OFFSET_COUNT: usize = COEFFICIENT_SPACE as usize;

/// Bounds-checked little-endian cursor over an in-memory buffer.
pub(crate) struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8], IndexError> {
        if len > self.remaining() {
            return Err(IndexError::Format(format!(
                "truncated {what}: need {len} bytes, {} left",
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub(crate) fn u32(&mut self, what: &str) -> Result<u32, IndexError> {
        Ok(LittleEndian::read_u32(self.take(4, what)?))
    }

    fn f32(&mut self, what: &str) -> Result<f32, IndexError> {
        Ok(LittleEndian::read_f32(self.take(4, what)?))
    }

    fn hash(&mut self, what: &str) -> Result<ContentHash, IndexError> {
        let mut bytes = [0u8; HASH_LEN];
        bytes.copy_from_slice(self.take(HASH_LEN, what)?);
        Ok(ContentHash::from_bytes(bytes))
    }

    pub(crate) fn u32s(&mut self, count: usize, what: &str) -> Result<Vec<u32>, IndexError> {
        let len = count
            .checked_mul(4)
            .ok_or_else(|| IndexError::Format(format!("{what} count {count} overflows")))?;
        let raw = self.take(len, what)?;
        let mut out = vec![0u32; count];
        LittleEndian::read_u32_into(raw, &mut out);
        Ok(out)
    }

    pub(crate) fn finish(&self) -> Result<(), IndexError> {
        if self.remaining() != 0 {
            return Err(IndexError::Format(format!(
                "{} trailing bytes after postings",
                self.remaining()
            )));
        }
        Ok(())
    }
}

fn rows_len(count: usize, row: usize) -> Result<usize, IndexError> {
    count
        .checked_mul(row)
        .ok_or_else(|| IndexError::Format(format!("signature count {count} overflows")))
}

/// Parse the Haar metadata block for `count` rows.
pub(crate) fn read_haar_rows(
    dec: &mut Decoder<'_>,
    count: usize,
) -> Result<Vec<SignatureMeta>, IndexError> {
    let needed = rows_len(count, HAAR_ROW_BYTES)?;
    if needed > dec.remaining() {
        return Err(IndexError::Format(format!(
            "truncated metadata: {count} rows need {needed} bytes"
        )));
    }
    let mut rows = Vec::with_capacity(count);
    for _ in 0..count {
        let hash = dec.hash("hash")?;
        let total_weight = dec.f32("total weight")?;
        let mut averages = [0.0f32; CHANNEL_COUNT];
        for slot in averages.iter_mut() {
            *slot = dec.f32("channel average")?;
        }
        rows.push(SignatureMeta {
            hash,
            total_weight,
            averages: Some(averages),
        });
    }
    Ok(rows)
}

fn read_integer_rows(
    dec: &mut Decoder<'_>,
    count: usize,
) -> Result<Vec<SignatureMeta>, IndexError> {
    let needed = rows_len(count, INTEGER_ROW_BYTES)?;
    if needed > dec.remaining() {
        return Err(IndexError::Format(format!(
            "truncated metadata: {count} rows need {needed} bytes"
        )));
    }
    let mut rows = Vec::with_capacity(count);
    for _ in 0..count {
        rows.push(SignatureMeta {
            hash: dec.hash("hash")?,
            total_weight: dec.f32("total weight")?,
            averages: None,
        });
    }
    Ok(rows)
}

pub(crate) fn read_haar(bytes: &[u8]) -> Result<HaarIndex, IndexError> {
    let mut dec = Decoder::new(bytes);
    let count = dec.u32("signature count")? as usize;
    let rows = read_haar_rows(&mut dec, count)?;
    let mut offsets = dec.u32s(HAAR_OFFSET_COUNT, "offsets")?;
    let postings_len = dec.u32("posting count")?;
    let postings = dec.u32s(postings_len as usize, "postings")?;
    dec.finish()?;
    offsets.push(postings_len);
    HaarIndex::from_parts(rows, offsets, postings)
}

pub(crate) fn read_integer(bytes: &[u8]) -> Result<IntegerIndex, IndexError> {
    let mut dec = Decoder::new(bytes);
    let count = dec.u32("signature count")? as usize;
    let rows = read_integer_rows(&mut dec, count)?;
    let offsets_len = dec.u32("offset count")? as usize;
    if offsets_len == 0 {
        return Err(IndexError::Format("offset table is empty".into()));
    }
    let offsets = dec.u32s(offsets_len, "offsets")?;
    let postings_len = dec.u32("posting count")?;
    let postings = dec.u32s(postings_len as usize, "postings")?;
    dec.finish()?;
    IntegerIndex::from_parts(rows, offsets, postings)
}

fn write_u32s<W: Write>(writer: &mut W, values: &[u32]) -> Result<(), IndexError> {
    for &value in values {
        writer.write_u32::<LittleEndian>(value)?;
    }
    Ok(())
}

pub(crate) fn write_haar<W: Write>(index: &HaarIndex, writer: &mut W) -> Result<(), IndexError> {
    let rows = index.signatures();
    writer.write_u32::<LittleEndian>(rows.len() as u32)?;
    for row in rows {
        writer.write_all(row.hash.as_bytes())?;
        writer.write_f32::<LittleEndian>(row.total_weight)?;
        for &average in &row.averages.unwrap_or_default() {
            writer.write_f32::<LittleEndian>(average)?;
        }
    }
    let offsets = index.offsets();
    write_u32s(writer, &offsets[..offsets.len() - 1])?;
    let postings = index.flat_postings();
    writer.write_u32::<LittleEndian>(postings.len() as u32)?;
    write_u32s(writer, postings)
}

pub(crate) fn write_integer<W: Write>(
    index: &IntegerIndex,
    writer: &mut W,
) -> Result<(), IndexError> {
    let rows = index.signatures();
    writer.write_u32::<LittleEndian>(rows.len() as u32)?;
    for row in rows {
        writer.write_all(row.hash.as_bytes())?;
        writer.write_f32::<LittleEndian>(row.total_weight)?;
    }
    let offsets = index.offsets();
    writer.write_u32::<LittleEndian>(offsets.len() as u32)?;
    write_u32s(writer, offsets)?;
    let postings = index.flat_postings();
    writer.write_u32::<LittleEndian>(postings.len() as u32)?;
    write_u32s(writer, postings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SparseIndex;
    use signature::{
        HistogramSignature, HistogramSpace, IntegerSignature, PixelBuffer, Signature,
        SignatureKind, WeightTable,
    };

    fn haar_index() -> HaarIndex {
        let sigs: Vec<Signature> = (1..=4u32)
            .map(|seed| {
                let pixels = PixelBuffer::from_fn(128, |x, y| {
                    [(x * seed) as u8, (y + seed * 40) as u8, (x * y / (seed + 1)) as u8]
                });
                Signature::from_pixels(
                    SignatureKind::Haar,
                    ContentHash::of_bytes(&seed.to_le_bytes()).into(),
                    &pixels,
                )
                .unwrap()
            })
            .collect();
        HaarIndex::build(&sigs, &WeightTable::default()).unwrap()
    }

    fn integer_index() -> IntegerIndex {
        let sigs = vec![
            Signature::from(IntegerSignature::new(
                ContentHash::of_bytes(b"a").into(),
                vec![1, 5, 9],
            )),
            Signature::Color(
                HistogramSignature::new(
                    ContentHash::of_bytes(b"b").into(),
                    HistogramSpace::Yiq,
                    vec![5, 12],
                    vec![3, 4],
                )
                .unwrap(),
            ),
        ];
        IntegerIndex::build(&sigs, &WeightTable::default()).unwrap()
    }

    fn encode(index: impl Into<SparseIndex>) -> Vec<u8> {
        index.into().encode().unwrap()
    }

    #[test]
    fn haar_roundtrip_is_byte_identical() {
        let index = haar_index();
        let bytes = encode(index.clone());
        let expected_len = 4
            + index.len() * HAAR_ROW_BYTES
            + HAAR_OFFSET_COUNT * 4
            + 4
            + index.flat_postings().len() * 4;
        assert_eq!(bytes.len(), expected_len);

        let decoded = read_haar(&bytes).unwrap();
        assert_eq!(decoded, index);
        assert_eq!(encode(decoded), bytes);
    }

    #[test]
    fn integer_roundtrip_is_byte_identical() {
        let index = integer_index();
        let bytes = encode(index.clone());
        let decoded = read_integer(&bytes).unwrap();
        assert_eq!(decoded, index);
        assert_eq!(decoded.coefficient_space(), 13);
        assert_eq!(encode(decoded), bytes);
    }

    #[test]
    fn empty_integer_index_roundtrips() {
        let index = IntegerIndex::build(&[], &WeightTable::default()).unwrap();
        let bytes = encode(index.clone());
        // N, L, sentinel, P
        assert_eq!(bytes, vec![0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(read_integer(&bytes).unwrap(), index);
    }

    #[test]
    fn truncation_is_a_format_error() {
        let bytes = encode(integer_index());
        for cut in [0, 3, 10, bytes.len() - 1] {
            assert!(
                matches!(read_integer(&bytes[..cut]), Err(IndexError::Format(_))),
                "cut at {cut}"
            );
        }
        let bytes = encode(haar_index());
        assert!(matches!(
            read_haar(&bytes[..bytes.len() - 2]),
            Err(IndexError::Format(_))
        ));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = encode(integer_index());
        bytes.push(0);
        let err = read_integer(&bytes).unwrap_err();
        assert!(err.to_string().contains("trailing"));
    }

    #[test]
    fn corrupt_tables_are_rejected() {
        let index = integer_index();
        let bytes = encode(index.clone());
        let offsets_at = 4 + index.len() * INTEGER_ROW_BYTES + 4;

        // offsets[1] larger than offsets[2]
        let mut bad = bytes.clone();
        bad[offsets_at + 4..offsets_at + 8].copy_from_slice(&100u32.to_le_bytes());
        assert!(matches!(read_integer(&bad), Err(IndexError::Format(_))));

        // zero-length offset table
        let mut bad = bytes.clone();
        bad[offsets_at - 4..offsets_at].copy_from_slice(&0u32.to_le_bytes());
        assert!(matches!(read_integer(&bad), Err(IndexError::Format(_))));

        // posting pointing past N
        let mut bad = bytes.clone();
        let last = bad.len() - 4;
        bad[last..].copy_from_slice(&7u32.to_le_bytes());
        let err = read_integer(&bad).unwrap_err();
        assert!(err.to_string().contains("points past"));
    }

    #[test]
    fn huge_signature_counts_fail_without_allocating() {
        let bytes = u32::MAX.to_le_bytes();
        assert!(matches!(read_haar(&bytes), Err(IndexError::Format(_))));
        assert!(matches!(read_integer(&bytes), Err(IndexError::Format(_))));
    }
}
