//! Little-endian signature record streams (`.hsigs`, `.isigs`, `.csigs`, `.rsigs`).
//!
//! Record layout:
//!
//! ```text
//! u32 id                      0 => a 16-byte hash follows
//! [u8; 16] hash               only when id == 0
//! u8 channels, f32 * channels Haar only; channels is 1 or 3
//! u16 n, u32 * n              feature ids
//! u16 m, u16 * m              Color/RGB only; m == n pixel counts
//! ```
//!
//! A stream holds records of a single kind, back to back, with no header.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::config::{SignatureError, SignatureKind};
use crate::haar::{HaarSignature, CHANNEL_COUNT};
use crate::hash::{ContentHash, SignatureId, HASH_LEN};
use crate::histogram::{HistogramSignature, HistogramSpace};
use crate::integer::IntegerSignature;
use crate::{Signature, SignatureModel};

fn eof_as_truncated(err: io::Error) -> SignatureError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        SignatureError::Truncated
    } else {
        SignatureError::Io(err)
    }
}

/// Streaming reader over one record stream.
///
/// Iteration ends at a clean end of input, or right after the first error.
pub struct SignatureReader<R> {
    inner: R,
    kind: SignatureKind,
    records: u64,
    done: bool,
}

impl<R: Read> SignatureReader<R> {
    pub fn new(inner: R, kind: SignatureKind) -> Self {
        Self {
            inner,
            kind,
            records: 0,
            done: false,
        }
    }

    pub fn kind(&self) -> SignatureKind {
        self.kind
    }

    /// Records decoded so far.
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Read the next record; `Ok(None)` at a clean end of input.
    pub fn read_record(&mut self) -> Result<Option<Signature>, SignatureError> {
        let Some(raw_id) = self.read_leading_u32()? else {
            return Ok(None);
        };
        let id = if raw_id == 0 {
            let mut bytes = [0u8; HASH_LEN];
            self.inner.read_exact(&mut bytes).map_err(eof_as_truncated)?;
            SignatureId::Hash(ContentHash::from_bytes(bytes))
        } else {
            SignatureId::Ephemeral(raw_id)
        };

        let signature = match self.kind {
            SignatureKind::Haar => {
                let averages = self.read_averages()?;
                let features = self.read_features()?;
                Signature::Haar(HaarSignature::new(id, averages, features)?)
            }
            SignatureKind::Integer => {
                Signature::Integer(IntegerSignature::new(id, self.read_features()?))
            }
            SignatureKind::Color => Signature::Color(self.read_histogram(id, HistogramSpace::Yiq)?),
            SignatureKind::Rgb => Signature::Rgb(self.read_histogram(id, HistogramSpace::Rgb)?),
        };
        self.records += 1;
        Ok(Some(signature))
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// First word of a record; distinguishes a clean end from a torn one.
    fn read_leading_u32(&mut self) -> Result<Option<u32>, SignatureError> {
        let mut buf = [0u8; 4];
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => return Err(SignatureError::Truncated),
                Ok(n) => filled += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(SignatureError::Io(err)),
            }
        }
        Ok(Some(u32::from_le_bytes(buf)))
    }

    fn read_averages(&mut self) -> Result<[f32; CHANNEL_COUNT], SignatureError> {
        let count = self.inner.read_u8().map_err(eof_as_truncated)?;
        if count != 1 && count as usize != CHANNEL_COUNT {
            return Err(SignatureError::UnsupportedChannelCount { count });
        }
        let mut averages = [0.0f32; CHANNEL_COUNT];
        for slot in averages.iter_mut().take(count as usize) {
            *slot = self
                .inner
                .read_f32::<LittleEndian>()
                .map_err(eof_as_truncated)?;
        }
        Ok(averages)
    }

    fn read_features(&mut self) -> Result<Vec<u32>, SignatureError> {
        let len = self
            .inner
            .read_u16::<LittleEndian>()
            .map_err(eof_as_truncated)? as usize;
        let mut features = vec![0u32; len];
        self.inner
            .read_u32_into::<LittleEndian>(&mut features)
            .map_err(eof_as_truncated)?;
        Ok(features)
    }

    fn read_histogram(
        &mut self,
        id: SignatureId,
        space: HistogramSpace,
    ) -> Result<HistogramSignature, SignatureError> {
        let features = self.read_features()?;
        let len = self
            .inner
            .read_u16::<LittleEndian>()
            .map_err(eof_as_truncated)? as usize;
        if len != features.len() {
            return Err(SignatureError::WeightLengthMismatch {
                weights: len,
                features: features.len(),
            });
        }
        let mut frequencies = vec![0u16; len];
        self.inner
            .read_u16_into::<LittleEndian>(&mut frequencies)
            .map_err(eof_as_truncated)?;
        HistogramSignature::new(id, space, features, frequencies)
    }
}

impl<R: Read> Iterator for SignatureReader<R> {
    type Item = Result<Signature, SignatureError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_record() {
            Ok(Some(signature)) => Some(Ok(signature)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Appends records of one kind to a byte sink.
pub struct SignatureWriter<W: Write> {
    inner: W,
    kind: SignatureKind,
    records: u64,
}

impl<W: Write> SignatureWriter<W> {
    pub fn new(inner: W, kind: SignatureKind) -> Self {
        Self {
            inner,
            kind,
            records: 0,
        }
    }

    pub fn kind(&self) -> SignatureKind {
        self.kind
    }

    /// Records written so far.
    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn write(&mut self, signature: &Signature) -> Result<(), SignatureError> {
        if signature.kind() != self.kind {
            return Err(SignatureError::KindMismatch {
                expected: self.kind,
                found: signature.kind(),
            });
        }
        let features = signature.features();
        if features.len() > u16::MAX as usize {
            return Err(SignatureError::TooManyFeatures {
                len: features.len(),
            });
        }

        match signature.id() {
            SignatureId::Ephemeral(raw) if raw != 0 => {
                self.inner.write_u32::<LittleEndian>(raw)?;
            }
            id => {
                self.inner.write_u32::<LittleEndian>(0)?;
                self.inner.write_all(id.hash_or_zero().as_bytes())?;
            }
        }

        if let Some(averages) = signature.channel_averages() {
            self.inner.write_u8(CHANNEL_COUNT as u8)?;
            for &average in averages {
                self.inner.write_f32::<LittleEndian>(average)?;
            }
        }

        self.inner.write_u16::<LittleEndian>(features.len() as u16)?;
        for &feature in features {
            self.inner.write_u32::<LittleEndian>(feature)?;
        }

        if let Signature::Color(hist) | Signature::Rgb(hist) = signature {
            self.inner
                .write_u16::<LittleEndian>(hist.frequencies().len() as u16)?;
            for &count in hist.frequencies() {
                self.inner.write_u16::<LittleEndian>(count)?;
            }
        }

        self.records += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), SignatureError> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
