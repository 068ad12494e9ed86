//! Haar shard with postings paged in from disk.
//!
//! Metadata and offsets are read at open time. Each coefficient's posting
//! list is read on first use and kept for the lifetime of the index in its own
//! `OnceLock`, so concurrent queries share one copy. Two threads touching a
//! cold coefficient at once may both read it; only one result is stored and
//! both observe the same slice afterwards.

use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::codec::{self, Decoder, HAAR_OFFSET_COUNT, HAAR_ROW_BYTES};
use crate::csr::validate_offsets;
use crate::{IndexError, IndexKind, QueryIndex, SignatureMeta};

type PostingCell = OnceLock<Box<[u32]>>;

pub struct DiskHaarIndex {
    path: PathBuf,
    signatures: Vec<SignatureMeta>,
    offsets: Vec<u32>,
    postings_offset: u64,
    file: Mutex<File>,
    cache: Box<[PostingCell]>,
}

impl DiskHaarIndex {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IndexError> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;
        let file_len = file.metadata()?.len();

        let count = match file.read_u32::<LittleEndian>() {
            Ok(count) => count as usize,
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(IndexError::Format("truncated signature count".into()))
            }
            Err(err) => return Err(err.into()),
        };

        // rows, offsets and the posting count
        let header_len = (count as u64) * HAAR_ROW_BYTES as u64 + HAAR_OFFSET_COUNT as u64 * 4 + 4;
        if 4 + header_len > file_len {
            return Err(IndexError::Format(format!(
                "truncated header: {count} signatures need {} bytes, file has {file_len}",
                4 + header_len
            )));
        }
        let mut header = vec![0u8; header_len as usize];
        file.read_exact(&mut header)?;

        let mut dec = Decoder::new(&header);
        let signatures = codec::read_haar_rows(&mut dec, count)?;
        let mut offsets = dec.u32s(HAAR_OFFSET_COUNT, "offsets")?;
        let postings_len = dec.u32("posting count")?;

        let postings_offset = 4 + header_len;
        let expected_len = postings_offset + postings_len as u64 * 4;
        if expected_len != file_len {
            return Err(IndexError::Format(format!(
                "postings region mismatch: expected file of {expected_len} bytes, found {file_len}"
            )));
        }
        offsets.push(postings_len);
        validate_offsets(&offsets, postings_len as usize)?;

        let cache = (0..HAAR_OFFSET_COUNT)
            .map(|_| OnceLock::new())
            .collect::<Vec<PostingCell>>()
            .into_boxed_slice();

        tracing::debug!(
            path = %path.display(),
            signatures = signatures.len(),
            postings = postings_len,
            "opened disk-paged haar index"
        );

        Ok(Self {
            path,
            signatures,
            offsets,
            postings_offset,
            file: Mutex::new(file),
            cache,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of coefficients whose postings are resident.
    pub fn cached_coefficients(&self) -> usize {
        self.cache.iter().filter(|cell| cell.get().is_some()).count()
    }

    fn load(&self, coefficient: usize) -> Result<Box<[u32]>, IndexError> {
        let start = self.offsets[coefficient];
        let end = self.offsets[coefficient + 1];
        let mut postings = vec![0u32; (end - start) as usize];
        if postings.is_empty() {
            return Ok(postings.into_boxed_slice());
        }

        {
            let mut file = self.file.lock().map_err(|_| IndexError::Poisoned)?;
            file.seek(SeekFrom::Start(self.postings_offset + start as u64 * 4))?;
            file.read_u32_into::<LittleEndian>(&mut postings)
                .map_err(|err| match err.kind() {
                    std::io::ErrorKind::UnexpectedEof => {
                        IndexError::Format(format!("truncated postings for coefficient {coefficient}"))
                    }
                    _ => IndexError::Io(err),
                })?;
        }

        let count = self.signatures.len();
        if let Some(&bad) = postings.iter().find(|&&p| p as usize >= count) {
            return Err(IndexError::Format(format!(
                "posting {bad} points past {count} signatures"
            )));
        }
        Ok(postings.into_boxed_slice())
    }
}

impl QueryIndex for DiskHaarIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::DiskHaar
    }

    fn signatures(&self) -> &[SignatureMeta] {
        &self.signatures
    }

    fn coefficient_space(&self) -> u32 {
        HAAR_OFFSET_COUNT as u32
    }

    fn postings(&self, coefficient: u32) -> Result<&[u32], IndexError> {
        let Some(cell) = self.cache.get(coefficient as usize) else {
            return Ok(&[]);
        };
        if let Some(postings) = cell.get() {
            return Ok(&**postings);
        }
        let loaded = self.load(coefficient as usize)?;
        Ok(&**cell.get_or_init(|| loaded))
    }
}

impl fmt::Debug for DiskHaarIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiskHaarIndex")
            .field("path", &self.path)
            .field("signatures", &self.signatures.len())
            .field("postings_offset", &self.postings_offset)
            .field("cached_coefficients", &self.cached_coefficients())
            .finish()
    }
}
