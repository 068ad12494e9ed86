//! Building index shards from signature streams.

use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Instant;

use index::SparseIndex;
use signature::{Signature, SignatureKind, SignatureReader, WeightTable};
use tracing::{debug, info, warn};

use crate::{IngestConfig, IngestError};

fn write_shard(
    pending: &mut Vec<Signature>,
    kind: SignatureKind,
    out_dir: &Path,
    number: usize,
    weights: &WeightTable,
    cfg: &IngestConfig,
) -> Result<PathBuf, IngestError> {
    let path = out_dir.join(format!("out-{number}.{}", kind.index_extension()));
    let shard = SparseIndex::build_with_limit(kind, pending, weights, cfg.max_integer_space)?;
    shard.save(&path)?;
    info!(path = %path.display(), signatures = pending.len(), "shard written");
    pending.clear();
    Ok(path)
}

/// Read `streams` of `kind` signatures and write them out as index shards of
/// at most `shard_size` signatures, named `out-{n}.hsm` / `out-{n}.qsm`.
///
/// Signatures are deduplicated by hash across all streams. A malformed
/// record ends its stream; records read before it, and other streams, are
/// still indexed. I/O failures abort the build.
pub fn build_shards(
    streams: &[PathBuf],
    kind: SignatureKind,
    out_dir: &Path,
    weights: &WeightTable,
    cfg: &IngestConfig,
) -> Result<Vec<PathBuf>, IngestError> {
    cfg.validate()?;
    std::fs::create_dir_all(out_dir)?;

    let start = Instant::now();
    let mut seen = HashSet::new();
    let mut pending: Vec<Signature> = Vec::new();
    let mut shards = Vec::new();
    let mut duplicates = 0u64;

    for stream in streams {
        let file = File::open(stream)?;
        let mut reader = SignatureReader::new(BufReader::new(file), kind);
        loop {
            let signature = match reader.read_record() {
                Ok(Some(signature)) => signature,
                Ok(None) => break,
                Err(err) if err.is_format_error() => {
                    warn!(
                        stream = %stream.display(),
                        record = reader.records(),
                        error = %err,
                        "malformed record, skipping rest of stream"
                    );
                    break;
                }
                Err(err) => return Err(err.into()),
            };
            if let Some(hash) = signature.hash() {
                if !seen.insert(hash) {
                    debug!(hash = %hash, "duplicate hash skipped");
                    duplicates += 1;
                    continue;
                }
            }
            pending.push(signature);
            if pending.len() >= cfg.shard_size {
                shards.push(write_shard(&mut pending, kind, out_dir, shards.len(), weights, cfg)?);
            }
        }
        debug!(stream = %stream.display(), records = reader.records(), "stream read");
    }
    if !pending.is_empty() {
        shards.push(write_shard(&mut pending, kind, out_dir, shards.len(), weights, cfg)?);
    }

    info!(
        shards = shards.len(),
        duplicates,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "shard build complete"
    );
    Ok(shards)
}
