//! Stream-driven batch matching.
//!
//! Reads query signatures from a record stream, matches them in groups of
//! the matcher's worker count and appends one tab-separated row per match:
//!
//! ```text
//! query_hash  match_hash  score  channel_distance  match_weight  total_weight
//! ```
//!
//! Integer and histogram shards have no channel distance; the column reads
//! `-`. A run can resume after a given query hash, so an interrupted job
//! picks up where its output stopped.

use std::io::{Read, Write};
use std::time::Instant;

use index::QueryResult;
use matcher::Matcher;
use signature::{ContentHash, Signature, SignatureReader};
use tracing::{info, warn};

use crate::CbirError;

/// Knobs for [`run_batch`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchOptions {
    /// Used for both cut-offs; outside `[0, 1]` it falls back to 0.6.
    pub threshold: f32,
    /// Skip every record up to and including the one with this hash.
    pub resume_after: Option<ContentHash>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            threshold: matcher::DEFAULT_BATCH_THRESHOLD,
            resume_after: None,
        }
    }
}

/// Counters for one [`run_batch`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub read: u64,
    pub skipped: u64,
    pub queried: u64,
    pub rows: u64,
}

/// One output row for `result`.
pub fn format_row(result: &QueryResult) -> String {
    let query = result
        .query_hash
        .map(|hash| hash.to_hex())
        .unwrap_or_else(|| "-".to_string());
    let distance = result
        .channel_distance
        .map(|d| d.to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{query}\t{}\t{}\t{distance}\t{}\t{}",
        result.match_hash, result.score, result.match_weight, result.total_weight
    )
}

/// Match every signature in `reader` and write the rows to `out`.
///
/// A malformed record ends the run after the signatures read before it have
/// been matched. Output is flushed after every group that produced rows.
pub fn run_batch<R, W>(
    matcher: &Matcher,
    reader: &mut SignatureReader<R>,
    options: &BatchOptions,
    out: &mut W,
) -> Result<BatchReport, CbirError>
where
    R: Read,
    W: Write,
{
    let started = Instant::now();
    let group_size = matcher.config().workers;
    let mut report = BatchReport::default();
    let mut resume_after = options.resume_after;
    let mut group: Vec<Signature> = Vec::with_capacity(group_size);

    loop {
        let signature = match reader.read_record() {
            Ok(Some(signature)) => signature,
            Ok(None) => break,
            Err(err) if err.is_format_error() => {
                warn!(record = reader.records(), error = %err, "malformed query record, stopping");
                break;
            }
            Err(err) => return Err(err.into()),
        };
        report.read += 1;

        if let Some(target) = resume_after {
            report.skipped += 1;
            if signature.hash() == Some(target) {
                info!(hash = %target, skipped = report.skipped, "resuming after hash");
                resume_after = None;
            }
            continue;
        }

        group.push(signature);
        if group.len() == group_size {
            run_group(matcher, &mut group, options.threshold, out, &mut report)?;
            info!(
                read = report.read,
                queried = report.queried,
                rows = report.rows,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "batch progress"
            );
        }
    }
    if !group.is_empty() {
        run_group(matcher, &mut group, options.threshold, out, &mut report)?;
    }
    if let Some(target) = resume_after {
        warn!(hash = %target, "resume hash never seen, nothing matched");
    }
    out.flush()?;

    info!(
        read = report.read,
        skipped = report.skipped,
        queried = report.queried,
        rows = report.rows,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "batch run complete"
    );
    Ok(report)
}

fn run_group<W: Write>(
    matcher: &Matcher,
    group: &mut Vec<Signature>,
    threshold: f32,
    out: &mut W,
    report: &mut BatchReport,
) -> Result<(), CbirError> {
    let matched = matcher.match_batch(group, threshold)?;
    report.queried += group.len() as u64;
    group.clear();

    let mut rows = 0u64;
    for batch in &matched {
        for result in &batch.results {
            writeln!(out, "{}", format_row(result))?;
            rows += 1;
        }
    }
    if rows > 0 {
        out.flush()?;
    }
    report.rows += rows;
    Ok(())
}
