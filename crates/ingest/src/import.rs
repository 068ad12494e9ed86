//! Bulk import of images and integer lines into signature streams.

use std::collections::HashSet;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::time::Instant;

use rayon::prelude::*;
use signature::{ContentHash, Signature, SignatureError, SignatureKind, SignatureWriter};
use tracing::{debug, info, warn, Level};

use crate::manifest::{at_line, parse_integer_line, parse_manifest_line};
use crate::{signature_from_image, ImportReport, IngestConfig, IngestError, ManifestEntry};

enum Outcome {
    Extracted(Signature),
    Missing,
    Failed,
}

/// Tracks seen hashes and writes new signatures, flushing on schedule.
struct Sink<'a, W: Write> {
    writer: &'a mut SignatureWriter<W>,
    seen: HashSet<ContentHash>,
    flush_every: usize,
    report: ImportReport,
}

impl<'a, W: Write> Sink<'a, W> {
    fn new(writer: &'a mut SignatureWriter<W>, cfg: &IngestConfig) -> Self {
        Self {
            writer,
            seen: HashSet::new(),
            flush_every: cfg.flush_every,
            report: ImportReport::default(),
        }
    }

    fn accept(&mut self, signature: Signature) -> Result<(), IngestError> {
        if let Some(hash) = signature.hash() {
            if !self.seen.insert(hash) {
                debug!(hash = %hash, "duplicate hash skipped");
                self.report.duplicates += 1;
                return Ok(());
            }
        }
        self.writer.write(&signature)?;
        self.report.imported += 1;
        if self.report.imported % self.flush_every as u64 == 0 {
            self.writer.flush()?;
            info!(
                imported = self.report.imported,
                duplicates = self.report.duplicates,
                "import progress"
            );
        }
        Ok(())
    }

    fn finish(self) -> Result<ImportReport, IngestError> {
        self.writer.flush()?;
        Ok(self.report)
    }
}

fn extract(entry: &ManifestEntry, base: &Path, kind: SignatureKind, cfg: &IngestConfig) -> Outcome {
    let path = base.join(&entry.path);
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "source file missing");
            return Outcome::Missing;
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "source file unreadable");
            return Outcome::Failed;
        }
    };
    if let Some(limit) = cfg.max_image_bytes {
        if bytes.len() > limit {
            let err = IngestError::ImageTooLarge {
                size: bytes.len(),
                limit,
            };
            warn!(path = %path.display(), error = %err, "source file skipped");
            return Outcome::Failed;
        }
    }
    match signature_from_image(kind, entry.hash.map(Into::into), &bytes) {
        Ok(signature) => Outcome::Extracted(signature),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "signature extraction failed");
            Outcome::Failed
        }
    }
}

/// Import every image listed in `manifest` as a `kind` signature.
///
/// Relative paths resolve against `base`. Images are decoded in parallel in
/// rounds of `flush_every` entries; output order follows manifest order.
/// Missing files, undecodable images and malformed lines are logged and
/// counted. Only writer failures abort the import.
pub fn import_images<R, W>(
    manifest: R,
    base: &Path,
    kind: SignatureKind,
    writer: &mut SignatureWriter<W>,
    cfg: &IngestConfig,
) -> Result<ImportReport, IngestError>
where
    R: BufRead,
    W: Write,
{
    cfg.validate()?;
    if kind.working_side().is_none() {
        return Err(SignatureError::NotExtractable { kind }.into());
    }
    if writer.kind() != kind {
        return Err(SignatureError::KindMismatch {
            expected: writer.kind(),
            found: kind,
        }
        .into());
    }

    let start = Instant::now();
    let span = tracing::span!(Level::INFO, "ingest.import_images", kind = %kind);
    let _guard = span.enter();

    let mut sink = Sink::new(writer, cfg);
    let mut lines = manifest.lines().enumerate();
    let mut round: Vec<ManifestEntry> = Vec::with_capacity(cfg.flush_every.min(4096));
    let mut exhausted = false;

    while !exhausted {
        round.clear();
        while round.len() < cfg.flush_every {
            let Some((idx, line)) = lines.next() else {
                exhausted = true;
                break;
            };
            match parse_manifest_line(&line?) {
                Ok(Some(entry)) => round.push(entry),
                Ok(None) => {}
                Err(err) => {
                    warn!(error = %at_line(err, idx + 1), "manifest line skipped");
                    sink.report.failed += 1;
                }
            }
        }

        let outcomes: Vec<Outcome> = round
            .par_iter()
            .map(|entry| extract(entry, base, kind, cfg))
            .collect();
        for outcome in outcomes {
            match outcome {
                Outcome::Extracted(signature) => sink.accept(signature)?,
                Outcome::Missing => sink.report.missing += 1,
                Outcome::Failed => sink.report.failed += 1,
            }
        }
    }

    let report = sink.finish()?;
    info!(
        imported = report.imported,
        missing = report.missing,
        failed = report.failed,
        duplicates = report.duplicates,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "import complete"
    );
    Ok(report)
}

/// Import `hash | c, c, ...` lines as integer signatures.
pub fn import_integer_lines<R, W>(
    lines: R,
    writer: &mut SignatureWriter<W>,
    cfg: &IngestConfig,
) -> Result<ImportReport, IngestError>
where
    R: BufRead,
    W: Write,
{
    cfg.validate()?;
    if writer.kind() != SignatureKind::Integer {
        return Err(SignatureError::KindMismatch {
            expected: writer.kind(),
            found: SignatureKind::Integer,
        }
        .into());
    }

    let start = Instant::now();
    let mut sink = Sink::new(writer, cfg);
    for (idx, line) in lines.lines().enumerate() {
        match parse_integer_line(&line?) {
            Ok(Some(signature)) => sink.accept(signature)?,
            Ok(None) => {}
            Err(err) => {
                warn!(error = %at_line(err, idx + 1), "integer line skipped");
                sink.report.failed += 1;
            }
        }
    }

    let report = sink.finish()?;
    info!(
        imported = report.imported,
        failed = report.failed,
        duplicates = report.duplicates,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "integer import complete"
    );
    Ok(report)
}
