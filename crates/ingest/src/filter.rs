//! Whitelist filtering of signature streams.

use std::collections::HashSet;
use std::io::{Read, Write};

use signature::{ContentHash, SignatureReader, SignatureWriter};
use tracing::info;

use crate::{FilterReport, IngestError};

/// Copy records whose hash is in `whitelist` from `reader` to `writer`,
/// writing each hash at most once.
///
/// An empty whitelist keeps every record, so the filter then only
/// deduplicates. Records without a hash never match a non-empty whitelist.
pub fn filter_signatures<R: Read, W: Write>(
    reader: &mut SignatureReader<R>,
    whitelist: &HashSet<ContentHash>,
    writer: &mut SignatureWriter<W>,
) -> Result<FilterReport, IngestError> {
    let mut report = FilterReport::default();
    let mut written = HashSet::new();

    while let Some(signature) = reader.read_record()? {
        report.read += 1;
        let hash = signature.hash();
        if !whitelist.is_empty() && !hash.is_some_and(|h| whitelist.contains(&h)) {
            report.rejected += 1;
            continue;
        }
        if let Some(hash) = hash {
            if !written.insert(hash) {
                report.duplicates += 1;
                continue;
            }
        }
        writer.write(&signature)?;
        report.kept += 1;
    }
    writer.flush()?;

    info!(
        read = report.read,
        kept = report.kept,
        rejected = report.rejected,
        duplicates = report.duplicates,
        "filter complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use signature::{IntegerSignature, Signature, SignatureId, SignatureKind};
    use std::io::Cursor;

    fn stream(ids: &[u8]) -> Vec<u8> {
        let mut writer = SignatureWriter::new(Vec::new(), SignatureKind::Integer);
        for &id in ids {
            let sig: Signature =
                IntegerSignature::new(ContentHash::from([id; 16]).into(), vec![id as u32]).into();
            writer.write(&sig).unwrap();
        }
        writer.write(&IntegerSignature::new(SignatureId::Ephemeral(5), vec![1]).into()).unwrap();
        writer.into_inner()
    }

    fn run(ids: &[u8], whitelist: &[u8]) -> (FilterReport, Vec<Signature>) {
        let mut reader = SignatureReader::new(Cursor::new(stream(ids)), SignatureKind::Integer);
        let whitelist = whitelist.iter().map(|&b| ContentHash::from([b; 16])).collect();
        let mut writer = SignatureWriter::new(Vec::new(), SignatureKind::Integer);
        let report = filter_signatures(&mut reader, &whitelist, &mut writer).unwrap();
        let kept = SignatureReader::new(Cursor::new(writer.into_inner()), SignatureKind::Integer)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        (report, kept)
    }

    #[test]
    fn keeps_whitelisted_hashes_once() {
        let (report, kept) = run(&[1, 2, 1, 3], &[1, 3]);
        assert_eq!(
            report,
            FilterReport {
                read: 5,
                kept: 2,
                rejected: 2,
                duplicates: 1,
            }
        );
        let hashes: Vec<_> = kept.iter().map(|s| s.hash().unwrap()).collect();
        assert_eq!(hashes, vec![ContentHash::from([1; 16]), ContentHash::from([3; 16])]);
    }

    #[test]
    fn empty_whitelist_only_deduplicates() {
        let (report, kept) = run(&[4, 4, 6], &[]);
        assert_eq!(report.kept, 3);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.rejected, 0);
        assert_eq!(kept.len(), 3);
    }

    #[test]
    fn malformed_input_is_an_error() {
        let mut bytes = stream(&[1]);
        bytes.truncate(bytes.len() - 1);
        let mut reader = SignatureReader::new(Cursor::new(bytes), SignatureKind::Integer);
        let mut writer = SignatureWriter::new(Vec::new(), SignatureKind::Integer);
        let result = filter_signatures(&mut reader, &HashSet::new(), &mut writer);
        assert!(matches!(result, Err(IngestError::Signature(_))));
    }
}
