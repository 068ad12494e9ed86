//! Line formats read by the importers and the filter.
//!
//! All parsers skip blank lines and lines starting with `#`.

use std::collections::HashSet;
use std::io::BufRead;
use std::path::PathBuf;

use signature::{ContentHash, IntegerSignature, Signature};

use crate::{IngestError, ManifestEntry};

fn is_skippable(line: &str) -> bool {
    let line = line.trim();
    line.is_empty() || line.starts_with('#')
}

/// Parse `hash | path` or a bare `path`.
pub fn parse_manifest_line(line: &str) -> Result<Option<ManifestEntry>, IngestError> {
    if is_skippable(line) {
        return Ok(None);
    }
    let (hash, path) = match line.split_once('|') {
        Some((hash, path)) => (Some(hash.trim().parse::<ContentHash>()?), path.trim()),
        None => (None, line.trim()),
    };
    if path.is_empty() {
        return Err(IngestError::InvalidLine {
            line: 0,
            reason: "manifest entry has no path".into(),
        });
    }
    Ok(Some(ManifestEntry {
        hash,
        path: PathBuf::from(path),
    }))
}

/// Parse `hash | c, c, ...` into an integer signature.
pub fn parse_integer_line(line: &str) -> Result<Option<Signature>, IngestError> {
    if is_skippable(line) {
        return Ok(None);
    }
    Ok(IntegerSignature::parse_line(line)?.map(Signature::Integer))
}

/// Read one hex hash per line.
pub fn read_whitelist<R: BufRead>(reader: R) -> Result<HashSet<ContentHash>, IngestError> {
    let mut hashes = HashSet::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if is_skippable(&line) {
            continue;
        }
        let hash = line
            .trim()
            .parse::<ContentHash>()
            .map_err(|err| IngestError::InvalidLine {
                line: idx + 1,
                reason: err.to_string(),
            })?;
        hashes.insert(hash);
    }
    tracing::debug!(hashes = hashes.len(), "whitelist loaded");
    Ok(hashes)
}

/// Attach a 1-based line number to a parse error.
pub(crate) fn at_line(err: IngestError, line: usize) -> IngestError {
    match err {
        IngestError::InvalidLine { reason, .. } => IngestError::InvalidLine { line, reason },
        other => IngestError::InvalidLine {
            line,
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use signature::SignatureModel;
    use std::io::Cursor;

    const HASH: &str = "00112233445566778899aabbccddeeff";

    #[test]
    fn manifest_with_hash() {
        let entry = parse_manifest_line(&format!(" {HASH} | images/a.png ")).unwrap().unwrap();
        assert_eq!(entry.hash, Some(HASH.parse().unwrap()));
        assert_eq!(entry.path, PathBuf::from("images/a.png"));
    }

    #[test]
    fn manifest_with_bare_path() {
        let entry = parse_manifest_line("b.jpg").unwrap().unwrap();
        assert_eq!(entry.hash, None);
        assert_eq!(entry.path, PathBuf::from("b.jpg"));
    }

    #[test]
    fn manifest_skips_blank_and_comment_lines() {
        assert!(parse_manifest_line("   ").unwrap().is_none());
        assert!(parse_manifest_line("# header").unwrap().is_none());
    }

    #[test]
    fn manifest_rejects_bad_hash_and_missing_path() {
        assert!(matches!(
            parse_manifest_line("xyz | a.png"),
            Err(IngestError::Signature(_))
        ));
        assert!(matches!(
            parse_manifest_line(&format!("{HASH} |  ")),
            Err(IngestError::InvalidLine { .. })
        ));
    }

    #[test]
    fn integer_lines() {
        let sig = parse_integer_line(&format!("{HASH}|{{4, 2, 9}}")).unwrap().unwrap();
        assert_eq!(sig.features(), &[2, 4, 9]);
        assert_eq!(sig.hash(), Some(HASH.parse().unwrap()));
        assert!(parse_integer_line("# nothing").unwrap().is_none());
        assert!(parse_integer_line(&format!("{HASH}|1,x")).is_err());
    }

    #[test]
    fn whitelist_reports_line_numbers() {
        let text = format!("{HASH}\n\n# comment\n{HASH}\nnot-a-hash\n");
        match read_whitelist(Cursor::new(text)) {
            Err(IngestError::InvalidLine { line, .. }) => assert_eq!(line, 5),
            other => panic!("unexpected: {other:?}"),
        }

        let set = read_whitelist(Cursor::new(format!("{HASH}\n{HASH}\n"))).unwrap();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn at_line_keeps_reason() {
        let err = at_line(
            IngestError::InvalidLine {
                line: 0,
                reason: "empty".into(),
            },
            7,
        );
        assert_eq!(err.to_string(), "line 7: empty");
    }
}
