//! Text dumps of shards and signature streams.

use std::io::{Read, Write};

use index::QueryIndex;
use signature::{SignatureModel, SignatureReader};

use crate::IngestError;

/// Write one `hash|total_weight` line per indexed signature, in row order.
pub fn dump_index<I, W>(index: &I, mut writer: W) -> Result<usize, IngestError>
where
    I: QueryIndex + ?Sized,
    W: Write,
{
    for meta in index.signatures() {
        writeln!(writer, "{}|{}", meta.hash, meta.total_weight)?;
    }
    writer.flush()?;
    Ok(index.len())
}

/// Write one `hash|f,f,...` line per record.
///
/// Ephemeral ids print as the zero hash. Integer dumps parse back with
/// [`crate::parse_integer_line`].
pub fn dump_signatures<R, W>(reader: &mut SignatureReader<R>, mut writer: W) -> Result<u64, IngestError>
where
    R: Read,
    W: Write,
{
    while let Some(signature) = reader.read_record()? {
        let features: Vec<String> = signature.features().iter().map(u32::to_string).collect();
        writeln!(writer, "{}|{}", signature.id().hash_or_zero(), features.join(","))?;
    }
    writer.flush()?;
    Ok(reader.records())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_integer_line;
    use index::SparseIndex;
    use signature::{
        ContentHash, IntegerSignature, Signature, SignatureKind, SignatureWriter, WeightTable,
    };
    use std::io::Cursor;

    fn sigs() -> Vec<Signature> {
        vec![
            IntegerSignature::new(ContentHash::from([1; 16]).into(), vec![5, 2]).into(),
            IntegerSignature::new(ContentHash::from([2; 16]).into(), vec![8]).into(),
        ]
    }

    #[test]
    fn index_dump_lists_hash_and_weight() {
        let index = SparseIndex::build(SignatureKind::Integer, &sigs(), &WeightTable::default()).unwrap();
        let mut out = Vec::new();
        assert_eq!(dump_index(&index, &mut out).unwrap(), 2);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            format!(
                "{}|2\n{}|1\n",
                ContentHash::from([1; 16]),
                ContentHash::from([2; 16])
            )
        );
    }

    #[test]
    fn integer_dump_parses_back() {
        let mut writer = SignatureWriter::new(Vec::new(), SignatureKind::Integer);
        for sig in sigs() {
            writer.write(&sig).unwrap();
        }
        let mut reader = SignatureReader::new(Cursor::new(writer.into_inner()), SignatureKind::Integer);
        let mut out = Vec::new();
        assert_eq!(dump_signatures(&mut reader, &mut out).unwrap(), 2);

        let text = String::from_utf8(out).unwrap();
        let parsed: Vec<Signature> = text
            .lines()
            .map(|line| parse_integer_line(line).unwrap().unwrap())
            .collect();
        assert_eq!(parsed, sigs());
    }
}
