use super::*;
use crate::metrics::{set_match_metrics, MatchMetrics};
use index::IndexKind;
use signature::{
    ContentHash, IntegerSignature, PixelBuffer, SignatureId, SignatureKind,
};
use std::sync::RwLock;
use std::time::Duration;

fn hash(tag: &str) -> ContentHash {
    ContentHash::of_bytes(tag.as_bytes())
}

fn integer(tag: &str, features: &[u32]) -> Signature {
    IntegerSignature::new(SignatureId::Hash(hash(tag)), features.to_vec()).into()
}

fn haar(seed: u32) -> Signature {
    let pixels = PixelBuffer::from_fn(128, |x, y| {
        [(x * 2 + seed * 40) as u8, (y + seed * 17) as u8, ((x ^ y) + seed) as u8]
    });
    let id = SignatureId::Hash(hash(&format!("haar-{seed}")));
    Signature::from_pixels(SignatureKind::Haar, id, &pixels).unwrap()
}

fn shard(kind: SignatureKind, sigs: &[Signature]) -> Arc<SparseIndex> {
    Arc::new(SparseIndex::build(kind, sigs, &WeightTable::default()).unwrap())
}

/// Two integer shards: `s1` and `s2` in the first, `s3` in the second.
fn two_shards() -> (Vec<Arc<SparseIndex>>, [Signature; 3]) {
    let s1 = integer("s1", &[1, 2, 3, 4]);
    let s2 = integer("s2", &[1, 2, 3, 9]);
    let s3 = integer("s3", &[1, 2, 3, 4, 5]);
    let shards = vec![
        shard(SignatureKind::Integer, &[s1.clone(), s2.clone()]),
        shard(SignatureKind::Integer, &[s3.clone()]),
    ];
    (shards, [s1, s2, s3])
}

fn config(workers: usize) -> MatchConfig {
    MatchConfig {
        workers,
        ..MatchConfig::default()
    }
}

#[test]
fn merges_and_sorts_across_shards() -> Result<(), MatchError> {
    let (shards, _) = two_shards();
    let matcher = Matcher::new(shards, config(2))?;
    let query = integer("query", &[1, 2, 3, 4]);

    let hits = matcher.match_signature(&query)?;
    let order: Vec<ContentHash> = hits.iter().map(|hit| hit.match_hash).collect();
    assert_eq!(order, vec![hash("s1"), hash("s3"), hash("s2")]);

    let scores: Vec<f32> = hits.iter().map(|hit| hit.score).collect();
    assert_eq!(scores, vec![1.0, 0.8, 0.6]);
    assert!(hits.iter().all(|hit| hit.query_hash == Some(hash("query"))));
    Ok(())
}

#[test]
fn max_results_truncates_after_merge() -> Result<(), MatchError> {
    let (shards, _) = two_shards();
    let matcher = Matcher::new(
        shards,
        MatchConfig {
            max_results: 2,
            ..config(2)
        },
    )?;
    let hits = matcher.match_signature(&integer("query", &[1, 2, 3, 4]))?;
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[1].match_hash, hash("s3"));
    Ok(())
}

#[test]
fn worker_count_does_not_change_results() -> Result<(), MatchError> {
    let sigs: Vec<Signature> = (0..6).map(haar).collect();
    let shards = vec![
        shard(SignatureKind::Haar, &sigs[..2]),
        shard(SignatureKind::Haar, &sigs[2..4]),
        shard(SignatureKind::Haar, &sigs[4..]),
    ];
    let single = Matcher::new(shards.clone(), config(1))?;
    let pooled = Matcher::new(shards, config(4))?;

    for query in &sigs {
        assert_eq!(single.match_signature(query)?, pooled.match_signature(query)?);
    }
    assert_eq!(single.match_batch(&sigs, 0.3)?, pooled.match_batch(&sigs, 0.3)?);
    Ok(())
}

#[test]
fn haar_self_query_ranks_first() -> Result<(), MatchError> {
    let sigs: Vec<Signature> = (0..4).map(haar).collect();
    let matcher = Matcher::new(vec![shard(SignatureKind::Haar, &sigs)], config(2))?;
    let hits = matcher.match_signature(&sigs[2])?;
    assert_eq!(hits[0].match_hash, hash("haar-2"));
    assert!((hits[0].score - 1.0).abs() < 1e-6);
    assert_eq!(hits[0].channel_distance, Some(0.0));
    Ok(())
}

#[test]
fn batch_skips_self_matches_and_keeps_order() -> Result<(), MatchError> {
    let (shards, [s1, s2, _]) = two_shards();
    let matcher = Matcher::new(shards, config(1))?;

    let batch = matcher.match_batch(&[s1, s2], 0.5)?;
    assert_eq!(batch.len(), 2);

    assert_eq!(batch[0].query_hash, Some(hash("s1")));
    let first: Vec<ContentHash> = batch[0].results.iter().map(|r| r.match_hash).collect();
    assert_eq!(first, vec![hash("s3"), hash("s2")]);

    // s3 sits exactly on the threshold for s2 and is rejected
    assert_eq!(batch[1].query_hash, Some(hash("s2")));
    let second: Vec<ContentHash> = batch[1].results.iter().map(|r| r.match_hash).collect();
    assert_eq!(second, vec![hash("s1")]);
    Ok(())
}

#[test]
fn self_matches_do_not_count_towards_batch_limit() -> Result<(), MatchError> {
    let (shards, [s1, ..]) = two_shards();
    let matcher = Matcher::new(
        shards,
        MatchConfig {
            batch_limit: 1,
            ..config(3)
        },
    )?;
    let batch = matcher.match_batch(&[s1], 0.5)?;
    assert_eq!(batch[0].results.len(), 1);
    assert_eq!(batch[0].results[0].match_hash, hash("s3"));
    Ok(())
}

#[test]
fn out_of_range_batch_threshold_falls_back() -> Result<(), MatchError> {
    let (shards, [s1, ..]) = two_shards();
    let matcher = Matcher::new(shards, config(2))?;
    // at 0.6, s2 (exactly 0.6) drops out
    let batch = matcher.match_batch(&[s1.clone()], 5.0)?;
    let kept: Vec<ContentHash> = batch[0].results.iter().map(|r| r.match_hash).collect();
    assert_eq!(kept, vec![hash("s3")]);
    assert_eq!(matcher.match_batch(&[s1], -1.0)?, batch);
    Ok(())
}

#[test]
fn large_batches_run_in_groups() -> Result<(), MatchError> {
    let (shards, sigs) = two_shards();
    let matcher = Matcher::new(shards, config(2))?;
    let queries: Vec<Signature> = sigs.iter().cycle().take(7).cloned().collect();
    let batch = matcher.match_batch(&queries, 0.3)?;
    assert_eq!(batch.len(), 7);
    for (query, result) in queries.iter().zip(&batch) {
        assert_eq!(result.query_hash, query.hash());
        assert!(result.results.iter().all(|r| Some(r.match_hash) != query.hash()));
    }
    Ok(())
}

#[test]
fn shard_errors_abort_the_query() {
    let matcher = Matcher::new(vec![shard(SignatureKind::Haar, &[haar(1)])], config(1)).unwrap();
    let err = matcher
        .match_signature(&integer("q", &[1, 2]))
        .unwrap_err();
    match err {
        MatchError::Index(IndexError::VariantMismatch { index, signature }) => {
            assert_eq!(index, IndexKind::Haar);
            assert_eq!(signature, SignatureKind::Integer);
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert!(matcher.match_batch(&[integer("q", &[1])], 0.5).is_err());
}

#[test]
fn empty_queries_and_empty_shard_sets() -> Result<(), MatchError> {
    let (shards, _) = two_shards();
    let matcher = Matcher::new(shards, config(2))?;
    assert!(matcher.match_signature(&integer("empty", &[]))?.is_empty());
    assert!(matcher.match_batch(&[], 0.5)?.is_empty());

    let bare = Matcher::new(Vec::new(), config(1))?;
    assert!(bare.match_signature(&integer("q", &[1]))?.is_empty());
    assert_eq!(bare.signature_count(), 0);
    Ok(())
}

#[test]
fn invalid_config_is_rejected() {
    let result = Matcher::new(Vec::new(), config(0));
    assert!(matches!(result, Err(MatchError::InvalidConfig(_))));
}

#[test]
fn opens_saved_shards_from_disk() -> Result<(), MatchError> {
    let dir = tempfile::tempdir().unwrap();
    let sigs: Vec<Signature> = (0..4).map(haar).collect();
    let mut paths = Vec::new();
    for (i, chunk) in sigs.chunks(2).enumerate() {
        let path = dir.path().join(format!("out-{i}.hsm"));
        shard(SignatureKind::Haar, chunk).save(&path)?;
        paths.push(path);
    }

    let resident = Matcher::open(&paths, false, config(2))?;
    let paged = Matcher::open(&paths, true, config(2))?;
    assert_eq!(paged.signature_count(), 4);
    assert_eq!(paged.shards()[0].kind(), IndexKind::DiskHaar);

    for query in &sigs {
        assert_eq!(resident.match_signature(query)?, paged.match_signature(query)?);
    }
    Ok(())
}

#[derive(Default)]
struct RecordingMetrics {
    queries: RwLock<Vec<(usize, usize)>>,
    batches: RwLock<Vec<(usize, usize)>>,
}

impl MatchMetrics for RecordingMetrics {
    fn record_query(&self, _latency: Duration, shards: usize, hits: usize) {
        self.queries.write().unwrap().push((shards, hits));
    }

    fn record_batch(&self, _latency: Duration, queries: usize, hits: usize) {
        self.batches.write().unwrap().push((queries, hits));
    }
}

#[test]
fn metrics_recorder_sees_queries_and_batches() -> Result<(), MatchError> {
    let metrics = Arc::new(RecordingMetrics::default());
    set_match_metrics(Some(metrics.clone()));

    let (shards, [s1, s2, _]) = two_shards();
    let matcher = Matcher::new(shards, config(2))?;
    matcher.match_signature(&integer("query", &[1, 2, 3, 4]))?;
    matcher.match_batch(&[s1, s2], 0.5)?;

    set_match_metrics(None);

    // other tests may record concurrently
    assert!(metrics.queries.read().unwrap().contains(&(2, 3)));
    assert!(metrics.batches.read().unwrap().contains(&(2, 3)));
    Ok(())
}
