use std::hint::black_box;
use std::io::Cursor;
use std::sync::Arc;

use cbir::{
    ContentHash, MatchConfig, Matcher, PixelBuffer, Signature, SignatureKind, SparseIndex,
    WeightTable,
};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use image::{ImageFormat, Rgb, RgbImage};

fn pixels(n: u32) -> PixelBuffer {
    PixelBuffer::from_fn(128, |x, y| {
        [
            ((x * (n % 7 + 1) + y) % 256) as u8,
            ((y * (n % 5 + 2) + n * 11) % 256) as u8,
            (((x / 16 + y / 16) * 32 + n * 17) % 256) as u8,
        ]
    })
}

fn haar(n: u32) -> Signature {
    let id = ContentHash::of_bytes(&n.to_le_bytes()).into();
    Signature::from_pixels(SignatureKind::Haar, id, &pixels(n)).expect("haar signature")
}

fn png(n: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(320, 240, |x, y| {
        Rgb([(x % 256) as u8, ((y + n) % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).expect("png encode");
    out.into_inner()
}

fn bench_signatures(c: &mut Criterion) {
    let buffer = pixels(3);
    c.bench_function("signature_haar_128", |b| {
        b.iter(|| {
            let sig = Signature::from_pixels(SignatureKind::Haar, ContentHash::default().into(), &buffer)
                .expect("haar");
            black_box(sig);
        });
    });

    let bytes = png(1);
    c.bench_function("signature_haar_from_png_320x240", |b| {
        b.iter(|| {
            let sig = cbir::signature_from_image(SignatureKind::Haar, None, &bytes).expect("decode");
            black_box(sig);
        });
    });

    for kind in [SignatureKind::Color, SignatureKind::Rgb] {
        let side = kind.working_side().expect("image kind");
        let small = PixelBuffer::from_fn(side, |x, y| [(x * 7) as u8, (y * 5) as u8, (x ^ y) as u8]);
        c.bench_function(&format!("signature_{kind}"), |b| {
            b.iter(|| {
                let sig = Signature::from_pixels(kind, ContentHash::default().into(), &small)
                    .expect("histogram");
                black_box(sig);
            });
        });
    }
}

fn bench_index_build(c: &mut Criterion) {
    let sigs: Vec<Signature> = (0..2_000).map(haar).collect();
    let weights = WeightTable::default();

    c.bench_function("index_build_haar_2000", |b| {
        b.iter_batched(
            || sigs.clone(),
            |sigs| {
                let shard = SparseIndex::build(SignatureKind::Haar, &sigs, &weights).expect("build");
                black_box(shard);
            },
            BatchSize::LargeInput,
        );
    });
}

fn bench_queries(c: &mut Criterion) {
    let sigs: Vec<Signature> = (0..4_000).map(haar).collect();
    let weights = WeightTable::default();
    let shards: Vec<Arc<SparseIndex>> = sigs
        .chunks(1_000)
        .map(|chunk| {
            Arc::new(SparseIndex::build(SignatureKind::Haar, chunk, &weights).expect("build"))
        })
        .collect();
    let matcher = Matcher::new(shards, MatchConfig::default()).expect("matcher");
    let query = haar(17);

    c.bench_function("match_single_4_shards_4000", |b| {
        b.iter(|| {
            let hits = matcher.match_signature(&query).expect("query");
            black_box(hits);
        });
    });

    let batch: Vec<Signature> = sigs.iter().take(64).cloned().collect();
    c.bench_function("match_batch_64_queries", |b| {
        b.iter(|| {
            let hits = matcher.match_batch(&batch, 0.6).expect("batch");
            black_box(hits);
        });
    });
}

criterion_group!(benches, bench_signatures, bench_index_build, bench_queries);
criterion_main!(benches);
