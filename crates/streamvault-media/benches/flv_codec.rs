//! Benchmark tag muxing, metadata tag serialization and index lookup.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use streamvault_media::{FlvTag, KeyframeIndex, StreamMetadata};

fn make_index(count: usize, interval: f64) -> KeyframeIndex {
    let mut index = KeyframeIndex::new();
    for i in 0..count {
        index.push(i as f64 * interval, i as u64 * 250_000);
    }
    index
}

fn bench_flv_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("flv_codec");

    // Typical 1080p delta frame.
    let video = FlvTag::video(40, vec![0x27u8; 24_000]);
    group.bench_function("mux_video_24k", |b| {
        b.iter(|| black_box(&video).mux());
    });

    // 2 hours of 2s GOPs.
    let index = make_index(3600, 2.0);
    let metadata = StreamMetadata::default()
        .with_duration(7200.0)
        .with_keyframes(index.clone());
    group.bench_function("metadata_tag_3600kf", |b| {
        b.iter(|| black_box(&metadata).to_tag(0).mux());
    });

    group.bench_function("locate_3600kf", |b| {
        b.iter(|| black_box(&index).locate(black_box(3_456_789)));
    });

    group.finish();
}

criterion_group!(benches, bench_flv_codec);
criterion_main!(benches);
