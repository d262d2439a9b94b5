// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Codec Throughput Benchmark
//!
//! Measures `encode`/`decode` cost for sequenced-data frames at a range of
//! payload sizes, and the incremental `Decoder`'s per-frame overhead when
//! fed a stream of back-to-back frames in one read.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use soupbin::codec::{encode, Decoder, PacketType};
use std::hint::black_box as bb;
use std::io::Cursor;

fn bench_encode_payload_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_by_size");
    for size in [64, 256, 1024, 4096, 16384, 65534] {
        let payload = vec![0xABu8; size];
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| bb(encode(PacketType::SequencedData, &payload)));
        });
    }
    group.finish();
}

fn bench_decode_payload_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_by_size");
    for size in [64, 256, 1024, 4096, 16384, 65534] {
        let payload = vec![0xABu8; size];
        let frame = encode(PacketType::SequencedData, &payload);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let mut decoder = Decoder::default();
                let mut cursor = Cursor::new(&frame);
                bb(decoder.decode(&mut cursor).expect("decode should succeed"))
            });
        });
    }
    group.finish();
}

fn bench_decode_stream_of_frames(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_stream");
    for count in [10, 100, 1000] {
        let mut stream = Vec::new();
        for i in 0..count {
            let payload = format!("message-{i}").into_bytes();
            stream.extend(encode(PacketType::UnsequencedData, &payload));
        }
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let mut decoder = Decoder::default();
                let mut cursor = Cursor::new(&stream);
                let mut decoded = 0;
                while decoded < count {
                    if decoder
                        .decode(&mut cursor)
                        .expect("decode should succeed")
                        .is_some()
                    {
                        decoded += 1;
                    }
                }
                bb(decoded)
            });
        });
    }
    group.finish();
}

criterion_group!(
    codec_benches,
    bench_encode_payload_sizes,
    bench_decode_payload_sizes,
    bench_decode_stream_of_frames
);
criterion_main!(codec_benches);
