//! Criterion benchmarks for the OSC stream framing codec.
//!
//! The TCP worker frames every outgoing packet and runs every inbound read
//! through a `FrameDecoder`, so both sit on the hot path of a busy console
//! link.
//!
//! Run with:
//! ```bash
//! cargo bench --package osc-core --bench framing_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use osc_core::{encode_message, frame, FrameDecoder, FrameMode};
use rosc::OscType;

// ── Fixtures ──────────────────────────────────────────────────────────────────

fn small_message() -> Vec<u8> {
    encode_message("/eos/ping", vec![]).unwrap().into_vec()
}

fn fader_message() -> Vec<u8> {
    encode_message(
        "/eos/fader/1/1",
        vec![OscType::Float(0.75), OscType::String("Master".into())],
    )
    .unwrap()
    .into_vec()
}

/// A blob full of bytes that need SLIP escaping: the worst case for SLIP.
fn escape_heavy_message() -> Vec<u8> {
    encode_message("/blob", vec![OscType::Blob(vec![0xC0; 1024])])
        .unwrap()
        .into_vec()
}

fn fixtures() -> Vec<(&'static str, Vec<u8>)> {
    vec![
        ("ping", small_message()),
        ("fader", fader_message()),
        ("escape_heavy", escape_heavy_message()),
    ]
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame");
    for mode in [FrameMode::PacketLength, FrameMode::Slip] {
        for (name, payload) in fixtures() {
            group.bench_with_input(
                BenchmarkId::new(format!("{mode:?}"), name),
                &payload,
                |b, payload| b.iter(|| frame(black_box(mode), black_box(payload)).unwrap()),
            );
        }
    }
    group.finish();
}

fn bench_decode_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_stream");
    for mode in [FrameMode::PacketLength, FrameMode::Slip] {
        // 100 fader messages delivered in 1500-byte reads, like a busy TCP link
        let payload = fader_message();
        let stream: Vec<u8> = (0..100).flat_map(|_| frame(mode, &payload).unwrap()).collect();

        group.bench_with_input(
            BenchmarkId::new(format!("{mode:?}"), "100_faders"),
            &stream,
            |b, stream| {
                b.iter(|| {
                    let mut decoder = FrameDecoder::new(mode);
                    let mut count = 0usize;
                    for chunk in stream.chunks(1500) {
                        decoder.push(black_box(chunk));
                        while let Ok(Some(_)) = decoder.next_frame() {
                            count += 1;
                        }
                    }
                    count
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_frame, bench_decode_stream);
criterion_main!(benches);
