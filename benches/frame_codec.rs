//! Frame codec and handshake benchmarks.
//!
//! Payload sizes cover all three length encodings:
//! - 7-bit: 16, 125
//! - 16-bit: 1024, 65535
//! - 64-bit: 1 MiB
//!
//! Run with: cargo bench --bench frame_codec
//! Results saved to: target/criterion/

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use websock::protocol::frame::{Opcode, apply_mask, decode, encode_with_key};
use websock::protocol::handshake::{Endpoint, compute_accept_key, negotiate};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const PAYLOAD_SIZES: &[usize] = &[16, 125, 1024, 65_535, 1 << 20];

const MASK_KEY: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];

const REQUEST: &[u8] = b"GET /chat HTTP/1.1\r\n\
                         Host: localhost:9999\r\n\
                         Upgrade: websocket\r\n\
                         Connection: Upgrade\r\n\
                         Origin: http://example.com\r\n\
                         Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
                         Sec-WebSocket-Version: 13\r\n\
                         \r\n";

// ============================================================================
// Benchmark: Encode
// ============================================================================

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for &size in PAYLOAD_SIZES {
        let payload = vec![0x5a; size];
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("unmasked", size), &payload, |b, payload| {
            b.iter(|| encode_with_key(black_box(payload), Opcode::Binary, None));
        });
        group.bench_with_input(BenchmarkId::new("masked", size), &payload, |b, payload| {
            b.iter(|| encode_with_key(black_box(payload), Opcode::Binary, Some(MASK_KEY)));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Decode
// ============================================================================

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for &size in PAYLOAD_SIZES {
        let frame = encode_with_key(&vec![0x5a; size], Opcode::Binary, Some(MASK_KEY));
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("masked", size), &frame, |b, frame| {
            b.iter(|| decode(black_box(frame)));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Masking
// ============================================================================

fn bench_apply_mask(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply_mask");

    for &size in PAYLOAD_SIZES {
        let mut payload = vec![0x5a; size];
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_function(BenchmarkId::from_parameter(size), |b| {
            b.iter(|| apply_mask(black_box(&mut payload), MASK_KEY));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Handshake
// ============================================================================

fn bench_handshake(c: &mut Criterion) {
    let endpoint = Endpoint::new("localhost", 9999);

    c.bench_function("handshake/accept_key", |b| {
        b.iter(|| compute_accept_key(black_box("dGhlIHNhbXBsZSBub25jZQ==")));
    });
    c.bench_function("handshake/negotiate", |b| {
        b.iter(|| negotiate(black_box(REQUEST), &endpoint));
    });
}

// ============================================================================
// Criterion Setup
// ============================================================================

criterion_group!(
    benches,
    bench_encode,
    bench_decode,
    bench_apply_mask,
    bench_handshake
);
criterion_main!(benches);
