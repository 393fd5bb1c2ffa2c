//! Wire codec benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sharetree_bench::mixed_ops;
use sharetree_protocol::{Operation, OperationalState, SyncMessage, VersionedOp};

fn batch(count: u32) -> SyncMessage {
    SyncMessage::Changes(
        mixed_ops(count)
            .into_iter()
            .zip(0u32..)
            .map(|(op, i)| VersionedOp::new(OperationalState::new(i, 0), op))
            .collect(),
    )
}

/// Benchmark encoding single operations.
fn bench_encode_op(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_op");
    for op in mixed_ops(4) {
        group.bench_function(op.op_type().name(), |b| {
            b.iter(|| black_box(black_box(&op).encode().unwrap()));
        });
    }
    group.finish();
}

/// Benchmark decoding single operations.
fn bench_decode_op(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_op");
    for op in mixed_ops(4) {
        let bytes = op.encode().unwrap();
        group.bench_function(op.op_type().name(), |b| {
            b.iter(|| black_box(Operation::decode(black_box(&bytes)).unwrap()));
        });
    }
    group.finish();
}

/// Benchmark message batches of increasing size.
fn bench_batches(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch");
    for count in [1u32, 16, 64, 256] {
        let message = batch(count);
        let bytes = message.encode().unwrap();
        group.throughput(Throughput::Bytes(bytes.len() as u64));

        group.bench_with_input(BenchmarkId::new("encode", count), &message, |b, message| {
            b.iter(|| black_box(message.encode().unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("decode", count), &bytes, |b, bytes| {
            b.iter(|| black_box(SyncMessage::decode(bytes).unwrap()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode_op, bench_decode_op, bench_batches);

criterion_main!(benches);
