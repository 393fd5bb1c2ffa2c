//! Tree mutation and remote apply benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use sharetree_bench::{context, populate, random_string, remote_creates};
use sharetree_core::SyncContext;
use sharetree_protocol::{
    AuthorityLevel, ElementKind, Operation, PeerRank, Ranks, SystemId, TransformManager,
};

fn remote_rank() -> PeerRank {
    PeerRank::new(AuthorityLevel::Low, SystemId::new(2).unwrap())
}

/// Benchmark local creates.
fn bench_local_create(c: &mut Criterion) {
    let mut group = c.benchmark_group("local_create");
    for count in [100usize, 1000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter_batched(
                || context(1, AuthorityLevel::High),
                |mut ctx| black_box(populate(&mut ctx, count)),
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

/// Benchmark local scalar modifies.
fn bench_local_modify(c: &mut Criterion) {
    let mut ctx = context(1, AuthorityLevel::High);
    let ids = populate(&mut ctx, 100);
    let mut n = 0i32;
    c.bench_function("local_modify", |b| {
        b.iter(|| {
            n = n.wrapping_add(1);
            for id in &ids {
                ctx.set_value(*id, n).unwrap();
            }
            ctx.drain_outbound();
        });
    });
}

/// Benchmark applying remote creates.
fn bench_remote_apply(c: &mut Criterion) {
    let mut group = c.benchmark_group("remote_apply");
    for count in [100u32, 1000] {
        let ops = remote_creates(2, count);
        group.throughput(Throughput::Elements(u64::from(count)));
        group.bench_with_input(BenchmarkId::from_parameter(count), &ops, |b, ops| {
            b.iter_batched(
                || (context(1, AuthorityLevel::High), ops.clone()),
                |(mut ctx, ops): (SyncContext, Vec<Operation>)| {
                    for op in ops {
                        black_box(ctx.receive_remote(op, remote_rank()));
                    }
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

/// Benchmark transforming an incoming insert against outstanding array work.
fn bench_transform(c: &mut Criterion) {
    let mut ctx = context(1, AuthorityLevel::High);
    let root = ctx.root_id();
    let array = ctx
        .create_child(root, ElementKind::StringArray, "items", None, None)
        .unwrap();
    for i in 0..64 {
        ctx.array_insert(array, i, random_string(6)).unwrap();
    }
    let outstanding = ctx.drain_outbound();
    let manager = TransformManager::new();
    let ranks = Ranks::new(ctx.rank(), remote_rank());
    let incoming = Operation::insert(array, AuthorityLevel::Low, Vec::new(), 3, random_string(6).into());

    c.bench_function("transform_against_64", |b| {
        b.iter_batched(
            || outstanding.clone(),
            |mut local| black_box(manager.transform_against(local.iter_mut(), incoming.clone(), ranks)),
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    bench_local_create,
    bench_local_modify,
    bench_remote_apply,
    bench_transform,
);

criterion_main!(benches);
