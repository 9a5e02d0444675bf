//! # Allocator Benchmark
//!
//! Measures:
//! 1. Allocate/free pairs on an empty arena (best case)
//! 2. Allocate/free pairs on a fragmented arena (first-fit walk cost)
//! 3. Facade overhead (lock + stats) over the raw allocator

#![allow(dead_code)]
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dimension_memory::{DynamicAllocator, MemoryConfig, MemorySystem, MemoryTag};

/// Leaves every other allocation live so the free list has `count / 2` ranges.
fn fragmented(total_size: usize, count: usize) -> DynamicAllocator {
    let mut allocator = DynamicAllocator::new(total_size).unwrap();
    let ptrs: Vec<_> = (0..count).map(|_| allocator.allocate(48).unwrap()).collect();
    for ptr in ptrs.into_iter().step_by(2) {
        allocator.free_aligned(ptr).unwrap();
    }
    allocator
}

fn bench_empty_arena(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocate_free_empty");

    for alignment in [1u16, 16, 64] {
        let mut allocator = DynamicAllocator::new(1024 * 1024).unwrap();
        group.bench_with_input(
            BenchmarkId::new("alignment", alignment),
            &alignment,
            |b, &alignment| {
                b.iter(|| {
                    let ptr = allocator.allocate_aligned(black_box(256), alignment).unwrap();
                    allocator.free_aligned(ptr).unwrap();
                });
            },
        );
    }

    group.finish();
}

fn bench_fragmented_arena(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocate_free_fragmented");

    for ranges in [16usize, 256, 4096] {
        let mut allocator = fragmented(16 * 1024 * 1024, ranges * 2);
        group.bench_with_input(BenchmarkId::new("ranges", ranges), &ranges, |b, _| {
            b.iter(|| {
                // Too big for any hole: walks the whole list.
                let ptr = allocator.allocate(black_box(128)).unwrap();
                allocator.free_aligned(ptr).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_facade(c: &mut Criterion) {
    let memory = MemorySystem::new(MemoryConfig::new(1024 * 1024)).unwrap();

    c.bench_function("memory_system_allocate_free", |b| {
        b.iter(|| {
            let block = memory.allocate(black_box(256), MemoryTag::Game).unwrap();
            memory.free(block, MemoryTag::Game).unwrap();
        });
    });
}

criterion_group!(
    benches,
    bench_empty_arena,
    bench_fragmented_arena,
    bench_facade
);
criterion_main!(benches);
