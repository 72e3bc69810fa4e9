//! # QC-18 Portal Benchmarks
//!
//! Block pipeline costs that grow with the custodian pool and the action
//! count:
//! - Rate median per token: O(n log n) in submissions
//! - Fee split: O(n) in matched custodians
//! - Produce: custodian picking scans the pool per porting request
//! - Apply + commit: O(entries) for the root

use crate::portal::fixtures::*;
use criterion::{black_box, BenchmarkId, Criterion, Throughput};
use qc_18_portal::{
    median, split_proportional, ActionPayload, InMemoryPortalStore, PortalAction, PortalManager,
    StaticProofVerifier,
};
use rand::Rng;
use std::collections::BTreeMap;
use std::time::Duration;

fn manager_with_pool(custodians: usize) -> TestManager {
    let mut manager = PortalManager::new(
        InMemoryPortalStore::new(),
        StaticProofVerifier::new(),
        fast_params(),
    )
    .expect("valid params");
    let mut payloads = vec![rates(PRV_RATE, BTC_RATE)];
    payloads.extend((0..custodians).map(|i| deposit(&format!("cust-{:05}", i), 10_000 * PRV)));
    let actions = to_actions(payloads);
    let insts = manager
        .produce_block(1, &actions, &BTreeMap::new())
        .expect("produce");
    manager.apply_block(1, &insts).expect("apply");
    manager
}

fn to_actions(payloads: Vec<ActionPayload>) -> Vec<PortalAction> {
    payloads
        .into_iter()
        .enumerate()
        .map(|(i, payload)| PortalAction {
            tx_req_id: format!("bench-{}", i),
            shard_id: (i % 8) as u8,
            shard_height: 1,
            payload,
        })
        .collect()
}

/// Median of rate submissions.
pub fn portal_rate_median(c: &mut Criterion) {
    let mut group = c.benchmark_group("qc-18/rate_median");
    let mut rng = rand::thread_rng();

    for size in [10usize, 100, 1_000] {
        let rates: Vec<u64> = (0..size).map(|_| rng.gen_range(1..u32::MAX as u64)).collect();
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &rates, |b, rates| {
            b.iter(|| black_box(median(rates)))
        });
    }
    group.finish();
}

/// Proportional fee split.
pub fn portal_fee_split(c: &mut Criterion) {
    let mut group = c.benchmark_group("qc-18/fee_split");
    let mut rng = rand::thread_rng();

    for size in [2usize, 20, 200] {
        let weights: Vec<(String, u64)> = (0..size)
            .map(|i| (format!("cust-{}", i), rng.gen_range(1..1_000_000)))
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(size), &weights, |b, weights| {
            b.iter(|| black_box(split_proportional(1_000_000_007, weights)))
        });
    }
    group.finish();
}

/// Producing a block of porting requests against a custodian pool.
pub fn portal_produce_block(c: &mut Criterion) {
    let mut group = c.benchmark_group("qc-18/produce_block");
    group.measurement_time(Duration::from_secs(10));

    for custodians in [10usize, 100] {
        let manager = manager_with_pool(custodians);
        let actions = to_actions(
            (0..50)
                .map(|i| porting(&format!("p{}", i), "porter", BTC / 100, PRV))
                .collect(),
        );
        group.throughput(Throughput::Elements(actions.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("custodians", custodians),
            &actions,
            |b, actions| {
                b.iter(|| {
                    black_box(
                        manager
                            .produce_block(2, actions, &BTreeMap::new())
                            .expect("produce"),
                    )
                })
            },
        );
    }
    group.finish();
}

/// Applying a produced block and committing the root.
pub fn portal_apply_block(c: &mut Criterion) {
    let mut group = c.benchmark_group("qc-18/apply_block");
    group.measurement_time(Duration::from_secs(10));

    for custodians in [10usize, 100] {
        let manager = manager_with_pool(custodians);
        let actions = to_actions(
            (0..50)
                .map(|i| porting(&format!("p{}", i), "porter", BTC / 100, PRV))
                .collect(),
        );
        let insts = manager
            .produce_block(2, &actions, &BTreeMap::new())
            .expect("produce");
        group.bench_with_input(
            BenchmarkId::new("custodians", custodians),
            &insts,
            |b, insts| {
                b.iter_batched(
                    || manager_with_pool(custodians),
                    |mut follower| black_box(follower.apply_block(2, insts).expect("apply")),
                    criterion::BatchSize::LargeInput,
                )
            },
        );
    }
    group.finish();
}

/// Register all portal benchmarks
pub fn register_benchmarks(c: &mut Criterion) {
    portal_rate_median(c);
    portal_fee_split(c);
    portal_produce_block(c);
    portal_apply_block(c);
}
