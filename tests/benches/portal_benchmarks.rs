//! # QC-18 Portal Benchmarks
//!
//! | Operation | Target |
//! |-----------|--------|
//! | Rate median, 1,000 submissions | < 100µs |
//! | Fee split, 200 custodians | < 100µs |
//! | Produce, 50 portings over 100 custodians | < 50ms |
//! | Apply + commit, same block | < 50ms |

use criterion::{criterion_group, criterion_main, Criterion};
use qc_portal_tests::benchmarks::qc_18_portal;

fn portal_benchmarks(c: &mut Criterion) {
    qc_18_portal::register_benchmarks(c);
}

criterion_group!(benches, portal_benchmarks);
criterion_main!(benches);
