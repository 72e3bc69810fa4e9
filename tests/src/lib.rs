//! # Portal Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── benchmarks/       # Criterion benchmarks of the block pipeline
//! │   └── qc_18_portal.rs
//! │
//! └── portal/           # End-to-end block flows
//!     ├── fixtures.rs   # Harness and action builders
//!     ├── porting_flow.rs
//!     ├── redeem_flow.rs
//!     ├── liquidation_flow.rs
//!     ├── reward_flow.rs
//!     └── replay.rs     # Leader/follower determinism
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p qc-portal-tests
//!
//! # By flow
//! cargo test -p qc-portal-tests portal::redeem_flow
//!
//! # Benchmarks
//! cargo bench -p qc-portal-tests
//! ```

#![allow(dead_code)]

pub mod benchmarks;
pub mod portal;
