//! # Portal Benchmarks
//!
//! Performance benchmarks of the portal block pipeline.

pub mod qc_18_portal;
