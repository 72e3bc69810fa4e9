//! # Adapters Layer
//!
//! In-process implementations of the outbound ports, used by tests,
//! benchmarks and single-node replay.

mod memory_store;
mod proof_verifier;

pub use memory_store::InMemoryPortalStore;
pub use proof_verifier::StaticProofVerifier;
