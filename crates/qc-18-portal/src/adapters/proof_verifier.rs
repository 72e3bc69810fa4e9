//! Proof verifier answering from a fixed table of known transactions.

use crate::domain::ExternalProof;
use crate::error::{PortalError, Result};
use crate::ports::outbound::{ProofData, ProofVerifier};
use std::collections::BTreeMap;
use tracing::debug;

/// Verifier that accepts exactly the proofs registered with it.
///
/// A proof is identified by chain, block hash and tx index; the encoded
/// proof nodes are not inspected.
#[derive(Clone, Debug, Default)]
pub struct StaticProofVerifier {
    known: BTreeMap<String, ProofData>,
}

impl StaticProofVerifier {
    /// Create a verifier that rejects everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept the tx at `tx_index` of `block_hash` on `chain`.
    pub fn with_proof(
        mut self,
        chain: &str,
        block_hash: &str,
        tx_index: u32,
        data: ProofData,
    ) -> Self {
        self.insert(chain, block_hash, tx_index, data);
        self
    }

    /// Register an accepted tx.
    pub fn insert(&mut self, chain: &str, block_hash: &str, tx_index: u32, data: ProofData) {
        let proof = ExternalProof {
            block_hash: block_hash.to_string(),
            tx_index,
            proof: Vec::new(),
        };
        self.known.insert(proof.unique_id(chain), data);
    }
}

impl ProofVerifier for StaticProofVerifier {
    fn verify_proof(&self, chain: &str, proof: &ExternalProof) -> Result<ProofData> {
        let id = proof.unique_id(chain);
        match self.known.get(&id) {
            Some(data) => {
                debug!("[qc-18] Verified external tx {}", id);
                Ok(data.clone())
            }
            None => Err(PortalError::ProofRejected(format!("unknown tx {}", id))),
        }
    }
}
