//! # Outbound Ports
//!
//! Collaborators the portal calls: the committed state store and the
//! external-chain proof verifier.

use crate::domain::{ExternalProof, ObjectKey};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// State root returned by a commit.
pub type StateRoot = [u8; 32];

/// Versioned key/value store the portal state is persisted in.
///
/// Writes take `&mut self`: the block pipeline is the only owner of the
/// store while a block is processed.
pub trait PortalStateStore {
    /// Read a value.
    fn get(&self, key: &ObjectKey) -> Result<Option<Vec<u8>>>;

    /// Write a value.
    fn set(&mut self, key: ObjectKey, value: Vec<u8>) -> Result<()>;

    /// Delete a value. Deleting a missing key is not an error.
    fn delete(&mut self, key: &ObjectKey) -> Result<()>;

    /// All entries whose key starts with `prefix`, in key order.
    fn iter_prefix(&self, prefix: &[u8]) -> Result<Vec<(ObjectKey, Vec<u8>)>>;

    /// Commit pending writes and return the new state root.
    fn commit(&mut self) -> Result<StateRoot>;
}

/// Data extracted from a verified external transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofData {
    /// Sender of the external transaction.
    pub sender_address: String,
    /// Token moved by the transaction.
    pub token_id: String,
    /// Amount moved, in the token's portal decimals.
    pub amount: u64,
    /// Receiver address -> amount paid to it, in portal decimals.
    #[serde(default)]
    pub receivers: BTreeMap<String, u64>,
}

impl ProofData {
    /// Amount the transaction paid to `address`.
    pub fn received_by(&self, address: &str) -> u64 {
        self.receivers.get(address).copied().unwrap_or(0)
    }
}

/// External-chain proof verification.
pub trait ProofVerifier {
    /// Verify a proof on `chain` and return what it proves.
    ///
    /// # Errors
    ///
    /// `ProofRejected` if the proof does not verify.
    fn verify_proof(&self, chain: &str, proof: &ExternalProof) -> Result<ProofData>;
}
