//! In-memory portal state store.

use crate::domain::ObjectKey;
use crate::error::Result;
use crate::ports::outbound::{PortalStateStore, StateRoot};
use sha3::{Digest, Keccak256};
use std::collections::BTreeMap;
use tracing::debug;

/// State store backed by an ordered map.
///
/// The root is a Keccak-256 over every entry in key order, so two stores
/// holding the same entries always commit to the same root.
#[derive(Clone, Debug, Default)]
pub struct InMemoryPortalStore {
    entries: BTreeMap<ObjectKey, Vec<u8>>,
    pending_writes: usize,
    commits: u64,
}

impl InMemoryPortalStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of commits so far.
    pub fn commits(&self) -> u64 {
        self.commits
    }

    fn root(&self) -> StateRoot {
        let mut hasher = Keccak256::new();
        for (key, value) in &self.entries {
            hasher.update(key.0);
            hasher.update((value.len() as u64).to_be_bytes());
            hasher.update(value);
        }
        let mut root = [0u8; 32];
        root.copy_from_slice(&hasher.finalize());
        root
    }
}

impl PortalStateStore for InMemoryPortalStore {
    fn get(&self, key: &ObjectKey) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: ObjectKey, value: Vec<u8>) -> Result<()> {
        self.entries.insert(key, value);
        self.pending_writes += 1;
        Ok(())
    }

    fn delete(&mut self, key: &ObjectKey) -> Result<()> {
        if self.entries.remove(key).is_some() {
            self.pending_writes += 1;
        }
        Ok(())
    }

    fn iter_prefix(&self, prefix: &[u8]) -> Result<Vec<(ObjectKey, Vec<u8>)>> {
        Ok(self
            .entries
            .iter()
            .filter(|(key, _)| key.0.starts_with(prefix))
            .map(|(key, value)| (*key, value.clone()))
            .collect())
    }

    fn commit(&mut self) -> Result<StateRoot> {
        let root = self.root();
        self.commits += 1;
        debug!(
            "[qc-18] Commit #{}: {} writes, {} entries",
            self.commits,
            self.pending_writes,
            self.entries.len()
        );
        self.pending_writes = 0;
        Ok(root)
    }
}
