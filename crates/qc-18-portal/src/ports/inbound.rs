//! # Inbound Ports
//!
//! What the beacon chain asks of the portal: build the instructions of a new
//! block, and apply the instructions of an accepted one.

use super::outbound::StateRoot;
use crate::error::Result;
use crate::instructions::{Instruction, PortalAction};
use std::collections::BTreeMap;

/// Portal API - inbound port.
pub trait PortalBlockHandler {
    /// Build the portal instructions of the block after `beacon_height`.
    ///
    /// `actions` are the portal actions collected from shard blocks, in
    /// arrival order. `epoch_rewards` is the amount per token to share among
    /// custodians; empty outside epoch boundaries.
    fn produce_block(
        &mut self,
        beacon_height: u64,
        actions: &[PortalAction],
        epoch_rewards: &BTreeMap<String, u64>,
    ) -> Result<Vec<Instruction>>;

    /// Apply the portal instructions of the block after `beacon_height` and
    /// commit the result.
    fn apply_block(&mut self, beacon_height: u64, insts: &[Instruction]) -> Result<StateRoot>;
}
