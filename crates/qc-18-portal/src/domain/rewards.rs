//! # Reward Bookkeeping

use crate::error::{PortalError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-custodian weights used to split epoch rewards.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedCollateralForRewards {
    /// Sum of all weights.
    pub total_locked_amount: u64,
    /// Custodian address -> weight (USD value held).
    pub locked_amount: BTreeMap<String, u64>,
}

impl LockedCollateralForRewards {
    /// Clear all weights at an epoch boundary.
    pub fn reset(&mut self) {
        self.total_locked_amount = 0;
        self.locked_amount.clear();
    }

    /// Add weight for a custodian.
    pub fn add(&mut self, custodian: &str, amount: u64) -> Result<()> {
        let slot = self.locked_amount.entry(custodian.to_string()).or_insert(0);
        *slot = slot
            .checked_add(amount)
            .ok_or(PortalError::ArithmeticOverflow("locked collateral for rewards"))?;
        self.total_locked_amount = self
            .total_locked_amount
            .checked_add(amount)
            .ok_or(PortalError::ArithmeticOverflow("locked collateral for rewards"))?;
        Ok(())
    }
}

/// Rewards credited to one custodian.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardInfo {
    /// Custodian incognito address.
    pub custodian_address: String,
    /// Token id -> amount.
    pub rewards: BTreeMap<String, u64>,
}

/// Accumulates rewards per custodian and token.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RewardLedger {
    entries: BTreeMap<String, BTreeMap<String, u64>>,
}

impl RewardLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` of `token` to `custodian`.
    pub fn credit(&mut self, custodian: &str, token: &str, amount: u64) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let slot = self
            .entries
            .entry(custodian.to_string())
            .or_default()
            .entry(token.to_string())
            .or_insert(0);
        *slot = slot
            .checked_add(amount)
            .ok_or(PortalError::ArithmeticOverflow("reward ledger"))?;
        Ok(())
    }

    /// Rewards in custodian order.
    pub fn into_infos(self) -> Vec<RewardInfo> {
        self.entries
            .into_iter()
            .map(|(custodian_address, rewards)| RewardInfo {
                custodian_address,
                rewards,
            })
            .collect()
    }
}
