//! # Liquidation Pool
//!
//! Collateral seized by liquidation by rates, per portal token, together with
//! the public token amount it was seized against. Users redeem public tokens
//! from the pool for a proportional share of the collateral.

use crate::error::{PortalError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Pool entry of one portal token.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationPoolEntry {
    /// Seized collateral by collateral token (PRV included).
    pub collateral_amounts: BTreeMap<String, u64>,
    /// Public tokens the collateral was seized against.
    pub pub_token_amount: u64,
}

impl LiquidationPoolEntry {
    /// Check if the entry holds nothing redeemable.
    pub fn is_empty(&self) -> bool {
        self.pub_token_amount == 0 || self.collateral_amounts.values().all(|v| *v == 0)
    }
}

/// Liquidation pool.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationPool {
    /// Portal token id -> entry.
    pub entries: BTreeMap<String, LiquidationPoolEntry>,
}

impl LiquidationPool {
    /// Entry of a portal token.
    pub fn entry(&self, token_id: &str) -> Option<&LiquidationPoolEntry> {
        self.entries.get(token_id)
    }

    /// Add seized collateral.
    pub fn add(
        &mut self,
        token_id: &str,
        pub_token_amount: u64,
        collaterals: &BTreeMap<String, u64>,
    ) -> Result<()> {
        let entry = self.entries.entry(token_id.to_string()).or_default();
        entry.pub_token_amount = entry
            .pub_token_amount
            .checked_add(pub_token_amount)
            .ok_or(PortalError::ArithmeticOverflow("liquidation pool"))?;
        for (collateral, amount) in collaterals {
            let slot = entry.collateral_amounts.entry(collateral.clone()).or_insert(0);
            *slot = slot
                .checked_add(*amount)
                .ok_or(PortalError::ArithmeticOverflow("liquidation pool"))?;
        }
        Ok(())
    }

    /// Remove collateral redeemed by a user.
    pub fn withdraw(
        &mut self,
        token_id: &str,
        pub_token_amount: u64,
        collaterals: &BTreeMap<String, u64>,
    ) -> Result<()> {
        let entry = self
            .entries
            .get_mut(token_id)
            .ok_or_else(|| PortalError::LiquidationPoolEmpty(token_id.to_string()))?;

        let remaining_pub = entry.pub_token_amount.checked_sub(pub_token_amount).ok_or(
            PortalError::InsufficientBalance {
                what: "liquidation pool public tokens",
                available: entry.pub_token_amount,
                requested: pub_token_amount,
            },
        )?;

        let mut remaining = entry.collateral_amounts.clone();
        for (collateral, amount) in collaterals {
            let available = remaining.get(collateral).copied().unwrap_or(0);
            let left = available
                .checked_sub(*amount)
                .ok_or(PortalError::InsufficientBalance {
                    what: "liquidation pool collateral",
                    available,
                    requested: *amount,
                })?;
            remaining.insert(collateral.clone(), left);
        }

        entry.pub_token_amount = remaining_pub;
        entry.collateral_amounts = remaining;
        Ok(())
    }
}
