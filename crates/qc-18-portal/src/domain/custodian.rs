//! # Custodian
//!
//! Collateral book of one custodian.
//!
//! Collateral is tracked per collateral token. Locked collateral is further
//! split by the portal token it backs: `locked[portal_token][collateral]`.
//! For every collateral token `free + sum(locked) == total`.

use crate::error::{PortalError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One custodian's collateral book.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodianState {
    /// Incognito address, also the custodian's identity.
    pub incognito_address: String,
    /// Total collateral per collateral token.
    pub total_collaterals: BTreeMap<String, u64>,
    /// Free collateral per collateral token.
    pub free_collaterals: BTreeMap<String, u64>,
    /// Locked collateral: portal token -> collateral token -> amount.
    pub locked_collaterals: BTreeMap<String, BTreeMap<String, u64>>,
    /// Public tokens the custodian holds on behalf of porters.
    pub holding_public_tokens: BTreeMap<String, u64>,
    /// Remote (external chain) address per portal token.
    pub remote_addresses: BTreeMap<String, String>,
    /// Accumulated reward balance per token.
    pub reward_amounts: BTreeMap<String, u64>,
}

impl CustodianState {
    /// Create an empty custodian.
    pub fn new(incognito_address: impl Into<String>) -> Self {
        Self {
            incognito_address: incognito_address.into(),
            ..Self::default()
        }
    }

    /// Total collateral of a token.
    pub fn total(&self, collateral: &str) -> u64 {
        self.total_collaterals.get(collateral).copied().unwrap_or(0)
    }

    /// Free collateral of a token.
    pub fn free(&self, collateral: &str) -> u64 {
        self.free_collaterals.get(collateral).copied().unwrap_or(0)
    }

    /// Collateral locked for one portal token.
    pub fn locked(&self, portal_token: &str, collateral: &str) -> u64 {
        self.locked_collaterals
            .get(portal_token)
            .and_then(|m| m.get(collateral))
            .copied()
            .unwrap_or(0)
    }

    /// Collateral of a token locked across all portal tokens.
    pub fn locked_total(&self, collateral: &str) -> u64 {
        self.locked_collaterals
            .values()
            .filter_map(|m| m.get(collateral))
            .sum()
    }

    /// Public tokens held for a portal token.
    pub fn holding(&self, portal_token: &str) -> u64 {
        self.holding_public_tokens
            .get(portal_token)
            .copied()
            .unwrap_or(0)
    }

    /// Reward balance of a token.
    pub fn reward(&self, token: &str) -> u64 {
        self.reward_amounts.get(token).copied().unwrap_or(0)
    }

    /// Remote address for a portal token.
    pub fn remote_address(&self, portal_token: &str) -> Option<&str> {
        self.remote_addresses.get(portal_token).map(String::as_str)
    }

    /// Check if every collateral total is zero.
    pub fn is_collateral_empty(&self) -> bool {
        self.total_collaterals.values().all(|v| *v == 0)
    }

    /// Merge remote addresses from a deposit.
    ///
    /// A custodian with no collateral takes the new set as is; otherwise only
    /// portal tokens it has no address for yet are added.
    pub fn update_remote_addresses(&mut self, addresses: &BTreeMap<String, String>) {
        if self.is_collateral_empty() {
            self.remote_addresses = addresses.clone();
            return;
        }
        for (token, address) in addresses {
            self.remote_addresses
                .entry(token.clone())
                .or_insert_with(|| address.clone());
        }
    }

    /// Add new collateral: `total` and `free` both grow.
    pub fn deposit(&mut self, collateral: &str, amount: u64) -> Result<()> {
        let total = checked_add(self.total(collateral), amount, "custodian deposit")?;
        let free = checked_add(self.free(collateral), amount, "custodian deposit")?;
        self.total_collaterals.insert(collateral.to_string(), total);
        self.free_collaterals.insert(collateral.to_string(), free);
        Ok(())
    }

    /// Remove free collateral: `total` and `free` both shrink.
    pub fn withdraw(&mut self, collateral: &str, amount: u64) -> Result<()> {
        let free = checked_sub(self.free(collateral), amount, "free collateral")?;
        let total = checked_sub(self.total(collateral), amount, "total collateral")?;
        self.free_collaterals.insert(collateral.to_string(), free);
        self.total_collaterals.insert(collateral.to_string(), total);
        Ok(())
    }

    /// Move free collateral into the lock of a portal token.
    pub fn lock(&mut self, portal_token: &str, collateral: &str, amount: u64) -> Result<()> {
        let free = checked_sub(self.free(collateral), amount, "free collateral")?;
        let locked = checked_add(self.locked(portal_token, collateral), amount, "lock")?;
        self.free_collaterals.insert(collateral.to_string(), free);
        self.set_locked(portal_token, collateral, locked);
        Ok(())
    }

    /// Move locked collateral back to free.
    pub fn unlock(&mut self, portal_token: &str, collateral: &str, amount: u64) -> Result<()> {
        let locked = checked_sub(
            self.locked(portal_token, collateral),
            amount,
            "locked collateral",
        )?;
        let free = checked_add(self.free(collateral), amount, "unlock")?;
        self.set_locked(portal_token, collateral, locked);
        self.free_collaterals.insert(collateral.to_string(), free);
        Ok(())
    }

    /// Take locked collateral out of the book: `locked` and `total` shrink.
    pub fn seize(&mut self, portal_token: &str, collateral: &str, amount: u64) -> Result<()> {
        let locked = checked_sub(
            self.locked(portal_token, collateral),
            amount,
            "locked collateral",
        )?;
        let total = checked_sub(self.total(collateral), amount, "total collateral")?;
        self.set_locked(portal_token, collateral, locked);
        self.total_collaterals.insert(collateral.to_string(), total);
        Ok(())
    }

    /// Increase held public tokens.
    pub fn add_holding(&mut self, portal_token: &str, amount: u64) -> Result<()> {
        let holding = checked_add(self.holding(portal_token), amount, "holding")?;
        self.holding_public_tokens
            .insert(portal_token.to_string(), holding);
        Ok(())
    }

    /// Decrease held public tokens.
    pub fn sub_holding(&mut self, portal_token: &str, amount: u64) -> Result<()> {
        let holding = checked_sub(self.holding(portal_token), amount, "holding public tokens")?;
        self.holding_public_tokens
            .insert(portal_token.to_string(), holding);
        Ok(())
    }

    /// Credit a reward.
    pub fn add_reward(&mut self, token: &str, amount: u64) -> Result<()> {
        let reward = checked_add(self.reward(token), amount, "reward")?;
        self.reward_amounts.insert(token.to_string(), reward);
        Ok(())
    }

    /// Zero a reward balance, returning what it held.
    pub fn take_reward(&mut self, token: &str) -> u64 {
        self.reward_amounts.remove(token).unwrap_or(0)
    }

    /// Verify `free + locked == total` for every collateral token.
    pub fn check_balances(&self) -> Result<()> {
        let mut tokens: Vec<&String> = self.total_collaterals.keys().collect();
        tokens.extend(self.free_collaterals.keys());
        tokens.extend(self.locked_collaterals.values().flat_map(|m| m.keys()));
        tokens.sort();
        tokens.dedup();

        for token in tokens {
            let sum = u128::from(self.free(token)) + u128::from(self.locked_total(token));
            if sum != u128::from(self.total(token)) {
                return Err(PortalError::CorruptedState {
                    reason: format!(
                        "custodian {} collateral {}: free {} + locked {} != total {}",
                        self.incognito_address,
                        token,
                        self.free(token),
                        self.locked_total(token),
                        self.total(token)
                    ),
                });
            }
        }
        Ok(())
    }

    fn set_locked(&mut self, portal_token: &str, collateral: &str, amount: u64) {
        let by_token = self
            .locked_collaterals
            .entry(portal_token.to_string())
            .or_default();
        if amount == 0 {
            by_token.remove(collateral);
        } else {
            by_token.insert(collateral.to_string(), amount);
        }
        if by_token.is_empty() {
            self.locked_collaterals.remove(portal_token);
        }
    }
}

fn checked_add(a: u64, b: u64, context: &'static str) -> Result<u64> {
    a.checked_add(b).ok_or(PortalError::ArithmeticOverflow(context))
}

fn checked_sub(available: u64, requested: u64, what: &'static str) -> Result<u64> {
    available
        .checked_sub(requested)
        .ok_or(PortalError::InsufficientBalance {
            what,
            available,
            requested,
        })
}
