//! # Collateral Calculations
//!
//! How much collateral to lock, unlock or seize for a custodian. Everything
//! here is read-only over the state: callers put the results into
//! instructions, and the apply step moves the amounts.
//!
//! Collateral locked for a waiting porting request is excluded from the
//! amounts backing a custodian's held public tokens, since that collateral
//! backs tokens not yet minted.

use super::exchange_tool::{to_u64, PortalExchangeRateTool};
use super::percent::up_percent;
use crate::domain::{CurrentPortalState, CustodianState};
use crate::error::{PortalError, Result};
use primitive_types::U256;
use std::collections::BTreeMap;

/// Collateral selected to cover a USD value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CollateralSelection {
    /// Amount per collateral token.
    pub amounts: BTreeMap<String, u64>,
    /// USD value the available collateral could not cover.
    pub uncovered_usd: u64,
}

/// Seized and returned collateral of one liquidation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LiquidationAmounts {
    /// Collateral taken from the custodian.
    pub liquidated: BTreeMap<String, u64>,
    /// Collateral unlocked back to the custodian's free balance.
    pub remain_unlock: BTreeMap<String, u64>,
}

/// Collateral a custodian has locked in waiting porting requests of `token`.
pub fn locked_in_waiting_portings(
    state: &CurrentPortalState,
    custodian: &str,
    token: &str,
) -> Result<BTreeMap<String, u64>> {
    let mut sums: BTreeMap<String, u64> = BTreeMap::new();
    let matches = state
        .waiting_porting_requests
        .values()
        .filter(|req| req.token_id == token)
        .filter_map(|req| req.custodian(custodian));
    for matched in matches {
        for (collateral, amount) in &matched.locked_amount_collateral {
            let slot = sums.entry(collateral.clone()).or_insert(0);
            *slot = slot
                .checked_add(*amount)
                .ok_or(PortalError::ArithmeticOverflow("waiting porting locks"))?;
        }
    }
    Ok(sums)
}

/// Locked collateral backing a custodian's held public tokens of `token`.
pub fn backing_collateral(
    state: &CurrentPortalState,
    custodian: &CustodianState,
    token: &str,
) -> Result<BTreeMap<String, u64>> {
    let in_waiting = locked_in_waiting_portings(state, &custodian.incognito_address, token)?;
    let mut backing = BTreeMap::new();
    if let Some(locked) = custodian.locked_collaterals.get(token) {
        for (collateral, amount) in locked {
            let reserved = in_waiting.get(collateral).copied().unwrap_or(0);
            let left = amount
                .checked_sub(reserved)
                .ok_or_else(|| PortalError::CorruptedState {
                    reason: format!(
                        "custodian {} locks {} of {} but waiting portings reserve {}",
                        custodian.incognito_address, amount, collateral, reserved
                    ),
                })?;
            if left > 0 {
                backing.insert(collateral.clone(), left);
            }
        }
    }
    Ok(backing)
}

/// Public tokens a custodian is responsible for: holdings plus amounts
/// matched in waiting and matched redeem requests.
pub fn total_hold(state: &CurrentPortalState, custodian: &CustodianState, token: &str) -> u64 {
    let address = custodian.incognito_address.as_str();
    let in_redeems: u64 = state
        .waiting_redeem_requests
        .values()
        .chain(state.matched_redeem_requests.values())
        .filter(|req| req.token_id == token)
        .filter_map(|req| req.custodian(address))
        .map(|c| c.amount)
        .sum();
    custodian.holding(token).saturating_add(in_redeems)
}

/// Public tokens a custodian is matched to in waiting porting requests.
pub fn matched_in_waiting_portings(
    state: &CurrentPortalState,
    custodian: &str,
    token: &str,
) -> u64 {
    state
        .waiting_porting_requests
        .values()
        .filter(|req| req.token_id == token)
        .filter_map(|req| req.custodian(custodian))
        .map(|c| c.amount)
        .fold(0u64, u64::saturating_add)
}

/// Free collateral of a custodian in USD.
pub fn free_collateral_usd(tool: &PortalExchangeRateTool, custodian: &CustodianState) -> Result<u64> {
    tool.total_usd(&custodian.free_collaterals)
}

/// Pick collateral worth `usd` from `available`, following `order`.
///
/// Each token contributes the ceiling amount needed for what is still
/// uncovered, capped by what is available. Tokens without a rate are
/// skipped.
pub fn collaterals_for_usd(
    tool: &PortalExchangeRateTool,
    order: &[String],
    available: &BTreeMap<String, u64>,
    usd: u64,
) -> Result<CollateralSelection> {
    let mut remaining = usd;
    let mut amounts = BTreeMap::new();
    for token in order {
        if remaining == 0 {
            break;
        }
        let free = available.get(token).copied().unwrap_or(0);
        if free == 0 || !tool.has_rate(token) {
            continue;
        }
        let needed = tool.from_usd_ceil(token, remaining)?;
        let take = needed.min(free);
        if take == 0 {
            continue;
        }
        remaining = if take == needed {
            0
        } else {
            remaining.saturating_sub(tool.to_usd(token, take)?)
        };
        amounts.insert(token.clone(), take);
    }
    Ok(CollateralSelection {
        amounts,
        uncovered_usd: remaining,
    })
}

/// Collateral to unlock when a custodian returns `redeem_amount` public tokens.
///
/// `unlockUSD = redeem_amount * backingUSD / totalHold`. Returning the whole
/// hold unlocks all backing collateral.
pub fn unlock_amounts_after_redeem(
    state: &CurrentPortalState,
    tool: &PortalExchangeRateTool,
    order: &[String],
    custodian: &CustodianState,
    token: &str,
    redeem_amount: u64,
) -> Result<BTreeMap<String, u64>> {
    let backing = backing_collateral(state, custodian, token)?;
    let hold = total_hold(state, custodian, token);
    if redeem_amount >= hold {
        return Ok(backing);
    }
    let unlock_usd = proportional_usd(tool, &backing, redeem_amount, hold)?;
    Ok(collaterals_for_usd(tool, order, &backing, unlock_usd)?.amounts)
}

/// Collateral to seize when `amount` public tokens of a custodian are
/// liquidated.
///
/// The seized value is `min(toUSD(amount * max_percent / 100), unlockUSD)`;
/// the rest of `unlockUSD` goes back to the custodian.
pub fn liquidation_amounts(
    state: &CurrentPortalState,
    tool: &PortalExchangeRateTool,
    order: &[String],
    custodian: &CustodianState,
    token: &str,
    amount: u64,
    max_percent: u64,
) -> Result<LiquidationAmounts> {
    let backing = backing_collateral(state, custodian, token)?;
    let hold = total_hold(state, custodian, token);
    if hold == 0 {
        return Err(PortalError::DivisionByZero("liquidation hold"));
    }
    let full = amount >= hold;
    let unlock_usd = if full {
        tool.total_usd(&backing)?
    } else {
        proportional_usd(tool, &backing, amount, hold)?
    };
    let liquidated_usd = tool
        .to_usd(token, up_percent(amount, max_percent)?)?
        .min(unlock_usd);

    let liquidated = collaterals_for_usd(tool, order, &backing, liquidated_usd)?.amounts;
    let mut rest = backing;
    for (collateral, seized) in &liquidated {
        if let Some(slot) = rest.get_mut(collateral) {
            *slot = slot.saturating_sub(*seized);
        }
    }
    rest.retain(|_, v| *v > 0);

    let remain_unlock = if full {
        rest
    } else {
        collaterals_for_usd(tool, order, &rest, unlock_usd - liquidated_usd)?.amounts
    };
    Ok(LiquidationAmounts {
        liquidated,
        remain_unlock,
    })
}

/// Backing collateral over held value, in percent. `None` if nothing is held.
pub fn collateral_ratio(
    state: &CurrentPortalState,
    tool: &PortalExchangeRateTool,
    custodian: &CustodianState,
    token: &str,
) -> Result<Option<u64>> {
    let hold = total_hold(state, custodian, token);
    if hold == 0 {
        return Ok(None);
    }
    let hold_usd = tool.to_usd(token, hold)?;
    if hold_usd == 0 {
        return Ok(None);
    }
    let backing_usd = tool.total_usd(&backing_collateral(state, custodian, token)?)?;
    let ratio = U256::from(backing_usd) * U256::from(100u64) / U256::from(hold_usd);
    Ok(Some(to_u64(ratio, "collateral_ratio")?))
}

/// Amount of `collateral` a custodian must top up to bring `token` back to
/// `min_percent`.
pub fn top_up_amount_needed(
    state: &CurrentPortalState,
    tool: &PortalExchangeRateTool,
    custodian: &CustodianState,
    token: &str,
    collateral: &str,
    min_percent: u64,
) -> Result<u64> {
    let hold = total_hold(state, custodian, token);
    let required_usd = tool.to_usd(token, up_percent(hold, min_percent)?)?;
    let backing_usd = tool.total_usd(&backing_collateral(state, custodian, token)?)?;
    let deficit = required_usd.saturating_sub(backing_usd);
    if deficit == 0 {
        return Ok(0);
    }
    tool.from_usd_ceil(collateral, deficit)
}

fn proportional_usd(
    tool: &PortalExchangeRateTool,
    backing: &BTreeMap<String, u64>,
    amount: u64,
    hold: u64,
) -> Result<u64> {
    if hold == 0 {
        return Err(PortalError::DivisionByZero("total hold"));
    }
    let backing_usd = tool.total_usd(backing)?;
    to_u64(
        U256::from(amount) * U256::from(backing_usd) / U256::from(hold),
        "proportional unlock",
    )
}
