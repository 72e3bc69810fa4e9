//! # Domain Invariants
//!
//! Accounting rules every committed portal state satisfies.

use super::custodian::CustodianState;
use super::requests::{RedeemRequest, WaitingPortingRequest};
use super::state::CurrentPortalState;
use crate::error::{PortalError, Result};
use std::collections::BTreeSet;

/// Invariant: `free + locked == total` for every collateral token.
pub fn invariant_collateral_balance(custodian: &CustodianState) -> Result<()> {
    custodian.check_balances()
}

/// Invariant: a fee split distributes exactly the fee.
pub fn invariant_fee_split_exact(fee: u64, shares: &[u64]) -> bool {
    shares.iter().map(|s| u128::from(*s)).sum::<u128>() == u128::from(fee)
}

/// Invariant: porting custodians cover the requested amount exactly.
pub fn invariant_porting_fully_matched(req: &WaitingPortingRequest) -> bool {
    !req.custodians.is_empty() && req.matched_amount() == req.amount
}

/// Invariant: redeem matches never exceed the request and list each
/// custodian once.
pub fn invariant_redeem_matching(req: &RedeemRequest) -> bool {
    let unique: BTreeSet<&str> = req
        .custodians
        .iter()
        .map(|c| c.incognito_address.as_str())
        .collect();
    unique.len() == req.custodians.len() && req.matched_amount() <= req.redeem_amount
}

/// Check the whole aggregate. Used before a block's state is stored.
///
/// # Errors
///
/// `CorruptedState` naming the first violation found.
pub fn invariant_state(state: &CurrentPortalState) -> Result<()> {
    for custodian in state.custodian_pool.values() {
        invariant_collateral_balance(custodian)?;
    }

    for (id, req) in &state.waiting_porting_requests {
        if !invariant_porting_fully_matched(req) {
            return Err(corrupted(format!("waiting porting {} not fully matched", id)));
        }
    }

    for (id, req) in &state.waiting_redeem_requests {
        if !invariant_redeem_matching(req) {
            return Err(corrupted(format!("waiting redeem {} over-matched", id)));
        }
        if state.matched_redeem_requests.contains_key(id) {
            return Err(corrupted(format!("redeem {} both waiting and matched", id)));
        }
    }

    for (id, req) in &state.matched_redeem_requests {
        if !invariant_redeem_matching(req) {
            return Err(corrupted(format!("matched redeem {} over-matched", id)));
        }
    }
    Ok(())
}

fn corrupted(reason: String) -> PortalError {
    PortalError::CorruptedState { reason }
}
