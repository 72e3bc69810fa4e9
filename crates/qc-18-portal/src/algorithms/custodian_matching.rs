//! # Custodian Matching
//!
//! Choosing custodians for porting and redeem requests.
//!
//! Porting: custodians with a remote address for the token are ranked by free
//! collateral value (descending, then address). If the richest one covers the
//! over-collateralized value alone, the smallest single custodian that still
//! covers it is used; otherwise custodians are taken greedily. Every greedy
//! contributor is matched to at least one unit of the token.
//!
//! Redeem: custodians holding the token are taken from the largest holding
//! down until the amount is covered.

use super::collateral::{collaterals_for_usd, free_collateral_usd};
use super::exchange_tool::{to_u64, PortalExchangeRateTool};
use super::percent::up_percent;
use crate::config::PortalParams;
use crate::domain::{
    CurrentPortalState, CustodianState, MatchingPortingCustodian, MatchingRedeemCustodian,
    RedeemRequest,
};
use crate::error::{PortalError, Result};
use primitive_types::U256;

/// Match custodians to a porting request of `amount` of `token`.
///
/// The returned custodians' amounts add up to `amount` exactly, and each
/// carries the collateral it must lock (PRV first).
pub fn pick_custodians_for_porting(
    state: &CurrentPortalState,
    tool: &PortalExchangeRateTool,
    params: &PortalParams,
    token: &str,
    amount: u64,
) -> Result<Vec<MatchingPortingCustodian>> {
    let required_usd = tool.to_usd(
        token,
        up_percent(amount, params.min_percent_locked_collateral)?,
    )?;
    if required_usd == 0 {
        return Err(PortalError::InvalidAmount(format!(
            "porting amount {} has no collateral value",
            amount
        )));
    }

    let mut candidates: Vec<(&CustodianState, &str, u64)> = Vec::new();
    for custodian in state.custodian_pool.values() {
        let Some(remote) = custodian.remote_address(token) else {
            continue;
        };
        let free_usd = free_collateral_usd(tool, custodian)?;
        if free_usd > 0 {
            candidates.push((custodian, remote, free_usd));
        }
    }
    candidates.sort_by(|a, b| {
        b.2.cmp(&a.2)
            .then_with(|| a.0.incognito_address.cmp(&b.0.incognito_address))
    });

    let not_enough = || PortalError::NotEnoughCustodians {
        token: token.to_string(),
        amount,
    };

    // (custodian, remote address, USD contribution)
    let mut contributions: Vec<(&CustodianState, &str, u64)> = Vec::new();
    match candidates.first() {
        None => return Err(not_enough()),
        Some((_, _, top)) if *top >= required_usd => {
            let (custodian, remote, _) = candidates
                .iter()
                .rev()
                .find(|(_, _, free)| *free >= required_usd)
                .ok_or_else(not_enough)?;
            contributions.push((*custodian, *remote, required_usd));
        }
        Some(_) => {
            let mut remaining = required_usd;
            for (custodian, remote, free_usd) in &candidates {
                if remaining == 0 {
                    break;
                }
                let take = (*free_usd).min(remaining);
                contributions.push((*custodian, *remote, take));
                remaining -= take;
            }
            if remaining > 0 {
                return Err(not_enough());
            }
        }
    }

    let mut amounts: Vec<u64> = contributions
        .iter()
        .map(|(_, _, usd)| {
            to_u64(
                U256::from(*usd) * U256::from(amount) / U256::from(required_usd),
                "porting match amount",
            )
        })
        .collect::<Result<_>>()?;
    let assigned: u64 = amounts.iter().sum();
    if let Some(first) = amounts.first_mut() {
        *first += amount - assigned;
    }
    // a contributor whose share truncates to zero still locks its collateral,
    // so it gets one unit from the first (largest) share
    let zero_shares = amounts.iter().skip(1).filter(|share| **share == 0).count() as u64;
    if zero_shares > 0 {
        if amounts[0] <= zero_shares {
            return Err(not_enough());
        }
        amounts[0] -= zero_shares;
        for share in amounts.iter_mut().skip(1).filter(|share| **share == 0) {
            *share = 1;
        }
    }

    let order = params.collateral_order();
    let mut matched = Vec::with_capacity(contributions.len());
    for ((custodian, remote, usd), share) in contributions.into_iter().zip(amounts) {
        let selection = collaterals_for_usd(tool, &order, &custodian.free_collaterals, usd)?;
        if selection.uncovered_usd > 0 {
            return Err(not_enough());
        }
        matched.push(MatchingPortingCustodian {
            incognito_address: custodian.incognito_address.clone(),
            remote_address: remote.to_string(),
            amount: share,
            locked_amount_collateral: selection.amounts,
        });
    }
    Ok(matched)
}

/// Pick custodians to cover the unmatched part of a redeem request.
///
/// Custodians already on the request are not picked again.
pub fn pick_custodians_for_redeem(
    state: &CurrentPortalState,
    req: &RedeemRequest,
) -> Result<Vec<MatchingRedeemCustodian>> {
    let token = req.token_id.as_str();
    let mut remaining = req.remaining_amount();

    let mut holders: Vec<&CustodianState> = state
        .custodian_pool
        .values()
        .filter(|c| c.holding(token) > 0)
        .filter(|c| req.custodian(&c.incognito_address).is_none())
        .collect();
    holders.sort_by(|a, b| {
        a.holding(token)
            .cmp(&b.holding(token))
            .then_with(|| a.incognito_address.cmp(&b.incognito_address))
    });

    let mut picked = Vec::new();
    for custodian in holders.into_iter().rev() {
        if remaining == 0 {
            break;
        }
        let remote = custodian
            .remote_address(token)
            .ok_or_else(|| PortalError::MissingRemoteAddress {
                custodian: custodian.incognito_address.clone(),
                token: token.to_string(),
            })?;
        let take = custodian.holding(token).min(remaining);
        picked.push(MatchingRedeemCustodian {
            incognito_address: custodian.incognito_address.clone(),
            remote_address: remote.to_string(),
            amount: take,
        });
        remaining -= take;
    }

    if remaining > 0 {
        return Err(PortalError::NotEnoughCustodians {
            token: token.to_string(),
            amount: remaining,
        });
    }
    Ok(picked)
}

/// Amount a volunteering custodian takes on a waiting redeem request, and
/// whether that completes the match.
pub fn match_custodian_to_waiting_redeem(
    req: &RedeemRequest,
    custodian: &CustodianState,
) -> Result<(u64, bool)> {
    let address = custodian.incognito_address.as_str();
    if req.custodian(address).is_some() {
        return Err(PortalError::DuplicateId(format!(
            "custodian {} already matched to redeem {}",
            address, req.unique_redeem_id
        )));
    }
    let needed = req.remaining_amount();
    if needed == 0 {
        return Err(PortalError::InvalidAmount(format!(
            "redeem {} is already fully matched",
            req.unique_redeem_id
        )));
    }
    if custodian.remote_address(&req.token_id).is_none() {
        return Err(PortalError::MissingRemoteAddress {
            custodian: address.to_string(),
            token: req.token_id.clone(),
        });
    }
    let holding = custodian.holding(&req.token_id);
    if holding == 0 {
        return Err(PortalError::InsufficientBalance {
            what: "holding public tokens",
            available: 0,
            requested: needed,
        });
    }
    if holding >= needed {
        Ok((needed, true))
    } else {
        Ok((holding, false))
    }
}
