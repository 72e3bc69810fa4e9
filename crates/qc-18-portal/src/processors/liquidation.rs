//! # Liquidation
//!
//! Three ways collateral leaves a custodian without being unlocked back:
//!
//! - runaway: a matched redeem was not paid in time; the custodian's share
//!   is paid to the redeemer out of its collateral
//! - by rates: the custodian's collateral ratio fell to TP120; its held
//!   public tokens and the matching collateral move to the liquidation pool
//! - the pool itself: users burn public tokens against pooled collateral
//!
//! Seizing is capped at `max_percent_liquidated_collateral_amount` of the
//! public tokens' value; the rest of the proportional collateral goes back
//! to the custodian's free balance.

use super::redeem::cancel_waiting_redeem;
use super::{accept_or_reject, unexpected, BlockContext, PortalActionProcessor, PreparedData};
use crate::algorithms::exchange_tool::to_u64;
use crate::algorithms::{
    collateral_ratio, collaterals_for_usd, liquidation_amounts, top_up_amount_needed,
    LiquidationAmounts, PortalExchangeRateTool,
};
use crate::config::PortalParams;
use crate::domain::{CurrentPortalState, StatusKind};
use crate::error::{PortalError, Result};
use crate::instructions::{
    status, ActionPayload, Instruction, LiquidateCustodianContent, LiquidationByRatesContent,
    LiquidationWarningContent, MetaType, PortalAction, RedeemFromLiquidationPoolAction,
    RedeemFromLiquidationPoolContent,
};
use crate::PRV_ID;
use primitive_types::U256;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Seize `liquidated` and unlock `remain_unlock` from a custodian's lock on
/// `token`.
fn settle_liquidation(
    state: &mut CurrentPortalState,
    custodian: &str,
    token: &str,
    liquidated: &BTreeMap<String, u64>,
    remain_unlock: &BTreeMap<String, u64>,
) -> Result<()> {
    let custodian = state.custodian_mut(custodian)?;
    for (collateral, amount) in liquidated {
        custodian.seize(token, collateral, *amount)?;
    }
    for (collateral, amount) in remain_unlock {
        custodian.unlock(token, collateral, *amount)?;
    }
    Ok(())
}

/// Liquidation of custodians that did not pay a matched redeem in time.
pub struct RunawayLiquidationProcessor;

impl PortalActionProcessor for RunawayLiquidationProcessor {
    fn meta_type(&self) -> MetaType {
        MetaType::LiquidateCustodian
    }

    fn synthesize_insts(
        &self,
        ctx: &BlockContext<'_>,
        state: &CurrentPortalState,
    ) -> Result<Vec<Instruction>> {
        let overdue: Vec<_> = state
            .matched_redeem_requests
            .values()
            .filter(|req| {
                PortalParams::is_timed_out(
                    ctx.beacon_height,
                    req.beacon_height,
                    ctx.params.timeout_custodian_return_pub_token,
                )
            })
            .cloned()
            .collect();
        if overdue.is_empty() {
            return Ok(Vec::new());
        }

        let tool = ctx.exchange_tool(state);
        let order = ctx.params.collateral_order();
        let mut scratch = state.clone();
        let mut insts = Vec::new();
        for req in overdue {
            for matched in &req.custodians {
                let amounts = scratch
                    .custodian(&matched.incognito_address)
                    .and_then(|custodian| {
                        liquidation_amounts(
                            &scratch,
                            &tool,
                            &order,
                            custodian,
                            &req.token_id,
                            matched.amount,
                            ctx.params.max_percent_liquidated_collateral_amount,
                        )
                    });
                let LiquidationAmounts {
                    liquidated,
                    remain_unlock,
                } = match amounts {
                    Ok(amounts) => amounts,
                    Err(e) if e.is_skippable() => {
                        warn!(
                            parent: &ctx.span,
                            error = %e,
                            "[qc-18] Cannot liquidate {} for redeem {}",
                            matched.incognito_address,
                            req.unique_redeem_id
                        );
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                let inst = Instruction::beacon(
                    self.meta_type(),
                    status::ACCEPTED,
                    &LiquidateCustodianContent {
                        unique_redeem_id: req.unique_redeem_id.clone(),
                        token_id: req.token_id.clone(),
                        custodian_address: matched.incognito_address.clone(),
                        redeemer_address: req.redeemer_address.clone(),
                        liquidated_pub_token_amount: matched.amount,
                        liquidated_collaterals: liquidated,
                        remain_unlock_collaterals: remain_unlock,
                        shard_id: req.shard_id,
                    },
                )?;
                self.process_insts(ctx, &mut scratch, &inst)?;
                insts.push(inst);
            }
        }
        Ok(insts)
    }

    fn process_insts(
        &self,
        ctx: &BlockContext<'_>,
        state: &mut CurrentPortalState,
        inst: &Instruction,
    ) -> Result<()> {
        if inst.status != status::ACCEPTED {
            return Err(inst.unknown_status());
        }
        let content: LiquidateCustodianContent = inst.decode()?;
        settle_liquidation(
            state,
            &content.custodian_address,
            &content.token_id,
            &content.liquidated_collaterals,
            &content.remain_unlock_collaterals,
        )?;

        let id = &content.unique_redeem_id;
        let req = state
            .matched_redeem_requests
            .get_mut(id)
            .ok_or_else(|| PortalError::RedeemRequestNotFound(id.clone()))?;
        req.remove_custodian(&content.custodian_address)
            .ok_or_else(|| PortalError::CustodianNotFound(content.custodian_address.clone()))?;
        if req.custodians.is_empty() {
            state.matched_redeem_requests.remove(id);
        }

        warn!(
            parent: &ctx.span,
            "[qc-18] Custodian {} liquidated for redeem {}: {:?}",
            content.custodian_address, id, content.liquidated_collaterals
        );
        state.record_status(
            StatusKind::LiquidationRunaway,
            &format!("{}-{}", id, content.custodian_address),
            &inst.status,
            &content,
        )
    }
}

/// Liquidation and warnings driven by the collateral ratio.
pub struct LiquidationByRatesProcessor;

impl LiquidationByRatesProcessor {
    fn record_key(content_custodian: &str, token: &str, height: u64) -> String {
        format!("{}-{}-{}", content_custodian, token, height)
    }

    /// Instruction for one custodian and token, if its ratio calls for one.
    fn check_custodian(
        ctx: &BlockContext<'_>,
        scratch: &CurrentPortalState,
        tool: &PortalExchangeRateTool,
        address: &str,
        token: &str,
    ) -> Result<Option<Instruction>> {
        let custodian = scratch.custodian(address)?;
        let Some(ratio) = collateral_ratio(scratch, tool, custodian, token)? else {
            return Ok(None);
        };

        if ratio <= ctx.params.tp120 {
            let cancelled_redeem_ids: Vec<String> = scratch
                .waiting_redeem_requests
                .values()
                .filter(|req| req.token_id == token && req.custodian(address).is_some())
                .map(|req| req.unique_redeem_id.clone())
                .collect();
            let mut after = scratch.clone();
            for id in &cancelled_redeem_ids {
                cancel_waiting_redeem(&mut after, id)?;
            }
            let custodian = after.custodian(address)?;
            let liquidated_pub_token_amount = custodian.holding(token);
            if liquidated_pub_token_amount == 0 {
                return Ok(None);
            }
            let LiquidationAmounts {
                liquidated,
                remain_unlock,
            } = liquidation_amounts(
                &after,
                tool,
                &ctx.params.collateral_order(),
                custodian,
                token,
                liquidated_pub_token_amount,
                ctx.params.max_percent_liquidated_collateral_amount,
            )?;
            return Instruction::beacon(
                MetaType::LiquidateByRates,
                status::ACCEPTED,
                &LiquidationByRatesContent {
                    custodian_address: address.to_string(),
                    token_id: token.to_string(),
                    ratio,
                    cancelled_redeem_ids,
                    liquidated_pub_token_amount,
                    liquidated_collaterals: liquidated,
                    remain_unlock_collaterals: remain_unlock,
                },
            )
            .map(Some);
        }

        if ratio <= ctx.params.tp130 {
            let top_up_amount = top_up_amount_needed(
                scratch,
                tool,
                custodian,
                token,
                PRV_ID,
                ctx.params.min_percent_locked_collateral,
            )?;
            return Instruction::beacon(
                MetaType::LiquidateByRates,
                status::WARNING,
                &LiquidationWarningContent {
                    custodian_address: address.to_string(),
                    token_id: token.to_string(),
                    ratio,
                    top_up_amount,
                },
            )
            .map(Some);
        }
        Ok(None)
    }
}

impl PortalActionProcessor for LiquidationByRatesProcessor {
    fn meta_type(&self) -> MetaType {
        MetaType::LiquidateByRates
    }

    fn synthesize_insts(
        &self,
        ctx: &BlockContext<'_>,
        state: &CurrentPortalState,
    ) -> Result<Vec<Instruction>> {
        if state.final_exchange_rates.is_empty() {
            return Ok(Vec::new());
        }
        let tool = ctx.exchange_tool(state);
        let mut scratch = state.clone();
        let mut insts = Vec::new();
        let addresses: Vec<String> = state.custodian_pool.keys().cloned().collect();
        for address in &addresses {
            for token in ctx.params.portal_tokens.keys() {
                match Self::check_custodian(ctx, &scratch, &tool, address, token) {
                    Ok(Some(inst)) => {
                        self.process_insts(ctx, &mut scratch, &inst)?;
                        insts.push(inst);
                    }
                    Ok(None) => {}
                    Err(e) if e.is_skippable() => {
                        debug!(
                            parent: &ctx.span,
                            error = %e,
                            "[qc-18] Skipping ratio check of {} for {}",
                            address,
                            token
                        );
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(insts)
    }

    fn process_insts(
        &self,
        ctx: &BlockContext<'_>,
        state: &mut CurrentPortalState,
        inst: &Instruction,
    ) -> Result<()> {
        match inst.status.as_str() {
            status::ACCEPTED => {
                let content: LiquidationByRatesContent = inst.decode()?;
                for id in &content.cancelled_redeem_ids {
                    cancel_waiting_redeem(state, id)?;
                }
                state
                    .custodian_mut(&content.custodian_address)?
                    .sub_holding(&content.token_id, content.liquidated_pub_token_amount)?;
                settle_liquidation(
                    state,
                    &content.custodian_address,
                    &content.token_id,
                    &content.liquidated_collaterals,
                    &content.remain_unlock_collaterals,
                )?;
                state.liquidation_pool.add(
                    &content.token_id,
                    content.liquidated_pub_token_amount,
                    &content.liquidated_collaterals,
                )?;
                warn!(
                    parent: &ctx.span,
                    "[qc-18] Custodian {} liquidated at {}%: {} of {} moved to pool",
                    content.custodian_address,
                    content.ratio,
                    content.liquidated_pub_token_amount,
                    content.token_id
                );
                let key =
                    Self::record_key(&content.custodian_address, &content.token_id, ctx.new_height());
                state.record_status(StatusKind::LiquidationByRates, &key, &inst.status, &content)
            }
            status::WARNING => {
                let content: LiquidationWarningContent = inst.decode()?;
                debug!(
                    parent: &ctx.span,
                    "[qc-18] Custodian {} at {}% for {}, top up {} PRV",
                    content.custodian_address,
                    content.ratio,
                    content.token_id,
                    content.top_up_amount
                );
                let key =
                    Self::record_key(&content.custodian_address, &content.token_id, ctx.new_height());
                state.record_status(StatusKind::LiquidationByRates, &key, &inst.status, &content)
            }
            _ => Err(inst.unknown_status()),
        }
    }
}

/// Redeem of public tokens against pooled collateral.
pub struct RedeemFromLiquidationPoolProcessor;

impl RedeemFromLiquidationPoolProcessor {
    fn validate(
        ctx: &BlockContext<'_>,
        state: &CurrentPortalState,
        action: &PortalAction,
        req: &RedeemFromLiquidationPoolAction,
    ) -> Result<RedeemFromLiquidationPoolContent> {
        ctx.params.portal_token(&req.token_id)?;
        if req.redeem_amount == 0 {
            return Err(PortalError::InvalidAmount("redeem amount is zero".to_string()));
        }
        let entry = state
            .liquidation_pool
            .entry(&req.token_id)
            .filter(|entry| !entry.is_empty())
            .ok_or_else(|| PortalError::LiquidationPoolEmpty(req.token_id.clone()))?;
        if req.redeem_amount > entry.pub_token_amount {
            return Err(PortalError::InsufficientBalance {
                what: "liquidation pool public tokens",
                available: entry.pub_token_amount,
                requested: req.redeem_amount,
            });
        }

        let tool = ctx.exchange_tool(state);
        for (collateral, amount) in &entry.collateral_amounts {
            if *amount > 0 {
                tool.rate(collateral)?;
            }
        }

        let mint_collaterals = if req.redeem_amount == entry.pub_token_amount {
            entry
                .collateral_amounts
                .iter()
                .filter(|(_, amount)| **amount > 0)
                .map(|(collateral, amount)| (collateral.clone(), *amount))
                .collect()
        } else {
            let pool_usd = tool.total_usd(&entry.collateral_amounts)?;
            let unlocked_usd = to_u64(
                U256::from(req.redeem_amount) * U256::from(pool_usd)
                    / U256::from(entry.pub_token_amount),
                "liquidation pool redeem",
            )?;
            collaterals_for_usd(
                &tool,
                &ctx.params.collateral_order(),
                &entry.collateral_amounts,
                unlocked_usd,
            )?
            .amounts
        };

        Ok(RedeemFromLiquidationPoolContent {
            token_id: req.token_id.clone(),
            redeem_amount: req.redeem_amount,
            redeemer_address: req.redeemer_address.clone(),
            mint_collaterals,
            tx_req_id: action.tx_req_id.clone(),
            shard_id: action.shard_id,
        })
    }
}

impl PortalActionProcessor for RedeemFromLiquidationPoolProcessor {
    fn meta_type(&self) -> MetaType {
        MetaType::RedeemFromLiquidationPool
    }

    fn build_new_insts(
        &self,
        ctx: &BlockContext<'_>,
        state: &CurrentPortalState,
        action: &PortalAction,
        _prepared: &PreparedData,
    ) -> Result<Vec<Instruction>> {
        let ActionPayload::RedeemFromLiquidationPool(req) = &action.payload else {
            return Err(unexpected("RedeemFromLiquidationPool"));
        };
        let validated = Self::validate(ctx, state, action, req);
        accept_or_reject(ctx, self.meta_type(), action, validated, || {
            RedeemFromLiquidationPoolContent {
                token_id: req.token_id.clone(),
                redeem_amount: req.redeem_amount,
                redeemer_address: req.redeemer_address.clone(),
                mint_collaterals: BTreeMap::new(),
                tx_req_id: action.tx_req_id.clone(),
                shard_id: action.shard_id,
            }
        })
    }

    fn process_insts(
        &self,
        _ctx: &BlockContext<'_>,
        state: &mut CurrentPortalState,
        inst: &Instruction,
    ) -> Result<()> {
        let content: RedeemFromLiquidationPoolContent = inst.decode()?;
        match inst.status.as_str() {
            status::ACCEPTED => {
                state.liquidation_pool.withdraw(
                    &content.token_id,
                    content.redeem_amount,
                    &content.mint_collaterals,
                )?;
                state.record_burned(&content.token_id, content.redeem_amount)?;
            }
            status::REJECTED => {}
            _ => return Err(inst.unknown_status()),
        }
        state.record_status(
            StatusKind::RedeemFromLiquidationPool,
            &content.tx_req_id,
            &inst.status,
            &content,
        )
    }
}
