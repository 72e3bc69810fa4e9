//! # Custodian Rewards
//!
//! Every block ends with a reward instruction crediting:
//!
//! - porting fees of requests accepted in the block, split by matched amount
//! - redeem fees of requests matched in the block, split by matched amount
//! - epoch rewards, split by each custodian's accumulated USD holding weight
//!
//! Applying it also accumulates the holding weights for the next epoch split.
//! A custodian's weight counts its holdings, the amounts it owes in waiting
//! and matched redeems, and the amounts it is matched to in waiting portings.

use super::{BlockContext, PortalActionProcessor};
use crate::algorithms::{matched_in_waiting_portings, split_proportional, total_hold};
use crate::domain::{CurrentPortalState, RewardLedger, StatusKind, Touches};
use crate::error::Result;
use crate::instructions::{
    status, Instruction, MetaType, PortalRewardContent, PortalTotalRewardContent,
};
use crate::PRV_ID;
use tracing::debug;

/// Per-block custodian rewards.
pub struct PortalRewardProcessor;

impl PortalRewardProcessor {
    fn split_into(
        ledger: &mut RewardLedger,
        token: &str,
        total: u64,
        weights: &[(String, u64)],
    ) -> Result<()> {
        for (custodian, amount) in split_proportional(total, weights)? {
            ledger.credit(&custodian, token, amount)?;
        }
        Ok(())
    }
}

impl PortalActionProcessor for PortalRewardProcessor {
    fn meta_type(&self) -> MetaType {
        MetaType::PortalReward
    }

    fn touches(&self) -> Touches {
        Touches {
            reward_weights: true,
            ..Touches::NONE
        }
    }

    fn synthesize_insts(
        &self,
        ctx: &BlockContext<'_>,
        state: &CurrentPortalState,
    ) -> Result<Vec<Instruction>> {
        let Some(inputs) = &ctx.producer else {
            return Ok(Vec::new());
        };
        let height = ctx.new_height();
        let mut ledger = RewardLedger::new();

        for req in state.waiting_porting_requests.values() {
            if req.beacon_height != height {
                continue;
            }
            let weights: Vec<(String, u64)> = req
                .custodians
                .iter()
                .map(|c| (c.incognito_address.clone(), c.amount))
                .collect();
            Self::split_into(&mut ledger, PRV_ID, req.porting_fee, &weights)?;
        }

        for (id, req) in &state.matched_redeem_requests {
            if inputs.matched_redeems_before.contains(id) {
                continue;
            }
            let weights: Vec<(String, u64)> = req
                .custodians
                .iter()
                .map(|c| (c.incognito_address.clone(), c.amount))
                .collect();
            Self::split_into(&mut ledger, PRV_ID, req.redeem_fee, &weights)?;
        }

        let mut insts = Vec::new();
        let locked = &state.locked_collateral_for_rewards;
        if !inputs.epoch_rewards.is_empty() && locked.total_locked_amount > 0 {
            let weights: Vec<(String, u64)> = locked
                .locked_amount
                .iter()
                .map(|(custodian, weight)| (custodian.clone(), *weight))
                .collect();
            for (token, total) in &inputs.epoch_rewards {
                Self::split_into(&mut ledger, token, *total, &weights)?;
            }
            insts.push(Instruction::beacon(
                MetaType::PortalTotalReward,
                status::TOTAL_REWARD,
                &PortalTotalRewardContent {
                    beacon_height: height,
                    rewards: inputs.epoch_rewards.clone(),
                },
            )?);
        }

        insts.push(Instruction::beacon(
            self.meta_type(),
            status::REWARD,
            &PortalRewardContent {
                beacon_height: height,
                rewards: ledger.into_infos(),
            },
        )?);
        Ok(insts)
    }

    fn process_insts(
        &self,
        ctx: &BlockContext<'_>,
        state: &mut CurrentPortalState,
        inst: &Instruction,
    ) -> Result<()> {
        if inst.status != status::REWARD {
            return Err(inst.unknown_status());
        }
        let content: PortalRewardContent = inst.decode()?;
        for info in &content.rewards {
            let custodian = state.custodian_mut(&info.custodian_address)?;
            for (token, amount) in &info.rewards {
                custodian.add_reward(token, *amount)?;
            }
        }

        if ctx.params.is_epoch_start(content.beacon_height) {
            state.locked_collateral_for_rewards.reset();
        }
        let tool = ctx.exchange_tool(state);
        let mut weights = Vec::new();
        for custodian in state.custodian_pool.values() {
            let mut usd = 0u64;
            for token in ctx.params.portal_tokens.keys() {
                let hold = total_hold(state, custodian, token).saturating_add(
                    matched_in_waiting_portings(state, &custodian.incognito_address, token),
                );
                if hold > 0 && tool.has_rate(token) {
                    usd = usd.saturating_add(tool.to_usd(token, hold)?);
                }
            }
            if usd > 0 {
                weights.push((custodian.incognito_address.clone(), usd));
            }
        }
        for (custodian, usd) in weights {
            state.locked_collateral_for_rewards.add(&custodian, usd)?;
        }

        debug!(
            parent: &ctx.span,
            "[qc-18] Credited rewards to {} custodians at height {}",
            content.rewards.len(),
            content.beacon_height
        );
        state.record_status(
            StatusKind::Reward,
            &content.beacon_height.to_string(),
            &inst.status,
            &content,
        )
    }
}

/// Epoch reward totals, recorded for the height they were split at.
pub struct PortalTotalRewardProcessor;

impl PortalActionProcessor for PortalTotalRewardProcessor {
    fn meta_type(&self) -> MetaType {
        MetaType::PortalTotalReward
    }

    fn touches(&self) -> Touches {
        Touches::NONE
    }

    fn process_insts(
        &self,
        _ctx: &BlockContext<'_>,
        state: &mut CurrentPortalState,
        inst: &Instruction,
    ) -> Result<()> {
        if inst.status != status::TOTAL_REWARD {
            return Err(inst.unknown_status());
        }
        let content: PortalTotalRewardContent = inst.decode()?;
        state.record_status(
            StatusKind::TotalReward,
            &content.beacon_height.to_string(),
            &inst.status,
            &content,
        )
    }
}
