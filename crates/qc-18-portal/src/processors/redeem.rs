//! # Redeem Lifecycle
//!
//! ```text
//! RedeemRequest ──accepted──> Waiting ──fully matched──> Matched ──all proofs──> Success
//!                                │
//!                                └──pick-more fails / liquidation──> CancelledByLiquidation
//! ```
//!
//! Public tokens are burned when the request is accepted and re-minted if it
//! is cancelled. Custodians move public tokens from their holding into the
//! request as they are matched, and get collateral unlocked as they prove
//! payment to the redeemer.

use super::{
    accept_or_reject, prepare_used_ids, unexpected, BlockContext, PortalActionProcessor,
    PreparedData,
};
use crate::algorithms::{
    match_custodian_to_waiting_redeem, min_fee, pick_custodians_for_redeem,
    unlock_amounts_after_redeem,
};
use crate::config::PortalParams;
use crate::domain::{
    CurrentPortalState, MatchingRedeemCustodian, RedeemRequest, RedeemState, StatusKind,
    Touches,
};
use crate::error::{PortalError, Result};
use crate::instructions::{
    status, ActionPayload, Instruction, MatchingRedeemContent, MetaType,
    PickMoreCustodianContent, PortalAction, RedeemRequestAction, RedeemRequestContent,
    UnlockCollateralAction, UnlockCollateralContent,
};
use crate::ports::PortalStateStore;
use tracing::{info, warn};

/// Cancel a waiting redeem: matched custodians get their public tokens back
/// and the redeemer is re-minted the burned amount.
pub(crate) fn cancel_waiting_redeem(
    state: &mut CurrentPortalState,
    redeem_id: &str,
) -> Result<RedeemRequest> {
    let req = state
        .waiting_redeem_requests
        .remove(redeem_id)
        .ok_or_else(|| PortalError::RedeemRequestNotFound(redeem_id.to_string()))?;
    for matched in &req.custodians {
        state
            .custodian_mut(&matched.incognito_address)?
            .add_holding(&req.token_id, matched.amount)?;
    }
    state.record_minted(&req.token_id, req.redeem_amount)?;

    let mut lifecycle = RedeemState::Waiting;
    lifecycle.transition_to(RedeemState::CancelledByLiquidation)?;
    state.record_status(
        StatusKind::RedeemRequest,
        redeem_id,
        lifecycle.as_str(),
        &req,
    )?;
    Ok(req)
}

/// Move a fully matched waiting redeem to the matched set. The timeout for
/// custodians to pay starts now.
fn promote_to_matched(
    ctx: &BlockContext<'_>,
    state: &mut CurrentPortalState,
    mut req: RedeemRequest,
) -> Result<()> {
    if !req.is_fully_matched() {
        return Err(PortalError::InvalidAmount(format!(
            "redeem {} matched {} of {}",
            req.unique_redeem_id,
            req.matched_amount(),
            req.redeem_amount
        )));
    }
    let mut lifecycle = RedeemState::Waiting;
    lifecycle.transition_to(RedeemState::Matched)?;
    req.beacon_height = ctx.new_height();
    state.record_status(
        StatusKind::RedeemRequest,
        &req.unique_redeem_id,
        lifecycle.as_str(),
        &req,
    )?;
    info!(
        parent: &ctx.span,
        "[qc-18] Redeem {} matched to {} custodians",
        req.unique_redeem_id,
        req.custodians.len()
    );
    state
        .matched_redeem_requests
        .insert(req.unique_redeem_id.clone(), req);
    Ok(())
}

/// Redeem request.
pub struct RedeemRequestProcessor;

impl RedeemRequestProcessor {
    fn validate(
        ctx: &BlockContext<'_>,
        state: &CurrentPortalState,
        action: &PortalAction,
        req: &RedeemRequestAction,
        prepared: &PreparedData,
    ) -> Result<RedeemRequestContent> {
        let id = &req.unique_redeem_id;
        if prepared.is_used(id)
            || state.has_status(StatusKind::RedeemRequest, id)
            || state.waiting_redeem_requests.contains_key(id)
            || state.matched_redeem_requests.contains_key(id)
        {
            return Err(PortalError::DuplicateId(id.clone()));
        }
        ctx.params.portal_token(&req.token_id)?;
        if req.redeem_amount == 0 {
            return Err(PortalError::InvalidAmount("redeem amount is zero".to_string()));
        }
        if req.redeemer_remote_address.is_empty() {
            return Err(PortalError::MissingRemoteAddress {
                custodian: req.redeemer_address.clone(),
                token: req.token_id.clone(),
            });
        }

        let tool = ctx.exchange_tool(state);
        let min = min_fee(
            &tool,
            &req.token_id,
            req.redeem_amount,
            ctx.params.min_redeem_fee_rate_ppm,
            ctx.params.min_portal_fee,
        )?;
        if req.redeem_fee < min {
            return Err(PortalError::FeeTooLow {
                fee: req.redeem_fee,
                min_fee: min,
            });
        }

        let held: u64 = state
            .custodian_pool
            .values()
            .map(|c| c.holding(&req.token_id))
            .fold(0u64, u64::saturating_add);
        if held < req.redeem_amount {
            return Err(PortalError::NotEnoughCustodians {
                token: req.token_id.clone(),
                amount: req.redeem_amount,
            });
        }

        Ok(RedeemRequestContent {
            unique_redeem_id: id.clone(),
            token_id: req.token_id.clone(),
            redeem_amount: req.redeem_amount,
            redeemer_address: req.redeemer_address.clone(),
            redeemer_remote_address: req.redeemer_remote_address.clone(),
            redeem_fee: req.redeem_fee,
            tx_req_id: action.tx_req_id.clone(),
            shard_id: action.shard_id,
            shard_height: action.shard_height,
        })
    }
}

impl PortalActionProcessor for RedeemRequestProcessor {
    fn meta_type(&self) -> MetaType {
        MetaType::RedeemRequest
    }

    fn touches(&self) -> Touches {
        Touches {
            redeem_requests: true,
            ..Touches::NONE
        }
    }

    fn prepare_data(
        &self,
        _ctx: &BlockContext<'_>,
        store: &dyn PortalStateStore,
        actions: &[PortalAction],
    ) -> Result<PreparedData> {
        let ids = actions.iter().filter_map(|a| match &a.payload {
            ActionPayload::RedeemRequest(req) => Some(req.unique_redeem_id.clone()),
            _ => None,
        });
        prepare_used_ids(store, StatusKind::RedeemRequest, ids)
    }

    fn build_new_insts(
        &self,
        ctx: &BlockContext<'_>,
        state: &CurrentPortalState,
        action: &PortalAction,
        prepared: &PreparedData,
    ) -> Result<Vec<Instruction>> {
        let ActionPayload::RedeemRequest(req) = &action.payload else {
            return Err(unexpected("RedeemRequest"));
        };
        let validated = Self::validate(ctx, state, action, req, prepared);
        accept_or_reject(ctx, self.meta_type(), action, validated, || {
            RedeemRequestContent {
                unique_redeem_id: req.unique_redeem_id.clone(),
                token_id: req.token_id.clone(),
                redeem_amount: req.redeem_amount,
                redeemer_address: req.redeemer_address.clone(),
                redeemer_remote_address: req.redeemer_remote_address.clone(),
                redeem_fee: req.redeem_fee,
                tx_req_id: action.tx_req_id.clone(),
                shard_id: action.shard_id,
                shard_height: action.shard_height,
            }
        })
    }

    fn process_insts(
        &self,
        ctx: &BlockContext<'_>,
        state: &mut CurrentPortalState,
        inst: &Instruction,
    ) -> Result<()> {
        let content: RedeemRequestContent = inst.decode()?;
        match inst.status.as_str() {
            status::ACCEPTED => {
                let id = &content.unique_redeem_id;
                if state.waiting_redeem_requests.contains_key(id)
                    || state.matched_redeem_requests.contains_key(id)
                {
                    return Err(PortalError::DuplicateId(id.clone()));
                }
                let mut lifecycle = RedeemState::Requested;
                lifecycle.transition_to(RedeemState::Waiting)?;
                let req = RedeemRequest {
                    unique_redeem_id: id.clone(),
                    token_id: content.token_id.clone(),
                    redeemer_address: content.redeemer_address.clone(),
                    redeemer_remote_address: content.redeemer_remote_address.clone(),
                    redeem_amount: content.redeem_amount,
                    custodians: Vec::new(),
                    redeem_fee: content.redeem_fee,
                    beacon_height: ctx.new_height(),
                    tx_req_id: content.tx_req_id.clone(),
                    shard_id: content.shard_id,
                    shard_height: content.shard_height,
                };
                state.record_burned(&req.token_id, req.redeem_amount)?;
                state.record_status(StatusKind::RedeemRequest, id, lifecycle.as_str(), &req)?;
                state.waiting_redeem_requests.insert(id.clone(), req);
            }
            status::REJECTED => {}
            _ => return Err(inst.unknown_status()),
        }
        state.record_status(
            StatusKind::RedeemTx,
            &content.tx_req_id,
            &inst.status,
            &content,
        )
    }
}

/// A custodian volunteering for a waiting redeem.
pub struct MatchingRedeemProcessor;

impl PortalActionProcessor for MatchingRedeemProcessor {
    fn meta_type(&self) -> MetaType {
        MetaType::ReqMatchingRedeem
    }

    fn touches(&self) -> Touches {
        Touches {
            redeem_requests: true,
            ..Touches::NONE
        }
    }

    fn build_new_insts(
        &self,
        ctx: &BlockContext<'_>,
        state: &CurrentPortalState,
        action: &PortalAction,
        _prepared: &PreparedData,
    ) -> Result<Vec<Instruction>> {
        let ActionPayload::ReqMatchingRedeem(req) = &action.payload else {
            return Err(unexpected("ReqMatchingRedeem"));
        };
        let validated = (|| -> Result<MatchingRedeemContent> {
            let redeem = state
                .waiting_redeem_requests
                .get(&req.unique_redeem_id)
                .ok_or_else(|| PortalError::RedeemRequestNotFound(req.unique_redeem_id.clone()))?;
            let custodian = state.custodian(&req.custodian_address)?;
            let (matching_amount, is_fully_matched) =
                match_custodian_to_waiting_redeem(redeem, custodian)?;
            Ok(MatchingRedeemContent {
                custodian_address: req.custodian_address.clone(),
                unique_redeem_id: req.unique_redeem_id.clone(),
                matching_amount,
                is_fully_matched,
                tx_req_id: action.tx_req_id.clone(),
                shard_id: action.shard_id,
            })
        })();
        accept_or_reject(ctx, self.meta_type(), action, validated, || {
            MatchingRedeemContent {
                custodian_address: req.custodian_address.clone(),
                unique_redeem_id: req.unique_redeem_id.clone(),
                matching_amount: 0,
                is_fully_matched: false,
                tx_req_id: action.tx_req_id.clone(),
                shard_id: action.shard_id,
            }
        })
    }

    fn process_insts(
        &self,
        ctx: &BlockContext<'_>,
        state: &mut CurrentPortalState,
        inst: &Instruction,
    ) -> Result<()> {
        let content: MatchingRedeemContent = inst.decode()?;
        match inst.status.as_str() {
            status::ACCEPTED => {
                let id = &content.unique_redeem_id;
                let mut req = state
                    .waiting_redeem_requests
                    .remove(id)
                    .ok_or_else(|| PortalError::RedeemRequestNotFound(id.clone()))?;
                if req.custodian(&content.custodian_address).is_some() {
                    return Err(PortalError::DuplicateId(format!(
                        "custodian {} already matched to redeem {}",
                        content.custodian_address, id
                    )));
                }
                let custodian = state.custodian_mut(&content.custodian_address)?;
                custodian.sub_holding(&req.token_id, content.matching_amount)?;
                let remote_address = custodian
                    .remote_address(&req.token_id)
                    .ok_or_else(|| PortalError::MissingRemoteAddress {
                        custodian: content.custodian_address.clone(),
                        token: req.token_id.clone(),
                    })?
                    .to_string();
                req.custodians.push(MatchingRedeemCustodian {
                    incognito_address: content.custodian_address.clone(),
                    remote_address,
                    amount: content.matching_amount,
                });

                if req.is_fully_matched() != content.is_fully_matched {
                    return Err(PortalError::InvalidAmount(format!(
                        "redeem {} match state diverged from instruction",
                        id
                    )));
                }
                if req.is_fully_matched() {
                    promote_to_matched(ctx, state, req)?;
                } else {
                    state.waiting_redeem_requests.insert(id.clone(), req);
                }
            }
            status::REJECTED => {}
            _ => return Err(inst.unknown_status()),
        }
        state.record_status(
            StatusKind::RequestMatchingRedeem,
            &content.tx_req_id,
            &inst.status,
            &content,
        )
    }
}

/// Custodian assignment for waiting redeems nobody completed in time. When
/// the pool cannot cover the rest, the request is cancelled and refunded.
pub struct PickMoreCustodianProcessor;

impl PortalActionProcessor for PickMoreCustodianProcessor {
    fn meta_type(&self) -> MetaType {
        MetaType::PickMoreCustodianForRedeem
    }

    fn touches(&self) -> Touches {
        Touches {
            redeem_requests: true,
            ..Touches::NONE
        }
    }

    fn synthesize_insts(
        &self,
        ctx: &BlockContext<'_>,
        state: &CurrentPortalState,
    ) -> Result<Vec<Instruction>> {
        let timed_out: Vec<&RedeemRequest> = state
            .waiting_redeem_requests
            .values()
            .filter(|req| {
                PortalParams::is_timed_out(
                    ctx.beacon_height,
                    req.beacon_height,
                    ctx.params.timeout_waiting_redeem_request,
                )
            })
            .collect();
        if timed_out.is_empty() {
            return Ok(Vec::new());
        }

        // picks of one request change the holdings the next one sees
        let mut scratch = state.clone();
        let mut insts = Vec::new();
        for req in timed_out {
            let (status, custodians) = match pick_custodians_for_redeem(&scratch, req) {
                Ok(picked) => (status::ACCEPTED, picked),
                Err(e) if e.is_skippable() => {
                    warn!(
                        parent: &ctx.span,
                        error = %e,
                        "[qc-18] Cannot complete redeem {}, cancelling",
                        req.unique_redeem_id
                    );
                    (status::REJECTED, Vec::new())
                }
                Err(e) => return Err(e),
            };
            let inst = Instruction::beacon(
                self.meta_type(),
                status,
                &PickMoreCustodianContent {
                    unique_redeem_id: req.unique_redeem_id.clone(),
                    token_id: req.token_id.clone(),
                    redeem_amount: req.redeem_amount,
                    redeemer_address: req.redeemer_address.clone(),
                    redeem_fee: req.redeem_fee,
                    custodians,
                    shard_id: req.shard_id,
                },
            )?;
            self.process_insts(ctx, &mut scratch, &inst)?;
            insts.push(inst);
        }
        Ok(insts)
    }

    fn process_insts(
        &self,
        ctx: &BlockContext<'_>,
        state: &mut CurrentPortalState,
        inst: &Instruction,
    ) -> Result<()> {
        let content: PickMoreCustodianContent = inst.decode()?;
        match inst.status.as_str() {
            status::ACCEPTED => {
                let mut req = state
                    .waiting_redeem_requests
                    .remove(&content.unique_redeem_id)
                    .ok_or_else(|| {
                        PortalError::RedeemRequestNotFound(content.unique_redeem_id.clone())
                    })?;
                for picked in &content.custodians {
                    if req.custodian(&picked.incognito_address).is_some() {
                        return Err(PortalError::DuplicateId(picked.incognito_address.clone()));
                    }
                    state
                        .custodian_mut(&picked.incognito_address)?
                        .sub_holding(&req.token_id, picked.amount)?;
                    req.custodians.push(picked.clone());
                }
                promote_to_matched(ctx, state, req)
            }
            status::REJECTED => {
                cancel_waiting_redeem(state, &content.unique_redeem_id)?;
                Ok(())
            }
            _ => Err(inst.unknown_status()),
        }
    }
}

/// Custodian's proof of paying the redeemer.
pub struct UnlockCollateralProcessor;

impl UnlockCollateralProcessor {
    fn validate(
        ctx: &BlockContext<'_>,
        state: &CurrentPortalState,
        action: &PortalAction,
        req: &UnlockCollateralAction,
        prepared: &PreparedData,
    ) -> Result<UnlockCollateralContent> {
        let redeem = state
            .matched_redeem_requests
            .get(&req.unique_redeem_id)
            .ok_or_else(|| PortalError::RedeemRequestNotFound(req.unique_redeem_id.clone()))?;
        if redeem.token_id != req.token_id {
            return Err(PortalError::UnsupportedToken(format!(
                "redeem {} is for {}, not {}",
                redeem.unique_redeem_id, redeem.token_id, req.token_id
            )));
        }
        let matched = redeem.custodian(&req.custodian_address).ok_or_else(|| {
            PortalError::CustodianNotFound(format!(
                "{} in redeem {}",
                req.custodian_address, redeem.unique_redeem_id
            ))
        })?;
        if matched.amount != req.redeem_amount {
            return Err(PortalError::InvalidAmount(format!(
                "custodian owes {}, claims {}",
                matched.amount, req.redeem_amount
            )));
        }

        let chain = ctx.params.portal_token(&req.token_id)?.chain.as_str();
        let tx_id = req.proof.unique_id(chain);
        if prepared.is_used(&tx_id) || state.used_external_txs.contains(&tx_id) {
            return Err(PortalError::ExternalTxAlreadyUsed(tx_id));
        }
        let data = ctx.verifier.verify_proof(chain, &req.proof)?;
        if data.token_id != req.token_id {
            return Err(PortalError::ProofRejected(format!(
                "proof moves {}, redeem needs {}",
                data.token_id, req.token_id
            )));
        }
        let received = data.received_by(&redeem.redeemer_remote_address);
        if received < req.redeem_amount {
            return Err(PortalError::ProofRejected(format!(
                "redeemer {} received {}, owed {}",
                redeem.redeemer_remote_address, received, req.redeem_amount
            )));
        }
        if data.sender_address != matched.remote_address {
            return Err(PortalError::ProofRejected(format!(
                "proof sent from {}, custodian address is {}",
                data.sender_address, matched.remote_address
            )));
        }

        let tool = ctx.exchange_tool(state);
        let custodian = state.custodian(&req.custodian_address)?;
        let unlock_amounts = unlock_amounts_after_redeem(
            state,
            &tool,
            &ctx.params.collateral_order(),
            custodian,
            &req.token_id,
            req.redeem_amount,
        )?;

        Ok(UnlockCollateralContent {
            unique_redeem_id: req.unique_redeem_id.clone(),
            token_id: req.token_id.clone(),
            custodian_address: req.custodian_address.clone(),
            redeem_amount: req.redeem_amount,
            unlock_amounts,
            external_tx_id: tx_id,
            tx_req_id: action.tx_req_id.clone(),
            shard_id: action.shard_id,
        })
    }
}

impl PortalActionProcessor for UnlockCollateralProcessor {
    fn meta_type(&self) -> MetaType {
        MetaType::RequestUnlockCollateral
    }

    fn touches(&self) -> Touches {
        Touches {
            redeem_requests: true,
            ..Touches::NONE
        }
    }

    fn prepare_data(
        &self,
        ctx: &BlockContext<'_>,
        store: &dyn PortalStateStore,
        actions: &[PortalAction],
    ) -> Result<PreparedData> {
        let ids = actions.iter().filter_map(|a| match &a.payload {
            ActionPayload::RequestUnlockCollateral(req) => ctx
                .params
                .portal_token(&req.token_id)
                .ok()
                .map(|token| req.proof.unique_id(&token.chain)),
            _ => None,
        });
        prepare_used_ids(store, StatusKind::ExternalTxUsed, ids)
    }

    fn build_new_insts(
        &self,
        ctx: &BlockContext<'_>,
        state: &CurrentPortalState,
        action: &PortalAction,
        prepared: &PreparedData,
    ) -> Result<Vec<Instruction>> {
        let ActionPayload::RequestUnlockCollateral(req) = &action.payload else {
            return Err(unexpected("RequestUnlockCollateral"));
        };
        let validated = Self::validate(ctx, state, action, req, prepared);
        accept_or_reject(ctx, self.meta_type(), action, validated, || {
            UnlockCollateralContent {
                unique_redeem_id: req.unique_redeem_id.clone(),
                token_id: req.token_id.clone(),
                custodian_address: req.custodian_address.clone(),
                redeem_amount: req.redeem_amount,
                unlock_amounts: Default::default(),
                external_tx_id: String::new(),
                tx_req_id: action.tx_req_id.clone(),
                shard_id: action.shard_id,
            }
        })
    }

    fn process_insts(
        &self,
        ctx: &BlockContext<'_>,
        state: &mut CurrentPortalState,
        inst: &Instruction,
    ) -> Result<()> {
        let content: UnlockCollateralContent = inst.decode()?;
        match inst.status.as_str() {
            status::ACCEPTED => {
                let custodian = state.custodian_mut(&content.custodian_address)?;
                for (collateral, amount) in &content.unlock_amounts {
                    custodian.unlock(&content.token_id, collateral, *amount)?;
                }

                let id = &content.unique_redeem_id;
                let req = state
                    .matched_redeem_requests
                    .get_mut(id)
                    .ok_or_else(|| PortalError::RedeemRequestNotFound(id.clone()))?;
                req.remove_custodian(&content.custodian_address)
                    .ok_or_else(|| PortalError::CustodianNotFound(content.custodian_address.clone()))?;
                if req.custodians.is_empty() {
                    if let Some(done) = state.matched_redeem_requests.remove(id) {
                        let mut lifecycle = RedeemState::Matched;
                        lifecycle.transition_to(RedeemState::Success)?;
                        state.record_status(
                            StatusKind::RedeemRequest,
                            id,
                            lifecycle.as_str(),
                            &done,
                        )?;
                        info!(parent: &ctx.span, "[qc-18] Redeem {} completed", id);
                    }
                }
                state.mark_external_tx_used(&content.external_tx_id)?;
            }
            status::REJECTED => {}
            _ => return Err(inst.unknown_status()),
        }
        state.record_status(
            StatusKind::UnlockCollateral,
            &content.tx_req_id,
            &inst.status,
            &content,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::Phase;
    use super::*;
    use crate::domain::{ExternalProof, MatchingRedeemCustodian};
    use crate::instructions::MatchingRedeemAction;
    use crate::ports::ProofData;
    use crate::{PBTC_ID, PRV_ID};

    const BTC: u64 = 1_000_000_000;

    /// Two custodians each holding 0.1 BTC backed by 1,500 PRV.
    fn holding_state() -> CurrentPortalState {
        let mut state = state_with_rates();
        for name in ["alice", "bob"] {
            let mut c = custodian(name, 10_000 * BTC);
            c.lock(PBTC_ID, PRV_ID, 1_500 * BTC).unwrap();
            c.add_holding(PBTC_ID, BTC / 10).unwrap();
            add_custodian(&mut state, c);
        }
        state
    }

    fn redeem_action(id: &str, amount: u64) -> PortalAction {
        PortalAction {
            tx_req_id: format!("tx-{}", id),
            shard_id: 3,
            shard_height: 50,
            payload: ActionPayload::RedeemRequest(RedeemRequestAction {
                unique_redeem_id: id.to_string(),
                token_id: PBTC_ID.to_string(),
                redeem_amount: amount,
                redeemer_address: "redeemer".to_string(),
                redeemer_remote_address: "redeemer-btc".to_string(),
                redeem_fee: BTC,
            }),
        }
    }

    fn match_action(custodian: &str, id: &str) -> PortalAction {
        PortalAction {
            tx_req_id: format!("match-{}-{}", custodian, id),
            shard_id: 0,
            shard_height: 51,
            payload: ActionPayload::ReqMatchingRedeem(MatchingRedeemAction {
                custodian_address: custodian.to_string(),
                unique_redeem_id: id.to_string(),
            }),
        }
    }

    #[test]
    fn test_redeem_burns_and_waits() {
        let fixture = Fixture::new();
        let ctx = fixture.ctx(200, Phase::Produce);
        let mut state = holding_state();

        let insts = build_and_apply(
            &RedeemRequestProcessor,
            &ctx,
            &mut state,
            &redeem_action("r1", BTC / 10),
        );
        assert_eq!(insts[0].status, status::ACCEPTED);
        assert_eq!(state.burned_public_tokens[PBTC_ID], BTC / 10);
        assert!(state.waiting_redeem_requests["r1"].custodians.is_empty());
    }

    #[test]
    fn test_redeem_beyond_total_holding_rejected() {
        let fixture = Fixture::new();
        let ctx = fixture.ctx(200, Phase::Produce);
        let mut state = holding_state();
        let insts = build_and_apply(
            &RedeemRequestProcessor,
            &ctx,
            &mut state,
            &redeem_action("r1", BTC),
        );
        assert_eq!(insts[0].status, status::REJECTED);
        assert!(state.burned_public_tokens.is_empty());
    }

    #[test]
    fn test_self_matching_completes_redeem() {
        let fixture = Fixture::new();
        let ctx = fixture.ctx(200, Phase::Produce);
        let mut state = holding_state();
        build_and_apply(
            &RedeemRequestProcessor,
            &ctx,
            &mut state,
            &redeem_action("r1", BTC / 10 + BTC / 20),
        );

        build_and_apply(&MatchingRedeemProcessor, &ctx, &mut state, &match_action("alice", "r1"));
        assert_eq!(state.waiting_redeem_requests["r1"].matched_amount(), BTC / 10);
        assert_eq!(state.custodian("alice").unwrap().holding(PBTC_ID), 0);

        // same custodian twice is rejected
        let again =
            build_and_apply(&MatchingRedeemProcessor, &ctx, &mut state, &match_action("alice", "r1"));
        assert_eq!(again[0].status, status::REJECTED);

        build_and_apply(&MatchingRedeemProcessor, &ctx, &mut state, &match_action("bob", "r1"));
        assert!(state.waiting_redeem_requests.is_empty());
        let matched = &state.matched_redeem_requests["r1"];
        assert_eq!(matched.custodians[1].amount, BTC / 20);
        assert_eq!(matched.beacon_height, 201);
        assert_eq!(state.custodian("bob").unwrap().holding(PBTC_ID), BTC / 20);
    }

    #[test]
    fn test_pick_more_after_timeout() {
        let fixture = Fixture::new();
        let mut state = holding_state();
        build_and_apply(
            &RedeemRequestProcessor,
            &fixture.ctx(200, Phase::Produce),
            &mut state,
            &redeem_action("r1", BTC / 10 + BTC / 20),
        );

        let timeout = fixture.params.timeout_waiting_redeem_request;
        let ctx = fixture.ctx(202 + timeout, Phase::Produce);
        let insts = PickMoreCustodianProcessor
            .synthesize_insts(&ctx, &state)
            .unwrap();
        assert_eq!(insts.len(), 1);
        assert_eq!(insts[0].status, status::ACCEPTED);
        PickMoreCustodianProcessor
            .process_insts(&ctx, &mut state, &insts[0])
            .unwrap();
        assert_eq!(state.matched_redeem_requests["r1"].matched_amount(), BTC / 10 + BTC / 20);
    }

    #[test]
    fn test_pick_more_failure_cancels_and_refunds() {
        let fixture = Fixture::new();
        let mut state = holding_state();
        build_and_apply(
            &RedeemRequestProcessor,
            &fixture.ctx(200, Phase::Produce),
            &mut state,
            &redeem_action("r1", BTC / 10 + BTC / 20),
        );
        build_and_apply(
            &MatchingRedeemProcessor,
            &fixture.ctx(200, Phase::Produce),
            &mut state,
            &match_action("alice", "r1"),
        );
        // bob's holding disappears before the timeout
        state
            .custodian_mut("bob")
            .unwrap()
            .sub_holding(PBTC_ID, BTC / 10)
            .unwrap();

        let timeout = fixture.params.timeout_waiting_redeem_request;
        let ctx = fixture.ctx(202 + timeout, Phase::Produce);
        let insts = PickMoreCustodianProcessor
            .synthesize_insts(&ctx, &state)
            .unwrap();
        assert_eq!(insts[0].status, status::REJECTED);
        PickMoreCustodianProcessor
            .process_insts(&ctx, &mut state, &insts[0])
            .unwrap();

        assert!(state.waiting_redeem_requests.is_empty());
        assert_eq!(state.custodian("alice").unwrap().holding(PBTC_ID), BTC / 10);
        assert_eq!(state.minted_public_tokens[PBTC_ID], BTC / 10 + BTC / 20);
    }

    /// Alice matched to a 0.1 BTC redeem, her holding already handed over.
    fn matched_to_alice() -> CurrentPortalState {
        let mut state = holding_state();
        state
            .custodian_mut("alice")
            .unwrap()
            .sub_holding(PBTC_ID, BTC / 10)
            .unwrap();
        state.matched_redeem_requests.insert(
            "r1".to_string(),
            RedeemRequest {
                unique_redeem_id: "r1".to_string(),
                token_id: PBTC_ID.to_string(),
                redeemer_address: "redeemer".to_string(),
                redeemer_remote_address: "redeemer-btc".to_string(),
                redeem_amount: BTC / 10,
                custodians: vec![MatchingRedeemCustodian {
                    incognito_address: "alice".to_string(),
                    remote_address: "btc-alice".to_string(),
                    amount: BTC / 10,
                }],
                redeem_fee: BTC,
                beacon_height: 290,
                tx_req_id: "tx-r1".to_string(),
                shard_id: 0,
                shard_height: 1,
            },
        );
        state
    }

    fn alice_pays(to: &str) -> ProofData {
        ProofData {
            sender_address: "btc-alice".to_string(),
            token_id: PBTC_ID.to_string(),
            amount: BTC / 10,
            receivers: [(to.to_string(), BTC / 10)].into_iter().collect(),
        }
    }

    fn unlock_action() -> PortalAction {
        PortalAction {
            tx_req_id: "unlock".to_string(),
            shard_id: 0,
            shard_height: 2,
            payload: ActionPayload::RequestUnlockCollateral(UnlockCollateralAction {
                unique_redeem_id: "r1".to_string(),
                token_id: PBTC_ID.to_string(),
                custodian_address: "alice".to_string(),
                redeem_amount: BTC / 10,
                proof: ExternalProof {
                    block_hash: "pay".to_string(),
                    tx_index: 0,
                    proof: vec![],
                },
            }),
        }
    }

    #[test]
    fn test_unlock_after_full_redeem_frees_backing() {
        let mut fixture = Fixture::new();
        fixture.verifier = fixture
            .verifier
            .with_proof("BTC", "pay", 0, alice_pays("redeemer-btc"));
        let ctx = fixture.ctx(300, Phase::Produce);
        let mut state = matched_to_alice();

        let insts = build_and_apply(&UnlockCollateralProcessor, &ctx, &mut state, &unlock_action());
        assert_eq!(insts[0].status, status::ACCEPTED);
        assert!(state.matched_redeem_requests.is_empty());
        let alice = state.custodian("alice").unwrap();
        assert_eq!(alice.locked(PBTC_ID, PRV_ID), 0);
        assert_eq!(alice.free(PRV_ID), 10_000 * BTC);
    }

    #[test]
    fn test_unlock_with_payment_to_own_address_rejected() {
        let mut fixture = Fixture::new();
        fixture.verifier = fixture
            .verifier
            .with_proof("BTC", "pay", 0, alice_pays("btc-alice"));
        let ctx = fixture.ctx(300, Phase::Produce);
        let mut state = matched_to_alice();

        let insts = build_and_apply(&UnlockCollateralProcessor, &ctx, &mut state, &unlock_action());
        assert_eq!(insts[0].status, status::REJECTED);
        assert!(state.matched_redeem_requests.contains_key("r1"));
        assert_eq!(
            state.custodian("alice").unwrap().locked(PBTC_ID, PRV_ID),
            1_500 * BTC
        );
    }
}
