//! # Porting Lifecycle
//!
//! ```text
//! RequestPorting ──accepted──> Waiting ──RequestPToken──> Success
//!                                 │
//!                                 ├──timeout──────────────> Expired
//!                                 └──ratio <= TP120───────> Liquidated
//! ```
//!
//! Accepting a request locks each matched custodian's collateral under the
//! portal token. The proof of payment turns the request into custodian
//! holdings and mints the public tokens; expiry hands the collateral back.

use super::{
    accept_or_reject, prepare_used_ids, unexpected, BlockContext, PortalActionProcessor,
    PreparedData,
};
use crate::algorithms::{min_fee, pick_custodians_for_porting, PortalExchangeRateTool};
use crate::config::PortalParams;
use crate::domain::{
    CurrentPortalState, PortingState, StatusKind, Touches, WaitingPortingRequest,
};
use crate::error::{PortalError, Result};
use crate::instructions::{
    status, ActionPayload, ExpiredPortingContent, Instruction, MetaType, PortalAction,
    PortingRequestAction, PortingRequestContent, RequestPTokenAction, RequestPTokenContent,
};
use crate::ports::PortalStateStore;
use primitive_types::U256;
use tracing::{debug, info, warn};

/// Porting request.
pub struct PortingRequestProcessor;

impl PortingRequestProcessor {
    fn validate(
        ctx: &BlockContext<'_>,
        state: &CurrentPortalState,
        action: &PortalAction,
        req: &PortingRequestAction,
        prepared: &PreparedData,
    ) -> Result<PortingRequestContent> {
        let id = &req.unique_porting_id;
        if prepared.is_used(id)
            || state.has_status(StatusKind::PortingRequest, id)
            || state.waiting_porting_requests.contains_key(id)
        {
            return Err(PortalError::DuplicateId(id.clone()));
        }
        ctx.params.portal_token(&req.token_id)?;
        if req.porting_amount == 0 {
            return Err(PortalError::InvalidAmount("porting amount is zero".to_string()));
        }

        let tool = ctx.exchange_tool(state);
        let min = min_fee(
            &tool,
            &req.token_id,
            req.porting_amount,
            ctx.params.min_porting_fee_rate_ppm,
            ctx.params.min_portal_fee,
        )?;
        if req.porting_fee < min {
            return Err(PortalError::FeeTooLow {
                fee: req.porting_fee,
                min_fee: min,
            });
        }

        let custodians = pick_custodians_for_porting(
            state,
            &tool,
            ctx.params,
            &req.token_id,
            req.porting_amount,
        )?;
        Ok(PortingRequestContent {
            unique_porting_id: id.clone(),
            token_id: req.token_id.clone(),
            porter_address: req.incognito_address.clone(),
            porting_amount: req.porting_amount,
            porting_fee: req.porting_fee,
            custodians,
            tx_req_id: action.tx_req_id.clone(),
            shard_id: action.shard_id,
        })
    }
}

impl PortalActionProcessor for PortingRequestProcessor {
    fn meta_type(&self) -> MetaType {
        MetaType::RequestPorting
    }

    fn touches(&self) -> Touches {
        Touches {
            porting_requests: true,
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
            ActionPayload::RequestPorting(req) => Some(req.unique_porting_id.clone()),
            _ => None,
        });
        prepare_used_ids(store, StatusKind::PortingRequest, ids)
    }

    fn build_new_insts(
        &self,
        ctx: &BlockContext<'_>,
        state: &CurrentPortalState,
        action: &PortalAction,
        prepared: &PreparedData,
    ) -> Result<Vec<Instruction>> {
        let ActionPayload::RequestPorting(req) = &action.payload else {
            return Err(unexpected("RequestPorting"));
        };
        let validated = Self::validate(ctx, state, action, req, prepared);
        accept_or_reject(ctx, self.meta_type(), action, validated, || {
            PortingRequestContent {
                unique_porting_id: req.unique_porting_id.clone(),
                token_id: req.token_id.clone(),
                porter_address: req.incognito_address.clone(),
                porting_amount: req.porting_amount,
                porting_fee: req.porting_fee,
                custodians: Vec::new(),
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
        let content: PortingRequestContent = inst.decode()?;
        match inst.status.as_str() {
            status::ACCEPTED => {
                let id = &content.unique_porting_id;
                if state.waiting_porting_requests.contains_key(id) {
                    return Err(PortalError::DuplicateId(id.clone()));
                }
                let matched: u64 = content.custodians.iter().map(|c| c.amount).sum();
                if matched != content.porting_amount {
                    return Err(PortalError::InvalidAmount(format!(
                        "porting {} matches {} of {}",
                        id, matched, content.porting_amount
                    )));
                }
                for matched in &content.custodians {
                    let custodian = state.custodian_mut(&matched.incognito_address)?;
                    for (collateral, amount) in &matched.locked_amount_collateral {
                        custodian.lock(&content.token_id, collateral, *amount)?;
                    }
                }

                let mut lifecycle = PortingState::Requested;
                lifecycle.transition_to(PortingState::Waiting)?;
                let req = WaitingPortingRequest {
                    unique_porting_id: id.clone(),
                    token_id: content.token_id.clone(),
                    porter_address: content.porter_address.clone(),
                    amount: content.porting_amount,
                    custodians: content.custodians.clone(),
                    porting_fee: content.porting_fee,
                    beacon_height: ctx.new_height(),
                    tx_req_id: content.tx_req_id.clone(),
                    shard_id: content.shard_id,
                };
                state.record_status(StatusKind::PortingRequest, id, lifecycle.as_str(), &req)?;
                state.waiting_porting_requests.insert(id.clone(), req);
                info!(
                    parent: &ctx.span,
                    "[qc-18] Porting {} waiting: {} of {} across {} custodians",
                    id,
                    content.porting_amount,
                    content.token_id,
                    content.custodians.len()
                );
            }
            status::REJECTED => {}
            _ => return Err(inst.unknown_status()),
        }
        state.record_status(
            StatusKind::PortingTx,
            &content.tx_req_id,
            &inst.status,
            &content,
        )
    }
}

/// Porter's proof of payment to the custodians.
pub struct RequestPTokenProcessor;

impl RequestPTokenProcessor {
    fn validate(
        ctx: &BlockContext<'_>,
        state: &CurrentPortalState,
        action: &PortalAction,
        req: &RequestPTokenAction,
        prepared: &PreparedData,
    ) -> Result<RequestPTokenContent> {
        let porting = state
            .waiting_porting_requests
            .get(&req.unique_porting_id)
            .ok_or_else(|| PortalError::PortingRequestNotFound(req.unique_porting_id.clone()))?;
        if porting.token_id != req.token_id {
            return Err(PortalError::UnsupportedToken(format!(
                "porting {} is for {}, not {}",
                porting.unique_porting_id, porting.token_id, req.token_id
            )));
        }
        if porting.porter_address != req.incognito_address {
            return Err(PortalError::Unauthorized(req.incognito_address.clone()));
        }
        if porting.amount != req.porting_amount {
            return Err(PortalError::InvalidAmount(format!(
                "claimed {}, porting {} is for {}",
                req.porting_amount, porting.unique_porting_id, porting.amount
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
                "proof moves {}, porting needs {}",
                data.token_id, req.token_id
            )));
        }
        for matched in &porting.custodians {
            let received = data.received_by(&matched.remote_address);
            if received < matched.amount {
                return Err(PortalError::ProofRejected(format!(
                    "{} received {}, custodian {} is owed {}",
                    matched.remote_address, received, matched.incognito_address, matched.amount
                )));
            }
        }

        Ok(RequestPTokenContent {
            unique_porting_id: req.unique_porting_id.clone(),
            token_id: req.token_id.clone(),
            incognito_address: req.incognito_address.clone(),
            porting_amount: req.porting_amount,
            external_tx_id: tx_id,
            tx_req_id: action.tx_req_id.clone(),
            shard_id: action.shard_id,
        })
    }
}

impl PortalActionProcessor for RequestPTokenProcessor {
    fn meta_type(&self) -> MetaType {
        MetaType::RequestPToken
    }

    fn touches(&self) -> Touches {
        Touches {
            porting_requests: true,
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
            ActionPayload::RequestPToken(req) => ctx
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
        let ActionPayload::RequestPToken(req) = &action.payload else {
            return Err(unexpected("RequestPToken"));
        };
        let validated = Self::validate(ctx, state, action, req, prepared);
        accept_or_reject(ctx, self.meta_type(), action, validated, || {
            RequestPTokenContent {
                unique_porting_id: req.unique_porting_id.clone(),
                token_id: req.token_id.clone(),
                incognito_address: req.incognito_address.clone(),
                porting_amount: req.porting_amount,
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
        let content: RequestPTokenContent = inst.decode()?;
        match inst.status.as_str() {
            status::ACCEPTED => {
                let req = state
                    .waiting_porting_requests
                    .remove(&content.unique_porting_id)
                    .ok_or_else(|| {
                        PortalError::PortingRequestNotFound(content.unique_porting_id.clone())
                    })?;
                for matched in &req.custodians {
                    state
                        .custodian_mut(&matched.incognito_address)?
                        .add_holding(&req.token_id, matched.amount)?;
                }
                state.record_minted(&req.token_id, req.amount)?;
                state.mark_external_tx_used(&content.external_tx_id)?;

                let mut lifecycle = PortingState::Waiting;
                lifecycle.transition_to(PortingState::Success)?;
                state.record_status(
                    StatusKind::PortingRequest,
                    &req.unique_porting_id,
                    lifecycle.as_str(),
                    &req,
                )?;
                info!(
                    parent: &ctx.span,
                    "[qc-18] Porting {} done, minted {} of {}",
                    req.unique_porting_id, req.amount, req.token_id
                );
            }
            status::REJECTED => {}
            _ => return Err(inst.unknown_status()),
        }
        state.record_status(
            StatusKind::RequestPToken,
            &content.tx_req_id,
            &inst.status,
            &content,
        )
    }
}

/// Collateral value locked for a waiting porting over its public token
/// value, in percent. `None` when rates are missing.
fn porting_collateral_ratio(
    tool: &PortalExchangeRateTool,
    req: &WaitingPortingRequest,
) -> Option<u64> {
    let porting_usd = tool.to_usd(&req.token_id, req.amount).ok()?;
    if porting_usd == 0 {
        return None;
    }
    let mut locked_usd = 0u64;
    for matched in &req.custodians {
        let usd = tool.total_usd(&matched.locked_amount_collateral).ok()?;
        locked_usd = locked_usd.checked_add(usd)?;
    }
    let ratio = U256::from(locked_usd) * U256::from(100u64) / U256::from(porting_usd);
    (ratio <= U256::from(u64::MAX)).then(|| ratio.as_u64())
}

/// Expiry of waiting porting requests: on timeout, or by liquidation when
/// their locked collateral drops to TP120.
pub struct ExpiredWaitingPortingProcessor;

impl PortalActionProcessor for ExpiredWaitingPortingProcessor {
    fn meta_type(&self) -> MetaType {
        MetaType::ExpiredWaitingPorting
    }

    fn touches(&self) -> Touches {
        Touches {
            porting_requests: true,
            ..Touches::NONE
        }
    }

    fn synthesize_insts(
        &self,
        ctx: &BlockContext<'_>,
        state: &CurrentPortalState,
    ) -> Result<Vec<Instruction>> {
        let tool = ctx.exchange_tool(state);
        let mut insts = Vec::new();
        for req in state.waiting_porting_requests.values() {
            let expired_by_liquidation = if PortalParams::is_timed_out(
                ctx.beacon_height,
                req.beacon_height,
                ctx.params.timeout_waiting_porting_request,
            ) {
                false
            } else {
                match porting_collateral_ratio(&tool, req) {
                    Some(ratio) if ratio <= ctx.params.tp120 => true,
                    _ => continue,
                }
            };
            debug!(
                parent: &ctx.span,
                "[qc-18] Expiring porting {} (liquidation: {})",
                req.unique_porting_id, expired_by_liquidation
            );
            insts.push(Instruction::beacon(
                self.meta_type(),
                status::SUCCESS,
                &ExpiredPortingContent {
                    unique_porting_id: req.unique_porting_id.clone(),
                    expired_by_liquidation,
                    shard_id: req.shard_id,
                },
            )?);
        }
        Ok(insts)
    }

    fn process_insts(
        &self,
        ctx: &BlockContext<'_>,
        state: &mut CurrentPortalState,
        inst: &Instruction,
    ) -> Result<()> {
        if inst.status != status::SUCCESS {
            return Err(inst.unknown_status());
        }
        let content: ExpiredPortingContent = inst.decode()?;
        let req = state
            .waiting_porting_requests
            .remove(&content.unique_porting_id)
            .ok_or_else(|| PortalError::PortingRequestNotFound(content.unique_porting_id.clone()))?;
        for matched in &req.custodians {
            let custodian = state.custodian_mut(&matched.incognito_address)?;
            for (collateral, amount) in &matched.locked_amount_collateral {
                custodian.unlock(&req.token_id, collateral, *amount)?;
            }
        }

        let mut lifecycle = PortingState::Waiting;
        lifecycle.transition_to(if content.expired_by_liquidation {
            PortingState::Liquidated
        } else {
            PortingState::Expired
        })?;
        warn!(
            parent: &ctx.span,
            "[qc-18] Porting {} {}",
            req.unique_porting_id,
            lifecycle.as_str()
        );
        state.record_status(
            StatusKind::PortingRequest,
            &req.unique_porting_id,
            lifecycle.as_str(),
            &req,
        )
    }
}
