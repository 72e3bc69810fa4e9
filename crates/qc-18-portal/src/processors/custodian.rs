//! Custodian collateral actions: deposit, withdraw, top-up and reward
//! withdrawal.

use super::{
    accept_or_reject, prepare_used_ids, unexpected, BlockContext, PortalActionProcessor,
    PreparedData,
};
use crate::domain::{CurrentPortalState, CustodianState, ExternalProof, StatusKind, Touches};
use crate::error::{PortalError, Result};
use crate::instructions::{
    status, ActionPayload, CustodianDepositAction, CustodianDepositContent, CustodianTopupAction,
    CustodianTopupContent, CustodianWithdrawContent, Instruction, MetaType, PortalAction,
    TopupWaitingPortingContent, WithdrawRewardContent,
};
use crate::ports::PortalStateStore;
use crate::PRV_ID;
use tracing::debug;

/// External tx ids of the proven deposits among `actions`.
fn collateral_tx_ids(ctx: &BlockContext<'_>, actions: &[PortalAction]) -> Vec<String> {
    actions
        .iter()
        .filter_map(|action| match &action.payload {
            ActionPayload::CustodianDeposit(a) => a.proof.as_ref(),
            ActionPayload::CustodianTopup(a) => a.proof.as_ref(),
            ActionPayload::TopUpWaitingPorting(a) => a.topup.proof.as_ref(),
            _ => None,
        })
        .map(|proof| proof.unique_id(&ctx.params.collateral_chain))
        .collect()
}

/// Amount and external tx id of a collateral deposit.
///
/// PRV is burned on the portal chain and carries no proof. Any other
/// collateral is proven on the collateral chain, and the proven amount wins
/// over the declared one.
fn verify_collateral_deposit(
    ctx: &BlockContext<'_>,
    state: &CurrentPortalState,
    prepared: &PreparedData,
    depositor: &str,
    collateral: &str,
    declared_amount: u64,
    proof: Option<&ExternalProof>,
) -> Result<(u64, Option<String>)> {
    if !ctx.params.is_collateral_token(collateral) {
        return Err(PortalError::UnsupportedCollateral(collateral.to_string()));
    }
    if collateral == PRV_ID {
        if proof.is_some() {
            return Err(PortalError::ProofRejected(
                "PRV deposits carry no external proof".to_string(),
            ));
        }
        return Ok((declared_amount, None));
    }

    let proof = proof.ok_or_else(|| {
        PortalError::ProofRejected(format!("deposit of {} needs a proof", collateral))
    })?;
    let chain = ctx.params.collateral_chain.as_str();
    let tx_id = proof.unique_id(chain);
    if prepared.is_used(&tx_id) || state.used_external_txs.contains(&tx_id) {
        return Err(PortalError::ExternalTxAlreadyUsed(tx_id));
    }
    let data = ctx.verifier.verify_proof(chain, proof)?;
    if data.token_id != collateral {
        return Err(PortalError::ProofRejected(format!(
            "proof moves {}, expected {}",
            data.token_id, collateral
        )));
    }
    if data.sender_address != depositor {
        return Err(PortalError::ProofRejected(format!(
            "proof deposits for {}, expected {}",
            data.sender_address, depositor
        )));
    }
    Ok((data.amount, Some(tx_id)))
}

/// Collateral deposit.
pub struct CustodianDepositProcessor;

impl CustodianDepositProcessor {
    fn validate(
        ctx: &BlockContext<'_>,
        state: &CurrentPortalState,
        action: &PortalAction,
        deposit: &CustodianDepositAction,
        prepared: &PreparedData,
    ) -> Result<CustodianDepositContent> {
        for token in deposit.remote_addresses.keys() {
            if !ctx.params.is_portal_token(token) {
                return Err(PortalError::UnsupportedToken(token.clone()));
            }
        }
        let is_new = state
            .custodian_pool
            .get(&deposit.incognito_address)
            .map_or(true, CustodianState::is_collateral_empty);
        if is_new && deposit.remote_addresses.is_empty() {
            return Err(PortalError::InvalidAmount(
                "first deposit needs at least one remote address".to_string(),
            ));
        }

        let (amount, external_tx_id) = verify_collateral_deposit(
            ctx,
            state,
            prepared,
            &deposit.incognito_address,
            &deposit.collateral_token_id,
            deposit.deposit_amount,
            deposit.proof.as_ref(),
        )?;
        if amount == 0 {
            return Err(PortalError::InvalidAmount("deposit of zero".to_string()));
        }

        Ok(CustodianDepositContent {
            incognito_address: deposit.incognito_address.clone(),
            remote_addresses: deposit.remote_addresses.clone(),
            collateral_token_id: deposit.collateral_token_id.clone(),
            deposit_amount: amount,
            external_tx_id,
            tx_req_id: action.tx_req_id.clone(),
            shard_id: action.shard_id,
        })
    }
}

impl PortalActionProcessor for CustodianDepositProcessor {
    fn meta_type(&self) -> MetaType {
        MetaType::CustodianDeposit
    }

    fn touches(&self) -> Touches {
        Touches::NONE
    }

    fn prepare_data(
        &self,
        ctx: &BlockContext<'_>,
        store: &dyn PortalStateStore,
        actions: &[PortalAction],
    ) -> Result<PreparedData> {
        prepare_used_ids(store, StatusKind::ExternalTxUsed, collateral_tx_ids(ctx, actions))
    }

    fn build_new_insts(
        &self,
        ctx: &BlockContext<'_>,
        state: &CurrentPortalState,
        action: &PortalAction,
        prepared: &PreparedData,
    ) -> Result<Vec<Instruction>> {
        let ActionPayload::CustodianDeposit(deposit) = &action.payload else {
            return Err(unexpected("CustodianDeposit"));
        };
        let validated = Self::validate(ctx, state, action, deposit, prepared);
        accept_or_reject(ctx, self.meta_type(), action, validated, || {
            CustodianDepositContent {
                incognito_address: deposit.incognito_address.clone(),
                remote_addresses: deposit.remote_addresses.clone(),
                collateral_token_id: deposit.collateral_token_id.clone(),
                deposit_amount: deposit.deposit_amount,
                external_tx_id: None,
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
        let content: CustodianDepositContent = inst.decode()?;
        match inst.status.as_str() {
            status::ACCEPTED => {
                let custodian = state.custodian_entry(&content.incognito_address);
                custodian.update_remote_addresses(&content.remote_addresses);
                custodian.deposit(&content.collateral_token_id, content.deposit_amount)?;
                if let Some(tx_id) = &content.external_tx_id {
                    state.mark_external_tx_used(tx_id)?;
                }
                debug!(
                    parent: &ctx.span,
                    "[qc-18] Custodian {} deposited {} of {}",
                    content.incognito_address, content.deposit_amount, content.collateral_token_id
                );
            }
            status::REJECTED => {}
            _ => return Err(inst.unknown_status()),
        }
        state.record_status(
            StatusKind::CustodianDeposit,
            &content.tx_req_id,
            &inst.status,
            &content,
        )
    }
}

/// Free collateral withdrawal.
pub struct CustodianWithdrawProcessor;

impl PortalActionProcessor for CustodianWithdrawProcessor {
    fn meta_type(&self) -> MetaType {
        MetaType::CustodianWithdraw
    }

    fn touches(&self) -> Touches {
        Touches::NONE
    }

    fn build_new_insts(
        &self,
        ctx: &BlockContext<'_>,
        state: &CurrentPortalState,
        action: &PortalAction,
        _prepared: &PreparedData,
    ) -> Result<Vec<Instruction>> {
        let ActionPayload::CustodianWithdraw(withdraw) = &action.payload else {
            return Err(unexpected("CustodianWithdraw"));
        };
        let validated = (|| -> Result<CustodianWithdrawContent> {
            if !ctx.params.is_collateral_token(&withdraw.collateral_token_id) {
                return Err(PortalError::UnsupportedCollateral(
                    withdraw.collateral_token_id.clone(),
                ));
            }
            if withdraw.amount == 0 {
                return Err(PortalError::InvalidAmount("withdraw of zero".to_string()));
            }
            let free = state
                .custodian(&withdraw.incognito_address)?
                .free(&withdraw.collateral_token_id);
            let remain = free
                .checked_sub(withdraw.amount)
                .ok_or(PortalError::InsufficientBalance {
                    what: "free collateral",
                    available: free,
                    requested: withdraw.amount,
                })?;
            Ok(CustodianWithdrawContent {
                incognito_address: withdraw.incognito_address.clone(),
                collateral_token_id: withdraw.collateral_token_id.clone(),
                amount: withdraw.amount,
                remain_free_collateral: remain,
                tx_req_id: action.tx_req_id.clone(),
                shard_id: action.shard_id,
            })
        })();
        accept_or_reject(ctx, self.meta_type(), action, validated, || {
            CustodianWithdrawContent {
                incognito_address: withdraw.incognito_address.clone(),
                collateral_token_id: withdraw.collateral_token_id.clone(),
                amount: withdraw.amount,
                remain_free_collateral: 0,
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
        let content: CustodianWithdrawContent = inst.decode()?;
        match inst.status.as_str() {
            status::ACCEPTED => state
                .custodian_mut(&content.incognito_address)?
                .withdraw(&content.collateral_token_id, content.amount)?,
            status::REJECTED => {}
            _ => return Err(inst.unknown_status()),
        }
        state.record_status(
            StatusKind::CustodianWithdraw,
            &content.tx_req_id,
            &inst.status,
            &content,
        )
    }
}

/// Check a top-up and resolve its deposit amount.
fn validate_topup(
    ctx: &BlockContext<'_>,
    state: &CurrentPortalState,
    action: &PortalAction,
    topup: &CustodianTopupAction,
    prepared: &PreparedData,
) -> Result<CustodianTopupContent> {
    if !ctx.params.is_portal_token(&topup.portal_token_id) {
        return Err(PortalError::UnsupportedToken(topup.portal_token_id.clone()));
    }
    let custodian = state.custodian(&topup.incognito_address)?;
    let free = custodian.free(&topup.collateral_token_id);
    if topup.free_collateral_amount > free {
        return Err(PortalError::InsufficientBalance {
            what: "free collateral",
            available: free,
            requested: topup.free_collateral_amount,
        });
    }

    let (deposit_amount, external_tx_id) = match (&topup.proof, topup.deposit_amount) {
        (None, 0) => {
            if !ctx.params.is_collateral_token(&topup.collateral_token_id) {
                return Err(PortalError::UnsupportedCollateral(
                    topup.collateral_token_id.clone(),
                ));
            }
            (0, None)
        }
        (proof, declared) => verify_collateral_deposit(
            ctx,
            state,
            prepared,
            &topup.incognito_address,
            &topup.collateral_token_id,
            declared,
            proof.as_ref(),
        )?,
    };

    let content = CustodianTopupContent {
        incognito_address: topup.incognito_address.clone(),
        portal_token_id: topup.portal_token_id.clone(),
        collateral_token_id: topup.collateral_token_id.clone(),
        deposit_amount,
        free_collateral_amount: topup.free_collateral_amount,
        external_tx_id,
        tx_req_id: action.tx_req_id.clone(),
        shard_id: action.shard_id,
    };
    match content.lock_amount() {
        Some(0) => Err(PortalError::InvalidAmount("top-up of zero".to_string())),
        Some(_) => Ok(content),
        None => Err(PortalError::ArithmeticOverflow("top-up amount")),
    }
}

fn rejected_topup(action: &PortalAction, topup: &CustodianTopupAction) -> CustodianTopupContent {
    CustodianTopupContent {
        incognito_address: topup.incognito_address.clone(),
        portal_token_id: topup.portal_token_id.clone(),
        collateral_token_id: topup.collateral_token_id.clone(),
        deposit_amount: topup.deposit_amount,
        free_collateral_amount: topup.free_collateral_amount,
        external_tx_id: None,
        tx_req_id: action.tx_req_id.clone(),
        shard_id: action.shard_id,
    }
}

/// Deposit, then lock `deposit + free` for the portal token.
fn apply_topup(state: &mut CurrentPortalState, content: &CustodianTopupContent) -> Result<u64> {
    let lock_amount = content
        .lock_amount()
        .ok_or(PortalError::ArithmeticOverflow("top-up amount"))?;
    let custodian = state.custodian_mut(&content.incognito_address)?;
    if content.deposit_amount > 0 {
        custodian.deposit(&content.collateral_token_id, content.deposit_amount)?;
    }
    custodian.lock(
        &content.portal_token_id,
        &content.collateral_token_id,
        lock_amount,
    )?;
    if let Some(tx_id) = &content.external_tx_id {
        state.mark_external_tx_used(tx_id)?;
    }
    Ok(lock_amount)
}

/// Top-up of the collateral backing a portal token.
pub struct CustodianTopupProcessor;

impl PortalActionProcessor for CustodianTopupProcessor {
    fn meta_type(&self) -> MetaType {
        MetaType::CustodianTopup
    }

    fn touches(&self) -> Touches {
        Touches::NONE
    }

    fn prepare_data(
        &self,
        ctx: &BlockContext<'_>,
        store: &dyn PortalStateStore,
        actions: &[PortalAction],
    ) -> Result<PreparedData> {
        prepare_used_ids(store, StatusKind::ExternalTxUsed, collateral_tx_ids(ctx, actions))
    }

    fn build_new_insts(
        &self,
        ctx: &BlockContext<'_>,
        state: &CurrentPortalState,
        action: &PortalAction,
        prepared: &PreparedData,
    ) -> Result<Vec<Instruction>> {
        let ActionPayload::CustodianTopup(topup) = &action.payload else {
            return Err(unexpected("CustodianTopup"));
        };
        let validated = validate_topup(ctx, state, action, topup, prepared);
        accept_or_reject(ctx, self.meta_type(), action, validated, || {
            rejected_topup(action, topup)
        })
    }

    fn process_insts(
        &self,
        _ctx: &BlockContext<'_>,
        state: &mut CurrentPortalState,
        inst: &Instruction,
    ) -> Result<()> {
        let content: CustodianTopupContent = inst.decode()?;
        match inst.status.as_str() {
            status::ACCEPTED => {
                apply_topup(state, &content)?;
            }
            status::REJECTED => {}
            _ => return Err(inst.unknown_status()),
        }
        state.record_status(
            StatusKind::CustodianTopup,
            &content.tx_req_id,
            &inst.status,
            &content,
        )
    }
}

/// Top-up of the collateral locked for a waiting porting request.
///
/// The extra collateral is also credited to the request, so expiry unlocks
/// it again.
pub struct TopupWaitingPortingProcessor;

impl PortalActionProcessor for TopupWaitingPortingProcessor {
    fn meta_type(&self) -> MetaType {
        MetaType::TopUpWaitingPorting
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
        prepare_used_ids(store, StatusKind::ExternalTxUsed, collateral_tx_ids(ctx, actions))
    }

    fn build_new_insts(
        &self,
        ctx: &BlockContext<'_>,
        state: &CurrentPortalState,
        action: &PortalAction,
        prepared: &PreparedData,
    ) -> Result<Vec<Instruction>> {
        let ActionPayload::TopUpWaitingPorting(req) = &action.payload else {
            return Err(unexpected("TopUpWaitingPorting"));
        };
        let validated = (|| -> Result<TopupWaitingPortingContent> {
            let porting = state
                .waiting_porting_requests
                .get(&req.porting_id)
                .ok_or_else(|| PortalError::PortingRequestNotFound(req.porting_id.clone()))?;
            if porting.token_id != req.topup.portal_token_id {
                return Err(PortalError::UnsupportedToken(format!(
                    "porting {} is for {}, not {}",
                    req.porting_id, porting.token_id, req.topup.portal_token_id
                )));
            }
            if porting.custodian(&req.topup.incognito_address).is_none() {
                return Err(PortalError::CustodianNotFound(format!(
                    "{} in porting {}",
                    req.topup.incognito_address, req.porting_id
                )));
            }
            Ok(TopupWaitingPortingContent {
                porting_id: req.porting_id.clone(),
                topup: validate_topup(ctx, state, action, &req.topup, prepared)?,
            })
        })();
        accept_or_reject(ctx, self.meta_type(), action, validated, || {
            TopupWaitingPortingContent {
                porting_id: req.porting_id.clone(),
                topup: rejected_topup(action, &req.topup),
            }
        })
    }

    fn process_insts(
        &self,
        _ctx: &BlockContext<'_>,
        state: &mut CurrentPortalState,
        inst: &Instruction,
    ) -> Result<()> {
        let content: TopupWaitingPortingContent = inst.decode()?;
        match inst.status.as_str() {
            status::ACCEPTED => {
                let locked = apply_topup(state, &content.topup)?;
                let porting = state
                    .waiting_porting_requests
                    .get_mut(&content.porting_id)
                    .ok_or_else(|| PortalError::PortingRequestNotFound(content.porting_id.clone()))?;
                let matched = porting
                    .custodian_mut(&content.topup.incognito_address)
                    .ok_or_else(|| {
                        PortalError::CustodianNotFound(content.topup.incognito_address.clone())
                    })?;
                let slot = matched
                    .locked_amount_collateral
                    .entry(content.topup.collateral_token_id.clone())
                    .or_insert(0);
                *slot = slot
                    .checked_add(locked)
                    .ok_or(PortalError::ArithmeticOverflow("waiting porting top-up"))?;
            }
            status::REJECTED => {}
            _ => return Err(inst.unknown_status()),
        }
        state.record_status(
            StatusKind::TopupWaitingPorting,
            &content.topup.tx_req_id,
            &inst.status,
            &content,
        )
    }
}

/// Reward withdrawal. The whole balance of the token is paid out.
pub struct WithdrawRewardProcessor;

impl PortalActionProcessor for WithdrawRewardProcessor {
    fn meta_type(&self) -> MetaType {
        MetaType::RequestWithdrawReward
    }

    fn touches(&self) -> Touches {
        Touches::NONE
    }

    fn build_new_insts(
        &self,
        ctx: &BlockContext<'_>,
        state: &CurrentPortalState,
        action: &PortalAction,
        _prepared: &PreparedData,
    ) -> Result<Vec<Instruction>> {
        let ActionPayload::RequestWithdrawReward(req) = &action.payload else {
            return Err(unexpected("RequestWithdrawReward"));
        };
        let validated = state.custodian(&req.custodian_address).and_then(|c| {
            match c.reward(&req.token_id) {
                0 => Err(PortalError::InvalidAmount(format!(
                    "no {} reward to withdraw",
                    req.token_id
                ))),
                reward_amount => Ok(WithdrawRewardContent {
                    custodian_address: req.custodian_address.clone(),
                    token_id: req.token_id.clone(),
                    reward_amount,
                    tx_req_id: action.tx_req_id.clone(),
                    shard_id: action.shard_id,
                }),
            }
        });
        accept_or_reject(ctx, self.meta_type(), action, validated, || {
            WithdrawRewardContent {
                custodian_address: req.custodian_address.clone(),
                token_id: req.token_id.clone(),
                reward_amount: 0,
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
        let content: WithdrawRewardContent = inst.decode()?;
        match inst.status.as_str() {
            status::ACCEPTED => {
                let custodian = state.custodian_mut(&content.custodian_address)?;
                let available = custodian.reward(&content.token_id);
                if available < content.reward_amount {
                    return Err(PortalError::InsufficientBalance {
                        what: "reward",
                        available,
                        requested: content.reward_amount,
                    });
                }
                custodian.take_reward(&content.token_id);
                let rest = available - content.reward_amount;
                if rest > 0 {
                    custodian.add_reward(&content.token_id, rest)?;
                }
            }
            status::REJECTED => {}
            _ => return Err(inst.unknown_status()),
        }
        state.record_status(
            StatusKind::WithdrawReward,
            &content.tx_req_id,
            &inst.status,
            &content,
        )
    }
}
