//! Exchange rate submissions.
//!
//! Accepted submissions are collected in the state for the block; the final
//! table is picked from them (per-token median) after all instructions are
//! applied.

use super::{
    accept_or_reject, prepare_used_ids, unexpected, BlockContext, PortalActionProcessor,
    PreparedData,
};
use crate::domain::{CurrentPortalState, ExchangeRatesRequest, StatusKind, Touches};
use crate::error::{PortalError, Result};
use crate::instructions::{
    status, ActionPayload, ExchangeRatesAction, ExchangeRatesContent, Instruction, MetaType,
    PortalAction,
};
use crate::ports::PortalStateStore;

/// Rate feeder submission.
pub struct ExchangeRatesProcessor;

impl ExchangeRatesProcessor {
    fn validate(
        ctx: &BlockContext<'_>,
        state: &CurrentPortalState,
        action: &PortalAction,
        req: &ExchangeRatesAction,
        prepared: &PreparedData,
    ) -> Result<ExchangeRatesContent> {
        if prepared.is_used(&action.tx_req_id)
            || state.exchange_rates_requests.contains_key(&action.tx_req_id)
        {
            return Err(PortalError::DuplicateId(action.tx_req_id.clone()));
        }
        if !ctx.params.is_authorized_feeder(&req.sender_address) {
            return Err(PortalError::Unauthorized(req.sender_address.clone()));
        }
        if req.rates.is_empty() {
            return Err(PortalError::InvalidAmount("no rates submitted".to_string()));
        }
        for rate in &req.rates {
            if !ctx.params.is_portal_token(&rate.token_id)
                && !ctx.params.is_collateral_token(&rate.token_id)
            {
                return Err(PortalError::UnsupportedToken(rate.token_id.clone()));
            }
            if rate.rate == 0 {
                return Err(PortalError::InvalidAmount(format!(
                    "zero rate for {}",
                    rate.token_id
                )));
            }
        }
        Ok(ExchangeRatesContent {
            sender_address: req.sender_address.clone(),
            rates: req.rates.clone(),
            tx_req_id: action.tx_req_id.clone(),
            shard_id: action.shard_id,
        })
    }
}

impl PortalActionProcessor for ExchangeRatesProcessor {
    fn meta_type(&self) -> MetaType {
        MetaType::ExchangeRates
    }

    fn touches(&self) -> Touches {
        Touches {
            exchange_rates_requests: true,
            ..Touches::NONE
        }
    }

    fn prepare_data(
        &self,
        _ctx: &BlockContext<'_>,
        store: &dyn PortalStateStore,
        actions: &[PortalAction],
    ) -> Result<PreparedData> {
        prepare_used_ids(
            store,
            StatusKind::ExchangeRates,
            actions.iter().map(|a| a.tx_req_id.clone()),
        )
    }

    fn build_new_insts(
        &self,
        ctx: &BlockContext<'_>,
        state: &CurrentPortalState,
        action: &PortalAction,
        prepared: &PreparedData,
    ) -> Result<Vec<Instruction>> {
        let ActionPayload::ExchangeRates(req) = &action.payload else {
            return Err(unexpected("ExchangeRates"));
        };
        let validated = Self::validate(ctx, state, action, req, prepared);
        accept_or_reject(ctx, self.meta_type(), action, validated, || {
            ExchangeRatesContent {
                sender_address: req.sender_address.clone(),
                rates: req.rates.clone(),
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
        let content: ExchangeRatesContent = inst.decode()?;
        match inst.status.as_str() {
            status::ACCEPTED => {
                state.exchange_rates_requests.insert(
                    content.tx_req_id.clone(),
                    ExchangeRatesRequest {
                        sender_address: content.sender_address.clone(),
                        rates: content.rates.clone(),
                    },
                );
            }
            status::REJECTED => {}
            _ => return Err(inst.unknown_status()),
        }
        state.record_status(
            StatusKind::ExchangeRates,
            &content.tx_req_id,
            &inst.status,
            &content,
        )
    }
}
