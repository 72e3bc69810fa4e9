//! # Action Processors
//!
//! One processor per meta type. A processor can take part in both block
//! phases:
//!
//! - produce: `prepare_data` once per group of actions of its meta type and
//!   shard, then `build_new_insts` per action; or `synthesize_insts` for
//!   instructions the producer creates from state alone
//! - apply: `process_insts` per instruction
//!
//! Producers never fail an action they can answer with a `Rejected`
//! instruction; only block-fatal errors leave a processor.

pub mod custodian;
pub mod exchange_rates;
pub mod liquidation;
pub mod porting;
pub mod redeem;
pub mod rewards;

pub use custodian::{
    CustodianDepositProcessor, CustodianTopupProcessor, CustodianWithdrawProcessor,
    TopupWaitingPortingProcessor, WithdrawRewardProcessor,
};
pub use exchange_rates::ExchangeRatesProcessor;
pub use liquidation::{
    LiquidationByRatesProcessor, RedeemFromLiquidationPoolProcessor, RunawayLiquidationProcessor,
};
pub use porting::{ExpiredWaitingPortingProcessor, PortingRequestProcessor, RequestPTokenProcessor};
pub use redeem::{
    MatchingRedeemProcessor, PickMoreCustodianProcessor, RedeemRequestProcessor,
    UnlockCollateralProcessor,
};
pub use rewards::{PortalRewardProcessor, PortalTotalRewardProcessor};

use crate::algorithms::PortalExchangeRateTool;
use crate::config::PortalParams;
use crate::domain::{CurrentPortalState, ObjectKey, StatusKind, Touches};
use crate::error::{PortalError, Result};
use crate::instructions::{status, Instruction, MetaType, PortalAction};
use crate::ports::{PortalStateStore, ProofVerifier};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info_span, warn, Span};

/// Block phase a context is built for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Building instructions for a new beacon block.
    Produce,
    /// Applying the instructions of a beacon block.
    Apply,
}

impl Phase {
    /// Name used in spans.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Produce => "produce",
            Self::Apply => "apply",
        }
    }
}

/// Inputs only the producer has.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProducerInputs {
    /// Matched redeem ids at block start; redeems matched later in the block
    /// pay their fee in this block's rewards.
    pub matched_redeems_before: BTreeSet<String>,
    /// Epoch rewards to split among custodians, by token.
    pub epoch_rewards: BTreeMap<String, u64>,
}

/// Everything a processor may read besides the state.
pub struct BlockContext<'a> {
    /// Height of the previous beacon block.
    pub beacon_height: u64,
    /// Block phase.
    pub phase: Phase,
    /// Portal parameters.
    pub params: &'a PortalParams,
    /// External-chain proof verifier.
    pub verifier: &'a dyn ProofVerifier,
    /// Span all block logs are attached to.
    pub span: Span,
    /// Producer-only inputs.
    pub producer: Option<ProducerInputs>,
}

impl<'a> BlockContext<'a> {
    /// Create a context for one block.
    pub fn new(
        beacon_height: u64,
        phase: Phase,
        params: &'a PortalParams,
        verifier: &'a dyn ProofVerifier,
    ) -> Self {
        let span = info_span!(
            "portal_block",
            beacon_height,
            phase = phase.as_str()
        );
        Self {
            beacon_height,
            phase,
            params,
            verifier,
            span,
            producer: None,
        }
    }

    /// Attach producer inputs.
    pub fn with_producer_inputs(mut self, inputs: ProducerInputs) -> Self {
        self.producer = Some(inputs);
        self
    }

    /// Height of the block being built or applied.
    pub fn new_height(&self) -> u64 {
        self.beacon_height.saturating_add(1)
    }

    /// Exchange tool over the state's final rates.
    pub fn exchange_tool(&self, state: &CurrentPortalState) -> PortalExchangeRateTool {
        PortalExchangeRateTool::new(&state.final_exchange_rates, self.params)
    }
}

/// Data a processor reads from committed storage once per action group.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum PreparedData {
    /// Nothing prepared.
    #[default]
    None,
    /// Ids already recorded in storage.
    UsedIds(BTreeSet<String>),
}

impl PreparedData {
    /// Check if `id` was already recorded before this block.
    pub fn is_used(&self, id: &str) -> bool {
        match self {
            Self::None => false,
            Self::UsedIds(ids) => ids.contains(id),
        }
    }
}

/// Look up which of `ids` already have a status record of `kind`.
pub fn prepare_used_ids<I>(
    store: &dyn PortalStateStore,
    kind: StatusKind,
    ids: I,
) -> Result<PreparedData>
where
    I: IntoIterator<Item = String>,
{
    let mut used = BTreeSet::new();
    for id in ids {
        if store.get(&ObjectKey::status(kind, &id))?.is_some() {
            used.insert(id);
        }
    }
    Ok(PreparedData::UsedIds(used))
}

/// Handler for one portal meta type.
pub trait PortalActionProcessor {
    /// Meta type handled.
    fn meta_type(&self) -> MetaType;

    /// Read what `build_new_insts` needs from committed storage.
    fn prepare_data(
        &self,
        _ctx: &BlockContext<'_>,
        _store: &dyn PortalStateStore,
        _actions: &[PortalAction],
    ) -> Result<PreparedData> {
        Ok(PreparedData::None)
    }

    /// Build the instructions answering one user action.
    fn build_new_insts(
        &self,
        _ctx: &BlockContext<'_>,
        _state: &CurrentPortalState,
        _action: &PortalAction,
        _prepared: &PreparedData,
    ) -> Result<Vec<Instruction>> {
        Err(PortalError::UnexpectedPayload {
            expected: "no user action",
        })
    }

    /// Build instructions the producer creates without a user action.
    fn synthesize_insts(
        &self,
        _ctx: &BlockContext<'_>,
        _state: &CurrentPortalState,
    ) -> Result<Vec<Instruction>> {
        Ok(Vec::new())
    }

    /// State sections `process_insts` writes directly, copied before each
    /// instruction so a failure can be undone.
    fn touches(&self) -> Touches {
        Touches::ALL
    }

    /// Apply one instruction to the state.
    fn process_insts(
        &self,
        ctx: &BlockContext<'_>,
        state: &mut CurrentPortalState,
        inst: &Instruction,
    ) -> Result<()>;
}

/// Processors by meta type.
pub struct ProcessorRegistry {
    processors: BTreeMap<MetaType, Box<dyn PortalActionProcessor>>,
}

impl ProcessorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            processors: BTreeMap::new(),
        }
    }

    /// Registry with a processor for every meta type.
    pub fn with_default_processors() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(CustodianDepositProcessor));
        registry.register(Box::new(PortingRequestProcessor));
        registry.register(Box::new(RequestPTokenProcessor));
        registry.register(Box::new(RedeemRequestProcessor));
        registry.register(Box::new(ExchangeRatesProcessor));
        registry.register(Box::new(UnlockCollateralProcessor));
        registry.register(Box::new(RunawayLiquidationProcessor));
        registry.register(Box::new(WithdrawRewardProcessor));
        registry.register(Box::new(ExpiredWaitingPortingProcessor));
        registry.register(Box::new(RedeemFromLiquidationPoolProcessor));
        registry.register(Box::new(CustodianTopupProcessor));
        registry.register(Box::new(TopupWaitingPortingProcessor));
        registry.register(Box::new(MatchingRedeemProcessor));
        registry.register(Box::new(PickMoreCustodianProcessor));
        registry.register(Box::new(CustodianWithdrawProcessor));
        registry.register(Box::new(LiquidationByRatesProcessor));
        registry.register(Box::new(PortalRewardProcessor));
        registry.register(Box::new(PortalTotalRewardProcessor));
        registry
    }

    /// Register a processor, replacing any previous one for its meta type.
    pub fn register(&mut self, processor: Box<dyn PortalActionProcessor>) {
        self.processors.insert(processor.meta_type(), processor);
    }

    /// Processor for a meta type.
    pub fn get(&self, meta_type: MetaType) -> Option<&dyn PortalActionProcessor> {
        self.processors.get(&meta_type).map(|p| p.as_ref())
    }

    /// Number of registered processors.
    pub fn len(&self) -> usize {
        self.processors.len()
    }

    /// Check if no processor is registered.
    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Apply an instruction with the processor of its meta type.
    pub fn process_inst(
        &self,
        ctx: &BlockContext<'_>,
        state: &mut CurrentPortalState,
        inst: &Instruction,
    ) -> Result<()> {
        let processor = self.get(inst.meta_type).ok_or_else(|| {
            PortalError::MalformedInstruction(format!("no processor for {}", inst.meta_type))
        })?;
        processor.process_insts(ctx, state, inst)
    }

    /// Sections the processor of `meta_type` writes; all if unregistered.
    pub fn touches(&self, meta_type: MetaType) -> Touches {
        self.get(meta_type).map_or(Touches::ALL, |p| p.touches())
    }
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::with_default_processors()
    }
}

/// Turn a validation result into an `Accepted` instruction, or a `Rejected`
/// one carrying `rejected` when the failure is skippable.
pub(crate) fn accept_or_reject<T: Serialize>(
    ctx: &BlockContext<'_>,
    meta_type: MetaType,
    action: &PortalAction,
    validated: Result<T>,
    rejected: impl FnOnce() -> T,
) -> Result<Vec<Instruction>> {
    match validated {
        Ok(content) => Ok(vec![Instruction::shard(
            meta_type,
            action.shard_id,
            status::ACCEPTED,
            &content,
        )?]),
        Err(e) if e.is_skippable() => {
            warn!(
                parent: &ctx.span,
                tx = %action.tx_req_id,
                error = %e,
                "[qc-18] Rejecting {}",
                meta_type
            );
            Ok(vec![Instruction::shard(
                meta_type,
                action.shard_id,
                status::REJECTED,
                &rejected(),
            )?])
        }
        Err(e) => Err(e),
    }
}

/// Reject an action routed to the wrong processor.
pub(crate) fn unexpected(expected: &'static str) -> PortalError {
    PortalError::UnexpectedPayload { expected }
}
