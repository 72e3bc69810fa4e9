//! # Portal Manager
//!
//! Entry point of the beacon chain into the portal. Owns the state store,
//! the proof verifier and the processor registry.
//!
//! ## Produce
//!
//! ```text
//! load ─> ExpiredWaitingPorting ─> LiquidateCustodian ─> LiquidateByRates
//!     ─> user actions (by meta type, then shard, then arrival)
//!     ─> PickMoreCustodianForRedeem ─> PortalTotalReward? ─> PortalReward
//! ```
//!
//! Every produced instruction is applied to a scratch copy of the state
//! right away, so later actions are validated against earlier effects. The
//! scratch copy is discarded.
//!
//! ## Apply
//!
//! ```text
//! load ─> process each instruction ─> pick final rates ─> check ─> store ─> commit
//! ```
//!
//! An instruction failing with a skippable error leaves the state as it was
//! before it; a block-fatal error aborts the block with nothing written.

use crate::algorithms::pick_final_rates;
use crate::config::PortalParams;
use crate::domain::{invariant_state, CurrentPortalState};
use crate::error::Result;
use crate::instructions::{parse_block_instructions, Instruction, MetaType, PortalAction};
use crate::ports::{PortalBlockHandler, PortalStateStore, ProofVerifier, StateRoot};
use crate::processors::{BlockContext, Phase, ProcessorRegistry, ProducerInputs};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Producer-synthesized instructions that run before user actions.
const SYNTHESIZED_BEFORE_ACTIONS: [MetaType; 3] = [
    MetaType::ExpiredWaitingPorting,
    MetaType::LiquidateCustodian,
    MetaType::LiquidateByRates,
];

/// Producer-synthesized instructions that run after user actions.
const SYNTHESIZED_AFTER_ACTIONS: [MetaType; 2] =
    [MetaType::PickMoreCustodianForRedeem, MetaType::PortalReward];

/// Portal state machine over a store and a proof verifier.
pub struct PortalManager<S: PortalStateStore, V: ProofVerifier> {
    store: S,
    verifier: V,
    params: PortalParams,
    registry: ProcessorRegistry,
}

impl<S: PortalStateStore, V: ProofVerifier> PortalManager<S, V> {
    /// Create a manager with the default processors.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the parameters do not validate.
    pub fn new(store: S, verifier: V, params: PortalParams) -> Result<Self> {
        params.validate()?;
        info!(
            "[qc-18] Portal manager ready: {} portal tokens, {} collateral tokens",
            params.portal_tokens.len(),
            params.collateral_tokens.len()
        );
        Ok(Self {
            store,
            verifier,
            params,
            registry: ProcessorRegistry::with_default_processors(),
        })
    }

    /// Replace the processor registry.
    pub fn with_registry(mut self, registry: ProcessorRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Portal parameters.
    pub fn params(&self) -> &PortalParams {
        &self.params
    }

    /// State store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Mutable state store.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Proof verifier.
    pub fn verifier(&self) -> &V {
        &self.verifier
    }

    /// Load the committed state.
    pub fn load_state(&self) -> Result<CurrentPortalState> {
        CurrentPortalState::load(&self.store)
    }

    /// Build the portal instructions of the block after `beacon_height`.
    pub fn produce_block(
        &self,
        beacon_height: u64,
        actions: &[PortalAction],
        epoch_rewards: &BTreeMap<String, u64>,
    ) -> Result<Vec<Instruction>> {
        let mut scratch = self.load_state()?;
        let inputs = ProducerInputs {
            matched_redeems_before: scratch.matched_redeem_requests.keys().cloned().collect(),
            epoch_rewards: epoch_rewards.clone(),
        };
        let ctx = BlockContext::new(beacon_height, Phase::Produce, &self.params, &self.verifier)
            .with_producer_inputs(inputs);
        let span = ctx.span.clone();
        let _guard = span.enter();

        let mut insts = Vec::new();
        for meta_type in SYNTHESIZED_BEFORE_ACTIONS {
            self.synthesize(&ctx, &mut scratch, meta_type, &mut insts)?;
        }

        let mut groups: BTreeMap<MetaType, BTreeMap<u8, Vec<PortalAction>>> = BTreeMap::new();
        for action in actions {
            groups
                .entry(action.meta_type())
                .or_default()
                .entry(action.shard_id)
                .or_default()
                .push(action.clone());
        }
        for (meta_type, shards) in &groups {
            let Some(processor) = self.registry.get(*meta_type) else {
                warn!("[qc-18] No processor for {}, dropping its actions", meta_type);
                continue;
            };
            for (shard_id, shard_actions) in shards {
                let prepared = processor.prepare_data(&ctx, &self.store, shard_actions)?;
                debug!(
                    "[qc-18] Building {} actions of {} from shard {}",
                    shard_actions.len(),
                    meta_type,
                    shard_id
                );
                for action in shard_actions {
                    match processor.build_new_insts(&ctx, &scratch, action, &prepared) {
                        Ok(built) => {
                            for inst in built {
                                if self.apply_or_rollback(&ctx, &mut scratch, &inst)? {
                                    insts.push(inst);
                                }
                            }
                        }
                        Err(e) if e.is_skippable() => {
                            warn!(
                                tx = %action.tx_req_id,
                                error = %e,
                                "[qc-18] Skipping {} action",
                                meta_type
                            );
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }

        for meta_type in SYNTHESIZED_AFTER_ACTIONS {
            self.synthesize(&ctx, &mut scratch, meta_type, &mut insts)?;
        }

        info!(
            "[qc-18] Produced {} portal instructions from {} actions",
            insts.len(),
            actions.len()
        );
        Ok(insts)
    }

    /// Apply the portal instructions of the block after `beacon_height` and
    /// commit.
    pub fn apply_block(&mut self, beacon_height: u64, insts: &[Instruction]) -> Result<StateRoot> {
        let mut state = self.load_state()?;
        let ctx = BlockContext::new(beacon_height, Phase::Apply, &self.params, &self.verifier);
        let span = ctx.span.clone();
        let _guard = span.enter();

        let mut applied = 0usize;
        for inst in insts {
            if self.apply_or_rollback(&ctx, &mut state, inst)? {
                applied += 1;
            }
        }

        let updated = pick_final_rates(
            &mut state.final_exchange_rates,
            &state.exchange_rates_requests,
        );
        if !updated.is_empty() {
            debug!("[qc-18] Final rates updated for {:?}", updated);
        }
        invariant_state(&state)?;

        state.store(&mut self.store)?;
        let root = self.store.commit()?;
        info!(
            "[qc-18] Applied {}/{} portal instructions, root {}",
            applied,
            insts.len(),
            hex::encode(root)
        );
        Ok(root)
    }

    /// Apply a block given as consensus string tuples. Tuples that are not
    /// portal instructions are ignored.
    pub fn apply_raw_block(&mut self, beacon_height: u64, raw: &[Vec<String>]) -> Result<StateRoot> {
        let insts = parse_block_instructions(raw);
        self.apply_block(beacon_height, &insts)
    }

    fn synthesize(
        &self,
        ctx: &BlockContext<'_>,
        scratch: &mut CurrentPortalState,
        meta_type: MetaType,
        out: &mut Vec<Instruction>,
    ) -> Result<()> {
        let Some(processor) = self.registry.get(meta_type) else {
            return Ok(());
        };
        for inst in processor.synthesize_insts(ctx, scratch)? {
            if self.apply_or_rollback(ctx, scratch, &inst)? {
                out.push(inst);
            }
        }
        Ok(())
    }

    /// Apply one instruction. A skippable failure restores the state and
    /// returns `false`.
    fn apply_or_rollback(
        &self,
        ctx: &BlockContext<'_>,
        state: &mut CurrentPortalState,
        inst: &Instruction,
    ) -> Result<bool> {
        let checkpoint = state.checkpoint(self.registry.touches(inst.meta_type));
        match self.registry.process_inst(ctx, state, inst) {
            Ok(()) => {
                state.release(checkpoint);
                Ok(true)
            }
            Err(e) if e.is_skippable() => {
                warn!(
                    error = %e,
                    status = %inst.status,
                    "[qc-18] Skipping {} instruction",
                    inst.meta_type
                );
                state.rollback(checkpoint);
                Ok(false)
            }
            Err(e) => {
                state.rollback(checkpoint);
                Err(e)
            }
        }
    }
}

impl<S: PortalStateStore, V: ProofVerifier> PortalBlockHandler for PortalManager<S, V> {
    fn produce_block(
        &mut self,
        beacon_height: u64,
        actions: &[PortalAction],
        epoch_rewards: &BTreeMap<String, u64>,
    ) -> Result<Vec<Instruction>> {
        PortalManager::produce_block(self, beacon_height, actions, epoch_rewards)
    }

    fn apply_block(&mut self, beacon_height: u64, insts: &[Instruction]) -> Result<StateRoot> {
        PortalManager::apply_block(self, beacon_height, insts)
    }
}
