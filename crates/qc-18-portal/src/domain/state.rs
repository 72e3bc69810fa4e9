//! # Current Portal State
//!
//! The in-memory aggregate one block works on. It is loaded from committed
//! storage at block start, mutated by the instruction pipeline, and written
//! back at block end. Nothing else holds a reference to it in between.

use super::custodian::CustodianState;
use super::exchange::{ExchangeRatesRequest, FinalExchangeRates};
use super::keys::{ObjectKey, ObjectKind};
use super::liquidation_pool::LiquidationPool;
use super::requests::{RedeemRequest, WaitingPortingRequest};
use super::rewards::LockedCollateralForRewards;
use super::status::{StatusKind, StatusRecord};
use crate::error::{PortalError, Result};
use crate::ports::PortalStateStore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Minted supply of one portal token.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSupply {
    /// Public tokens in circulation.
    pub amount: u64,
}

/// Portal state of one block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CurrentPortalState {
    /// Custodians by incognito address.
    pub custodian_pool: BTreeMap<String, CustodianState>,
    /// Waiting porting requests by porting id.
    pub waiting_porting_requests: BTreeMap<String, WaitingPortingRequest>,
    /// Waiting redeem requests by redeem id.
    pub waiting_redeem_requests: BTreeMap<String, RedeemRequest>,
    /// Matched redeem requests by redeem id.
    pub matched_redeem_requests: BTreeMap<String, RedeemRequest>,
    /// Running exchange rate table.
    pub final_exchange_rates: FinalExchangeRates,
    /// Rate submissions accepted in this block, by tx id.
    pub exchange_rates_requests: BTreeMap<String, ExchangeRatesRequest>,
    /// Seized collateral.
    pub liquidation_pool: LiquidationPool,
    /// Epoch reward weights.
    pub locked_collateral_for_rewards: LockedCollateralForRewards,
    /// External tx ids credited in this block.
    pub used_external_txs: BTreeSet<String>,
    /// Public tokens minted in this block, by token.
    pub minted_public_tokens: BTreeMap<String, u64>,
    /// Public tokens burned in this block, by token.
    pub burned_public_tokens: BTreeMap<String, u64>,
    status_records: BTreeMap<ObjectKey, Vec<u8>>,
    undo: Option<UndoLog>,
}

/// Sections of the state an instruction may write besides custodians, the
/// status records and the per-block token and tx accumulators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Touches {
    /// Waiting porting requests.
    pub porting_requests: bool,
    /// Waiting and matched redeem requests.
    pub redeem_requests: bool,
    /// Rate submissions of the block.
    pub exchange_rates_requests: bool,
    /// Epoch reward weights.
    pub reward_weights: bool,
}

impl Touches {
    /// Every section.
    pub const ALL: Self = Self {
        porting_requests: true,
        redeem_requests: true,
        exchange_rates_requests: true,
        reward_weights: true,
    };

    /// Custodians, status records and accumulators only.
    pub const NONE: Self = Self {
        porting_requests: false,
        redeem_requests: false,
        exchange_rates_requests: false,
        reward_weights: false,
    };
}

/// Prior values of the entries written since the open checkpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct UndoLog {
    custodians: BTreeMap<String, Option<CustodianState>>,
    status_records: BTreeMap<ObjectKey, Option<Vec<u8>>>,
    used_external_txs: Vec<String>,
}

/// Restore point for one instruction: copies of the sections it declared,
/// while custodians and status records are journaled as they are written.
#[must_use]
#[derive(Debug)]
pub struct Checkpoint {
    waiting_porting_requests: Option<BTreeMap<String, WaitingPortingRequest>>,
    redeem_requests: Option<(BTreeMap<String, RedeemRequest>, BTreeMap<String, RedeemRequest>)>,
    exchange_rates_requests: Option<BTreeMap<String, ExchangeRatesRequest>>,
    locked_collateral_for_rewards: Option<LockedCollateralForRewards>,
    final_exchange_rates: FinalExchangeRates,
    liquidation_pool: LiquidationPool,
    minted_public_tokens: BTreeMap<String, u64>,
    burned_public_tokens: BTreeMap<String, u64>,
}

impl CurrentPortalState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the committed state.
    ///
    /// # Errors
    ///
    /// Storage and decoding failures, and custodians violating
    /// `free + locked == total`, abort the block.
    pub fn load<S: PortalStateStore + ?Sized>(store: &S) -> Result<Self> {
        let mut state = Self::new();

        for custodian in load_kind::<S, CustodianState>(store, ObjectKind::Custodian)? {
            custodian.check_balances()?;
            state
                .custodian_pool
                .insert(custodian.incognito_address.clone(), custodian);
        }
        for req in load_kind::<S, WaitingPortingRequest>(store, ObjectKind::WaitingPorting)? {
            state
                .waiting_porting_requests
                .insert(req.unique_porting_id.clone(), req);
        }
        for req in load_kind::<S, RedeemRequest>(store, ObjectKind::WaitingRedeem)? {
            state
                .waiting_redeem_requests
                .insert(req.unique_redeem_id.clone(), req);
        }
        for req in load_kind::<S, RedeemRequest>(store, ObjectKind::MatchedRedeem)? {
            state
                .matched_redeem_requests
                .insert(req.unique_redeem_id.clone(), req);
        }
        if let Some(rates) = load_one(store, &ObjectKey::final_exchange_rates())? {
            state.final_exchange_rates = rates;
        }
        if let Some(pool) = load_one(store, &ObjectKey::liquidation_pool())? {
            state.liquidation_pool = pool;
        }
        if let Some(locked) = load_one(store, &ObjectKey::locked_collateral())? {
            state.locked_collateral_for_rewards = locked;
        }

        debug!(
            custodians = state.custodian_pool.len(),
            waiting_portings = state.waiting_porting_requests.len(),
            waiting_redeems = state.waiting_redeem_requests.len(),
            matched_redeems = state.matched_redeem_requests.len(),
            "[qc-18] Loaded portal state"
        );
        Ok(state)
    }

    /// Write the state back, deleting entities that no longer exist.
    pub fn store<S: PortalStateStore + ?Sized>(&self, store: &mut S) -> Result<()> {
        sync_kind(
            store,
            ObjectKind::Custodian,
            self.custodian_pool
                .iter()
                .map(|(addr, c)| (ObjectKey::custodian(addr), c)),
        )?;
        sync_kind(
            store,
            ObjectKind::WaitingPorting,
            self.waiting_porting_requests
                .iter()
                .map(|(id, r)| (ObjectKey::waiting_porting(id), r)),
        )?;
        sync_kind(
            store,
            ObjectKind::WaitingRedeem,
            self.waiting_redeem_requests
                .iter()
                .map(|(id, r)| (ObjectKey::waiting_redeem(id), r)),
        )?;
        sync_kind(
            store,
            ObjectKind::MatchedRedeem,
            self.matched_redeem_requests
                .iter()
                .map(|(id, r)| (ObjectKey::matched_redeem(id), r)),
        )?;

        if !self.final_exchange_rates.is_empty() {
            store.set(
                ObjectKey::final_exchange_rates(),
                serde_json::to_vec(&self.final_exchange_rates)?,
            )?;
        }
        store.set(
            ObjectKey::liquidation_pool(),
            serde_json::to_vec(&self.liquidation_pool)?,
        )?;
        store.set(
            ObjectKey::locked_collateral(),
            serde_json::to_vec(&self.locked_collateral_for_rewards)?,
        )?;

        self.store_token_supply(store)?;

        for (key, value) in &self.status_records {
            store.set(*key, value.clone())?;
        }
        Ok(())
    }

    /// Custodian by address.
    pub fn custodian(&self, address: &str) -> Result<&CustodianState> {
        self.custodian_pool
            .get(address)
            .ok_or_else(|| PortalError::CustodianNotFound(address.to_string()))
    }

    /// Mutable custodian by address.
    pub fn custodian_mut(&mut self, address: &str) -> Result<&mut CustodianState> {
        self.journal_custodian(address);
        self.custodian_pool
            .get_mut(address)
            .ok_or_else(|| PortalError::CustodianNotFound(address.to_string()))
    }

    /// Mutable custodian by address, created empty if missing.
    pub fn custodian_entry(&mut self, address: &str) -> &mut CustodianState {
        self.journal_custodian(address);
        self.custodian_pool
            .entry(address.to_string())
            .or_insert_with(|| CustodianState::new(address))
    }

    fn journal_custodian(&mut self, address: &str) {
        if let Some(undo) = &mut self.undo {
            if !undo.custodians.contains_key(address) {
                let prior = self.custodian_pool.get(address).cloned();
                undo.custodians.insert(address.to_string(), prior);
            }
        }
    }

    /// Open a restore point before applying one instruction.
    ///
    /// Sections outside `touches` are not copied: the instruction must not
    /// write them directly. Custodians must be written through
    /// [`Self::custodian_mut`] or [`Self::custodian_entry`].
    pub fn checkpoint(&mut self, touches: Touches) -> Checkpoint {
        self.undo = Some(UndoLog::default());
        Checkpoint {
            waiting_porting_requests: touches
                .porting_requests
                .then(|| self.waiting_porting_requests.clone()),
            redeem_requests: touches.redeem_requests.then(|| {
                (
                    self.waiting_redeem_requests.clone(),
                    self.matched_redeem_requests.clone(),
                )
            }),
            exchange_rates_requests: touches
                .exchange_rates_requests
                .then(|| self.exchange_rates_requests.clone()),
            locked_collateral_for_rewards: touches
                .reward_weights
                .then(|| self.locked_collateral_for_rewards.clone()),
            final_exchange_rates: self.final_exchange_rates.clone(),
            liquidation_pool: self.liquidation_pool.clone(),
            minted_public_tokens: self.minted_public_tokens.clone(),
            burned_public_tokens: self.burned_public_tokens.clone(),
        }
    }

    /// Keep everything written since `checkpoint`.
    pub fn release(&mut self, checkpoint: Checkpoint) {
        drop(checkpoint);
        self.undo = None;
    }

    /// Undo everything written since `checkpoint`.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        let undo = self.undo.take().unwrap_or_default();
        for (address, prior) in undo.custodians {
            match prior {
                Some(custodian) => {
                    self.custodian_pool.insert(address, custodian);
                }
                None => {
                    self.custodian_pool.remove(&address);
                }
            }
        }
        for (key, prior) in undo.status_records {
            match prior {
                Some(record) => {
                    self.status_records.insert(key, record);
                }
                None => {
                    self.status_records.remove(&key);
                }
            }
        }
        for tx_id in undo.used_external_txs {
            self.used_external_txs.remove(&tx_id);
        }

        if let Some(requests) = checkpoint.waiting_porting_requests {
            self.waiting_porting_requests = requests;
        }
        if let Some((waiting, matched)) = checkpoint.redeem_requests {
            self.waiting_redeem_requests = waiting;
            self.matched_redeem_requests = matched;
        }
        if let Some(requests) = checkpoint.exchange_rates_requests {
            self.exchange_rates_requests = requests;
        }
        if let Some(locked) = checkpoint.locked_collateral_for_rewards {
            self.locked_collateral_for_rewards = locked;
        }
        self.final_exchange_rates = checkpoint.final_exchange_rates;
        self.liquidation_pool = checkpoint.liquidation_pool;
        self.minted_public_tokens = checkpoint.minted_public_tokens;
        self.burned_public_tokens = checkpoint.burned_public_tokens;
    }

    /// Record a status for `id`. The record is written at block end.
    pub fn record_status<T: Serialize>(
        &mut self,
        kind: StatusKind,
        id: &str,
        status: &str,
        data: &T,
    ) -> Result<()> {
        let record = StatusRecord {
            status: status.to_string(),
            data,
        };
        let key = ObjectKey::status(kind, id);
        if let Some(undo) = &mut self.undo {
            if !undo.status_records.contains_key(&key) {
                let prior = self.status_records.get(&key).cloned();
                undo.status_records.insert(key, prior);
            }
        }
        self.status_records.insert(key, record.encode()?);
        Ok(())
    }

    /// Status recorded in this block, if any.
    pub fn pending_status(&self, kind: StatusKind, id: &str) -> Option<&[u8]> {
        self.status_records
            .get(&ObjectKey::status(kind, id))
            .map(Vec::as_slice)
    }

    /// Check if a status was recorded for `id` in this block.
    pub fn has_status(&self, kind: StatusKind, id: &str) -> bool {
        self.status_records
            .contains_key(&ObjectKey::status(kind, id))
    }

    /// Mark an external tx as credited.
    pub fn mark_external_tx_used(&mut self, external_tx_id: &str) -> Result<()> {
        if self.used_external_txs.insert(external_tx_id.to_string()) {
            if let Some(undo) = &mut self.undo {
                undo.used_external_txs.push(external_tx_id.to_string());
            }
        }
        self.record_status(StatusKind::ExternalTxUsed, external_tx_id, "Used", &external_tx_id)
    }

    /// Count public tokens minted in this block.
    pub fn record_minted(&mut self, token_id: &str, amount: u64) -> Result<()> {
        add_to(&mut self.minted_public_tokens, token_id, amount)
    }

    /// Count public tokens burned in this block.
    pub fn record_burned(&mut self, token_id: &str, amount: u64) -> Result<()> {
        add_to(&mut self.burned_public_tokens, token_id, amount)
    }

    fn store_token_supply<S: PortalStateStore + ?Sized>(&self, store: &mut S) -> Result<()> {
        let tokens: BTreeSet<&String> = self
            .minted_public_tokens
            .keys()
            .chain(self.burned_public_tokens.keys())
            .collect();

        for token in tokens {
            let key = ObjectKey::token_supply(token);
            let current: TokenSupply = load_one(store, &key)?.unwrap_or_default();
            let minted = self.minted_public_tokens.get(token).copied().unwrap_or(0);
            let burned = self.burned_public_tokens.get(token).copied().unwrap_or(0);

            let amount = current
                .amount
                .checked_add(minted)
                .and_then(|v| v.checked_sub(burned))
                .ok_or_else(|| PortalError::CorruptedState {
                    reason: format!(
                        "token {} supply {} cannot absorb +{} -{}",
                        token, current.amount, minted, burned
                    ),
                })?;
            store.set(key, serde_json::to_vec(&TokenSupply { amount })?)?;
        }
        Ok(())
    }
}

/// Read the supply record of a portal token.
pub fn load_token_supply<S: PortalStateStore + ?Sized>(
    store: &S,
    token_id: &str,
) -> Result<TokenSupply> {
    Ok(load_one(store, &ObjectKey::token_supply(token_id))?.unwrap_or_default())
}

fn add_to(map: &mut BTreeMap<String, u64>, token_id: &str, amount: u64) -> Result<()> {
    let slot = map.entry(token_id.to_string()).or_insert(0);
    *slot = slot
        .checked_add(amount)
        .ok_or(PortalError::ArithmeticOverflow("token supply"))?;
    Ok(())
}

fn load_kind<S, T>(store: &S, kind: ObjectKind) -> Result<Vec<T>>
where
    S: PortalStateStore + ?Sized,
    T: DeserializeOwned,
{
    store
        .iter_prefix(&kind.prefix())?
        .into_iter()
        .map(|(_, bytes)| serde_json::from_slice(&bytes).map_err(PortalError::from))
        .collect()
}

fn load_one<S, T>(store: &S, key: &ObjectKey) -> Result<Option<T>>
where
    S: PortalStateStore + ?Sized,
    T: DeserializeOwned,
{
    store
        .get(key)?
        .map(|bytes| serde_json::from_slice(&bytes).map_err(PortalError::from))
        .transpose()
}

fn sync_kind<'a, S, T, I>(store: &mut S, kind: ObjectKind, entries: I) -> Result<()>
where
    S: PortalStateStore + ?Sized,
    T: Serialize + 'a,
    I: Iterator<Item = (ObjectKey, &'a T)>,
{
    let mut wanted = BTreeMap::new();
    for (key, value) in entries {
        wanted.insert(key, serde_json::to_vec(value)?);
    }
    for (key, _) in store.iter_prefix(&kind.prefix())? {
        if !wanted.contains_key(&key) {
            store.delete(&key)?;
        }
    }
    for (key, value) in wanted {
        store.set(key, value)?;
    }
    Ok(())
}
