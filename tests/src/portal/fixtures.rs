//! # Portal Test Fixtures
//!
//! A single-node harness that produces and applies one block per call, plus
//! builders for the user actions the flows submit.

use qc_18_portal::config::PortalParams;
use qc_18_portal::instructions::{
    CustodianDepositAction, CustodianTopupAction, ExchangeRatesAction, MatchingRedeemAction,
    PortingRequestAction, RedeemFromLiquidationPoolAction, RedeemRequestAction,
    RequestPTokenAction, TopupWaitingPortingAction, UnlockCollateralAction,
    WithdrawRewardAction,
};
use qc_18_portal::{
    ActionPayload, CurrentPortalState, ExternalProof, InMemoryPortalStore, Instruction, MetaType,
    PortalAction, PortalManager, ProofData, StateRoot, StaticProofVerifier, TokenRate, PBTC_ID,
    PRV_ID,
};
use std::collections::BTreeMap;
use std::sync::Once;

/// One whole BTC (9 decimals)
pub const BTC: u64 = 1_000_000_000;

/// One whole PRV (9 decimals)
pub const PRV: u64 = 1_000_000_000;

/// $1 per PRV, in micro-USD
pub const PRV_RATE: u64 = 1_000_000;

/// $10,000 per BTC, in micro-USD
pub const BTC_RATE: u64 = 10_000_000_000;

/// Manager over the in-memory adapters
pub type TestManager = PortalManager<InMemoryPortalStore, StaticProofVerifier>;

/// Parameters with short timeouts and epochs
pub fn fast_params() -> PortalParams {
    PortalParams {
        timeout_waiting_porting_request: 5,
        timeout_waiting_redeem_request: 3,
        timeout_custodian_return_pub_token: 5,
        epoch_blocks: 10,
        ..PortalParams::default()
    }
}

static TRACING: Once = Once::new();

/// Route pipeline logs to the test writer; filter with `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Single node running blocks back to back.
pub struct PortalHarness {
    /// Node under test
    pub manager: TestManager,
    /// Height passed to the next block
    pub height: u64,
    /// Produced instructions and resulting root, per height
    pub history: Vec<(u64, Vec<Instruction>, StateRoot)>,
    next_tx: u64,
}

impl PortalHarness {
    /// Harness starting at height 1.
    pub fn new(params: PortalParams, verifier: StaticProofVerifier) -> Self {
        init_tracing();
        let manager = PortalManager::new(InMemoryPortalStore::new(), verifier, params)
            .expect("valid params");
        Self {
            manager,
            height: 1,
            history: Vec::new(),
            next_tx: 0,
        }
    }

    /// Harness with [`fast_params`] and no known proofs.
    pub fn with_fast_params() -> Self {
        Self::new(fast_params(), StaticProofVerifier::new())
    }

    /// Produce and apply one block from shard 0 actions.
    pub fn block(&mut self, payloads: Vec<ActionPayload>) -> Vec<Instruction> {
        self.block_with_rewards(payloads, &BTreeMap::new())
    }

    /// Produce and apply one block that also splits epoch rewards.
    pub fn block_with_rewards(
        &mut self,
        payloads: Vec<ActionPayload>,
        epoch_rewards: &BTreeMap<String, u64>,
    ) -> Vec<Instruction> {
        let actions: Vec<PortalAction> = payloads
            .into_iter()
            .map(|payload| {
                self.next_tx += 1;
                PortalAction {
                    tx_req_id: format!("tx-{}", self.next_tx),
                    shard_id: 0,
                    shard_height: self.height,
                    payload,
                }
            })
            .collect();
        let insts = self
            .manager
            .produce_block(self.height, &actions, epoch_rewards)
            .expect("produce");
        let root = self
            .manager
            .apply_block(self.height, &insts)
            .expect("apply");
        self.history.push((self.height, insts.clone(), root));
        self.height += 1;
        insts
    }

    /// Run empty blocks until `height` is next.
    pub fn run_until(&mut self, height: u64) -> Vec<Instruction> {
        let mut all = Vec::new();
        while self.height < height {
            all.extend(self.block(Vec::new()));
        }
        all
    }

    /// Committed state.
    pub fn state(&self) -> CurrentPortalState {
        self.manager.load_state().expect("load")
    }

    /// Root of the last block.
    pub fn last_root(&self) -> Option<StateRoot> {
        self.history.last().map(|(_, _, root)| *root)
    }
}

/// First instruction of `meta_type`.
pub fn find(insts: &[Instruction], meta_type: MetaType) -> Option<&Instruction> {
    insts.iter().find(|inst| inst.meta_type == meta_type)
}

/// All instructions of `meta_type`.
pub fn find_all(insts: &[Instruction], meta_type: MetaType) -> Vec<&Instruction> {
    insts
        .iter()
        .filter(|inst| inst.meta_type == meta_type)
        .collect()
}

/// Proof reference as submitted in actions.
pub fn proof(block_hash: &str, tx_index: u32) -> ExternalProof {
    ExternalProof {
        block_hash: block_hash.to_string(),
        tx_index,
        proof: vec![format!("{}-node", block_hash)],
    }
}

/// BTC transfer of `amount` from `from` to `to`, as a verifier returns it.
pub fn btc_transfer(from: &str, to: &str, amount: u64) -> ProofData {
    ProofData {
        sender_address: from.to_string(),
        token_id: PBTC_ID.to_string(),
        amount,
        receivers: [(to.to_string(), amount)].into_iter().collect(),
    }
}

/// Rate submission for PRV and BTC.
pub fn rates(prv: u64, btc: u64) -> ActionPayload {
    ActionPayload::ExchangeRates(ExchangeRatesAction {
        sender_address: "feeder".to_string(),
        rates: vec![
            TokenRate {
                token_id: PRV_ID.to_string(),
                rate: prv,
            },
            TokenRate {
                token_id: PBTC_ID.to_string(),
                rate: btc,
            },
        ],
    })
}

/// PRV deposit with a BTC remote address of `btc-<address>`.
pub fn deposit(address: &str, amount: u64) -> ActionPayload {
    let mut remote_addresses = BTreeMap::new();
    remote_addresses.insert(PBTC_ID.to_string(), format!("btc-{}", address));
    ActionPayload::CustodianDeposit(CustodianDepositAction {
        incognito_address: address.to_string(),
        remote_addresses,
        collateral_token_id: PRV_ID.to_string(),
        deposit_amount: amount,
        proof: None,
    })
}

/// BTC porting request.
pub fn porting(id: &str, porter: &str, amount: u64, fee: u64) -> ActionPayload {
    ActionPayload::RequestPorting(PortingRequestAction {
        unique_porting_id: id.to_string(),
        incognito_address: porter.to_string(),
        token_id: PBTC_ID.to_string(),
        porting_amount: amount,
        porting_fee: fee,
    })
}

/// Claim of pBTC for a porting, proven by `block_hash`/0.
pub fn ptoken(id: &str, porter: &str, amount: u64, block_hash: &str) -> ActionPayload {
    ActionPayload::RequestPToken(RequestPTokenAction {
        unique_porting_id: id.to_string(),
        token_id: PBTC_ID.to_string(),
        incognito_address: porter.to_string(),
        porting_amount: amount,
        proof: proof(block_hash, 0),
    })
}

/// pBTC redeem request.
pub fn redeem(id: &str, redeemer: &str, amount: u64, fee: u64) -> ActionPayload {
    ActionPayload::RedeemRequest(RedeemRequestAction {
        unique_redeem_id: id.to_string(),
        token_id: PBTC_ID.to_string(),
        redeem_amount: amount,
        redeemer_address: redeemer.to_string(),
        redeemer_remote_address: format!("btc-{}", redeemer),
        redeem_fee: fee,
    })
}

/// Extra free PRV locked for a waiting pBTC porting.
pub fn topup_porting(custodian: &str, porting_id: &str, free_prv: u64) -> ActionPayload {
    ActionPayload::TopUpWaitingPorting(TopupWaitingPortingAction {
        porting_id: porting_id.to_string(),
        topup: CustodianTopupAction {
            incognito_address: custodian.to_string(),
            portal_token_id: PBTC_ID.to_string(),
            collateral_token_id: PRV_ID.to_string(),
            deposit_amount: 0,
            free_collateral_amount: free_prv,
            proof: None,
        },
    })
}

/// Custodian volunteering for a redeem.
pub fn match_redeem(custodian: &str, id: &str) -> ActionPayload {
    ActionPayload::ReqMatchingRedeem(MatchingRedeemAction {
        custodian_address: custodian.to_string(),
        unique_redeem_id: id.to_string(),
    })
}

/// Custodian's proof of paying a redeem, proven by `block_hash`/0.
pub fn unlock(id: &str, custodian: &str, amount: u64, block_hash: &str) -> ActionPayload {
    ActionPayload::RequestUnlockCollateral(UnlockCollateralAction {
        unique_redeem_id: id.to_string(),
        token_id: PBTC_ID.to_string(),
        custodian_address: custodian.to_string(),
        redeem_amount: amount,
        proof: proof(block_hash, 0),
    })
}

/// pBTC redeem from the liquidation pool.
pub fn pool_redeem(redeemer: &str, amount: u64) -> ActionPayload {
    ActionPayload::RedeemFromLiquidationPool(RedeemFromLiquidationPoolAction {
        token_id: PBTC_ID.to_string(),
        redeem_amount: amount,
        redeemer_address: redeemer.to_string(),
    })
}

/// Withdrawal of a custodian's PRV rewards.
pub fn withdraw_reward(custodian: &str) -> ActionPayload {
    ActionPayload::RequestWithdrawReward(WithdrawRewardAction {
        custodian_address: custodian.to_string(),
        token_id: PRV_ID.to_string(),
    })
}
