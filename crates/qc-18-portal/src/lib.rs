//! # QC-18 Portal Bridge
//!
//! Custodian-backed bridge between public chains and the shielded chain.
//!
//! **Subsystem ID:** 18
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//! **Execution:** Deterministic block state machine
//!
//! ## Purpose
//!
//! Let users move BTC, BNB and other public tokens into shielded form and
//! back, backed by over-collateralized custodians:
//! - Porting: custodians lock collateral, the user pays them on the public
//!   chain, the portal mints the shielded token
//! - Redeem: the user burns the shielded token, custodians pay on the public
//!   chain and get their collateral back
//! - Liquidation: custodians that run away or fall under collateral seize
//!   their collateral to the redeemers or the liquidation pool
//! - Rewards: fees and epoch rewards are split among custodians
//!
//! ## Safety Thresholds
//!
//! | Threshold | Default | Effect |
//! |-----------|---------|--------|
//! | Locked collateral | 150% | Collateral locked per ported value |
//! | TP130 | 130% | Warning with top-up amount |
//! | TP120 | 120% | Liquidation by exchange rates |
//! | Max liquidated | 105% | Cap on collateral seized per redeem |
//!
//! ## Module Structure
//!
//! ```text
//! qc-18-portal/
//! ├── domain/          # Custodian, requests, pool, rewards, keys, state
//! ├── algorithms/      # Rate tool, matching, collateral, fee split, median
//! ├── instructions/    # Meta types, user actions, instruction payloads
//! ├── processors/      # One processor per meta type, registry
//! ├── ports/           # PortalBlockHandler, PortalStateStore, ProofVerifier
//! ├── adapters/        # In-memory store, static proof verifier
//! └── manager.rs       # Produce / apply pipeline
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod config;
pub mod domain;
pub mod error;
pub mod instructions;
pub mod manager;
pub mod ports;
pub mod processors;

// Re-exports
pub use adapters::{InMemoryPortalStore, StaticProofVerifier};
pub use algorithms::{median, pick_final_rates, split_proportional, PortalExchangeRateTool};
pub use config::PortalParams;
pub use domain::{
    invariant_state, CurrentPortalState, CustodianState, ExternalProof, ObjectKey, RedeemRequest,
    StatusKind, TokenRate, WaitingPortingRequest,
};
pub use error::{PortalError, Result, Severity};
pub use instructions::{parse_block_instructions, ActionPayload, Instruction, MetaType, PortalAction};
pub use manager::PortalManager;
pub use ports::{PortalBlockHandler, PortalStateStore, ProofData, ProofVerifier, StateRoot};
pub use processors::{BlockContext, Phase, PortalActionProcessor, ProcessorRegistry};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Subsystem identifier
pub const SUBSYSTEM_ID: u8 = 18;

/// Native token id; always a collateral token
pub const PRV_ID: &str = "0000000000000000000000000000000000000000000000000000000000000004";

/// Shielded BTC
pub const PBTC_ID: &str = "b832e5d3b1f01a4f0623f7fe91d6673461e1f5d37d91fe78c5c2e6183ff39696";

/// Shielded BNB
pub const PBNB_ID: &str = "b2655152784e8639fa19521a7035f331eea1f1e911b2f3200a507ebb4554387b";

/// USDT collateral (ERC-20 contract address)
pub const USDT_ID: &str = "dac17f958d2ee523a2206206994597c13d831ec7";

/// DAI collateral (ERC-20 contract address)
pub const DAI_ID: &str = "6b175474e89094c44da98b954eedeac495271d0f";

/// Beacon blocks a porting request may wait for the public-chain payment
pub const DEFAULT_TIMEOUT_WAITING_PORTING: u64 = 2160;

/// Beacon blocks a redeem request may wait for volunteers before auto-pick
pub const DEFAULT_TIMEOUT_WAITING_REDEEM: u64 = 30;

/// Beacon blocks a matched custodian has to pay the redeemer
pub const DEFAULT_TIMEOUT_CUSTODIAN_RETURN: u64 = 2160;

/// Beacon blocks per reward epoch
pub const DEFAULT_EPOCH_BLOCKS: u64 = 350;

#[cfg(test)]
mod tests {
    #[test]
    #[allow(clippy::const_is_empty)]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
    }

    #[test]
    fn test_prv_is_default_collateral() {
        let params = super::PortalParams::default();
        assert!(params.is_collateral_token(super::PRV_ID));
        assert_eq!(params.collateral_order()[0], super::PRV_ID);
    }
}
