//! # Domain Value Objects
//!
//! Request lifecycle states and small value types.

use crate::error::{PortalError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Porting request state machine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortingState {
    /// Submitted, not yet validated.
    #[default]
    Requested,
    /// Rejected at validation.
    Rejected,
    /// Custodians matched, collateral locked, waiting for the ptoken proof.
    Waiting,
    /// Ptoken minted.
    Success,
    /// Timed out, collateral unlocked.
    Expired,
    /// Removed by the liquidation path.
    Liquidated,
}

impl PortingState {
    /// Check if transition is valid.
    pub fn can_transition_to(&self, next: PortingState) -> bool {
        matches!(
            (self, next),
            (Self::Requested, Self::Rejected)
                | (Self::Requested, Self::Waiting)
                | (Self::Waiting, Self::Success)
                | (Self::Waiting, Self::Expired)
                | (Self::Waiting, Self::Liquidated)
        )
    }

    /// Check if terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Rejected | Self::Success | Self::Expired | Self::Liquidated
        )
    }

    /// Transition, failing if not allowed.
    pub fn transition_to(&mut self, next: PortingState) -> Result<()> {
        check_transition(self.can_transition_to(next), *self, next)?;
        *self = next;
        Ok(())
    }

    /// Status string used in records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "Requested",
            Self::Rejected => "Rejected",
            Self::Waiting => "Waiting",
            Self::Success => "Success",
            Self::Expired => "Expired",
            Self::Liquidated => "Liquidated",
        }
    }
}

/// Redeem request state machine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RedeemState {
    /// Submitted, not yet validated.
    #[default]
    Requested,
    /// Rejected at validation; public tokens refunded.
    Rejected,
    /// Accepted, custodians partially matched.
    Waiting,
    /// Fully matched, waiting for custodian proofs.
    Matched,
    /// Every custodian proved payment.
    Success,
    /// Cancelled by liquidation; public tokens refunded.
    CancelledByLiquidation,
}

impl RedeemState {
    /// Check if transition is valid.
    pub fn can_transition_to(&self, next: RedeemState) -> bool {
        matches!(
            (self, next),
            (Self::Requested, Self::Rejected)
                | (Self::Requested, Self::Waiting)
                | (Self::Waiting, Self::Matched)
                | (Self::Waiting, Self::CancelledByLiquidation)
                | (Self::Matched, Self::Success)
        )
    }

    /// Check if terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Rejected | Self::Success | Self::CancelledByLiquidation
        )
    }

    /// Transition, failing if not allowed.
    pub fn transition_to(&mut self, next: RedeemState) -> Result<()> {
        check_transition(self.can_transition_to(next), *self, next)?;
        *self = next;
        Ok(())
    }

    /// Status string used in records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "Requested",
            Self::Rejected => "Rejected",
            Self::Waiting => "Waiting",
            Self::Matched => "Matched",
            Self::Success => "Success",
            Self::CancelledByLiquidation => "CancelledByLiquidation",
        }
    }
}

fn check_transition<S: fmt::Debug>(allowed: bool, from: S, to: S) -> Result<()> {
    if allowed {
        Ok(())
    } else {
        Err(PortalError::InvalidTransition {
            from: format!("{:?}", from),
            to: format!("{:?}", to),
        })
    }
}

/// External proof of a transaction on another chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalProof {
    /// Block hash on the external chain.
    pub block_hash: String,
    /// Index of the tx in that block.
    pub tx_index: u32,
    /// Encoded proof nodes.
    pub proof: Vec<String>,
}

impl ExternalProof {
    /// Unique id of the proven tx: chain, block hash and tx index.
    pub fn unique_id(&self, chain: &str) -> String {
        format!("{}-{}-{}", chain, self.block_hash, self.tx_index)
    }
}

/// Exchange rate of one token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRate {
    /// Token id.
    pub token_id: String,
    /// Price in micro-USD per whole token.
    pub rate: u64,
}
