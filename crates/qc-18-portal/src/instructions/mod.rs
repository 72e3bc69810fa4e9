//! # Instructions
//!
//! The consensus encoding of portal instructions is a tuple of four strings:
//!
//! ```text
//! [metaTypeId, shardId | "-1", status, jsonContent]
//! ```
//!
//! `-1` marks an instruction synthesized by the beacon producer rather than
//! submitted from a shard.

pub mod actions;
pub mod payloads;

pub use actions::*;
pub use payloads::*;

use crate::error::{PortalError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status strings.
pub mod status {
    /// Action accepted.
    pub const ACCEPTED: &str = "Accepted";
    /// Action rejected; the origin shard refunds.
    pub const REJECTED: &str = "Rejected";
    /// Synthesized state change applied.
    pub const SUCCESS: &str = "Success";
    /// Collateral ratio close to liquidation.
    pub const WARNING: &str = "Warning";
    /// Per-block custodian rewards.
    pub const REWARD: &str = "portalRewardInst";
    /// Epoch reward totals.
    pub const TOTAL_REWARD: &str = "portalTotalRewardInst";
}

/// Portal instruction types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MetaType {
    /// Custodian deposits collateral.
    CustodianDeposit,
    /// User requests porting.
    RequestPorting,
    /// User proves the porting payment and gets public tokens.
    RequestPToken,
    /// User burns public tokens to redeem.
    RedeemRequest,
    /// Exchange rate submission.
    ExchangeRates,
    /// Custodian proves the redeem payment.
    RequestUnlockCollateral,
    /// Runaway custodian liquidation.
    LiquidateCustodian,
    /// Custodian withdraws rewards.
    RequestWithdrawReward,
    /// Waiting porting request timed out.
    ExpiredWaitingPorting,
    /// User redeems from the liquidation pool.
    RedeemFromLiquidationPool,
    /// Custodian tops up collateral for a portal token.
    CustodianTopup,
    /// Custodian tops up collateral for a waiting porting request.
    TopUpWaitingPorting,
    /// Custodian volunteers for a waiting redeem.
    ReqMatchingRedeem,
    /// Producer picks custodians for a timed-out waiting redeem.
    PickMoreCustodianForRedeem,
    /// Custodian withdraws free collateral.
    CustodianWithdraw,
    /// Liquidation by exchange rates.
    LiquidateByRates,
    /// Per-block rewards.
    PortalReward,
    /// Epoch reward totals.
    PortalTotalReward,
}

impl MetaType {
    /// Every meta type, in id order.
    pub const ALL: [MetaType; 18] = [
        Self::CustodianDeposit,
        Self::RequestPorting,
        Self::RequestPToken,
        Self::RedeemRequest,
        Self::ExchangeRates,
        Self::RequestUnlockCollateral,
        Self::LiquidateCustodian,
        Self::RequestWithdrawReward,
        Self::ExpiredWaitingPorting,
        Self::RedeemFromLiquidationPool,
        Self::CustodianTopup,
        Self::TopUpWaitingPorting,
        Self::ReqMatchingRedeem,
        Self::PickMoreCustodianForRedeem,
        Self::CustodianWithdraw,
        Self::LiquidateByRates,
        Self::PortalReward,
        Self::PortalTotalReward,
    ];

    /// Numeric id on the wire.
    pub fn id(&self) -> u32 {
        match self {
            Self::CustodianDeposit => 100,
            Self::RequestPorting => 101,
            Self::RequestPToken => 102,
            Self::RedeemRequest => 104,
            Self::ExchangeRates => 107,
            Self::RequestUnlockCollateral => 108,
            Self::LiquidateCustodian => 110,
            Self::RequestWithdrawReward => 113,
            Self::ExpiredWaitingPorting => 115,
            Self::RedeemFromLiquidationPool => 116,
            Self::CustodianTopup => 118,
            Self::TopUpWaitingPorting => 119,
            Self::ReqMatchingRedeem => 121,
            Self::PickMoreCustodianForRedeem => 122,
            Self::CustodianWithdraw => 124,
            Self::LiquidateByRates => 125,
            Self::PortalReward => 126,
            Self::PortalTotalReward => 127,
        }
    }

    /// Meta type for a wire id.
    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.id() == id)
    }
}

impl fmt::Display for MetaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.id())
    }
}

/// A portal instruction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    /// Instruction type.
    pub meta_type: MetaType,
    /// Originating shard; `None` for beacon-synthesized instructions.
    pub shard_id: Option<u8>,
    /// Status string.
    pub status: String,
    /// JSON content.
    pub content: String,
}

impl Instruction {
    /// Instruction answering an action from `shard_id`.
    pub fn shard<T: Serialize>(
        meta_type: MetaType,
        shard_id: u8,
        status: &str,
        content: &T,
    ) -> Result<Self> {
        Ok(Self {
            meta_type,
            shard_id: Some(shard_id),
            status: status.to_string(),
            content: serde_json::to_string(content)?,
        })
    }

    /// Instruction synthesized by the producer.
    pub fn beacon<T: Serialize>(meta_type: MetaType, status: &str, content: &T) -> Result<Self> {
        Ok(Self {
            meta_type,
            shard_id: None,
            status: status.to_string(),
            content: serde_json::to_string(content)?,
        })
    }

    /// Decode the JSON content.
    ///
    /// # Errors
    ///
    /// `MalformedInstruction`: a bad payload only skips this instruction.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.content).map_err(|e| {
            PortalError::MalformedInstruction(format!("{} content: {}", self.meta_type, e))
        })
    }

    /// Error for a status this instruction's processor does not know.
    pub fn unknown_status(&self) -> PortalError {
        PortalError::UnknownStatus {
            meta_type: self.meta_type.id(),
            status: self.status.clone(),
        }
    }

    /// Encode as the consensus string tuple.
    pub fn to_strings(&self) -> Vec<String> {
        vec![
            self.meta_type.id().to_string(),
            self.shard_id
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-1".to_string()),
            self.status.clone(),
            self.content.clone(),
        ]
    }

    /// Decode a consensus string tuple.
    ///
    /// Returns `Ok(None)` for tuples that are not portal instructions: fewer
    /// than four fields, or a meta type that is not numeric or not a portal
    /// meta type.
    pub fn from_strings(parts: &[String]) -> Result<Option<Self>> {
        if parts.len() < 4 {
            return Ok(None);
        }
        let Some(meta_type) = parts[0].parse::<u32>().ok().and_then(MetaType::from_id) else {
            return Ok(None);
        };
        let shard_id = match parts[1].as_str() {
            "-1" => None,
            shard => Some(shard.parse::<u8>().map_err(|_| {
                PortalError::MalformedInstruction(format!("bad shard id {:?}", shard))
            })?),
        };
        Ok(Some(Self {
            meta_type,
            shard_id,
            status: parts[2].clone(),
            content: parts[3].clone(),
        }))
    }

    /// Shard to answer, or an error for a beacon instruction.
    pub fn origin_shard(&self) -> Result<u8> {
        self.shard_id.ok_or_else(|| {
            PortalError::MalformedInstruction(format!("{} without origin shard", self.meta_type))
        })
    }
}

/// Parse the portal instructions of a block, dropping everything else.
pub fn parse_block_instructions(raw: &[Vec<String>]) -> Vec<Instruction> {
    raw.iter()
        .filter_map(|parts| match Instruction::from_strings(parts) {
            Ok(inst) => inst,
            Err(e) => {
                tracing::warn!(error = %e, "[qc-18] Dropping malformed instruction");
                None
            }
        })
        .collect()
}
