//! # Status Records
//!
//! Every applied instruction leaves a status record keyed by the request or
//! tx id. Records are what duplicate-id checks read back from storage.

use crate::error::{PortalError, Result};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};

/// Status record families.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StatusKind {
    /// Porting request lifecycle.
    PortingRequest,
    /// Porting action tx.
    PortingTx,
    /// Request-ptoken action.
    RequestPToken,
    /// Redeem request lifecycle.
    RedeemRequest,
    /// Redeem action tx.
    RedeemTx,
    /// Custodian self-matching a redeem.
    RequestMatchingRedeem,
    /// Collateral unlock after a redeem proof.
    UnlockCollateral,
    /// Custodian deposit.
    CustodianDeposit,
    /// Custodian withdraw.
    CustodianWithdraw,
    /// Custodian top-up.
    CustodianTopup,
    /// Top-up of a waiting porting request.
    TopupWaitingPorting,
    /// Reward withdrawal.
    WithdrawReward,
    /// Runaway custodian liquidation.
    LiquidationRunaway,
    /// Liquidation by exchange rates.
    LiquidationByRates,
    /// Redeem from the liquidation pool.
    RedeemFromLiquidationPool,
    /// Exchange rate submission.
    ExchangeRates,
    /// External tx already credited.
    ExternalTxUsed,
    /// Per-height custodian rewards.
    Reward,
    /// Per-height epoch reward totals.
    TotalReward,
}

impl StatusKind {
    /// Tag hashed into the key prefix.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::PortingRequest => "portalportingrequeststatus-",
            Self::PortingTx => "portalportingtxstatus-",
            Self::RequestPToken => "portalrequestptokenstatus-",
            Self::RedeemRequest => "portalredeemrequeststatus-",
            Self::RedeemTx => "portalredeemtxstatus-",
            Self::RequestMatchingRedeem => "portalrequestmatchingredeemstatus-",
            Self::UnlockCollateral => "portalunlockcollateralstatus-",
            Self::CustodianDeposit => "portalcustodiandepositstatus-",
            Self::CustodianWithdraw => "portalcustodianwithdrawstatus-",
            Self::CustodianTopup => "portalcustodiantopupstatus-",
            Self::TopupWaitingPorting => "portaltopupwaitingportingstatus-",
            Self::WithdrawReward => "portalwithdrawrewardstatus-",
            Self::LiquidationRunaway => "portalliquidationrunawaystatus-",
            Self::LiquidationByRates => "portalliquidationbyratesstatus-",
            Self::RedeemFromLiquidationPool => "portalredeemfromliquidationpoolstatus-",
            Self::ExchangeRates => "portalexchangeratesstatus-",
            Self::ExternalTxUsed => "portalexternaltxused-",
            Self::Reward => "portalrewardstatus-",
            Self::TotalReward => "portaltotalrewardstatus-",
        }
    }
}

/// Status record as stored: a status string plus typed data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord<T> {
    /// Status string.
    pub status: String,
    /// Record data, usually the instruction content.
    pub data: T,
}

impl<T: Serialize> StatusRecord<T> {
    /// Encode the record as JSON bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(PortalError::from)
    }
}

impl<T: DeserializeOwned> StatusRecord<T> {
    /// Decode a stored record.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(PortalError::from)
    }
}

/// Read only the status string of a stored record.
pub fn decode_status(bytes: &[u8]) -> Result<String> {
    Ok(StatusRecord::<IgnoredAny>::decode(bytes)?.status)
}
