//! User actions collected from shard blocks.
//!
//! Field names follow the shard transaction metadata.

#![allow(missing_docs)]

use super::MetaType;
use crate::domain::{ExternalProof, TokenRate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An action submitted in a shard transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalAction {
    /// Submitting tx id.
    pub tx_req_id: String,
    /// Originating shard.
    pub shard_id: u8,
    /// Shard block height of the tx.
    pub shard_height: u64,
    /// Typed action data.
    pub payload: ActionPayload,
}

impl PortalAction {
    /// Meta type of the action.
    pub fn meta_type(&self) -> MetaType {
        self.payload.meta_type()
    }
}

/// Action data by type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ActionPayload {
    /// Deposit collateral.
    CustodianDeposit(CustodianDepositAction),
    /// Request porting.
    RequestPorting(PortingRequestAction),
    /// Claim public tokens for a porting.
    RequestPToken(RequestPTokenAction),
    /// Redeem public tokens.
    RedeemRequest(RedeemRequestAction),
    /// Submit exchange rates.
    ExchangeRates(ExchangeRatesAction),
    /// Prove a redeem payment.
    RequestUnlockCollateral(UnlockCollateralAction),
    /// Withdraw rewards.
    RequestWithdrawReward(WithdrawRewardAction),
    /// Redeem from the liquidation pool.
    RedeemFromLiquidationPool(RedeemFromLiquidationPoolAction),
    /// Top up collateral for a portal token.
    CustodianTopup(CustodianTopupAction),
    /// Top up collateral for a waiting porting.
    TopUpWaitingPorting(TopupWaitingPortingAction),
    /// Volunteer for a waiting redeem.
    ReqMatchingRedeem(MatchingRedeemAction),
    /// Withdraw free collateral.
    CustodianWithdraw(CustodianWithdrawAction),
}

impl ActionPayload {
    /// Meta type of the payload.
    pub fn meta_type(&self) -> MetaType {
        match self {
            Self::CustodianDeposit(_) => MetaType::CustodianDeposit,
            Self::RequestPorting(_) => MetaType::RequestPorting,
            Self::RequestPToken(_) => MetaType::RequestPToken,
            Self::RedeemRequest(_) => MetaType::RedeemRequest,
            Self::ExchangeRates(_) => MetaType::ExchangeRates,
            Self::RequestUnlockCollateral(_) => MetaType::RequestUnlockCollateral,
            Self::RequestWithdrawReward(_) => MetaType::RequestWithdrawReward,
            Self::RedeemFromLiquidationPool(_) => MetaType::RedeemFromLiquidationPool,
            Self::CustodianTopup(_) => MetaType::CustodianTopup,
            Self::TopUpWaitingPorting(_) => MetaType::TopUpWaitingPorting,
            Self::ReqMatchingRedeem(_) => MetaType::ReqMatchingRedeem,
            Self::CustodianWithdraw(_) => MetaType::CustodianWithdraw,
        }
    }
}

/// Collateral deposit. PRV carries the amount; other collateral a proof.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodianDepositAction {
    pub incognito_address: String,
    pub remote_addresses: BTreeMap<String, String>,
    pub collateral_token_id: String,
    /// PRV amount burned by the tx; ignored for proven deposits.
    pub deposit_amount: u64,
    pub proof: Option<ExternalProof>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortingRequestAction {
    pub unique_porting_id: String,
    pub incognito_address: String,
    pub token_id: String,
    pub porting_amount: u64,
    pub porting_fee: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPTokenAction {
    pub unique_porting_id: String,
    pub token_id: String,
    pub incognito_address: String,
    pub porting_amount: u64,
    pub proof: ExternalProof,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemRequestAction {
    pub unique_redeem_id: String,
    pub token_id: String,
    pub redeem_amount: u64,
    pub redeemer_address: String,
    pub redeemer_remote_address: String,
    pub redeem_fee: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRatesAction {
    pub sender_address: String,
    pub rates: Vec<TokenRate>,
}

/// Custodian's proof of paying a matched redeem.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockCollateralAction {
    pub unique_redeem_id: String,
    pub token_id: String,
    pub custodian_address: String,
    pub redeem_amount: u64,
    pub proof: ExternalProof,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawRewardAction {
    pub custodian_address: String,
    pub token_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemFromLiquidationPoolAction {
    pub token_id: String,
    pub redeem_amount: u64,
    pub redeemer_address: String,
}

/// Collateral top-up: new deposit and/or free collateral moved into the lock.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodianTopupAction {
    pub incognito_address: String,
    pub portal_token_id: String,
    pub collateral_token_id: String,
    /// PRV amount burned by the tx; ignored for proven deposits.
    pub deposit_amount: u64,
    pub free_collateral_amount: u64,
    pub proof: Option<ExternalProof>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopupWaitingPortingAction {
    pub porting_id: String,
    #[serde(flatten)]
    pub topup: CustodianTopupAction,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchingRedeemAction {
    pub custodian_address: String,
    pub unique_redeem_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodianWithdrawAction {
    pub incognito_address: String,
    pub collateral_token_id: String,
    pub amount: u64,
}
