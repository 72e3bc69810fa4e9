//! Typed instruction contents, one per meta type (two for liquidation by
//! rates, which has a warning form). Contents carry every amount the apply
//! step needs, so apply never recomputes them.

#![allow(missing_docs)]

use crate::domain::{
    MatchingPortingCustodian, MatchingRedeemCustodian, RewardInfo, TokenRate,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodianDepositContent {
    pub incognito_address: String,
    pub remote_addresses: BTreeMap<String, String>,
    pub collateral_token_id: String,
    pub deposit_amount: u64,
    /// Set for proven external deposits.
    pub external_tx_id: Option<String>,
    pub tx_req_id: String,
    pub shard_id: u8,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortingRequestContent {
    pub unique_porting_id: String,
    pub token_id: String,
    pub porter_address: String,
    pub porting_amount: u64,
    pub porting_fee: u64,
    /// Empty when rejected.
    pub custodians: Vec<MatchingPortingCustodian>,
    pub tx_req_id: String,
    pub shard_id: u8,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPTokenContent {
    pub unique_porting_id: String,
    pub token_id: String,
    pub incognito_address: String,
    pub porting_amount: u64,
    pub external_tx_id: String,
    pub tx_req_id: String,
    pub shard_id: u8,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemRequestContent {
    pub unique_redeem_id: String,
    pub token_id: String,
    pub redeem_amount: u64,
    pub redeemer_address: String,
    pub redeemer_remote_address: String,
    pub redeem_fee: u64,
    pub tx_req_id: String,
    pub shard_id: u8,
    pub shard_height: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRatesContent {
    pub sender_address: String,
    pub rates: Vec<TokenRate>,
    pub tx_req_id: String,
    pub shard_id: u8,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockCollateralContent {
    pub unique_redeem_id: String,
    pub token_id: String,
    pub custodian_address: String,
    pub redeem_amount: u64,
    pub unlock_amounts: BTreeMap<String, u64>,
    pub external_tx_id: String,
    pub tx_req_id: String,
    pub shard_id: u8,
}

/// Runaway custodian liquidation, paid out to the redeemer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidateCustodianContent {
    pub unique_redeem_id: String,
    pub token_id: String,
    pub custodian_address: String,
    pub redeemer_address: String,
    pub liquidated_pub_token_amount: u64,
    pub liquidated_collaterals: BTreeMap<String, u64>,
    pub remain_unlock_collaterals: BTreeMap<String, u64>,
    /// Shard of the redeemer, where the payout is minted.
    pub shard_id: u8,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawRewardContent {
    pub custodian_address: String,
    pub token_id: String,
    pub reward_amount: u64,
    pub tx_req_id: String,
    pub shard_id: u8,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiredPortingContent {
    pub unique_porting_id: String,
    pub expired_by_liquidation: bool,
    pub shard_id: u8,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemFromLiquidationPoolContent {
    pub token_id: String,
    pub redeem_amount: u64,
    pub redeemer_address: String,
    /// Collateral paid out; empty when rejected.
    pub mint_collaterals: BTreeMap<String, u64>,
    pub tx_req_id: String,
    pub shard_id: u8,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodianTopupContent {
    pub incognito_address: String,
    pub portal_token_id: String,
    pub collateral_token_id: String,
    pub deposit_amount: u64,
    pub free_collateral_amount: u64,
    pub external_tx_id: Option<String>,
    pub tx_req_id: String,
    pub shard_id: u8,
}

impl CustodianTopupContent {
    /// Collateral moved into the lock.
    pub fn lock_amount(&self) -> Option<u64> {
        self.deposit_amount.checked_add(self.free_collateral_amount)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopupWaitingPortingContent {
    pub porting_id: String,
    #[serde(flatten)]
    pub topup: CustodianTopupContent,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchingRedeemContent {
    pub custodian_address: String,
    pub unique_redeem_id: String,
    pub matching_amount: u64,
    pub is_fully_matched: bool,
    pub tx_req_id: String,
    pub shard_id: u8,
}

/// Producer-picked custodians for a timed-out waiting redeem. When rejected,
/// the request is cancelled and refunded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickMoreCustodianContent {
    pub unique_redeem_id: String,
    pub token_id: String,
    pub redeem_amount: u64,
    pub redeemer_address: String,
    pub redeem_fee: u64,
    pub custodians: Vec<MatchingRedeemCustodian>,
    pub shard_id: u8,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodianWithdrawContent {
    pub incognito_address: String,
    pub collateral_token_id: String,
    pub amount: u64,
    pub remain_free_collateral: u64,
    pub tx_req_id: String,
    pub shard_id: u8,
}

/// Custodian liquidated for a collateral ratio at or below TP120.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationByRatesContent {
    pub custodian_address: String,
    pub token_id: String,
    pub ratio: u64,
    /// Waiting redeems matched to the custodian, cancelled and refunded first.
    pub cancelled_redeem_ids: Vec<String>,
    pub liquidated_pub_token_amount: u64,
    pub liquidated_collaterals: BTreeMap<String, u64>,
    pub remain_unlock_collaterals: BTreeMap<String, u64>,
}

/// Custodian warned for a collateral ratio at or below TP130.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationWarningContent {
    pub custodian_address: String,
    pub token_id: String,
    pub ratio: u64,
    /// PRV needed to get back to the porting collateral ratio.
    pub top_up_amount: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalRewardContent {
    pub beacon_height: u64,
    pub rewards: Vec<RewardInfo>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalTotalRewardContent {
    pub beacon_height: u64,
    pub rewards: BTreeMap<String, u64>,
}
