//! # Porting and Redeem Requests

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Custodian matched to a porting request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchingPortingCustodian {
    /// Custodian incognito address.
    pub incognito_address: String,
    /// Where the porter sends the public tokens.
    pub remote_address: String,
    /// Public tokens this custodian will hold.
    pub amount: u64,
    /// Collateral locked for this request, by collateral token.
    pub locked_amount_collateral: BTreeMap<String, u64>,
}

/// Open porting request, waiting for the porter's proof.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitingPortingRequest {
    /// Unique porting id.
    pub unique_porting_id: String,
    /// Portal token to mint.
    pub token_id: String,
    /// Porter incognito address.
    pub porter_address: String,
    /// Requested amount.
    pub amount: u64,
    /// Matched custodians.
    pub custodians: Vec<MatchingPortingCustodian>,
    /// Porting fee in PRV.
    pub porting_fee: u64,
    /// Beacon height at creation.
    pub beacon_height: u64,
    /// Originating tx id.
    pub tx_req_id: String,
    /// Originating shard.
    pub shard_id: u8,
}

impl WaitingPortingRequest {
    /// Sum of custodian amounts.
    pub fn matched_amount(&self) -> u64 {
        self.custodians.iter().map(|c| c.amount).sum()
    }

    /// Matched entry of a custodian.
    pub fn custodian(&self, address: &str) -> Option<&MatchingPortingCustodian> {
        self.custodians
            .iter()
            .find(|c| c.incognito_address == address)
    }

    /// Mutable matched entry of a custodian.
    pub fn custodian_mut(&mut self, address: &str) -> Option<&mut MatchingPortingCustodian> {
        self.custodians
            .iter_mut()
            .find(|c| c.incognito_address == address)
    }
}

/// Custodian matched to a redeem request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchingRedeemCustodian {
    /// Custodian incognito address.
    pub incognito_address: String,
    /// Custodian's remote address for the token.
    pub remote_address: String,
    /// Public tokens this custodian returns.
    pub amount: u64,
}

/// Redeem request. The same type lives in the waiting or the matched set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemRequest {
    /// Unique redeem id.
    pub unique_redeem_id: String,
    /// Portal token being redeemed.
    pub token_id: String,
    /// Redeemer incognito address, for refunds.
    pub redeemer_address: String,
    /// Redeemer address on the external chain.
    pub redeemer_remote_address: String,
    /// Amount of public tokens burned.
    pub redeem_amount: u64,
    /// Matched custodians.
    pub custodians: Vec<MatchingRedeemCustodian>,
    /// Redeem fee in PRV.
    pub redeem_fee: u64,
    /// Beacon height at creation.
    pub beacon_height: u64,
    /// Originating tx id.
    pub tx_req_id: String,
    /// Originating shard.
    pub shard_id: u8,
    /// Shard height of the originating tx.
    pub shard_height: u64,
}

impl RedeemRequest {
    /// Sum of matched amounts.
    pub fn matched_amount(&self) -> u64 {
        self.custodians.iter().map(|c| c.amount).sum()
    }

    /// Amount not yet matched.
    pub fn remaining_amount(&self) -> u64 {
        self.redeem_amount.saturating_sub(self.matched_amount())
    }

    /// Check if matched amounts cover the request exactly.
    pub fn is_fully_matched(&self) -> bool {
        self.matched_amount() == self.redeem_amount
    }

    /// Matched entry of a custodian.
    pub fn custodian(&self, address: &str) -> Option<&MatchingRedeemCustodian> {
        self.custodians
            .iter()
            .find(|c| c.incognito_address == address)
    }

    /// Remove a custodian from the matched list.
    pub fn remove_custodian(&mut self, address: &str) -> Option<MatchingRedeemCustodian> {
        let pos = self
            .custodians
            .iter()
            .position(|c| c.incognito_address == address)?;
        Some(self.custodians.remove(pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redeem(amount: u64, matched: &[(&str, u64)]) -> RedeemRequest {
        RedeemRequest {
            unique_redeem_id: "r1".into(),
            token_id: "btc".into(),
            redeemer_address: "user".into(),
            redeemer_remote_address: "user-btc".into(),
            redeem_amount: amount,
            custodians: matched
                .iter()
                .map(|(a, v)| MatchingRedeemCustodian {
                    incognito_address: a.to_string(),
                    remote_address: format!("{}-btc", a),
                    amount: *v,
                })
                .collect(),
            redeem_fee: 10,
            beacon_height: 1,
            tx_req_id: "tx".into(),
            shard_id: 0,
            shard_height: 1,
        }
    }

    #[test]
    fn test_partial_match_is_not_full() {
        let req = redeem(100, &[("c1", 60)]);
        assert_eq!(req.remaining_amount(), 40);
        assert!(!req.is_fully_matched());
    }

    #[test]
    fn test_remove_custodian() {
        let mut req = redeem(100, &[("c1", 60), ("c2", 40)]);
        assert!(req.is_fully_matched());
        assert_eq!(req.remove_custodian("c1").map(|c| c.amount), Some(60));
        assert!(req.remove_custodian("c1").is_none());
        assert_eq!(req.custodians.len(), 1);
    }
}
