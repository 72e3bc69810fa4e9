//! # Object Keys
//!
//! Deterministic storage keys for portal entities.
//!
//! A key is 32 bytes: a 12-byte prefix derived from the entity kind and a
//! 20-byte suffix derived from the disambiguating fields. All entities of one
//! kind share the prefix, so they can be enumerated with a prefix scan.

use super::status::StatusKind;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::fmt;

/// Length of an object key in bytes.
pub const KEY_LENGTH: usize = 32;

/// Length of the kind prefix in bytes.
pub const PREFIX_LENGTH: usize = 12;

/// Entity kinds stored by the portal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectKind {
    /// Custodian collateral book.
    Custodian,
    /// Waiting porting request.
    WaitingPorting,
    /// Waiting redeem request.
    WaitingRedeem,
    /// Matched redeem request.
    MatchedRedeem,
    /// Final exchange rate table.
    FinalExchangeRates,
    /// Liquidation pool.
    LiquidationPool,
    /// Locked collateral weights for epoch rewards.
    LockedCollateral,
    /// Public token supply per portal token.
    TokenSupply,
    /// Status record family.
    Status(StatusKind),
}

impl ObjectKind {
    /// Tag hashed into the key prefix.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Custodian => "portalcustodian-",
            Self::WaitingPorting => "portalwaitingportingrequest-",
            Self::WaitingRedeem => "portalwaitingredeemrequest-",
            Self::MatchedRedeem => "portalmatchedredeemrequest-",
            Self::FinalExchangeRates => "portalfinalexchangerates-",
            Self::LiquidationPool => "portalliquidationpool-",
            Self::LockedCollateral => "portallockedcollateral-",
            Self::TokenSupply => "portaltokensupply-",
            Self::Status(kind) => kind.tag(),
        }
    }

    /// 12-byte prefix shared by every key of this kind.
    pub fn prefix(&self) -> [u8; PREFIX_LENGTH] {
        let digest = Keccak256::digest(self.tag().as_bytes());
        let mut prefix = [0u8; PREFIX_LENGTH];
        prefix.copy_from_slice(&digest[..PREFIX_LENGTH]);
        prefix
    }
}

/// Storage key of a portal entity.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectKey(pub [u8; KEY_LENGTH]);

impl ObjectKey {
    /// Derive the key for `kind` and its disambiguating fields.
    ///
    /// Every field is length-prefixed before hashing so that `["ab", "c"]`
    /// and `["a", "bc"]` map to different keys.
    pub fn new(kind: ObjectKind, fields: &[&str]) -> Self {
        let mut hasher = Keccak256::new();
        for field in fields {
            hasher.update((field.len() as u64).to_be_bytes());
            hasher.update(field.as_bytes());
        }
        let digest = hasher.finalize();

        let mut key = [0u8; KEY_LENGTH];
        key[..PREFIX_LENGTH].copy_from_slice(&kind.prefix());
        key[PREFIX_LENGTH..].copy_from_slice(&digest[..KEY_LENGTH - PREFIX_LENGTH]);
        Self(key)
    }

    /// Key of a custodian, by incognito address.
    pub fn custodian(address: &str) -> Self {
        Self::new(ObjectKind::Custodian, &[address])
    }

    /// Key of a waiting porting request.
    pub fn waiting_porting(porting_id: &str) -> Self {
        Self::new(ObjectKind::WaitingPorting, &[porting_id])
    }

    /// Key of a waiting redeem request.
    pub fn waiting_redeem(redeem_id: &str) -> Self {
        Self::new(ObjectKind::WaitingRedeem, &[redeem_id])
    }

    /// Key of a matched redeem request.
    pub fn matched_redeem(redeem_id: &str) -> Self {
        Self::new(ObjectKind::MatchedRedeem, &[redeem_id])
    }

    /// Key of the final exchange rate table (singleton).
    pub fn final_exchange_rates() -> Self {
        Self::new(ObjectKind::FinalExchangeRates, &[])
    }

    /// Key of the liquidation pool (singleton).
    pub fn liquidation_pool() -> Self {
        Self::new(ObjectKind::LiquidationPool, &[])
    }

    /// Key of the locked collateral reward weights (singleton).
    pub fn locked_collateral() -> Self {
        Self::new(ObjectKind::LockedCollateral, &[])
    }

    /// Key of a token supply record.
    pub fn token_supply(token_id: &str) -> Self {
        Self::new(ObjectKind::TokenSupply, &[token_id])
    }

    /// Key of a status record.
    pub fn status(kind: StatusKind, id: &str) -> Self {
        Self::new(ObjectKind::Status(kind), &[id])
    }

    /// Check if the key belongs to `kind`.
    pub fn has_kind(&self, kind: ObjectKind) -> bool {
        self.0[..PREFIX_LENGTH] == kind.prefix()
    }

    /// Hex encoding of the key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectKey({})", self.to_hex())
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
