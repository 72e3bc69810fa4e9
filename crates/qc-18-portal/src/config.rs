//! Configuration types for the portal subsystem
//!
//! Parameters can be built from [`PortalParams::default`] or loaded from a
//! TOML file:
//!
//! ```toml
//! timeout_waiting_porting_request = 2160
//! min_percent_locked_collateral = 150
//! tp120 = 120
//! tp130 = 130
//!
//! [portal_tokens.b832e5d3b1f01a4f0623f7fe91d6673461e1f5d37d91fe78c5c2e6183ff39696]
//! decimals = 9
//! chain = "BTC"
//! ```

use crate::error::{PortalError, Result};
use crate::PRV_ID;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

/// Portal token (wrapped foreign asset) parameters
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortalTokenParams {
    /// Decimals of the wrapped token
    pub decimals: u8,
    /// External chain the asset lives on
    pub chain: String,
}

/// Collateral token parameters
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CollateralTokenParams {
    /// Decimals of the collateral token
    pub decimals: u8,
}

/// Runtime parameters for the portal state machine
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalParams {
    /// Blocks a waiting porting request may wait for its ptoken proof
    pub timeout_waiting_porting_request: u64,

    /// Blocks a waiting redeem request may wait for custodians to volunteer
    pub timeout_waiting_redeem_request: u64,

    /// Blocks a matched custodian has to return public tokens
    pub timeout_custodian_return_pub_token: u64,

    /// Over-collateralization ratio for porting, in percent
    pub min_percent_locked_collateral: u64,

    /// Collateral ratio at or below which a custodian is liquidated
    pub tp120: u64,

    /// Collateral ratio at or below which a custodian is warned
    pub tp130: u64,

    /// Percent of the redeem value seized from a runaway custodian
    pub max_percent_liquidated_collateral_amount: u64,

    /// Minimum porting fee rate, parts per million of the amount in PRV
    pub min_porting_fee_rate_ppm: u64,

    /// Minimum redeem fee rate, parts per million of the amount in PRV
    pub min_redeem_fee_rate_ppm: u64,

    /// Absolute minimum fee in PRV
    pub min_portal_fee: u64,

    /// Beacon blocks per reward epoch
    pub epoch_blocks: u64,

    /// External chain holding non-PRV collaterals
    pub collateral_chain: String,

    /// Supported portal tokens by id
    pub portal_tokens: BTreeMap<String, PortalTokenParams>,

    /// Supported collateral tokens by id (PRV included)
    pub collateral_tokens: BTreeMap<String, CollateralTokenParams>,

    /// Senders allowed to submit exchange rates (empty = anyone)
    pub authorized_feeders: BTreeSet<String>,
}

impl Default for PortalParams {
    fn default() -> Self {
        let mut portal_tokens = BTreeMap::new();
        portal_tokens.insert(
            crate::PBTC_ID.to_string(),
            PortalTokenParams {
                decimals: 9,
                chain: "BTC".to_string(),
            },
        );
        portal_tokens.insert(
            crate::PBNB_ID.to_string(),
            PortalTokenParams {
                decimals: 9,
                chain: "BNB".to_string(),
            },
        );

        let mut collateral_tokens = BTreeMap::new();
        collateral_tokens.insert(PRV_ID.to_string(), CollateralTokenParams { decimals: 9 });
        collateral_tokens.insert(
            crate::USDT_ID.to_string(),
            CollateralTokenParams { decimals: 6 },
        );
        collateral_tokens.insert(crate::DAI_ID.to_string(), CollateralTokenParams { decimals: 9 });

        Self {
            timeout_waiting_porting_request: crate::DEFAULT_TIMEOUT_WAITING_PORTING,
            timeout_waiting_redeem_request: crate::DEFAULT_TIMEOUT_WAITING_REDEEM,
            timeout_custodian_return_pub_token: crate::DEFAULT_TIMEOUT_CUSTODIAN_RETURN,
            min_percent_locked_collateral: 150,
            tp120: 120,
            tp130: 130,
            max_percent_liquidated_collateral_amount: 105,
            min_porting_fee_rate_ppm: 100, // 0.01%
            min_redeem_fee_rate_ppm: 100,  // 0.01%
            min_portal_fee: 100,
            epoch_blocks: crate::DEFAULT_EPOCH_BLOCKS,
            collateral_chain: "ETH".to_string(),
            portal_tokens,
            collateral_tokens,
            authorized_feeders: BTreeSet::new(),
        }
    }
}

impl PortalParams {
    /// Parse and validate parameters from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let params: PortalParams =
            toml::from_str(content).map_err(|e| PortalError::InvalidConfig(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    /// Load parameters from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the file cannot be read, parsed or validated.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            PortalError::InvalidConfig(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Check parameter consistency.
    pub fn validate(&self) -> Result<()> {
        if self.tp120 >= self.tp130 {
            return Err(PortalError::InvalidConfig(format!(
                "tp120 ({}) must be below tp130 ({})",
                self.tp120, self.tp130
            )));
        }
        if self.min_percent_locked_collateral < 100 {
            return Err(PortalError::InvalidConfig(
                "min_percent_locked_collateral must be at least 100".to_string(),
            ));
        }
        if self.max_percent_liquidated_collateral_amount == 0 {
            return Err(PortalError::InvalidConfig(
                "max_percent_liquidated_collateral_amount must be positive".to_string(),
            ));
        }
        if self.epoch_blocks == 0 {
            return Err(PortalError::InvalidConfig("epoch_blocks must be positive".to_string()));
        }
        if !self.collateral_tokens.contains_key(PRV_ID) {
            return Err(PortalError::InvalidConfig(
                "PRV must be a collateral token".to_string(),
            ));
        }
        // 10^decimals must fit in u64
        let too_wide = self
            .portal_tokens
            .values()
            .map(|t| t.decimals)
            .chain(self.collateral_tokens.values().map(|t| t.decimals))
            .any(|d| d > 19);
        if too_wide {
            return Err(PortalError::InvalidConfig("decimals above 19".to_string()));
        }
        Ok(())
    }

    /// Parameters of a supported portal token.
    pub fn portal_token(&self, token_id: &str) -> Result<&PortalTokenParams> {
        self.portal_tokens
            .get(token_id)
            .ok_or_else(|| PortalError::UnsupportedToken(token_id.to_string()))
    }

    /// Check if a token is a supported portal token
    pub fn is_portal_token(&self, token_id: &str) -> bool {
        self.portal_tokens.contains_key(token_id)
    }

    /// Check if a token is a supported collateral
    pub fn is_collateral_token(&self, token_id: &str) -> bool {
        self.collateral_tokens.contains_key(token_id)
    }

    /// Decimals of any known token (portal or collateral).
    pub fn decimals(&self, token_id: &str) -> Option<u8> {
        self.portal_tokens
            .get(token_id)
            .map(|t| t.decimals)
            .or_else(|| self.collateral_tokens.get(token_id).map(|t| t.decimals))
    }

    /// Collateral tokens in unlock/lock order: PRV first, then sorted ids.
    pub fn collateral_order(&self) -> Vec<String> {
        std::iter::once(PRV_ID.to_string())
            .chain(
                self.collateral_tokens
                    .keys()
                    .filter(|id| id.as_str() != PRV_ID)
                    .cloned(),
            )
            .collect()
    }

    /// Check if a sender may submit exchange rates
    pub fn is_authorized_feeder(&self, sender: &str) -> bool {
        self.authorized_feeders.is_empty() || self.authorized_feeders.contains(sender)
    }

    /// True when `current` is past `created + timeout`.
    pub fn is_timed_out(current: u64, created: u64, timeout: u64) -> bool {
        current.saturating_sub(created) > timeout
    }

    /// True at the first block of a reward epoch.
    pub fn is_epoch_start(&self, height: u64) -> bool {
        height % self.epoch_blocks == 1
    }
}
