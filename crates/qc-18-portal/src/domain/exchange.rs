//! # Exchange Rates

use super::value_objects::TokenRate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Agreed price table. Entries are overwritten, never cleared.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalExchangeRates {
    /// Token id -> rate.
    pub rates: BTreeMap<String, u64>,
}

impl FinalExchangeRates {
    /// Rate of a token, if known and non-zero.
    pub fn rate(&self, token_id: &str) -> Option<u64> {
        self.rates.get(token_id).copied().filter(|r| *r > 0)
    }

    /// Check if no rate is known.
    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

/// Accepted rate submission of the current block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRatesRequest {
    /// Submitting feeder.
    pub sender_address: String,
    /// Submitted rates.
    pub rates: Vec<TokenRate>,
}
