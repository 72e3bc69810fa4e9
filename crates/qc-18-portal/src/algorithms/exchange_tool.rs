//! # Exchange Rate Tool
//!
//! Integer conversions between tokens and USD.
//!
//! A rate is the price of one whole token in micro-USD. Amounts carry the
//! token's own decimals, so:
//!
//! ```text
//! toUSD(t, a)      = a * rate_t / 10^dec_t
//! fromUSD(t, u)    = u * 10^dec_t / rate_t
//! convert(f, t, a) = a * rate_f * 10^dec_t / (10^dec_f * rate_t)
//! ```
//!
//! Intermediates are computed in 256 bits and every result is checked to fit
//! in `u64`. Division truncates.

use crate::config::PortalParams;
use crate::domain::FinalExchangeRates;
use crate::error::{PortalError, Result};
use primitive_types::U256;
use std::collections::BTreeMap;

/// Converts token amounts using a snapshot of the final rates.
#[derive(Clone, Debug)]
pub struct PortalExchangeRateTool {
    rates: BTreeMap<String, u64>,
    decimals: BTreeMap<String, u8>,
}

impl PortalExchangeRateTool {
    /// Build from the current rate table and the token parameters.
    pub fn new(rates: &FinalExchangeRates, params: &PortalParams) -> Self {
        let decimals = params
            .portal_tokens
            .iter()
            .map(|(id, t)| (id.clone(), t.decimals))
            .chain(
                params
                    .collateral_tokens
                    .iter()
                    .map(|(id, t)| (id.clone(), t.decimals)),
            )
            .collect();
        Self {
            rates: rates.rates.clone(),
            decimals,
        }
    }

    /// Check if a token has a usable rate.
    pub fn has_rate(&self, token_id: &str) -> bool {
        self.rates.get(token_id).is_some_and(|r| *r > 0)
    }

    /// Rate of a token.
    pub fn rate(&self, token_id: &str) -> Result<u64> {
        self.rates
            .get(token_id)
            .copied()
            .filter(|r| *r > 0)
            .ok_or_else(|| PortalError::ExchangeRateNotFound(token_id.to_string()))
    }

    fn scale(&self, token_id: &str) -> Result<U256> {
        let decimals = self
            .decimals
            .get(token_id)
            .ok_or_else(|| PortalError::UnsupportedToken(token_id.to_string()))?;
        Ok(U256::exp10(usize::from(*decimals)))
    }

    /// Convert `amount` of `from` into `to`.
    pub fn convert(&self, from: &str, to: &str, amount: u64) -> Result<u64> {
        let numerator =
            U256::from(amount) * U256::from(self.rate(from)?) * self.scale(to)?;
        let denominator = self.scale(from)? * U256::from(self.rate(to)?);
        to_u64(numerator / denominator, "convert")
    }

    /// Value of `amount` of a token in micro-USD.
    pub fn to_usd(&self, token_id: &str, amount: u64) -> Result<u64> {
        let value = U256::from(amount) * U256::from(self.rate(token_id)?) / self.scale(token_id)?;
        to_u64(value, "to_usd")
    }

    /// Amount of a token worth `usd` micro-USD, rounded down.
    pub fn from_usd(&self, token_id: &str, usd: u64) -> Result<u64> {
        let rate = U256::from(self.rate(token_id)?);
        to_u64(U256::from(usd) * self.scale(token_id)? / rate, "from_usd")
    }

    /// Amount of a token worth at least `usd` micro-USD, rounded up.
    pub fn from_usd_ceil(&self, token_id: &str, usd: u64) -> Result<u64> {
        let rate = U256::from(self.rate(token_id)?);
        let numerator = U256::from(usd) * self.scale(token_id)?;
        let value = (numerator + rate - U256::one()) / rate;
        to_u64(value, "from_usd_ceil")
    }

    /// Total USD value of a set of balances. Tokens without a rate count as 0.
    pub fn total_usd(&self, amounts: &BTreeMap<String, u64>) -> Result<u64> {
        let mut total = 0u64;
        for (token, amount) in amounts {
            if *amount == 0 || !self.has_rate(token) {
                continue;
            }
            total = total
                .checked_add(self.to_usd(token, *amount)?)
                .ok_or(PortalError::ArithmeticOverflow("total_usd"))?;
        }
        Ok(total)
    }
}

/// Narrow a 256-bit result to `u64`.
pub(crate) fn to_u64(value: U256, context: &'static str) -> Result<u64> {
    if value > U256::from(u64::MAX) {
        Err(PortalError::ArithmeticOverflow(context))
    } else {
        Ok(value.low_u64())
    }
}
