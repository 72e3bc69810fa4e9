//! Percentage helpers and minimum fees.

use super::exchange_tool::{to_u64, PortalExchangeRateTool};
use crate::error::{PortalError, Result};
use crate::PRV_ID;
use primitive_types::U256;

const PPM: u64 = 1_000_000;

/// `amount * percent / 100`.
pub fn up_percent(amount: u64, percent: u64) -> Result<u64> {
    to_u64(
        U256::from(amount) * U256::from(percent) / U256::from(100u64),
        "up_percent",
    )
}

/// `amount * 100 / percent`.
pub fn down_percent(amount: u64, percent: u64) -> Result<u64> {
    if percent == 0 {
        return Err(PortalError::DivisionByZero("down_percent"));
    }
    to_u64(
        U256::from(amount) * U256::from(100u64) / U256::from(percent),
        "down_percent",
    )
}

/// `value * ppm / 1_000_000`, rounded half up.
pub fn apply_ppm(value: u64, ppm: u64) -> Result<u64> {
    let scaled = U256::from(value) * U256::from(ppm) + U256::from(PPM / 2);
    to_u64(scaled / U256::from(PPM), "apply_ppm")
}

/// Minimum porting or redeem fee in PRV for `amount` of `token_id`.
///
/// `max(min_portal_fee, round(convert(token -> PRV, amount) * rate_ppm / 1e6))`
pub fn min_fee(
    tool: &PortalExchangeRateTool,
    token_id: &str,
    amount: u64,
    rate_ppm: u64,
    min_portal_fee: u64,
) -> Result<u64> {
    let amount_in_prv = tool.convert(token_id, PRV_ID, amount)?;
    Ok(apply_ppm(amount_in_prv, rate_ppm)?.max(min_portal_fee))
}
