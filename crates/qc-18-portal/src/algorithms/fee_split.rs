//! Proportional split with remainder to the last recipient.

use crate::error::Result;
use super::exchange_tool::to_u64;
use primitive_types::U256;

/// Split `total` across `weights` proportionally.
///
/// Every recipient but the last gets `floor(total * w_i / sum(w))`; the last
/// gets what is left, so the shares always add up to `total`. Recipients
/// with zero weight are dropped. An empty or all-zero weight list yields no
/// shares.
pub fn split_proportional<K: Clone>(total: u64, weights: &[(K, u64)]) -> Result<Vec<(K, u64)>> {
    let weighted: Vec<&(K, u64)> = weights.iter().filter(|(_, w)| *w > 0).collect();
    let weight_sum: U256 = weighted
        .iter()
        .fold(U256::zero(), |acc, (_, w)| acc + U256::from(*w));
    if weighted.is_empty() {
        return Ok(Vec::new());
    }

    let mut shares = Vec::with_capacity(weighted.len());
    let mut distributed = 0u64;
    let last = weighted.len() - 1;
    for (i, (key, weight)) in weighted.into_iter().enumerate() {
        let share = if i == last {
            total - distributed
        } else {
            to_u64(
                U256::from(total) * U256::from(*weight) / weight_sum,
                "split_proportional",
            )?
        };
        distributed += share;
        shares.push((key.clone(), share));
    }
    Ok(shares)
}
