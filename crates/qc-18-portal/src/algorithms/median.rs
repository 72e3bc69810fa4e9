//! Median of exchange rate submissions.

use crate::domain::{ExchangeRatesRequest, FinalExchangeRates};
use std::collections::BTreeMap;

/// Median of a list of rates.
///
/// `rates[n/2]` for odd length, the mean of the two middle values for even
/// length, 0 for an empty list.
pub fn median(rates: &[u64]) -> u64 {
    if rates.is_empty() {
        return 0;
    }
    let mut sorted = rates.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        // mean without overflow
        let (a, b) = (sorted[mid - 1], sorted[mid]);
        a / 2 + b / 2 + (a % 2 + b % 2) / 2
    }
}

/// Fold this block's submissions into the running rate table.
///
/// Only tokens with a positive median are overwritten. Returns the tokens
/// that changed.
pub fn pick_final_rates(
    current: &mut FinalExchangeRates,
    requests: &BTreeMap<String, ExchangeRatesRequest>,
) -> Vec<String> {
    let mut submissions: BTreeMap<&str, Vec<u64>> = BTreeMap::new();
    for req in requests.values() {
        for rate in &req.rates {
            submissions
                .entry(rate.token_id.as_str())
                .or_default()
                .push(rate.rate);
        }
    }

    let mut updated = Vec::new();
    for (token, rates) in submissions {
        let value = median(&rates);
        if value > 0 {
            current.rates.insert(token.to_string(), value);
            updated.push(token.to_string());
        }
    }
    updated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TokenRate;
    use proptest::prelude::*;

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&[10, 20, 30]), 20);
        assert_eq!(median(&[10, 20, 30, 40]), 25);
        assert_eq!(median(&[9, 5, 7]), 7);
        assert_eq!(median(&[]), 0);
        assert_eq!(median(&[u64::MAX, u64::MAX]), u64::MAX);
    }

    #[test]
    fn test_absent_tokens_keep_previous_rate() {
        let mut current = FinalExchangeRates::default();
        current.rates.insert("prv".into(), 100);
        current.rates.insert("btc".into(), 5);

        let mut requests = BTreeMap::new();
        for (tx, rate) in [("tx1", 5u64), ("tx2", 7), ("tx3", 9)] {
            requests.insert(
                tx.to_string(),
                ExchangeRatesRequest {
                    sender_address: "feeder".into(),
                    rates: vec![TokenRate {
                        token_id: "btc".into(),
                        rate,
                    }],
                },
            );
        }

        let updated = pick_final_rates(&mut current, &requests);
        assert_eq!(updated, vec!["btc".to_string()]);
        assert_eq!(current.rates["btc"], 7);
        assert_eq!(current.rates["prv"], 100);
    }

    proptest! {
        #[test]
        fn prop_median_within_bounds(rates in prop::collection::vec(1u64..1_000_000_000, 1..50)) {
            let m = median(&rates);
            let min = *rates.iter().min().unwrap();
            let max = *rates.iter().max().unwrap();
            prop_assert!(m >= min && m <= max);
        }

        #[test]
        fn prop_median_ignores_order(mut rates in prop::collection::vec(any::<u64>(), 1..30)) {
            let m = median(&rates);
            rates.reverse();
            prop_assert_eq!(m, median(&rates));
        }
    }
}
