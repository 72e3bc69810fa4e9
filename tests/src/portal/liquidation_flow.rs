//! Liquidation by exchange rates and redemption from the liquidation pool.

#[cfg(test)]
mod tests {
    use crate::portal::fixtures::*;
    use qc_18_portal::instructions::{
        status, LiquidationByRatesContent, LiquidationWarningContent,
        RedeemFromLiquidationPoolContent,
    };
    use qc_18_portal::{MetaType, StaticProofVerifier, PBTC_ID, PRV_ID};

    fn ported() -> PortalHarness {
        let verifier = StaticProofVerifier::new().with_proof(
            "BTC",
            "porter-pay",
            0,
            btc_transfer("btc-porter", "btc-alice", BTC / 10),
        );
        let mut h = PortalHarness::new(fast_params(), verifier);
        h.block(vec![rates(PRV_RATE, BTC_RATE), deposit("alice", 10_000 * PRV)]);
        h.block(vec![porting("p1", "porter", BTC / 10, PRV)]);
        h.block(vec![ptoken("p1", "porter", BTC / 10, "porter-pay")]);
        h
    }

    #[test]
    fn test_stable_rates_liquidate_nothing() {
        let mut h = ported();
        let insts = h.run_until(h.height + 3);
        assert!(find(&insts, MetaType::LiquidateByRates).is_none());
    }

    #[test]
    fn test_warning_below_tp130() {
        let mut h = ported();
        // BTC at $11,600: 1,500 / 1,160 = 129%
        h.block(vec![rates(PRV_RATE, 11_600_000_000)]);
        let insts = h.block(Vec::new());

        let inst = find(&insts, MetaType::LiquidateByRates).unwrap();
        assert_eq!(inst.status, status::WARNING);
        let warning: LiquidationWarningContent = inst.decode().unwrap();
        assert_eq!(warning.ratio, 129);
        assert!(warning.top_up_amount > 0);

        let state = h.state();
        assert_eq!(state.custodian("alice").unwrap().holding(PBTC_ID), BTC / 10);
        assert!(state.liquidation_pool.entry(PBTC_ID).is_none());
    }

    #[test]
    fn test_liquidation_fills_pool_then_pool_redeem_pays_out() {
        let mut h = ported();
        // BTC at $13,000: 1,500 / 1,300 = 115%
        h.block(vec![rates(PRV_RATE, 13_000_000_000)]);
        let insts = h.block(Vec::new());

        let inst = find(&insts, MetaType::LiquidateByRates).unwrap();
        assert_eq!(inst.status, status::ACCEPTED);
        let content: LiquidationByRatesContent = inst.decode().unwrap();
        assert_eq!(content.ratio, 115);
        // 105% of $1,300 seized, the rest returned
        assert_eq!(content.liquidated_collaterals[PRV_ID], 1_365 * PRV);
        assert_eq!(content.remain_unlock_collaterals[PRV_ID], 135 * PRV);

        let state = h.state();
        let alice = state.custodian("alice").unwrap();
        assert_eq!(alice.holding(PBTC_ID), 0);
        assert_eq!(alice.locked(PBTC_ID, PRV_ID), 0);
        assert_eq!(alice.total(PRV_ID), 8_635 * PRV);
        let pool = state.liquidation_pool.entry(PBTC_ID).unwrap();
        assert_eq!(pool.pub_token_amount, BTC / 10);
        assert_eq!(pool.collateral_amounts[PRV_ID], 1_365 * PRV);

        let insts = h.block(vec![pool_redeem("porter", BTC / 10)]);
        let inst = find(&insts, MetaType::RedeemFromLiquidationPool).unwrap();
        assert_eq!(inst.status, status::ACCEPTED);
        let paid: RedeemFromLiquidationPoolContent = inst.decode().unwrap();
        assert_eq!(paid.mint_collaterals[PRV_ID], 1_365 * PRV);
        assert!(h
            .state()
            .liquidation_pool
            .entry(PBTC_ID)
            .map_or(true, |entry| entry.is_empty()));
    }

    #[test]
    fn test_pool_redeem_without_pool_rejected() {
        let mut h = ported();
        let insts = h.block(vec![pool_redeem("porter", BTC / 10)]);
        assert_eq!(
            find(&insts, MetaType::RedeemFromLiquidationPool)
                .unwrap()
                .status,
            status::REJECTED
        );
    }
}
