//! Redeem lifecycle: request, matching, unlock and run-away custodians.

#[cfg(test)]
mod tests {
    use crate::portal::fixtures::*;
    use qc_18_portal::instructions::{status, LiquidateCustodianContent};
    use qc_18_portal::{MetaType, ProofData, StaticProofVerifier, PBTC_ID, PRV_ID};

    fn transfer(from: &str, to: &str) -> ProofData {
        btc_transfer(from, to, BTC / 10)
    }

    /// Alice backs 0.1 pBTC held by the porter.
    fn ported() -> PortalHarness {
        let verifier = StaticProofVerifier::new()
            .with_proof("BTC", "porter-pay", 0, transfer("btc-porter", "btc-alice"))
            .with_proof("BTC", "alice-pay", 0, transfer("btc-alice", "btc-porter"))
            .with_proof("BTC", "alice-self-pay", 0, transfer("btc-alice", "btc-alice"))
            .with_proof("BTC", "mallory-pay", 0, transfer("btc-mallory", "btc-porter"));
        let mut h = PortalHarness::new(fast_params(), verifier);
        h.block(vec![rates(PRV_RATE, BTC_RATE), deposit("alice", 10_000 * PRV)]);
        h.block(vec![porting("p1", "porter", BTC / 10, PRV)]);
        h.block(vec![ptoken("p1", "porter", BTC / 10, "porter-pay")]);
        h
    }

    #[test]
    fn test_self_matched_redeem_unlocks_collateral() {
        let mut h = ported();
        let insts = h.block(vec![redeem("r1", "porter", BTC / 10, PRV)]);
        assert_eq!(
            find(&insts, MetaType::RedeemRequest).unwrap().status,
            status::ACCEPTED
        );
        assert!(h.state().waiting_redeem_requests.contains_key("r1"));

        let insts = h.block(vec![match_redeem("alice", "r1")]);
        assert_eq!(
            find(&insts, MetaType::ReqMatchingRedeem).unwrap().status,
            status::ACCEPTED
        );
        let state = h.state();
        assert!(state.matched_redeem_requests.contains_key("r1"));
        assert_eq!(state.custodian("alice").unwrap().holding(PBTC_ID), 0);

        let insts = h.block(vec![unlock("r1", "alice", BTC / 10, "alice-pay")]);
        assert_eq!(
            find(&insts, MetaType::RequestUnlockCollateral).unwrap().status,
            status::ACCEPTED
        );
        let state = h.state();
        let alice = state.custodian("alice").unwrap();
        assert!(state.matched_redeem_requests.is_empty());
        assert_eq!(alice.locked(PBTC_ID, PRV_ID), 0);
        assert_eq!(alice.free(PRV_ID), 10_000 * PRV);
        // porting fee and redeem fee
        assert_eq!(alice.reward(PRV_ID), 2 * PRV);
    }

    #[test]
    fn test_unlock_with_foreign_sender_rejected() {
        let mut h = ported();
        h.block(vec![redeem("r1", "porter", BTC / 10, PRV)]);
        h.block(vec![match_redeem("alice", "r1")]);

        let insts = h.block(vec![unlock("r1", "alice", BTC / 10, "mallory-pay")]);
        assert_eq!(
            find(&insts, MetaType::RequestUnlockCollateral).unwrap().status,
            status::REJECTED
        );
        assert!(h.state().matched_redeem_requests.contains_key("r1"));
    }

    #[test]
    fn test_unlock_paid_back_to_custodian_rejected() {
        let mut h = ported();
        h.block(vec![redeem("r1", "porter", BTC / 10, PRV)]);
        h.block(vec![match_redeem("alice", "r1")]);

        let insts = h.block(vec![unlock("r1", "alice", BTC / 10, "alice-self-pay")]);
        assert_eq!(
            find(&insts, MetaType::RequestUnlockCollateral).unwrap().status,
            status::REJECTED
        );
        let state = h.state();
        assert!(state.matched_redeem_requests.contains_key("r1"));
        assert_eq!(
            state.custodian("alice").unwrap().locked(PBTC_ID, PRV_ID),
            1_500 * PRV
        );
    }

    #[test]
    fn test_redeem_above_holdings_rejected() {
        let mut h = ported();
        let insts = h.block(vec![redeem("r1", "porter", BTC, PRV)]);
        assert_eq!(
            find(&insts, MetaType::RedeemRequest).unwrap().status,
            status::REJECTED
        );
        assert!(h.state().waiting_redeem_requests.is_empty());
    }

    #[test]
    fn test_unmatched_redeem_is_auto_picked() {
        let mut h = ported();
        h.block(vec![redeem("r1", "porter", BTC / 10, PRV)]);

        let insts = h.run_until(h.height + 6);
        let picks = find_all(&insts, MetaType::PickMoreCustodianForRedeem);
        assert_eq!(picks.len(), 1);
        assert_eq!(picks[0].status, status::ACCEPTED);

        let state = h.state();
        assert!(state.waiting_redeem_requests.is_empty());
        let matched = &state.matched_redeem_requests["r1"];
        assert_eq!(matched.custodians.len(), 1);
        assert_eq!(matched.custodians[0].incognito_address, "alice");
        assert_eq!(matched.custodians[0].remote_address, "btc-alice");
    }

    #[test]
    fn test_runaway_custodian_pays_redeemer_from_collateral() {
        let mut h = ported();
        h.block(vec![redeem("r1", "porter", BTC / 10, PRV)]);
        h.block(vec![match_redeem("alice", "r1")]);

        let insts = h.run_until(h.height + 8);
        let runaway = find(&insts, MetaType::LiquidateCustodian).unwrap();
        let content: LiquidateCustodianContent = runaway.decode().unwrap();
        // 105% of $1,000
        assert_eq!(content.liquidated_collaterals[PRV_ID], 1_050 * PRV);

        let state = h.state();
        let alice = state.custodian("alice").unwrap();
        assert!(state.matched_redeem_requests.is_empty());
        assert_eq!(alice.locked(PBTC_ID, PRV_ID), 0);
        assert_eq!(alice.total(PRV_ID), 8_950 * PRV);
        assert_eq!(alice.free(PRV_ID), 8_950 * PRV);
    }
}
