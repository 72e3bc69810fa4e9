//! Porting lifecycle: request, ptoken claim, expiry.

#[cfg(test)]
mod tests {
    use crate::portal::fixtures::*;
    use qc_18_portal::domain::status::decode_status;
    use qc_18_portal::instructions::{status, PortingRequestContent};
    use qc_18_portal::{
        MetaType, ObjectKey, PortalStateStore, StaticProofVerifier, StatusKind, PBTC_ID, PRV_ID,
    };

    fn harness() -> PortalHarness {
        let verifier = StaticProofVerifier::new().with_proof(
            "BTC",
            "porter-pay",
            0,
            btc_transfer("btc-porter", "btc-alice", BTC / 10),
        );
        let mut h = PortalHarness::new(fast_params(), verifier);
        h.block(vec![rates(PRV_RATE, BTC_RATE), deposit("alice", 10_000 * PRV)]);
        h
    }

    fn porting_status(h: &PortalHarness, id: &str) -> String {
        let bytes = h
            .manager
            .store()
            .get(&ObjectKey::status(StatusKind::PortingRequest, id))
            .unwrap()
            .unwrap();
        decode_status(&bytes).unwrap()
    }

    #[test]
    fn test_porting_locks_150_percent() {
        let mut h = harness();
        let insts = h.block(vec![porting("p1", "porter", BTC / 10, PRV)]);

        let inst = find(&insts, MetaType::RequestPorting).unwrap();
        assert_eq!(inst.status, status::ACCEPTED);
        let content: PortingRequestContent = inst.decode().unwrap();
        assert_eq!(content.custodians.len(), 1);

        let state = h.state();
        let alice = state.custodian("alice").unwrap();
        // 0.1 BTC = $1,000, 150% = 1,500 PRV
        assert_eq!(alice.locked(PBTC_ID, PRV_ID), 1_500 * PRV);
        assert_eq!(alice.free(PRV_ID), 8_500 * PRV);
        assert_eq!(alice.reward(PRV_ID), PRV);
        assert!(state.waiting_porting_requests.contains_key("p1"));
        assert_eq!(porting_status(&h, "p1"), "Waiting");
    }

    #[test]
    fn test_ptoken_mints_and_keeps_collateral_locked() {
        let mut h = harness();
        h.block(vec![porting("p1", "porter", BTC / 10, PRV)]);
        let insts = h.block(vec![ptoken("p1", "porter", BTC / 10, "porter-pay")]);
        assert_eq!(
            find(&insts, MetaType::RequestPToken).unwrap().status,
            status::ACCEPTED
        );

        let state = h.state();
        let alice = state.custodian("alice").unwrap();
        assert_eq!(alice.holding(PBTC_ID), BTC / 10);
        assert_eq!(alice.locked(PBTC_ID, PRV_ID), 1_500 * PRV);
        assert!(state.waiting_porting_requests.is_empty());
        assert_eq!(porting_status(&h, "p1"), "Success");
    }

    #[test]
    fn test_ptoken_replay_rejected() {
        let mut h = harness();
        h.block(vec![porting("p1", "porter", BTC / 10, PRV)]);
        h.block(vec![ptoken("p1", "porter", BTC / 10, "porter-pay")]);
        h.block(vec![porting("p2", "porter", BTC / 10, PRV)]);

        let insts = h.block(vec![ptoken("p2", "porter", BTC / 10, "porter-pay")]);
        assert_eq!(
            find(&insts, MetaType::RequestPToken).unwrap().status,
            status::REJECTED
        );
        assert!(h.state().waiting_porting_requests.contains_key("p2"));
    }

    #[test]
    fn test_porting_without_custodians_rejected() {
        let mut h = PortalHarness::with_fast_params();
        h.block(vec![rates(PRV_RATE, BTC_RATE)]);
        let insts = h.block(vec![porting("p1", "porter", BTC, PRV)]);
        assert_eq!(
            find(&insts, MetaType::RequestPorting).unwrap().status,
            status::REJECTED
        );
        assert!(h.state().waiting_porting_requests.is_empty());
    }

    #[test]
    fn test_unclaimed_porting_expires() {
        let mut h = harness();
        h.block(vec![porting("p1", "porter", BTC / 10, PRV)]);

        let insts = h.run_until(h.height + 8);
        assert_eq!(find_all(&insts, MetaType::ExpiredWaitingPorting).len(), 1);

        let state = h.state();
        let alice = state.custodian("alice").unwrap();
        assert_eq!(alice.locked(PBTC_ID, PRV_ID), 0);
        assert_eq!(alice.free(PRV_ID), 10_000 * PRV);
        assert!(state.waiting_porting_requests.is_empty());
        assert_eq!(porting_status(&h, "p1"), "Expired");
    }

    #[test]
    fn test_topped_up_porting_unlocks_everything_on_expiry() {
        let mut h = harness();
        h.block(vec![porting("p1", "porter", BTC / 10, PRV)]);
        let insts = h.block(vec![topup_porting("alice", "p1", 500 * PRV)]);
        assert_eq!(
            find(&insts, MetaType::TopUpWaitingPorting).unwrap().status,
            status::ACCEPTED
        );

        let state = h.state();
        let matched = state.waiting_porting_requests["p1"].custodian("alice").unwrap();
        assert_eq!(matched.locked_amount_collateral[PRV_ID], 2_000 * PRV);
        let alice = state.custodian("alice").unwrap();
        assert_eq!(alice.locked(PBTC_ID, PRV_ID), 2_000 * PRV);
        assert_eq!(alice.free(PRV_ID), 8_000 * PRV);

        let insts = h.run_until(h.height + 8);
        assert_eq!(find_all(&insts, MetaType::ExpiredWaitingPorting).len(), 1);
        let state = h.state();
        let alice = state.custodian("alice").unwrap();
        assert_eq!(alice.locked(PBTC_ID, PRV_ID), 0);
        assert_eq!(alice.free(PRV_ID), alice.total(PRV_ID));
        assert_eq!(alice.total(PRV_ID), 10_000 * PRV);
    }

    #[test]
    fn test_topup_by_unmatched_custodian_rejected() {
        let mut h = harness();
        // too small to be matched next to alice
        h.block(vec![deposit("bob", 1_000 * PRV)]);
        h.block(vec![porting("p1", "porter", BTC / 10, PRV)]);
        assert!(h.state().waiting_porting_requests["p1"]
            .custodian("bob")
            .is_none());

        let insts = h.block(vec![topup_porting("bob", "p1", 500 * PRV)]);
        assert_eq!(
            find(&insts, MetaType::TopUpWaitingPorting).unwrap().status,
            status::REJECTED
        );
        let state = h.state();
        let bob = state.custodian("bob").unwrap();
        assert_eq!(bob.free(PRV_ID), 1_000 * PRV);
        assert_eq!(bob.locked(PBTC_ID, PRV_ID), 0);
        assert!(state.waiting_porting_requests["p1"]
            .custodian("bob")
            .is_none());
    }

    #[test]
    fn test_waiting_porting_liquidated_when_rate_jumps() {
        let mut h = harness();
        h.block(vec![porting("p1", "porter", BTC / 10, PRV)]);
        // BTC at $13,000: 1,500 / 1,300 = 115%
        h.block(vec![rates(PRV_RATE, 13_000_000_000)]);
        let insts = h.block(Vec::new());

        assert!(find(&insts, MetaType::ExpiredWaitingPorting).is_some());
        assert_eq!(porting_status(&h, "p1"), "Liquidated");
        let state = h.state();
        assert_eq!(state.custodian("alice").unwrap().free(PRV_ID), 10_000 * PRV);
    }
}
