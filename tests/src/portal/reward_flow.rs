//! Custodian rewards: fees, epoch splits and withdrawal.

#[cfg(test)]
mod tests {
    use crate::portal::fixtures::*;
    use qc_18_portal::instructions::{status, PortalRewardContent, WithdrawRewardContent};
    use qc_18_portal::{MetaType, StaticProofVerifier, PRV_ID};
    use std::collections::BTreeMap;

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
    fn test_every_block_carries_one_reward() {
        let mut h = PortalHarness::with_fast_params();
        for _ in 0..3 {
            let insts = h.block(Vec::new());
            assert_eq!(find_all(&insts, MetaType::PortalReward).len(), 1);
        }
    }

    #[test]
    fn test_epoch_rewards_go_to_holding_custodians() {
        let mut h = ported();
        let mut epoch_rewards = BTreeMap::new();
        epoch_rewards.insert(PRV_ID.to_string(), 1_000 * PRV);

        let insts = h.block_with_rewards(Vec::new(), &epoch_rewards);
        let total = insts
            .iter()
            .position(|i| i.meta_type == MetaType::PortalTotalReward)
            .unwrap();
        let reward = insts
            .iter()
            .position(|i| i.meta_type == MetaType::PortalReward)
            .unwrap();
        assert!(total < reward);

        let content: PortalRewardContent = insts[reward].decode().unwrap();
        assert_eq!(content.rewards.len(), 1);
        assert_eq!(content.rewards[0].custodian_address, "alice");
        assert_eq!(content.rewards[0].rewards[PRV_ID], 1_000 * PRV);
        // plus the porting fee
        assert_eq!(
            h.state().custodian("alice").unwrap().reward(PRV_ID),
            1_001 * PRV
        );
    }

    #[test]
    fn test_weights_reset_at_epoch_start() {
        let mut h = ported();
        // epoch_blocks = 10: the block built on height 10 starts an epoch
        h.run_until(11);
        let state = h.state();
        // one block of $1,000 held since the reset
        assert_eq!(state.locked_collateral_for_rewards.total_locked_amount, 1_000_000_000);
        assert_eq!(
            state.locked_collateral_for_rewards.locked_amount["alice"],
            1_000_000_000
        );
    }

    #[test]
    fn test_withdraw_reward_takes_whole_balance_once() {
        let mut h = ported();
        let insts = h.block(vec![withdraw_reward("alice")]);
        let inst = find(&insts, MetaType::RequestWithdrawReward).unwrap();
        assert_eq!(inst.status, status::ACCEPTED);
        let content: WithdrawRewardContent = inst.decode().unwrap();
        assert_eq!(content.reward_amount, PRV);
        assert_eq!(h.state().custodian("alice").unwrap().reward(PRV_ID), 0);

        let insts = h.block(vec![withdraw_reward("alice")]);
        assert_eq!(
            find(&insts, MetaType::RequestWithdrawReward).unwrap().status,
            status::REJECTED
        );
    }
}
