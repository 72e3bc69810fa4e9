//! Deterministic replay: a follower applying the leader's instructions must
//! reach the same roots.

#[cfg(test)]
mod tests {
    use crate::portal::fixtures::*;
    use qc_18_portal::{
        ActionPayload, InMemoryPortalStore, PortalBlockHandler, PortalManager, StateRoot,
        StaticProofVerifier,
    };
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_blocks(seed: u64, blocks: usize) -> Vec<Vec<ActionPayload>> {
        let mut rng = StdRng::seed_from_u64(seed);
        let custodians = ["alice", "bob", "carol"];
        let mut out = vec![vec![rates(PRV_RATE, BTC_RATE)]];
        let mut next_porting = 0u32;
        for _ in 0..blocks {
            let mut actions = Vec::new();
            for _ in 0..rng.gen_range(0..4) {
                let payload = match rng.gen_range(0..3) {
                    0 => deposit(
                        custodians[rng.gen_range(0..custodians.len())],
                        rng.gen_range(1..5_000) * PRV,
                    ),
                    1 => {
                        next_porting += 1;
                        porting(
                            &format!("p{}", next_porting),
                            "porter",
                            rng.gen_range(1..20) * BTC / 100,
                            PRV,
                        )
                    }
                    _ => rates(
                        rng.gen_range(800_000..1_200_000),
                        rng.gen_range(9_000_000_000..14_000_000_000),
                    ),
                };
                actions.push(payload);
            }
            out.push(actions);
        }
        out
    }

    fn run(blocks: &[Vec<ActionPayload>]) -> PortalHarness {
        let mut h = PortalHarness::with_fast_params();
        for actions in blocks {
            h.block(actions.clone());
        }
        h
    }

    #[test]
    fn test_same_actions_same_instructions_and_roots() {
        let blocks = random_blocks(7, 30);
        let a = run(&blocks);
        let b = run(&blocks);
        assert_eq!(a.history, b.history);
    }

    #[test]
    fn test_follower_reaches_leader_roots() {
        let leader = run(&random_blocks(11, 30));
        let mut follower: PortalManager<InMemoryPortalStore, StaticProofVerifier> =
            PortalManager::new(
                InMemoryPortalStore::new(),
                StaticProofVerifier::new(),
                fast_params(),
            )
            .unwrap();

        for (height, insts, root) in &leader.history {
            let replayed: StateRoot =
                PortalBlockHandler::apply_block(&mut follower, *height, insts).unwrap();
            assert_eq!(&replayed, root, "diverged at height {}", height);
        }
    }

    #[test]
    fn test_follower_from_consensus_strings() {
        let leader = run(&random_blocks(23, 20));
        let mut follower = PortalManager::new(
            InMemoryPortalStore::new(),
            StaticProofVerifier::new(),
            fast_params(),
        )
        .unwrap();

        for (height, insts, root) in &leader.history {
            let mut raw: Vec<Vec<String>> = insts.iter().map(|i| i.to_strings()).collect();
            // non-portal instructions in the same block are ignored
            raw.push(vec!["stake".to_string(), "0".to_string()]);
            assert_eq!(&follower.apply_raw_block(*height, &raw).unwrap(), root);
        }
    }

    #[test]
    fn test_different_actions_different_root() {
        let a = run(&[vec![rates(PRV_RATE, BTC_RATE), deposit("alice", 100 * PRV)]]);
        let b = run(&[vec![rates(PRV_RATE, BTC_RATE), deposit("alice", 101 * PRV)]]);
        assert_ne!(a.last_root(), b.last_root());
    }
}
