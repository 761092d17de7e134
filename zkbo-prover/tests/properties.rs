use proptest::prelude::*;

use std::sync::Arc;

use zkbo_common::{Fraction, HoldingEdge, ProofRequest, ProtocolKind, VerifyingKey};
use zkbo_prover::standard_protocols;
use zkbo_test_fixtures::{as_of, clock, MemoryAdapter, Scenario, KEY_SEED, WALLET};
use zkbo_verifier::{ExpiryPolicy, LocalVerifier};

/// Layered graph: the wallet, `levels - 1` layers of `width` wrappers, then
/// `width` assets. With `skips`, every holder also reaches two layers down,
/// so the same node sits at more than one depth. No holder allocates more
/// than 100%.
fn layered(levels: usize, width: usize, skips: bool, seeds: &[u64]) -> MemoryAdapter {
    let protocols = standard_protocols();
    let name = |level: usize, i: usize| {
        if level == 0 {
            WALLET.to_string()
        } else if level == levels {
            format!("ASSET{}", i)
        } else {
            format!("L{}N{}", level, i)
        }
    };
    let cap = 10_000 / (width as u64 + 1);

    let mut adapter = MemoryAdapter::new();
    let mut seed = seeds.iter().cycle();
    for level in 0..levels {
        let holders = if level == 0 { 1 } else { width };
        for h in 0..holders {
            for t in 0..width {
                let bps = seed.next().copied().unwrap_or(1) % cap + 1;
                let target = name(level + 1, t);
                adapter.add_edge(
                    HoldingEdge::new(
                        name(level, h),
                        format!("{}-share", target),
                        protocols[(level + t) % protocols.len()].clone(),
                        Fraction::from_bps(bps),
                        target,
                    )
                    .with_amount(1_000),
                );
            }
            if skips && level + 2 <= levels {
                let bps = seed.next().copied().unwrap_or(1) % cap + 1;
                let target = name(level + 2, h % width);
                adapter.add_edge(
                    HoldingEdge::new(
                        name(level, h),
                        format!("{}-skip", target),
                        ProtocolKind::Custody,
                        Fraction::from_bps(bps),
                        target,
                    )
                    .with_amount(1_000),
                );
            }
        }
    }
    adapter
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn exposures_never_exceed_the_root(
        levels in 1usize..=4,
        width in 1usize..=3,
        max_depth in 1u8..=5,
        skips in any::<bool>(),
        seeds in prop::collection::vec(any::<u64>(), 1..16),
    ) {
        let adapter = layered(levels, width, skips, &seeds);
        let scenario = Scenario::new("layered", max_depth, adapter);
        let request = ProofRequest::new(WALLET, as_of()).with_max_depth(max_depth);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let report = runtime.block_on(scenario.pipeline().prove(&request)).unwrap();
        let proof = &report.proof;

        let named = proof
            .exposures
            .iter()
            .fold(Fraction::ZERO, |acc, e| acc.saturating_add(e.fraction));
        prop_assert!(named <= Fraction::ONE.saturating_add(Fraction::EPSILON));
        prop_assert_eq!(report.residual, Fraction::ONE.saturating_sub(named));

        prop_assert!(proof.nesting_depth <= max_depth);
        prop_assert_eq!(proof.protocols_traversed.len(), usize::from(proof.nesting_depth));
        prop_assert!(proof
            .protocols_traversed
            .iter()
            .all(|p| !matches!(p, ProtocolKind::Other(_))));

        let verifier = LocalVerifier::for_key(
            VerifyingKey::from_seed(&KEY_SEED),
            ExpiryPolicy::default(),
            Arc::new(clock()),
        );
        prop_assert_eq!(verifier.check(proof).error, None);
    }
}
