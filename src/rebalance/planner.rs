//! Greedy surplus/deficit matching.

use super::{Amount, TransferInstruction};
use crate::catalog::Chain;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::debug;

/// Turn one token's needs into point-to-point transfers.
///
/// Sources (negative needs) and destinations (positive needs) are sorted by
/// magnitude, largest first, ties in chain order. Each source fills the
/// largest remaining destinations until its surplus is gone. When surplus and
/// deficit balance out, at most `sources + destinations - 1` transfers come
/// out, none of them zero.
pub fn plan_transfers(token: &str, needs: &BTreeMap<Chain, i128>) -> Vec<TransferInstruction> {
    let mut sources: Vec<(Chain, Amount)> = needs
        .iter()
        .filter(|(_, need)| **need < 0)
        .map(|(chain, need)| (*chain, need.unsigned_abs()))
        .collect();
    let mut destinations: Vec<(Chain, Amount)> = needs
        .iter()
        .filter(|(_, need)| **need > 0)
        .map(|(chain, need)| (*chain, need.unsigned_abs()))
        .collect();

    let mut transfers = Vec::new();
    if sources.is_empty() || destinations.is_empty() {
        return transfers;
    }

    sources.sort_by(largest_first);

    for (source, surplus) in sources.iter_mut() {
        destinations.sort_by(largest_first);

        for (destination, deficit) in destinations.iter_mut() {
            if *surplus == 0 {
                break;
            }
            if *deficit == 0 {
                continue;
            }

            let amount = (*deficit).min(*surplus);
            *surplus -= amount;
            *deficit -= amount;

            debug!(%token, from = %source, to = %destination, amount, "Planned transfer");
            transfers.push(TransferInstruction {
                token: token.to_string(),
                from: *source,
                to: *destination,
                amount,
            });
        }
    }

    transfers
}

fn largest_first(a: &(Chain, Amount), b: &(Chain, Amount)) -> Ordering {
    b.1.cmp(&a.1).then(a.0.cmp(&b.0))
}

#[cfg(test)]
mod tests {
    use super::{plan_transfers, TransferInstruction};
    use crate::catalog::Chain;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn transfer(from: Chain, to: Chain, amount: u128) -> TransferInstruction {
        TransferInstruction {
            token: "USDC".to_string(),
            from,
            to,
            amount,
        }
    }

    #[test]
    fn test_single_pair() {
        let needs = BTreeMap::from([(Chain::Optimism, -4000), (Chain::Xdai, 4000)]);

        assert_eq!(
            plan_transfers("USDC", &needs),
            vec![transfer(Chain::Optimism, Chain::Xdai, 4000)]
        );
    }

    #[test]
    fn test_source_fills_largest_destinations_first() {
        let needs = BTreeMap::from([
            (Chain::Arbitrum, 1200),
            (Chain::Optimism, 6900),
            (Chain::Xdai, -5100),
            (Chain::Polygon, -3000),
        ]);

        let transfers = plan_transfers("USDC", &needs);

        assert_eq!(
            transfers,
            vec![
                transfer(Chain::Xdai, Chain::Optimism, 5100),
                transfer(Chain::Polygon, Chain::Optimism, 1800),
                transfer(Chain::Polygon, Chain::Arbitrum, 1200),
            ]
        );
    }

    #[test]
    fn test_split_source_decrements_destination() {
        // one destination larger than every source must be fed by all of them
        let needs = BTreeMap::from([
            (Chain::Optimism, -300),
            (Chain::Polygon, -200),
            (Chain::Xdai, 500),
        ]);

        let transfers = plan_transfers("USDC", &needs);

        assert_eq!(
            transfers,
            vec![
                transfer(Chain::Optimism, Chain::Xdai, 300),
                transfer(Chain::Polygon, Chain::Xdai, 200),
            ]
        );
    }

    #[test]
    fn test_ties_follow_chain_order() {
        let needs = BTreeMap::from([
            (Chain::Ethereum, -100),
            (Chain::Optimism, 50),
            (Chain::Polygon, 50),
        ]);

        let transfers = plan_transfers("USDC", &needs);

        assert_eq!(
            transfers,
            vec![
                transfer(Chain::Ethereum, Chain::Optimism, 50),
                transfer(Chain::Ethereum, Chain::Polygon, 50),
            ]
        );
    }

    #[test]
    fn test_one_sided_needs_yield_nothing() {
        let needs = BTreeMap::from([(Chain::Optimism, 10), (Chain::Xdai, 20)]);
        assert!(plan_transfers("USDC", &needs).is_empty());
        assert!(plan_transfers("USDC", &BTreeMap::new()).is_empty());
    }

    #[test]
    fn test_zero_needs_ignored() {
        let needs = BTreeMap::from([
            (Chain::Optimism, 0),
            (Chain::Polygon, -10),
            (Chain::Xdai, 10),
        ]);

        let transfers = plan_transfers("USDC", &needs);

        assert_eq!(transfers, vec![transfer(Chain::Polygon, Chain::Xdai, 10)]);
    }

    #[test]
    fn test_unbalanced_needs_stop_when_one_side_runs_out() {
        let needs = BTreeMap::from([(Chain::Optimism, -10), (Chain::Xdai, 25)]);

        let transfers = plan_transfers("USDC", &needs);

        assert_eq!(transfers, vec![transfer(Chain::Optimism, Chain::Xdai, 10)]);
    }

    /// Needs over all chains whose deltas sum to zero.
    fn conserved_needs() -> impl Strategy<Value = BTreeMap<Chain, i128>> {
        proptest::collection::vec(-1_000_000i128..1_000_000, Chain::ALL.len() - 1).prop_map(
            |deltas| {
                let last = -deltas.iter().sum::<i128>();
                Chain::ALL
                    .into_iter()
                    .zip(deltas.into_iter().chain(std::iter::once(last)))
                    .collect()
            },
        )
    }

    proptest! {
        #[test]
        fn prop_planner_conserves_value(needs in conserved_needs()) {
            let transfers = plan_transfers("USDC", &needs);

            let sources = needs.values().filter(|n| **n < 0).count();
            let destinations = needs.values().filter(|n| **n > 0).count();
            if sources > 0 && destinations > 0 {
                prop_assert!(transfers.len() < sources + destinations);
            } else {
                prop_assert!(transfers.is_empty());
            }

            for (chain, need) in &needs {
                let sent: u128 = transfers.iter().filter(|t| t.from == *chain).map(|t| t.amount).sum();
                let received: u128 = transfers.iter().filter(|t| t.to == *chain).map(|t| t.amount).sum();

                if *need < 0 {
                    prop_assert_eq!(sent, need.unsigned_abs());
                    prop_assert_eq!(received, 0);
                } else {
                    prop_assert_eq!(received, need.unsigned_abs());
                    prop_assert_eq!(sent, 0);
                }
            }

            prop_assert!(transfers.iter().all(|t| t.amount > 0 && t.from != t.to));
        }
    }
}
