//! Target allocation normalization.
//!
//! Narrows the caller's targets and the observed balances to the same
//! token/chain key set and repairs percentages so each token sums to 100.
//! Inputs are never modified; new maps are returned.

use super::{Amount, BalanceSet, TargetAllocation};
use crate::catalog::Chain;
use crate::error::{RebalanceError, Result};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Targets and balances restricted to the same keys, targets summing to 100.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Normalized {
    pub targets: TargetAllocation,
    pub balances: BalanceSet,
    /// Tokens excluded from the rest of the run, with the reason
    pub skipped: Vec<RebalanceError>,
}

/// Reconcile `targets` against the observable `balances`.
pub fn normalize(targets: &TargetAllocation, balances: &BalanceSet) -> Normalized {
    let mut normalized = Normalized::default();

    for token in balances.keys().filter(|token| !targets.contains_key(*token)) {
        debug!(%token, "No target allocation for token, leaving it untouched");
    }

    for (token, chain_targets) in targets {
        let Some(chain_balances) = balances.get(token) else {
            warn!(%token, "Token is not bridgeable on this network, dropping it");
            normalized.skipped.push(RebalanceError::UnsupportedToken {
                token: token.clone(),
            });
            continue;
        };

        match normalize_token(token, chain_targets, chain_balances) {
            Ok((token_targets, token_balances)) => {
                normalized.targets.insert(token.clone(), token_targets);
                normalized.balances.insert(token.clone(), token_balances);
            }
            Err(e) => {
                warn!(%token, error = %e, "Skipping token");
                normalized.skipped.push(e);
            }
        }
    }

    normalized
}

fn normalize_token(
    token: &str,
    targets: &BTreeMap<Chain, u32>,
    balances: &BTreeMap<Chain, Amount>,
) -> Result<(BTreeMap<Chain, u32>, BTreeMap<Chain, Amount>)> {
    if let Some((chain, percent)) = targets.iter().find(|(_, percent)| **percent > 100) {
        return Err(RebalanceError::InvalidAllocation {
            token: token.to_string(),
            reason: format!("{chain} is allocated {percent}%"),
        });
    }

    for chain in targets.keys().filter(|chain| !balances.contains_key(*chain)) {
        warn!(
            %token,
            %chain,
            "Chain not supported for token, its portion is spread over the remaining chains"
        );
    }

    let mut kept: BTreeMap<Chain, u32> = targets
        .iter()
        .filter(|(chain, _)| balances.contains_key(*chain))
        .map(|(chain, percent)| (*chain, *percent))
        .collect();

    if kept.is_empty() {
        return Err(RebalanceError::NoSupportedChains {
            token: token.to_string(),
        });
    }

    let kept_balances = balances
        .iter()
        .filter(|(chain, _)| kept.contains_key(*chain))
        .map(|(chain, balance)| (*chain, *balance))
        .collect();

    redistribute(token, &mut kept)?;

    Ok((kept, kept_balances))
}

/// Spread `100 - sum` over the chains in key order.
///
/// Every chain receives `portion`; the first `remainder` chains receive one
/// extra unit. Fails if a chain would drop below zero.
pub fn redistribute(token: &str, percentages: &mut BTreeMap<Chain, u32>) -> Result<()> {
    let sum: i64 = percentages.values().map(|p| i64::from(*p)).sum();
    if sum == 100 || percentages.is_empty() {
        return Ok(());
    }

    let count = percentages.len() as i64;
    let difference = 100 - sum;
    let mut remainder = difference.rem_euclid(count);
    let portion = (difference - remainder) / count;

    debug!(%token, sum, difference, portion, remainder, "Redistributing allocation");

    for (chain, percent) in percentages.iter_mut() {
        let mut adjustment = portion;
        if remainder > 0 {
            adjustment += 1;
            remainder -= 1;
        }
        let adjusted = i64::from(*percent) + adjustment;
        *percent = u32::try_from(adjusted).map_err(|_| RebalanceError::InvalidAllocation {
            token: token.to_string(),
            reason: format!("{chain} would fall to {adjusted}% after redistribution"),
        })?;
    }

    Ok(())
}

/// `total * percent / 100` per chain, floor division.
pub fn preferred_balances(
    token: &str,
    targets: &BTreeMap<Chain, u32>,
    balances: &BTreeMap<Chain, Amount>,
) -> Result<BTreeMap<Chain, Amount>> {
    let overflow = || RebalanceError::Overflow {
        token: token.to_string(),
    };

    let total = balances
        .values()
        .try_fold(0u128, |acc, balance| acc.checked_add(*balance))
        .ok_or_else(overflow)?;

    targets
        .iter()
        .map(|(chain, percent)| -> Result<(Chain, Amount)> {
            let scaled = total
                .checked_mul(Amount::from(*percent))
                .ok_or_else(overflow)?;
            Ok((*chain, scaled / 100))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{normalize, preferred_balances, redistribute};
    use crate::catalog::Chain;
    use crate::error::RebalanceError;
    use crate::rebalance::{Amount, BalanceSet, TargetAllocation};
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn targets(entries: &[(&str, &[(Chain, u32)])]) -> TargetAllocation {
        entries
            .iter()
            .map(|(token, chains)| (token.to_string(), chains.iter().copied().collect()))
            .collect()
    }

    fn balances(entries: &[(&str, &[(Chain, Amount)])]) -> BalanceSet {
        entries
            .iter()
            .map(|(token, chains)| (token.to_string(), chains.iter().copied().collect()))
            .collect()
    }

    #[test]
    fn test_complete_allocation_is_unchanged() {
        let t = targets(&[("USDC", &[(Chain::Optimism, 30), (Chain::Xdai, 70)])]);
        let b = balances(&[("USDC", &[(Chain::Optimism, 23130), (Chain::Xdai, 0)])]);

        let normalized = normalize(&t, &b);

        assert_eq!(normalized.targets, t);
        assert_eq!(normalized.balances, b);
        assert!(normalized.skipped.is_empty());
    }

    #[test]
    fn test_unsupported_token_dropped() {
        let t = targets(&[
            ("USDC", &[(Chain::Optimism, 50), (Chain::Xdai, 50)]),
            ("DAI", &[(Chain::Optimism, 100)]),
        ]);
        let b = balances(&[
            ("USDC", &[(Chain::Optimism, 1), (Chain::Xdai, 1)]),
            ("USDT", &[(Chain::Optimism, 1), (Chain::Xdai, 1)]),
        ]);

        let normalized = normalize(&t, &b);

        assert_eq!(normalized.targets.keys().collect::<Vec<_>>(), vec!["USDC"]);
        assert_eq!(normalized.balances.keys().collect::<Vec<_>>(), vec!["USDC"]);
        assert_eq!(
            normalized.skipped,
            vec![RebalanceError::UnsupportedToken {
                token: "DAI".to_string()
            }]
        );
    }

    #[test]
    fn test_unsupported_chain_portion_redistributed() {
        // arbitrum is not bridgeable: its 20% goes to the other three chains
        let t = targets(&[(
            "USDC",
            &[
                (Chain::Optimism, 40),
                (Chain::Arbitrum, 20),
                (Chain::Polygon, 15),
                (Chain::Xdai, 20),
            ],
        )]);
        let b = balances(&[(
            "USDC",
            &[
                (Chain::Optimism, 100),
                (Chain::Polygon, 100),
                (Chain::Xdai, 100),
            ],
        )]);

        let normalized = normalize(&t, &b);
        let usdc = &normalized.targets["USDC"];

        // difference 25 over 3 chains: portion 8, remainder 1 goes to optimism
        assert_eq!(usdc[&Chain::Optimism], 49);
        assert_eq!(usdc[&Chain::Polygon], 23);
        assert_eq!(usdc[&Chain::Xdai], 28);
        assert!(!usdc.contains_key(&Chain::Arbitrum));
    }

    #[test]
    fn test_balances_restricted_to_target_chains() {
        let t = targets(&[("USDC", &[(Chain::Polygon, 100)])]);
        let b = balances(&[(
            "USDC",
            &[(Chain::Polygon, 10), (Chain::Xdai, 90), (Chain::Optimism, 5)],
        )]);

        let normalized = normalize(&t, &b);

        assert_eq!(
            normalized.balances["USDC"],
            BTreeMap::from([(Chain::Polygon, 10)])
        );
    }

    #[test]
    fn test_token_without_supported_chains_skipped() {
        let t = targets(&[
            ("USDC", &[(Chain::Arbitrum, 100)]),
            ("USDT", &[(Chain::Xdai, 100)]),
        ]);
        let b = balances(&[
            ("USDC", &[(Chain::Xdai, 1)]),
            ("USDT", &[(Chain::Xdai, 1)]),
        ]);

        let normalized = normalize(&t, &b);

        assert!(!normalized.targets.contains_key("USDC"));
        assert!(normalized.targets.contains_key("USDT"));
        assert_eq!(
            normalized.skipped,
            vec![RebalanceError::NoSupportedChains {
                token: "USDC".to_string()
            }]
        );
    }

    #[test]
    fn test_excess_is_taken_back() {
        let mut percentages = BTreeMap::from([
            (Chain::Optimism, 40),
            (Chain::Polygon, 40),
            (Chain::Xdai, 27),
        ]);

        redistribute("USDC", &mut percentages).unwrap();

        // difference -7 over 3 chains: portion -3, remainder 2 softens the first two
        assert_eq!(percentages[&Chain::Optimism], 38);
        assert_eq!(percentages[&Chain::Polygon], 38);
        assert_eq!(percentages[&Chain::Xdai], 24);
    }

    #[test]
    fn test_negative_percentage_rejected() {
        let t = targets(&[(
            "USDC",
            &[(Chain::Optimism, 0), (Chain::Polygon, 60), (Chain::Xdai, 60)],
        )]);
        let b = balances(&[(
            "USDC",
            &[(Chain::Optimism, 1), (Chain::Polygon, 1), (Chain::Xdai, 1)],
        )]);

        let normalized = normalize(&t, &b);

        assert!(normalized.targets.is_empty());
        assert!(matches!(
            normalized.skipped[0],
            RebalanceError::InvalidAllocation { .. }
        ));
    }

    #[test]
    fn test_percentage_above_hundred_rejected() {
        let t = targets(&[("USDC", &[(Chain::Optimism, 150)])]);
        let b = balances(&[("USDC", &[(Chain::Optimism, 1)])]);

        let normalized = normalize(&t, &b);

        assert!(matches!(
            normalized.skipped[0],
            RebalanceError::InvalidAllocation { .. }
        ));
    }

    #[test]
    fn test_preferred_balances_floor() {
        let t = BTreeMap::from([(Chain::Optimism, 33), (Chain::Polygon, 33), (Chain::Xdai, 34)]);
        let b = BTreeMap::from([(Chain::Optimism, 100), (Chain::Polygon, 0), (Chain::Xdai, 1)]);

        let preferred = preferred_balances("USDC", &t, &b).unwrap();

        // total 101: 33.33 -> 33, 34.34 -> 34
        assert_eq!(preferred[&Chain::Optimism], 33);
        assert_eq!(preferred[&Chain::Polygon], 33);
        assert_eq!(preferred[&Chain::Xdai], 34);
    }

    #[test]
    fn test_preferred_balances_overflow() {
        let t = BTreeMap::from([(Chain::Optimism, 50), (Chain::Xdai, 50)]);
        let b = BTreeMap::from([(Chain::Optimism, u128::MAX), (Chain::Xdai, 0)]);

        assert_eq!(
            preferred_balances("USDC", &t, &b),
            Err(RebalanceError::Overflow {
                token: "USDC".to_string()
            })
        );
    }

    proptest! {
        #[test]
        fn prop_redistribution_sums_to_hundred(
            raw in proptest::collection::vec(0u32..=100, 1..=5),
        ) {
            let mut percentages: BTreeMap<Chain, u32> =
                Chain::ALL.into_iter().zip(raw.iter().copied()).collect();
            let original = percentages.clone();
            let count = percentages.len() as i64;
            let difference = 100 - original.values().map(|p| i64::from(*p)).sum::<i64>();

            match redistribute("TKN", &mut percentages) {
                Ok(()) => {
                    prop_assert_eq!(percentages.values().sum::<u32>(), 100);
                    let floor = difference.div_euclid(count);
                    for (chain, before) in &original {
                        let adjustment = i64::from(percentages[chain]) - i64::from(*before);
                        prop_assert!(adjustment == floor || adjustment == floor + 1);
                    }
                }
                Err(e) => {
                    let is_invalid = matches!(e, RebalanceError::InvalidAllocation { .. });
                    prop_assert!(is_invalid);
                    prop_assert!(difference < 0);
                }
            }
        }

        #[test]
        fn prop_complete_allocation_is_idempotent(split in 0u32..=100) {
            let t = targets(&[("USDC", &[(Chain::Optimism, split), (Chain::Xdai, 100 - split)])]);
            let b = balances(&[("USDC", &[(Chain::Optimism, 7), (Chain::Xdai, 11)])]);

            let once = normalize(&t, &b);
            let twice = normalize(&once.targets, &once.balances);

            prop_assert_eq!(&once.targets, &t);
            prop_assert_eq!(once, twice);
        }
    }
}
