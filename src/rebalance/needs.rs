//! Per-chain needs with a tolerance band.

use super::Amount;
use crate::catalog::Chain;
use crate::error::{RebalanceError, Result};
use std::collections::BTreeMap;
use tracing::debug;

/// Signed deltas for chains outside the `tolerance_pct` band around their
/// preferred balance.
///
/// A chain is flagged when `preferred * 100 > current * (100 + tolerance)` or
/// `preferred * (100 + tolerance) < current * 100`. Balanced chains are absent.
pub fn calculate_needs(
    token: &str,
    preferred: &BTreeMap<Chain, Amount>,
    current: &BTreeMap<Chain, Amount>,
    tolerance_pct: u32,
) -> Result<BTreeMap<Chain, i128>> {
    let overflow = || RebalanceError::Overflow {
        token: token.to_string(),
    };
    let band = 100 + Amount::from(tolerance_pct);
    let mut needs = BTreeMap::new();

    for (chain, preferred) in preferred {
        let current = current.get(chain).copied().unwrap_or(0);

        let preferred_low = preferred.checked_mul(100).ok_or_else(overflow)?;
        let preferred_high = preferred.checked_mul(band).ok_or_else(overflow)?;
        let current_low = current.checked_mul(100).ok_or_else(overflow)?;
        let current_high = current.checked_mul(band).ok_or_else(overflow)?;

        let underfunded = preferred_low > current_high;
        let overfunded = preferred_high < current_low;
        if !underfunded && !overfunded {
            continue;
        }

        let preferred = i128::try_from(*preferred).map_err(|_| overflow())?;
        let current = i128::try_from(current).map_err(|_| overflow())?;
        let need = preferred - current;

        debug!(%token, %chain, preferred, current, need, "Chain outside tolerance band");
        needs.insert(*chain, need);
    }

    Ok(needs)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: u32 = 10;

    #[test]
    fn test_both_sides_flagged() {
        let preferred = BTreeMap::from([(Chain::Optimism, 5000), (Chain::Xdai, 5000)]);
        let current = BTreeMap::from([(Chain::Optimism, 9000), (Chain::Xdai, 1000)]);

        let needs = calculate_needs("USDC", &preferred, &current, TOLERANCE).unwrap();

        assert_eq!(needs[&Chain::Optimism], -4000);
        assert_eq!(needs[&Chain::Xdai], 4000);
        assert_eq!(needs.values().sum::<i128>(), 0);
    }

    #[test]
    fn test_exact_match_yields_nothing() {
        let preferred = BTreeMap::from([(Chain::Optimism, 9000), (Chain::Xdai, 1000)]);

        let needs = calculate_needs("USDC", &preferred, &preferred, TOLERANCE).unwrap();

        assert!(needs.is_empty());
    }

    #[test]
    fn test_band_edges_are_tolerated() {
        // 1100 vs 1000 sits exactly on the upper edge, 1000 vs 1100 on the lower
        let preferred = BTreeMap::from([(Chain::Optimism, 1000), (Chain::Polygon, 1100)]);
        let current = BTreeMap::from([(Chain::Optimism, 1100), (Chain::Polygon, 1000)]);

        let needs = calculate_needs("USDC", &preferred, &current, TOLERANCE).unwrap();

        assert!(needs.is_empty());
    }

    #[test]
    fn test_just_outside_band_is_flagged() {
        let preferred = BTreeMap::from([(Chain::Optimism, 1000), (Chain::Polygon, 1101)]);
        let current = BTreeMap::from([(Chain::Optimism, 1101), (Chain::Polygon, 1000)]);

        let needs = calculate_needs("USDC", &preferred, &current, TOLERANCE).unwrap();

        assert_eq!(needs[&Chain::Optimism], -101);
        assert_eq!(needs[&Chain::Polygon], 101);
    }

    #[test]
    fn test_empty_chain_with_target_is_flagged() {
        let preferred = BTreeMap::from([(Chain::Polygon, 1), (Chain::Xdai, 0)]);
        let current = BTreeMap::from([(Chain::Polygon, 0), (Chain::Xdai, 0)]);

        let needs = calculate_needs("USDC", &preferred, &current, TOLERANCE).unwrap();

        assert_eq!(needs, BTreeMap::from([(Chain::Polygon, 1)]));
    }

    #[test]
    fn test_wider_band() {
        let preferred = BTreeMap::from([(Chain::Optimism, 5000), (Chain::Xdai, 5000)]);
        let current = BTreeMap::from([(Chain::Optimism, 6000), (Chain::Xdai, 4000)]);

        assert_eq!(
            calculate_needs("USDC", &preferred, &current, 10).unwrap().len(),
            2
        );
        assert!(calculate_needs("USDC", &preferred, &current, 25)
            .unwrap()
            .is_empty());
    }
}
