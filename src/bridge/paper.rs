//! Paper bridge for dry runs and tests.

use super::traits::{Authorization, BalanceReader, QuoteOracle, TransferCapability};
use crate::catalog::Chain;
use crate::rebalance::{Amount, BalanceSet};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// A transfer settled by the paper bridge.
#[derive(Debug, Clone, Serialize)]
pub struct PaperTransfer {
    pub receipt: String,
    pub token: String,
    pub from: Chain,
    pub to: Chain,
    pub amount: Amount,
    pub received: Amount,
    pub account: String,
    pub settled_at: DateTime<Utc>,
}

/// Simulated on-chain state.
#[derive(Debug, Default)]
pub struct PaperState {
    pub balances: BalanceSet,
    pub transfers: Vec<PaperTransfer>,
}

/// In-memory bridge that charges a flat fee in basis points.
///
/// Balances move only when a send settles, so a paper run can be inspected
/// afterwards exactly like a live one.
pub struct PaperBridge {
    state: Arc<RwLock<PaperState>>,
    receipt_counter: AtomicU64,
    /// Bridge fee charged on every transfer (25 = 0.25%)
    fee_bps: u32,
    failing_routes: HashSet<(Chain, Chain)>,
    unreachable: HashSet<Chain>,
    send_latency: Option<Duration>,
    quote_latency: Option<Duration>,
}

impl PaperBridge {
    /// Create a paper bridge holding `balances`.
    pub fn new(balances: BalanceSet, fee_bps: u32) -> Self {
        Self {
            state: Arc::new(RwLock::new(PaperState {
                balances,
                transfers: Vec::new(),
            })),
            receipt_counter: AtomicU64::new(1),
            fee_bps,
            failing_routes: HashSet::new(),
            unreachable: HashSet::new(),
            send_latency: None,
            quote_latency: None,
        }
    }

    /// Make every send on this route revert.
    pub fn with_failing_route(mut self, from: Chain, to: Chain) -> Self {
        self.failing_routes.insert((from, to));
        self
    }

    /// Make reads and quotes touching this chain fail.
    pub fn with_unreachable_chain(mut self, chain: Chain) -> Self {
        self.unreachable.insert(chain);
        self
    }

    /// Delay every send.
    pub fn with_send_latency(mut self, latency: Duration) -> Self {
        self.send_latency = Some(latency);
        self
    }

    /// Delay every quote.
    pub fn with_quote_latency(mut self, latency: Duration) -> Self {
        self.quote_latency = Some(latency);
        self
    }

    /// Overwrite one balance, e.g. to simulate outside activity.
    pub async fn set_balance(&self, token: &str, chain: Chain, amount: Amount) {
        self.state
            .write()
            .await
            .balances
            .entry(token.to_string())
            .or_default()
            .insert(chain, amount);
    }

    pub async fn balances(&self) -> BalanceSet {
        self.state.read().await.balances.clone()
    }

    pub async fn transfers(&self) -> Vec<PaperTransfer> {
        self.state.read().await.transfers.clone()
    }

    fn received(&self, amount: Amount) -> Result<Amount> {
        let fee = amount
            .checked_mul(Amount::from(self.fee_bps))
            .ok_or_else(|| anyhow!("Amount {} too large to price", amount))?
            / 10_000;
        Ok(amount.saturating_sub(fee))
    }

    fn ensure_reachable(&self, chain: Chain) -> Result<()> {
        if self.unreachable.contains(&chain) {
            bail!("{} is unreachable", chain);
        }
        Ok(())
    }
}

#[async_trait]
impl BalanceReader for PaperBridge {
    async fn read_balance(&self, _account: &str, token: &str, chain: Chain) -> Result<Amount> {
        self.ensure_reachable(chain)?;
        let state = self.state.read().await;
        Ok(state
            .balances
            .get(token)
            .and_then(|chains| chains.get(&chain))
            .copied()
            .unwrap_or(0))
    }
}

#[async_trait]
impl QuoteOracle for PaperBridge {
    async fn quote(&self, _token: &str, amount: Amount, from: Chain, to: Chain) -> Result<Amount> {
        if let Some(latency) = self.quote_latency {
            tokio::time::sleep(latency).await;
        }
        self.ensure_reachable(from)?;
        self.ensure_reachable(to)?;
        self.received(amount)
    }
}

#[async_trait]
impl TransferCapability for PaperBridge {
    async fn send(
        &self,
        token: &str,
        amount: Amount,
        from: Chain,
        to: Chain,
        authorization: &Authorization,
    ) -> Result<String> {
        if let Some(latency) = self.send_latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing_routes.contains(&(from, to)) {
            bail!("execution reverted on {} -> {}", from, to);
        }
        let received = self.received(amount)?;

        let mut state = self.state.write().await;
        let chains = state.balances.entry(token.to_string()).or_default();

        let available = chains.get(&from).copied().unwrap_or(0);
        if available < amount {
            bail!(
                "insufficient {} on {}: have {}, need {}",
                token,
                from,
                available,
                amount
            );
        }
        chains.insert(from, available - amount);
        let credited = chains.entry(to).or_default();
        *credited = credited.saturating_add(received);

        let receipt = format!(
            "0x{:064x}",
            self.receipt_counter.fetch_add(1, Ordering::SeqCst)
        );
        debug!(%token, %from, %to, amount, received, "Paper transfer settled");
        info!(%receipt, "📝 [PAPER] {} {} {} -> {}", amount, token, from, to);

        state.transfers.push(PaperTransfer {
            receipt: receipt.clone(),
            token: token.to_string(),
            from,
            to,
            amount,
            received,
            account: authorization.account.clone(),
            settled_at: Utc::now(),
        });

        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn bridge() -> PaperBridge {
        PaperBridge::new(
            BalanceSet::from([(
                "USDC".to_string(),
                BTreeMap::from([(Chain::Optimism, 9000), (Chain::Xdai, 1000)]),
            )]),
            25,
        )
    }

    #[tokio::test]
    async fn test_send_moves_balance_minus_fee() {
        let bridge = bridge();
        let auth = Authorization::new("0xabc");

        let receipt = bridge
            .send("USDC", 4000, Chain::Optimism, Chain::Xdai, &auth)
            .await
            .unwrap();

        assert!(receipt.starts_with("0x"));
        assert_eq!(receipt.len(), 66);

        let balances = bridge.balances().await;
        assert_eq!(balances["USDC"][&Chain::Optimism], 5000);
        assert_eq!(balances["USDC"][&Chain::Xdai], 4990);

        let transfers = bridge.transfers().await;
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].received, 3990);
        assert_eq!(transfers[0].account, "0xabc");
    }

    #[tokio::test]
    async fn test_quote_matches_fee() {
        assert_eq!(
            bridge().quote("USDC", 4000, Chain::Optimism, Chain::Xdai).await.unwrap(),
            3990
        );
    }

    #[tokio::test]
    async fn test_insufficient_balance_rejected() {
        let bridge = bridge();
        let auth = Authorization::new("0xabc");

        assert!(bridge
            .send("USDC", 1001, Chain::Xdai, Chain::Optimism, &auth)
            .await
            .is_err());
        assert!(bridge.transfers().await.is_empty());
    }

    #[tokio::test]
    async fn test_failing_route_and_unreachable_chain() {
        let bridge = bridge()
            .with_failing_route(Chain::Optimism, Chain::Xdai)
            .with_unreachable_chain(Chain::Polygon);
        let auth = Authorization::new("0xabc");

        assert!(bridge
            .send("USDC", 1, Chain::Optimism, Chain::Xdai, &auth)
            .await
            .is_err());
        assert!(bridge
            .read_balance("0xabc", "USDC", Chain::Polygon)
            .await
            .is_err());
        assert_eq!(
            bridge.read_balance("0xabc", "USDC", Chain::Arbitrum).await.unwrap(),
            0
        );
    }
}
