//! Capabilities the rebalancer needs from a bridge.
//!
//! The engine never talks to chains directly. It reads balances, asks for
//! quotes and sends transfers through these traits, so the same pipeline
//! runs against a live bridge, a paper bridge or test doubles.

use crate::catalog::Chain;
use crate::rebalance::Amount;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Signing identity handed to [`TransferCapability::send`].
///
/// Key material stays with the transfer implementation; the engine only
/// carries the account the transfers are authorized for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    pub account: String,
}

impl Authorization {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
        }
    }
}

/// Reads an account's token balance on one chain.
///
/// Must be callable concurrently for distinct (token, chain) pairs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BalanceReader: Send + Sync {
    async fn read_balance(&self, account: &str, token: &str, chain: Chain) -> anyhow::Result<Amount>;
}

/// Prices a transfer: how much arrives on `to` when `amount` leaves `from`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteOracle: Send + Sync {
    async fn quote(&self, token: &str, amount: Amount, from: Chain, to: Chain) -> anyhow::Result<Amount>;
}

/// Authorizes and sends a transfer, returning its receipt identifier.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransferCapability: Send + Sync {
    async fn send(
        &self,
        token: &str,
        amount: Amount,
        from: Chain,
        to: Chain,
        authorization: &Authorization,
    ) -> anyhow::Result<String>;
}
