//! Bridge integrations for cross-chain rebalancing.
//!
//! ## Hop
//! Transfer quotes from the Hop REST API (`/v1/quote`).
//!
//! ## JSON-RPC
//! ERC-20 `balanceOf` reads against per-chain EVM RPC endpoints.
//!
//! ## Paper
//! In-memory bridge that simulates balances, fees and transfers for dry runs
//! and tests.

mod hop;
mod paper;
mod rpc;
mod traits;
mod types;

pub use hop::HopQuoteClient;
pub use paper::{PaperBridge, PaperTransfer};
pub use rpc::RpcBalanceReader;
pub use traits::{Authorization, BalanceReader, QuoteOracle, TransferCapability};
#[cfg(test)]
pub use traits::{MockBalanceReader, MockQuoteOracle, MockTransferCapability};
pub use types::*;
