//! # L2 Rebalancer
//!
//! Moves token balances between L1/L2 chains so each token's distribution
//! approaches a target percentage allocation, bridging only when the quoted
//! cost is acceptable.
//!
//! ## Architecture
//!
//! - `catalog`: Static per-network chain/token route catalogs
//! - `rebalance`: Normalization, needs, planning, pricing and dispatch
//! - `bridge`: Balance, quote and transfer collaborators (Hop, JSON-RPC, paper)
//! - `config`: Configuration management and validation
//! - `error`: Error taxonomy shared by every stage
//! - `utils`: Amount formatting

pub mod bridge;
pub mod catalog;
pub mod config;
pub mod error;
pub mod rebalance;
pub mod utils;

pub use config::Config;
pub use error::RebalanceError;
