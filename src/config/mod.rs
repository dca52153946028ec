//! Configuration management for the rebalancer.
//!
//! Loads settings from environment variables and config files.

use crate::catalog::{Catalog, Chain};
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Network selector (mainnet, kovan)
    #[serde(default = "default_network")]
    pub network: String,
    /// Account whose balances are rebalanced
    #[serde(default)]
    pub account: String,
    /// Decision thresholds and timeouts
    #[serde(default)]
    pub rebalance: RebalanceConfig,
    /// Quote API settings
    #[serde(default)]
    pub quote: QuoteConfig,
    /// RPC endpoints per chain
    #[serde(default)]
    pub rpc: RpcConfig,
    /// Token contracts per chain
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceConfig {
    /// Tolerance band around the preferred balance, in percent
    #[serde(default = "default_tolerance_pct")]
    pub tolerance_pct: u32,
    /// Maximum bridging cost in basis points of the transferred amount
    #[serde(default = "default_max_cost_bps")]
    pub max_cost_bps: u32,
    /// Per-quote timeout in seconds
    #[serde(default = "default_quote_timeout")]
    pub quote_timeout_secs: u64,
    /// Per-send timeout in seconds; expiry leaves the outcome unknown
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,
    /// Re-read source balances right before sending
    #[serde(default = "default_revalidate")]
    pub revalidate_before_send: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteConfig {
    /// Quote API base URL
    #[serde(default = "default_quote_url")]
    pub base_url: String,
    /// Slippage tolerance passed to the quote API, in percent
    #[serde(default = "default_slippage")]
    pub slippage: Decimal,
    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// JSON-RPC URL per chain
    #[serde(default)]
    pub urls: HashMap<Chain, String>,
    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Token symbol as used in target allocations (e.g., "USDC")
    pub symbol: String,
    /// Native decimals, used for display only
    #[serde(default = "default_decimals")]
    pub decimals: u32,
    /// Token contract address per chain
    #[serde(default)]
    pub addresses: BTreeMap<Chain, String>,
}

// Default value functions
fn default_network() -> String {
    "mainnet".to_string()
}

fn default_tolerance_pct() -> u32 {
    10 // ±10% band before a chain is rebalanced
}

fn default_max_cost_bps() -> u32 {
    70 // 0.70% of the transferred amount
}

fn default_quote_timeout() -> u64 {
    30
}

fn default_send_timeout() -> u64 {
    120
}

fn default_revalidate() -> bool {
    true
}

fn default_quote_url() -> String {
    "https://api.hop.exchange".to_string()
}

fn default_slippage() -> Decimal {
    Decimal::new(5, 1) // 0.5%
}

fn default_request_timeout() -> u64 {
    30
}

fn default_decimals() -> u32 {
    6
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("rebalancer").required(false))
            .add_source(config::Environment::default().separator("__").prefix("REBAL"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        Catalog::for_network(&self.network)?;

        anyhow::ensure!(
            self.rebalance.tolerance_pct <= 100,
            "tolerance_pct must be between 0 and 100"
        );

        anyhow::ensure!(
            self.rebalance.max_cost_bps <= 10_000,
            "max_cost_bps must be between 0 and 10000"
        );

        anyhow::ensure!(
            self.rebalance.quote_timeout_secs > 0 && self.rebalance.send_timeout_secs > 0,
            "timeouts must be positive"
        );

        anyhow::ensure!(
            self.quote.slippage >= Decimal::ZERO && self.quote.slippage < Decimal::ONE_HUNDRED,
            "slippage must be between 0 and 100"
        );

        let mut seen = std::collections::HashSet::new();
        for token in &self.tokens {
            anyhow::ensure!(
                seen.insert(token.symbol.as_str()),
                "token {} is configured twice",
                token.symbol
            );
        }

        Ok(())
    }

    /// Display decimals of a token, if configured.
    pub fn decimals(&self, token: &str) -> Option<u32> {
        self.tokens
            .iter()
            .find(|t| t.symbol == token)
            .map(|t| t.decimals)
    }
}

impl RebalanceConfig {
    pub fn quote_timeout(&self) -> Duration {
        Duration::from_secs(self.quote_timeout_secs)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: default_network(),
            account: String::new(),
            rebalance: RebalanceConfig::default(),
            quote: QuoteConfig::default(),
            rpc: RpcConfig::default(),
            tokens: Vec::new(),
        }
    }
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        Self {
            tolerance_pct: default_tolerance_pct(),
            max_cost_bps: default_max_cost_bps(),
            quote_timeout_secs: default_quote_timeout(),
            send_timeout_secs: default_send_timeout(),
            revalidate_before_send: default_revalidate(),
        }
    }
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_quote_url(),
            slippage: default_slippage(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            urls: HashMap::new(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}
