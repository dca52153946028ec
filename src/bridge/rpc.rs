//! ERC-20 balance reads over EVM JSON-RPC.

use super::traits::BalanceReader;
use super::types::{CallRequest, RpcRequest, RpcResponse};
use crate::catalog::Chain;
use crate::config::{RpcConfig, TokenConfig};
use crate::rebalance::Amount;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, instrument};

/// `balanceOf(address)` selector.
const BALANCE_OF_SELECTOR: &str = "70a08231";

/// Reads token balances with `eth_call` against one RPC endpoint per chain.
#[derive(Debug)]
pub struct RpcBalanceReader {
    http: Client,
    endpoints: HashMap<Chain, String>,
    /// (token, chain) -> token contract address
    contracts: HashMap<(String, Chain), String>,
    request_id: AtomicU64,
}

impl RpcBalanceReader {
    pub fn new(rpc: &RpcConfig, tokens: &[TokenConfig]) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(rpc.request_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        let contracts = tokens
            .iter()
            .flat_map(|token| {
                token
                    .addresses
                    .iter()
                    .map(|(chain, address)| ((token.symbol.clone(), *chain), address.clone()))
            })
            .collect();

        Ok(Self {
            http,
            endpoints: rpc.urls.clone(),
            contracts,
            request_id: AtomicU64::new(1),
        })
    }

    /// Calldata for `balanceOf(account)`.
    pub fn balance_of_calldata(account: &str) -> Result<String> {
        let address = account.strip_prefix("0x").unwrap_or(account);
        let bytes = hex::decode(address).with_context(|| format!("Invalid account '{account}'"))?;
        if bytes.len() != 20 {
            bail!("Account '{}' is not a 20-byte address", account);
        }
        Ok(format!(
            "0x{}{:0>64}",
            BALANCE_OF_SELECTOR,
            hex::encode(bytes)
        ))
    }

    /// Decode a 32-byte big-endian return word into an amount.
    pub fn parse_word(word: &str) -> Result<Amount> {
        let digits = word.strip_prefix("0x").unwrap_or(word);
        let significant = digits.trim_start_matches('0');
        if significant.is_empty() {
            return Ok(0);
        }
        if significant.len() > 32 {
            bail!("Balance {} does not fit in 128 bits", word);
        }
        Amount::from_str_radix(significant, 16).with_context(|| format!("Invalid balance word '{word}'"))
    }

    #[instrument(skip(self, contract), name = "rpc_balance_of")]
    async fn call_balance_of(&self, chain: Chain, contract: &str, account: &str) -> Result<Amount> {
        let endpoint = self
            .endpoints
            .get(&chain)
            .ok_or_else(|| anyhow!("No RPC endpoint configured for {}", chain))?;

        let request = RpcRequest::new(
            self.request_id.fetch_add(1, Ordering::Relaxed),
            "eth_call",
            (
                CallRequest {
                    to: contract.to_string(),
                    data: Self::balance_of_calldata(account)?,
                },
                "latest",
            ),
        );

        let response: RpcResponse = self
            .http
            .post(endpoint)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to reach {} RPC", chain))?
            .json()
            .await
            .context("Failed to parse RPC response")?;

        if let Some(error) = response.error {
            bail!("RPC error {}: {}", error.code, error.message);
        }
        let word = response
            .result
            .ok_or_else(|| anyhow!("RPC response without result"))?;

        let balance = Self::parse_word(&word)?;
        debug!(%chain, balance, "Balance read");
        Ok(balance)
    }
}

#[async_trait]
impl BalanceReader for RpcBalanceReader {
    async fn read_balance(&self, account: &str, token: &str, chain: Chain) -> Result<Amount> {
        let contract = self
            .contracts
            .get(&(token.to_string(), chain))
            .ok_or_else(|| anyhow!("No {} contract configured on {}", token, chain))?;

        self.call_balance_of(chain, contract, account).await
    }
}
