//! Hop REST API quote client.

use super::traits::QuoteOracle;
use super::types::HopQuote;
use crate::catalog::Chain;
use crate::config::QuoteConfig;
use crate::rebalance::Amount;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::{debug, instrument};

/// Quotes bridge transfers through the Hop REST API.
#[derive(Debug, Clone)]
pub struct HopQuoteClient {
    http: Client,
    base_url: String,
    slippage: Decimal,
}

impl HopQuoteClient {
    pub fn new(config: &QuoteConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            slippage: config.slippage,
        })
    }

    /// Fetch the raw quote for sending `amount` of `token` from `from` to `to`.
    #[instrument(skip(self), name = "hop_quote")]
    pub async fn get_quote(
        &self,
        token: &str,
        amount: Amount,
        from: Chain,
        to: Chain,
    ) -> Result<HopQuote> {
        let url = format!(
            "{}/v1/quote?amount={}&token={}&fromChain={}&toChain={}&slippage={}",
            self.base_url,
            amount,
            urlencoding::encode(token),
            from.slug(),
            to.slug(),
            self.slippage,
        );

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .context("Failed to fetch quote")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Quote request failed with {}: {}", status, body);
        }

        let quote: HopQuote = response
            .json()
            .await
            .context("Failed to parse quote response")?;

        debug!(
            amount_in = %quote.amount_in,
            estimated_received = %quote.estimated_received,
            bonder_fee = ?quote.bonder_fee,
            "Received quote"
        );
        Ok(quote)
    }
}

#[async_trait]
impl QuoteOracle for HopQuoteClient {
    async fn quote(&self, token: &str, amount: Amount, from: Chain, to: Chain) -> Result<Amount> {
        let quote = self.get_quote(token, amount, from, to).await?;
        quote
            .estimated_received
            .parse::<Amount>()
            .with_context(|| format!("Invalid estimated amount '{}'", quote.estimated_received))
    }
}
