//! Transfer pricing and the cost gate.

use super::{Amount, PricedTransfer, RejectedTransfer, TransferInstruction};
use crate::bridge::QuoteOracle;
use crate::catalog::Catalog;
use crate::error::RebalanceError;
use futures_util::future::join_all;
use std::time::Duration;
use tracing::{debug, info, warn};

/// `10000 - received * 10000 / amount`, integer floor division.
///
/// Negative when the quote exceeds the amount. A zero amount has no
/// meaningful cost and is reported as the maximum.
pub fn cost_bps(amount: Amount, received: Amount) -> i128 {
    if amount == 0 {
        return i128::MAX;
    }
    match received.checked_mul(10_000) {
        Some(scaled) => 10_000 - i128::try_from(scaled / amount).unwrap_or(i128::MAX),
        // received * 10000 overflowing implies received far above amount
        None => i128::MIN,
    }
}

/// Quotes planned transfers and drops the uneconomical ones.
#[derive(Debug, Clone)]
pub struct CostEstimator {
    max_cost_bps: u32,
    quote_timeout: Duration,
}

impl CostEstimator {
    pub fn new(max_cost_bps: u32, quote_timeout: Duration) -> Self {
        Self {
            max_cost_bps,
            quote_timeout,
        }
    }

    /// Quote every instruction concurrently.
    ///
    /// Instructions without a direct route, or whose quote fails or times out,
    /// are rejected individually; the rest come back priced.
    pub async fn estimate(
        &self,
        oracle: &dyn QuoteOracle,
        catalog: &Catalog,
        instructions: Vec<TransferInstruction>,
    ) -> (Vec<PricedTransfer>, Vec<RejectedTransfer>) {
        let quotes = instructions
            .into_iter()
            .map(|instruction| self.quote_one(oracle, catalog, instruction));

        let mut priced = Vec::new();
        let mut rejected = Vec::new();
        for outcome in join_all(quotes).await {
            match outcome {
                Ok(transfer) => priced.push(transfer),
                Err(rejection) => rejected.push(rejection),
            }
        }

        (priced, rejected)
    }

    async fn quote_one(
        &self,
        oracle: &dyn QuoteOracle,
        catalog: &Catalog,
        instruction: TransferInstruction,
    ) -> Result<PricedTransfer, RejectedTransfer> {
        let TransferInstruction {
            token, from, to, ..
        } = &instruction;

        if !catalog.has_route(token, *from, *to) {
            let reason = RebalanceError::UnsupportedRoute {
                token: token.clone(),
                from: *from,
                to: *to,
            };
            warn!(%instruction, "No direct route, skipping transfer");
            return Err(RejectedTransfer {
                instruction,
                reason,
            });
        }

        let quote = tokio::time::timeout(
            self.quote_timeout,
            oracle.quote(token, instruction.amount, *from, *to),
        )
        .await;

        let failure = match quote {
            Ok(Ok(estimated_received)) => {
                let priced = PricedTransfer::new(instruction, estimated_received);
                debug!(
                    transfer = %priced.instruction,
                    estimated_received,
                    cost = priced.cost,
                    "Transfer quoted"
                );
                return Ok(priced);
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("no quote within {:?}", self.quote_timeout),
        };

        warn!(%instruction, error = %failure, "Quote failed, skipping transfer");
        let reason = RebalanceError::QuoteFailed {
            token: token.clone(),
            from: *from,
            to: *to,
            reason: failure,
        };
        Err(RejectedTransfer {
            instruction,
            reason,
        })
    }

    /// Keep transfers costing at most `max_cost_bps` of their amount.
    pub fn filter(&self, priced: Vec<PricedTransfer>) -> (Vec<PricedTransfer>, Vec<RejectedTransfer>) {
        let max_bps = i128::from(self.max_cost_bps);
        let (kept, dropped): (Vec<_>, Vec<_>) = priced
            .into_iter()
            .partition(|transfer| transfer.cost_bps() <= max_bps);

        let rejected = dropped
            .into_iter()
            .map(|transfer| {
                let cost_bps = transfer.cost_bps();
                info!(
                    transfer = %transfer.instruction,
                    cost_bps,
                    max_bps = self.max_cost_bps,
                    "Transfer too expensive, dropping"
                );
                RejectedTransfer {
                    reason: RebalanceError::TooExpensive {
                        token: transfer.instruction.token.clone(),
                        from: transfer.instruction.from,
                        to: transfer.instruction.to,
                        cost_bps,
                        max_bps: self.max_cost_bps,
                    },
                    instruction: transfer.instruction,
                }
            })
            .collect();

        (kept, rejected)
    }
}
