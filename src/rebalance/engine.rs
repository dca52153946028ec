//! Rebalancing pipeline.

use super::{
    calculate_needs, normalize, plan_transfers, preferred_balances, BalanceSet,
    CostEstimator, NeedSet, PricedTransfer, RejectedTransfer, TargetAllocation,
    TransferExecutor, TransferInstruction,
};
use crate::bridge::{Authorization, BalanceReader, QuoteOracle, TransferCapability};
use crate::catalog::{Catalog, Chain};
use crate::config::RebalanceConfig;
use crate::error::RebalanceError;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Everything decided before any transfer is sent.
#[derive(Debug, Clone, Serialize)]
pub struct RebalancePlan {
    /// Balances as read at the start of the run
    pub balances: BalanceSet,
    /// Normalized targets the needs were computed against
    pub targets: TargetAllocation,
    pub needs: NeedSet,
    pub planned: Vec<TransferInstruction>,
    /// Priced transfers that passed the cost gate
    pub approved: Vec<PricedTransfer>,
    pub rejected: Vec<RejectedTransfer>,
    #[serde(serialize_with = "serialize_errors")]
    pub skipped: Vec<RebalanceError>,
    pub started_at: DateTime<Utc>,
}

/// Outcome of a full run.
#[derive(Debug, Clone, Serialize)]
pub struct RebalanceReport {
    #[serde(flatten)]
    pub plan: RebalancePlan,
    /// Transfers that passed the cost gate, before the staleness check
    pub requested: usize,
    /// Receipt ids of settled transfers
    pub receipts: Vec<String>,
    pub failed: Vec<RejectedTransfer>,
    /// Sends that timed out; they may still settle
    pub unknown: Vec<TransferInstruction>,
    pub finished_at: DateTime<Utc>,
}

impl RebalanceReport {
    /// Whether every transfer that passed the cost gate produced a receipt.
    pub fn is_complete(&self) -> bool {
        self.receipts.len() == self.requested
    }
}

fn serialize_errors<S: serde::Serializer>(
    errors: &[RebalanceError],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(errors.iter().map(|e| e.to_string()))
}

/// Moves token balances between chains toward target allocations.
pub struct Rebalancer {
    catalog: Catalog,
    config: RebalanceConfig,
    reader: Arc<dyn BalanceReader>,
    oracle: Arc<dyn QuoteOracle>,
    estimator: CostEstimator,
    executor: TransferExecutor,
}

impl Rebalancer {
    pub fn new(
        catalog: Catalog,
        config: RebalanceConfig,
        reader: Arc<dyn BalanceReader>,
        oracle: Arc<dyn QuoteOracle>,
    ) -> Self {
        let estimator = CostEstimator::new(config.max_cost_bps, config.quote_timeout());
        let executor = TransferExecutor::new(config.send_timeout());
        Self {
            catalog,
            config,
            reader,
            oracle,
            estimator,
            executor,
        }
    }

    /// Read every catalog (token, chain) balance of `account` concurrently.
    ///
    /// Chains that cannot be read are left out and reported; the normalizer
    /// then treats them as unsupported.
    pub async fn read_balances(&self, account: &str) -> (BalanceSet, Vec<RebalanceError>) {
        let pairs: Vec<(String, Chain)> = self
            .catalog
            .tokens()
            .flat_map(|(token, routes)| routes.chains().map(move |chain| (token.to_string(), chain)))
            .collect();

        let reads = pairs.into_iter().map(|(token, chain)| async move {
            let balance = self.reader.read_balance(account, &token, chain).await;
            (token, chain, balance)
        });

        let mut balances = BalanceSet::new();
        let mut unavailable = Vec::new();
        for (token, chain, balance) in join_all(reads).await {
            match balance {
                Ok(amount) => {
                    balances.entry(token).or_default().insert(chain, amount);
                }
                Err(e) => {
                    warn!(%token, %chain, error = %e, "Balance unavailable, leaving chain out");
                    unavailable.push(RebalanceError::BalanceUnavailable {
                        token,
                        chain,
                        reason: e.to_string(),
                    });
                }
            }
        }

        (balances, unavailable)
    }

    /// Read balances and decide which priced transfers to send.
    #[instrument(skip(self, targets), fields(network = %self.catalog.network()))]
    pub async fn plan(&self, targets: &TargetAllocation, account: &str) -> RebalancePlan {
        let started_at = Utc::now();
        let (balances, mut skipped) = self.read_balances(account).await;

        let normalized = normalize(targets, &balances);
        skipped.extend(normalized.skipped);

        let mut needs = NeedSet::new();
        let mut planned = Vec::new();
        for (token, token_targets) in &normalized.targets {
            let current = &normalized.balances[token];
            let token_needs = preferred_balances(token, token_targets, current).and_then(
                |preferred| calculate_needs(token, &preferred, current, self.config.tolerance_pct),
            );

            match token_needs {
                Ok(token_needs) => {
                    if token_needs.is_empty() {
                        info!(%token, "Already balanced");
                    }
                    planned.extend(plan_transfers(token, &token_needs));
                    needs.insert(token.clone(), token_needs);
                }
                Err(e) => {
                    warn!(%token, error = %e, "Skipping token");
                    skipped.push(e);
                }
            }
        }

        let (priced, mut rejected) = self
            .estimator
            .estimate(self.oracle.as_ref(), &self.catalog, planned.clone())
            .await;
        let (approved, too_expensive) = self.estimator.filter(priced);
        rejected.extend(too_expensive);

        info!(
            planned = planned.len(),
            approved = approved.len(),
            rejected = rejected.len(),
            skipped = skipped.len(),
            "Rebalance planned"
        );

        RebalancePlan {
            balances: normalized.balances,
            targets: normalized.targets,
            needs,
            planned,
            approved,
            rejected,
            skipped,
            started_at,
        }
    }

    /// Send the approved transfers of `plan`.
    pub async fn execute(
        &self,
        mut plan: RebalancePlan,
        transfers: &dyn TransferCapability,
        authorization: &Authorization,
    ) -> RebalanceReport {
        let mut approved = std::mem::take(&mut plan.approved);
        let requested = approved.len();

        if self.config.revalidate_before_send && !approved.is_empty() {
            let (fresh, stale) = self
                .executor
                .revalidate(
                    self.reader.as_ref(),
                    &authorization.account,
                    &plan.balances,
                    approved,
                )
                .await;
            approved = fresh;
            plan.rejected.extend(stale);
        }

        let execution = self
            .executor
            .execute(transfers, authorization, &approved)
            .await;
        plan.approved = approved;

        RebalanceReport {
            plan,
            requested,
            receipts: execution.receipts,
            failed: execution.failed,
            unknown: execution.unknown,
            finished_at: Utc::now(),
        }
    }

    /// Plan and execute in one go; returns the full report.
    pub async fn rebalance(
        &self,
        targets: &TargetAllocation,
        transfers: &dyn TransferCapability,
        authorization: &Authorization,
    ) -> RebalanceReport {
        let plan = self.plan(targets, &authorization.account).await;
        self.execute(plan, transfers, authorization).await
    }
}
