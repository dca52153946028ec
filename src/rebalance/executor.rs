//! Transfer dispatch.
//!
//! Sends are independent of each other: each one spends surplus of its own
//! (token, source) pair that the planner already allocated in full. They are
//! issued together and awaited as one batch; a failure only drops its own
//! receipt.

use super::{Amount, BalanceSet, PricedTransfer, RejectedTransfer, TransferInstruction};
use crate::bridge::{Authorization, BalanceReader, TransferCapability};
use crate::catalog::Chain;
use crate::error::RebalanceError;
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Result of a single send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Receipt identifier of the settled transfer
    Settled(String),
    Failed(RebalanceError),
    /// The send did not answer in time; it may still settle
    Unknown,
}

/// Outcome of dispatching a batch of transfers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
    pub receipts: Vec<String>,
    pub failed: Vec<RejectedTransfer>,
    pub unknown: Vec<TransferInstruction>,
}

/// Dispatches approved transfers through the bridge.
#[derive(Debug, Clone)]
pub struct TransferExecutor {
    send_timeout: Duration,
}

impl TransferExecutor {
    pub fn new(send_timeout: Duration) -> Self {
        Self { send_timeout }
    }

    /// Re-read source balances and drop transfers whose source no longer
    /// covers its planned outflow.
    ///
    /// Transfers are grouped by (token, source); a stale group is dropped as a
    /// whole since any subset of it could already overdraw the chain.
    pub async fn revalidate(
        &self,
        reader: &dyn BalanceReader,
        account: &str,
        snapshot: &BalanceSet,
        transfers: Vec<PricedTransfer>,
    ) -> (Vec<PricedTransfer>, Vec<RejectedTransfer>) {
        let mut outflow: BTreeMap<(String, Chain), Amount> = BTreeMap::new();
        for transfer in &transfers {
            let key = (transfer.instruction.token.clone(), transfer.instruction.from);
            let total = outflow.entry(key).or_default();
            *total = total.saturating_add(transfer.instruction.amount);
        }

        let reads = outflow.iter().map(|((token, chain), required)| async move {
            let fresh = reader.read_balance(account, token, *chain).await;
            let verdict = match fresh {
                Ok(available) if available >= *required => {
                    let previous = snapshot
                        .get(token)
                        .and_then(|chains| chains.get(chain))
                        .copied();
                    if previous != Some(available) {
                        debug!(%token, %chain, ?previous, available, "Source balance moved but still covers outflow");
                    }
                    None
                }
                Ok(available) => Some(RebalanceError::StaleBalance {
                    token: token.clone(),
                    chain: *chain,
                    required: *required,
                    available,
                }),
                Err(e) => Some(RebalanceError::BalanceUnavailable {
                    token: token.clone(),
                    chain: *chain,
                    reason: e.to_string(),
                }),
            };
            ((token.clone(), *chain), verdict)
        });

        let stale: BTreeMap<(String, Chain), RebalanceError> = join_all(reads)
            .await
            .into_iter()
            .filter_map(|(key, verdict)| verdict.map(|e| (key, e)))
            .collect();

        let mut kept = Vec::new();
        let mut rejected = Vec::new();
        for transfer in transfers {
            let key = (transfer.instruction.token.clone(), transfer.instruction.from);
            match stale.get(&key) {
                Some(reason) => {
                    warn!(transfer = %transfer.instruction, error = %reason, "Source balance is stale, skipping transfer");
                    rejected.push(RejectedTransfer {
                        instruction: transfer.instruction,
                        reason: reason.clone(),
                    });
                }
                None => kept.push(transfer),
            }
        }

        (kept, rejected)
    }

    /// Send every transfer concurrently and collect the receipts.
    ///
    /// Receipt order follows input order for the transfers that settled.
    pub async fn execute(
        &self,
        transfers: &dyn TransferCapability,
        authorization: &Authorization,
        approved: &[PricedTransfer],
    ) -> ExecutionReport {
        let sends = approved
            .iter()
            .map(|priced| self.send(transfers, authorization, &priced.instruction));
        let outcomes = join_all(sends).await;

        let mut report = ExecutionReport::default();
        for (priced, outcome) in approved.iter().zip(outcomes) {
            match outcome {
                SendOutcome::Settled(receipt) => report.receipts.push(receipt),
                SendOutcome::Failed(reason) => report.failed.push(RejectedTransfer {
                    instruction: priced.instruction.clone(),
                    reason,
                }),
                SendOutcome::Unknown => report.unknown.push(priced.instruction.clone()),
            }
        }

        info!(
            settled = report.receipts.len(),
            failed = report.failed.len(),
            unknown = report.unknown.len(),
            "Transfers dispatched"
        );
        report
    }

    /// Send one transfer, never erroring past this point.
    pub async fn send(
        &self,
        transfers: &dyn TransferCapability,
        authorization: &Authorization,
        instruction: &TransferInstruction,
    ) -> SendOutcome {
        info!(transfer = %instruction, "Sending transfer");

        let sent = tokio::time::timeout(
            self.send_timeout,
            transfers.send(
                &instruction.token,
                instruction.amount,
                instruction.from,
                instruction.to,
                authorization,
            ),
        )
        .await;

        match sent {
            Ok(Ok(receipt)) => {
                info!(transfer = %instruction, %receipt, "Transfer settled");
                SendOutcome::Settled(receipt)
            }
            Ok(Err(e)) => {
                error!(transfer = %instruction, error = %e, "Transfer failed");
                SendOutcome::Failed(RebalanceError::TransferFailed {
                    token: instruction.token.clone(),
                    from: instruction.from,
                    to: instruction.to,
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                warn!(
                    transfer = %instruction,
                    timeout = ?self.send_timeout,
                    "Transfer outcome unknown, not retrying"
                );
                SendOutcome::Unknown
            }
        }
    }
}
