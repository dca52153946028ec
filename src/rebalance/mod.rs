//! Cross-chain rebalancing engine.
//!
//! Pipeline stages, in order:
//! - `normalizer`: reconcile targets with observable chains, repair percentages
//! - `needs`: preferred vs current balances, tolerance band
//! - `planner`: greedy surplus/deficit matching into transfers
//! - `cost`: concurrent quoting and the basis-point cost gate
//! - `executor`: staleness guard and concurrent dispatch
//! - `engine`: wires the stages to the bridge collaborators

mod cost;
mod engine;
mod executor;
mod needs;
mod normalizer;
mod planner;

pub use cost::{cost_bps, CostEstimator};
pub use engine::{RebalancePlan, RebalanceReport, Rebalancer};
pub use executor::{ExecutionReport, SendOutcome, TransferExecutor};
pub use needs::calculate_needs;
pub use normalizer::{normalize, preferred_balances, redistribute, Normalized};
pub use planner::plan_transfers;

use crate::catalog::Chain;
use crate::error::RebalanceError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Raw token amount in native precision.
pub type Amount = u128;

/// token -> chain -> integer percent.
pub type TargetAllocation = BTreeMap<String, BTreeMap<Chain, u32>>;

/// token -> chain -> balance. Also the shape of preferred balances.
pub type BalanceSet = BTreeMap<String, BTreeMap<Chain, Amount>>;

/// token -> chain -> signed delta (positive = chain needs more).
pub type NeedSet = BTreeMap<String, BTreeMap<Chain, i128>>;

/// A planned move of `amount` of `token` from one chain to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferInstruction {
    pub token: String,
    pub from: Chain,
    pub to: Chain,
    pub amount: Amount,
}

impl fmt::Display for TransferInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} -> {}", self.amount, self.token, self.from, self.to)
    }
}

/// A transfer instruction annotated with the bridge's quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PricedTransfer {
    pub instruction: TransferInstruction,
    /// Amount the destination is expected to receive
    pub estimated_received: Amount,
    /// `amount - estimated_received`; negative when the quote exceeds the amount
    pub cost: i128,
}

impl PricedTransfer {
    pub fn new(instruction: TransferInstruction, estimated_received: Amount) -> Self {
        let cost = signed(instruction.amount) - signed(estimated_received);
        Self {
            instruction,
            estimated_received,
            cost,
        }
    }

    /// Cost in basis points of the transferred amount, floor semantics.
    pub fn cost_bps(&self) -> i128 {
        cost_bps(self.instruction.amount, self.estimated_received)
    }
}

/// An instruction that was planned but will not be (or was not) settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedTransfer {
    pub instruction: TransferInstruction,
    #[serde(serialize_with = "serialize_reason")]
    pub reason: RebalanceError,
}

fn serialize_reason<S: serde::Serializer>(
    reason: &RebalanceError,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(reason)
}

/// Lossless for every amount below `i128::MAX`; larger values saturate.
fn signed(amount: Amount) -> i128 {
    i128::try_from(amount).unwrap_or(i128::MAX)
}
