//! Error kinds produced by the rebalancing pipeline.
//!
//! Only `UnknownNetwork` and `InvalidCatalog` abort a run. Every other kind is
//! scoped to a single token or transfer and ends up in the run report.

use crate::catalog::Chain;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RebalanceError {
    #[error("unknown network '{0}', expected one of: mainnet, kovan")]
    UnknownNetwork(String),

    #[error("unknown chain '{0}'")]
    UnknownChain(String),

    #[error("invalid catalog for {network}: {reason}")]
    InvalidCatalog { network: String, reason: String },

    #[error("{token} is not bridgeable on this network")]
    UnsupportedToken { token: String },

    #[error("{token} has no supported chains left after reconciliation")]
    NoSupportedChains { token: String },

    #[error("{token} allocation cannot be normalized: {reason}")]
    InvalidAllocation { token: String, reason: String },

    #[error("{token} balance on {chain} unavailable: {reason}")]
    BalanceUnavailable {
        token: String,
        chain: Chain,
        reason: String,
    },

    #[error("{token} amounts overflow integer arithmetic")]
    Overflow { token: String },

    #[error("{token} has no direct route {from} -> {to}")]
    UnsupportedRoute { token: String, from: Chain, to: Chain },

    #[error("{token} quote {from} -> {to} failed: {reason}")]
    QuoteFailed {
        token: String,
        from: Chain,
        to: Chain,
        reason: String,
    },

    #[error("{token} transfer {from} -> {to} costs {cost_bps}bps (max {max_bps}bps)")]
    TooExpensive {
        token: String,
        from: Chain,
        to: Chain,
        cost_bps: i128,
        max_bps: u32,
    },

    #[error("{token} balance on {chain} changed: need {required}, have {available}")]
    StaleBalance {
        token: String,
        chain: Chain,
        required: u128,
        available: u128,
    },

    #[error("{token} transfer {from} -> {to} failed: {reason}")]
    TransferFailed {
        token: String,
        from: Chain,
        to: Chain,
        reason: String,
    },
}

impl RebalanceError {
    /// Errors that abort a whole run instead of a single token or transfer.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RebalanceError::UnknownNetwork(_) | RebalanceError::InvalidCatalog { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, RebalanceError>;
