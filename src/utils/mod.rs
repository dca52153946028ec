//! Shared utilities.

pub mod units;

pub use units::*;
