//! Error types for the simulation engine

use crate::types::Account;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Engine errors
///
/// The taxonomy is deliberately small: validation problems are user
/// errors, invariant violations are engine bugs, and everything a
/// collaborator does wrong that does not block progress is demoted to a
/// logged warning rather than surfaced here.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input (out-of-range year, unknown VAT rate, missing
    /// required fields, pattern count limit)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Referenced pattern or company disappeared mid-run
    #[error("Not found: {0}")]
    NotFound(String),

    /// An aggregation invariant failed; implies an engine bug
    #[error("Invariant violation: {0}")]
    InvariantViolation(#[from] InvariantViolation),

    /// The cancellation signal fired
    #[error("Simulation cancelled")]
    Cancelled,

    /// Unexpected failure from a collaborator
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Short machine-readable label, used for metrics and terminal snapshots
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::NotFound(_) => "not_found",
            Error::InvariantViolation(_) => "invariant_violation",
            Error::Cancelled => "cancelled",
            Error::Internal(_) => "internal",
        }
    }
}

/// A failed balance invariant, with both sides of the comparison
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[error("{check} failed for account {account} (month {month:?}): {lhs} != {rhs}, delta {delta}")]
pub struct InvariantViolation {
    /// Which check failed, as a short description
    pub check: String,
    /// Account the comparison was made on
    pub account: Account,
    /// Calendar month of the failing bucket, when the check is month-scoped
    pub month: Option<u32>,
    /// Left side of the comparison
    pub lhs: Decimal,
    /// Right side of the comparison
    pub rhs: Decimal,
    /// `|lhs - rhs|`
    pub delta: Decimal,
}

impl InvariantViolation {
    /// Build a violation from the two sides of a failed comparison
    pub fn new(
        check: impl Into<String>,
        account: Account,
        month: Option<u32>,
        lhs: Decimal,
        rhs: Decimal,
    ) -> Self {
        Self {
            check: check.into(),
            account,
            month,
            lhs,
            rhs,
            delta: (lhs - rhs).abs(),
        }
    }
}
