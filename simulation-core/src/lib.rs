//! Deterministic fiscal-year simulation engine
//!
//! Given a company's fiscal configuration, recurring revenue and expense
//! patterns, and starting balances, the engine produces a twelve-month
//! projection: per-account monthly balances, monthly summaries, and
//! fiscal-year totals, streaming progress snapshots to subscribers along
//! the way.
//!
//! # Architecture
//!
//! - **Expansion**: recurring patterns become dated occurrences
//!   ([`PatternExpander`])
//! - **Posting**: each occurrence derives double-entry account postings
//!   with VAT separation ([`Occurrence`])
//! - **Aggregation**: postings land in calendar-month buckets; balances
//!   roll forward once, in fiscal order ([`LedgerAggregator`])
//! - **Invariants**: conservation, roll-forward and VAT consistency are
//!   proved before results are released ([`invariants`])
//! - **Progress**: partial state streams to subscribers without ever
//!   back-pressuring the run ([`ProgressBroadcaster`])
//!
//! # Invariants
//!
//! - Opening seed: the fiscal start month opens at the configured balance
//! - Roll-forward: each fiscal month opens at the prior month's closing
//! - Conservation: final closing == starting + Σ net change, per account
//! - VAT: overall collected/deductible/owed match the monthly sums

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod config;
pub mod error;
pub mod expander;
pub mod invariants;
pub mod ledger;
pub mod metrics;
pub mod money;
pub mod occurrence;
pub mod progress;
pub mod runner;
pub mod store;
pub mod types;

// Re-exports
pub use config::EngineConfig;
pub use error::{Error, InvariantViolation, Result};
pub use expander::PatternExpander;
pub use ledger::{
    LedgerAggregator, MonthlyAccountBalance, MonthlySummary, OverallSummary, SimulationResults,
};
pub use occurrence::{AccountPosting, Occurrence, OccurrenceKind};
pub use progress::{ProgressBroadcaster, ProgressEvent, RunStatus, Snapshot};
pub use runner::{RunOptions, SimulationRunner};
pub use store::{InMemoryPatternStore, InMemoryResultSink, PatternStore, ResultSink};
pub use types::{
    Account, Company, DayOffOverride, ExpenseCategory, ExpensePattern, FiscalConfig,
    FiscalYearKind, Frequency, Pattern, PatternCore, RevenuePattern, VatRate,
};

/// Run one simulation with a fresh default runner
///
/// Convenience wrapper over [`SimulationRunner::run`] for callers that
/// do not hold a runner.
pub async fn run_simulation(
    fiscal: &FiscalConfig,
    revenues: &[RevenuePattern],
    expenses: &[ExpensePattern],
    company: &Company,
    options: RunOptions,
) -> Result<SimulationResults> {
    SimulationRunner::new(EngineConfig::default())
        .run(fiscal, revenues, expenses, company, options)
        .await
}
