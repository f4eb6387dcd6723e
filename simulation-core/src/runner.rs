//! Simulation orchestration
//!
//! The runner ties expansion, posting, aggregation and invariant
//! checking together under a single logical run:
//!
//! 1. Validate inputs (user errors return before any state exists)
//! 2. Expand all patterns and sort occurrences by date
//! 3. Seed the ledger, apply postings month by month in fiscal order,
//!    publishing progress and honoring cancellation between months
//! 4. Roll forward, summarize, check invariants
//! 5. Publish the terminal snapshot and return the results
//!
//! Progress percentages follow a fixed schedule: 10 after validation,
//! 20 after seeding, `20 + 5k` after fiscal month `k`, then 85/90/95
//! for the derivation steps and 100 on completion.

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::expander::PatternExpander;
use crate::ledger::{LedgerAggregator, ResultMetadata, SimulationResults};
use crate::metrics;
use crate::occurrence::Occurrence;
use crate::progress::{ProgressBroadcaster, RunStatus, Snapshot, TaxEstimates};
use crate::types::{
    Company, ExpensePattern, FiscalConfig, Frequency, PatternCore, RevenuePattern, YEAR_RANGE,
};
use fiscal_calendar::fiscal_month_order;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Per-run options
#[derive(Default)]
pub struct RunOptions {
    /// Run identifier; generated when absent
    pub simulation_id: Option<Uuid>,
    /// Progress sink; runs without one stay silent
    pub broadcaster: Option<Arc<ProgressBroadcaster>>,
    /// Cancellation signal; flips to `true` to stop the run
    pub cancel: Option<watch::Receiver<bool>>,
}

/// Executes simulation runs
pub struct SimulationRunner {
    config: EngineConfig,
}

impl SimulationRunner {
    /// Create a runner with the given engine configuration
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Run one simulation to completion
    pub async fn run(
        &self,
        fiscal: &FiscalConfig,
        revenues: &[RevenuePattern],
        expenses: &[ExpensePattern],
        company: &Company,
        options: RunOptions,
    ) -> Result<SimulationResults> {
        let started = Instant::now();
        let simulation_id = options.simulation_id.unwrap_or_else(Uuid::new_v4);

        // User errors return here, before any snapshot is published
        self.validate(fiscal, revenues, expenses, company)?;
        metrics::SIMULATIONS_STARTED.inc();

        let progress = RunProgress::new(
            simulation_id,
            options.broadcaster,
            self.config.heartbeat_interval_ms,
        );
        let cancel = options.cancel;

        let result = self
            .execute(fiscal, revenues, expenses, company, &progress, cancel)
            .await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        metrics::SIMULATION_DURATION.observe(elapsed_ms as f64 / 1000.0);
        if elapsed_ms > self.config.soft_deadline_ms {
            warn!(
                simulation_id = %simulation_id,
                elapsed_ms,
                soft_deadline_ms = self.config.soft_deadline_ms,
                "run exceeded soft deadline"
            );
        }

        match result {
            Ok((mut results, current_month)) => {
                results.metadata.processing_time_ms = elapsed_ms;
                progress
                    .terminal(RunStatus::Completed, current_month, 100, None)
                    .await;
                metrics::SIMULATIONS_COMPLETED.inc();
                info!(
                    simulation_id = %simulation_id,
                    occurrences = results.metadata.total_occurrences,
                    elapsed_ms,
                    "simulation completed"
                );
                Ok(results)
            }
            Err((err, current_month)) => {
                progress
                    .terminal(RunStatus::Failed, current_month, progress.last_progress(), Some(err.to_string()))
                    .await;
                metrics::SIMULATIONS_FAILED
                    .with_label_values(&[err.kind()])
                    .inc();
                info!(simulation_id = %simulation_id, error = %err, "simulation failed");
                Err(err)
            }
        }
    }

    /// The fallible middle of a run; errors carry the month reached so
    /// the terminal snapshot stays meaningful
    async fn execute(
        &self,
        fiscal: &FiscalConfig,
        revenues: &[RevenuePattern],
        expenses: &[ExpensePattern],
        company: &Company,
        progress: &RunProgress,
        cancel: Option<watch::Receiver<bool>>,
    ) -> std::result::Result<(SimulationResults, u32), (Error, u32)> {
        let mut current_month = fiscal.fiscal_start_month;

        // 10: validation passed, expansion begins
        progress.step(current_month, 10).await;

        let expander = PatternExpander::new(fiscal.year, company.holiday_region);
        let occurrences = expander.expand_all(revenues, expenses);
        metrics::OCCURRENCES_EXPANDED.inc_by(occurrences.len() as u64);
        debug!(count = occurrences.len(), "expansion complete");

        // 20: ledger seeded
        let mut ledger = LedgerAggregator::new(fiscal);
        progress.step(current_month, 20).await;

        // Bucket occurrence indexes by calendar month once; postings are
        // then applied in fiscal order
        let mut by_month: BTreeMap<u32, Vec<&Occurrence>> = BTreeMap::new();
        for occ in &occurrences {
            by_month
                .entry(chrono::Datelike::month(&occ.date))
                .or_default()
                .push(occ);
        }

        for (k, &calendar_month) in fiscal_month_order(fiscal.fiscal_start_month).iter().enumerate()
        {
            if let Some(rx) = &cancel {
                if *rx.borrow() {
                    return Err((Error::Cancelled, current_month));
                }
            }

            if let Some(month_occurrences) = by_month.get(&calendar_month) {
                for occ in month_occurrences {
                    ledger.apply(occ);
                }
            }
            current_month = calendar_month;

            let pct = 20 + (5 * (k as u8 + 1));
            progress
                .monthly_step(calendar_month, pct, &ledger)
                .await;
        }

        // Derivation steps
        ledger.roll_forward();
        progress.step(current_month, 85).await;

        let monthly_totals = ledger.monthly_summaries();
        progress.step(current_month, 90).await;

        let overall_totals = ledger.overall_summary(&monthly_totals);
        progress.step(current_month, 95).await;

        crate::invariants::check_all(&ledger, &monthly_totals, &overall_totals)
            .map_err(|e| (e, current_month))?;

        let total_occurrences = occurrences.len();
        let results = SimulationResults {
            year: fiscal.year,
            fiscal_start_month: fiscal.fiscal_start_month,
            monthly_balances: ledger.into_monthly_balances(),
            monthly_totals,
            overall_totals,
            metadata: ResultMetadata {
                total_occurrences,
                processing_time_ms: 0, // stamped by the caller
                engine_version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        Ok((results, current_month))
    }

    /// Run a simulation for a stored company, publishing the results
    ///
    /// Patterns and the company are read from `store`; a missing company
    /// fails fast with `NotFound`. When `sink` is given, the results are
    /// published to it before being returned; a sink failure is demoted
    /// to a warning, never a run failure.
    pub async fn run_for_company(
        &self,
        store: &dyn crate::store::PatternStore,
        sink: Option<&dyn crate::store::ResultSink>,
        company_id: &str,
        fiscal: &FiscalConfig,
        options: RunOptions,
    ) -> Result<SimulationResults> {
        let company = store.get_company(company_id).await?;
        let revenues = store.list_revenue_patterns(company_id).await?;
        let expenses = store.list_expense_patterns(company_id).await?;

        let results = self.run(fiscal, &revenues, &expenses, &company, options).await?;

        if let Some(sink) = sink {
            if let Err(e) = sink.publish(&results).await {
                warn!(company_id, error = %e, "result sink rejected the write");
            }
        }
        Ok(results)
    }

    /// Validate all run inputs; the first problem wins
    fn validate(
        &self,
        fiscal: &FiscalConfig,
        revenues: &[RevenuePattern],
        expenses: &[ExpensePattern],
        company: &Company,
    ) -> Result<()> {
        if !YEAR_RANGE.contains(&fiscal.year) {
            return Err(Error::Validation(format!(
                "year {} outside supported range {}..={}",
                fiscal.year,
                YEAR_RANGE.start(),
                YEAR_RANGE.end()
            )));
        }
        if !(1..=12).contains(&fiscal.fiscal_start_month) {
            return Err(Error::Validation(format!(
                "fiscal start month {} outside 1..=12",
                fiscal.fiscal_start_month
            )));
        }

        for (field, value) in [
            ("company id", &company.id),
            ("user id", &company.user_id),
            ("legal form", &company.legal_form),
            ("activity sector", &company.activity_sector),
            ("bank partner", &company.bank_partner),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Validation(format!("{field} must not be empty")));
            }
        }
        if company.capital <= Decimal::ZERO {
            return Err(Error::Validation("capital must be positive".to_string()));
        }

        let pattern_count = revenues.len() + expenses.len();
        if pattern_count > self.config.max_patterns {
            return Err(Error::Validation(format!(
                "{} patterns exceed the limit of {}",
                pattern_count, self.config.max_patterns
            )));
        }

        for core in revenues
            .iter()
            .map(|p| &p.core)
            .chain(expenses.iter().map(|p| &p.core))
        {
            self.validate_pattern(core)?;
        }

        Ok(())
    }

    fn validate_pattern(&self, core: &PatternCore) -> Result<()> {
        if core.amount <= Decimal::ZERO {
            return Err(Error::Validation(format!(
                "pattern {} amount must be positive",
                core.id
            )));
        }
        if !(1..=12).contains(&core.start_month) {
            return Err(Error::Validation(format!(
                "pattern {} start month {} outside 1..=12",
                core.id, core.start_month
            )));
        }
        if core.frequency == Frequency::Daily {
            match core.days_mask {
                None => {
                    return Err(Error::Validation(format!(
                        "daily pattern {} requires a days mask",
                        core.id
                    )));
                }
                Some(mask) if mask > 0x7F => {
                    return Err(Error::Validation(format!(
                        "pattern {} days mask {mask} outside 0..=127",
                        core.id
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

/// Progress emission helper bound to one run
struct RunProgress {
    simulation_id: Uuid,
    broadcaster: Option<Arc<ProgressBroadcaster>>,
    heartbeat: Option<tokio::task::JoinHandle<()>>,
    last: std::sync::atomic::AtomicU8,
}

impl RunProgress {
    fn new(
        simulation_id: Uuid,
        broadcaster: Option<Arc<ProgressBroadcaster>>,
        heartbeat_interval_ms: u64,
    ) -> Self {
        let heartbeat = broadcaster
            .as_ref()
            .map(|b| b.spawn_heartbeat(Duration::from_millis(heartbeat_interval_ms)));
        Self {
            simulation_id,
            broadcaster,
            heartbeat,
            last: std::sync::atomic::AtomicU8::new(0),
        }
    }

    fn last_progress(&self) -> u8 {
        self.last.load(std::sync::atomic::Ordering::Relaxed)
    }

    async fn step(&self, current_month: u32, progress: u8) {
        self.last.store(progress, std::sync::atomic::Ordering::Relaxed);
        if let Some(b) = &self.broadcaster {
            b.publish(Snapshot::new(
                self.simulation_id,
                RunStatus::Running,
                current_month,
                progress,
            ))
            .await;
        }
    }

    /// Monthly step with partial balances and indicative taxes
    async fn monthly_step(&self, calendar_month: u32, progress: u8, ledger: &LedgerAggregator) {
        self.last.store(progress, std::sync::atomic::Ordering::Relaxed);
        if let Some(b) = &self.broadcaster {
            let partial = ledger.partial_closing(calendar_month);
            let revenue_net = ledger.month_revenue_net(calendar_month);
            let expenses_net = ledger.month_expenses_net(calendar_month);
            let taxes = TaxEstimates {
                tva: partial[&crate::types::Account::Vat].abs(),
                urssaf: revenue_net * Decimal::new(45, 2),
                net_cash_flow: revenue_net - expenses_net,
            };

            let mut snapshot = Snapshot::new(
                self.simulation_id,
                RunStatus::Running,
                calendar_month,
                progress,
            );
            snapshot.partial_balances = Some(partial);
            snapshot.taxes = Some(taxes);
            b.publish(snapshot).await;
        }
    }

    async fn terminal(
        &self,
        status: RunStatus,
        current_month: u32,
        progress: u8,
        message: Option<String>,
    ) {
        if let Some(b) = &self.broadcaster {
            let mut snapshot = Snapshot::new(self.simulation_id, status, current_month, progress);
            snapshot.message = message;
            b.publish(snapshot).await;
        }
        if let Some(hb) = &self.heartbeat {
            hb.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Account, ExpenseCategory, VatRate};
    use fiscal_calendar::HolidayRegion;
    use rust_decimal_macros::dec;

    fn company() -> Company {
        Company {
            id: "co-1".into(),
            user_id: "user-1".into(),
            name: "Atelier Petit".into(),
            legal_form: "SASU".into(),
            activity_sector: "services".into(),
            capital: dec!(5000),
            bank_partner: "Banque Test".into(),
            fiscal_year: None,
            holiday_region: HolidayRegion::Fr,
        }
    }

    fn fiscal(year: i32, start: u32) -> FiscalConfig {
        FiscalConfig {
            year,
            fiscal_start_month: start,
            starting_balances: BTreeMap::from([(Account::Operating, dec!(1000))]),
        }
    }

    fn monthly_revenue(id: &str, amount: Decimal) -> RevenuePattern {
        RevenuePattern {
            core: PatternCore {
                id: id.into(),
                name: "Revenue".into(),
                amount,
                frequency: Frequency::Monthly,
                start_month: 1,
                days_mask: None,
                exclude_weekends: false,
                exclude_holidays: false,
                start_date: None,
                day_off_overrides: vec![],
            },
            vat_rate: Some(VatRate::Standard),
        }
    }

    #[tokio::test]
    async fn test_run_happy_path() {
        let runner = SimulationRunner::new(EngineConfig::default());
        let results = runner
            .run(
                &fiscal(2024, 1),
                &[monthly_revenue("r1", dec!(1200))],
                &[],
                &company(),
                RunOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(results.year, 2024);
        assert_eq!(results.metadata.total_occurrences, 12);
        assert_eq!(results.monthly_totals.len(), 12);
        assert_eq!(results.overall_totals.total_revenue.net, dec!(12000));
        assert_eq!(
            results.overall_totals.final_account_balances[&Account::Operating],
            dec!(13000)
        );
    }

    #[tokio::test]
    async fn test_validation_rejects_bad_year() {
        let runner = SimulationRunner::new(EngineConfig::default());
        let err = runner
            .run(&fiscal(2031, 1), &[], &[], &company(), RunOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_validation_rejects_empty_company_field() {
        let runner = SimulationRunner::new(EngineConfig::default());
        let mut bad = company();
        bad.legal_form = "  ".into();
        let err = runner
            .run(&fiscal(2024, 1), &[], &[], &bad, RunOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("legal form"));
    }

    #[tokio::test]
    async fn test_validation_rejects_pattern_overflow() {
        let runner = SimulationRunner::new(EngineConfig::default());
        let revenues: Vec<RevenuePattern> = (0..101)
            .map(|i| monthly_revenue(&format!("r{i}"), dec!(100)))
            .collect();
        let err = runner
            .run(&fiscal(2024, 1), &revenues, &[], &company(), RunOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_validation_rejects_daily_without_mask() {
        let runner = SimulationRunner::new(EngineConfig::default());
        let mut pattern = monthly_revenue("d1", dec!(100));
        pattern.core.frequency = Frequency::Daily;
        pattern.core.days_mask = None;
        let err = runner
            .run(&fiscal(2024, 1), &[pattern], &[], &company(), RunOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("days mask"));
    }

    #[tokio::test]
    async fn test_cancellation_between_months() {
        let runner = SimulationRunner::new(EngineConfig::default());
        let (tx, rx) = watch::channel(true); // already cancelled

        let err = runner
            .run(
                &fiscal(2024, 1),
                &[monthly_revenue("r1", dec!(1200))],
                &[],
                &company(),
                RunOptions {
                    cancel: Some(rx),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        drop(tx);
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn test_expense_only_run() {
        let runner = SimulationRunner::new(EngineConfig::default());
        let expense = ExpensePattern {
            core: PatternCore {
                id: "e1".into(),
                name: "Rent".into(),
                amount: dec!(2400),
                frequency: Frequency::Monthly,
                start_month: 1,
                days_mask: None,
                exclude_weekends: false,
                exclude_holidays: false,
                start_date: None,
                day_off_overrides: vec![],
            },
            category: ExpenseCategory::Rent,
            vat_deductible: true,
            vat_rate: None,
        };

        let results = runner
            .run(&fiscal(2024, 1), &[], &[expense], &company(), RunOptions::default())
            .await
            .unwrap();

        assert_eq!(results.overall_totals.total_expenses.net, dec!(24000));
        assert!(results.overall_totals.net_profit < Decimal::ZERO);
        assert_eq!(results.overall_totals.total_vat_deductible, dec!(4800));
    }
}
