//! Per-account monthly ledger and roll-forward
//!
//! The aggregator owns twelve calendar-month buckets per account.
//! Processing is strictly phased:
//!
//! 1. **Seed** opening balances at the fiscal start month
//! 2. **Apply** postings into calendar-month buckets (closing untouched)
//! 3. **Roll forward** once, in fiscal order, after all postings landed
//! 4. **Summarize** months and the overall fiscal year
//!
//! The single roll-forward point is what makes out-of-order occurrence
//! arrival harmless: openings for non-seed months do not exist until
//! every posting has been applied.

use crate::occurrence::{Occurrence, OccurrenceKind};
use crate::types::{Account, FiscalConfig};
use chrono::{Datelike, NaiveDate};
use fiscal_calendar::{fiscal_month_order, month_display_name};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// One applied posting, as recorded in a monthly bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    /// Occurrence the posting came from
    pub occurrence_id: String,
    /// Posting date
    pub date: NaiveDate,
    /// Signed amount: positive = debit, negative = credit
    pub amount: Decimal,
    /// Human description
    pub description: String,
}

/// Debit/credit/net totals of one bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSummary {
    /// Sum of positive posting amounts
    pub total_debits: Decimal,
    /// Sum of absolute negative posting amounts
    pub total_credits: Decimal,
    /// Signed sum of all posting amounts
    pub net_change: Decimal,
}

/// One account's state for one calendar month
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyAccountBalance {
    /// Account
    pub account: Account,
    /// Calendar month, `1..=12`
    pub month: u32,
    /// Balance at the start of the month (fiscal roll-forward)
    pub opening_balance: Decimal,
    /// Applied postings, in application order
    pub transactions: Vec<TransactionRecord>,
    /// `opening_balance + summary.net_change`, set by roll-forward
    pub closing_balance: Decimal,
    /// Debit/credit totals
    pub summary: BalanceSummary,
}

impl MonthlyAccountBalance {
    fn empty(account: Account, month: u32) -> Self {
        Self {
            account,
            month,
            opening_balance: Decimal::ZERO,
            transactions: Vec::new(),
            closing_balance: Decimal::ZERO,
            summary: BalanceSummary::default(),
        }
    }
}

/// Gross/net/VAT totals for the revenue side
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueTotals {
    /// Gross amounts
    pub gross: Decimal,
    /// Net amounts
    pub net: Decimal,
    /// VAT collected
    pub vat: Decimal,
}

/// Gross/net/VAT totals for the expense side
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseTotals {
    /// Gross amounts
    pub gross: Decimal,
    /// Net amounts
    pub net: Decimal,
    /// VAT portion of all expenses, deductible or not
    pub vat: Decimal,
    /// VAT that actually posted to the VAT account
    pub deductible_vat: Decimal,
}

/// Financial summary of one calendar month
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlySummary {
    /// Calendar month, `1..=12`
    pub month: u32,
    /// Display name, annotated with the fiscal position when the fiscal
    /// year is offset
    pub display_name: String,
    /// 1-based position of this month in the fiscal year
    pub fiscal_month: u32,
    /// Revenue aggregates
    pub revenue: RevenueTotals,
    /// Expense aggregates
    pub expenses: ExpenseTotals,
    /// `revenue.net − expenses.net`
    pub net_profit: Decimal,
    /// `revenue.vat − expenses.deductible_vat`
    pub net_vat_position: Decimal,
    /// Closing balance of every account at the end of this month
    pub account_balances: BTreeMap<Account, Decimal>,
}

/// Totals across the whole fiscal year
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallSummary {
    /// Revenue aggregates
    pub total_revenue: RevenueTotals,
    /// Expense aggregates
    pub total_expenses: ExpenseTotals,
    /// `total_revenue.net − total_expenses.net`
    pub net_profit: Decimal,
    /// Σ monthly revenue VAT
    pub total_vat_collected: Decimal,
    /// Σ monthly deductible expense VAT
    pub total_vat_deductible: Decimal,
    /// `total_vat_collected − total_vat_deductible`
    pub net_vat_owed: Decimal,
    /// Closing balances of the last fiscal month
    pub final_account_balances: BTreeMap<Account, Decimal>,
}

/// Run metadata attached to the results
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMetadata {
    /// Number of occurrences applied
    pub total_occurrences: usize,
    /// Wall-clock duration of the run
    pub processing_time_ms: u64,
    /// Engine crate version
    pub engine_version: String,
}

/// Complete, immutable output of one simulation run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResults {
    /// Simulated year
    pub year: i32,
    /// First calendar month of the fiscal year
    pub fiscal_start_month: u32,
    /// All account/month buckets, fiscal month order then account order
    pub monthly_balances: Vec<MonthlyAccountBalance>,
    /// Monthly summaries in fiscal order
    pub monthly_totals: Vec<MonthlySummary>,
    /// Fiscal-year totals
    pub overall_totals: OverallSummary,
    /// Run metadata
    pub metadata: ResultMetadata,
}

/// Per-calendar-month occurrence aggregates, accumulated at apply time
#[derive(Debug, Clone, Copy, Default)]
struct MonthKindTotals {
    revenue: RevenueTotals,
    expenses: ExpenseTotals,
}

/// Owns the ledger of one simulation run
#[derive(Debug)]
pub struct LedgerAggregator {
    year: i32,
    fiscal_start_month: u32,
    starting_balances: BTreeMap<Account, Decimal>,
    /// Twelve calendar-month buckets per account
    buckets: BTreeMap<Account, Vec<MonthlyAccountBalance>>,
    /// Occurrence aggregates per calendar month (index = month − 1)
    month_totals: Vec<MonthKindTotals>,
    rolled: bool,
}

impl LedgerAggregator {
    /// Seed a fresh ledger from the fiscal configuration
    ///
    /// The bucket at the fiscal start month receives the configured
    /// opening balance; every other bucket opens at zero until the
    /// roll-forward pass.
    pub fn new(config: &FiscalConfig) -> Self {
        let mut buckets = BTreeMap::new();
        for account in Account::ALL {
            let mut months: Vec<MonthlyAccountBalance> =
                (1..=12).map(|m| MonthlyAccountBalance::empty(account, m)).collect();
            months[(config.fiscal_start_month - 1) as usize].opening_balance =
                config.starting_balance(account);
            buckets.insert(account, months);
        }

        Self {
            year: config.year,
            fiscal_start_month: config.fiscal_start_month,
            starting_balances: Account::ALL
                .iter()
                .map(|&a| (a, config.starting_balance(a)))
                .collect(),
            buckets,
            month_totals: vec![MonthKindTotals::default(); 12],
            rolled: false,
        }
    }

    /// Apply one occurrence's postings into its calendar-month bucket
    ///
    /// Closing balances are not touched here; they are derived once by
    /// [`roll_forward`](Self::roll_forward).
    pub fn apply(&mut self, occurrence: &Occurrence) {
        let idx = (occurrence.date.month() - 1) as usize;

        for posting in &occurrence.postings {
            let bucket = &mut self
                .buckets
                .get_mut(&posting.account)
                .expect("all accounts seeded")[idx];

            bucket.transactions.push(TransactionRecord {
                occurrence_id: occurrence.id.clone(),
                date: occurrence.date,
                amount: posting.amount,
                description: posting.description.clone(),
            });
            if posting.amount >= Decimal::ZERO {
                bucket.summary.total_debits += posting.amount;
            } else {
                bucket.summary.total_credits += -posting.amount;
            }
            bucket.summary.net_change += posting.amount;
        }

        let totals = &mut self.month_totals[idx];
        match occurrence.kind {
            OccurrenceKind::Revenue => {
                totals.revenue.gross += occurrence.gross_amount;
                totals.revenue.net += occurrence.net_amount;
                totals.revenue.vat += occurrence.vat_amount;
            }
            OccurrenceKind::Expense => {
                totals.expenses.gross += occurrence.gross_amount;
                totals.expenses.net += occurrence.net_amount;
                totals.expenses.vat += occurrence.vat_amount;
                if occurrence.vat_deductible == Some(true) {
                    totals.expenses.deductible_vat += occurrence.vat_amount;
                }
            }
        }
    }

    /// Derive all closing and non-seed opening balances, in fiscal order
    ///
    /// Must run exactly once, after every posting has been applied.
    pub fn roll_forward(&mut self) {
        debug_assert!(!self.rolled, "roll_forward runs once per ledger");

        for account in Account::ALL {
            let months = self.buckets.get_mut(&account).expect("all accounts seeded");
            let mut prior_closing: Option<Decimal> = None;

            for calendar_month in fiscal_month_order(self.fiscal_start_month) {
                let bucket = &mut months[(calendar_month - 1) as usize];
                if let Some(closing) = prior_closing {
                    bucket.opening_balance = closing;
                }
                bucket.closing_balance = bucket.opening_balance + bucket.summary.net_change;
                prior_closing = Some(bucket.closing_balance);
            }
        }

        self.rolled = true;
        debug!(fiscal_start_month = self.fiscal_start_month, "roll-forward complete");
    }

    /// Closing balances for `calendar_month` computed from that month's
    /// bucket alone (`opening + net_change`)
    ///
    /// Used for progress snapshots while postings are still being
    /// applied; the authoritative closing comes from the roll-forward.
    pub fn partial_closing(&self, calendar_month: u32) -> BTreeMap<Account, Decimal> {
        let idx = (calendar_month - 1) as usize;
        Account::ALL
            .iter()
            .map(|&account| {
                let bucket = &self.buckets[&account][idx];
                (account, bucket.opening_balance + bucket.summary.net_change)
            })
            .collect()
    }

    /// Net revenue applied to `calendar_month` so far
    pub fn month_revenue_net(&self, calendar_month: u32) -> Decimal {
        self.month_totals[(calendar_month - 1) as usize].revenue.net
    }

    /// Net expenses applied to `calendar_month` so far
    pub fn month_expenses_net(&self, calendar_month: u32) -> Decimal {
        self.month_totals[(calendar_month - 1) as usize].expenses.net
    }

    /// Bucket accessor for invariant checks
    pub fn bucket(&self, account: Account, calendar_month: u32) -> &MonthlyAccountBalance {
        &self.buckets[&account][(calendar_month - 1) as usize]
    }

    /// Seeded starting balance for `account`
    pub fn starting_balance(&self, account: Account) -> Decimal {
        self.starting_balances[&account]
    }

    /// First calendar month of the fiscal year
    pub fn fiscal_start_month(&self) -> u32 {
        self.fiscal_start_month
    }

    /// Simulated year
    pub fn year(&self) -> i32 {
        self.year
    }

    /// Monthly summaries in fiscal order
    ///
    /// Requires the roll-forward to have run (closing balances are
    /// snapshotted into each summary).
    pub fn monthly_summaries(&self) -> Vec<MonthlySummary> {
        debug_assert!(self.rolled, "summaries need closing balances");

        fiscal_month_order(self.fiscal_start_month)
            .iter()
            .enumerate()
            .map(|(k, &calendar_month)| {
                let totals = &self.month_totals[(calendar_month - 1) as usize];
                let account_balances = Account::ALL
                    .iter()
                    .map(|&a| (a, self.bucket(a, calendar_month).closing_balance))
                    .collect();

                MonthlySummary {
                    month: calendar_month,
                    display_name: month_display_name(calendar_month, self.fiscal_start_month),
                    fiscal_month: k as u32 + 1,
                    revenue: totals.revenue,
                    expenses: totals.expenses,
                    net_profit: totals.revenue.net - totals.expenses.net,
                    net_vat_position: totals.revenue.vat - totals.expenses.deductible_vat,
                    account_balances,
                }
            })
            .collect()
    }

    /// Fiscal-year totals from the monthly summaries
    pub fn overall_summary(&self, monthly: &[MonthlySummary]) -> OverallSummary {
        let mut total_revenue = RevenueTotals::default();
        let mut total_expenses = ExpenseTotals::default();

        for m in monthly {
            total_revenue.gross += m.revenue.gross;
            total_revenue.net += m.revenue.net;
            total_revenue.vat += m.revenue.vat;
            total_expenses.gross += m.expenses.gross;
            total_expenses.net += m.expenses.net;
            total_expenses.vat += m.expenses.vat;
            total_expenses.deductible_vat += m.expenses.deductible_vat;
        }

        let final_account_balances = monthly
            .last()
            .map(|m| m.account_balances.clone())
            .unwrap_or_default();

        OverallSummary {
            net_profit: total_revenue.net - total_expenses.net,
            total_vat_collected: total_revenue.vat,
            total_vat_deductible: total_expenses.deductible_vat,
            net_vat_owed: total_revenue.vat - total_expenses.deductible_vat,
            total_revenue,
            total_expenses,
            final_account_balances,
        }
    }

    /// Flatten the ledger into the result bucket list: fiscal month
    /// order, then account order
    pub fn into_monthly_balances(self) -> Vec<MonthlyAccountBalance> {
        let order = fiscal_month_order(self.fiscal_start_month);
        let mut balances = Vec::with_capacity(48);
        for &calendar_month in &order {
            for account in Account::ALL {
                balances.push(self.buckets[&account][(calendar_month - 1) as usize].clone());
            }
        }
        balances
    }
}
