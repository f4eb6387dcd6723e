//! Post-aggregation invariant checks
//!
//! Four classes of arithmetic equalities must hold before a run's
//! results are released, each within one cent per account:
//!
//! - **opening seed**: the fiscal start month opens at the configured
//!   starting balance
//! - **roll-forward**: every non-seed fiscal month opens at the prior
//!   fiscal month's closing, and closes at `opening + net_change`
//! - **conservation**: the last fiscal month closes at
//!   `starting + Σ net_change`
//! - **VAT consistency**: monthly VAT sums match the overall totals
//!
//! A violation means the aggregator itself is wrong, never the input.

use crate::error::{InvariantViolation, Result};
use crate::ledger::{LedgerAggregator, MonthlySummary, OverallSummary};
use crate::money::money_eq;
use crate::types::Account;
use fiscal_calendar::fiscal_month_order;
use rust_decimal::Decimal;
use tracing::{debug, error};

/// Run every invariant class, failing on the first violation
pub fn check_all(
    ledger: &LedgerAggregator,
    monthly: &[MonthlySummary],
    overall: &OverallSummary,
) -> Result<()> {
    check_opening_seed(ledger)?;
    check_roll_forward(ledger)?;
    check_conservation(ledger)?;
    check_vat_consistency(monthly, overall)?;
    debug!("all invariants hold");
    Ok(())
}

/// The fiscal start month opens at the configured starting balance
fn check_opening_seed(ledger: &LedgerAggregator) -> Result<()> {
    let seed_month = ledger.fiscal_start_month();
    for account in Account::ALL {
        let opening = ledger.bucket(account, seed_month).opening_balance;
        let starting = ledger.starting_balance(account);
        if !money_eq(opening, starting) {
            return fail("opening seed", account, Some(seed_month), opening, starting);
        }
    }
    Ok(())
}

/// Fiscal-adjacent months chain opening == prior closing, and every
/// closing equals opening + net change
fn check_roll_forward(ledger: &LedgerAggregator) -> Result<()> {
    let order = fiscal_month_order(ledger.fiscal_start_month());
    for account in Account::ALL {
        for pair in order.windows(2) {
            let prev = ledger.bucket(account, pair[0]);
            let cur = ledger.bucket(account, pair[1]);
            if !money_eq(cur.opening_balance, prev.closing_balance) {
                return fail(
                    "roll-forward opening",
                    account,
                    Some(cur.month),
                    cur.opening_balance,
                    prev.closing_balance,
                );
            }
        }
        for &month in &order {
            let bucket = ledger.bucket(account, month);
            let expected = bucket.opening_balance + bucket.summary.net_change;
            if !money_eq(bucket.closing_balance, expected) {
                return fail(
                    "roll-forward closing",
                    account,
                    Some(month),
                    bucket.closing_balance,
                    expected,
                );
            }
        }
    }
    Ok(())
}

/// Last fiscal month closing == starting + Σ monthly net change
fn check_conservation(ledger: &LedgerAggregator) -> Result<()> {
    let order = fiscal_month_order(ledger.fiscal_start_month());
    let last_month = order[11];
    for account in Account::ALL {
        let total_net: Decimal = order
            .iter()
            .map(|&m| ledger.bucket(account, m).summary.net_change)
            .sum();
        let expected = ledger.starting_balance(account) + total_net;
        let closing = ledger.bucket(account, last_month).closing_balance;
        if !money_eq(closing, expected) {
            return fail("conservation", account, Some(last_month), closing, expected);
        }
    }
    Ok(())
}

/// Overall VAT totals equal the monthly sums and their difference
fn check_vat_consistency(monthly: &[MonthlySummary], overall: &OverallSummary) -> Result<()> {
    let collected: Decimal = monthly.iter().map(|m| m.revenue.vat).sum();
    let deductible: Decimal = monthly.iter().map(|m| m.expenses.deductible_vat).sum();

    if !money_eq(collected, overall.total_vat_collected) {
        return fail(
            "VAT collected total",
            Account::Vat,
            None,
            collected,
            overall.total_vat_collected,
        );
    }
    if !money_eq(deductible, overall.total_vat_deductible) {
        return fail(
            "VAT deductible total",
            Account::Vat,
            None,
            deductible,
            overall.total_vat_deductible,
        );
    }
    let owed = overall.total_vat_collected - overall.total_vat_deductible;
    if !money_eq(overall.net_vat_owed, owed) {
        return fail("net VAT owed", Account::Vat, None, overall.net_vat_owed, owed);
    }
    Ok(())
}

fn fail(
    check: &str,
    account: Account,
    month: Option<u32>,
    lhs: Decimal,
    rhs: Decimal,
) -> Result<()> {
    let violation = InvariantViolation::new(check, account, month, lhs, rhs);
    error!(%violation, "invariant violation");
    Err(violation.into())
}
