//! Dated occurrences and their double-entry postings
//!
//! An [`Occurrence`] is one concrete financial event derived from a
//! pattern: the gross amount split into net and VAT, plus the signed
//! account postings that apply it to the ledger. Positive posting amounts
//! are debits (inflows to the account), negative are credits.
//!
//! Posting rules:
//! - revenue: `operating +net`, `vat +vat`
//! - expense: `operating −net`, and `vat −vat` only when the expense is
//!   VAT-deductible and the VAT is non-zero

use crate::money::split_gross;
use crate::types::{Account, ExpenseCategory, ExpensePattern, RevenuePattern};
use chrono::NaiveDate;
use fiscal_calendar::format_iso;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Whether an occurrence brings money in or out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OccurrenceKind {
    /// Money in
    Revenue,
    /// Money out
    Expense,
}

/// One signed entry against one account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountPosting {
    /// Target account
    pub account: Account,
    /// Signed amount: positive = debit, negative = credit
    pub amount: Decimal,
    /// Human description derived from the pattern name
    pub description: String,
}

/// One dated financial event derived from a pattern
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    /// Deterministic id: `<patternId>@<date>`
    pub id: String,
    /// Source pattern id
    pub pattern_id: String,
    /// Source pattern name
    pub pattern_name: String,
    /// Date of the event
    pub date: NaiveDate,
    /// Revenue or expense
    pub kind: OccurrenceKind,
    /// Expense category, when `kind = expense`
    pub category: Option<ExpenseCategory>,
    /// Gross amount
    pub gross_amount: Decimal,
    /// VAT rate as a fraction (0.20 for 20%)
    pub vat_rate: Decimal,
    /// VAT portion of the gross
    pub vat_amount: Decimal,
    /// Net portion of the gross
    pub net_amount: Decimal,
    /// Deductibility flag, when `kind = expense`
    pub vat_deductible: Option<bool>,
    /// Double-entry postings, in application order
    pub postings: Vec<AccountPosting>,
}

impl Occurrence {
    /// Build a revenue occurrence on `date`
    pub fn revenue(pattern: &RevenuePattern, date: NaiveDate) -> Self {
        let rate = pattern.vat_rate().as_fraction();
        let (net, vat) = split_gross(pattern.core.amount, rate);

        // Revenue always carries its VAT posting, zero-rated included;
        // only expense VAT is conditional
        let postings = vec![
            AccountPosting {
                account: Account::Operating,
                amount: net,
                description: format!("{} (net)", pattern.core.name),
            },
            AccountPosting {
                account: Account::Vat,
                amount: vat,
                description: format!("{} (VAT collected)", pattern.core.name),
            },
        ];

        Self {
            id: occurrence_id(&pattern.core.id, date),
            pattern_id: pattern.core.id.clone(),
            pattern_name: pattern.core.name.clone(),
            date,
            kind: OccurrenceKind::Revenue,
            category: None,
            gross_amount: pattern.core.amount,
            vat_rate: rate,
            vat_amount: vat,
            net_amount: net,
            vat_deductible: None,
            postings,
        }
    }

    /// Build an expense occurrence on `date`
    pub fn expense(pattern: &ExpensePattern, date: NaiveDate) -> Self {
        let rate = pattern.vat_rate().as_fraction();
        let (net, vat) = split_gross(pattern.core.amount, rate);

        let mut postings = vec![AccountPosting {
            account: Account::Operating,
            amount: -net,
            description: format!("{} (net)", pattern.core.name),
        }];
        if pattern.vat_deductible && !vat.is_zero() {
            postings.push(AccountPosting {
                account: Account::Vat,
                amount: -vat,
                description: format!("{} (VAT deductible)", pattern.core.name),
            });
        }

        Self {
            id: occurrence_id(&pattern.core.id, date),
            pattern_id: pattern.core.id.clone(),
            pattern_name: pattern.core.name.clone(),
            date,
            kind: OccurrenceKind::Expense,
            category: Some(pattern.category),
            gross_amount: pattern.core.amount,
            vat_rate: rate,
            vat_amount: vat,
            net_amount: net,
            vat_deductible: Some(pattern.vat_deductible),
            postings,
        }
    }

    /// VAT that actually reaches the VAT account for this occurrence
    pub fn posted_vat(&self) -> Decimal {
        self.postings
            .iter()
            .filter(|p| p.account == Account::Vat)
            .map(|p| p.amount)
            .sum()
    }
}

/// Deterministic occurrence id from pattern id and date
fn occurrence_id(pattern_id: &str, date: NaiveDate) -> String {
    format!("{}@{}", pattern_id, format_iso(date))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Frequency, PatternCore, VatRate};
    use rust_decimal_macros::dec;

    fn core(id: &str, amount: Decimal) -> PatternCore {
        PatternCore {
            id: id.into(),
            name: "Test pattern".into(),
            amount,
            frequency: Frequency::Monthly,
            start_month: 1,
            days_mask: None,
            exclude_weekends: false,
            exclude_holidays: false,
            start_date: None,
            day_off_overrides: vec![],
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_revenue_postings() {
        let pattern = RevenuePattern {
            core: core("r1", dec!(12000)),
            vat_rate: Some(VatRate::Standard),
        };
        let occ = Occurrence::revenue(&pattern, date(2024, 1, 1));

        assert_eq!(occ.id, "r1@2024-01-01");
        assert_eq!(occ.net_amount, dec!(10000));
        assert_eq!(occ.vat_amount, dec!(2000));
        assert_eq!(occ.postings.len(), 2);
        assert_eq!(occ.postings[0].account, Account::Operating);
        assert_eq!(occ.postings[0].amount, dec!(10000));
        assert_eq!(occ.postings[1].account, Account::Vat);
        assert_eq!(occ.postings[1].amount, dec!(2000));
    }

    #[test]
    fn test_revenue_zero_rate_posts_zero_vat() {
        let pattern = RevenuePattern {
            core: core("r2", dec!(500)),
            vat_rate: Some(VatRate::Zero),
        };
        let occ = Occurrence::revenue(&pattern, date(2024, 3, 1));

        assert_eq!(occ.net_amount, dec!(500));
        assert_eq!(occ.vat_amount, dec!(0));
        // The VAT posting is always present for revenue, just zero here
        assert_eq!(occ.postings.len(), 2);
        assert_eq!(occ.postings[1].account, Account::Vat);
        assert_eq!(occ.postings[1].amount, dec!(0));
        assert_eq!(occ.posted_vat(), dec!(0));
    }

    #[test]
    fn test_revenue_defaults_to_standard_rate() {
        let pattern = RevenuePattern {
            core: core("r3", dec!(1200)),
            vat_rate: None,
        };
        let occ = Occurrence::revenue(&pattern, date(2024, 1, 1));
        assert_eq!(occ.vat_rate, dec!(0.20));
        assert_eq!(occ.vat_amount, dec!(200));
    }

    #[test]
    fn test_deductible_expense_postings() {
        let pattern = ExpensePattern {
            core: core("e1", dec!(2400)),
            category: ExpenseCategory::Rent,
            vat_deductible: true,
            vat_rate: None,
        };
        let occ = Occurrence::expense(&pattern, date(2024, 1, 1));

        assert_eq!(occ.net_amount, dec!(2000));
        assert_eq!(occ.vat_amount, dec!(400));
        assert_eq!(occ.postings.len(), 2);
        assert_eq!(occ.postings[0].amount, dec!(-2000));
        assert_eq!(occ.postings[1].account, Account::Vat);
        assert_eq!(occ.postings[1].amount, dec!(-400));
    }

    #[test]
    fn test_non_deductible_expense_has_no_vat_posting() {
        let pattern = ExpensePattern {
            core: core("e2", dec!(600)),
            category: ExpenseCategory::General,
            vat_deductible: false,
            vat_rate: None,
        };
        let occ = Occurrence::expense(&pattern, date(2024, 6, 1));

        // The split still happens (reporting needs it), but nothing posts
        // to the VAT account
        assert_eq!(occ.net_amount, dec!(500));
        assert_eq!(occ.vat_amount, dec!(100));
        assert_eq!(occ.postings.len(), 1);
        assert_eq!(occ.postings[0].account, Account::Operating);
        assert_eq!(occ.posted_vat(), dec!(0));
    }

    #[test]
    fn test_postings_recompose_gross_for_deductible() {
        let pattern = ExpensePattern {
            core: core("e3", dec!(123.45)),
            category: ExpenseCategory::Equipment,
            vat_deductible: true,
            vat_rate: None,
        };
        let occ = Occurrence::expense(&pattern, date(2024, 2, 15));
        let total: Decimal = occ.postings.iter().map(|p| p.amount).sum();
        assert_eq!(total, dec!(-123.45));
    }
}
