//! Core types for the simulation engine
//!
//! All types are designed for:
//! - Deterministic output ordering (fixed account order, sorted maps)
//! - Exact arithmetic (Decimal for money)
//! - Stable wire shapes (serde, camelCase field names)

use chrono::NaiveDate;
use fiscal_calendar::HolidayRegion;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Valid simulation year range
pub const YEAR_RANGE: std::ops::RangeInclusive<i32> = 2020..=2030;

/// The four ledger accounts, in fixed reporting order
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Account {
    /// Day-to-day business account
    Operating,
    /// Savings account
    Savings,
    /// Personal drawings account
    Personal,
    /// VAT collected/deductible position
    Vat,
}

impl Account {
    /// All accounts in reporting order
    pub const ALL: [Account; 4] = [
        Account::Operating,
        Account::Savings,
        Account::Personal,
        Account::Vat,
    ];

    /// Wire name
    pub fn code(&self) -> &'static str {
        match self {
            Account::Operating => "operating",
            Account::Savings => "savings",
            Account::Personal => "personal",
            Account::Vat => "vat",
        }
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Fiscal-year mode configured on a company
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FiscalYearKind {
    /// Fiscal year coincides with the calendar year
    Calendar,
    /// Fiscal year starts at a configured month
    Fiscal,
}

impl FiscalYearKind {
    /// Parse from the wire value
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "calendar" => Some(FiscalYearKind::Calendar),
            "fiscal" => Some(FiscalYearKind::Fiscal),
            _ => None,
        }
    }
}

/// Immutable company context
///
/// The engine reads `id` and `holiday_region`; the descriptive fields are
/// validated non-empty and otherwise passed through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    /// Company identifier
    pub id: String,
    /// Owning user
    pub user_id: String,
    /// Display name
    pub name: String,
    /// Legal form (SASU, EURL, ...)
    pub legal_form: String,
    /// Activity sector
    pub activity_sector: String,
    /// Share capital
    pub capital: Decimal,
    /// Bank partner name
    pub bank_partner: String,
    /// Fiscal-year mode, if configured
    #[serde(default)]
    pub fiscal_year: Option<FiscalYearKind>,
    /// Holiday region, defaults to national
    #[serde(default)]
    pub holiday_region: HolidayRegion,
}

/// Fiscal configuration for one simulation run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FiscalConfig {
    /// Simulation year, within [`YEAR_RANGE`]
    pub year: i32,
    /// First calendar month of the fiscal year, `1..=12`
    pub fiscal_start_month: u32,
    /// Opening balances at the start of the fiscal year
    #[serde(default)]
    pub starting_balances: BTreeMap<Account, Decimal>,
}

impl FiscalConfig {
    /// Opening balance for `account`, zero when unset
    pub fn starting_balance(&self, account: Account) -> Decimal {
        self.starting_balances
            .get(&account)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }
}

/// French VAT rates applicable to revenue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VatRate {
    /// 0% (exempt)
    #[serde(rename = "0")]
    Zero,
    /// 5.5% reduced rate
    #[serde(rename = "5.5")]
    Reduced,
    /// 10% intermediate rate
    #[serde(rename = "10")]
    Intermediate,
    /// 20% standard rate
    #[serde(rename = "20")]
    Standard,
}

/// Default rate applied when a pattern carries none (and to all expenses)
pub const DEFAULT_VAT_RATE: VatRate = VatRate::Standard;

impl VatRate {
    /// Rate as a fraction (20% → 0.20)
    pub fn as_fraction(&self) -> Decimal {
        match self {
            VatRate::Zero => Decimal::ZERO,
            VatRate::Reduced => Decimal::new(55, 3),
            VatRate::Intermediate => Decimal::new(10, 2),
            VatRate::Standard => Decimal::new(20, 2),
        }
    }

    /// Rate in percent (20% → 20)
    pub fn as_percent(&self) -> Decimal {
        self.as_fraction() * Decimal::ONE_HUNDRED
    }

    /// Parse from a percent value; anything outside the closed set is a
    /// user error
    pub fn from_percent(percent: Decimal) -> Option<Self> {
        if percent == Decimal::ZERO {
            Some(VatRate::Zero)
        } else if percent == Decimal::new(55, 1) {
            Some(VatRate::Reduced)
        } else if percent == Decimal::new(10, 0) {
            Some(VatRate::Intermediate)
        } else if percent == Decimal::new(20, 0) {
            Some(VatRate::Standard)
        } else {
            None
        }
    }
}

/// Expense categories (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpenseCategory {
    /// Uncategorized operating expense
    General,
    /// Rent
    Rent,
    /// Utilities
    Utilities,
    /// Recurring subscriptions
    Subscription,
    /// Insurance premiums
    Insurance,
    /// Marketing and advertising
    Marketing,
    /// Travel
    Travel,
    /// Equipment purchases
    Equipment,
}

impl ExpenseCategory {
    /// Wire name
    pub fn code(&self) -> &'static str {
        match self {
            ExpenseCategory::General => "general",
            ExpenseCategory::Rent => "rent",
            ExpenseCategory::Utilities => "utilities",
            ExpenseCategory::Subscription => "subscription",
            ExpenseCategory::Insurance => "insurance",
            ExpenseCategory::Marketing => "marketing",
            ExpenseCategory::Travel => "travel",
            ExpenseCategory::Equipment => "equipment",
        }
    }
}

impl fmt::Display for ExpenseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// How often a pattern recurs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    /// Per-day, governed by the daily fields
    Daily,
    /// First of each month from `start_month`
    Monthly,
    /// First month of each quarter from the quarter of `start_month`
    Quarterly,
    /// Once, on the first of `start_month`
    Yearly,
}

/// A per-date exception to a daily pattern's schedule
///
/// The `active` flag is the final verdict for that date, overriding the
/// days mask and the weekend/holiday exclusions both ways.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayOffOverride {
    /// Date the override applies to
    pub date: NaiveDate,
    /// Whether the pattern fires on that date
    pub active: bool,
    /// Free-form reason, informational
    #[serde(default)]
    pub reason: Option<String>,
}

/// Fields shared by revenue and expense patterns
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternCore {
    /// Pattern identifier
    pub id: String,
    /// Display name, used in posting descriptions
    pub name: String,
    /// Gross amount per occurrence, strictly positive
    pub amount: Decimal,
    /// Recurrence frequency
    pub frequency: Frequency,
    /// First calendar month the pattern applies to, `1..=12`
    pub start_month: u32,

    // Daily-only fields; ignored for other frequencies
    /// Days-of-week bitmask, bit 0 = Sunday .. bit 6 = Saturday
    #[serde(default)]
    pub days_mask: Option<u8>,
    /// Deactivate Saturdays and Sundays
    #[serde(default)]
    pub exclude_weekends: bool,
    /// Deactivate regional holidays
    #[serde(default)]
    pub exclude_holidays: bool,
    /// Expansion starts here instead of Jan 1 when later
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    /// Per-date exceptions; duplicate dates resolve last-wins
    #[serde(default)]
    pub day_off_overrides: Vec<DayOffOverride>,
}

/// Recurring revenue rule
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenuePattern {
    /// Shared pattern fields
    #[serde(flatten)]
    pub core: PatternCore,
    /// VAT rate collected on this revenue
    #[serde(default)]
    pub vat_rate: Option<VatRate>,
}

impl RevenuePattern {
    /// Configured rate, or the standard default
    pub fn vat_rate(&self) -> VatRate {
        self.vat_rate.unwrap_or(DEFAULT_VAT_RATE)
    }
}

/// Recurring expense rule
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpensePattern {
    /// Shared pattern fields
    #[serde(flatten)]
    pub core: PatternCore,
    /// Expense category
    pub category: ExpenseCategory,
    /// Whether this expense's VAT enters the VAT account
    pub vat_deductible: bool,
    /// VAT rate borne by this expense; the standard rate when unset
    #[serde(default)]
    pub vat_rate: Option<VatRate>,
}

impl ExpensePattern {
    /// Configured rate, or the standard default
    ///
    /// Whatever the rate, `vat_deductible` alone decides whether the VAT
    /// posts to the VAT account.
    pub fn vat_rate(&self) -> VatRate {
        self.vat_rate.unwrap_or(DEFAULT_VAT_RATE)
    }
}

/// A pattern of either kind, tagged by `kind` on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Pattern {
    /// Revenue pattern
    Revenue(RevenuePattern),
    /// Expense pattern
    Expense(ExpensePattern),
}

impl Pattern {
    /// Shared fields
    pub fn core(&self) -> &PatternCore {
        match self {
            Pattern::Revenue(p) => &p.core,
            Pattern::Expense(p) => &p.core,
        }
    }

    /// VAT rate used for the gross split
    pub fn vat_rate(&self) -> VatRate {
        match self {
            Pattern::Revenue(p) => p.vat_rate(),
            Pattern::Expense(p) => p.vat_rate(),
        }
    }
}
