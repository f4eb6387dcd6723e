//! Pure date arithmetic and fiscal-month mapping
//!
//! All helpers operate on `chrono::NaiveDate` in the proleptic Gregorian
//! calendar. Dates cross the wire as `YYYY-MM-DD` strings. Weekdays are
//! numbered `0..=6` with 0 = Sunday, matching the bit layout of daily
//! pattern masks.

use chrono::{Datelike, Duration, NaiveDate};

/// English month names, index 0 = January
const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Parse a `YYYY-MM-DD` date string
pub fn parse_iso(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Format a date as `YYYY-MM-DD`
pub fn format_iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Add (or subtract) whole days
pub fn add_days(date: NaiveDate, days: i64) -> NaiveDate {
    date + Duration::days(days)
}

/// Add whole months, clamping the day to the target month's length
///
/// `2024-01-31 + 1 month` is `2024-02-29`.
pub fn add_months(date: NaiveDate, months: i32) -> NaiveDate {
    let zero_based = date.year() * 12 + date.month0() as i32 + months;
    let year = zero_based.div_euclid(12);
    let month = zero_based.rem_euclid(12) as u32 + 1;
    let day = date.day().min(days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).expect("clamped day is valid")
}

/// First day of `(year, month)`
pub fn first_of_month(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).expect("month in 1..=12")
}

/// Last day of `(year, month)`
pub fn last_of_month(year: i32, month: u32) -> NaiveDate {
    first_of_month(year, month) + Duration::days(days_in_month(year, month) as i64 - 1)
}

/// Number of days in `(year, month)`
pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
        _ => unreachable!("month in 1..=12"),
    }
}

/// Gregorian leap-year rule
pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Weekday of `date` in `0..=6`, 0 = Sunday
pub fn weekday0(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

/// Map a calendar month to its 1-based position in the fiscal year
///
/// With `fiscal_start_month = 4`, April maps to 1 and March to 12.
pub fn calendar_to_fiscal(calendar_month: u32, fiscal_start_month: u32) -> u32 {
    (calendar_month + 12 - fiscal_start_month) % 12 + 1
}

/// Inverse of [`calendar_to_fiscal`]
pub fn fiscal_to_calendar(fiscal_month: u32, fiscal_start_month: u32) -> u32 {
    (fiscal_start_month + fiscal_month - 2) % 12 + 1
}

/// Calendar months in fiscal order: `[s, s+1, …, 12, 1, …, s-1]`
pub fn fiscal_month_order(fiscal_start_month: u32) -> [u32; 12] {
    let mut order = [0u32; 12];
    for (k, slot) in order.iter_mut().enumerate() {
        *slot = (fiscal_start_month - 1 + k as u32) % 12 + 1;
    }
    order
}

/// English name of calendar month `month` (1-based)
pub fn month_name(month: u32) -> &'static str {
    MONTH_NAMES[(month - 1) as usize]
}

/// Display name of a calendar month under a fiscal-year configuration
///
/// Calendar fiscal years use the bare month name; offset fiscal years
/// annotate the fiscal position, e.g. `"April (FY Month 1)"`.
pub fn month_display_name(month: u32, fiscal_start_month: u32) -> String {
    if fiscal_start_month == 1 {
        month_name(month).to_string()
    } else {
        format!(
            "{} (FY Month {})",
            month_name(month),
            calendar_to_fiscal(month, fiscal_start_month)
        )
    }
}
