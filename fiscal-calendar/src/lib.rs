//! French holiday calendar and fiscal-year date arithmetic
//!
//! Pure, deterministic date logic shared by the simulation engine:
//!
//! - **Holidays**: French national holidays plus the Alsace–Moselle
//!   additions, with Easter-derived movable feasts computed by the
//!   Meeus/Butcher algorithm
//! - **Date kernel**: ISO formatting, month arithmetic, weekday mapping,
//!   and calendar↔fiscal month conversion
//!
//! No IO, no wall-clock, no randomness. Everything in this crate can be
//! memoized safely.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod dates;
pub mod holidays;

pub use dates::{
    add_days, add_months, calendar_to_fiscal, days_in_month, first_of_month, fiscal_month_order,
    fiscal_to_calendar, format_iso, is_leap_year, last_of_month, month_display_name, month_name,
    parse_iso, weekday0,
};
pub use holidays::{cached_holidays, easter_sunday, holidays_for, named_holidays, HolidayRegion};
