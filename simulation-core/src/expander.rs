//! Pattern expansion into dated occurrences
//!
//! Expands recurring rules into concrete occurrences for one calendar
//! year. Monthly, quarterly and yearly patterns land on the first of the
//! month; daily patterns walk every candidate date and apply a strict
//! precedence:
//!
//! 1. a day-off override's `active` flag is the final verdict
//! 2. otherwise the days-of-week mask decides the initial state
//! 3. `exclude_weekends` deactivates Saturdays and Sundays
//! 4. `exclude_holidays` deactivates regional holidays
//!
//! Occurrences are always emitted within `[Jan 1, Dec 31]` of the target
//! year; the aggregator assigns them to fiscal months later.

use crate::occurrence::Occurrence;
use crate::types::{ExpensePattern, Frequency, Pattern, PatternCore, RevenuePattern};
use chrono::{Duration, NaiveDate};
use fiscal_calendar::{cached_holidays, first_of_month, weekday0, HolidayRegion};
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Expands patterns for one `(year, region)` pair
pub struct PatternExpander {
    year: i32,
    holidays: Arc<BTreeSet<NaiveDate>>,
}

impl PatternExpander {
    /// Create an expander; the holiday set is memoized process-wide
    pub fn new(year: i32, region: HolidayRegion) -> Self {
        Self {
            year,
            holidays: cached_holidays(year, region),
        }
    }

    /// Expand one pattern into date-sorted occurrences
    pub fn expand(&self, pattern: &Pattern) -> Vec<Occurrence> {
        let dates = self.occurrence_dates(pattern.core());
        let occurrences: Vec<Occurrence> = match pattern {
            Pattern::Revenue(p) => dates.into_iter().map(|d| Occurrence::revenue(p, d)).collect(),
            Pattern::Expense(p) => dates.into_iter().map(|d| Occurrence::expense(p, d)).collect(),
        };
        debug!(
            pattern_id = %pattern.core().id,
            count = occurrences.len(),
            "expanded pattern"
        );
        occurrences
    }

    /// Expand all patterns (revenue first, then expense) into one
    /// date-sorted list
    pub fn expand_all(
        &self,
        revenues: &[RevenuePattern],
        expenses: &[ExpensePattern],
    ) -> Vec<Occurrence> {
        let mut all = Vec::new();
        for p in revenues {
            all.extend(self.expand(&Pattern::Revenue(p.clone())));
        }
        for p in expenses {
            all.extend(self.expand(&Pattern::Expense(p.clone())));
        }
        // Stable sort keeps the revenue-then-expense order within a date
        all.sort_by_key(|o| o.date);
        all
    }

    /// Concrete dates a pattern fires on, ascending
    fn occurrence_dates(&self, core: &PatternCore) -> Vec<NaiveDate> {
        match core.frequency {
            Frequency::Monthly => (core.start_month..=12)
                .map(|m| first_of_month(self.year, m))
                .collect(),
            Frequency::Quarterly => {
                let first_quarter = core.start_month.div_ceil(3);
                (first_quarter..=4)
                    .map(|q| first_of_month(self.year, 3 * (q - 1) + 1))
                    .collect()
            }
            Frequency::Yearly => vec![first_of_month(self.year, core.start_month)],
            Frequency::Daily => self.daily_dates(core),
        }
    }

    /// Walk every candidate date of a daily pattern's window
    fn daily_dates(&self, core: &PatternCore) -> Vec<NaiveDate> {
        let jan_1 = first_of_month(self.year, 1);
        let dec_31 = NaiveDate::from_ymd_opt(self.year, 12, 31).expect("Dec 31 exists");

        let window_start = match core.start_date {
            Some(start) => start.max(jan_1),
            None => jan_1,
        };
        if window_start > dec_31 {
            return Vec::new();
        }

        // Duplicate overrides resolve last-wins
        let overrides: BTreeMap<NaiveDate, bool> = core
            .day_off_overrides
            .iter()
            .map(|o| (o.date, o.active))
            .collect();

        let mut dates = Vec::new();
        let mut day = window_start;
        while day <= dec_31 {
            if self.is_active_day(core, &overrides, day) {
                dates.push(day);
            }
            day += Duration::days(1);
        }
        dates
    }

    /// Daily precedence for a single candidate date
    fn is_active_day(
        &self,
        core: &PatternCore,
        overrides: &BTreeMap<NaiveDate, bool>,
        day: NaiveDate,
    ) -> bool {
        // 1. Override is the final verdict
        if let Some(&active) = overrides.get(&day) {
            return active;
        }

        // 2. Days mask decides the initial state; absent mask = all days
        let dow = weekday0(day);
        let mut active = match core.days_mask {
            Some(mask) => mask != 0 && (mask >> dow) & 1 == 1,
            None => true,
        };

        // 3. Weekend exclusion
        if active && core.exclude_weekends && (dow == 0 || dow == 6) {
            active = false;
        }

        // 4. Holiday exclusion
        if active && core.exclude_holidays && self.holidays.contains(&day) {
            active = false;
        }

        active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DayOffOverride, ExpenseCategory, VatRate};
    use fiscal_calendar::is_leap_year;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn daily_core(id: &str) -> PatternCore {
        PatternCore {
            id: id.into(),
            name: "Daily revenue".into(),
            amount: dec!(100),
            frequency: Frequency::Daily,
            start_month: 1,
            days_mask: Some(0b111_1111),
            exclude_weekends: false,
            exclude_holidays: false,
            start_date: None,
            day_off_overrides: vec![],
        }
    }

    fn revenue(core: PatternCore) -> Pattern {
        Pattern::Revenue(RevenuePattern {
            core,
            vat_rate: Some(VatRate::Standard),
        })
    }

    #[test]
    fn test_monthly_from_start_month() {
        let expander = PatternExpander::new(2024, HolidayRegion::Fr);
        let mut core = daily_core("m1");
        core.frequency = Frequency::Monthly;
        core.start_month = 10;

        let occs = expander.expand(&revenue(core));
        let dates: Vec<NaiveDate> = occs.iter().map(|o| o.date).collect();
        assert_eq!(
            dates,
            vec![date(2024, 10, 1), date(2024, 11, 1), date(2024, 12, 1)]
        );
    }

    #[test]
    fn test_quarterly_quarter_alignment() {
        let expander = PatternExpander::new(2024, HolidayRegion::Fr);
        let mut core = daily_core("q1");
        core.frequency = Frequency::Quarterly;
        core.start_month = 3; // Q1 → quarters 1..=4

        let occs = expander.expand(&revenue(core.clone()));
        let dates: Vec<NaiveDate> = occs.iter().map(|o| o.date).collect();
        assert_eq!(
            dates,
            vec![
                date(2024, 1, 1),
                date(2024, 4, 1),
                date(2024, 7, 1),
                date(2024, 10, 1)
            ]
        );

        core.start_month = 5; // Q2 → quarters 2..=4
        let occs = expander.expand(&revenue(core));
        assert_eq!(occs.len(), 3);
        assert_eq!(occs[0].date, date(2024, 4, 1));
    }

    #[test]
    fn test_yearly_single_occurrence() {
        let expander = PatternExpander::new(2025, HolidayRegion::Fr);
        let mut core = daily_core("y1");
        core.frequency = Frequency::Yearly;
        core.start_month = 9;

        let occs = expander.expand(&revenue(core));
        assert_eq!(occs.len(), 1);
        assert_eq!(occs[0].date, date(2025, 9, 1));
    }

    #[test]
    fn test_daily_full_year_count() {
        for year in [2023, 2024] {
            let expander = PatternExpander::new(year, HolidayRegion::Fr);
            let occs = expander.expand(&revenue(daily_core("d1")));
            let expected = if is_leap_year(year) { 366 } else { 365 };
            assert_eq!(occs.len(), expected);
        }
    }

    #[test]
    fn test_daily_weekday_mask() {
        let expander = PatternExpander::new(2024, HolidayRegion::Fr);
        let mut core = daily_core("d2");
        core.days_mask = Some(0b011_1110); // Mon..Fri

        let occs = expander.expand(&revenue(core));
        for occ in &occs {
            let dow = weekday0(occ.date);
            assert!(dow >= 1 && dow <= 5, "weekend date {} leaked", occ.date);
        }
    }

    #[test]
    fn test_daily_zero_mask_yields_nothing() {
        let expander = PatternExpander::new(2024, HolidayRegion::Fr);
        let mut core = daily_core("d3");
        core.days_mask = Some(0);
        assert!(expander.expand(&revenue(core)).is_empty());
    }

    #[test]
    fn test_daily_absent_mask_means_every_day() {
        let expander = PatternExpander::new(2023, HolidayRegion::Fr);
        let mut core = daily_core("d4");
        core.days_mask = None;
        assert_eq!(expander.expand(&revenue(core)).len(), 365);
    }

    #[test]
    fn test_daily_exclude_weekends_and_holidays() {
        let expander = PatternExpander::new(2024, HolidayRegion::Fr);
        let mut core = daily_core("d5");
        core.exclude_weekends = true;
        core.exclude_holidays = true;

        let occs = expander.expand(&revenue(core));
        let dates: BTreeSet<NaiveDate> = occs.iter().map(|o| o.date).collect();

        // Labour Day 2024 is a Wednesday and a holiday
        assert!(!dates.contains(&date(2024, 5, 1)));
        // A Saturday
        assert!(!dates.contains(&date(2024, 1, 6)));
        // A plain Tuesday
        assert!(dates.contains(&date(2024, 1, 9)));
    }

    #[test]
    fn test_override_wins_over_holiday_exclusion() {
        let expander = PatternExpander::new(2024, HolidayRegion::Fr);
        let mut core = daily_core("d6");
        core.days_mask = Some(0b011_1110);
        core.exclude_holidays = true;
        core.day_off_overrides = vec![DayOffOverride {
            date: date(2024, 5, 1),
            active: true,
            reason: Some("on-call".into()),
        }];

        let occs = expander.expand(&revenue(core.clone()));
        assert!(occs.iter().any(|o| o.date == date(2024, 5, 1)));

        // Without the override, Labour Day is excluded
        core.day_off_overrides.clear();
        let occs = expander.expand(&revenue(core));
        assert!(!occs.iter().any(|o| o.date == date(2024, 5, 1)));
    }

    #[test]
    fn test_override_inactive_suppresses_active_day() {
        let expander = PatternExpander::new(2024, HolidayRegion::Fr);
        let mut core = daily_core("d7");
        core.day_off_overrides = vec![DayOffOverride {
            date: date(2024, 7, 9),
            active: false,
            reason: None,
        }];

        let occs = expander.expand(&revenue(core));
        assert!(!occs.iter().any(|o| o.date == date(2024, 7, 9)));
    }

    #[test]
    fn test_duplicate_override_last_wins() {
        let expander = PatternExpander::new(2024, HolidayRegion::Fr);
        let mut core = daily_core("d8");
        core.day_off_overrides = vec![
            DayOffOverride {
                date: date(2024, 2, 14),
                active: false,
                reason: None,
            },
            DayOffOverride {
                date: date(2024, 2, 14),
                active: true,
                reason: Some("corrected".into()),
            },
        ];

        let occs = expander.expand(&revenue(core));
        assert!(occs.iter().any(|o| o.date == date(2024, 2, 14)));
    }

    #[test]
    fn test_start_date_clips_window() {
        let expander = PatternExpander::new(2024, HolidayRegion::Fr);
        let mut core = daily_core("d9");
        core.start_date = Some(date(2024, 12, 30));

        let occs = expander.expand(&revenue(core.clone()));
        assert_eq!(occs.len(), 2); // Dec 30, Dec 31 inclusive

        // A start date beyond the year yields nothing
        core.start_date = Some(date(2025, 1, 1));
        assert!(expander.expand(&revenue(core)).is_empty());
    }

    #[test]
    fn test_start_date_before_year_clamps_to_jan_1() {
        let expander = PatternExpander::new(2023, HolidayRegion::Fr);
        let mut core = daily_core("d10");
        core.start_date = Some(date(2021, 6, 1));
        assert_eq!(expander.expand(&revenue(core)).len(), 365);
    }

    #[test]
    fn test_expand_all_sorted_by_date() {
        let expander = PatternExpander::new(2024, HolidayRegion::Fr);
        let mut monthly = daily_core("r-m");
        monthly.frequency = Frequency::Monthly;
        monthly.start_month = 1;

        let revenues = vec![RevenuePattern {
            core: monthly.clone(),
            vat_rate: None,
        }];
        let expenses = vec![ExpensePattern {
            core: PatternCore {
                id: "e-q".into(),
                frequency: Frequency::Quarterly,
                ..monthly
            },
            category: ExpenseCategory::Insurance,
            vat_deductible: false,
            vat_rate: None,
        }];

        let all = expander.expand_all(&revenues, &expenses);
        assert_eq!(all.len(), 12 + 4);
        for pair in all.windows(2) {
            assert!(pair[0].date <= pair[1].date);
        }
    }

    #[test]
    fn test_alsace_region_excludes_good_friday() {
        let mut core = daily_core("d11");
        core.exclude_holidays = true;

        let national = PatternExpander::new(2024, HolidayRegion::Fr);
        let alsace = PatternExpander::new(2024, HolidayRegion::Fr67);

        let good_friday = date(2024, 3, 29);
        assert!(national
            .expand(&revenue(core.clone()))
            .iter()
            .any(|o| o.date == good_friday));
        assert!(!alsace
            .expand(&revenue(core))
            .iter()
            .any(|o| o.date == good_friday));
    }
}
