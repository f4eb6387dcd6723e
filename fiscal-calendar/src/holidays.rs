//! French public holiday computation
//!
//! The national set applies everywhere in France: eight fixed dates plus
//! three Easter-derived movable feasts (Easter Monday, Ascension, Whit
//! Monday). The three Alsace–Moselle departments (Bas-Rhin, Haut-Rhin,
//! Moselle) additionally observe Good Friday and St. Stephen's Day.
//!
//! Easter Sunday is computed with the Anonymous Gregorian (Meeus/Butcher)
//! algorithm, which is exact for every proleptic Gregorian year.

use chrono::{Duration, NaiveDate};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex};

/// Holiday region code
///
/// Unknown codes are accepted and treated as the national region, so a
/// company record with a bad region still simulates (with national
/// holidays only). Serializes as the wire code (`FR`, `FR-67`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum HolidayRegion {
    /// Metropolitan France, national holidays only
    Fr,
    /// Bas-Rhin (Alsace)
    Fr67,
    /// Haut-Rhin (Alsace)
    Fr68,
    /// Moselle
    Fr57,
}

impl HolidayRegion {
    /// Region code as configured on a company
    pub fn code(&self) -> &'static str {
        match self {
            HolidayRegion::Fr => "FR",
            HolidayRegion::Fr67 => "FR-67",
            HolidayRegion::Fr68 => "FR-68",
            HolidayRegion::Fr57 => "FR-57",
        }
    }

    /// Parse a region code, falling back to the national set
    pub fn parse(code: &str) -> Self {
        match code {
            "FR-67" => HolidayRegion::Fr67,
            "FR-68" => HolidayRegion::Fr68,
            "FR-57" => HolidayRegion::Fr57,
            _ => HolidayRegion::Fr,
        }
    }

    /// Whether the region observes the Alsace–Moselle additions
    pub fn is_alsace_moselle(&self) -> bool {
        !matches!(self, HolidayRegion::Fr)
    }
}

impl Default for HolidayRegion {
    fn default() -> Self {
        HolidayRegion::Fr
    }
}

impl From<String> for HolidayRegion {
    fn from(code: String) -> Self {
        HolidayRegion::parse(&code)
    }
}

impl From<HolidayRegion> for String {
    fn from(region: HolidayRegion) -> Self {
        region.code().to_string()
    }
}

impl fmt::Display for HolidayRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Easter Sunday for `year`, Anonymous Gregorian (Meeus/Butcher) algorithm
pub fn easter_sunday(year: i32) -> NaiveDate {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = ((h + l - 7 * m + 114) % 31) + 1;

    // The formula always lands in March or April
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
        .expect("Meeus/Butcher yields a valid date")
}

/// Holiday set for `(year, region)`, computed fresh
///
/// Prefer [`cached_holidays`] in hot paths; the set for a given key never
/// changes.
pub fn holidays_for(year: i32, region: HolidayRegion) -> BTreeSet<NaiveDate> {
    named_holidays(year, region).into_iter().map(|(d, _)| d).collect()
}

/// Holiday dates with their French display names, ordered by date
pub fn named_holidays(year: i32, region: HolidayRegion) -> Vec<(NaiveDate, &'static str)> {
    let fixed = |m: u32, d: u32| {
        NaiveDate::from_ymd_opt(year, m, d).expect("fixed holiday is a valid date")
    };
    let easter = easter_sunday(year);

    let mut days = vec![
        (fixed(1, 1), "Jour de l'An"),
        (easter + Duration::days(1), "Lundi de Pâques"),
        (fixed(5, 1), "Fête du Travail"),
        (fixed(5, 8), "Victoire 1945"),
        (easter + Duration::days(39), "Ascension"),
        (easter + Duration::days(50), "Lundi de Pentecôte"),
        (fixed(7, 14), "Fête Nationale"),
        (fixed(8, 15), "Assomption"),
        (fixed(11, 1), "Toussaint"),
        (fixed(11, 11), "Armistice 1918"),
        (fixed(12, 25), "Noël"),
    ];

    if region.is_alsace_moselle() {
        days.push((easter - Duration::days(2), "Vendredi Saint"));
        days.push((fixed(12, 26), "Saint-Étienne"));
    }

    days.sort_by_key(|(d, _)| *d);
    days
}

/// Bounded LRU memo cache for holiday sets
///
/// `(year, region)` keys map to immutable shared sets. A hit promotes
/// its key to most-recently-used; the least-recently-used key is evicted
/// once the bound is reached. With a twelve-year valid range and four
/// regions the default bound of 64 never evicts in practice.
pub struct HolidayCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
}

struct CacheInner {
    map: HashMap<(i32, HolidayRegion), Arc<BTreeSet<NaiveDate>>>,
    order: VecDeque<(i32, HolidayRegion)>,
}

impl HolidayCache {
    /// Create a cache holding at most `capacity` year/region sets
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                map: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity: capacity.max(1),
        }
    }

    /// Get or compute the holiday set for `(year, region)`
    pub fn get(&self, year: i32, region: HolidayRegion) -> Arc<BTreeSet<NaiveDate>> {
        let key = (year, region);
        let mut inner = self.inner.lock().expect("holiday cache poisoned");

        if let Some(set) = inner.map.get(&key).map(Arc::clone) {
            // Promote to most-recently-used
            if let Some(pos) = inner.order.iter().position(|k| *k == key) {
                inner.order.remove(pos);
                inner.order.push_back(key);
            }
            return set;
        }

        let set = Arc::new(holidays_for(year, region));
        if inner.order.len() >= self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                inner.map.remove(&evicted);
            }
        }
        inner.order.push_back(key);
        inner.map.insert(key, Arc::clone(&set));
        set
    }

    /// Number of cached sets
    pub fn len(&self) -> usize {
        self.inner.lock().expect("holiday cache poisoned").map.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

lazy_static! {
    static ref SHARED_CACHE: HolidayCache = HolidayCache::new(64);
}

/// Process-wide memoized holiday lookup
pub fn cached_holidays(year: i32, region: HolidayRegion) -> Arc<BTreeSet<NaiveDate>> {
    SHARED_CACHE.get(year, region)
}
