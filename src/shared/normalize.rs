//! Text normalization and the duplicate key.
//!
//! Comparison is exact after normalization: case-folded, diacritics
//! stripped, whitespace collapsed.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Case-folds, strips diacritics and collapses whitespace
pub fn normalize_text(value: &str) -> String {
    let stripped: String = value
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_uppercase();

    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Identity of "the same event" for duplicate purposes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DedupKey {
    pub name: String,
    pub community: String,
    pub role: String,
    pub date: NaiveDate,
}

impl DedupKey {
    /// Builds a key from display values; `date` is the calendar day in the
    /// operator's local offset
    pub fn new(name: &str, community: &str, role: &str, date: NaiveDate) -> Self {
        Self {
            name: normalize_text(name),
            community: normalize_text(community),
            role: normalize_text(role),
            date,
        }
    }

    pub fn matches(&self, name: &str, community: &str, role: &str, date: NaiveDate) -> bool {
        self.date == date
            && self.name == normalize_text(name)
            && self.community == normalize_text(community)
            && self.role == normalize_text(role)
    }
}

impl std::fmt::Display for DedupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}|{}|{}|{}", self.name, self.community, self.role, self.date)
    }
}

/// Calendar day of `timestamp` in `offset`
pub fn local_date(timestamp: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    timestamp.with_timezone(&offset).date_naive()
}

/// `[startOfDay, startOfDay + 1 day)` of `timestamp`'s local day, in UTC
pub fn day_bounds(timestamp: DateTime<Utc>, offset: FixedOffset) -> (DateTime<Utc>, DateTime<Utc>) {
    let date = local_date(timestamp, offset);
    let start_local = date
        .and_hms_opt(0, 0, 0)
        .and_then(|naive| naive.and_local_timezone(offset).single())
        .map(|local| local.with_timezone(&Utc))
        .unwrap_or(timestamp);
    (start_local, start_local + chrono::Duration::days(1))
}
