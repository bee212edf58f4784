//! Time window filtering.
//!
//! A [`HarvestWindow`] is half-open: `start` is included, `end` is not.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::HarvestError;
use crate::models::Item;

static DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{4}-\d{2}-\d{2})\b").unwrap());
static DAYS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,4}$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// What to do with items that carry no usable timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UndatedPolicy {
    #[default]
    Exclude,
    Include,
}

impl HarvestWindow {
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, HarvestError> {
        if start >= end {
            return Err(HarvestError::config(format!(
                "window start {start} must be before end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// `[now - days, now)`.
    pub fn last_days(days: u32, now: DateTime<Utc>) -> Result<Self, HarvestError> {
        if days == 0 {
            return Err(HarvestError::config("--days must be at least 1"));
        }
        Self::between(now - Duration::days(i64::from(days)), now)
    }

    /// Calendar dates in UTC; `end` is inclusive so the window closes at the
    /// following midnight.
    pub fn from_dates(start: NaiveDate, end: NaiveDate) -> Result<Self, HarvestError> {
        let start = start.and_hms_opt(0, 0, 0).map(|d| d.and_utc());
        let end = end
            .succ_opt()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|d| d.and_utc());
        match (start, end) {
            (Some(start), Some(end)) => Self::between(start, end),
            _ => Err(HarvestError::config("date out of range")),
        }
    }

    /// Free-form period as typed into a chat:
    ///
    /// - `"30"`: last 30 days
    /// - `"2025-07-01 2025-08-27"` (any text around two dates): both dates inclusive,
    ///   order does not matter
    /// - `"2025-08-01"`: from that date until `now`
    /// - anything else: last `default_days`
    pub fn parse_period(
        text: &str,
        now: DateTime<Utc>,
        default_days: u32,
    ) -> Result<Self, HarvestError> {
        let s = text.trim().to_lowercase();
        if DAYS_RE.is_match(&s) {
            let days: u32 = s
                .parse()
                .map_err(|_| HarvestError::config(format!("bad day count {s:?}")))?;
            return Self::last_days(days, now);
        }

        let dates = DATE_RE
            .captures_iter(&s)
            .map(|c| parse_ymd(&c[1]))
            .collect::<Result<Vec<_>, _>>()?;
        match dates.as_slice() {
            [a, b, ..] => Self::from_dates(*a.min(b), *a.max(b)),
            [a] => {
                let start = a
                    .and_hms_opt(0, 0, 0)
                    .map(|d| d.and_utc())
                    .ok_or_else(|| HarvestError::config("date out of range"))?;
                Self::between(start, now)
            }
            [] => Self::last_days(default_days, now),
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts < self.end
    }

    /// Dates shown in headers and file names: first day and last (inclusive) day.
    pub fn display_dates(&self) -> (NaiveDate, NaiveDate) {
        let last = (self.end - Duration::days(1)).date_naive();
        let first = self.start.date_naive();
        (first, last.max(first))
    }
}

pub fn parse_ymd(s: &str) -> Result<NaiveDate, HarvestError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| HarvestError::config(format!("invalid date {s:?}: {e}")))
}

/// Outcome of the window check for one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowVerdict {
    Inside,
    Outside,
    Undated,
}

/// `true` iff `window.start <= item.published_at < window.end`.
/// Items without a timestamp never match.
pub fn matches(item: &Item, window: &HarvestWindow) -> bool {
    item.published_at.is_some_and(|ts| window.contains(ts))
}

/// Like [`matches`] but distinguishes undated items and applies `policy` to them.
pub fn classify(item: &Item, window: &HarvestWindow, policy: UndatedPolicy) -> WindowVerdict {
    match item.published_at {
        Some(ts) if window.contains(ts) => WindowVerdict::Inside,
        Some(_) => WindowVerdict::Outside,
        None if policy == UndatedPolicy::Include => WindowVerdict::Inside,
        None => WindowVerdict::Undated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ItemPayload;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 27, 12, 0, 0).unwrap()
    }

    fn at(ts: Option<DateTime<Utc>>) -> Item {
        Item {
            source_id: "s".into(),
            external_id: "1".into(),
            published_at: ts,
            title: None,
            body: String::new(),
            url: None,
            raw_payload: ItemPayload::ChannelPost {
                channel: "s".into(),
                message_id: 1,
            },
        }
    }

    #[test]
    fn test_boundaries_half_open() {
        let w = HarvestWindow::last_days(30, now()).unwrap();
        assert!(matches(&at(Some(w.start)), &w));
        assert!(!matches(&at(Some(w.end)), &w));
        assert!(matches(&at(Some(w.end - Duration::seconds(1))), &w));
        assert!(!matches(&at(Some(w.start - Duration::seconds(1))), &w));
    }

    #[test]
    fn test_undated_excluded_by_default() {
        let w = HarvestWindow::last_days(1, now()).unwrap();
        assert!(!matches(&at(None), &w));
        assert_eq!(
            classify(&at(None), &w, UndatedPolicy::Exclude),
            WindowVerdict::Undated
        );
        assert_eq!(
            classify(&at(None), &w, UndatedPolicy::Include),
            WindowVerdict::Inside
        );
    }

    #[test]
    fn test_invalid_windows_rejected() {
        assert!(HarvestWindow::last_days(0, now()).is_err());
        assert!(HarvestWindow::between(now(), now()).is_err());
    }

    #[test]
    fn test_parse_period_days() {
        let w = HarvestWindow::parse_period(" 7 ", now(), 30).unwrap();
        assert_eq!(w.end, now());
        assert_eq!(w.start, now() - Duration::days(7));
    }

    #[test]
    fn test_parse_period_two_dates_inclusive_any_order() {
        let w = HarvestWindow::parse_period("с 2025-08-27 по 2025-07-01", now(), 30).unwrap();
        assert_eq!(w.start, Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap());
        assert_eq!(w.end, Utc.with_ymd_and_hms(2025, 8, 28, 0, 0, 0).unwrap());
        let (first, last) = w.display_dates();
        assert_eq!(first.to_string(), "2025-07-01");
        assert_eq!(last.to_string(), "2025-08-27");
    }

    #[test]
    fn test_parse_period_single_date_until_now() {
        let w = HarvestWindow::parse_period("2025-08-01", now(), 30).unwrap();
        assert_eq!(w.start, Utc.with_ymd_and_hms(2025, 8, 1, 0, 0, 0).unwrap());
        assert_eq!(w.end, now());
    }

    #[test]
    fn test_parse_period_fallback_and_bad_date() {
        let w = HarvestWindow::parse_period("whenever", now(), 30).unwrap();
        assert_eq!(w.start, now() - Duration::days(30));
        assert!(HarvestWindow::parse_period("2025-13-40", now(), 30).is_err());
    }
}
