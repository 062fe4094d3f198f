//! Time-window resolution.
//!
//! Turns the user's `since` / `until` / month-count parameters into a
//! concrete half-open interval used to select commits.

use chrono::{DateTime, Months, NaiveDate, NaiveTime, Utc};
use gitrisk_core::GitriskError;
use serde::{Deserialize, Serialize};

/// Window length used when no month count is given.
pub const DEFAULT_MONTHS: u32 = 6;

/// A half-open time interval `[start, end)`.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use gitrisk_history::duration::Duration;
///
/// let since = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
/// let until = Utc.with_ymd_and_hms(2020, 6, 1, 0, 0, 0).unwrap();
/// let d = Duration::range(since, until).unwrap();
/// assert!(d.contains(since));
/// assert!(!d.contains(until));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Duration {
    /// Inclusive lower bound.
    pub start: DateTime<Utc>,
    /// Exclusive upper bound.
    pub end: DateTime<Utc>,
}

impl Duration {
    /// Exactly `[since, until)`.
    ///
    /// # Errors
    ///
    /// Returns [`GitriskError::InvalidRange`] unless `since < until`.
    pub fn range(since: DateTime<Utc>, until: DateTime<Utc>) -> Result<Self, GitriskError> {
        if since >= until {
            return Err(GitriskError::InvalidRange(format!(
                "since ({}) must be before until ({})",
                since.to_rfc3339(),
                until.to_rfc3339()
            )));
        }
        Ok(Self {
            start: since,
            end: until,
        })
    }

    /// `[since, since + months)`.
    ///
    /// # Errors
    ///
    /// Returns [`GitriskError::InvalidRange`] if `months` is zero or the
    /// end overflows the calendar.
    pub fn months_after(since: DateTime<Utc>, months: u32) -> Result<Self, GitriskError> {
        let end = since
            .checked_add_months(Months::new(months))
            .ok_or_else(|| overflow(months))?;
        Self::range(since, end)
    }

    /// `[until - months, until)`.
    ///
    /// # Errors
    ///
    /// Returns [`GitriskError::InvalidRange`] if `months` is zero or the
    /// start underflows the calendar.
    pub fn months_before(until: DateTime<Utc>, months: u32) -> Result<Self, GitriskError> {
        let start = until
            .checked_sub_months(Months::new(months))
            .ok_or_else(|| overflow(months))?;
        Self::range(start, until)
    }

    /// Whether `timestamp` falls inside `[start, end)`.
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.start <= timestamp && timestamp < self.end
    }
}

fn overflow(months: u32) -> GitriskError {
    GitriskError::InvalidRange(format!("{months} months is outside the supported calendar"))
}

/// Resolve optional window parameters into a [`Duration`].
///
/// Rules, first match wins:
/// 1. `since` and `until` → `[since, until)`
/// 2. `since` and `months` → `[since, since + months)`
/// 3. `since` only → `[since, since + 6 months)`
/// 4. `months` only → `[now - months, now)`
/// 5. nothing → `[now - 6 months, now)`
///
/// An `until` without `since` does not match any rule and is ignored.
///
/// # Errors
///
/// Returns [`GitriskError::InvalidRange`] if `months <= 0` or if
/// `since >= until`.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use gitrisk_history::duration::resolve;
///
/// let now = Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap();
/// let d = resolve(None, None, Some(3), now).unwrap();
/// assert_eq!(d.start, Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap());
/// assert_eq!(d.end, now);
///
/// assert!(resolve(None, None, Some(0), now).is_err());
/// ```
pub fn resolve(
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    months: Option<i64>,
    now: DateTime<Utc>,
) -> Result<Duration, GitriskError> {
    let months = months.map(validate_months).transpose()?;

    match (since, until, months) {
        (Some(since), Some(until), _) => Duration::range(since, until),
        (Some(since), None, Some(m)) => Duration::months_after(since, m),
        (Some(since), None, None) => Duration::months_after(since, DEFAULT_MONTHS),
        (None, _, Some(m)) => Duration::months_before(now, m),
        (None, _, None) => Duration::months_before(now, DEFAULT_MONTHS),
    }
}

fn validate_months(months: i64) -> Result<u32, GitriskError> {
    if months <= 0 {
        return Err(GitriskError::InvalidRange(format!(
            "month count must be positive, got {months}"
        )));
    }
    u32::try_from(months)
        .map_err(|_| GitriskError::InvalidRange(format!("month count {months} is too large")))
}

/// Parse a CLI date: either `YYYY-MM-DD` (midnight UTC) or RFC 3339.
///
/// # Errors
///
/// Returns [`GitriskError::InvalidRange`] if the text is neither form.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use gitrisk_history::duration::parse_date;
///
/// let d = parse_date("2020-06-01").unwrap();
/// assert_eq!(d, Utc.with_ymd_and_hms(2020, 6, 1, 0, 0, 0).unwrap());
///
/// let t = parse_date("2020-06-01T09:30:00+09:00").unwrap();
/// assert_eq!(t, Utc.with_ymd_and_hms(2020, 6, 1, 0, 30, 0).unwrap());
/// ```
pub fn parse_date(text: &str) -> Result<DateTime<Utc>, GitriskError> {
    let text = text.trim();
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN).and_utc());
    }
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            GitriskError::InvalidRange(format!(
                "'{text}' is not a date (expected YYYY-MM-DD or RFC 3339): {e}"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn since_and_until_give_exact_range() {
        let d = resolve(Some(at(2020, 1, 1)), Some(at(2020, 3, 15)), None, at(2024, 1, 1)).unwrap();
        assert_eq!(d.start, at(2020, 1, 1));
        assert_eq!(d.end, at(2020, 3, 15));
    }

    #[test]
    fn since_and_until_win_over_months() {
        let d = resolve(
            Some(at(2020, 1, 1)),
            Some(at(2020, 2, 1)),
            Some(12),
            at(2024, 1, 1),
        )
        .unwrap();
        assert_eq!(d.end, at(2020, 2, 1));
    }

    #[test]
    fn reversed_range_is_rejected() {
        let result = resolve(Some(at(2020, 6, 1)), Some(at(2020, 1, 1)), None, at(2024, 1, 1));
        assert!(matches!(result, Err(GitriskError::InvalidRange(_))));
    }

    #[test]
    fn equal_bounds_are_rejected() {
        let result = resolve(Some(at(2020, 6, 1)), Some(at(2020, 6, 1)), None, at(2024, 1, 1));
        assert!(matches!(result, Err(GitriskError::InvalidRange(_))));
    }

    #[test]
    fn since_with_months_spans_calendar_months() {
        for months in 1..=24 {
            let since = at(2019, 11, 30);
            let d = resolve(Some(since), None, Some(months), at(2024, 1, 1)).unwrap();
            assert_eq!(d.start, since);
            assert_eq!(
                d.end,
                since.checked_add_months(Months::new(months as u32)).unwrap()
            );
        }
    }

    #[test]
    fn since_alone_defaults_to_six_months() {
        let d = resolve(Some(at(2020, 1, 15)), None, None, at(2024, 1, 1)).unwrap();
        assert_eq!(d.end, at(2020, 7, 15));
    }

    #[test]
    fn months_alone_ends_now() {
        let now = at(2024, 5, 20);
        let d = resolve(None, None, Some(2), now).unwrap();
        assert_eq!(d.start, at(2024, 3, 20));
        assert_eq!(d.end, now);
    }

    #[test]
    fn nothing_gives_last_six_months() {
        let now = at(2024, 8, 1);
        let d = resolve(None, None, None, now).unwrap();
        assert_eq!(d.start, at(2024, 2, 1));
        assert_eq!(d.end, now);
    }

    #[test]
    fn until_alone_is_ignored() {
        let now = at(2024, 8, 1);
        let d = resolve(None, Some(at(2010, 1, 1)), None, now).unwrap();
        assert_eq!(d.end, now);
    }

    #[test]
    fn non_positive_months_are_rejected() {
        let now = at(2024, 8, 1);
        assert!(matches!(
            resolve(None, None, Some(0), now),
            Err(GitriskError::InvalidRange(_))
        ));
        assert!(matches!(
            resolve(Some(at(2020, 1, 1)), None, Some(-3), now),
            Err(GitriskError::InvalidRange(_))
        ));
    }

    #[test]
    fn contains_is_half_open() {
        let d = Duration::range(at(2020, 1, 1), at(2020, 2, 1)).unwrap();
        assert!(d.contains(at(2020, 1, 1)));
        assert!(d.contains(at(2020, 1, 31)));
        assert!(!d.contains(at(2020, 2, 1)));
        assert!(!d.contains(at(2019, 12, 31)));
    }

    #[test]
    fn parse_date_rejects_garbage() {
        assert!(parse_date("yesterday").is_err());
        assert!(parse_date("2020-13-01").is_err());
    }
}
