//! Time-bucketed commit activity for trend charts.

use std::collections::HashSet;
use std::fmt;
use std::io::Write;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveTime, TimeDelta, Utc};
use gitrisk_core::GitriskError;
use serde::{Deserialize, Serialize};

use crate::table::{CommitRecord, CommitTable};

/// Calendar unit of a [`Timeslot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotUnit {
    /// 24 hours.
    Day,
    /// 7 days.
    Week,
    /// One calendar month.
    Month,
}

/// Bucket width such as `2W`, `7D` or `1M`.
///
/// # Examples
///
/// ```
/// use gitrisk_history::timeline::{SlotUnit, Timeslot};
///
/// let slot: Timeslot = "2W".parse().unwrap();
/// assert_eq!(slot.count(), 2);
/// assert_eq!(slot.unit(), SlotUnit::Week);
/// assert!("0D".parse::<Timeslot>().is_err());
/// assert!("3Y".parse::<Timeslot>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeslot {
    count: u32,
    unit: SlotUnit,
}

impl Timeslot {
    /// A slot of `count` units.
    ///
    /// # Errors
    ///
    /// Returns [`GitriskError::Config`] if `count` is zero.
    pub fn new(count: u32, unit: SlotUnit) -> Result<Self, GitriskError> {
        if count == 0 {
            return Err(GitriskError::Config("timeslot count must be at least 1".into()));
        }
        Ok(Self { count, unit })
    }

    /// Number of units per bucket.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Unit of each bucket.
    pub fn unit(&self) -> SlotUnit {
        self.unit
    }

    fn anchor(&self, first: DateTime<Utc>) -> DateTime<Utc> {
        let day = first.date_naive();
        let day = match self.unit {
            SlotUnit::Day | SlotUnit::Week => day,
            SlotUnit::Month => NaiveDate::from_ymd_opt(day.year(), day.month(), 1).unwrap_or(day),
        };
        day.and_time(NaiveTime::MIN).and_utc()
    }

    fn advance(&self, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let count = i64::from(self.count);
        match self.unit {
            SlotUnit::Day => start.checked_add_signed(TimeDelta::try_days(count)?),
            SlotUnit::Week => start.checked_add_signed(TimeDelta::try_weeks(count)?),
            SlotUnit::Month => start.checked_add_months(Months::new(self.count)),
        }
    }
}

impl Default for Timeslot {
    fn default() -> Self {
        Self {
            count: 2,
            unit: SlotUnit::Week,
        }
    }
}

impl fmt::Display for Timeslot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match self.unit {
            SlotUnit::Day => 'D',
            SlotUnit::Week => 'W',
            SlotUnit::Month => 'M',
        };
        write!(f, "{}{unit}", self.count)
    }
}

impl FromStr for Timeslot {
    type Err = GitriskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let bad = || GitriskError::Config(format!("invalid timeslot '{s}' (expected e.g. 2W, 7D, 1M)"));
        let split = s.len().checked_sub(1).filter(|i| s.is_char_boundary(*i)).ok_or_else(bad)?;
        let (digits, unit) = s.split_at(split);
        let unit = match unit.to_ascii_uppercase().as_str() {
            "D" => SlotUnit::Day,
            "W" => SlotUnit::Week,
            "M" => SlotUnit::Month,
            _ => return Err(bad()),
        };
        let count = if digits.is_empty() {
            1
        } else {
            digits.parse::<u32>().map_err(|_| bad())?
        };
        Self::new(count, unit)
    }
}

/// Commit activity within one bucket `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeBucket {
    /// Inclusive bucket start.
    pub start: DateTime<Utc>,
    /// Exclusive bucket end.
    pub end: DateTime<Utc>,
    /// Commits in the bucket.
    pub commits: u32,
    /// Distinct authors in the bucket.
    pub authors: u32,
    /// Lines added.
    pub insertions: u64,
    /// Lines removed.
    pub deletions: u64,
    /// `insertions - deletions`.
    pub net_lines: i64,
}

/// Bucket commits by time, from the earliest commit to the latest.
///
/// Buckets are contiguous, so quiet periods appear as zero rows. Day and
/// week buckets start at midnight UTC of the earliest commit's day; month
/// buckets start on the first of its month.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use gitrisk_history::table::{CommitRecord, CommitTable, Detail};
/// use gitrisk_history::timeline::timeline;
///
/// let commit = |h: &str, day: u32| CommitRecord {
///     hash: h.into(),
///     author: "alice".into(),
///     timestamp: Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap(),
///     insertions: 10,
///     deletions: 2,
///     files: vec![],
/// };
/// let table = CommitTable::new(vec![commit("a", 1), commit("b", 20)], Detail::Summary).unwrap();
/// let buckets = timeline(&table, "1W".parse().unwrap());
/// assert_eq!(buckets.len(), 3);
/// assert_eq!(buckets[1].commits, 0);
/// ```
pub fn timeline(table: &CommitTable, slot: Timeslot) -> Vec<TimeBucket> {
    let mut rows: Vec<&CommitRecord> = table.rows().iter().collect();
    rows.sort_by_key(|r| r.timestamp);
    let (Some(first), Some(last)) = (rows.first(), rows.last()) else {
        return Vec::new();
    };
    let last = last.timestamp;

    let mut buckets = Vec::new();
    let mut start = slot.anchor(first.timestamp);
    let mut pending = rows.iter().peekable();

    while start <= last {
        let Some(end) = slot.advance(start) else {
            break;
        };
        let mut bucket = TimeBucket {
            start,
            end,
            commits: 0,
            authors: 0,
            insertions: 0,
            deletions: 0,
            net_lines: 0,
        };
        let mut authors = HashSet::new();
        while let Some(row) = pending.next_if(|r| r.timestamp < end) {
            bucket.commits += 1;
            bucket.insertions = bucket.insertions.saturating_add(row.insertions);
            bucket.deletions = bucket.deletions.saturating_add(row.deletions);
            authors.insert(row.author.as_str());
        }
        bucket.authors = u32::try_from(authors.len()).unwrap_or(u32::MAX);
        bucket.net_lines = net(bucket.insertions, bucket.deletions);
        buckets.push(bucket);
        start = end;
    }
    buckets
}

pub(crate) fn net(insertions: u64, deletions: u64) -> i64 {
    i64::try_from(insertions)
        .unwrap_or(i64::MAX)
        .saturating_sub(i64::try_from(deletions).unwrap_or(i64::MAX))
}

/// Write timeline buckets as CSV.
///
/// # Errors
///
/// Returns [`GitriskError::Csv`] on write failure.
pub fn write_timeline_csv<W: Write>(buckets: &[TimeBucket], writer: W) -> Result<(), GitriskError> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record([
        "start",
        "end",
        "commits",
        "authors",
        "insertions",
        "deletions",
        "net_lines",
    ])?;
    for b in buckets {
        out.write_record([
            b.start.to_rfc3339(),
            b.end.to_rfc3339(),
            b.commits.to_string(),
            b.authors.to_string(),
            b.insertions.to_string(),
            b.deletions.to_string(),
            b.net_lines.to_string(),
        ])?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Detail;
    use chrono::TimeZone;

    fn commit(hash: &str, author: &str, ts: DateTime<Utc>, ins: u64, del: u64) -> CommitRecord {
        CommitRecord {
            hash: hash.into(),
            author: author.into(),
            timestamp: ts,
            insertions: ins,
            deletions: del,
            files: Vec::new(),
        }
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn parses_timeslots() {
        assert_eq!("7D".parse::<Timeslot>().unwrap(), Timeslot::new(7, SlotUnit::Day).unwrap());
        assert_eq!("1m".parse::<Timeslot>().unwrap(), Timeslot::new(1, SlotUnit::Month).unwrap());
        assert_eq!("W".parse::<Timeslot>().unwrap(), Timeslot::new(1, SlotUnit::Week).unwrap());
        assert!("".parse::<Timeslot>().is_err());
        assert!("xW".parse::<Timeslot>().is_err());
        assert!("2週".parse::<Timeslot>().is_err());
    }

    #[test]
    fn display_round_trips() {
        let slot: Timeslot = "3M".parse().unwrap();
        assert_eq!(slot.to_string(), "3M");
    }

    #[test]
    fn empty_table_gives_no_buckets() {
        let table = CommitTable::new(Vec::new(), Detail::Summary).unwrap();
        assert!(timeline(&table, Timeslot::default()).is_empty());
    }

    #[test]
    fn daily_buckets_sum_activity() {
        let table = CommitTable::new(
            vec![
                commit("a", "alice", at(2024, 3, 1, 9), 10, 1),
                commit("b", "bob", at(2024, 3, 1, 18), 5, 5),
                commit("c", "alice", at(2024, 3, 3, 1), 1, 4),
            ],
            Detail::Summary,
        )
        .unwrap();
        let buckets = timeline(&table, "1D".parse().unwrap());
        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets[0].start, at(2024, 3, 1, 0));
        assert_eq!(buckets[0].commits, 2);
        assert_eq!(buckets[0].authors, 2);
        assert_eq!(buckets[0].insertions, 15);
        assert_eq!(buckets[0].net_lines, 9);
        assert_eq!(buckets[1].commits, 0);
        assert_eq!(buckets[2].net_lines, -3);
    }

    #[test]
    fn monthly_buckets_align_to_first_of_month() {
        let table = CommitTable::new(
            vec![
                commit("b", "bob", at(2024, 4, 2, 0), 1, 0),
                commit("a", "alice", at(2024, 1, 31, 23), 1, 0),
            ],
            Detail::Summary,
        )
        .unwrap();
        let buckets = timeline(&table, "1M".parse().unwrap());
        let starts: Vec<_> = buckets.iter().map(|b| b.start).collect();
        assert_eq!(
            starts,
            vec![
                at(2024, 1, 1, 0),
                at(2024, 2, 1, 0),
                at(2024, 3, 1, 0),
                at(2024, 4, 1, 0)
            ]
        );
        assert_eq!(buckets.iter().map(|b| b.commits).sum::<u32>(), 2);
    }

    #[test]
    fn huge_line_counts_saturate_within_a_bucket() {
        let table = CommitTable::new(
            vec![
                commit("b", "x", at(2024, 1, 1, 9), u64::MAX, 2),
                commit("a", "x", at(2024, 1, 1, 8), u64::MAX, 0),
            ],
            Detail::Summary,
        )
        .unwrap();
        let buckets = timeline(&table, "1D".parse().unwrap());
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].insertions, u64::MAX);
        assert_eq!(buckets[0].deletions, 2);
        assert_eq!(buckets[0].net_lines, i64::MAX - 2);
    }

    #[test]
    fn every_commit_lands_in_exactly_one_bucket() {
        let rows: Vec<_> = (0..40)
            .map(|i| commit(&format!("h{i}"), "x", at(2024, 1, 1, 0) + TimeDelta::hours(i * 17), 1, 0))
            .collect();
        let table = CommitTable::new(rows, Detail::Summary).unwrap();
        let buckets = timeline(&table, "2W".parse().unwrap());
        assert_eq!(buckets.iter().map(|b| b.commits).sum::<u32>(), 40);
        for pair in buckets.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn csv_has_one_line_per_bucket() {
        let table = CommitTable::new(
            vec![commit("a", "alice", at(2024, 3, 1, 9), 3, 1)],
            Detail::Summary,
        )
        .unwrap();
        let mut buf = Vec::new();
        write_timeline_csv(&timeline(&table, "1D".parse().unwrap()), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.lines().nth(1).unwrap().ends_with(",1,1,3,1,2"));
    }
}
