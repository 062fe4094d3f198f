//! Change-frequency × contributor-spread hotspot scoring.
//!
//! A file touched often by many different people is riskier than one
//! touched often by a single owner. Each file gets a score combining its
//! distinct commit count and distinct author count.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::io::Write;

use chrono::{DateTime, Utc};
use gitrisk_core::GitriskError;
use serde::{Deserialize, Serialize};

use crate::table::FileChangeTable;

/// One file in the hotspot report.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use gitrisk_history::hotspots::HotspotRow;
///
/// let row = HotspotRow {
///     file_name: "src/auth.rs".into(),
///     commits: 12,
///     authors: 4,
///     hotspot: 48.0,
///     last_modified: Utc::now(),
/// };
/// assert!(row.hotspot > 0.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotspotRow {
    /// File path.
    pub file_name: String,
    /// Distinct commits touching the file.
    pub commits: u32,
    /// Distinct authors touching the file.
    pub authors: u32,
    /// Combined risk score, see [`hotspot_score`].
    pub hotspot: f64,
    /// Most recent change to the file.
    pub last_modified: DateTime<Utc>,
}

/// Combine commit and author counts into a score.
///
/// `max(commits, 1) × max(authors, 1)`, or `0` when both are zero.
/// Non-decreasing in each argument, and positive whenever either is.
///
/// # Examples
///
/// ```
/// use gitrisk_history::hotspots::hotspot_score;
///
/// assert_eq!(hotspot_score(10, 3), 30.0);
/// assert_eq!(hotspot_score(5, 0), 5.0);
/// assert_eq!(hotspot_score(0, 0), 0.0);
/// ```
pub fn hotspot_score(commits: u32, authors: u32) -> f64 {
    if commits == 0 && authors == 0 {
        return 0.0;
    }
    f64::from(commits.max(1)) * f64::from(authors.max(1))
}

#[derive(Default)]
struct FileStats<'a> {
    hashes: HashSet<&'a str>,
    authors: HashSet<&'a str>,
    last_modified: Option<DateTime<Utc>>,
}

/// Aggregate per-file change events into a ranked hotspot report.
///
/// Rows are sorted by `hotspot` descending, then `file_name` ascending.
/// An empty table yields an empty report.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use gitrisk_history::hotspots::aggregate;
/// use gitrisk_history::table::{FileChangeRecord, FileChangeTable};
///
/// let ev = |h: &str, a: &str, f: &str| FileChangeRecord {
///     hash: h.into(),
///     author: a.into(),
///     timestamp: Utc::now(),
///     file_name: f.into(),
/// };
/// let table = FileChangeTable::from_records(vec![
///     ev("c1", "alice", "a.rs"),
///     ev("c2", "bob", "a.rs"),
///     ev("c2", "bob", "b.rs"),
/// ]);
/// let report = aggregate(&table);
/// assert_eq!(report[0].file_name, "a.rs");
/// assert_eq!(report[0].authors, 2);
/// ```
pub fn aggregate(table: &FileChangeTable) -> Vec<HotspotRow> {
    let mut stats: BTreeMap<&str, FileStats<'_>> = BTreeMap::new();

    for row in table.rows() {
        let entry = stats.entry(row.file_name.as_str()).or_default();
        entry.hashes.insert(row.hash.as_str());
        entry.authors.insert(row.author.as_str());
        entry.last_modified = Some(match entry.last_modified {
            Some(t) if t >= row.timestamp => t,
            _ => row.timestamp,
        });
    }

    let mut report: Vec<HotspotRow> = stats
        .into_iter()
        .filter_map(|(file_name, s)| {
            let commits = count(s.hashes.len());
            let authors = count(s.authors.len());
            Some(HotspotRow {
                file_name: file_name.to_string(),
                commits,
                authors,
                hotspot: hotspot_score(commits, authors),
                last_modified: s.last_modified?,
            })
        })
        .collect();

    report.sort_by(compare_rows);
    tracing::debug!(files = report.len(), "aggregated hotspots");
    report
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

fn compare_rows(a: &HotspotRow, b: &HotspotRow) -> Ordering {
    b.hotspot
        .total_cmp(&a.hotspot)
        .then_with(|| a.file_name.cmp(&b.file_name))
}

/// Write a hotspot report as CSV
/// (`file_name,commits,authors,hotspot,last_modified`).
///
/// # Errors
///
/// Returns [`GitriskError::Csv`] on write failure.
pub fn write_hotspots_csv<W: Write>(rows: &[HotspotRow], writer: W) -> Result<(), GitriskError> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(["file_name", "commits", "authors", "hotspot", "last_modified"])?;
    for row in rows {
        out.write_record([
            row.file_name.clone(),
            row.commits.to_string(),
            row.authors.to_string(),
            format!("{:.2}", row.hotspot),
            row.last_modified.to_rfc3339(),
        ])?;
    }
    out.flush()?;
    Ok(())
}
