//! Whole-history summary statistics.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::table::{CommitTable, Detail};
use crate::timeline::net;

/// Commits attributed to one author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorShare {
    /// Author identity.
    pub author: String,
    /// Commits by this author.
    pub commits: u32,
}

/// Totals over a commit table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    /// Earliest commit time.
    pub since: Option<DateTime<Utc>>,
    /// Latest commit time.
    pub until: Option<DateTime<Utc>>,
    /// Number of commits.
    pub commits: u32,
    /// Number of distinct authors.
    pub authors: u32,
    /// Distinct files touched; `None` for summary-mode tables.
    pub files: Option<u32>,
    /// Lines added, saturating at `u64::MAX`.
    pub insertions: u64,
    /// Lines removed.
    pub deletions: u64,
    /// `insertions - deletions`.
    pub net_lines: i64,
    /// `deletions / insertions`, or 0 with no insertions.
    pub refactoring_ratio: f64,
    /// Authors by commit count descending, then name.
    pub top_authors: Vec<AuthorShare>,
}

/// Summarize a commit table.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use gitrisk_history::summary::summarize;
/// use gitrisk_history::table::{CommitRecord, CommitTable, Detail};
///
/// let commit = |h: &str, a: &str| CommitRecord {
///     hash: h.into(),
///     author: a.into(),
///     timestamp: Utc::now(),
///     insertions: 8,
///     deletions: 2,
///     files: vec!["lib.rs".into()],
/// };
/// let table = CommitTable::new(vec![commit("1", "ann"), commit("2", "ann"), commit("3", "bo")], Detail::Full).unwrap();
/// let summary = summarize(&table);
/// assert_eq!(summary.commits, 3);
/// assert_eq!(summary.top_authors[0].author, "ann");
/// assert_eq!(summary.files, Some(1));
/// ```
pub fn summarize(table: &CommitTable) -> Summary {
    let mut by_author: BTreeMap<&str, u32> = BTreeMap::new();
    let mut files: HashSet<&str> = HashSet::new();
    let mut insertions = 0u64;
    let mut deletions = 0u64;

    for row in table.rows() {
        *by_author.entry(row.author.as_str()).or_default() += 1;
        files.extend(row.files.iter().map(String::as_str));
        insertions = insertions.saturating_add(row.insertions);
        deletions = deletions.saturating_add(row.deletions);
    }

    let mut top_authors: Vec<AuthorShare> = by_author
        .into_iter()
        .map(|(author, commits)| AuthorShare {
            author: author.to_string(),
            commits,
        })
        .collect();
    // Stable sort keeps the BTreeMap's name order among equal counts.
    top_authors.sort_by(|a, b| b.commits.cmp(&a.commits));

    let refactoring_ratio = if insertions == 0 {
        0.0
    } else {
        deletions as f64 / insertions as f64
    };

    Summary {
        since: table.rows().iter().map(|r| r.timestamp).min(),
        until: table.rows().iter().map(|r| r.timestamp).max(),
        commits: clamp(table.len()),
        authors: clamp(top_authors.len()),
        files: (table.detail() == Detail::Full).then(|| clamp(files.len())),
        insertions,
        deletions,
        net_lines: net(insertions, deletions),
        refactoring_ratio,
        top_authors,
    }
}

fn clamp(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::CommitRecord;
    use chrono::TimeZone;

    fn commit(hash: &str, author: &str, day: u32, ins: u64, del: u64) -> CommitRecord {
        CommitRecord {
            hash: hash.into(),
            author: author.into(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, day, 0, 0, 0).unwrap(),
            insertions: ins,
            deletions: del,
            files: Vec::new(),
        }
    }

    #[test]
    fn totals_and_bounds() {
        let table = CommitTable::new(
            vec![
                commit("a", "zed", 3, 100, 20),
                commit("b", "amy", 1, 0, 30),
                commit("c", "zed", 9, 10, 0),
            ],
            Detail::Summary,
        )
        .unwrap();
        let s = summarize(&table);
        assert_eq!(s.commits, 3);
        assert_eq!(s.authors, 2);
        assert_eq!(s.files, None);
        assert_eq!(s.insertions, 110);
        assert_eq!(s.deletions, 50);
        assert_eq!(s.net_lines, 60);
        assert!((s.refactoring_ratio - 50.0 / 110.0).abs() < 1e-9);
        assert_eq!(s.since, Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()));
        assert_eq!(s.until, Some(Utc.with_ymd_and_hms(2024, 5, 9, 0, 0, 0).unwrap()));
        assert_eq!(s.top_authors[0].author, "zed");
        assert_eq!(s.top_authors[0].commits, 2);
    }

    #[test]
    fn ties_are_ordered_by_name() {
        let table = CommitTable::new(
            vec![commit("a", "mo", 1, 1, 1), commit("b", "al", 2, 1, 1)],
            Detail::Summary,
        )
        .unwrap();
        let names: Vec<_> = summarize(&table)
            .top_authors
            .into_iter()
            .map(|a| a.author)
            .collect();
        assert_eq!(names, vec!["al", "mo"]);
    }

    #[test]
    fn huge_line_counts_saturate() {
        let table = CommitTable::new(
            vec![
                commit("a", "amy", 1, u64::MAX, u64::MAX),
                commit("b", "amy", 2, u64::MAX, 1),
            ],
            Detail::Summary,
        )
        .unwrap();
        let s = summarize(&table);
        assert_eq!(s.insertions, u64::MAX);
        assert_eq!(s.deletions, u64::MAX);
        assert_eq!(s.net_lines, 0);
        assert_eq!(s.refactoring_ratio, 1.0);
    }

    #[test]
    fn empty_table_summary() {
        let s = summarize(&CommitTable::new(Vec::new(), Detail::Summary).unwrap());
        assert_eq!(s.commits, 0);
        assert_eq!(s.since, None);
        assert_eq!(s.refactoring_ratio, 0.0);
        assert!(s.top_authors.is_empty());
    }
}
