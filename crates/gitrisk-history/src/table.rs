//! In-memory commit tables.
//!
//! A [`CommitTable`] holds one row per commit and is what history mining
//! produces and what CSV sources load into. Reports that work per file
//! first [`expand`](CommitTable::expand) it into a [`FileChangeTable`].
//! Every operation returns a new table and leaves its input untouched.

use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use gitrisk_core::GitriskError;
use serde::{Deserialize, Serialize};

use crate::duration::{parse_date, Duration};
use crate::filter::FileFilter;

/// Columns every commit source must provide.
pub const REQUIRED_COLUMNS: [&str; 5] = ["hash", "author", "timestamp", "insertions", "deletions"];

/// Column holding the JSON-encoded list of touched paths.
pub const FILES_COLUMN: &str = "files";

/// One commit.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use gitrisk_history::table::CommitRecord;
///
/// let record = CommitRecord {
///     hash: "3f2a9c1d".into(),
///     author: "alice".into(),
///     timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
///     insertions: 12,
///     deletions: 4,
///     files: vec!["src/lib.rs".into(), "README.md".into()],
/// };
/// assert_eq!(record.files.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRecord {
    /// Commit identifier.
    pub hash: String,
    /// Author identity.
    pub author: String,
    /// Commit time in UTC.
    pub timestamp: DateTime<Utc>,
    /// Lines added.
    pub insertions: u64,
    /// Lines removed.
    pub deletions: u64,
    /// Paths touched, in commit order. Empty for summary-mode tables.
    pub files: Vec<String>,
}

/// One file touched by one commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChangeRecord {
    /// Parent commit identifier.
    pub hash: String,
    /// Parent commit author.
    pub author: String,
    /// Parent commit time.
    pub timestamp: DateTime<Utc>,
    /// The touched path.
    pub file_name: String,
}

/// How much detail a commit table carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Detail {
    /// Commit-level counts only; no file lists.
    Summary,
    /// File lists are populated for every commit.
    Full,
}

/// A named CSV input.
pub struct Source<'a> {
    name: String,
    reader: Box<dyn Read + 'a>,
}

impl<'a> Source<'a> {
    /// Wrap any reader, naming it for error messages.
    pub fn from_reader(name: impl Into<String>, reader: impl Read + 'a) -> Self {
        Self {
            name: name.into(),
            reader: Box::new(reader),
        }
    }

    /// Standard input.
    pub fn stdin() -> Self {
        Self::from_reader("<stdin>", io::stdin())
    }

    /// Name used when reporting load errors.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Source<'static> {
    /// Open a CSV file.
    ///
    /// # Errors
    ///
    /// Returns [`GitriskError::Load`] if the file cannot be opened.
    pub fn open(path: &Path) -> Result<Self, GitriskError> {
        let file = File::open(path)
            .map_err(|e| GitriskError::load(path.display().to_string(), e.to_string()))?;
        Ok(Self::from_reader(
            path.display().to_string(),
            BufReader::new(file),
        ))
    }
}

#[derive(Deserialize)]
struct CsvCommit {
    hash: String,
    author: String,
    timestamp: String,
    insertions: u64,
    deletions: u64,
    #[serde(default)]
    files: Option<String>,
}

/// A table of commits.
///
/// # Examples
///
/// ```
/// use gitrisk_history::table::{CommitTable, Detail, Source};
///
/// let csv = "hash,author,timestamp,insertions,deletions,files\n\
///            a1,alice,2024-01-02T10:00:00Z,5,1,\"[\"\"src/a.rs\"\",\"\"src/b.rs\"\"]\"\n";
/// let table = CommitTable::load(vec![Source::from_reader("inline", csv.as_bytes())]).unwrap();
/// assert_eq!(table.detail(), Detail::Full);
/// assert_eq!(table.expand().unwrap().len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitTable {
    rows: Vec<CommitRecord>,
    detail: Detail,
}

impl CommitTable {
    /// Build a table from records already in memory.
    ///
    /// Full detail requires every record to list at least one file.
    ///
    /// # Errors
    ///
    /// Returns [`GitriskError::Load`] if a record has an empty hash, or a
    /// full-detail record lists no files.
    pub fn new(rows: Vec<CommitRecord>, detail: Detail) -> Result<Self, GitriskError> {
        for row in &rows {
            validate(row, detail).map_err(|msg| GitriskError::load("<memory>", msg))?;
        }
        Ok(Self { rows, detail })
    }

    /// Load and concatenate one or more CSV sources.
    ///
    /// The table has [`Detail::Full`] only if every source has a `files`
    /// column. A hash seen in an earlier source is skipped.
    ///
    /// # Errors
    ///
    /// Returns [`GitriskError::Load`] naming the offending source if none
    /// are given, a source is empty, a required column is missing, or a row
    /// does not parse.
    pub fn load<'a>(sources: impl IntoIterator<Item = Source<'a>>) -> Result<Self, GitriskError> {
        let mut rows = Vec::new();
        let mut seen = HashSet::new();
        let mut all_full = true;
        let mut count = 0usize;

        for source in sources {
            count += 1;
            let (loaded, has_files) = read_source(source)?;
            all_full &= has_files;
            for row in loaded {
                if seen.insert(row.hash.clone()) {
                    rows.push(row);
                } else {
                    tracing::debug!(hash = %row.hash, "skipping duplicate commit");
                }
            }
        }

        if count == 0 {
            return Err(GitriskError::load("<none>", "no commit sources given"));
        }

        let detail = if all_full {
            Detail::Full
        } else {
            if rows.iter().any(|r| !r.files.is_empty()) {
                tracing::warn!("some sources lack a `files` column; file details dropped");
            }
            for row in &mut rows {
                row.files.clear();
            }
            Detail::Summary
        };

        tracing::debug!(commits = rows.len(), sources = count, ?detail, "loaded commit table");
        Ok(Self { rows, detail })
    }

    /// Detail level of this table.
    pub fn detail(&self) -> Detail {
        self.detail
    }

    /// Commits, in source order.
    pub fn rows(&self) -> &[CommitRecord] {
        &self.rows
    }

    /// Number of commits.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no commits.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Keep only commits whose timestamp lies in `duration`.
    pub fn filter_by_duration(&self, duration: &Duration) -> Self {
        Self {
            rows: self
                .rows
                .iter()
                .filter(|r| duration.contains(r.timestamp))
                .cloned()
                .collect(),
            detail: self.detail,
        }
    }

    /// Narrow each commit's file list to paths passing `filter`, dropping
    /// commits left with no files. Line counts stay commit-level.
    ///
    /// # Errors
    ///
    /// Returns [`GitriskError::Expansion`] on a summary-mode table.
    pub fn filter_commit_files(&self, filter: &FileFilter) -> Result<Self, GitriskError> {
        self.require_full()?;
        let rows = self
            .rows
            .iter()
            .filter_map(|r| {
                let files: Vec<String> = r
                    .files
                    .iter()
                    .filter(|f| filter.matches(f))
                    .cloned()
                    .collect();
                (!files.is_empty()).then(|| CommitRecord {
                    files,
                    ..r.clone()
                })
            })
            .collect();
        Ok(Self {
            rows,
            detail: Detail::Full,
        })
    }

    /// Expand every commit into one row per distinct touched file.
    ///
    /// # Errors
    ///
    /// Returns [`GitriskError::Expansion`] if the table was loaded without
    /// file details.
    pub fn expand(&self) -> Result<FileChangeTable, GitriskError> {
        self.require_full()?;
        let mut rows = Vec::new();
        for commit in &self.rows {
            let mut seen = HashSet::new();
            for file in &commit.files {
                if !seen.insert(file.as_str()) {
                    continue;
                }
                rows.push(FileChangeRecord {
                    hash: commit.hash.clone(),
                    author: commit.author.clone(),
                    timestamp: commit.timestamp,
                    file_name: file.clone(),
                });
            }
        }
        Ok(FileChangeTable { rows })
    }

    fn require_full(&self) -> Result<(), GitriskError> {
        match self.detail {
            Detail::Full => Ok(()),
            Detail::Summary => Err(GitriskError::Expansion(
                "history has no per-file data; re-extract it with `log --full`".into(),
            )),
        }
    }

    /// Write the table as CSV. The `files` column is written only for
    /// full-detail tables.
    ///
    /// # Errors
    ///
    /// Returns [`GitriskError::Csv`] or [`GitriskError::Serialization`] on
    /// write failure.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), GitriskError> {
        let mut out = csv::Writer::from_writer(writer);
        let mut header = REQUIRED_COLUMNS.to_vec();
        header.push("files_count");
        if self.detail == Detail::Full {
            header.push(FILES_COLUMN);
        }
        out.write_record(&header)?;

        for row in &self.rows {
            let mut record = vec![
                row.hash.clone(),
                row.author.clone(),
                row.timestamp.to_rfc3339(),
                row.insertions.to_string(),
                row.deletions.to_string(),
                row.files.len().to_string(),
            ];
            if self.detail == Detail::Full {
                record.push(serde_json::to_string(&row.files)?);
            }
            out.write_record(&record)?;
        }
        out.flush()?;
        Ok(())
    }
}

/// A table of per-file change events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileChangeTable {
    rows: Vec<FileChangeRecord>,
}

impl FileChangeTable {
    /// Wrap records already in memory.
    pub fn from_records(rows: Vec<FileChangeRecord>) -> Self {
        Self { rows }
    }

    /// Change events, grouped by commit in source order.
    pub fn rows(&self) -> &[FileChangeRecord] {
        &self.rows
    }

    /// Number of change events.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no change events.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Keep only events whose `file_name` satisfies `predicate`.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::Utc;
    /// use gitrisk_history::table::{FileChangeRecord, FileChangeTable};
    ///
    /// let event = |f: &str| FileChangeRecord {
    ///     hash: "h1".into(),
    ///     author: "bob".into(),
    ///     timestamp: Utc::now(),
    ///     file_name: f.into(),
    /// };
    /// let table = FileChangeTable::from_records(vec![event("a.rs"), event("b.lock")]);
    /// let kept = table.filter_files(|name| name.ends_with(".rs"));
    /// assert_eq!(kept.len(), 1);
    /// ```
    pub fn filter_files(&self, predicate: impl Fn(&str) -> bool) -> Self {
        let rows: Vec<_> = self
            .rows
            .iter()
            .filter(|r| predicate(r.file_name.as_str()))
            .cloned()
            .collect();
        tracing::debug!(
            kept = rows.len(),
            dropped = self.rows.len() - rows.len(),
            "filtered file changes"
        );
        Self { rows }
    }

    /// Keep only events whose timestamp lies in `duration`.
    pub fn filter_by_duration(&self, duration: &Duration) -> Self {
        Self {
            rows: self
                .rows
                .iter()
                .filter(|r| duration.contains(r.timestamp))
                .cloned()
                .collect(),
        }
    }

    /// Write the table as CSV (`hash,author,timestamp,file_name`).
    ///
    /// # Errors
    ///
    /// Returns [`GitriskError::Csv`] on write failure.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), GitriskError> {
        let mut out = csv::Writer::from_writer(writer);
        out.write_record(["hash", "author", "timestamp", "file_name"])?;
        for row in &self.rows {
            out.write_record([
                row.hash.as_str(),
                row.author.as_str(),
                row.timestamp.to_rfc3339().as_str(),
                row.file_name.as_str(),
            ])?;
        }
        out.flush()?;
        Ok(())
    }
}

fn read_source(source: Source<'_>) -> Result<(Vec<CommitRecord>, bool), GitriskError> {
    let name = source.name;
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_reader(source.reader);

    let headers = reader
        .headers()
        .map_err(|e| GitriskError::load(&name, e.to_string()))?
        .clone();
    if headers.is_empty() {
        return Err(GitriskError::load(&name, "source is empty"));
    }
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|col| !headers.iter().any(|h| h == *col))
        .collect();
    if !missing.is_empty() {
        return Err(GitriskError::load(
            &name,
            format!("missing required column(s): {}", missing.join(", ")),
        ));
    }
    let has_files = headers.iter().any(|h| h == FILES_COLUMN);
    let detail = if has_files { Detail::Full } else { Detail::Summary };

    let mut rows = Vec::new();
    for result in reader.deserialize::<CsvCommit>() {
        let raw = result.map_err(|e| GitriskError::load(&name, e.to_string()))?;
        let row = parse_row(raw, detail).map_err(|msg| GitriskError::load(&name, msg))?;
        rows.push(row);
    }
    Ok((rows, has_files))
}

fn parse_row(raw: CsvCommit, detail: Detail) -> Result<CommitRecord, String> {
    let timestamp = parse_timestamp(&raw.timestamp)
        .ok_or_else(|| format!("commit {}: bad timestamp '{}'", raw.hash, raw.timestamp))?;
    let files = match (detail, raw.files.as_deref().map(str::trim)) {
        (Detail::Full, Some(text)) if !text.is_empty() => serde_json::from_str(text)
            .map_err(|e| format!("commit {}: bad files list: {e}", raw.hash))?,
        _ => Vec::new(),
    };
    let row = CommitRecord {
        hash: raw.hash,
        author: raw.author,
        timestamp,
        insertions: raw.insertions,
        deletions: raw.deletions,
        files,
    };
    validate(&row, detail)?;
    Ok(row)
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    parse_date(text).ok()
}

fn validate(row: &CommitRecord, detail: Detail) -> Result<(), String> {
    if row.hash.trim().is_empty() {
        return Err("commit with empty hash".into());
    }
    if detail == Detail::Full && row.files.is_empty() {
        return Err(format!("commit {} lists no files", row.hash));
    }
    Ok(())
}
