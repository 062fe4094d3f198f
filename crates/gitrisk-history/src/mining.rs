//! Git history extraction via git2.
//!
//! Walks a branch newest-first and turns each commit inside the requested
//! [`Duration`] into a [`CommitRecord`] with line counts and, in full
//! detail mode, the list of touched paths.

use std::path::Path;

use chrono::DateTime;
use git2::{Commit, Diff, DiffFindOptions, DiffOptions, Repository, Sort};
use gitrisk_core::GitriskError;

use crate::duration::Duration;
use crate::table::{CommitRecord, CommitTable, Detail};

/// Options for history mining.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use gitrisk_history::duration::resolve;
/// use gitrisk_history::mining::MiningOptions;
/// use gitrisk_history::table::Detail;
///
/// let opts = MiningOptions::new(resolve(None, None, None, Utc::now()).unwrap());
/// assert_eq!(opts.detail, Detail::Summary);
/// assert_eq!(opts.max_files_per_commit, 0);
/// assert!(opts.branch.is_none());
/// ```
#[derive(Debug, Clone)]
pub struct MiningOptions {
    /// Only commits inside this window are kept.
    pub duration: Duration,
    /// Branch, tag, or revision to walk (default: HEAD).
    pub branch: Option<String>,
    /// Whether to record touched paths.
    pub detail: Detail,
    /// Skip commits touching more files than this (0 = no cap).
    pub max_files_per_commit: usize,
}

impl MiningOptions {
    /// Summary-detail mining of HEAD over `duration`.
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            branch: None,
            detail: Detail::Summary,
            max_files_per_commit: 0,
        }
    }
}

/// Mine commit history from a git repository.
///
/// Returns commits newest first. Commits that touch no files are skipped,
/// as are commits over `max_files_per_commit` when that cap is set.
///
/// # Errors
///
/// Returns [`GitriskError::Git`] if the repository cannot be opened or walked.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use chrono::Utc;
/// use gitrisk_history::duration::resolve;
/// use gitrisk_history::mining::{mine_history, MiningOptions};
///
/// let window = resolve(None, None, Some(3), Utc::now()).unwrap();
/// let table = mine_history(Path::new("."), &MiningOptions::new(window)).unwrap();
/// println!("{} commits", table.len());
/// ```
pub fn mine_history(
    repo_path: &Path,
    options: &MiningOptions,
) -> Result<CommitTable, GitriskError> {
    let repo = Repository::open(repo_path)
        .map_err(|e| GitriskError::Git(format!("failed to open repository: {e}")))?;

    let mut revwalk = repo
        .revwalk()
        .map_err(|e| GitriskError::Git(format!("failed to create revwalk: {e}")))?;
    revwalk
        .set_sorting(Sort::TIME)
        .map_err(|e| GitriskError::Git(format!("failed to sort revwalk: {e}")))?;

    match options.branch.as_deref() {
        None | Some("HEAD") => revwalk
            .push_head()
            .map_err(|e| GitriskError::Git(format!("failed to push HEAD: {e}")))?,
        Some(branch) => {
            let target = repo
                .revparse_single(branch)
                .and_then(|obj| obj.peel_to_commit())
                .map_err(|e| GitriskError::Git(format!("failed to resolve '{branch}': {e}")))?;
            revwalk
                .push(target.id())
                .map_err(|e| GitriskError::Git(format!("failed to push '{branch}': {e}")))?;
        }
    }

    let mut rows = Vec::new();
    let mut skipped = 0usize;

    for oid_result in revwalk {
        let oid = oid_result.map_err(|e| GitriskError::Git(format!("revwalk error: {e}")))?;
        let commit = repo
            .find_commit(oid)
            .map_err(|e| GitriskError::Git(format!("failed to find commit: {e}")))?;

        let seconds = commit.time().seconds();
        let timestamp = DateTime::from_timestamp(seconds, 0).ok_or_else(|| {
            GitriskError::Git(format!("commit {oid} has an invalid timestamp {seconds}"))
        })?;
        if timestamp >= options.duration.end {
            continue;
        }
        if timestamp < options.duration.start {
            break;
        }

        let diff = diff_to_first_parent(&repo, &commit)?;
        let file_count = diff.deltas().len();
        if file_count == 0
            || (options.max_files_per_commit > 0 && file_count > options.max_files_per_commit)
        {
            skipped += 1;
            continue;
        }

        let stats = diff
            .stats()
            .map_err(|e| GitriskError::Git(format!("failed to compute diff stats: {e}")))?;
        let files = match options.detail {
            Detail::Full => touched_paths(&diff),
            Detail::Summary => Vec::new(),
        };

        rows.push(CommitRecord {
            hash: oid.to_string(),
            author: commit.author().name().unwrap_or("unknown").to_string(),
            timestamp,
            insertions: stats.insertions() as u64,
            deletions: stats.deletions() as u64,
            files,
        });
    }

    tracing::info!(commits = rows.len(), skipped, "mined git history");
    CommitTable::new(rows, options.detail)
}

fn diff_to_first_parent<'r>(
    repo: &'r Repository,
    commit: &Commit<'_>,
) -> Result<Diff<'r>, GitriskError> {
    let commit_tree = commit
        .tree()
        .map_err(|e| GitriskError::Git(format!("failed to get commit tree: {e}")))?;

    let parent_tree = if commit.parent_count() > 0 {
        let parent = commit
            .parent(0)
            .map_err(|e| GitriskError::Git(format!("failed to get parent: {e}")))?;
        Some(
            parent
                .tree()
                .map_err(|e| GitriskError::Git(format!("failed to get parent tree: {e}")))?,
        )
    } else {
        None
    };

    let mut diff_opts = DiffOptions::new();
    let mut diff = repo
        .diff_tree_to_tree(
            parent_tree.as_ref(),
            Some(&commit_tree),
            Some(&mut diff_opts),
        )
        .map_err(|e| GitriskError::Git(format!("failed to compute diff: {e}")))?;

    let mut find_opts = DiffFindOptions::new();
    find_opts.renames(true);
    diff.find_similar(Some(&mut find_opts))
        .map_err(|e| GitriskError::Git(format!("failed to find renames: {e}")))?;

    Ok(diff)
}

fn touched_paths(diff: &Diff<'_>) -> Vec<String> {
    diff.deltas()
        .filter_map(|delta| {
            // Deleted files only have an old path.
            delta
                .new_file()
                .path()
                .or_else(|| delta.old_file().path())
                .map(|p| p.to_string_lossy().into_owned())
        })
        .filter(|p| !p.is_empty())
        .collect()
}
