//! Allow/deny glob filtering of file paths.
//!
//! Patterns are compiled once into a [`FileFilter`] and then applied to
//! as many paths as needed. Matching runs against the full path string:
//! `*` matches any run of characters (including `/`), `?` matches one.
//! `**` has no special meaning and behaves like `*`.

use gitrisk_core::GitriskError;
use glob::{MatchOptions, Pattern};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// A compiled allow/deny predicate over file names.
///
/// A name passes iff it matches at least one allow pattern and no deny
/// pattern. With no allow patterns, everything is allowed.
///
/// # Examples
///
/// ```
/// use gitrisk_history::filter::FileFilter;
///
/// let filter = FileFilter::new(&["src/*"], &["*.lock", "src/gen/*"]).unwrap();
/// assert!(filter.matches("src/main.rs"));
/// assert!(filter.matches("src/deep/nested/mod.rs"));
/// assert!(!filter.matches("src/gen/api.rs"));
/// assert!(!filter.matches("README.md"));
/// ```
#[derive(Debug, Clone)]
pub struct FileFilter {
    allow: Vec<Pattern>,
    deny: Vec<Pattern>,
}

impl FileFilter {
    /// Compile allow and deny pattern lists.
    ///
    /// # Errors
    ///
    /// Returns [`GitriskError::Config`] naming the first pattern that is
    /// not a valid glob.
    pub fn new<A, D>(allow: &[A], deny: &[D]) -> Result<Self, GitriskError>
    where
        A: AsRef<str>,
        D: AsRef<str>,
    {
        Ok(Self {
            allow: compile(allow)?,
            deny: compile(deny)?,
        })
    }

    /// A filter that lets every name through.
    pub fn allow_all() -> Self {
        Self {
            allow: Vec::new(),
            deny: Vec::new(),
        }
    }

    /// Whether `file_name` passes the filter.
    pub fn matches(&self, file_name: &str) -> bool {
        // No allow patterns is the same as a single `*`.
        let allowed = self.allow.is_empty() || matches_any(&self.allow, file_name);
        allowed && !matches_any(&self.deny, file_name)
    }

    /// Borrow the filter as a plain predicate closure.
    pub fn predicate(&self) -> impl Fn(&str) -> bool + '_ {
        move |name: &str| self.matches(name)
    }
}

impl Default for FileFilter {
    fn default() -> Self {
        Self::allow_all()
    }
}

/// Build a predicate from allow and deny pattern lists.
///
/// Equivalent to [`FileFilter::new`]; kept as a free function for callers
/// that only want the closure.
///
/// # Errors
///
/// Returns [`GitriskError::Config`] for an invalid glob.
///
/// # Examples
///
/// ```
/// use gitrisk_history::filter::build_filter;
///
/// let is_match = build_filter(&[] as &[&str], &["*.md"]).unwrap();
/// assert!(is_match("lib.rs"));
/// assert!(!is_match("docs/guide.md"));
/// ```
pub fn build_filter<A, D>(
    allow: &[A],
    deny: &[D],
) -> Result<impl Fn(&str) -> bool, GitriskError>
where
    A: AsRef<str>,
    D: AsRef<str>,
{
    let filter = FileFilter::new(allow, deny)?;
    Ok(move |name: &str| filter.matches(name))
}

fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<Pattern>, GitriskError> {
    patterns
        .iter()
        .map(|p| {
            let p = p.as_ref();
            Pattern::new(&collapse_stars(p))
                .map_err(|e| GitriskError::Config(format!("invalid file pattern '{p}': {e}")))
        })
        .collect()
}

/// Fold every run of `*` into one so `glob` never sees a recursive `**`.
fn collapse_stars(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if c == '*' && out.ends_with('*') {
            continue;
        }
        out.push(c);
    }
    out
}

fn matches_any(patterns: &[Pattern], name: &str) -> bool {
    patterns
        .iter()
        .any(|p| p.matches_with(name, MATCH_OPTIONS))
}
