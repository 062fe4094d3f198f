/// Errors that can occur across gitrisk.
///
/// The first four variants are the analytical failures of the history
/// engine; the rest wrap I/O and parsing failures from the surrounding
/// plumbing. Each variant is a `miette` diagnostic, so the binary can
/// propagate it with `?` and get codes and help text in the report.
///
/// # Examples
///
/// ```
/// use gitrisk_core::GitriskError;
///
/// let err = GitriskError::InvalidRange("since must be before until".into());
/// assert!(err.to_string().contains("since must be before until"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum GitriskError {
    /// Malformed or contradictory time-window parameters.
    #[error("invalid time range: {0}")]
    #[diagnostic(code(gitrisk::invalid_range))]
    InvalidRange(String),

    /// A commit source could not be read into a table.
    #[error("failed to load {source_name}: {message}")]
    #[diagnostic(code(gitrisk::load))]
    Load {
        /// Identity of the offending source (file name or `<stdin>`).
        source_name: String,
        /// What was wrong with it.
        message: String,
    },

    /// Per-file expansion requested on a table without file data.
    #[error("cannot expand files: {0}")]
    #[diagnostic(
        code(gitrisk::expansion),
        help("re-extract the history with `gitrisk log --full` to record file names")
    )]
    Expansion(String),

    /// A co-change graph was requested from an empty dataset.
    #[error("nothing to show: no file changes in the selected history")]
    #[diagnostic(code(gitrisk::empty_graph), help("widen the time window or relax the file filters"))]
    EmptyGraph,

    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration or parameter value.
    #[error("configuration error: {0}")]
    #[diagnostic(code(gitrisk::config))]
    Config(String),

    /// Git operation failure.
    #[error("git error: {0}")]
    #[diagnostic(code(gitrisk::git))]
    Git(String),

    /// CSV encoding / decoding failure.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl GitriskError {
    /// Shorthand for a [`GitriskError::Load`] tagged with its source.
    pub fn load(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Load {
            source_name: source_name.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: GitriskError = io_err.into();
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn load_error_names_its_source() {
        let err = GitriskError::load("history.csv", "missing column `hash`");
        assert_eq!(
            err.to_string(),
            "failed to load history.csv: missing column `hash`"
        );
    }

    #[test]
    fn empty_graph_reads_as_user_message() {
        let err = GitriskError::EmptyGraph;
        assert!(err.to_string().starts_with("nothing to show"));
    }

    #[test]
    fn expansion_error_carries_full_mode_help() {
        use miette::Diagnostic;

        let err = GitriskError::Expansion("table has no file details".into());
        assert_eq!(err.code().unwrap().to_string(), "gitrisk::expansion");
        assert!(err.help().unwrap().to_string().contains("--full"));
    }

    #[test]
    fn converts_into_a_miette_report() {
        fn fails() -> miette::Result<()> {
            Err(GitriskError::Config("rank must be at least 1".into()))?;
            Ok(())
        }
        let report = fails().unwrap_err();
        assert!(report.to_string().contains("rank must be at least 1"));
    }
}
