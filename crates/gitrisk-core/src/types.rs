use std::fmt;
use std::str::FromStr;

use crate::error::GitriskError;

/// How `hotspot`, `hotgraph`, `plot` and `info` render their reports.
///
/// CSV is not a format here: each command that can write CSV takes its own
/// `--csv` flag, since the CSV layout differs per report.
///
/// # Examples
///
/// ```
/// use gitrisk_core::OutputFormat;
///
/// let fmt: OutputFormat = "md".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Markdown);
/// assert!("csv".parse::<OutputFormat>().is_err());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Aligned plain-text tables.
    #[default]
    Text,
    /// Pretty-printed JSON with camelCase keys.
    Json,
    /// GitHub-flavored Markdown tables.
    Markdown,
}

impl OutputFormat {
    /// Every format, in the order shown by `--help`.
    pub const ALL: [OutputFormat; 3] = [Self::Text, Self::Json, Self::Markdown];

    /// Canonical lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
            Self::Markdown => "markdown",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = GitriskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        if name == "md" {
            return Ok(Self::Markdown);
        }
        Self::ALL
            .into_iter()
            .find(|f| f.as_str() == name)
            .ok_or_else(|| {
                let hint = if name == "csv" {
                    " (use the command's --csv flag)"
                } else {
                    ""
                };
                GitriskError::Config(format!(
                    "unknown output format '{s}', expected text, json or markdown{hint}"
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_formats_parse_case_insensitively() {
        assert_eq!(" Text ".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("Md".parse::<OutputFormat>().unwrap(), OutputFormat::Markdown);
    }

    #[test]
    fn csv_points_at_the_flag() {
        let err = "csv".parse::<OutputFormat>().unwrap_err();
        assert!(matches!(err, GitriskError::Config(_)));
        assert!(err.to_string().contains("--csv"));
    }

    #[test]
    fn dot_is_not_a_report_format() {
        let err = "dot".parse::<OutputFormat>().unwrap_err();
        assert!(!err.to_string().contains("--csv"));
    }

    #[test]
    fn every_format_parses_from_its_name() {
        for fmt in OutputFormat::ALL {
            assert_eq!(fmt.to_string().parse::<OutputFormat>().unwrap(), fmt);
        }
    }
}
