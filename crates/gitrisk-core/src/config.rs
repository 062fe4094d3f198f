use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::GitriskError;

/// Top-level configuration loaded from `.gitrisk.toml`.
///
/// Resolution order: CLI flags > config file > defaults.
///
/// # Examples
///
/// ```
/// use gitrisk_core::GitriskConfig;
///
/// let config = GitriskConfig::default();
/// assert_eq!(config.hotgraph.rank, 70);
/// assert_eq!(config.history.months, 6);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitriskConfig {
    /// History extraction settings.
    #[serde(default)]
    pub history: HistoryConfig,
    /// Default allow/ignore file patterns.
    #[serde(default)]
    pub filter: FilterConfig,
    /// Hotspot report settings.
    #[serde(default)]
    pub hotspot: HotspotConfig,
    /// Co-change graph settings.
    #[serde(default)]
    pub hotgraph: HotgraphConfig,
}

impl GitriskConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`GitriskError::Io`] if the file cannot be read, or
    /// [`GitriskError::Toml`] if the content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use gitrisk_core::GitriskConfig;
    /// use std::path::Path;
    ///
    /// let config = GitriskConfig::from_file(Path::new(".gitrisk.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, GitriskError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`GitriskError::Toml`] if parsing fails, or
    /// [`GitriskError::Config`] if a value is out of range.
    ///
    /// # Examples
    ///
    /// ```
    /// use gitrisk_core::GitriskConfig;
    ///
    /// let toml = r#"
    /// [hotgraph]
    /// rank = 40
    /// "#;
    /// let config = GitriskConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.hotgraph.rank, 40);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, GitriskError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), GitriskError> {
        if self.history.months == 0 {
            return Err(GitriskError::Config(
                "history.months must be at least 1".into(),
            ));
        }
        if self.hotgraph.rank == 0 {
            return Err(GitriskError::Config("hotgraph.rank must be at least 1".into()));
        }
        if self.hotgraph.edge_limit == 0 {
            return Err(GitriskError::Config(
                "hotgraph.edge_limit must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// History extraction configuration.
///
/// # Examples
///
/// ```
/// use gitrisk_core::HistoryConfig;
///
/// let config = HistoryConfig::default();
/// assert_eq!(config.branch, "HEAD");
/// assert_eq!(config.max_files_per_commit, 0);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Branch or reference to walk.
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Window length in months when no explicit range is given.
    #[serde(default = "default_months")]
    pub months: u32,
    /// Skip commits touching more files than this (0 disables the cap).
    #[serde(default)]
    pub max_files_per_commit: usize,
}

fn default_branch() -> String {
    "HEAD".into()
}

fn default_months() -> u32 {
    6
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            branch: default_branch(),
            months: default_months(),
            max_files_per_commit: 0,
        }
    }
}

/// Default file patterns applied when the CLI supplies none.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Glob patterns a file must match (empty means everything).
    #[serde(default)]
    pub allow: Vec<String>,
    /// Glob patterns that exclude a file.
    #[serde(default)]
    pub ignore: Vec<String>,
}

/// Hotspot report configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotspotConfig {
    /// Rows shown in human-readable output.
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    30
}

impl Default for HotspotConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
        }
    }
}

/// Co-change graph configuration.
///
/// # Examples
///
/// ```
/// use gitrisk_core::HotgraphConfig;
///
/// let config = HotgraphConfig::default();
/// assert_eq!(config.edge_limit, 400);
/// assert_eq!(config.max_retries, 8);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotgraphConfig {
    /// Number of strongest relationships to aim for.
    #[serde(default = "default_rank")]
    pub rank: usize,
    /// Edge count above which the threshold is escalated.
    #[serde(default = "default_edge_limit")]
    pub edge_limit: usize,
    /// Maximum escalation rounds after the first build.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_rank() -> usize {
    70
}

fn default_edge_limit() -> usize {
    400
}

fn default_max_retries() -> u32 {
    8
}

impl Default for HotgraphConfig {
    fn default() -> Self {
        Self {
            rank: default_rank(),
            edge_limit: default_edge_limit(),
            max_retries: default_max_retries(),
        }
    }
}
