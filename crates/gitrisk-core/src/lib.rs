//! Core types, configuration, and error handling for gitrisk.
//!
//! This crate provides the shared foundation used by the other gitrisk crates:
//! - [`GitriskError`]: unified error type using `thiserror`
//! - [`GitriskConfig`]: configuration loaded from `.gitrisk.toml`
//! - [`OutputFormat`]: report rendering selector shared by the CLI

mod config;
mod error;
mod types;

pub use config::{FilterConfig, GitriskConfig, HistoryConfig, HotgraphConfig, HotspotConfig};
pub use error::GitriskError;
pub use types::OutputFormat;

/// A convenience `Result` type for gitrisk operations.
pub type Result<T> = std::result::Result<T, GitriskError>;
