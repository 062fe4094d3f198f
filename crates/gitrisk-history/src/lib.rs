//! Git history analysis: hotspots and co-change networks.
//!
//! Commits are mined with git2 (or loaded from CSV) into a
//! [`table::CommitTable`], narrowed to a [`duration::Duration`] and a
//! [`filter::FileFilter`], then expanded into per-file change events.
//! From those, [`hotspots`] ranks files by how often and by how many
//! people they change, and [`cochange`] builds a simplified graph of
//! files that change together.

pub mod cochange;
pub mod duration;
pub mod filter;
pub mod hotspots;
pub mod mining;
pub mod summary;
pub mod table;
pub mod timeline;
