//! # svnstat — Subversion code-churn statistics
//!
//! Turns `svn log` / `svn diff` output into per-revision line counts, keeps
//! them in a two-tier on-disk cache so repeated runs never refetch a known
//! revision, and rolls commits up into monthly, daily, author, and branch
//! tables plus chart-ready series.
//!
//! ## Library usage
//!
//! The two entry points are [`resolve_revision`] (one revision's counts,
//! cache first) and [`aggregate`] (commits to results). [`AnalysisEngine`]
//! wires them together behind a single-flight runner; the `svnstat` binary
//! is a thin CLI over it.

pub mod analysis;
pub mod config;
pub mod error;
pub mod stats;
pub mod svn;

#[cfg(test)]
pub(crate) mod test_utils;

pub use analysis::{AnalysisEngine, AnalysisRequest, BranchSpec, TaskStatus};
pub use config::{Config, default_cache_dir};
pub use error::{Result, SvnStatError};
pub use stats::{AnalysisResults, Commit, aggregate};
pub use svn::cache::RevisionCache;
pub use svn::diff::parse_diff;
pub use svn::resolve::{DiffResult, resolve_revision};
pub use svn::{Credentials, SvnCli, SvnClient};
