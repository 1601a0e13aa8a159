//! CLI argument structs for all subcommands.

use std::path::PathBuf;

use clap::{Args, Parser};

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// JSON config file (missing file = defaults)
    #[arg(long, global = true, default_value = "svnstat.json")]
    pub config: PathBuf,

    /// Cache directory [default: config `cache_dir`, else <data dir>/svnstat]
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Log level for stderr output (error, warn, info, debug, trace).
    /// RUST_LOG takes precedence when set.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,
}

/// Username/password for the svn client. Fall back to the config file.
#[derive(Args, Debug, Clone)]
pub struct AuthArgs {
    /// svn username
    #[arg(long)]
    pub username: Option<String>,

    /// svn password
    #[arg(long)]
    pub password: Option<String>,
}

#[derive(Parser, Debug)]
pub struct AnalyzeArgs {
    /// Branch URL to analyze (repeatable). Defaults to
    /// `svn_base_url/default_branch` from the config.
    #[arg(long = "url", value_name = "URL")]
    pub urls: Vec<String>,

    #[command(flatten)]
    pub auth: AuthArgs,

    /// Revision range passed to `svn log -r` (e.g. 1000:HEAD)
    #[arg(short = 'r', long = "revision", value_name = "RANGE")]
    pub revision_range: Option<String>,

    /// First day to include (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub from: Option<String>,

    /// Last day to include (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub to: Option<String>,

    /// Worker threads for diff retrieval (0 = one per CPU) [default: config `jobs`]
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Write JSON results here instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Skip the JSON results, print only the summary
    #[arg(long)]
    pub summary_only: bool,
}

#[derive(Parser, Debug)]
pub struct DiffArgs {
    /// Branch URL the revision belongs to [default: from config]
    #[arg(long)]
    pub url: Option<String>,

    /// Revision number
    #[arg(short = 'r', long = "revision", value_name = "REV")]
    pub revision: String,

    #[command(flatten)]
    pub auth: AuthArgs,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}
