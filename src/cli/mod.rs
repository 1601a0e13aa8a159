//! CLI layer: argument parsing, command dispatch, and subcommand implementations.

pub mod args;
mod info;

pub use args::*;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use svnstat::analysis::DetailLevel;
use svnstat::{
    AnalysisEngine, AnalysisRequest, AnalysisResults, BranchSpec, Config, Credentials,
    RevisionCache, SvnCli, SvnClient, SvnStatError, resolve_revision,
};

// ─── CLI ─────────────────────────────────────────────────────────────

/// Code-churn statistics for Subversion repositories
#[derive(Parser, Debug)]
#[command(name = "svnstat", version, about, after_help = "\
Run 'svnstat <COMMAND> --help' for detailed options.\n\
Settings not given on the command line are read from svnstat.json (see --config).")]
pub(crate) struct Cli {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Log one or more branches, count changed lines per revision, and aggregate.
    Analyze(AnalyzeArgs),

    /// Show per-file line counts for a single revision.
    Diff(DiffArgs),

    /// Show revision cache location and entry counts.
    CacheInfo {
        /// Also report the latest cached and server revision for this branch URL
        #[arg(long)]
        url: Option<String>,

        #[command(flatten)]
        auth: AuthArgs,
    },

    /// Delete every cached revision.
    CacheClear,
}

// ─── Main entry point ───────────────────────────────────────────────

pub fn run() {
    let cli = Cli::parse();
    init_logging(&cli.common.log_level);

    let config = Config::load(&cli.common.config);
    let cache_dir = cli
        .common
        .cache_dir
        .clone()
        .unwrap_or_else(|| config.cache_dir());

    let result = match cli.command {
        Commands::Analyze(args) => cmd_analyze(args, &config, cache_dir),
        Commands::Diff(args) => cmd_diff(args, &config, cache_dir),
        Commands::CacheInfo { url, auth } => {
            let url = url.or_else(|| config.default_branch_url());
            info::cmd_cache_info(cache_dir, url.as_deref(), &credentials(&auth, &config))
        }
        Commands::CacheClear => info::cmd_cache_clear(cache_dir),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(level: &str) {
    let builder = tracing_subscriber::fmt()
        .with_target(true)
        .with_writer(std::io::stderr);

    if std::env::var_os("RUST_LOG").is_some() {
        builder.with_env_filter(EnvFilter::from_default_env()).init();
        return;
    }

    let level = match level {
        "error" => tracing::Level::ERROR,
        "warn" => tracing::Level::WARN,
        "debug" => tracing::Level::DEBUG,
        "trace" => tracing::Level::TRACE,
        _ => tracing::Level::INFO,
    };
    builder.with_max_level(level).init();
}

/// Flags first, then the config file.
fn credentials(auth: &AuthArgs, config: &Config) -> Credentials {
    let configured = config.credentials();
    Credentials::new(
        auth.username.clone().or(configured.username),
        auth.password.clone().or(configured.password),
    )
}

fn no_url_error() -> SvnStatError {
    SvnStatError::InvalidArgs(
        "No branch URL: pass --url or set svn_base_url in the config file".to_string(),
    )
}

// ─── analyze ────────────────────────────────────────────────────────

fn build_request(args: &AnalyzeArgs, config: &Config) -> Result<AnalysisRequest, SvnStatError> {
    let urls = if args.urls.is_empty() {
        vec![config.default_branch_url().ok_or_else(no_url_error)?]
    } else {
        args.urls.clone()
    };
    let creds = credentials(&args.auth, config);

    let mut revision_range = args.revision_range.clone();
    let mut start_date = args.from.clone();
    // No range and no start date: look back `log_range_days` from today.
    if revision_range.is_none() && start_date.is_none() {
        if let Some(start) = config.default_start_date(chrono::Utc::now().date_naive()) {
            let start = start.format("%Y-%m-%d").to_string();
            debug!(start = %start, days = config.log_range_days, "Using default log window");
            revision_range = Some(format!("{{{}}}:HEAD", start));
            start_date = Some(start);
        }
    }

    Ok(AnalysisRequest {
        branches: urls
            .into_iter()
            .map(|url| BranchSpec {
                url,
                credentials: creds.clone(),
            })
            .collect(),
        revision_range,
        start_date,
        end_date: args.to.clone(),
        jobs: args.jobs.unwrap_or(config.jobs),
    })
}

fn cmd_analyze(args: AnalyzeArgs, config: &Config, cache_dir: PathBuf) -> Result<(), SvnStatError> {
    let request = build_request(&args, config)?;
    let urls: Vec<&str> = request.branches.iter().map(|b| b.url.as_str()).collect();
    info!(
        urls = ?urls,
        range = request.revision_range.as_deref().unwrap_or("-"),
        jobs = request.jobs,
        "Starting analysis"
    );

    let start = Instant::now();
    let client: Arc<dyn SvnClient> = Arc::new(SvnCli::default());
    let engine = AnalysisEngine::new(client, Arc::new(RevisionCache::load(cache_dir)));
    let results = engine.run(&request)?;

    print_summary(&results, &engine);
    eprintln!("Completed in {:.1}s", start.elapsed().as_secs_f64());

    if args.summary_only {
        return Ok(());
    }
    let json = serde_json::to_string_pretty(&results)?;
    match &args.output {
        Some(path) => {
            write_results(path, &json)?;
            eprintln!("Results written to {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn write_results(path: &Path, json: &str) -> Result<(), SvnStatError> {
    fs::write(path, json).map_err(|source| SvnStatError::Output {
        path: path.display().to_string(),
        source,
    })
}

fn print_summary(results: &AnalysisResults, engine: &AnalysisEngine) {
    eprintln!(
        "{} commits, {} files changed, +{} -{} lines",
        results.total_commits,
        results.total_files,
        results.total_lines_added,
        results.total_lines_deleted
    );

    let mut authors: Vec<_> = results.author_stats.iter().collect();
    authors.sort_by(|a, b| b.1.lines_added.cmp(&a.1.lines_added).then(a.0.cmp(b.0)));
    eprintln!();
    eprintln!("  {:<24} {:>8} {:>8} {:>10} {:>10}", "Author", "Commits", "Files", "Added", "Deleted");
    for (name, stats) in authors {
        eprintln!(
            "  {:<24} {:>8} {:>8} {:>10} {:>10}",
            name, stats.commits, stats.files_changed, stats.lines_added, stats.lines_deleted
        );
    }

    eprintln!();
    eprintln!("  {:<24} {:>8} {:>10} {:>10}", "Branch", "Commits", "Added", "Deleted");
    for (name, stats) in &results.branch_stats {
        eprintln!(
            "  {:<24} {:>8} {:>10} {:>10}",
            name, stats.commits, stats.lines_added, stats.lines_deleted
        );
    }

    let status = engine.status();
    let failures = status.details_at(DetailLevel::Error).count();
    if failures > 0 {
        eprintln!();
        eprintln!("{} revision(s) could not be resolved and count as zero lines:", failures);
        for detail in status.details_at(DetailLevel::Error) {
            eprintln!("  {}", detail.message);
        }
    }
}

// ─── diff ───────────────────────────────────────────────────────────

fn cmd_diff(args: DiffArgs, config: &Config, cache_dir: PathBuf) -> Result<(), SvnStatError> {
    let url = args
        .url
        .clone()
        .or_else(|| config.default_branch_url())
        .ok_or_else(no_url_error)?;
    let creds = credentials(&args.auth, config);
    let cache = RevisionCache::load(cache_dir);

    let result = resolve_revision(&SvnCli::default(), &cache, &url, &args.revision, &creds)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("r{}  +{} -{}  ({} files)", args.revision, result.lines_added, result.lines_deleted, result.files.len());
    for (path, detail) in &result.files {
        println!(
            "  {:>6} {:>6}  {}{}",
            format!("+{}", detail.lines_added),
            format!("-{}", detail.lines_deleted),
            path,
            if detail.cached { "  (cached)" } else { "" }
        );
    }
    if let Some(e) = &result.save_error {
        eprintln!("Warning: counts not saved to cache: {}", e);
    }
    Ok(())
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
