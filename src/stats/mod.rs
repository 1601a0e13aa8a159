//! Commit model and churn aggregation.
//!
//! Commits are built from log entries with zero line counts, enriched once by
//! the resolver, then rolled up by [`aggregate`] into:
//!
//! - period tables keyed by `(period, branch, author)` for months and days
//! - flat per-author and per-branch tables
//! - chart series aligned with the sorted month/day axes
//! - overall totals
//!
//! Period tables only accumulate files and lines; commit counts live in the
//! flat tables. A commit touching several branches adds its full file/line
//! figures to every branch bucket, but counts once in the totals.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::svn::resolve::{DiffResult, FileDetail};
use crate::svn::{DateFilter, LogEntry, extract_branch, revision_sort_key};

// ─── Commit model ───────────────────────────────────────────────────

/// One changed path with its branch attribution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChangedFile {
    pub path: String,
    pub action: String,
    pub branch: String,
}

/// One logged revision plus its line counts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Commit {
    pub revision: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    /// URL the revision was logged from; diffs are fetched against it.
    pub branch_url: String,
    pub files_changed: u64,
    pub changed_files: Vec<ChangedFile>,
    /// Distinct branch labels, in order of first appearance.
    pub branches: Vec<String>,
    pub lines_added: u64,
    pub lines_deleted: u64,
    pub file_details: BTreeMap<String, FileDetail>,
}

impl Commit {
    /// `YYYY-MM` (UTC).
    pub fn month_key(&self) -> String {
        self.timestamp.format("%Y-%m").to_string()
    }

    /// `YYYY-MM-DD` (UTC).
    pub fn day_key(&self) -> String {
        self.timestamp.format("%Y-%m-%d").to_string()
    }

    /// Attach resolved line counts.
    pub fn apply_diff(&mut self, diff: DiffResult) {
        self.lines_added = diff.lines_added;
        self.lines_deleted = diff.lines_deleted;
        self.file_details = diff.files;
    }
}

/// Convert log entries fetched from `branch_url` into commits with zero
/// line counts.
pub fn commits_from_log(entries: &[LogEntry], branch_url: &str) -> Vec<Commit> {
    entries
        .iter()
        .map(|entry| {
            let changed_files: Vec<ChangedFile> = entry
                .paths
                .iter()
                .map(|p| ChangedFile {
                    path: p.path.clone(),
                    action: p.action.clone(),
                    branch: extract_branch(&p.path),
                })
                .collect();

            let mut branches: Vec<String> = Vec::new();
            for file in &changed_files {
                push_unique(&mut branches, &file.branch);
            }

            Commit {
                revision: entry.revision.clone(),
                author: entry.author.clone(),
                timestamp: entry.timestamp,
                branch_url: branch_url.to_string(),
                files_changed: changed_files.len() as u64,
                changed_files,
                branches,
                lines_added: 0,
                lines_deleted: 0,
                file_details: BTreeMap::new(),
            }
        })
        .collect()
}

/// Merge commit batches from several branch URLs: ordered by revision,
/// first occurrence wins for a repeated revision.
pub fn merge_commits(batches: Vec<Vec<Commit>>) -> Vec<Commit> {
    let mut all: Vec<Commit> = batches.into_iter().flatten().collect();
    // Stable sort keeps batch order among equal revisions.
    all.sort_by_key(|c| revision_sort_key(&c.revision));
    all.dedup_by(|later, earlier| later.revision == earlier.revision);
    all
}

/// Keep only commits whose UTC day falls inside `filter`.
pub fn filter_by_date(commits: Vec<Commit>, filter: &DateFilter) -> Vec<Commit> {
    if filter.is_empty() {
        return commits;
    }
    commits
        .into_iter()
        .filter(|c| filter.contains(&c.timestamp))
        .collect()
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

// ─── Aggregate types ────────────────────────────────────────────────

/// File/line totals for one `(period, branch, author)` bucket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PeriodStats {
    pub files_changed: u64,
    pub lines_added: u64,
    pub lines_deleted: u64,
}

/// Flat table keyed by `(period, branch, author)`.
///
/// Serializes as a sorted list of rows.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PeriodTable {
    rows: BTreeMap<(String, String, String), PeriodStats>,
}

impl PeriodTable {
    pub fn get(&self, period: &str, branch: &str, author: &str) -> Option<&PeriodStats> {
        self.rows
            .get(&(period.to_string(), branch.to_string(), author.to_string()))
    }

    /// Insert-or-update the bucket for `(period, branch, author)`.
    pub fn add(&mut self, period: &str, branch: &str, author: &str, delta: PeriodStats) {
        let bucket = self
            .rows
            .entry((period.to_string(), branch.to_string(), author.to_string()))
            .or_default();
        bucket.files_changed += delta.files_changed;
        bucket.lines_added += delta.lines_added;
        bucket.lines_deleted += delta.lines_deleted;
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// `(period, branch, author, stats)` in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &str, &PeriodStats)> {
        self.rows
            .iter()
            .map(|((p, b, a), s)| (p.as_str(), b.as_str(), a.as_str(), s))
    }

    /// Distinct periods, sorted.
    pub fn periods(&self) -> Vec<String> {
        let mut periods: Vec<String> = Vec::new();
        // Keys are sorted by period first, so duplicates are adjacent.
        for (period, _, _) in self.rows.keys() {
            if periods.last() != Some(period) {
                periods.push(period.clone());
            }
        }
        periods
    }
}

struct PeriodRow<'a> {
    period: &'a str,
    branch: &'a str,
    author: &'a str,
    stats: &'a PeriodStats,
}

impl Serialize for PeriodRow<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut row = serializer.serialize_struct("PeriodRow", 6)?;
        row.serialize_field("period", self.period)?;
        row.serialize_field("branch", self.branch)?;
        row.serialize_field("author", self.author)?;
        row.serialize_field("files_changed", &self.stats.files_changed)?;
        row.serialize_field("lines_added", &self.stats.lines_added)?;
        row.serialize_field("lines_deleted", &self.stats.lines_deleted)?;
        row.end()
    }
}

impl Serialize for PeriodTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter().map(|(period, branch, author, stats)| PeriodRow {
            period,
            branch,
            author,
            stats,
        }))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AuthorStats {
    pub commits: u64,
    pub files_changed: u64,
    pub lines_added: u64,
    pub lines_deleted: u64,
    /// Distinct branches, in order of first appearance.
    pub branches: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BranchStats {
    pub commits: u64,
    pub files_changed: u64,
    pub lines_added: u64,
    pub lines_deleted: u64,
    /// Distinct authors, in order of first appearance.
    pub authors: Vec<String>,
}

/// One line on a chart: one value per period on the matching axis.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ChartSeries {
    pub label: String,
    pub data: Vec<u64>,
}

/// Sorted axes plus per-author series for files changed and lines added.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ChartData {
    pub months: Vec<String>,
    pub days: Vec<String>,
    pub authors: Vec<String>,
    pub branches: Vec<String>,
    pub monthly_data_files: Vec<ChartSeries>,
    pub monthly_data_lines: Vec<ChartSeries>,
    pub daily_data_files: Vec<ChartSeries>,
    pub daily_data_lines: Vec<ChartSeries>,
}

/// Parameters that produced a run, echoed back with the results.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Filter {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub revision_range: Option<String>,
}

/// Everything one analysis run produces.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisResults {
    pub commits: Vec<Commit>,
    pub monthly_stats: PeriodTable,
    pub daily_stats: PeriodTable,
    pub author_stats: BTreeMap<String, AuthorStats>,
    pub branch_stats: BTreeMap<String, BranchStats>,
    pub chart_data: ChartData,
    pub total_commits: u64,
    pub total_files: u64,
    pub total_lines_added: u64,
    pub total_lines_deleted: u64,
    pub filter: Filter,
}

// ─── Aggregation ────────────────────────────────────────────────────

/// Roll commits up into every table in one pass, then build chart series.
pub fn aggregate(commits: Vec<Commit>, filter: Filter) -> AnalysisResults {
    let mut monthly = PeriodTable::default();
    let mut daily = PeriodTable::default();
    let mut authors: BTreeMap<String, AuthorStats> = BTreeMap::new();
    let mut branches: BTreeMap<String, BranchStats> = BTreeMap::new();
    let mut total_files = 0u64;
    let mut total_added = 0u64;
    let mut total_deleted = 0u64;

    for commit in &commits {
        let delta = PeriodStats {
            files_changed: commit.files_changed,
            lines_added: commit.lines_added,
            lines_deleted: commit.lines_deleted,
        };
        let month = commit.month_key();
        let day = commit.day_key();

        let mut touched: Vec<String> = Vec::with_capacity(commit.branches.len());
        for branch in &commit.branches {
            push_unique(&mut touched, branch);
        }

        for branch in &touched {
            monthly.add(&month, branch, &commit.author, delta);
            daily.add(&day, branch, &commit.author, delta);

            let b = branches.entry(branch.clone()).or_default();
            b.commits += 1;
            b.files_changed += delta.files_changed;
            b.lines_added += delta.lines_added;
            b.lines_deleted += delta.lines_deleted;
            push_unique(&mut b.authors, &commit.author);
        }

        let a = authors.entry(commit.author.clone()).or_default();
        a.commits += 1;
        a.files_changed += delta.files_changed;
        a.lines_added += delta.lines_added;
        a.lines_deleted += delta.lines_deleted;
        for branch in &touched {
            push_unique(&mut a.branches, branch);
        }

        total_files += delta.files_changed;
        total_added += delta.lines_added;
        total_deleted += delta.lines_deleted;
    }

    let chart_data = build_chart_data(&monthly, &daily, &authors, &branches);

    AnalysisResults {
        total_commits: commits.len() as u64,
        total_files,
        total_lines_added: total_added,
        total_lines_deleted: total_deleted,
        commits,
        monthly_stats: monthly,
        daily_stats: daily,
        author_stats: authors,
        branch_stats: branches,
        chart_data,
        filter,
    }
}

fn build_chart_data(
    monthly: &PeriodTable,
    daily: &PeriodTable,
    authors: &BTreeMap<String, AuthorStats>,
    branches: &BTreeMap<String, BranchStats>,
) -> ChartData {
    // BTreeMap keys are already in lexicographic order.
    let author_axis: Vec<String> = authors.keys().cloned().collect();
    let branch_axis: Vec<String> = branches.keys().cloned().collect();
    let months = monthly.periods();
    let days = daily.periods();

    let (monthly_data_files, monthly_data_lines) = series_for(monthly, &author_axis, &months);
    let (daily_data_files, daily_data_lines) = series_for(daily, &author_axis, &days);

    ChartData {
        months,
        days,
        authors: author_axis,
        branches: branch_axis,
        monthly_data_files,
        monthly_data_lines,
        daily_data_files,
        daily_data_lines,
    }
}

/// Files-changed and lines-added series per author, summed across branches.
/// Missing `(period, author)` combinations are 0.
fn series_for(
    table: &PeriodTable,
    authors: &[String],
    periods: &[String],
) -> (Vec<ChartSeries>, Vec<ChartSeries>) {
    let mut sums: HashMap<(&str, &str), (u64, u64)> = HashMap::new();
    for (period, _branch, author, stats) in table.iter() {
        let slot = sums.entry((period, author)).or_default();
        slot.0 += stats.files_changed;
        slot.1 += stats.lines_added;
    }

    let mut files = Vec::with_capacity(authors.len());
    let mut lines = Vec::with_capacity(authors.len());
    for author in authors {
        let (file_data, line_data): (Vec<u64>, Vec<u64>) = periods
            .iter()
            .map(|p| {
                sums.get(&(p.as_str(), author.as_str()))
                    .copied()
                    .unwrap_or_default()
            })
            .unzip();
        files.push(ChartSeries {
            label: author.clone(),
            data: file_data,
        });
        lines.push(ChartSeries {
            label: author.clone(),
            data: line_data,
        });
    }
    (files, lines)
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
#[path = "stats_tests.rs"]
mod tests;
