//! Subversion access: the `svn` command-line client behind a trait.
//!
//! Everything that spawns a process lives in [`SvnCli`]. The rest of the crate
//! only sees [`SvnClient`], so tests substitute a stub and never need a
//! server. Text produced by `svn log -v` is parsed here; diff text is parsed
//! in [`diff`].

use std::process::Command;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, SvnStatError};

pub mod cache;
pub mod diff;
pub mod resolve;

// ─── Types ──────────────────────────────────────────────────────────

/// Username/password passed to every `svn` call. Both optional.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Credentials {
    pub fn new(username: Option<String>, password: Option<String>) -> Self {
        Self { username, password }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// One path from the `Changed paths:` block of a log entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedPath {
    pub path: String,
    /// `A`, `M`, `D`, or `R`.
    pub action: String,
}

/// One revision as reported by `svn log -v`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub revision: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub paths: Vec<ChangedPath>,
    pub message: String,
}

// ─── Collaborator trait ─────────────────────────────────────────────

/// The external version-control client.
///
/// Implementations must be safe to call from several threads when the
/// analysis runs with more than one job.
pub trait SvnClient: Send + Sync {
    /// Log entries for `url`, oldest first, optionally limited to `revision_range`.
    fn fetch_log(
        &self,
        url: &str,
        credentials: &Credentials,
        revision_range: Option<&str>,
    ) -> Result<Vec<LogEntry>>;

    /// Raw unified diff of `revision` against its parent.
    fn fetch_diff(&self, url: &str, revision: &str, credentials: &Credentials) -> Result<String>;

    /// Content of `path` (relative to `url`) at `revision`.
    fn fetch_file_content(
        &self,
        url: &str,
        revision: &str,
        path: &str,
        credentials: &Credentials,
    ) -> Result<Vec<u8>>;

    /// Last changed revision of `url`.
    fn latest_revision(&self, url: &str, credentials: &Credentials) -> Result<String>;
}

// ─── CLI implementation ─────────────────────────────────────────────

/// [`SvnClient`] backed by the `svn` executable.
#[derive(Clone, Debug)]
pub struct SvnCli {
    program: String,
}

impl Default for SvnCli {
    fn default() -> Self {
        Self {
            program: "svn".to_string(),
        }
    }
}

impl SvnCli {
    /// Use a specific executable instead of `svn` from PATH.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, subcommand: &str, credentials: &Credentials) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg(subcommand)
            .arg("--non-interactive")
            .arg("--no-auth-cache");
        if let Some(ref user) = credentials.username {
            cmd.arg("--username").arg(user);
        }
        if let Some(ref pass) = credentials.password {
            cmd.arg("--password").arg(pass);
        }
        cmd
    }
}

/// Run an svn command and return stdout bytes.
fn run_svn(cmd: &mut Command, label: &str) -> Result<Vec<u8>> {
    let output = cmd.output().map_err(|e| {
        SvnStatError::retrieval(
            label,
            format!("failed to execute svn: {}. Is svn installed and in PATH?", e),
        )
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SvnStatError::retrieval(label, stderr.trim()));
    }

    Ok(output.stdout)
}

fn run_svn_text(cmd: &mut Command, label: &str) -> Result<String> {
    let stdout = run_svn(cmd, label)?;
    String::from_utf8(stdout)
        .map_err(|e| SvnStatError::retrieval(label, format!("output is not valid UTF-8: {}", e)))
}

impl SvnClient for SvnCli {
    fn fetch_log(
        &self,
        url: &str,
        credentials: &Credentials,
        revision_range: Option<&str>,
    ) -> Result<Vec<LogEntry>> {
        let mut cmd = self.command("log", credentials);
        cmd.arg("-v");
        if let Some(range) = revision_range {
            cmd.arg("-r").arg(range);
        }
        cmd.arg(url);

        debug!(url, range = ?revision_range, "svn log");
        let text = run_svn_text(&mut cmd, "log")?;
        let mut entries = parse_svn_log(&text);
        // svn log prints newest first unless the range says otherwise.
        sort_entries_by_revision(&mut entries);
        Ok(entries)
    }

    fn fetch_diff(&self, url: &str, revision: &str, credentials: &Credentials) -> Result<String> {
        let mut cmd = self.command("diff", credentials);
        cmd.arg("-c").arg(revision).arg(url);

        debug!(url, revision, "svn diff");
        let stdout = run_svn(&mut cmd, "diff")?;
        // Diffs of legacy-encoded files are still countable line by line.
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    fn fetch_file_content(
        &self,
        url: &str,
        revision: &str,
        path: &str,
        credentials: &Credentials,
    ) -> Result<Vec<u8>> {
        let mut cmd = self.command("cat", credentials);
        cmd.arg("-r")
            .arg(revision)
            .arg(format!("{}/{}", url.trim_end_matches('/'), path));

        debug!(url, revision, path, "svn cat");
        run_svn(&mut cmd, "cat")
    }

    fn latest_revision(&self, url: &str, credentials: &Credentials) -> Result<String> {
        let mut cmd = self.command("info", credentials);
        cmd.arg("--show-item").arg("last-changed-revision").arg(url);

        let text = run_svn_text(&mut cmd, "info")?;
        let revision = text.trim();
        if revision.is_empty() {
            return Err(SvnStatError::retrieval("info", "empty revision in output"));
        }
        Ok(revision.to_string())
    }
}

// ─── Log parser ─────────────────────────────────────────────────────

/// Author svn prints for revisions committed without one.
pub const NO_AUTHOR: &str = "(no author)";

const CHANGED_PATHS: &str = "Changed paths:";

fn is_separator(line: &str) -> bool {
    line.len() >= 20 && line.bytes().all(|b| b == b'-')
}

/// Parse the header `r100 | alice | 2024-01-15 10:00:00 +0000 (Mon, 15 Jan 2024) | 2 lines`.
/// Returns `(revision, author, timestamp, message_line_count)`.
fn parse_header(line: &str) -> Option<(String, String, DateTime<Utc>, usize)> {
    let fields: Vec<&str> = line.split(" | ").collect();
    if fields.len() < 4 {
        return None;
    }

    let revision = fields[0].trim().strip_prefix('r')?;
    if revision.is_empty() || !revision.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let author = match fields[1].trim() {
        "" => NO_AUTHOR,
        a => a,
    };

    // Drop the "(Mon, 15 Jan 2024)" suffix.
    let date_str = fields[2].split(" (").next().unwrap_or("").trim();
    let timestamp = DateTime::parse_from_str(date_str, "%Y-%m-%d %H:%M:%S %z")
        .ok()?
        .with_timezone(&Utc);

    let line_count = fields[fields.len() - 1]
        .split_whitespace()
        .next()
        .and_then(|n| n.parse().ok())
        .unwrap_or(0);

    Some((revision.to_string(), author.to_string(), timestamp, line_count))
}

/// Parse a changed-path line such as `   A /trunk/x.txt (from /trunk/y.txt:41)`.
fn parse_changed_path(line: &str) -> Option<ChangedPath> {
    let trimmed = line.trim();
    let (action, rest) = trimmed.split_once(' ')?;
    if action.len() != 1 {
        return None;
    }
    let rest = rest.trim();
    let path = match rest.find(" (from ") {
        Some(pos) if rest.ends_with(')') => &rest[..pos],
        _ => rest,
    };
    if path.is_empty() {
        return None;
    }
    Some(ChangedPath {
        path: path.to_string(),
        action: action.to_string(),
    })
}

/// Parse the plain-text output of `svn log -v`.
///
/// Entries whose header cannot be parsed are skipped with a warning; the
/// message line count from the header is used to step over messages, so a
/// message containing a dashed line does not split an entry.
pub fn parse_svn_log(text: &str) -> Vec<LogEntry> {
    let lines: Vec<&str> = text.lines().collect();
    let mut entries = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        if line.trim().is_empty() || is_separator(line) {
            i += 1;
            continue;
        }

        let Some((revision, author, timestamp, message_lines)) = parse_header(line) else {
            let preview: String = line.chars().take(100).collect();
            warn!(line = %preview, "Skipping malformed svn log header");
            // Resync on the next separator.
            i += 1;
            while i < lines.len() && !is_separator(lines[i]) {
                i += 1;
            }
            continue;
        };
        i += 1;

        let mut paths = Vec::new();
        if lines.get(i).is_some_and(|l| l.trim() == CHANGED_PATHS) {
            i += 1;
            while i < lines.len() && !lines[i].trim().is_empty() && !is_separator(lines[i]) {
                if let Some(p) = parse_changed_path(lines[i]) {
                    paths.push(p);
                }
                i += 1;
            }
        }

        // Blank line between header block and message.
        if lines.get(i).is_some_and(|l| l.trim().is_empty()) {
            i += 1;
        }

        let end = (i + message_lines).min(lines.len());
        let message = lines[i..end].join("\n");
        i = end;

        entries.push(LogEntry {
            revision,
            author,
            timestamp,
            paths,
            message,
        });
    }

    entries
}

/// Numeric order of revisions; non-numeric ones sort after, lexicographically.
pub fn revision_sort_key(revision: &str) -> (u64, String) {
    match revision.parse::<u64>() {
        Ok(n) => (n, String::new()),
        Err(_) => (u64::MAX, revision.to_string()),
    }
}

fn sort_entries_by_revision(entries: &mut [LogEntry]) {
    entries.sort_by_key(|e| revision_sort_key(&e.revision));
}

// ─── Branch labels ──────────────────────────────────────────────────

static BRANCH_DIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/(?:branches|branch)/([^/]+)/").expect("branch regex is valid")
});

/// Branch label for a repository path.
///
/// `/branches/<name>/…` and `/branch/<name>/…` map to `<name>`; a path with a
/// Maven-style `/src/main/` maps to everything before it (the module root);
/// anything else is `trunk`.
pub fn extract_branch(path: &str) -> String {
    if let Some(caps) = BRANCH_DIR.captures(path) {
        return caps[1].to_string();
    }
    if let Some((prefix, _)) = path.split_once("/src/main/") {
        return prefix.to_string();
    }
    "trunk".to_string()
}

// ─── Revision ranges ────────────────────────────────────────────────

static REVISION_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+|HEAD|BASE|COMMITTED|PREV|\{[^}]+\})(:(\d+|HEAD|BASE|COMMITTED|PREV|\{[^}]+\}))?$")
        .expect("revision range regex is valid")
});

/// Validate an `svn -r` argument such as `100:HEAD` or `{2024-01-01}:{2024-02-01}`.
pub fn validate_revision_range(range: &str) -> Result<()> {
    if REVISION_RANGE.is_match(range.trim()) {
        Ok(())
    } else {
        Err(SvnStatError::InvalidArgs(format!(
            "Invalid revision range '{}': expected N, N:M, HEAD or {{DATE}} forms",
            range
        )))
    }
}

// ─── Date helpers ───────────────────────────────────────────────────

/// Inclusive day-granularity filter applied to commits after logging.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DateFilter {
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
}

/// Validate a YYYY-MM-DD date string.
pub fn validate_date(s: &str) -> Result<NaiveDate> {
    if s.len() != 10 {
        return Err(SvnStatError::InvalidArgs(format!(
            "Invalid date '{}': expected YYYY-MM-DD format",
            s
        )));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| SvnStatError::InvalidArgs(format!("Invalid date '{}': {}", s, e)))
}

impl DateFilter {
    /// Build a filter from optional YYYY-MM-DD bounds.
    pub fn parse(from: Option<&str>, to: Option<&str>) -> Result<Self> {
        let from_date = from.map(validate_date).transpose()?;
        let to_date = to.map(validate_date).transpose()?;
        if let (Some(f), Some(t)) = (from_date, to_date) {
            if f > t {
                return Err(SvnStatError::InvalidArgs(format!(
                    "Start date {} is after end date {}",
                    f, t
                )));
            }
        }
        Ok(Self { from_date, to_date })
    }

    pub fn is_empty(&self) -> bool {
        self.from_date.is_none() && self.to_date.is_none()
    }

    /// Whether the UTC day of `timestamp` falls inside the bounds.
    pub fn contains(&self, timestamp: &DateTime<Utc>) -> bool {
        let day = timestamp.date_naive();
        self.from_date.is_none_or(|f| day >= f) && self.to_date.is_none_or(|t| day <= t)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
#[path = "svn_tests.rs"]
mod tests;
