//! Shared test helpers: a scriptable in-memory `SvnClient` and fixtures.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};

use chrono::{DateTime, Utc};

use crate::error::{Result, SvnStatError};
use crate::svn::{ChangedPath, Credentials, LogEntry, SvnClient};

/// Scriptable svn stand-in. Records every call; once [`forbid`](Self::forbid)
/// is set, any call panics so the test fails.
#[derive(Default)]
pub(crate) struct StubSvn {
    logs: HashMap<String, Vec<LogEntry>>,
    diffs: HashMap<String, String>,
    failing_logs: HashSet<String>,
    failing_diffs: HashSet<String>,
    failing_content: HashSet<String>,
    served_paths: Option<HashSet<String>>,
    calls: Mutex<Vec<String>>,
    forbidden: AtomicBool,
    gate: Mutex<Option<Receiver<()>>>,
}

impl StubSvn {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log(mut self, url: &str, entries: Vec<LogEntry>) -> Self {
        self.logs.insert(url.to_string(), entries);
        self
    }

    pub fn with_diff(mut self, revision: &str, diff: &str) -> Self {
        self.diffs.insert(revision.to_string(), diff.to_string());
        self
    }

    pub fn fail_log(mut self, url: &str) -> Self {
        self.failing_logs.insert(url.to_string());
        self
    }

    pub fn fail_diff(mut self, revision: &str) -> Self {
        self.failing_diffs.insert(revision.to_string());
        self
    }

    pub fn fail_content(mut self, path: &str) -> Self {
        self.failing_content.insert(path.to_string());
        self
    }

    /// Serve content only for these exact paths; any other path fails the
    /// way `svn cat` does for a missing node.
    pub fn serve_only(mut self, paths: &[&str]) -> Self {
        self.served_paths = Some(paths.iter().map(|p| p.to_string()).collect());
        self
    }

    /// Block the first log call until the returned sender fires or drops.
    pub fn gated(self) -> (Self, Sender<()>) {
        let (tx, rx) = channel();
        *self.gate.lock().unwrap() = Some(rx);
        (self, tx)
    }

    /// Make every further call fail the test.
    pub fn forbid(&self) {
        self.forbidden.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: String) {
        if self.forbidden.load(Ordering::SeqCst) {
            panic!("unexpected svn call after forbid(): {}", call);
        }
        self.calls.lock().unwrap().push(call);
    }
}

impl SvnClient for StubSvn {
    fn fetch_log(
        &self,
        url: &str,
        _credentials: &Credentials,
        _revision_range: Option<&str>,
    ) -> Result<Vec<LogEntry>> {
        self.record(format!("log {}", url));
        let gate = self.gate.lock().unwrap().take();
        if let Some(rx) = gate {
            let _ = rx.recv();
        }
        if self.failing_logs.contains(url) {
            return Err(SvnStatError::retrieval("log", "E170013: Unable to connect"));
        }
        Ok(self.logs.get(url).cloned().unwrap_or_default())
    }

    fn fetch_diff(&self, _url: &str, revision: &str, _credentials: &Credentials) -> Result<String> {
        self.record(format!("diff {}", revision));
        if self.failing_diffs.contains(revision) {
            return Err(SvnStatError::retrieval("diff", format!("E160006: No such revision {}", revision)));
        }
        Ok(self.diffs.get(revision).cloned().unwrap_or_default())
    }

    fn fetch_file_content(
        &self,
        _url: &str,
        revision: &str,
        path: &str,
        _credentials: &Credentials,
    ) -> Result<Vec<u8>> {
        self.record(format!("cat {}@{}", path, revision));
        if self.failing_content.contains(path) {
            return Err(SvnStatError::retrieval("cat", format!("E195012: '{}' not found", path)));
        }
        if self.served_paths.as_ref().is_some_and(|served| !served.contains(path)) {
            return Err(SvnStatError::retrieval("cat", format!("E160013: path not found: {}", path)));
        }
        Ok(format!("content of {} at r{}", path, revision).into_bytes())
    }

    fn latest_revision(&self, url: &str, _credentials: &Credentials) -> Result<String> {
        self.record(format!("info {}", url));
        Ok(self
            .logs
            .get(url)
            .and_then(|entries| entries.last())
            .map(|e| e.revision.clone())
            .unwrap_or_else(|| "0".to_string()))
    }
}

/// Log entry fixture. `timestamp` is RFC 3339.
pub(crate) fn log_entry(revision: &str, author: &str, timestamp: &str, paths: &[&str]) -> LogEntry {
    LogEntry {
        revision: revision.to_string(),
        author: author.to_string(),
        timestamp: DateTime::parse_from_rfc3339(timestamp)
            .unwrap()
            .with_timezone(&Utc),
        paths: paths
            .iter()
            .map(|p| ChangedPath {
                path: p.to_string(),
                action: "M".to_string(),
            })
            .collect(),
        message: format!("r{}", revision),
    }
}

/// A one-file diff with `added` `+` lines and `deleted` `-` lines.
pub(crate) fn diff_for(path: &str, added: usize, deleted: usize) -> String {
    let mut diff = format!(
        "Index: {path}\n===================================================================\n--- /{path}\t(revision 1)\n+++ /{path}\t(revision 2)\n@@ -1 +1 @@\n"
    );
    for i in 0..added {
        diff.push_str(&format!("+added {}\n", i));
    }
    for i in 0..deleted {
        diff.push_str(&format!("-deleted {}\n", i));
    }
    diff
}
