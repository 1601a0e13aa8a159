//! Optional JSON configuration file.
//!
//! Every field has a default, and a missing or unparsable file yields the
//! defaults, so the tool runs with no configuration at all. Command-line
//! flags override whatever is loaded here.

use std::path::{Path, PathBuf};

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::svn::Credentials;

/// Default look-back window when neither a revision range nor a start date
/// is given.
pub const DEFAULT_LOG_RANGE_DAYS: u32 = 180;

/// Name of the per-user cache subdirectory.
const CACHE_SUBDIR: &str = "svnstat";

/// Default cache directory (`<data_local_dir>/svnstat`).
pub fn default_cache_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CACHE_SUBDIR)
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Repository root, e.g. `http://svn.example.com/repo`.
    pub svn_base_url: Option<String>,
    /// Path under `svn_base_url` analyzed when no URL is given.
    pub default_branch: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// 0 disables the default window.
    pub log_range_days: u32,
    pub cache_dir: Option<PathBuf>,
    pub jobs: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            svn_base_url: None,
            default_branch: "trunk".to_string(),
            username: None,
            password: None,
            log_range_days: DEFAULT_LOG_RANGE_DAYS,
            cache_dir: None,
            jobs: 1,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("svn_base_url", &self.svn_base_url)
            .field("default_branch", &self.default_branch)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("log_range_days", &self.log_range_days)
            .field("cache_dir", &self.cache_dir)
            .field("jobs", &self.jobs)
            .finish()
    }
}

impl Config {
    /// Load `path`, falling back to defaults when it is missing or invalid.
    pub fn load(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No config file, using defaults");
                return Self::default();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read config file, using defaults");
                return Self::default();
            }
        };
        match serde_json::from_str::<Config>(&text) {
            Ok(config) => {
                info!(
                    path = %path.display(),
                    base_url = config.svn_base_url.as_deref().unwrap_or(""),
                    branch = %config.default_branch,
                    "Config loaded"
                );
                config
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to parse config file, using defaults");
                Self::default()
            }
        }
    }

    /// `svn_base_url` joined with `default_branch`, if a base URL is set.
    pub fn default_branch_url(&self) -> Option<String> {
        let base = self.svn_base_url.as_deref()?.trim_end_matches('/');
        if base.is_empty() {
            return None;
        }
        let branch = self.default_branch.trim_matches('/');
        if branch.is_empty() {
            Some(base.to_string())
        } else {
            Some(format!("{}/{}", base, branch))
        }
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(default_cache_dir)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.username.clone(), self.password.clone())
    }

    /// First day of the default look-back window ending on `today`.
    pub fn default_start_date(&self, today: NaiveDate) -> Option<NaiveDate> {
        if self.log_range_days == 0 {
            return None;
        }
        today.checked_sub_days(Days::new(u64::from(self.log_range_days)))
    }
}
