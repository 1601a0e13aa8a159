//! Unified error type for churn analysis.

use thiserror::Error;

/// All errors that can occur while fetching, caching, or aggregating revisions.
///
/// There is intentionally no parse variant: the diff and log parsers skip
/// anything they do not recognise.
#[derive(Error, Debug)]
pub enum SvnStatError {
    /// An `svn` invocation failed (spawn error, non-zero exit, bad output)
    #[error("svn {command} failed: {message}")]
    Retrieval { command: String, message: String },

    /// I/O error reading or writing the cache document
    #[error("Cache I/O error: {0}")]
    CacheIo(#[from] std::io::Error),

    /// Serialization/deserialization error (JSON)
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Results could not be written to the requested output file
    #[error("Cannot write results to {path}: {source}")]
    Output {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Lock poisoned (thread panicked while holding a lock)
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    /// A start request arrived while another analysis is still running
    #[error("An analysis is already running. Wait for it to finish.")]
    AnalysisRunning,

    /// Nothing could be logged for the requested branches and range
    #[error("No commits found for the requested branches and range")]
    NoCommits,

    /// The analysis thread panicked; the run was abandoned
    #[error("Analysis aborted: {0}")]
    AnalysisPanicked(String),

    /// Argument or configuration validation error
    #[error("{0}")]
    InvalidArgs(String),
}

impl SvnStatError {
    pub(crate) fn retrieval(command: &str, message: impl Into<String>) -> Self {
        SvnStatError::Retrieval {
            command: command.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SvnStatError>;
