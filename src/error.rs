//! Error types for repository listing and cloning

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Classified failure of the repository listing API
///
/// Every variant is fatal to a run: a partial listing cannot be trusted.
#[derive(Debug, Error)]
pub enum ListError {
    #[error("Organization '{organization}' not found. Please check the organization name and try again.")]
    OrganizationNotFound { organization: String },

    #[error("GitHub API rate limit exceeded. Rate limit resets at: {}. Consider providing a GitHub token for higher limits.", format_reset(.reset_at))]
    RateLimited { reset_at: Option<DateTime<Utc>> },

    #[error("Network error while fetching repositories: {0}")]
    TransientNetwork(String),

    #[error("GitHub API request failed with status {status}: {body}")]
    UnexpectedApi { status: u16, body: String },
}

impl ListError {
    /// Whether a caller may reasonably retry the request
    pub fn is_transient(&self) -> bool {
        matches!(self, ListError::TransientNetwork(_))
    }
}

impl From<reqwest::Error> for ListError {
    fn from(err: reqwest::Error) -> Self {
        ListError::TransientNetwork(err.to_string())
    }
}

fn format_reset(reset_at: &Option<DateTime<Utc>>) -> String {
    match reset_at {
        Some(at) => at.to_rfc3339(),
        None => "unknown".to_string(),
    }
}

/// Failure of a single `git clone` invocation
#[derive(Debug, Error)]
pub enum GitError {
    #[error("git could not be started: {0}. Please ensure git is installed and in your PATH.")]
    Spawn(#[source] std::io::Error),

    #[error("git clone exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },

    #[error("timeout after {}s", .0.as_secs())]
    Timeout(Duration),
}
