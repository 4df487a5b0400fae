use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command as AsyncCommand;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::GitError;

/// The external clone operation
///
/// Implemented by [`GitClient`]; tests substitute their own runner.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CloneRunner: Send + Sync {
    /// Clone `url` into `target`, giving up after `limit`
    async fn clone_repository(&self, url: &str, target: &Path, limit: Duration) -> Result<(), GitError>;
}

/// Runs `git` as a subprocess
#[derive(Debug, Clone)]
pub struct GitClient {
    program: OsString,
}

impl Default for GitClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GitClient {
    pub fn new() -> Self {
        Self::with_program("git")
    }

    /// Use a different executable in place of `git`
    pub fn with_program(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Fail early when git is not installed
    pub async fn check_available(&self) -> Result<String> {
        let output = AsyncCommand::new(&self.program)
            .arg("--version")
            .output()
            .await
            .context("git command not found. Please ensure git is installed and in your PATH.")?;

        if !output.status.success() {
            return Err(anyhow!(
                "git --version failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!("Found {}", version);
        Ok(version)
    }
}

#[async_trait]
impl CloneRunner for GitClient {
    async fn clone_repository(&self, url: &str, target: &Path, limit: Duration) -> Result<(), GitError> {
        debug!("Using clone URL: {}", url);

        let child = AsyncCommand::new(&self.program)
            .arg("clone")
            .arg(url)
            .arg(target)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(GitError::Spawn)?;

        // Dropping the pending future on timeout drops the child, which kills it
        let output = match timeout(limit, child.wait_with_output()).await {
            Ok(result) => result.map_err(GitError::Spawn)?,
            Err(_) => {
                warn!("git clone timed out for {} after {}s", url, limit.as_secs());
                return Err(GitError::Timeout(limit));
            }
        };

        if !output.status.success() {
            return Err(GitError::Exit {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}
