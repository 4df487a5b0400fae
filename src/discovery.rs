//! Repository directory entries and filtering
//!
//! A [`RepoEntry`] is the provider-agnostic description of one repository in
//! an organization listing. It carries everything the clone engine needs and
//! nothing it is allowed to change.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::FilterConfig;

/// Clone transport preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CloneProtocol {
    /// Use HTTPS (https://github.com/org/repo.git)
    #[default]
    Https,
    /// Use SSH (git@github.com:org/repo.git)
    Ssh,
}

/// One repository of an organization listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoEntry {
    /// Repository name, unique within the organization
    pub name: String,

    /// HTTPS clone URL
    pub clone_url: String,

    /// SSH clone URL, if the API reported one
    pub ssh_url: Option<String>,

    pub description: Option<String>,

    pub default_branch: Option<String>,

    pub is_fork: bool,

    pub is_archived: bool,
}

impl RepoEntry {
    /// Minimal entry with only a name and an HTTPS URL
    pub fn new(name: impl Into<String>, clone_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            clone_url: clone_url.into(),
            ssh_url: None,
            description: None,
            default_branch: None,
            is_fork: false,
            is_archived: false,
        }
    }

    /// URL to clone from for the given protocol, falling back to HTTPS
    pub fn url_for(&self, protocol: CloneProtocol) -> &str {
        match (protocol, &self.ssh_url) {
            (CloneProtocol::Ssh, Some(ssh)) => ssh,
            _ => &self.clone_url,
        }
    }
}

/// Repository as returned by `GET /orgs/{org}/repos`
///
/// Only the fields this crate reads; everything else in the payload is ignored.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiRepository {
    name: String,
    clone_url: String,
    #[serde(default)]
    ssh_url: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    default_branch: Option<String>,
    #[serde(default)]
    fork: bool,
    #[serde(default)]
    archived: bool,
}

impl From<ApiRepository> for RepoEntry {
    fn from(repo: ApiRepository) -> Self {
        Self {
            name: repo.name,
            clone_url: repo.clone_url,
            ssh_url: repo.ssh_url,
            description: repo.description,
            default_branch: repo.default_branch,
            is_fork: repo.fork,
            is_archived: repo.archived,
        }
    }
}

/// Decides which listed repositories are handed to the clone engine
#[derive(Debug, Clone)]
pub struct RepoFilter {
    exclude: Vec<Regex>,
    include_forks: bool,
    include_archived: bool,
}

impl RepoFilter {
    pub fn new(config: &FilterConfig) -> Self {
        let exclude = config
            .exclude_patterns
            .iter()
            .filter_map(|pattern| compile_pattern(pattern))
            .collect();

        Self {
            exclude,
            include_forks: config.include_forks,
            include_archived: config.include_archived,
        }
    }

    /// Whether the entry should be cloned
    pub fn accepts(&self, entry: &RepoEntry) -> bool {
        if self.exclude.iter().any(|re| re.is_match(&entry.name)) {
            debug!("Excluding repository due to pattern match: {}", entry.name);
            return false;
        }

        if entry.is_fork && !self.include_forks {
            debug!("Excluding fork repository: {}", entry.name);
            return false;
        }

        if entry.is_archived && !self.include_archived {
            debug!("Excluding archived repository: {}", entry.name);
            return false;
        }

        true
    }
}

/// Exact names match literally; `*` matches any run of characters
fn compile_pattern(pattern: &str) -> Option<Regex> {
    let escaped = regex::escape(pattern).replace(r"\*", ".*");
    match Regex::new(&format!("^{}$", escaped)) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!("Ignoring invalid exclusion pattern '{}': {}", pattern, e);
            None
        }
    }
}
