//! Common test utilities and helpers for org-cloner tests
#![allow(dead_code)]

use async_trait::async_trait;
use org_cloner::{CloneRunner, GitError, RepoEntry};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Repository JSON in the shape the GitHub listing endpoint returns
pub fn repo_json(org: &str, name: &str) -> Value {
    json!({
        "name": name,
        "full_name": format!("{}/{}", org, name),
        "clone_url": format!("https://github.com/{}/{}.git", org, name),
        "ssh_url": format!("git@github.com:{}/{}.git", org, name),
        "description": format!("The {} repository", name),
        "default_branch": "main",
        "fork": false,
        "archived": false,
    })
}

/// A page of `count` repositories named `repo-<offset>` onwards
pub fn repo_page(org: &str, offset: usize, count: usize) -> Value {
    Value::Array(
        (offset..offset + count)
            .map(|i| repo_json(org, &format!("repo-{:04}", i)))
            .collect(),
    )
}

/// `Link` header pointing at the next page
pub fn next_link(base: &str, org: &str, next_page: u32) -> String {
    format!(
        "<{}/orgs/{}/repos?per_page=100&page={}&type=all>; rel=\"next\"",
        base, org, next_page
    )
}

/// Entries for the clone engine, as the lister would produce them
pub fn entries(org: &str, names: &[&str]) -> Vec<RepoEntry> {
    names
        .iter()
        .map(|name| RepoEntry::new(*name, format!("https://github.com/{}/{}.git", org, name)))
        .collect()
}

/// Clone runner that records calls instead of running git
pub struct RecordingRunner {
    calls: Mutex<Vec<(String, PathBuf)>>,
    failing: HashSet<String>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: HashSet::new(),
            delay: Duration::from_millis(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Fail clones whose target directory is named `name`
    pub fn failing_on(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    /// Hold each clone for `delay` so overlapping calls can be observed
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<(String, PathBuf)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CloneRunner for RecordingRunner {
    async fn clone_repository(&self, url: &str, target: &Path, _limit: Duration) -> Result<(), GitError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), target.to_path_buf()));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if self.failing.contains(&name) {
            return Err(GitError::Exit {
                status: "exit status: 128".to_string(),
                stderr: format!("fatal: could not read from remote repository {}", name),
            });
        }

        std::fs::create_dir_all(target.join(".git")).map_err(GitError::Spawn)?;
        Ok(())
    }
}

/// Assertion helpers for test validation
pub fn assert_contains_all(text: &str, expected: &[&str]) {
    for item in expected {
        assert!(
            text.contains(item),
            "Expected text to contain '{}', but it didn't. Text: {}",
            item,
            text
        );
    }
}
