//! Clone Engine - Orchestrates sequential or bounded-parallel cloning
//!
//! This module turns a stream of repository entries into one outcome per
//! repository. Existing paths are never touched, dry runs never create
//! anything, and a failed clone never stops the rest of the batch.

use crate::discovery::{CloneProtocol, RepoEntry};
use crate::git::CloneRunner;
use futures::stream::{FuturesUnordered, Stream, StreamExt};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::pin::pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// How clone operations are scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneMode {
    /// One at a time, in input order
    Sequential,
    /// At most `max_workers` clones in flight
    Concurrent { max_workers: usize },
}

/// Why a repository was not cloned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Something already exists at the target path
    AlreadyExists,
    /// Dry run: reported, not performed
    DryRun,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadyExists => write!(f, "already exists"),
            SkipReason::DryRun => write!(f, "dry run"),
        }
    }
}

/// Outcome for a single repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloneOutcome {
    Success,
    Skipped(SkipReason),
    Failed(String),
}

impl CloneOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, CloneOutcome::Failed(_))
    }
}

/// Results from a complete clone run, keyed by repository name
#[derive(Debug, Clone)]
pub struct CloneReport {
    pub results: BTreeMap<String, CloneOutcome>,
    pub duration: Duration,
}

impl CloneReport {
    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn successful(&self) -> usize {
        self.count(|o| matches!(o, CloneOutcome::Success))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, CloneOutcome::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(CloneOutcome::is_failure)
    }

    /// Whether the caller should report a non-zero exit
    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    /// Names of repositories that were actually cloned in this run
    pub fn cloned(&self) -> impl Iterator<Item = &str> {
        self.results
            .iter()
            .filter(|(_, outcome)| matches!(outcome, CloneOutcome::Success))
            .map(|(name, _)| name.as_str())
    }

    /// Failed repositories with their error detail
    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.results.iter().filter_map(|(name, outcome)| match outcome {
            CloneOutcome::Failed(detail) => Some((name.as_str(), detail.as_str())),
            _ => None,
        })
    }

    fn count(&self, pred: impl Fn(&CloneOutcome) -> bool) -> usize {
        self.results.values().filter(|o| pred(o)).count()
    }
}

/// Everything the engine needs to know about a run
#[derive(Debug, Clone)]
pub struct CloneOptions {
    pub destination_root: PathBuf,
    pub organization: String,
    pub mode: CloneMode,
    pub dry_run: bool,
    pub timeout: Duration,
    pub protocol: CloneProtocol,
    pub cleanup_on_error: bool,
}

impl CloneOptions {
    /// Options with the defaults for everything but the destination
    pub fn new(destination_root: impl Into<PathBuf>, organization: impl Into<String>) -> Self {
        Self {
            destination_root: destination_root.into(),
            organization: organization.into(),
            mode: CloneMode::Sequential,
            dry_run: false,
            timeout: Duration::from_secs(300),
            protocol: CloneProtocol::Https,
            cleanup_on_error: true,
        }
    }
}

/// The engine that turns repository entries into clone outcomes
#[derive(Clone)]
pub struct CloneEngine {
    options: Arc<CloneOptions>,
    runner: Arc<dyn CloneRunner>,
}

impl CloneEngine {
    pub fn new(options: CloneOptions, runner: Arc<dyn CloneRunner>) -> Self {
        Self {
            options: Arc::new(options),
            runner,
        }
    }

    /// Directory holding all of the organization's clones
    pub fn org_dir(&self) -> PathBuf {
        self.options
            .destination_root
            .join(&self.options.organization)
    }

    /// Where a repository is (or would be) cloned
    pub fn target_path(&self, name: &str) -> PathBuf {
        self.org_dir().join(name)
    }

    /// Process every entry and return one outcome per repository name
    pub async fn clone_all<S>(&self, entries: S) -> CloneReport
    where
        S: Stream<Item = RepoEntry>,
    {
        let start_time = Instant::now();

        if self.options.dry_run {
            info!("DRY RUN MODE - No repositories will be cloned");
        }

        let results = match self.options.mode {
            CloneMode::Sequential => {
                info!("Cloning sequentially into {}", self.org_dir().display());
                self.run_sequential(entries).await
            }
            CloneMode::Concurrent { max_workers } => {
                let max_workers = max_workers.max(1);
                info!(
                    "Cloning in parallel with max_workers={} into {}",
                    max_workers,
                    self.org_dir().display()
                );
                self.run_concurrent(entries, max_workers).await
            }
        };

        let report = CloneReport {
            results,
            duration: start_time.elapsed(),
        };

        info!(
            "Cloning complete in {:.2}s: {} successful, {} skipped, {} failed",
            report.duration.as_secs_f64(),
            report.successful(),
            report.skipped(),
            report.failed()
        );

        report
    }

    /// Convenience wrapper for an already collected listing
    pub async fn clone_entries(&self, entries: Vec<RepoEntry>) -> CloneReport {
        self.clone_all(futures::stream::iter(entries)).await
    }

    async fn run_sequential<S>(&self, entries: S) -> BTreeMap<String, CloneOutcome>
    where
        S: Stream<Item = RepoEntry>,
    {
        let mut entries = pin!(entries);
        let mut results = BTreeMap::new();
        let mut processed = 0usize;

        while let Some(entry) = entries.next().await {
            if results.contains_key(&entry.name) {
                warn!("Duplicate repository name in listing, ignoring: {}", entry.name);
                continue;
            }

            processed += 1;
            debug!("Progress: {} repositories processed", processed);

            let outcome = self.process_entry(&entry).await;
            record(&mut results, entry.name, outcome);
        }

        results
    }

    async fn run_concurrent<S>(&self, entries: S, max_workers: usize) -> BTreeMap<String, CloneOutcome>
    where
        S: Stream<Item = RepoEntry>,
    {
        // Permits bound the number of clones in flight
        let semaphore = Arc::new(Semaphore::new(max_workers));

        let mut entries = pin!(entries);
        let mut futures = FuturesUnordered::new();
        let mut seen = HashSet::new();

        // Units start as soon as they are spawned, so cloning overlaps with listing
        while let Some(entry) = entries.next().await {
            if !seen.insert(entry.name.clone()) {
                warn!("Duplicate repository name in listing, ignoring: {}", entry.name);
                continue;
            }

            let name = entry.name.clone();
            let semaphore = semaphore.clone();
            let engine = self.clone();

            let handle = tokio::spawn(async move {
                match semaphore.acquire_owned().await {
                    Ok(_permit) => engine.process_entry(&entry).await,
                    Err(e) => CloneOutcome::Failed(format!("worker pool closed: {}", e)),
                }
            });

            futures.push(async move {
                let outcome = handle
                    .await
                    .unwrap_or_else(|e| CloneOutcome::Failed(format!("clone task aborted: {}", e)));
                (name, outcome)
            });
        }

        let total = futures.len();
        let mut completed = 0usize;
        let mut results = BTreeMap::new();

        while let Some((name, outcome)) = futures.next().await {
            completed += 1;
            debug!("Progress: {}/{} repositories processed", completed, total);
            record(&mut results, name, outcome);
        }

        results
    }

    /// The per-repository decision: skip, report, or clone
    async fn process_entry(&self, entry: &RepoEntry) -> CloneOutcome {
        let target = self.target_path(&entry.name);

        // Any existing path is left alone, directory or not
        if target.exists() {
            if target.is_dir() {
                warn!(
                    "Repository '{}' already exists at {}, skipping",
                    entry.name,
                    target.display()
                );
            } else {
                warn!(
                    "Path for '{}' exists but is not a directory: {}, skipping",
                    entry.name,
                    target.display()
                );
            }
            return CloneOutcome::Skipped(SkipReason::AlreadyExists);
        }

        if self.options.dry_run {
            info!("[DRY RUN] Would clone {} to {}", entry.name, target.display());
            return CloneOutcome::Skipped(SkipReason::DryRun);
        }

        if let Err(e) = tokio::fs::create_dir_all(self.org_dir()).await {
            return CloneOutcome::Failed(format!(
                "failed to create {}: {}",
                self.org_dir().display(),
                e
            ));
        }

        info!("Cloning {} to {}", entry.name, target.display());

        let url = entry.url_for(self.options.protocol);
        match self
            .runner
            .clone_repository(url, &target, self.options.timeout)
            .await
        {
            Ok(()) => {
                info!("Successfully cloned {}", entry.name);
                CloneOutcome::Success
            }
            Err(e) => {
                error!("Failed to clone {}: {}", entry.name, e);
                if self.options.cleanup_on_error {
                    remove_partial_clone(&target).await;
                }
                CloneOutcome::Failed(e.to_string())
            }
        }
    }
}

fn record(results: &mut BTreeMap<String, CloneOutcome>, name: String, outcome: CloneOutcome) {
    debug!("{}: {:?}", name, outcome);
    results.entry(name).or_insert(outcome);
}

/// The target did not exist before this run, so anything there is ours
async fn remove_partial_clone(target: &Path) {
    if target.exists() {
        if let Err(e) = tokio::fs::remove_dir_all(target).await {
            warn!(
                "Failed to remove partial clone at {}: {}",
                target.display(),
                e
            );
        }
    }
}
