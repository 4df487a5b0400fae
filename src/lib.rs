//! org-cloner - Clone every repository of a GitHub organization
//!
//! Lists an organization's repositories through the GitHub REST API and clones
//! each one into `<base_dir>/<org>/<repo>`, leaving existing checkouts alone.
//!
//! ## Core Features
//!
//! - **Lazy Listing**: Pages are fetched only as the repository stream is consumed
//! - **Error Classification**: Missing organizations, rate limits and network failures are told apart
//! - **Bounded Concurrency**: Clones run sequentially or with a fixed number of workers
//! - **Failure Isolation**: One failed clone never stops the others
//! - **Dry Run**: Report what would be cloned without touching the filesystem
//!
//! ## Modules
//!
//! - [`config`]: Configuration layering (file, environment, flags)
//! - [`github`]: Paginated organization listing
//! - [`git`]: The `git clone` subprocess
//! - [`clone`]: Clone orchestration and reporting
//! - [`discovery`]: Repository entries and filtering
//! - [`setup`]: Post-clone project setup detection

pub mod clone;
pub mod config;
pub mod discovery;
pub mod error;
pub mod git;
pub mod github;
pub mod setup;

pub use clone::{CloneEngine, CloneMode, CloneOptions, CloneOutcome, CloneReport, SkipReason};
pub use config::Config;
pub use discovery::{CloneProtocol, RepoEntry, RepoFilter};
pub use error::{GitError, ListError};
pub use git::{CloneRunner, GitClient};
pub use github::GitHubClient;
