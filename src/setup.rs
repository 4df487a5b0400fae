//! Post-clone project setup detection
//!
//! Looks for well-known marker files in a freshly cloned repository and
//! suggests how to set it up. A `setup.sh` script can be run automatically.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command as AsyncCommand;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Kind of project recognized from its marker files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectKind {
    SetupScript,
    Node,
    Python,
    Ruby,
    Go,
    Rust,
    Make,
}

impl ProjectKind {
    /// What the user may want to run next
    pub fn suggestion(&self) -> &'static str {
        match self {
            ProjectKind::SetupScript => "Found setup.sh. Run it manually or use --run-setup.",
            ProjectKind::Node => "Detected Node.js project. You may want to run 'npm install' or 'yarn install'.",
            ProjectKind::Python => "Detected Python project. You may want to create a virtual environment and install dependencies.",
            ProjectKind::Ruby => "Detected Ruby project. You may want to run 'bundle install'.",
            ProjectKind::Go => "Detected Go project. You may want to run 'go mod download'.",
            ProjectKind::Rust => "Detected Rust project. You may want to run 'cargo build'.",
            ProjectKind::Make => "Found Makefile. You may want to check 'make help' or run 'make'.",
        }
    }
}

const MARKERS: &[(ProjectKind, &[&str])] = &[
    (ProjectKind::SetupScript, &["setup.sh"]),
    (ProjectKind::Node, &["package.json"]),
    (ProjectKind::Python, &["pyproject.toml", "requirements.txt", "setup.py"]),
    (ProjectKind::Ruby, &["Gemfile"]),
    (ProjectKind::Go, &["go.mod"]),
    (ProjectKind::Rust, &["Cargo.toml"]),
    (ProjectKind::Make, &["Makefile"]),
];

/// Detect project kinds from marker files in `repo_path`
pub fn detect(repo_path: &Path) -> Vec<ProjectKind> {
    MARKERS
        .iter()
        .filter(|(_, files)| files.iter().any(|f| repo_path.join(f).is_file()))
        .map(|(kind, _)| *kind)
        .collect()
}

/// Python install command matching the marker that was found
pub fn python_install_hint(repo_path: &Path) -> Option<&'static str> {
    if repo_path.join("pyproject.toml").is_file() {
        Some("python -m venv venv && source venv/bin/activate && pip install -e .")
    } else if repo_path.join("requirements.txt").is_file() {
        Some("python -m venv venv && source venv/bin/activate && pip install -r requirements.txt")
    } else {
        None
    }
}

/// What happened to one repository's setup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStatus {
    NotRun,
    Succeeded,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct SetupReport {
    pub path: PathBuf,
    pub kinds: Vec<ProjectKind>,
    pub script: ScriptStatus,
}

/// Inspect one repository, running `setup.sh` when `auto_run` is set
pub async fn run_optional_setup(repo_path: &Path, auto_run: bool, limit: Duration) -> SetupReport {
    let name = repo_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| repo_path.display().to_string());

    let kinds = detect(repo_path);
    let mut script = ScriptStatus::NotRun;

    info!("Checking for setup options in {}", name);

    for kind in &kinds {
        if *kind == ProjectKind::SetupScript && auto_run {
            info!("Found setup.sh in {}, running it...", name);
            script = match run_setup_script(repo_path, limit).await {
                Ok(()) => {
                    info!("Setup script completed successfully for {}", name);
                    ScriptStatus::Succeeded
                }
                Err(e) => {
                    error!("Setup script failed for {}: {:#}", name, e);
                    ScriptStatus::Failed(format!("{:#}", e))
                }
            };
            continue;
        }

        info!("  {}: {}", name, kind.suggestion());
        if *kind == ProjectKind::Python {
            if let Some(hint) = python_install_hint(repo_path) {
                info!("    {}", hint);
            }
        }
    }

    SetupReport {
        path: repo_path.to_path_buf(),
        kinds,
        script,
    }
}

/// Run setup checks for every cloned repository, one at a time
pub async fn run_setup_for_all(repo_paths: &[PathBuf], auto_run: bool, limit: Duration) -> Vec<SetupReport> {
    if repo_paths.is_empty() {
        return Vec::new();
    }

    info!("Checking setup options for {} repositories...", repo_paths.len());

    let mut reports = Vec::with_capacity(repo_paths.len());
    for path in repo_paths {
        if !path.is_dir() {
            warn!("Repository path does not exist: {}", path.display());
            continue;
        }
        reports.push(run_optional_setup(path, auto_run, limit).await);
    }
    reports
}

async fn run_setup_script(repo_path: &Path, limit: Duration) -> Result<()> {
    let child = AsyncCommand::new("bash")
        .arg("setup.sh")
        .current_dir(repo_path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .context("Failed to start bash")?;

    let output = timeout(limit, child.wait_with_output())
        .await
        .map_err(|_| anyhow!("timeout after {}s", limit.as_secs()))?
        .context("Failed to wait for setup script")?;

    if !output.stdout.is_empty() {
        debug!("Setup output: {}", String::from_utf8_lossy(&output.stdout));
    }

    if !output.status.success() {
        return Err(anyhow!(
            "setup.sh exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }

    Ok(())
}
