use anyhow::{bail, Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::clone::CloneMode;
use crate::discovery::CloneProtocol;

/// Environment variable naming the base directory for clones
pub const BASE_DIR_ENV: &str = "GITHUB_ORG_CLONE_BASE_DIR";

/// Environment variable holding a GitHub personal access token
pub const TOKEN_ENV: &str = "GITHUB_TOKEN";

/// Main configuration structure
///
/// Built once at startup from the config file, the environment and command-line
/// flags (in increasing order of precedence), then passed down by reference.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    /// Base directory under which `<org>/<repo>` trees are created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_directory: Option<String>,

    /// GitHub API settings
    #[serde(default)]
    pub github: GitHubConfig,

    /// Clone behavior settings
    #[serde(default)]
    pub clone: CloneConfig,

    /// Repository filtering
    #[serde(default)]
    pub filters: FilterConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// GitHub API configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GitHubConfig {
    /// API root, overridable for GitHub Enterprise
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Personal access token (raises the API rate limit)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Timeout for each API request in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

/// Clone behavior configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CloneConfig {
    /// Clone repositories concurrently
    #[serde(default)]
    pub parallel: bool,

    /// Maximum concurrent clones (defaults to available parallelism)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_workers: Option<usize>,

    /// Timeout for each git clone in seconds
    #[serde(default = "default_clone_timeout")]
    pub timeout: u64,

    /// Clone over HTTPS or SSH
    #[serde(default)]
    pub protocol: CloneProtocol,

    /// Run setup scripts after cloning
    #[serde(default)]
    pub run_setup: bool,

    /// Timeout for each setup script in seconds
    #[serde(default = "default_setup_timeout")]
    pub setup_timeout: u64,

    /// Remove partially cloned directories after a failed clone
    #[serde(default = "default_true")]
    pub cleanup_on_error: bool,
}

/// Repository filtering configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FilterConfig {
    /// Repository exclusion patterns (exact names or `*` globs)
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Include forked repositories
    #[serde(default = "default_true")]
    pub include_forks: bool,

    /// Include archived repositories
    #[serde(default = "default_true")]
    pub include_archived: bool,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level used when neither RUST_LOG nor --verbose is given
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Command-line values that take precedence over file and environment
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub base_dir: Option<String>,
    pub token: Option<String>,
    pub parallel: bool,
    pub max_workers: Option<usize>,
    pub run_setup: bool,
    pub ssh: bool,
}

// Default value functions
fn default_api_url() -> String {
    "https://api.github.com".to_string()
}
fn default_request_timeout() -> u64 {
    30
}
fn default_clone_timeout() -> u64 {
    300
}
fn default_setup_timeout() -> u64 {
    300
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}

impl GitHubConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

// Default implementations
impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token: None,
            request_timeout: default_request_timeout(),
        }
    }
}

impl Default for CloneConfig {
    fn default() -> Self {
        Self {
            parallel: false,
            max_workers: None,
            timeout: default_clone_timeout(),
            protocol: CloneProtocol::default(),
            run_setup: false,
            setup_timeout: default_setup_timeout(),
            cleanup_on_error: default_true(),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            exclude_patterns: Vec::new(),
            include_forks: default_true(),
            include_archived: default_true(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, or defaults if there is none
    ///
    /// Unlike `init`, this never writes a file.
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            tracing::debug!("No configuration file at {:?}, using defaults", config_path);
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    /// Save configuration to a file, creating its directory if needed
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("org-cloner").join("config.yml"))
    }

    /// Layer environment variables over file values
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(base_dir) = lookup(BASE_DIR_ENV).filter(|v| !v.trim().is_empty()) {
            self.base_directory = Some(base_dir);
        }
        if let Some(token) = lookup(TOKEN_ENV).filter(|v| !v.trim().is_empty()) {
            self.github.token = Some(token);
        }
    }

    /// Layer command-line flags over everything else
    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(base_dir) = &overrides.base_dir {
            self.base_directory = Some(base_dir.clone());
        }
        if let Some(token) = &overrides.token {
            self.github.token = Some(token.clone());
        }
        if overrides.parallel {
            self.clone.parallel = true;
        }
        if overrides.max_workers.is_some() {
            self.clone.max_workers = overrides.max_workers;
        }
        if overrides.run_setup {
            self.clone.run_setup = true;
        }
        if overrides.ssh {
            self.clone.protocol = CloneProtocol::Ssh;
        }
    }

    /// Check values that cannot be expressed in the type system
    pub fn validate(&self) -> Result<()> {
        if self.clone.max_workers == Some(0) {
            bail!("max_workers must be at least 1");
        }
        if self.clone.timeout == 0 {
            bail!("clone timeout must be at least 1 second");
        }
        if self.github.request_timeout == 0 {
            bail!("github request_timeout must be at least 1 second");
        }
        Ok(())
    }

    /// Resolved, absolute base directory
    pub fn base_dir(&self) -> Result<PathBuf> {
        let raw = match self.base_directory.as_deref().map(str::trim) {
            Some(dir) if !dir.is_empty() => dir,
            _ => bail!(
                "Base directory must be provided via --base-dir flag, \
                 {} environment variable, .env file, or config file",
                BASE_DIR_ENV
            ),
        };

        let expanded = shellexpand::full(raw).context("Failed to expand base_directory path")?;
        let path = PathBuf::from(expanded.as_ref());

        let absolute = if path.is_absolute() {
            path
        } else {
            std::env::current_dir()
                .context("Failed to determine current directory")?
                .join(path)
        };

        Ok(path_clean::clean(absolute))
    }

    /// Sequential or bounded-concurrent execution
    pub fn clone_mode(&self) -> CloneMode {
        if self.clone.parallel {
            CloneMode::Concurrent {
                max_workers: self.clone.max_workers.unwrap_or_else(default_max_workers),
            }
        } else {
            CloneMode::Sequential
        }
    }

    pub fn clone_timeout(&self) -> Duration {
        Duration::from_secs(self.clone.timeout)
    }

    pub fn setup_timeout(&self) -> Duration {
        Duration::from_secs(self.clone.setup_timeout)
    }
}

/// Clones are I/O-bound, so the CPU count is only a starting point
pub fn default_max_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
