use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use org_cloner::config::Overrides;
use org_cloner::github::parse_org_name;
use org_cloner::setup::{run_setup_for_all, ScriptStatus};
use org_cloner::{
    CloneEngine, CloneOptions, CloneOutcome, Config, GitClient, GitHubClient, RepoEntry, RepoFilter,
    SkipReason,
};

#[derive(Parser)]
#[command(name = "org-cloner")]
#[command(about = "Clone all repositories from a GitHub organization")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Clone every repository of an organization
    Clone {
        /// Organization name or GitHub URL (e.g. https://github.com/acme)
        org: String,

        /// Base directory for clones (overrides GITHUB_ORG_CLONE_BASE_DIR)
        #[arg(short, long)]
        base_dir: Option<String>,

        /// GitHub personal access token (overrides GITHUB_TOKEN)
        #[arg(long)]
        token: Option<String>,

        /// Clone repositories concurrently
        #[arg(long)]
        parallel: bool,

        /// Maximum concurrent clones when --parallel is set
        #[arg(long)]
        max_workers: Option<usize>,

        /// Run setup.sh in each newly cloned repository
        #[arg(long)]
        run_setup: bool,

        /// Show what would be cloned without cloning
        #[arg(long)]
        dry_run: bool,

        /// Clone over SSH instead of HTTPS
        #[arg(long)]
        ssh: bool,
    },

    /// List an organization's repositories
    List {
        /// Organization name or GitHub URL
        org: String,

        /// GitHub personal access token (overrides GITHUB_TOKEN)
        #[arg(long)]
        token: Option<String>,

        /// Show repository details
        #[arg(long)]
        details: bool,
    },

    /// Write a configuration file
    Init {
        /// Base directory for clones
        #[arg(short, long)]
        base_dir: Option<String>,
    },
}

struct CloneArgs {
    org: String,
    dry_run: bool,
    overrides: Overrides,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Variables already in the environment win over the .env file
    let dotenv_path = dotenvy::dotenv().ok();

    let creating = matches!(cli.command, Commands::Init { .. });
    let mut config = load_config(cli.config.as_ref(), creating)?;

    init_logging(cli.verbose, &config.logging.level)?;
    info!("Starting org-cloner v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = dotenv_path {
        debug!("Loaded environment from {}", path.display());
    }

    match cli.command {
        Commands::Clone {
            org,
            base_dir,
            token,
            parallel,
            max_workers,
            run_setup,
            dry_run,
            ssh,
        } => {
            let args = CloneArgs {
                org,
                dry_run,
                overrides: Overrides {
                    base_dir,
                    token,
                    parallel,
                    max_workers,
                    run_setup,
                    ssh,
                },
            };
            config.apply_env();
            cmd_clone(args, config).await
        }
        Commands::List {
            org,
            token,
            details,
        } => {
            config.apply_env();
            config.apply_overrides(&Overrides {
                token,
                ..Overrides::default()
            });
            cmd_list(&org, details, &config).await
        }
        Commands::Init { base_dir } => cmd_init(base_dir, cli.config, config),
    }
}

/// Initialize logging; RUST_LOG wins over --verbose, which wins over the config file
fn init_logging(verbose: bool, configured_level: &str) -> Result<()> {
    let fallback = if verbose { "debug" } else { configured_level };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .with_context(|| format!("Invalid log level: {}", fallback))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}

/// Load configuration from specified path or default location
///
/// `init` may name a file that does not exist yet.
fn load_config(config_path: Option<&PathBuf>, allow_missing: bool) -> Result<Config> {
    match config_path {
        Some(path) if allow_missing && !path.exists() => Ok(Config::default()),
        Some(path) => Config::load(path),
        None => Config::load_or_default(),
    }
}

/// Clone every repository of an organization
async fn cmd_clone(args: CloneArgs, mut config: Config) -> Result<()> {
    config.apply_overrides(&args.overrides);
    config.validate()?;

    // Resolve the destination before touching the network
    let base_dir = config.base_dir()?;
    let org = parse_org_name(&args.org)?;

    info!("Organization: {}", org);
    info!("Base directory: {}", base_dir.display());

    let git = GitClient::new();
    if !args.dry_run {
        git.check_available().await?;
    }

    let client = GitHubClient::from_config(&config.github)?;
    let repositories = client
        .list_all(&org)
        .await
        .with_context(|| format!("Failed to list repositories for {}", org))?;

    let repositories = apply_filters(repositories, &config);
    if repositories.is_empty() {
        warn!("No repositories found for organization: {}", org);
        println!("No repositories to clone for {}", org);
        return Ok(());
    }

    println!("Found {} repositories in {}", repositories.len(), org);

    let options = CloneOptions {
        mode: config.clone_mode(),
        dry_run: args.dry_run,
        timeout: config.clone_timeout(),
        protocol: config.clone.protocol,
        cleanup_on_error: config.clone.cleanup_on_error,
        ..CloneOptions::new(&base_dir, &org)
    };
    let engine = CloneEngine::new(options, Arc::new(git));

    let report = engine.clone_entries(repositories).await;

    if args.dry_run {
        for (name, outcome) in &report.results {
            if *outcome == CloneOutcome::Skipped(SkipReason::DryRun) {
                println!("  Would clone: {} -> {}", name, engine.target_path(name).display());
            }
        }
    }

    println!("\nSummary:");
    println!("  Total repositories: {}", report.total());
    println!("  Successful: {}", report.successful());
    println!("  Skipped: {}", report.skipped());
    println!("  Failed: {}", report.failed());
    println!("  Duration: {:.2}s", report.duration.as_secs_f64());

    if report.has_failures() {
        println!("\nFailed repositories:");
        for (name, error) in report.failures() {
            println!("  {}: {}", name, error);
        }
    }

    if config.clone.run_setup && !args.dry_run {
        let cloned: Vec<PathBuf> = report.cloned().map(|name| engine.target_path(name)).collect();
        let reports = run_setup_for_all(&cloned, true, config.setup_timeout()).await;
        let failed_setups = reports
            .iter()
            .filter(|r| matches!(r.script, ScriptStatus::Failed(_)))
            .count();
        if failed_setups > 0 {
            warn!("{} setup scripts failed", failed_setups);
        }
    }

    if report.has_failures() {
        std::process::exit(1);
    }

    Ok(())
}

/// List an organization's repositories
async fn cmd_list(org: &str, details: bool, config: &Config) -> Result<()> {
    let org = parse_org_name(org)?;
    info!("Listing repositories for {}...", org);

    let client = GitHubClient::from_config(&config.github)?;
    let repositories = client
        .list_all(&org)
        .await
        .with_context(|| format!("Failed to list repositories for {}", org))?;
    let repositories = apply_filters(repositories, config);

    println!("Repositories ({}):", repositories.len());

    for repo in repositories {
        if details {
            println!("{}", repo.name);
            if let Some(description) = &repo.description {
                println!("   {}", description);
            }
            if let Some(branch) = &repo.default_branch {
                println!("   Default branch: {}", branch);
            }
            if repo.is_fork {
                println!("   Fork");
            }
            if repo.is_archived {
                println!("   Archived");
            }
            println!("   {}", repo.url_for(config.clone.protocol));
            println!();
        } else {
            println!("  {}", repo.name);
        }
    }

    Ok(())
}

/// Write a configuration file
fn cmd_init(base_dir: Option<String>, config_path: Option<PathBuf>, mut config: Config) -> Result<()> {
    info!("Initializing org-cloner...");

    if let Some(base_dir) = base_dir {
        config.base_directory = Some(base_dir);
    }

    if config.base_directory.is_some() {
        let resolved = config.base_dir()?;
        std::fs::create_dir_all(&resolved)
            .with_context(|| format!("Failed to create base directory: {:?}", resolved))?;
        info!("Base directory set to: {}", resolved.display());
    }

    let config_path = match config_path {
        Some(path) => path,
        None => Config::default_config_path()?,
    };
    config.save(&config_path)?;

    println!("org-cloner initialized successfully!");
    println!("   Config: {:?}", config_path);
    if let Some(base_dir) = &config.base_directory {
        println!("   Base directory: {}", base_dir);
    }

    Ok(())
}

fn apply_filters(repositories: Vec<RepoEntry>, config: &Config) -> Vec<RepoEntry> {
    let filter = RepoFilter::new(&config.filters);
    repositories.into_iter().filter(|repo| filter.accepts(repo)).collect()
}
