mod common;

use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;
use serde_json::json;
use std::path::Path;
use std::process::{Command, Output};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{assert_contains_all, repo_json, repo_page};

/// Integration tests for the org-cloner binary
/// These tests run the actual binary against a mock GitHub API

const BIN: &str = env!("CARGO_BIN_EXE_org-cloner");

/// Command with a clean environment: no token, no base directory, no user config
fn cli(home: &Path) -> Command {
    let mut cmd = Command::new(BIN);
    cmd.env_remove("GITHUB_TOKEN")
        .env_remove("GITHUB_ORG_CLONE_BASE_DIR")
        .env_remove("RUST_LOG")
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .current_dir(home);
    cmd
}

fn write_config(dir: &TempDir, api_url: &str, base_dir: &Path) -> std::path::PathBuf {
    let config = dir.child("config.yml");
    config
        .write_str(&format!(
            "base_directory: \"{}\"\ngithub:\n  api_url: \"{}\"\n",
            base_dir.display(),
            api_url
        ))
        .unwrap();
    config.path().to_path_buf()
}

/// Config that only points the client at `api_url`
fn write_api_config(dir: &TempDir, api_url: &str) -> std::path::PathBuf {
    let config = dir.child("config.yml");
    config
        .write_str(&format!("github:\n  api_url: \"{}\"\n", api_url))
        .unwrap();
    config.path().to_path_buf()
}

async fn mount_listing(server: &MockServer, count: usize) {
    Mock::given(method("GET"))
        .and(path("/orgs/acme/repos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(repo_page("acme", 0, count)))
        .mount(server)
        .await;
}

async fn run(mut cmd: Command) -> Output {
    tokio::task::spawn_blocking(move || cmd.output().expect("Failed to execute binary"))
        .await
        .unwrap()
}

#[test]
fn test_cli_help() {
    let home = TempDir::new().unwrap();
    let output = cli(home.path()).arg("--help").output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_contains_all(&stdout, &["clone", "list", "init", "--config"]);
}

#[test]
fn test_clone_help_lists_flags() {
    let home = TempDir::new().unwrap();
    let output = cli(home.path()).args(["clone", "--help"]).output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_contains_all(
        &stdout,
        &["--base-dir", "--token", "--parallel", "--max-workers", "--run-setup", "--dry-run", "--ssh"],
    );
}

#[test]
fn test_cli_version() {
    let home = TempDir::new().unwrap();
    let output = cli(home.path()).arg("--version").output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("org-cloner"));
}

#[test]
fn test_missing_base_dir_fails_before_network() {
    let home = TempDir::new().unwrap();
    let output = cli(home.path()).args(["clone", "acme"]).output().unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_contains_all(&stderr, &["Base directory must be provided", "GITHUB_ORG_CLONE_BASE_DIR"]);
}

#[test]
fn test_invalid_org_url_is_rejected() {
    let home = TempDir::new().unwrap();
    let output = cli(home.path())
        .args(["clone", "https://gitlab.com/acme", "--base-dir"])
        .arg(home.path())
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Invalid GitHub URL"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dry_run_lists_without_cloning() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orgs/acme/repos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(repo_page("acme", 0, 3)))
        .mount(&server)
        .await;

    let home = TempDir::new().unwrap();
    let base = home.child("dev");
    let config = write_config(&home, &server.uri(), base.path());

    let mut cmd = cli(home.path());
    cmd.arg("--config").arg(&config).args(["clone", "acme", "--dry-run"]);
    let output = run(cmd).await;

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_contains_all(&stdout, &["Would clone: repo-0000", "Skipped: 3", "Failed: 0"]);
    base.child("acme").assert(predicate::path::missing());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dry_run_lists_only_what_it_would_clone() {
    let server = MockServer::start().await;
    mount_listing(&server, 3).await;

    let home = TempDir::new().unwrap();
    let base = home.child("dev");
    base.child("acme/repo-0000").create_dir_all().unwrap();
    base.child("acme/repo-0001").write_str("not a checkout").unwrap();
    let config = write_config(&home, &server.uri(), base.path());

    let mut cmd = cli(home.path());
    cmd.arg("--config").arg(&config).args(["clone", "acme", "--dry-run"]);
    let output = run(cmd).await;

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("Would clone: repo-0000"), "stdout: {}", stdout);
    assert!(!stdout.contains("Would clone: repo-0001"), "stdout: {}", stdout);
    assert_contains_all(&stdout, &["Would clone: repo-0002", "Skipped: 3", "Failed: 0"]);
    base.child("acme/repo-0002").assert(predicate::path::missing());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_base_dir_from_dotenv_file() {
    let server = MockServer::start().await;
    mount_listing(&server, 1).await;

    let home = TempDir::new().unwrap();
    let from_dotenv = home.path().join("from-dotenv");
    home.child(".env")
        .write_str(&format!("GITHUB_ORG_CLONE_BASE_DIR={}\n", from_dotenv.display()))
        .unwrap();
    let config = write_api_config(&home, &server.uri());

    let mut cmd = cli(home.path());
    cmd.arg("--config").arg(&config).args(["clone", "acme", "--dry-run"]);
    let output = run(cmd).await;

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let expected = format!("-> {}", from_dotenv.join("acme").join("repo-0000").display());
    assert!(stdout.contains(&expected), "stdout: {}", stdout);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_environment_wins_over_dotenv_file() {
    let server = MockServer::start().await;
    mount_listing(&server, 1).await;

    let home = TempDir::new().unwrap();
    let from_env = home.path().join("from-env");
    home.child(".env")
        .write_str(&format!(
            "GITHUB_ORG_CLONE_BASE_DIR={}\n",
            home.path().join("from-dotenv").display()
        ))
        .unwrap();
    let config = write_api_config(&home, &server.uri());

    let mut cmd = cli(home.path());
    cmd.env("GITHUB_ORG_CLONE_BASE_DIR", &from_env)
        .arg("--config")
        .arg(&config)
        .args(["clone", "acme", "--dry-run"]);
    let output = run(cmd).await;

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(&from_env.display().to_string()), "stdout: {}", stdout);
    assert!(!stdout.contains("from-dotenv"), "stdout: {}", stdout);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_org_exits_with_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orgs/ghost/repos"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})))
        .mount(&server)
        .await;

    let home = TempDir::new().unwrap();
    let config = write_config(&home, &server.uri(), &home.path().join("dev"));

    let mut cmd = cli(home.path());
    cmd.arg("--config").arg(&config).args(["clone", "ghost", "--dry-run"]);
    let output = run(cmd).await;

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("'ghost' not found"), "stderr: {}", stderr);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_empty_org_is_not_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orgs/quiet/repos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let home = TempDir::new().unwrap();
    let config = write_config(&home, &server.uri(), &home.path().join("dev"));

    let mut cmd = cli(home.path());
    cmd.arg("--config").arg(&config).args(["clone", "quiet", "--dry-run"]);
    let output = run(cmd).await;

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("No repositories to clone"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_list_prints_repositories() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orgs/acme/repos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            repo_json("acme", "widgets"),
            repo_json("acme", "gadgets"),
        ])))
        .mount(&server)
        .await;

    let home = TempDir::new().unwrap();
    let config = write_config(&home, &server.uri(), &home.path().join("dev"));

    let mut cmd = cli(home.path());
    cmd.arg("--config").arg(&config).args(["list", "acme", "--details"]);
    let output = run(cmd).await;

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_contains_all(
        &stdout,
        &["Repositories (2):", "widgets", "gadgets", "https://github.com/acme/widgets.git"],
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_clone_sets_exit_code() {
    if Command::new("git").arg("--version").output().is_err() {
        eprintln!("git not installed, skipping");
        return;
    }

    let home = TempDir::new().unwrap();
    let missing_upstream = home.path().join("no-such-upstream");

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orgs/acme/repos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "name": "broken",
            "clone_url": missing_upstream.to_string_lossy(),
        }])))
        .mount(&server)
        .await;

    let base = home.child("dev");
    let config = write_config(&home, &server.uri(), base.path());

    let mut cmd = cli(home.path());
    cmd.arg("--config").arg(&config).args(["clone", "acme"]);
    let output = run(cmd).await;

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_contains_all(&stdout, &["Failed: 1", "broken:"]);
    base.child("acme/broken").assert(predicate::path::missing());
}

#[test]
fn test_init_writes_config() {
    let home = TempDir::new().unwrap();
    let config = home.child("cfg/config.yml");
    let base = home.child("repos");

    let output = cli(home.path())
        .arg("--config")
        .arg(config.path())
        .args(["init", "--base-dir"])
        .arg(base.path())
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    config.assert(predicate::str::contains("base_directory"));
    base.assert(predicate::path::is_dir());
}
