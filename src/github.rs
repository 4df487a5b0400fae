use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use futures::stream::{self, Stream, TryStreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK, RETRY_AFTER};
use reqwest::{Client, StatusCode, Url};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::GitHubConfig;
use crate::discovery::{ApiRepository, RepoEntry};
use crate::error::ListError;

/// Maximum page size the GitHub API allows
pub const PER_PAGE: u32 = 100;

static ORG_NAME_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?$").unwrap());

/// Client for the organization repository listing endpoint
///
/// Cheap to clone: the underlying connection pool is shared.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: Client,
    api_url: String,
    authenticated: bool,
}

/// One fetched page of the listing
#[derive(Debug)]
struct Page {
    entries: Vec<RepoEntry>,
    has_next: bool,
}

impl GitHubClient {
    /// Create a client against `api_url`, attaching `token` to every request when given
    pub fn new(api_url: &str, token: Option<&str>, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );

        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .context("GitHub token contains invalid characters")?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = Client::builder()
            .default_headers(headers)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("Failed to create GitHub client")?;

        if token.is_none() {
            warn!("No GitHub token provided; unauthenticated requests have a lower rate limit");
        }

        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            authenticated: token.is_some(),
        })
    }

    /// Create a client from the resolved configuration
    pub fn from_config(config: &GitHubConfig) -> Result<Self> {
        Self::new(
            &config.api_url,
            config.token.as_deref(),
            config.request_timeout(),
        )
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Lazily list every repository of `org`, one page at a time
    ///
    /// Pages are requested only as the stream is polled, and page N is fully
    /// yielded before page N+1 is requested. The first error ends the stream.
    /// Each call starts again from page 1.
    pub fn list_repositories(
        &self,
        org: &str,
    ) -> impl Stream<Item = Result<RepoEntry, ListError>> + Send + 'static {
        let client = self.clone();
        let org = org.to_string();

        stream::try_unfold(Some(1u32), move |cursor| {
            next_page(client.clone(), org.clone(), cursor)
        })
        .map_ok(|entries| stream::iter(entries.into_iter().map(Ok)))
        .try_flatten()
    }

    /// Collect the whole listing
    pub async fn list_all(&self, org: &str) -> Result<Vec<RepoEntry>, ListError> {
        debug!("Fetching repositories for organization: {}", org);

        let repositories: Vec<RepoEntry> = self.list_repositories(org).try_collect().await?;

        info!(
            "Found {} repositories for organization: {}",
            repositories.len(),
            org
        );
        Ok(repositories)
    }

    async fn fetch_page(&self, org: &str, page: u32) -> Result<Page, ListError> {
        let url = format!("{}/orgs/{}/repos", self.api_url, org);
        debug!("Fetching {} page {}", url, page);

        let response = self
            .http
            .get(&url)
            .query(&[
                ("per_page", PER_PAGE.to_string()),
                ("page", page.to_string()),
                ("type", "all".to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(classify_failure(org, status, &headers, body));
        }

        let repos: Vec<ApiRepository> =
            serde_json::from_str(&body).map_err(|e| ListError::UnexpectedApi {
                status: status.as_u16(),
                body: format!("Failed to parse API response: {}", e),
            })?;

        Ok(Page {
            entries: repos.into_iter().map(RepoEntry::from).collect(),
            has_next: has_next_page(&headers),
        })
    }
}

/// Fetch the page under `cursor`, yielding it with the cursor of the page after
async fn next_page(
    client: GitHubClient,
    org: String,
    cursor: Option<u32>,
) -> Result<Option<(Vec<RepoEntry>, Option<u32>)>, ListError> {
    let Some(page_number) = cursor else {
        return Ok(None);
    };

    let page = client.fetch_page(&org, page_number).await?;
    if page.entries.is_empty() {
        debug!("Page {} for {} is empty, stopping", page_number, org);
        return Ok(None);
    }

    let next = page.has_next.then_some(page_number + 1);
    Ok(Some((page.entries, next)))
}

/// Map a non-2xx response onto the listing error taxonomy
fn classify_failure(org: &str, status: StatusCode, headers: &HeaderMap, body: String) -> ListError {
    match status {
        StatusCode::NOT_FOUND => ListError::OrganizationNotFound {
            organization: org.to_string(),
        },
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS
            if status == StatusCode::TOO_MANY_REQUESTS || is_rate_limited(headers, &body) =>
        {
            ListError::RateLimited {
                reset_at: rate_limit_reset(headers, Utc::now()),
            }
        }
        _ => ListError::UnexpectedApi {
            status: status.as_u16(),
            body,
        },
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

fn is_rate_limited(headers: &HeaderMap, body: &str) -> bool {
    header_str(headers, "x-ratelimit-remaining") == Some("0")
        || headers.contains_key(RETRY_AFTER)
        || body.to_lowercase().contains("rate limit")
}

/// When the limit lifts: `x-ratelimit-reset` (epoch seconds), else `retry-after` (seconds from `now`)
fn rate_limit_reset(headers: &HeaderMap, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if let Some(epoch) = header_str(headers, "x-ratelimit-reset").and_then(|v| v.parse::<i64>().ok()) {
        return Utc.timestamp_opt(epoch, 0).single();
    }

    header_str(headers, RETRY_AFTER.as_str())
        .and_then(|v| v.parse::<i64>().ok())
        .map(|secs| now + chrono::Duration::seconds(secs))
}

/// Whether the `Link` header advertises a `rel="next"` page
fn has_next_page(headers: &HeaderMap) -> bool {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|link| {
            link.split(';')
                .skip(1)
                .any(|param| param.trim().replace(' ', "") == r#"rel="next""#)
        })
}

/// Parse an organization name from a GitHub URL or a bare name
///
/// Accepts `https://github.com/acme`, `github.com/acme/`, `www.github.com/acme`
/// and `acme`.
pub fn parse_org_name(input: &str) -> Result<String> {
    let input = input.trim();

    let candidate = if input.contains('/') || input.contains('.') {
        let with_scheme = if input.starts_with("http://") || input.starts_with("https://") {
            input.to_string()
        } else {
            format!("https://{}", input)
        };

        let url = Url::parse(&with_scheme)
            .map_err(|_| anyhow!("Invalid GitHub URL: {}", with_scheme))?;

        match url.host_str() {
            Some("github.com") | Some("www.github.com") => {}
            _ => bail!("Invalid GitHub URL: {}", with_scheme),
        }

        match url.path_segments().and_then(|mut segments| segments.next()) {
            Some(first) if !first.is_empty() => first.to_string(),
            _ => bail!("No organization name found in URL: {}", with_scheme),
        }
    } else {
        input.to_string()
    };

    if candidate.is_empty() {
        bail!("No organization name found in URL: {}", input);
    }

    if !ORG_NAME_FORMAT.is_match(&candidate) {
        bail!("Invalid organization name format: {}", candidate);
    }

    Ok(candidate)
}
