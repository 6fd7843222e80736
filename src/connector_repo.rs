//! GitHub repository crawler.
//!
//! Lists the repository tree through the GitHub REST API, selects files
//! by the source's index toggles and glob filters, then fetches each file
//! through the contents API (base64 payloads). Solidity files go through
//! [`crate::solidity`], Markdown through [`crate::markdown`].
//!
//! A failed tree listing fails the source. A failed file fetch is logged
//! and skipped.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use globset::{Glob, GlobSet, GlobSetBuilder};
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;

use chainlens_core::models::{IndexOptions, RawContentUnit, Source, SourceKind};

use crate::config::RepositoryConfig;
use crate::fetch::{http_client, CrawlError};
use crate::markdown::segment_markdown;
use crate::solidity::extract_solidity;
use crate::traits::Extractor;

pub const DEFAULT_BRANCH: &str = "main";

static GITHUB_REPO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"github\.com[/:]([^/]+)/([^/?#]+)").unwrap());

/// `(owner, repo)` from a GitHub URL, `.git` suffix removed.
pub fn parse_github_url(url: &str) -> Result<(String, String)> {
    let Some(caps) = GITHUB_REPO.captures(url) else {
        bail!("Invalid GitHub URL: {}", url);
    };
    let repo = caps[2].trim_end_matches(".git");
    if repo.is_empty() {
        bail!("Invalid GitHub URL: {}", url);
    }
    Ok((caps[1].to_string(), repo.to_string()))
}

fn is_markdown(lower: &str) -> bool {
    lower.ends_with(".md") || lower.ends_with(".mdx")
}

fn in_directory(lower: &str, names: &[&str]) -> bool {
    let mut segments: Vec<&str> = lower.split('/').collect();
    segments.pop();
    segments.iter().any(|s| names.contains(s))
}

/// Whether the toggles select `path`. The most specific rule decides:
/// the root README, then `docs/` Markdown, then Solidity, then any
/// Markdown. Test and example directories are excluded unless enabled.
pub fn should_index_file(path: &str, options: &IndexOptions) -> bool {
    let lower = path.to_lowercase();

    if !options.index_tests && in_directory(&lower, &["test", "tests"]) {
        return false;
    }
    if !options.index_examples && in_directory(&lower, &["example", "examples"]) {
        return false;
    }

    if lower == "readme.md" {
        options.index_readme
    } else if lower.starts_with("docs/") && is_markdown(&lower) {
        options.index_docs
    } else if lower.ends_with(".sol") {
        options.index_solidity
    } else if is_markdown(&lower) {
        options.index_markdown
    } else {
        false
    }
}

/// Include/exclude globs over repository paths. Empty include matches all.
pub struct PathFilter {
    include: Option<GlobSet>,
    exclude: GlobSet,
}

impl PathFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        let include = if include.is_empty() {
            None
        } else {
            Some(build_globset(include)?)
        };
        Ok(Self {
            include,
            exclude: build_globset(exclude)?,
        })
    }

    pub fn allows(&self, path: &str) -> bool {
        if self.exclude.is_match(path) {
            return false;
        }
        self.include.as_ref().map_or(true, |set| set.is_match(path))
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob pattern: {}", pattern))?);
    }
    Ok(builder.build()?)
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

/// Decode a contents-API payload. GitHub wraps base64 at 60 columns.
pub fn decode_content(payload: &str) -> Result<String, base64::DecodeError> {
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD.decode(compact)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub struct RepositoryExtractor {
    client: reqwest::Client,
    config: RepositoryConfig,
    token: Option<String>,
}

impl RepositoryExtractor {
    /// The API token is read from `repository.token_env` when set.
    pub fn new(config: RepositoryConfig, user_agent: &str) -> Result<Self> {
        let token = std::env::var(&config.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty());
        Ok(Self {
            client: http_client(user_agent)?,
            config,
            token,
        })
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .timeout(Duration::from_secs(self.config.timeout_secs));
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn api(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base.trim_end_matches('/'), path)
    }

    async fn list_tree(&self, owner: &str, repo: &str, branch: &str) -> Result<Vec<String>> {
        let url = self.api(&format!("repos/{}/{}/git/trees/{}?recursive=1", owner, repo, branch));
        let response = self.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("GitHub API error {}: {}", status, body.trim());
        }
        let tree: TreeResponse = response.json().await?;
        if tree.truncated {
            tracing::warn!(owner, repo, "GitHub tree listing was truncated");
        }
        Ok(tree
            .tree
            .into_iter()
            .filter(|e| e.kind == "blob")
            .map(|e| e.path)
            .collect())
    }

    async fn fetch_file(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        path: &str,
    ) -> Result<String, CrawlError> {
        let url = self.api(&format!("repos/{}/{}/contents/{}?ref={}", owner, repo, path, branch));
        let request_err = |source| CrawlError::Request {
            url: url.clone(),
            source,
        };
        let response = self.get(&url).send().await.map_err(request_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(CrawlError::Status {
                url: url.clone(),
                status: status.as_u16(),
            });
        }
        let body: ContentResponse = response.json().await.map_err(request_err)?;
        let payload_err = |reason: String| CrawlError::Payload {
            url: url.clone(),
            reason,
        };
        match (body.content, body.encoding.as_deref()) {
            (Some(content), Some("base64") | None) => {
                decode_content(&content).map_err(|e| payload_err(e.to_string()))
            }
            (Some(_), Some(other)) => Err(payload_err(format!("unsupported encoding {}", other))),
            (None, _) => Err(payload_err("no inline content".to_string())),
        }
    }

    /// Crawl `repo_url` at `branch`.
    pub async fn crawl(
        &self,
        repo_url: &str,
        branch: &str,
        options: &IndexOptions,
        filter: &PathFilter,
    ) -> Result<Vec<RawContentUnit>> {
        let (owner, repo) = parse_github_url(repo_url)?;
        let paths = self
            .list_tree(&owner, &repo, branch)
            .await
            .with_context(|| format!("Failed to crawl GitHub repo {}/{}", owner, repo))?;

        let selected: Vec<String> = paths
            .into_iter()
            .filter(|p| should_index_file(p, options) && filter.allows(p))
            .collect();
        if selected.len() > self.config.max_files {
            tracing::info!(
                selected = selected.len(),
                max_files = self.config.max_files,
                "capping repository files"
            );
        }
        tracing::info!(owner = %owner, repo = %repo, branch, files = selected.len().min(self.config.max_files), "crawling repository");

        let delay = Duration::from_millis(self.config.file_delay_ms);
        let mut units = Vec::new();
        for (i, path) in selected.iter().take(self.config.max_files).enumerate() {
            if i > 0 {
                tokio::time::sleep(delay).await;
            }
            let content = match self.fetch_file(&owner, &repo, branch, path).await {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "skipping file");
                    continue;
                }
            };
            if path.to_lowercase().ends_with(".sol") {
                units.extend(extract_solidity(&content, path));
            } else {
                units.extend(segment_markdown(&content, path));
            }
        }
        Ok(units)
    }
}

#[async_trait]
impl Extractor for RepositoryExtractor {
    fn kind(&self) -> SourceKind {
        SourceKind::Repository
    }

    async fn extract(&self, source: &Source) -> Result<Vec<RawContentUnit>> {
        let branch = source.branch.as_deref().unwrap_or(DEFAULT_BRANCH);
        let filter = PathFilter::new(&source.include_patterns, &source.exclude_patterns)?;
        self.crawl(&source.url, branch, &source.index_options, &filter)
            .await
    }
}
