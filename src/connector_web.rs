//! Web documentation crawler.
//!
//! Probes the start page once to decide whether the site is
//! client-rendered, then walks same-host links depth-first up to the
//! source's crawl depth. The worklist and visited set are owned by a
//! single [`WebExtractor::crawl`] call.
//!
//! Client-rendered sites are fetched through a headless Chrome/Chromium
//! child process (`--dump-dom`) when `[crawl] browser` is configured; a
//! failed render falls back to a plain fetch for that page.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use url::Url;

use chainlens_core::models::{RawContentUnit, Source, SourceKind};

use crate::config::CrawlConfig;
use crate::fetch::{fetch_html, http_client, CrawlError};
use crate::html::{extract_links, extract_units, looks_client_rendered, normalize_url_str, should_follow};
use crate::traits::Extractor;

pub struct WebExtractor {
    client: reqwest::Client,
    config: CrawlConfig,
}

impl WebExtractor {
    pub fn new(config: CrawlConfig) -> Result<Self> {
        let client = http_client(&config.user_agent)?;
        Ok(Self { client, config })
    }

    /// Crawl from `url`, following links up to `depth` hops.
    ///
    /// Linked pages that cannot be fetched are logged and skipped. A
    /// malformed or unreachable start page fails the whole crawl.
    pub async fn crawl(
        &self,
        url: &str,
        depth: u32,
        include: &[String],
        exclude: &[String],
    ) -> Result<Vec<RawContentUnit>> {
        let root = Url::parse(url).map_err(|e| CrawlError::InvalidUrl(format!("{}: {}", url, e)))?;
        let render = self.needs_rendering(url).await;
        let delay = Duration::from_millis(if render {
            self.config.render_delay_ms
        } else {
            self.config.page_delay_ms
        });
        tracing::info!(url, depth, render, "starting web crawl");

        let mut visited: HashSet<String> = HashSet::new();
        let mut worklist: Vec<(String, u32)> = vec![(url.to_string(), 0)];
        let mut units = Vec::new();
        let mut fetched = 0usize;

        while let Some((page, level)) = worklist.pop() {
            if !visited.insert(normalize_url_str(&page)) {
                continue;
            }
            if fetched > 0 {
                tokio::time::sleep(delay).await;
            }
            fetched += 1;

            let html = match self.fetch_page(&page, render).await {
                Ok(html) => html,
                Err(e) if level == 0 => {
                    return Err(anyhow!(e).context(format!("Failed to fetch {}", url)));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "skipping page");
                    continue;
                }
            };

            let page_units = extract_units(&html, &page);
            tracing::debug!(page = %page, units = page_units.len(), "extracted page");
            units.extend(page_units);

            if level < depth {
                let links: Vec<String> = extract_links(&html, &page)
                    .into_iter()
                    .filter(|link| should_follow(link, &root, include, exclude))
                    .take(self.config.max_links_per_page)
                    .collect();
                // Reversed so the first link on the page is visited next.
                for link in links.into_iter().rev() {
                    worklist.push((link, level + 1));
                }
            }
        }

        tracing::info!(url, pages = fetched, units = units.len(), "web crawl finished");
        Ok(units)
    }

    /// A failed probe counts as client-rendered.
    async fn needs_rendering(&self, url: &str) -> bool {
        let timeout = Duration::from_secs(self.config.probe_timeout_secs);
        match fetch_html(&self.client, url, timeout).await {
            Ok(html) => looks_client_rendered(&html),
            Err(e) => {
                tracing::debug!(error = %e, "probe failed; assuming client-rendered");
                true
            }
        }
    }

    async fn fetch_page(&self, url: &str, render: bool) -> Result<String, CrawlError> {
        if render {
            if let Some(browser) = &self.config.browser {
                match self.render_with_browser(browser, url).await {
                    Ok(html) => return Ok(html),
                    Err(e) => tracing::warn!(error = %e, "falling back to plain fetch"),
                }
            }
        }
        fetch_html(&self.client, url, Duration::from_secs(self.config.timeout_secs)).await
    }

    async fn render_with_browser(&self, browser: &Path, url: &str) -> Result<String, CrawlError> {
        let render_err = |reason: String| CrawlError::Render {
            url: url.to_string(),
            reason,
        };

        let mut cmd = Command::new(browser);
        cmd.args([
            "--headless",
            "--disable-gpu",
            "--no-sandbox",
            "--virtual-time-budget=10000",
        ]);
        cmd.arg(format!("--user-agent={}", self.config.user_agent));
        cmd.arg("--dump-dom");
        cmd.arg(url);
        cmd.stdin(Stdio::null()).stderr(Stdio::null()).kill_on_drop(true);

        let timeout = Duration::from_secs(self.config.render_timeout_secs);
        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| render_err(format!("timed out after {}s", timeout.as_secs())))?
            .map_err(|e| render_err(format!("failed to launch {}: {}", browser.display(), e)))?;

        if !output.status.success() {
            return Err(render_err(format!("browser exited with {}", output.status)));
        }
        let html = String::from_utf8_lossy(&output.stdout).into_owned();
        if html.trim().is_empty() {
            return Err(render_err("browser produced an empty DOM".to_string()));
        }
        Ok(html)
    }
}

#[async_trait]
impl Extractor for WebExtractor {
    fn kind(&self) -> SourceKind {
        SourceKind::Web
    }

    async fn extract(&self, source: &Source) -> Result<Vec<RawContentUnit>> {
        self.crawl(
            &source.url,
            source.crawl_depth,
            &source.include_patterns,
            &source.exclude_patterns,
        )
        .await
    }
}
