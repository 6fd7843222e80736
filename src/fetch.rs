//! Shared HTTP plumbing for the extractors.

use std::time::Duration;
use thiserror::Error;

/// Failure of one page or file fetch. Extractors log and skip these;
/// only failures of the crawl root are escalated.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("{url} is not HTML (content-type: {content_type})")]
    NotHtml { url: String, content_type: String },
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("browser render of {url} failed: {reason}")]
    Render { url: String, reason: String },
    #[error("invalid payload from {url}: {reason}")]
    Payload { url: String, reason: String },
}

pub fn http_client(user_agent: &str) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder().user_agent(user_agent).build()?)
}

/// GET an HTML page. Non-2xx and non-HTML responses are errors.
pub async fn fetch_html(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<String, CrawlError> {
    let request_err = |source| CrawlError::Request {
        url: url.to_string(),
        source,
    };
    let response = client
        .get(url)
        .header(reqwest::header::ACCEPT, "text/html,application/xhtml+xml")
        .timeout(timeout)
        .send()
        .await
        .map_err(request_err)?;

    let status = response.status();
    if !status.is_success() {
        return Err(CrawlError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    if !content_type.contains("text/html") {
        return Err(CrawlError::NotHtml {
            url: url.to_string(),
            content_type,
        });
    }
    response.text().await.map_err(request_err)
}
