//! PDF document extractor.
//!
//! Downloads the document, extracts its text on the blocking pool and
//! segments it with [`crate::extract::segment_document`]. Any failure is
//! fatal for the source.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use chainlens_core::models::{RawContentUnit, Source, SourceKind};

use crate::config::DocumentConfig;
use crate::extract::{extract_pdf_text, segment_document};
use crate::fetch::http_client;
use crate::traits::Extractor;

pub struct DocumentExtractor {
    client: reqwest::Client,
    config: DocumentConfig,
}

impl DocumentExtractor {
    pub fn new(config: DocumentConfig, user_agent: &str) -> Result<Self> {
        Ok(Self {
            client: http_client(user_agent)?,
            config,
        })
    }

    pub async fn parse(&self, url: &str) -> Result<Vec<RawContentUnit>> {
        self.parse_inner(url)
            .await
            .map_err(|e| anyhow!("Failed to parse PDF from {}: {}", url, e))
    }

    async fn parse_inner(&self, url: &str) -> Result<Vec<RawContentUnit>> {
        let response = self
            .client
            .get(url)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            bail!("Failed to fetch PDF: HTTP {}", status);
        }
        let bytes = response.bytes().await?;

        let text = tokio::task::spawn_blocking(move || extract_pdf_text(&bytes)).await??;
        let units = segment_document(&text, url);
        tracing::info!(url, units = units.len(), "parsed PDF");
        Ok(units)
    }
}

#[async_trait]
impl Extractor for DocumentExtractor {
    fn kind(&self) -> SourceKind {
        SourceKind::Document
    }

    async fn extract(&self, source: &Source) -> Result<Vec<RawContentUnit>> {
        self.parse(&source.url).await
    }
}
