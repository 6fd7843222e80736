//! Indexing orchestration.
//!
//! One job per source: extract → chunk → insert → embed → mark ready.
//! Re-indexing always destroys the previous chunks first. The claim on a
//! source is a conditional status update, so at most one job runs per
//! source; jobs for different sources run independently.
//!
//! ```text
//! PENDING ──▶ INDEXING ──▶ READY ──▶ REFRESHING ──▶ READY
//!                 │                       │
//!                 └──────▶ ERROR ◀────────┘
//! ```

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

use chainlens_core::chunk::{chunk_units, ChunkingParams};
use chainlens_core::embedding::{EmbeddingProvider, InputKind};
use chainlens_core::models::{Source, SourceStatus};
use chainlens_core::store::Store;

use crate::config::Config;
use crate::embedding::create_provider;
use crate::traits::ExtractorSet;

/// Why a trigger was rejected.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("source not found: {0}")]
    NotFound(String),
    #[error("source {id} is {status}; a job is already running or the transition is not allowed")]
    Conflict { id: String, status: SourceStatus },
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// First indexing or scheduled refresh. They differ only in the status
/// held while the pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Index,
    Refresh,
}

impl JobKind {
    fn working_status(self) -> SourceStatus {
        match self {
            JobKind::Index => SourceStatus::Indexing,
            JobKind::Refresh => SourceStatus::Refreshing,
        }
    }

    fn claimable_from(self) -> Vec<SourceStatus> {
        SourceStatus::predecessors(self.working_status())
    }
}

/// Outcome of a job that was allowed to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexReport {
    pub source_id: String,
    pub status: SourceStatus,
    pub chunk_count: usize,
    pub error: Option<String>,
}

impl IndexReport {
    pub fn is_ready(&self) -> bool {
        self.status == SourceStatus::Ready
    }
}

pub struct Indexer {
    store: Arc<dyn Store>,
    provider: Arc<dyn EmbeddingProvider>,
    extractors: Arc<ExtractorSet>,
    chunking: ChunkingParams,
    embed_batch: usize,
}

impl Indexer {
    pub fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn EmbeddingProvider>,
        extractors: Arc<ExtractorSet>,
        chunking: ChunkingParams,
        embed_batch: usize,
    ) -> Self {
        Self {
            store,
            provider,
            extractors,
            chunking,
            embed_batch: embed_batch.max(1),
        }
    }

    /// Store-backed indexer with the provider and extractors named in
    /// `config`.
    pub fn from_config(config: &Config, store: Arc<dyn Store>) -> Result<Self> {
        let provider = create_provider(&config.embedding)?;
        let extractors = Arc::new(ExtractorSet::from_config(config)?);
        Ok(Self::new(
            store,
            provider,
            extractors,
            config.chunking_params(),
            config.embedding.batch_size,
        ))
    }

    /// Trigger event for one source: run the indexing job now.
    pub async fn index_source(&self, source_id: &str) -> Result<IndexReport, IndexError> {
        self.run_job(source_id, JobKind::Index).await
    }

    /// Explicit re-index request: rejected while a job is active,
    /// otherwise the source is reset to `PENDING` and indexed.
    pub async fn request_reindex(&self, source_id: &str) -> Result<IndexReport, IndexError> {
        let source = self.load(source_id).await?;
        if source.status.is_active() {
            return Err(IndexError::Conflict {
                id: source.id,
                status: source.status,
            });
        }
        if source.status != SourceStatus::Pending {
            let reset = self
                .store
                .update_status(
                    source_id,
                    SourceStatus::Pending,
                    None,
                    &SourceStatus::predecessors(SourceStatus::Pending),
                )
                .await?;
            if !reset {
                return Err(self.conflict(source_id).await);
            }
        }
        self.index_source(source_id).await
    }

    /// Periodic sweep: refresh every `READY` source whose interval has
    /// elapsed, concurrently. Returns the number of refresh jobs run.
    pub async fn refresh_due_sources(&self, now: DateTime<Utc>) -> Result<usize> {
        let due: Vec<Source> = self
            .store
            .list_sources()
            .await?
            .into_iter()
            .filter(|s| s.is_due_for_refresh(now))
            .collect();
        if due.is_empty() {
            tracing::debug!("no sources due for refresh");
            return Ok(0);
        }
        tracing::info!(count = due.len(), "refreshing due sources");

        let jobs = due.iter().map(|s| self.run_job(&s.id, JobKind::Refresh));
        let outcomes = futures::future::join_all(jobs).await;

        let mut refreshed = 0;
        for (source, outcome) in due.iter().zip(outcomes) {
            match outcome {
                Ok(report) => {
                    refreshed += 1;
                    if let Some(error) = report.error {
                        tracing::warn!(source = %source.name, error = %error, "refresh failed");
                    }
                }
                Err(e) => tracing::warn!(source = %source.name, error = %e, "refresh skipped"),
            }
        }
        Ok(refreshed)
    }

    /// Run `source_id`'s job on the tokio runtime.
    pub fn spawn(
        self: &Arc<Self>,
        source_id: String,
    ) -> tokio::task::JoinHandle<Result<IndexReport, IndexError>> {
        let indexer = Arc::clone(self);
        tokio::spawn(async move { indexer.index_source(&source_id).await })
    }

    async fn load(&self, source_id: &str) -> Result<Source, IndexError> {
        self.store
            .get_source(source_id)
            .await?
            .ok_or_else(|| IndexError::NotFound(source_id.to_string()))
    }

    async fn conflict(&self, source_id: &str) -> IndexError {
        match self.store.get_source(source_id).await {
            Ok(Some(source)) => IndexError::Conflict {
                id: source.id,
                status: source.status,
            },
            Ok(None) => IndexError::NotFound(source_id.to_string()),
            Err(e) => IndexError::Store(e),
        }
    }

    async fn run_job(&self, source_id: &str, kind: JobKind) -> Result<IndexReport, IndexError> {
        let source = self.load(source_id).await?;
        let working = kind.working_status();

        // Entering the working state clears any previous error text.
        let claimed = self
            .store
            .update_status(source_id, working, None, &kind.claimable_from())
            .await?;
        if !claimed {
            return Err(self.conflict(source_id).await);
        }
        tracing::info!(source = %source.name, kind = %source.kind, status = %working, "job started");

        match self.pipeline(&source).await {
            Ok(chunk_count) => {
                tracing::info!(source = %source.name, chunks = chunk_count, "source ready");
                Ok(IndexReport {
                    source_id: source.id,
                    status: SourceStatus::Ready,
                    chunk_count,
                    error: None,
                })
            }
            Err(e) => {
                let message = format!("{:#}", e);
                tracing::error!(source = %source.name, error = %message, "indexing failed");
                if let Err(cleanup) = self.store.delete_chunks(&source.id).await {
                    tracing::warn!(source = %source.name, error = %cleanup, "failed to drop partial chunks");
                }
                self.store
                    .update_status(&source.id, SourceStatus::Error, Some(&message), &[working])
                    .await?;
                Ok(IndexReport {
                    source_id: source.id,
                    status: SourceStatus::Error,
                    chunk_count: 0,
                    error: Some(message),
                })
            }
        }
    }

    async fn pipeline(&self, source: &Source) -> Result<usize> {
        let removed = self.store.delete_chunks(&source.id).await?;
        if removed > 0 {
            tracing::debug!(source = %source.name, removed, "dropped previous chunks");
        }

        let extractor = self
            .extractors
            .get(source.kind)
            .ok_or_else(|| anyhow!("No extractor registered for {} sources", source.kind))?;
        let units = extractor.extract(source).await?;
        let chunks = chunk_units(&units, &self.chunking);
        tracing::info!(source = %source.name, units = units.len(), chunks = chunks.len(), "content chunked");

        let ids = self.store.insert_chunks(&source.id, &chunks).await?;
        if ids.len() != chunks.len() {
            return Err(anyhow!(
                "store returned {} ids for {} chunks",
                ids.len(),
                chunks.len()
            ));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        for (batch_ids, batch_texts) in ids.chunks(self.embed_batch).zip(texts.chunks(self.embed_batch)) {
            let vectors = self.provider.embed(batch_texts, InputKind::Document).await?;
            if vectors.len() != batch_texts.len() {
                return Err(anyhow!(
                    "embedding provider returned {} vectors for {} texts",
                    vectors.len(),
                    batch_texts.len()
                ));
            }
            for (id, vector) in batch_ids.iter().zip(&vectors) {
                self.store.set_chunk_embedding(id, vector).await?;
            }
            tracing::debug!(source = %source.name, embedded = batch_ids.len(), "embedded batch");
        }

        self.store
            .mark_ready(&source.id, chunks.len() as i64, Utc::now())
            .await?;
        Ok(chunks.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jobs_claim_only_from_legal_predecessors() {
        assert_eq!(
            JobKind::Index.claimable_from(),
            vec![SourceStatus::Pending, SourceStatus::Ready, SourceStatus::Error]
        );
        assert_eq!(JobKind::Refresh.claimable_from(), vec![SourceStatus::Ready]);
        for kind in [JobKind::Index, JobKind::Refresh] {
            assert!(!kind.claimable_from().iter().any(|s| s.is_active()));
        }
    }
}
