//! Storage gateway abstraction for ChainLens.
//!
//! The [`Store`] trait defines every storage operation the indexing
//! orchestrator, endpoint resolver and hybrid retrieval engine need, so
//! the pipeline can run against SQLite in production and against
//! [`memory::InMemoryStore`] in tests.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Chunk, Section, Source, SourceStatus, Subsection};

/// A candidate chunk returned from keyword or vector search.
///
/// Carries the source attribution needed to build a search result
/// without another round-trip.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkHit {
    pub chunk_id: String,
    pub source_id: String,
    pub source_name: String,
    pub source_url: String,
    pub version: Option<String>,
    pub content: String,
    pub heading: Option<String>,
    pub url: Option<String>,
    pub file_path: Option<String>,
    /// Backend score (cosine similarity or negated BM25). Only the order
    /// of hits matters to fusion.
    pub score: f64,
}

/// Restricts a search to a set of sources and optionally one version.
///
/// Implementations additionally restrict to `READY` sources.
#[derive(Debug, Clone, Copy)]
pub struct SearchScope<'a> {
    pub source_ids: &'a [String],
    pub version: Option<&'a str>,
}

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert_source`](Store::insert_source) | Register a new source |
/// | [`update_status`](Store::update_status) | Conditional lifecycle transition |
/// | [`mark_ready`](Store::mark_ready) | Finish a successful job |
/// | [`delete_chunks`](Store::delete_chunks) | Drop all chunks, reset count |
/// | [`insert_chunks`](Store::insert_chunks) | Bulk-insert chunks in order |
/// | [`set_chunk_embedding`](Store::set_chunk_embedding) | Back-fill a vector |
/// | [`vector_search`](Store::vector_search) | Cosine-ranked candidates |
/// | [`keyword_search`](Store::keyword_search) | Full-text-ranked candidates |
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_section(&self, section: &Section) -> Result<()>;

    async fn insert_subsection(&self, subsection: &Subsection) -> Result<()>;

    async fn insert_source(&self, source: &Source) -> Result<()>;

    async fn get_section(&self, id: &str) -> Result<Option<Section>>;

    /// All sections, by name.
    async fn list_sections(&self) -> Result<Vec<Section>>;

    async fn get_subsection(&self, id: &str) -> Result<Option<Subsection>>;

    async fn get_source(&self, id: &str) -> Result<Option<Source>>;

    /// All sources, oldest first.
    async fn list_sources(&self) -> Result<Vec<Source>>;

    /// Sources with the given ids, in the order of `ids`. Unknown ids are
    /// skipped.
    async fn sources_by_ids(&self, ids: &[String]) -> Result<Vec<Source>>;

    /// Delete a source together with all its chunks. Returns whether the
    /// source existed.
    async fn delete_source(&self, id: &str) -> Result<bool>;

    /// Set the status and error text of a source.
    ///
    /// When `only_from` is non-empty the update applies only if the
    /// current status is one of them, as a single atomic statement.
    /// Returns whether a row was updated.
    async fn update_status(
        &self,
        id: &str,
        status: SourceStatus,
        error_text: Option<&str>,
        only_from: &[SourceStatus],
    ) -> Result<bool>;

    /// Status `READY`, chunk count set, error cleared, timestamp recorded.
    async fn mark_ready(&self, id: &str, chunk_count: i64, indexed_at: DateTime<Utc>)
        -> Result<()>;

    /// Delete every chunk of a source and reset its chunk count to 0.
    /// Returns the number of chunks removed.
    async fn delete_chunks(&self, source_id: &str) -> Result<u64>;

    /// Insert chunks without vectors. Returns the new chunk ids in the same
    /// order as `chunks`.
    async fn insert_chunks(&self, source_id: &str, chunks: &[Chunk]) -> Result<Vec<String>>;

    async fn set_chunk_embedding(&self, chunk_id: &str, vector: &[f32]) -> Result<()>;

    /// Top `limit` embedded chunks by cosine similarity, best first.
    async fn vector_search(
        &self,
        query_vec: &[f32],
        scope: SearchScope<'_>,
        limit: usize,
    ) -> Result<Vec<ChunkHit>>;

    /// Top `limit` chunks by full-text relevance, best first.
    async fn keyword_search(
        &self,
        query: &str,
        scope: SearchScope<'_>,
        limit: usize,
    ) -> Result<Vec<ChunkHit>>;

    async fn source_by_endpoint(&self, token: &str) -> Result<Option<Source>>;

    async fn subsection_by_endpoint(&self, token: &str) -> Result<Option<Subsection>>;

    async fn section_by_endpoint(&self, token: &str) -> Result<Option<Section>>;

    async fn subsections_of(&self, section_id: &str) -> Result<Vec<Subsection>>;

    async fn sources_in_subsection(&self, subsection_id: &str) -> Result<Vec<Source>>;

    /// Sources attached directly to the section.
    async fn sources_in_section(&self, section_id: &str) -> Result<Vec<Source>>;
}
