//! In-memory [`Store`] implementation for tests.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock`. Vector search is
//! brute-force cosine similarity; keyword search requires every query
//! term to appear in the chunk and ranks by total term occurrences.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::embedding::cosine_similarity;
use crate::models::{Chunk, Section, Source, SourceStatus, Subsection};
use crate::search::keyword_terms;

use super::{ChunkHit, SearchScope, Store};

struct StoredChunk {
    id: String,
    source_id: String,
    chunk: Chunk,
    embedding: Option<Vec<f32>>,
}

/// In-memory store for tests.
pub struct InMemoryStore {
    sections: RwLock<Vec<Section>>,
    subsections: RwLock<Vec<Subsection>>,
    sources: RwLock<Vec<Source>>,
    chunks: RwLock<Vec<StoredChunk>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            sections: RwLock::new(Vec::new()),
            subsections: RwLock::new(Vec::new()),
            sources: RwLock::new(Vec::new()),
            chunks: RwLock::new(Vec::new()),
        }
    }

    /// Number of chunks currently held for a source.
    pub fn chunk_rows(&self, source_id: &str) -> usize {
        self.chunks
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.source_id == source_id)
            .count()
    }

    /// Number of chunks of a source that have a vector.
    pub fn embedded_rows(&self, source_id: &str) -> usize {
        self.chunks
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.source_id == source_id && c.embedding.is_some())
            .count()
    }

    fn hits_in_scope<F>(&self, scope: SearchScope<'_>, mut score: F) -> Vec<ChunkHit>
    where
        F: FnMut(&StoredChunk) -> Option<f64>,
    {
        let sources = self.sources.read().unwrap();
        let by_id: HashMap<&str, &Source> = sources
            .iter()
            .filter(|s| s.status == SourceStatus::Ready)
            .filter(|s| scope.source_ids.iter().any(|id| id == &s.id))
            .filter(|s| match scope.version {
                Some(v) => s.version.as_deref() == Some(v),
                None => true,
            })
            .map(|s| (s.id.as_str(), s))
            .collect();

        let chunks = self.chunks.read().unwrap();
        chunks
            .iter()
            .filter_map(|c| {
                let source = by_id.get(c.source_id.as_str())?;
                let score = score(c)?;
                Some(ChunkHit {
                    chunk_id: c.id.clone(),
                    source_id: source.id.clone(),
                    source_name: source.name.clone(),
                    source_url: source.url.clone(),
                    version: source.version.clone(),
                    content: c.chunk.content.clone(),
                    heading: c.chunk.heading.clone(),
                    url: c.chunk.url.clone(),
                    file_path: c.chunk.file_path.clone(),
                    score,
                })
            })
            .collect()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn rank(mut hits: Vec<ChunkHit>, limit: usize) -> Vec<ChunkHit> {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    hits.truncate(limit);
    hits
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_section(&self, section: &Section) -> Result<()> {
        self.sections.write().unwrap().push(section.clone());
        Ok(())
    }

    async fn insert_subsection(&self, subsection: &Subsection) -> Result<()> {
        self.subsections.write().unwrap().push(subsection.clone());
        Ok(())
    }

    async fn insert_source(&self, source: &Source) -> Result<()> {
        self.sources.write().unwrap().push(source.clone());
        Ok(())
    }

    async fn get_section(&self, id: &str) -> Result<Option<Section>> {
        let sections = self.sections.read().unwrap();
        Ok(sections.iter().find(|s| s.id == id).cloned())
    }

    async fn list_sections(&self) -> Result<Vec<Section>> {
        let mut sections = self.sections.read().unwrap().clone();
        sections.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(sections)
    }

    async fn get_subsection(&self, id: &str) -> Result<Option<Subsection>> {
        let subsections = self.subsections.read().unwrap();
        Ok(subsections.iter().find(|s| s.id == id).cloned())
    }

    async fn get_source(&self, id: &str) -> Result<Option<Source>> {
        let sources = self.sources.read().unwrap();
        Ok(sources.iter().find(|s| s.id == id).cloned())
    }

    async fn list_sources(&self) -> Result<Vec<Source>> {
        Ok(self.sources.read().unwrap().clone())
    }

    async fn sources_by_ids(&self, ids: &[String]) -> Result<Vec<Source>> {
        let sources = self.sources.read().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| sources.iter().find(|s| &s.id == id).cloned())
            .collect())
    }

    async fn delete_source(&self, id: &str) -> Result<bool> {
        let mut sources = self.sources.write().unwrap();
        let before = sources.len();
        sources.retain(|s| s.id != id);
        let existed = sources.len() != before;
        self.chunks.write().unwrap().retain(|c| c.source_id != id);
        Ok(existed)
    }

    async fn update_status(
        &self,
        id: &str,
        status: SourceStatus,
        error_text: Option<&str>,
        only_from: &[SourceStatus],
    ) -> Result<bool> {
        let mut sources = self.sources.write().unwrap();
        let Some(source) = sources.iter_mut().find(|s| s.id == id) else {
            return Ok(false);
        };
        if !only_from.is_empty() && !only_from.contains(&source.status) {
            return Ok(false);
        }
        source.status = status;
        source.error_text = error_text.map(str::to_string);
        Ok(true)
    }

    async fn mark_ready(
        &self,
        id: &str,
        chunk_count: i64,
        indexed_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut sources = self.sources.write().unwrap();
        if let Some(source) = sources.iter_mut().find(|s| s.id == id) {
            source.status = SourceStatus::Ready;
            source.chunk_count = chunk_count;
            source.last_indexed_at = Some(indexed_at);
            source.error_text = None;
        }
        Ok(())
    }

    async fn delete_chunks(&self, source_id: &str) -> Result<u64> {
        let removed = {
            let mut chunks = self.chunks.write().unwrap();
            let before = chunks.len();
            chunks.retain(|c| c.source_id != source_id);
            (before - chunks.len()) as u64
        };
        let mut sources = self.sources.write().unwrap();
        if let Some(source) = sources.iter_mut().find(|s| s.id == source_id) {
            source.chunk_count = 0;
        }
        Ok(removed)
    }

    async fn insert_chunks(&self, source_id: &str, chunks: &[Chunk]) -> Result<Vec<String>> {
        let mut stored = self.chunks.write().unwrap();
        let mut ids = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let id = Uuid::new_v4().to_string();
            stored.push(StoredChunk {
                id: id.clone(),
                source_id: source_id.to_string(),
                chunk: chunk.clone(),
                embedding: None,
            });
            ids.push(id);
        }
        Ok(ids)
    }

    async fn set_chunk_embedding(&self, chunk_id: &str, vector: &[f32]) -> Result<()> {
        let mut chunks = self.chunks.write().unwrap();
        if let Some(c) = chunks.iter_mut().find(|c| c.id == chunk_id) {
            c.embedding = Some(vector.to_vec());
        }
        Ok(())
    }

    async fn vector_search(
        &self,
        query_vec: &[f32],
        scope: SearchScope<'_>,
        limit: usize,
    ) -> Result<Vec<ChunkHit>> {
        let hits = self.hits_in_scope(scope, |c| {
            c.embedding
                .as_ref()
                .map(|v| cosine_similarity(query_vec, v) as f64)
        });
        Ok(rank(hits, limit))
    }

    async fn keyword_search(
        &self,
        query: &str,
        scope: SearchScope<'_>,
        limit: usize,
    ) -> Result<Vec<ChunkHit>> {
        let terms = keyword_terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let hits = self.hits_in_scope(scope, |c| {
            let text = c.chunk.content.to_lowercase();
            let mut total = 0usize;
            for term in &terms {
                let n = text.matches(term.as_str()).count();
                if n == 0 {
                    return None;
                }
                total += n;
            }
            Some(total as f64)
        });
        Ok(rank(hits, limit))
    }

    async fn source_by_endpoint(&self, token: &str) -> Result<Option<Source>> {
        let sources = self.sources.read().unwrap();
        Ok(sources.iter().find(|s| s.endpoint == token).cloned())
    }

    async fn subsection_by_endpoint(&self, token: &str) -> Result<Option<Subsection>> {
        let subsections = self.subsections.read().unwrap();
        Ok(subsections.iter().find(|s| s.endpoint == token).cloned())
    }

    async fn section_by_endpoint(&self, token: &str) -> Result<Option<Section>> {
        let sections = self.sections.read().unwrap();
        Ok(sections.iter().find(|s| s.endpoint == token).cloned())
    }

    async fn subsections_of(&self, section_id: &str) -> Result<Vec<Subsection>> {
        let subsections = self.subsections.read().unwrap();
        Ok(subsections
            .iter()
            .filter(|s| s.section_id == section_id)
            .cloned()
            .collect())
    }

    async fn sources_in_subsection(&self, subsection_id: &str) -> Result<Vec<Source>> {
        let sources = self.sources.read().unwrap();
        Ok(sources
            .iter()
            .filter(|s| s.subsection_id.as_deref() == Some(subsection_id))
            .cloned()
            .collect())
    }

    async fn sources_in_section(&self, section_id: &str) -> Result<Vec<Source>> {
        let sources = self.sources.read().unwrap();
        Ok(sources
            .iter()
            .filter(|s| s.section_id.as_deref() == Some(section_id))
            .cloned()
            .collect())
    }
}
