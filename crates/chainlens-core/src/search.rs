//! Hybrid retrieval: vector and keyword search fused by reciprocal rank.
//!
//! The algorithm operates entirely through the [`Store`] and
//! [`EmbeddingProvider`] traits, with no database or configuration
//! dependencies.
//!
//! # Algorithm
//!
//! 1. An empty source-id set returns an empty response immediately.
//! 2. Embed the query (`InputKind::Query`).
//! 3. Fetch up to `candidate_limit` vector candidates and up to
//!    `candidate_limit` keyword candidates concurrently, both restricted
//!    to the source ids (and version, if given).
//! 4. Fuse: each chunk scores `Σ 1 / (k + rank + 1)` over the lists it
//!    appears in, with `rank` 0-based.
//! 5. Sort by fused score (desc), then chunk id (asc).
//! 6. Truncate to `min(limit or default_limit, max_limit)`.

use std::collections::HashMap;
use std::time::Instant;

use anyhow::Result;
use serde::Serialize;

use crate::embedding::{embed_one, EmbeddingProvider, InputKind};
use crate::store::{ChunkHit, SearchScope, Store};

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalParams {
    /// RRF smoothing constant `k`.
    pub rrf_k: f64,
    /// Candidates fetched from each ranked list.
    pub candidate_limit: usize,
    /// Result count when the caller gives none.
    pub default_limit: usize,
    /// Hard cap on the result count.
    pub max_limit: usize,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            rrf_k: 60.0,
            candidate_limit: 20,
            default_limit: 8,
            max_limit: 20,
        }
    }
}

impl RetrievalParams {
    /// `min(requested or default, max)`. A requested limit of 0 counts as
    /// absent.
    pub fn effective_limit(&self, requested: Option<usize>) -> usize {
        requested
            .filter(|l| *l > 0)
            .unwrap_or(self.default_limit)
            .min(self.max_limit)
    }
}

/// Inputs for a single search invocation.
#[derive(Debug, Clone, Copy)]
pub struct SearchRequest<'a> {
    pub query: &'a str,
    /// Sources the caller is authorized to search.
    pub source_ids: &'a [String],
    pub limit: Option<usize>,
    /// Exact version tag filter.
    pub version: Option<&'a str>,
}

/// One fused search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub chunk_id: String,
    pub content: String,
    pub heading: Option<String>,
    pub source_name: String,
    /// Page URL of the chunk, falling back to the source's origin.
    pub source_url: Option<String>,
    pub file_path: Option<String>,
    pub version: Option<String>,
    pub relevance_score: f64,
}

/// The full search response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub total_results: usize,
    /// Distinct source names in result order.
    pub sources_searched: Vec<String>,
    pub query_time_ms: u64,
}

impl SearchResponse {
    fn empty(started: Instant) -> Self {
        Self {
            results: Vec::new(),
            total_results: 0,
            sources_searched: Vec::new(),
            query_time_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// Words dropped from keyword queries; they carry no ranking signal.
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "do", "does", "for", "from", "how",
    "i", "in", "is", "it", "of", "on", "or", "the", "this", "to", "what", "when", "where",
    "which", "why", "with",
];

/// Lower-cased alphanumeric terms of a keyword query, stop words removed.
///
/// Stores match chunks containing every term.
pub fn keyword_terms(query: &str) -> Vec<String> {
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .filter(|t| !STOP_WORDS.contains(&t.as_str()))
        .collect()
}

/// Fuse ranked lists with reciprocal rank fusion.
///
/// Returns every distinct chunk with its summed score, sorted by score
/// descending and chunk id ascending. The first occurrence of a chunk
/// supplies its data.
pub fn reciprocal_rank_fusion(lists: &[&[ChunkHit]], k: f64) -> Vec<(ChunkHit, f64)> {
    let mut fused: HashMap<&str, (&ChunkHit, f64)> = HashMap::new();
    for list in lists {
        for (rank, hit) in list.iter().enumerate() {
            let contribution = 1.0 / (k + rank as f64 + 1.0);
            fused
                .entry(hit.chunk_id.as_str())
                .and_modify(|(_, score)| *score += contribution)
                .or_insert((hit, contribution));
        }
    }

    let mut out: Vec<(ChunkHit, f64)> = fused
        .into_values()
        .map(|(hit, score)| (hit.clone(), score))
        .collect();
    out.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.chunk_id.cmp(&b.0.chunk_id))
    });
    out
}

/// Run a hybrid search over the authorized sources.
pub async fn hybrid_search(
    store: &dyn Store,
    provider: &dyn EmbeddingProvider,
    req: &SearchRequest<'_>,
    params: &RetrievalParams,
) -> Result<SearchResponse> {
    let started = Instant::now();
    if req.source_ids.is_empty() {
        return Ok(SearchResponse::empty(started));
    }

    let query_vec = embed_one(provider, req.query, InputKind::Query).await?;
    let scope = SearchScope {
        source_ids: req.source_ids,
        version: req.version,
    };
    let (vector_hits, keyword_hits) = futures::try_join!(
        store.vector_search(&query_vec, scope, params.candidate_limit),
        store.keyword_search(req.query, scope, params.candidate_limit),
    )?;

    let mut fused = reciprocal_rank_fusion(
        &[vector_hits.as_slice(), keyword_hits.as_slice()],
        params.rrf_k,
    );
    fused.truncate(params.effective_limit(req.limit));

    let mut sources_searched: Vec<String> = Vec::new();
    let results: Vec<SearchResult> = fused
        .into_iter()
        .map(|(hit, score)| {
            if !sources_searched.contains(&hit.source_name) {
                sources_searched.push(hit.source_name.clone());
            }
            SearchResult {
                chunk_id: hit.chunk_id,
                content: hit.content,
                heading: hit.heading,
                source_name: hit.source_name,
                source_url: hit.url.or(Some(hit.source_url)),
                file_path: hit.file_path,
                version: hit.version,
                relevance_score: score,
            }
        })
        .collect();

    Ok(SearchResponse {
        total_results: results.len(),
        results,
        sources_searched,
        query_time_ms: started.elapsed().as_millis() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, IndexOptions, RefreshInterval, Source, SourceKind, SourceStatus};
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn hit(id: &str) -> ChunkHit {
        ChunkHit {
            chunk_id: id.into(),
            source_id: "s".into(),
            source_name: "S".into(),
            source_url: "https://s.example.com".into(),
            version: None,
            content: id.into(),
            heading: None,
            url: None,
            file_path: None,
            score: 0.0,
        }
    }

    /// Maps text to a 3-d vector by keyword presence.
    struct KeywordEmbedder {
        calls: AtomicUsize,
    }

    impl KeywordEmbedder {
        fn new() -> Self {
            Self { calls: AtomicUsize::new(0) }
        }
    }

    fn keyword_vector(text: &str) -> Vec<f32> {
        let t = text.to_lowercase();
        vec![
            if t.contains("reentrancy") { 1.0 } else { 0.0 },
            if t.contains("oracle") { 1.0 } else { 0.0 },
            0.1,
        ]
    }

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        fn model_name(&self) -> &str {
            "keyword"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed(&self, texts: &[String], _kind: InputKind) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|t| keyword_vector(t)).collect())
        }
    }

    fn source(id: &str, name: &str, version: Option<&str>) -> Source {
        Source {
            id: id.into(),
            name: name.into(),
            kind: SourceKind::Web,
            url: format!("https://{}.example.com", id),
            version: version.map(str::to_string),
            crawl_depth: 1,
            branch: None,
            include_patterns: vec![],
            exclude_patterns: vec![],
            index_options: IndexOptions::default(),
            refresh: RefreshInterval::None,
            status: SourceStatus::Ready,
            chunk_count: 0,
            last_indexed_at: None,
            error_text: None,
            endpoint: format!("src-{}", id),
            section_id: None,
            subsection_id: None,
            created_at: Utc::now(),
        }
    }

    async fn seed(store: &InMemoryStore, source_id: &str, texts: &[&str]) {
        let chunks: Vec<Chunk> = texts
            .iter()
            .enumerate()
            .map(|(i, t)| Chunk {
                content: t.to_string(),
                heading: Some("Security".into()),
                url: Some(format!("https://{}.example.com/page", source_id)),
                file_path: None,
                chunk_index: i as i64,
                token_count: 10,
            })
            .collect();
        let ids = store.insert_chunks(source_id, &chunks).await.unwrap();
        for (id, t) in ids.iter().zip(texts) {
            store.set_chunk_embedding(id, &keyword_vector(t)).await.unwrap();
        }
    }

    #[test]
    fn rrf_sums_contributions() {
        let a = [hit("x"), hit("y")];
        let b = [hit("y"), hit("z")];
        let fused = reciprocal_rank_fusion(&[&a[..], &b[..]], 60.0);
        let ids: Vec<&str> = fused.iter().map(|(h, _)| h.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["y", "x", "z"]);
        let y = 1.0 / 62.0 + 1.0 / 61.0;
        assert!((fused[0].1 - y).abs() < 1e-12);
        assert!((fused[1].1 - 1.0 / 61.0).abs() < 1e-12);
    }

    #[test]
    fn rrf_top_in_both_beats_top_in_one() {
        let a = [hit("both"), hit("only_a")];
        let b = [hit("both")];
        let c = [hit("only_c")];
        let fused = reciprocal_rank_fusion(&[&a[..], &b[..], &c[..]], 60.0);
        let score = |id: &str| fused.iter().find(|(h, _)| h.chunk_id == id).unwrap().1;
        assert!(score("both") > score("only_c"));
    }

    #[test]
    fn rrf_ties_are_ordered_by_chunk_id() {
        let a = [hit("b")];
        let b = [hit("a")];
        let forward = reciprocal_rank_fusion(&[&a[..], &b[..]], 60.0);
        let reverse = reciprocal_rank_fusion(&[&b[..], &a[..]], 60.0);
        let ids = |v: &[(ChunkHit, f64)]| v.iter().map(|(h, _)| h.chunk_id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&forward), vec!["a", "b"]);
        assert_eq!(ids(&forward), ids(&reverse));
    }

    #[test]
    fn keyword_terms_drop_noise() {
        assert_eq!(
            keyword_terms("How does the ERC-4626 deposit() work?"),
            vec!["erc", "4626", "deposit", "work"]
        );
        assert!(keyword_terms("  the  ").is_empty());
    }

    #[test]
    fn effective_limit_caps() {
        let p = RetrievalParams::default();
        assert_eq!(p.effective_limit(None), 8);
        assert_eq!(p.effective_limit(Some(3)), 3);
        assert_eq!(p.effective_limit(Some(50)), 20);
        assert_eq!(p.effective_limit(Some(0)), 8);
    }

    #[tokio::test]
    async fn empty_scope_skips_every_backend() {
        let store = InMemoryStore::new();
        let provider = KeywordEmbedder::new();
        let req = SearchRequest {
            query: "reentrancy guard",
            source_ids: &[],
            limit: Some(8),
            version: None,
        };
        let resp = hybrid_search(&store, &provider, &req, &RetrievalParams::default())
            .await
            .unwrap();
        assert!(resp.results.is_empty());
        assert_eq!(resp.total_results, 0);
        assert!(resp.sources_searched.is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn hybrid_search_ranks_and_attributes() {
        let store = InMemoryStore::new();
        store.insert_source(&source("oz", "OpenZeppelin", Some("v5"))).await.unwrap();
        store.insert_source(&source("ch", "Chainlink", Some("v2"))).await.unwrap();
        seed(
            &store,
            "oz",
            &[
                "ReentrancyGuard prevents reentrancy in nonReentrant functions",
                "Ownable restricts access to the owner",
            ],
        )
        .await;
        seed(&store, "ch", &["Price feeds are an oracle network"]).await;

        let provider = KeywordEmbedder::new();
        let ids = vec!["oz".to_string(), "ch".to_string()];
        let req = SearchRequest {
            query: "reentrancy",
            source_ids: &ids,
            limit: None,
            version: None,
        };
        let resp = hybrid_search(&store, &provider, &req, &RetrievalParams::default())
            .await
            .unwrap();

        assert_eq!(resp.total_results, resp.results.len());
        assert_eq!(resp.total_results, 3);
        let top = &resp.results[0];
        assert!(top.content.contains("ReentrancyGuard"));
        assert_eq!(top.source_name, "OpenZeppelin");
        assert_eq!(top.version.as_deref(), Some("v5"));
        assert_eq!(top.source_url.as_deref(), Some("https://oz.example.com/page"));
        assert_eq!(resp.sources_searched[0], "OpenZeppelin");
        assert!(resp.sources_searched.contains(&"Chainlink".to_string()));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        let versioned = SearchRequest {
            version: Some("v2"),
            limit: Some(1),
            ..req
        };
        let resp = hybrid_search(&store, &provider, &versioned, &RetrievalParams::default())
            .await
            .unwrap();
        assert_eq!(resp.results.len(), 1);
        assert_eq!(resp.results[0].source_name, "Chainlink");
        assert_eq!(resp.sources_searched, vec!["Chainlink"]);
    }

    #[test]
    fn serializes_camel_case() {
        let resp = SearchResponse {
            results: vec![],
            total_results: 0,
            sources_searched: vec![],
            query_time_ms: 3,
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("totalResults").is_some());
        assert!(json.get("sourcesSearched").is_some());
        assert!(json.get("queryTimeMs").is_some());
    }
}
