//! Extension traits for content extractors and protocol tools.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              ExtractorSet                │
//! │  ┌─────────┐ ┌────────────┐ ┌─────────┐  │
//! │  │   Web   │ │ Repository │ │   PDF   │  │
//! │  └─────────┘ └────────────┘ └─────────┘  │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!          Indexer::index_source() → chunk → embed → store
//! ```
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              ToolRegistry                │
//! │     ┌─────────────┐ ┌─────────────┐      │
//! │     │ search_docs │ │ get_sources │      │
//! │     └─────────────┘ └─────────────┘      │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!          tools/call → JSON-RPC response
//! ```
//!
//! Tests register fakes in place of the network-backed extractors.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use chainlens_core::embedding::EmbeddingProvider;
use chainlens_core::models::{RawContentUnit, Source, SourceKind};
use chainlens_core::search::{hybrid_search, RetrievalParams, SearchRequest, SearchResponse};
use chainlens_core::store::Store;

use crate::config::Config;

// ═══════════════════════════════════════════════════════════════════════
// Extractor Trait
// ═══════════════════════════════════════════════════════════════════════

/// Acquires the raw content of one source.
///
/// Per-item failures inside a crawl (one page, one file) are logged and
/// skipped by the implementation. An `Err` means the whole acquisition
/// failed and the source ends in `ERROR`.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// The source kind this extractor handles.
    fn kind(&self) -> SourceKind;

    async fn extract(&self, source: &Source) -> Result<Vec<RawContentUnit>>;
}

/// One extractor per [`SourceKind`].
pub struct ExtractorSet {
    extractors: Vec<Arc<dyn Extractor>>,
}

impl ExtractorSet {
    pub fn new() -> Self {
        Self {
            extractors: Vec::new(),
        }
    }

    /// The web, repository and PDF extractors configured from `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        use crate::connector_pdf::DocumentExtractor;
        use crate::connector_repo::RepositoryExtractor;
        use crate::connector_web::WebExtractor;

        let mut set = Self::new();
        set.register(Arc::new(WebExtractor::new(config.crawl.clone())?));
        set.register(Arc::new(RepositoryExtractor::new(
            config.repository.clone(),
            &config.crawl.user_agent,
        )?));
        set.register(Arc::new(DocumentExtractor::new(
            config.document.clone(),
            &config.crawl.user_agent,
        )?));
        Ok(set)
    }

    /// Register an extractor, replacing any previous one for its kind.
    pub fn register(&mut self, extractor: Arc<dyn Extractor>) {
        self.extractors.retain(|e| e.kind() != extractor.kind());
        self.extractors.push(extractor);
    }

    pub fn get(&self, kind: SourceKind) -> Option<&dyn Extractor> {
        self.extractors
            .iter()
            .find(|e| e.kind() == kind)
            .map(|e| e.as_ref())
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }
}

impl Default for ExtractorSet {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Tool Trait
// ═══════════════════════════════════════════════════════════════════════

/// Failure of a tool call, mapped to a JSON-RPC error code by the server.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Bad or missing arguments (`-32602`).
    #[error("{0}")]
    InvalidParams(String),
    /// Anything else (`-32603`).
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// A tool exposed through `tools/list` and invoked through `tools/call`.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name used in `tools/call` (e.g. `"search_docs"`).
    fn name(&self) -> &str;

    /// Description shown to the assistant when deciding whether to call the tool.
    fn description(&self) -> &str;

    /// JSON Schema of the `arguments` object.
    fn parameters_schema(&self) -> Value;

    /// Whether the tool only reads data.
    fn is_read_only(&self) -> bool {
        true
    }

    /// Run the tool. The returned value is serialized into the text
    /// content of the protocol response.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value, ToolError>;
}

// ═══════════════════════════════════════════════════════════════════════
// ToolContext
// ═══════════════════════════════════════════════════════════════════════

/// Everything a tool call may touch, scoped to the sources an endpoint
/// resolved to. Built once per protocol request.
#[derive(Clone)]
pub struct ToolContext {
    pub store: Arc<dyn Store>,
    pub provider: Arc<dyn EmbeddingProvider>,
    pub retrieval: RetrievalParams,
    pub source_ids: Vec<String>,
}

impl ToolContext {
    /// Hybrid search restricted to the endpoint's sources.
    pub async fn search(
        &self,
        query: &str,
        limit: Option<usize>,
        version: Option<&str>,
    ) -> Result<SearchResponse> {
        let request = SearchRequest {
            query,
            source_ids: &self.source_ids,
            limit,
            version,
        };
        hybrid_search(
            self.store.as_ref(),
            self.provider.as_ref(),
            &request,
            &self.retrieval,
        )
        .await
    }

    /// The endpoint's sources, in resolution order.
    pub async fn sources(&self) -> Result<Vec<Source>> {
        self.store.sources_by_ids(&self.source_ids).await
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Built-in Tool Implementations
// ═══════════════════════════════════════════════════════════════════════

/// Hybrid documentation search over the endpoint's sources.
pub struct SearchDocsTool;

#[async_trait]
impl Tool for SearchDocsTool {
    fn name(&self) -> &str {
        "search_docs"
    }

    fn description(&self) -> &str {
        "Search the ChainLens knowledge base for Ethereum development documentation. \
         Returns relevant, chunked content with full source attribution. Use this to find \
         correct function signatures, interface definitions, events, errors, EIP \
         specifications, security patterns, and gas optimisation techniques from \
         authoritative, indexed documentation. Never guess; search first."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Natural language or technical query, e.g. 'UniswapV3 slot0 function', 'ERC-4626 deposit', 'reentrancy guard pattern'"
                },
                "limit": {
                    "type": "number",
                    "description": "Max results to return. Default: 8. Max: 20."
                },
                "version": {
                    "type": "string",
                    "description": "Filter strictly by version e.g. 'v3', 'v2', '0.8.x'. Omit to search all versions in scope."
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let query = params
            .get("query")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| ToolError::InvalidParams("Missing required parameter: query".into()))?;
        let limit = params.get("limit").and_then(positive_integer);
        let version = params
            .get("version")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty());

        let response = ctx.search(query, limit, version).await?;
        Ok(serde_json::to_value(&response).map_err(anyhow::Error::from)?)
    }
}

/// `limit` must be a positive whole number; anything else is ignored.
fn positive_integer(value: &Value) -> Option<usize> {
    let n = value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && *f > 0.0 && *f <= u32::MAX as f64)
            .map(|f| f as u64)
    })?;
    (n > 0).then_some(n as usize)
}

/// Source metadata returned by `get_sources`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSummary {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub url: String,
    pub version: Option<String>,
    pub status: &'static str,
    pub chunk_count: i64,
    pub last_indexed_at: Option<DateTime<Utc>>,
}

impl From<&Source> for SourceSummary {
    fn from(source: &Source) -> Self {
        Self {
            id: source.id.clone(),
            name: source.name.clone(),
            kind: source.kind.as_str(),
            url: source.url.clone(),
            version: source.version.clone(),
            status: source.status.as_str(),
            chunk_count: source.chunk_count,
            last_indexed_at: source.last_indexed_at,
        }
    }
}

/// Lists the sources the endpoint resolved to.
pub struct GetSourcesTool;

#[async_trait]
impl Tool for GetSourcesTool {
    fn name(&self) -> &str {
        "get_sources"
    }

    fn description(&self) -> &str {
        "List all documentation sources available in this MCP endpoint scope, including \
         their names, versions, source URLs, chunk counts, and indexing status."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let sources = ctx.sources().await?;
        let summaries: Vec<SourceSummary> = sources.iter().map(SourceSummary::from).collect();
        Ok(serde_json::json!({ "sources": summaries }))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// Registry of tools served by the protocol endpoint.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// A registry holding `search_docs` and `get_sources`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(SearchDocsTool));
        registry.register(Box::new(GetSourcesTool));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
