//! TOML configuration.
//!
//! Every section except `[db]` may be omitted; defaults reproduce the
//! production tuning (512-token chunks, RRF k = 60, Voyage embeddings).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use chainlens_core::chunk::ChunkingParams;
use chainlens_core::search::RetrievalParams;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub repository: RepositoryConfig,
    #[serde(default)]
    pub document: DocumentConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_target_tokens")]
    pub target_tokens: usize,
    #[serde(default = "default_overlap_tokens")]
    pub overlap_tokens: usize,
    #[serde(default = "default_code_block_max_tokens")]
    pub code_block_max_tokens: usize,
    #[serde(default = "default_code_flush_slack_tokens")]
    pub code_flush_slack_tokens: usize,
}

fn default_target_tokens() -> usize {
    512
}
fn default_overlap_tokens() -> usize {
    50
}
fn default_code_block_max_tokens() -> usize {
    800
}
fn default_code_flush_slack_tokens() -> usize {
    100
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_tokens: default_target_tokens(),
            overlap_tokens: default_overlap_tokens(),
            code_block_max_tokens: default_code_block_max_tokens(),
            code_flush_slack_tokens: default_code_flush_slack_tokens(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f64,
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
}

fn default_rrf_k() -> f64 {
    60.0
}
fn default_candidate_limit() -> usize {
    20
}
fn default_limit() -> usize {
    8
}
fn default_max_limit() -> usize {
    20
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rrf_k: default_rrf_k(),
            candidate_limit: default_candidate_limit(),
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_embedding_url")]
    pub url: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,
    #[serde(default = "default_embed_timeout")]
    pub timeout_secs: u64,
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_model() -> String {
    "voyage-code-3".to_string()
}
fn default_dims() -> usize {
    1024
}
fn default_embedding_url() -> String {
    "https://api.voyageai.com/v1/embeddings".to_string()
}
fn default_api_key_env() -> String {
    "VOYAGE_API_KEY".to_string()
}
fn default_batch_size() -> usize {
    128
}
fn default_max_retries() -> u32 {
    3
}
fn default_backoff_secs() -> u64 {
    5
}
fn default_embed_timeout() -> u64 {
    30
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            dims: default_dims(),
            url: default_embedding_url(),
            api_key_env: default_api_key_env(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            backoff_secs: default_backoff_secs(),
            timeout_secs: default_embed_timeout(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CrawlConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_page_delay")]
    pub page_delay_ms: u64,
    #[serde(default = "default_render_delay")]
    pub render_delay_ms: u64,
    #[serde(default = "default_max_links")]
    pub max_links_per_page: usize,
    /// Headless Chrome/Chromium binary used for client-rendered sites.
    #[serde(default)]
    pub browser: Option<PathBuf>,
    #[serde(default = "default_render_timeout")]
    pub render_timeout_secs: u64,
}

fn default_user_agent() -> String {
    format!("ChainLens/{} Documentation Indexer", env!("CARGO_PKG_VERSION"))
}
fn default_fetch_timeout() -> u64 {
    30
}
fn default_probe_timeout() -> u64 {
    15
}
fn default_page_delay() -> u64 {
    500
}
fn default_render_delay() -> u64 {
    1500
}
fn default_max_links() -> usize {
    50
}
fn default_render_timeout() -> u64 {
    30
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_fetch_timeout(),
            probe_timeout_secs: default_probe_timeout(),
            page_delay_ms: default_page_delay(),
            render_delay_ms: default_render_delay(),
            max_links_per_page: default_max_links(),
            browser: None,
            render_timeout_secs: default_render_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RepositoryConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Environment variable holding an optional GitHub token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    #[serde(default = "default_file_delay")]
    pub file_delay_ms: u64,
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}
fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}
fn default_max_files() -> usize {
    200
}
fn default_file_delay() -> u64 {
    100
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            token_env: default_token_env(),
            max_files: default_max_files(),
            file_delay_ms: default_file_delay(),
            timeout_secs: default_fetch_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentConfig {
    #[serde(default = "default_document_timeout")]
    pub timeout_secs: u64,
}

fn default_document_timeout() -> u64 {
    60
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_document_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

impl Config {
    pub fn chunking_params(&self) -> ChunkingParams {
        ChunkingParams {
            target_tokens: self.chunking.target_tokens,
            overlap_tokens: self.chunking.overlap_tokens,
            code_block_max_tokens: self.chunking.code_block_max_tokens,
            code_flush_slack_tokens: self.chunking.code_flush_slack_tokens,
        }
    }

    pub fn retrieval_params(&self) -> RetrievalParams {
        RetrievalParams {
            rrf_k: self.retrieval.rrf_k,
            candidate_limit: self.retrieval.candidate_limit,
            default_limit: self.retrieval.default_limit,
            max_limit: self.retrieval.max_limit,
        }
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.server
            .bind
            .parse()
            .with_context(|| format!("Invalid server.bind address: {}", self.server.bind))
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.chunking.target_tokens == 0 {
        anyhow::bail!("chunking.target_tokens must be > 0");
    }
    if config.chunking.overlap_tokens >= config.chunking.target_tokens {
        anyhow::bail!("chunking.overlap_tokens must be < chunking.target_tokens");
    }

    if config.retrieval.candidate_limit < 1 {
        anyhow::bail!("retrieval.candidate_limit must be >= 1");
    }
    if config.retrieval.max_limit < 1 {
        anyhow::bail!("retrieval.max_limit must be >= 1");
    }
    if config.retrieval.default_limit > config.retrieval.max_limit {
        anyhow::bail!("retrieval.default_limit must be <= retrieval.max_limit");
    }
    if config.retrieval.rrf_k < 0.0 {
        anyhow::bail!("retrieval.rrf_k must be >= 0");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims == 0 {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.trim().is_empty() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "voyage" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or voyage.",
            other
        ),
    }

    Ok(config)
}
