//! `chainlens search`: the protocol search path, run from the terminal.
//!
//! Resolves the endpoint token exactly like the MCP server does, runs
//! the hybrid retrieval engine and prints the fused results.

use anyhow::Result;
use std::fmt::Write as _;

use chainlens_core::endpoint;
use chainlens_core::search::{hybrid_search, SearchRequest, SearchResponse};

use crate::config::Config;
use crate::embedding::create_provider;
use crate::sqlite_store::SqliteStore;

const EXCERPT_CHARS: usize = 240;

pub async fn run_search(
    config: &Config,
    query: &str,
    endpoint_token: &str,
    limit: Option<usize>,
    version: Option<&str>,
    as_json: bool,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let store = SqliteStore::open(config).await?;
    let source_ids = endpoint::resolve(&store, endpoint_token).await?;
    if source_ids.is_empty() {
        println!("No ready sources for endpoint {}.", endpoint_token);
        store.pool().close().await;
        return Ok(());
    }

    let provider = create_provider(&config.embedding)?;
    let request = SearchRequest {
        query: query.trim(),
        source_ids: &source_ids,
        limit,
        version,
    };
    let response = hybrid_search(
        &store,
        provider.as_ref(),
        &request,
        &config.retrieval_params(),
    )
    .await?;
    store.pool().close().await;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print!("{}", render(&response));
    }
    Ok(())
}

/// Human-readable listing of a search response.
pub fn render(response: &SearchResponse) -> String {
    let mut out = String::new();
    if response.results.is_empty() {
        out.push_str("No results.\n");
        return out;
    }

    for (i, result) in response.results.iter().enumerate() {
        let heading = result.heading.as_deref().unwrap_or("(no heading)");
        let _ = writeln!(
            out,
            "{}. [{:.4}] {} / {}",
            i + 1,
            result.relevance_score,
            result.source_name,
            heading
        );
        if let Some(version) = &result.version {
            let _ = writeln!(out, "    version: {}", version);
        }
        if let Some(path) = &result.file_path {
            let _ = writeln!(out, "    file: {}", path);
        }
        if let Some(url) = &result.source_url {
            let _ = writeln!(out, "    url: {}", url);
        }
        let _ = writeln!(out, "    excerpt: \"{}\"", excerpt(&result.content));
        let _ = writeln!(out, "    id: {}", result.chunk_id);
        out.push('\n');
    }
    let _ = writeln!(
        out,
        "{} results from {} in {} ms",
        response.total_results,
        response.sources_searched.join(", "),
        response.query_time_ms
    );
    out
}

fn excerpt(content: &str) -> String {
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= EXCERPT_CHARS {
        flat
    } else {
        let cut: String = flat.chars().take(EXCERPT_CHARS).collect();
        format!("{}...", cut.trim_end())
    }
}
