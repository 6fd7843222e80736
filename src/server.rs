//! HTTP server for the MCP endpoints.
//!
//! Every endpoint token gets its own JSON-RPC URL. The token is resolved
//! on each request, so sources becoming `READY` are picked up without a
//! restart.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/mcp/{endpoint}` | JSON-RPC request or batch |
//! | `GET`  | `/mcp/{endpoint}` | Endpoint status |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser-based
//! assistants can call the endpoints directly.
//!
//! # Client configuration
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "chainlens-uniswap": {
//!       "url": "http://127.0.0.1:7340/mcp/sec-uniswap"
//!     }
//!   }
//! }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::embedding::create_provider;
use crate::mcp::{self, McpService};
use crate::sqlite_store::SqliteStore;
use crate::traits::ToolRegistry;

/// Starts the HTTP server with the store and embedding provider named in
/// `config`. Runs until the process is terminated.
pub async fn run_server(config: &Config) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let provider = create_provider(&config.embedding)?;
    let service = McpService::new(
        Arc::new(store),
        provider,
        config.retrieval_params(),
        ToolRegistry::with_builtins(),
    );

    let addr = config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "MCP server listening");
    println!("ChainLens MCP server listening on http://{}/mcp/{{endpoint}}", addr);

    axum::serve(listener, router(Arc::new(service))).await?;
    Ok(())
}

/// The application router. Exposed so tests can serve it on an
/// ephemeral port.
pub fn router(service: Arc<McpService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/mcp/{endpoint}", get(handle_status).post(handle_rpc))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(service)
}

/// Bind `router(service)` on `addr` in a background task and return the
/// bound address.
pub async fn spawn(service: Arc<McpService>, addr: SocketAddr) -> Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router(service)).await {
            tracing::error!(error = %e, "MCP server stopped");
        }
    });
    Ok(local)
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============ GET /mcp/{endpoint} ============

/// JSON response body for `GET /mcp/{endpoint}`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointStatus {
    pub endpoint: String,
    pub sources_ready: usize,
    /// `"active"` or `"no_ready_sources"`.
    pub status: &'static str,
    pub protocol: &'static str,
    pub transport: &'static str,
}

async fn handle_status(
    State(service): State<Arc<McpService>>,
    Path(endpoint): Path<String>,
) -> Response {
    match service.resolve(&endpoint).await {
        Ok(ids) => Json(EndpointStatus {
            sources_ready: ids.len(),
            status: if ids.is_empty() {
                "no_ready_sources"
            } else {
                "active"
            },
            endpoint,
            protocol: "MCP",
            transport: "HTTP POST",
        })
        .into_response(),
        Err(e) => {
            tracing::error!(endpoint = %endpoint, error = %format!("{:#}", e), "endpoint status failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(mcp::internal_error())).into_response()
        }
    }
}

// ============ POST /mcp/{endpoint} ============

/// The body is taken as raw bytes so malformed JSON can be answered with
/// a JSON-RPC parse error instead of axum's plain-text rejection.
async fn handle_rpc(
    State(service): State<Arc<McpService>>,
    Path(endpoint): Path<String>,
    body: Bytes,
) -> Response {
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => return (StatusCode::BAD_REQUEST, Json(mcp::parse_error(e.to_string()))).into_response(),
    };

    match service.handle(&endpoint, payload).await {
        Ok(Some(reply)) => Json(reply).into_response(),
        Ok(None) => StatusCode::ACCEPTED.into_response(),
        Err(e) => {
            tracing::error!(endpoint = %endpoint, error = %format!("{:#}", e), "MCP request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(mcp::internal_error())).into_response()
        }
    }
}
