//! JSON-RPC 2.0 dispatch for the MCP endpoint.
//!
//! Every request is scoped to the sources an endpoint token resolves to.
//! The payloads of `initialize`, `tools/list` and `tools/call` are built
//! from the `rmcp` model types; the envelope (ids, batches, error
//! objects) is handled here so that one HTTP route can serve any number
//! of endpoint scopes.
//!
//! # Methods
//!
//! | Method | Result |
//! |--------|--------|
//! | `initialize` | protocol version, `tools` capability, server info |
//! | `tools/list` | descriptors of every registered [`Tool`] |
//! | `tools/call` | the tool's JSON output as one text content block |
//! | `ping` | `{}` |
//!
//! # Error codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | `-32700` | body is not JSON |
//! | `-32600` | request is not an object with a `method` |
//! | `-32601` | unknown method or unknown tool |
//! | `-32602` | invalid tool arguments |
//! | `-32603` | tool or store failure |
//! | `-32000` | the endpoint has no `READY` sources |

use std::borrow::Cow;
use std::sync::Arc;

use anyhow::Result;
use rmcp::model::{
    CallToolResult, Content, ErrorCode, ErrorData, Implementation, ProtocolVersion,
    ServerCapabilities, ServerInfo, Tool as McpTool, ToolAnnotations,
};
use serde::Serialize;
use serde_json::{json, Map, Value};

use chainlens_core::embedding::EmbeddingProvider;
use chainlens_core::endpoint;
use chainlens_core::search::RetrievalParams;
use chainlens_core::store::Store;

use crate::traits::{Tool, ToolContext, ToolError, ToolRegistry};

/// Custom error code for an endpoint without ready sources.
pub const NO_READY_SOURCES: i32 = -32000;

pub const NO_READY_SOURCES_MESSAGE: &str = "No indexed sources are ready in this endpoint. \
     Sources may still be indexing. Check the ChainLens dashboard.";

const SERVER_NAME: &str = "chainlens";

/// Shared protocol state: the store, the embedding provider and the tools.
pub struct McpService {
    store: Arc<dyn Store>,
    provider: Arc<dyn EmbeddingProvider>,
    retrieval: RetrievalParams,
    tools: ToolRegistry,
}

impl McpService {
    pub fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn EmbeddingProvider>,
        retrieval: RetrievalParams,
        tools: ToolRegistry,
    ) -> Self {
        Self {
            store,
            provider,
            retrieval,
            tools,
        }
    }

    /// Ids of the `READY` sources `token` covers.
    pub async fn resolve(&self, token: &str) -> Result<Vec<String>> {
        endpoint::resolve(self.store.as_ref(), token).await
    }

    /// Answer a JSON-RPC body (single request or batch) addressed to
    /// `token`.
    ///
    /// The endpoint is resolved once. Returns `Ok(None)` when nothing
    /// needs a reply (notifications only). A store failure during
    /// resolution is returned as `Err`.
    pub async fn handle(&self, token: &str, body: Value) -> Result<Option<Value>> {
        if body.as_array().is_some_and(Vec::is_empty) {
            return Ok(Some(failure(
                Value::Null,
                ErrorData::invalid_request("Empty batch", None),
            )));
        }

        let source_ids = self.resolve(token).await?;

        if source_ids.is_empty() {
            tracing::debug!(endpoint = token, "no ready sources");
            let reply = |request: &Value| {
                (!is_notification(request)).then(|| {
                    failure(
                        request_id(request),
                        ErrorData::new(
                            ErrorCode(NO_READY_SOURCES),
                            NO_READY_SOURCES_MESSAGE,
                            None,
                        ),
                    )
                })
            };
            return Ok(match &body {
                Value::Array(batch) => {
                    let replies: Vec<Value> = batch.iter().filter_map(reply).collect();
                    (!replies.is_empty()).then_some(Value::Array(replies))
                }
                single => reply(single),
            });
        }

        let ctx = ToolContext {
            store: Arc::clone(&self.store),
            provider: Arc::clone(&self.provider),
            retrieval: self.retrieval,
            source_ids,
        };

        match body {
            Value::Array(batch) => {
                let replies =
                    futures::future::join_all(batch.iter().map(|r| self.dispatch(r, &ctx))).await;
                let replies: Vec<Value> = replies.into_iter().flatten().collect();
                Ok((!replies.is_empty()).then_some(Value::Array(replies)))
            }
            single => Ok(self.dispatch(&single, &ctx).await),
        }
    }

    /// Answer one request. Notifications (a method but no `id`) get no
    /// reply.
    pub async fn dispatch(&self, request: &Value, ctx: &ToolContext) -> Option<Value> {
        let id = request_id(request);
        let Some(method) = request.get("method").and_then(Value::as_str) else {
            return Some(failure(
                id,
                ErrorData::invalid_request("Request must be an object with a method", None),
            ));
        };

        if is_notification(request) {
            tracing::debug!(method, "notification");
            return None;
        }

        let params = request.get("params").cloned().unwrap_or(Value::Null);
        let outcome = match method {
            "initialize" => to_result(&server_info()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": self.list_tools() })),
            "tools/call" => self.call_tool(&params, ctx).await,
            other => Err(ErrorData::new(
                ErrorCode::METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
                None,
            )),
        };

        Some(match outcome {
            Ok(result) => success(id, result),
            Err(error) => failure(id, error),
        })
    }

    /// `rmcp` descriptors of the registered tools.
    pub fn list_tools(&self) -> Vec<McpTool> {
        self.tools.tools().iter().map(|t| to_mcp_tool(t.as_ref())).collect()
    }

    async fn call_tool(&self, params: &Value, ctx: &ToolContext) -> Result<Value, ErrorData> {
        let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
        let arguments = match params.get("arguments") {
            Some(Value::Null) | None => Value::Object(Map::new()),
            Some(args) => args.clone(),
        };

        let tool = self.tools.find(name).ok_or_else(|| {
            ErrorData::new(
                ErrorCode::METHOD_NOT_FOUND,
                format!("Unknown tool: {}", name),
                None,
            )
        })?;

        match tool.execute(arguments, ctx).await {
            Ok(output) => {
                let text = serde_json::to_string_pretty(&output)
                    .map_err(|e| ErrorData::internal_error(e.to_string(), None))?;
                to_result(&CallToolResult::success(vec![Content::text(text)]))
            }
            Err(ToolError::InvalidParams(message)) => {
                Err(ErrorData::new(ErrorCode::INVALID_PARAMS, message, None))
            }
            Err(ToolError::Internal(e)) => {
                tracing::warn!(tool = name, error = %format!("{:#}", e), "tool call failed");
                Err(ErrorData::new(
                    ErrorCode::INTERNAL_ERROR,
                    format!("{:#}", e),
                    None,
                ))
            }
        }
    }
}

/// Static `initialize` payload.
pub fn server_info() -> ServerInfo {
    ServerInfo {
        protocol_version: ProtocolVersion::V_2024_11_05,
        capabilities: ServerCapabilities::builder().enable_tools().build(),
        server_info: Implementation {
            name: SERVER_NAME.to_string(),
            title: Some("ChainLens".to_string()),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: None,
            icons: None,
            website_url: None,
        },
        instructions: Some(
            "Ethereum development documentation. Call search_docs before answering \
             questions about contracts, interfaces or EIPs, and get_sources to see \
             what this endpoint covers."
                .to_string(),
        ),
    }
}

fn to_mcp_tool(tool: &dyn Tool) -> McpTool {
    let input_schema = match tool.parameters_schema() {
        Value::Object(map) => Arc::new(map),
        _ => Arc::new(Map::new()),
    };

    McpTool {
        name: Cow::Owned(tool.name().to_string()),
        title: None,
        description: Some(Cow::Owned(tool.description().to_string())),
        input_schema,
        output_schema: None,
        annotations: Some(ToolAnnotations::new().read_only(tool.is_read_only())),
        execution: None,
        icons: None,
        meta: None,
    }
}

/// Body for a request the server could not parse at all.
pub fn parse_error(detail: impl Into<String>) -> Value {
    failure(
        Value::Null,
        ErrorData::new(
            ErrorCode::PARSE_ERROR,
            format!("Parse error: {}", detail.into()),
            None,
        ),
    )
}

/// Body for a failure outside any single request.
pub fn internal_error() -> Value {
    failure(
        Value::Null,
        ErrorData::new(ErrorCode::INTERNAL_ERROR, "Internal server error", None),
    )
}

// ═══════════════════════════════════════════════════════════════════════
// Envelope
// ═══════════════════════════════════════════════════════════════════════

fn is_notification(request: &Value) -> bool {
    request.get("method").is_some_and(Value::is_string) && request.get("id").is_none()
}

fn request_id(request: &Value) -> Value {
    request.get("id").cloned().unwrap_or(Value::Null)
}

fn to_result<T: Serialize>(value: &T) -> Result<Value, ErrorData> {
    serde_json::to_value(value).map_err(|e| ErrorData::internal_error(e.to_string(), None))
}

fn success(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn failure(id: Value, error: ErrorData) -> Value {
    let mut body = json!({
        "code": error.code.0,
        "message": error.message,
    });
    if let Some(data) = error.data {
        body["data"] = data;
    }
    json!({ "jsonrpc": "2.0", "id": id, "error": body })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_payload() {
        let value = serde_json::to_value(server_info()).unwrap();
        assert_eq!(value["protocolVersion"], "2024-11-05");
        assert_eq!(value["serverInfo"]["name"], "chainlens");
        assert!(value["capabilities"]["tools"].is_object());
    }

    #[test]
    fn descriptors_carry_schema() {
        let registry = ToolRegistry::with_builtins();
        let tools: Vec<McpTool> = registry.tools().iter().map(|t| to_mcp_tool(t.as_ref())).collect();
        assert_eq!(tools.len(), 2);
        let search = serde_json::to_value(&tools[0]).unwrap();
        assert_eq!(search["name"], "search_docs");
        assert_eq!(search["inputSchema"]["required"], json!(["query"]));
    }

    #[test]
    fn error_envelope() {
        let body = failure(
            json!(7),
            ErrorData::new(ErrorCode::INVALID_PARAMS, "bad", None),
        );
        assert_eq!(body["jsonrpc"], "2.0");
        assert_eq!(body["id"], 7);
        assert_eq!(body["error"]["code"], -32602);
        assert_eq!(body["error"]["message"], "bad");
        assert!(body["error"].get("data").is_none());

        assert_eq!(parse_error("eof")["error"]["code"], -32700);
        assert_eq!(internal_error()["id"], Value::Null);
    }

    #[test]
    fn missing_id_echoes_null() {
        assert_eq!(request_id(&json!({"method": "ping"})), Value::Null);
        assert_eq!(request_id(&json!({"id": "a", "method": "ping"})), "a");
    }
}
