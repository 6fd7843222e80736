//! # ChainLens
//!
//! Documentation ingestion and hybrid retrieval for AI coding assistants.
//!
//! ChainLens crawls documentation websites, GitHub repositories (Markdown
//! and Solidity with NatSpec) and PDF documents, splits them into
//! token-bounded chunks, embeds them, and serves reciprocal-rank-fused
//! hybrid search over JSON-RPC (MCP) endpoints scoped to a source, a
//! subsection or a section.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌───────────┐
//! │ Extractors  │──▶│   Pipeline   │──▶│  SQLite   │
//! │ Web/Repo/PDF│   │ Chunk+Embed  │   │ FTS5+Vec  │
//! └─────────────┘   └──────────────┘   └─────┬─────┘
//!                                            │
//!                      ┌─────────────────────┤
//!                      ▼                     ▼
//!                 ┌──────────┐        ┌────────────┐
//!                 │   CLI    │        │ HTTP (MCP) │
//!                 │(chainlens)│       │ /mcp/{ep}  │
//!                 └──────────┘        └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`], [`migrate`] | Database connection and schema |
//! | [`sqlite_store`] | SQLite storage gateway |
//! | [`embedding`], [`retry`] | Voyage embedding client with rate-limit backoff |
//! | [`fetch`], [`html`], [`connector_web`] | Documentation-site crawler |
//! | [`markdown`], [`solidity`], [`connector_repo`] | GitHub repository crawler |
//! | [`extract`], [`connector_pdf`] | PDF document parser |
//! | [`outline`] | Heading-delimited content units |
//! | [`traits`] | Extractor and tool abstractions |
//! | [`ingest`] | Indexing orchestrator |
//! | [`mcp`], [`server`] | JSON-RPC dispatch and HTTP server |
//! | [`sources`], [`search`] | CLI administration and search |

pub mod config;
pub mod connector_pdf;
pub mod connector_repo;
pub mod connector_web;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod fetch;
pub mod html;
pub mod ingest;
pub mod markdown;
pub mod mcp;
pub mod migrate;
pub mod outline;
pub mod retry;
pub mod search;
pub mod server;
pub mod solidity;
pub mod sources;
pub mod sqlite_store;
pub mod traits;
