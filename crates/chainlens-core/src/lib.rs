//! # ChainLens Core
//!
//! Runtime-agnostic logic for ChainLens: data models and the source
//! lifecycle, the chunker, the embedding and store abstractions,
//! endpoint-token resolution, and the hybrid retrieval algorithm.
//!
//! This crate performs no network or filesystem I/O and does not depend
//! on tokio or sqlx. The application crate supplies concrete stores,
//! embedding providers, and extractors.

pub mod chunk;
pub mod embedding;
pub mod endpoint;
pub mod models;
pub mod search;
pub mod store;
