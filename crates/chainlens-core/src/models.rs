//! Core data models for ChainLens.
//!
//! These types flow through the indexing pipeline (extract → chunk →
//! embed → store) and the retrieval pipeline (resolve → search → fuse).
//! Persistence shapes live in the application crate; everything here is
//! plain data plus the source lifecycle rules.

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════
// Source kind
// ═══════════════════════════════════════════════════════════════════════

/// The extractor family a source is indexed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceKind {
    /// A documentation website crawled page by page.
    Web,
    /// A public GitHub repository (docs, markdown, Solidity).
    Repository,
    /// A single downloadable PDF document.
    Document,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Web => "WEB",
            SourceKind::Repository => "REPOSITORY",
            SourceKind::Document => "DOCUMENT",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "web" | "url" => Ok(SourceKind::Web),
            "repository" | "repo" | "github" => Ok(SourceKind::Repository),
            "document" | "pdf" => Ok(SourceKind::Document),
            other => bail!("unknown source kind '{}': expected web, repository or document", other),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Source status
// ═══════════════════════════════════════════════════════════════════════

/// Lifecycle status of a source.
///
/// ```text
/// PENDING ──► INDEXING ──► READY ──► REFRESHING ──► READY
///                 │          ▲            │
///                 ▼          │            ▼
///               ERROR ───────┘          ERROR
/// ```
///
/// Only `READY` sources are ever searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceStatus {
    Pending,
    Indexing,
    Ready,
    Error,
    Refreshing,
}

impl SourceStatus {
    pub const ALL: [SourceStatus; 5] = [
        SourceStatus::Pending,
        SourceStatus::Indexing,
        SourceStatus::Ready,
        SourceStatus::Error,
        SourceStatus::Refreshing,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SourceStatus::Pending => "PENDING",
            SourceStatus::Indexing => "INDEXING",
            SourceStatus::Ready => "READY",
            SourceStatus::Error => "ERROR",
            SourceStatus::Refreshing => "REFRESHING",
        }
    }

    /// True while an indexing job owns the source.
    pub fn is_active(self) -> bool {
        matches!(self, SourceStatus::Indexing | SourceStatus::Refreshing)
    }

    /// Whether the lifecycle permits moving from `self` to `next`.
    ///
    /// The match is exhaustive over the current status so that adding a
    /// status forces this table to be revisited.
    pub fn can_transition_to(self, next: SourceStatus) -> bool {
        use SourceStatus::*;
        match self {
            Pending => matches!(next, Indexing),
            Indexing => matches!(next, Ready | Error),
            Ready => matches!(next, Refreshing | Indexing | Pending),
            Error => matches!(next, Indexing | Pending),
            Refreshing => matches!(next, Ready | Error),
        }
    }

    /// Every status from which the lifecycle permits moving to `next`.
    pub fn predecessors(next: SourceStatus) -> Vec<SourceStatus> {
        Self::ALL
            .into_iter()
            .filter(|s| s.can_transition_to(next))
            .collect()
    }
}

impl fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(SourceStatus::Pending),
            "INDEXING" => Ok(SourceStatus::Indexing),
            "READY" => Ok(SourceStatus::Ready),
            "ERROR" => Ok(SourceStatus::Error),
            "REFRESHING" => Ok(SourceStatus::Refreshing),
            other => bail!("unknown source status '{}'", other),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Refresh interval
// ═══════════════════════════════════════════════════════════════════════

/// How often a `READY` source is re-indexed by the refresh sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshInterval {
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
}

impl RefreshInterval {
    pub fn as_str(self) -> &'static str {
        match self {
            RefreshInterval::None => "none",
            RefreshInterval::Daily => "daily",
            RefreshInterval::Weekly => "weekly",
            RefreshInterval::Monthly => "monthly",
        }
    }

    /// Interval length in seconds, or `None` when refresh is disabled.
    pub fn as_secs(self) -> Option<i64> {
        match self {
            RefreshInterval::None => None,
            RefreshInterval::Daily => Some(86_400),
            RefreshInterval::Weekly => Some(604_800),
            RefreshInterval::Monthly => Some(2_592_000),
        }
    }
}

impl fmt::Display for RefreshInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RefreshInterval {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "never" => Ok(RefreshInterval::None),
            "daily" => Ok(RefreshInterval::Daily),
            "weekly" => Ok(RefreshInterval::Weekly),
            "monthly" => Ok(RefreshInterval::Monthly),
            other => bail!(
                "unknown refresh interval '{}': expected none, daily, weekly or monthly",
                other
            ),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Sources and the hierarchy above them
// ═══════════════════════════════════════════════════════════════════════

fn default_true() -> bool {
    true
}

/// Which parts of a repository get indexed.
///
/// Test and example directories are skipped unless explicitly enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexOptions {
    #[serde(default = "default_true")]
    pub index_readme: bool,
    #[serde(default = "default_true")]
    pub index_docs: bool,
    #[serde(default = "default_true")]
    pub index_solidity: bool,
    #[serde(default = "default_true")]
    pub index_markdown: bool,
    #[serde(default)]
    pub index_tests: bool,
    #[serde(default)]
    pub index_examples: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            index_readme: true,
            index_docs: true,
            index_solidity: true,
            index_markdown: true,
            index_tests: false,
            index_examples: false,
        }
    }
}

/// A registered documentation source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub name: String,
    pub kind: SourceKind,
    pub url: String,
    pub version: Option<String>,
    /// Maximum link depth for web crawls. `0` means the start page only.
    pub crawl_depth: u32,
    pub branch: Option<String>,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub index_options: IndexOptions,
    pub refresh: RefreshInterval,
    pub status: SourceStatus,
    pub chunk_count: i64,
    pub last_indexed_at: Option<DateTime<Utc>>,
    pub error_text: Option<String>,
    /// Public `src-` endpoint token.
    pub endpoint: String,
    pub section_id: Option<String>,
    pub subsection_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Source {
    /// Whether the refresh sweep should re-index this source at `now`.
    ///
    /// Only `READY` sources with a refresh interval qualify. A source
    /// that has never completed an index is always due.
    pub fn is_due_for_refresh(&self, now: DateTime<Utc>) -> bool {
        if self.status != SourceStatus::Ready {
            return false;
        }
        let Some(interval) = self.refresh.as_secs() else {
            return false;
        };
        match self.last_indexed_at {
            None => true,
            Some(last) => (now - last).num_seconds() >= interval,
        }
    }
}

/// Top level of the grouping hierarchy (e.g. an ecosystem).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub endpoint: String,
}

/// Second level of the hierarchy, always owned by a [`Section`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subsection {
    pub id: String,
    pub section_id: String,
    pub name: String,
    pub slug: String,
    pub endpoint: String,
}

// ═══════════════════════════════════════════════════════════════════════
// Content units and chunks
// ═══════════════════════════════════════════════════════════════════════

/// A heading-delimited piece of extracted content, before chunking.
///
/// Every extractor produces these; the chunker consumes them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawContentUnit {
    pub content: String,
    /// Heading or ` > `-joined breadcrumb the content sits under.
    pub heading: Option<String>,
    /// Origin page URL (web and document sources).
    pub url: Option<String>,
    /// Repository-relative path (repository sources).
    pub file_path: Option<String>,
}

impl RawContentUnit {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_heading(mut self, heading: impl Into<String>) -> Self {
        self.heading = Some(heading.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_file_path(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }
}

/// A retrievable piece of text produced by the chunker.
///
/// Chunks have no identity until the store persists them; see
/// [`Store::insert_chunks`](crate::store::Store::insert_chunks).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub content: String,
    pub heading: Option<String>,
    pub url: Option<String>,
    pub file_path: Option<String>,
    /// Position within the source, contiguous from 0.
    pub chunk_index: i64,
    /// Estimated token count (`ceil(chars / 4)`).
    pub token_count: i64,
}
