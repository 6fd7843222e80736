//! Endpoint tokens and scope resolution.
//!
//! An endpoint token is an opaque string whose prefix selects the scope
//! a search is allowed to cover:
//!
//! | Prefix | Scope |
//! |--------|-------|
//! | `src-` | one source |
//! | `sub-` | every source directly under a subsection |
//! | `sec-` | sources directly under a section plus those of all its subsections |
//!
//! Resolution only ever yields `READY` sources. Unknown prefixes and
//! missing targets resolve to an empty set rather than an error.

use std::collections::HashSet;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::models::{Source, SourceStatus};
use crate::store::Store;

pub const SOURCE_PREFIX: &str = "src-";
pub const SUBSECTION_PREFIX: &str = "sub-";
pub const SECTION_PREFIX: &str = "sec-";

/// Scope selected by a token's prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointScope {
    Source,
    Subsection,
    Section,
}

impl EndpointScope {
    pub fn of(token: &str) -> Option<Self> {
        if token.starts_with(SOURCE_PREFIX) {
            Some(EndpointScope::Source)
        } else if token.starts_with(SUBSECTION_PREFIX) {
            Some(EndpointScope::Subsection)
        } else if token.starts_with(SECTION_PREFIX) {
            Some(EndpointScope::Section)
        } else {
            None
        }
    }
}

/// Resolve a token to the ids of the `READY` sources it authorizes.
///
/// Ids are de-duplicated, keeping first-seen order. Store failures are
/// propagated; an unknown token is `Ok(vec![])`.
pub async fn resolve(store: &dyn Store, token: &str) -> Result<Vec<String>> {
    let candidates: Vec<Source> = match EndpointScope::of(token) {
        None => Vec::new(),
        Some(EndpointScope::Source) => store.source_by_endpoint(token).await?.into_iter().collect(),
        Some(EndpointScope::Subsection) => match store.subsection_by_endpoint(token).await? {
            Some(sub) => store.sources_in_subsection(&sub.id).await?,
            None => Vec::new(),
        },
        Some(EndpointScope::Section) => match store.section_by_endpoint(token).await? {
            Some(section) => {
                let mut all = store.sources_in_section(&section.id).await?;
                for sub in store.subsections_of(&section.id).await? {
                    all.extend(store.sources_in_subsection(&sub.id).await?);
                }
                all
            }
            None => Vec::new(),
        },
    };

    let mut seen = HashSet::new();
    Ok(candidates
        .into_iter()
        .filter(|s| s.status == SourceStatus::Ready)
        .filter(|s| seen.insert(s.id.clone()))
        .map(|s| s.id)
        .collect())
}

// ═══════════════════════════════════════════════════════════════════════
// Token generation
// ═══════════════════════════════════════════════════════════════════════

/// URL-safe slug of a display name.
///
/// Lower-cases, drops everything outside `[a-z0-9]`, whitespace and `-`,
/// collapses whitespace and dash runs into one `-`, and trims dashes.
///
/// ```rust
/// use chainlens_core::endpoint::slugify;
///
/// assert_eq!(slugify("  Uniswap V3 -- Core!  "), "uniswap-v3-core");
/// ```
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            out.push(c);
        } else if (c.is_whitespace() || c == '-') && !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

fn non_empty(slug: String) -> String {
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

pub fn section_endpoint(section_slug: &str) -> String {
    format!("{}{}", SECTION_PREFIX, section_slug)
}

pub fn subsection_endpoint(section_slug: &str, subsection_slug: &str) -> String {
    format!("{}{}-{}", SUBSECTION_PREFIX, section_slug, subsection_slug)
}

/// `src-<slug>-<suffix>`, where the suffix is 4 hex characters of a
/// SHA-256 over the name and creation instant.
pub fn source_endpoint(name: &str, created_at: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update(created_at.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
    let digest = hasher.finalize();
    format!(
        "{}{}-{:02x}{:02x}",
        SOURCE_PREFIX,
        non_empty(slugify(name)),
        digest[0],
        digest[1]
    )
}

/// Slug for a section or subsection name, never empty.
pub fn display_slug(name: &str) -> String {
    non_empty(slugify(name))
}
