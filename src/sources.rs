//! Registration of sections, subsections and sources.
//!
//! These are the write paths behind `chainlens section add`,
//! `chainlens subsection add` and `chainlens source add|list|remove`.
//! Every new entity gets its public endpoint token here.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use chainlens_core::endpoint::{display_slug, section_endpoint, source_endpoint, subsection_endpoint};
use chainlens_core::models::{
    IndexOptions, RefreshInterval, Section, Source, SourceKind, SourceStatus, Subsection,
};
use chainlens_core::store::Store;

use crate::connector_repo::parse_github_url;

/// Link depth used when none is given: the start page plus its direct links.
pub const DEFAULT_CRAWL_DEPTH: u32 = 1;

/// Everything needed to register a source.
#[derive(Debug, Clone)]
pub struct NewSource {
    pub name: String,
    pub kind: SourceKind,
    pub url: String,
    pub version: Option<String>,
    pub crawl_depth: u32,
    pub branch: Option<String>,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub index_options: IndexOptions,
    pub refresh: RefreshInterval,
    pub section_id: Option<String>,
    pub subsection_id: Option<String>,
}

impl NewSource {
    pub fn new(name: impl Into<String>, kind: SourceKind, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            url: url.into(),
            version: None,
            crawl_depth: DEFAULT_CRAWL_DEPTH,
            branch: None,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            index_options: IndexOptions::default(),
            refresh: RefreshInterval::None,
            section_id: None,
            subsection_id: None,
        }
    }
}

pub async fn add_section(store: &dyn Store, name: &str) -> Result<Section> {
    let name = name.trim();
    if name.is_empty() {
        bail!("Section name must not be empty");
    }
    let slug = display_slug(name);
    let section = Section {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        endpoint: section_endpoint(&slug),
        slug,
    };
    store.insert_section(&section).await?;
    tracing::info!(section = %section.name, endpoint = %section.endpoint, "section created");
    Ok(section)
}

pub async fn add_subsection(store: &dyn Store, section_id: &str, name: &str) -> Result<Subsection> {
    let name = name.trim();
    if name.is_empty() {
        bail!("Subsection name must not be empty");
    }
    let section = store
        .get_section(section_id)
        .await?
        .with_context(|| format!("Section not found: {}", section_id))?;

    let slug = display_slug(name);
    let subsection = Subsection {
        id: Uuid::new_v4().to_string(),
        section_id: section.id.clone(),
        name: name.to_string(),
        endpoint: subsection_endpoint(&section.slug, &slug),
        slug,
    };
    store.insert_subsection(&subsection).await?;
    tracing::info!(subsection = %subsection.name, endpoint = %subsection.endpoint, "subsection created");
    Ok(subsection)
}

/// Validate and persist a new `PENDING` source.
///
/// A subsection implies its section; naming both requires that they
/// agree.
pub async fn add_source(store: &dyn Store, new: NewSource, now: DateTime<Utc>) -> Result<Source> {
    let name = new.name.trim().to_string();
    if name.is_empty() {
        bail!("Source name must not be empty");
    }
    validate_origin(new.kind, &new.url)?;

    let mut section_id = new.section_id;
    if let Some(sub_id) = &new.subsection_id {
        let sub = store
            .get_subsection(sub_id)
            .await?
            .with_context(|| format!("Subsection not found: {}", sub_id))?;
        if let Some(sec) = &section_id {
            if *sec != sub.section_id {
                bail!("Subsection {} does not belong to section {}", sub_id, sec);
            }
        }
        section_id = Some(sub.section_id);
    } else if let Some(sec) = &section_id {
        if store.get_section(sec).await?.is_none() {
            bail!("Section not found: {}", sec);
        }
    }

    let source = Source {
        id: Uuid::new_v4().to_string(),
        endpoint: source_endpoint(&name, now),
        name,
        kind: new.kind,
        url: new.url.trim().to_string(),
        version: new.version.filter(|v| !v.trim().is_empty()),
        crawl_depth: new.crawl_depth,
        branch: new.branch.filter(|b| !b.trim().is_empty()),
        include_patterns: new.include_patterns,
        exclude_patterns: new.exclude_patterns,
        index_options: new.index_options,
        refresh: new.refresh,
        status: SourceStatus::Pending,
        chunk_count: 0,
        last_indexed_at: None,
        error_text: None,
        section_id,
        subsection_id: new.subsection_id,
        created_at: now,
    };
    store.insert_source(&source).await?;
    tracing::info!(source = %source.name, kind = %source.kind, endpoint = %source.endpoint, "source registered");
    Ok(source)
}

fn validate_origin(kind: SourceKind, raw: &str) -> Result<()> {
    let parsed = url::Url::parse(raw.trim()).with_context(|| format!("Invalid URL: {}", raw))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        bail!("URL must use http or https: {}", raw);
    }
    if kind == SourceKind::Repository {
        parse_github_url(raw)?;
    }
    Ok(())
}

pub async fn remove_source(store: &dyn Store, id: &str) -> Result<()> {
    if !store.delete_source(id).await? {
        bail!("Source not found: {}", id);
    }
    tracing::info!(source_id = id, "source removed");
    Ok(())
}

// ============ Printing ============

pub fn print_sources(sources: &[Source]) {
    if sources.is_empty() {
        println!("No sources registered.");
        return;
    }
    println!(
        "{:<36}  {:<24} {:<10} {:<10} {:>7}  ENDPOINT",
        "ID", "NAME", "KIND", "STATUS", "CHUNKS"
    );
    for s in sources {
        println!(
            "{:<36}  {:<24} {:<10} {:<10} {:>7}  {}",
            s.id,
            truncate(&s.name, 24),
            s.kind,
            s.status,
            s.chunk_count,
            s.endpoint
        );
        if let Some(err) = &s.error_text {
            println!("{:<38}error: {}", "", err);
        }
    }
}

pub fn print_sections(sections: &[Section]) {
    if sections.is_empty() {
        return;
    }
    println!("{:<36}  {:<24} ENDPOINT", "SECTION", "NAME");
    for s in sections {
        println!("{:<36}  {:<24} {}", s.id, truncate(&s.name, 24), s.endpoint);
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max - 1).collect();
        out.push('…');
        out
    }
}
