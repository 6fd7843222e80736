//! SQLite-backed [`Store`] implementation.
//!
//! Full-text search uses the `chunks_fts` FTS5 table ranked by `bm25`.
//! Vectors are little-endian f32 BLOBs on `chunks.embedding`; cosine
//! similarity is computed in-process over the rows of the requested
//! sources. Source-id sets are bound as a JSON array and expanded with
//! `json_each`, so every query is a single prepared statement.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use chainlens_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use chainlens_core::models::{Chunk, Section, Source, SourceStatus, Subsection};
use chainlens_core::search::keyword_terms;
use chainlens_core::store::{ChunkHit, SearchScope, Store};

use crate::config::Config;
use crate::db;

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the database named in the config.
    pub async fn open(config: &Config) -> Result<Self> {
        Ok(Self::new(db::connect(config).await?))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

const SOURCE_COLUMNS: &str = "id, name, kind, url, version, crawl_depth, branch, include_json, \
    exclude_json, options_json, refresh, status, chunk_count, last_indexed_at, error_text, \
    endpoint, section_id, subsection_id, created_at";

const HIT_COLUMNS: &str = "c.id AS chunk_id, c.source_id, s.name AS source_name, \
    s.url AS source_url, s.version, c.content, c.heading, c.url AS chunk_url, c.file_path";

fn timestamp(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).with_context(|| format!("invalid timestamp {}", secs))
}

fn source_from_row(row: &SqliteRow) -> Result<Source> {
    let kind: String = row.try_get("kind")?;
    let status: String = row.try_get("status")?;
    let refresh: String = row.try_get("refresh")?;
    let include_json: String = row.try_get("include_json")?;
    let exclude_json: String = row.try_get("exclude_json")?;
    let options_json: String = row.try_get("options_json")?;
    let crawl_depth: i64 = row.try_get("crawl_depth")?;
    let last_indexed_at: Option<i64> = row.try_get("last_indexed_at")?;
    let created_at: i64 = row.try_get("created_at")?;

    Ok(Source {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        kind: kind.parse()?,
        url: row.try_get("url")?,
        version: row.try_get("version")?,
        crawl_depth: u32::try_from(crawl_depth).unwrap_or(0),
        branch: row.try_get("branch")?,
        include_patterns: serde_json::from_str(&include_json)
            .context("corrupt include patterns")?,
        exclude_patterns: serde_json::from_str(&exclude_json)
            .context("corrupt exclude patterns")?,
        index_options: serde_json::from_str(&options_json).context("corrupt index options")?,
        refresh: refresh.parse()?,
        status: status.parse()?,
        chunk_count: row.try_get("chunk_count")?,
        last_indexed_at: last_indexed_at.map(timestamp).transpose()?,
        error_text: row.try_get("error_text")?,
        endpoint: row.try_get("endpoint")?,
        section_id: row.try_get("section_id")?,
        subsection_id: row.try_get("subsection_id")?,
        created_at: timestamp(created_at)?,
    })
}

fn section_from_row(row: &SqliteRow) -> Result<Section> {
    Ok(Section {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
        endpoint: row.try_get("endpoint")?,
    })
}

fn subsection_from_row(row: &SqliteRow) -> Result<Subsection> {
    Ok(Subsection {
        id: row.try_get("id")?,
        section_id: row.try_get("section_id")?,
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
        endpoint: row.try_get("endpoint")?,
    })
}

fn hit_from_row(row: &SqliteRow, score: f64) -> Result<ChunkHit> {
    Ok(ChunkHit {
        chunk_id: row.try_get("chunk_id")?,
        source_id: row.try_get("source_id")?,
        source_name: row.try_get("source_name")?,
        source_url: row.try_get("source_url")?,
        version: row.try_get("version")?,
        content: row.try_get("content")?,
        heading: row.try_get("heading")?,
        url: row.try_get("chunk_url")?,
        file_path: row.try_get("file_path")?,
        score,
    })
}

fn ids_json(ids: &[String]) -> Result<String> {
    Ok(serde_json::to_string(ids)?)
}

/// FTS5 query matching every term; each term is quoted so user input
/// cannot inject FTS syntax.
fn fts_query(query: &str) -> Option<String> {
    let terms = keyword_terms(query);
    if terms.is_empty() {
        return None;
    }
    Some(
        terms
            .iter()
            .map(|t| format!("\"{}\"", t))
            .collect::<Vec<_>>()
            .join(" "),
    )
}

impl SqliteStore {
    async fn sources_where(&self, clause: &str, arg: &str) -> Result<Vec<Source>> {
        let sql = format!(
            "SELECT {} FROM sources WHERE {} ORDER BY created_at, id",
            SOURCE_COLUMNS, clause
        );
        let rows = sqlx::query(&sql).bind(arg).fetch_all(&self.pool).await?;
        rows.iter().map(source_from_row).collect()
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_section(&self, section: &Section) -> Result<()> {
        sqlx::query("INSERT INTO sections (id, name, slug, endpoint) VALUES (?, ?, ?, ?)")
            .bind(&section.id)
            .bind(&section.name)
            .bind(&section.slug)
            .bind(&section.endpoint)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to create section '{}'", section.name))?;
        Ok(())
    }

    async fn insert_subsection(&self, subsection: &Subsection) -> Result<()> {
        sqlx::query(
            "INSERT INTO subsections (id, section_id, name, slug, endpoint) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&subsection.id)
        .bind(&subsection.section_id)
        .bind(&subsection.name)
        .bind(&subsection.slug)
        .bind(&subsection.endpoint)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to create subsection '{}'", subsection.name))?;
        Ok(())
    }

    async fn insert_source(&self, source: &Source) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sources (id, name, kind, url, version, crawl_depth, branch,
                                 include_json, exclude_json, options_json, refresh, status,
                                 chunk_count, last_indexed_at, error_text, endpoint,
                                 section_id, subsection_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&source.id)
        .bind(&source.name)
        .bind(source.kind.as_str())
        .bind(&source.url)
        .bind(&source.version)
        .bind(source.crawl_depth as i64)
        .bind(&source.branch)
        .bind(serde_json::to_string(&source.include_patterns)?)
        .bind(serde_json::to_string(&source.exclude_patterns)?)
        .bind(serde_json::to_string(&source.index_options)?)
        .bind(source.refresh.as_str())
        .bind(source.status.as_str())
        .bind(source.chunk_count)
        .bind(source.last_indexed_at.map(|t| t.timestamp()))
        .bind(&source.error_text)
        .bind(&source.endpoint)
        .bind(&source.section_id)
        .bind(&source.subsection_id)
        .bind(source.created_at.timestamp())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to create source '{}'", source.name))?;
        Ok(())
    }

    async fn get_section(&self, id: &str) -> Result<Option<Section>> {
        let row = sqlx::query("SELECT id, name, slug, endpoint FROM sections WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(section_from_row).transpose()
    }

    async fn list_sections(&self) -> Result<Vec<Section>> {
        let rows = sqlx::query("SELECT id, name, slug, endpoint FROM sections ORDER BY name, id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(section_from_row).collect()
    }

    async fn get_subsection(&self, id: &str) -> Result<Option<Subsection>> {
        let row =
            sqlx::query("SELECT id, section_id, name, slug, endpoint FROM subsections WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.as_ref().map(subsection_from_row).transpose()
    }

    async fn get_source(&self, id: &str) -> Result<Option<Source>> {
        Ok(self.sources_where("id = ?", id).await?.into_iter().next())
    }

    async fn list_sources(&self) -> Result<Vec<Source>> {
        let sql = format!("SELECT {} FROM sources ORDER BY created_at, id", SOURCE_COLUMNS);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(source_from_row).collect()
    }

    async fn sources_by_ids(&self, ids: &[String]) -> Result<Vec<Source>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let found = self
            .sources_where("id IN (SELECT value FROM json_each(?))", &ids_json(ids)?)
            .await?;
        Ok(ids
            .iter()
            .filter_map(|id| found.iter().find(|s| &s.id == id).cloned())
            .collect())
    }

    async fn delete_source(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunks_fts WHERE source_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chunks WHERE source_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM sources WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_status(
        &self,
        id: &str,
        status: SourceStatus,
        error_text: Option<&str>,
        only_from: &[SourceStatus],
    ) -> Result<bool> {
        let result = if only_from.is_empty() {
            sqlx::query("UPDATE sources SET status = ?, error_text = ? WHERE id = ?")
                .bind(status.as_str())
                .bind(error_text)
                .bind(id)
                .execute(&self.pool)
                .await?
        } else {
            let allowed: Vec<&str> = only_from.iter().map(|s| s.as_str()).collect();
            sqlx::query(
                r#"
                UPDATE sources SET status = ?, error_text = ?
                WHERE id = ? AND status IN (SELECT value FROM json_each(?))
                "#,
            )
            .bind(status.as_str())
            .bind(error_text)
            .bind(id)
            .bind(serde_json::to_string(&allowed)?)
            .execute(&self.pool)
            .await?
        };
        Ok(result.rows_affected() > 0)
    }

    async fn mark_ready(
        &self,
        id: &str,
        chunk_count: i64,
        indexed_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE sources
            SET status = 'READY', chunk_count = ?, last_indexed_at = ?, error_text = NULL
            WHERE id = ?
            "#,
        )
        .bind(chunk_count)
        .bind(indexed_at.timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_chunks(&self, source_id: &str) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunks_fts WHERE source_id = ?")
            .bind(source_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM chunks WHERE source_id = ?")
            .bind(source_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE sources SET chunk_count = 0 WHERE id = ?")
            .bind(source_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }

    async fn insert_chunks(&self, source_id: &str, chunks: &[Chunk]) -> Result<Vec<String>> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let id = Uuid::new_v4().to_string();
            sqlx::query(
                r#"
                INSERT INTO chunks (id, source_id, chunk_index, content, heading, url,
                                    file_path, token_count)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&id)
            .bind(source_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(&chunk.heading)
            .bind(&chunk.url)
            .bind(&chunk.file_path)
            .bind(chunk.token_count)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO chunks_fts (chunk_id, source_id, heading, content) VALUES (?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(source_id)
            .bind(chunk.heading.as_deref().unwrap_or(""))
            .bind(&chunk.content)
            .execute(&mut *tx)
            .await?;

            ids.push(id);
        }
        tx.commit().await?;
        Ok(ids)
    }

    async fn set_chunk_embedding(&self, chunk_id: &str, vector: &[f32]) -> Result<()> {
        sqlx::query("UPDATE chunks SET embedding = ? WHERE id = ?")
            .bind(vec_to_blob(vector))
            .bind(chunk_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn vector_search(
        &self,
        query_vec: &[f32],
        scope: SearchScope<'_>,
        limit: usize,
    ) -> Result<Vec<ChunkHit>> {
        if scope.source_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            r#"
            SELECT {}, c.embedding
            FROM chunks c
            JOIN sources s ON s.id = c.source_id
            WHERE c.embedding IS NOT NULL
              AND s.status = 'READY'
              AND c.source_id IN (SELECT value FROM json_each(?))
              AND (? IS NULL OR s.version = ?)
            "#,
            HIT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(ids_json(scope.source_ids)?)
            .bind(scope.version)
            .bind(scope.version)
            .fetch_all(&self.pool)
            .await?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.try_get("embedding")?;
            let similarity = cosine_similarity(query_vec, &blob_to_vec(&blob)) as f64;
            hits.push(hit_from_row(row, similarity)?);
        }
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn keyword_search(
        &self,
        query: &str,
        scope: SearchScope<'_>,
        limit: usize,
    ) -> Result<Vec<ChunkHit>> {
        if scope.source_ids.is_empty() {
            return Ok(Vec::new());
        }
        let Some(match_expr) = fts_query(query) else {
            return Ok(Vec::new());
        };
        let sql = format!(
            r#"
            SELECT {}, bm25(chunks_fts) AS rank
            FROM chunks_fts
            JOIN chunks c ON c.id = chunks_fts.chunk_id
            JOIN sources s ON s.id = c.source_id
            WHERE chunks_fts MATCH ?
              AND s.status = 'READY'
              AND c.source_id IN (SELECT value FROM json_each(?))
              AND (? IS NULL OR s.version = ?)
            ORDER BY rank, c.id
            LIMIT ?
            "#,
            HIT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(match_expr)
            .bind(ids_json(scope.source_ids)?)
            .bind(scope.version)
            .bind(scope.version)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let rank: f64 = row.try_get("rank")?;
                hit_from_row(row, -rank)
            })
            .collect()
    }

    async fn source_by_endpoint(&self, token: &str) -> Result<Option<Source>> {
        Ok(self
            .sources_where("endpoint = ?", token)
            .await?
            .into_iter()
            .next())
    }

    async fn subsection_by_endpoint(&self, token: &str) -> Result<Option<Subsection>> {
        let row = sqlx::query(
            "SELECT id, section_id, name, slug, endpoint FROM subsections WHERE endpoint = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(subsection_from_row).transpose()
    }

    async fn section_by_endpoint(&self, token: &str) -> Result<Option<Section>> {
        let row = sqlx::query("SELECT id, name, slug, endpoint FROM sections WHERE endpoint = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(section_from_row).transpose()
    }

    async fn subsections_of(&self, section_id: &str) -> Result<Vec<Subsection>> {
        let rows = sqlx::query(
            "SELECT id, section_id, name, slug, endpoint FROM subsections WHERE section_id = ? ORDER BY name, id",
        )
        .bind(section_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(subsection_from_row).collect()
    }

    async fn sources_in_subsection(&self, subsection_id: &str) -> Result<Vec<Source>> {
        self.sources_where("subsection_id = ?", subsection_id).await
    }

    async fn sources_in_section(&self, section_id: &str) -> Result<Vec<Source>> {
        self.sources_where("section_id = ?", section_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainlens_core::models::{IndexOptions, RefreshInterval, SourceKind};
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

    use crate::migrate::apply_schema;

    async fn temp_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let options = SqliteConnectOptions::new()
            .filename(dir.path().join("store.db"))
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        apply_schema(&pool).await.unwrap();
        (dir, SqliteStore::new(pool))
    }

    fn source(id: &str, version: &str, status: SourceStatus) -> Source {
        Source {
            id: id.into(),
            name: format!("Source {}", id),
            kind: SourceKind::Web,
            url: format!("https://{}.example.org", id),
            version: Some(version.into()),
            crawl_depth: 1,
            branch: None,
            include_patterns: vec![],
            exclude_patterns: vec![],
            index_options: IndexOptions::default(),
            refresh: RefreshInterval::None,
            status,
            chunk_count: 0,
            last_indexed_at: None,
            error_text: None,
            endpoint: format!("src-{}-0000", id),
            section_id: None,
            subsection_id: None,
            created_at: Utc::now(),
        }
    }

    fn chunks(texts: &[&str]) -> Vec<Chunk> {
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| Chunk {
                content: text.to_string(),
                heading: Some("Router".into()),
                url: None,
                file_path: None,
                chunk_index: i as i64,
                token_count: 4,
            })
            .collect()
    }

    async fn seed(store: &SqliteStore, id: &str, version: &str, status: SourceStatus) {
        store.insert_source(&source(id, version, status)).await.unwrap();
        let ids = store
            .insert_chunks(id, &chunks(&["swap through the router with a fee tier"]))
            .await
            .unwrap();
        for chunk_id in ids {
            store.set_chunk_embedding(&chunk_id, &[1.0, 0.0, 0.0]).await.unwrap();
        }
    }

    async fn fts_rows(store: &SqliteStore, source_id: &str) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM chunks_fts WHERE source_id = ?")
            .bind(source_id)
            .fetch_one(store.pool())
            .await
            .unwrap()
    }

    fn hit_sources(hits: &[ChunkHit]) -> Vec<String> {
        let mut ids: Vec<String> = hits.iter().map(|h| h.source_id.clone()).collect();
        ids.sort();
        ids
    }

    #[tokio::test]
    async fn claim_is_conditional_on_current_status() {
        let (_dir, store) = temp_store().await;
        store
            .insert_source(&source("a", "v1", SourceStatus::Pending))
            .await
            .unwrap();
        let claimable = SourceStatus::predecessors(SourceStatus::Indexing);

        assert!(store
            .update_status("a", SourceStatus::Indexing, None, &claimable)
            .await
            .unwrap());
        assert!(!store
            .update_status("a", SourceStatus::Indexing, None, &claimable)
            .await
            .unwrap());
        assert!(!store
            .update_status("ghost", SourceStatus::Indexing, None, &claimable)
            .await
            .unwrap());

        assert!(store
            .update_status("a", SourceStatus::Error, Some("boom"), &[SourceStatus::Indexing])
            .await
            .unwrap());
        let saved = store.get_source("a").await.unwrap().unwrap();
        assert_eq!(saved.status, SourceStatus::Error);
        assert_eq!(saved.error_text.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn searches_only_return_ready_sources() {
        let (_dir, store) = temp_store().await;
        seed(&store, "a", "v1", SourceStatus::Ready).await;
        seed(&store, "b", "v2", SourceStatus::Ready).await;
        seed(&store, "c", "v1", SourceStatus::Indexing).await;
        let ids: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let scope = SearchScope {
            source_ids: &ids,
            version: None,
        };

        let keyword = store.keyword_search("router fee", scope, 10).await.unwrap();
        assert_eq!(hit_sources(&keyword), vec!["a", "b"]);

        let vector = store.vector_search(&[1.0, 0.0, 0.0], scope, 10).await.unwrap();
        assert_eq!(hit_sources(&vector), vec!["a", "b"]);
        assert!((vector[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn version_filter_narrows_both_searches() {
        let (_dir, store) = temp_store().await;
        seed(&store, "a", "v1", SourceStatus::Ready).await;
        seed(&store, "b", "v2", SourceStatus::Ready).await;
        let ids: Vec<String> = vec!["a".into(), "b".into()];
        let scope = SearchScope {
            source_ids: &ids,
            version: Some("v2"),
        };

        let keyword = store.keyword_search("swap", scope, 10).await.unwrap();
        assert_eq!(hit_sources(&keyword), vec!["b"]);
        assert_eq!(keyword[0].version.as_deref(), Some("v2"));

        let vector = store.vector_search(&[1.0, 0.0, 0.0], scope, 10).await.unwrap();
        assert_eq!(hit_sources(&vector), vec!["b"]);

        let none = SearchScope {
            source_ids: &ids,
            version: Some("v9"),
        };
        assert!(store.keyword_search("swap", none, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reindex_leaves_no_stale_fulltext_rows() {
        let (_dir, store) = temp_store().await;
        store
            .insert_source(&source("a", "v1", SourceStatus::Ready))
            .await
            .unwrap();
        store
            .insert_chunks("a", &chunks(&["old deposit flow", "deposit caps", "deposit fees"]))
            .await
            .unwrap();
        assert_eq!(fts_rows(&store, "a").await, 3);

        assert_eq!(store.delete_chunks("a").await.unwrap(), 3);
        assert_eq!(fts_rows(&store, "a").await, 0);

        store
            .insert_chunks("a", &chunks(&["withdraw burns shares"]))
            .await
            .unwrap();
        assert_eq!(fts_rows(&store, "a").await, 1);

        let ids = vec!["a".to_string()];
        let scope = SearchScope {
            source_ids: &ids,
            version: None,
        };
        assert!(store.keyword_search("deposit", scope, 10).await.unwrap().is_empty());
        assert_eq!(store.keyword_search("withdraw", scope, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deleting_a_source_drops_its_fulltext_rows() {
        let (_dir, store) = temp_store().await;
        seed(&store, "a", "v1", SourceStatus::Ready).await;
        assert!(store.delete_source("a").await.unwrap());
        assert_eq!(fts_rows(&store, "a").await, 0);
        assert!(store.get_source("a").await.unwrap().is_none());
        assert!(!store.delete_source("a").await.unwrap());
    }

    #[test]
    fn fts_query_quotes_terms() {
        assert_eq!(
            fts_query("ERC-4626 \"deposit\" OR *").as_deref(),
            Some("\"erc\" \"4626\" \"deposit\"")
        );
        assert_eq!(fts_query("the of"), None);
    }
}
