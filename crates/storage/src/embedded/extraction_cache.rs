//! LLM extraction cache over the `extraction_cache` table.
//!
//! Keyed by `(project_id, cache_type, content_hash)` so a knowledge-base
//! rebuild can replay prior model outputs instead of re-invoking the LLM.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Row};
use uuid::Uuid;

use ragstore_core::{ids, BackendKind, CacheEntry, Result};

use super::manager::ConnectionManager;
use super::{parse_ts, parse_uuid, parse_uuid_opt, placeholders};
use crate::{BackendTyped, ExtractionCache};

const CACHE_COLUMNS: &str =
    "id, project_id, cache_type, chunk_id, content_hash, result, tokens_used, created_at";

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<CacheEntry> {
    Ok(CacheEntry {
        id: parse_uuid(0, row.get(0)?)?,
        project_id: parse_uuid(1, row.get(1)?)?,
        cache_type: row.get(2)?,
        chunk_id: parse_uuid_opt(3, row.get(3)?)?,
        content_hash: row.get(4)?,
        result: row.get(5)?,
        tokens_used: row.get(6)?,
        created_at: parse_ts(7, row.get(7)?)?,
    })
}

pub struct SqliteExtractionCache {
    manager: Arc<ConnectionManager>,
}

impl SqliteExtractionCache {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }
}

impl BackendTyped for SqliteExtractionCache {
    fn backend_kind(&self) -> BackendKind {
        BackendKind::Embedded
    }
}

#[async_trait]
impl ExtractionCache for SqliteExtractionCache {
    async fn store(
        &self,
        project_id: Uuid,
        cache_type: &str,
        chunk_id: Option<Uuid>,
        content_hash: &str,
        result: &str,
        tokens_used: Option<i64>,
    ) -> Result<CacheEntry> {
        let cache_type = cache_type.to_string();
        let content_hash = content_hash.to_string();
        let result = result.to_string();
        self.manager
            .with_write("extraction_cache.store", move |conn| {
                conn.execute(
                    "INSERT INTO extraction_cache
                        (id, project_id, cache_type, chunk_id, content_hash, result,
                         tokens_used, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                     ON CONFLICT(project_id, cache_type, content_hash) DO UPDATE SET
                        chunk_id = excluded.chunk_id,
                        result = excluded.result,
                        tokens_used = excluded.tokens_used",
                    params![
                        ids::new_id().to_string(),
                        project_id.to_string(),
                        cache_type,
                        chunk_id.map(|id| id.to_string()),
                        content_hash,
                        result,
                        tokens_used,
                        Utc::now().to_rfc3339(),
                    ],
                )?;
                let sql = format!(
                    "SELECT {CACHE_COLUMNS} FROM extraction_cache
                     WHERE project_id = ?1 AND cache_type = ?2 AND content_hash = ?3"
                );
                let entry = conn.query_row(
                    &sql,
                    params![project_id.to_string(), cache_type, content_hash],
                    entry_from_row,
                )?;
                Ok(entry)
            })
            .await
    }

    async fn get(
        &self,
        project_id: Uuid,
        cache_type: &str,
        content_hash: &str,
    ) -> Result<Option<CacheEntry>> {
        let cache_type = cache_type.to_string();
        let content_hash = content_hash.to_string();
        self.manager
            .with_read("extraction_cache.get", move |conn| {
                let sql = format!(
                    "SELECT {CACHE_COLUMNS} FROM extraction_cache
                     WHERE project_id = ?1 AND cache_type = ?2 AND content_hash = ?3"
                );
                let mut stmt = conn.prepare(&sql)?;
                let mut rows =
                    stmt.query(params![project_id.to_string(), cache_type, content_hash])?;
                match rows.next()? {
                    Some(row) => Ok(Some(entry_from_row(row)?)),
                    None => Ok(None),
                }
            })
            .await
    }

    async fn get_by_chunk(&self, project_id: Uuid, chunk_id: Uuid) -> Result<Vec<CacheEntry>> {
        self.manager
            .with_read("extraction_cache.get_by_chunk", move |conn| {
                let sql = format!(
                    "SELECT {CACHE_COLUMNS} FROM extraction_cache
                     WHERE project_id = ?1 AND chunk_id = ?2 ORDER BY created_at"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(
                    params![project_id.to_string(), chunk_id.to_string()],
                    entry_from_row,
                )?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await
    }

    async fn delete_by_project(&self, project_id: Uuid) -> Result<u64> {
        self.manager
            .with_write("extraction_cache.delete_by_project", move |conn| {
                let deleted = conn.execute(
                    "DELETE FROM extraction_cache WHERE project_id = ?1",
                    params![project_id.to_string()],
                )?;
                Ok(deleted as u64)
            })
            .await
    }

    async fn detach_chunks(&self, project_id: Uuid, chunk_ids: &[Uuid]) -> Result<u64> {
        if chunk_ids.is_empty() {
            return Ok(0);
        }
        let chunk_ids: Vec<String> = chunk_ids.iter().map(Uuid::to_string).collect();
        self.manager
            .with_write("extraction_cache.detach_chunks", move |conn| {
                let sql = format!(
                    "UPDATE extraction_cache SET chunk_id = NULL
                     WHERE project_id = ? AND chunk_id IN ({})",
                    placeholders(chunk_ids.len())
                );
                let mut values: Vec<&dyn rusqlite::ToSql> = Vec::with_capacity(chunk_ids.len() + 1);
                let project = project_id.to_string();
                values.push(&project);
                for id in &chunk_ids {
                    values.push(id);
                }
                let updated = conn.execute(&sql, values.as_slice())?;
                Ok(updated as u64)
            })
            .await
    }
}
