//! LLM extraction cache over the server `extraction_cache` table.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use ragstore_core::{ids, BackendKind, CacheEntry, Result, ResultExt};

use super::map_pg;
use crate::{BackendTyped, ExtractionCache};

fn entry_from_row(row: &PgRow) -> Result<CacheEntry> {
    Ok(CacheEntry {
        id: row.try_get("id").op_context("extraction_cache row")?,
        project_id: row.try_get("project_id").op_context("extraction_cache row")?,
        cache_type: row.try_get("cache_type").op_context("extraction_cache row")?,
        chunk_id: row.try_get("chunk_id").op_context("extraction_cache row")?,
        content_hash: row
            .try_get("content_hash")
            .op_context("extraction_cache row")?,
        result: row.try_get("result").op_context("extraction_cache row")?,
        tokens_used: row.try_get("tokens_used").op_context("extraction_cache row")?,
        created_at: row.try_get("created_at").op_context("extraction_cache row")?,
    })
}

pub struct PgExtractionCache {
    pool: PgPool,
    table: String,
}

impl PgExtractionCache {
    pub fn new(pool: PgPool, schema: &str) -> Self {
        Self {
            pool,
            table: format!("{schema}.extraction_cache"),
        }
    }
}

impl BackendTyped for PgExtractionCache {
    fn backend_kind(&self) -> BackendKind {
        BackendKind::Server
    }
}

#[async_trait]
impl ExtractionCache for PgExtractionCache {
    async fn store(
        &self,
        project_id: Uuid,
        cache_type: &str,
        chunk_id: Option<Uuid>,
        content_hash: &str,
        result: &str,
        tokens_used: Option<i64>,
    ) -> Result<CacheEntry> {
        let row = sqlx::query(&format!(
            "INSERT INTO {} (id, project_id, cache_type, chunk_id, content_hash, result,
                             tokens_used, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
             ON CONFLICT (project_id, cache_type, content_hash) DO UPDATE SET
                chunk_id = EXCLUDED.chunk_id,
                result = EXCLUDED.result,
                tokens_used = EXCLUDED.tokens_used
             RETURNING *",
            self.table
        ))
        .bind(ids::new_id())
        .bind(project_id)
        .bind(cache_type)
        .bind(chunk_id)
        .bind(content_hash)
        .bind(result)
        .bind(tokens_used)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_pg("extraction_cache.store", e))?;
        entry_from_row(&row)
    }

    async fn get(
        &self,
        project_id: Uuid,
        cache_type: &str,
        content_hash: &str,
    ) -> Result<Option<CacheEntry>> {
        let row = sqlx::query(&format!(
            "SELECT * FROM {}
             WHERE project_id = $1 AND cache_type = $2 AND content_hash = $3",
            self.table
        ))
        .bind(project_id)
        .bind(cache_type)
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_pg("extraction_cache.get", e))?;
        row.as_ref().map(entry_from_row).transpose()
    }

    async fn get_by_chunk(&self, project_id: Uuid, chunk_id: Uuid) -> Result<Vec<CacheEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT * FROM {}
             WHERE project_id = $1 AND chunk_id = $2 ORDER BY created_at",
            self.table
        ))
        .bind(project_id)
        .bind(chunk_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_pg("extraction_cache.get_by_chunk", e))?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn delete_by_project(&self, project_id: Uuid) -> Result<u64> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE project_id = $1", self.table))
            .bind(project_id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_pg("extraction_cache.delete_by_project", e))?;
        Ok(result.rows_affected())
    }

    async fn detach_chunks(&self, project_id: Uuid, chunk_ids: &[Uuid]) -> Result<u64> {
        if chunk_ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(&format!(
            "UPDATE {} SET chunk_id = NULL WHERE project_id = $1 AND chunk_id = ANY($2)",
            self.table
        ))
        .bind(project_id)
        .bind(chunk_ids)
        .execute(&self.pool)
        .await
        .map_err(|e| map_pg("extraction_cache.detach_chunks", e))?;
        Ok(result.rows_affected())
    }
}
