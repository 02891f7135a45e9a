//! Vector store over the native `vector(D)` column type.
//!
//! Vectors bind as literal strings cast to `vector` inside SQL; similarity
//! is `1 - (embedding <=> query)` with the cosine operator so the HNSW or
//! IVFFLAT index drives the scan. Statement execution goes through the
//! transient-fault retry wrapper.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::warn;
use uuid::Uuid;

use ragstore_core::embedding::check_dimension;
use ragstore_core::normalize::normalize_name;
use ragstore_core::{
    BackendKind, Error, Result, ResultExt, ScoredVector, VectorConfig, VectorEntry,
    VectorEntryType, VectorFilter,
};

use super::{map_pg, parse_vector_literal, vector_literal};
use crate::retry::{with_retry, RetryPolicy};
use crate::{BackendTyped, VectorStore};

fn entry_from_row(row: &PgRow) -> Result<VectorEntry> {
    let type_raw: String = row.try_get("type").op_context("vector row")?;
    let literal: String = row.try_get("embedding_text").op_context("vector row")?;
    Ok(VectorEntry {
        id: row.try_get("id").op_context("vector row")?,
        project_id: row.try_get("project_id").op_context("vector row")?,
        entry_type: VectorEntryType::from_str(&type_raw)?,
        content: row.try_get("content").op_context("vector row")?,
        vector: parse_vector_literal(&literal)?,
        document_id: row.try_get("document_id").op_context("vector row")?,
        chunk_index: row.try_get("chunk_index").op_context("vector row")?,
        created_at: row.try_get("created_at").op_context("vector row")?,
    })
}

const SELECT_COLS: &str = "id, project_id, type, content, \
                           embedding::text AS embedding_text, document_id, chunk_index, \
                           created_at";

pub struct PgVectorStore {
    pool: PgPool,
    config: VectorConfig,
    table: String,
    retry: RetryPolicy,
}

impl PgVectorStore {
    pub fn new(pool: PgPool, schema: &str, config: VectorConfig) -> Self {
        let table = format!("{schema}.{}", config.table_name);
        Self {
            pool,
            config,
            table,
            retry: RetryPolicy::default(),
        }
    }

    fn select_columns(&self) -> String {
        format!("{SELECT_COLS} FROM {}", self.table)
    }

    async fn upsert_one(&self, entry: &VectorEntry) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO {} (id, project_id, type, content, embedding, document_id,
                             chunk_index, created_at)
             VALUES ($1, $2, $3, $4, $5::vector, $6, $7, $8)
             ON CONFLICT (id) DO UPDATE SET
                project_id = EXCLUDED.project_id,
                type = EXCLUDED.type,
                content = EXCLUDED.content,
                embedding = EXCLUDED.embedding,
                document_id = EXCLUDED.document_id,
                chunk_index = EXCLUDED.chunk_index",
            self.table
        ))
        .bind(entry.id)
        .bind(entry.project_id)
        .bind(entry.entry_type.to_string())
        .bind(&entry.content)
        .bind(vector_literal(&entry.vector))
        .bind(entry.document_id)
        .bind(entry.chunk_index)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_pg("vector.upsert", e))?;
        Ok(())
    }
}

impl BackendTyped for PgVectorStore {
    fn backend_kind(&self) -> BackendKind {
        BackendKind::Server
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn upsert(&self, entry: VectorEntry) -> Result<()> {
        check_dimension(&entry.vector, self.config.dimension)?;
        let result = with_retry(&self.retry, "vector.upsert", || self.upsert_one(&entry)).await;
        match result {
            Err(Error::DuplicateKey(detail)) => {
                warn!(detail, "duplicate key on vector upsert, ignored");
                Ok(())
            }
            other => other,
        }
    }

    async fn upsert_batch(&self, entries: Vec<VectorEntry>) -> Result<()> {
        for entry in &entries {
            check_dimension(&entry.vector, self.config.dimension)?;
        }
        let sql = format!(
            "INSERT INTO {} (id, project_id, type, content, embedding, document_id,
                             chunk_index, created_at)
             VALUES ($1, $2, $3, $4, $5::vector, $6, $7, $8)
             ON CONFLICT (id) DO UPDATE SET
                project_id = EXCLUDED.project_id,
                type = EXCLUDED.type,
                content = EXCLUDED.content,
                embedding = EXCLUDED.embedding,
                document_id = EXCLUDED.document_id,
                chunk_index = EXCLUDED.chunk_index",
            self.table
        );
        // One transaction per chunk: a failure part-way leaves every chunk
        // before it durable.
        for chunk in entries.chunks(self.config.upsert_batch_size.max(1)) {
            with_retry(&self.retry, "vector.upsert_batch", || async {
                let mut tx = self
                    .pool
                    .begin()
                    .await
                    .map_err(|e| map_pg("vector.upsert_batch", e))?;
                for entry in chunk {
                    sqlx::query(&sql)
                        .bind(entry.id)
                        .bind(entry.project_id)
                        .bind(entry.entry_type.to_string())
                        .bind(&entry.content)
                        .bind(vector_literal(&entry.vector))
                        .bind(entry.document_id)
                        .bind(entry.chunk_index)
                        .bind(entry.created_at)
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| map_pg("vector.upsert_batch", e))?;
                }
                tx.commit()
                    .await
                    .map_err(|e| map_pg("vector.upsert_batch", e))
            })
            .await?;
        }
        Ok(())
    }

    async fn query(
        &self,
        query: &[f32],
        top_k: usize,
        filter: Option<VectorFilter>,
    ) -> Result<Vec<ScoredVector>> {
        check_dimension(query, self.config.dimension)?;
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let literal = vector_literal(query);

        let mut sql = format!(
            "SELECT {SELECT_COLS}, 1 - (embedding <=> $1::vector) AS score FROM {}",
            self.table
        );
        let mut conditions = Vec::new();
        if let Some(filter) = &filter {
            conditions.push("project_id = $3".to_string());
            if filter.entry_type.is_some() {
                conditions.push("type = $4".to_string());
            }
            if filter.ids.is_some() {
                conditions.push(format!(
                    "id = ANY(${})",
                    if filter.entry_type.is_some() { 5 } else { 4 }
                ));
            }
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY embedding <=> $1::vector, id LIMIT $2");

        let rows = with_retry(&self.retry, "vector.query", || async {
            // a query object is consumed on execution; rebuild per attempt
            let mut q = sqlx::query(&sql).bind(&literal).bind(top_k as i64);
            if let Some(filter) = &filter {
                q = q.bind(filter.project_id);
                if let Some(entry_type) = filter.entry_type {
                    q = q.bind(entry_type.to_string());
                }
                if let Some(ids) = &filter.ids {
                    q = q.bind(ids);
                }
            }
            q.fetch_all(&self.pool)
                .await
                .map_err(|e| map_pg("vector.query", e))
        })
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let score: f64 = row.try_get("score").op_context("vector row")?;
            out.push(ScoredVector {
                entry: entry_from_row(row)?,
                score: score as f32,
            });
        }
        Ok(out)
    }

    async fn get(&self, id: Uuid) -> Result<Option<VectorEntry>> {
        let sql = format!("SELECT {} WHERE id = $1", self.select_columns());
        let row = with_retry(&self.retry, "vector.get", || async {
            sqlx::query(&sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_pg("vector.get", e))
        })
        .await?;
        row.as_ref().map(entry_from_row).transpose()
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE id = $1", self.table);
        let result = with_retry(&self.retry, "vector.delete", || async {
            sqlx::query(&sql)
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| map_pg("vector.delete", e))
        })
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_batch(&self, ids: &[Uuid]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!("DELETE FROM {} WHERE id = ANY($1)", self.table);
        let result = with_retry(&self.retry, "vector.delete_batch", || async {
            sqlx::query(&sql)
                .bind(ids)
                .execute(&self.pool)
                .await
                .map_err(|e| map_pg("vector.delete_batch", e))
        })
        .await?;
        Ok(result.rows_affected())
    }

    async fn len(&self) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.table);
        let (count,): (i64,) = with_retry(&self.retry, "vector.len", || async {
            sqlx::query_as(&sql)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| map_pg("vector.len", e))
        })
        .await?;
        Ok(count as u64)
    }

    async fn clear(&self) -> Result<()> {
        let sql = format!("DELETE FROM {}", self.table);
        with_retry(&self.retry, "vector.clear", || async {
            sqlx::query(&sql)
                .execute(&self.pool)
                .await
                .map_err(|e| map_pg("vector.clear", e))
        })
        .await?;
        Ok(())
    }

    async fn delete_entity_embeddings(&self, project_id: Uuid, names: &[String]) -> Result<u64> {
        if names.is_empty() {
            return Ok(0);
        }
        let names: Vec<String> = names.iter().map(|n| normalize_name(n)).collect();
        let sql = format!(
            "DELETE FROM {} WHERE project_id = $1 AND type = 'entity' AND content = ANY($2)",
            self.table
        );
        let result = with_retry(&self.retry, "vector.delete_entity_embeddings", || async {
            sqlx::query(&sql)
                .bind(project_id)
                .bind(&names)
                .execute(&self.pool)
                .await
                .map_err(|e| map_pg("vector.delete_entity_embeddings", e))
        })
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_chunk_embeddings(&self, project_id: Uuid, chunk_ids: &[Uuid]) -> Result<u64> {
        if chunk_ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "DELETE FROM {} WHERE project_id = $1 AND type = 'chunk' AND id = ANY($2)",
            self.table
        );
        let result = with_retry(&self.retry, "vector.delete_chunk_embeddings", || async {
            sqlx::query(&sql)
                .bind(project_id)
                .bind(chunk_ids)
                .execute(&self.pool)
                .await
                .map_err(|e| map_pg("vector.delete_chunk_embeddings", e))
        })
        .await?;
        Ok(result.rows_affected())
    }

    async fn get_chunk_ids_by_document(
        &self,
        project_id: Uuid,
        document_id: Uuid,
    ) -> Result<Vec<Uuid>> {
        let sql = format!(
            "SELECT id FROM {}
             WHERE project_id = $1 AND document_id = $2 AND type = 'chunk'
             ORDER BY chunk_index",
            self.table
        );
        let rows: Vec<(Uuid,)> = with_retry(&self.retry, "vector.get_chunk_ids_by_document", || async {
            sqlx::query_as(&sql)
                .bind(project_id)
                .bind(document_id)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| map_pg("vector.get_chunk_ids_by_document", e))
        })
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn has_vectors(&self, document_id: Uuid) -> Result<bool> {
        let sql = format!("SELECT 1 FROM {} WHERE document_id = $1 LIMIT 1", self.table);
        let row: Option<(i32,)> = with_retry(&self.retry, "vector.has_vectors", || async {
            sqlx::query_as(&sql)
                .bind(document_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_pg("vector.has_vectors", e))
        })
        .await?;
        Ok(row.is_some())
    }
}
