//! Document processing status over the server `document_status` table.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use ragstore_core::{BackendKind, DocumentStatus, ProcessingStatus, Result, ResultExt};

use super::map_pg;
use crate::{BackendTyped, DocStatusStore};

fn status_from_row(row: &PgRow) -> Result<DocumentStatus> {
    let status_raw: String = row
        .try_get("processing_status")
        .op_context("document_status row")?;
    Ok(DocumentStatus {
        doc_id: row.try_get("doc_id").op_context("document_status row")?,
        status: ProcessingStatus::from_str(&status_raw)?,
        chunk_count: row.try_get("chunk_count").op_context("document_status row")?,
        entity_count: row
            .try_get("entity_count")
            .op_context("document_status row")?,
        relation_count: row
            .try_get("relation_count")
            .op_context("document_status row")?,
        error_message: row
            .try_get("error_message")
            .op_context("document_status row")?,
        created_at: row.try_get("created_at").op_context("document_status row")?,
        updated_at: row.try_get("updated_at").op_context("document_status row")?,
    })
}

pub struct PgDocStatusStore {
    pool: PgPool,
    table: String,
}

impl PgDocStatusStore {
    pub fn new(pool: PgPool, schema: &str) -> Self {
        Self {
            pool,
            table: format!("{schema}.document_status"),
        }
    }

    fn upsert_sql(&self) -> String {
        format!(
            "INSERT INTO {} (doc_id, processing_status, chunk_count, entity_count,
                             relation_count, error_message, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
             ON CONFLICT (doc_id) DO UPDATE SET
                processing_status = EXCLUDED.processing_status,
                chunk_count = EXCLUDED.chunk_count,
                entity_count = EXCLUDED.entity_count,
                relation_count = EXCLUDED.relation_count,
                error_message = EXCLUDED.error_message,
                updated_at = NOW()",
            self.table
        )
    }
}

impl BackendTyped for PgDocStatusStore {
    fn backend_kind(&self) -> BackendKind {
        BackendKind::Server
    }
}

#[async_trait]
impl DocStatusStore for PgDocStatusStore {
    async fn upsert(&self, status: &DocumentStatus) -> Result<()> {
        sqlx::query(&self.upsert_sql())
            .bind(status.doc_id)
            .bind(status.status.to_string())
            .bind(status.chunk_count)
            .bind(status.entity_count)
            .bind(status.relation_count)
            .bind(&status.error_message)
            .bind(status.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_pg("doc_status.upsert", e))?;
        Ok(())
    }

    async fn upsert_batch(&self, statuses: &[DocumentStatus]) -> Result<()> {
        if statuses.is_empty() {
            return Ok(());
        }
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_pg("doc_status.upsert_batch", e))?;
        let sql = self.upsert_sql();
        for status in statuses {
            sqlx::query(&sql)
                .bind(status.doc_id)
                .bind(status.status.to_string())
                .bind(status.chunk_count)
                .bind(status.entity_count)
                .bind(status.relation_count)
                .bind(&status.error_message)
                .bind(status.created_at)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_pg("doc_status.upsert_batch", e))?;
        }
        tx.commit()
            .await
            .map_err(|e| map_pg("doc_status.upsert_batch", e))?;
        Ok(())
    }

    async fn get(&self, doc_id: Uuid) -> Result<Option<DocumentStatus>> {
        let row = sqlx::query(&format!("SELECT * FROM {} WHERE doc_id = $1", self.table))
            .bind(doc_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_pg("doc_status.get", e))?;
        row.as_ref().map(status_from_row).transpose()
    }

    async fn get_by_status(&self, status: ProcessingStatus) -> Result<Vec<DocumentStatus>> {
        let rows = sqlx::query(&format!(
            "SELECT * FROM {} WHERE processing_status = $1 ORDER BY created_at",
            self.table
        ))
        .bind(status.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_pg("doc_status.get_by_status", e))?;
        rows.iter().map(status_from_row).collect()
    }

    async fn delete(&self, doc_id: Uuid) -> Result<bool> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE doc_id = $1", self.table))
            .bind(doc_id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_pg("doc_status.delete", e))?;
        Ok(result.rows_affected() > 0)
    }
}
