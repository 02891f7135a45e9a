//! Document processing status over the `document_status` table.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Row};

use ragstore_core::{BackendKind, DocumentStatus, ProcessingStatus, Result};

use super::manager::ConnectionManager;
use super::{parse_ts, parse_uuid};
use crate::{BackendTyped, DocStatusStore};

const STATUS_COLUMNS: &str = "doc_id, processing_status, chunk_count, entity_count, \
                              relation_count, error_message, created_at, updated_at";

fn status_from_row(row: &Row<'_>) -> rusqlite::Result<DocumentStatus> {
    let status_raw: String = row.get(1)?;
    Ok(DocumentStatus {
        doc_id: parse_uuid(0, row.get(0)?)?,
        status: ProcessingStatus::from_str(&status_raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
        })?,
        chunk_count: row.get(2)?,
        entity_count: row.get(3)?,
        relation_count: row.get(4)?,
        error_message: row.get(5)?,
        created_at: parse_ts(6, row.get(6)?)?,
        updated_at: parse_ts(7, row.get(7)?)?,
    })
}

fn upsert_one(conn: &rusqlite::Connection, status: &DocumentStatus) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO document_status (doc_id, processing_status, chunk_count, entity_count,
                                      relation_count, error_message, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(doc_id) DO UPDATE SET
            processing_status = excluded.processing_status,
            chunk_count = excluded.chunk_count,
            entity_count = excluded.entity_count,
            relation_count = excluded.relation_count,
            error_message = excluded.error_message,
            updated_at = excluded.updated_at",
        params![
            status.doc_id.to_string(),
            status.status.to_string(),
            status.chunk_count,
            status.entity_count,
            status.relation_count,
            status.error_message,
            status.created_at.to_rfc3339(),
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub struct SqliteDocStatusStore {
    manager: Arc<ConnectionManager>,
}

impl SqliteDocStatusStore {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }
}

impl BackendTyped for SqliteDocStatusStore {
    fn backend_kind(&self) -> BackendKind {
        BackendKind::Embedded
    }
}

#[async_trait]
impl DocStatusStore for SqliteDocStatusStore {
    async fn upsert(&self, status: &DocumentStatus) -> Result<()> {
        let status = status.clone();
        self.manager
            .with_write("doc_status.upsert", move |conn| {
                upsert_one(conn, &status)?;
                Ok(())
            })
            .await
    }

    async fn upsert_batch(&self, statuses: &[DocumentStatus]) -> Result<()> {
        if statuses.is_empty() {
            return Ok(());
        }
        let statuses = statuses.to_vec();
        self.manager
            .with_write("doc_status.upsert_batch", move |conn| {
                let tx = conn.transaction()?;
                for status in &statuses {
                    upsert_one(&tx, status)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
    }

    async fn get(&self, doc_id: uuid::Uuid) -> Result<Option<DocumentStatus>> {
        self.manager
            .with_read("doc_status.get", move |conn| {
                let sql = format!("SELECT {STATUS_COLUMNS} FROM document_status WHERE doc_id = ?1");
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query(params![doc_id.to_string()])?;
                match rows.next()? {
                    Some(row) => Ok(Some(status_from_row(row)?)),
                    None => Ok(None),
                }
            })
            .await
    }

    async fn get_by_status(&self, status: ProcessingStatus) -> Result<Vec<DocumentStatus>> {
        self.manager
            .with_read("doc_status.get_by_status", move |conn| {
                let sql = format!(
                    "SELECT {STATUS_COLUMNS} FROM document_status
                     WHERE processing_status = ?1 ORDER BY created_at"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params![status.to_string()], status_from_row)?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await
    }

    async fn delete(&self, doc_id: uuid::Uuid) -> Result<bool> {
        self.manager
            .with_write("doc_status.delete", move |conn| {
                let deleted = conn.execute(
                    "DELETE FROM document_status WHERE doc_id = ?1",
                    params![doc_id.to_string()],
                )?;
                Ok(deleted > 0)
            })
            .await
    }
}
