//! Project and document lifecycle on the server backend.
//!
//! Row removal leans on the `ON DELETE CASCADE` foreign keys from project
//! and document; the source-chunk recompute and the weak cache reference are
//! application logic on both backends.

use std::collections::HashSet;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use ragstore_core::{
    ids, BackendKind, Document, DocumentType, Error, ProcessingStatus, Project, Result, ResultExt,
};

use super::map_pg;
use crate::{BackendTyped, ProjectStore};

fn project_from_row(row: &PgRow) -> Result<Project> {
    Ok(Project {
        id: row.try_get("id").op_context("projects row")?,
        name: row.try_get("name").op_context("projects row")?,
        created_at: row.try_get("created_at").op_context("projects row")?,
        updated_at: row.try_get("updated_at").op_context("projects row")?,
    })
}

fn document_from_row(row: &PgRow) -> Result<Document> {
    let doc_type: String = row.try_get("doc_type").op_context("documents row")?;
    let status: String = row.try_get("status").op_context("documents row")?;
    Ok(Document {
        id: row.try_get("id").op_context("documents row")?,
        project_id: row.try_get("project_id").op_context("documents row")?,
        doc_type: DocumentType::from_str(&doc_type)?,
        status: ProcessingStatus::from_str(&status)?,
        created_at: row.try_get("created_at").op_context("documents row")?,
        updated_at: row.try_get("updated_at").op_context("documents row")?,
    })
}

pub struct PgProjectStore {
    pool: PgPool,
    schema: String,
    vector_table: String,
}

impl PgProjectStore {
    pub fn new(pool: PgPool, schema: &str, vector_table: &str) -> Self {
        Self {
            pool,
            schema: schema.to_string(),
            vector_table: format!("{schema}.{vector_table}"),
        }
    }

    fn t(&self, table: &str) -> String {
        format!("{}.{table}", self.schema)
    }
}

impl BackendTyped for PgProjectStore {
    fn backend_kind(&self) -> BackendKind {
        BackendKind::Server
    }
}

#[async_trait]
impl ProjectStore for PgProjectStore {
    async fn create_project(&self, name: &str) -> Result<Project> {
        let row = sqlx::query(&format!(
            "INSERT INTO {} (id, name, created_at, updated_at)
             VALUES ($1, $2, NOW(), NOW()) RETURNING *",
            self.t("projects")
        ))
        .bind(ids::new_id())
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_pg("projects.create_project", e))?;
        project_from_row(&row)
    }

    async fn get_project(&self, id: Uuid) -> Result<Option<Project>> {
        let row = sqlx::query(&format!(
            "SELECT * FROM {} WHERE id = $1",
            self.t("projects")
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_pg("projects.get_project", e))?;
        row.as_ref().map(project_from_row).transpose()
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        let rows = sqlx::query(&format!(
            "SELECT * FROM {} ORDER BY created_at",
            self.t("projects")
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_pg("projects.list_projects", e))?;
        rows.iter().map(project_from_row).collect()
    }

    async fn delete_project(&self, id: Uuid) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_pg("projects.delete_project", e))?;
        // document_status carries no project foreign key; clear it by hand
        // before the cascade removes the documents.
        sqlx::query(&format!(
            "DELETE FROM {} WHERE doc_id IN (SELECT id FROM {} WHERE project_id = $1)",
            self.t("document_status"),
            self.t("documents")
        ))
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_pg("projects.delete_project", e))?;

        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = $1", self.t("projects")))
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_pg("projects.delete_project", e))?;
        if result.rows_affected() == 0 {
            return Err(Error::ProjectNotFound(id));
        }
        tx.commit()
            .await
            .map_err(|e| map_pg("projects.delete_project", e))?;
        debug!(%id, "deleted project; owned rows cascaded");
        Ok(())
    }

    async fn create_document(&self, project_id: Uuid, doc_type: DocumentType) -> Result<Document> {
        let row = sqlx::query(&format!(
            "INSERT INTO {} (id, project_id, doc_type, status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, NOW(), NOW()) RETURNING *",
            self.t("documents")
        ))
        .bind(ids::new_id())
        .bind(project_id)
        .bind(doc_type.to_string())
        .bind(ProcessingStatus::Pending.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23503") => {
                Error::ProjectNotFound(project_id)
            }
            _ => map_pg("projects.create_document", e),
        })?;
        document_from_row(&row)
    }

    async fn get_document(&self, id: Uuid) -> Result<Option<Document>> {
        let row = sqlx::query(&format!(
            "SELECT * FROM {} WHERE id = $1",
            self.t("documents")
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_pg("projects.get_document", e))?;
        row.as_ref().map(document_from_row).transpose()
    }

    async fn delete_document(&self, project_id: Uuid, document_id: Uuid) -> Result<()> {
        let chunk_rows: Vec<(Uuid,)> = sqlx::query_as(&format!(
            "SELECT id FROM {} WHERE project_id = $1 AND document_id = $2 AND type = 'chunk'",
            self.vector_table
        ))
        .bind(project_id)
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_pg("projects.delete_document", e))?;
        let deleted_chunks: HashSet<Uuid> = chunk_rows.into_iter().map(|(id,)| id).collect();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_pg("projects.delete_document", e))?;

        // Cascades vectors and graph rows whose document_id matches.
        sqlx::query(&format!(
            "DELETE FROM {} WHERE id = $1 AND project_id = $2",
            self.t("documents")
        ))
        .bind(document_id)
        .bind(project_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_pg("projects.delete_document", e))?;

        sqlx::query(&format!(
            "DELETE FROM {} WHERE doc_id = $1",
            self.t("document_status")
        ))
        .bind(document_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_pg("projects.delete_document", e))?;

        if !deleted_chunks.is_empty() {
            for table in ["graph_relations", "graph_entities"] {
                let table = self.t(table);
                let rows = sqlx::query(&format!(
                    "SELECT id, source_chunk_ids FROM {table} WHERE project_id = $1"
                ))
                .bind(project_id)
                .fetch_all(&mut *tx)
                .await
                .map_err(|e| map_pg("projects.delete_document", e))?;

                for row in rows {
                    let id: Uuid = row.try_get("id").op_context("recompute row")?;
                    let raw: serde_json::Value = row
                        .try_get("source_chunk_ids")
                        .op_context("recompute row")?;
                    let chunks: Vec<String> = serde_json::from_value(raw)
                        .map_err(|e| Error::serialization(format!("source_chunk_ids: {e}")))?;
                    let parsed: Vec<Uuid> = chunks
                        .iter()
                        .filter_map(|s| Uuid::parse_str(s).ok())
                        .collect();
                    if !parsed.iter().any(|c| deleted_chunks.contains(c)) {
                        continue;
                    }
                    let remaining: Vec<String> = parsed
                        .iter()
                        .filter(|c| !deleted_chunks.contains(c))
                        .map(Uuid::to_string)
                        .collect();
                    if remaining.is_empty() {
                        sqlx::query(&format!("DELETE FROM {table} WHERE id = $1"))
                            .bind(id)
                            .execute(&mut *tx)
                            .await
                            .map_err(|e| map_pg("projects.delete_document", e))?;
                    } else {
                        sqlx::query(&format!(
                            "UPDATE {table} SET source_chunk_ids = $1, updated_at = NOW()
                             WHERE id = $2"
                        ))
                        .bind(serde_json::json!(remaining))
                        .bind(id)
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| map_pg("projects.delete_document", e))?;
                    }
                }
            }

            let chunk_vec: Vec<Uuid> = deleted_chunks.iter().copied().collect();
            sqlx::query(&format!(
                "UPDATE {} SET chunk_id = NULL WHERE project_id = $1 AND chunk_id = ANY($2)",
                self.t("extraction_cache")
            ))
            .bind(project_id)
            .bind(&chunk_vec)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_pg("projects.delete_document", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_pg("projects.delete_document", e))?;
        debug!(%project_id, %document_id, "deleted document with cascade");
        Ok(())
    }
}
