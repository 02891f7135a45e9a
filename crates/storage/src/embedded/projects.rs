//! Project and document lifecycle, including the cascades that keep the four
//! data planes coherent when a tenant or source artifact disappears.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, Row};
use tracing::debug;
use uuid::Uuid;

use ragstore_core::{
    ids, BackendKind, Document, DocumentType, Error, ProcessingStatus, Project, Result,
};

use super::manager::{ConnectionManager, OpResult};
use super::{parse_chunk_ids, parse_ts, parse_uuid, placeholders};
use crate::{BackendTyped, ProjectStore};

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: parse_uuid(0, row.get(0)?)?,
        name: row.get(1)?,
        created_at: parse_ts(2, row.get(2)?)?,
        updated_at: parse_ts(3, row.get(3)?)?,
    })
}

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<Document> {
    let doc_type: String = row.get(2)?;
    let status: String = row.get(3)?;
    Ok(Document {
        id: parse_uuid(0, row.get(0)?)?,
        project_id: parse_uuid(1, row.get(1)?)?,
        doc_type: DocumentType::from_str(&doc_type).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?,
        status: ProcessingStatus::from_str(&status).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?,
        created_at: parse_ts(4, row.get(4)?)?,
        updated_at: parse_ts(5, row.get(5)?)?,
    })
}

/// Recompute source-chunk sets after chunks disappear: survivors keep the
/// remainder, rows whose set empties are deleted.
fn recompute_source_chunks(
    tx: &Connection,
    table: &str,
    project: &str,
    deleted_chunks: &HashSet<Uuid>,
) -> rusqlite::Result<()> {
    let mut stmt = tx.prepare(&format!(
        "SELECT id, source_chunk_ids FROM {table} WHERE project_id = ?1"
    ))?;
    let rows = stmt.query_map(params![project], |row| {
        Ok((row.get::<_, String>(0)?, parse_chunk_ids(1, row.get(1)?)?))
    })?;

    let mut updates = Vec::new();
    let mut removals = Vec::new();
    for row in rows {
        let (id, chunks) = row?;
        if !chunks.iter().any(|c| deleted_chunks.contains(c)) {
            continue;
        }
        let remaining: Vec<Uuid> = chunks
            .into_iter()
            .filter(|c| !deleted_chunks.contains(c))
            .collect();
        if remaining.is_empty() {
            removals.push(id);
        } else {
            updates.push((id, remaining));
        }
    }
    drop(stmt);

    let now = Utc::now().to_rfc3339();
    for (id, remaining) in updates {
        tx.execute(
            &format!(
                "UPDATE {table} SET source_chunk_ids = ?1, updated_at = ?2 WHERE id = ?3"
            ),
            params![super::chunk_ids_json(&remaining), now, id],
        )?;
    }
    if !removals.is_empty() {
        let sql = format!(
            "DELETE FROM {table} WHERE id IN ({})",
            placeholders(removals.len())
        );
        tx.execute(&sql, rusqlite::params_from_iter(removals.iter()))?;
    }
    Ok(())
}

pub struct SqliteProjectStore {
    manager: Arc<ConnectionManager>,
    vector_table: String,
}

impl SqliteProjectStore {
    pub fn new(manager: Arc<ConnectionManager>, vector_table: String) -> Self {
        Self {
            manager,
            vector_table,
        }
    }
}

impl BackendTyped for SqliteProjectStore {
    fn backend_kind(&self) -> BackendKind {
        BackendKind::Embedded
    }
}

#[async_trait]
impl ProjectStore for SqliteProjectStore {
    async fn create_project(&self, name: &str) -> Result<Project> {
        let project = Project {
            id: ids::new_id(),
            name: name.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let row = project.clone();
        self.manager
            .with_write("projects.create_project", move |conn| {
                conn.execute(
                    "INSERT INTO projects (id, name, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        row.id.to_string(),
                        row.name,
                        row.created_at.to_rfc3339(),
                        row.updated_at.to_rfc3339(),
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(project)
    }

    async fn get_project(&self, id: Uuid) -> Result<Option<Project>> {
        self.manager
            .with_read("projects.get_project", move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, created_at, updated_at FROM projects WHERE id = ?1",
                )?;
                let mut rows = stmt.query(params![id.to_string()])?;
                match rows.next()? {
                    Some(row) => Ok(Some(project_from_row(row)?)),
                    None => Ok(None),
                }
            })
            .await
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        self.manager
            .with_read("projects.list_projects", |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, created_at, updated_at FROM projects ORDER BY created_at",
                )?;
                let rows = stmt.query_map([], project_from_row)?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await
    }

    async fn delete_project(&self, id: Uuid) -> Result<()> {
        let vector_table = self.vector_table.clone();
        self.manager
            .with_write("projects.delete_project", move |conn| {
                let project = id.to_string();
                let exists: bool = conn
                    .prepare("SELECT 1 FROM projects WHERE id = ?1")?
                    .exists(params![project])?;
                if !exists {
                    return Err(Error::ProjectNotFound(id).into());
                }

                let tx = conn.transaction()?;
                tx.execute(
                    "DELETE FROM document_status WHERE doc_id IN
                        (SELECT id FROM documents WHERE project_id = ?1)",
                    params![project],
                )?;
                tx.execute(
                    "DELETE FROM graph_relations WHERE project_id = ?1",
                    params![project],
                )?;
                tx.execute(
                    "DELETE FROM graph_entities WHERE project_id = ?1",
                    params![project],
                )?;
                tx.execute(
                    &format!("DELETE FROM {vector_table} WHERE project_id = ?1"),
                    params![project],
                )?;
                tx.execute(
                    "DELETE FROM extraction_cache WHERE project_id = ?1",
                    params![project],
                )?;
                tx.execute("DELETE FROM documents WHERE project_id = ?1", params![project])?;
                tx.execute("DELETE FROM projects WHERE id = ?1", params![project])?;
                tx.commit()?;
                debug!(%id, "deleted project and all owned rows");
                Ok(())
            })
            .await
    }

    async fn create_document(&self, project_id: Uuid, doc_type: DocumentType) -> Result<Document> {
        let document = Document {
            id: ids::new_id(),
            project_id,
            doc_type,
            status: ProcessingStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let row = document.clone();
        self.manager
            .with_write("projects.create_document", move |conn| {
                let exists: bool = conn
                    .prepare("SELECT 1 FROM projects WHERE id = ?1")?
                    .exists(params![project_id.to_string()])?;
                if !exists {
                    return Err(Error::ProjectNotFound(project_id).into());
                }
                conn.execute(
                    "INSERT INTO documents (id, project_id, doc_type, status, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        row.id.to_string(),
                        row.project_id.to_string(),
                        row.doc_type.to_string(),
                        row.status.to_string(),
                        row.created_at.to_rfc3339(),
                        row.updated_at.to_rfc3339(),
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(document)
    }

    async fn get_document(&self, id: Uuid) -> Result<Option<Document>> {
        self.manager
            .with_read("projects.get_document", move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, project_id, doc_type, status, created_at, updated_at
                     FROM documents WHERE id = ?1",
                )?;
                let mut rows = stmt.query(params![id.to_string()])?;
                match rows.next()? {
                    Some(row) => Ok(Some(document_from_row(row)?)),
                    None => Ok(None),
                }
            })
            .await
    }

    async fn delete_document(&self, project_id: Uuid, document_id: Uuid) -> Result<()> {
        let vector_table = self.vector_table.clone();
        self.manager
            .with_write("projects.delete_document", move |conn| -> OpResult<()> {
                let project = project_id.to_string();
                let document = document_id.to_string();
                let tx = conn.transaction()?;

                // Chunks owned by this document; these ids drive the
                // source-chunk recompute below.
                let deleted_chunks: HashSet<Uuid> = {
                    let mut stmt = tx.prepare(&format!(
                        "SELECT id FROM {vector_table}
                         WHERE project_id = ?1 AND document_id = ?2 AND type = 'chunk'"
                    ))?;
                    let rows = stmt.query_map(params![project, document], |row| {
                        parse_uuid(0, row.get(0)?)
                    })?;
                    let mut out = HashSet::new();
                    for row in rows {
                        out.insert(row?);
                    }
                    out
                };

                tx.execute(
                    &format!(
                        "DELETE FROM {vector_table} WHERE project_id = ?1 AND document_id = ?2"
                    ),
                    params![project, document],
                )?;
                tx.execute(
                    "DELETE FROM graph_relations WHERE project_id = ?1 AND document_id = ?2",
                    params![project, document],
                )?;
                tx.execute(
                    "DELETE FROM graph_entities WHERE project_id = ?1 AND document_id = ?2",
                    params![project, document],
                )?;

                if !deleted_chunks.is_empty() {
                    recompute_source_chunks(&tx, "graph_relations", &project, &deleted_chunks)?;
                    recompute_source_chunks(&tx, "graph_entities", &project, &deleted_chunks)?;

                    let chunk_strings: Vec<String> =
                        deleted_chunks.iter().map(Uuid::to_string).collect();
                    let sql = format!(
                        "UPDATE extraction_cache SET chunk_id = NULL
                         WHERE project_id = ? AND chunk_id IN ({})",
                        placeholders(chunk_strings.len())
                    );
                    let mut values: Vec<&dyn rusqlite::ToSql> = vec![&project];
                    for chunk in &chunk_strings {
                        values.push(chunk);
                    }
                    tx.execute(&sql, values.as_slice())?;
                }

                tx.execute("DELETE FROM document_status WHERE doc_id = ?1", params![document])?;
                tx.execute(
                    "DELETE FROM documents WHERE id = ?1 AND project_id = ?2",
                    params![document, project],
                )?;
                tx.commit()?;
                debug!(%project_id, %document_id, "deleted document with cascade");
                Ok(())
            })
            .await
    }
}
