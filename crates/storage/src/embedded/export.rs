//! Project export/import: one tenant's rows serialized to a standalone
//! single-file snapshot and back.
//!
//! The artifact is the embedded schema at the current migration version,
//! holding only the exported project's rows. Export preserves ids; import
//! rewrites `project_id` and regenerates every primary id. The shared
//! `kv_store` and `document_status` tables are deliberately not part of the
//! artifact.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};
use tracing::info;
use uuid::Uuid;

use ragstore_core::{ids, Error, Result};

use super::manager::{ConnectionManager, OpResult};
use super::migrations;
use crate::ProjectExporter;

/// (select WHERE project scope, insert, column count) per table, in
/// dependency order so foreign keys resolve front to back.
struct TableCopy {
    select: String,
    insert: String,
    columns: usize,
}

fn table_plan(vector_table: &str, exporting: bool) -> Vec<TableCopy> {
    // Reads come from the live (configured) vector table on export and from
    // the artifact's canonical `vectors` table on import.
    let (vector_read, vector_write) = if exporting {
        (vector_table, "vectors")
    } else {
        ("vectors", vector_table)
    };
    vec![
        TableCopy {
            select: "SELECT id, name, created_at, updated_at FROM projects WHERE id = ?1".into(),
            insert: "INSERT INTO projects (id, name, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4)"
                .into(),
            columns: 4,
        },
        TableCopy {
            select: "SELECT id, project_id, doc_type, status, created_at, updated_at
                     FROM documents WHERE project_id = ?1"
                .into(),
            insert: "INSERT INTO documents (id, project_id, doc_type, status, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
                .into(),
            columns: 6,
        },
        TableCopy {
            select: "SELECT id, project_id, name, entity_type, description, document_id,
                            source_chunk_ids, created_at, updated_at
                     FROM graph_entities WHERE project_id = ?1"
                .into(),
            insert: "INSERT INTO graph_entities
                        (id, project_id, name, entity_type, description, document_id,
                         source_chunk_ids, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
                .into(),
            columns: 9,
        },
        TableCopy {
            select: "SELECT id, project_id, source_entity, target_entity, relation_type,
                            description, keywords, weight, document_id, source_chunk_ids,
                            created_at, updated_at
                     FROM graph_relations WHERE project_id = ?1"
                .into(),
            insert: "INSERT INTO graph_relations
                        (id, project_id, source_entity, target_entity, relation_type,
                         description, keywords, weight, document_id, source_chunk_ids,
                         created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
                .into(),
            columns: 12,
        },
        TableCopy {
            select: format!(
                "SELECT id, project_id, type, content, vector, document_id, chunk_index,
                        created_at
                 FROM {vector_read} WHERE project_id = ?1"
            ),
            insert: format!(
                "INSERT INTO {vector_write}
                    (id, project_id, type, content, vector, document_id, chunk_index, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
            ),
            columns: 8,
        },
        TableCopy {
            select: "SELECT id, project_id, cache_type, chunk_id, content_hash, result,
                            tokens_used, created_at
                     FROM extraction_cache WHERE project_id = ?1"
                .into(),
            insert: "INSERT INTO extraction_cache
                        (id, project_id, cache_type, chunk_id, content_hash, result,
                         tokens_used, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
                .into(),
            columns: 8,
        },
    ]
}

/// Stream rows from `src` into `dst`, optionally rewriting each row.
fn copy_rows(
    src: &Connection,
    dst: &Connection,
    table: &TableCopy,
    scope: &str,
    rewrite: Option<&dyn Fn(&mut Vec<Value>)>,
) -> rusqlite::Result<u64> {
    let mut select = src.prepare(&table.select)?;
    let mut insert = dst.prepare(&table.insert)?;
    let mut rows = select.query(params![scope])?;
    let mut copied = 0u64;
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(table.columns);
        for i in 0..table.columns {
            values.push(row.get::<_, Value>(i)?);
        }
        if let Some(rewrite) = rewrite {
            rewrite(&mut values);
        }
        insert.execute(params_from_iter(values.iter()))?;
        copied += 1;
    }
    Ok(copied)
}

pub struct SqliteExporter {
    manager: Arc<ConnectionManager>,
    vector_table: String,
}

impl SqliteExporter {
    pub fn new(manager: Arc<ConnectionManager>, vector_table: String) -> Self {
        Self {
            manager,
            vector_table,
        }
    }
}

fn export_into(
    src: &Connection,
    dst_path: &PathBuf,
    project: &str,
    vector_table: &str,
) -> OpResult<u64> {
    let mut dst = Connection::open(dst_path)
        .map_err(|e| Error::storage(format!("create export file {}: {e}", dst_path.display())))?;
    dst.pragma_update(None, "foreign_keys", true)?;
    migrations::migrate_to_latest(&mut dst)?;

    let tx = dst.transaction()?;
    let mut copied = 0u64;
    for table in table_plan(vector_table, true) {
        copied += copy_rows(src, &tx, &table, project, None)?;
    }
    tx.commit()?;
    Ok(copied)
}

fn import_from(
    dst: &mut Connection,
    src_path: &Path,
    new_project_id: Uuid,
    vector_table: &str,
) -> OpResult<u64> {
    let src = Connection::open_with_flags(
        src_path,
        rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| Error::storage(format!("open snapshot {}: {e}", src_path.display())))?;

    let original: Option<String> = src
        .query_row("SELECT id FROM projects LIMIT 1", [], |row| row.get(0))
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;
    let original = original.ok_or_else(|| {
        Error::storage(format!(
            "snapshot {} contains no project row",
            src_path.display()
        ))
    })?;

    let new_project = new_project_id.to_string();
    let rewrite = move |values: &mut Vec<Value>| {
        values[0] = Value::Text(ids::new_id().to_string());
        if values.len() > 1 {
            values[1] = Value::Text(new_project.clone());
        }
    };
    let rewrite_project = {
        let new_project = new_project_id.to_string();
        move |values: &mut Vec<Value>| {
            values[0] = Value::Text(new_project.clone());
        }
    };

    // Imported ids must not trip referential checks mid-copy; the pragma is
    // connection-wide and cannot change inside a transaction.
    dst.pragma_update(None, "foreign_keys", false)?;
    let outcome = (|| -> OpResult<u64> {
        let tx = dst.transaction()?;
        let mut copied = 0u64;
        for (index, table) in table_plan(vector_table, false).into_iter().enumerate() {
            let rewrite: &dyn Fn(&mut Vec<Value>) = if index == 0 {
                &rewrite_project
            } else {
                &rewrite
            };
            copied += copy_rows(&src, &tx, &table, &original, Some(rewrite))?;
        }
        tx.commit()?;
        Ok(copied)
    })();
    dst.pragma_update(None, "foreign_keys", true)?;
    outcome
}

#[async_trait]
impl ProjectExporter for SqliteExporter {
    async fn export_project(&self, project_id: Uuid, dst_path: &Path) -> Result<()> {
        let dst_path = dst_path.to_path_buf();
        let vector_table = self.vector_table.clone();
        self.manager
            .with_read("export.project", move |src| {
                let project = project_id.to_string();
                let exists: bool = src
                    .prepare("SELECT 1 FROM projects WHERE id = ?1")?
                    .exists(params![project])?;
                if !exists {
                    return Err(Error::ProjectNotFound(project_id).into());
                }
                if dst_path.exists() {
                    std::fs::remove_file(&dst_path).map_err(Error::from)?;
                }

                match export_into(src, &dst_path, &project, &vector_table) {
                    Ok(rows) => {
                        info!(%project_id, rows, path = %dst_path.display(), "exported project");
                        Ok(())
                    }
                    Err(e) => {
                        // Never leave a partial artifact behind.
                        let _ = std::fs::remove_file(&dst_path);
                        Err(e)
                    }
                }
            })
            .await
    }

    async fn import_project(&self, src_path: &Path, new_project_id: Uuid) -> Result<()> {
        if !src_path.exists() {
            return Err(Error::storage(format!(
                "snapshot {} does not exist",
                src_path.display()
            )));
        }
        let src_path = src_path.to_path_buf();
        let vector_table = self.vector_table.clone();
        self.manager
            .with_write("import.project", move |dst| {
                let rows = import_from(dst, &src_path, new_project_id, &vector_table)?;
                info!(%new_project_id, rows, path = %src_path.display(), "imported project");
                Ok(())
            })
            .await
    }
}
