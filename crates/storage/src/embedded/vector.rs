//! Vector store over a BLOB-column table.
//!
//! Vectors are packed as little-endian IEEE-754 float32 regardless of the
//! host platform. Similarity queries stream the project's rows and rank by
//! cosine in memory; the table carries no ANN index.

use std::cmp::Ordering;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{params, Row};
use tracing::warn;
use uuid::Uuid;

use ragstore_core::embedding::check_dimension;
use ragstore_core::{
    BackendKind, Error, Result, ScoredVector, VectorConfig, VectorEntry, VectorEntryType,
    VectorFilter,
};

use ragstore_core::normalize::normalize_name;

use super::manager::ConnectionManager;
use super::{parse_ts, parse_uuid, parse_uuid_opt, placeholders};
use crate::{BackendTyped, VectorStore};

/// Pack a vector as little-endian float32 bytes.
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

/// Unpack a little-endian float32 blob.
pub fn decode_vector(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(Error::serialization(format!(
            "vector blob length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| {
            let mut raw = [0u8; 4];
            raw.copy_from_slice(chunk);
            f32::from_le_bytes(raw)
        })
        .collect())
}

/// Cosine similarity. Inputs are usually pre-normalized but this must not be
/// assumed; zero-magnitude vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

const VECTOR_COLUMNS: &str =
    "id, project_id, type, content, vector, document_id, chunk_index, created_at";

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<VectorEntry> {
    let type_raw: String = row.get(2)?;
    let blob: Vec<u8> = row.get(4)?;
    let vector = decode_vector(&blob).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Blob, Box::new(e))
    })?;
    Ok(VectorEntry {
        id: parse_uuid(0, row.get(0)?)?,
        project_id: parse_uuid(1, row.get(1)?)?,
        entry_type: VectorEntryType::from_str(&type_raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?,
        content: row.get(3)?,
        vector,
        document_id: parse_uuid_opt(5, row.get(5)?)?,
        chunk_index: row.get(6)?,
        created_at: parse_ts(7, row.get(7)?)?,
    })
}

fn upsert_one(conn: &rusqlite::Connection, table: &str, entry: &VectorEntry) -> rusqlite::Result<()> {
    let sql = format!(
        "INSERT INTO {table} (id, project_id, type, content, vector, document_id,
                              chunk_index, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(id) DO UPDATE SET
            project_id = excluded.project_id,
            type = excluded.type,
            content = excluded.content,
            vector = excluded.vector,
            document_id = excluded.document_id,
            chunk_index = excluded.chunk_index"
    );
    conn.execute(
        &sql,
        params![
            entry.id.to_string(),
            entry.project_id.to_string(),
            entry.entry_type.to_string(),
            entry.content,
            encode_vector(&entry.vector),
            entry.document_id.map(|id| id.to_string()),
            entry.chunk_index,
            entry.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub struct SqliteVectorStore {
    manager: Arc<ConnectionManager>,
    config: VectorConfig,
    table: &'static str,
}

impl SqliteVectorStore {
    pub fn new(manager: Arc<ConnectionManager>, config: VectorConfig) -> Self {
        // The table name is validated as a bare identifier by config
        // validation; leak once so SQL strings can borrow it statically.
        let table: &'static str = Box::leak(config.table_name.clone().into_boxed_str());
        Self {
            manager,
            config,
            table,
        }
    }

    fn check(&self, vector: &[f32]) -> Result<()> {
        check_dimension(vector, self.config.dimension)
    }
}

impl BackendTyped for SqliteVectorStore {
    fn backend_kind(&self) -> BackendKind {
        BackendKind::Embedded
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert(&self, entry: VectorEntry) -> Result<()> {
        self.check(&entry.vector)?;
        let table = self.table;
        let result = self
            .manager
            .with_write("vector.upsert", move |conn| {
                upsert_one(conn, table, &entry)?;
                Ok(())
            })
            .await;
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
            self.check(&entry.vector)?;
        }
        let table = self.table;
        // Each chunk commits on its own, so a mid-batch failure leaves a
        // consistent prefix rather than a torn batch.
        for chunk in entries.chunks(self.config.upsert_batch_size.max(1)) {
            let chunk = chunk.to_vec();
            self.manager
                .with_write("vector.upsert_batch", move |conn| {
                    let tx = conn.transaction()?;
                    for entry in &chunk {
                        upsert_one(&tx, table, entry)?;
                    }
                    tx.commit()?;
                    Ok(())
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
        let filter = filter.ok_or_else(|| {
            Error::storage("vector.query: the embedded backend requires a project filter")
        })?;
        self.check(query)?;
        if top_k == 0 || filter.ids.as_ref().is_some_and(|ids| ids.is_empty()) {
            return Ok(Vec::new());
        }
        let query = query.to_vec();
        let table = self.table;
        self.manager
            .with_read("vector.query", move |conn| {
                let mut sql = format!(
                    "SELECT {VECTOR_COLUMNS} FROM {table} WHERE project_id = ?"
                );
                let project = filter.project_id.to_string();
                let type_str = filter.entry_type.map(|t| t.to_string());
                let id_strings: Vec<String> = filter
                    .ids
                    .as_deref()
                    .unwrap_or_default()
                    .iter()
                    .map(Uuid::to_string)
                    .collect();

                let mut values: Vec<&dyn rusqlite::ToSql> = vec![&project];
                if let Some(type_str) = &type_str {
                    sql.push_str(" AND type = ?");
                    values.push(type_str);
                }
                if filter.ids.is_some() {
                    sql.push_str(&format!(" AND id IN ({})", placeholders(id_strings.len())));
                    for id in &id_strings {
                        values.push(id);
                    }
                }

                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(values.as_slice(), entry_from_row)?;

                let mut scored = Vec::new();
                for row in rows {
                    let entry = row?;
                    let score = cosine_similarity(&query, &entry.vector);
                    scored.push(ScoredVector { entry, score });
                }
                scored.sort_by(|a, b| {
                    b.score
                        .partial_cmp(&a.score)
                        .unwrap_or(Ordering::Equal)
                        .then_with(|| a.entry.id.cmp(&b.entry.id))
                });
                scored.truncate(top_k);
                Ok(scored)
            })
            .await
    }

    async fn get(&self, id: Uuid) -> Result<Option<VectorEntry>> {
        let table = self.table;
        self.manager
            .with_read("vector.get", move |conn| {
                let sql = format!("SELECT {VECTOR_COLUMNS} FROM {table} WHERE id = ?1");
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query(params![id.to_string()])?;
                match rows.next()? {
                    Some(row) => Ok(Some(entry_from_row(row)?)),
                    None => Ok(None),
                }
            })
            .await
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let table = self.table;
        self.manager
            .with_write("vector.delete", move |conn| {
                let sql = format!("DELETE FROM {table} WHERE id = ?1");
                let deleted = conn.execute(&sql, params![id.to_string()])?;
                Ok(deleted > 0)
            })
            .await
    }

    async fn delete_batch(&self, ids: &[Uuid]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids: Vec<String> = ids.iter().map(Uuid::to_string).collect();
        let table = self.table;
        self.manager
            .with_write("vector.delete_batch", move |conn| {
                let sql = format!(
                    "DELETE FROM {table} WHERE id IN ({})",
                    placeholders(ids.len())
                );
                let deleted = conn.execute(&sql, rusqlite::params_from_iter(ids.iter()))?;
                Ok(deleted as u64)
            })
            .await
    }

    async fn len(&self) -> Result<u64> {
        let table = self.table;
        self.manager
            .with_read("vector.len", move |conn| {
                let sql = format!("SELECT COUNT(*) FROM {table}");
                Ok(conn.query_row(&sql, [], |row| row.get::<_, i64>(0))? as u64)
            })
            .await
    }

    async fn clear(&self) -> Result<()> {
        let table = self.table;
        self.manager
            .with_write("vector.clear", move |conn| {
                let sql = format!("DELETE FROM {table}");
                conn.execute(&sql, [])?;
                Ok(())
            })
            .await
    }

    async fn delete_entity_embeddings(&self, project_id: Uuid, names: &[String]) -> Result<u64> {
        if names.is_empty() {
            return Ok(0);
        }
        let names: Vec<String> = names.iter().map(|n| normalize_name(n)).collect();
        let table = self.table;
        self.manager
            .with_write("vector.delete_entity_embeddings", move |conn| {
                let sql = format!(
                    "DELETE FROM {table}
                     WHERE project_id = ? AND type = 'entity' AND content IN ({})",
                    placeholders(names.len())
                );
                let project = project_id.to_string();
                let mut values: Vec<&dyn rusqlite::ToSql> = vec![&project];
                for name in &names {
                    values.push(name);
                }
                let deleted = conn.execute(&sql, values.as_slice())?;
                Ok(deleted as u64)
            })
            .await
    }

    async fn delete_chunk_embeddings(&self, project_id: Uuid, chunk_ids: &[Uuid]) -> Result<u64> {
        if chunk_ids.is_empty() {
            return Ok(0);
        }
        let ids: Vec<String> = chunk_ids.iter().map(Uuid::to_string).collect();
        let table = self.table;
        self.manager
            .with_write("vector.delete_chunk_embeddings", move |conn| {
                let sql = format!(
                    "DELETE FROM {table}
                     WHERE project_id = ? AND type = 'chunk' AND id IN ({})",
                    placeholders(ids.len())
                );
                let project = project_id.to_string();
                let mut values: Vec<&dyn rusqlite::ToSql> = vec![&project];
                for id in &ids {
                    values.push(id);
                }
                let deleted = conn.execute(&sql, values.as_slice())?;
                Ok(deleted as u64)
            })
            .await
    }

    async fn get_chunk_ids_by_document(
        &self,
        project_id: Uuid,
        document_id: Uuid,
    ) -> Result<Vec<Uuid>> {
        let table = self.table;
        self.manager
            .with_read("vector.get_chunk_ids_by_document", move |conn| {
                let sql = format!(
                    "SELECT id FROM {table}
                     WHERE project_id = ?1 AND document_id = ?2 AND type = 'chunk'
                     ORDER BY chunk_index"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(
                    params![project_id.to_string(), document_id.to_string()],
                    |row| parse_uuid(0, row.get(0)?),
                )?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await
    }

    async fn has_vectors(&self, document_id: Uuid) -> Result<bool> {
        let table = self.table;
        self.manager
            .with_read("vector.has_vectors", move |conn| {
                let sql = format!("SELECT 1 FROM {table} WHERE document_id = ?1");
                let mut stmt = conn.prepare(&sql)?;
                Ok(stmt.exists(params![document_id.to_string()])?)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_round_trips_bit_exact() {
        let v = vec![1.0f32, -0.5, f32::MIN_POSITIVE, 12345.678];
        let decoded = decode_vector(&encode_vector(&v)).unwrap();
        assert_eq!(v.len(), decoded.len());
        for (a, b) in v.iter().zip(decoded.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn encoding_is_little_endian() {
        let bytes = encode_vector(&[1.0f32]);
        assert_eq!(bytes, vec![0x00, 0x00, 0x80, 0x3f]);
    }

    #[test]
    fn truncated_blob_rejected() {
        assert!(decode_vector(&[0u8; 6]).is_err());
    }

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = [0.3f32, 0.4, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_is_scale_invariant() {
        let a = [1.0f32, 2.0, 3.0];
        let b = [10.0f32, 20.0, 30.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
