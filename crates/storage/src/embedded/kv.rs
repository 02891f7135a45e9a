//! Key-value store over the `kv_store` table.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::params;

use ragstore_core::{BackendKind, Result};

use super::manager::ConnectionManager;
use super::{glob_to_like, placeholders};
use crate::{BackendTyped, KvStore};

pub struct SqliteKvStore {
    manager: Arc<ConnectionManager>,
}

impl SqliteKvStore {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }
}

impl BackendTyped for SqliteKvStore {
    fn backend_kind(&self) -> BackendKind {
        BackendKind::Embedded
    }
}

#[async_trait]
impl KvStore for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.manager
            .with_read("kv.get", move |conn| {
                let mut stmt = conn.prepare("SELECT value FROM kv_store WHERE key = ?1")?;
                let mut rows = stmt.query(params![key])?;
                match rows.next()? {
                    Some(row) => Ok(Some(row.get(0)?)),
                    None => Ok(None),
                }
            })
            .await
    }

    async fn get_batch(&self, keys: &[String]) -> Result<HashMap<String, String>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let keys = keys.to_vec();
        self.manager
            .with_read("kv.get_batch", move |conn| {
                let sql = format!(
                    "SELECT key, value FROM kv_store WHERE key IN ({})",
                    placeholders(keys.len())
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(rusqlite::params_from_iter(keys.iter()), |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?;
                let mut out = HashMap::new();
                for row in rows {
                    let (k, v) = row?;
                    out.insert(k, v);
                }
                Ok(out)
            })
            .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.manager
            .with_write("kv.set", move |conn| {
                let now = Utc::now().to_rfc3339();
                conn.execute(
                    "INSERT INTO kv_store (key, value, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?3)
                     ON CONFLICT(key) DO UPDATE SET
                        value = excluded.value,
                        updated_at = excluded.updated_at",
                    params![key, value, now],
                )?;
                Ok(())
            })
            .await
    }

    async fn set_batch(&self, entries: &HashMap<String, String>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let entries: Vec<(String, String)> =
            entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        self.manager
            .with_write("kv.set_batch", move |conn| {
                let tx = conn.transaction()?;
                let now = Utc::now().to_rfc3339();
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO kv_store (key, value, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?3)
                         ON CONFLICT(key) DO UPDATE SET
                            value = excluded.value,
                            updated_at = excluded.updated_at",
                    )?;
                    for (key, value) in &entries {
                        stmt.execute(params![key, value, now])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.manager
            .with_write("kv.delete", move |conn| {
                let deleted = conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
                Ok(deleted > 0)
            })
            .await
    }

    async fn delete_batch(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let keys = keys.to_vec();
        self.manager
            .with_write("kv.delete_batch", move |conn| {
                let sql = format!(
                    "DELETE FROM kv_store WHERE key IN ({})",
                    placeholders(keys.len())
                );
                let deleted = conn.execute(&sql, rusqlite::params_from_iter(keys.iter()))?;
                Ok(deleted as u64)
            })
            .await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.manager
            .with_read("kv.exists", move |conn| {
                let mut stmt = conn.prepare("SELECT 1 FROM kv_store WHERE key = ?1")?;
                Ok(stmt.exists(params![key])?)
            })
            .await
    }

    async fn len(&self) -> Result<u64> {
        self.manager
            .with_read("kv.len", |conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM kv_store", [], |row| {
                    row.get::<_, i64>(0)
                })? as u64)
            })
            .await
    }

    async fn clear(&self) -> Result<()> {
        self.manager
            .with_write("kv.clear", |conn| {
                conn.execute("DELETE FROM kv_store", [])?;
                Ok(())
            })
            .await
    }

    async fn keys(&self, pattern: Option<&str>) -> Result<Vec<String>> {
        let like = pattern.map(glob_to_like);
        self.manager
            .with_read("kv.keys", move |conn| {
                let mut out = Vec::new();
                match like {
                    Some(like) => {
                        let mut stmt = conn.prepare(
                            "SELECT key FROM kv_store WHERE key LIKE ?1 ESCAPE '\\' ORDER BY key",
                        )?;
                        let rows = stmt.query_map(params![like], |row| row.get(0))?;
                        for row in rows {
                            out.push(row?);
                        }
                    }
                    None => {
                        let mut stmt = conn.prepare("SELECT key FROM kv_store ORDER BY key")?;
                        let rows = stmt.query_map([], |row| row.get(0))?;
                        for row in rows {
                            out.push(row?);
                        }
                    }
                }
                Ok(out)
            })
            .await
    }
}
