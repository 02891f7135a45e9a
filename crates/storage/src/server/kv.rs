//! Key-value store over the server `kv_store` table.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use ragstore_core::{BackendKind, Result};

use super::map_pg;
use crate::embedded::glob_to_like;
use crate::{BackendTyped, KvStore};

pub struct PgKvStore {
    pool: PgPool,
    table: String,
}

impl PgKvStore {
    pub fn new(pool: PgPool, schema: &str) -> Self {
        Self {
            pool,
            table: format!("{schema}.kv_store"),
        }
    }
}

impl BackendTyped for PgKvStore {
    fn backend_kind(&self) -> BackendKind {
        BackendKind::Server
    }
}

#[async_trait]
impl KvStore for PgKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as(&format!("SELECT value FROM {} WHERE key = $1", self.table))
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_pg("kv.get", e))?;
        Ok(row.map(|(v,)| v))
    }

    async fn get_batch(&self, keys: &[String]) -> Result<HashMap<String, String>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query(&format!(
            "SELECT key, value FROM {} WHERE key = ANY($1)",
            self.table
        ))
        .bind(keys)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_pg("kv.get_batch", e))?;

        let mut out = HashMap::with_capacity(rows.len());
        for row in rows {
            out.insert(
                row.try_get("key").map_err(|e| map_pg("kv.get_batch", e))?,
                row.try_get("value").map_err(|e| map_pg("kv.get_batch", e))?,
            );
        }
        Ok(out)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO {} (key, value, created_at, updated_at)
             VALUES ($1, $2, NOW(), NOW())
             ON CONFLICT (key) DO UPDATE SET
                value = EXCLUDED.value,
                updated_at = NOW()",
            self.table
        ))
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| map_pg("kv.set", e))?;
        Ok(())
    }

    async fn set_batch(&self, entries: &HashMap<String, String>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_pg("kv.set_batch", e))?;
        let sql = format!(
            "INSERT INTO {} (key, value, created_at, updated_at)
             VALUES ($1, $2, NOW(), NOW())
             ON CONFLICT (key) DO UPDATE SET
                value = EXCLUDED.value,
                updated_at = NOW()",
            self.table
        );
        for (key, value) in entries {
            sqlx::query(&sql)
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_pg("kv.set_batch", e))?;
        }
        tx.commit().await.map_err(|e| map_pg("kv.set_batch", e))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE key = $1", self.table))
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| map_pg("kv.delete", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_batch(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(&format!("DELETE FROM {} WHERE key = ANY($1)", self.table))
            .bind(keys)
            .execute(&self.pool)
            .await
            .map_err(|e| map_pg("kv.delete_batch", e))?;
        Ok(result.rows_affected())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let row: Option<(i32,)> =
            sqlx::query_as(&format!("SELECT 1 FROM {} WHERE key = $1", self.table))
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_pg("kv.exists", e))?;
        Ok(row.is_some())
    }

    async fn len(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", self.table))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_pg("kv.len", e))?;
        Ok(count as u64)
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query(&format!("DELETE FROM {}", self.table))
            .execute(&self.pool)
            .await
            .map_err(|e| map_pg("kv.clear", e))?;
        Ok(())
    }

    async fn keys(&self, pattern: Option<&str>) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = match pattern {
            Some(pattern) => {
                sqlx::query_as(&format!(
                    "SELECT key FROM {} WHERE key LIKE $1 ESCAPE '\\' ORDER BY key",
                    self.table
                ))
                .bind(glob_to_like(pattern))
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as(&format!("SELECT key FROM {} ORDER BY key", self.table))
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(|e| map_pg("kv.keys", e))?;
        Ok(rows.into_iter().map(|(k,)| k).collect())
    }
}
