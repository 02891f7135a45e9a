//! Server backend over PostgreSQL.
//!
//! Tables live in a dedicated schema with `ON DELETE CASCADE` foreign keys
//! from project and document. Static tables come from the versioned
//! `migrations/*.sql` files; every connection pins `search_path` to the
//! configured schema so the unqualified migration DDL lands there. Only the
//! vector table and its index are created programmatically, because vector
//! dimension, table name, and index kind are configuration. Vectors use the
//! native `vector(D)` column type with an HNSW or IVFFLAT index; the graph
//! is relational with parameterized statements end-to-end.

mod doc_status;
mod extraction_cache;
mod graph;
mod kv;
mod projects;
mod vector;

pub use doc_status::PgDocStatusStore;
pub use extraction_cache::PgExtractionCache;
pub use graph::PgGraphStore;
pub use kv::PgKvStore;
pub use projects::PgProjectStore;
pub use vector::PgVectorStore;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use ragstore_core::{Error, Result, ResultExt, ServerConfig, VectorConfig, VectorIndexKind};

use crate::retry::is_transient_sqlstate;

/// Map a driver error into the engine error model. Transient faults become
/// `Error::Transient` so the retry wrapper can re-attempt them; unique
/// violations become `DuplicateKey` for upsert paths.
pub(crate) fn map_pg(operation: &str, e: sqlx::Error) -> Error {
    if let sqlx::Error::Database(db) = &e {
        if let Some(code) = db.code() {
            if code == "23505" {
                return Error::DuplicateKey(format!("{operation}: {e}"));
            }
            if is_transient_sqlstate(&code) {
                return Error::transient(format!("{operation}: {e}"));
            }
        }
        return Error::storage(format!("{operation}: {e}"));
    }
    match e {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            Error::transient(format!("{operation}: {e}"))
        }
        other => Error::storage(format!("{operation}: {other}")),
    }
}

/// Open the connection pool. Every connection pins `search_path` to the
/// configured schema (with `public` kept for the vector extension's type and
/// operators), so unqualified DDL and the migration bookkeeping land in the
/// dedicated schema.
pub async fn connect(config: &ServerConfig) -> Result<PgPool> {
    let options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .database(&config.database)
        .username(&config.user)
        .password(&config.password)
        .options([("search_path", format!("{},public", config.schema))]);
    PgPoolOptions::new()
        .max_connections(config.pool_size)
        .connect_with(options)
        .await
        .map_err(|e| Error::storage(format!("connect to {}:{}: {e}", config.host, config.port)))
}

/// Serialize a vector as the extension's literal form (`[x1,x2,…]`), bound
/// as text and cast to `vector` inside SQL.
pub(crate) fn vector_literal(vector: &[f32]) -> String {
    let mut out = String::with_capacity(vector.len() * 10 + 2);
    out.push('[');
    for (i, value) in vector.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        use std::fmt::Write;
        let _ = write!(out, "{value}");
    }
    out.push(']');
    out
}

/// Parse the extension's text output back into the canonical form.
pub(crate) fn parse_vector_literal(raw: &str) -> Result<Vec<f32>> {
    let inner = raw
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| Error::serialization(format!("malformed vector literal: {raw}")))?;
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    inner
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f32>()
                .map_err(|e| Error::serialization(format!("malformed vector component: {e}")))
        })
        .collect()
}

/// Legacy isolated-graph name for a project: hyphens stripped, truncated to
/// 32 characters, `graph_` prefix. Retained for lifecycle logging; isolation
/// itself is the `project_id` column.
pub fn graph_name(project_id: Uuid) -> String {
    let simple = project_id.simple().to_string();
    let truncated: String = simple.chars().take(32).collect();
    format!("graph_{truncated}")
}

/// Bring the server schema up: vector extension, dedicated schema, versioned
/// migrations for the static tables, then the vector table and its index,
/// whose dimension, name, and kind are configuration. Safe to run on every
/// startup.
pub async fn init_schema(
    pool: &PgPool,
    config: &ServerConfig,
    vector: &VectorConfig,
) -> Result<()> {
    let s = &config.schema;
    let vt = &vector.table_name;
    let dimension = vector.dimension;

    sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
        .execute(pool)
        .await
        .map_err(|e| {
            Error::storage(format!(
                "enable vector extension (is it installed on the server?): {e}"
            ))
        })?;

    // The schema must exist before the migrations run: their unqualified DDL
    // resolves through the search_path pinned at connect time.
    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {s}"))
        .execute(pool)
        .await
        .op_context("create schema")?;

    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .op_context("run migrations")?;

    ensure_vector_table(pool, s, vector).await?;

    info!(schema = %s, table = %vt, dimension, "server schema ready");
    Ok(())
}

/// Create the configured vector table and its similarity index, idempotent.
async fn ensure_vector_table(pool: &PgPool, s: &str, vector: &VectorConfig) -> Result<()> {
    let vt = &vector.table_name;
    let dimension = vector.dimension;

    let ddl = [
        format!(
            "CREATE TABLE IF NOT EXISTS {s}.{vt} (
                id UUID PRIMARY KEY,
                project_id UUID NOT NULL REFERENCES {s}.projects(id) ON DELETE CASCADE,
                type TEXT NOT NULL,
                content TEXT NOT NULL,
                embedding vector({dimension}) NOT NULL,
                document_id UUID REFERENCES {s}.documents(id) ON DELETE CASCADE,
                chunk_index BIGINT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )"
        ),
        format!("CREATE INDEX IF NOT EXISTS idx_{vt}_project ON {s}.{vt}(project_id)"),
        format!("CREATE INDEX IF NOT EXISTS idx_{vt}_project_type ON {s}.{vt}(project_id, type)"),
        format!("CREATE INDEX IF NOT EXISTS idx_{vt}_document ON {s}.{vt}(document_id)"),
        match vector.index.kind {
            VectorIndexKind::Hnsw => format!(
                "CREATE INDEX IF NOT EXISTS idx_{vt}_embedding ON {s}.{vt}
                 USING hnsw (embedding vector_cosine_ops)
                 WITH (m = {}, ef_construction = {})",
                vector.index.hnsw_m, vector.index.hnsw_ef_construction
            ),
            VectorIndexKind::Ivfflat => format!(
                "CREATE INDEX IF NOT EXISTS idx_{vt}_embedding ON {s}.{vt}
                 USING ivfflat (embedding vector_cosine_ops)
                 WITH (lists = {})",
                vector.index.ivfflat_lists
            ),
        },
    ];
    for statement in &ddl {
        sqlx::query(statement)
            .execute(pool)
            .await
            .op_context("ensure vector table")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_name_strips_hyphens_and_prefixes() {
        let id = Uuid::parse_str("01890a5d-ac96-774b-bcce-b302099a8057").unwrap();
        let name = graph_name(id);
        assert_eq!(name, "graph_01890a5dac96774bbcceb302099a8057");
        assert!(!name.contains('-'));
        assert!(name.len() <= 6 + 32);
    }

    #[test]
    fn vector_literal_round_trips() {
        let v = vec![1.0f32, -0.25, 3.5];
        let literal = vector_literal(&v);
        assert_eq!(literal, "[1,-0.25,3.5]");
        assert_eq!(parse_vector_literal(&literal).unwrap(), v);
        assert_eq!(parse_vector_literal("[]").unwrap(), Vec::<f32>::new());
    }

    #[test]
    fn malformed_literal_rejected() {
        assert!(parse_vector_literal("1,2,3").is_err());
        assert!(parse_vector_literal("[1,x]").is_err());
    }
}
