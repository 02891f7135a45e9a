//! Versioned schema migrations — forward-only, tracked in `schema_version`.
//!
//! All pending migrations apply inside one transaction: the database lands
//! on the latest version or stays exactly where it was.

use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::{debug, info};

use ragstore_core::{Error, Result};

pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub script: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "core tables",
        script: r#"
            CREATE TABLE projects (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE documents (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                doc_type TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX idx_documents_project ON documents(project_id);

            CREATE TABLE kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE document_status (
                doc_id TEXT PRIMARY KEY,
                processing_status TEXT NOT NULL,
                chunk_count INTEGER NOT NULL DEFAULT 0,
                entity_count INTEGER NOT NULL DEFAULT 0,
                relation_count INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
        "#,
    },
    Migration {
        version: 2,
        description: "graph tables",
        script: r#"
            CREATE TABLE graph_entities (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                document_id TEXT,
                source_chunk_ids TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(project_id, name)
            );
            CREATE INDEX idx_graph_entities_document ON graph_entities(document_id);

            CREATE TABLE graph_relations (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                source_entity TEXT NOT NULL,
                target_entity TEXT NOT NULL,
                relation_type TEXT NOT NULL DEFAULT 'RELATED_TO',
                description TEXT NOT NULL DEFAULT '',
                keywords TEXT NOT NULL DEFAULT '',
                weight REAL NOT NULL DEFAULT 1.0,
                document_id TEXT,
                source_chunk_ids TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(project_id, source_entity, target_entity)
            );
            CREATE INDEX idx_graph_relations_source ON graph_relations(project_id, source_entity);
            CREATE INDEX idx_graph_relations_target ON graph_relations(project_id, target_entity);
            CREATE INDEX idx_graph_relations_document ON graph_relations(document_id);
        "#,
    },
    Migration {
        version: 3,
        description: "vector and extraction-cache tables",
        script: r#"
            CREATE TABLE vectors (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                type TEXT NOT NULL,
                content TEXT NOT NULL,
                vector BLOB NOT NULL,
                document_id TEXT,
                chunk_index INTEGER,
                created_at TEXT NOT NULL
            );
            CREATE INDEX idx_vectors_project ON vectors(project_id);
            CREATE INDEX idx_vectors_type ON vectors(type);
            CREATE INDEX idx_vectors_project_type ON vectors(project_id, type);
            CREATE INDEX idx_vectors_document ON vectors(document_id);

            CREATE TABLE extraction_cache (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                cache_type TEXT NOT NULL,
                chunk_id TEXT,
                content_hash TEXT NOT NULL,
                result TEXT NOT NULL,
                tokens_used INTEGER,
                created_at TEXT NOT NULL,
                UNIQUE(project_id, cache_type, content_hash)
            );
            CREATE INDEX idx_extraction_cache_chunk ON extraction_cache(project_id, chunk_id);
        "#,
    },
];

/// Latest schema version the registry describes.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

/// Current schema version: 0 when the `schema_version` table is absent,
/// otherwise MAX(version).
pub fn current_version(conn: &Connection) -> Result<u32> {
    let exists: bool = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version'")
        .and_then(|mut stmt| stmt.exists([]))
        .map_err(|e| Error::storage(format!("probe schema_version: {e}")))?;
    if !exists {
        return Ok(0);
    }
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .map_err(|e| Error::storage(format!("read schema_version: {e}")))
}

/// Apply every migration newer than the current version, all inside one
/// transaction. On failure the whole upgrade rolls back and the error is
/// re-raised as `MigrationFailed`.
pub fn migrate_to_latest(conn: &mut Connection) -> Result<u32> {
    let current = current_version(conn)?;
    let latest = latest_version();
    if current >= latest {
        debug!(current, "schema is up to date");
        return Ok(0);
    }
    info!(from = current, to = latest, "migrating embedded schema");

    let tx = conn
        .transaction()
        .map_err(|e| Error::storage(format!("begin migration transaction: {e}")))?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        )",
    )
    .map_err(|e| Error::MigrationFailed {
        version: current + 1,
        reason: format!("create schema_version: {e}"),
    })?;

    let mut applied = 0u32;
    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        let fail = |e: rusqlite::Error| Error::MigrationFailed {
            version: migration.version,
            reason: e.to_string(),
        };
        for statement in split_statements(migration.script) {
            tx.execute_batch(&statement).map_err(fail)?;
        }
        tx.execute(
            "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
            params![migration.version, Utc::now().to_rfc3339()],
        )
        .map_err(fail)?;
        debug!(
            version = migration.version,
            description = migration.description,
            "applied migration"
        );
        applied += 1;
    }

    tx.commit().map_err(|e| Error::MigrationFailed {
        version: latest,
        reason: format!("commit: {e}"),
    })?;
    Ok(applied)
}

/// Create a non-default vector table with the canonical layout. The
/// migrations create `vectors`; a differently configured table name is
/// provisioned here at initialize time.
pub(crate) fn ensure_vector_table(conn: &Connection, table: &str) -> Result<()> {
    if table == "vectors" {
        return Ok(());
    }
    let ddl = format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            type TEXT NOT NULL,
            content TEXT NOT NULL,
            vector BLOB NOT NULL,
            document_id TEXT,
            chunk_index INTEGER,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_{table}_project ON {table}(project_id);
        CREATE INDEX IF NOT EXISTS idx_{table}_project_type ON {table}(project_id, type);
        CREATE INDEX IF NOT EXISTS idx_{table}_document ON {table}(document_id);"
    );
    conn.execute_batch(&ddl)
        .map_err(|e| Error::storage(format!("ensure vector table {table}: {e}")))
}

/// Split a migration script into executable statements. A `;` inside a
/// single- or double-quoted literal is literal; `--` line comments are
/// stripped; comment-only and empty fragments are dropped.
pub fn split_statements(script: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut chars = script.chars().peekable();
    let mut in_single = false;
    let mut in_double = false;

    while let Some(c) = chars.next() {
        match c {
            '\'' if !in_double => {
                in_single = !in_single;
                current.push(c);
            }
            '"' if !in_single => {
                in_double = !in_double;
                current.push(c);
            }
            '-' if !in_single && !in_double && chars.peek() == Some(&'-') => {
                // consume to end of line
                for c in chars.by_ref() {
                    if c == '\n' {
                        current.push('\n');
                        break;
                    }
                }
            }
            ';' if !in_single && !in_double => {
                let stmt = current.trim();
                if !stmt.is_empty() {
                    statements.push(stmt.to_string());
                }
                current.clear();
            }
            _ => current.push(c),
        }
    }
    let tail = current.trim();
    if !tail.is_empty() {
        statements.push(tail.to_string());
    }
    statements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_semicolons() {
        let stmts = split_statements("CREATE TABLE a (x);\nCREATE TABLE b (y);");
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0], "CREATE TABLE a (x)");
    }

    #[test]
    fn semicolon_inside_quotes_is_literal() {
        let stmts = split_statements("INSERT INTO t VALUES ('a;b');UPDATE t SET x = \";\";");
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0], "INSERT INTO t VALUES ('a;b')");
        assert_eq!(stmts[1], "UPDATE t SET x = \";\"");
    }

    #[test]
    fn line_comments_are_stripped() {
        let stmts = split_statements(
            "-- leading comment\nCREATE TABLE a (x); -- trailing; not a split\n-- only a comment\n",
        );
        assert_eq!(stmts.len(), 1);
        assert_eq!(stmts[0], "CREATE TABLE a (x)");
    }

    #[test]
    fn dashes_inside_quotes_survive() {
        let stmts = split_statements("INSERT INTO t VALUES ('a--b');");
        assert_eq!(stmts, vec!["INSERT INTO t VALUES ('a--b')"]);
    }

    #[test]
    fn registry_versions_are_strictly_increasing() {
        let versions: Vec<u32> = MIGRATIONS.iter().map(|m| m.version).collect();
        let mut sorted = versions.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(versions, sorted);
        assert_eq!(latest_version(), versions.last().copied().unwrap());
    }

    #[test]
    fn migrate_twice_is_noop() {
        let mut conn = Connection::open_in_memory().unwrap();
        assert_eq!(current_version(&conn).unwrap(), 0);
        let applied = migrate_to_latest(&mut conn).unwrap();
        assert_eq!(applied as usize, MIGRATIONS.len());
        assert_eq!(current_version(&conn).unwrap(), latest_version());
        assert_eq!(migrate_to_latest(&mut conn).unwrap(), 0);
    }
}
