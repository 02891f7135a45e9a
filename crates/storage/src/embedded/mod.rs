//! Embedded single-file backend.
//!
//! Project isolation is a `project_id` column on every scoped table; the
//! connection manager enforces the one-writer/many-readers discipline and
//! every store runs its statements through it.

mod doc_status;
mod export;
mod extensions;
mod extraction_cache;
mod graph;
mod kv;
mod manager;
mod migrations;
mod projects;
mod vector;

pub use doc_status::SqliteDocStatusStore;
pub use export::SqliteExporter;
pub use extensions::{library_suffix, platform_tag, ExtensionLoader};
pub use extraction_cache::SqliteExtractionCache;
pub use graph::SqliteGraphStore;
pub use kv::SqliteKvStore;
pub use manager::ConnectionManager;
pub use migrations::{current_version, latest_version, migrate_to_latest, split_statements};
pub use projects::SqliteProjectStore;
pub use vector::SqliteVectorStore;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Parse an RFC 3339 timestamp column.
pub(crate) fn parse_ts(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

/// Parse a UUID column.
pub(crate) fn parse_uuid(idx: usize, raw: String) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub(crate) fn parse_uuid_opt(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<Uuid>> {
    raw.map(|s| parse_uuid(idx, s)).transpose()
}

/// Serialize a source-chunk id list to its JSON column form.
pub(crate) fn chunk_ids_json(ids: &[Uuid]) -> String {
    serde_json::to_string(&ids.iter().map(Uuid::to_string).collect::<Vec<_>>())
        .unwrap_or_else(|_| "[]".to_string())
}

/// Parse a JSON source-chunk id list column.
pub(crate) fn parse_chunk_ids(idx: usize, raw: String) -> rusqlite::Result<Vec<Uuid>> {
    let strings: Vec<String> = serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })?;
    strings
        .iter()
        .map(|s| parse_uuid(idx, s.clone()))
        .collect()
}

/// Translate a glob pattern (`*` any run, `?` one character) to a LIKE
/// pattern with `\` escaping.
pub(crate) fn glob_to_like(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        match c {
            '*' => out.push('%'),
            '?' => out.push('_'),
            '%' | '_' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            other => out.push(other),
        }
    }
    out
}

/// Positional placeholder list (`?,?,?`) for IN clauses.
pub(crate) fn placeholders(count: usize) -> String {
    let mut out = String::with_capacity(count.saturating_mul(2));
    for i in 0..count {
        if i > 0 {
            out.push(',');
        }
        out.push('?');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_translation_maps_wildcards() {
        assert_eq!(glob_to_like("doc:*"), "doc:%");
        assert_eq!(glob_to_like("a?c"), "a_c");
        assert_eq!(glob_to_like("100%_done\\"), "100\\%\\_done\\\\");
    }

    #[test]
    fn chunk_id_json_round_trip() {
        let ids = vec![Uuid::nil(), Uuid::from_u128(42)];
        let json = chunk_ids_json(&ids);
        assert_eq!(parse_chunk_ids(0, json).unwrap(), ids);
        assert_eq!(parse_chunk_ids(0, "[]".to_string()).unwrap(), Vec::<Uuid>::new());
    }

    #[test]
    fn placeholder_list_shape() {
        assert_eq!(placeholders(0), "");
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?,?,?");
    }
}
