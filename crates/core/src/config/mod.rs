//! Configuration structures for the storage substrate
//!
//! Loading from files or the environment is the host application's concern;
//! this module only defines the shapes, defaults, and validation.

mod defaults;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use defaults::*;

/// Which backend implementation serves the storage contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Single-file embedded database
    #[default]
    Embedded,
    /// Client-server database
    Server,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Embedded => write!(f, "embedded"),
            Self::Server => write!(f, "server"),
        }
    }
}

/// Where SQLite keeps temporary tables and indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TempStore {
    #[default]
    Memory,
    File,
}

/// Configuration for the embedded backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedConfig {
    /// Path of the single-file database
    #[serde(default = "default_embedded_path")]
    pub path: PathBuf,

    /// Maximum pooled read connections
    #[serde(default = "default_read_pool_size")]
    pub read_pool_size: usize,

    /// How long a statement waits on a file lock before failing
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Use write-ahead logging for reader/writer non-interference
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,

    /// Optional external directory holding native extensions
    #[serde(default)]
    pub extensions_path: Option<PathBuf>,

    /// Memory-map size in bytes; 0 disables mapping
    #[serde(default = "default_mmap_size")]
    pub mmap_size: i64,

    /// Page-cache size; negative values are KiB, positive are pages
    #[serde(default = "default_cache_size")]
    pub cache_size: i64,

    /// Temp-store location
    #[serde(default)]
    pub temp_store: TempStore,
}

impl Default for EmbeddedConfig {
    fn default() -> Self {
        Self {
            path: default_embedded_path(),
            read_pool_size: default_read_pool_size(),
            busy_timeout_ms: default_busy_timeout_ms(),
            wal_mode: default_wal_mode(),
            extensions_path: None,
            mmap_size: default_mmap_size(),
            cache_size: default_cache_size(),
            temp_store: TempStore::default(),
        }
    }
}

impl EmbeddedConfig {
    /// Constrained profile for low-memory deployments: 500 KiB page cache,
    /// no memory map, file-backed temp store, two pooled readers.
    pub fn edge_profile() -> Self {
        Self {
            cache_size: -500,
            mmap_size: 0,
            temp_store: TempStore::File,
            read_pool_size: 2,
            ..Self::default()
        }
    }
}

/// Configuration for the server backend
#[derive(Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Database host address
    #[serde(default = "default_server_host")]
    pub host: String,

    /// Database port
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Database name
    #[serde(default = "default_server_database")]
    pub database: String,

    /// Username
    #[serde(default = "default_server_user")]
    pub user: String,

    /// Password
    #[serde(default = "default_server_password")]
    pub password: String,

    /// Connection pool size (max connections)
    #[serde(default = "default_server_pool_size")]
    pub pool_size: u32,

    /// Schema holding the ragstore tables
    #[serde(default = "default_server_schema")]
    pub schema: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            database: default_server_database(),
            user: default_server_user(),
            password: default_server_password(),
            pool_size: default_server_pool_size(),
            schema: default_server_schema(),
        }
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"***REDACTED***")
            .field("pool_size", &self.pool_size)
            .field("schema", &self.schema)
            .finish()
    }
}

/// Which index the server backend builds over the vector column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VectorIndexKind {
    #[default]
    Hnsw,
    Ivfflat,
}

/// Vector index tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndexConfig {
    #[serde(default)]
    pub kind: VectorIndexKind,

    /// HNSW graph degree
    #[serde(default = "default_hnsw_m")]
    pub hnsw_m: u32,

    /// HNSW build-time candidate list size
    #[serde(default = "default_hnsw_ef_construction")]
    pub hnsw_ef_construction: u32,

    /// IVFFLAT partition count
    #[serde(default = "default_ivfflat_lists")]
    pub ivfflat_lists: u32,
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            kind: VectorIndexKind::default(),
            hnsw_m: default_hnsw_m(),
            hnsw_ef_construction: default_hnsw_ef_construction(),
            ivfflat_lists: default_ivfflat_lists(),
        }
    }
}

/// Vector store configuration shared by both backends
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfig {
    /// Fixed embedding dimension D
    #[serde(default = "default_vector_dimension")]
    pub dimension: usize,

    /// Vector table name
    #[serde(default = "default_vector_table_name")]
    pub table_name: String,

    /// Index tuning (server backend)
    #[serde(default)]
    pub index: VectorIndexConfig,

    /// Rows per committed chunk in batch upserts
    #[serde(default = "default_upsert_batch_size")]
    pub upsert_batch_size: usize,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            dimension: default_vector_dimension(),
            table_name: default_vector_table_name(),
            index: VectorIndexConfig::default(),
            upsert_batch_size: default_upsert_batch_size(),
        }
    }
}

/// Top-level storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// Backend selector
    #[serde(default)]
    pub backend: BackendKind,

    /// Embedded backend tuning
    #[serde(default)]
    pub embedded: EmbeddedConfig,

    /// Server backend tuning
    #[serde(default)]
    pub server: ServerConfig,

    /// Vector store tuning
    #[serde(default)]
    pub vector: VectorConfig,
}

impl StorageConfig {
    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.vector.dimension == 0 {
            return Err(Error::config("vector.dimension must be greater than 0"));
        }
        if self.vector.dimension > 16_384 {
            return Err(Error::config(format!(
                "vector.dimension too large (max 16384, got {})",
                self.vector.dimension
            )));
        }
        if self.vector.table_name.is_empty()
            || !self
                .vector
                .table_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(Error::config(format!(
                "vector.table_name '{}' must be a bare SQL identifier",
                self.vector.table_name
            )));
        }
        if self.vector.upsert_batch_size == 0 {
            return Err(Error::config(
                "vector.upsert_batch_size must be greater than 0",
            ));
        }
        if self.embedded.read_pool_size == 0 {
            return Err(Error::config(
                "embedded.read_pool_size must be greater than 0",
            ));
        }
        if self.embedded.read_pool_size > 64 {
            return Err(Error::config(format!(
                "embedded.read_pool_size too large (max 64, got {})",
                self.embedded.read_pool_size
            )));
        }
        if self.server.pool_size == 0 {
            return Err(Error::config("server.pool_size must be greater than 0"));
        }
        if self.server.schema.is_empty()
            || !self
                .server
                .schema
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(Error::config(format!(
                "server.schema '{}' must be a bare SQL identifier",
                self.server.schema
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        StorageConfig::default().validate().unwrap();
    }

    #[test]
    fn edge_profile_shrinks_pool_and_cache() {
        let edge = EmbeddedConfig::edge_profile();
        assert_eq!(edge.read_pool_size, 2);
        assert_eq!(edge.cache_size, -500);
        assert_eq!(edge.mmap_size, 0);
        assert_eq!(edge.temp_store, TempStore::File);
    }

    #[test]
    fn zero_dimension_rejected() {
        let mut config = StorageConfig::default();
        config.vector.dimension = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn hostile_table_name_rejected() {
        let mut config = StorageConfig::default();
        config.vector.table_name = "vectors; DROP TABLE projects".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn debug_redacts_password() {
        let server = ServerConfig::default();
        let rendered = format!("{server:?}");
        assert!(rendered.contains("***REDACTED***"));
        assert!(!rendered.contains("ragstore_password"));
    }
}
