//! Backend selection: bind exactly one implementation of every storage
//! contract based on configuration.

use std::sync::Arc;

use tracing::{info, warn};

use ragstore_core::{BackendKind, Result, StorageConfig, VectorConfig};

use crate::embedded::{
    ConnectionManager, SqliteDocStatusStore, SqliteExporter, SqliteExtractionCache,
    SqliteGraphStore, SqliteKvStore, SqliteProjectStore, SqliteVectorStore,
};
use crate::server::{
    self, PgDocStatusStore, PgExtractionCache, PgGraphStore, PgKvStore, PgProjectStore,
    PgVectorStore,
};
use crate::{
    DocStatusStore, ExtractionCache, GraphStore, KvStore, ProjectExporter, ProjectStore,
    VectorStore,
};

enum BackendRuntime {
    Embedded {
        manager: Arc<ConnectionManager>,
        vector: VectorConfig,
    },
    Server {
        pool: sqlx::PgPool,
        config: ragstore_core::ServerConfig,
        vector: VectorConfig,
    },
}

/// One bound implementation of every storage contract.
pub struct StorageBackend {
    pub kind: BackendKind,
    pub projects: Arc<dyn ProjectStore>,
    pub kv: Arc<dyn KvStore>,
    pub doc_status: Arc<dyn DocStatusStore>,
    pub extraction_cache: Arc<dyn ExtractionCache>,
    pub vectors: Arc<dyn VectorStore>,
    pub graph: Arc<dyn GraphStore>,
    /// Present on the embedded backend only; the snapshot artifact is the
    /// embedded single-file layout.
    pub exporter: Option<Arc<dyn ProjectExporter>>,
    runtime: BackendRuntime,
}

impl StorageBackend {
    /// Run connection setup and schema migration. Must complete before any
    /// store serves requests.
    pub async fn initialize(&self) -> Result<()> {
        match &self.runtime {
            BackendRuntime::Embedded { manager, vector } => manager.initialize(vector).await,
            BackendRuntime::Server {
                pool,
                config,
                vector,
            } => server::init_schema(pool, config, vector).await,
        }
    }

    /// Release connections. Embedded acquisitions fail `ManagerClosed` from
    /// here on.
    pub async fn shutdown(&self) -> Result<()> {
        match &self.runtime {
            BackendRuntime::Embedded { manager, .. } => manager.close().await,
            BackendRuntime::Server { pool, .. } => {
                pool.close().await;
                Ok(())
            }
        }
    }

    /// Verify every bound store reports the expected backend family. A
    /// mismatch is a warning, not fatal.
    fn verify_bindings(&self) {
        let stores: [(&str, BackendKind); 6] = [
            ("projects", self.projects.backend_kind()),
            ("kv", self.kv.backend_kind()),
            ("doc_status", self.doc_status.backend_kind()),
            ("extraction_cache", self.extraction_cache.backend_kind()),
            ("vectors", self.vectors.backend_kind()),
            ("graph", self.graph.backend_kind()),
        ];
        for (name, kind) in stores {
            if kind != self.kind {
                warn!(
                    store = name,
                    expected = %self.kind,
                    bound = %kind,
                    "storage contract bound to an unexpected backend type"
                );
            }
        }
        if self.exporter.is_none() {
            warn!(backend = %self.kind, "no exporter bound for this backend");
        }
    }
}

/// Create a storage backend from configuration. Returns trait objects,
/// hiding implementation details; call [`StorageBackend::initialize`] before
/// use.
pub async fn create_storage(config: &StorageConfig) -> Result<StorageBackend> {
    config.validate()?;
    let backend = match config.backend {
        BackendKind::Embedded => {
            let manager = Arc::new(ConnectionManager::new(config.embedded.clone()));
            let vector_table = config.vector.table_name.clone();
            StorageBackend {
                kind: BackendKind::Embedded,
                projects: Arc::new(SqliteProjectStore::new(
                    manager.clone(),
                    vector_table.clone(),
                )),
                kv: Arc::new(SqliteKvStore::new(manager.clone())),
                doc_status: Arc::new(SqliteDocStatusStore::new(manager.clone())),
                extraction_cache: Arc::new(SqliteExtractionCache::new(manager.clone())),
                vectors: Arc::new(SqliteVectorStore::new(
                    manager.clone(),
                    config.vector.clone(),
                )),
                graph: Arc::new(SqliteGraphStore::new(manager.clone())),
                exporter: Some(Arc::new(SqliteExporter::new(manager.clone(), vector_table))),
                runtime: BackendRuntime::Embedded {
                    manager,
                    vector: config.vector.clone(),
                },
            }
        }
        BackendKind::Server => {
            let pool = server::connect(&config.server).await?;
            let schema = &config.server.schema;
            StorageBackend {
                kind: BackendKind::Server,
                projects: Arc::new(PgProjectStore::new(
                    pool.clone(),
                    schema,
                    &config.vector.table_name,
                )),
                kv: Arc::new(PgKvStore::new(pool.clone(), schema)),
                doc_status: Arc::new(PgDocStatusStore::new(pool.clone(), schema)),
                extraction_cache: Arc::new(PgExtractionCache::new(pool.clone(), schema)),
                vectors: Arc::new(PgVectorStore::new(
                    pool.clone(),
                    schema,
                    config.vector.clone(),
                )),
                graph: Arc::new(PgGraphStore::new(pool.clone(), schema)),
                exporter: None,
                runtime: BackendRuntime::Server {
                    pool,
                    config: config.server.clone(),
                    vector: config.vector.clone(),
                },
            }
        }
    };
    backend.verify_bindings();
    info!(backend = %backend.kind, "storage backend bound");
    Ok(backend)
}

/// Create and initialize in one step.
pub async fn create_and_initialize_storage(config: &StorageConfig) -> Result<StorageBackend> {
    let backend = create_storage(config).await?;
    backend.initialize().await?;
    Ok(backend)
}
