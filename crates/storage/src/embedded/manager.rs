//! Connection manager for the embedded single-file database.
//!
//! One writer, many readers: the write connection is gated by an async
//! mutex, readers come from a bounded pool of idle connections. Statement
//! work always runs on the blocking pool with the connection moved into the
//! closure and returned on every exit path, so a cancelled caller can never
//! leak a connection or hold the write gate.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex as StdMutex;

use rusqlite::Connection;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use ragstore_core::{EmbeddedConfig, Error, Result, ResultExt, TempStore, VectorConfig};

use super::extensions::ExtensionLoader;
use super::migrations;

/// Error channel for store closures: driver failures convert implicitly so
/// `?` stays terse, domain errors pass through untouched.
pub(crate) enum OpError {
    Sqlite(rusqlite::Error),
    Domain(Error),
}

impl From<rusqlite::Error> for OpError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Sqlite(e)
    }
}

impl From<Error> for OpError {
    fn from(e: Error) -> Self {
        Self::Domain(e)
    }
}

pub(crate) type OpResult<T> = std::result::Result<T, OpError>;

fn map_op(operation: &str, busy_timeout_ms: u64, e: OpError) -> Error {
    match e {
        OpError::Sqlite(e) => map_sqlite(operation, busy_timeout_ms, e),
        OpError::Domain(e) => e,
    }
}

/// Map a driver error to the engine error model. Busy/locked failures become
/// `LockTimeout` carrying the operation name and the configured wait;
/// constraint violations become `DuplicateKey` so upsert paths can swallow
/// them.
fn map_sqlite(operation: &str, busy_timeout_ms: u64, e: rusqlite::Error) -> Error {
    match &e {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == rusqlite::ErrorCode::DatabaseBusy
                || failure.code == rusqlite::ErrorCode::DatabaseLocked =>
        {
            Error::LockTimeout {
                operation: operation.to_string(),
                waited_ms: busy_timeout_ms,
            }
        }
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Error::DuplicateKey(format!("{operation}: {e}"))
        }
        _ => Error::Storage(format!("{operation}: {e}")),
    }
}

pub struct ConnectionManager {
    path: PathBuf,
    config: EmbeddedConfig,
    /// Idle pooled readers, at most `read_pool_size`
    readers: StdMutex<Vec<Connection>>,
    /// Serializes writers; held across the blocking call
    write_gate: AsyncMutex<()>,
    /// The single write connection, present once initialized
    write_conn: StdMutex<Option<Connection>>,
    initialized: AtomicBool,
    closed: AtomicBool,
}

impl ConnectionManager {
    pub fn new(config: EmbeddedConfig) -> Self {
        Self {
            path: config.path.clone(),
            config,
            readers: StdMutex::new(Vec::new()),
            write_gate: AsyncMutex::new(()),
            write_conn: StdMutex::new(None),
            initialized: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Open the database, load native extensions when an external directory
    /// is configured, and bring the schema to the latest version. Must
    /// complete before any store serves requests.
    pub async fn initialize(&self, vector: &VectorConfig) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ManagerClosed);
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let config = self.config.clone();
        let vector = vector.clone();
        let path = self.path.clone();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection> {
            let mut conn = open_connection(&path, &config, false)?;
            if let Some(dir) = &config.extensions_path {
                ExtensionLoader::new(dir.clone()).load_all(&conn)?;
            }
            let applied = migrations::migrate_to_latest(&mut conn)?;
            if applied > 0 {
                debug!(applied, "applied embedded schema migrations");
            }
            migrations::ensure_vector_table(&conn, &vector.table_name)?;
            Ok(conn)
        })
        .await
        .op_context("initialize")??;

        let _gate = self.write_gate.lock().await;
        *self.write_conn.lock().map_err(|_| Error::storage("initialize: poisoned lock"))? =
            Some(conn);
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ManagerClosed);
        }
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(Error::NotInitialized);
        }
        Ok(())
    }

    /// Run a read-only closure on a pooled (or freshly opened) connection.
    pub(crate) async fn with_read<T, F>(&self, operation: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> OpResult<T> + Send + 'static,
        T: Send + 'static,
    {
        self.ensure_ready()?;
        let conn = match self.pop_reader()? {
            Some(conn) => conn,
            None => {
                let path = self.path.clone();
                let config = self.config.clone();
                tokio::task::spawn_blocking(move || open_connection(&path, &config, true))
                    .await
                    .op_context(operation)??
            }
        };

        let busy_timeout = self.config.busy_timeout_ms;
        let (conn, result) = tokio::task::spawn_blocking(move || {
            let result = f(&conn);
            (conn, result)
        })
        .await
        .op_context(operation)?;

        self.push_reader(conn)?;
        result.map_err(|e| map_op(operation, busy_timeout, e))
    }

    /// Run a write closure on the single write connection, holding the
    /// write gate for the duration. The guard releases on every exit path.
    pub(crate) async fn with_write<T, F>(&self, operation: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> OpResult<T> + Send + 'static,
        T: Send + 'static,
    {
        self.ensure_ready()?;
        let _gate = self.write_gate.lock().await;
        let mut conn = self
            .write_conn
            .lock()
            .map_err(|_| Error::storage("poisoned write slot"))?
            .take()
            .ok_or(Error::ManagerClosed)?;

        let busy_timeout = self.config.busy_timeout_ms;
        let (conn, result) = tokio::task::spawn_blocking(move || {
            let result = f(&mut conn);
            (conn, result)
        })
        .await
        .op_context(operation)?;

        *self
            .write_conn
            .lock()
            .map_err(|_| Error::storage("poisoned write slot"))? = Some(conn);
        result.map_err(|e| map_op(operation, busy_timeout, e))
    }

    /// Shut down: close pooled readers and the write connection. Further
    /// acquisitions fail `ManagerClosed`.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let _gate = self.write_gate.lock().await;
        if let Ok(mut slot) = self.write_conn.lock() {
            slot.take();
        }
        if let Ok(mut readers) = self.readers.lock() {
            let drained = readers.len();
            readers.clear();
            if drained > 0 {
                debug!(drained, "closed pooled read connections");
            }
        }
        Ok(())
    }

    fn pop_reader(&self) -> Result<Option<Connection>> {
        Ok(self
            .readers
            .lock()
            .map_err(|_| Error::storage("poisoned reader pool"))?
            .pop())
    }

    fn push_reader(&self, conn: Connection) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        let mut readers = self
            .readers
            .lock()
            .map_err(|_| Error::storage("poisoned reader pool"))?;
        if readers.len() < self.config.read_pool_size {
            readers.push(conn);
        }
        Ok(())
    }
}

fn open_connection(
    path: &std::path::Path,
    config: &EmbeddedConfig,
    read_only: bool,
) -> Result<Connection> {
    let conn = Connection::open(path)
        .map_err(|e| Error::storage(format!("open {}: {e}", path.display())))?;
    apply_pragmas(&conn, config, read_only)
        .map_err(|e| Error::storage(format!("pragmas on {}: {e}", path.display())))?;
    Ok(conn)
}

/// Performance and integrity pragmas, applied to every new connection.
fn apply_pragmas(
    conn: &Connection,
    config: &EmbeddedConfig,
    read_only: bool,
) -> rusqlite::Result<()> {
    conn.pragma_update(None, "busy_timeout", config.busy_timeout_ms as i64)?;
    conn.pragma_update(None, "foreign_keys", true)?;
    if config.wal_mode {
        // journal_mode returns the resulting mode as a row
        let mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        if !mode.eq_ignore_ascii_case("wal") {
            warn!(mode, "WAL journal mode not honored");
        }
    }
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "mmap_size", config.mmap_size)?;
    conn.pragma_update(None, "cache_size", config.cache_size)?;
    let temp_store = match config.temp_store {
        TempStore::Memory => "MEMORY",
        TempStore::File => "FILE",
    };
    conn.pragma_update(None, "temp_store", temp_store)?;
    if read_only {
        conn.pragma_update(None, "query_only", true)?;
    }
    Ok(())
}
