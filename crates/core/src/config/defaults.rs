//! Default values and functions for configuration

use std::path::PathBuf;

pub(crate) const DEFAULT_EMBEDDED_PATH: &str = "./data/store.db";
pub(crate) const DEFAULT_SERVER_HOST: &str = "localhost";
pub(crate) const DEFAULT_SERVER_DATABASE: &str = "ragstore";
pub(crate) const DEFAULT_SERVER_USER: &str = "ragstore";
pub(crate) const DEFAULT_SERVER_PASSWORD: &str = "ragstore";
pub(crate) const DEFAULT_SERVER_SCHEMA: &str = "ragstore";
pub(crate) const DEFAULT_VECTOR_TABLE: &str = "vectors";

pub(crate) fn default_embedded_path() -> PathBuf {
    PathBuf::from(DEFAULT_EMBEDDED_PATH)
}

pub(crate) fn default_read_pool_size() -> usize {
    4
}

pub(crate) fn default_busy_timeout_ms() -> u64 {
    30_000
}

pub(crate) fn default_wal_mode() -> bool {
    true
}

pub(crate) fn default_mmap_size() -> i64 {
    // 256 MiB memory map
    268_435_456
}

pub(crate) fn default_cache_size() -> i64 {
    // Negative values are KiB per the SQLite pragma convention
    -16_384
}

pub(crate) fn default_server_host() -> String {
    DEFAULT_SERVER_HOST.to_string()
}

pub(crate) fn default_server_port() -> u16 {
    5432
}

pub(crate) fn default_server_database() -> String {
    DEFAULT_SERVER_DATABASE.to_string()
}

pub(crate) fn default_server_user() -> String {
    DEFAULT_SERVER_USER.to_string()
}

pub(crate) fn default_server_password() -> String {
    DEFAULT_SERVER_PASSWORD.to_string()
}

pub(crate) fn default_server_pool_size() -> u32 {
    10
}

pub(crate) fn default_server_schema() -> String {
    DEFAULT_SERVER_SCHEMA.to_string()
}

pub(crate) fn default_vector_dimension() -> usize {
    768
}

pub(crate) fn default_vector_table_name() -> String {
    DEFAULT_VECTOR_TABLE.to_string()
}

pub(crate) fn default_hnsw_m() -> u32 {
    16
}

pub(crate) fn default_hnsw_ef_construction() -> u32 {
    64
}

pub(crate) fn default_ivfflat_lists() -> u32 {
    100
}

pub(crate) fn default_upsert_batch_size() -> usize {
    500
}
