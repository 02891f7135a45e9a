//! Core types and configuration for the ragstore knowledge-base storage
//! substrate.
//!
//! This crate provides the foundational pieces shared by every storage
//! backend:
//!
//! - **Types**: projects, documents, graph entities/relations, vector
//!   entries, processing status, extraction-cache entries
//! - **Configuration**: backend selection and tuning knobs
//! - **Error handling**: unified error type
//! - **Identity**: time-ordered and deterministic UUID generation, name
//!   normalization, content hashing

#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

pub mod config;
pub mod embedding;
pub mod error;
pub mod hashing;
pub mod ids;
pub mod normalize;
pub mod types;

pub use config::{
    BackendKind, EmbeddedConfig, ServerConfig, StorageConfig, TempStore, VectorConfig,
    VectorIndexConfig, VectorIndexKind,
};
pub use error::{Error, Result, ResultExt};
pub use types::{
    CacheEntry, Document, DocumentStatus, DocumentType, Entity, GraphStats, ProcessingStatus,
    Project, Relation, ScoredVector, Subgraph, VectorEntry, VectorEntryType, VectorFilter,
};
