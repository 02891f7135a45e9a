//! Multi-backend, project-isolated storage engine for a RAG knowledge base.
//!
//! Four coordinated data planes per project: a labeled property graph of
//! entities and directed relations, a dense vector index, an opaque
//! key-value store, and document-processing status plus an LLM extraction
//! cache. Each plane is an async contract with two interchangeable
//! implementations: an embedded single-file backend and a server backend.
//!
//! # Example
//! ```ignore
//! let storage = create_and_initialize_storage(&config).await?;
//! let project = storage.projects.create_project("demo").await?;
//! storage.graph.upsert_entity(entity).await?;
//! let hits = storage.vectors.query(&embedding, 10, Some(filter)).await?;
//! ```

#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

mod factory;
pub mod retry;

pub mod embedded;
pub mod server;

pub use factory::{create_and_initialize_storage, create_storage, StorageBackend};

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use ragstore_core::{
    BackendKind, CacheEntry, Document, DocumentStatus, DocumentType, Entity, Error, GraphStats,
    ProcessingStatus, Project, Relation, Result, ScoredVector, Subgraph, VectorEntry,
    VectorFilter,
};

/// Reports which backend family an implementation belongs to, so the factory
/// can verify the binding matches the configured expectation.
pub trait BackendTyped {
    fn backend_kind(&self) -> BackendKind;
}

/// Project and document lifecycle: tenant creation, cascading deletes, and
/// the document-delete recompute of entity/relation source-chunk sets.
#[async_trait]
pub trait ProjectStore: BackendTyped + Send + Sync {
    /// Create a project; the returned row carries a fresh time-ordered id.
    async fn create_project(&self, name: &str) -> Result<Project>;

    async fn get_project(&self, id: Uuid) -> Result<Option<Project>>;

    async fn list_projects(&self) -> Result<Vec<Project>>;

    /// Delete a project and every row it owns across all project-scoped
    /// tables. Fails `ProjectNotFound` when the id is absent.
    async fn delete_project(&self, id: Uuid) -> Result<()>;

    async fn create_document(&self, project_id: Uuid, doc_type: DocumentType) -> Result<Document>;

    async fn get_document(&self, id: Uuid) -> Result<Option<Document>>;

    /// Delete a document, cascading its vectors and the graph rows whose
    /// `document_id` matches. Entities and relations whose source-chunk set
    /// referenced a deleted chunk have the set recomputed; rows whose set
    /// empties are deleted, survivors keep the remainder. Extraction-cache
    /// chunk references are nullified, never cascaded.
    async fn delete_document(&self, project_id: Uuid, document_id: Uuid) -> Result<()>;
}

/// Opaque key-value store with batch operations and glob-pattern lookup.
///
/// Concurrent sets on one key resolve last-completed-write-wins; `set_batch`
/// is transactional.
#[async_trait]
pub trait KvStore: BackendTyped + Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Fetch many keys at once; missing keys are absent from the map.
    async fn get_batch(&self, keys: &[String]) -> Result<HashMap<String, String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn set_batch(&self, entries: &HashMap<String, String>) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<bool>;

    async fn delete_batch(&self, keys: &[String]) -> Result<u64>;

    async fn exists(&self, key: &str) -> Result<bool>;

    async fn len(&self) -> Result<u64>;

    async fn clear(&self) -> Result<()>;

    /// List keys, optionally filtered by a glob pattern where `*` matches
    /// any run and `?` a single character.
    async fn keys(&self, pattern: Option<&str>) -> Result<Vec<String>>;
}

/// Lifecycle table for documents moving through the processing pipeline.
/// State-machine policy is the caller's; the store accepts any transition.
#[async_trait]
pub trait DocStatusStore: BackendTyped + Send + Sync {
    async fn upsert(&self, status: &DocumentStatus) -> Result<()>;

    /// Transactional batch upsert.
    async fn upsert_batch(&self, statuses: &[DocumentStatus]) -> Result<()>;

    async fn get(&self, doc_id: Uuid) -> Result<Option<DocumentStatus>>;

    async fn get_by_status(&self, status: ProcessingStatus) -> Result<Vec<DocumentStatus>>;

    async fn delete(&self, doc_id: Uuid) -> Result<bool>;
}

/// Content-hash-keyed cache of LLM extraction outputs, scoped by project and
/// cache kind, supporting rebuild without re-invoking the model.
#[async_trait]
pub trait ExtractionCache: BackendTyped + Send + Sync {
    /// Upsert on `(project, cache_type, content_hash)`; the id is
    /// regenerated on insert.
    async fn store(
        &self,
        project_id: Uuid,
        cache_type: &str,
        chunk_id: Option<Uuid>,
        content_hash: &str,
        result: &str,
        tokens_used: Option<i64>,
    ) -> Result<CacheEntry>;

    async fn get(
        &self,
        project_id: Uuid,
        cache_type: &str,
        content_hash: &str,
    ) -> Result<Option<CacheEntry>>;

    async fn get_by_chunk(&self, project_id: Uuid, chunk_id: Uuid) -> Result<Vec<CacheEntry>>;

    async fn delete_by_project(&self, project_id: Uuid) -> Result<u64>;

    /// Null the weak chunk back-reference for purged chunks. Entries are
    /// never deleted on chunk disappearance.
    async fn detach_chunks(&self, project_id: Uuid, chunk_ids: &[Uuid]) -> Result<u64>;
}

/// Dense vector index with cosine-similarity queries.
#[async_trait]
pub trait VectorStore: BackendTyped + Send + Sync {
    /// Insert or, on duplicate id, replace vector and metadata.
    async fn upsert(&self, entry: VectorEntry) -> Result<()>;

    /// Chunked batch upsert; each chunk commits before the next so a partial
    /// failure leaves a consistent prefix.
    async fn upsert_batch(&self, entries: Vec<VectorEntry>) -> Result<()>;

    /// Top-k cosine search, sorted by descending score with ties broken by
    /// id order. The embedded backend requires a filter carrying the
    /// project id; `None` on the server backend means no project filter.
    async fn query(
        &self,
        query: &[f32],
        top_k: usize,
        filter: Option<VectorFilter>,
    ) -> Result<Vec<ScoredVector>>;

    async fn get(&self, id: Uuid) -> Result<Option<VectorEntry>>;

    async fn delete(&self, id: Uuid) -> Result<bool>;

    async fn delete_batch(&self, ids: &[Uuid]) -> Result<u64>;

    async fn len(&self) -> Result<u64>;

    async fn clear(&self) -> Result<()>;

    /// Delete entity-type rows whose content is one of the given
    /// (normalized) entity names.
    async fn delete_entity_embeddings(&self, project_id: Uuid, names: &[String]) -> Result<u64>;

    /// Delete chunk-type rows by chunk id.
    async fn delete_chunk_embeddings(&self, project_id: Uuid, chunk_ids: &[Uuid]) -> Result<u64>;

    /// All chunk-row ids belonging to one document.
    async fn get_chunk_ids_by_document(
        &self,
        project_id: Uuid,
        document_id: Uuid,
    ) -> Result<Vec<Uuid>>;

    async fn has_vectors(&self, document_id: Uuid) -> Result<bool>;
}

/// Labeled property graph of entities and directed relations with BFS
/// traversal and shortest-path queries. All name arguments are normalized
/// before matching.
#[async_trait]
pub trait GraphStore: BackendTyped + Send + Sync {
    /// Idempotent per-project graph provisioning.
    async fn create_project_graph(&self, project_id: Uuid) -> Result<()>;

    /// Cascade-delete every graph row of the project. Idempotent.
    async fn delete_project_graph(&self, project_id: Uuid) -> Result<()>;

    /// MERGE on `(project, name)`: properties overwrite on conflict.
    async fn upsert_entity(&self, entity: Entity) -> Result<()>;

    /// Transactional batch variant of [`Self::upsert_entity`].
    async fn upsert_entities(&self, entities: Vec<Entity>) -> Result<()>;

    /// MERGE on `(project, source, target)`. The embedded backend requires
    /// both endpoint entities to exist; the server backend creates missing
    /// endpoints.
    async fn upsert_relation(&self, relation: Relation) -> Result<()>;

    /// Transactional batch variant of [`Self::upsert_relation`].
    async fn upsert_relations(&self, relations: Vec<Relation>) -> Result<()>;

    async fn get_entity(&self, project_id: Uuid, name: &str) -> Result<Option<Entity>>;

    async fn get_entities(&self, project_id: Uuid, names: &[String]) -> Result<Vec<Entity>>;

    async fn get_relation(
        &self,
        project_id: Uuid,
        source: &str,
        target: &str,
    ) -> Result<Option<Relation>>;

    /// Relations touching the entity at either endpoint.
    async fn get_relations_for_entity(&self, project_id: Uuid, name: &str)
        -> Result<Vec<Relation>>;

    async fn get_all_entities(&self, project_id: Uuid) -> Result<Vec<Entity>>;

    async fn get_all_relations(&self, project_id: Uuid) -> Result<Vec<Relation>>;

    /// Page ordered by name.
    async fn get_entities_batch(
        &self,
        project_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Entity>>;

    /// Page ordered by (source, target).
    async fn get_relations_batch(
        &self,
        project_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Relation>>;

    /// Entities whose source-chunk set intersects the given chunk ids.
    async fn get_entities_by_source_chunks(
        &self,
        project_id: Uuid,
        chunk_ids: &[Uuid],
    ) -> Result<Vec<Entity>>;

    /// Relations whose source-chunk set intersects the given chunk ids.
    async fn get_relations_by_source_chunks(
        &self,
        project_id: Uuid,
        chunk_ids: &[Uuid],
    ) -> Result<Vec<Relation>>;

    /// Undirected degree per name, resolved in grouped-query chunks of
    /// `batch_size`.
    async fn node_degrees_batch(
        &self,
        project_id: Uuid,
        names: &[String],
        batch_size: usize,
    ) -> Result<HashMap<String, u64>>;

    async fn delete_entity(&self, project_id: Uuid, name: &str) -> Result<bool>;

    async fn delete_relation(&self, project_id: Uuid, source: &str, target: &str) -> Result<bool>;

    async fn delete_entities(&self, project_id: Uuid, names: &[String]) -> Result<u64>;

    async fn delete_relations(&self, project_id: Uuid, pairs: &[(String, String)]) -> Result<u64>;

    /// Delete every graph row attributed to a document, relations first.
    async fn delete_by_source_id(&self, project_id: Uuid, document_id: Uuid) -> Result<u64>;

    /// Level-synchronous BFS over the undirected projection. The start node
    /// is visited at depth 0; traversal stops when the frontier empties,
    /// depth reaches `max_depth`, or (for `max_nodes > 0`) the visited count
    /// reaches `max_nodes`. Each edge appears once in the result.
    async fn traverse_bfs(
        &self,
        project_id: Uuid,
        start: &str,
        max_depth: usize,
        max_nodes: usize,
    ) -> Result<Subgraph>;

    /// [`Self::traverse_bfs`] without a node cap.
    async fn traverse(&self, project_id: Uuid, start: &str, max_depth: usize) -> Result<Subgraph> {
        self.traverse_bfs(project_id, start, max_depth, 0).await
    }

    /// Undirected BFS shortest path, materialized as the ordered node list.
    /// Empty when either endpoint is absent or no path exists.
    async fn find_shortest_path(
        &self,
        project_id: Uuid,
        source: &str,
        target: &str,
    ) -> Result<Vec<Entity>>;

    async fn get_stats(&self, project_id: Uuid) -> Result<GraphStats>;
}

/// Serializes one project's full state to a portable single-file artifact
/// and back. Bound only by the embedded backend; the artifact schema is the
/// embedded layout at the current migration version.
#[async_trait]
pub trait ProjectExporter: Send + Sync {
    /// Snapshot `project_id` into a fresh database file at `dst_path`,
    /// preserving row ids. Any pre-existing file is replaced; a partial
    /// file is removed on failure.
    async fn export_project(&self, project_id: Uuid, dst_path: &Path) -> Result<()>;

    /// Load a snapshot as `new_project_id`, rewriting every row's project
    /// id and regenerating primary ids.
    async fn import_project(&self, src_path: &Path, new_project_id: Uuid) -> Result<()>;
}

/// Race `future` against a caller-imposed deadline; on expiry the operation
/// fails with [`Error::OperationTimeout`]. Work already dispatched to the
/// database runs to completion there, but its result is discarded.
pub async fn with_timeout<T, F>(operation: &str, deadline: Duration, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(deadline, future).await {
        Ok(result) => result,
        Err(_) => Err(Error::OperationTimeout {
            operation: operation.to_string(),
        }),
    }
}
