//! Data model shared by every storage backend.
//!
//! All identifiers are 128-bit time-ordered UUIDs (see [`crate::ids`]).
//! Entity and relation names are stored case-normalized wherever they act as
//! deduplication keys (see [`crate::normalize`]).

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

/// A tenant boundary. Every other project-scoped record carries this row's id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Kind of source artifact a document was ingested from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum DocumentType {
    #[default]
    Text,
    Code,
    Markdown,
    Unknown,
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "TEXT"),
            Self::Code => write!(f, "CODE"),
            Self::Markdown => write!(f, "MARKDOWN"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl FromStr for DocumentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TEXT" => Ok(Self::Text),
            "CODE" => Ok(Self::Code),
            "MARKDOWN" => Ok(Self::Markdown),
            "UNKNOWN" => Ok(Self::Unknown),
            _ => Err(Error::invalid_id(format!("unknown document type: {s}"))),
        }
    }
}

/// A source artifact owned by a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub project_id: Uuid,
    pub doc_type: DocumentType,
    pub status: ProcessingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Document lifecycle state. Transitions move forward except that FAILED may
/// re-enter PROCESSING on retry; the policy is the caller's, the store
/// accepts any transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProcessingStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Processing => write!(f, "PROCESSING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

impl FromStr for ProcessingStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            _ => Err(Error::invalid_id(format!("unknown processing status: {s}"))),
        }
    }
}

/// A graph node. `(project_id, name)` is unique; `name` is normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub entity_type: String,
    pub description: String,
    pub document_id: Option<Uuid>,
    /// Ordered chunk ids attesting which chunks contributed to this entity
    pub source_chunk_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fixed tag carried by every relation edge.
pub const RELATION_TYPE: &str = "RELATED_TO";

/// A directed graph edge. `(project_id, source_entity, target_entity)` is
/// unique; endpoint names are normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub id: Uuid,
    pub project_id: Uuid,
    pub source_entity: String,
    pub target_entity: String,
    pub relation_type: String,
    pub description: String,
    pub keywords: String,
    pub weight: f64,
    pub document_id: Option<Uuid>,
    pub source_chunk_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Relation {
    /// Undirected edge key used by traversals and set deletes.
    pub fn edge_key(&self) -> String {
        format!("{}\u{2192}{}", self.source_entity, self.target_entity)
    }
}

/// What a vector row embeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorEntryType {
    Chunk,
    Entity,
}

impl std::fmt::Display for VectorEntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chunk => write!(f, "chunk"),
            Self::Entity => write!(f, "entity"),
        }
    }
}

impl FromStr for VectorEntryType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chunk" => Ok(Self::Chunk),
            "entity" => Ok(Self::Entity),
            _ => Err(Error::invalid_id(format!("unknown vector entry type: {s}"))),
        }
    }
}

/// An embedding row of the configured fixed dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorEntry {
    pub id: Uuid,
    pub project_id: Uuid,
    pub entry_type: VectorEntryType,
    /// The chunk text or the entity name this vector embeds
    pub content: String,
    pub vector: Vec<f32>,
    pub document_id: Option<Uuid>,
    pub chunk_index: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// A vector entry with its similarity score from a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredVector {
    pub entry: VectorEntry,
    pub score: f32,
}

/// Query-time filter. `project_id` is mandatory on the embedded backend; a
/// `None` filter on the server backend means no project filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorFilter {
    pub project_id: Uuid,
    pub entry_type: Option<VectorEntryType>,
    pub ids: Option<Vec<Uuid>>,
}

impl VectorFilter {
    pub fn project(project_id: Uuid) -> Self {
        Self {
            project_id,
            entry_type: None,
            ids: None,
        }
    }

    pub fn with_type(mut self, entry_type: VectorEntryType) -> Self {
        self.entry_type = Some(entry_type);
        self
    }

    pub fn with_ids(mut self, ids: Vec<Uuid>) -> Self {
        self.ids = Some(ids);
        self
    }
}

/// Per-document processing bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentStatus {
    pub doc_id: Uuid,
    pub status: ProcessingStatus,
    pub chunk_count: i64,
    pub entity_count: i64,
    pub relation_count: i64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A cached LLM extraction output keyed by content hash.
///
/// `chunk_id` is a weak back reference: deleting the chunk nulls the field
/// but never deletes the cache entry, so a rebuild can skip re-invoking the
/// model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub id: Uuid,
    pub project_id: Uuid,
    pub cache_type: String,
    pub chunk_id: Option<Uuid>,
    pub content_hash: String,
    pub result: String,
    pub tokens_used: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Result of a BFS traversal: the visited nodes and each edge seen once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subgraph {
    pub entities: Vec<Entity>,
    pub relations: Vec<Relation>,
}

/// Aggregate counts for one project's graph.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub entity_count: u64,
    pub relation_count: u64,
    /// `2 * relations / entities`; 0 when the graph is empty
    pub avg_degree: f64,
}

impl GraphStats {
    pub fn new(entity_count: u64, relation_count: u64) -> Self {
        let avg_degree = if entity_count == 0 {
            0.0
        } else {
            2.0 * relation_count as f64 / entity_count as f64
        };
        Self {
            entity_count,
            relation_count,
            avg_degree,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_display() {
        for status in [
            ProcessingStatus::Pending,
            ProcessingStatus::Processing,
            ProcessingStatus::Completed,
            ProcessingStatus::Failed,
        ] {
            assert_eq!(status.to_string().parse::<ProcessingStatus>().unwrap(), status);
        }
    }

    #[test]
    fn unknown_status_rejected() {
        assert!("DONE".parse::<ProcessingStatus>().is_err());
    }

    #[test]
    fn avg_degree_counts_both_endpoints() {
        let stats = GraphStats::new(4, 6);
        assert!((stats.avg_degree - 3.0).abs() < f64::EPSILON);
        assert_eq!(GraphStats::new(0, 0).avg_degree, 0.0);
    }
}
