//! Shared helpers for the storage integration tests.
#![allow(dead_code)]

use anyhow::Result;
use chrono::Utc;
use tempfile::TempDir;
use uuid::Uuid;

use ragstore_core::{ids, Entity, Relation, StorageConfig, VectorEntry, VectorEntryType};
use ragstore_storage::{create_and_initialize_storage, StorageBackend};

/// Fresh embedded backend on a temp directory. Keep the `TempDir` alive for
/// the duration of the test.
pub async fn embedded_backend(dimension: usize) -> Result<(TempDir, StorageBackend)> {
    let dir = TempDir::new()?;
    let config = embedded_config(&dir, dimension);
    let backend = create_and_initialize_storage(&config).await?;
    Ok((dir, backend))
}

pub fn embedded_config(dir: &TempDir, dimension: usize) -> StorageConfig {
    let mut config = StorageConfig::default();
    config.embedded.path = dir.path().join("store.db");
    config.vector.dimension = dimension;
    config
}

pub fn test_entity(project_id: Uuid, name: &str, entity_type: &str, description: &str) -> Entity {
    Entity {
        id: ids::new_id(),
        project_id,
        name: name.to_string(),
        entity_type: entity_type.to_string(),
        description: description.to_string(),
        document_id: None,
        source_chunk_ids: Vec::new(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn test_relation(project_id: Uuid, source: &str, target: &str) -> Relation {
    Relation {
        id: ids::new_id(),
        project_id,
        source_entity: source.to_string(),
        target_entity: target.to_string(),
        relation_type: "RELATED_TO".to_string(),
        description: String::new(),
        keywords: String::new(),
        weight: 1.0,
        document_id: None,
        source_chunk_ids: Vec::new(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn chunk_vector(project_id: Uuid, content: &str, vector: Vec<f32>) -> VectorEntry {
    VectorEntry {
        id: ids::new_id(),
        project_id,
        entry_type: VectorEntryType::Chunk,
        content: content.to_string(),
        vector,
        document_id: None,
        chunk_index: None,
        created_at: Utc::now(),
    }
}
