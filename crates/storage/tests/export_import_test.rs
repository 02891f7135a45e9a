//! Integration tests for the project export/import round trip.

mod common;

use std::collections::HashSet;

use anyhow::Result;
use pretty_assertions::assert_eq;
use uuid::Uuid;

use common::{chunk_vector, embedded_backend, test_entity, test_relation};
use ragstore_core::hashing::content_hash;
use ragstore_core::{ids, DocumentType, Error, VectorFilter};

#[tokio::test]
async fn export_import_round_trip_with_fresh_ids() -> Result<()> {
    let (dir, storage) = embedded_backend(4).await?;
    let exporter = storage.exporter.as_ref().expect("embedded exporter");
    let project = storage.projects.create_project("origin").await?;
    let document = storage
        .projects
        .create_document(project.id, DocumentType::Text)
        .await?;

    let names: Vec<String> = (0..10).map(|i| format!("entity-{i:02}")).collect();
    let entities: Vec<_> = names
        .iter()
        .map(|n| test_entity(project.id, n, "T", "original"))
        .collect();
    let original_ids: HashSet<Uuid> = entities.iter().map(|e| e.id).collect();
    storage.graph.upsert_entities(entities).await?;
    storage
        .graph
        .upsert_relation(test_relation(project.id, "entity-00", "entity-01"))
        .await?;

    let mut chunk = chunk_vector(project.id, "chunk", vec![1.0, 0.0, 0.0, 0.0]);
    chunk.document_id = Some(document.id);
    storage.vectors.upsert(chunk).await?;
    storage
        .extraction_cache
        .store(project.id, "kind", None, &content_hash("chunk"), "r", Some(7))
        .await?;
    // Shared planes are not part of the artifact.
    storage.kv.set("shared", "not-exported").await?;

    let artifact = dir.path().join("origin.snapshot.db");
    exporter.export_project(project.id, &artifact).await?;
    assert!(artifact.exists());

    let new_project_id = ids::new_id();
    exporter.import_project(&artifact, new_project_id).await?;

    // The source project is untouched and keeps its original ids.
    let originals = storage.graph.get_all_entities(project.id).await?;
    assert_eq!(originals.len(), 10);
    assert!(originals.iter().all(|e| original_ids.contains(&e.id)));

    // The imported project has equal counts, fresh ids, and the new scope.
    let imported = storage.graph.get_all_entities(new_project_id).await?;
    assert_eq!(imported.len(), 10);
    assert!(imported.iter().all(|e| e.project_id == new_project_id));
    assert!(imported.iter().all(|e| !original_ids.contains(&e.id)));
    assert_eq!(
        storage.graph.get_all_relations(new_project_id).await?.len(),
        1
    );

    let hits = storage
        .vectors
        .query(
            &[1.0, 0.0, 0.0, 0.0],
            10,
            Some(VectorFilter::project(new_project_id)),
        )
        .await?;
    assert_eq!(hits.len(), 1);

    let cached = storage
        .extraction_cache
        .get(new_project_id, "kind", &content_hash("chunk"))
        .await?
        .expect("cache row imported");
    assert_eq!(cached.tokens_used, Some(7));

    let imported_project = storage
        .projects
        .get_project(new_project_id)
        .await?
        .expect("imported project row");
    assert_eq!(imported_project.name, "origin");
    Ok(())
}

#[tokio::test]
async fn export_unknown_project_fails_without_artifact() -> Result<()> {
    let (dir, storage) = embedded_backend(4).await?;
    let exporter = storage.exporter.as_ref().expect("embedded exporter");

    let artifact = dir.path().join("missing.snapshot.db");
    let err = exporter
        .export_project(ids::new_id(), &artifact)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ProjectNotFound(_)));
    assert!(!artifact.exists(), "no partial artifact left behind");
    Ok(())
}

#[tokio::test]
async fn export_replaces_existing_file() -> Result<()> {
    let (dir, storage) = embedded_backend(4).await?;
    let exporter = storage.exporter.as_ref().expect("embedded exporter");
    let project = storage.projects.create_project("p").await?;
    storage
        .graph
        .upsert_entity(test_entity(project.id, "solo", "T", ""))
        .await?;

    let artifact = dir.path().join("snapshot.db");
    std::fs::write(&artifact, b"stale bytes")?;
    exporter.export_project(project.id, &artifact).await?;

    let new_id = ids::new_id();
    exporter.import_project(&artifact, new_id).await?;
    assert_eq!(storage.graph.get_all_entities(new_id).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn import_rejects_missing_or_empty_snapshot() -> Result<()> {
    let (dir, storage) = embedded_backend(4).await?;
    let exporter = storage.exporter.as_ref().expect("embedded exporter");

    let err = exporter
        .import_project(&dir.path().join("nope.db"), ids::new_id())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Storage(_)));
    Ok(())
}
