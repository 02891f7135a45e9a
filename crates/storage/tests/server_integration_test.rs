//! Integration tests for the server backend.
//!
//! These need a reachable PostgreSQL with the vector extension available,
//! e.g. `docker run -p 5432:5432 -e POSTGRES_PASSWORD=ragstore pgvector/pgvector:pg16`.

mod common;

use anyhow::Result;
use pretty_assertions::assert_eq;

use common::{chunk_vector, test_entity, test_relation};
use ragstore_core::{BackendKind, StorageConfig, VectorFilter};
use ragstore_storage::{create_and_initialize_storage, StorageBackend};

async fn server_backend(dimension: usize) -> Result<StorageBackend> {
    let mut config = StorageConfig::default();
    config.backend = BackendKind::Server;
    config.vector.dimension = dimension;
    if let Ok(host) = std::env::var("RAGSTORE_TEST_PG_HOST") {
        config.server.host = host;
    }
    if let Ok(password) = std::env::var("RAGSTORE_TEST_PG_PASSWORD") {
        config.server.password = password;
    }
    Ok(create_and_initialize_storage(&config).await?)
}

#[tokio::test]
#[ignore = "Requires PostgreSQL with the vector extension"]
async fn server_binds_without_exporter() -> Result<()> {
    let storage = server_backend(4).await?;
    assert_eq!(storage.kind, BackendKind::Server);
    assert!(storage.exporter.is_none());
    Ok(())
}

#[tokio::test]
#[ignore = "Requires PostgreSQL with the vector extension"]
async fn server_vector_round_trip_and_query() -> Result<()> {
    let storage = server_backend(4).await?;
    let project = storage.projects.create_project("pg-vectors").await?;

    let a = chunk_vector(project.id, "A", vec![1.0, 0.0, 0.0, 0.0]);
    let b = chunk_vector(project.id, "B", vec![0.0, 1.0, 0.0, 0.0]);
    storage.vectors.upsert(a.clone()).await?;
    storage.vectors.upsert(b).await?;

    let fetched = storage.vectors.get(a.id).await?.expect("row exists");
    assert_eq!(fetched.vector, vec![1.0, 0.0, 0.0, 0.0]);

    let hits = storage
        .vectors
        .query(
            &[1.0, 0.0, 0.0, 0.0],
            2,
            Some(VectorFilter::project(project.id)),
        )
        .await?;
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].entry.content, "A");
    assert!(hits[0].score >= 1.0 - 1e-5);

    storage.projects.delete_project(project.id).await?;
    Ok(())
}

#[tokio::test]
#[ignore = "Requires PostgreSQL with the vector extension"]
async fn server_relation_upsert_creates_endpoints() -> Result<()> {
    let storage = server_backend(4).await?;
    let project = storage.projects.create_project("pg-graph").await?;

    // No endpoint entities were created beforehand: the server backend
    // MERGEs them into existence.
    storage
        .graph
        .upsert_relation(test_relation(project.id, "Alpha", "Beta"))
        .await?;

    let alpha = storage
        .graph
        .get_entity(project.id, "alpha")
        .await?
        .expect("implicit endpoint");
    assert_eq!(alpha.entity_type, "UNKNOWN");
    assert!(storage.graph.get_entity(project.id, "beta").await?.is_some());

    let stats = storage.graph.get_stats(project.id).await?;
    assert_eq!(stats.entity_count, 2);
    assert_eq!(stats.relation_count, 1);

    storage.projects.delete_project(project.id).await?;
    Ok(())
}

#[tokio::test]
#[ignore = "Requires PostgreSQL with the vector extension"]
async fn server_project_delete_cascades() -> Result<()> {
    let storage = server_backend(4).await?;
    let project = storage.projects.create_project("pg-cascade").await?;

    storage
        .graph
        .upsert_entities(vec![
            test_entity(project.id, "x", "T", ""),
            test_entity(project.id, "y", "T", ""),
        ])
        .await?;
    storage
        .graph
        .upsert_relation(test_relation(project.id, "x", "y"))
        .await?;
    storage
        .vectors
        .upsert(chunk_vector(project.id, "c", vec![1.0, 0.0, 0.0, 0.0]))
        .await?;

    storage.projects.delete_project(project.id).await?;

    assert!(storage.projects.get_project(project.id).await?.is_none());
    assert_eq!(storage.graph.get_stats(project.id).await?.entity_count, 0);
    let hits = storage
        .vectors
        .query(
            &[1.0, 0.0, 0.0, 0.0],
            10,
            Some(VectorFilter::project(project.id)),
        )
        .await?;
    assert!(hits.is_empty());
    Ok(())
}
