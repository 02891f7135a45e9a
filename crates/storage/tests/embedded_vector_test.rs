//! Integration tests for the embedded vector store.

mod common;

use anyhow::Result;
use pretty_assertions::assert_eq;
use uuid::Uuid;

use ragstore_core::{ids, Error, VectorEntryType, VectorFilter};
use common::{chunk_vector, embedded_backend};

#[tokio::test]
async fn upsert_get_round_trip_is_bit_exact() -> Result<()> {
    let (_dir, storage) = embedded_backend(4).await?;
    let project = storage.projects.create_project("p").await?;

    let entry = chunk_vector(project.id, "hello chunk", vec![0.1, -0.2, 0.3, 123.456]);
    storage.vectors.upsert(entry.clone()).await?;

    let fetched = storage.vectors.get(entry.id).await?.expect("entry exists");
    assert_eq!(fetched.vector.len(), 4);
    for (a, b) in entry.vector.iter().zip(fetched.vector.iter()) {
        assert_eq!(a.to_bits(), b.to_bits());
    }
    assert_eq!(fetched.content, "hello chunk");
    Ok(())
}

#[tokio::test]
async fn dimension_mismatch_is_rejected() -> Result<()> {
    let (_dir, storage) = embedded_backend(4).await?;
    let project = storage.projects.create_project("p").await?;

    let entry = chunk_vector(project.id, "short", vec![1.0, 0.0]);
    let err = storage.vectors.upsert(entry).await.unwrap_err();
    assert!(matches!(
        err,
        Error::DimensionMismatch {
            expected: 4,
            actual: 2
        }
    ));
    Ok(())
}

#[tokio::test]
async fn top_k_query_orders_by_score() -> Result<()> {
    let (_dir, storage) = embedded_backend(4).await?;
    let project = storage.projects.create_project("p").await?;

    let a = chunk_vector(project.id, "A", vec![1.0, 0.0, 0.0, 0.0]);
    let b = chunk_vector(project.id, "B", vec![0.0, 1.0, 0.0, 0.0]);
    storage.vectors.upsert(a.clone()).await?;
    storage.vectors.upsert(b.clone()).await?;

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
    assert_eq!(hits[1].entry.content, "B");
    assert!(hits[1].score.abs() < 1e-5);
    Ok(())
}

#[tokio::test]
async fn ties_break_by_id_order() -> Result<()> {
    let (_dir, storage) = embedded_backend(4).await?;
    let project = storage.projects.create_project("p").await?;

    // Same direction, different magnitude: identical cosine scores.
    let mut entries = Vec::new();
    for i in 0..4 {
        let entry = chunk_vector(
            project.id,
            &format!("tied-{i}"),
            vec![(i + 1) as f32, 0.0, 0.0, 0.0],
        );
        entries.push(entry.clone());
        storage.vectors.upsert(entry).await?;
    }

    let hits = storage
        .vectors
        .query(
            &[1.0, 0.0, 0.0, 0.0],
            4,
            Some(VectorFilter::project(project.id)),
        )
        .await?;
    let ids: Vec<Uuid> = hits.iter().map(|h| h.entry.id).collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted, "equal scores fall back to id order");
    Ok(())
}

#[tokio::test]
async fn query_requires_project_filter() -> Result<()> {
    let (_dir, storage) = embedded_backend(4).await?;
    let err = storage
        .vectors
        .query(&[1.0, 0.0, 0.0, 0.0], 5, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Storage(_)));
    Ok(())
}

#[tokio::test]
async fn project_isolation_holds_on_query_paths() -> Result<()> {
    let (_dir, storage) = embedded_backend(4).await?;
    let p1 = storage.projects.create_project("p1").await?;
    let p2 = storage.projects.create_project("p2").await?;

    storage
        .vectors
        .upsert(chunk_vector(p1.id, "p1-chunk", vec![1.0, 0.0, 0.0, 0.0]))
        .await?;
    storage
        .vectors
        .upsert(chunk_vector(p2.id, "p2-chunk", vec![1.0, 0.0, 0.0, 0.0]))
        .await?;

    let hits = storage
        .vectors
        .query(
            &[1.0, 0.0, 0.0, 0.0],
            10,
            Some(VectorFilter::project(p1.id)),
        )
        .await?;
    assert_eq!(hits.len(), 1);
    assert!(hits.iter().all(|h| h.entry.project_id == p1.id));
    Ok(())
}

#[tokio::test]
async fn type_and_id_filters_narrow_the_scan() -> Result<()> {
    let (_dir, storage) = embedded_backend(4).await?;
    let project = storage.projects.create_project("p").await?;

    let chunk = chunk_vector(project.id, "chunk", vec![1.0, 0.0, 0.0, 0.0]);
    let mut entity = chunk_vector(project.id, "entity-name", vec![1.0, 0.0, 0.0, 0.0]);
    entity.entry_type = VectorEntryType::Entity;
    storage.vectors.upsert(chunk.clone()).await?;
    storage.vectors.upsert(entity.clone()).await?;

    let filter = VectorFilter::project(project.id).with_type(VectorEntryType::Entity);
    let hits = storage
        .vectors
        .query(&[1.0, 0.0, 0.0, 0.0], 10, Some(filter))
        .await?;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].entry.entry_type, VectorEntryType::Entity);

    let filter = VectorFilter::project(project.id).with_ids(vec![chunk.id]);
    let hits = storage
        .vectors
        .query(&[1.0, 0.0, 0.0, 0.0], 10, Some(filter))
        .await?;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].entry.id, chunk.id);
    Ok(())
}

#[tokio::test]
async fn upsert_on_same_id_replaces_vector_and_metadata() -> Result<()> {
    let (_dir, storage) = embedded_backend(4).await?;
    let project = storage.projects.create_project("p").await?;

    let mut entry = chunk_vector(project.id, "v1", vec![1.0, 0.0, 0.0, 0.0]);
    storage.vectors.upsert(entry.clone()).await?;
    entry.content = "v2".to_string();
    entry.vector = vec![0.0, 1.0, 0.0, 0.0];
    storage.vectors.upsert(entry.clone()).await?;

    assert_eq!(storage.vectors.len().await?, 1);
    let fetched = storage.vectors.get(entry.id).await?.expect("exists");
    assert_eq!(fetched.content, "v2");
    assert_eq!(fetched.vector, vec![0.0, 1.0, 0.0, 0.0]);
    Ok(())
}

#[tokio::test]
async fn batch_upsert_and_targeted_deletes() -> Result<()> {
    let (_dir, storage) = embedded_backend(4).await?;
    let project = storage.projects.create_project("p").await?;
    let document = storage
        .projects
        .create_document(project.id, ragstore_core::DocumentType::Text)
        .await?;

    let mut entries = Vec::new();
    for i in 0..20 {
        let mut entry = chunk_vector(project.id, &format!("chunk {i}"), vec![1.0, 0.0, 0.0, 0.0]);
        entry.document_id = Some(document.id);
        entry.chunk_index = Some(i);
        entries.push(entry);
    }
    let mut entity_row = chunk_vector(project.id, "techcorp", vec![0.0, 1.0, 0.0, 0.0]);
    entity_row.entry_type = VectorEntryType::Entity;
    entries.push(entity_row);

    storage.vectors.upsert_batch(entries.clone()).await?;
    assert_eq!(storage.vectors.len().await?, 21);
    assert!(storage.vectors.has_vectors(document.id).await?);

    let chunk_ids = storage
        .vectors
        .get_chunk_ids_by_document(project.id, document.id)
        .await?;
    assert_eq!(chunk_ids.len(), 20);

    let removed = storage
        .vectors
        .delete_chunk_embeddings(project.id, &chunk_ids[..5])
        .await?;
    assert_eq!(removed, 5);

    let removed = storage
        .vectors
        .delete_entity_embeddings(project.id, &["TechCorp".to_string()])
        .await?;
    assert_eq!(removed, 1, "entity content matches after normalization");

    assert_eq!(storage.vectors.len().await?, 15);
    Ok(())
}

#[tokio::test]
async fn batch_atomicity_on_precheck_failure() -> Result<()> {
    let (_dir, storage) = embedded_backend(4).await?;
    let project = storage.projects.create_project("p").await?;

    let entries = vec![
        chunk_vector(project.id, "good", vec![1.0, 0.0, 0.0, 0.0]),
        chunk_vector(project.id, "bad", vec![1.0, 0.0]),
    ];
    assert!(storage.vectors.upsert_batch(entries).await.is_err());
    assert_eq!(storage.vectors.len().await?, 0, "no partial batch visible");
    Ok(())
}

#[tokio::test]
async fn delete_batch_counts_and_clear() -> Result<()> {
    let (_dir, storage) = embedded_backend(4).await?;
    let project = storage.projects.create_project("p").await?;

    let entries: Vec<_> = (0..3)
        .map(|i| chunk_vector(project.id, &format!("c{i}"), vec![1.0, 0.0, 0.0, 0.0]))
        .collect();
    storage.vectors.upsert_batch(entries.clone()).await?;

    let ids: Vec<Uuid> = entries.iter().map(|e| e.id).collect();
    assert!(storage.vectors.delete(ids[0]).await?);
    assert!(!storage.vectors.delete(ids[0]).await?);
    assert_eq!(storage.vectors.delete_batch(&ids).await?, 2);

    storage
        .vectors
        .upsert(chunk_vector(project.id, "again", vec![1.0, 0.0, 0.0, 0.0]))
        .await?;
    storage.vectors.clear().await?;
    assert_eq!(storage.vectors.len().await?, 0);

    // Unknown ids are a miss, not an error.
    assert_eq!(storage.vectors.get(ids::new_id()).await?, None);
    Ok(())
}
