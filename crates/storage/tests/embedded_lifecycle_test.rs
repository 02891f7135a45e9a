//! Integration tests for document status, the extraction cache, and the
//! cascades that tie the four data planes together.

mod common;

use anyhow::Result;
use chrono::Utc;
use pretty_assertions::assert_eq;
use uuid::Uuid;

use common::{chunk_vector, embedded_backend, test_entity, test_relation};
use ragstore_core::hashing::content_hash;
use ragstore_core::{
    ids, DocumentStatus, DocumentType, Error, ProcessingStatus, VectorEntryType,
};

fn pending_status(doc_id: Uuid) -> DocumentStatus {
    DocumentStatus {
        doc_id,
        status: ProcessingStatus::Pending,
        chunk_count: 0,
        entity_count: 0,
        relation_count: 0,
        error_message: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[tokio::test]
async fn doc_status_lifecycle() -> Result<()> {
    let (_dir, storage) = embedded_backend(4).await?;
    let doc_id = ids::new_id();

    let mut status = pending_status(doc_id);
    storage.doc_status.upsert(&status).await?;
    assert_eq!(
        storage.doc_status.get(doc_id).await?.map(|s| s.status),
        Some(ProcessingStatus::Pending)
    );

    status.status = ProcessingStatus::Processing;
    status.chunk_count = 12;
    storage.doc_status.upsert(&status).await?;

    status.status = ProcessingStatus::Failed;
    status.error_message = Some("model call timed out".into());
    storage.doc_status.upsert(&status).await?;

    // FAILED may re-enter PROCESSING on retry; the store takes any
    // transition.
    status.status = ProcessingStatus::Processing;
    status.error_message = None;
    storage.doc_status.upsert(&status).await?;
    status.status = ProcessingStatus::Completed;
    status.entity_count = 5;
    status.relation_count = 3;
    storage.doc_status.upsert(&status).await?;

    let stored = storage.doc_status.get(doc_id).await?.expect("status row");
    assert_eq!(stored.status, ProcessingStatus::Completed);
    assert_eq!(stored.chunk_count, 12);
    assert_eq!(stored.entity_count, 5);
    assert_eq!(stored.error_message, None);
    Ok(())
}

#[tokio::test]
async fn doc_status_query_by_state_and_batch() -> Result<()> {
    let (_dir, storage) = embedded_backend(4).await?;

    let statuses: Vec<DocumentStatus> = (0..6)
        .map(|i| {
            let mut status = pending_status(ids::new_id());
            if i % 2 == 0 {
                status.status = ProcessingStatus::Completed;
            }
            status
        })
        .collect();
    storage.doc_status.upsert_batch(&statuses).await?;

    let completed = storage
        .doc_status
        .get_by_status(ProcessingStatus::Completed)
        .await?;
    assert_eq!(completed.len(), 3);
    let pending = storage
        .doc_status
        .get_by_status(ProcessingStatus::Pending)
        .await?;
    assert_eq!(pending.len(), 3);

    assert!(storage.doc_status.delete(statuses[0].doc_id).await?);
    assert!(!storage.doc_status.delete(statuses[0].doc_id).await?);
    Ok(())
}

#[tokio::test]
async fn extraction_cache_upserts_on_content_hash() -> Result<()> {
    let (_dir, storage) = embedded_backend(4).await?;
    let project = storage.projects.create_project("p").await?;
    let chunk = ids::new_id();
    let hash = content_hash("some chunk text");

    let first = storage
        .extraction_cache
        .store(project.id, "entity_extraction", Some(chunk), &hash, "r1", Some(120))
        .await?;
    let second = storage
        .extraction_cache
        .store(project.id, "entity_extraction", Some(chunk), &hash, "r2", Some(95))
        .await?;
    assert_eq!(first.id, second.id, "conflict keeps the original row id");
    assert_eq!(second.result, "r2");

    let fetched = storage
        .extraction_cache
        .get(project.id, "entity_extraction", &hash)
        .await?
        .expect("cache hit");
    assert_eq!(fetched.result, "r2");
    assert_eq!(fetched.tokens_used, Some(95));

    // Same hash under a different kind is a distinct entry.
    storage
        .extraction_cache
        .store(project.id, "relation_extraction", None, &hash, "r3", None)
        .await?;
    assert!(storage
        .extraction_cache
        .get(project.id, "relation_extraction", &hash)
        .await?
        .is_some());

    let by_chunk = storage
        .extraction_cache
        .get_by_chunk(project.id, chunk)
        .await?;
    assert_eq!(by_chunk.len(), 1);
    Ok(())
}

#[tokio::test]
async fn cache_chunk_reference_is_weak() -> Result<()> {
    let (_dir, storage) = embedded_backend(4).await?;
    let project = storage.projects.create_project("p").await?;
    let chunk = ids::new_id();
    let hash = content_hash("chunk body");

    storage
        .extraction_cache
        .store(project.id, "kind", Some(chunk), &hash, "result", None)
        .await?;

    let detached = storage
        .extraction_cache
        .detach_chunks(project.id, &[chunk])
        .await?;
    assert_eq!(detached, 1);

    let entry = storage
        .extraction_cache
        .get(project.id, "kind", &hash)
        .await?
        .expect("entry survives chunk purge");
    assert_eq!(entry.chunk_id, None);
    assert!(storage
        .extraction_cache
        .get_by_chunk(project.id, chunk)
        .await?
        .is_empty());

    assert_eq!(
        storage.extraction_cache.delete_by_project(project.id).await?,
        1
    );
    Ok(())
}

#[tokio::test]
async fn project_delete_cascades_every_plane() -> Result<()> {
    let (_dir, storage) = embedded_backend(4).await?;
    let keep = storage.projects.create_project("keep").await?;
    let doomed = storage.projects.create_project("doomed").await?;

    for project in [&keep, &doomed] {
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
        for i in 0..3 {
            storage
                .vectors
                .upsert(chunk_vector(project.id, &format!("c{i}"), vec![1.0, 0.0, 0.0, 0.0]))
                .await?;
        }
        storage
            .extraction_cache
            .store(project.id, "kind", None, &content_hash(&project.name), "r", None)
            .await?;
    }
    storage.kv.set("global-key", "untouched").await?;

    storage.graph.delete_project_graph(doomed.id).await?;
    storage.projects.delete_project(doomed.id).await?;

    assert!(storage.projects.get_project(doomed.id).await?.is_none());
    assert_eq!(storage.graph.get_stats(doomed.id).await?.entity_count, 0);
    assert_eq!(
        storage
            .extraction_cache
            .get(doomed.id, "kind", &content_hash("doomed"))
            .await?,
        None
    );

    // The surviving project and the shared kv plane are untouched.
    assert_eq!(storage.graph.get_stats(keep.id).await?.entity_count, 2);
    assert_eq!(storage.vectors.len().await?, 3);
    assert_eq!(storage.kv.get("global-key").await?, Some("untouched".into()));

    let err = storage.projects.delete_project(doomed.id).await.unwrap_err();
    assert!(matches!(err, Error::ProjectNotFound(_)));
    Ok(())
}

#[tokio::test]
async fn document_delete_recomputes_source_chunks() -> Result<()> {
    let (_dir, storage) = embedded_backend(4).await?;
    let project = storage.projects.create_project("p").await?;
    let doc_a = storage
        .projects
        .create_document(project.id, DocumentType::Text)
        .await?;
    let doc_b = storage
        .projects
        .create_document(project.id, DocumentType::Code)
        .await?;

    // Two chunks from doc A, one from doc B.
    let mut chunk_a1 = chunk_vector(project.id, "a1", vec![1.0, 0.0, 0.0, 0.0]);
    chunk_a1.document_id = Some(doc_a.id);
    chunk_a1.chunk_index = Some(0);
    let mut chunk_a2 = chunk_vector(project.id, "a2", vec![0.0, 1.0, 0.0, 0.0]);
    chunk_a2.document_id = Some(doc_a.id);
    chunk_a2.chunk_index = Some(1);
    let mut chunk_b = chunk_vector(project.id, "b", vec![0.0, 0.0, 1.0, 0.0]);
    chunk_b.document_id = Some(doc_b.id);
    chunk_b.chunk_index = Some(0);
    storage
        .vectors
        .upsert_batch(vec![chunk_a1.clone(), chunk_a2.clone(), chunk_b.clone()])
        .await?;

    // "only-a" is attested solely by doc A chunks; "mixed" also by doc B.
    let mut only_a = test_entity(project.id, "only-a", "T", "");
    only_a.source_chunk_ids = vec![chunk_a1.id, chunk_a2.id];
    let mut mixed = test_entity(project.id, "mixed", "T", "");
    mixed.source_chunk_ids = vec![chunk_a1.id, chunk_b.id];
    storage
        .graph
        .upsert_entities(vec![only_a, mixed])
        .await?;

    let hash = content_hash("a1 text");
    storage
        .extraction_cache
        .store(project.id, "kind", Some(chunk_a1.id), &hash, "r", None)
        .await?;

    storage.projects.delete_document(project.id, doc_a.id).await?;

    assert!(storage.projects.get_document(doc_a.id).await?.is_none());
    assert!(!storage.vectors.has_vectors(doc_a.id).await?);
    assert!(storage.vectors.has_vectors(doc_b.id).await?);

    assert!(
        storage.graph.get_entity(project.id, "only-a").await?.is_none(),
        "entity with no remaining sources is deleted"
    );
    let mixed = storage
        .graph
        .get_entity(project.id, "mixed")
        .await?
        .expect("entity keeps remaining sources");
    assert_eq!(mixed.source_chunk_ids, vec![chunk_b.id]);

    let entry = storage
        .extraction_cache
        .get(project.id, "kind", &hash)
        .await?
        .expect("cache entry survives");
    assert_eq!(entry.chunk_id, None, "weak reference nullified");
    Ok(())
}

#[tokio::test]
async fn graph_rows_by_source_chunks_and_document() -> Result<()> {
    let (_dir, storage) = embedded_backend(4).await?;
    let project = storage.projects.create_project("p").await?;
    let document = storage
        .projects
        .create_document(project.id, DocumentType::Text)
        .await?;
    let chunk = ids::new_id();

    let mut tracked = test_entity(project.id, "tracked", "T", "");
    tracked.source_chunk_ids = vec![chunk];
    tracked.document_id = Some(document.id);
    let untracked = test_entity(project.id, "untracked", "T", "");
    storage
        .graph
        .upsert_entities(vec![tracked, untracked])
        .await?;

    let mut relation = test_relation(project.id, "tracked", "untracked");
    relation.source_chunk_ids = vec![chunk];
    relation.document_id = Some(document.id);
    storage.graph.upsert_relation(relation).await?;

    let entities = storage
        .graph
        .get_entities_by_source_chunks(project.id, &[chunk])
        .await?;
    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0].name, "tracked");

    let relations = storage
        .graph
        .get_relations_by_source_chunks(project.id, &[chunk])
        .await?;
    assert_eq!(relations.len(), 1);

    let removed = storage
        .graph
        .delete_by_source_id(project.id, document.id)
        .await?;
    assert_eq!(removed, 2, "one relation and one entity");

    // Vector rows keyed entity/chunk for scenario completeness.
    let mut entity_vec = chunk_vector(project.id, "tracked", vec![1.0, 0.0, 0.0, 0.0]);
    entity_vec.entry_type = VectorEntryType::Entity;
    storage.vectors.upsert(entity_vec).await?;
    assert_eq!(
        storage
            .vectors
            .delete_entity_embeddings(project.id, &["tracked".into()])
            .await?,
        1
    );
    Ok(())
}
