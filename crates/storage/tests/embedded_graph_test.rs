//! Integration tests for the embedded graph store: MERGE upserts,
//! normalization, traversal, and shortest paths.

mod common;

use anyhow::Result;
use pretty_assertions::assert_eq;

use common::{embedded_backend, test_entity, test_relation};
use ragstore_core::Error;

#[tokio::test]
async fn dedup_on_upsert_with_normalized_names() -> Result<()> {
    let (_dir, storage) = embedded_backend(4).await?;
    let project = storage.projects.create_project("p").await?;
    storage.graph.create_project_graph(project.id).await?;

    storage
        .graph
        .upsert_entity(test_entity(project.id, "TechCorp", "ORG", "desc1"))
        .await?;
    storage
        .graph
        .upsert_entity(test_entity(project.id, "techcorp", "ORG", "desc2"))
        .await?;

    let all = storage.graph.get_all_entities(project.id).await?;
    assert_eq!(all.len(), 1, "normalized names dedup to one row");

    let fetched = storage
        .graph
        .get_entity(project.id, "TechCorp")
        .await?
        .expect("entity resolves through any casing");
    assert_eq!(fetched.description, "desc2", "later properties win");
    assert_eq!(fetched.name, "techcorp", "stored key is normalized");

    // NFKC closure: fullwidth casing still resolves to the same row.
    let fetched = storage.graph.get_entity(project.id, "  TECHCORP ").await?;
    assert!(fetched.is_some());
    Ok(())
}

#[tokio::test]
async fn relation_requires_existing_endpoints() -> Result<()> {
    let (_dir, storage) = embedded_backend(4).await?;
    let project = storage.projects.create_project("p").await?;

    let err = storage
        .graph
        .upsert_relation(test_relation(project.id, "ghost", "phantom"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::GraphNotFound(_)));

    storage
        .graph
        .upsert_entity(test_entity(project.id, "a", "T", ""))
        .await?;
    storage
        .graph
        .upsert_entity(test_entity(project.id, "b", "T", ""))
        .await?;
    storage
        .graph
        .upsert_relation(test_relation(project.id, "A", "B"))
        .await?;

    let relation = storage
        .graph
        .get_relation(project.id, "a", "b")
        .await?
        .expect("normalized endpoints resolve");
    assert_eq!(relation.relation_type, "RELATED_TO");
    Ok(())
}

#[tokio::test]
async fn relation_upsert_merges_on_identity() -> Result<()> {
    let (_dir, storage) = embedded_backend(4).await?;
    let project = storage.projects.create_project("p").await?;

    for name in ["a", "b"] {
        storage
            .graph
            .upsert_entity(test_entity(project.id, name, "T", ""))
            .await?;
    }
    let mut relation = test_relation(project.id, "a", "b");
    relation.weight = 1.0;
    storage.graph.upsert_relation(relation.clone()).await?;
    relation.weight = 7.5;
    relation.description = "updated".into();
    storage.graph.upsert_relation(relation).await?;

    let all = storage.graph.get_all_relations(project.id).await?;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].weight, 7.5);
    assert_eq!(all[0].description, "updated");
    Ok(())
}

#[tokio::test]
async fn batch_upsert_is_atomic() -> Result<()> {
    let (_dir, storage) = embedded_backend(4).await?;
    let project = storage.projects.create_project("p").await?;

    for name in ["a", "b"] {
        storage
            .graph
            .upsert_entity(test_entity(project.id, name, "T", ""))
            .await?;
    }
    // Second relation references a missing endpoint: the whole batch rolls
    // back and the first relation is not visible either.
    let batch = vec![
        test_relation(project.id, "a", "b"),
        test_relation(project.id, "a", "missing"),
    ];
    assert!(storage.graph.upsert_relations(batch).await.is_err());
    assert_eq!(storage.graph.get_all_relations(project.id).await?.len(), 0);
    Ok(())
}

#[tokio::test]
async fn reads_paging_and_degrees() -> Result<()> {
    let (_dir, storage) = embedded_backend(4).await?;
    let project = storage.projects.create_project("p").await?;

    let names = ["alpha", "beta", "gamma", "delta", "epsilon"];
    let entities: Vec<_> = names
        .iter()
        .map(|n| test_entity(project.id, n, "T", ""))
        .collect();
    storage.graph.upsert_entities(entities).await?;
    storage
        .graph
        .upsert_relations(vec![
            test_relation(project.id, "alpha", "beta"),
            test_relation(project.id, "alpha", "gamma"),
            test_relation(project.id, "beta", "gamma"),
        ])
        .await?;

    let page = storage.graph.get_entities_batch(project.id, 0, 2).await?;
    assert_eq!(page.len(), 2);
    assert!(page[0].name < page[1].name, "pages ordered by name");
    let rest = storage.graph.get_entities_batch(project.id, 2, 10).await?;
    assert_eq!(rest.len(), 3);

    let selected = storage
        .graph
        .get_entities(project.id, &["ALPHA".into(), "beta".into(), "nope".into()])
        .await?;
    assert_eq!(selected.len(), 2);

    let undirected = storage
        .graph
        .get_relations_for_entity(project.id, "gamma")
        .await?;
    assert_eq!(undirected.len(), 2, "matches either endpoint");

    let degrees = storage
        .graph
        .node_degrees_batch(
            project.id,
            &["alpha".into(), "delta".into(), "beta".into()],
            2,
        )
        .await?;
    assert_eq!(degrees["alpha"], 2);
    assert_eq!(degrees["beta"], 2);
    assert_eq!(degrees["delta"], 0, "isolated nodes report zero");

    let stats = storage.graph.get_stats(project.id).await?;
    assert_eq!(stats.entity_count, 5);
    assert_eq!(stats.relation_count, 3);
    assert!((stats.avg_degree - 1.2).abs() < 1e-9);
    Ok(())
}

#[tokio::test]
async fn bfs_traversal_bounded_by_depth() -> Result<()> {
    let (_dir, storage) = embedded_backend(4).await?;
    let project = storage.projects.create_project("p").await?;

    for name in ["a", "b", "c", "d"] {
        storage
            .graph
            .upsert_entity(test_entity(project.id, name, "T", ""))
            .await?;
    }
    storage
        .graph
        .upsert_relations(vec![
            test_relation(project.id, "a", "b"),
            test_relation(project.id, "b", "c"),
            test_relation(project.id, "c", "d"),
        ])
        .await?;

    let subgraph = storage.graph.traverse_bfs(project.id, "a", 2, 0).await?;
    let mut names: Vec<&str> = subgraph.entities.iter().map(|e| e.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["a", "b", "c"]);

    let mut edges: Vec<(String, String)> = subgraph
        .relations
        .iter()
        .map(|r| (r.source_entity.clone(), r.target_entity.clone()))
        .collect();
    edges.sort();
    assert_eq!(
        edges,
        vec![
            ("a".to_string(), "b".to_string()),
            ("b".to_string(), "c".to_string())
        ]
    );
    Ok(())
}

#[tokio::test]
async fn bfs_respects_node_cap_and_missing_start() -> Result<()> {
    let (_dir, storage) = embedded_backend(4).await?;
    let project = storage.projects.create_project("p").await?;

    for name in ["a", "b", "c"] {
        storage
            .graph
            .upsert_entity(test_entity(project.id, name, "T", ""))
            .await?;
    }
    storage
        .graph
        .upsert_relations(vec![
            test_relation(project.id, "a", "b"),
            test_relation(project.id, "a", "c"),
        ])
        .await?;

    let capped = storage.graph.traverse_bfs(project.id, "a", 5, 2).await?;
    assert_eq!(capped.entities.len(), 2);

    let missing = storage.graph.traverse_bfs(project.id, "nope", 3, 0).await?;
    assert!(missing.entities.is_empty());
    assert!(missing.relations.is_empty());

    // Depth zero visits only the start node.
    let only_start = storage.graph.traverse(project.id, "a", 0).await?;
    assert_eq!(only_start.entities.len(), 1);
    Ok(())
}

#[tokio::test]
async fn shortest_path_finds_minimum_hops() -> Result<()> {
    let (_dir, storage) = embedded_backend(4).await?;
    let project = storage.projects.create_project("p").await?;

    for name in ["a", "b", "c", "d", "e"] {
        storage
            .graph
            .upsert_entity(test_entity(project.id, name, "T", ""))
            .await?;
    }
    storage
        .graph
        .upsert_relations(vec![
            test_relation(project.id, "a", "b"),
            test_relation(project.id, "b", "c"),
            test_relation(project.id, "c", "d"),
            test_relation(project.id, "a", "e"),
        ])
        .await?;

    let path = storage.graph.find_shortest_path(project.id, "a", "d").await?;
    let names: Vec<&str> = path.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c", "d"]);

    let path = storage.graph.find_shortest_path(project.id, "e", "d").await?;
    assert_eq!(path.len(), 5, "e reaches d through a,b,c");
    assert_eq!(path[0].name, "e");
    assert_eq!(path[4].name, "d");

    let unreachable = storage
        .graph
        .find_shortest_path(project.id, "a", "nope")
        .await?;
    assert!(unreachable.is_empty());
    Ok(())
}

#[tokio::test]
async fn deletes_and_project_graph_teardown() -> Result<()> {
    let (_dir, storage) = embedded_backend(4).await?;
    let project = storage.projects.create_project("p").await?;

    for name in ["a", "b", "c"] {
        storage
            .graph
            .upsert_entity(test_entity(project.id, name, "T", ""))
            .await?;
    }
    storage
        .graph
        .upsert_relations(vec![
            test_relation(project.id, "a", "b"),
            test_relation(project.id, "b", "c"),
        ])
        .await?;

    assert!(storage.graph.delete_relation(project.id, "a", "b").await?);
    assert!(!storage.graph.delete_relation(project.id, "a", "b").await?);
    assert_eq!(
        storage
            .graph
            .delete_relations(project.id, &[("b".into(), "c".into())])
            .await?,
        1
    );
    assert!(storage.graph.delete_entity(project.id, "a").await?);
    assert_eq!(
        storage
            .graph
            .delete_entities(project.id, &["b".into(), "c".into()])
            .await?,
        2
    );

    // Idempotent teardown.
    storage.graph.delete_project_graph(project.id).await?;
    storage.graph.delete_project_graph(project.id).await?;
    let stats = storage.graph.get_stats(project.id).await?;
    assert_eq!(stats.entity_count, 0);
    Ok(())
}

#[tokio::test]
async fn graph_rows_stay_project_scoped() -> Result<()> {
    let (_dir, storage) = embedded_backend(4).await?;
    let p1 = storage.projects.create_project("p1").await?;
    let p2 = storage.projects.create_project("p2").await?;

    storage
        .graph
        .upsert_entity(test_entity(p1.id, "shared-name", "T", "from p1"))
        .await?;
    storage
        .graph
        .upsert_entity(test_entity(p2.id, "shared-name", "T", "from p2"))
        .await?;

    let e1 = storage
        .graph
        .get_entity(p1.id, "shared-name")
        .await?
        .expect("p1 row");
    assert_eq!(e1.description, "from p1");
    assert!(storage
        .graph
        .get_all_entities(p2.id)
        .await?
        .iter()
        .all(|e| e.project_id == p2.id));
    Ok(())
}
