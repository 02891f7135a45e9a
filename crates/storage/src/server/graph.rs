//! Graph store over the server `graph_entities` / `graph_relations` tables.
//!
//! Relational representation with parameterized statements end-to-end; the
//! legacy named-isolated-graph scheme survives only as a derived name in
//! lifecycle logs. Unlike the embedded backend, `upsert_relation` MERGEs
//! missing endpoint entities into existence. Multi-statement operations run
//! on one acquired connection, and statement execution goes through the
//! transient-fault retry wrapper.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use ragstore_core::normalize::normalize_name;
use ragstore_core::{
    BackendKind, Entity, Error, GraphStats, Relation, Result, ResultExt, Subgraph,
};

use super::{graph_name, map_pg};
use crate::retry::{with_retry, RetryPolicy};
use crate::{BackendTyped, GraphStore};

const ENTITY_COLS: &str = "id, project_id, name, entity_type, description, document_id, \
                           source_chunk_ids, created_at, updated_at";

const RELATION_COLS: &str = "id, project_id, source_entity, target_entity, relation_type, \
                             description, keywords, weight, document_id, source_chunk_ids, \
                             created_at, updated_at";

fn chunks_to_json(ids: &[Uuid]) -> serde_json::Value {
    serde_json::Value::Array(
        ids.iter()
            .map(|id| serde_json::Value::String(id.to_string()))
            .collect(),
    )
}

fn json_to_chunks(value: serde_json::Value) -> Result<Vec<Uuid>> {
    let strings: Vec<String> = serde_json::from_value(value)
        .map_err(|e| Error::serialization(format!("source_chunk_ids: {e}")))?;
    strings
        .iter()
        .map(|s| Uuid::parse_str(s).map_err(|_| Error::invalid_id(s)))
        .collect()
}

fn entity_from_row(row: &PgRow) -> Result<Entity> {
    Ok(Entity {
        id: row.try_get("id").op_context("graph_entities row")?,
        project_id: row.try_get("project_id").op_context("graph_entities row")?,
        name: row.try_get("name").op_context("graph_entities row")?,
        entity_type: row.try_get("entity_type").op_context("graph_entities row")?,
        description: row.try_get("description").op_context("graph_entities row")?,
        document_id: row.try_get("document_id").op_context("graph_entities row")?,
        source_chunk_ids: json_to_chunks(
            row.try_get("source_chunk_ids")
                .op_context("graph_entities row")?,
        )?,
        created_at: row.try_get("created_at").op_context("graph_entities row")?,
        updated_at: row.try_get("updated_at").op_context("graph_entities row")?,
    })
}

fn relation_from_row(row: &PgRow) -> Result<Relation> {
    Ok(Relation {
        id: row.try_get("id").op_context("graph_relations row")?,
        project_id: row.try_get("project_id").op_context("graph_relations row")?,
        source_entity: row
            .try_get("source_entity")
            .op_context("graph_relations row")?,
        target_entity: row
            .try_get("target_entity")
            .op_context("graph_relations row")?,
        relation_type: row
            .try_get("relation_type")
            .op_context("graph_relations row")?,
        description: row.try_get("description").op_context("graph_relations row")?,
        keywords: row.try_get("keywords").op_context("graph_relations row")?,
        weight: row.try_get("weight").op_context("graph_relations row")?,
        document_id: row.try_get("document_id").op_context("graph_relations row")?,
        source_chunk_ids: json_to_chunks(
            row.try_get("source_chunk_ids")
                .op_context("graph_relations row")?,
        )?,
        created_at: row.try_get("created_at").op_context("graph_relations row")?,
        updated_at: row.try_get("updated_at").op_context("graph_relations row")?,
    })
}

pub struct PgGraphStore {
    pool: PgPool,
    entities: String,
    relations: String,
    retry: RetryPolicy,
}

impl PgGraphStore {
    pub fn new(pool: PgPool, schema: &str) -> Self {
        Self {
            pool,
            entities: format!("{schema}.graph_entities"),
            relations: format!("{schema}.graph_relations"),
            retry: RetryPolicy::default(),
        }
    }

    fn entity_upsert_sql(&self) -> String {
        format!(
            "INSERT INTO {} (id, project_id, name, entity_type, description, document_id,
                             source_chunk_ids, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), NOW())
             ON CONFLICT (project_id, name) DO UPDATE SET
                entity_type = EXCLUDED.entity_type,
                description = EXCLUDED.description,
                document_id = EXCLUDED.document_id,
                source_chunk_ids = EXCLUDED.source_chunk_ids,
                updated_at = NOW()",
            self.entities
        )
    }

    fn endpoint_merge_sql(&self) -> String {
        format!(
            "INSERT INTO {} (id, project_id, name, entity_type, description,
                             source_chunk_ids, created_at, updated_at)
             VALUES ($1, $2, $3, 'UNKNOWN', '', '[]', NOW(), NOW())
             ON CONFLICT (project_id, name) DO NOTHING",
            self.entities
        )
    }

    fn relation_upsert_sql(&self) -> String {
        format!(
            "INSERT INTO {} (id, project_id, source_entity, target_entity, relation_type,
                             description, keywords, weight, document_id, source_chunk_ids,
                             created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW(), NOW())
             ON CONFLICT (project_id, source_entity, target_entity) DO UPDATE SET
                relation_type = EXCLUDED.relation_type,
                description = EXCLUDED.description,
                keywords = EXCLUDED.keywords,
                weight = EXCLUDED.weight,
                document_id = EXCLUDED.document_id,
                source_chunk_ids = EXCLUDED.source_chunk_ids,
                updated_at = NOW()",
            self.relations
        )
    }

    async fn upsert_relation_in(
        &self,
        conn: &mut PgConnection,
        relation: &Relation,
        source: &str,
        target: &str,
    ) -> Result<()> {
        // Server MERGE semantics: missing endpoints come into existence.
        let merge_sql = self.endpoint_merge_sql();
        for endpoint in [source, target] {
            sqlx::query(&merge_sql)
                .bind(ragstore_core::ids::new_id())
                .bind(relation.project_id)
                .bind(endpoint)
                .execute(&mut *conn)
                .await
                .map_err(|e| map_pg("graph.upsert_relation", e))?;
        }
        sqlx::query(&self.relation_upsert_sql())
            .bind(relation.id)
            .bind(relation.project_id)
            .bind(source)
            .bind(target)
            .bind(&relation.relation_type)
            .bind(&relation.description)
            .bind(&relation.keywords)
            .bind(relation.weight)
            .bind(relation.document_id)
            .bind(chunks_to_json(&relation.source_chunk_ids))
            .execute(&mut *conn)
            .await
            .map_err(|e| map_pg("graph.upsert_relation", e))?;
        Ok(())
    }

    async fn fetch_relations_for(
        &self,
        conn: &mut PgConnection,
        project_id: Uuid,
        name: &str,
    ) -> Result<Vec<Relation>> {
        let sql = format!(
            "SELECT {RELATION_COLS} FROM {}
             WHERE project_id = $1 AND (source_entity = $2 OR target_entity = $2)
             ORDER BY source_entity, target_entity",
            self.relations
        );
        let rows = sqlx::query(&sql)
            .bind(project_id)
            .bind(name)
            .fetch_all(conn)
            .await
            .map_err(|e| map_pg("graph.fetch_relations", e))?;
        rows.iter().map(relation_from_row).collect()
    }

    async fn fetch_entity(
        &self,
        conn: &mut PgConnection,
        project_id: Uuid,
        name: &str,
    ) -> Result<Option<Entity>> {
        let sql = format!(
            "SELECT {ENTITY_COLS} FROM {} WHERE project_id = $1 AND name = $2",
            self.entities
        );
        let row = sqlx::query(&sql)
            .bind(project_id)
            .bind(name)
            .fetch_optional(conn)
            .await
            .map_err(|e| map_pg("graph.fetch_entity", e))?;
        row.as_ref().map(entity_from_row).transpose()
    }
}

impl BackendTyped for PgGraphStore {
    fn backend_kind(&self) -> BackendKind {
        BackendKind::Server
    }
}

#[async_trait]
impl GraphStore for PgGraphStore {
    async fn create_project_graph(&self, project_id: Uuid) -> Result<()> {
        // Isolation is relational; the derived name only identifies the
        // project graph in logs.
        info!(graph = %graph_name(project_id), "project graph ready");
        Ok(())
    }

    async fn delete_project_graph(&self, project_id: Uuid) -> Result<()> {
        with_retry(&self.retry, "graph.delete_project_graph", || async {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| map_pg("graph.delete_project_graph", e))?;
            sqlx::query(&format!(
                "DELETE FROM {} WHERE project_id = $1",
                self.relations
            ))
            .bind(project_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_pg("graph.delete_project_graph", e))?;
            sqlx::query(&format!(
                "DELETE FROM {} WHERE project_id = $1",
                self.entities
            ))
            .bind(project_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_pg("graph.delete_project_graph", e))?;
            tx.commit()
                .await
                .map_err(|e| map_pg("graph.delete_project_graph", e))?;
            debug!(graph = %graph_name(project_id), "dropped project graph");
            Ok(())
        })
        .await
    }

    async fn upsert_entity(&self, entity: Entity) -> Result<()> {
        let name = normalize_name(&entity.name);
        with_retry(&self.retry, "graph.upsert_entity", || async {
            sqlx::query(&self.entity_upsert_sql())
                .bind(entity.id)
                .bind(entity.project_id)
                .bind(&name)
                .bind(&entity.entity_type)
                .bind(&entity.description)
                .bind(entity.document_id)
                .bind(chunks_to_json(&entity.source_chunk_ids))
                .execute(&self.pool)
                .await
                .map_err(|e| map_pg("graph.upsert_entity", e))?;
            Ok(())
        })
        .await
    }

    async fn upsert_entities(&self, entities: Vec<Entity>) -> Result<()> {
        if entities.is_empty() {
            return Ok(());
        }
        with_retry(&self.retry, "graph.upsert_entities", || async {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| map_pg("graph.upsert_entities", e))?;
            let sql = self.entity_upsert_sql();
            for entity in &entities {
                sqlx::query(&sql)
                    .bind(entity.id)
                    .bind(entity.project_id)
                    .bind(normalize_name(&entity.name))
                    .bind(&entity.entity_type)
                    .bind(&entity.description)
                    .bind(entity.document_id)
                    .bind(chunks_to_json(&entity.source_chunk_ids))
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| map_pg("graph.upsert_entities", e))?;
            }
            tx.commit()
                .await
                .map_err(|e| map_pg("graph.upsert_entities", e))?;
            Ok(())
        })
        .await
    }

    async fn upsert_relation(&self, relation: Relation) -> Result<()> {
        let source = normalize_name(&relation.source_entity);
        let target = normalize_name(&relation.target_entity);
        with_retry(&self.retry, "graph.upsert_relation", || async {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| map_pg("graph.upsert_relation", e))?;
            self.upsert_relation_in(&mut tx, &relation, &source, &target)
                .await?;
            tx.commit()
                .await
                .map_err(|e| map_pg("graph.upsert_relation", e))?;
            Ok(())
        })
        .await
    }

    async fn upsert_relations(&self, relations: Vec<Relation>) -> Result<()> {
        if relations.is_empty() {
            return Ok(());
        }
        with_retry(&self.retry, "graph.upsert_relations", || async {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| map_pg("graph.upsert_relations", e))?;
            for relation in &relations {
                let source = normalize_name(&relation.source_entity);
                let target = normalize_name(&relation.target_entity);
                self.upsert_relation_in(&mut tx, relation, &source, &target)
                    .await?;
            }
            tx.commit()
                .await
                .map_err(|e| map_pg("graph.upsert_relations", e))?;
            Ok(())
        })
        .await
    }

    async fn get_entity(&self, project_id: Uuid, name: &str) -> Result<Option<Entity>> {
        let name = normalize_name(name);
        let sql = format!(
            "SELECT {ENTITY_COLS} FROM {} WHERE project_id = $1 AND name = $2",
            self.entities
        );
        let row = with_retry(&self.retry, "graph.get_entity", || async {
            sqlx::query(&sql)
                .bind(project_id)
                .bind(&name)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_pg("graph.get_entity", e))
        })
        .await?;
        row.as_ref().map(entity_from_row).transpose()
    }

    async fn get_entities(&self, project_id: Uuid, names: &[String]) -> Result<Vec<Entity>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let names: Vec<String> = names.iter().map(|n| normalize_name(n)).collect();
        let sql = format!(
            "SELECT {ENTITY_COLS} FROM {}
             WHERE project_id = $1 AND name = ANY($2) ORDER BY name",
            self.entities
        );
        let rows = with_retry(&self.retry, "graph.get_entities", || async {
            sqlx::query(&sql)
                .bind(project_id)
                .bind(&names)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| map_pg("graph.get_entities", e))
        })
        .await?;
        rows.iter().map(entity_from_row).collect()
    }

    async fn get_relation(
        &self,
        project_id: Uuid,
        source: &str,
        target: &str,
    ) -> Result<Option<Relation>> {
        let source = normalize_name(source);
        let target = normalize_name(target);
        let sql = format!(
            "SELECT {RELATION_COLS} FROM {}
             WHERE project_id = $1 AND source_entity = $2 AND target_entity = $3",
            self.relations
        );
        let row = with_retry(&self.retry, "graph.get_relation", || async {
            sqlx::query(&sql)
                .bind(project_id)
                .bind(&source)
                .bind(&target)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_pg("graph.get_relation", e))
        })
        .await?;
        row.as_ref().map(relation_from_row).transpose()
    }

    async fn get_relations_for_entity(
        &self,
        project_id: Uuid,
        name: &str,
    ) -> Result<Vec<Relation>> {
        let name = normalize_name(name);
        with_retry(&self.retry, "graph.get_relations_for_entity", || async {
            let mut conn = self
                .pool
                .acquire()
                .await
                .map_err(|e| map_pg("graph.get_relations_for_entity", e))?;
            self.fetch_relations_for(&mut conn, project_id, &name).await
        })
        .await
    }

    async fn get_all_entities(&self, project_id: Uuid) -> Result<Vec<Entity>> {
        let sql = format!(
            "SELECT {ENTITY_COLS} FROM {} WHERE project_id = $1 ORDER BY name",
            self.entities
        );
        let rows = with_retry(&self.retry, "graph.get_all_entities", || async {
            sqlx::query(&sql)
                .bind(project_id)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| map_pg("graph.get_all_entities", e))
        })
        .await?;
        rows.iter().map(entity_from_row).collect()
    }

    async fn get_all_relations(&self, project_id: Uuid) -> Result<Vec<Relation>> {
        let sql = format!(
            "SELECT {RELATION_COLS} FROM {}
             WHERE project_id = $1 ORDER BY source_entity, target_entity",
            self.relations
        );
        let rows = with_retry(&self.retry, "graph.get_all_relations", || async {
            sqlx::query(&sql)
                .bind(project_id)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| map_pg("graph.get_all_relations", e))
        })
        .await?;
        rows.iter().map(relation_from_row).collect()
    }

    async fn get_entities_batch(
        &self,
        project_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Entity>> {
        let sql = format!(
            "SELECT {ENTITY_COLS} FROM {}
             WHERE project_id = $1 ORDER BY name LIMIT $2 OFFSET $3",
            self.entities
        );
        let rows = with_retry(&self.retry, "graph.get_entities_batch", || async {
            sqlx::query(&sql)
                .bind(project_id)
                .bind(limit as i64)
                .bind(offset as i64)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| map_pg("graph.get_entities_batch", e))
        })
        .await?;
        rows.iter().map(entity_from_row).collect()
    }

    async fn get_relations_batch(
        &self,
        project_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Relation>> {
        let sql = format!(
            "SELECT {RELATION_COLS} FROM {}
             WHERE project_id = $1 ORDER BY source_entity, target_entity
             LIMIT $2 OFFSET $3",
            self.relations
        );
        let rows = with_retry(&self.retry, "graph.get_relations_batch", || async {
            sqlx::query(&sql)
                .bind(project_id)
                .bind(limit as i64)
                .bind(offset as i64)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| map_pg("graph.get_relations_batch", e))
        })
        .await?;
        rows.iter().map(relation_from_row).collect()
    }

    async fn get_entities_by_source_chunks(
        &self,
        project_id: Uuid,
        chunk_ids: &[Uuid],
    ) -> Result<Vec<Entity>> {
        if chunk_ids.is_empty() {
            return Ok(Vec::new());
        }
        let wanted: HashSet<Uuid> = chunk_ids.iter().copied().collect();
        let all = self.get_all_entities(project_id).await?;
        Ok(all
            .into_iter()
            .filter(|e| e.source_chunk_ids.iter().any(|id| wanted.contains(id)))
            .collect())
    }

    async fn get_relations_by_source_chunks(
        &self,
        project_id: Uuid,
        chunk_ids: &[Uuid],
    ) -> Result<Vec<Relation>> {
        if chunk_ids.is_empty() {
            return Ok(Vec::new());
        }
        let wanted: HashSet<Uuid> = chunk_ids.iter().copied().collect();
        let all = self.get_all_relations(project_id).await?;
        Ok(all
            .into_iter()
            .filter(|r| r.source_chunk_ids.iter().any(|id| wanted.contains(id)))
            .collect())
    }

    async fn node_degrees_batch(
        &self,
        project_id: Uuid,
        names: &[String],
        batch_size: usize,
    ) -> Result<HashMap<String, u64>> {
        let names: Vec<String> = names.iter().map(|n| normalize_name(n)).collect();
        let mut degrees: HashMap<String, u64> = names.iter().map(|n| (n.clone(), 0)).collect();
        let sql = format!(
            "SELECT name, COUNT(*) AS degree FROM (
                SELECT source_entity AS name FROM {r}
                 WHERE project_id = $1 AND source_entity = ANY($2)
                UNION ALL
                SELECT target_entity AS name FROM {r}
                 WHERE project_id = $1 AND target_entity = ANY($2)
             ) incidences GROUP BY name",
            r = self.relations
        );
        for chunk in names.chunks(batch_size.max(1)) {
            let chunk: Vec<String> = chunk.to_vec();
            let rows = with_retry(&self.retry, "graph.node_degrees_batch", || async {
                sqlx::query(&sql)
                    .bind(project_id)
                    .bind(&chunk)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| map_pg("graph.node_degrees_batch", e))
            })
            .await?;
            for row in rows {
                let name: String = row.try_get("name").op_context("degree row")?;
                let degree: i64 = row.try_get("degree").op_context("degree row")?;
                degrees.insert(name, degree as u64);
            }
        }
        Ok(degrees)
    }

    async fn delete_entity(&self, project_id: Uuid, name: &str) -> Result<bool> {
        let name = normalize_name(name);
        let sql = format!(
            "DELETE FROM {} WHERE project_id = $1 AND name = $2",
            self.entities
        );
        let result = with_retry(&self.retry, "graph.delete_entity", || async {
            sqlx::query(&sql)
                .bind(project_id)
                .bind(&name)
                .execute(&self.pool)
                .await
                .map_err(|e| map_pg("graph.delete_entity", e))
        })
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_relation(&self, project_id: Uuid, source: &str, target: &str) -> Result<bool> {
        let source = normalize_name(source);
        let target = normalize_name(target);
        let sql = format!(
            "DELETE FROM {} WHERE project_id = $1 AND source_entity = $2 AND target_entity = $3",
            self.relations
        );
        let result = with_retry(&self.retry, "graph.delete_relation", || async {
            sqlx::query(&sql)
                .bind(project_id)
                .bind(&source)
                .bind(&target)
                .execute(&self.pool)
                .await
                .map_err(|e| map_pg("graph.delete_relation", e))
        })
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_entities(&self, project_id: Uuid, names: &[String]) -> Result<u64> {
        if names.is_empty() {
            return Ok(0);
        }
        let names: Vec<String> = names.iter().map(|n| normalize_name(n)).collect();
        let sql = format!(
            "DELETE FROM {} WHERE project_id = $1 AND name = ANY($2)",
            self.entities
        );
        let result = with_retry(&self.retry, "graph.delete_entities", || async {
            sqlx::query(&sql)
                .bind(project_id)
                .bind(&names)
                .execute(&self.pool)
                .await
                .map_err(|e| map_pg("graph.delete_entities", e))
        })
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_relations(&self, project_id: Uuid, pairs: &[(String, String)]) -> Result<u64> {
        if pairs.is_empty() {
            return Ok(0);
        }
        let pairs: Vec<(String, String)> = pairs
            .iter()
            .map(|(s, t)| (normalize_name(s), normalize_name(t)))
            .collect();
        let sql = format!(
            "DELETE FROM {} WHERE project_id = $1 AND source_entity = $2 AND target_entity = $3",
            self.relations
        );
        with_retry(&self.retry, "graph.delete_relations", || async {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| map_pg("graph.delete_relations", e))?;
            let mut deleted = 0u64;
            for (source, target) in &pairs {
                let result = sqlx::query(&sql)
                    .bind(project_id)
                    .bind(source)
                    .bind(target)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| map_pg("graph.delete_relations", e))?;
                deleted += result.rows_affected();
            }
            tx.commit()
                .await
                .map_err(|e| map_pg("graph.delete_relations", e))?;
            Ok(deleted)
        })
        .await
    }

    async fn delete_by_source_id(&self, project_id: Uuid, document_id: Uuid) -> Result<u64> {
        with_retry(&self.retry, "graph.delete_by_source_id", || async {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| map_pg("graph.delete_by_source_id", e))?;
            // Relations first so entity deletion never strands an edge.
            let relations = sqlx::query(&format!(
                "DELETE FROM {} WHERE project_id = $1 AND document_id = $2",
                self.relations
            ))
            .bind(project_id)
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_pg("graph.delete_by_source_id", e))?;
            let entities = sqlx::query(&format!(
                "DELETE FROM {} WHERE project_id = $1 AND document_id = $2",
                self.entities
            ))
            .bind(project_id)
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_pg("graph.delete_by_source_id", e))?;
            tx.commit()
                .await
                .map_err(|e| map_pg("graph.delete_by_source_id", e))?;
            Ok(relations.rows_affected() + entities.rows_affected())
        })
        .await
    }

    async fn traverse_bfs(
        &self,
        project_id: Uuid,
        start: &str,
        max_depth: usize,
        max_nodes: usize,
    ) -> Result<Subgraph> {
        let start = normalize_name(start);
        with_retry(&self.retry, "graph.traverse_bfs", || {
            self.traverse_bfs_inner(project_id, &start, max_depth, max_nodes)
        })
        .await
    }

    async fn find_shortest_path(
        &self,
        project_id: Uuid,
        source: &str,
        target: &str,
    ) -> Result<Vec<Entity>> {
        let source = normalize_name(source);
        let target = normalize_name(target);
        with_retry(&self.retry, "graph.find_shortest_path", || {
            self.find_shortest_path_inner(project_id, &source, &target)
        })
        .await
    }

    async fn get_stats(&self, project_id: Uuid) -> Result<GraphStats> {
        let entity_sql = format!("SELECT COUNT(*) FROM {} WHERE project_id = $1", self.entities);
        let relation_sql = format!(
            "SELECT COUNT(*) FROM {} WHERE project_id = $1",
            self.relations
        );
        let (entities, relations) = with_retry(&self.retry, "graph.get_stats", || async {
            let (entity_count,): (i64,) = sqlx::query_as(&entity_sql)
                .bind(project_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| map_pg("graph.get_stats", e))?;
            let (relation_count,): (i64,) = sqlx::query_as(&relation_sql)
                .bind(project_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| map_pg("graph.get_stats", e))?;
            Ok((entity_count, relation_count))
        })
        .await?;
        Ok(GraphStats::new(entities as u64, relations as u64))
    }
}

impl PgGraphStore {
    /// Level-synchronous BFS on one acquired connection.
    async fn traverse_bfs_inner(
        &self,
        project_id: Uuid,
        start: &str,
        max_depth: usize,
        max_nodes: usize,
    ) -> Result<Subgraph> {
        let start = start.to_string();
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_pg("graph.traverse_bfs", e))?;

        let Some(start_entity) = self.fetch_entity(&mut conn, project_id, &start).await? else {
            return Ok(Subgraph::default());
        };

        let mut visited: HashSet<String> = HashSet::from([start.clone()]);
        let mut entities = vec![start_entity];
        let mut seen_edges: HashSet<String> = HashSet::new();
        let mut relations = Vec::new();
        let mut frontier = vec![start];
        let mut capped = max_nodes > 0 && visited.len() >= max_nodes;

        for _level in 0..max_depth {
            if frontier.is_empty() || capped {
                break;
            }
            let mut next = Vec::new();
            'level: for node in &frontier {
                for relation in self.fetch_relations_for(&mut conn, project_id, node).await? {
                    if seen_edges.insert(relation.edge_key()) {
                        relations.push(relation.clone());
                    }
                    let neighbor = if relation.source_entity == *node {
                        relation.target_entity
                    } else {
                        relation.source_entity
                    };
                    if visited.contains(&neighbor) {
                        continue;
                    }
                    if max_nodes > 0 && visited.len() >= max_nodes {
                        capped = true;
                        break 'level;
                    }
                    if let Some(entity) = self.fetch_entity(&mut conn, project_id, &neighbor).await?
                    {
                        visited.insert(neighbor.clone());
                        entities.push(entity);
                        next.push(neighbor);
                    }
                }
            }
            frontier = next;
        }

        Ok(Subgraph {
            entities,
            relations,
        })
    }

    /// Undirected BFS with a parent map on one acquired connection.
    async fn find_shortest_path_inner(
        &self,
        project_id: Uuid,
        source: &str,
        target: &str,
    ) -> Result<Vec<Entity>> {
        let source = source.to_string();
        let target = target.to_string();
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_pg("graph.find_shortest_path", e))?;

        let Some(source_entity) = self.fetch_entity(&mut conn, project_id, &source).await? else {
            return Ok(Vec::new());
        };
        if self.fetch_entity(&mut conn, project_id, &target).await?.is_none() {
            return Ok(Vec::new());
        }
        if source == target {
            return Ok(vec![source_entity]);
        }

        let mut parents: HashMap<String, String> = HashMap::new();
        let mut visited: HashSet<String> = HashSet::from([source.clone()]);
        let mut queue: VecDeque<String> = VecDeque::from([source]);
        let mut reached = false;

        'search: while let Some(node) = queue.pop_front() {
            for relation in self.fetch_relations_for(&mut conn, project_id, &node).await? {
                let neighbor = if relation.source_entity == node {
                    relation.target_entity
                } else {
                    relation.source_entity
                };
                if !visited.insert(neighbor.clone()) {
                    continue;
                }
                parents.insert(neighbor.clone(), node.clone());
                if neighbor == target {
                    reached = true;
                    break 'search;
                }
                queue.push_back(neighbor);
            }
        }

        if !reached {
            return Ok(Vec::new());
        }

        let mut names = vec![target.clone()];
        let mut cursor = target;
        while let Some(parent) = parents.get(&cursor) {
            names.push(parent.clone());
            cursor = parent.clone();
        }
        names.reverse();

        let mut path = Vec::with_capacity(names.len());
        for name in &names {
            match self.fetch_entity(&mut conn, project_id, name).await? {
                Some(entity) => path.push(entity),
                None => return Ok(Vec::new()),
            }
        }
        Ok(path)
    }
}
