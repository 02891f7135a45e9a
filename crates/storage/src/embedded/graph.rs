//! Graph store over the `graph_entities` and `graph_relations` tables.
//!
//! Identity is `(project_id, name)` for entities and `(project_id, source,
//! target)` for relations; upserts MERGE on those keys. Traversals fetch
//! adjacency with prepared statements and run the frontier bookkeeping in
//! memory, all on one connection per operation.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, Row};
use tracing::debug;
use uuid::Uuid;

use ragstore_core::normalize::normalize_name;
use ragstore_core::{BackendKind, Entity, Error, GraphStats, Relation, Result, Subgraph};

use super::manager::{ConnectionManager, OpResult};
use super::{chunk_ids_json, parse_chunk_ids, parse_ts, parse_uuid, parse_uuid_opt, placeholders};
use crate::{BackendTyped, GraphStore};

const ENTITY_COLUMNS: &str = "id, project_id, name, entity_type, description, document_id, \
                              source_chunk_ids, created_at, updated_at";

const RELATION_COLUMNS: &str = "id, project_id, source_entity, target_entity, relation_type, \
                                description, keywords, weight, document_id, source_chunk_ids, \
                                created_at, updated_at";

fn entity_from_row(row: &Row<'_>) -> rusqlite::Result<Entity> {
    Ok(Entity {
        id: parse_uuid(0, row.get(0)?)?,
        project_id: parse_uuid(1, row.get(1)?)?,
        name: row.get(2)?,
        entity_type: row.get(3)?,
        description: row.get(4)?,
        document_id: parse_uuid_opt(5, row.get(5)?)?,
        source_chunk_ids: parse_chunk_ids(6, row.get(6)?)?,
        created_at: parse_ts(7, row.get(7)?)?,
        updated_at: parse_ts(8, row.get(8)?)?,
    })
}

fn relation_from_row(row: &Row<'_>) -> rusqlite::Result<Relation> {
    Ok(Relation {
        id: parse_uuid(0, row.get(0)?)?,
        project_id: parse_uuid(1, row.get(1)?)?,
        source_entity: row.get(2)?,
        target_entity: row.get(3)?,
        relation_type: row.get(4)?,
        description: row.get(5)?,
        keywords: row.get(6)?,
        weight: row.get(7)?,
        document_id: parse_uuid_opt(8, row.get(8)?)?,
        source_chunk_ids: parse_chunk_ids(9, row.get(9)?)?,
        created_at: parse_ts(10, row.get(10)?)?,
        updated_at: parse_ts(11, row.get(11)?)?,
    })
}

fn fetch_entity(conn: &Connection, project_id: &str, name: &str) -> rusqlite::Result<Option<Entity>> {
    let sql = format!(
        "SELECT {ENTITY_COLUMNS} FROM graph_entities WHERE project_id = ?1 AND name = ?2"
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let mut rows = stmt.query(params![project_id, name])?;
    match rows.next()? {
        Some(row) => Ok(Some(entity_from_row(row)?)),
        None => Ok(None),
    }
}

fn fetch_relations_for(
    conn: &Connection,
    project_id: &str,
    name: &str,
) -> rusqlite::Result<Vec<Relation>> {
    let sql = format!(
        "SELECT {RELATION_COLUMNS} FROM graph_relations
         WHERE project_id = ?1 AND (source_entity = ?2 OR target_entity = ?2)
         ORDER BY source_entity, target_entity"
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt.query_map(params![project_id, name], relation_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn entity_exists(conn: &Connection, project_id: &str, name: &str) -> rusqlite::Result<bool> {
    let mut stmt = conn
        .prepare_cached("SELECT 1 FROM graph_entities WHERE project_id = ?1 AND name = ?2")?;
    stmt.exists(params![project_id, name])
}

fn upsert_entity_row(conn: &Connection, entity: &Entity, name: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO graph_entities
            (id, project_id, name, entity_type, description, document_id,
             source_chunk_ids, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
         ON CONFLICT(project_id, name) DO UPDATE SET
            entity_type = excluded.entity_type,
            description = excluded.description,
            document_id = excluded.document_id,
            source_chunk_ids = excluded.source_chunk_ids,
            updated_at = excluded.updated_at",
        params![
            entity.id.to_string(),
            entity.project_id.to_string(),
            name,
            entity.entity_type,
            entity.description,
            entity.document_id.map(|id| id.to_string()),
            chunk_ids_json(&entity.source_chunk_ids),
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn upsert_relation_row(
    conn: &Connection,
    relation: &Relation,
    source: &str,
    target: &str,
) -> OpResult<()> {
    // The embedded contract requires both endpoints to already exist.
    for endpoint in [source, target] {
        if !entity_exists(conn, &relation.project_id.to_string(), endpoint)? {
            return Err(Error::GraphNotFound(endpoint.to_string()).into());
        }
    }
    conn.execute(
        "INSERT INTO graph_relations
            (id, project_id, source_entity, target_entity, relation_type, description,
             keywords, weight, document_id, source_chunk_ids, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
         ON CONFLICT(project_id, source_entity, target_entity) DO UPDATE SET
            relation_type = excluded.relation_type,
            description = excluded.description,
            keywords = excluded.keywords,
            weight = excluded.weight,
            document_id = excluded.document_id,
            source_chunk_ids = excluded.source_chunk_ids,
            updated_at = excluded.updated_at",
        params![
            relation.id.to_string(),
            relation.project_id.to_string(),
            source,
            target,
            relation.relation_type,
            relation.description,
            relation.keywords,
            relation.weight,
            relation.document_id.map(|id| id.to_string()),
            chunk_ids_json(&relation.source_chunk_ids),
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub struct SqliteGraphStore {
    manager: Arc<ConnectionManager>,
}

impl SqliteGraphStore {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }
}

impl BackendTyped for SqliteGraphStore {
    fn backend_kind(&self) -> BackendKind {
        BackendKind::Embedded
    }
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    async fn create_project_graph(&self, project_id: Uuid) -> Result<()> {
        // Isolation is the project_id column; there is nothing to provision.
        debug!(%project_id, "project graph ready (column isolation)");
        Ok(())
    }

    async fn delete_project_graph(&self, project_id: Uuid) -> Result<()> {
        self.manager
            .with_write("graph.delete_project_graph", move |conn| {
                let tx = conn.transaction()?;
                let project = project_id.to_string();
                tx.execute(
                    "DELETE FROM graph_relations WHERE project_id = ?1",
                    params![project],
                )?;
                tx.execute(
                    "DELETE FROM graph_entities WHERE project_id = ?1",
                    params![project],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await
    }

    async fn upsert_entity(&self, entity: Entity) -> Result<()> {
        let name = normalize_name(&entity.name);
        self.manager
            .with_write("graph.upsert_entity", move |conn| {
                upsert_entity_row(conn, &entity, &name)?;
                Ok(())
            })
            .await
    }

    async fn upsert_entities(&self, entities: Vec<Entity>) -> Result<()> {
        if entities.is_empty() {
            return Ok(());
        }
        self.manager
            .with_write("graph.upsert_entities", move |conn| {
                let tx = conn.transaction()?;
                for entity in &entities {
                    let name = normalize_name(&entity.name);
                    upsert_entity_row(&tx, entity, &name)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
    }

    async fn upsert_relation(&self, relation: Relation) -> Result<()> {
        let source = normalize_name(&relation.source_entity);
        let target = normalize_name(&relation.target_entity);
        self.manager
            .with_write("graph.upsert_relation", move |conn| {
                upsert_relation_row(conn, &relation, &source, &target)
            })
            .await
    }

    async fn upsert_relations(&self, relations: Vec<Relation>) -> Result<()> {
        if relations.is_empty() {
            return Ok(());
        }
        self.manager
            .with_write("graph.upsert_relations", move |conn| {
                let tx = conn.transaction()?;
                for relation in &relations {
                    let source = normalize_name(&relation.source_entity);
                    let target = normalize_name(&relation.target_entity);
                    upsert_relation_row(&tx, relation, &source, &target)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
    }

    async fn get_entity(&self, project_id: Uuid, name: &str) -> Result<Option<Entity>> {
        let name = normalize_name(name);
        self.manager
            .with_read("graph.get_entity", move |conn| {
                Ok(fetch_entity(conn, &project_id.to_string(), &name)?)
            })
            .await
    }

    async fn get_entities(&self, project_id: Uuid, names: &[String]) -> Result<Vec<Entity>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let names: Vec<String> = names.iter().map(|n| normalize_name(n)).collect();
        self.manager
            .with_read("graph.get_entities", move |conn| {
                let sql = format!(
                    "SELECT {ENTITY_COLUMNS} FROM graph_entities
                     WHERE project_id = ? AND name IN ({}) ORDER BY name",
                    placeholders(names.len())
                );
                let project = project_id.to_string();
                let mut values: Vec<&dyn rusqlite::ToSql> = vec![&project];
                for name in &names {
                    values.push(name);
                }
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(values.as_slice(), entity_from_row)?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await
    }

    async fn get_relation(
        &self,
        project_id: Uuid,
        source: &str,
        target: &str,
    ) -> Result<Option<Relation>> {
        let source = normalize_name(source);
        let target = normalize_name(target);
        self.manager
            .with_read("graph.get_relation", move |conn| {
                let sql = format!(
                    "SELECT {RELATION_COLUMNS} FROM graph_relations
                     WHERE project_id = ?1 AND source_entity = ?2 AND target_entity = ?3"
                );
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query(params![project_id.to_string(), source, target])?;
                match rows.next()? {
                    Some(row) => Ok(Some(relation_from_row(row)?)),
                    None => Ok(None),
                }
            })
            .await
    }

    async fn get_relations_for_entity(
        &self,
        project_id: Uuid,
        name: &str,
    ) -> Result<Vec<Relation>> {
        let name = normalize_name(name);
        self.manager
            .with_read("graph.get_relations_for_entity", move |conn| {
                Ok(fetch_relations_for(conn, &project_id.to_string(), &name)?)
            })
            .await
    }

    async fn get_all_entities(&self, project_id: Uuid) -> Result<Vec<Entity>> {
        self.manager
            .with_read("graph.get_all_entities", move |conn| {
                let sql = format!(
                    "SELECT {ENTITY_COLUMNS} FROM graph_entities
                     WHERE project_id = ?1 ORDER BY name"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params![project_id.to_string()], entity_from_row)?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await
    }

    async fn get_all_relations(&self, project_id: Uuid) -> Result<Vec<Relation>> {
        self.manager
            .with_read("graph.get_all_relations", move |conn| {
                let sql = format!(
                    "SELECT {RELATION_COLUMNS} FROM graph_relations
                     WHERE project_id = ?1 ORDER BY source_entity, target_entity"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params![project_id.to_string()], relation_from_row)?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await
    }

    async fn get_entities_batch(
        &self,
        project_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Entity>> {
        self.manager
            .with_read("graph.get_entities_batch", move |conn| {
                let sql = format!(
                    "SELECT {ENTITY_COLUMNS} FROM graph_entities
                     WHERE project_id = ?1 ORDER BY name LIMIT ?2 OFFSET ?3"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(
                    params![project_id.to_string(), limit as i64, offset as i64],
                    entity_from_row,
                )?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await
    }

    async fn get_relations_batch(
        &self,
        project_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Relation>> {
        self.manager
            .with_read("graph.get_relations_batch", move |conn| {
                let sql = format!(
                    "SELECT {RELATION_COLUMNS} FROM graph_relations
                     WHERE project_id = ?1 ORDER BY source_entity, target_entity
                     LIMIT ?2 OFFSET ?3"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(
                    params![project_id.to_string(), limit as i64, offset as i64],
                    relation_from_row,
                )?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await
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
        self.manager
            .with_read("graph.get_entities_by_source_chunks", move |conn| {
                let sql = format!(
                    "SELECT {ENTITY_COLUMNS} FROM graph_entities
                     WHERE project_id = ?1 ORDER BY name"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params![project_id.to_string()], entity_from_row)?;
                let mut out = Vec::new();
                for row in rows {
                    let entity = row?;
                    if entity.source_chunk_ids.iter().any(|id| wanted.contains(id)) {
                        out.push(entity);
                    }
                }
                Ok(out)
            })
            .await
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
        self.manager
            .with_read("graph.get_relations_by_source_chunks", move |conn| {
                let sql = format!(
                    "SELECT {RELATION_COLUMNS} FROM graph_relations
                     WHERE project_id = ?1 ORDER BY source_entity, target_entity"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params![project_id.to_string()], relation_from_row)?;
                let mut out = Vec::new();
                for row in rows {
                    let relation = row?;
                    if relation
                        .source_chunk_ids
                        .iter()
                        .any(|id| wanted.contains(id))
                    {
                        out.push(relation);
                    }
                }
                Ok(out)
            })
            .await
    }

    async fn node_degrees_batch(
        &self,
        project_id: Uuid,
        names: &[String],
        batch_size: usize,
    ) -> Result<HashMap<String, u64>> {
        let names: Vec<String> = names.iter().map(|n| normalize_name(n)).collect();
        let batch_size = batch_size.max(1);
        self.manager
            .with_read("graph.node_degrees_batch", move |conn| {
                let mut degrees: HashMap<String, u64> =
                    names.iter().map(|n| (n.clone(), 0)).collect();
                let project = project_id.to_string();
                for chunk in names.chunks(batch_size) {
                    let marks = placeholders(chunk.len());
                    let sql = format!(
                        "SELECT name, COUNT(*) FROM (
                            SELECT source_entity AS name FROM graph_relations
                             WHERE project_id = ? AND source_entity IN ({marks})
                            UNION ALL
                            SELECT target_entity AS name FROM graph_relations
                             WHERE project_id = ? AND target_entity IN ({marks})
                         ) GROUP BY name"
                    );
                    let mut values: Vec<&dyn rusqlite::ToSql> = Vec::with_capacity(chunk.len() * 2 + 2);
                    values.push(&project);
                    for name in chunk {
                        values.push(name);
                    }
                    values.push(&project);
                    for name in chunk {
                        values.push(name);
                    }
                    let mut stmt = conn.prepare(&sql)?;
                    let rows = stmt.query_map(values.as_slice(), |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                    })?;
                    for row in rows {
                        let (name, count) = row?;
                        degrees.insert(name, count as u64);
                    }
                }
                Ok(degrees)
            })
            .await
    }

    async fn delete_entity(&self, project_id: Uuid, name: &str) -> Result<bool> {
        let name = normalize_name(name);
        self.manager
            .with_write("graph.delete_entity", move |conn| {
                let deleted = conn.execute(
                    "DELETE FROM graph_entities WHERE project_id = ?1 AND name = ?2",
                    params![project_id.to_string(), name],
                )?;
                Ok(deleted > 0)
            })
            .await
    }

    async fn delete_relation(&self, project_id: Uuid, source: &str, target: &str) -> Result<bool> {
        let source = normalize_name(source);
        let target = normalize_name(target);
        self.manager
            .with_write("graph.delete_relation", move |conn| {
                let deleted = conn.execute(
                    "DELETE FROM graph_relations
                     WHERE project_id = ?1 AND source_entity = ?2 AND target_entity = ?3",
                    params![project_id.to_string(), source, target],
                )?;
                Ok(deleted > 0)
            })
            .await
    }

    async fn delete_entities(&self, project_id: Uuid, names: &[String]) -> Result<u64> {
        if names.is_empty() {
            return Ok(0);
        }
        let names: Vec<String> = names.iter().map(|n| normalize_name(n)).collect();
        self.manager
            .with_write("graph.delete_entities", move |conn| {
                let sql = format!(
                    "DELETE FROM graph_entities WHERE project_id = ? AND name IN ({})",
                    placeholders(names.len())
                );
                let project = project_id.to_string();
                let mut values: Vec<&dyn rusqlite::ToSql> = vec![&project];
                for name in &names {
                    values.push(name);
                }
                let deleted = conn.execute(&sql, values.as_slice())?;
                Ok(deleted as u64)
            })
            .await
    }

    async fn delete_relations(&self, project_id: Uuid, pairs: &[(String, String)]) -> Result<u64> {
        if pairs.is_empty() {
            return Ok(0);
        }
        let pairs: Vec<(String, String)> = pairs
            .iter()
            .map(|(s, t)| (normalize_name(s), normalize_name(t)))
            .collect();
        self.manager
            .with_write("graph.delete_relations", move |conn| {
                let tx = conn.transaction()?;
                let mut deleted = 0u64;
                {
                    let mut stmt = tx.prepare(
                        "DELETE FROM graph_relations
                         WHERE project_id = ?1 AND source_entity = ?2 AND target_entity = ?3",
                    )?;
                    for (source, target) in &pairs {
                        deleted += stmt.execute(params![project_id.to_string(), source, target])?
                            as u64;
                    }
                }
                tx.commit()?;
                Ok(deleted)
            })
            .await
    }

    async fn delete_by_source_id(&self, project_id: Uuid, document_id: Uuid) -> Result<u64> {
        self.manager
            .with_write("graph.delete_by_source_id", move |conn| {
                let tx = conn.transaction()?;
                let project = project_id.to_string();
                let document = document_id.to_string();
                // Relations first so entity deletion never strands an edge.
                let relations = tx.execute(
                    "DELETE FROM graph_relations WHERE project_id = ?1 AND document_id = ?2",
                    params![project, document],
                )?;
                let entities = tx.execute(
                    "DELETE FROM graph_entities WHERE project_id = ?1 AND document_id = ?2",
                    params![project, document],
                )?;
                tx.commit()?;
                Ok((relations + entities) as u64)
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
        self.manager
            .with_read("graph.traverse_bfs", move |conn| {
                let project = project_id.to_string();
                let Some(start_entity) = fetch_entity(conn, &project, &start)? else {
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
                        for relation in fetch_relations_for(conn, &project, node)? {
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
                            if let Some(entity) = fetch_entity(conn, &project, &neighbor)? {
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
        self.manager
            .with_read("graph.find_shortest_path", move |conn| {
                let project = project_id.to_string();
                let Some(source_entity) = fetch_entity(conn, &project, &source)? else {
                    return Ok(Vec::new());
                };
                if !entity_exists(conn, &project, &target)? {
                    return Ok(Vec::new());
                }
                if source == target {
                    return Ok(vec![source_entity]);
                }

                let mut parents: HashMap<String, String> = HashMap::new();
                let mut visited: HashSet<String> = HashSet::from([source.clone()]);
                let mut queue: VecDeque<String> = VecDeque::from([source.clone()]);
                let mut reached = false;

                'search: while let Some(node) = queue.pop_front() {
                    for relation in fetch_relations_for(conn, &project, &node)? {
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

                // Walk the parent map back to the source, then materialize.
                let mut names = vec![target.clone()];
                let mut cursor = target;
                while let Some(parent) = parents.get(&cursor) {
                    names.push(parent.clone());
                    cursor = parent.clone();
                }
                names.reverse();

                let mut path = Vec::with_capacity(names.len());
                for name in &names {
                    match fetch_entity(conn, &project, name)? {
                        Some(entity) => path.push(entity),
                        None => return Ok(Vec::new()),
                    }
                }
                Ok(path)
            })
            .await
    }

    async fn get_stats(&self, project_id: Uuid) -> Result<GraphStats> {
        self.manager
            .with_read("graph.get_stats", move |conn| {
                let project = project_id.to_string();
                let entity_count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM graph_entities WHERE project_id = ?1",
                    params![project.clone()],
                    |row| row.get(0),
                )?;
                let relation_count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM graph_relations WHERE project_id = ?1",
                    params![project],
                    |row| row.get(0),
                )?;
                Ok(GraphStats::new(entity_count as u64, relation_count as u64))
            })
            .await
    }
}
