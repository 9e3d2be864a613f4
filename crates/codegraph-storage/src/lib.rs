use codegraph_core::{
    Edge, EdgeId, EdgeInput, GraphError, GraphResult, InferenceCacheRow, Language, Metadata, Node,
    NodeId, NodeInput,
};
use codegraph_registry::Registry;
use parking_lot::{Mutex, RwLock};
use rusqlite::{Connection, Row, params};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

mod schema;

const SCHEMA_VERSION: u32 = 2;

/// A relational Graph Store backed by SQLite: a single
/// `rusqlite::Connection` opened with WAL + a busy timeout, guarded by a
/// `parking_lot::Mutex` so the store can be shared (`&GraphStore`) across
/// rayon's file-level worker threads — per spec §9's "per-file write queue
/// with N parallel file workers", a mutex-serialized single connection
/// *is* that queue — plus a `parking_lot::RwLock`-guarded in-memory cache
/// keyed by node identifier (the sole collision-free upsert key) rather
/// than by integer id.
pub struct GraphStore {
    conn: Mutex<Connection>,
    registry: Arc<Registry>,
    node_cache: RwLock<HashMap<String, NodeId>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeFilter {
    pub node_type: Option<String>,
    pub source_file: Option<String>,
    pub semantic_tags: Vec<String>,
    pub id_range: Option<(i64, i64)>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeFilter {
    pub edge_type: Option<String>,
    pub source_file: Option<String>,
    pub from_node_id: Option<NodeId>,
    pub to_node_id: Option<NodeId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub node_count: i64,
    pub edge_count: i64,
    pub edges_by_type: HashMap<String, i64>,
    pub cache_size: usize,
}

impl GraphStore {
    pub fn open<P: AsRef<Path>>(path: P, registry: Arc<Registry>) -> GraphResult<Self> {
        let conn = Connection::open(path).map_err(|e| GraphError::Io(e.to_string()))?;
        Self::from_connection(conn, registry)
    }

    pub fn new_in_memory(registry: Arc<Registry>) -> GraphResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| GraphError::Io(e.to_string()))?;
        Self::from_connection(conn, registry)
    }

    fn from_connection(conn: Connection, registry: Arc<Registry>) -> GraphResult<Self> {
        let _ = conn.busy_timeout(Duration::from_millis(2_500));
        let _ = conn.pragma_update(None, "foreign_keys", "ON");
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");
        let store = Self {
            conn: Mutex::new(conn),
            registry,
            node_cache: RwLock::new(HashMap::new()),
        };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> GraphResult<()> {
        schema::create_tables(&self.conn.lock())?;
        schema::create_indexes(&self.conn.lock())?;
        schema::apply_schema_migrations(self)?;
        self.warm_node_cache()
    }

    fn warm_node_cache(&self) -> GraphResult<()> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT id, identifier FROM nodes")
            .map_err(|e| GraphError::Io(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                let id: i64 = row.get(0)?;
                let identifier: String = row.get(1)?;
                Ok((identifier, NodeId(id)))
            })
            .map_err(|e| GraphError::Io(e.to_string()))?;
        let mut cache = self.node_cache.write();
        for row in rows {
            let (identifier, id) = row.map_err(|e| GraphError::Io(e.to_string()))?;
            cache.insert(identifier, id);
        }
        Ok(())
    }

    fn schema_version(&self) -> GraphResult<u32> {
        let version: i64 = self
            .conn
            .lock()
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .map_err(|e| GraphError::Io(e.to_string()))?;
        Ok(version.max(0) as u32)
    }

    fn set_schema_version(&self, version: u32) -> GraphResult<()> {
        self.conn
            .lock()
            .pragma_update(None, "user_version", version.to_string())
            .map_err(|e| GraphError::Io(e.to_string()))?;
        Ok(())
    }

    /// Run `f` inside a single atomic transaction; all mutations performed
    /// through the passed connection commit together, or none do. Holds
    /// the connection mutex for the duration of the transaction, so
    /// concurrent callers block at this suspension point rather than
    /// interleaving with an in-flight transaction.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction) -> GraphResult<T>,
    ) -> GraphResult<T> {
        let conn = self.conn.lock();
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| GraphError::Io(e.to_string()))?;
        let result = f(&tx)?;
        tx.commit().map_err(|e| GraphError::Io(e.to_string()))?;
        Ok(result)
    }

    /// Insert a node if its identifier is new, or update the mutable
    /// fields (`name`, `source_file`, `language`, `semantic_tags`,
    /// `metadata`, `start_line`, `end_line`) if it already exists.
    pub fn upsert_node(&self, input: NodeInput) -> GraphResult<NodeId> {
        self.registry.freeze();
        if let Some(existing_id) = self.node_cache.read().get(&input.identifier).copied() {
            self.update_node(existing_id, &input)?;
            return Ok(existing_id);
        }

        let semantic_tags = serde_json::to_string(&input.semantic_tags)
            .map_err(|e| GraphError::ValidationFailed(e.to_string()))?;
        let metadata = serde_json::to_string(&input.metadata)
            .map_err(|e| GraphError::ValidationFailed(e.to_string()))?;

        let conn = self.conn.lock();
        conn.execute(
                "INSERT INTO nodes (identifier, node_type, name, source_file, language, semantic_tags, metadata, start_line, end_line)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(identifier) DO UPDATE SET
                    name = excluded.name,
                    source_file = excluded.source_file,
                    language = excluded.language,
                    semantic_tags = excluded.semantic_tags,
                    metadata = excluded.metadata,
                    start_line = excluded.start_line,
                    end_line = excluded.end_line",
                params![
                    input.identifier,
                    input.node_type,
                    input.name,
                    input.source_file,
                    input.language.as_str(),
                    semantic_tags,
                    metadata,
                    input.start_line,
                    input.end_line,
                ],
            )
            .map_err(|e| GraphError::Io(e.to_string()))?;

        let id = conn
            .query_row(
                "SELECT id FROM nodes WHERE identifier = ?1",
                params![input.identifier],
                |row| row.get::<_, i64>(0),
            )
            .map_err(|e| GraphError::Io(e.to_string()))?;
        drop(conn);
        let node_id = NodeId(id);
        self.node_cache
            .write()
            .insert(input.identifier.clone(), node_id);
        Ok(node_id)
    }

    fn update_node(&self, id: NodeId, input: &NodeInput) -> GraphResult<()> {
        let semantic_tags = serde_json::to_string(&input.semantic_tags)
            .map_err(|e| GraphError::ValidationFailed(e.to_string()))?;
        let metadata = serde_json::to_string(&input.metadata)
            .map_err(|e| GraphError::ValidationFailed(e.to_string()))?;
        self.conn
            .lock()
            .execute(
                "UPDATE nodes SET name = ?1, source_file = ?2, language = ?3, semantic_tags = ?4,
                    metadata = ?5, start_line = ?6, end_line = ?7
                 WHERE id = ?8",
                params![
                    input.name,
                    input.source_file,
                    input.language.as_str(),
                    semantic_tags,
                    metadata,
                    input.start_line,
                    input.end_line,
                    id.0,
                ],
            )
            .map_err(|e| GraphError::Io(e.to_string()))?;
        Ok(())
    }

    /// Dedupe on (`from`, `to`, `type`); the edge type must resolve in the
    /// Edge Type Registry and `source_file` must be present.
    pub fn upsert_edge(&self, input: EdgeInput) -> GraphResult<EdgeId> {
        self.registry.freeze();
        if input.source_file.trim().is_empty() {
            return Err(GraphError::MissingSourceFile);
        }
        if self.registry.get(&input.edge_type).is_none() {
            return Err(GraphError::UnknownEdgeType(input.edge_type));
        }

        let metadata = serde_json::to_string(&input.metadata)
            .map_err(|e| GraphError::ValidationFailed(e.to_string()))?;
        let created_at = chrono::Utc::now().to_rfc3339();

        let conn = self.conn.lock();
        conn.execute(
                "INSERT INTO edges (from_node_id, to_node_id, edge_type, source_file, metadata, weight, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(from_node_id, to_node_id, edge_type) DO UPDATE SET
                    source_file = excluded.source_file,
                    metadata = excluded.metadata,
                    weight = excluded.weight",
                params![
                    input.from_node_id.0,
                    input.to_node_id.0,
                    input.edge_type,
                    input.source_file,
                    metadata,
                    input.weight,
                    created_at,
                ],
            )
            .map_err(|e| GraphError::Io(e.to_string()))?;

        let id = conn
            .query_row(
                "SELECT id FROM edges WHERE from_node_id = ?1 AND to_node_id = ?2 AND edge_type = ?3",
                params![input.from_node_id.0, input.to_node_id.0, input.edge_type],
                |row| row.get::<_, i64>(0),
            )
            .map_err(|e| GraphError::Io(e.to_string()))?;
        Ok(EdgeId(id))
    }

    pub fn find_nodes(&self, filter: &NodeFilter) -> GraphResult<Vec<Node>> {
        let mut sql = String::from("SELECT id, identifier, node_type, name, source_file, language, semantic_tags, metadata, start_line, end_line FROM nodes WHERE 1=1");
        let mut clauses = Vec::new();
        if filter.node_type.is_some() {
            clauses.push(" AND node_type = ?".to_string());
        }
        if filter.source_file.is_some() {
            clauses.push(" AND source_file = ?".to_string());
        }
        if let Some((lo, hi)) = filter.id_range {
            clauses.push(format!(" AND id BETWEEN {lo} AND {hi}"));
        }
        for clause in &clauses {
            sql.push_str(clause);
        }

        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| GraphError::Io(e.to_string()))?;

        let mut param_values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(node_type) = &filter.node_type {
            param_values.push(Box::new(node_type.clone()));
        }
        if let Some(source_file) = &filter.source_file {
            param_values.push(Box::new(source_file.clone()));
        }
        let param_refs: Vec<&dyn rusqlite::ToSql> =
            param_values.iter().map(|b| b.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), node_from_row)
            .map_err(|e| GraphError::Io(e.to_string()))?;

        let mut nodes = Vec::new();
        for row in rows {
            let node = row.map_err(|e| GraphError::Io(e.to_string()))?;
            if !filter.semantic_tags.is_empty()
                && !filter
                    .semantic_tags
                    .iter()
                    .any(|tag| node.semantic_tags.contains(tag))
            {
                continue;
            }
            nodes.push(node);
        }
        Ok(nodes)
    }

    pub fn find_edges(&self, filter: &EdgeFilter) -> GraphResult<Vec<Edge>> {
        let mut sql = String::from("SELECT id, from_node_id, to_node_id, edge_type, source_file, metadata, weight FROM edges WHERE 1=1");
        let mut param_values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(edge_type) = &filter.edge_type {
            sql.push_str(" AND edge_type = ?");
            param_values.push(Box::new(edge_type.clone()));
        }
        if let Some(source_file) = &filter.source_file {
            sql.push_str(" AND source_file = ?");
            param_values.push(Box::new(source_file.clone()));
        }
        if let Some(from_id) = filter.from_node_id {
            sql.push_str(" AND from_node_id = ?");
            param_values.push(Box::new(from_id.0));
        }
        if let Some(to_id) = filter.to_node_id {
            sql.push_str(" AND to_node_id = ?");
            param_values.push(Box::new(to_id.0));
        }

        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| GraphError::Io(e.to_string()))?;
        let param_refs: Vec<&dyn rusqlite::ToSql> =
            param_values.iter().map(|b| b.as_ref()).collect();
        let rows = stmt
            .query_map(param_refs.as_slice(), edge_from_row)
            .map_err(|e| GraphError::Io(e.to_string()))?;

        let mut edges = Vec::new();
        for row in rows {
            edges.push(row.map_err(|e| GraphError::Io(e.to_string()))?);
        }
        Ok(edges)
    }

    /// The only sanctioned bulk-delete path: deletes every edge owned by
    /// `source_file` whose type is in `types`, returning the count
    /// removed. Safe to call repeatedly before re-upserting an analyzer's
    /// output for a file.
    pub fn delete_edges_by_source_and_types(
        &self,
        source_file: &str,
        types: &[String],
    ) -> GraphResult<usize> {
        if types.is_empty() {
            return Ok(0);
        }
        let placeholders = types.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let sql = format!(
            "DELETE FROM edges WHERE source_file = ? AND edge_type IN ({placeholders})"
        );
        let mut params_vec: Vec<&dyn rusqlite::ToSql> = Vec::with_capacity(types.len() + 1);
        params_vec.push(&source_file as &dyn rusqlite::ToSql);
        for t in types {
            params_vec.push(t as &dyn rusqlite::ToSql);
        }
        let removed = self
            .conn
            .lock()
            .execute(&sql, params_vec.as_slice())
            .map_err(|e| GraphError::Io(e.to_string()))?;
        Ok(removed)
    }

    pub fn stats(&self) -> GraphResult<StoreStats> {
        let (node_count, edge_count, edges_by_type) = {
            let conn = self.conn.lock();
            let node_count: i64 = conn
                .query_row("SELECT count(*) FROM nodes", [], |r| r.get(0))
                .map_err(|e| GraphError::Io(e.to_string()))?;
            let edge_count: i64 = conn
                .query_row("SELECT count(*) FROM edges", [], |r| r.get(0))
                .map_err(|e| GraphError::Io(e.to_string()))?;

            let mut stmt = conn
                .prepare("SELECT edge_type, count(*) FROM edges GROUP BY edge_type")
                .map_err(|e| GraphError::Io(e.to_string()))?;
            let rows = stmt
                .query_map([], |row| {
                    let edge_type: String = row.get(0)?;
                    let count: i64 = row.get(1)?;
                    Ok((edge_type, count))
                })
                .map_err(|e| GraphError::Io(e.to_string()))?;
            let mut edges_by_type = HashMap::new();
            for row in rows {
                let (edge_type, count) = row.map_err(|e| GraphError::Io(e.to_string()))?;
                edges_by_type.insert(edge_type, count);
            }
            (node_count, edge_count, edges_by_type)
        };

        Ok(StoreStats {
            node_count,
            edge_count,
            edges_by_type,
            cache_size: self.inference_cache_size()?,
        })
    }

    pub fn get_node(&self, id: NodeId) -> GraphResult<Option<Node>> {
        self.conn
            .lock()
            .query_row(
                "SELECT id, identifier, node_type, name, source_file, language, semantic_tags, metadata, start_line, end_line FROM nodes WHERE id = ?1",
                params![id.0],
                node_from_row,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(GraphError::Io(other.to_string())),
            })
    }

    pub fn get_node_by_identifier(&self, identifier: &str) -> GraphResult<Option<Node>> {
        match self.node_cache.read().get(identifier).copied() {
            Some(id) => self.get_node(id),
            None => Ok(None),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// All edges in the store, unfiltered — the base relation the
    /// Inference Engine recomputes its closures from.
    pub fn all_edges(&self) -> GraphResult<Vec<Edge>> {
        self.find_edges(&EdgeFilter::default())
    }

    /// Upsert one derived row into `edge_inference_cache`, keyed on
    /// (`start_node_id`, `end_node_id`, `inferred_type`).
    pub fn upsert_inference_cache_row(&self, row: &InferenceCacheRow) -> GraphResult<()> {
        let edge_path = serde_json::to_string(&row.edge_path.iter().map(|e| e.0).collect::<Vec<_>>())
            .map_err(|e| GraphError::ValidationFailed(e.to_string()))?;
        self.conn
            .lock()
            .execute(
                "INSERT INTO edge_inference_cache (start_node_id, end_node_id, inferred_type, edge_path, depth, computed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(start_node_id, end_node_id, inferred_type) DO UPDATE SET
                    edge_path = excluded.edge_path,
                    depth = excluded.depth,
                    computed_at = excluded.computed_at",
                params![
                    row.start_node_id.0,
                    row.end_node_id.0,
                    row.inferred_type,
                    edge_path,
                    row.depth,
                    row.computed_at.to_rfc3339(),
                ],
            )
            .map_err(|e| GraphError::Io(e.to_string()))?;
        Ok(())
    }

    /// Empties the entire inference cache.
    pub fn clear_inference_cache(&self) -> GraphResult<()> {
        self.conn
            .lock()
            .execute("DELETE FROM edge_inference_cache", [])
            .map_err(|e| GraphError::Io(e.to_string()))?;
        Ok(())
    }

    /// Drops every cache row whose `inferred_type` matches, returning the
    /// count removed.
    pub fn invalidate_inference_cache(&self, inferred_type: &str) -> GraphResult<usize> {
        let removed = self
            .conn
            .lock()
            .execute(
                "DELETE FROM edge_inference_cache WHERE inferred_type = ?1",
                params![inferred_type],
            )
            .map_err(|e| GraphError::Io(e.to_string()))?;
        Ok(removed)
    }

    /// Read back cache rows, optionally scoped to a starting node and/or
    /// inferred type.
    pub fn inference_cache_rows(
        &self,
        start_node_id: Option<NodeId>,
        inferred_type: Option<&str>,
    ) -> GraphResult<Vec<InferenceCacheRow>> {
        let mut sql = String::from(
            "SELECT start_node_id, end_node_id, inferred_type, edge_path, depth, computed_at FROM edge_inference_cache WHERE 1=1",
        );
        let mut param_values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(start) = start_node_id {
            sql.push_str(" AND start_node_id = ?");
            param_values.push(Box::new(start.0));
        }
        if let Some(ty) = inferred_type {
            sql.push_str(" AND inferred_type = ?");
            param_values.push(Box::new(ty.to_string()));
        }
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| GraphError::Io(e.to_string()))?;
        let param_refs: Vec<&dyn rusqlite::ToSql> =
            param_values.iter().map(|b| b.as_ref()).collect();
        let rows = stmt
            .query_map(param_refs.as_slice(), cache_row_from_row)
            .map_err(|e| GraphError::Io(e.to_string()))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| GraphError::Io(e.to_string()))?);
        }
        Ok(out)
    }

    /// Count of rows currently in the inference cache.
    pub fn inference_cache_size(&self) -> GraphResult<usize> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT count(*) FROM edge_inference_cache", [], |r| r.get(0))
            .map_err(|e| GraphError::Io(e.to_string()))?;
        Ok(count.max(0) as usize)
    }

    /// Redirect every edge endpoint from `from` to `to` (used by the
    /// Unknown-Symbol Resolver to rewrite an unresolved node's edges onto
    /// its resolved counterpart) and delete the now-orphaned node. Returns
    /// the number of edges redirected.
    pub fn rewrite_node_references(&self, from: NodeId, to: NodeId) -> GraphResult<usize> {
        let conn = self.conn.lock();
        let mut redirected = 0;
        redirected += conn
            .execute(
                "UPDATE OR IGNORE edges SET from_node_id = ?1 WHERE from_node_id = ?2",
                params![to.0, from.0],
            )
            .map_err(|e| GraphError::Io(e.to_string()))?;
        redirected += conn
            .execute(
                "UPDATE OR IGNORE edges SET to_node_id = ?1 WHERE to_node_id = ?2",
                params![to.0, from.0],
            )
            .map_err(|e| GraphError::Io(e.to_string()))?;
        // Drop any edges left dangling on the old id by the OR IGNORE above
        // (they collided with an edge that already existed on `to`).
        conn.execute(
                "DELETE FROM edges WHERE from_node_id = ?1 OR to_node_id = ?1",
                params![from.0],
            )
            .map_err(|e| GraphError::Io(e.to_string()))?;
        conn.execute("DELETE FROM nodes WHERE id = ?1", params![from.0])
            .map_err(|e| GraphError::Io(e.to_string()))?;
        drop(conn);
        self.node_cache.write().retain(|_, id| *id != from);
        Ok(redirected)
    }
}

fn cache_row_from_row(row: &Row) -> rusqlite::Result<InferenceCacheRow> {
    let edge_path_raw: String = row.get(3)?;
    let edge_path: Vec<i64> = serde_json::from_str(&edge_path_raw).unwrap_or_default();
    let computed_at_raw: String = row.get(5)?;
    Ok(InferenceCacheRow {
        start_node_id: NodeId(row.get(0)?),
        end_node_id: NodeId(row.get(1)?),
        inferred_type: row.get(2)?,
        edge_path: edge_path.into_iter().map(EdgeId).collect(),
        depth: row.get::<_, i64>(4)? as u32,
        computed_at: chrono::DateTime::parse_from_rfc3339(&computed_at_raw)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .unwrap_or_else(|_| chrono::Utc::now()),
    })
}

fn node_from_row(row: &Row) -> rusqlite::Result<Node> {
    let semantic_tags_raw: String = row.get(6)?;
    let metadata_raw: String = row.get(7)?;
    let language_raw: String = row.get(5)?;
    Ok(Node {
        id: NodeId(row.get(0)?),
        identifier: row.get(1)?,
        node_type: row.get(2)?,
        name: row.get(3)?,
        source_file: row.get(4)?,
        language: language_from_str(&language_raw),
        semantic_tags: serde_json::from_str(&semantic_tags_raw).unwrap_or_default(),
        metadata: serde_json::from_str::<Metadata>(&metadata_raw).unwrap_or_default(),
        start_line: row.get(8)?,
        end_line: row.get(9)?,
    })
}

fn edge_from_row(row: &Row) -> rusqlite::Result<Edge> {
    let metadata_raw: String = row.get(5)?;
    Ok(Edge {
        id: EdgeId(row.get(0)?),
        from_node_id: NodeId(row.get(1)?),
        to_node_id: NodeId(row.get(2)?),
        edge_type: row.get(3)?,
        source_file: row.get(4)?,
        metadata: serde_json::from_str::<Metadata>(&metadata_raw).unwrap_or_default(),
        weight: row.get(6)?,
    })
}

fn language_from_str(value: &str) -> Language {
    Language::from_extension(match value {
        "typescript" => "ts",
        "tsx" => "tsx",
        "javascript" => "js",
        "jsx" => "jsx",
        "java" => "java",
        "python" => "py",
        "go" => "go",
        "markdown" => "md",
        other => other,
    })
    .unwrap_or(Language::TypeScript)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn store() -> GraphStore {
        let registry = Arc::new(Registry::with_core_types());
        GraphStore::new_in_memory(registry).unwrap()
    }

    fn sample_node(identifier: &str, name: &str) -> NodeInput {
        NodeInput {
            identifier: identifier.to_string(),
            node_type: "function".to_string(),
            name: name.to_string(),
            source_file: "src/a.ts".to_string(),
            language: Language::TypeScript,
            semantic_tags: vec!["public".to_string()],
            metadata: BTreeMap::new(),
            start_line: Some(1),
            end_line: Some(3),
        }
    }

    #[test]
    fn upsert_node_inserts_then_updates() {
        let store = store();
        let id1 = store.upsert_node(sample_node("demo/src/a.ts#function:run", "run")).unwrap();
        let mut updated = sample_node("demo/src/a.ts#function:run", "run");
        updated.end_line = Some(10);
        let id2 = store.upsert_node(updated).unwrap();
        assert_eq!(id1, id2);
        let node = store.get_node(id1).unwrap().unwrap();
        assert_eq!(node.end_line, Some(10));
    }

    #[test]
    fn upsert_edge_requires_known_type() {
        let store = store();
        let a = store.upsert_node(sample_node("demo/src/a.ts#function:a", "a")).unwrap();
        let b = store.upsert_node(sample_node("demo/src/a.ts#function:b", "b")).unwrap();
        let bad = EdgeInput {
            from_node_id: a,
            to_node_id: b,
            edge_type: "not_a_type".to_string(),
            source_file: "src/a.ts".to_string(),
            metadata: BTreeMap::new(),
            weight: None,
        };
        assert!(matches!(
            store.upsert_edge(bad),
            Err(GraphError::UnknownEdgeType(_))
        ));
    }

    #[test]
    fn upsert_edge_requires_source_file() {
        let store = store();
        let a = store.upsert_node(sample_node("demo/src/a.ts#function:a", "a")).unwrap();
        let b = store.upsert_node(sample_node("demo/src/a.ts#function:b", "b")).unwrap();
        let bad = EdgeInput {
            from_node_id: a,
            to_node_id: b,
            edge_type: "calls".to_string(),
            source_file: String::new(),
            metadata: BTreeMap::new(),
            weight: None,
        };
        assert!(matches!(store.upsert_edge(bad), Err(GraphError::MissingSourceFile)));
    }

    #[test]
    fn upsert_edge_dedupes_on_from_to_type() {
        let store = store();
        let a = store.upsert_node(sample_node("demo/src/a.ts#function:a", "a")).unwrap();
        let b = store.upsert_node(sample_node("demo/src/a.ts#function:b", "b")).unwrap();
        let edge = EdgeInput {
            from_node_id: a,
            to_node_id: b,
            edge_type: "calls".to_string(),
            source_file: "src/a.ts".to_string(),
            metadata: BTreeMap::new(),
            weight: Some(1.0),
        };
        let id1 = store.upsert_edge(edge.clone()).unwrap();
        let id2 = store.upsert_edge(edge).unwrap();
        assert_eq!(id1, id2);
        let stats = store.stats().unwrap();
        assert_eq!(stats.edge_count, 1);
    }

    #[test]
    fn delete_edges_by_source_and_types_scopes_to_owner() {
        let store = store();
        let a = store.upsert_node(sample_node("demo/src/a.ts#function:a", "a")).unwrap();
        let b = store.upsert_node(sample_node("demo/src/a.ts#function:b", "b")).unwrap();
        store
            .upsert_edge(EdgeInput {
                from_node_id: a,
                to_node_id: b,
                edge_type: "calls".to_string(),
                source_file: "src/a.ts".to_string(),
                metadata: BTreeMap::new(),
                weight: None,
            })
            .unwrap();
        store
            .upsert_edge(EdgeInput {
                from_node_id: a,
                to_node_id: b,
                edge_type: "references".to_string(),
                source_file: "src/other.ts".to_string(),
                metadata: BTreeMap::new(),
                weight: None,
            })
            .unwrap();

        let removed = store
            .delete_edges_by_source_and_types("src/a.ts".into(), &["calls".to_string()])
            .unwrap();
        assert_eq!(removed, 1);
        let stats = store.stats().unwrap();
        assert_eq!(stats.edge_count, 1);
    }

    #[test]
    fn find_nodes_filters_by_type_and_source_file() {
        let store = store();
        store.upsert_node(sample_node("demo/src/a.ts#function:a", "a")).unwrap();
        let mut other = sample_node("demo/src/b.ts#function:b", "b");
        other.source_file = "src/b.ts".to_string();
        store.upsert_node(other).unwrap();

        let found = store
            .find_nodes(&NodeFilter {
                source_file: Some("src/a.ts".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "a");
    }

    #[test]
    fn inference_cache_round_trips() {
        let store = store();
        let a = store.upsert_node(sample_node("demo/src/a.ts#function:a", "a")).unwrap();
        let b = store.upsert_node(sample_node("demo/src/a.ts#function:b", "b")).unwrap();
        let row = InferenceCacheRow {
            start_node_id: a,
            end_node_id: b,
            inferred_type: "depends_on".to_string(),
            edge_path: vec![EdgeId(1)],
            depth: 1,
            computed_at: chrono::Utc::now(),
        };
        store.upsert_inference_cache_row(&row).unwrap();
        assert_eq!(store.inference_cache_size().unwrap(), 1);

        let rows = store.inference_cache_rows(Some(a), None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].inferred_type, "depends_on");

        store.invalidate_inference_cache("depends_on").unwrap();
        assert_eq!(store.inference_cache_size().unwrap(), 0);

        store.upsert_inference_cache_row(&row).unwrap();
        store.clear_inference_cache().unwrap();
        assert_eq!(store.inference_cache_size().unwrap(), 0);
    }

    #[test]
    fn rewrite_node_references_redirects_edges_and_removes_node() {
        let store = store();
        let unknown = store
            .upsert_node(sample_node("demo/src/a.ts#unknown:User", "User"))
            .unwrap();
        let caller = store
            .upsert_node(sample_node("demo/src/a.ts#function:run", "run"))
            .unwrap();
        let resolved = store
            .upsert_node(sample_node("demo/src/types.ts#class:User", "User"))
            .unwrap();
        store
            .upsert_edge(EdgeInput {
                from_node_id: caller,
                to_node_id: unknown,
                edge_type: "references".to_string(),
                source_file: "src/a.ts".to_string(),
                metadata: BTreeMap::new(),
                weight: None,
            })
            .unwrap();

        store.rewrite_node_references(unknown, resolved).unwrap();

        let edges = store
            .find_edges(&EdgeFilter {
                from_node_id: Some(caller),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].to_node_id, resolved);
        assert!(store.get_node(unknown).unwrap().is_none());
    }
}
