use super::*;

const TABLE_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS nodes (
        id INTEGER PRIMARY KEY,
        identifier TEXT UNIQUE NOT NULL,
        node_type TEXT NOT NULL,
        name TEXT NOT NULL,
        source_file TEXT NOT NULL,
        language TEXT NOT NULL,
        semantic_tags TEXT NOT NULL DEFAULT '[]',
        metadata TEXT NOT NULL DEFAULT '{}',
        start_line INTEGER,
        end_line INTEGER
    )",
    "CREATE TABLE IF NOT EXISTS edges (
        id INTEGER PRIMARY KEY,
        from_node_id INTEGER NOT NULL,
        to_node_id INTEGER NOT NULL,
        edge_type TEXT NOT NULL,
        source_file TEXT NOT NULL,
        metadata TEXT NOT NULL DEFAULT '{}',
        weight REAL,
        created_at TEXT NOT NULL,
        FOREIGN KEY(from_node_id) REFERENCES nodes(id),
        FOREIGN KEY(to_node_id) REFERENCES nodes(id)
    )",
    "CREATE TABLE IF NOT EXISTS edge_types (
        edge_type TEXT PRIMARY KEY,
        description TEXT NOT NULL,
        schema TEXT,
        is_directed INTEGER NOT NULL DEFAULT 1,
        parent_type TEXT,
        is_transitive INTEGER NOT NULL DEFAULT 0,
        is_inheritable INTEGER NOT NULL DEFAULT 0,
        priority INTEGER NOT NULL DEFAULT 0,
        FOREIGN KEY(parent_type) REFERENCES edge_types(edge_type)
    )",
    "CREATE TABLE IF NOT EXISTS edge_inference_cache (
        start_node_id INTEGER NOT NULL,
        end_node_id INTEGER NOT NULL,
        inferred_type TEXT NOT NULL,
        edge_path TEXT NOT NULL,
        depth INTEGER NOT NULL,
        computed_at TEXT NOT NULL,
        PRIMARY KEY (start_node_id, end_node_id, inferred_type)
    )",
    "CREATE TABLE IF NOT EXISTS context_documents (
        document_key TEXT PRIMARY KEY,
        node_identifier TEXT NOT NULL,
        content TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
];

const INDEX_STATEMENTS: &[&str] = &[
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_nodes_identifier ON nodes(identifier)",
    "CREATE INDEX IF NOT EXISTS idx_nodes_source_file ON nodes(source_file)",
    "CREATE INDEX IF NOT EXISTS idx_nodes_node_type ON nodes(node_type)",
    "CREATE INDEX IF NOT EXISTS idx_edges_type ON edges(edge_type)",
    "CREATE INDEX IF NOT EXISTS idx_edges_from_type ON edges(from_node_id, edge_type)",
    "CREATE INDEX IF NOT EXISTS idx_edges_to_type ON edges(to_node_id, edge_type)",
    "CREATE INDEX IF NOT EXISTS idx_edges_source_file_type ON edges(source_file, edge_type)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_edges_dedupe ON edges(from_node_id, to_node_id, edge_type)",
    "CREATE INDEX IF NOT EXISTS idx_inference_cache_start ON edge_inference_cache(start_node_id)",
    "CREATE INDEX IF NOT EXISTS idx_inference_cache_type ON edge_inference_cache(inferred_type)",
    "CREATE INDEX IF NOT EXISTS idx_context_documents_node ON context_documents(node_identifier)",
];

pub(super) fn create_tables(conn: &Connection) -> Result<(), GraphError> {
    for statement in TABLE_STATEMENTS {
        conn.execute(statement, [])
            .map_err(|e| GraphError::Io(e.to_string()))?;
    }
    Ok(())
}

pub(super) fn create_indexes(conn: &Connection) -> Result<(), GraphError> {
    for statement in INDEX_STATEMENTS {
        conn.execute(statement, [])
            .map_err(|e| GraphError::Io(e.to_string()))?;
    }
    Ok(())
}

pub(super) fn apply_schema_migrations(store: &GraphStore) -> Result<(), GraphError> {
    let stored_version = store.schema_version()?;

    if stored_version > SCHEMA_VERSION {
        return Err(GraphError::ConfigurationInvalid(format!(
            "unsupported database schema version: {stored_version} (max supported: {SCHEMA_VERSION})"
        )));
    }

    if stored_version < 2 {
        migrate_v2_weight_default(&store.conn.lock())?;
        store.set_schema_version(2)?;
    }

    if stored_version < SCHEMA_VERSION {
        store.set_schema_version(SCHEMA_VERSION)?;
    }
    Ok(())
}

fn migrate_v2_weight_default(conn: &Connection) -> Result<(), GraphError> {
    try_add_column(conn, "edges", "weight REAL")?;
    Ok(())
}

pub(super) fn try_add_column(
    conn: &Connection,
    table: &str,
    column_sql: &str,
) -> Result<(), GraphError> {
    let column_name = column_sql
        .split_whitespace()
        .next()
        .ok_or_else(|| GraphError::ConfigurationInvalid("missing column name in migration".into()))?;
    let pragma = format!("PRAGMA table_info({table})");
    let mut stmt = conn
        .prepare(&pragma)
        .map_err(|e| GraphError::Io(e.to_string()))?;
    let mut rows = stmt.query([]).map_err(|e| GraphError::Io(e.to_string()))?;
    while let Some(row) = rows.next().map_err(|e| GraphError::Io(e.to_string()))? {
        let existing_name: String = row.get(1).map_err(|e| GraphError::Io(e.to_string()))?;
        if existing_name == column_name {
            return Ok(());
        }
    }

    let sql = format!("ALTER TABLE {table} ADD COLUMN {column_sql}");
    conn.execute(&sql, []).map_err(|e| GraphError::Io(e.to_string()))?;
    Ok(())
}
