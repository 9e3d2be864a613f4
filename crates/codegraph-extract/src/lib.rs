//! Per-language-family extractors. Each `Extractor` is specified by the
//! edge kinds it produces, not by its internals: it declares
//! `owned_edge_types()` and, given a file's source and parsed tree,
//! deletes its previously-owned edges for that file before upserting its
//! new output — the Ownership Protocol discipline, enforced here rather
//! than left to each caller.
use codegraph_core::{EdgeInput, GraphResult, Language, Metadata, NodeId, NodeInput, identifier};
use codegraph_query::QueryRegistry;
use codegraph_storage::GraphStore;
use std::collections::BTreeMap;

pub mod file_dependency;
pub mod markdown_link;
pub mod structure;
pub mod symbol_dependency;

pub use file_dependency::FileDependencyExtractor;
pub use markdown_link::MarkdownLinkExtractor;
pub use structure::StructureExtractor;
pub use symbol_dependency::SymbolDependencyExtractor;

/// Everything an extractor needs for one file, independent of which
/// analyzer is consuming it. `scenario_config` carries the orchestrator's
/// per-scenario `scenario_config` entry so an extractor can gate optional
/// edge kinds without the orchestrator needing to know about its
/// internals.
pub struct ExtractionContext<'a> {
    pub project_name: String,
    pub source_file: String,
    pub language: Language,
    pub source: String,
    pub queries: &'a QueryRegistry,
    pub scenario_config: serde_json::Value,
}

impl<'a> ExtractionContext<'a> {
    /// Read a boolean flag out of `scenario_config`, defaulting to `true`
    /// when absent so extractors emit their full edge set unless a
    /// scenario explicitly opts out.
    pub fn flag(&self, key: &str, default: bool) -> bool {
        self.scenario_config
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(default)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionStats {
    pub nodes_upserted: usize,
    pub edges_deleted: usize,
    pub edges_upserted: usize,
}

impl ExtractionStats {
    pub fn merge(&mut self, other: ExtractionStats) {
        self.nodes_upserted += other.nodes_upserted;
        self.edges_deleted += other.edges_deleted;
        self.edges_upserted += other.edges_upserted;
    }
}

impl From<ExtractionStats> for codegraph_core::BatchStats {
    fn from(stats: ExtractionStats) -> Self {
        codegraph_core::BatchStats {
            nodes_upserted: stats.nodes_upserted,
            edges_deleted: stats.edges_deleted,
            edges_upserted: stats.edges_upserted,
        }
    }
}

/// `Send + Sync` so a fixed `Vec<Box<dyn Extractor>>` can be shared
/// (`&[Box<dyn Extractor>]`) across rayon's file-level worker threads, the
/// same way `GraphStore` is.
pub trait Extractor: Send + Sync {
    fn languages(&self) -> &'static [Language];
    fn owned_edge_types(&self) -> &'static [&'static str];

    /// Register this extractor's query patterns for every language it
    /// supports. Called once at process init, before any `extract` call.
    fn register_queries(&self, queries: &QueryRegistry) -> GraphResult<()>;

    fn extract(&self, ctx: &ExtractionContext, store: &GraphStore) -> GraphResult<ExtractionStats>;
}

/// Delete this extractor's previously-owned edges for `source_file` before
/// it upserts new ones — the only place bulk deletes happen, and the sole
/// caller of `GraphStore::delete_edges_by_source_and_types`.
fn reclaim_ownership(
    store: &GraphStore,
    source_file: &str,
    owned: &'static [&'static str],
) -> GraphResult<usize> {
    let owned: Vec<String> = owned.iter().map(|s| s.to_string()).collect();
    store.delete_edges_by_source_and_types(source_file, &owned)
}

fn node_identifier(
    project_name: &str,
    source_file: &str,
    node_type: &str,
    symbol_path: Vec<String>,
) -> String {
    identifier::format(&identifier::IdentifierParts {
        project_name: project_name.to_string(),
        relative_file_path: source_file.to_string(),
        node_type: node_type.to_string(),
        symbol_path,
    })
}

fn empty_metadata() -> Metadata {
    BTreeMap::new()
}

fn upsert_symbol_node(
    store: &GraphStore,
    ctx: &ExtractionContext,
    node_type: &str,
    name: &str,
    symbol_path: Vec<String>,
    metadata: Metadata,
) -> GraphResult<NodeId> {
    let identifier = node_identifier(&ctx.project_name, &ctx.source_file, node_type, symbol_path);
    store.upsert_node(NodeInput {
        identifier,
        node_type: node_type.to_string(),
        name: name.to_string(),
        source_file: ctx.source_file.clone(),
        language: ctx.language,
        semantic_tags: Vec::new(),
        metadata,
        start_line: None,
        end_line: None,
    })
}

fn upsert_owned_edge(
    store: &GraphStore,
    ctx: &ExtractionContext,
    from: NodeId,
    to: NodeId,
    edge_type: &str,
    metadata: Metadata,
) -> GraphResult<()> {
    store.upsert_edge(EdgeInput {
        from_node_id: from,
        to_node_id: to,
        edge_type: edge_type.to_string(),
        source_file: ctx.source_file.clone(),
        metadata,
        weight: None,
    })?;
    Ok(())
}

/// Dispatch by language+scenario, not by subclass hierarchy: a run over a
/// namespace walks this fixed list rather than a trait-object registry
/// with dynamic dispatch tables.
pub fn all_extractors() -> Vec<Box<dyn Extractor>> {
    vec![
        Box::new(FileDependencyExtractor),
        Box::new(SymbolDependencyExtractor),
        Box::new(StructureExtractor),
        Box::new(MarkdownLinkExtractor),
    ]
}
