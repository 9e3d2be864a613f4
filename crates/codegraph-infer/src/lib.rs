//! The Inference Engine: hierarchical, transitive, and inheritable
//! closure queries over the edge set, plus the derived Inference Cache
//! that makes repeat queries cheap.
//!
//! All three query kinds share the same discipline: cycles are guarded by
//! a *visited-prefix per path*, not a single global visited set, so two
//! distinct paths into the same node are never conflated.
use codegraph_core::{
    EdgeId, GraphError, GraphResult, InferenceCacheRow, InferredRelationship, NodeId,
};
use codegraph_registry::Registry;
use codegraph_storage::GraphStore;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub mod resolver;

pub use resolver::{Candidate, MatchKind, Resolver};

const DEFAULT_MAX_PATH_LENGTH: usize = 10;
const VALIDATE_MAX_DEPTH: usize = 50;
const VALIDATE_MAX_CYCLES_PER_TYPE: usize = 100;

/// Cache maintenance strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheSyncStrategy {
    Eager,
    Lazy,
    Manual,
}

impl Default for CacheSyncStrategy {
    fn default() -> Self {
        CacheSyncStrategy::Lazy
    }
}

/// Configuration for an `Engine` instance.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InferenceConfig {
    pub enable_cache: bool,
    pub cache_sync_strategy: CacheSyncStrategy,
    pub default_max_path_length: usize,
    pub default_max_hierarchy_depth: Option<usize>,
    pub enable_cycle_detection: bool,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            enable_cache: true,
            cache_sync_strategy: CacheSyncStrategy::Lazy,
            default_max_path_length: DEFAULT_MAX_PATH_LENGTH,
            default_max_hierarchy_depth: None,
            enable_cycle_detection: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HierarchicalOptions {
    pub include_children: bool,
    pub include_parents: bool,
    pub max_depth: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct TransitiveOptions {
    pub max_path_length: usize,
    pub detect_cycles: bool,
    pub relationship_types: Option<Vec<String>>,
    /// When true, attempting to extend a path back into a node already on
    /// its own prefix returns `CycleDetected` instead of silently pruning
    /// that branch.
    pub strict: bool,
}

impl Default for TransitiveOptions {
    fn default() -> Self {
        Self {
            max_path_length: DEFAULT_MAX_PATH_LENGTH,
            detect_cycles: true,
            relationship_types: None,
            strict: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InheritableOptions {
    pub max_inheritance_depth: usize,
}

impl Default for InheritableOptions {
    fn default() -> Self {
        Self {
            max_inheritance_depth: DEFAULT_MAX_PATH_LENGTH,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub ok: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub validated_count: usize,
}

/// The Inference Engine. Holds shared handles to the store and registry;
/// owns no mutable state of its own beyond a lazy-sync dirty marker, since
/// the cache itself lives in `codegraph-storage`'s `edge_inference_cache`
/// table.
pub struct Engine {
    store: Arc<GraphStore>,
    registry: Arc<Registry>,
    config: InferenceConfig,
    dirty: std::sync::atomic::AtomicBool,
}

impl Engine {
    pub fn new(store: Arc<GraphStore>, registry: Arc<Registry>, config: InferenceConfig) -> Self {
        Self {
            store,
            registry,
            config,
            dirty: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    /// Call after any edge mutation. Under `eager` this immediately
    /// resyncs the cache; under `lazy` it only flips the dirty marker so
    /// the next query resyncs; under `manual` it is a no-op — callers must
    /// invoke `sync_cache` themselves.
    pub fn notify_mutation(&self) -> GraphResult<()> {
        match self.config.cache_sync_strategy {
            CacheSyncStrategy::Eager => self.sync_cache(true),
            CacheSyncStrategy::Lazy => {
                self.dirty.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            }
            CacheSyncStrategy::Manual => Ok(()),
        }
    }

    fn maybe_sync_before_query(&self) -> GraphResult<()> {
        if !self.config.enable_cache {
            return Ok(());
        }
        if self.config.cache_sync_strategy == CacheSyncStrategy::Lazy
            && self.dirty.load(std::sync::atomic::Ordering::SeqCst)
        {
            self.sync_cache(false)?;
        }
        Ok(())
    }

    /// Recompute every transitive and inheritable closure from scratch and
    /// persist it to the cache. `force=true` always recomputes; otherwise
    /// this is a no-op when the engine isn't marked dirty (idempotent on a
    /// quiescent edge set either way, since recomputing yields the same
    /// rows).
    pub fn sync_cache(&self, force: bool) -> GraphResult<()> {
        if !force && !self.dirty.load(std::sync::atomic::Ordering::SeqCst) {
            return Ok(());
        }
        self.clear_cache()?;
        for edge_type in self.registry.transitive_types() {
            let relationships = self.transitive(None, &edge_type, TransitiveOptions::default())?;
            for rel in relationships {
                self.store.upsert_inference_cache_row(&InferenceCacheRow {
                    start_node_id: rel.from_node_id,
                    end_node_id: rel.to_node_id,
                    inferred_type: rel.edge_type.clone(),
                    edge_path: rel.edge_path,
                    depth: rel.depth,
                    computed_at: chrono::Utc::now(),
                })?;
            }
        }
        self.dirty.store(false, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    pub fn clear_cache(&self) -> GraphResult<()> {
        self.store.clear_inference_cache()
    }

    pub fn invalidate(&self, inferred_type: &str) -> GraphResult<usize> {
        self.store.invalidate_inference_cache(inferred_type)
    }

    /// Hierarchical query: a pure type-level rollup over the edge set, no
    /// graph traversal beyond edges already present. Returns the edges
    /// whose `type` is in the closure of `edge_type` under the registry's
    /// parent/child links. An unknown root type returns an empty result
    /// rather than erroring.
    pub fn hierarchical(
        &self,
        edge_type: &str,
        opts: HierarchicalOptions,
    ) -> GraphResult<Vec<InferredRelationship>> {
        if self.registry.get(edge_type).is_none() {
            return Ok(Vec::new());
        }

        let mut types: HashSet<String> = HashSet::new();
        types.insert(edge_type.to_string());

        if opts.include_children {
            collect_descendants(&self.registry, edge_type, opts.max_depth, &mut types);
        }
        if opts.include_parents {
            if let Ok(ancestors) = self.registry.ancestors(edge_type) {
                for (depth, def) in ancestors.into_iter().enumerate() {
                    if let Some(max) = opts.max_depth {
                        if depth + 1 > max {
                            break;
                        }
                    }
                    types.insert(def.edge_type);
                }
            }
        }

        let edges = self.store.all_edges()?;
        let mut out = Vec::new();
        for edge in edges {
            if !types.contains(&edge.edge_type) {
                continue;
            }
            out.push(InferredRelationship {
                from_node_id: edge.from_node_id,
                to_node_id: edge.to_node_id,
                edge_type: edge.edge_type.clone(),
                edge_path: vec![edge.id],
                depth: 1,
                inference_type: "hierarchical".to_string(),
                description: format!("direct '{}' edge rolled up under '{edge_type}'", edge.edge_type),
                source_file: Some(edge.source_file),
            });
        }
        Ok(out)
    }

    /// Transitive query: valid only for `is_transitive` edge types.
    /// Computes the fixed point A→B, B→C ⇒ A→C over the subgraph
    /// restricted to `edge_type` (plus any `relationship_types`).
    pub fn transitive(
        &self,
        start_node: Option<NodeId>,
        edge_type: &str,
        opts: TransitiveOptions,
    ) -> GraphResult<Vec<InferredRelationship>> {
        let def = self
            .registry
            .get(edge_type)
            .ok_or_else(|| GraphError::UnknownEdgeType(edge_type.to_string()))?;
        if !def.is_transitive {
            return Err(GraphError::TypeNotTransitive(edge_type.to_string()));
        }

        let mut allowed_types: HashSet<String> = HashSet::new();
        allowed_types.insert(edge_type.to_string());
        if let Some(extra) = &opts.relationship_types {
            allowed_types.extend(extra.iter().cloned());
        }

        let edges = self.store.all_edges()?;
        let mut adjacency: HashMap<NodeId, Vec<(NodeId, EdgeId)>> = HashMap::new();
        for edge in &edges {
            if allowed_types.contains(&edge.edge_type) {
                adjacency
                    .entry(edge.from_node_id)
                    .or_default()
                    .push((edge.to_node_id, edge.id));
            }
        }

        let starts: Vec<NodeId> = match start_node {
            Some(node) => vec![node],
            None => adjacency.keys().copied().collect(),
        };

        let mut out = Vec::new();
        for start in starts {
            out.extend(self.transitive_closure_from(start, &adjacency, edge_type, &opts)?);
        }
        Ok(out)
    }

    fn transitive_closure_from(
        &self,
        start: NodeId,
        adjacency: &HashMap<NodeId, Vec<(NodeId, EdgeId)>>,
        edge_type: &str,
        opts: &TransitiveOptions,
    ) -> GraphResult<Vec<InferredRelationship>> {
        let mut results = Vec::new();
        let mut seen_end: HashSet<NodeId> = HashSet::new();
        let mut frontier: Vec<(NodeId, Vec<NodeId>, Vec<EdgeId>)> = vec![(start, vec![start], Vec::new())];
        let mut depth = 0usize;

        while depth < opts.max_path_length && !frontier.is_empty() {
            depth += 1;
            let mut next_frontier = Vec::new();
            for (current, prefix, path) in frontier {
                let Some(edges_out) = adjacency.get(&current) else {
                    continue;
                };
                for (next, edge_id) in edges_out {
                    if prefix.contains(next) {
                        if opts.strict {
                            return Err(GraphError::CycleDetected(format!(
                                "transitive closure of '{edge_type}' from node {start} revisits node {next}"
                            )));
                        }
                        continue;
                    }
                    let mut new_prefix = prefix.clone();
                    new_prefix.push(*next);
                    let mut new_path = path.clone();
                    new_path.push(*edge_id);

                    if !seen_end.contains(next) {
                        seen_end.insert(*next);
                        results.push(InferredRelationship {
                            from_node_id: start,
                            to_node_id: *next,
                            edge_type: edge_type.to_string(),
                            edge_path: new_path.clone(),
                            depth: depth as u32,
                            inference_type: "transitive".to_string(),
                            description: format!(
                                "transitive '{edge_type}' chain of length {depth} from {start} to {next}"
                            ),
                            source_file: None,
                        });
                    }
                    next_frontier.push((*next, new_prefix, new_path));
                }
            }
            frontier = next_frontier;
        }
        Ok(results)
    }

    /// Inheritable query: valid only when `child_relation_type` is
    /// `is_inheritable`. Walks `parent_relation_type` hops from
    /// `start_node` (0, 1, 2, ... up to `max_inheritance_depth - 1`) and, at
    /// each hop count `h`, looks for direct `child_relation_type` edges out
    /// of the nodes reached — emitting `child_rel(start, target)` at depth
    /// `h + 1`. `max_inheritance_depth = 1` therefore returns only the
    /// direct one-step edges already on `start` itself (`h = 0`).
    pub fn inheritable(
        &self,
        start_node: NodeId,
        parent_relation_type: &str,
        child_relation_type: &str,
        opts: InheritableOptions,
    ) -> GraphResult<Vec<InferredRelationship>> {
        let child_def = self
            .registry
            .get(child_relation_type)
            .ok_or_else(|| GraphError::UnknownEdgeType(child_relation_type.to_string()))?;
        if !child_def.is_inheritable {
            return Err(GraphError::TypeNotInheritable(child_relation_type.to_string()));
        }
        if self.registry.get(parent_relation_type).is_none() {
            return Err(GraphError::UnknownEdgeType(parent_relation_type.to_string()));
        }

        let edges = self.store.all_edges()?;
        let mut parent_adj: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        let mut child_adj: HashMap<NodeId, Vec<(NodeId, EdgeId)>> = HashMap::new();
        for edge in &edges {
            if edge.edge_type == parent_relation_type {
                parent_adj.entry(edge.from_node_id).or_default().push(edge.to_node_id);
            }
            if edge.edge_type == child_relation_type {
                child_adj
                    .entry(edge.from_node_id)
                    .or_default()
                    .push((edge.to_node_id, edge.id));
            }
        }

        let mut results = Vec::new();
        let mut seen_target: HashSet<NodeId> = HashSet::new();
        let mut frontier: Vec<(NodeId, Vec<NodeId>)> = vec![(start_node, vec![start_node])];

        for hop in 0..opts.max_inheritance_depth {
            let mut next_frontier = Vec::new();
            for (node, prefix) in &frontier {
                if let Some(children) = child_adj.get(node) {
                    for (target, edge_id) in children {
                        if *target == start_node {
                            continue;
                        }
                        if !seen_target.contains(target) {
                            seen_target.insert(*target);
                            results.push(InferredRelationship {
                                from_node_id: start_node,
                                to_node_id: *target,
                                edge_type: child_relation_type.to_string(),
                                edge_path: vec![*edge_id],
                                depth: (hop + 1) as u32,
                                inference_type: "inheritable".to_string(),
                                description: format!(
                                    "'{child_relation_type}' inherited via {hop} '{parent_relation_type}' hop(s) from {start_node}"
                                ),
                                source_file: None,
                            });
                        }
                    }
                }
                if let Some(parents) = parent_adj.get(node) {
                    for parent_target in parents {
                        if prefix.contains(parent_target) {
                            continue;
                        }
                        let mut new_prefix = prefix.clone();
                        new_prefix.push(*parent_target);
                        next_frontier.push((*parent_target, new_prefix));
                    }
                }
            }
            if next_frontier.is_empty() {
                break;
            }
            frontier = next_frontier;
        }

        Ok(results)
    }

    /// Hierarchy checks plus, for every transitive type, a bounded cycle
    /// search (depth ≤ 50, ≤ 100 sample cycles per type reported as
    /// warnings, never errors — a cyclic graph is valid, traversal just
    /// has to terminate, which `transitive()`'s prefix guard already
    /// ensures).
    pub fn validate(&self) -> GraphResult<ValidationReport> {
        let hierarchy = self.registry.validate_hierarchy();
        let mut report = ValidationReport {
            ok: hierarchy.ok,
            errors: hierarchy.errors,
            warnings: Vec::new(),
            validated_count: 0,
        };

        let edges = self.store.all_edges()?;
        for edge_type in self.registry.transitive_types() {
            report.validated_count += 1;
            let mut adjacency: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
            for edge in &edges {
                if edge.edge_type == edge_type {
                    adjacency.entry(edge.from_node_id).or_default().push(edge.to_node_id);
                }
            }
            let mut cycles_found = 0;
            'outer: for &start in adjacency.keys() {
                if cycles_found >= VALIDATE_MAX_CYCLES_PER_TYPE {
                    break;
                }
                let mut stack = vec![(start, vec![start])];
                let mut steps = 0;
                while let Some((node, path)) = stack.pop() {
                    steps += 1;
                    if steps > VALIDATE_MAX_DEPTH * 4 {
                        break;
                    }
                    if path.len() > VALIDATE_MAX_DEPTH {
                        continue;
                    }
                    if let Some(next_nodes) = adjacency.get(&node) {
                        for next in next_nodes {
                            if *next == start && path.len() > 1 {
                                report.warnings.push(format!(
                                    "sample cycle in '{edge_type}': {:?} -> {next}",
                                    path
                                ));
                                cycles_found += 1;
                                if cycles_found >= VALIDATE_MAX_CYCLES_PER_TYPE {
                                    break 'outer;
                                }
                                continue;
                            }
                            if !path.contains(next) {
                                let mut new_path = path.clone();
                                new_path.push(*next);
                                stack.push((*next, new_path));
                            }
                        }
                    }
                }
            }
        }

        Ok(report)
    }
}

fn collect_descendants(
    registry: &Registry,
    edge_type: &str,
    max_depth: Option<usize>,
    out: &mut HashSet<String>,
) {
    fn walk(
        registry: &Registry,
        edge_type: &str,
        depth: usize,
        max_depth: Option<usize>,
        out: &mut HashSet<String>,
    ) {
        if let Some(max) = max_depth {
            if depth > max {
                return;
            }
        }
        for child in registry.children(edge_type) {
            if out.insert(child.edge_type.clone()) {
                walk(registry, &child.edge_type, depth + 1, max_depth, out);
            }
        }
    }
    walk(registry, edge_type, 1, max_depth, out);
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegraph_core::{EdgeInput, Language, NodeInput};
    use std::collections::BTreeMap;

    fn engine() -> (Engine, Arc<GraphStore>) {
        let registry = Arc::new(Registry::with_core_types());
        let store = Arc::new(GraphStore::new_in_memory(registry.clone()).unwrap());
        let engine = Engine::new(store.clone(), registry, InferenceConfig::default());
        (engine, store)
    }

    fn node(store: &GraphStore, name: &str) -> NodeId {
        store
            .upsert_node(NodeInput {
                identifier: format!("demo/src/a.ts#function:{name}"),
                node_type: "function".to_string(),
                name: name.to_string(),
                source_file: "src/a.ts".to_string(),
                language: Language::TypeScript,
                semantic_tags: Vec::new(),
                metadata: BTreeMap::new(),
                start_line: None,
                end_line: None,
            })
            .unwrap()
    }

    fn edge(store: &GraphStore, from: NodeId, to: NodeId, edge_type: &str) {
        store
            .upsert_edge(EdgeInput {
                from_node_id: from,
                to_node_id: to,
                edge_type: edge_type.to_string(),
                source_file: "src/a.ts".to_string(),
                metadata: BTreeMap::new(),
                weight: None,
            })
            .unwrap();
    }

    #[test]
    fn transitive_closure_with_cycle_terminates() {
        let (engine, store) = engine();
        let a = node(&store, "a");
        let b = node(&store, "b");
        let c = node(&store, "c");
        edge(&store, a, b, "depends_on");
        edge(&store, b, c, "depends_on");
        edge(&store, c, a, "depends_on");

        let from_a = engine
            .transitive(Some(a), "depends_on", TransitiveOptions::default())
            .unwrap();
        let pairs: Vec<(NodeId, NodeId, u32)> = from_a
            .iter()
            .map(|r| (r.from_node_id, r.to_node_id, r.depth))
            .collect();
        assert_eq!(pairs, vec![(a, b, 1), (a, c, 2)]);

        let from_b = engine
            .transitive(Some(b), "depends_on", TransitiveOptions::default())
            .unwrap();
        let pairs_b: Vec<(NodeId, NodeId)> = from_b.iter().map(|r| (r.from_node_id, r.to_node_id)).collect();
        assert_eq!(pairs_b, vec![(b, c), (b, a)]);
    }

    #[test]
    fn transitive_rejects_non_transitive_type() {
        let (engine, _store) = engine();
        let err = engine.transitive(None, "calls", TransitiveOptions::default());
        assert!(err.is_err());
    }

    #[test]
    fn transitive_max_path_length_zero_returns_direct_only() {
        let (engine, store) = engine();
        let a = node(&store, "a");
        let b = node(&store, "b");
        let c = node(&store, "c");
        edge(&store, a, b, "depends_on");
        edge(&store, b, c, "depends_on");

        let mut opts = TransitiveOptions::default();
        opts.max_path_length = 0;
        let result = engine.transitive(Some(a), "depends_on", opts).unwrap();
        assert!(result.is_empty());

        let mut opts1 = TransitiveOptions::default();
        opts1.max_path_length = 1;
        let result1 = engine.transitive(Some(a), "depends_on", opts1).unwrap();
        assert_eq!(result1.len(), 1);
        assert_eq!(result1[0].to_node_id, b);
    }

    #[test]
    fn hierarchical_rollup_includes_children() {
        let (engine, store) = engine();
        let x = node(&store, "x");
        let y = node(&store, "y");
        let z = node(&store, "z");
        edge(&store, x, y, "imports_library");
        edge(&store, x, z, "imports_file");

        let results = engine
            .hierarchical(
                "imports",
                HierarchicalOptions {
                    include_children: true,
                    include_parents: false,
                    max_depth: None,
                },
            )
            .unwrap();
        assert_eq!(results.len(), 2);

        let depends_on = engine
            .hierarchical(
                "depends_on",
                HierarchicalOptions {
                    include_children: true,
                    include_parents: false,
                    max_depth: None,
                },
            )
            .unwrap();
        assert_eq!(depends_on.len(), 2);
    }

    #[test]
    fn hierarchical_unknown_type_returns_empty() {
        let (engine, _store) = engine();
        let results = engine
            .hierarchical("not_a_real_type", HierarchicalOptions::default())
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn inheritable_propagates_through_contains() {
        let (engine, store) = engine();
        let f = node(&store, "F");
        let c = node(&store, "C");
        let b = node(&store, "B");
        edge(&store, f, c, "contains");
        edge(&store, c, b, "extends");

        let result = engine
            .inheritable(
                f,
                "contains",
                "extends",
                InheritableOptions {
                    max_inheritance_depth: 2,
                },
            )
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].to_node_id, b);
        assert_eq!(result[0].depth, 2);
    }

    #[test]
    fn inheritable_depth_one_returns_only_direct_edges() {
        let (engine, store) = engine();
        let f = node(&store, "F");
        let c = node(&store, "C");
        let b = node(&store, "B");
        edge(&store, f, c, "contains");
        edge(&store, c, b, "extends");

        let result = engine
            .inheritable(
                f,
                "contains",
                "extends",
                InheritableOptions {
                    max_inheritance_depth: 1,
                },
            )
            .unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn sync_cache_persists_transitive_closure() {
        let (engine, store) = engine();
        let a = node(&store, "a");
        let b = node(&store, "b");
        let c = node(&store, "c");
        edge(&store, a, b, "depends_on");
        edge(&store, b, c, "depends_on");

        engine.sync_cache(true).unwrap();
        let rows = store.inference_cache_rows(Some(a), Some("depends_on")).unwrap();
        assert_eq!(rows.len(), 2);

        // Idempotent on a quiescent edge set.
        engine.sync_cache(true).unwrap();
        let rows_again = store.inference_cache_rows(Some(a), Some("depends_on")).unwrap();
        assert_eq!(rows_again.len(), 2);
    }

    #[test]
    fn validate_reports_registry_errors_and_sample_cycles() {
        let (engine, store) = engine();
        let a = node(&store, "a");
        let b = node(&store, "b");
        edge(&store, a, b, "depends_on");
        edge(&store, b, a, "depends_on");

        let report = engine.validate().unwrap();
        assert!(report.ok);
        assert!(!report.warnings.is_empty());
    }
}
