//! The Edge Type Registry: a catalog of edge type slugs, their declared
//! parent/child hierarchy, and the `is_transitive`/`is_inheritable`
//! flags the Inference Engine consults before running a closure query.
//!
//! Two tiers are kept apart in separate maps, mirroring the
//! `parking_lot::RwLock`-guarded shared state pattern used for the node
//! cache in the storage layer: core types are seeded once at construction
//! and never change; extended types are registered at runtime by
//! analyzers before their first use.
use codegraph_core::{EdgeTypeDef, GraphError, GraphResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

const MAX_HIERARCHY_DEPTH: usize = 3;

pub struct Registry {
    core: HashMap<String, EdgeTypeDef>,
    extended: RwLock<HashMap<String, EdgeTypeDef>>,
    /// Set once the first analyzer write reaches the store. Spec requires
    /// late `register` calls after that point to be rejected rather than
    /// silently accepted (spec.md §9 "registry initialization freeze").
    frozen: AtomicBool,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub ok: bool,
    pub errors: Vec<String>,
}

impl Registry {
    /// Load the canonical seed hierarchy. This is the only source of core
    /// types; callers add analyzer-specific types through `register`.
    pub fn with_core_types() -> Self {
        let core = core_seed()
            .into_iter()
            .map(|def| (def.edge_type.clone(), def))
            .collect();
        Self {
            core,
            extended: RwLock::new(HashMap::new()),
            frozen: AtomicBool::new(false),
        }
    }

    /// Freeze the registry against further `register` calls. Idempotent;
    /// called by the storage layer the moment the first node or edge is
    /// written, since that is the earliest point an analyzer run could
    /// actually depend on the current type set.
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::SeqCst);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }

    pub fn get(&self, edge_type: &str) -> Option<EdgeTypeDef> {
        if let Some(def) = self.core.get(edge_type) {
            return Some(def.clone());
        }
        self.extended.read().get(edge_type).cloned()
    }

    pub fn all(&self) -> Vec<EdgeTypeDef> {
        let mut out: Vec<EdgeTypeDef> = self.core.values().cloned().collect();
        out.extend(self.extended.read().values().cloned());
        out
    }

    pub fn children(&self, edge_type: &str) -> Vec<EdgeTypeDef> {
        self.all()
            .into_iter()
            .filter(|def| def.parent_type.as_deref() == Some(edge_type))
            .collect()
    }

    /// Walk `parent_type` pointers up to `MAX_HIERARCHY_DEPTH`, failing with
    /// `CycleDetected` or `DepthExceeded` rather than looping forever.
    pub fn ancestors(&self, edge_type: &str) -> GraphResult<Vec<EdgeTypeDef>> {
        let mut chain = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let mut current = edge_type.to_string();
        seen.insert(current.clone());

        loop {
            let def = self
                .get(&current)
                .ok_or_else(|| GraphError::UnknownEdgeType(current.clone()))?;
            match def.parent_type.clone() {
                None => break,
                Some(parent) => {
                    if !seen.insert(parent.clone()) {
                        return Err(GraphError::CycleDetected(format!(
                            "edge type hierarchy cycles back to '{parent}'"
                        )));
                    }
                    if chain.len() + 1 > MAX_HIERARCHY_DEPTH {
                        return Err(GraphError::DepthExceeded {
                            max: MAX_HIERARCHY_DEPTH,
                        });
                    }
                    let parent_def = self
                        .get(&parent)
                        .ok_or_else(|| GraphError::UnknownEdgeType(parent.clone()))?;
                    chain.push(parent_def);
                    current = parent;
                }
            }
        }
        Ok(chain)
    }

    pub fn transitive_types(&self) -> Vec<String> {
        self.all()
            .into_iter()
            .filter(|def| def.is_transitive)
            .map(|def| def.edge_type)
            .collect()
    }

    pub fn inheritable_types(&self) -> Vec<String> {
        self.all()
            .into_iter()
            .filter(|def| def.is_inheritable)
            .map(|def| def.edge_type)
            .collect()
    }

    /// Register an extended (analyzer-contributed) edge type. Idempotent
    /// if the incoming definition is identical to one already registered;
    /// an error if the slug exists with a conflicting definition, or if it
    /// collides with a core type.
    pub fn register(&self, def: EdgeTypeDef) -> GraphResult<()> {
        if let Some(existing) = self.core.get(&def.edge_type) {
            if existing == &def {
                return Ok(());
            }
            return Err(GraphError::HierarchyViolation(format!(
                "'{}' is already a core edge type",
                def.edge_type
            )));
        }

        let mut extended = self.extended.write();
        let already_registered = matches!(extended.get(&def.edge_type), Some(existing) if existing == &def);
        if self.is_frozen() && !already_registered {
            return Err(GraphError::RegistryLocked(format!(
                "cannot register '{}': registry is frozen after the first analyzer write",
                def.edge_type
            )));
        }
        match extended.get(&def.edge_type) {
            Some(existing) if existing == &def => Ok(()),
            Some(_) => Err(GraphError::HierarchyViolation(format!(
                "'{}' is already registered with a conflicting definition",
                def.edge_type
            ))),
            None => {
                if let Some(parent) = &def.parent_type {
                    if self.core.get(parent).is_none() && !extended.contains_key(parent) {
                        return Err(GraphError::HierarchyViolation(format!(
                            "parent type '{parent}' does not exist"
                        )));
                    }
                }
                extended.insert(def.edge_type.clone(), def);
                Ok(())
            }
        }
    }

    /// Every `parent_type` resolves, there are no cycles, and no chain
    /// exceeds `MAX_HIERARCHY_DEPTH`. `is_transitive`/`is_inheritable`
    /// monotonicity along ancestors is checked only as a warning.
    pub fn validate_hierarchy(&self) -> ValidationResult {
        let mut result = ValidationResult {
            ok: true,
            errors: Vec::new(),
        };
        for def in self.all() {
            if let Err(err) = self.ancestors(&def.edge_type) {
                result.ok = false;
                result.errors.push(format!("{}: {err}", def.edge_type));
            }
        }
        result
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_core_types()
    }
}

fn def(
    edge_type: &str,
    parent: Option<&str>,
    is_transitive: bool,
    is_inheritable: bool,
) -> EdgeTypeDef {
    EdgeTypeDef {
        edge_type: edge_type.to_string(),
        description: format!("core edge type '{edge_type}'"),
        schema: None,
        is_directed: true,
        parent_type: parent.map(str::to_string),
        is_transitive,
        is_inheritable,
        priority: 0,
    }
}

fn core_seed() -> Vec<EdgeTypeDef> {
    vec![
        def("depends_on", None, true, false),
        def("imports", Some("depends_on"), false, false),
        def("imports_library", Some("imports"), false, false),
        def("imports_file", Some("imports"), false, false),
        def("calls", Some("depends_on"), false, false),
        def("references", Some("depends_on"), false, false),
        def("extends", Some("depends_on"), false, true),
        def("implements", Some("depends_on"), false, true),
        def("uses", Some("depends_on"), false, false),
        def("instantiates", Some("depends_on"), false, false),
        def("accesses", Some("depends_on"), false, false),
        def("contains", None, true, true),
        def("declares", Some("contains"), false, true),
        def("belongs_to", None, true, false),
        def("has_type", None, false, false),
        def("returns", None, false, false),
        def("throws", None, false, false),
        def("assigns_to", None, false, false),
        def("overrides", None, false, false),
        def("shadows", None, false, false),
        def("annotated_with", None, false, false),
        def("exports_to", None, false, false),
        def("aliasOf", None, false, false),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_types_resolve() {
        let registry = Registry::with_core_types();
        assert!(registry.get("depends_on").is_some());
        assert!(registry.get("imports_library").is_some());
        assert!(registry.get("not_a_real_type").is_none());
    }

    #[test]
    fn children_of_depends_on() {
        let registry = Registry::with_core_types();
        let children: Vec<String> = registry
            .children("depends_on")
            .into_iter()
            .map(|d| d.edge_type)
            .collect();
        assert!(children.contains(&"imports".to_string()));
        assert!(children.contains(&"calls".to_string()));
        assert!(children.contains(&"extends".to_string()));
    }

    #[test]
    fn ancestors_bounded_by_depth() {
        let registry = Registry::with_core_types();
        let ancestors = registry.ancestors("imports_library").unwrap();
        let names: Vec<String> = ancestors.into_iter().map(|d| d.edge_type).collect();
        assert_eq!(names, vec!["imports", "depends_on"]);
    }

    #[test]
    fn transitive_and_inheritable_sets() {
        let registry = Registry::with_core_types();
        let transitive = registry.transitive_types();
        assert!(transitive.contains(&"depends_on".to_string()));
        assert!(transitive.contains(&"contains".to_string()));
        assert!(transitive.contains(&"belongs_to".to_string()));
        assert!(!transitive.contains(&"calls".to_string()));

        let inheritable = registry.inheritable_types();
        assert!(inheritable.contains(&"extends".to_string()));
        assert!(inheritable.contains(&"implements".to_string()));
        assert!(inheritable.contains(&"contains".to_string()));
        assert!(inheritable.contains(&"declares".to_string()));
    }

    #[test]
    fn validate_hierarchy_passes_on_seed() {
        let registry = Registry::with_core_types();
        let result = registry.validate_hierarchy();
        assert!(result.ok, "errors: {:?}", result.errors);
    }

    #[test]
    fn register_extended_type_succeeds_once() {
        let registry = Registry::with_core_types();
        let custom = def("custom_thing", Some("depends_on"), false, false);
        registry.register(custom.clone()).unwrap();
        assert!(registry.get("custom_thing").is_some());
        // Idempotent re-registration with the same definition is fine.
        registry.register(custom).unwrap();
    }

    #[test]
    fn register_conflicting_definition_fails() {
        let registry = Registry::with_core_types();
        let first = def("custom_thing", Some("depends_on"), false, false);
        let second = def("custom_thing", Some("contains"), false, false);
        registry.register(first).unwrap();
        assert!(registry.register(second).is_err());
    }

    #[test]
    fn register_colliding_with_core_type_fails() {
        let registry = Registry::with_core_types();
        let conflicting = def("depends_on", None, false, false);
        assert!(registry.register(conflicting).is_err());
    }

    #[test]
    fn register_with_unknown_parent_fails() {
        let registry = Registry::with_core_types();
        let orphan = def("custom_thing", Some("does_not_exist"), false, false);
        assert!(registry.register(orphan).is_err());
    }

    #[test]
    fn register_after_freeze_is_rejected() {
        let registry = Registry::with_core_types();
        let custom = def("custom_thing", Some("depends_on"), false, false);
        registry.register(custom.clone()).unwrap();

        registry.freeze();
        assert!(registry.is_frozen());

        // Re-registering the same definition is still fine post-freeze.
        registry.register(custom).unwrap();

        let late = def("late_thing", Some("depends_on"), false, false);
        let err = registry.register(late).unwrap_err();
        assert!(matches!(err, GraphError::RegistryLocked(_)));
    }
}
