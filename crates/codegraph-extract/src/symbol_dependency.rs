use crate::{Extractor, ExtractionContext, ExtractionStats, empty_metadata, reclaim_ownership, upsert_owned_edge, upsert_symbol_node};
use codegraph_core::{GraphResult, Language, node_types};
use codegraph_query::QueryRegistry;
use codegraph_storage::GraphStore;
use serde_json::json;

const OWNED: &[&str] = &["calls", "instantiates", "references", "extends", "implements"];

const SUPPORTED: &[Language] = &[
    Language::TypeScript,
    Language::Tsx,
    Language::JavaScript,
    Language::Jsx,
    Language::Java,
    Language::Python,
    Language::Go,
];

/// Emits `calls`, `instantiates`, `references`, `extends`, `implements`
/// edges. Each edge kind is independently gated by a
/// `scenario_config` flag (`enable_calls`, `enable_instantiates`,
/// `enable_references`, `enable_extends`, `enable_implements`), all
/// defaulting to enabled, so a scenario binding can narrow this
/// extractor's output without forking it.
pub struct SymbolDependencyExtractor;

fn call_query(language: Language) -> Option<(&'static str, &'static str)> {
    match language {
        Language::TypeScript | Language::Tsx | Language::JavaScript | Language::Jsx => {
            Some(("symdep-calls", "(call_expression function: (identifier) @callee) @call"))
        }
        Language::Python => Some(("symdep-calls", "(call function: (identifier) @callee) @call")),
        Language::Go => Some(("symdep-calls", "(call_expression function: (identifier) @callee) @call")),
        Language::Java => Some((
            "symdep-calls",
            "(method_invocation name: (identifier) @callee) @call",
        )),
        Language::Markdown => None,
    }
}

fn instantiation_query(language: Language) -> Option<(&'static str, &'static str)> {
    match language {
        Language::TypeScript | Language::Tsx | Language::JavaScript | Language::Jsx => Some((
            "symdep-instantiates",
            "(new_expression constructor: (identifier) @callee) @new",
        )),
        Language::Java => Some((
            "symdep-instantiates",
            "(object_creation_expression type: (type_identifier) @callee) @new",
        )),
        _ => None,
    }
}

fn extends_query(language: Language) -> Option<(&'static str, &'static str)> {
    match language {
        Language::TypeScript | Language::Tsx | Language::JavaScript | Language::Jsx => Some((
            "symdep-extends",
            "(class_declaration name: (type_identifier) @subject (class_heritage (extends_clause value: (identifier) @target)))",
        )),
        Language::Java => Some((
            "symdep-extends",
            "(class_declaration name: (identifier) @subject superclass: (superclass (type_identifier) @target))",
        )),
        Language::Python => Some((
            "symdep-extends",
            "(class_definition name: (identifier) @subject superclasses: (argument_list (identifier) @target))",
        )),
        _ => None,
    }
}

fn implements_query(language: Language) -> Option<(&'static str, &'static str)> {
    match language {
        Language::TypeScript | Language::Tsx => Some((
            "symdep-implements",
            "(class_declaration name: (type_identifier) @subject (class_heritage (implements_clause (type_identifier) @target)))",
        )),
        Language::Java => Some((
            "symdep-implements",
            "(class_declaration name: (identifier) @subject interfaces: (super_interfaces (type_list (type_identifier) @target)))",
        )),
        _ => None,
    }
}

fn reference_query(language: Language) -> Option<(&'static str, &'static str)> {
    match language {
        Language::TypeScript | Language::Tsx | Language::JavaScript | Language::Jsx => {
            Some(("symdep-references", "(identifier) @name"))
        }
        Language::Python => Some(("symdep-references", "(identifier) @name")),
        Language::Go => Some(("symdep-references", "(identifier) @name")),
        Language::Java => Some(("symdep-references", "(identifier) @name")),
        Language::Markdown => None,
    }
}

impl Extractor for SymbolDependencyExtractor {
    fn languages(&self) -> &'static [Language] {
        SUPPORTED
    }

    fn owned_edge_types(&self) -> &'static [&'static str] {
        OWNED
    }

    fn register_queries(&self, queries: &QueryRegistry) -> GraphResult<()> {
        for language in SUPPORTED {
            for (key, pattern) in [
                call_query(*language),
                instantiation_query(*language),
                extends_query(*language),
                implements_query(*language),
                reference_query(*language),
            ]
            .into_iter()
            .flatten()
            {
                queries.register(*language, key, pattern)?;
            }
        }
        Ok(())
    }

    fn extract(&self, ctx: &ExtractionContext, store: &GraphStore) -> GraphResult<ExtractionStats> {
        let mut stats = ExtractionStats::default();
        stats.edges_deleted += reclaim_ownership(store, &ctx.source_file, OWNED)?;

        let file_node = upsert_symbol_node(
            store,
            ctx,
            node_types::FILE,
            &ctx.source_file,
            vec![ctx.source_file.clone()],
            empty_metadata(),
        )?;

        if ctx.flag("enable_calls", true) {
            if let Some((key, _)) = call_query(ctx.language) {
                self.emit_target_edges(
                    ctx,
                    store,
                    file_node,
                    key,
                    "callee",
                    "calls",
                    Some(node_types::FUNCTION),
                    &mut stats,
                )?;
            }
        }
        if ctx.flag("enable_instantiates", true) {
            if let Some((key, _)) = instantiation_query(ctx.language) {
                self.emit_target_edges(
                    ctx,
                    store,
                    file_node,
                    key,
                    "callee",
                    "instantiates",
                    Some(node_types::CLASS),
                    &mut stats,
                )?;
            }
        }
        if ctx.flag("enable_extends", true) {
            if let Some((key, _)) = extends_query(ctx.language) {
                self.emit_subject_target_edges(ctx, store, key, "extends", Some(node_types::CLASS), &mut stats)?;
            }
        }
        if ctx.flag("enable_implements", true) {
            if let Some((key, _)) = implements_query(ctx.language) {
                self.emit_subject_target_edges(
                    ctx,
                    store,
                    key,
                    "implements",
                    Some(node_types::INTERFACE),
                    &mut stats,
                )?;
            }
        }
        if ctx.flag("enable_references", true) {
            if let Some((key, _)) = reference_query(ctx.language) {
                self.emit_target_edges(ctx, store, file_node, key, "name", "references", None, &mut stats)?;
            }
        }

        Ok(stats)
    }
}

impl SymbolDependencyExtractor {
    fn emit_target_edges(
        &self,
        ctx: &ExtractionContext,
        store: &GraphStore,
        from: codegraph_core::NodeId,
        query_key: &str,
        capture_name: &str,
        edge_type: &'static str,
        expected_type: Option<&'static str>,
        stats: &mut ExtractionStats,
    ) -> GraphResult<()> {
        let matches = ctx.queries.parse_and_run(ctx.language, query_key, &ctx.source)?;
        for m in &matches {
            let Some(capture) = m.capture(capture_name) else {
                continue;
            };
            let name = capture.text.clone();
            if name.is_empty() {
                continue;
            }
            let target = upsert_symbol_node(
                store,
                ctx,
                node_types::UNKNOWN,
                &name,
                vec!["symbol-reference".to_string(), name.clone()],
                unknown_metadata(&name, expected_type),
            )?;
            stats.nodes_upserted += 1;
            upsert_owned_edge(store, ctx, from, target, edge_type, empty_metadata())?;
            stats.edges_upserted += 1;
        }
        Ok(())
    }

    fn emit_subject_target_edges(
        &self,
        ctx: &ExtractionContext,
        store: &GraphStore,
        query_key: &str,
        edge_type: &'static str,
        expected_type: Option<&'static str>,
        stats: &mut ExtractionStats,
    ) -> GraphResult<()> {
        let matches = ctx.queries.parse_and_run(ctx.language, query_key, &ctx.source)?;
        for m in &matches {
            let (Some(subject_capture), Some(target_capture)) =
                (m.capture("subject"), m.capture("target"))
            else {
                continue;
            };
            let subject_name = subject_capture.text.clone();
            let target_name = target_capture.text.clone();
            if subject_name.is_empty() || target_name.is_empty() {
                continue;
            }

            let subject_node = upsert_symbol_node(
                store,
                ctx,
                node_types::CLASS,
                &subject_name,
                vec![subject_name.clone()],
                empty_metadata(),
            )?;
            stats.nodes_upserted += 1;

            let target_node = upsert_symbol_node(
                store,
                ctx,
                node_types::UNKNOWN,
                &target_name,
                vec!["symbol-reference".to_string(), target_name.clone()],
                unknown_metadata(&target_name, expected_type),
            )?;
            stats.nodes_upserted += 1;

            upsert_owned_edge(store, ctx, subject_node, target_node, edge_type, empty_metadata())?;
            stats.edges_upserted += 1;
        }
        Ok(())
    }
}

fn unknown_metadata(name: &str, expected_type: Option<&str>) -> codegraph_core::Metadata {
    let mut metadata = empty_metadata();
    metadata.insert("specifier".to_string(), json!(name));
    if let Some(expected_type) = expected_type {
        metadata.insert("expected_type".to_string(), json!(expected_type));
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegraph_registry::Registry;
    use codegraph_storage::EdgeFilter;
    use serde_json::json;
    use std::sync::Arc;

    fn ctx<'a>(queries: &'a QueryRegistry, scenario_config: serde_json::Value) -> ExtractionContext<'a> {
        ExtractionContext {
            project_name: "demo".to_string(),
            source_file: "src/shapes.ts".to_string(),
            language: Language::TypeScript,
            source: "class Square extends Shape {}\n".to_string(),
            queries,
            scenario_config,
        }
    }

    #[test]
    fn emits_extends_edge_from_subject_class_to_target() {
        let registry = Arc::new(Registry::with_core_types());
        let store = GraphStore::new_in_memory(registry).unwrap();
        let queries = QueryRegistry::new();
        let extractor = SymbolDependencyExtractor;
        extractor.register_queries(&queries).unwrap();

        extractor.extract(&ctx(&queries, serde_json::Value::Null), &store).unwrap();

        let extends = store
            .find_edges(&EdgeFilter {
                edge_type: Some("extends".to_string()),
                source_file: Some("src/shapes.ts".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(extends.len(), 1);
    }

    #[test]
    fn enable_extends_false_suppresses_the_edge_kind() {
        let registry = Arc::new(Registry::with_core_types());
        let store = GraphStore::new_in_memory(registry).unwrap();
        let queries = QueryRegistry::new();
        let extractor = SymbolDependencyExtractor;
        extractor.register_queries(&queries).unwrap();

        extractor
            .extract(&ctx(&queries, json!({"enable_extends": false})), &store)
            .unwrap();

        let extends = store
            .find_edges(&EdgeFilter {
                edge_type: Some("extends".to_string()),
                source_file: Some("src/shapes.ts".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert!(extends.is_empty());
    }
}
