use crate::{Extractor, ExtractionContext, ExtractionStats, empty_metadata, reclaim_ownership, upsert_owned_edge, upsert_symbol_node};
use codegraph_core::{GraphResult, Language, node_types};
use codegraph_query::QueryRegistry;
use codegraph_storage::GraphStore;
use serde_json::json;

const OWNED: &[&str] = &["imports", "imports_library", "imports_file", "exports_to", "aliasOf"];

const SUPPORTED: &[Language] = &[
    Language::TypeScript,
    Language::Tsx,
    Language::JavaScript,
    Language::Jsx,
    Language::Java,
    Language::Python,
    Language::Go,
];

/// Emits `imports`/`imports_library`/`imports_file` edges from a file node
/// to an `import-source` node per specifier, plus `exports_to` when a
/// re-export form is present.
pub struct FileDependencyExtractor;

fn import_query_key(language: Language) -> &'static str {
    match language {
        Language::TypeScript | Language::Tsx | Language::JavaScript | Language::Jsx => {
            "js-family-imports"
        }
        Language::Python => "python-imports",
        Language::Go => "go-imports",
        Language::Java => "java-imports",
        Language::Markdown => unreachable!("markdown has no file-dependency extractor"),
    }
}

fn export_query_key(language: Language) -> Option<&'static str> {
    match language {
        Language::TypeScript | Language::Tsx | Language::JavaScript | Language::Jsx => {
            Some("js-family-reexports")
        }
        _ => None,
    }
}

/// Named-import specifiers (`import { User } from './types'`), distinct
/// from the module-level `js-family-imports` query above: one match per
/// imported binding rather than per `import_statement`, so each binding
/// gets its own Unknown Symbol / alias-symbol pair (spec §4.8's dual-node
/// pattern) instead of collapsing every name on one statement together.
fn named_import_query_key(language: Language) -> Option<&'static str> {
    match language {
        Language::TypeScript | Language::Tsx | Language::JavaScript | Language::Jsx => {
            Some("js-family-named-imports")
        }
        _ => None,
    }
}

/// A specifier is a relative/path-like import (`imports_file`) when it
/// starts with `.` or `/`; everything else is treated as a library
/// specifier (`imports_library`).
fn classify(specifier: &str) -> &'static str {
    if specifier.starts_with('.') || specifier.starts_with('/') {
        "imports_file"
    } else {
        "imports_library"
    }
}

fn strip_quotes(text: &str) -> String {
    text.trim_matches(|c| c == '"' || c == '\'' || c == '`').to_string()
}

impl Extractor for FileDependencyExtractor {
    fn languages(&self) -> &'static [Language] {
        SUPPORTED
    }

    fn owned_edge_types(&self) -> &'static [&'static str] {
        OWNED
    }

    fn register_queries(&self, queries: &QueryRegistry) -> GraphResult<()> {
        queries.register(
            Language::TypeScript,
            "js-family-imports",
            "(import_statement source: (string) @source)",
        )?;
        queries.register(
            Language::Tsx,
            "js-family-imports",
            "(import_statement source: (string) @source)",
        )?;
        queries.register(
            Language::JavaScript,
            "js-family-imports",
            "(import_statement source: (string) @source)",
        )?;
        queries.register(
            Language::Jsx,
            "js-family-imports",
            "(import_statement source: (string) @source)",
        )?;
        for lang in [
            Language::TypeScript,
            Language::Tsx,
            Language::JavaScript,
            Language::Jsx,
        ] {
            queries.register(
                lang,
                "js-family-reexports",
                "(export_statement source: (string) @source)",
            )?;
            queries.register(
                lang,
                "js-family-named-imports",
                "(import_statement
                   (import_clause (named_imports (import_specifier name: (identifier) @imported)))
                   source: (string) @source)",
            )?;
        }

        queries.register(
            Language::Python,
            "python-imports",
            "[(import_from_statement module_name: (dotted_name) @source)
              (import_statement name: (dotted_name) @source)]",
        )?;

        queries.register(
            Language::Go,
            "go-imports",
            "(import_spec path: (interpreted_string_literal) @source)",
        )?;

        queries.register(
            Language::Java,
            "java-imports",
            "(import_declaration (scoped_identifier) @source)",
        )?;

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
        stats.nodes_upserted += 1;

        let import_matches = run_query(ctx, import_query_key(ctx.language))?;
        for m in &import_matches {
            let Some(capture) = m.capture("source") else {
                continue;
            };
            let specifier = strip_quotes(&capture.text);
            if specifier.is_empty() {
                continue;
            }
            let edge_type = classify(&specifier);

            let import_node = upsert_symbol_node(
                store,
                ctx,
                node_types::UNKNOWN,
                &specifier,
                vec!["import-source".to_string(), specifier.clone()],
                serde_json_metadata(&specifier, edge_type, expected_type_for_specifier(edge_type)),
            )?;
            stats.nodes_upserted += 1;

            upsert_owned_edge(store, ctx, file_node, import_node, "imports", empty_metadata())?;
            upsert_owned_edge(store, ctx, file_node, import_node, edge_type, empty_metadata())?;
            stats.edges_upserted += 2;
        }

        if let Some(named_key) = named_import_query_key(ctx.language) {
            let named_matches = run_query(ctx, named_key)?;
            for m in &named_matches {
                let (Some(imported_capture), Some(source_capture)) =
                    (m.capture("imported"), m.capture("source"))
                else {
                    continue;
                };
                let imported_name = imported_capture.text.clone();
                let specifier = strip_quotes(&source_capture.text);
                if imported_name.is_empty() || specifier.is_empty() {
                    continue;
                }

                let unknown_node = upsert_symbol_node(
                    store,
                    ctx,
                    node_types::UNKNOWN,
                    &imported_name,
                    vec!["symbol-reference".to_string(), specifier.clone(), imported_name.clone()],
                    serde_json_metadata(&specifier, node_types::UNKNOWN, Some(node_types::ANY_DECLARATION)),
                )?;
                stats.nodes_upserted += 1;

                let alias_node = upsert_symbol_node(
                    store,
                    ctx,
                    node_types::ALIAS,
                    &imported_name,
                    vec!["alias".to_string(), specifier.clone(), imported_name.clone()],
                    empty_metadata(),
                )?;
                stats.nodes_upserted += 1;

                upsert_owned_edge(store, ctx, alias_node, unknown_node, "aliasOf", empty_metadata())?;
                stats.edges_upserted += 1;
            }
        }

        if let Some(export_key) = export_query_key(ctx.language) {
            let export_matches = run_query(ctx, export_key)?;
            for m in &export_matches {
                let Some(capture) = m.capture("source") else {
                    continue;
                };
                let specifier = strip_quotes(&capture.text);
                if specifier.is_empty() {
                    continue;
                }
                let export_node = upsert_symbol_node(
                    store,
                    ctx,
                    node_types::UNKNOWN,
                    &specifier,
                    vec!["import-source".to_string(), specifier.clone()],
                    serde_json_metadata(
                        &specifier,
                        classify(&specifier),
                        expected_type_for_specifier(classify(&specifier)),
                    ),
                )?;
                stats.nodes_upserted += 1;
                upsert_owned_edge(store, ctx, file_node, export_node, "exports_to", empty_metadata())?;
                stats.edges_upserted += 1;
            }
        }

        Ok(stats)
    }
}

fn serde_json_metadata(specifier: &str, kind: &str, expected_type: Option<&str>) -> codegraph_core::Metadata {
    let mut metadata = empty_metadata();
    metadata.insert("specifier".to_string(), json!(specifier));
    metadata.insert("kind".to_string(), json!(kind));
    if let Some(expected_type) = expected_type {
        metadata.insert("expected_type".to_string(), json!(expected_type));
    }
    metadata
}

/// A relative/path-like specifier (`imports_file`) is expected to resolve
/// to the `file` node for the file it points at once that file is
/// analyzed; a library specifier (`imports_library`) names an external
/// package this workspace never analyzes, so it carries no expectation.
fn expected_type_for_specifier(edge_type: &str) -> Option<&'static str> {
    if edge_type == "imports_file" {
        Some(node_types::FILE)
    } else {
        None
    }
}

fn run_query(ctx: &ExtractionContext, query_key: &str) -> GraphResult<Vec<codegraph_query::Match>> {
    ctx.queries.parse_and_run(ctx.language, query_key, &ctx.source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegraph_registry::Registry;
    use codegraph_storage::{EdgeFilter, GraphStore};
    use std::sync::Arc;

    fn run_app_ts(store: &GraphStore, queries: &QueryRegistry) -> ExtractionStats {
        let extractor = FileDependencyExtractor;
        extractor.register_queries(queries).unwrap();
        let ctx = ExtractionContext {
            project_name: "demo".to_string(),
            source_file: "src/App.ts".to_string(),
            language: Language::TypeScript,
            source: "import { helper } from './util';\n".to_string(),
            queries,
            scenario_config: serde_json::Value::Null,
        };
        extractor.extract(&ctx, store).unwrap()
    }

    /// Spec §8 scenario 1: analyzing `src/App.ts` importing `./util` twice
    /// in a row yields exactly one `imports_file` edge both times.
    #[test]
    fn idempotent_reanalysis_yields_one_imports_file_edge() {
        let registry = Arc::new(Registry::with_core_types());
        let store = GraphStore::new_in_memory(registry).unwrap();
        let queries = QueryRegistry::new();

        run_app_ts(&store, &queries);
        let edges_first = store
            .find_edges(&EdgeFilter {
                edge_type: Some("imports_file".to_string()),
                source_file: Some("src/App.ts".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(edges_first.len(), 1);
        assert_eq!(edges_first[0].source_file, "src/App.ts");

        run_app_ts(&store, &queries);
        let edges_second = store
            .find_edges(&EdgeFilter {
                edge_type: Some("imports_file".to_string()),
                source_file: Some("src/App.ts".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(edges_second.len(), 1);
        assert_eq!(edges_second[0].id, edges_first[0].id);
    }

    /// Spec §8 scenario 5 (first half): importing a named symbol whose
    /// definition hasn't been analyzed yet leaves behind an Unknown Symbol
    /// node and an alias node for the local binding, linked by `aliasOf`.
    #[test]
    fn named_import_creates_alias_and_unknown_symbol_pair() {
        let registry = Arc::new(Registry::with_core_types());
        let store = GraphStore::new_in_memory(registry).unwrap();
        let queries = QueryRegistry::new();
        run_app_ts(&store, &queries);

        let alias_of = store
            .find_edges(&EdgeFilter {
                edge_type: Some("aliasOf".to_string()),
                source_file: Some("src/App.ts".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(alias_of.len(), 1);

        let alias_node = store.get_node(alias_of[0].from_node_id).unwrap().unwrap();
        let unknown_node = store.get_node(alias_of[0].to_node_id).unwrap().unwrap();
        assert_eq!(alias_node.node_type, node_types::ALIAS);
        assert_eq!(alias_node.name, "helper");
        assert_eq!(unknown_node.node_type, node_types::UNKNOWN);
        assert_eq!(unknown_node.name, "helper");
        assert_eq!(
            unknown_node.metadata.get("expected_type").and_then(|v| v.as_str()),
            Some(node_types::ANY_DECLARATION),
            "named-import unknown nodes must carry a resolver-readable expected_type hint"
        );
    }

    #[test]
    fn classify_distinguishes_library_from_relative_specifiers() {
        assert_eq!(classify("./util"), "imports_file");
        assert_eq!(classify("/abs/path"), "imports_file");
        assert_eq!(classify("react"), "imports_library");
        assert_eq!(classify("@scope/pkg"), "imports_library");
    }
}
