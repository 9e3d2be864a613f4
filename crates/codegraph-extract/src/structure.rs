use crate::{Extractor, ExtractionContext, ExtractionStats, empty_metadata, reclaim_ownership, upsert_owned_edge, upsert_symbol_node};
use codegraph_core::{GraphResult, Language, node_types};
use codegraph_query::QueryRegistry;
use codegraph_storage::GraphStore;

const OWNED: &[&str] = &["contains", "declares"];

const SUPPORTED: &[Language] = &[
    Language::TypeScript,
    Language::Tsx,
    Language::JavaScript,
    Language::Jsx,
    Language::Java,
    Language::Python,
    Language::Go,
];

/// Walks the declaration shape of a file — classes, interfaces, structs,
/// functions, methods — and emits `contains` (file/class containment) and
/// `declares` (member declaration) edges.
pub struct StructureExtractor;

struct DeclarationQuery {
    key: &'static str,
    node_type: &'static str,
    pattern: &'static str,
}

fn declaration_queries(language: Language) -> &'static [DeclarationQuery] {
    match language {
        Language::TypeScript | Language::Tsx | Language::JavaScript | Language::Jsx => &[
            DeclarationQuery {
                key: "structure-classes",
                node_type: node_types::CLASS,
                pattern: "(class_declaration name: (type_identifier) @name) @decl",
            },
            DeclarationQuery {
                key: "structure-interfaces",
                node_type: node_types::INTERFACE,
                pattern: "(interface_declaration name: (type_identifier) @name) @decl",
            },
            DeclarationQuery {
                key: "structure-functions",
                node_type: node_types::FUNCTION,
                pattern: "(function_declaration name: (identifier) @name) @decl",
            },
            DeclarationQuery {
                key: "structure-methods",
                node_type: node_types::METHOD,
                pattern: "(method_definition name: (property_identifier) @name) @decl",
            },
        ],
        Language::Java => &[
            DeclarationQuery {
                key: "structure-classes",
                node_type: node_types::CLASS,
                pattern: "(class_declaration name: (identifier) @name) @decl",
            },
            DeclarationQuery {
                key: "structure-interfaces",
                node_type: node_types::INTERFACE,
                pattern: "(interface_declaration name: (identifier) @name) @decl",
            },
            DeclarationQuery {
                key: "structure-methods",
                node_type: node_types::METHOD,
                pattern: "(method_declaration name: (identifier) @name) @decl",
            },
        ],
        Language::Python => &[
            DeclarationQuery {
                key: "structure-classes",
                node_type: node_types::CLASS,
                pattern: "(class_definition name: (identifier) @name) @decl",
            },
            DeclarationQuery {
                key: "structure-functions",
                node_type: node_types::FUNCTION,
                pattern: "(function_definition name: (identifier) @name) @decl",
            },
        ],
        Language::Go => &[
            DeclarationQuery {
                key: "structure-structs",
                node_type: node_types::STRUCT,
                pattern: "(type_declaration (type_spec name: (type_identifier) @name type: (struct_type))) @decl",
            },
            DeclarationQuery {
                key: "structure-functions",
                node_type: node_types::FUNCTION,
                pattern: "(function_declaration name: (identifier) @name) @decl",
            },
            DeclarationQuery {
                key: "structure-methods",
                node_type: node_types::METHOD,
                pattern: "(method_declaration name: (field_identifier) @name) @decl",
            },
        ],
        Language::Markdown => &[],
    }
}

impl Extractor for StructureExtractor {
    fn languages(&self) -> &'static [Language] {
        SUPPORTED
    }

    fn owned_edge_types(&self) -> &'static [&'static str] {
        OWNED
    }

    fn register_queries(&self, queries: &QueryRegistry) -> GraphResult<()> {
        for language in SUPPORTED {
            for decl in declaration_queries(*language) {
                queries.register(*language, decl.key, decl.pattern)?;
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
        stats.nodes_upserted += 1;

        for decl in declaration_queries(ctx.language) {
            let matches = ctx.queries.parse_and_run(ctx.language, decl.key, &ctx.source)?;
            for m in &matches {
                let Some(name_capture) = m.capture("name") else {
                    continue;
                };
                let name = name_capture.text.clone();
                if name.is_empty() {
                    continue;
                }

                let symbol_node = upsert_symbol_node(
                    store,
                    ctx,
                    decl.node_type,
                    &name,
                    vec![name.clone()],
                    empty_metadata(),
                )?;
                stats.nodes_upserted += 1;

                upsert_owned_edge(store, ctx, file_node, symbol_node, "contains", empty_metadata())?;
                upsert_owned_edge(store, ctx, file_node, symbol_node, "declares", empty_metadata())?;
                stats.edges_upserted += 2;
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegraph_registry::Registry;
    use codegraph_storage::EdgeFilter;
    use std::sync::Arc;

    #[test]
    fn reanalysis_replaces_contains_edges_without_duplication() {
        let registry = Arc::new(Registry::with_core_types());
        let store = GraphStore::new_in_memory(registry).unwrap();
        let queries = QueryRegistry::new();
        let extractor = StructureExtractor;
        extractor.register_queries(&queries).unwrap();

        let ctx = ExtractionContext {
            project_name: "demo".to_string(),
            source_file: "src/widget.ts".to_string(),
            language: Language::TypeScript,
            source: "class Widget {}\n".to_string(),
            queries: &queries,
            scenario_config: serde_json::Value::Null,
        };
        extractor.extract(&ctx, &store).unwrap();
        extractor.extract(&ctx, &store).unwrap();

        let contains = store
            .find_edges(&EdgeFilter {
                edge_type: Some("contains".to_string()),
                source_file: Some("src/widget.ts".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(contains.len(), 1);
    }
}
