//! AST Query Bridge: a thin abstraction over tree-sitter's query engine.
//! Queries are registered per `(language, query_key)` once
//! at process init — rather than the inline `match language_name { ... }`
//! tables a single-pass indexer might use — so a `query_spec` key can be
//! resolved and re-run without recompiling the pattern each time.
use codegraph_core::{GraphError, GraphResult, Language};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// One captured node within a `Match`, exposing the node attributes
/// callers need: `text`, `start_line`, `start_column`, `end_line`,
/// `end_column`, `kind`. Lines and columns are 0-based, matching
/// tree-sitter's own `Point` convention.
#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
    pub name: String,
    pub text: String,
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Match {
    pub captures: Vec<Capture>,
}

impl Match {
    pub fn capture(&self, name: &str) -> Option<&Capture> {
        self.captures.iter().find(|c| c.name == name)
    }
}

/// Maps arbitrary user-facing keys (e.g. localized labels) onto registered
/// query keys, so a caller can run a named bundle of queries without
/// knowing the registry's internal key scheme.
#[derive(Debug, Clone, Default)]
pub struct KeyMapping {
    pub entries: HashMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct MappingValidation {
    pub valid_keys: Vec<String>,
    pub invalid_keys: Vec<String>,
    pub errors: Vec<String>,
}

fn ts_grammar(language: Language) -> GraphResult<tree_sitter::Language> {
    Ok(match language {
        Language::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        Language::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
        Language::JavaScript | Language::Jsx => tree_sitter_javascript::LANGUAGE.into(),
        Language::Java => tree_sitter_java::LANGUAGE.into(),
        Language::Python => tree_sitter_python::LANGUAGE.into(),
        Language::Go => tree_sitter_go::LANGUAGE.into(),
        Language::Markdown => tree_sitter_md::LANGUAGE.into(),
    })
}

/// Process-wide table of compiled queries, keyed by `(language, query_key)`.
/// Guarded by a `parking_lot::RwLock`: registration is rare (process init
/// plus occasional analyzer-specific additions), lookups and runs are
/// frequent and concurrent across `rayon` worker threads.
pub struct QueryRegistry {
    entries: RwLock<HashMap<(Language, String), Arc<tree_sitter::Query>>>,
}

impl QueryRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Compile `pattern` against `language`'s grammar and register it
    /// under `query_key`. Malformed patterns surface as `ValidationFailed`
    /// rather than panicking, so a bad query added by an extended analyzer
    /// doesn't take down the whole process.
    pub fn register(&self, language: Language, query_key: &str, pattern: &str) -> GraphResult<()> {
        let grammar = ts_grammar(language)?;
        let query = tree_sitter::Query::new(&grammar, pattern)
            .map_err(|err| GraphError::ValidationFailed(format!(
                "query '{query_key}' for {language} is malformed: {err}"
            )))?;
        self.entries
            .write()
            .insert((language, query_key.to_string()), Arc::new(query));
        Ok(())
    }

    pub fn get(&self, language: Language, query_key: &str) -> GraphResult<Arc<tree_sitter::Query>> {
        self.entries
            .read()
            .get(&(language, query_key.to_string()))
            .cloned()
            .ok_or_else(|| GraphError::UnknownQueryKey(query_key.to_string()))
    }

    /// Parse `source` for `language` and return the resulting tree.
    /// Separated from `run` so that callers extracting several query
    /// specs from the same file only pay the parse cost once.
    pub fn parse(&self, language: Language, source: &str) -> GraphResult<tree_sitter::Tree> {
        let grammar = ts_grammar(language)?;
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&grammar)
            .map_err(|err| GraphError::UnsupportedLanguage(format!("{language}: {err}")))?;
        parser
            .parse(source, None)
            .ok_or_else(|| GraphError::ParseError {
                file: String::new(),
                language: language.as_str().to_string(),
                message: "tree-sitter returned no tree (source too large or cancelled)".into(),
            })
    }

    /// Execute a registered query over an already-parsed tree, yielding
    /// matches in document order.
    pub fn run_on_tree(
        &self,
        language: Language,
        query_key: &str,
        tree: &tree_sitter::Tree,
        source: &str,
    ) -> GraphResult<Vec<Match>> {
        let query = self.get(language, query_key)?;
        let mut cursor = tree_sitter::QueryCursor::new();
        let capture_names = query.capture_names();
        let mut matches_cursor = cursor.matches(&query, tree.root_node(), source.as_bytes());

        let mut out = Vec::new();
        while let Some(m) = matches_cursor.next() {
            let mut captures: Vec<Capture> = m
                .captures
                .iter()
                .map(|c| {
                    let node = c.node;
                    let start = node.start_position();
                    let end = node.end_position();
                    Capture {
                        name: capture_names[c.index as usize].to_string(),
                        text: node
                            .utf8_text(source.as_bytes())
                            .unwrap_or_default()
                            .to_string(),
                        start_line: start.row as u32,
                        start_column: start.column as u32,
                        end_line: end.row as u32,
                        end_column: end.column as u32,
                        kind: node.kind().to_string(),
                    }
                })
                .collect();
            captures.sort_by_key(|c| (c.start_line, c.start_column));
            out.push(Match { captures });
        }
        Ok(out)
    }

    /// Parse `source` and run a single registered query over it in one
    /// call — the common path for extractors that only need one query
    /// spec per file.
    pub fn parse_and_run(
        &self,
        language: Language,
        query_key: &str,
        source: &str,
    ) -> GraphResult<Vec<Match>> {
        let tree = self.parse(language, source)?;
        self.run_on_tree(language, query_key, &tree, source)
    }

    /// Run every query referenced by `mapping`'s values, grouped back
    /// under the mapping's user-facing keys.
    pub fn run_mapping(
        &self,
        language: Language,
        source: &str,
        mapping: &KeyMapping,
    ) -> GraphResult<HashMap<String, Vec<Match>>> {
        let tree = self.parse(language, source)?;
        let mut out = HashMap::new();
        for (user_key, query_key) in &mapping.entries {
            let matches = self.run_on_tree(language, query_key, &tree, source)?;
            out.insert(user_key.clone(), matches);
        }
        Ok(out)
    }

    pub fn validate_mapping(&self, language: Language, mapping: &KeyMapping) -> MappingValidation {
        let mut result = MappingValidation::default();
        let entries = self.entries.read();
        for (user_key, query_key) in &mapping.entries {
            if entries.contains_key(&(language, query_key.clone())) {
                result.valid_keys.push(user_key.clone());
            } else {
                result.invalid_keys.push(user_key.clone());
                result
                    .errors
                    .push(format!("'{user_key}' maps to unregistered query key '{query_key}'"));
            }
        }
        result
    }
}

impl Default for QueryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_and_runs_a_typescript_query() {
        let registry = QueryRegistry::new();
        registry
            .register(
                Language::TypeScript,
                "ts-function-declarations",
                "(function_declaration name: (identifier) @name) @function",
            )
            .unwrap();

        let source = "function run() {}\nfunction stop() {}\n";
        let matches = registry
            .parse_and_run(Language::TypeScript, "ts-function-declarations", source)
            .unwrap();

        assert_eq!(matches.len(), 2);
        let names: Vec<&str> = matches
            .iter()
            .map(|m| m.capture("name").unwrap().text.as_str())
            .collect();
        assert_eq!(names, vec!["run", "stop"]);
    }

    #[test]
    fn unknown_query_key_fails() {
        let registry = QueryRegistry::new();
        let err = registry.parse_and_run(Language::Python, "does-not-exist", "x = 1\n");
        assert!(matches!(err, Err(GraphError::UnknownQueryKey(_))));
    }

    #[test]
    fn malformed_query_is_rejected_at_registration() {
        let registry = QueryRegistry::new();
        let result = registry.register(Language::Python, "bad", "(this is not valid @@@");
        assert!(matches!(result, Err(GraphError::ValidationFailed(_))));
    }

    #[test]
    fn key_mapping_validates_against_registered_queries() {
        let registry = QueryRegistry::new();
        registry
            .register(Language::Go, "go-functions", "(function_declaration name: (identifier) @name) @function")
            .unwrap();

        let mut mapping = KeyMapping::default();
        mapping.entries.insert("functions".into(), "go-functions".into());
        mapping.entries.insert("unknown-thing".into(), "go-missing".into());

        let validation = registry.validate_mapping(Language::Go, &mapping);
        assert_eq!(validation.valid_keys, vec!["functions".to_string()]);
        assert_eq!(validation.invalid_keys, vec!["unknown-thing".to_string()]);
        assert_eq!(validation.errors.len(), 1);
    }
}
