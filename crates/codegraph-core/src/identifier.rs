//! Canonical node identifiers.
//!
//! A node identifier is an RDF-flavored string of the form:
//!
//!   `<project>/<relative-file-path>#<node-type>:<symbol-name>[/<child>...]`
//!
//! e.g. `my-app/src/server.ts#function:handleRequest` or, for a nested
//! symbol, `my-app/src/models/user.py#class:User/method:save`.
//!
//! The project name is a single path segment (no `/`); the relative file
//! path may contain any number of segments. The part after `#` always
//! starts with `<node-type>:` followed by a `/`-separated symbol path.
use crate::error::GraphError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierParts {
    pub project_name: String,
    pub relative_file_path: String,
    pub node_type: String,
    pub symbol_path: Vec<String>,
}

/// Build the canonical identifier string from its parts.
pub fn format(parts: &IdentifierParts) -> String {
    format!(
        "{}/{}#{}:{}",
        parts.project_name,
        parts.relative_file_path,
        parts.node_type,
        parts.symbol_path.join("/"),
    )
}

/// Parse a canonical identifier string back into its parts.
///
/// `parse(&format(p)) == Ok(p)` for any well-formed `p` whose
/// `project_name` contains no `/` and whose `node_type` contains no `:`.
pub fn parse(identifier: &str) -> Result<IdentifierParts, GraphError> {
    let (head, tail) = identifier.split_once('#').ok_or_else(|| {
        GraphError::PathInvalid(format!(
            "identifier '{identifier}' is missing the '#' separator"
        ))
    })?;

    let (project_name, relative_file_path) = head.split_once('/').ok_or_else(|| {
        GraphError::PathInvalid(format!(
            "identifier '{identifier}' is missing a project-relative file path"
        ))
    })?;
    if project_name.is_empty() || relative_file_path.is_empty() {
        return Err(GraphError::PathInvalid(format!(
            "identifier '{identifier}' has an empty project name or file path"
        )));
    }

    let (node_type, symbol_part) = tail.split_once(':').ok_or_else(|| {
        GraphError::PathInvalid(format!(
            "identifier '{identifier}' is missing a ':' between node type and symbol name"
        ))
    })?;
    if node_type.is_empty() || symbol_part.is_empty() {
        return Err(GraphError::PathInvalid(format!(
            "identifier '{identifier}' has an empty node type or symbol path"
        )));
    }

    let symbol_path: Vec<String> = symbol_part.split('/').map(str::to_string).collect();
    if symbol_path.iter().any(|segment| segment.is_empty()) {
        return Err(GraphError::PathInvalid(format!(
            "identifier '{identifier}' has an empty segment in its symbol path"
        )));
    }

    Ok(IdentifierParts {
        project_name: project_name.to_string(),
        relative_file_path: relative_file_path.to_string(),
        node_type: node_type.to_string(),
        symbol_path,
    })
}

/// Validate that a string round-trips through `parse` without re-deriving
/// its parts; used at ingestion boundaries to reject malformed ids early.
pub fn validate(identifier: &str) -> Result<(), GraphError> {
    parse(identifier).map(|_| ())
}

/// Filesystem-safe rendering of an identifier, used as a key for
/// `context_documents` rows and any on-disk cache keyed by node identity.
/// Only the symbol-path separators after `#` are rewritten; the project
/// and file-path segments (which are themselves filesystem paths) are left
/// untouched.
pub fn document_key(identifier: &str) -> String {
    match identifier.split_once('#') {
        Some((head, tail)) => format!("{head}#{}", tail.replace('/', "__")),
        None => identifier.replace('/', "__"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn formats_simple_identifier() {
        let parts = IdentifierParts {
            project_name: "my-app".into(),
            relative_file_path: "src/server.ts".into(),
            node_type: "function".into(),
            symbol_path: vec!["handleRequest".into()],
        };
        assert_eq!(format(&parts), "my-app/src/server.ts#function:handleRequest");
    }

    #[test]
    fn parses_nested_symbol_path() {
        let id = "my-app/src/models/user.py#class:User/method:save";
        let parts = parse(id).unwrap();
        assert_eq!(parts.project_name, "my-app");
        assert_eq!(parts.relative_file_path, "src/models/user.py");
        assert_eq!(parts.node_type, "class");
        assert_eq!(parts.symbol_path, vec!["User", "method:save"]);
    }

    #[test]
    fn rejects_missing_hash() {
        assert!(parse("my-app/src/server.ts").is_err());
    }

    #[test]
    fn rejects_missing_colon() {
        assert!(parse("my-app/src/server.ts#function").is_err());
    }

    #[test]
    fn document_key_escapes_symbol_path_only() {
        let id = "my-app/src/models/user.py#class:User/method:save";
        assert_eq!(
            document_key(id),
            "my-app/src/models/user.py#class:User__method:save"
        );
    }

    fn segment_strategy() -> impl Strategy<Value = String> {
        "[a-zA-Z][a-zA-Z0-9_]{0,12}".prop_filter("no stray separators", |s| {
            !s.contains('/') && !s.contains('#') && !s.contains(':')
        })
    }

    proptest! {
        #[test]
        fn parse_format_round_trip(
            project_name in segment_strategy(),
            file_segments in prop::collection::vec(segment_strategy(), 1..4),
            node_type in segment_strategy(),
            symbol_segments in prop::collection::vec(segment_strategy(), 1..4),
        ) {
            let parts = IdentifierParts {
                project_name,
                relative_file_path: file_segments.join("/"),
                node_type,
                symbol_path: symbol_segments,
            };
            let formatted = format(&parts);
            let reparsed = parse(&formatted).unwrap();
            prop_assert_eq!(reparsed, parts);
        }
    }
}
