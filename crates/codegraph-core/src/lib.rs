use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

pub mod error;
pub mod identifier;

pub use error::{BatchReport, BatchStats, GraphError, GraphResult, RunFailure, RunStep, error_kind_name};
pub use identifier::IdentifierParts;

/// Opaque per-node/per-edge key/value bag. Extractors stash
/// language-specific detail here (e.g. visibility, parameter lists, doc
/// comments) without the core crate needing to know about it.
pub type Metadata = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub i64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeId(pub i64);

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The languages a file can be classified as before extraction. TSX and
/// JSX are kept distinct from their non-JSX counterparts because
/// they're parsed with a different tree-sitter grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    TypeScript,
    Tsx,
    JavaScript,
    Jsx,
    Java,
    Python,
    Go,
    Markdown,
}

impl Language {
    /// The slug used in config files, CLI flags, and query registry keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::TypeScript => "typescript",
            Language::Tsx => "tsx",
            Language::JavaScript => "javascript",
            Language::Jsx => "jsx",
            Language::Java => "java",
            Language::Python => "python",
            Language::Go => "go",
            Language::Markdown => "markdown",
        }
    }

    /// Classify a file by its extension, returning `None` for anything
    /// outside the supported set so callers can skip it silently during
    /// namespace file-pattern expansion.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        Self::from_extension(ext)
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "ts" => Some(Language::TypeScript),
            "tsx" => Some(Language::Tsx),
            "js" | "mjs" | "cjs" => Some(Language::JavaScript),
            "jsx" => Some(Language::Jsx),
            "java" => Some(Language::Java),
            "py" | "pyi" => Some(Language::Python),
            "go" => Some(Language::Go),
            "md" | "markdown" => Some(Language::Markdown),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parameters for creating or updating a node. `identifier` is the stable
/// key used for upsert matching; `node_type` is an open string rather than
/// a closed enum, so extractors and future languages can introduce new
/// node types without touching this crate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeInput {
    pub identifier: String,
    pub node_type: String,
    pub name: String,
    pub source_file: String,
    pub language: Language,
    pub semantic_tags: Vec<String>,
    pub metadata: Metadata,
    pub start_line: Option<u32>,
    pub end_line: Option<u32>,
}

/// A node as stored in the graph: a `NodeInput` plus the integer id the
/// store assigned it on first insert.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub identifier: String,
    pub node_type: String,
    pub name: String,
    pub source_file: String,
    pub language: Language,
    pub semantic_tags: Vec<String>,
    pub metadata: Metadata,
    pub start_line: Option<u32>,
    pub end_line: Option<u32>,
}

impl Node {
    pub fn from_input(id: NodeId, input: NodeInput) -> Self {
        Self {
            id,
            identifier: input.identifier,
            node_type: input.node_type,
            name: input.name,
            source_file: input.source_file,
            language: input.language,
            semantic_tags: input.semantic_tags,
            metadata: input.metadata,
            start_line: input.start_line,
            end_line: input.end_line,
        }
    }
}

/// Parameters for creating an edge. `edge_type` is an open string resolved
/// against the Edge Type Registry at write time; `source_file` is
/// mandatory because it's the key the Ownership Protocol uses to scope
/// re-analysis deletes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EdgeInput {
    pub from_node_id: NodeId,
    pub to_node_id: NodeId,
    pub edge_type: String,
    pub source_file: String,
    pub metadata: Metadata,
    pub weight: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    pub id: EdgeId,
    pub from_node_id: NodeId,
    pub to_node_id: NodeId,
    pub edge_type: String,
    pub source_file: String,
    pub metadata: Metadata,
    pub weight: Option<f64>,
}

impl Edge {
    pub fn from_input(id: EdgeId, input: EdgeInput) -> Self {
        Self {
            id,
            from_node_id: input.from_node_id,
            to_node_id: input.to_node_id,
            edge_type: input.edge_type,
            source_file: input.source_file,
            metadata: input.metadata,
            weight: input.weight,
        }
    }
}

/// An entry in the Edge Type Registry: `type` is the unique slug,
/// `parent_type` places it in the declared hierarchy, and
/// `is_transitive`/`is_inheritable` gate which Inference Engine queries may
/// run over it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EdgeTypeDef {
    pub edge_type: String,
    pub description: String,
    /// Advisory shape for `metadata` on edges of this type; not enforced.
    pub schema: Option<serde_json::Value>,
    pub is_directed: bool,
    pub parent_type: Option<String>,
    pub is_transitive: bool,
    pub is_inheritable: bool,
    pub priority: i32,
}

/// A derived row in the Inference Cache: the result of a
/// hierarchical/transitive/inheritable closure query, persisted so repeat
/// queries don't recompute the fixed point. Pure function of the edge set
/// and the registry — never hand-written by an extractor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InferenceCacheRow {
    pub start_node_id: NodeId,
    pub end_node_id: NodeId,
    pub inferred_type: String,
    pub edge_path: Vec<EdgeId>,
    pub depth: u32,
    pub computed_at: chrono::DateTime<chrono::Utc>,
}

/// The `Inferred relationship` wire shape returned by Inference Engine
/// queries alongside (or instead of) cache rows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InferredRelationship {
    pub from_node_id: NodeId,
    pub to_node_id: NodeId,
    pub edge_type: String,
    pub edge_path: Vec<EdgeId>,
    pub depth: u32,
    pub inference_type: String,
    pub description: String,
    pub source_file: Option<String>,
}

/// Well-known node type slugs seeded by the extractors shipped in this
/// workspace. Extractors and downstream consumers are free to use any
/// other string; these are provided purely as typo-resistant constants.
pub mod node_types {
    pub const FILE: &str = "file";
    pub const MODULE: &str = "module";
    pub const NAMESPACE: &str = "namespace";
    pub const CLASS: &str = "class";
    pub const INTERFACE: &str = "interface";
    pub const STRUCT: &str = "struct";
    pub const ENUM: &str = "enum";
    pub const FUNCTION: &str = "function";
    pub const METHOD: &str = "method";
    pub const VARIABLE: &str = "variable";
    pub const FIELD: &str = "field";
    pub const CONSTANT: &str = "constant";
    pub const HEADING: &str = "heading";
    pub const UNKNOWN: &str = "unknown";
    pub const ALIAS: &str = "alias";

    /// Sentinel value for an `unknown` node's `expected_type` metadata
    /// key, for the cases where an extractor knows the placeholder must
    /// resolve to *some* declared symbol (as opposed to a file or an
    /// external library) but the syntax it saw doesn't pin down which
    /// declaration kind — e.g. a named import binding, which could turn
    /// out to be a class, function, interface, type alias, or variable.
    /// The Unknown-Symbol Resolver treats this as a type match against
    /// any node type in [`DECLARATION_TYPES`].
    pub const ANY_DECLARATION: &str = "any-declaration";

    /// Node types a resolver should accept as satisfying
    /// [`ANY_DECLARATION`]'s type-match dimension.
    pub const DECLARATION_TYPES: &[&str] = &[
        CLASS, INTERFACE, STRUCT, ENUM, FUNCTION, METHOD, VARIABLE, FIELD, CONSTANT,
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_from_extension_covers_supported_set() {
        assert_eq!(Language::from_extension("ts"), Some(Language::TypeScript));
        assert_eq!(Language::from_extension("tsx"), Some(Language::Tsx));
        assert_eq!(Language::from_extension("js"), Some(Language::JavaScript));
        assert_eq!(Language::from_extension("jsx"), Some(Language::Jsx));
        assert_eq!(Language::from_extension("java"), Some(Language::Java));
        assert_eq!(Language::from_extension("py"), Some(Language::Python));
        assert_eq!(Language::from_extension("go"), Some(Language::Go));
        assert_eq!(Language::from_extension("md"), Some(Language::Markdown));
        assert_eq!(Language::from_extension("rs"), None);
    }

    #[test]
    fn language_from_path_reads_extension() {
        let path = Path::new("src/components/Widget.tsx");
        assert_eq!(Language::from_path(path), Some(Language::Tsx));
    }

    #[test]
    fn node_from_input_preserves_fields() {
        let input = NodeInput {
            identifier: "demo/src/a.ts#function:run".into(),
            node_type: node_types::FUNCTION.into(),
            name: "run".into(),
            source_file: "src/a.ts".into(),
            language: Language::TypeScript,
            semantic_tags: vec!["public".into()],
            metadata: Metadata::new(),
            start_line: Some(1),
            end_line: Some(4),
        };
        let node = Node::from_input(NodeId(7), input.clone());
        assert_eq!(node.id, NodeId(7));
        assert_eq!(node.identifier, input.identifier);
        assert_eq!(node.name, "run");
    }
}
