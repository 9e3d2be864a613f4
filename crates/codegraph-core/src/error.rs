use thiserror::Error;

/// Error taxonomy for the code graph engine.
///
/// Every fallible operation across the workspace resolves to one of these
/// variants; crates don't invent ad-hoc error shapes of their own
/// so that a `BatchReport` can carry a stable `error_kind` across crate
/// boundaries.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("configuration invalid: {0}")]
    ConfigurationInvalid(String),

    #[error("path invalid: {0}")]
    PathInvalid(String),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("parse error in {file} ({language}): {message}")]
    ParseError {
        file: String,
        language: String,
        message: String,
    },

    #[error("unknown query key: {0}")]
    UnknownQueryKey(String),

    #[error("unknown edge type: {0}")]
    UnknownEdgeType(String),

    #[error("hierarchy violation: {0}")]
    HierarchyViolation(String),

    #[error("missing source_file on edge")]
    MissingSourceFile,

    #[error("identifier conflict for {identifier}: existing type {existing}, new type {attempted}")]
    IdentifierConflict {
        identifier: String,
        existing: String,
        attempted: String,
    },

    #[error("component not initialized: {0}")]
    NotInitialized(String),

    #[error("cycle detected: {0}")]
    CycleDetected(String),

    #[error("depth exceeded (max {max})")]
    DepthExceeded { max: usize },

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("operation cancelled")]
    Cancelled,

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("edge type '{0}' is not transitive")]
    TypeNotTransitive(String),

    #[error("edge type '{0}' is not inheritable")]
    TypeNotInheritable(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("registry locked: {0}")]
    RegistryLocked(String),
}

impl From<std::io::Error> for GraphError {
    fn from(err: std::io::Error) -> Self {
        GraphError::Io(err.to_string())
    }
}

pub type GraphResult<T> = Result<T, GraphError>;

/// Which phase of a batch run a failure occurred in: file discovery or
/// per-file extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum RunStep {
    Collection,
    Indexing,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RunFailure {
    pub file: String,
    pub error_kind: String,
    pub message: String,
    pub step: RunStep,
}

/// Aggregate node/edge counts across every file in a batch run. Each
/// extractor reports its own per-file counts in the same shape; a run
/// simply sums them, so this type lives in `codegraph-core` rather than
/// alongside the extractors that produce it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BatchStats {
    pub nodes_upserted: usize,
    pub edges_deleted: usize,
    pub edges_upserted: usize,
}

impl BatchStats {
    pub fn merge(&mut self, other: BatchStats) {
        self.nodes_upserted += other.nodes_upserted;
        self.edges_deleted += other.edges_deleted;
        self.edges_upserted += other.edges_upserted;
    }
}

/// Summary returned by any batch-oriented operation: successes, per-file
/// failures, whether the run was cancelled early, and aggregate stats.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct BatchReport {
    pub successful: Vec<String>,
    pub failed: Vec<RunFailure>,
    pub cancelled: bool,
    pub stats: BatchStats,
}

impl BatchReport {
    pub fn record_success(&mut self, file: impl Into<String>) {
        self.successful.push(file.into());
    }

    pub fn record_failure(&mut self, file: impl Into<String>, step: RunStep, err: &GraphError) {
        self.failed.push(RunFailure {
            file: file.into(),
            error_kind: error_kind_name(err),
            message: err.to_string(),
            step,
        });
    }

    pub fn record_stats(&mut self, stats: BatchStats) {
        self.stats.merge(stats);
    }
}

/// Stable taxonomy-entry name for a `GraphError`, independent of its
/// display message — what `BatchReport`/`BatchEvent` tag a failure with.
pub fn error_kind_name(err: &GraphError) -> String {
    match err {
        GraphError::ConfigurationInvalid(_) => "ConfigurationInvalid",
        GraphError::PathInvalid(_) => "PathInvalid",
        GraphError::FileNotFound(_) => "FileNotFound",
        GraphError::UnsupportedLanguage(_) => "UnsupportedLanguage",
        GraphError::ParseError { .. } => "ParseError",
        GraphError::UnknownQueryKey(_) => "UnknownQueryKey",
        GraphError::UnknownEdgeType(_) => "UnknownEdgeType",
        GraphError::HierarchyViolation(_) => "HierarchyViolation",
        GraphError::MissingSourceFile => "MissingSourceFile",
        GraphError::IdentifierConflict { .. } => "IdentifierConflict",
        GraphError::NotInitialized(_) => "NotInitialized",
        GraphError::CycleDetected(_) => "CycleDetected",
        GraphError::DepthExceeded { .. } => "DepthExceeded",
        GraphError::Timeout(_) => "Timeout",
        GraphError::Cancelled => "Cancelled",
        GraphError::ValidationFailed(_) => "ValidationFailed",
        GraphError::TypeNotTransitive(_) => "TypeNotTransitive",
        GraphError::TypeNotInheritable(_) => "TypeNotInheritable",
        GraphError::Io(_) => "Io",
        GraphError::RegistryLocked(_) => "RegistryLocked",
    }
    .to_string()
}
