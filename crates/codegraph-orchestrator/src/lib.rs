//! The Namespace Orchestrator: resolves a project's namespace
//! configuration into a file set per namespace, orders each namespace's
//! scenarios into a DAG via Kahn's algorithm, and drives the extractors
//! bound to each scenario over every matched file.
use codegraph_core::{BatchReport, GraphError, GraphResult, Language, RunStep};
use codegraph_events::{BatchEvent, CancellationToken, EventBus};
use codegraph_extract::{ExtractionContext, ExtractionStats, all_extractors};
use codegraph_infer::Engine;
use codegraph_query::QueryRegistry;
use codegraph_storage::GraphStore;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// A namespace: a named slice of the project selected by glob patterns,
/// run through a chosen set of scenarios.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceConfig {
    pub name: String,
    pub file_patterns: Vec<String>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub semantic_tags: Vec<String>,
    #[serde(default = "default_scenarios")]
    pub scenarios: Vec<String>,
    #[serde(default)]
    pub scenario_config: HashMap<String, serde_json::Value>,
}

fn default_scenarios() -> Vec<String> {
    vec!["basic-structure".to_string(), "file-dependency".to_string()]
}

/// One analysis scenario: a named binding of extractors with declared
/// ordering (`requires`) and type-set inheritance (`extends`) relative to
/// other scenarios. `extends` implies `requires`: a scenario that extends
/// a base also inherits the base's `analyzer_bindings` and therefore must
/// run after it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    #[serde(default)]
    pub extends: Vec<String>,
    #[serde(default)]
    pub requires: Vec<String>,
    pub analyzer_bindings: Vec<String>,
}

/// The full orchestrator configuration: a project root plus every
/// namespace and scenario it knows about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub project_name: String,
    pub project_root: PathBuf,
    pub namespaces: Vec<NamespaceConfig>,
    pub scenarios: Vec<Scenario>,
}

/// Ordered execution plan for one namespace: its matched files, and its
/// scenario ids in the order Kahn's algorithm resolved them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespacePlan {
    pub namespace: String,
    pub files: Vec<String>,
    pub scenario_order: Vec<String>,
}

/// Batch runner tunables (spec.md §6.3). `on_progress`/`on_error` aren't
/// represented as fields here since the config is loaded from TOML and
/// closures don't round-trip through `serde`; a caller observes progress
/// and errors instead by passing an `EventBus` to [`Orchestrator::run_with_config`]
/// and draining `BatchEvent`s from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRunnerConfig {
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub retry_count: Option<u32>,
    #[serde(default)]
    pub retry_delay_ms: Option<u64>,
}

fn default_timeout_ms() -> Option<u64> {
    Some(DEFAULT_TIMEOUT_MS)
}

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

impl Default for BatchRunnerConfig {
    fn default() -> Self {
        Self {
            batch_size: None,
            concurrency: None,
            timeout_ms: default_timeout_ms(),
            retry_count: None,
            retry_delay_ms: None,
        }
    }
}

pub struct Orchestrator {
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self { config }
    }

    pub fn load(path: impl AsRef<Path>) -> GraphResult<Self> {
        let text = fs::read_to_string(path.as_ref())
            .map_err(|e| GraphError::PathInvalid(format!("{}: {e}", path.as_ref().display())))?;
        let config: OrchestratorConfig = toml::from_str(&text)
            .map_err(|e| GraphError::ConfigurationInvalid(e.to_string()))?;
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Expand `file_patterns` minus `exclude_patterns` against the
    /// project root, keeping only files whose extension maps to a
    /// supported `Language`.
    pub fn expand_files(&self, namespace: &NamespaceConfig) -> GraphResult<Vec<String>> {
        let mut matched: HashSet<String> = HashSet::new();
        for pattern in &namespace.file_patterns {
            let full_pattern = self.config.project_root.join(pattern);
            let entries = glob::glob(&full_pattern.to_string_lossy())
                .map_err(|e| GraphError::ConfigurationInvalid(e.to_string()))?;
            for entry in entries {
                let path = entry.map_err(|e| GraphError::Io(e.to_string()))?;
                if !path.is_file() {
                    continue;
                }
                if Language::from_path(&path).is_none() {
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&self.config.project_root) else {
                    continue;
                };
                matched.insert(relative.to_string_lossy().replace('\\', "/"));
            }
        }

        for pattern in &namespace.exclude_patterns {
            let glob_pattern = glob::Pattern::new(pattern)
                .map_err(|e| GraphError::ConfigurationInvalid(e.to_string()))?;
            matched.retain(|file| !glob_pattern.matches(file));
        }

        let mut files: Vec<String> = matched.into_iter().collect();
        files.sort();
        Ok(files)
    }

    /// Resolve `scenarios[]` of a namespace into a DAG using `requires`
    /// (explicit ordering) and `extends` (type-set inheritance, which
    /// *also* contributes an ordering constraint: a scenario must run
    /// after every scenario it extends, since it inherits that
    /// scenario's `analyzer_bindings` and those bindings must already
    /// have produced edges to be inherited), and topologically sorts
    /// the result with Kahn's algorithm.
    pub fn resolve_scenario_order(&self, namespace: &NamespaceConfig) -> GraphResult<Vec<String>> {
        let selected: HashSet<&str> = namespace.scenarios.iter().map(String::as_str).collect();
        let by_id: HashMap<&str, &Scenario> = self
            .config
            .scenarios
            .iter()
            .map(|s| (s.id.as_str(), s))
            .collect();

        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for id in &selected {
            in_degree.entry(id).or_insert(0);
        }
        for id in &selected {
            let scenario = by_id
                .get(id)
                .ok_or_else(|| GraphError::ConfigurationInvalid(format!("unknown scenario '{id}'")))?;
            let mut predecessors: HashSet<&str> = HashSet::new();
            for requirement in &scenario.requires {
                if selected.contains(requirement.as_str()) {
                    predecessors.insert(requirement.as_str());
                }
            }
            for base in &scenario.extends {
                if selected.contains(base.as_str()) {
                    predecessors.insert(base.as_str());
                }
            }
            for predecessor in predecessors {
                *in_degree.entry(id).or_insert(0) += 1;
                dependents.entry(predecessor).or_default().push(id);
            }
        }

        let mut initial: Vec<&str> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(&id, _)| id)
            .collect();
        initial.sort();
        let mut queue: VecDeque<&str> = initial.into();

        let mut order = Vec::new();
        while let Some(id) = queue.pop_front() {
            order.push(id.to_string());
            if let Some(children) = dependents.get(id) {
                let mut ready = Vec::new();
                for &child in children {
                    let degree = in_degree.get_mut(child).unwrap();
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(child);
                    }
                }
                ready.sort();
                for child in ready {
                    queue.push_back(child);
                }
            }
        }

        if order.len() != selected.len() {
            return Err(GraphError::CycleDetected(format!(
                "namespace '{}' declares scenarios whose 'requires'/'extends' form a cycle",
                namespace.name
            )));
        }
        Ok(order)
    }

    /// Resolve every namespace's file set and scenario order without
    /// touching the graph store — useful for a dry-run / `--plan` mode.
    pub fn build_plan(&self) -> GraphResult<Vec<NamespacePlan>> {
        self.config
            .namespaces
            .iter()
            .map(|namespace| {
                Ok(NamespacePlan {
                    namespace: namespace.name.clone(),
                    files: self.expand_files(namespace)?,
                    scenario_order: self.resolve_scenario_order(namespace)?,
                })
            })
            .collect()
    }

    /// Run every namespace with default batch runner settings: no
    /// concurrency cap beyond rayon's own pool, the default 30s per-file
    /// timeout, and no retries.
    pub fn run(&self, store: &GraphStore, queries: &QueryRegistry) -> GraphResult<BatchReport> {
        self.run_with_config(
            store,
            queries,
            &BatchRunnerConfig::default(),
            &CancellationToken::new(),
            None,
        )
    }

    /// Run every namespace's scenarios, in Kahn order, over its matched
    /// files, honoring `config`'s `batch_size`/`concurrency`/`timeout_ms`/
    /// `retry_count`/`retry_delay_ms` (spec.md §6.3). A file matched by
    /// more than one namespace runs each namespace's scenarios
    /// independently: Ownership partitions the edges each extractor is
    /// allowed to touch, so repeated runs over the same file are
    /// idempotent rather than interfering. `cancel` is checked at each
    /// namespace, batch, and per-file suspension point; once set it stops
    /// starting new work and the returned report carries `cancelled =
    /// true`. `events`, if given, receives a `BatchEvent` per
    /// namespace/file boundary — the `on_progress`/`on_error` callback pair
    /// the config shape names.
    pub fn run_with_config(
        &self,
        store: &GraphStore,
        queries: &QueryRegistry,
        config: &BatchRunnerConfig,
        cancel: &CancellationToken,
        events: Option<&EventBus>,
    ) -> GraphResult<BatchReport> {
        let extractors = all_extractors();
        for extractor in &extractors {
            extractor.register_queries(queries)?;
        }

        let pool = match config.concurrency {
            Some(n) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build()
                    .map_err(|e| GraphError::ConfigurationInvalid(e.to_string()))?,
            ),
            None => None,
        };

        let mut report = BatchReport::default();
        'namespaces: for namespace in &self.config.namespaces {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let files = self.expand_files(namespace)?;
            let scenario_order = self.resolve_scenario_order(namespace)?;
            let correlation_id = namespace.name.clone();
            let successful_before = report.successful.len();
            let failed_before = report.failed.len();

            emit(events, || BatchEvent::RunStarted {
                correlation_id: correlation_id.clone(),
                total_files: files.len(),
            });
            codegraph_events::run_start(&correlation_id, files.len());

            let batch_size = config.batch_size.filter(|n| *n > 0).unwrap_or(files.len().max(1));
            for chunk in files.chunks(batch_size) {
                if cancel.is_cancelled() {
                    report.cancelled = true;
                    break 'namespaces;
                }

                let run_chunk = || -> Vec<(String, GraphResult<ExtractionStats>)> {
                    chunk
                        .par_iter()
                        .map(|file| {
                            emit(events, || BatchEvent::FileStarted {
                                correlation_id: correlation_id.clone(),
                                file: file.clone(),
                            });
                            let outcome = if cancel.is_cancelled() {
                                Err(GraphError::Cancelled)
                            } else {
                                self.run_file_with_retry(
                                    store,
                                    queries,
                                    &extractors,
                                    namespace,
                                    &scenario_order,
                                    file,
                                    config,
                                    cancel,
                                )
                            };
                            (file.clone(), outcome)
                        })
                        .collect()
                };
                let results = match &pool {
                    Some(pool) => pool.install(run_chunk),
                    None => run_chunk(),
                };

                for (file, outcome) in results {
                    match outcome {
                        Ok(stats) => {
                            report.record_success(file.clone());
                            report.record_stats(stats.into());
                            emit(events, || BatchEvent::FileSucceeded {
                                correlation_id: correlation_id.clone(),
                                file: file.clone(),
                            });
                            codegraph_events::file_success(&correlation_id, &file);
                        }
                        Err(GraphError::Cancelled) => {
                            report.cancelled = true;
                        }
                        Err(err) => {
                            let error_kind = codegraph_core::error_kind_name(&err);
                            emit(events, || BatchEvent::FileFailed {
                                correlation_id: correlation_id.clone(),
                                file: file.clone(),
                                error_kind: error_kind.clone(),
                                message: err.to_string(),
                            });
                            codegraph_events::file_failure(&correlation_id, &file, &error_kind, &err.to_string());
                            report.record_failure(file, RunStep::Indexing, &err);
                        }
                    }
                }
            }

            let namespace_successful = report.successful.len() - successful_before;
            let namespace_failed = report.failed.len() - failed_before;
            emit(events, || BatchEvent::RunFinished {
                correlation_id: correlation_id.clone(),
                successful: namespace_successful,
                failed: namespace_failed,
                cancelled: report.cancelled,
            });
            if namespace_failed == 0 && !report.cancelled {
                codegraph_events::run_success(&correlation_id, namespace_successful);
            } else {
                codegraph_events::run_failure(
                    &correlation_id,
                    namespace_successful,
                    namespace_failed,
                    report.cancelled,
                );
            }
        }
        Ok(report)
    }

    /// Wrap [`Orchestrator::run_file`] with the configured per-file
    /// timeout and a transient-I/O retry loop (exponential backoff up to
    /// `retry_count`, per spec.md §7). Schema/registry errors and
    /// cancellation are never retried.
    #[allow(clippy::too_many_arguments)]
    fn run_file_with_retry(
        &self,
        store: &GraphStore,
        queries: &QueryRegistry,
        extractors: &[Box<dyn codegraph_extract::Extractor>],
        namespace: &NamespaceConfig,
        scenario_order: &[String],
        file: &str,
        config: &BatchRunnerConfig,
        cancel: &CancellationToken,
    ) -> GraphResult<ExtractionStats> {
        let timeout = config.timeout_ms.map(Duration::from_millis);
        let retry_count = config.retry_count.unwrap_or(0);
        let retry_delay = Duration::from_millis(config.retry_delay_ms.unwrap_or(250));

        let mut attempt = 0u32;
        loop {
            let deadline = timeout.map(|budget| Deadline {
                at: Instant::now() + budget,
                budget,
            });
            let outcome = self.run_file(store, queries, extractors, namespace, scenario_order, file, deadline, cancel);
            match outcome {
                Err(err) if attempt < retry_count && is_transient(&err) => {
                    attempt += 1;
                    std::thread::sleep(retry_delay * 2u32.pow(attempt - 1));
                }
                other => return other,
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn run_file(
        &self,
        store: &GraphStore,
        queries: &QueryRegistry,
        extractors: &[Box<dyn codegraph_extract::Extractor>],
        namespace: &NamespaceConfig,
        scenario_order: &[String],
        file: &str,
        deadline: Option<Deadline>,
        cancel: &CancellationToken,
    ) -> GraphResult<ExtractionStats> {
        let full_path = self.config.project_root.join(file);
        let language = Language::from_path(Path::new(file))
            .ok_or_else(|| GraphError::UnsupportedLanguage(file.to_string()))?;
        let source = fs::read_to_string(&full_path)
            .map_err(|_| GraphError::FileNotFound(full_path.display().to_string()))?;

        let by_id: HashMap<&str, &Scenario> = self
            .config
            .scenarios
            .iter()
            .map(|s| (s.id.as_str(), s))
            .collect();

        let mut stats = ExtractionStats::default();
        for scenario_id in scenario_order {
            check_suspension_point(deadline, cancel)?;
            if !by_id.contains_key(scenario_id.as_str()) {
                continue;
            }
            let scenario_config = namespace
                .scenario_config
                .get(scenario_id)
                .cloned()
                .unwrap_or(serde_json::Value::Null);

            let ctx = ExtractionContext {
                project_name: self.config.project_name.clone(),
                source_file: file.to_string(),
                language,
                source: source.clone(),
                queries,
                scenario_config,
            };

            // A scenario's effective binding set is its own
            // `analyzer_bindings` unioned with those of every scenario it
            // (transitively) `extends` — spec §4.9/§3's "extends induces
            // type inheritance of emitted edge kinds".
            let bindings = effective_bindings(&by_id, scenario_id);

            for extractor in extractors {
                check_suspension_point(deadline, cancel)?;
                if !extractor
                    .owned_edge_types()
                    .iter()
                    .any(|edge_type| bindings.contains(*edge_type) || bindings.contains("*"))
                {
                    continue;
                }
                if !extractor.languages().contains(&language) {
                    continue;
                }
                stats.merge(extractor.extract(&ctx, store)?);
            }
        }

        if !namespace.semantic_tags.is_empty() {
            tag_file_nodes(store, file, &namespace.semantic_tags)?;
        }

        Ok(stats)
    }
}

/// A per-file wall-clock budget: `at` is the instant it expires, `budget`
/// is the configured duration it was given (reported back on a `Timeout`).
#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    budget: Duration,
}

/// Checked at every scenario/extractor boundary — the suspension points
/// spec.md §5 names (AST parsing, graph-store I/O) — so a timed-out or
/// cancelled file stops before its next extractor runs rather than mid-run.
fn check_suspension_point(deadline: Option<Deadline>, cancel: &CancellationToken) -> GraphResult<()> {
    if cancel.is_cancelled() {
        return Err(GraphError::Cancelled);
    }
    if let Some(deadline) = deadline {
        if Instant::now() >= deadline.at {
            return Err(GraphError::Timeout(deadline.budget));
        }
    }
    Ok(())
}

fn is_transient(err: &GraphError) -> bool {
    matches!(err, GraphError::Io(_))
}

/// Union a scenario's `analyzer_bindings` with those of every scenario it
/// (transitively) `extends` (spec §4.9: "`extends` induces type
/// inheritance of emitted edge kinds"). Guards against an `extends` cycle
/// with a visited set rather than assuming the DAG validation in
/// `resolve_scenario_order` already ran over this exact scenario set.
fn effective_bindings(by_id: &HashMap<&str, &Scenario>, scenario_id: &str) -> HashSet<String> {
    let mut bindings = HashSet::new();
    let mut visited = HashSet::new();
    let mut stack = vec![scenario_id.to_string()];
    while let Some(id) = stack.pop() {
        if !visited.insert(id.clone()) {
            continue;
        }
        if let Some(scenario) = by_id.get(id.as_str()) {
            bindings.extend(scenario.analyzer_bindings.iter().cloned());
            stack.extend(scenario.extends.iter().cloned());
        }
    }
    bindings
}

/// Only constructs the event (and touches the correlation id clone) when
/// something is actually listening.
fn emit(events: Option<&EventBus>, make: impl FnOnce() -> BatchEvent) {
    if let Some(bus) = events {
        let _ = bus.sender().try_send(make());
    }
}

/// Stamp every node owned by `file` with the namespace's `semantic_tags`.
fn tag_file_nodes(store: &GraphStore, file: &str, tags: &[String]) -> GraphResult<()> {
    let nodes = store.find_nodes(&codegraph_storage::NodeFilter {
        source_file: Some(file.to_string()),
        ..Default::default()
    })?;
    for mut node in nodes {
        let mut changed = false;
        for tag in tags {
            if !node.semantic_tags.contains(tag) {
                node.semantic_tags.push(tag.clone());
                changed = true;
            }
        }
        if changed {
            store.upsert_node(codegraph_core::NodeInput {
                identifier: node.identifier,
                node_type: node.node_type,
                name: node.name,
                source_file: node.source_file,
                language: node.language,
                semantic_tags: node.semantic_tags,
                metadata: node.metadata,
                start_line: node.start_line,
                end_line: node.end_line,
            })?;
        }
    }
    Ok(())
}

/// Invoked once after a batch run to bring the Inference Cache in line
/// with whatever sync strategy the engine is configured with (spec
/// §4.7/§5) — a thin convenience so the CLI doesn't need to know the
/// engine's internals.
pub fn sync_inference_cache(engine: &Engine, force: bool) -> GraphResult<()> {
    engine.sync_cache(force)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn scenario(id: &str, requires: &[&str]) -> Scenario {
        Scenario {
            id: id.to_string(),
            extends: Vec::new(),
            requires: requires.iter().map(|s| s.to_string()).collect(),
            analyzer_bindings: vec!["*".to_string()],
        }
    }

    fn scenario_full(id: &str, requires: &[&str], extends: &[&str], analyzer_bindings: &[&str]) -> Scenario {
        Scenario {
            id: id.to_string(),
            extends: extends.iter().map(|s| s.to_string()).collect(),
            requires: requires.iter().map(|s| s.to_string()).collect(),
            analyzer_bindings: analyzer_bindings.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn orchestrator_with_scenarios(scenarios: Vec<Scenario>) -> Orchestrator {
        Orchestrator::new(OrchestratorConfig {
            project_name: "demo".to_string(),
            project_root: PathBuf::from("."),
            namespaces: Vec::new(),
            scenarios,
        })
    }

    #[test]
    fn resolves_scenario_order_from_requires() {
        let orchestrator = orchestrator_with_scenarios(vec![
            scenario("symbol-dependency", &["file-dependency"]),
            scenario("file-dependency", &["basic-structure"]),
            scenario("basic-structure", &[]),
        ]);
        let namespace = NamespaceConfig {
            name: "backend".to_string(),
            file_patterns: vec![],
            exclude_patterns: vec![],
            description: None,
            semantic_tags: vec![],
            scenarios: vec![
                "symbol-dependency".to_string(),
                "basic-structure".to_string(),
                "file-dependency".to_string(),
            ],
            scenario_config: HashMap::new(),
        };
        let order = orchestrator.resolve_scenario_order(&namespace).unwrap();
        assert_eq!(
            order,
            vec!["basic-structure".to_string(), "file-dependency".to_string(), "symbol-dependency".to_string()]
        );
    }

    #[test]
    fn rejects_cyclic_requires() {
        let orchestrator = orchestrator_with_scenarios(vec![
            scenario("a", &["b"]),
            scenario("b", &["a"]),
        ]);
        let namespace = NamespaceConfig {
            name: "cyclic".to_string(),
            file_patterns: vec![],
            exclude_patterns: vec![],
            description: None,
            semantic_tags: vec![],
            scenarios: vec!["a".to_string(), "b".to_string()],
            scenario_config: HashMap::new(),
        };
        assert!(orchestrator.resolve_scenario_order(&namespace).is_err());
    }

    /// Spec §8 scenario 6, the literal `extends` case (not reformulated as
    /// `requires`): `symbol-dependency extends file-dependency` and
    /// `file-dependency requires basic-structure` must still resolve to
    /// `[basic-structure, file-dependency, symbol-dependency]` — the
    /// extending scenario runs after the scenario it extends so the edge
    /// kinds it inherits have already been produced.
    #[test]
    fn resolves_scenario_order_honors_extends_as_an_ordering_constraint() {
        let orchestrator = orchestrator_with_scenarios(vec![
            scenario_full("symbol-dependency", &[], &["file-dependency"], &["calls"]),
            scenario_full("file-dependency", &["basic-structure"], &[], &["imports_file"]),
            scenario_full("basic-structure", &[], &[], &["contains"]),
        ]);
        let namespace = NamespaceConfig {
            name: "backend".to_string(),
            file_patterns: vec![],
            exclude_patterns: vec![],
            description: None,
            semantic_tags: vec![],
            scenarios: vec![
                "symbol-dependency".to_string(),
                "basic-structure".to_string(),
                "file-dependency".to_string(),
            ],
            scenario_config: HashMap::new(),
        };
        let order = orchestrator.resolve_scenario_order(&namespace).unwrap();
        assert_eq!(
            order,
            vec!["basic-structure".to_string(), "file-dependency".to_string(), "symbol-dependency".to_string()]
        );
    }

    #[test]
    fn rejects_cyclic_extends() {
        let orchestrator = orchestrator_with_scenarios(vec![
            scenario_full("a", &[], &["b"], &["*"]),
            scenario_full("b", &[], &["a"], &["*"]),
        ]);
        let namespace = NamespaceConfig {
            name: "cyclic".to_string(),
            file_patterns: vec![],
            exclude_patterns: vec![],
            description: None,
            semantic_tags: vec![],
            scenarios: vec!["a".to_string(), "b".to_string()],
            scenario_config: HashMap::new(),
        };
        assert!(orchestrator.resolve_scenario_order(&namespace).is_err());
    }

    #[test]
    fn effective_bindings_unions_transitively_extended_scenarios() {
        let scenarios = vec![
            scenario_full("basic-structure", &[], &[], &["contains", "declares"]),
            scenario_full("file-dependency", &["basic-structure"], &[], &["imports_file"]),
            scenario_full("symbol-dependency", &[], &["file-dependency"], &["calls"]),
        ];
        let by_id: HashMap<&str, &Scenario> = scenarios.iter().map(|s| (s.id.as_str(), s)).collect();

        let bindings = effective_bindings(&by_id, "symbol-dependency");
        assert!(bindings.contains("calls"));
        assert!(bindings.contains("imports_file"));
        assert!(!bindings.contains("contains"), "extends is not transitive through file-dependency's own requires");
    }

    #[test]
    fn expand_files_matches_patterns_and_honors_excludes() {
        let dir = tempfile::tempdir().unwrap();
        let src_dir = dir.path().join("src");
        fs::create_dir_all(&src_dir).unwrap();
        let mut a = fs::File::create(src_dir.join("a.ts")).unwrap();
        writeln!(a, "export const a = 1;").unwrap();
        let mut b = fs::File::create(src_dir.join("b.test.ts")).unwrap();
        writeln!(b, "export const b = 2;").unwrap();

        let orchestrator = Orchestrator::new(OrchestratorConfig {
            project_name: "demo".to_string(),
            project_root: dir.path().to_path_buf(),
            namespaces: Vec::new(),
            scenarios: Vec::new(),
        });
        let namespace = NamespaceConfig {
            name: "backend".to_string(),
            file_patterns: vec!["src/**/*.ts".to_string()],
            exclude_patterns: vec!["*.test.ts".to_string()],
            description: None,
            semantic_tags: vec![],
            scenarios: default_scenarios(),
            scenario_config: HashMap::new(),
        };
        let files = orchestrator.expand_files(&namespace).unwrap();
        assert_eq!(files, vec!["src/a.ts".to_string()]);
    }

    #[test]
    fn batch_runner_config_defaults_to_thirty_second_timeout_and_no_retries() {
        let config = BatchRunnerConfig::default();
        assert_eq!(config.timeout_ms, Some(30_000));
        assert_eq!(config.retry_count, None);
        assert_eq!(config.concurrency, None);
        assert_eq!(config.batch_size, None);
    }

    #[test]
    fn run_with_config_stops_and_reports_cancelled_when_token_precancelled() {
        let dir = tempfile::tempdir().unwrap();
        let src_dir = dir.path().join("src");
        fs::create_dir_all(&src_dir).unwrap();
        writeln!(fs::File::create(src_dir.join("a.ts")).unwrap(), "export const a = 1;").unwrap();

        let orchestrator = Orchestrator::new(OrchestratorConfig {
            project_name: "demo".to_string(),
            project_root: dir.path().to_path_buf(),
            namespaces: vec![NamespaceConfig {
                name: "backend".to_string(),
                file_patterns: vec!["src/**/*.ts".to_string()],
                exclude_patterns: vec![],
                description: None,
                semantic_tags: vec![],
                scenarios: default_scenarios(),
                scenario_config: HashMap::new(),
            }],
            scenarios: vec![
                scenario("basic-structure", &[]),
                scenario("file-dependency", &["basic-structure"]),
            ],
        });

        let registry = std::sync::Arc::new(codegraph_registry::Registry::with_core_types());
        let store = codegraph_storage::GraphStore::new_in_memory(registry).unwrap();
        let queries = QueryRegistry::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = orchestrator
            .run_with_config(&store, &queries, &BatchRunnerConfig::default(), &cancel, None)
            .unwrap();
        assert!(report.cancelled);
        assert!(report.successful.is_empty());
    }

    #[test]
    fn is_transient_only_matches_io_errors() {
        assert!(is_transient(&GraphError::Io("disk full".to_string())));
        assert!(!is_transient(&GraphError::Cancelled));
        assert!(!is_transient(&GraphError::UnknownEdgeType("x".to_string())));
    }
}
