//! The Unknown-Symbol / Alias Resolver. When an extractor meets an
//! imported name it can't yet resolve, it leaves behind an
//! Unknown Symbol node (plus an `aliasOf` edge from the local binding).
//! This module finds candidates for those unknown nodes among known
//! symbols and, above a confidence threshold, rewrites the unknown node's
//! edges onto the winner.
use codegraph_core::{GraphResult, Node, NodeId, node_types};
use codegraph_storage::{GraphStore, NodeFilter};
use serde::{Deserialize, Serialize};

/// Ordered by priority (exact 10, type 8, context 6, semantic 4, partial
/// 2) — the first applicable rule above threshold wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MatchKind {
    Partial,
    Semantic,
    Context,
    Type,
    Exact,
}

impl MatchKind {
    pub fn priority(self) -> u8 {
        match self {
            MatchKind::Exact => 10,
            MatchKind::Type => 8,
            MatchKind::Context => 6,
            MatchKind::Semantic => 4,
            MatchKind::Partial => 2,
        }
    }
}

/// An Equivalence Candidate: a known node that might be what an unknown
/// node actually refers to, scored by the weighted name/type/context
/// formula below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub node_id: NodeId,
    pub identifier: String,
    pub confidence: f64,
    pub match_kind: MatchKind,
}

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Confidence threshold a winning candidate must clear.
    pub confidence_threshold: f64,
    /// Maximum candidates considered per unknown node before picking a
    /// winner, to bound cost on large graphs.
    pub max_candidates: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.6,
            max_candidates: 50,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResolutionOutcome {
    pub resolved: usize,
    pub unresolved: usize,
    pub candidates_by_unknown: Vec<(NodeId, Vec<Candidate>)>,
}

pub struct Resolver<'a> {
    store: &'a GraphStore,
    config: ResolverConfig,
}

impl<'a> Resolver<'a> {
    pub fn new(store: &'a GraphStore, config: ResolverConfig) -> Self {
        Self { store, config }
    }

    /// Attempt to resolve every `unknown` node currently in the store.
    /// For each, finds candidates, and if the best one clears the
    /// threshold, rewrites the unknown node's edges onto it and removes
    /// it. Nodes left unresolved keep their `unknown` type and are
    /// reported so a caller can decide whether to retry later.
    pub fn resolve_all(&self) -> GraphResult<ResolutionOutcome> {
        let unknowns = self.store.find_nodes(&NodeFilter {
            node_type: Some(node_types::UNKNOWN.to_string()),
            ..Default::default()
        })?;
        let known_pool = self.known_candidate_pool()?;

        let mut outcome = ResolutionOutcome::default();
        for unknown in unknowns {
            let candidates = self.candidates_for(&unknown, &known_pool);
            let winner = candidates
                .iter()
                .filter(|c| c.confidence >= self.config.confidence_threshold)
                .max_by(|a, b| {
                    a.match_kind
                        .priority()
                        .cmp(&b.match_kind.priority())
                        .then(a.confidence.partial_cmp(&b.confidence).unwrap())
                });

            match winner {
                Some(winner) => {
                    self.store.rewrite_node_references(unknown.id, winner.node_id)?;
                    outcome.resolved += 1;
                }
                None => {
                    outcome.unresolved += 1;
                }
            }
            outcome.candidates_by_unknown.push((unknown.id, candidates));
        }
        Ok(outcome)
    }

    /// Find and score candidates for a single unknown node without
    /// mutating the store — useful for callers that want to inspect or
    /// rank matches before committing to a rewrite.
    pub fn candidates(&self, unknown: &Node) -> GraphResult<Vec<Candidate>> {
        let pool = self.known_candidate_pool()?;
        Ok(self.candidates_for(unknown, &pool))
    }

    fn known_candidate_pool(&self) -> GraphResult<Vec<Node>> {
        let all = self.store.find_nodes(&NodeFilter::default())?;
        Ok(all
            .into_iter()
            .filter(|n| n.node_type != node_types::UNKNOWN && n.node_type != node_types::ALIAS)
            .collect())
    }

    fn candidates_for(&self, unknown: &Node, pool: &[Node]) -> Vec<Candidate> {
        let expected_type = unknown
            .metadata
            .get("expected_type")
            .and_then(|v| v.as_str());
        let specifier = unknown
            .metadata
            .get("specifier")
            .and_then(|v| v.as_str())
            .unwrap_or(unknown.name.as_str());

        let mut scored: Vec<Candidate> = pool
            .iter()
            .filter_map(|candidate| {
                let name_score = name_score(&unknown.name, &candidate.name);
                if name_score == 0.0 {
                    return None;
                }
                let type_score = type_score(expected_type, &candidate.node_type);
                let context_score = context_score(specifier, &candidate.source_file);
                let confidence = (0.4 * name_score + 0.3 * type_score + 0.3 * context_score).clamp(0.0, 1.0);
                let match_kind = classify_match(name_score, type_score, context_score);
                Some(Candidate {
                    node_id: candidate.id,
                    identifier: candidate.identifier.clone(),
                    confidence,
                    match_kind,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.match_kind
                .priority()
                .cmp(&a.match_kind.priority())
                .then(b.confidence.partial_cmp(&a.confidence).unwrap())
        });
        scored.truncate(self.config.max_candidates);
        scored
    }
}

fn name_score(unknown_name: &str, candidate_name: &str) -> f64 {
    if unknown_name == candidate_name {
        1.0
    } else if unknown_name.eq_ignore_ascii_case(candidate_name) {
        0.85
    } else if candidate_name.contains(unknown_name) || unknown_name.contains(candidate_name) {
        0.5
    } else {
        0.0
    }
}

fn type_score(expected_type: Option<&str>, candidate_type: &str) -> f64 {
    match expected_type {
        Some(node_types::ANY_DECLARATION) => {
            if node_types::DECLARATION_TYPES.contains(&candidate_type) {
                1.0
            } else {
                0.2
            }
        }
        Some(expected) if expected == candidate_type => 1.0,
        Some(_) => 0.2,
        None => 0.5,
    }
}

/// `specifier` is the raw import specifier (e.g. `./types`, extension
/// omitted); `candidate_source_file` is a project-relative path (e.g.
/// `types.ts`). Strips the leading relative prefix from one side and the
/// extension from the other before comparing, so a same-directory import
/// with an extension-less specifier matches the file it actually points
/// at exactly rather than only by suffix.
fn context_score(specifier: &str, candidate_source_file: &str) -> f64 {
    let normalized_specifier = specifier.trim_start_matches("./").trim_start_matches('/');
    let normalized_candidate = strip_extension(candidate_source_file);
    if candidate_source_file == specifier || normalized_candidate == normalized_specifier {
        1.0
    } else if candidate_source_file.ends_with(normalized_specifier)
        || normalized_specifier.ends_with(candidate_source_file)
        || normalized_candidate.ends_with(normalized_specifier)
        || normalized_specifier.ends_with(normalized_candidate)
    {
        0.7
    } else {
        0.3
    }
}

fn strip_extension(path: &str) -> &str {
    match path.rsplit_once('.') {
        Some((stem, _extension)) => stem,
        None => path,
    }
}

fn classify_match(name_score: f64, type_score: f64, context_score: f64) -> MatchKind {
    if name_score >= 1.0 && type_score >= 1.0 {
        MatchKind::Exact
    } else if type_score >= 1.0 {
        MatchKind::Type
    } else if context_score >= 0.7 {
        MatchKind::Context
    } else if name_score >= 0.85 {
        MatchKind::Semantic
    } else {
        MatchKind::Partial
    }
}
