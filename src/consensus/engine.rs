//! Conflict grouping and resolution
//!
//! One run takes the `AgentResult`s for a single trigger:
//!
//! 1. Group results greedily by their lead suggestion. A result joins the
//!    first group whose seed lead is similar in both title and description.
//! 2. Singleton groups pass through untouched.
//! 3. Larger groups are classified (semantic vs implementation, max
//!    severity) and resolved by authority, evidence or majority vote.
//!
//! Runs are deterministic: same input and context, same output. Ties go to
//! the earliest member.

use super::similarity::jaccard;
use crate::agents::context::RepositoryIntelligence;
use crate::agents::types::{AgentResult, AgentSuggestion, AgentType, Severity};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

/// `agent_id` of every resolved result
pub const CONSENSUS_AGENT_ID: &str = "consensus-engine";
/// Prefixed to the winning suggestion id on a resolved suggestion
pub const RESOLVED_ID_PREFIX: &str = "consensus-";

/// Words that mark a reasoning string as explanatory
const CONTEXT_KEYWORDS: &[&str] = &[
    "because",
    "since",
    "therefore",
    "impact",
    "risk",
    "dependency",
    "performance",
    "security",
    "maintainability",
    "pattern",
    "convention",
    "policy",
];

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Title and description Jaccard must both exceed this to group
    pub similarity_threshold: f64,
    /// Title similarity above which differing reasoning is a semantic conflict
    pub semantic_threshold: f64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.7,
            semantic_threshold: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// Same intent, different reasoning
    Semantic,
    /// Same reasoning or unrelated intent, different details
    Implementation,
}

impl ConflictType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictType::Semantic => "semantic",
            ConflictType::Implementation => "implementation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    AuthorityBased,
    EvidenceBased,
    ConsensusBased,
}

impl ResolutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStrategy::AuthorityBased => "authority_based",
            ResolutionStrategy::EvidenceBased => "evidence_based",
            ResolutionStrategy::ConsensusBased => "consensus_based",
        }
    }
}

impl std::fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome for one conflicting group. Emitted, never stored as agent state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictResolution {
    pub resolved_suggestion: AgentSuggestion,
    pub resolution_strategy: ResolutionStrategy,
    pub justification: String,
    pub confidence: f64,
    pub conflict_type: ConflictType,
    pub severity: Severity,
    /// Agent whose suggestion won
    pub winner_agent_id: String,
    pub participants: Vec<String>,
}

/// Repository facts used by evidence-based scoring
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsensusContext {
    pub dependencies: Vec<String>,
    pub metadata: HashMap<String, String>,
    pub policies: Vec<String>,
}

impl From<&RepositoryIntelligence> for ConsensusContext {
    fn from(info: &RepositoryIntelligence) -> Self {
        Self {
            dependencies: info.dependencies.clone(),
            metadata: info.metadata.clone(),
            policies: info.policies.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsensusMetrics {
    pub runs: u64,
    pub total_conflicts: u64,
    pub resolved_conflicts: u64,
    pub unresolved_conflicts: u64,
    pub average_resolution_ms: f64,
    /// Unresolved conflicts in the most recent run
    pub last_run_unresolved: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusHealth {
    pub healthy: bool,
    pub status: String,
    pub metrics: ConsensusMetrics,
}

/// Full output of one run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsensusReport {
    pub results: Vec<AgentResult>,
    pub resolutions: Vec<ConflictResolution>,
    pub groups: usize,
    pub unresolved: usize,
}

// ============================================================================
// Engine
// ============================================================================

pub struct ConsensusEngine {
    config: ConsensusConfig,
    metrics: Mutex<ConsensusMetrics>,
}

impl Default for ConsensusEngine {
    fn default() -> Self {
        Self::new(ConsensusConfig::default())
    }
}

impl ConsensusEngine {
    pub fn new(config: ConsensusConfig) -> Self {
        Self {
            config,
            metrics: Mutex::new(ConsensusMetrics::default()),
        }
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// Merge results, returning one result per group
    pub fn apply_consensus(&self, results: &[AgentResult], context: &ConsensusContext) -> Vec<AgentResult> {
        self.resolve(results, context).results
    }

    /// Merge results and report how each conflict was settled
    pub fn resolve(&self, results: &[AgentResult], context: &ConsensusContext) -> ConsensusReport {
        let groups = self.group(results);
        let mut report = ConsensusReport {
            groups: groups.len(),
            ..Default::default()
        };
        let mut latencies = Vec::new();

        for group in &groups {
            if group.len() == 1 {
                report.results.push(results[group[0]].clone());
                continue;
            }

            let members: Vec<&AgentResult> = group.iter().map(|&i| &results[i]).collect();
            let started = Instant::now();
            match self.resolve_group(&members, context) {
                Some(resolution) => {
                    latencies.push(started.elapsed().as_secs_f64() * 1000.0);
                    tracing::debug!(
                        strategy = %resolution.resolution_strategy,
                        conflict = resolution.conflict_type.as_str(),
                        winner = %resolution.winner_agent_id,
                        size = members.len(),
                        "Resolved conflict"
                    );
                    report.results.push(Self::resolved_result(&resolution, &members));
                    report.resolutions.push(resolution);
                }
                None => {
                    tracing::warn!(size = members.len(), "Conflict left unresolved, passing members through");
                    report.unresolved += 1;
                    report.results.extend(members.into_iter().cloned());
                }
            }
        }

        self.record_run(report.resolutions.len(), report.unresolved, &latencies);
        report
    }

    pub fn metrics(&self) -> ConsensusMetrics {
        self.metrics.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn health_check(&self) -> ConsensusHealth {
        let metrics = self.metrics();
        let healthy = metrics.last_run_unresolved == 0;
        ConsensusHealth {
            healthy,
            status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
            metrics,
        }
    }

    // ------------------------------------------------------------------------
    // Grouping
    // ------------------------------------------------------------------------

    /// Indices of `results`, grouped. Results without suggestions stay alone.
    fn group(&self, results: &[AgentResult]) -> Vec<Vec<usize>> {
        let mut groups: Vec<Vec<usize>> = Vec::new();

        for (idx, result) in results.iter().enumerate() {
            let Some(lead) = result.lead() else {
                groups.push(vec![idx]);
                continue;
            };
            let home = groups.iter().position(|g| {
                results[g[0]]
                    .lead()
                    .is_some_and(|seed| self.similar(seed, lead))
            });
            match home {
                Some(g) => groups[g].push(idx),
                None => groups.push(vec![idx]),
            }
        }
        groups
    }

    fn similar(&self, a: &AgentSuggestion, b: &AgentSuggestion) -> bool {
        jaccard(&a.title, &b.title) > self.config.similarity_threshold
            && jaccard(&a.description, &b.description) > self.config.similarity_threshold
    }

    // ------------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------------

    fn classify(&self, leads: &[(&AgentResult, &AgentSuggestion)]) -> (ConflictType, Severity) {
        let (_, seed) = leads[0];
        let seed_reasoning = seed.reasoning.trim().to_lowercase();
        let reasoning_differs = leads
            .iter()
            .any(|(_, s)| s.reasoning.trim().to_lowercase() != seed_reasoning);
        let intent_aligned = leads
            .iter()
            .all(|(_, s)| jaccard(&seed.title, &s.title) > self.config.semantic_threshold);

        let conflict_type = if reasoning_differs && intent_aligned {
            ConflictType::Semantic
        } else {
            ConflictType::Implementation
        };
        let severity = leads
            .iter()
            .map(|(_, s)| s.severity)
            .max()
            .unwrap_or(Severity::Info);
        (conflict_type, severity)
    }

    fn resolve_group(&self, members: &[&AgentResult], context: &ConsensusContext) -> Option<ConflictResolution> {
        let leads: Vec<(&AgentResult, &AgentSuggestion)> = members
            .iter()
            .filter_map(|r| r.lead().map(|s| (*r, s)))
            .collect();
        if leads.len() != members.len() || leads.is_empty() {
            return None;
        }

        let (conflict_type, severity) = self.classify(&leads);
        let has_security = leads.iter().any(|(r, _)| r.agent_type == AgentType::Security);

        let (strategy, winner, confidence, justification) =
            if severity == Severity::Critical || has_security {
                let (w, why) = Self::by_authority(&leads, conflict_type);
                (ResolutionStrategy::AuthorityBased, w, leads[w].1.confidence, why)
            } else if conflict_type == ConflictType::Semantic {
                let (w, why) = Self::by_evidence(&leads, context);
                (ResolutionStrategy::EvidenceBased, w, leads[w].1.confidence, why)
            } else {
                let (w, votes) = Self::by_vote(&leads);
                let scaled = leads[w].1.confidence * votes as f64 / leads.len() as f64;
                let why = format!(
                    "{} of {} agents agreed on \"{}\" ({})",
                    votes,
                    leads.len(),
                    leads[w].1.title,
                    leads[w].1.severity
                );
                (ResolutionStrategy::ConsensusBased, w, scaled, why)
            };

        let (winner_result, winner_suggestion) = leads[winner];
        let mut resolved = winner_suggestion.clone();
        resolved.id = format!("{}{}", RESOLVED_ID_PREFIX, winner_suggestion.id);
        resolved.confidence = confidence.clamp(0.0, 1.0);
        resolved.tags.push(format!("consensus:{}", strategy));

        Some(ConflictResolution {
            resolved_suggestion: resolved,
            resolution_strategy: strategy,
            justification,
            confidence: confidence.clamp(0.0, 1.0),
            conflict_type,
            severity,
            winner_agent_id: winner_result.agent_id.clone(),
            participants: leads.iter().map(|(r, _)| r.agent_id.clone()).collect(),
        })
    }

    /// Security wins outright, then architecture on semantic conflicts,
    /// then the most confident member
    fn by_authority(leads: &[(&AgentResult, &AgentSuggestion)], conflict_type: ConflictType) -> (usize, String) {
        if let Some(i) = leads.iter().position(|(r, _)| r.agent_type == AgentType::Security) {
            return (i, format!("security agent {} has authority", leads[i].0.agent_id));
        }
        if conflict_type == ConflictType::Semantic {
            if let Some(i) = leads.iter().position(|(r, _)| r.agent_type == AgentType::Architecture) {
                return (i, format!("architecture agent {} has authority on design intent", leads[i].0.agent_id));
            }
        }
        let i = Self::most_confident(leads);
        (i, format!("critical conflict, highest confidence from {}", leads[i].0.agent_id))
    }

    fn most_confident(leads: &[(&AgentResult, &AgentSuggestion)]) -> usize {
        let mut best = 0;
        for (i, (_, s)) in leads.iter().enumerate().skip(1) {
            if s.confidence > leads[best].1.confidence {
                best = i;
            }
        }
        best
    }

    fn by_evidence(leads: &[(&AgentResult, &AgentSuggestion)], context: &ConsensusContext) -> (usize, String) {
        let scores: Vec<f64> = leads
            .iter()
            .map(|(_, s)| evidence_score(s, context))
            .collect();
        let mut best = 0;
        for i in 1..scores.len() {
            if scores[i] > scores[best] {
                best = i;
            }
        }
        (
            best,
            format!(
                "strongest evidence from {} (score {:.2})",
                leads[best].0.agent_id, scores[best]
            ),
        )
    }

    /// Majority on (title, severity); returns winner index and vote count
    fn by_vote(leads: &[(&AgentResult, &AgentSuggestion)]) -> (usize, usize) {
        // (first index, votes) per key, in first-seen order
        let mut tally: Vec<((&str, Severity), usize, usize)> = Vec::new();
        for (i, (_, s)) in leads.iter().enumerate() {
            let key = (s.title.as_str(), s.severity);
            match tally.iter_mut().find(|(k, _, _)| *k == key) {
                Some(entry) => entry.2 += 1,
                None => tally.push((key, i, 1)),
            }
        }
        let mut best = 0;
        for i in 1..tally.len() {
            if tally[i].2 > tally[best].2 {
                best = i;
            }
        }
        (tally[best].1, tally[best].2)
    }

    fn resolved_result(resolution: &ConflictResolution, members: &[&AgentResult]) -> AgentResult {
        let mut suggestions = vec![resolution.resolved_suggestion.clone()];
        // Non-lead suggestions were never in conflict
        for member in members {
            suggestions.extend(member.suggestions.iter().skip(1).cloned());
        }

        let mut metadata = HashMap::new();
        metadata.insert("strategy".to_string(), json!(resolution.resolution_strategy));
        metadata.insert("justification".to_string(), json!(resolution.justification));
        metadata.insert("conflict_type".to_string(), json!(resolution.conflict_type));
        metadata.insert("severity".to_string(), json!(resolution.severity));
        metadata.insert("participants".to_string(), json!(resolution.participants));
        metadata.insert("winner_agent_id".to_string(), json!(resolution.winner_agent_id));
        metadata.insert("group_size".to_string(), json!(members.len()));

        AgentResult {
            agent_id: CONSENSUS_AGENT_ID.to_string(),
            agent_type: AgentType::Consensus,
            suggestions,
            confidence: resolution.confidence,
            execution_time_ms: members.iter().map(|m| m.execution_time_ms).max().unwrap_or(0),
            metadata,
        }
    }

    fn record_run(&self, resolved: usize, unresolved: usize, latencies: &[f64]) {
        let Ok(mut m) = self.metrics.lock() else {
            tracing::error!("Consensus metrics lock poisoned");
            return;
        };
        m.runs += 1;
        m.total_conflicts += (resolved + unresolved) as u64;
        m.unresolved_conflicts += unresolved as u64;
        m.last_run_unresolved = unresolved as u64;
        for latency in latencies {
            m.resolved_conflicts += 1;
            let n = m.resolved_conflicts as f64;
            m.average_resolution_ms += (latency - m.average_resolution_ms) / n;
        }
    }
}

/// Richness of the reasoning plus alignment with the repository plus raw confidence
fn evidence_score(suggestion: &AgentSuggestion, context: &ConsensusContext) -> f64 {
    let reasoning = suggestion.reasoning.to_lowercase();
    let keyword_hits = CONTEXT_KEYWORDS.iter().filter(|k| reasoning.contains(*k)).count();
    let richness = (reasoning.len() as f64 / 500.0).min(0.5) + (keyword_hits as f64 * 0.1).min(0.5);

    let haystack = format!("{} {}", reasoning, suggestion.description.to_lowercase());
    let mentions = |needle: &String| !needle.is_empty() && haystack.contains(&needle.to_lowercase());
    let mut alignment = 0.0;
    alignment += context.dependencies.iter().filter(|d| mentions(d)).count() as f64 * 0.2;
    alignment += context.metadata.values().filter(|v| mentions(v)).count() as f64 * 0.1;
    alignment += context.policies.iter().filter(|p| mentions(p)).count() as f64 * 0.3;

    richness + alignment.min(1.0) + suggestion.confidence
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suggestion(id: &str, title: &str, severity: Severity, confidence: f64, reasoning: &str) -> AgentSuggestion {
        AgentSuggestion {
            id: id.into(),
            title: title.into(),
            description: "Variable declared in the request handler is never read".into(),
            severity,
            confidence,
            reasoning: reasoning.into(),
            code_patch: None,
            tags: vec![],
        }
    }

    fn result(agent_id: &str, agent_type: AgentType, suggestions: Vec<AgentSuggestion>) -> AgentResult {
        AgentResult {
            agent_id: agent_id.into(),
            agent_type,
            confidence: AgentResult::mean_confidence(&suggestions),
            suggestions,
            execution_time_ms: 10,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn test_dissimilar_results_pass_through() {
        let engine = ConsensusEngine::default();
        let mut secret = suggestion("s1", "Hardcoded secret", Severity::High, 0.9, "literal key");
        secret.description = "API key committed in source".into();
        let naming = suggestion("q1", "Naming convention", Severity::Low, 0.6, "camelCase");

        let input = vec![
            result("security-1", AgentType::Security, vec![secret]),
            result("quality-1", AgentType::Quality, vec![naming]),
        ];
        let output = engine.apply_consensus(&input, &ConsensusContext::default());
        assert_eq!(output, input);
        assert!(engine.health_check().healthy);
    }

    #[test]
    fn test_idempotent_on_resolved_singletons() {
        let engine = ConsensusEngine::default();
        let input = vec![
            result("a", AgentType::Quality, vec![suggestion("1", "Unused variable in handler", Severity::Low, 0.8, "x")]),
            result("b", AgentType::Performance, vec![suggestion("2", "Unused variable in handler", Severity::Low, 0.8, "x")]),
        ];
        let once = engine.apply_consensus(&input, &ConsensusContext::default());
        assert_eq!(once.len(), 1);
        let twice = engine.apply_consensus(&once, &ConsensusContext::default());
        assert_eq!(twice, once);
    }

    #[test]
    fn test_security_has_authority() {
        let engine = ConsensusEngine::default();
        let input = vec![
            result("quality-1", AgentType::Quality, vec![suggestion("q", "Unused variable in handler", Severity::Medium, 0.95, "dead code")]),
            result("security-1", AgentType::Security, vec![suggestion("s", "Unused variable in handler", Severity::Medium, 0.3, "leaks token")]),
        ];
        let report = engine.resolve(&input, &ConsensusContext::default());
        assert_eq!(report.results.len(), 1);
        let resolution = &report.resolutions[0];
        assert_eq!(resolution.resolution_strategy, ResolutionStrategy::AuthorityBased);
        assert_eq!(resolution.winner_agent_id, "security-1");
        assert_eq!(resolution.resolved_suggestion.id, "consensus-s");
        assert_eq!(report.results[0].agent_id, CONSENSUS_AGENT_ID);
        assert_eq!(report.results[0].agent_type, AgentType::Consensus);
    }

    #[test]
    fn test_critical_without_security_takes_most_confident() {
        let engine = ConsensusEngine::default();
        let input = vec![
            result("perf-1", AgentType::Performance, vec![suggestion("p", "Unused variable in handler", Severity::Critical, 0.6, "same")]),
            result("quality-1", AgentType::Quality, vec![suggestion("q", "Unused variable in handler", Severity::Low, 0.8, "same")]),
        ];
        let report = engine.resolve(&input, &ConsensusContext::default());
        let resolution = &report.resolutions[0];
        assert_eq!(resolution.resolution_strategy, ResolutionStrategy::AuthorityBased);
        assert_eq!(resolution.severity, Severity::Critical);
        assert_eq!(resolution.winner_agent_id, "quality-1");
    }

    #[test]
    fn test_architecture_has_authority_on_semantic_conflict() {
        let engine = ConsensusEngine::default();
        let input = vec![
            result("perf-1", AgentType::Performance, vec![suggestion("p", "Unused variable in handler", Severity::Critical, 0.9, "wastes an allocation per request")]),
            result("arch-1", AgentType::Architecture, vec![suggestion("a", "Unused variable in handler", Severity::Medium, 0.5, "leftover from the old layering")]),
            result("quality-1", AgentType::Quality, vec![suggestion("q", "Unused variable in handler", Severity::Low, 0.95, "dead code")]),
        ];
        let report = engine.resolve(&input, &ConsensusContext::default());
        assert_eq!(report.resolutions.len(), 1);
        let resolution = &report.resolutions[0];
        assert_eq!(resolution.conflict_type, ConflictType::Semantic);
        assert_eq!(resolution.resolution_strategy, ResolutionStrategy::AuthorityBased);
        assert_eq!(resolution.winner_agent_id, "arch-1");
        assert_eq!(resolution.confidence, 0.5);
        assert!(resolution.justification.contains("architecture agent arch-1"));
    }

    #[test]
    fn test_architecture_without_semantic_conflict_falls_back_to_confidence() {
        let engine = ConsensusEngine::default();
        let input = vec![
            result("arch-1", AgentType::Architecture, vec![suggestion("a", "Unused variable in handler", Severity::Critical, 0.6, "same")]),
            result("perf-1", AgentType::Performance, vec![suggestion("p", "Unused variable in handler", Severity::High, 0.85, "same")]),
        ];
        let report = engine.resolve(&input, &ConsensusContext::default());
        let resolution = &report.resolutions[0];
        assert_eq!(resolution.conflict_type, ConflictType::Implementation);
        assert_eq!(resolution.resolution_strategy, ResolutionStrategy::AuthorityBased);
        assert_eq!(resolution.winner_agent_id, "perf-1");
        assert!(resolution.justification.contains("highest confidence from perf-1"));
    }

    #[test]
    fn test_majority_vote_scales_confidence() {
        let engine = ConsensusEngine::default();
        let input = vec![
            result("quality-1", AgentType::Quality, vec![suggestion("a1", "Unused variable in handler", Severity::High, 0.9, "unused")]),
            result("perf-1", AgentType::Performance, vec![suggestion("b1", "Unused variable in handler function", Severity::Medium, 0.95, "unused")]),
            result("testing-1", AgentType::Testing, vec![suggestion("a2", "Unused variable in handler", Severity::High, 0.9, "unused")]),
        ];
        let report = engine.resolve(&input, &ConsensusContext::default());
        assert_eq!(report.groups, 1);
        let resolution = &report.resolutions[0];
        assert_eq!(resolution.conflict_type, ConflictType::Implementation);
        assert_eq!(resolution.resolution_strategy, ResolutionStrategy::ConsensusBased);
        assert_eq!(resolution.resolved_suggestion.title, "Unused variable in handler");
        assert_eq!(resolution.resolved_suggestion.severity, Severity::High);
        assert!((resolution.confidence - 0.9 * 2.0 / 3.0).abs() < 1e-9);
        // Inputs are never mutated
        assert_eq!(input[0].suggestions[0].confidence, 0.9);
    }

    #[test]
    fn test_evidence_prefers_contextual_reasoning() {
        let engine = ConsensusEngine::default();
        let context = ConsensusContext {
            dependencies: vec!["express".into()],
            metadata: HashMap::new(),
            policies: vec!["no-dead-code".into()],
        };
        let input = vec![
            result("quality-1", AgentType::Quality, vec![suggestion("q", "Unused variable in handler", Severity::Medium, 0.8, "unused")]),
            result(
                "arch-1",
                AgentType::Architecture,
                vec![suggestion(
                    "a",
                    "Unused variable in handler",
                    Severity::Medium,
                    0.7,
                    "Because the express middleware pattern violates no-dead-code policy, maintainability risk",
                )],
            ),
        ];
        let report = engine.resolve(&input, &context);
        let resolution = &report.resolutions[0];
        assert_eq!(resolution.conflict_type, ConflictType::Semantic);
        assert_eq!(resolution.resolution_strategy, ResolutionStrategy::EvidenceBased);
        assert_eq!(resolution.winner_agent_id, "arch-1");
    }

    #[test]
    fn test_evidence_score_bounds() {
        let context = ConsensusContext {
            dependencies: (0..10).map(|i| format!("dep{}", i)).collect(),
            metadata: HashMap::new(),
            policies: vec![],
        };
        let reasoning = (0..10).map(|i| format!("dep{}", i)).collect::<Vec<_>>().join(" ");
        let s = suggestion("x", "t", Severity::Low, 0.5, &reasoning);
        let score = evidence_score(&s, &context);
        // richness is tiny, alignment capped at 1.0
        assert!(score <= 0.5 + 1.0 + 1.0);
        assert!(score >= 1.5);
    }

    #[test]
    fn test_non_lead_suggestions_carried() {
        let engine = ConsensusEngine::default();
        let mut extra = suggestion("q2", "Long line", Severity::Info, 0.7, "style");
        extra.description = "Line exceeds 120 characters".into();
        let input = vec![
            result("quality-1", AgentType::Quality, vec![suggestion("q1", "Unused variable in handler", Severity::Low, 0.8, "same"), extra]),
            result("perf-1", AgentType::Performance, vec![suggestion("p1", "Unused variable in handler", Severity::Low, 0.8, "same")]),
        ];
        let output = engine.apply_consensus(&input, &ConsensusContext::default());
        assert_eq!(output.len(), 1);
        let ids: Vec<&str> = output[0].suggestions.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["consensus-q1", "q2"]);
    }

    #[test]
    fn test_metrics_accumulate() {
        let engine = ConsensusEngine::default();
        let input = vec![
            result("a", AgentType::Quality, vec![suggestion("1", "Unused variable in handler", Severity::Low, 0.8, "x")]),
            result("b", AgentType::Testing, vec![suggestion("2", "Unused variable in handler", Severity::Low, 0.8, "x")]),
            result("c", AgentType::Documentation, vec![]),
        ];
        let report = engine.resolve(&input, &ConsensusContext::default());
        assert_eq!(report.groups, 2);
        assert_eq!(report.results.len(), 2);

        let metrics = engine.metrics();
        assert_eq!(metrics.runs, 1);
        assert_eq!(metrics.total_conflicts, 1);
        assert_eq!(metrics.resolved_conflicts, 1);
        assert_eq!(metrics.unresolved_conflicts, 0);
        assert_eq!(engine.health_check().status, "healthy");
    }
}
