//! End-to-end coordination scenarios: agents, bus, consensus and the
//! coordinator wired together the way the binary wires them.

use std::sync::Arc;

use async_trait::async_trait;
use codeflow_agents::agents::{
    AgentState, AnalysisContext, QualityAnalyzer, SecurityAnalyzer,
};
use codeflow_agents::bus::MessageType;
use codeflow_agents::consensus::{ResolutionStrategy, CONSENSUS_AGENT_ID};
use codeflow_agents::{
    AgentConfiguration, AgentCoordinator, AgentEnvironment, AgentError, AgentMessage,
    AgentSuggestion, AgentType, AnalysisCapability, ChangeType, ConsensusConfig, Finding,
    MessageBus, Severity, TriggerEvent,
};
use serde_json::json;

struct Scripted {
    agent_type: AgentType,
    findings: Vec<Finding>,
    veto_everything: bool,
}

impl Scripted {
    fn new(agent_type: AgentType, findings: Vec<Finding>) -> Arc<Self> {
        Arc::new(Self {
            agent_type,
            findings,
            veto_everything: false,
        })
    }
}

#[async_trait]
impl AnalysisCapability for Scripted {
    fn agent_type(&self) -> AgentType {
        self.agent_type
    }

    async fn analyze(&self, _context: &AnalysisContext) -> codeflow_agents::Result<Vec<Finding>> {
        Ok(self.findings.clone())
    }

    fn additional_safety_checks(&self, _recommendation: &AgentSuggestion) -> bool {
        !self.veto_everything
    }
}

fn finding(title: &str, severity: Severity, confidence: f64) -> Finding {
    Finding {
        title: title.to_string(),
        description: format!("{} in the changed handler", title),
        severity,
        confidence,
        reasoning: "pattern match on changed lines".to_string(),
        line: Some(3),
        code_patch: None,
        tags: vec![],
    }
}

fn coordinator() -> AgentCoordinator {
    AgentCoordinator::new(
        AgentEnvironment::new(MessageBus::default()),
        ConsensusConfig::default(),
    )
}

fn auth_ts() -> TriggerEvent {
    TriggerEvent::new("src/auth.ts", "acme/web", ChangeType::Modify).with_content(
        "import { getUser } from './users';\n\
         const secret = \"sk-live-1234\";\n\
         const user_name = getUser();\n",
    )
}

#[tokio::test]
async fn test_auth_ts_results_pass_through_consensus() {
    let mut coord = coordinator();
    coord
        .spawn_agent("security", "acme/web", Arc::new(SecurityAnalyzer::new().unwrap()), None)
        .await
        .unwrap();
    let quality_config = AgentConfiguration {
        confidence_threshold: 0.6,
        ..Default::default()
    };
    coord
        .spawn_agent(
            "quality",
            "acme/web",
            Arc::new(QualityAnalyzer::new().unwrap()),
            Some(quality_config),
        )
        .await
        .unwrap();
    coord
        .spawn_agent("docs", "acme/web", Scripted::new(AgentType::Documentation, vec![]), None)
        .await
        .unwrap();

    let outcome = coord.handle_trigger(auth_ts()).await.unwrap();

    assert!(outcome.failures.is_empty());
    assert_eq!(outcome.results.len(), 3);
    assert!(outcome.resolutions.is_empty());
    assert_eq!(outcome.suggestion_count(), 2);

    let security = outcome.results.iter().find(|r| r.agent_id == "security").unwrap();
    assert_eq!(security.suggestions.len(), 1);
    assert_eq!(security.suggestions[0].title, "Hardcoded secret");
    assert_eq!(security.suggestions[0].severity, Severity::High);
    assert_eq!(security.suggestions[0].confidence, 0.9);

    let quality = outcome.results.iter().find(|r| r.agent_id == "quality").unwrap();
    assert_eq!(quality.suggestions.len(), 1);
    assert_eq!(quality.suggestions[0].title, "Naming convention");
    assert_eq!(quality.suggestions[0].severity, Severity::Low);
    assert_eq!(quality.suggestions[0].confidence, 0.6);

    assert!(outcome.results.iter().all(|r| r.agent_id != CONSENSUS_AGENT_ID));
    assert_eq!(coord.metrics().snapshot().suggestions_after_consensus, 2);
}

#[tokio::test]
async fn test_five_violations_force_shutdown_and_reject_sixth_activation() {
    let mut coord = coordinator();
    let capability = Arc::new(Scripted {
        agent_type: AgentType::Quality,
        findings: vec![finding("Rewrite module", Severity::Medium, 0.9)],
        veto_everything: true,
    });
    let agent = coord
        .spawn_agent("quality", "acme/web", capability, None)
        .await
        .unwrap();

    for round in 1..=4 {
        let outcome = coord.handle_trigger(auth_ts()).await.unwrap();
        assert!(outcome.failures.is_empty(), "round {}", round);
        assert_eq!(outcome.suggestion_count(), 0);
        assert_eq!(agent.lock().await.status().open_violations, round);
    }

    let outcome = coord.handle_trigger(auth_ts()).await.unwrap();
    assert_eq!(outcome.failures.len(), 1);
    {
        let guard = agent.lock().await;
        assert_eq!(guard.current_state(), AgentState::Shutdown);
        assert!(guard.state_data().safety.emergency_override.is_some());
    }
    assert_eq!(coord.metrics().snapshot().emergency_shutdowns, 1);

    // Shut-down agents are no longer selected by the coordinator...
    let outcome = coord.handle_trigger(auth_ts()).await.unwrap();
    assert!(outcome.results.is_empty());
    assert!(outcome.failures.is_empty());

    // ...and refuse direct activation
    let err = agent.lock().await.activate("sixth", auth_ts()).await.unwrap_err();
    assert!(matches!(err, AgentError::Shutdown(_)));

    let health = coord.health().await;
    assert!(!health.healthy);
}

#[tokio::test]
async fn test_security_authority_beats_confidence() {
    let mut coord = coordinator();
    coord
        .spawn_agent(
            "quality",
            "acme/web",
            Scripted::new(AgentType::Quality, vec![finding("Unsafe token comparison", Severity::Medium, 0.95)]),
            None,
        )
        .await
        .unwrap();
    coord
        .spawn_agent(
            "security",
            "acme/web",
            Scripted::new(AgentType::Security, vec![finding("Unsafe token comparison", Severity::Medium, 0.75)]),
            None,
        )
        .await
        .unwrap();

    let outcome = coord.handle_trigger(auth_ts()).await.unwrap();
    assert_eq!(outcome.resolutions.len(), 1);
    let resolution = &outcome.resolutions[0];
    assert_eq!(resolution.resolution_strategy, ResolutionStrategy::AuthorityBased);
    assert_eq!(resolution.winner_agent_id, "security");
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].agent_id, CONSENSUS_AGENT_ID);
}

#[tokio::test]
async fn test_two_of_three_vote_scales_confidence() {
    let mut coord = coordinator();
    let specs = [
        ("perf", AgentType::Performance, Severity::High),
        ("arch", AgentType::Architecture, Severity::High),
        ("testing", AgentType::Testing, Severity::Medium),
    ];
    for (id, agent_type, severity) in specs {
        coord
            .spawn_agent(id, "acme/web", Scripted::new(agent_type, vec![finding("X", severity, 0.8)]), None)
            .await
            .unwrap();
    }

    let outcome = coord.handle_trigger(auth_ts()).await.unwrap();
    assert_eq!(outcome.resolutions.len(), 1);
    let resolution = &outcome.resolutions[0];
    assert_eq!(resolution.resolution_strategy, ResolutionStrategy::ConsensusBased);
    assert_eq!(resolution.resolved_suggestion.title, "X");
    assert_eq!(resolution.resolved_suggestion.severity, Severity::High);
    assert!((resolution.confidence - 0.8 * 2.0 / 3.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_direct_and_broadcast_routing() {
    let bus = MessageBus::default();
    let (_a, mut agent_a) = bus.subscribe_channel(Some(MessageType::Feedback), Some("agent-a"));
    let (_b, mut agent_b) = bus.subscribe_channel(Some(MessageType::Feedback), Some("agent-b"));
    let (_t, mut by_type) = bus.subscribe_channel(Some(MessageType::Feedback), None);

    bus.publish(AgentMessage::new("tester", MessageType::Feedback, json!({"n": 1})).to("agent-a"))
        .unwrap();
    bus.flush().await.unwrap();

    assert_eq!(agent_a.try_recv().unwrap().payload["n"], 1);
    assert!(agent_b.try_recv().is_err());
    assert_eq!(by_type.try_recv().unwrap().payload["n"], 1);

    bus.broadcast(AgentMessage::new("tester", MessageType::Feedback, json!({"n": 2})).to("agent-a"))
        .unwrap();
    bus.flush().await.unwrap();

    assert!(agent_a.try_recv().is_err());
    assert!(agent_b.try_recv().is_err());
    assert_eq!(by_type.try_recv().unwrap().payload["n"], 2);
    assert_eq!(bus.stats().published, 2);
}

#[tokio::test]
async fn test_checkpoints_survive_coordinator_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = codeflow_agents::CoordinatorConfig::default();
    config.storage.backend = codeflow_agents::config::StorageBackend::Sled;
    config.storage.path = Some(dir.path().join("state.db"));
    config.agents.confidence_threshold = 0.6;

    {
        let mut coord = AgentCoordinator::from_config(&config).unwrap();
        coord
            .spawn_agent("quality", "acme/web", Arc::new(QualityAnalyzer::new().unwrap()), None)
            .await
            .unwrap();
        coord.handle_trigger(auth_ts()).await.unwrap();
        coord.shutdown().await;
    }

    let mut coord = AgentCoordinator::from_config(&config).unwrap();
    let agent = coord
        .spawn_agent("quality", "acme/web", Arc::new(QualityAnalyzer::new().unwrap()), None)
        .await
        .unwrap();
    let guard = agent.lock().await;
    assert_eq!(guard.state_data().performance.successful_cycles, 1);
    // one finding from the cycle plus its surviving suggestion
    assert_eq!(guard.state_data().learning.experience_points, 2);
}
