//! Observability Module - coordinator counters and Prometheus export
//!
//! One `CoordinatorMetrics` instance lives inside each coordinator. Counters
//! are plain atomics so agents running concurrently can bump them without
//! locking.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub triggers_handled: u64,
    pub activations: u64,
    pub activation_failures: u64,
    pub suggestions_produced: u64,
    pub suggestions_after_consensus: u64,
    pub emergency_shutdowns: u64,
    pub uptime_secs: u64,
}

#[derive(Debug)]
pub struct CoordinatorMetrics {
    triggers_handled: AtomicU64,
    activations: AtomicU64,
    activation_failures: AtomicU64,
    suggestions_produced: AtomicU64,
    suggestions_after_consensus: AtomicU64,
    emergency_shutdowns: AtomicU64,
    started: Instant,
}

impl Default for CoordinatorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CoordinatorMetrics {
    pub fn new() -> Self {
        Self {
            triggers_handled: AtomicU64::new(0),
            activations: AtomicU64::new(0),
            activation_failures: AtomicU64::new(0),
            suggestions_produced: AtomicU64::new(0),
            suggestions_after_consensus: AtomicU64::new(0),
            emergency_shutdowns: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    pub fn increment_triggers(&self) {
        self.triggers_handled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_activations(&self) {
        self.activations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_activation_failures(&self) {
        self.activation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_emergency_shutdowns(&self) {
        self.emergency_shutdowns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_suggestions_produced(&self, count: usize) {
        self.suggestions_produced.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn add_suggestions_after_consensus(&self, count: usize) {
        self.suggestions_after_consensus
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            triggers_handled: self.triggers_handled.load(Ordering::Relaxed),
            activations: self.activations.load(Ordering::Relaxed),
            activation_failures: self.activation_failures.load(Ordering::Relaxed),
            suggestions_produced: self.suggestions_produced.load(Ordering::Relaxed),
            suggestions_after_consensus: self.suggestions_after_consensus.load(Ordering::Relaxed),
            emergency_shutdowns: self.emergency_shutdowns.load(Ordering::Relaxed),
            uptime_secs: self.uptime_secs(),
        }
    }

    pub fn render_prometheus(&self) -> String {
        let m = self.snapshot();

        format!(
            r#"# HELP codeflow_triggers_handled_total Change events handled by the coordinator
# TYPE codeflow_triggers_handled_total counter
codeflow_triggers_handled_total {}

# HELP codeflow_activations_total Agent activations that completed a cycle
# TYPE codeflow_activations_total counter
codeflow_activations_total {}

# HELP codeflow_activation_failures_total Agent activations that failed or were refused
# TYPE codeflow_activation_failures_total counter
codeflow_activation_failures_total {}

# HELP codeflow_suggestions_produced_total Suggestions produced before consensus
# TYPE codeflow_suggestions_produced_total counter
codeflow_suggestions_produced_total {}

# HELP codeflow_suggestions_after_consensus_total Suggestions remaining after consensus
# TYPE codeflow_suggestions_after_consensus_total counter
codeflow_suggestions_after_consensus_total {}

# HELP codeflow_emergency_shutdowns_total Agents forced offline by the safety envelope
# TYPE codeflow_emergency_shutdowns_total counter
codeflow_emergency_shutdowns_total {}

# HELP codeflow_uptime_seconds Coordinator uptime in seconds
# TYPE codeflow_uptime_seconds gauge
codeflow_uptime_seconds {}
"#,
            m.triggers_handled,
            m.activations,
            m.activation_failures,
            m.suggestions_produced,
            m.suggestions_after_consensus,
            m.emergency_shutdowns,
            m.uptime_secs
        )
    }
}
