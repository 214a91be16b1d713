//! Safety envelope for autonomous agents
//!
//! Every agent owns one `SafetyControls` value: its rate limiter, its
//! circuit breaker, and the log of safety violations. Nothing here is
//! shared between agents.

pub mod circuit_breaker;
pub mod rate_limiter;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use rate_limiter::{RateLimiter, RateWindow};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unmitigated violations at which an agent is shut down for good
pub const EMERGENCY_VIOLATION_THRESHOLD: usize = 5;

/// Violations kept in the log; mitigated ones are evicted first
const MAX_VIOLATION_LOG: usize = 200;

/// What kind of control blocked the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Recommendation budget for the window is spent
    RateLimit,
    /// Breaker was open when a recommendation tried to go out
    CircuitBreaker,
    /// The specialization's own check vetoed a recommendation
    SpecializationCheck,
    /// Uncaught fault during a cycle
    UnspecifiedError,
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationKind::RateLimit => write!(f, "rate_limit"),
            ViolationKind::CircuitBreaker => write!(f, "circuit_breaker"),
            ViolationKind::SpecializationCheck => write!(f, "specialization_check"),
            ViolationKind::UnspecifiedError => write!(f, "unspecified_error"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyViolation {
    pub id: String,
    pub kind: ViolationKind,
    pub description: String,
    /// Suggestion that was blocked, if any
    pub suggestion_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub mitigated: bool,
}

/// Recorded when violations force an agent offline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyOverride {
    pub id: String,
    pub reason: String,
    pub violation_count: usize,
    pub triggered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyControls {
    pub rate_limiter: RateLimiter,
    pub circuit_breaker: CircuitBreaker,
    pub violations: Vec<SafetyViolation>,
    pub emergency_override: Option<EmergencyOverride>,
}

impl SafetyControls {
    pub fn new(
        max_recommendations: u32,
        rate_window_ms: u64,
        breaker_threshold: u32,
        breaker_timeout_ms: u64,
    ) -> Self {
        Self {
            rate_limiter: RateLimiter::new(max_recommendations, rate_window_ms),
            circuit_breaker: CircuitBreaker::new(breaker_threshold, breaker_timeout_ms),
            violations: Vec::new(),
            emergency_override: None,
        }
    }

    /// Append a violation; returns the number now unmitigated
    pub fn record_violation(
        &mut self,
        kind: ViolationKind,
        description: impl Into<String>,
        suggestion_id: Option<String>,
    ) -> usize {
        let description = description.into();
        tracing::warn!(kind = %kind, "Safety violation: {}", description);

        self.violations.push(SafetyViolation {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            description,
            suggestion_id,
            occurred_at: Utc::now(),
            mitigated: false,
        });

        if self.violations.len() > MAX_VIOLATION_LOG {
            if let Some(pos) = self.violations.iter().position(|v| v.mitigated) {
                self.violations.remove(pos);
            }
        }

        self.unmitigated_count()
    }

    pub fn unmitigated_count(&self) -> usize {
        self.violations.iter().filter(|v| !v.mitigated).count()
    }

    pub fn should_emergency_shutdown(&self) -> bool {
        self.unmitigated_count() >= EMERGENCY_VIOLATION_THRESHOLD
    }

    /// Mark every open violation as handled
    pub fn mitigate_all(&mut self) -> usize {
        let mut n = 0;
        for v in self.violations.iter_mut().filter(|v| !v.mitigated) {
            v.mitigated = true;
            n += 1;
        }
        n
    }
}
