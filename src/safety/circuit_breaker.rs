//! Circuit breaker with time-based recovery
//!
//! Counts failures; at the threshold the breaker opens and remembers when.
//! While open every gated call is refused. Once `recovery_timeout_ms` has
//! elapsed the next gated call moves the breaker to half-open and is let
//! through as a probe. The probe's outcome decides: success closes,
//! failure re-opens with a fresh timestamp.

use crate::utils::current_timestamp_millis;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    recovery_timeout_ms: u64,
    failures: u32,
    state: CircuitState,
    /// Unix millis when the breaker last opened
    opened_at: Option<u64>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_timeout_ms: u64) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            recovery_timeout_ms,
            failures: 0,
            state: CircuitState::Closed,
            opened_at: None,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn opened_at(&self) -> Option<u64> {
        self.opened_at
    }

    pub fn is_closed(&self) -> bool {
        self.state == CircuitState::Closed
    }

    /// Gate a call now
    pub fn allow_request(&mut self) -> bool {
        self.allow_request_at(current_timestamp_millis())
    }

    /// Gate a call at a given instant (unix millis)
    pub fn allow_request_at(&mut self, now: u64) -> bool {
        match self.state {
            CircuitState::Closed => true,
            // One probe is already in flight
            CircuitState::HalfOpen => false,
            CircuitState::Open => {
                let opened = self.opened_at.unwrap_or(now);
                if now.saturating_sub(opened) >= self.recovery_timeout_ms {
                    self.state = CircuitState::HalfOpen;
                    tracing::info!("Circuit breaker half-open, allowing probe");
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Whether work admitted by `allow_request` may proceed (closed, or the
    /// half-open probe itself)
    pub fn is_passable(&self) -> bool {
        self.state != CircuitState::Open
    }

    pub fn record_success(&mut self) {
        if self.state != CircuitState::Closed {
            tracing::info!("Circuit breaker closed after successful probe");
        }
        self.failures = 0;
        self.state = CircuitState::Closed;
        self.opened_at = None;
    }

    pub fn record_failure(&mut self) {
        self.record_failure_at(current_timestamp_millis());
    }

    pub fn record_failure_at(&mut self, now: u64) {
        self.failures = self.failures.saturating_add(1);

        match self.state {
            CircuitState::HalfOpen => self.trip(now),
            CircuitState::Closed if self.failures >= self.failure_threshold => self.trip(now),
            _ => {}
        }
    }

    /// Force back to closed (agent shutdown)
    pub fn close(&mut self) {
        self.failures = 0;
        self.state = CircuitState::Closed;
        self.opened_at = None;
    }

    fn trip(&mut self, now: u64) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        tracing::warn!(
            failures = self.failures,
            "Circuit breaker opened for {}ms",
            self.recovery_timeout_ms
        );
    }
}
