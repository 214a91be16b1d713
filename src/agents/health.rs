//! Agent health score

use super::types::{AgentConfiguration, PerformanceMetrics};
use crate::safety::EMERGENCY_VIOLATION_THRESHOLD;
use serde::{Deserialize, Serialize};

/// Reliability lost per execution fault
pub const RELIABILITY_PENALTY: f64 = 0.1;
/// Reliability regained per clean cycle
const RELIABILITY_RECOVERY: f64 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Critical,
}

impl HealthStatus {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            HealthStatus::Healthy
        } else if score >= 0.5 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Critical
        }
    }
}

/// Four bounded components, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthScore {
    pub performance: f64,
    pub reliability: f64,
    pub learning: f64,
    pub safety: f64,
}

impl Default for HealthScore {
    fn default() -> Self {
        Self {
            performance: 1.0,
            reliability: 1.0,
            learning: 1.0,
            safety: 1.0,
        }
    }
}

impl HealthScore {
    pub fn overall(&self) -> f64 {
        (self.performance + self.reliability + self.learning + self.safety) / 4.0
    }

    pub fn status(&self) -> HealthStatus {
        HealthStatus::from_score(self.overall())
    }

    pub fn degrade_reliability(&mut self) {
        self.reliability = (self.reliability - RELIABILITY_PENALTY).clamp(0.0, 1.0);
    }

    pub fn recover_reliability(&mut self) {
        self.reliability = (self.reliability + RELIABILITY_RECOVERY).clamp(0.0, 1.0);
    }

    /// Recompute the derived components from current metrics
    pub fn refresh(&mut self, metrics: &PerformanceMetrics, config: &AgentConfiguration, open_violations: usize) {
        let budget = config.max_analysis_time_ms.max(1) as f64;
        self.performance = (1.0 - metrics.average_analysis_ms / budget).clamp(0.0, 1.0);

        self.learning = if metrics.feedback_count() == 0 {
            1.0
        } else {
            metrics.acceptance_rate.clamp(0.0, 1.0)
        };

        self.safety =
            (1.0 - open_violations as f64 / EMERGENCY_VIOLATION_THRESHOLD as f64).clamp(0.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_bands() {
        assert_eq!(HealthStatus::from_score(0.8), HealthStatus::Healthy);
        assert_eq!(HealthStatus::from_score(0.79), HealthStatus::Degraded);
        assert_eq!(HealthStatus::from_score(0.5), HealthStatus::Degraded);
        assert_eq!(HealthStatus::from_score(0.49), HealthStatus::Critical);
    }

    #[test]
    fn test_overall_is_mean() {
        let score = HealthScore {
            performance: 1.0,
            reliability: 0.6,
            learning: 0.4,
            safety: 0.2,
        };
        assert!((score.overall() - 0.55).abs() < 1e-9);
        assert_eq!(score.status(), HealthStatus::Degraded);
    }

    #[test]
    fn test_reliability_penalty_bounded() {
        let mut score = HealthScore::default();
        for _ in 0..20 {
            score.degrade_reliability();
        }
        assert_eq!(score.reliability, 0.0);
        score.recover_reliability();
        assert!(score.reliability > 0.0);
    }

    #[test]
    fn test_refresh() {
        let mut score = HealthScore::default();
        let metrics = PerformanceMetrics {
            average_analysis_ms: 7_500.0,
            recommendations_accepted: 3,
            recommendations_rejected: 1,
            acceptance_rate: 0.75,
            ..Default::default()
        };
        score.refresh(&metrics, &AgentConfiguration::default(), 2);
        assert!((score.performance - 0.75).abs() < 1e-9);
        assert!((score.learning - 0.75).abs() < 1e-9);
        assert!((score.safety - 0.6).abs() < 1e-9);
    }
}
