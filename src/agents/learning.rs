//! Learning state and feedback adaptation
//!
//! The only knob feedback turns is `confidence_adjustment`, added to the
//! configured threshold. False positives push it up (more conservative),
//! acceptances pull it down by half a step. The sum is kept in
//! `[MIN_EFFECTIVE_THRESHOLD, MAX_EFFECTIVE_THRESHOLD]`.

use super::types::{AgentSuggestion, FeedbackOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MIN_EFFECTIVE_THRESHOLD: f64 = 0.6;
pub const MAX_EFFECTIVE_THRESHOLD: f64 = 0.95;

/// Experience needed per skill level
const EXPERIENCE_PER_LEVEL: u64 = 100;
/// Suggestions above this confidence count as effective strategies
const EFFECTIVE_STRATEGY_CONFIDENCE: f64 = 0.8;
const MAX_STRATEGIES: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningState {
    pub experience_points: u64,
    pub skill_level: u32,
    pub confidence_adjustment: f64,
    pub effective_strategies: Vec<String>,
    pub last_adaptation: Option<DateTime<Utc>>,
}

impl Default for LearningState {
    fn default() -> Self {
        Self {
            experience_points: 0,
            skill_level: 1,
            confidence_adjustment: 0.0,
            effective_strategies: Vec::new(),
            last_adaptation: None,
        }
    }
}

impl LearningState {
    pub fn effective_threshold(&self, base_threshold: f64) -> f64 {
        (base_threshold + self.confidence_adjustment).clamp(MIN_EFFECTIVE_THRESHOLD, MAX_EFFECTIVE_THRESHOLD)
    }

    /// Accrue experience for one finished cycle
    pub fn record_cycle(&mut self, finding_count: usize, suggestions: &[AgentSuggestion]) {
        self.experience_points += finding_count as u64;
        self.skill_level = (self.experience_points / EXPERIENCE_PER_LEVEL) as u32 + 1;

        for suggestion in suggestions
            .iter()
            .filter(|s| s.confidence > EFFECTIVE_STRATEGY_CONFIDENCE)
        {
            let strategy = strategy_key(suggestion);
            if !self.effective_strategies.contains(&strategy) {
                self.effective_strategies.push(strategy);
            }
        }
        if self.effective_strategies.len() > MAX_STRATEGIES {
            let excess = self.effective_strategies.len() - MAX_STRATEGIES;
            self.effective_strategies.drain(0..excess);
        }
    }

    /// Fold a consensus outcome in: survivors earn experience and become
    /// effective strategies, dropped suggestions lose that standing
    pub fn record_consensus(&mut self, survived: &[AgentSuggestion], dropped: &[AgentSuggestion]) {
        self.experience_points += survived.len() as u64;
        self.skill_level = (self.experience_points / EXPERIENCE_PER_LEVEL) as u32 + 1;

        for suggestion in dropped {
            let strategy = strategy_key(suggestion);
            self.effective_strategies.retain(|s| *s != strategy);
        }
        for suggestion in survived {
            let strategy = strategy_key(suggestion);
            if !self.effective_strategies.contains(&strategy) {
                self.effective_strategies.push(strategy);
            }
        }
        if self.effective_strategies.len() > MAX_STRATEGIES {
            let excess = self.effective_strategies.len() - MAX_STRATEGIES;
            self.effective_strategies.drain(0..excess);
        }
    }

    /// Apply one feedback outcome; returns the change in adjustment
    pub fn apply_feedback(&mut self, outcome: FeedbackOutcome, base_threshold: f64, learning_rate: f64) -> f64 {
        let before = self.confidence_adjustment;
        let raw = match outcome {
            FeedbackOutcome::FalsePositive => before + learning_rate,
            FeedbackOutcome::Accepted => before - learning_rate / 2.0,
            FeedbackOutcome::Rejected => before,
        };

        // Clamp through the effective threshold so the sum stays in bounds
        let effective = (base_threshold + raw).clamp(MIN_EFFECTIVE_THRESHOLD, MAX_EFFECTIVE_THRESHOLD);
        self.confidence_adjustment = effective - base_threshold;

        let delta = self.confidence_adjustment - before;
        if delta != 0.0 {
            self.last_adaptation = Some(Utc::now());
        }
        delta
    }
}

fn strategy_key(suggestion: &AgentSuggestion) -> String {
    format!("{}:{}", suggestion.severity, suggestion.title)
}
