//! Display label for an intention's behaviour over time. Nothing declares
//! an intention recurring up front; the label falls out of its counters.

use serde::{Deserialize, Serialize};

use super::types::IntentionMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Character {
    OneTime,
    Recurring,
    Aspirational,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterThresholds {
    /// Completions needed before an intention reads as recurring.
    pub recurring_completions: u32,
    /// Cycles without a completion before it reads as aspirational.
    pub aspirational_cycles: u32,
}

impl Default for CharacterThresholds {
    fn default() -> Self {
        Self {
            recurring_completions: 2,
            aspirational_cycles: 3,
        }
    }
}

pub fn character(metrics: &IntentionMetrics, thresholds: &CharacterThresholds) -> Character {
    if metrics.completion_count >= thresholds.recurring_completions {
        Character::Recurring
    } else if metrics.completion_count == 0 && metrics.cycle_count >= thresholds.aspirational_cycles {
        Character::Aspirational
    } else {
        Character::OneTime
    }
}
