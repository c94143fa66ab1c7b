//! Strength dynamics. Pure and total; callers persist the results.

use std::cmp::Ordering;

use super::types::Intention;

pub fn effective_strength(strength: f32, base_weight: f32) -> f32 {
    (strength * base_weight).min(1.0)
}

pub fn is_above_threshold(intention: &Intention) -> bool {
    intention.effective_strength() >= intention.threshold
}

/// One tick of decay. Never drops below `min_strength`, never raises.
pub fn apply_decay(strength: f32, rate: f32, min_strength: f32) -> f32 {
    (strength - rate.max(0.0)).max(min_strength)
}

pub fn apply_reinforcement(strength: f32, boost: f32) -> f32 {
    (strength + boost.max(0.0)).min(1.0)
}

/// Activation order within a tick: effective strength desc, then source
/// weight desc, then oldest first.
pub fn activation_order(a: &Intention, b: &Intention) -> Ordering {
    b.effective_strength()
        .partial_cmp(&a.effective_strength())
        .unwrap_or(Ordering::Equal)
        .then_with(|| {
            b.source
                .default_weight()
                .partial_cmp(&a.source.default_weight())
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.created_at.cmp(&b.created_at))
}
