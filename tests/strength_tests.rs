use std::cmp::Ordering;

use chrono::{Duration, Utc};
use proptest::prelude::*;
use volition::intent::character::{character, Character, CharacterThresholds};
use volition::intent::strength::{
    activation_order, apply_decay, apply_reinforcement, effective_strength, is_above_threshold,
};
use volition::intent::types::{Intention, IntentionMetrics, IntentionSource, IntentionStage, IntentionStatus};

const MIN_STRENGTH: f32 = 0.05;

proptest! {
    #[test]
    fn decay_stays_within_bounds(strength in MIN_STRENGTH..=1.0f32, rate in 0.0..=1.0f32) {
        let decayed = apply_decay(strength, rate, MIN_STRENGTH);
        prop_assert!(decayed >= MIN_STRENGTH);
        prop_assert!(decayed <= strength);
    }

    #[test]
    fn reinforcement_never_exceeds_one(strength in MIN_STRENGTH..=1.0f32, boost in 0.0..=2.0f32) {
        let reinforced = apply_reinforcement(strength, boost);
        prop_assert!(reinforced <= 1.0);
        prop_assert!(reinforced >= strength);
    }

    #[test]
    fn effective_strength_is_monotonic(
        s1 in 0.0..=1.0f32,
        s2 in 0.0..=1.0f32,
        w1 in 0.0..=1.0f32,
        w2 in 0.0..=1.0f32,
    ) {
        let (lo_s, hi_s) = if s1 <= s2 { (s1, s2) } else { (s2, s1) };
        let (lo_w, hi_w) = if w1 <= w2 { (w1, w2) } else { (w2, w1) };
        prop_assert!(effective_strength(lo_s, lo_w) <= effective_strength(hi_s, lo_w));
        prop_assert!(effective_strength(lo_s, lo_w) <= effective_strength(lo_s, hi_w));
        prop_assert!(effective_strength(hi_s, hi_w) <= 1.0);
    }

    #[test]
    fn repeated_decay_settles_at_floor(strength in MIN_STRENGTH..=1.0f32, ticks in 0usize..200) {
        let mut s = strength;
        for _ in 0..ticks {
            s = apply_decay(s, 0.02, MIN_STRENGTH);
        }
        prop_assert!(s >= MIN_STRENGTH);
    }
}

#[test]
fn test_threshold_example() {
    let mut intention = Intention::new(IntentionSource::PersonaGoal, "write the weekly summary");
    intention.strength = 0.5;
    intention.threshold = 0.7;
    assert!(!is_above_threshold(&intention), "0.5 x 1.0 is below 0.7");

    intention.strength = apply_reinforcement(intention.strength, 0.2);
    assert!((intention.strength - 0.7).abs() < 1e-6);
    assert!(is_above_threshold(&intention), "0.7 x 1.0 reaches the threshold");

    let mut weak = Intention::new(IntentionSource::ToolSuggestion, "try the new formatter");
    weak.strength = 1.0;
    assert!((weak.effective_strength() - 0.25).abs() < 1e-6);
    assert!(!is_above_threshold(&weak), "a low-weight source needs more than full strength");
}

#[test]
fn test_activation_order_ties() {
    let now = Utc::now();

    let mut strong = Intention::new(IntentionSource::Task, "strong");
    strong.strength = 1.0;
    let mut weak = Intention::new(IntentionSource::Task, "weak");
    weak.strength = 0.9;
    assert_eq!(activation_order(&strong, &weak), Ordering::Less, "higher effective strength first");

    // 0.8 x 1.0 == 1.0 x 0.8: equal effective strength, source weight decides.
    let mut persona = Intention::new(IntentionSource::PersonaGoal, "persona");
    persona.strength = 0.8;
    let mut task = Intention::new(IntentionSource::Task, "task");
    task.strength = 1.0;
    assert_eq!(activation_order(&persona, &task), Ordering::Less, "higher source weight first");

    let mut older = Intention::new(IntentionSource::Curiosity, "older");
    older.created_at = now - Duration::seconds(60);
    let mut newer = Intention::new(IntentionSource::Curiosity, "newer");
    newer.created_at = now;
    let mut queue = vec![newer.clone(), older.clone()];
    queue.sort_by(activation_order);
    assert_eq!(queue[0].title, "older", "oldest first on a full tie");
}

#[test]
fn test_stage_projection_is_total() {
    let mut seen = std::collections::HashSet::new();
    for status in IntentionStatus::ALL {
        let stage = IntentionStage::of(status);
        assert!(seen.insert(stage), "each status has its own stage");
        if status.is_terminal() {
            assert_eq!(stage.progress(), 100);
        }
    }
}

#[test]
fn test_character_labels() {
    let thresholds = CharacterThresholds::default();
    let mut metrics = IntentionMetrics::new(0.5, Utc::now());
    assert_eq!(character(&metrics, &thresholds), Character::OneTime);

    metrics.cycle_count = 3;
    assert_eq!(character(&metrics, &thresholds), Character::Aspirational);

    metrics.completion_count = 2;
    assert_eq!(character(&metrics, &thresholds), Character::Recurring);
}
