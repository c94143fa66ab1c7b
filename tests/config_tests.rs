use std::path::Path;

use volition::config::{AgencyConfig, ConfigError};
use volition::executor::Depth;
use volition::intent::types::{IntentionSource, TrustLevel};
use volition::policy::RiskPolicyMode;

#[test]
fn test_defaults_are_valid() {
    let config = AgencyConfig::default();
    config.validate().expect("defaults validate");
    assert_eq!(config.strength.activation_threshold, 0.7);
    assert_eq!(config.limits.max_active, 3);
    assert_eq!(config.trust_level, TrustLevel::Supervised);
    assert!(config.source_enabled(IntentionSource::Dream));
    assert_eq!(config.source_weight(IntentionSource::PersonaGoal), 1.0);
}

#[test]
fn test_partial_file_keeps_defaults() {
    let config = AgencyConfig::from_json(
        r#"{
            "trust_level": "bounded_auto",
            "limits": {"max_active": 5},
            "sources": {"dream": {"enabled": false}, "curiosity": {"weight": 0.9}},
            "policy": {"mode": "never"},
            "executor": {"depth": "quick"}
        }"#,
        Path::new("inline.json"),
    )
    .expect("partial config parses");

    assert_eq!(config.trust_level, TrustLevel::BoundedAuto);
    assert_eq!(config.limits.max_active, 5);
    assert_eq!(config.limits.max_pending, 50, "unset fields keep their defaults");
    assert_eq!(config.strength.decay_rate, 0.02);
    assert!(!config.source_enabled(IntentionSource::Dream));
    assert_eq!(config.source_weight(IntentionSource::Curiosity), 0.9);
    assert_eq!(config.source_weight(IntentionSource::Task), 0.8);
    assert_eq!(config.policy.mode, RiskPolicyMode::Never);
    assert_eq!(config.executor.depth, Depth::Quick);
    assert_eq!(config.executor.step_budget(), 5);
}

#[test]
fn test_validation_rejects_out_of_range() {
    let path = Path::new("bad.json");
    let cases = [
        r#"{"strength": {"activation_threshold": 1.5}}"#,
        r#"{"strength": {"initial_strength": 0.01, "min_strength": 0.1}}"#,
        r#"{"auto_approve_threshold": -0.1}"#,
        r#"{"sources": {"task": {"weight": 2.0}}}"#,
        r#"{"schedule": {"decay_every": 0}}"#,
        r#"{"limits": {"max_active": 0}}"#,
    ];
    for case in cases {
        assert!(
            matches!(AgencyConfig::from_json(case, path), Err(ConfigError::Invalid(_))),
            "{} should be rejected",
            case
        );
    }
    assert!(matches!(
        AgencyConfig::from_json("{ not json", path),
        Err(ConfigError::Parse { .. })
    ));
}

#[test]
fn test_load_missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = AgencyConfig::load(&dir.path().join("absent.json")).expect("missing file is fine");
    assert_eq!(config.schedule.pulse_ms, 1_000);

    let path = dir.path().join("volition.json");
    std::fs::write(&path, r#"{"data_dir": "/var/lib/volition"}"#).unwrap();
    let config = AgencyConfig::load(&path).unwrap();
    assert_eq!(config.data_dir, Path::new("/var/lib/volition"));
}
