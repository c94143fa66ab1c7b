//! Runtime configuration. Every section has defaults, so an absent or
//! partial file is valid.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::executor::ExecutorConfig;
use crate::intent::character::CharacterThresholds;
use crate::intent::types::{IntentionSource, TrustLevel};
use crate::planner::react::PlannerConfig;
use crate::policy::RiskPolicy;
use crate::services::llm::LlmConfig;
use crate::store::RetentionPolicy;

pub const CONFIG_ENV: &str = "VOLITION_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrengthConfig {
    pub activation_threshold: f32,
    /// Subtracted once per decay tick.
    pub decay_rate: f32,
    pub reinforcement_boost: f32,
    pub min_strength: f32,
    pub initial_strength: f32,
    /// Jaccard similarity at which a signal counts as a duplicate.
    pub duplicate_similarity: f32,
}

impl Default for StrengthConfig {
    fn default() -> Self {
        Self {
            activation_threshold: 0.7,
            decay_rate: 0.02,
            reinforcement_boost: 0.3,
            min_strength: 0.05,
            initial_strength: 0.5,
            duplicate_similarity: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub enabled: bool,
    pub weight: Option<f32>,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            weight: None,
        }
    }
}

/// Intervals are counted in scheduler pulses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub pulse_ms: u64,
    pub generation_every: u64,
    pub decay_every: u64,
    pub evaluation_every: u64,
    pub progression_every: u64,
    pub cleanup_every: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            pulse_ms: 1_000,
            generation_every: 5,
            decay_every: 60,
            evaluation_every: 5,
            progression_every: 1,
            cleanup_every: 3_600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Intentions allowed between evaluating and awaiting_review at once.
    pub max_active: usize,
    pub max_pending: usize,
    pub max_plan_attempts: u32,
    pub max_plan_revisions: u32,
    pub max_execution_attempts: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_active: 3,
            max_pending: 50,
            max_plan_attempts: 3,
            max_plan_revisions: 2,
            max_execution_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgencyConfig {
    pub data_dir: PathBuf,
    pub inbox_dir: Option<PathBuf>,
    pub strength: StrengthConfig,
    pub sources: BTreeMap<IntentionSource, SourceSettings>,
    pub schedule: ScheduleConfig,
    pub limits: LimitsConfig,
    pub retention: RetentionPolicy,
    pub policy: RiskPolicy,
    pub trust_level: TrustLevel,
    /// Minimum plan-review alignment for the gate's auto-approve path.
    pub auto_approve_threshold: f32,
    pub planner: PlannerConfig,
    pub executor: ExecutorConfig,
    pub llm: LlmConfig,
    pub character: CharacterThresholds,
}

impl Default for AgencyConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("volition-data"),
            inbox_dir: None,
            strength: StrengthConfig::default(),
            sources: BTreeMap::new(),
            schedule: ScheduleConfig::default(),
            limits: LimitsConfig::default(),
            retention: RetentionPolicy::default(),
            policy: RiskPolicy::default(),
            trust_level: TrustLevel::Supervised,
            auto_approve_threshold: 0.7,
            planner: PlannerConfig::default(),
            executor: ExecutorConfig::default(),
            llm: LlmConfig::default(),
            character: CharacterThresholds::default(),
        }
    }
}

fn unit(name: &str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("{} must be within [0, 1], got {}", name, value)))
    }
}

impl AgencyConfig {
    pub fn from_json(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Missing file means defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let config = Self::from_json(&text, path)?;
                info!(path = %path.display(), "configuration loaded");
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no configuration file, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// `VOLITION_CONFIG`, else the first argument, else defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .or_else(|| std::env::args_os().nth(1).map(PathBuf::from));
        match path {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.strength;
        unit("strength.activation_threshold", s.activation_threshold)?;
        unit("strength.decay_rate", s.decay_rate)?;
        unit("strength.reinforcement_boost", s.reinforcement_boost)?;
        unit("strength.min_strength", s.min_strength)?;
        unit("strength.initial_strength", s.initial_strength)?;
        unit("strength.duplicate_similarity", s.duplicate_similarity)?;
        unit("auto_approve_threshold", self.auto_approve_threshold)?;
        if s.initial_strength < s.min_strength {
            return Err(ConfigError::Invalid(
                "strength.initial_strength must not be below strength.min_strength".to_string(),
            ));
        }
        for (source, settings) in &self.sources {
            if let Some(weight) = settings.weight {
                unit(&format!("sources.{}.weight", source.label()), weight)?;
            }
        }
        let schedule = &self.schedule;
        if schedule.pulse_ms == 0
            || [
                schedule.generation_every,
                schedule.decay_every,
                schedule.evaluation_every,
                schedule.progression_every,
                schedule.cleanup_every,
            ]
            .contains(&0)
        {
            return Err(ConfigError::Invalid("schedule intervals must be positive".to_string()));
        }
        if self.limits.max_active == 0 {
            return Err(ConfigError::Invalid("limits.max_active must be positive".to_string()));
        }
        Ok(())
    }

    pub fn source_enabled(&self, source: IntentionSource) -> bool {
        self.sources.get(&source).map(|s| s.enabled).unwrap_or(true)
    }

    pub fn source_weight(&self, source: IntentionSource) -> f32 {
        self.sources
            .get(&source)
            .and_then(|s| s.weight)
            .unwrap_or_else(|| source.default_weight())
    }
}
