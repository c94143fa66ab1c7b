use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::executor::Execution;
use crate::planner::types::{Plan, PlanReview};
use crate::review::OutcomeReview;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntentionId(pub Uuid);

impl IntentionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for IntentionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IntentionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a candidate intention came from. Each source carries a fixed
/// priority weight that becomes the intention's immutable `base_weight`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentionSource {
    PersonaGoal,
    UrgentTask,
    Task,
    MemoryPattern,
    Curiosity,
    Reflection,
    Dream,
    ToolSuggestion,
}

impl IntentionSource {
    pub const ALL: [IntentionSource; 8] = [
        IntentionSource::PersonaGoal,
        IntentionSource::UrgentTask,
        IntentionSource::Task,
        IntentionSource::MemoryPattern,
        IntentionSource::Curiosity,
        IntentionSource::Reflection,
        IntentionSource::Dream,
        IntentionSource::ToolSuggestion,
    ];

    pub fn default_weight(self) -> f32 {
        match self {
            IntentionSource::PersonaGoal => 1.0,
            IntentionSource::UrgentTask => 0.95,
            IntentionSource::Task => 0.8,
            IntentionSource::MemoryPattern => 0.7,
            IntentionSource::Curiosity => 0.6,
            IntentionSource::Reflection => 0.5,
            IntentionSource::Dream => 0.4,
            IntentionSource::ToolSuggestion => 0.25,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            IntentionSource::PersonaGoal => "persona_goal",
            IntentionSource::UrgentTask => "urgent_task",
            IntentionSource::Task => "task",
            IntentionSource::MemoryPattern => "memory_pattern",
            IntentionSource::Curiosity => "curiosity",
            IntentionSource::Reflection => "reflection",
            IntentionSource::Dream => "dream",
            IntentionSource::ToolSuggestion => "tool_suggestion",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 5] = [
        RiskLevel::None,
        RiskLevel::Low,
        RiskLevel::Medium,
        RiskLevel::High,
        RiskLevel::Critical,
    ];
}

/// Ceiling on how much autonomous risk may be taken without a human.
/// Ordered from least to most autonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    #[default]
    Observe,
    Suggest,
    Supervised,
    BoundedAuto,
    AdaptiveAuto,
}

impl TrustLevel {
    pub const ALL: [TrustLevel; 5] = [
        TrustLevel::Observe,
        TrustLevel::Suggest,
        TrustLevel::Supervised,
        TrustLevel::BoundedAuto,
        TrustLevel::AdaptiveAuto,
    ];
}

/// Coarse, persisted lifecycle state. The single source of truth; `Stage`
/// is always computed from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentionStatus {
    Nascent,
    Pending,
    Evaluating,
    Planning,
    Reviewing,
    AwaitingApproval,
    Approved,
    Executing,
    AwaitingReview,
    Completed,
    Rejected,
    Abandoned,
    Failed,
}

impl IntentionStatus {
    pub const ALL: [IntentionStatus; 13] = [
        IntentionStatus::Nascent,
        IntentionStatus::Pending,
        IntentionStatus::Evaluating,
        IntentionStatus::Planning,
        IntentionStatus::Reviewing,
        IntentionStatus::AwaitingApproval,
        IntentionStatus::Approved,
        IntentionStatus::Executing,
        IntentionStatus::AwaitingReview,
        IntentionStatus::Completed,
        IntentionStatus::Rejected,
        IntentionStatus::Abandoned,
        IntentionStatus::Failed,
    ];

    pub fn label(self) -> &'static str {
        match self {
            IntentionStatus::Nascent => "nascent",
            IntentionStatus::Pending => "pending",
            IntentionStatus::Evaluating => "evaluating",
            IntentionStatus::Planning => "planning",
            IntentionStatus::Reviewing => "reviewing",
            IntentionStatus::AwaitingApproval => "awaiting_approval",
            IntentionStatus::Approved => "approved",
            IntentionStatus::Executing => "executing",
            IntentionStatus::AwaitingReview => "awaiting_review",
            IntentionStatus::Completed => "completed",
            IntentionStatus::Rejected => "rejected",
            IntentionStatus::Abandoned => "abandoned",
            IntentionStatus::Failed => "failed",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.label() == label)
    }

    /// Retired states. Only history is appended from here on.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            IntentionStatus::Completed | IntentionStatus::Abandoned | IntentionStatus::Failed
        )
    }

    /// Statuses during which the system is actively working the intention.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            IntentionStatus::Evaluating
                | IntentionStatus::Planning
                | IntentionStatus::Reviewing
                | IntentionStatus::Approved
                | IntentionStatus::Executing
                | IntentionStatus::AwaitingReview
        )
    }
}

impl fmt::Display for IntentionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Fine-grained progress view. Never persisted on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentionStage {
    Forming,
    Gathering,
    Weighing,
    Drafting,
    SelfReview,
    AwaitingConsent,
    Cleared,
    Acting,
    Reflecting,
    Fulfilled,
    Declined,
    Released,
    Faltered,
}

impl IntentionStage {
    /// Total projection from status; one status maps to exactly one stage.
    pub fn of(status: IntentionStatus) -> Self {
        match status {
            IntentionStatus::Nascent => IntentionStage::Forming,
            IntentionStatus::Pending => IntentionStage::Gathering,
            IntentionStatus::Evaluating => IntentionStage::Weighing,
            IntentionStatus::Planning => IntentionStage::Drafting,
            IntentionStatus::Reviewing => IntentionStage::SelfReview,
            IntentionStatus::AwaitingApproval => IntentionStage::AwaitingConsent,
            IntentionStatus::Approved => IntentionStage::Cleared,
            IntentionStatus::Executing => IntentionStage::Acting,
            IntentionStatus::AwaitingReview => IntentionStage::Reflecting,
            IntentionStatus::Completed => IntentionStage::Fulfilled,
            IntentionStatus::Rejected => IntentionStage::Declined,
            IntentionStatus::Abandoned => IntentionStage::Released,
            IntentionStatus::Failed => IntentionStage::Faltered,
        }
    }

    /// Rough progress percentage for display.
    pub fn progress(self) -> u8 {
        match self {
            IntentionStage::Forming => 0,
            IntentionStage::Gathering => 10,
            IntentionStage::Weighing => 20,
            IntentionStage::Drafting => 35,
            IntentionStage::SelfReview => 45,
            IntentionStage::AwaitingConsent => 55,
            IntentionStage::Cleared => 60,
            IntentionStage::Acting => 75,
            IntentionStage::Reflecting => 90,
            IntentionStage::Fulfilled
            | IntentionStage::Declined
            | IntentionStage::Released
            | IntentionStage::Faltered => 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentionMetrics {
    pub cycle_count: u32,
    pub current_cycle: u32,
    pub completion_count: u32,
    pub active_ms: u64,
    pub idle_ms: u64,
    #[serde(default)]
    pub time_in_status: BTreeMap<IntentionStatus, u64>,
    pub last_transition_at: DateTime<Utc>,
    pub peak_strength: f32,
    pub trough_strength: f32,
    pub plan_attempts: u32,
    /// Consecutive failed plan drafts; reset when a plan is produced.
    #[serde(default)]
    pub plan_failures: u32,
    pub plan_revisions: u32,
    pub execution_attempts: u32,
    pub successful_executions: u32,
    pub failed_executions: u32,
    pub user_approvals: u32,
    pub user_rejections: u32,
    pub user_interactions: u32,
}

impl IntentionMetrics {
    pub fn new(strength: f32, now: DateTime<Utc>) -> Self {
        Self {
            cycle_count: 0,
            current_cycle: 0,
            completion_count: 0,
            active_ms: 0,
            idle_ms: 0,
            time_in_status: BTreeMap::new(),
            last_transition_at: now,
            peak_strength: strength,
            trough_strength: strength,
            plan_attempts: 0,
            plan_failures: 0,
            plan_revisions: 0,
            execution_attempts: 0,
            successful_executions: 0,
            failed_executions: 0,
            user_approvals: 0,
            user_rejections: 0,
            user_interactions: 0,
        }
    }

    pub fn observe_strength(&mut self, strength: f32) {
        self.peak_strength = self.peak_strength.max(strength);
        self.trough_strength = self.trough_strength.min(strength);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectionRecord {
    pub at: DateTime<Utc>,
    pub reason: String,
    pub can_retry: bool,
    /// Status the intention was in when it was rejected.
    pub from: IntentionStatus,
    pub by_human: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScratchpadSummary {
    pub count: u32,
    pub last_entry: Option<String>,
}

/// An autonomous candidate action the system may pursue on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intention {
    pub id: IntentionId,
    pub title: String,
    pub description: String,
    pub reason: String,
    pub source: IntentionSource,

    pub strength: f32,
    /// Copied from the source weight at creation. Never changes.
    pub base_weight: f32,
    pub threshold: f32,
    pub decay_rate: f32,
    pub reinforcements: u32,
    pub run_count: u32,
    pub last_reinforced_tick: Option<u64>,

    pub risk: RiskLevel,
    pub required_trust_level: TrustLevel,
    pub status: IntentionStatus,
    pub metrics: IntentionMetrics,

    pub plan: Option<Plan>,
    #[serde(default)]
    pub plan_history: Vec<Plan>,
    pub review: Option<PlanReview>,
    pub execution: Option<Execution>,
    pub outcome_review: Option<OutcomeReview>,
    #[serde(default)]
    pub rejection_history: Vec<RejectionRecord>,
    #[serde(default)]
    pub scratchpad: ScratchpadSummary,

    /// Set when an outcome review escalates to a human.
    #[serde(default)]
    pub needs_attention: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Intention {
    /// A nascent intention with the source's default weight and the stock
    /// strength parameters. Callers override fields from configuration.
    pub fn new(source: IntentionSource, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: IntentionId::new(),
            title: title.into(),
            description: String::new(),
            reason: String::new(),
            source,
            strength: 0.5,
            base_weight: source.default_weight(),
            threshold: 0.7,
            decay_rate: 0.02,
            reinforcements: 0,
            run_count: 0,
            last_reinforced_tick: None,
            risk: RiskLevel::None,
            required_trust_level: TrustLevel::Observe,
            status: IntentionStatus::Nascent,
            metrics: IntentionMetrics::new(0.5, now),
            plan: None,
            plan_history: Vec::new(),
            review: None,
            execution: None,
            outcome_review: None,
            rejection_history: Vec::new(),
            scratchpad: ScratchpadSummary::default(),
            needs_attention: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn stage(&self) -> IntentionStage {
        IntentionStage::of(self.status)
    }

    pub fn effective_strength(&self) -> f32 {
        crate::intent::strength::effective_strength(self.strength, self.base_weight)
    }

    pub fn latest_rejection(&self) -> Option<&RejectionRecord> {
        self.rejection_history.last()
    }

    pub fn next_plan_version(&self) -> u32 {
        self.plan
            .iter()
            .chain(self.plan_history.iter())
            .map(|p| p.version)
            .max()
            .unwrap_or(0)
            + 1
    }
}
