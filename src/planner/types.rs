use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::intent::types::{RiskLevel, TrustLevel};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub order: u32,
    pub action: String,
    pub capability: Option<String>,
    #[serde(default)]
    pub inputs: Value,
    pub expected_outcome: String,
    pub risk: RiskLevel,
    pub requires_approval: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Starts at 1, +1 per revision, never skips.
    pub version: u32,
    pub goal: String,
    pub steps: Vec<PlanStep>,
    pub estimated_risk: RiskLevel,
    pub required_capabilities: BTreeSet<String>,
    pub required_trust_level: TrustLevel,
    pub created_at: DateTime<Utc>,
}

impl Plan {
    pub fn new(version: u32, goal: String, steps: Vec<PlanStep>, required_trust_level: TrustLevel) -> Self {
        let estimated_risk = steps.iter().map(|s| s.risk).max().unwrap_or_default();
        let required_capabilities = steps.iter().filter_map(|s| s.capability.clone()).collect();
        Self {
            version,
            goal,
            steps,
            estimated_risk,
            required_capabilities,
            required_trust_level,
            created_at: Utc::now(),
        }
    }

    pub fn requires_approval(&self) -> bool {
        self.steps.iter().any(|s| s.requires_approval)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewVerdict {
    Approve,
    Reject,
    Revise,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanReview {
    pub plan_version: u32,
    pub verdict: ReviewVerdict,
    #[serde(default)]
    pub concerns: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    pub alignment_score: f32,
    pub reviewed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    pub args: Value,
}

impl ToolCall {
    pub fn new(tool: impl Into<String>, args: Value) -> Self {
        Self {
            tool: tool.into(),
            args,
        }
    }

    /// Stable identity of the call. serde_json maps are key-ordered, so
    /// equal argument objects serialize identically.
    pub fn fingerprint(&self) -> String {
        format!("{}:{}", self.tool, serde_json::to_string(&self.args).unwrap_or_default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStyle {
    #[default]
    Default,
    Strict,
    Conversational,
}

/// One reasoning cycle of the ReAct trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScratchpadEntry {
    pub step: u32,
    pub thought: String,
    pub action: Option<ToolCall>,
    pub observation: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// What the planner wants to do next. Closed so every consumer handles
/// all three shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum PlannerDecision {
    Thought {
        thought: String,
    },
    Action {
        thought: String,
        call: ToolCall,
    },
    FinalAnswer {
        thought: String,
        answer: String,
        style: ResponseStyle,
    },
}

impl PlannerDecision {
    pub fn thought(&self) -> &str {
        match self {
            PlannerDecision::Thought { thought }
            | PlannerDecision::Action { thought, .. }
            | PlannerDecision::FinalAnswer { thought, .. } => thought,
        }
    }
}
