//! Execution of an approved plan through the ReAct loop.

pub mod errors;
pub mod failure;
pub mod runner;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::planner::observation::ObservationMode;
use crate::planner::retrieval::{default_rules, RetrievalRule};
use crate::planner::types::ScratchpadEntry;

pub use errors::{classify, ClassifiedError, ErrorKind};
pub use failure::FailureTracker;
pub use runner::Executor;

/// Coarse reasoning depth; each maps to a step budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Depth {
    Off,
    Quick,
    #[default]
    Focused,
    Deep,
}

impl Depth {
    pub fn max_steps(self) -> u32 {
        match self {
            Depth::Off => 1,
            Depth::Quick => 5,
            Depth::Focused => 10,
            Depth::Deep => 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub depth: Depth,
    /// Overrides the depth-derived step budget.
    pub max_steps: Option<u32>,
    pub wall_clock_budget_secs: Option<u64>,
    /// Steps to run before an all-error trace stops the loop.
    pub early_stop_min_steps: u32,
    pub observation_mode: ObservationMode,
    pub retrieval_rules: Vec<RetrievalRule>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            depth: Depth::Focused,
            max_steps: None,
            wall_clock_budget_secs: Some(300),
            early_stop_min_steps: 3,
            observation_mode: ObservationMode::Verbatim,
            retrieval_rules: default_rules(),
        }
    }
}

impl ExecutorConfig {
    pub fn step_budget(&self) -> u32 {
        self.max_steps.unwrap_or_else(|| self.depth.max_steps()).max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    /// Stopped on a budget with a partial result; still reviewed.
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Responded,
    Retrieval,
    StepBudget,
    WallClock,
    EarlyStop,
    PlanningFailed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step: u32,
    pub tool: Option<String>,
    pub success: bool,
    pub output: Option<String>,
    pub error: Option<ClassifiedError>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub attempt: u32,
    pub plan_version: Option<u32>,
    pub goal: String,
    pub status: ExecutionStatus,
    pub current_step: u32,
    #[serde(default)]
    pub step_results: Vec<StepResult>,
    #[serde(default)]
    pub trace: Vec<ScratchpadEntry>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub termination: Option<Termination>,
    /// Fingerprints of calls that failed twice with identical arguments.
    #[serde(default)]
    pub looping_actions: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub steps_executed: u32,
    pub elapsed_ms: u64,
    pub successes: u32,
    pub failures: u32,
}

impl Execution {
    pub fn start(attempt: u32, plan_version: Option<u32>, goal: impl Into<String>) -> Self {
        Self {
            attempt,
            plan_version,
            goal: goal.into(),
            status: ExecutionStatus::Running,
            current_step: 0,
            step_results: Vec::new(),
            trace: Vec::new(),
            result: None,
            error: None,
            termination: None,
            looping_actions: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
            steps_executed: 0,
            elapsed_ms: 0,
            successes: 0,
            failures: 0,
        }
    }

    /// Stopped on a budget rather than by an answer or a hard failure.
    pub fn is_partial(&self) -> bool {
        self.status == ExecutionStatus::InProgress
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    /// Rendered errors of every failed step, oldest first.
    pub fn errors(&self) -> Vec<String> {
        self.step_results
            .iter()
            .filter_map(|r| r.error.as_ref().map(ClassifiedError::render))
            .collect()
    }
}
