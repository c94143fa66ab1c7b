//! Outcome review: judges a finished execution attempt and decides where the
//! intention goes next.
//!
//! The verdict-to-status mapping is fixed ([`OutcomeVerdict::target_status`]).
//! Timed-out and budget-limited executions are reviewed like any other.
//! The model is consulted when one is configured; otherwise, or when its
//! answer is unusable twice, a heuristic over the execution tally decides.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::executor::{Execution, ExecutionStatus};
use crate::intent::types::{Intention, IntentionStatus};
use crate::planner::react::{PlannerConfig, PlannerError};
use crate::planner::schema::{parse_object, request_structured, required_string, string_list, unit_score, StructuredRequest};
use crate::services::llm::{ChatMessage, GenerateOptions, LanguageModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeVerdict {
    Completed,
    Continue,
    Retry,
    Escalate,
    Abandon,
}

impl OutcomeVerdict {
    pub fn target_status(self) -> IntentionStatus {
        match self {
            OutcomeVerdict::Completed => IntentionStatus::Completed,
            OutcomeVerdict::Continue => IntentionStatus::Pending,
            OutcomeVerdict::Retry => IntentionStatus::Planning,
            OutcomeVerdict::Escalate => IntentionStatus::AwaitingApproval,
            OutcomeVerdict::Abandon => IntentionStatus::Abandoned,
        }
    }

    /// Verdicts that send the intention around the loop again.
    pub fn loops_back(self) -> bool {
        matches!(self, OutcomeVerdict::Continue | OutcomeVerdict::Retry)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeReview {
    /// Execution attempt this review judges.
    pub attempt: u32,
    pub verdict: OutcomeVerdict,
    pub success_score: f32,
    #[serde(default)]
    pub lessons: Vec<String>,
    #[serde(default)]
    pub next_attempt_suggestions: Vec<String>,
    pub strength_override: Option<f32>,
    #[serde(default)]
    pub heuristic: bool,
    pub reviewed_at: DateTime<Utc>,
}

pub const OUTCOME_SCHEMA: &str = r#"{
  "verdict": "completed | continue | retry | escalate | abandon",
  "success_score": "number in [0, 1]",
  "lessons": ["string"],
  "next_attempt_suggestions": ["string"],
  "strength_override": "number in [0, 1] or null"
}"#;

const SYSTEM_PROMPT: &str = "You judge the outcome of an autonomous attempt. \
completed: the intention is fulfilled. continue: useful progress, pick it up again later. \
retry: replan and try again now. escalate: a human must look at it. abandon: stop pursuing it. \
Reply with one JSON object.";

pub fn parse_outcome(raw: &str, attempt: u32) -> Result<OutcomeReview, String> {
    let map = parse_object(raw)?;
    let verdict = match required_string(&map, "verdict")?.to_lowercase().as_str() {
        "completed" | "complete" => OutcomeVerdict::Completed,
        "continue" => OutcomeVerdict::Continue,
        "retry" => OutcomeVerdict::Retry,
        "escalate" => OutcomeVerdict::Escalate,
        "abandon" => OutcomeVerdict::Abandon,
        other => return Err(format!("unknown verdict `{}`", other)),
    };
    let strength_override = match map.get("strength_override") {
        None | Some(Value::Null) => None,
        Some(_) => Some(unit_score(&map, "strength_override")?),
    };
    Ok(OutcomeReview {
        attempt,
        verdict,
        success_score: unit_score(&map, "success_score")?,
        lessons: string_list(&map, "lessons")?,
        next_attempt_suggestions: string_list(&map, "next_attempt_suggestions")?,
        strength_override,
        heuristic: false,
        reviewed_at: Utc::now(),
    })
}

/// Verdict from the execution tally alone.
pub fn heuristic_review(execution: &Execution) -> OutcomeReview {
    let attempted = execution.successes + execution.failures;
    let ratio = if attempted == 0 {
        0.0
    } else {
        execution.successes as f32 / attempted as f32
    };

    let mut lessons = Vec::new();
    let mut suggestions = BTreeSet::new();
    for result in execution.step_results.iter().filter(|r| !r.success) {
        if let Some(error) = &result.error {
            lessons.push(format!("step {}: {} ({})", result.step, error.message, error.kind.code()));
            suggestions.extend(error.suggestions.iter().cloned());
        }
    }

    let (verdict, score) = match execution.status {
        ExecutionStatus::Completed => (OutcomeVerdict::Completed, if execution.failures == 0 { 1.0 } else { 0.8 }),
        ExecutionStatus::InProgress => {
            lessons.push(format!(
                "stopped after {} steps without a final answer",
                execution.steps_executed
            ));
            (OutcomeVerdict::Continue, ratio)
        }
        ExecutionStatus::Failed | ExecutionStatus::Cancelled => (OutcomeVerdict::Retry, 0.0),
        ExecutionStatus::Running => (OutcomeVerdict::Escalate, 0.0),
    };

    OutcomeReview {
        attempt: execution.attempt,
        verdict,
        success_score: score,
        lessons,
        next_attempt_suggestions: suggestions.into_iter().collect(),
        strength_override: None,
        heuristic: true,
        reviewed_at: Utc::now(),
    }
}

fn render_execution(execution: &Execution) -> String {
    let mut out = format!(
        "Status: {:?}\nSteps: {} ({} succeeded, {} failed) in {} ms\n",
        execution.status, execution.steps_executed, execution.successes, execution.failures, execution.elapsed_ms
    );
    if let Some(result) = &execution.result {
        out.push_str(&format!("Result: {}\n", result));
    }
    if let Some(error) = &execution.error {
        out.push_str(&format!("Error: {}\n", error));
    }
    for entry in &execution.trace {
        out.push_str(&format!("Step {}: {}\n", entry.step, entry.thought));
        if let Some(observation) = &entry.observation {
            out.push_str(&format!("  -> {}\n", observation));
        }
    }
    out
}

pub struct OutcomeReviewer {
    llm: Option<Arc<dyn LanguageModel>>,
    config: PlannerConfig,
}

impl OutcomeReviewer {
    pub fn new(llm: Option<Arc<dyn LanguageModel>>, config: PlannerConfig) -> Self {
        Self { llm, config }
    }

    /// Only cancellation is an error.
    pub async fn review(
        &self,
        intention: &Intention,
        execution: &Execution,
        cancel: &CancellationToken,
    ) -> Result<OutcomeReview, PlannerError> {
        let Some(llm) = &self.llm else {
            return Ok(heuristic_review(execution));
        };

        let request = StructuredRequest {
            system_prompt: SYSTEM_PROMPT.to_string(),
            messages: vec![ChatMessage::user(format!(
                "Intention: {}\nReason: {}\nGoal: {}\nAttempt: {}\n\n{}\nJudge this attempt as one JSON object.",
                intention.title,
                intention.reason,
                execution.goal,
                execution.attempt,
                render_execution(execution)
            ))],
            options: GenerateOptions {
                temperature: self.config.retry_temperature,
                max_tokens: self.config.max_tokens,
                json_mode: true,
            },
            retry_temperature: self.config.retry_temperature,
            schema_hint: OUTCOME_SCHEMA,
        };

        match request_structured(llm.as_ref(), request, |raw| parse_outcome(raw, execution.attempt), cancel).await {
            Ok(review) => {
                debug!(intention = %intention.id, verdict = ?review.verdict, score = review.success_score, "outcome reviewed");
                Ok(review)
            }
            Err(e) => match PlannerError::from(e) {
                PlannerError::Cancelled => Err(PlannerError::Cancelled),
                other => {
                    warn!(intention = %intention.id, error = %other, "outcome review failed, using heuristic");
                    Ok(heuristic_review(execution))
                }
            },
        }
    }
}
