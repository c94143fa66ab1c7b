use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::react::{PlannerConfig, PlannerError};
use super::schema::{parse_object, request_structured, required_string, string_list, unit_score, StructuredRequest};
use super::types::{Plan, PlanReview, ReviewVerdict};
use crate::intent::types::Intention;
use crate::services::llm::{ChatMessage, GenerateOptions, LanguageModel};

/// Alignment assigned when the model cannot produce a usable review.
pub const FALLBACK_ALIGNMENT: f32 = 0.5;

pub const REVIEW_SCHEMA: &str = r#"{
  "verdict": "approve | reject | revise",
  "concerns": ["string"],
  "suggestions": ["string"],
  "alignment_score": "number in [0, 1]"
}"#;

const SYSTEM_PROMPT: &str = "You review plans drafted by an autonomous assistant before anything runs. \
Judge whether the plan serves the stated intention, is proportionate in risk, and uses only listed capabilities. \
Reply with one JSON object.";

pub fn parse_review(raw: &str, plan_version: u32) -> Result<PlanReview, String> {
    let map = parse_object(raw)?;
    let verdict = match required_string(&map, "verdict")?.to_lowercase().as_str() {
        "approve" => ReviewVerdict::Approve,
        "reject" => ReviewVerdict::Reject,
        "revise" => ReviewVerdict::Revise,
        other => return Err(format!("unknown verdict `{}`", other)),
    };
    Ok(PlanReview {
        plan_version,
        verdict,
        concerns: string_list(&map, "concerns")?,
        suggestions: string_list(&map, "suggestions")?,
        alignment_score: unit_score(&map, "alignment_score")?,
        reviewed_at: Utc::now(),
    })
}

pub fn fallback_review(plan_version: u32, reason: &str) -> PlanReview {
    PlanReview {
        plan_version,
        verdict: ReviewVerdict::Approve,
        concerns: vec![format!("automatic review unavailable: {}", reason)],
        suggestions: Vec::new(),
        alignment_score: FALLBACK_ALIGNMENT,
        reviewed_at: Utc::now(),
    }
}

pub struct PlanReviewer {
    llm: Arc<dyn LanguageModel>,
    config: PlannerConfig,
}

impl PlanReviewer {
    pub fn new(llm: Arc<dyn LanguageModel>, config: PlannerConfig) -> Self {
        Self { llm, config }
    }

    /// Only cancellation is an error; any other failure degrades to
    /// [`fallback_review`].
    pub async fn review(
        &self,
        intention: &Intention,
        plan: &Plan,
        cancel: &CancellationToken,
    ) -> Result<PlanReview, PlannerError> {
        let plan_json = serde_json::to_string_pretty(&plan.steps).unwrap_or_default();
        let request = StructuredRequest {
            system_prompt: SYSTEM_PROMPT.to_string(),
            messages: vec![ChatMessage::user(format!(
                "Intention: {}\nReason: {}\nPlan v{} goal: {}\nEstimated risk: {:?}\nSteps:\n{}\n\nReview it as one JSON object.",
                intention.title, intention.reason, plan.version, plan.goal, plan.estimated_risk, plan_json
            ))],
            options: GenerateOptions {
                temperature: self.config.retry_temperature,
                max_tokens: self.config.max_tokens,
                json_mode: true,
            },
            retry_temperature: self.config.retry_temperature,
            schema_hint: REVIEW_SCHEMA,
        };

        match request_structured(self.llm.as_ref(), request, |raw| parse_review(raw, plan.version), cancel).await {
            Ok(review) => {
                debug!(
                    intention = %intention.id,
                    version = plan.version,
                    verdict = ?review.verdict,
                    alignment = review.alignment_score,
                    "plan reviewed"
                );
                Ok(review)
            }
            Err(e) => match PlannerError::from(e) {
                PlannerError::Cancelled => Err(PlannerError::Cancelled),
                other => {
                    warn!(intention = %intention.id, error = %other, "plan review failed, using fallback");
                    Ok(fallback_review(plan.version, &other.to_string()))
                }
            },
        }
    }
}
