//! Plan generation: turns an intention into a versioned, step-by-step plan.
//!
//! The plan is what the gate judges (risk, trust, required capabilities) and
//! what the executor receives as its goal. Generation uses the same
//! extract/validate/retry-once discipline as the ReAct planner; revision
//! feedback from the plan reviewer and lessons from a previous outcome
//! review are folded into the prompt.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::react::{PlannerConfig, PlannerError};
use super::schema::{optional_bool, optional_string, parse_object, request_structured, required_string, StructuredRequest};
use super::types::{Plan, PlanStep, ReviewVerdict};
use crate::intent::types::{Intention, RiskLevel};
use crate::services::capability::CapabilityCatalog;
use crate::services::llm::{ChatMessage, GenerateOptions, LanguageModel};

pub const PLAN_SCHEMA: &str = r#"{
  "goal": "string, the concrete goal handed to the executor",
  "steps": [
    {
      "action": "string, required",
      "capability": "catalog name or null",
      "inputs": { },
      "expected_outcome": "string",
      "risk": "none | low | medium | high | critical",
      "requires_approval": "boolean"
    }
  ]
}"#;

const SYSTEM_PROMPT: &str = "You draft short, concrete plans for an autonomous assistant. \
Use only capabilities from the catalog. Rate each step's risk honestly. \
Reply with one JSON object and nothing else.";

pub fn parse_risk(value: Option<String>) -> Result<RiskLevel, String> {
    match value.as_deref() {
        None | Some("") => Ok(RiskLevel::None),
        Some(label) => serde_json::from_value(Value::String(label.to_lowercase()))
            .map_err(|_| format!("unknown risk level `{}`", label)),
    }
}

fn parse_step(index: usize, raw: &Value, catalog: &dyn CapabilityCatalog) -> Result<PlanStep, String> {
    let map: &Map<String, Value> = raw
        .as_object()
        .ok_or_else(|| format!("step {} must be an object", index + 1))?;
    let context = |e: String| format!("step {}: {}", index + 1, e);

    let action = required_string(map, "action").map_err(context)?;
    let capability = optional_string(map, "capability").map_err(context)?.filter(|c| !c.is_empty());
    if let Some(name) = &capability {
        if !catalog.contains(name) {
            return Err(context(format!("capability `{}` is not in the catalog", name)));
        }
    }
    let inputs = match map.get("inputs") {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(v @ Value::Object(_)) => v.clone(),
        Some(_) => return Err(context("field `inputs` must be an object".to_string())),
    };

    Ok(PlanStep {
        order: index as u32 + 1,
        action,
        capability,
        inputs,
        expected_outcome: optional_string(map, "expected_outcome").map_err(context)?.unwrap_or_default(),
        risk: parse_risk(optional_string(map, "risk").map_err(context)?).map_err(context)?,
        requires_approval: optional_bool(map, "requires_approval").map_err(context)?.unwrap_or(false),
    })
}

/// Validates a raw plan reply against the catalog.
pub fn parse_plan(raw: &str, intention: &Intention, catalog: &dyn CapabilityCatalog) -> Result<Plan, String> {
    let map = parse_object(raw)?;
    let goal = optional_string(&map, "goal")?
        .filter(|g| !g.is_empty())
        .unwrap_or_else(|| intention.title.clone());
    let steps = match map.get("steps") {
        Some(Value::Array(items)) if !items.is_empty() => items
            .iter()
            .enumerate()
            .map(|(i, step)| parse_step(i, step, catalog))
            .collect::<Result<Vec<_>, _>>()?,
        Some(Value::Array(_)) => return Err("field `steps` must not be empty".to_string()),
        Some(_) => return Err("field `steps` must be an array".to_string()),
        None => return Err("missing required field `steps`".to_string()),
    };
    Ok(Plan::new(
        intention.next_plan_version(),
        goal,
        steps,
        intention.required_trust_level,
    ))
}

pub struct PlanGenerator {
    llm: Arc<dyn LanguageModel>,
    config: PlannerConfig,
}

impl PlanGenerator {
    pub fn new(llm: Arc<dyn LanguageModel>, config: PlannerConfig) -> Self {
        Self { llm, config }
    }

    fn prompt(intention: &Intention, catalog: &dyn CapabilityCatalog) -> String {
        let mut prompt = format!(
            "Intention: {}\nDescription: {}\nReason: {}\nRisk so far: {:?}\n\nCapabilities:\n{}",
            intention.title,
            intention.description,
            intention.reason,
            intention.risk,
            catalog.describe()
        );

        if let (Some(plan), Some(review)) = (&intention.plan, &intention.review) {
            if review.verdict == ReviewVerdict::Revise && review.plan_version == plan.version {
                prompt.push_str(&format!("\nThe previous plan (v{}) needs revision.\n", plan.version));
                for concern in &review.concerns {
                    prompt.push_str(&format!("Concern: {}\n", concern));
                }
                for suggestion in &review.suggestions {
                    prompt.push_str(&format!("Suggestion: {}\n", suggestion));
                }
            }
        }

        if let Some(outcome) = &intention.outcome_review {
            if !outcome.lessons.is_empty() || !outcome.next_attempt_suggestions.is_empty() {
                prompt.push_str("\nA previous attempt taught:\n");
                for lesson in outcome.lessons.iter().chain(outcome.next_attempt_suggestions.iter()) {
                    prompt.push_str(&format!("- {}\n", lesson));
                }
            }
        }

        prompt.push_str("\nDraft the plan as one JSON object.");
        prompt
    }

    pub async fn generate(
        &self,
        intention: &Intention,
        catalog: &dyn CapabilityCatalog,
        cancel: &CancellationToken,
    ) -> Result<Plan, PlannerError> {
        let request = StructuredRequest {
            system_prompt: SYSTEM_PROMPT.to_string(),
            messages: vec![ChatMessage::user(Self::prompt(intention, catalog))],
            options: GenerateOptions {
                temperature: self.config.temperature,
                max_tokens: self.config.max_tokens,
                json_mode: true,
            },
            retry_temperature: self.config.retry_temperature,
            schema_hint: PLAN_SCHEMA,
        };
        let plan = request_structured(
            self.llm.as_ref(),
            request,
            |raw| parse_plan(raw, intention, catalog),
            cancel,
        )
        .await?;
        info!(
            intention = %intention.id,
            version = plan.version,
            steps = plan.steps.len(),
            risk = ?plan.estimated_risk,
            "plan drafted"
        );
        Ok(plan)
    }
}
