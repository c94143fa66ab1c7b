use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::schema::{
    optional_bool, optional_string, parse_object, request_structured, required_string, StructuredError,
    StructuredRequest,
};
use super::types::{PlannerDecision, ResponseStyle, ScratchpadEntry, ToolCall};
use crate::services::llm::{ChatMessage, GenerateOptions, LanguageModel, LlmError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Trace entries shown to the model per call.
    pub trace_window: usize,
    pub temperature: f32,
    pub retry_temperature: f32,
    pub max_tokens: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            trace_window: 10,
            temperature: 0.4,
            retry_temperature: 0.1,
            max_tokens: 768,
        }
    }
}

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("planning cancelled")]
    Cancelled,
    #[error("language model error during planning: {0}")]
    Model(LlmError),
    #[error("planner output invalid after retry: {reason}")]
    InvalidOutput { reason: String, raw: String },
}

impl From<StructuredError> for PlannerError {
    fn from(e: StructuredError) -> Self {
        match e {
            StructuredError::Model(LlmError::Cancelled) => PlannerError::Cancelled,
            StructuredError::Model(e) => PlannerError::Model(e),
            StructuredError::Invalid { reason, raw } => PlannerError::InvalidOutput { reason, raw },
        }
    }
}

pub const DECISION_SCHEMA: &str = r#"{
  "thought": "string, required, non-empty",
  "action": { "tool": "capability name", "args": { } },
  "respond": "boolean, true when the goal is achieved",
  "response": "string, final answer when respond is true",
  "responseStyle": "default | strict | conversational"
}"#;

const SYSTEM_PROMPT: &str = "You are the reasoning core of an autonomous assistant. \
Work toward the goal one step at a time. Each reply is a single JSON object. \
Think, then either call exactly one capability from the catalog, or set respond to true with the final answer. \
Never invent capabilities and never repeat an action that has already failed with the same arguments.";

pub fn parse_style(value: Option<String>) -> ResponseStyle {
    match value.as_deref() {
        Some("strict") => ResponseStyle::Strict,
        Some("conversational") => ResponseStyle::Conversational,
        _ => ResponseStyle::Default,
    }
}

/// Validates one raw planner reply into a decision.
pub fn parse_decision(raw: &str) -> Result<PlannerDecision, String> {
    let map = parse_object(raw)?;
    let thought = required_string(&map, "thought")?;

    if optional_bool(&map, "respond")?.unwrap_or(false) {
        let answer = optional_string(&map, "response")?
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| thought.clone());
        let style = parse_style(optional_string(&map, "responseStyle")?);
        return Ok(PlannerDecision::FinalAnswer { thought, answer, style });
    }

    match map.get("action") {
        None | Some(Value::Null) => Ok(PlannerDecision::Thought { thought }),
        Some(Value::Object(action)) => {
            let tool = required_string(action, "tool").map_err(|e| format!("action: {}", e))?;
            let args = match action.get("args") {
                Some(args @ Value::Object(_)) => args.clone(),
                Some(Value::Null) | None => return Err("action: missing required field `args`".to_string()),
                Some(_) => return Err("action: field `args` must be an object".to_string()),
            };
            Ok(PlannerDecision::Action {
                thought,
                call: ToolCall { tool, args },
            })
        }
        Some(_) => Err("field `action` must be an object".to_string()),
    }
}

/// Renders the last `window` entries; older ones are summarized as a count.
pub fn render_trace(trace: &[ScratchpadEntry], window: usize) -> String {
    if trace.is_empty() {
        return "(no steps taken yet)".to_string();
    }
    let skip = trace.len().saturating_sub(window);
    let mut out = String::new();
    if skip > 0 {
        out.push_str(&format!("({} earlier steps omitted)\n", skip));
    }
    for entry in &trace[skip..] {
        out.push_str(&format!("Step {}\nThought: {}\n", entry.step, entry.thought));
        if let Some(call) = &entry.action {
            out.push_str(&format!(
                "Action: {} {}\n",
                call.tool,
                serde_json::to_string(&call.args).unwrap_or_default()
            ));
        }
        if let Some(observation) = &entry.observation {
            out.push_str(&format!("Observation: {}\n", observation));
        }
    }
    out
}

pub struct ReactPlanner {
    llm: Arc<dyn LanguageModel>,
    config: PlannerConfig,
}

impl ReactPlanner {
    pub fn new(llm: Arc<dyn LanguageModel>, config: PlannerConfig) -> Self {
        Self { llm, config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    fn user_prompt(&self, goal: &str, trace: &[ScratchpadEntry], catalog: &str, warnings: &[String]) -> String {
        let mut prompt = format!(
            "Goal: {}\n\nCapabilities:\n{}\nTrace so far:\n{}\n",
            goal,
            catalog,
            render_trace(trace, self.config.trace_window)
        );
        if !warnings.is_empty() {
            prompt.push_str("\nWarnings:\n");
            for warning in warnings {
                prompt.push_str(warning);
                prompt.push('\n');
            }
        }
        prompt.push_str("\nRespond with one JSON object.");
        prompt
    }

    pub async fn next_step(
        &self,
        goal: &str,
        trace: &[ScratchpadEntry],
        catalog: &str,
        warnings: &[String],
        cancel: &CancellationToken,
    ) -> Result<PlannerDecision, PlannerError> {
        let request = StructuredRequest {
            system_prompt: SYSTEM_PROMPT.to_string(),
            messages: vec![ChatMessage::user(self.user_prompt(goal, trace, catalog, warnings))],
            options: GenerateOptions {
                temperature: self.config.temperature,
                max_tokens: self.config.max_tokens,
                json_mode: true,
            },
            retry_temperature: self.config.retry_temperature,
            schema_hint: DECISION_SCHEMA,
        };
        let decision = request_structured(self.llm.as_ref(), request, parse_decision, cancel).await?;
        debug!(step = trace.len() + 1, thought = decision.thought(), "planner decided");
        Ok(decision)
    }
}
