//! Turning a capability's raw result into trace text. The mode is chosen by
//! configuration; the planner never picks it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::executor::errors::ClassifiedError;
use crate::services::capability::CapabilityOutcome;

const NARRATIVE_LIMIT: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationMode {
    /// Raw structured dump.
    #[default]
    Verbatim,
    /// Bullet rendering of objects and lists.
    Structured,
    /// One-line summary.
    Narrative,
}

pub fn format_observation(mode: ObservationMode, tool: &str, outcome: &CapabilityOutcome) -> String {
    if !outcome.success {
        let message = outcome.error.clone().unwrap_or_else(|| format!("{} failed", tool));
        return ClassifiedError::from_message(message).render();
    }
    let outputs = outcome.outputs.as_ref().unwrap_or(&Value::Null);
    match mode {
        ObservationMode::Verbatim => verbatim(outputs),
        ObservationMode::Structured => structured(outputs),
        ObservationMode::Narrative => narrative(tool, outputs),
    }
}

fn verbatim(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_default(),
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "(none)".to_string(),
        other => other.to_string(),
    }
}

fn structured(value: &Value) -> String {
    match value {
        Value::Object(map) if map.is_empty() => "(empty result)".to_string(),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("- {}: {}", k, scalar(v)))
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Array(items) if items.is_empty() => "(no items)".to_string(),
        Value::Array(items) => items
            .iter()
            .map(|item| format!("- {}", scalar(item)))
            .collect::<Vec<_>>()
            .join("\n"),
        other => scalar(other),
    }
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let cut: String = text.chars().take(limit).collect();
    format!("{}...", cut)
}

fn narrative(tool: &str, value: &Value) -> String {
    match value {
        Value::Null => format!("{} completed with no output", tool),
        Value::Array(items) => format!("{} returned {} items", tool, items.len()),
        Value::Object(map) => {
            let keys: Vec<&str> = map.keys().map(String::as_str).collect();
            format!("{} returned {}", tool, keys.join(", "))
        }
        other => format!("{} returned: {}", tool, truncate(&scalar(other).replace('\n', " "), NARRATIVE_LIMIT)),
    }
}
