//! Goals that are plain data lookups skip the reasoning loop and resolve
//! after a single capability call.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::types::ToolCall;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalRule {
    /// Case-insensitive prefix the goal must start with.
    pub phrase: String,
    pub capability: String,
    #[serde(default)]
    pub args: Value,
    /// When set, the single word after the phrase is passed as this argument.
    #[serde(default)]
    pub capture: Option<String>,
}

impl RetrievalRule {
    pub fn new(phrase: &str, capability: &str) -> Self {
        Self {
            phrase: phrase.to_string(),
            capability: capability.to_string(),
            args: json!({}),
            capture: None,
        }
    }

    pub fn capturing(mut self, arg: &str) -> Self {
        self.capture = Some(arg.to_string());
        self
    }

    pub fn match_goal(&self, goal: &str) -> Option<ToolCall> {
        let goal = goal.trim();
        let head = goal.get(..self.phrase.len())?;
        if !head.eq_ignore_ascii_case(&self.phrase) {
            return None;
        }
        let rest = goal[self.phrase.len()..].trim().trim_end_matches(['.', '!', '?']);

        let mut args = match &self.args {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        match &self.capture {
            None if rest.is_empty() => {}
            None => return None,
            Some(arg) => {
                let value = rest.trim_matches(|c| c == '"' || c == '\'' || c == '`');
                if value.is_empty() || value.contains(char::is_whitespace) {
                    return None;
                }
                args.insert(arg.clone(), Value::String(value.to_string()));
            }
        }
        Some(ToolCall::new(self.capability.clone(), Value::Object(args)))
    }
}

pub fn default_rules() -> Vec<RetrievalRule> {
    vec![
        RetrievalRule::new("list tasks", "task_list"),
        RetrievalRule::new("read file", "read_file").capturing("path"),
    ]
}

/// First rule that matches the goal.
pub fn match_retrieval(rules: &[RetrievalRule], goal: &str) -> Option<ToolCall> {
    rules.iter().find_map(|rule| rule.match_goal(goal))
}
