use std::collections::HashMap;

use crate::planner::types::ToolCall;

use super::errors::{ClassifiedError, ErrorKind};

/// Number of identical failures after which the planner is warned.
pub const LOOP_THRESHOLD: u32 = 2;

#[derive(Debug, Default)]
struct FailureRecord {
    tool: String,
    args: String,
    count: u32,
    last_kind: Option<ErrorKind>,
}

#[derive(Debug)]
struct TerminalRecord {
    tool: String,
    args: String,
    error: ClassifiedError,
}

/// Tracks failed calls keyed by `(tool, serialized args)`.
///
/// Calls that failed with a kind that is terminal for the action are kept
/// apart: they are warned about at once and never invoked again. Every
/// other kind counts towards the loop threshold.
#[derive(Debug, Default)]
pub struct FailureTracker {
    failures: HashMap<String, FailureRecord>,
    order: Vec<String>,
    terminal: HashMap<String, TerminalRecord>,
    terminal_order: Vec<String>,
}

impl FailureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failure; returns `true` exactly when this call just crossed
    /// the loop threshold.
    pub fn record_failure(&mut self, call: &ToolCall, kind: ErrorKind) -> bool {
        let key = call.fingerprint();
        if !self.failures.contains_key(&key) {
            self.order.push(key.clone());
        }
        let record = self.failures.entry(key).or_insert_with(|| FailureRecord {
            tool: call.tool.clone(),
            args: serde_json::to_string(&call.args).unwrap_or_default(),
            count: 0,
            last_kind: None,
        });
        record.count += 1;
        record.last_kind = Some(kind);
        record.count == LOOP_THRESHOLD
    }

    /// Remembers a call whose failure makes the identical call pointless.
    pub fn mark_terminal(&mut self, call: &ToolCall, error: ClassifiedError) {
        let key = call.fingerprint();
        if self.terminal.contains_key(&key) {
            return;
        }
        self.terminal_order.push(key.clone());
        self.terminal.insert(
            key,
            TerminalRecord {
                tool: call.tool.clone(),
                args: serde_json::to_string(&call.args).unwrap_or_default(),
                error,
            },
        );
    }

    /// The error that ruled this exact call out, if any.
    pub fn terminal_error(&self, call: &ToolCall) -> Option<&ClassifiedError> {
        self.terminal.get(&call.fingerprint()).map(|r| &r.error)
    }

    pub fn failure_count(&self, call: &ToolCall) -> u32 {
        self.failures.get(&call.fingerprint()).map(|r| r.count).unwrap_or(0)
    }

    pub fn is_looping(&self, call: &ToolCall) -> bool {
        self.failure_count(call) >= LOOP_THRESHOLD
    }

    /// Warnings injected into the next planning call: one per ruled-out
    /// call, then one per looping action.
    pub fn warnings(&self) -> Vec<String> {
        let terminal = self
            .terminal_order
            .iter()
            .filter_map(|key| self.terminal.get(key))
            .map(|r| {
                format!(
                    "WARNING: `{}` with args {} failed with {}, which is terminal for this action. Do not call it again with the same arguments; choose a different action.",
                    r.tool,
                    r.args,
                    r.error.kind.code()
                )
            });
        let looping = self
            .order
            .iter()
            .filter_map(|key| self.failures.get(key))
            .filter(|r| r.count >= LOOP_THRESHOLD)
            .map(|r| {
                let kind = r.last_kind.map(|k| k.code()).unwrap_or("UNKNOWN_ERROR");
                format!(
                    "WARNING: `{}` with args {} has already failed {} times ({}). Do not repeat it; choose a different action or different arguments.",
                    r.tool, r.args, r.count, kind
                )
            });
        terminal.chain(looping).collect()
    }
}
