//! Error taxonomy shared by the planner and executor.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    FileNotFound,
    TaskNotFound,
    PermissionDenied,
    InvalidArgs,
    NetworkError,
    SkillNotFound,
    UnknownError,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::FileNotFound => "FILE_NOT_FOUND",
            ErrorKind::TaskNotFound => "TASK_NOT_FOUND",
            ErrorKind::PermissionDenied => "PERMISSION_DENIED",
            ErrorKind::InvalidArgs => "INVALID_ARGS",
            ErrorKind::NetworkError => "NETWORK_ERROR",
            ErrorKind::SkillNotFound => "SKILL_NOT_FOUND",
            ErrorKind::UnknownError => "UNKNOWN_ERROR",
        }
    }

    /// Transient failures; the identical call may succeed later.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::NetworkError | ErrorKind::UnknownError)
    }

    /// Repeating the identical call is pointless.
    pub fn is_terminal_for_action(self) -> bool {
        matches!(
            self,
            ErrorKind::SkillNotFound | ErrorKind::PermissionDenied | ErrorKind::InvalidArgs
        )
    }

    pub fn suggestions(self) -> &'static [&'static str] {
        match self {
            ErrorKind::FileNotFound => &[
                "Check the path for typos or list the parent directory first",
                "Search for the file by name before reading it",
                "Create the file if the goal requires it",
            ],
            ErrorKind::TaskNotFound => &[
                "List current tasks to find the correct id",
                "The task may have been completed or deleted",
            ],
            ErrorKind::PermissionDenied => &[
                "Choose a location the agent is allowed to access",
                "Ask the user to grant access instead of retrying",
            ],
            ErrorKind::InvalidArgs => &[
                "Compare the arguments against the capability catalog",
                "Supply every required parameter with the right type",
            ],
            ErrorKind::NetworkError => &[
                "Retry once; the remote side may be temporarily unavailable",
                "Fall back to locally available information",
            ],
            ErrorKind::SkillNotFound => &[
                "Pick a capability that appears in the catalog",
                "Achieve the step with a combination of available capabilities",
            ],
            ErrorKind::UnknownError => &[
                "Retry with simpler arguments",
                "Try an alternative capability",
                "Report what was attempted and stop if it keeps failing",
            ],
        }
    }
}

/// Maps a raw error message to its kind. Order matters: the more specific
/// "not found" variants are checked first.
pub fn classify(message: &str) -> ErrorKind {
    let lower = message.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if has(&["skill not found", "unknown skill", "unknown capability", "capability not found", "unknown tool"]) {
        ErrorKind::SkillNotFound
    } else if has(&["task not found", "no such task", "unknown task"]) {
        ErrorKind::TaskNotFound
    } else if has(&["no such file", "file not found", "enoent", "os error 2", "does not exist"]) {
        ErrorKind::FileNotFound
    } else if has(&["permission denied", "eacces", "eperm", "forbidden", "not allowed", "unauthorized"]) {
        ErrorKind::PermissionDenied
    } else if has(&["invalid arg", "invalid args", "invalid input", "missing required", "expected a", "must be a"]) {
        ErrorKind::InvalidArgs
    } else if has(&[
        "network",
        "timed out",
        "timeout",
        "econnrefused",
        "econnreset",
        "connection refused",
        "connection reset",
        "fetch failed",
        "dns",
    ]) {
        ErrorKind::NetworkError
    } else {
        ErrorKind::UnknownError
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub message: String,
    pub suggestions: Vec<String>,
}

impl ClassifiedError {
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = classify(&message);
        Self {
            kind,
            suggestions: kind.suggestions().iter().map(|s| s.to_string()).collect(),
            message,
        }
    }

    /// Trace/human rendering, always carrying the recovery suggestions.
    pub fn render(&self) -> String {
        let mut out = format!("Error [{}]: {}", self.kind.code(), self.message);
        if !self.suggestions.is_empty() {
            out.push_str("\nSuggestions:");
            for suggestion in &self.suggestions {
                out.push_str(&format!("\n- {}", suggestion));
            }
        }
        out
    }
}
