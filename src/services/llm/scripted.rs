//! Deterministic model double. Replies are consumed in order; every request
//! is recorded so callers can inspect prompts and temperatures.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{Completion, GenerateRequest, LanguageModel, LlmError};

#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    Fail(String),
    /// Never completes; only cancellation ends the call.
    Hang,
}

#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<ScriptedReply>>,
    fallback: Option<String>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedModel {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_replies(replies.into_iter().map(|s| ScriptedReply::Text(s.into())))
    }

    pub fn with_replies(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Reply used once the queue is empty.
    pub fn with_fallback(mut self, reply: impl Into<String>) -> Self {
        self.fallback = Some(reply.into());
        self
    }

    pub fn push(&self, reply: ScriptedReply) {
        self.replies.lock().unwrap_or_else(|e| e.into_inner()).push_back(reply);
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, request: &GenerateRequest, cancel: &CancellationToken) -> Result<Completion, LlmError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        if cancel.is_cancelled() {
            return Err(LlmError::Cancelled);
        }

        let next = self.replies.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
        let reply = match (next, &self.fallback) {
            (Some(reply), _) => reply,
            (None, Some(fallback)) => ScriptedReply::Text(fallback.clone()),
            (None, None) => return Err(LlmError::Unavailable("script exhausted".to_string())),
        };

        match reply {
            ScriptedReply::Text(content) => Ok(Completion { content }),
            ScriptedReply::Fail(message) => Err(LlmError::Request(message)),
            ScriptedReply::Hang => {
                cancel.cancelled().await;
                Err(LlmError::Cancelled)
            }
        }
    }
}
