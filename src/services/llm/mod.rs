//! Language-model collaborator. The pipeline only ever sees
//! `generate(system, messages, options) -> content`.

pub mod client;
pub mod scripted;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use client::{HttpModel, LlmConfig};
pub use scripted::{ScriptedModel, ScriptedReply};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("language model call cancelled")]
    Cancelled,
    #[error("language model request failed: {0}")]
    Request(String),
    #[error("language model server returned status {0}")]
    Status(u16),
    #[error("language model timed out after {0}s")]
    Timeout(u64),
    #[error("failed to parse language model response: {0}")]
    Parse(String),
    #[error("language model unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerateOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    pub json_mode: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: 0.4,
            max_tokens: 512,
            json_mode: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub system_prompt: String,
    pub messages: Vec<ChatMessage>,
    pub options: GenerateOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Must resolve promptly with `LlmError::Cancelled` once `cancel` fires.
    async fn generate(&self, request: &GenerateRequest, cancel: &CancellationToken) -> Result<Completion, LlmError>;
}
