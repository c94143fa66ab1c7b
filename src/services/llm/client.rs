use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Completion, GenerateRequest, LanguageModel, LlmError, Role};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_secs: 120,
        }
    }
}

/// llama-server `/completion` client.
#[derive(Clone)]
pub struct HttpModel {
    client: Client,
    config: LlmConfig,
}

#[derive(Serialize)]
struct CompletionRequest {
    prompt: String,
    stream: bool,
    n_predict: u32,
    temperature: f32,
    stop: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    json_schema: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    content: String,
}

impl HttpModel {
    pub fn new(config: LlmConfig) -> Self {
        let client = match Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build() {
            Ok(client) => client,
            Err(e) => {
                warn!(error = %e, timeout_secs = config.timeout_secs, "http client builder failed, using defaults without a timeout");
                Client::new()
            }
        };
        Self { client, config }
    }

    fn render_prompt(request: &GenerateRequest) -> String {
        let mut prompt = format!("System: {}\n", request.system_prompt);
        for message in &request.messages {
            let speaker = match message.role {
                Role::System => "System",
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            prompt.push_str(&format!("{}: {}\n", speaker, message.content));
        }
        prompt.push_str("Assistant:");
        prompt
    }

    async fn send(&self, request: &GenerateRequest) -> Result<Completion, LlmError> {
        let body = CompletionRequest {
            prompt: Self::render_prompt(request),
            stream: false,
            n_predict: request.options.max_tokens,
            temperature: request.options.temperature,
            stop: vec!["User:".to_string(), "System:".to_string()],
            json_schema: request.options.json_mode.then(|| json!({ "type": "object" })),
        };

        let response = self
            .client
            .post(format!("{}/completion", self.config.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.config.timeout_secs)
                } else {
                    LlmError::Request(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(LlmError::Status(response.status().as_u16()));
        }

        let parsed: CompletionResponse = response.json().await.map_err(|e| LlmError::Parse(e.to_string()))?;
        debug!(chars = parsed.content.len(), "completion received");
        Ok(Completion {
            content: parsed.content.trim().to_string(),
        })
    }
}

#[async_trait]
impl LanguageModel for HttpModel {
    async fn generate(&self, request: &GenerateRequest, cancel: &CancellationToken) -> Result<Completion, LlmError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(LlmError::Cancelled),
            result = self.send(request) => result,
        }
    }
}
