//! Chat-completion backend speaking the OpenAI HTTP protocol.
//!
//! Uses `ureq` for synchronous requests; callers running inside an async
//! runtime must hop onto a blocking thread first.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::analysis::error::{AnalysisError, AnalysisResult};
use crate::analysis::{CompletionBackend, CompletionRequest};

/// Configuration for the OpenAI-compatible backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    /// Bearer token. `None` means analysis is unavailable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Base URL up to and including the API version, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Model name.
    pub model: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-3.5-turbo".into(),
            timeout_secs: 120,
        }
    }
}

/// Client for the `/chat/completions` endpoint.
pub struct OpenAiBackend {
    config: OpenAiConfig,
    agent: ureq::Agent,
}

impl OpenAiBackend {
    pub fn new(config: OpenAiConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();
        Self { config, agent }
    }

    /// Get the model name being used.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    /// JSON body for a completion request.
    pub fn request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": m.role.as_str(),
                    "content": m.content,
                })
            })
            .collect();

        serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        })
    }
}

impl CompletionBackend for OpenAiBackend {
    fn complete(&self, request: &CompletionRequest) -> AnalysisResult<String> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(AnalysisError::MissingApiKey)?;

        let resp = self
            .agent
            .post(&self.endpoint())
            .set("Authorization", &format!("Bearer {api_key}"))
            .set("Content-Type", "application/json")
            .send_json(self.request_body(request))
            .map_err(|e| match e {
                ureq::Error::Status(code, resp) => {
                    let body = resp.into_string().unwrap_or_default();
                    AnalysisError::RequestFailed {
                        message: format!("server returned status {code}: {}", body.trim()),
                    }
                }
                other => AnalysisError::RequestFailed {
                    message: other.to_string(),
                },
            })?;

        let json: serde_json::Value = resp.into_json().map_err(|e| AnalysisError::ParseError {
            message: e.to_string(),
        })?;

        json["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| AnalysisError::ParseError {
                message: "missing 'choices[0].message.content' field".into(),
            })
    }
}

impl std::fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiBackend")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .field("has_api_key", &self.config.api_key.is_some())
            .finish()
    }
}
