//! Chat completion client for OpenAI-compatible APIs (Perplexity by default).

use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::RagError;
use crate::config::LlmConfig;

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
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Blocking chat completion. Call from `spawn_blocking` inside async code.
pub trait ChatCompletion: Send + Sync {
    fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, RagError>;

    fn model(&self) -> &str;
}

/// Client for `POST {base_url}/chat/completions` with bearer auth.
pub struct OpenAiCompatibleClient {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OpenAiCompatibleClient {
    pub fn new(config: &LlmConfig) -> Result<Self, RagError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            RagError::NotConfigured(
                "PERPLEXITY_API_KEY not set. Add it to your environment (.env)".into(),
            )
        })?;

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            client,
            timeout_secs: config.timeout_secs,
        })
    }
}

/// Request body for /chat/completions
#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

/// Response body from /chat/completions
#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletion for OpenAiCompatibleClient {
    fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, RagError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature,
            max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    RagError::ApiConnection(format!(
                        "Request timed out after {}s",
                        self.timeout_secs
                    ))
                } else if e.is_connect() {
                    RagError::ApiConnection(format!("Cannot reach {}", self.base_url))
                } else {
                    RagError::ApiConnection(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(RagError::ApiError {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .map_err(|e| RagError::ResponseParsing(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| RagError::ResponseParsing("Response has no message content".into()))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Mock chat client for testing. Records every request.
pub struct MockChatClient {
    response: Result<String, (u16, String)>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl MockChatClient {
    pub fn new(response: &str) -> Self {
        Self {
            response: Ok(response.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every call fails with an API error of the given status.
    pub fn failing(status: u16, body: &str) -> Self {
        Self {
            response: Err((status, body.to_string())),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl ChatCompletion for MockChatClient {
    fn complete(
        &self,
        messages: &[ChatMessage],
        _temperature: f32,
        _max_tokens: u32,
    ) -> Result<String, RagError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }
        match &self.response {
            Ok(text) => Ok(text.clone()),
            Err((status, body)) => Err(RagError::ApiError {
                status: *status,
                body: body.clone(),
            }),
        }
    }

    fn model(&self) -> &str {
        "mock"
    }
}
