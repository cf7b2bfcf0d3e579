//! Uniform LLM provider interface (C2): `complete(messages, params) ->
//! String`. Shape grounded on the teacher's `LlmProvider`
//! (`skynet-agent/src/provider.rs`), narrowed to what spec §4.2 actually
//! needs — no streaming, no tool-call surface, since the dreaming pipeline
//! and chat completion this spec covers are both single-shot text in,
//! text out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{LlmError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone)]
pub struct CompletionParams {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self {
            model: String::new(),
            max_tokens: 1024,
            temperature: 0.2,
            timeout: Duration::from_secs(60),
        }
    }
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for routing and error messages (e.g. "openai", "anthropic").
    fn provider_name(&self) -> &str;

    async fn complete(&self, messages: &[ChatMessage], params: &CompletionParams) -> Result<String>;
}

/// A deterministic stub provider for tests (dreaming pipeline tests,
/// scheduler tests) — never makes a network call.
pub struct StubProvider {
    name: String,
    responses: std::sync::Mutex<std::collections::VecDeque<Result<String>>>,
}

impl StubProvider {
    pub fn new(name: impl Into<String>, responses: Vec<Result<String>>) -> Self {
        Self {
            name: name.into(),
            responses: std::sync::Mutex::new(responses.into_iter().collect()),
        }
    }

    pub fn always(name: impl Into<String>, response: String) -> Self {
        Self::new(name, vec![Ok(response)])
    }
}

#[async_trait]
impl LlmProvider for StubProvider {
    fn provider_name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, _messages: &[ChatMessage], params: &CompletionParams) -> Result<String> {
        let mut queue = self.responses.lock().expect("stub lock poisoned");
        match queue.pop_front() {
            Some(result) => {
                if queue.is_empty() {
                    // keep returning the last scripted response instead of
                    // erroring on extra calls — convenient for loop-driven
                    // tests (e.g. retry + backoff) that don't care how many
                    // times they hit the stub.
                }
                result
            }
            None => Err(LlmError::Call {
                provider: self.name.clone(),
                model: params.model.clone(),
                reason: "stub exhausted".to_string(),
            }),
        }
    }
}

/// Real HTTP chat-completions provider, grounded on the teacher's
/// reqwest-based providers (rustls-tls, per-call timeout).
pub struct HttpProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpProvider {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct HttpChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct HttpChatChoice {
    message: HttpChatMessageOut,
}

#[derive(Deserialize)]
struct HttpChatMessageOut {
    content: String,
}

#[derive(Deserialize)]
struct HttpChatResponse {
    choices: Vec<HttpChatChoice>,
}

#[async_trait]
impl LlmProvider for HttpProvider {
    fn provider_name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, messages: &[ChatMessage], params: &CompletionParams) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = HttpChatRequest {
            model: &params.model,
            messages,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
        };

        let send = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send();

        let response = tokio::time::timeout(params.timeout, send)
            .await
            .map_err(|_| LlmError::Timeout {
                provider: self.name.clone(),
                model: params.model.clone(),
                ms: params.timeout.as_millis() as u64,
            })?
            .map_err(|e| LlmError::Call {
                provider: self.name.clone(),
                model: params.model.clone(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(LlmError::Call {
                provider: self.name.clone(),
                model: params.model.clone(),
                reason: format!("provider returned status {}", response.status()),
            });
        }

        let parsed: HttpChatResponse = response.json().await.map_err(|e| LlmError::Call {
            provider: self.name.clone(),
            model: params.model.clone(),
            reason: format!("invalid response body: {e}"),
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::Call {
                provider: self.name.clone(),
                model: params.model.clone(),
                reason: "provider returned no choices".to_string(),
            })
    }
}
