//! Generation Provider Abstraction
//!
//! Interface to the external text-completion service. The provider is opaque
//! and unreliable: responses are raw text with no guarantee of well-formed
//! structured data, credentials may be rejected at any time, and rate limits
//! apply. `HttpProvider` speaks the OpenAI-compatible chat-completions wire
//! format.

use crate::credential::Credential;
use crate::error::PipelineError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single generation request, already rendered to prompts.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub system_prompt: String,
    pub user_prompt: String,
}

/// Generation provider client trait.
///
/// `send` returns the provider's raw text; callers must not assume it is
/// structured data.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn send(
        &self,
        credential: &Credential,
        request: &ProviderRequest,
    ) -> Result<String, PipelineError>;
}

/// Provider connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of the OpenAI-compatible endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub temperature: Option<f32>,

    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// Hard per-request timeout. A timeout is a transient failure, not fatal.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            temperature: None,
            max_tokens: None,
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl ProviderConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.model.is_empty() {
            return Err("model cannot be empty".to_string());
        }
        if self.endpoint.is_empty() {
            return Err("endpoint cannot be empty".to_string());
        }
        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be positive".to_string());
        }
        Ok(())
    }
}

// Wire structures for the OpenAI-compatible API
#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: WireMessage,
}

/// Error payload shape some providers attach to 429 responses.
#[derive(Deserialize)]
struct RateLimitErrorBody {
    error: Option<RateLimitErrorDetail>,
}

#[derive(Deserialize)]
struct RateLimitErrorDetail {
    #[serde(default)]
    retry_after: Option<f64>,
}

fn map_transport_error(error: reqwest::Error) -> PipelineError {
    if error.is_timeout() {
        PipelineError::RequestFailed(format!("request timed out: {}", error))
    } else if error.is_connect() {
        PipelineError::RequestFailed(format!("connection error: {}", error))
    } else {
        PipelineError::RequestFailed(format!("http error: {}", error))
    }
}

fn retry_after_from_headers(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn retry_after_from_body(body: &str) -> Option<Duration> {
    serde_json::from_str::<RateLimitErrorBody>(body)
        .ok()?
        .error?
        .retry_after
        .map(Duration::from_secs_f64)
}

/// OpenAI-compatible HTTP provider client.
pub struct HttpProvider {
    client: Client,
    config: ProviderConfig,
}

impl HttpProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .no_proxy()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| PipelineError::Config(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl GenerationProvider for HttpProvider {
    async fn send(
        &self,
        credential: &Credential,
        request: &ProviderRequest,
    ) -> Result<String, PipelineError> {
        let body = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                WireMessage {
                    role: "system".to_string(),
                    content: request.system_prompt.clone(),
                },
                WireMessage {
                    role: "user".to_string(),
                    content: request.user_prompt.clone(),
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: false,
        };

        let url = format!("{}/chat/completions", self.config.endpoint);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", credential.value))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let header_hint = retry_after_from_headers(response.headers());
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(match status.as_u16() {
                401 | 403 => PipelineError::CredentialRejected(format!(
                    "provider rejected credential: {}",
                    error_text
                )),
                429 => PipelineError::RateLimited {
                    message: error_text.clone(),
                    retry_after: header_hint.or_else(|| retry_after_from_body(&error_text)),
                },
                _ => PipelineError::RequestFailed(format!(
                    "request failed with status {}: {}",
                    status, error_text
                )),
            });
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::RequestFailed(format!("failed to parse response: {}", e)))?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::RequestFailed("no choices in response".to_string()))?;

        Ok(choice.message.content)
    }
}

// Scripted provider for unit tests
#[cfg(test)]
pub use mock::{MockProvider, ScriptedOutcome};
