use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt as _;
use tracing::debug;

use crate::errors::ChatError;
use crate::message::ConversationTurn;
use crate::prompt::{self, HtmlContext, PromptMode, SpiderRequest};
use crate::transport::{ByteStream, CompletionTransport};

/// OpenAI-compatible endpoint used when no base URL is configured.
pub const DEFAULT_BASE_URL: &str = "https://api.deepinfra.com/v1/openai";
/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "meta-llama/Meta-Llama-3.1-70B-Instruct";

const API_KEY_ENV: &str = "DEEP_INFRA_API_KEY";
const MODEL_ENV: &str = "DEEP_INFRA_MODEL";
const BASE_URL_ENV: &str = "DEEP_INFRA_BASE_URL";

/// Configuration for the chat-completions client.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// API key used for bearer auth.
    pub api_key: String,
    /// Base URL of the OpenAI-compatible API; `/chat/completions` is appended.
    pub base_url: String,
    /// Model name sent with every request.
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// HTTP timeout for a whole request, body included.
    pub timeout: Duration,
}

impl ClientConfig {
    /// Creates a config with defaults and the provided API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 2000,
            timeout: Duration::from_secs(120),
        }
    }

    /// Builds a config from `DEEP_INFRA_API_KEY`, with optional
    /// `DEEP_INFRA_MODEL` and `DEEP_INFRA_BASE_URL` overrides.
    pub fn from_env() -> Result<Self, ChatError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ChatError> {
        let api_key = lookup(API_KEY_ENV).unwrap_or_default();
        if api_key.trim().is_empty() {
            return Err(ChatError::Config(format!(
                "missing {API_KEY_ENV} for the completions client"
            )));
        }
        let mut config = Self::new(api_key.trim());
        if let Some(model) = lookup(MODEL_ENV).filter(|m| !m.trim().is_empty()) {
            config.model = model.trim().to_string();
        }
        if let Some(base_url) = lookup(BASE_URL_ENV).filter(|u| !u.trim().is_empty()) {
            config.base_url = base_url.trim().to_string();
        }
        Ok(config)
    }

    /// Overrides the API base URL (for proxies or test servers).
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides the model.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Overrides the default HTTP timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, serde::Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ConversationTurn],
    stream: bool,
    temperature: f32,
    max_tokens: u32,
}

/// Client for a single OpenAI-compatible `/chat/completions` endpoint.
pub struct CompletionsClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl CompletionsClient {
    /// Creates a client from explicit configuration.
    pub fn new(config: ClientConfig) -> Result<Self, ChatError> {
        if config.api_key.trim().is_empty() {
            return Err(ChatError::Config(
                "completions client api_key must not be empty".into(),
            ));
        }
        if config.model.trim().is_empty() {
            return Err(ChatError::Config("completions client model must not be empty".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("spider-assist/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ChatError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Creates a client from the environment; see [`ClientConfig::from_env`].
    pub fn from_env() -> Result<Self, ChatError> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Sends `messages` without streaming and returns the first choice's
    /// message content (empty when the endpoint returns none).
    pub async fn complete(&self, messages: Vec<ConversationTurn>) -> Result<String, ChatError> {
        let response = self.send(&messages, false).await?;
        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ChatError::transport(format!("invalid completion response: {e}")))?;
        Ok(value
            .get("choices")
            .and_then(|v| v.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string())
    }

    /// One-shot spider generation. Uses the grounded prompt when a page is
    /// supplied, the plain prompt otherwise.
    pub async fn generate_spider_code(
        &self,
        request: &SpiderRequest,
        page: Option<&HtmlContext>,
    ) -> Result<String, ChatError> {
        let mode = match page {
            Some(page) => PromptMode::HtmlGrounded { page: page.clone() },
            None => PromptMode::Plain,
        };
        let messages = vec![
            ConversationTurn::system(prompt::system_prompt(&mode)),
            ConversationTurn::user(prompt::spider_request(request)),
        ];
        self.complete(messages).await
    }

    async fn send(
        &self,
        messages: &[ConversationTurn],
        stream: bool,
    ) -> Result<reqwest::Response, ChatError> {
        let body = CompletionRequest {
            model: &self.config.model,
            messages,
            stream,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };
        debug!(
            event = "chat.request_sent",
            domain = "chat",
            model = %self.config.model,
            stream,
            message_count = messages.len() as u64
        );

        let response = self
            .client
            .post(self.config.chat_completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::transport(format!("completion request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or("unknown status");
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            let message = if body.trim().is_empty() {
                reason.to_string()
            } else {
                format!("{reason}: {}", body.trim())
            };
            return Err(ChatError::Status {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl CompletionTransport for CompletionsClient {
    async fn open_stream(
        &self,
        messages: Vec<ConversationTurn>,
    ) -> Result<ByteStream, ChatError> {
        let response = self.send(&messages, true).await?;
        Ok(Box::pin(response.bytes_stream().map_err(|e| {
            ChatError::transport(format!("completion stream read failed: {e}"))
        })))
    }
}
