//! Chat-completion transport: provider abstraction + scripted replay for tests.
//! Everything above this layer works in terms of `ChatRequest`/`ChatCompletion`
//! and never sees HTTP.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::AiConfig;
use crate::error::ServiceError;
use crate::record::TokenUsage;

/// Defaults for the generic completion surface. The evaluation engine pins
/// its own stricter values.
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = concat!("ticket-load-analyzer/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    /// `None` means the provider's configured model.
    pub model: Option<String>,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Ask the provider for a JSON object instead of free text.
    pub force_json: bool,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            model: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            force_json: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatCompletion {
    pub content: String,
    pub model: String,
    pub usage: Option<TokenUsage>,
}

/// Anything that can answer a chat request. Boxed futures keep the trait
/// object-safe so `AppState` can hold `Arc<dyn ChatProvider>`.
pub trait ChatProvider: Send + Sync {
    fn complete<'a>(
        &'a self,
        req: &'a ChatRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ChatCompletion, ServiceError>> + Send + 'a>>;
}

pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(cfg: &AiConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .connect_timeout(CONNECT_TIMEOUT)
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            api_key: cfg.api_key.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatCompletion, ServiceError> {
        if !self.is_configured() {
            return Err(ServiceError::configuration(
                "OpenAI API key is not configured",
            ));
        }

        // Log a stable id for the prompt, never the prompt itself.
        let prompt_hash = anon_hash(
            &req.messages
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        );

        let model = req.model.clone().unwrap_or_else(|| self.model.clone());
        let mut body = serde_json::json!({
            "model": model,
            "messages": req.messages,
            "temperature": req.temperature,
            "max_tokens": req.max_tokens,
        });
        if req.force_json {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }

        let url = format!("{}/chat/completions", self.base_url);
        let started = Instant::now();
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                metrics::counter!("ai_requests_total", "outcome" => "transport_error").increment(1);
                ServiceError::upstream(format!("OpenAI request failed: {e}"))
            })?;
        metrics::histogram!("ai_request_seconds").record(started.elapsed().as_secs_f64());

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ServiceError::upstream(format!("OpenAI body read failed: {e}")))?;
        if !status.is_success() {
            metrics::counter!("ai_requests_total", "outcome" => "http_error").increment(1);
            warn!(%status, "OpenAI returned an error status");
            return Err(ServiceError::upstream(format!(
                "OpenAI returned {status}: {}",
                snippet(&text)
            )));
        }

        let completion = parse_chat_body(&text)?;
        metrics::counter!("ai_requests_total", "outcome" => "ok").increment(1);
        debug!(
            prompt_hash,
            model = %completion.model,
            response_len = completion.content.len(),
            total_tokens = completion.usage.map(|u| u.total_tokens).unwrap_or(0),
            "chat completion received"
        );
        Ok(completion)
    }
}

fn anon_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    hex[..12].to_string()
}

impl ChatProvider for OpenAiProvider {
    fn complete<'a>(
        &'a self,
        req: &'a ChatRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ChatCompletion, ServiceError>> + Send + 'a>> {
        Box::pin(self.send(req))
    }
}

fn parse_chat_body(body: &str) -> Result<ChatCompletion, ServiceError> {
    #[derive(Deserialize)]
    struct ApiResponse {
        choices: Vec<Choice>,
        usage: Option<UsageDto>,
        model: Option<String>,
    }
    #[derive(Deserialize)]
    struct Choice {
        message: MessageDto,
    }
    #[derive(Deserialize)]
    struct MessageDto {
        content: Option<String>,
    }
    #[derive(Deserialize)]
    struct UsageDto {
        prompt_tokens: u32,
        completion_tokens: u32,
        total_tokens: u32,
    }

    let parsed: ApiResponse = serde_json::from_str(body)
        .map_err(|e| ServiceError::upstream(format!("OpenAI response parse failed: {e}")))?;

    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| ServiceError::upstream("OpenAI response contained no choices"))?;

    Ok(ChatCompletion {
        content,
        model: parsed.model.unwrap_or_default(),
        usage: parsed.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }),
    })
}

fn snippet(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() > 300 {
        let head: String = trimmed.chars().take(300).collect();
        format!("{head}…")
    } else {
        trimmed.to_string()
    }
}

/// Replays queued replies in order. Used by tests and the offline probe.
#[derive(Default)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<ChatCompletion, ServiceError>>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_content(&self, content: impl Into<String>) {
        self.push_completion(ChatCompletion {
            content: content.into(),
            model: "scripted".to_string(),
            usage: Some(TokenUsage {
                prompt_tokens: 100,
                completion_tokens: 50,
                total_tokens: 150,
            }),
        });
    }

    pub fn push_completion(&self, completion: ChatCompletion) {
        self.replies
            .lock()
            .expect("scripted provider poisoned")
            .push_back(Ok(completion));
    }

    pub fn push_error(&self, err: ServiceError) {
        self.replies
            .lock()
            .expect("scripted provider poisoned")
            .push_back(Err(err));
    }
}

impl ChatProvider for ScriptedProvider {
    fn complete<'a>(
        &'a self,
        _req: &'a ChatRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ChatCompletion, ServiceError>> + Send + 'a>> {
        let next = self
            .replies
            .lock()
            .expect("scripted provider poisoned")
            .pop_front();
        Box::pin(async move {
            next.unwrap_or_else(|| Err(ServiceError::upstream("scripted provider exhausted")))
        })
    }
}
