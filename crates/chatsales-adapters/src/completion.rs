//! OpenAI-compatible chat completion client

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

use chatsales_core::InferenceConfig;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::retry::RetryPolicy;
use crate::{AdapterError, AdapterResult};

/// A text completion endpoint: one system prompt, one user message, one reply.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_content: &str) -> AdapterResult<String>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<&'a str>,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for `POST {base_url}/chat/completions`.
///
/// Every call goes through the retry policy, and each attempt through the
/// shared circuit breaker.
#[derive(Clone)]
pub struct ChatCompletionClient {
    http: Client,
    endpoint: Url,
    api_key: Option<Secret<String>>,
    model: String,
    max_tokens: u32,
    temperature: f32,
    reasoning_effort: Option<String>,
    timeout: Duration,
    retry: RetryPolicy,
    breaker: Arc<CircuitBreaker>,
}

impl std::fmt::Debug for ChatCompletionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Builder for creating a ChatCompletionClient
pub struct ChatCompletionClientBuilder {
    base_url: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
    temperature: f32,
    reasoning_effort: Option<String>,
    timeout: Duration,
    retry: RetryPolicy,
    breaker: CircuitBreakerConfig,
}

impl Default for ChatCompletionClientBuilder {
    fn default() -> Self {
        let defaults = InferenceConfig::default();
        let timeout = defaults.timeout();
        Self {
            base_url: defaults.base_url,
            api_key: None,
            model: defaults.model,
            max_tokens: defaults.max_tokens,
            temperature: defaults.temperature,
            reasoning_effort: None,
            timeout,
            retry: RetryPolicy::new(defaults.max_retries),
            breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl ChatCompletionClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Base URL up to, not including, `/chat/completions`.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Bearer key. Empty keys are treated as absent.
    pub fn api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key.filter(|k| !k.trim().is_empty());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn reasoning_effort(mut self, effort: Option<String>) -> Self {
        self.reasoning_effort = effort.filter(|e| !e.trim().is_empty());
        self
    }

    /// Per-request HTTP timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker = config;
        self
    }

    pub fn build(self) -> AdapterResult<ChatCompletionClient> {
        let endpoint = completions_endpoint(&self.base_url)?;

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let http = Client::builder()
            .timeout(self.timeout)
            .user_agent(format!("chatsales/{}", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .map_err(|e| AdapterError::Configuration(e.to_string()))?;

        Ok(ChatCompletionClient {
            http,
            endpoint,
            api_key: self.api_key.map(Secret::new),
            model: self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            reasoning_effort: self.reasoning_effort,
            timeout: self.timeout,
            retry: self.retry,
            breaker: Arc::new(CircuitBreaker::new("chat-completions", self.breaker)),
        })
    }
}

fn completions_endpoint(base_url: &str) -> AdapterResult<Url> {
    let mut base = Url::parse(base_url)
        .map_err(|e| AdapterError::Configuration(format!("invalid base_url {:?}: {}", base_url, e)))?;

    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }

    base.join("chat/completions")
        .map_err(|e| AdapterError::Configuration(e.to_string()))
}

impl ChatCompletionClient {
    pub fn builder() -> ChatCompletionClientBuilder {
        ChatCompletionClientBuilder::new()
    }

    pub fn from_config(config: &InferenceConfig) -> AdapterResult<Self> {
        Self::builder()
            .base_url(config.base_url.clone())
            .api_key(Some(config.api_key.clone()))
            .model(config.model.clone())
            .max_tokens(config.max_tokens)
            .temperature(config.temperature)
            .reasoning_effort(Some(config.reasoning_effort.clone()))
            .timeout(config.timeout())
            .retry_policy(RetryPolicy::new(config.max_retries))
            .build()
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Longest a `complete` call can take: every attempt running to its
    /// HTTP timeout plus the backoff between attempts.
    pub fn call_budget(&self) -> Duration {
        self.retry.worst_case(self.timeout)
    }

    fn transport_error(&self, err: reqwest::Error) -> AdapterError {
        if err.is_timeout() {
            AdapterError::Timeout(self.timeout.as_secs())
        } else {
            AdapterError::ConnectionError(err.to_string())
        }
    }

    async fn send_once(&self, request: &ChatCompletionRequest<'_>) -> AdapterResult<String> {
        let mut builder = self.http.post(self.endpoint.clone()).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = builder.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                AdapterError::ServiceUnavailable(format!("{}: {}", status, body))
            } else {
                AdapterError::RequestFailed {
                    status: status.as_u16(),
                    body,
                }
            });
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::InvalidResponse(e.to_string()))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                AdapterError::InvalidResponse("completion carried no message content".to_string())
            })
    }
}

#[async_trait]
impl CompletionBackend for ChatCompletionClient {
    #[instrument(skip_all, fields(model = %self.model))]
    async fn complete(&self, system_prompt: &str, user_content: &str) -> AdapterResult<String> {
        let request = ChatCompletionRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            reasoning_effort: self.reasoning_effort.as_deref(),
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_content,
                },
            ],
        };
        let request = &request;

        let content = self
            .retry
            .execute(move || self.breaker.call(move || self.send_once(request)))
            .await
            .inspect_err(|err| {
                warn!(breaker = ?self.breaker.state(), error = %err, "Completion call failed");
            })?;

        debug!(chars = content.len(), "Completion received");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn client_for(server: &mockito::ServerGuard, max_attempts: usize) -> ChatCompletionClient {
        ChatCompletionClient::builder()
            .base_url(format!("{}/openai/v1", server.url()))
            .api_key(Some("gsk-test".to_string()))
            .reasoning_effort(Some("none".to_string()))
            .retry_policy(
                RetryPolicy::new(max_attempts)
                    .with_backoff(Duration::from_millis(1), Duration::from_millis(2))
                    .with_jitter(false),
            )
            .build()
            .unwrap()
    }

    fn completion_body(content: &str) -> String {
        json!({
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
        })
        .to_string()
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let url = completions_endpoint("https://api.groq.com/openai/v1").unwrap();
        assert_eq!(url.as_str(), "https://api.groq.com/openai/v1/chat/completions");

        let url = completions_endpoint("http://localhost:11434/v1/").unwrap();
        assert_eq!(url.as_str(), "http://localhost:11434/v1/chat/completions");

        assert!(completions_endpoint("not a url").is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        let client = ChatCompletionClient::builder()
            .api_key(Some("gsk-secret".to_string()))
            .build()
            .unwrap();

        let rendered = format!("{:?}", client);
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("gsk-secret"));
    }

    #[tokio::test]
    async fn test_complete_returns_message_content() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/openai/v1/chat/completions")
            .match_header("authorization", "Bearer gsk-test")
            .match_body(Matcher::PartialJson(json!({
                "model": "qwen/qwen3-32b",
                "reasoning_effort": "none",
                "messages": [
                    {"role": "system", "content": "be terse"},
                    {"role": "user", "content": "[]"}
                ]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion_body("[]"))
            .create_async()
            .await;

        let content = client_for(&server, 1).complete("be terse", "[]").await.unwrap();

        assert_eq!(content, "[]");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/openai/v1/chat/completions")
            .with_status(503)
            .with_body("overloaded")
            .expect(3)
            .create_async()
            .await;

        let err = client_for(&server, 3).complete("sys", "[]").await.unwrap_err();

        assert!(matches!(err, AdapterError::ServiceUnavailable(_)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_client_errors_fail_fast() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/openai/v1/chat/completions")
            .with_status(401)
            .with_body("invalid api key")
            .expect(1)
            .create_async()
            .await;

        let err = client_for(&server, 3).complete("sys", "[]").await.unwrap_err();

        assert_eq!(
            err,
            AdapterError::RequestFailed {
                status: 401,
                body: "invalid api key".to_string()
            }
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_choices_is_invalid_response() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/openai/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices": []}"#)
            .create_async()
            .await;

        let err = client_for(&server, 1).complete("sys", "[]").await.unwrap_err();

        assert!(matches!(err, AdapterError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_connection_error() {
        let client = ChatCompletionClient::builder()
            .base_url("http://127.0.0.1:9/v1")
            .retry_policy(RetryPolicy::new(1))
            .build()
            .unwrap();

        let err = client.complete("sys", "[]").await.unwrap_err();

        assert!(matches!(err, AdapterError::ConnectionError(_)));
    }
}
