pub mod circuit_breaker;
pub mod completion;
pub mod inference;
pub mod prompts;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use completion::{ChatCompletionClient, ChatCompletionClientBuilder, CompletionBackend};
pub use inference::LlmInferenceCollaborator;
pub use retry::RetryPolicy;

use chatsales_core::InferenceError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Request rejected with status {status}: {body}")]
    RequestFailed { status: u16, body: String },

    #[error("Circuit breaker is open")]
    CircuitBreakerOpen,

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl AdapterError {
    /// Connection failures, timeouts and 5xx/429 answers may succeed on a
    /// later attempt; everything else will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AdapterError::ConnectionError(_)
                | AdapterError::Timeout(_)
                | AdapterError::ServiceUnavailable(_)
        )
    }
}

impl From<AdapterError> for InferenceError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Timeout(secs) => InferenceError::Timeout(secs),
            AdapterError::SerializationError(msg) | AdapterError::InvalidResponse(msg) => {
                InferenceError::MalformedOutput(msg)
            }
            other => InferenceError::Unavailable(other.to_string()),
        }
    }
}

pub type AdapterResult<T> = Result<T, AdapterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(AdapterError::ConnectionError("refused".into()).is_retryable());
        assert!(AdapterError::Timeout(60).is_retryable());
        assert!(AdapterError::ServiceUnavailable("502".into()).is_retryable());
        assert!(!AdapterError::CircuitBreakerOpen.is_retryable());
        assert!(!AdapterError::InvalidResponse("no choices".into()).is_retryable());
        assert!(!AdapterError::RequestFailed {
            status: 401,
            body: "invalid api key".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_inference_error_mapping() {
        assert_eq!(
            InferenceError::from(AdapterError::Timeout(30)),
            InferenceError::Timeout(30)
        );
        assert_eq!(
            InferenceError::from(AdapterError::InvalidResponse("no choices".into())),
            InferenceError::MalformedOutput("no choices".into())
        );
        assert_eq!(
            InferenceError::from(AdapterError::CircuitBreakerOpen),
            InferenceError::Unavailable("Circuit breaker is open".into())
        );
    }
}
