//! Error types shared across the workspace

use thiserror::Error;

use crate::types::IssueKind;

/// Failure of a call to the inference collaborator.
///
/// None of these abort a pipeline run: each one turns into a degraded stage
/// plus a single synthetic validation issue.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InferenceError {
    #[error("inference service unavailable: {0}")]
    Unavailable(String),

    #[error("inference call timed out after {0}s")]
    Timeout(u64),

    #[error("inference output could not be parsed: {0}")]
    MalformedOutput(String),
}

impl InferenceError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedOutput(msg.into())
    }

    /// Issue kind reported when a stage degrades because of this error.
    pub fn issue_kind(&self) -> IssueKind {
        match self {
            InferenceError::Unavailable(_) | InferenceError::Timeout(_) => {
                IssueKind::InferenceUnavailable
            }
            InferenceError::MalformedOutput(_) => IssueKind::InferenceMalformedOutput,
        }
    }
}

impl From<serde_json::Error> for InferenceError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedOutput(err.to_string())
    }
}

/// Result type for inference calls
pub type InferenceResult<T> = std::result::Result<T, InferenceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_kind_mapping() {
        assert_eq!(
            InferenceError::unavailable("connection refused").issue_kind(),
            IssueKind::InferenceUnavailable
        );
        assert_eq!(InferenceError::Timeout(60).issue_kind(), IssueKind::InferenceUnavailable);
        assert_eq!(
            InferenceError::malformed("expected value").issue_kind(),
            IssueKind::InferenceMalformedOutput
        );
    }

    #[test]
    fn test_error_display() {
        let err = InferenceError::Timeout(30);
        assert_eq!(err.to_string(), "inference call timed out after 30s");

        let err: InferenceError = serde_json::from_str::<serde_json::Value>("not json")
            .unwrap_err()
            .into();
        assert!(err.to_string().starts_with("inference output could not be parsed"));
    }
}
