//! Result of a stage that depends on the inference service.

use chatsales_core::{InferenceError, InferenceResult, ValidationIssue};

/// A stage either completes with the collaborator's output or degrades to a
/// locally computed fallback, carrying exactly one issue that explains why.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome<T> {
    Completed(T),
    Degraded { fallback: T, issue: ValidationIssue },
}

impl<T> StageOutcome<T> {
    /// Build an outcome from a collaborator call. `describe` renders the
    /// issue reason for a failed call.
    pub fn from_result<F, D>(result: InferenceResult<T>, fallback: F, describe: D) -> Self
    where
        F: FnOnce() -> T,
        D: FnOnce(&InferenceError) -> String,
    {
        match result {
            Ok(value) => StageOutcome::Completed(value),
            Err(err) => StageOutcome::Degraded {
                fallback: fallback(),
                issue: ValidationIssue::new(err.issue_kind(), describe(&err)),
            },
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, StageOutcome::Degraded { .. })
    }

    pub fn map<U, F>(self, f: F) -> StageOutcome<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            StageOutcome::Completed(value) => StageOutcome::Completed(f(value)),
            StageOutcome::Degraded { fallback, issue } => StageOutcome::Degraded {
                fallback: f(fallback),
                issue,
            },
        }
    }

    pub fn into_parts(self) -> (T, Option<ValidationIssue>) {
        match self {
            StageOutcome::Completed(value) => (value, None),
            StageOutcome::Degraded { fallback, issue } => (fallback, Some(issue)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatsales_core::IssueKind;

    #[test]
    fn test_completed_outcome() {
        let outcome = StageOutcome::from_result(Ok(vec![1, 2]), Vec::new, |e| e.to_string());

        assert!(!outcome.is_degraded());
        assert_eq!(outcome.into_parts(), (vec![1, 2], None));
    }

    #[test]
    fn test_degraded_outcome_carries_issue() {
        let outcome: StageOutcome<Vec<i32>> = StageOutcome::from_result(
            Err(InferenceError::malformed("trailing prose")),
            Vec::new,
            |e| format!("batch 1 failed: {}", e),
        );

        assert!(outcome.is_degraded());
        let (value, issue) = outcome.map(|v| v.len()).into_parts();
        assert_eq!(value, 0);
        let issue = issue.unwrap();
        assert_eq!(issue.kind, IssueKind::InferenceMalformedOutput);
        assert!(issue.reason.starts_with("batch 1 failed"));
    }
}
