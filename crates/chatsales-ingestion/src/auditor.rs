//! Cross-record consistency audit
//!
//! Local passes run per record in arrival order:
//!
//! 1. duplicate detection on `(timestamp, sender, product)`, first occurrence wins
//! 2. arithmetic consistency of `quantity × unit_price` against `total_price`
//! 3. partial-sale flagging for records with a product but no numbers
//!
//! An optional deep audit by the inference service may then supersede the
//! local sales list. Its output is guarded so the final list still satisfies
//! the same invariants.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use chatsales_core::{
    DeepAuditReport, InferenceCollaborator, InferenceError, IssueKind, RawSaleRecord, RemoteIssue,
    SaleRecord, ValidationIssue, DEFAULT_ARITHMETIC_TOLERANCE,
};

use crate::normalizer::{is_media_placeholder, FieldNormalizer};
use crate::outcome::StageOutcome;

/// Round to cents, as used for the expected total.
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Quantities render without a fractional part when integral: `3`, `2.5`.
fn format_quantity(value: f64) -> String {
    format!("{}", value)
}

/// Prices keep one decimal place when integral: `10.0`, `12.75`.
fn format_price(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

/// Expected total when `record` deviates from `quantity × unit_price` by more
/// than `tolerance` of its reported total. `None` when consistent or when any
/// of the three fields is missing.
pub fn arithmetic_mismatch(record: &SaleRecord, tolerance: f64) -> Option<f64> {
    let (quantity, unit_price, total) = match (record.quantity, record.unit_price, record.total_price) {
        (Some(q), Some(u), Some(t)) => (q, u, t),
        _ => return None,
    };

    let expected = round_cents(quantity * unit_price);
    if (expected - total).abs() > tolerance * total.abs() {
        Some(expected)
    } else {
        None
    }
}

fn mismatch_reason(record: &SaleRecord, expected: f64) -> String {
    format!(
        "Arithmetic mismatch: {} × {} = {}, but total_price = {}.",
        format_quantity(record.quantity.unwrap_or_default()),
        format_price(record.unit_price.unwrap_or_default()),
        format_price(expected),
        format_price(record.total_price.unwrap_or_default()),
    )
}

fn is_partial(record: &SaleRecord) -> bool {
    !record.product.trim().is_empty()
        && record.quantity.is_none()
        && record.unit_price.is_none()
        && record.total_price.is_none()
}

/// Sales and issues produced by an audit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditReport {
    pub sales: Vec<SaleRecord>,
    pub errors: Vec<ValidationIssue>,
}

/// What happened to the external deep audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeepAuditStatus {
    /// No collaborator configured, or nothing left to audit.
    Skipped,
    Completed,
    Degraded,
}

#[derive(Debug, Clone)]
pub struct AuditOutcome {
    pub report: AuditReport,
    pub deep_audit: DeepAuditStatus,
}

/// Duplicate, arithmetic and completeness checks over a whole record set.
#[derive(Clone)]
pub struct ConsistencyAuditor {
    tolerance: f64,
    normalizer: FieldNormalizer,
    collaborator: Option<Arc<dyn InferenceCollaborator>>,
}

impl ConsistencyAuditor {
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            normalizer: FieldNormalizer::new(),
            collaborator: None,
        }
    }

    /// Enable the external deep audit.
    pub fn with_collaborator(mut self, collaborator: Arc<dyn InferenceCollaborator>) -> Self {
        self.collaborator = Some(collaborator);
        self
    }

    /// Run the three local passes.
    pub fn check_local(&self, records: Vec<SaleRecord>) -> AuditReport {
        self.run_checks(records, true)
    }

    fn run_checks(&self, records: Vec<SaleRecord>, flag_partial: bool) -> AuditReport {
        let mut seen = HashSet::new();
        let mut report = AuditReport::default();

        for record in records {
            if !seen.insert(record.key()) {
                report.errors.push(ValidationIssue::duplicate(record));
                continue;
            }

            let record = match arithmetic_mismatch(&record, self.tolerance) {
                Some(expected) => {
                    let reason = mismatch_reason(&record, expected);
                    report
                        .errors
                        .push(ValidationIssue::arithmetic_mismatch(record.clone(), reason));
                    // An overflowing product cannot stand in for the total.
                    if expected.is_finite() {
                        record.with_total_price(expected)
                    } else {
                        record
                    }
                }
                None => record,
            };

            if flag_partial && is_partial(&record) {
                report.errors.push(ValidationIssue::partial_sale(record.clone()));
            }

            report.sales.push(record);
        }

        debug!(
            sales = report.sales.len(),
            issues = report.errors.len(),
            "Local audit checks completed"
        );

        report
    }

    /// Local checks followed by the deep audit when a collaborator is set.
    pub async fn audit(&self, records: Vec<SaleRecord>) -> AuditOutcome {
        let local = self.check_local(records);

        let collaborator = match &self.collaborator {
            Some(collaborator) if !local.sales.is_empty() => collaborator,
            _ => {
                return AuditOutcome {
                    report: local,
                    deep_audit: DeepAuditStatus::Skipped,
                }
            }
        };

        let result = collaborator.deep_audit(&local.sales).await;
        match StageOutcome::from_result(result, DeepAuditReport::default, describe_audit_failure) {
            StageOutcome::Completed(remote) => {
                info!(
                    remote_sales = remote.sales.len(),
                    remote_issues = remote.errors.len(),
                    "Deep audit completed"
                );
                AuditOutcome {
                    report: self.merge_remote(local, remote),
                    deep_audit: DeepAuditStatus::Completed,
                }
            }
            StageOutcome::Degraded { issue, .. } => {
                warn!(reason = %issue.reason, "Deep audit degraded, keeping local results");
                let mut report = local;
                report.errors.push(issue);
                AuditOutcome {
                    report,
                    deep_audit: DeepAuditStatus::Degraded,
                }
            }
        }
    }

    fn merge_remote(&self, local: AuditReport, remote: DeepAuditReport) -> AuditReport {
        let mut errors = local.errors;
        errors.extend(
            remote
                .errors
                .into_iter()
                .filter_map(|issue| self.remote_issue(issue)),
        );

        let candidates: Vec<SaleRecord> = remote
            .sales
            .into_iter()
            .filter_map(|raw| self.normalizer.coerce(raw))
            .filter(SaleRecord::is_complete)
            .collect();

        let guarded = self.run_checks(candidates, false);
        errors.extend(guarded.errors);

        AuditReport {
            sales: guarded.sales,
            errors,
        }
    }

    /// Convert a remote `{record, reason}` entry. Entries about media
    /// placeholders are dropped.
    fn remote_issue(&self, issue: RemoteIssue) -> Option<ValidationIssue> {
        let raw = issue
            .record
            .and_then(|value: Value| serde_json::from_value::<RawSaleRecord>(value).ok());

        if let Some(product) = raw.as_ref().and_then(|r| r.product.as_deref()) {
            if is_media_placeholder(product) {
                return None;
            }
        }

        let reason = issue
            .reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| "Issue reported by deep audit.".to_string());

        let mut converted = ValidationIssue::new(IssueKind::AuditFinding, reason);
        converted.record = raw.and_then(|r| self.normalizer.coerce(r));
        Some(converted)
    }
}

impl Default for ConsistencyAuditor {
    fn default() -> Self {
        Self::new(DEFAULT_ARITHMETIC_TOLERANCE)
    }
}

impl std::fmt::Debug for ConsistencyAuditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsistencyAuditor")
            .field("tolerance", &self.tolerance)
            .field("deep_audit", &self.collaborator.is_some())
            .finish()
    }
}

fn describe_audit_failure(err: &InferenceError) -> String {
    match err {
        InferenceError::MalformedOutput(detail) => {
            format!("Deep audit response could not be parsed: {}", detail)
        }
        other => format!("Deep audit unavailable: {}", other),
    }
}
