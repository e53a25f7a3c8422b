use async_trait::async_trait;

use crate::error::InferenceResult;
use crate::types::{Candidate, DeepAuditReport, RawSaleRecord, SaleRecord};

/// External text-inference service consulted by the pipeline.
///
/// Implementations must be free of per-call mutable state so one handle can
/// be shared across concurrent batches and pipeline runs.
#[async_trait]
pub trait InferenceCollaborator: Send + Sync {
    /// Extract sale records from an ordered batch of candidate messages.
    /// An empty vector means the batch held no sales.
    async fn extract(&self, batch: &[Candidate]) -> InferenceResult<Vec<RawSaleRecord>>;

    /// Fill in missing fields of incomplete records.
    async fn repair(&self, records: &[SaleRecord]) -> InferenceResult<Vec<RawSaleRecord>>;

    /// Review the locally audited record set for anomalies.
    async fn deep_audit(&self, records: &[SaleRecord]) -> InferenceResult<DeepAuditReport>;
}
