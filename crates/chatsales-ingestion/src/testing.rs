//! Scripted inference collaborator for unit tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use chatsales_core::{
    Candidate, DeepAuditReport, InferenceCollaborator, InferenceError, InferenceResult,
    RawSaleRecord, SaleRecord,
};

type ExtractFn = Box<dyn Fn(&[Candidate]) -> InferenceResult<Vec<RawSaleRecord>> + Send + Sync>;
type RepairFn = Box<dyn Fn(&[SaleRecord]) -> InferenceResult<Vec<RawSaleRecord>> + Send + Sync>;
type AuditFn = Box<dyn Fn(&[SaleRecord]) -> InferenceResult<DeepAuditReport> + Send + Sync>;

pub(crate) struct ScriptedCollaborator {
    extract: ExtractFn,
    repair: RepairFn,
    audit: AuditFn,
    pub(crate) extract_calls: AtomicUsize,
    pub(crate) repair_calls: AtomicUsize,
    pub(crate) audit_calls: AtomicUsize,
}

impl ScriptedCollaborator {
    /// Extraction finds nothing, repair returns nothing, deep audit echoes.
    pub(crate) fn new() -> Self {
        Self {
            extract: Box::new(|_| Ok(Vec::new())),
            repair: Box::new(|_| Ok(Vec::new())),
            audit: Box::new(|records| {
                Ok(DeepAuditReport {
                    sales: records.iter().cloned().map(RawSaleRecord::from).collect(),
                    errors: Vec::new(),
                })
            }),
            extract_calls: AtomicUsize::new(0),
            repair_calls: AtomicUsize::new(0),
            audit_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn on_extract<F>(mut self, f: F) -> Self
    where
        F: Fn(&[Candidate]) -> InferenceResult<Vec<RawSaleRecord>> + Send + Sync + 'static,
    {
        self.extract = Box::new(f);
        self
    }

    pub(crate) fn on_repair<F>(mut self, f: F) -> Self
    where
        F: Fn(&[SaleRecord]) -> InferenceResult<Vec<RawSaleRecord>> + Send + Sync + 'static,
    {
        self.repair = Box::new(f);
        self
    }

    pub(crate) fn on_audit<F>(mut self, f: F) -> Self
    where
        F: Fn(&[SaleRecord]) -> InferenceResult<DeepAuditReport> + Send + Sync + 'static,
    {
        self.audit = Box::new(f);
        self
    }

    pub(crate) fn failing() -> Self {
        Self::new()
            .on_extract(|_| Err(InferenceError::unavailable("connection refused")))
            .on_repair(|_| Err(InferenceError::unavailable("connection refused")))
            .on_audit(|_| Err(InferenceError::unavailable("connection refused")))
    }
}

#[async_trait]
impl InferenceCollaborator for ScriptedCollaborator {
    async fn extract(&self, batch: &[Candidate]) -> InferenceResult<Vec<RawSaleRecord>> {
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        (self.extract)(batch)
    }

    async fn repair(&self, records: &[SaleRecord]) -> InferenceResult<Vec<RawSaleRecord>> {
        self.repair_calls.fetch_add(1, Ordering::SeqCst);
        (self.repair)(records)
    }

    async fn deep_audit(&self, records: &[SaleRecord]) -> InferenceResult<DeepAuditReport> {
        self.audit_calls.fetch_add(1, Ordering::SeqCst);
        (self.audit)(records)
    }
}

pub(crate) fn sale(timestamp: &str, sender: &str, product: &str) -> SaleRecord {
    SaleRecord {
        timestamp: timestamp.to_string(),
        sender: sender.to_string(),
        product: product.to_string(),
        ..Default::default()
    }
}
