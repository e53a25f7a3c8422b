//! Batched dispatch of extraction and repair calls.
//!
//! Input is split into fixed-size batches that run with bounded concurrency.
//! Results are collected in batch order, so downstream "first occurrence
//! wins" rules stay deterministic. A failed batch degrades on its own.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use chatsales_core::{
    Candidate, InferenceCollaborator, PipelineConfig, RawSaleRecord, SaleRecord, ValidationIssue,
};

use crate::outcome::StageOutcome;

/// Records returned by one batched stage, plus the issues of degraded batches.
#[derive(Debug, Clone, Default)]
pub struct BatchedResult {
    pub records: Vec<RawSaleRecord>,
    pub issues: Vec<ValidationIssue>,
    pub degraded_calls: usize,
}

impl BatchedResult {
    fn collect(outcomes: Vec<StageOutcome<Vec<RawSaleRecord>>>) -> Self {
        let mut result = Self::default();
        for outcome in outcomes {
            let (records, issue) = outcome.into_parts();
            result.records.extend(records);
            if let Some(issue) = issue {
                result.issues.push(issue);
                result.degraded_calls += 1;
            }
        }
        result
    }
}

/// Extraction and repair stages backed by the inference collaborator.
#[derive(Clone)]
pub struct InferenceStages {
    collaborator: Arc<dyn InferenceCollaborator>,
    batch_size: usize,
    max_concurrency: usize,
}

impl InferenceStages {
    pub fn new(collaborator: Arc<dyn InferenceCollaborator>) -> Self {
        let defaults = PipelineConfig::default();
        Self {
            collaborator,
            batch_size: defaults.batch_size,
            max_concurrency: defaults.max_concurrent_batches,
        }
    }

    pub fn from_config(collaborator: Arc<dyn InferenceCollaborator>, config: &PipelineConfig) -> Self {
        Self::new(collaborator)
            .with_batch_size(config.batch_size)
            .with_max_concurrency(config.max_concurrent_batches)
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Semantic extraction over all candidates.
    pub async fn extract_sales(&self, candidates: &[Candidate]) -> BatchedResult {
        if candidates.is_empty() {
            return BatchedResult::default();
        }

        // Owned batches keep each future free of borrows, so the whole stage
        // stays `Send` and can run inside a spawned task.
        let batches: Vec<Vec<Candidate>> = candidates
            .chunks(self.batch_size)
            .map(<[Candidate]>::to_vec)
            .collect();
        let total = batches.len();

        info!(
            candidates = candidates.len(),
            batches = total,
            "Dispatching extraction batches"
        );

        let collaborator = Arc::clone(&self.collaborator);
        let outcomes: Vec<_> = stream::iter(batches.into_iter().enumerate().map(
            move |(index, batch)| {
                let collaborator = Arc::clone(&collaborator);
                async move {
                    let result = collaborator.extract(&batch).await;
                    debug!(batch = index + 1, ok = result.is_ok(), "Extraction batch finished");
                    StageOutcome::from_result(result, Vec::new, |err| {
                        warn!(batch = index + 1, error = %err, "Extraction batch degraded");
                        format!(
                            "Extraction batch {}/{} failed ({} candidates): {}",
                            index + 1,
                            total,
                            batch.len(),
                            err
                        )
                    })
                }
            },
        ))
        .buffered(self.max_concurrency)
        .collect()
        .await;

        BatchedResult::collect(outcomes)
    }

    /// External repair of records missing a required field. A failed batch
    /// contributes nothing, so its records stay out of the final sales.
    pub async fn repair_records(&self, records: &[SaleRecord]) -> BatchedResult {
        if records.is_empty() {
            return BatchedResult::default();
        }

        let batches: Vec<Vec<SaleRecord>> = records
            .chunks(self.batch_size)
            .map(<[SaleRecord]>::to_vec)
            .collect();
        let total = batches.len();

        info!(
            records = records.len(),
            batches = total,
            "Dispatching repair batches"
        );

        let collaborator = Arc::clone(&self.collaborator);
        let outcomes: Vec<_> = stream::iter(batches.into_iter().enumerate().map(
            move |(index, batch)| {
                let collaborator = Arc::clone(&collaborator);
                async move {
                    let result = collaborator.repair(&batch).await;
                    debug!(batch = index + 1, ok = result.is_ok(), "Repair batch finished");
                    StageOutcome::from_result(result, Vec::new, |err| {
                        warn!(batch = index + 1, error = %err, "Repair batch degraded");
                        format!(
                            "Repair batch {}/{} failed ({} records): {}",
                            index + 1,
                            total,
                            batch.len(),
                            err
                        )
                    })
                }
            },
        ))
        .buffered(self.max_concurrency)
        .collect()
        .await;

        BatchedResult::collect(outcomes)
    }
}

impl std::fmt::Debug for InferenceStages {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceStages")
            .field("batch_size", &self.batch_size)
            .field("max_concurrency", &self.max_concurrency)
            .finish()
    }
}
