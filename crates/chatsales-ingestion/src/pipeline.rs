//! Sales Extraction Pipeline
//!
//! Sequences parsing, candidate filtering, extraction, normalization, repair
//! and auditing for one uploaded chat export. No stage aborts the run: a
//! failed external call degrades that stage and leaves an issue behind.

use std::sync::Arc;

use tracing::{info, info_span, Instrument};

use chatsales_core::{
    InferenceCollaborator, PipelineConfig, PipelineOutput, PipelineStats, RunId, SaleRecord,
    ValidationIssue,
};

use crate::auditor::{ConsistencyAuditor, DeepAuditStatus};
use crate::filter::CandidateFilter;
use crate::inference::InferenceStages;
use crate::normalizer::FieldNormalizer;
use crate::parser::ChatParser;

/// End-to-end pipeline turning a chat export into audited sale records.
#[derive(Debug, Clone)]
pub struct SalesPipeline {
    parser: ChatParser,
    filter: CandidateFilter,
    normalizer: FieldNormalizer,
    stages: InferenceStages,
    auditor: ConsistencyAuditor,
}

impl SalesPipeline {
    pub fn new(config: PipelineConfig, collaborator: Arc<dyn InferenceCollaborator>) -> Self {
        let stages = InferenceStages::from_config(Arc::clone(&collaborator), &config);

        let mut auditor = ConsistencyAuditor::new(config.arithmetic_tolerance);
        if config.deep_audit {
            auditor = auditor.with_collaborator(collaborator);
        }

        Self {
            parser: ChatParser::new(),
            filter: CandidateFilter::new(),
            normalizer: FieldNormalizer::new(),
            stages,
            auditor,
        }
    }

    /// Process one chat export.
    pub async fn run(&self, raw_text: &str, filename: &str) -> PipelineOutput {
        let run_id = RunId::new();
        let span = info_span!("pipeline_run", run_id = %run_id, filename = %filename);

        self.run_inner(raw_text, filename).instrument(span).await
    }

    async fn run_inner(&self, raw_text: &str, filename: &str) -> PipelineOutput {
        let mut stats = PipelineStats::default();
        let mut errors = Vec::new();

        let messages = self.parser.parse(raw_text);
        stats.messages_parsed = messages.len();

        let candidates = self.filter.filter(&messages);
        stats.candidates_found = candidates.len();

        info!(
            messages = stats.messages_parsed,
            candidates = stats.candidates_found,
            "Chat parsed"
        );

        let extracted = self.stages.extract_sales(&candidates).await;
        stats.records_extracted = extracted.records.len();
        stats.degraded_calls += extracted.degraded_calls;
        errors.extend(extracted.issues);

        let first_pass = self.normalizer.normalize(extracted.records);

        let repaired = self.repair(first_pass.needs_repair, &mut stats, &mut errors).await;

        let mut merged = first_pass.accepted;
        merged.extend(repaired);

        info!(
            extracted = stats.records_extracted,
            merged = merged.len(),
            "Records normalized"
        );

        let audit = self.auditor.audit(merged).await;
        if audit.deep_audit == DeepAuditStatus::Degraded {
            stats.degraded_calls += 1;
        }

        errors.extend(audit.report.errors);
        let sales = audit.report.sales;

        stats.valid_sales = sales.len();
        stats.flagged_errors = errors.len();

        info!(
            valid_sales = stats.valid_sales,
            flagged_errors = stats.flagged_errors,
            degraded_calls = stats.degraded_calls,
            "Pipeline run completed"
        );

        PipelineOutput {
            filename: filename.to_string(),
            sales,
            errors,
            stats,
        }
    }

    /// Repair incomplete records. Output is normalized again and anything
    /// still incomplete is dropped.
    async fn repair(
        &self,
        incomplete: Vec<SaleRecord>,
        stats: &mut PipelineStats,
        errors: &mut Vec<ValidationIssue>,
    ) -> Vec<SaleRecord> {
        if incomplete.is_empty() {
            return Vec::new();
        }

        let result = self.stages.repair_records(&incomplete).await;
        stats.degraded_calls += result.degraded_calls;
        errors.extend(result.issues);

        let second_pass = self.normalizer.normalize(result.records);
        info!(
            sent = incomplete.len(),
            repaired = second_pass.accepted.len(),
            still_incomplete = second_pass.needs_repair.len(),
            "Repair pass completed"
        );

        second_pass.accepted
    }
}
