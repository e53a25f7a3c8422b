//! Sales Extraction Pipeline for chat exports
//!
//! This crate turns an exported chat log into structured sale records with a
//! list of validation issues. Local stages are pure and synchronous; the
//! stages that consult the inference service degrade instead of failing.
//!
//! # Features
//!
//! - Line-oriented chat parsing with multi-line continuation
//! - Pattern-based sale candidate filtering (English and Portuguese)
//! - Locale-aware numeric coercion and media-placeholder removal
//! - Batched extraction and repair with bounded concurrency
//! - Duplicate, arithmetic and partial-sale auditing with optional deep audit

pub mod auditor;
pub mod filter;
pub mod inference;
pub mod normalizer;
pub mod outcome;
pub mod parser;
pub mod pipeline;

#[cfg(test)]
mod testing;

// Re-exports
pub use auditor::{
    arithmetic_mismatch, round_cents, AuditOutcome, AuditReport, ConsistencyAuditor,
    DeepAuditStatus,
};
pub use filter::{price_hints, quantity_hints, CandidateFilter};
pub use inference::{BatchedResult, InferenceStages};
pub use normalizer::{coerce_numeric, is_media_placeholder, parse_amount, FieldNormalizer, NormalizedBatch};
pub use outcome::StageOutcome;
pub use parser::{parse_chat, ChatParser};
pub use pipeline::SalesPipeline;
