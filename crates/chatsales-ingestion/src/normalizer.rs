//! Field normalization
//!
//! Turns the loosely typed records returned by the inference service into
//! [`SaleRecord`]s: media placeholders are discarded, numeric fields are
//! coerced with locale-aware separator handling, and every record is routed
//! either to the accepted set or to external repair.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use chatsales_core::{RawSaleRecord, SaleRecord};

lazy_static! {
    static ref MEDIA_PATTERN: Regex = Regex::new(
        r"(?i)<media omitted>|media omitted|image omitted|video omitted|audio omitted|sticker omitted|gif omitted|document omitted|mídia oculta"
    )
    .unwrap();

    static ref LEADING_CURRENCY: Regex =
        Regex::new(r"(?i)^(?:R\$|US\$|USD|BRL|EUR|GBP|\$|€|£)\s*").unwrap();
}

/// Whether a product text is an omitted-media artifact rather than a product.
pub fn is_media_placeholder(product: &str) -> bool {
    let product = product.trim();
    !product.is_empty() && MEDIA_PATTERN.is_match(product)
}

/// Parse an amount such as `R$ 1.234,56`, `$1,234.56` or `50,00`.
///
/// When both `.` and `,` appear, the rightmost one is the decimal separator.
/// A lone `,` is a decimal separator; a repeated separator is grouping.
pub fn parse_amount(text: &str) -> Option<f64> {
    let stripped = LEADING_CURRENCY.replace(text.trim(), "");
    let compact: String = stripped.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return None;
    }

    resolve_separators(&compact)
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

fn resolve_separators(amount: &str) -> String {
    match (amount.rfind('.'), amount.rfind(',')) {
        (Some(dot), Some(comma)) if comma > dot => amount.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => amount.replace(',', ""),
        (None, Some(_)) if amount.matches(',').count() > 1 => amount.replace(',', ""),
        (None, Some(_)) => amount.replace(',', "."),
        (Some(_), None) if amount.matches('.').count() > 1 => amount.replace('.', ""),
        _ => amount.to_string(),
    }
}

/// Coerce a loosely typed field into a number. Never fails: anything that
/// cannot be read as a finite number becomes `None`.
pub fn coerce_numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_amount(s),
        _ => None,
    }
}

fn clean_text(value: Option<String>) -> String {
    value.map(|s| s.trim().to_string()).unwrap_or_default()
}

/// Records after one normalization pass.
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    /// Records with timestamp, sender and product present.
    pub accepted: Vec<SaleRecord>,
    /// Records missing a required field, to be sent for repair.
    pub needs_repair: Vec<SaleRecord>,
    /// Media placeholders and empty records, discarded without an issue.
    pub dropped: usize,
}

/// Local coercion and completeness classification of sale records.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldNormalizer;

impl FieldNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Convert one record, or `None` when it carries nothing extractable.
    pub fn coerce(&self, raw: RawSaleRecord) -> Option<SaleRecord> {
        let product = raw.product.as_deref().unwrap_or("").trim();
        if is_media_placeholder(product) {
            return None;
        }
        if product.is_empty() && !raw.has_any_numeric() {
            return None;
        }

        let quantity = raw.quantity.as_ref().and_then(coerce_numeric);
        let unit_price = raw.unit_price.as_ref().and_then(coerce_numeric);
        let total_price = raw.total_price.as_ref().and_then(coerce_numeric);
        let currency = raw
            .currency
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        Some(SaleRecord {
            timestamp: clean_text(raw.timestamp),
            sender: clean_text(raw.sender),
            product: clean_text(raw.product),
            quantity,
            unit_price,
            total_price,
            currency,
            notes: clean_text(raw.notes),
        })
    }

    pub fn normalize(&self, records: Vec<RawSaleRecord>) -> NormalizedBatch {
        let mut batch = NormalizedBatch::default();

        for raw in records {
            match self.coerce(raw) {
                Some(record) if record.is_complete() => batch.accepted.push(record),
                Some(record) => batch.needs_repair.push(record),
                None => batch.dropped += 1,
            }
        }

        debug!(
            accepted = batch.accepted.len(),
            needs_repair = batch.needs_repair.len(),
            dropped = batch.dropped,
            "Records normalized"
        );

        batch
    }
}
