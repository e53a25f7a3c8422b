use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

// Newtype wrappers for type safety

/// Identifier of a single pipeline invocation, carried on tracing spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Chat messages

/// A single message reconstructed from a chat export.
///
/// `raw` keeps the original line(s) verbatim; `sender` is empty for system
/// notices such as encryption banners or membership changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub timestamp: String,
    pub sender: String,
    pub text: String,
    pub is_system: bool,
    pub raw: String,
}

/// A message that local heuristics consider likely to describe a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub timestamp: String,
    pub sender: String,
    pub text: String,
    pub hint_prices: Vec<String>,
    pub hint_quantities: Vec<String>,
}

impl Candidate {
    pub fn from_message(message: &Message, hint_prices: Vec<String>, hint_quantities: Vec<String>) -> Self {
        Self {
            timestamp: message.timestamp.clone(),
            sender: message.sender.clone(),
            text: message.text.clone(),
            hint_prices,
            hint_quantities,
        }
    }
}

// Sale records

/// Sale record exactly as the inference service returned it.
///
/// Every field is optional. Numeric fields may arrive as numbers or as text
/// ("R$ 50,00"); string fields tolerate numbers. Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawSaleRecord {
    #[serde(deserialize_with = "lenient_string")]
    pub timestamp: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub sender: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub product: Option<String>,
    pub quantity: Option<Value>,
    pub unit_price: Option<Value>,
    pub total_price: Option<Value>,
    #[serde(deserialize_with = "lenient_string")]
    pub currency: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub notes: Option<String>,
}

impl RawSaleRecord {
    /// Whether any of the numeric fields carries a value at all, coercible or not.
    pub fn has_any_numeric(&self) -> bool {
        [&self.quantity, &self.unit_price, &self.total_price]
            .into_iter()
            .any(|field| match field {
                None | Some(Value::Null) => false,
                Some(Value::String(s)) => !s.trim().is_empty(),
                Some(_) => true,
            })
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// A normalized sale record. Empty strings mean "missing".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaleRecord {
    pub timestamp: String,
    pub sender: String,
    pub product: String,
    pub quantity: Option<f64>,
    pub unit_price: Option<f64>,
    pub total_price: Option<f64>,
    pub currency: Option<String>,
    pub notes: String,
}

/// Identity of a sale for duplicate detection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SaleKey {
    pub timestamp: String,
    pub sender: String,
    pub product: String,
}

impl SaleRecord {
    pub fn key(&self) -> SaleKey {
        SaleKey {
            timestamp: self.timestamp.clone(),
            sender: self.sender.clone(),
            product: self.product.clone(),
        }
    }

    /// Timestamp, sender and product are all present.
    pub fn is_complete(&self) -> bool {
        !self.timestamp.trim().is_empty()
            && !self.sender.trim().is_empty()
            && !self.product.trim().is_empty()
    }

    pub fn with_total_price(mut self, total_price: f64) -> Self {
        self.total_price = Some(total_price);
        self
    }
}

impl From<SaleRecord> for RawSaleRecord {
    fn from(record: SaleRecord) -> Self {
        fn number(value: Option<f64>) -> Option<Value> {
            value
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
        }

        fn text(value: String) -> Option<String> {
            if value.is_empty() {
                None
            } else {
                Some(value)
            }
        }

        Self {
            timestamp: text(record.timestamp),
            sender: text(record.sender),
            product: text(record.product),
            quantity: number(record.quantity),
            unit_price: number(record.unit_price),
            total_price: number(record.total_price),
            currency: record.currency,
            notes: text(record.notes),
        }
    }
}

// Validation issues

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    DuplicateRecord,
    ArithmeticMismatch,
    PartialSale,
    InferenceUnavailable,
    InferenceMalformedOutput,
    AuditFinding,
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IssueKind::DuplicateRecord => write!(f, "duplicate_record"),
            IssueKind::ArithmeticMismatch => write!(f, "arithmetic_mismatch"),
            IssueKind::PartialSale => write!(f, "partial_sale"),
            IssueKind::InferenceUnavailable => write!(f, "inference_unavailable"),
            IssueKind::InferenceMalformedOutput => write!(f, "inference_malformed_output"),
            IssueKind::AuditFinding => write!(f, "audit_finding"),
        }
    }
}

pub const DUPLICATE_REASON: &str = "Duplicate record detected.";
pub const PARTIAL_SALE_REASON: &str =
    "Partial sale: product identified but price and quantity are both missing.";

/// An annotation produced by normalization, auditing or a degraded stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<SaleRecord>,
    pub reason: String,
    pub kind: IssueKind,
}

impl ValidationIssue {
    pub fn new(kind: IssueKind, reason: impl Into<String>) -> Self {
        Self {
            record: None,
            reason: reason.into(),
            kind,
        }
    }

    pub fn with_record(mut self, record: SaleRecord) -> Self {
        self.record = Some(record);
        self
    }

    pub fn duplicate(record: SaleRecord) -> Self {
        Self::new(IssueKind::DuplicateRecord, DUPLICATE_REASON).with_record(record)
    }

    pub fn partial_sale(record: SaleRecord) -> Self {
        Self::new(IssueKind::PartialSale, PARTIAL_SALE_REASON).with_record(record)
    }

    pub fn arithmetic_mismatch(record: SaleRecord, reason: impl Into<String>) -> Self {
        Self::new(IssueKind::ArithmeticMismatch, reason).with_record(record)
    }
}

// Deep audit wire shapes

/// Issue entry reported by the external deep audit: `{record, reason}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteIssue {
    pub record: Option<Value>,
    #[serde(deserialize_with = "lenient_string")]
    pub reason: Option<String>,
}

/// Response of the external deep audit. `sales` is mandatory; a response
/// without it is treated as malformed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeepAuditReport {
    pub sales: Vec<RawSaleRecord>,
    #[serde(default)]
    pub errors: Vec<RemoteIssue>,
}

// Pipeline results

/// Stage boundary counts for one invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub messages_parsed: usize,
    pub candidates_found: usize,
    pub records_extracted: usize,
    pub valid_sales: usize,
    pub flagged_errors: usize,
    pub degraded_calls: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub filename: String,
    pub sales: Vec<SaleRecord>,
    pub errors: Vec<ValidationIssue>,
    pub stats: PipelineStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_run_id_display() {
        let id = RunId::new();
        assert_eq!(Uuid::parse_str(&id.to_string()).unwrap().get_version_num(), 4);
        assert_ne!(id, RunId::new());
    }

    #[test]
    fn test_raw_record_tolerates_loose_shapes() {
        let raw: RawSaleRecord = serde_json::from_value(json!({
            "timestamp": "1/2/24, 3:00 PM",
            "sender": "Alice",
            "product": 42,
            "quantity": "2",
            "unit_price": 25.0,
            "total_price": null,
            "confidence": 0.9
        }))
        .unwrap();

        assert_eq!(raw.product.as_deref(), Some("42"));
        assert_eq!(raw.quantity, Some(json!("2")));
        assert_eq!(raw.unit_price, Some(json!(25.0)));
        assert_eq!(raw.total_price, None);
        assert_eq!(raw.currency, None);
        assert_eq!(raw.notes, None);
    }

    #[test]
    fn test_raw_record_numeric_presence() {
        let empty = RawSaleRecord::default();
        assert!(!empty.has_any_numeric());

        let blank = RawSaleRecord {
            unit_price: Some(json!("  ")),
            ..Default::default()
        };
        assert!(!blank.has_any_numeric());

        let garbage = RawSaleRecord {
            total_price: Some(json!("abc")),
            ..Default::default()
        };
        assert!(garbage.has_any_numeric());
    }

    #[test]
    fn test_sale_record_completeness() {
        let mut record = SaleRecord {
            timestamp: "1/2/24, 3:00 PM".to_string(),
            sender: "Alice".to_string(),
            product: "Widget".to_string(),
            ..Default::default()
        };
        assert!(record.is_complete());

        record.sender = "   ".to_string();
        assert!(!record.is_complete());
    }

    #[test]
    fn test_sale_record_to_raw() {
        let record = SaleRecord {
            timestamp: "1/2/24, 3:00 PM".to_string(),
            sender: "Alice".to_string(),
            product: "Widget".to_string(),
            quantity: Some(2.0),
            unit_price: Some(25.0),
            total_price: None,
            currency: Some("BRL".to_string()),
            notes: String::new(),
        };

        let raw = RawSaleRecord::from(record);
        assert_eq!(raw.quantity, Some(json!(2.0)));
        assert_eq!(raw.total_price, None);
        assert_eq!(raw.notes, None);
        assert_eq!(raw.currency.as_deref(), Some("BRL"));
    }

    #[test]
    fn test_issue_serialization() {
        let issue = ValidationIssue::new(IssueKind::InferenceUnavailable, "down");
        let value = serde_json::to_value(&issue).unwrap();

        assert_eq!(value, json!({"reason": "down", "kind": "inference_unavailable"}));
        assert_eq!(IssueKind::PartialSale.to_string(), "partial_sale");
    }

    #[test]
    fn test_deep_audit_report_requires_sales() {
        let missing = serde_json::from_value::<DeepAuditReport>(json!({"errors": []}));
        assert!(missing.is_err());

        let report: DeepAuditReport = serde_json::from_value(json!({
            "sales": [{"product": "Widget"}],
            "errors": [{"reason": "Price looks high"}]
        }))
        .unwrap();
        assert_eq!(report.sales.len(), 1);
        assert_eq!(report.errors[0].reason.as_deref(), Some("Price looks high"));
        assert!(report.errors[0].record.is_none());

        let empty: DeepAuditReport = serde_json::from_value(json!({"sales": []})).unwrap();
        assert_eq!(empty, DeepAuditReport::default());
    }
}
