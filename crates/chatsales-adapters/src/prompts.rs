//! System prompts and request payloads for the three inference stages.

use serde::Serialize;

use chatsales_core::{Candidate, SaleRecord};

pub const EXTRACTION_PROMPT: &str = r#"You read messages from a small business chat and pull out every sale they describe.

The user message is a JSON array of chat messages, each with "timestamp", "sender" and "text".
For every sale you find, produce one object with these keys:
  "timestamp"   the timestamp of the message the sale came from (string)
  "sender"      the sender of that message (string)
  "product"     what was sold, short but recognisable (string)
  "quantity"    how many units (number or null)
  "unit_price"  price of one unit (number or null)
  "total_price" amount charged for the whole sale (number or null)
  "currency"    ISO code or symbol when one is visible (string or null)
  "notes"       anything else worth keeping, such as payment method (string, may be empty)

Copy timestamps and senders exactly as given. Use null for anything the message does not state.
Messages that only mention omitted media are not sales.

Answer with a JSON array and nothing else. When there are no sales, answer [].
"#;

pub const REPAIR_PROMPT: &str = r#"You fix sale records that are missing required information.

The user message is a JSON array of sale records. Each one lacks a timestamp, a sender or a product.
For each record:
  - fill the missing field when the other fields make it clear
  - derive a missing number from the other two when possible (total_price = quantity * unit_price)
  - write the currency as a three-letter ISO code (BRL, USD, EUR) when you can tell which it is
  - never guess: leave a field null or empty when it cannot be inferred

Answer with a JSON array holding one corrected record per input record, in the same order, and nothing else.
"#;

pub const AUDIT_PROMPT: &str = r#"You audit a list of sale records extracted from a business chat.

The user message is a JSON array of sale records that already passed basic checks. Look for:
  - the same sale recorded twice (same sender, product and timestamp)
  - prices far above or below other sales of the same product
  - totals that do not match quantity * unit_price
  - records naming a product but giving neither price nor quantity

Ignore records whose product is an omitted-media placeholder such as "<Media omitted>" or "image omitted".

Answer with one JSON object and nothing else:
  "sales"   the cleaned list of records (drop confirmed duplicates, fix arithmetic you are sure of)
  "errors"  a list of {"record": <the record>, "reason": "<short explanation>"}
"#;

/// Message as sent for extraction. Hints stay local.
#[derive(Debug, Serialize)]
struct ExtractionItem<'a> {
    timestamp: &'a str,
    sender: &'a str,
    text: &'a str,
}

pub fn extraction_payload(batch: &[Candidate]) -> serde_json::Result<String> {
    let items: Vec<ExtractionItem<'_>> = batch
        .iter()
        .map(|c| ExtractionItem {
            timestamp: &c.timestamp,
            sender: &c.sender,
            text: &c.text,
        })
        .collect();
    serde_json::to_string(&items)
}

pub fn records_payload(records: &[SaleRecord]) -> serde_json::Result<String> {
    serde_json::to_string(records)
}
