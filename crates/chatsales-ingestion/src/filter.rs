//! Sale candidate pre-filter.
//!
//! Pattern-based detection of messages that mention a price or a quantity.
//! The filter favours recall: a missed message is lost for good, while a
//! false positive only costs a little more inference work per batch.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, trace};

use chatsales_core::{Candidate, Message};

lazy_static! {
    /// Optional currency marker followed by an amount in `1,234.56` or
    /// `1.234,56` grouping.
    static ref PRICE_PATTERN: Regex = Regex::new(
        r"(?i)(?:R\$|US\$|USD|BRL|EUR|GBP|\$|€|£)?\s*\d{1,3}(?:[.,]\d{3})*(?:[.,]\d{2})?"
    )
    .unwrap();

    /// Integer followed by an English or Portuguese unit word.
    static ref QUANTITY_PATTERN: Regex = Regex::new(
        r"(?i)\b\d+\s*(?:unidades|unidade|unid|und|un|units|unit|pieces|piece|pcs|pc|caixas|caixa|boxes|box|pacotes|pacote|packs|pack|kgs|kg|quilos|quilo|kilos|kilo|dúzias|dúzia|dozens|dozen|dz)\b"
    )
    .unwrap();
}

/// Price-like substrings of `text`, trimmed, in order of appearance.
pub fn price_hints(text: &str) -> Vec<String> {
    PRICE_PATTERN
        .find_iter(text)
        .map(|m| m.as_str().trim().to_string())
        .filter(|hint| !hint.is_empty())
        .collect()
}

/// Quantity expressions such as `10 pcs` or `3 caixas`, in order of appearance.
pub fn quantity_hints(text: &str) -> Vec<String> {
    QUANTITY_PATTERN
        .find_iter(text)
        .map(|m| m.as_str().trim().to_string())
        .collect()
}

/// Stateless filter selecting the messages worth semantic extraction.
#[derive(Debug, Clone, Copy, Default)]
pub struct CandidateFilter;

impl CandidateFilter {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate one message. System notices never qualify.
    pub fn evaluate(&self, message: &Message) -> Option<Candidate> {
        if message.is_system {
            return None;
        }

        let prices = price_hints(&message.text);
        let quantities = quantity_hints(&message.text);

        if prices.is_empty() && quantities.is_empty() {
            return None;
        }

        trace!(
            timestamp = %message.timestamp,
            price_hits = prices.len(),
            quantity_hits = quantities.len(),
            "Sale candidate detected"
        );

        Some(Candidate::from_message(message, prices, quantities))
    }

    pub fn filter(&self, messages: &[Message]) -> Vec<Candidate> {
        let candidates: Vec<Candidate> = messages
            .iter()
            .filter_map(|message| self.evaluate(message))
            .collect();

        debug!(
            message_count = messages.len(),
            candidate_count = candidates.len(),
            "Candidates filtered"
        );

        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn message(sender: &str, text: &str) -> Message {
        Message {
            timestamp: "1/2/24, 3:00 PM".to_string(),
            sender: sender.to_string(),
            text: text.to_string(),
            is_system: sender.is_empty(),
            raw: format!("1/2/24, 3:00 PM - {}: {}", sender, text),
        }
    }

    #[test]
    fn test_price_hints_both_groupings() {
        assert_eq!(price_hints("Total R$1.234,56 hoje"), vec!["R$1.234,56"]);
        assert_eq!(price_hints("Paid $1,234.56"), vec!["$1,234.56"]);
        assert_eq!(price_hints("€ 20"), vec!["€ 20"]);
        assert_eq!(price_hints("usd 15.50 each"), vec!["usd 15.50"]);
    }

    #[test]
    fn test_price_hints_scenario_line() {
        let hints = price_hints("Sold 2 units of Widget for R$50,00");
        assert_eq!(hints, vec!["2", "R$50,00"]);
    }

    #[test]
    fn test_quantity_hints_languages() {
        assert_eq!(quantity_hints("Sent 10 pcs today"), vec!["10 pcs"]);
        assert_eq!(quantity_hints("3 caixas e 2 pacotes"), vec!["3 caixas", "2 pacotes"]);
        assert_eq!(quantity_hints("5kg of rice"), vec!["5kg"]);
        assert_eq!(quantity_hints("duas dúzias"), Vec::<String>::new());
        assert_eq!(quantity_hints("2 dúzias de ovos"), vec!["2 dúzias"]);
    }

    #[test]
    fn test_quantity_requires_unit_word_boundary() {
        assert!(quantity_hints("10 unicorns").is_empty());
        assert!(quantity_hints("4 boxing gloves").is_empty());
    }

    #[test]
    fn test_filter_keeps_hits_and_skips_system() {
        let filter = CandidateFilter::new();
        let messages = vec![
            message("Alice", "Sold 2 units of Widget for R$50,00"),
            message("Bob", "good morning!"),
            message("", "Alice added 5 people"),
            message("Carla", "3 caixas"),
        ];

        let candidates = filter.filter(&messages);

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].sender, "Alice");
        assert_eq!(candidates[0].hint_quantities, vec!["2 units"]);
        assert_eq!(candidates[1].sender, "Carla");
        assert!(candidates[1].hint_prices.contains(&"3".to_string()));
    }

    #[test]
    fn test_evaluate_no_hits() {
        let filter = CandidateFilter::new();
        assert!(filter.evaluate(&message("Bob", "see you tomorrow")).is_none());
    }
}
