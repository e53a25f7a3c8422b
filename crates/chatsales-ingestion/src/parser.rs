//! Chat export parser
//!
//! Reconstructs discrete messages from the line stream of an exported chat.
//! A message starts on a line beginning with a timestamp followed by `" - "`;
//! every following line without a timestamp belongs to the open message.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use chatsales_core::Message;

lazy_static! {
    /// Matches both export flavours at the start of a line:
    /// `12/31/24, 3:45 PM - ` and `31/12/2024, 15:45 - `.
    static ref TIMESTAMP_PATTERN: Regex =
        Regex::new(r"^(\d{1,2}/\d{1,2}/\d{2,4}),\s(\d{1,2}:\d{2}(?:\s?[AaPp][Mm])?)\s-\s").unwrap();
}

/// Message under construction. At most one is open at a time.
struct MessageBuffer {
    timestamp: String,
    sender: String,
    text: String,
    is_system: bool,
    raw: String,
}

impl MessageBuffer {
    fn start(line: &str, timestamp: String, rest: &str) -> Self {
        // Sender names containing a colon are split at their first colon.
        match rest.split_once(':') {
            Some((sender, text)) => Self {
                timestamp,
                sender: sender.trim().to_string(),
                text: text.trim().to_string(),
                is_system: false,
                raw: line.to_string(),
            },
            None => Self {
                timestamp,
                sender: String::new(),
                text: rest.trim().to_string(),
                is_system: true,
                raw: line.to_string(),
            },
        }
    }

    fn append(&mut self, line: &str) {
        self.text.push('\n');
        self.text.push_str(line);
        self.raw.push('\n');
        self.raw.push_str(line);
    }

    fn finish(self) -> Message {
        Message {
            timestamp: self.timestamp,
            sender: self.sender,
            text: self.text,
            is_system: self.is_system,
            raw: self.raw,
        }
    }
}

/// Line-oriented state machine turning an export into [`Message`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChatParser;

impl ChatParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a whole export. Output order follows input order; lines before
    /// the first timestamped line are dropped.
    pub fn parse(&self, raw_text: &str) -> Vec<Message> {
        let raw_text = raw_text.strip_prefix('\u{feff}').unwrap_or(raw_text);

        let mut messages = Vec::new();
        let mut current: Option<MessageBuffer> = None;
        let mut dropped = 0usize;

        for line in raw_text.lines() {
            if let Some(caps) = TIMESTAMP_PATTERN.captures(line) {
                if let Some(buffer) = current.take() {
                    messages.push(buffer.finish());
                }
                let timestamp = format!("{}, {}", &caps[1], &caps[2]);
                let rest = &line[caps[0].len()..];
                current = Some(MessageBuffer::start(line, timestamp, rest));
            } else if let Some(buffer) = current.as_mut() {
                buffer.append(line);
            } else {
                dropped += 1;
            }
        }

        if let Some(buffer) = current {
            messages.push(buffer.finish());
        }

        debug!(
            message_count = messages.len(),
            unattributable_lines = dropped,
            "Chat export parsed"
        );

        messages
    }
}

/// Parse an export with a default [`ChatParser`].
pub fn parse_chat(raw_text: &str) -> Vec<Message> {
    ChatParser::new().parse(raw_text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_single_message_12h() {
        let messages = parse_chat("1/2/24, 3:00 PM - Alice: Sold 2 units of Widget for R$50,00");

        assert_eq!(messages.len(), 1);
        let msg = &messages[0];
        assert_eq!(msg.timestamp, "1/2/24, 3:00 PM");
        assert_eq!(msg.sender, "Alice");
        assert_eq!(msg.text, "Sold 2 units of Widget for R$50,00");
        assert!(!msg.is_system);
        assert_eq!(msg.raw, "1/2/24, 3:00 PM - Alice: Sold 2 units of Widget for R$50,00");
    }

    #[test]
    fn test_single_message_24h() {
        let messages = parse_chat("31/12/2024, 15:45 - Bruno: 3 caixas por R$ 120,00");

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].timestamp, "31/12/2024, 15:45");
        assert_eq!(messages[0].sender, "Bruno");
        assert_eq!(messages[0].text, "3 caixas por R$ 120,00");
    }

    #[test]
    fn test_narrow_space_before_meridiem() {
        let messages = parse_chat("1/2/24, 3:00\u{202f}PM - Alice: hello");

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].timestamp, "1/2/24, 3:00\u{202f}PM");
        assert_eq!(messages[0].sender, "Alice");
    }

    #[test]
    fn test_system_notice() {
        let messages = parse_chat(
            "1/2/24, 2:59 PM - Messages and calls are end-to-end encrypted. No one outside of this chat can read them.",
        );

        assert_eq!(messages.len(), 1);
        assert!(messages[0].is_system);
        assert_eq!(messages[0].sender, "");
        assert!(messages[0].text.starts_with("Messages and calls"));
    }

    #[test]
    fn test_multiline_continuation() {
        let raw = "1/2/24, 3:00 PM - Alice: Order:\n2x Widget\n1x Gadget\n1/2/24, 3:05 PM - Bob: ok";
        let messages = parse_chat(raw);

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text, "Order:\n2x Widget\n1x Gadget");
        assert_eq!(
            messages[0].raw,
            "1/2/24, 3:00 PM - Alice: Order:\n2x Widget\n1x Gadget"
        );
        assert_eq!(messages[1].sender, "Bob");
        assert_eq!(messages[1].text, "ok");
    }

    #[test]
    fn test_leading_unattributable_lines_dropped() {
        let raw = "exported from phone\n\n1/2/24, 3:00 PM - Alice: hi";
        let messages = parse_chat(raw);

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "hi");
    }

    #[test]
    fn test_crlf_and_bom() {
        let raw = "\u{feff}1/2/24, 3:00 PM - Alice: hi\r\nsecond line\r\n1/2/24, 3:01 PM - Bob: yo\r\n";
        let messages = parse_chat(raw);

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text, "hi\nsecond line");
        assert_eq!(messages[1].text, "yo");
    }

    #[test]
    fn test_first_colon_splits_sender() {
        let messages = parse_chat("1/2/24, 3:00 PM - Shop: Downtown: 5 pcs left");

        assert_eq!(messages[0].sender, "Shop");
        assert_eq!(messages[0].text, "Downtown: 5 pcs left");
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_chat("").is_empty());
        assert!(parse_chat("no timestamps here\nat all").is_empty());
    }

    #[test]
    fn test_reparsing_raw_reproduces_message() {
        let raw = "1/2/24, 3:00 PM - Alice: Order:\n2x Widget\n\
                   1/2/24, 3:01 PM - Alice joined using this group's invite link\n\
                   31/12/2024, 15:45 - Bruno: 3 caixas\n  R$ 120,00";
        let messages = parse_chat(raw);
        assert_eq!(messages.len(), 3);

        for message in &messages {
            let reparsed = parse_chat(&message.raw);
            assert_eq!(reparsed, vec![message.clone()]);
        }
    }

    #[test]
    fn test_only_well_formed_prefixes_open_messages() {
        let messages = parse_chat(
            "1/2/24, 3:00 PM - Alice: hi\n\
             1/2/24 3:00 PM - missing comma\n\
             31/12/2024, 15:45 - Bruno: oi",
        );

        assert_eq!(messages.len(), 2);
        assert!(messages[0].text.contains("missing comma"));
        assert_eq!(messages[1].sender, "Bruno");
    }
}
