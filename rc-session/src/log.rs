//! Chat entries and the append-only message log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Submitted by this client.
    Local,
    /// Received from the relay.
    Remote,
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// One line of the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub text: String,
    pub origin: Origin,
    /// Position in the log, starting at 0. Display order is sequence order.
    pub sequence: u64,
    /// Wall-clock time of the append. Informational only.
    pub timestamp: DateTime<Utc>,
}

impl ChatEntry {
    pub fn is_local(&self) -> bool {
        self.origin == Origin::Local
    }
}

/// Ordered, append-only list of entries.
#[derive(Debug, Default)]
pub struct MessageLog {
    entries: Vec<ChatEntry>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry and assign it the next sequence number.
    pub fn append(&mut self, text: String, origin: Origin) -> &ChatEntry {
        let sequence = self.next_sequence();
        self.entries.push(ChatEntry {
            text,
            origin,
            sequence,
            timestamp: Utc::now(),
        });
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&ChatEntry> {
        self.entries.last()
    }

    pub fn next_sequence(&self) -> u64 {
        self.entries.len() as u64
    }

    /// Count entries with the given origin.
    pub fn count(&self, origin: Origin) -> usize {
        self.entries.iter().filter(|e| e.origin == origin).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_starts_at_zero_and_increments() {
        let mut log = MessageLog::new();
        assert!(log.is_empty());
        assert_eq!(log.append("a".into(), Origin::Local).sequence, 0);
        assert_eq!(log.append("b".into(), Origin::Remote).sequence, 1);
        assert_eq!(log.append("c".into(), Origin::Remote).sequence, 2);

        let sequences: Vec<u64> = log.entries().iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
        assert_eq!(log.count(Origin::Remote), 2);
        assert_eq!(log.last().map(|e| e.text.as_str()), Some("c"));
    }

    #[test]
    fn test_entry_serializes_origin_lowercase() {
        let mut log = MessageLog::new();
        let entry = log.append("hello".into(), Origin::Local).clone();

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["text"], "hello");
        assert_eq!(json["origin"], "local");
        assert_eq!(json["sequence"], 0);
        assert!(json["timestamp"].is_string());

        let back: ChatEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
        assert!(back.is_local());
    }
}
