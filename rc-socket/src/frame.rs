//! Application payloads.
//!
//! One chat message is exactly one text frame of raw UTF-8: no envelope, no
//! length prefix, no id.

use rc_core::error::{RcError, RcResult};

/// A non-empty, trimmed text payload ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutboundMessage(String);

impl OutboundMessage {
    /// Trim `raw` and wrap it, rejecting whitespace-only input.
    pub fn new(raw: &str) -> RcResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(RcError::EmptyMessage);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<&str> for OutboundMessage {
    type Error = RcError;

    fn try_from(raw: &str) -> RcResult<Self> {
        Self::new(raw)
    }
}

impl AsRef<str> for OutboundMessage {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OutboundMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Decode a binary frame. Unknown framing is treated as text.
pub fn decode_binary(data: &[u8]) -> String {
    String::from_utf8_lossy(data).into_owned()
}
