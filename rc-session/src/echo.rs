//! Handling of the relay echoing our own messages back.
//!
//! Whether a relay echoes a sender's message depends on the relay, so the
//! behaviour is configured with `EchoPolicy`:
//! - `KeepAll` appends every inbound frame, echoes included.
//! - `SuppressOwn` remembers what this session sent and drops the first
//!   inbound frame with identical text, once per sent message.

use std::collections::VecDeque;

use rc_core::config::EchoPolicy;
use rc_core::constants::MAX_PENDING_ECHOES;

#[derive(Debug)]
pub struct EchoFilter {
    policy: EchoPolicy,
    pending: VecDeque<String>,
}

impl EchoFilter {
    pub fn new(policy: EchoPolicy) -> Self {
        Self {
            policy,
            pending: VecDeque::new(),
        }
    }

    pub fn policy(&self) -> EchoPolicy {
        self.policy
    }

    /// Record a successfully sent text. Oldest texts fall off past the cap.
    pub fn remember(&mut self, text: &str) {
        if self.policy != EchoPolicy::SuppressOwn {
            return;
        }
        if self.pending.len() == MAX_PENDING_ECHOES {
            self.pending.pop_front();
        }
        self.pending.push_back(text.to_string());
    }

    /// Returns true if `text` is the echo of a remembered send, consuming it.
    pub fn absorb(&mut self, text: &str) -> bool {
        match self.pending.iter().position(|sent| sent == text) {
            Some(index) => {
                self.pending.remove(index);
                true
            }
            None => false,
        }
    }

    /// Forget every pending echo.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keep_all_never_absorbs() {
        let mut filter = EchoFilter::new(EchoPolicy::KeepAll);
        filter.remember("hello");
        assert_eq!(filter.pending_len(), 0);
        assert!(!filter.absorb("hello"));
    }

    #[test]
    fn test_suppress_own_absorbs_once_per_send() {
        let mut filter = EchoFilter::new(EchoPolicy::SuppressOwn);
        filter.remember("hello");
        filter.remember("hello");
        filter.remember("bye");

        assert!(filter.absorb("hello"));
        assert!(filter.absorb("hello"));
        assert!(!filter.absorb("hello"));
        assert!(!filter.absorb("other"));
        assert!(filter.absorb("bye"));
        assert_eq!(filter.pending_len(), 0);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut filter = EchoFilter::new(EchoPolicy::SuppressOwn);
        for i in 0..MAX_PENDING_ECHOES + 5 {
            filter.remember(&format!("m{i}"));
        }
        assert_eq!(filter.pending_len(), MAX_PENDING_ECHOES);
        // The five oldest were evicted.
        assert!(!filter.absorb("m0"));
        assert!(filter.absorb("m5"));
    }

    #[test]
    fn test_clear() {
        let mut filter = EchoFilter::new(EchoPolicy::SuppressOwn);
        filter.remember("a");
        filter.clear();
        assert!(!filter.absorb("a"));
    }
}
