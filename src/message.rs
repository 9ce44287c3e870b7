//! Message types flowing through the relay.
//!
//! A [`SubmittedMessage`] is what the intake receives from a form and relays;
//! a [`StoredMessage`] is the same message stamped by the ingest server.

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Server timestamp format: `YYYY-MM-DD HH:MM:SS.ffffff`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Message as submitted through the intake form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedMessage {
    pub username: String,
    pub message: String,
}

impl SubmittedMessage {
    pub fn new(username: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            message: message.into(),
        }
    }

    /// Both fields must be non-empty before the message is relayed
    pub fn is_valid(&self) -> bool {
        !self.username.is_empty() && !self.message.is_empty()
    }

    /// Stamp the message with a server-generated timestamp
    pub fn stamp(self, at: NaiveDateTime) -> StoredMessage {
        StoredMessage {
            date: at.format(TIMESTAMP_FORMAT).to_string(),
            username: self.username,
            message: self.message,
        }
    }
}

/// Persisted form of a message. Field order matches the journal layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub date: String,
    pub username: String,
    pub message: String,
}

/// Source of ingest timestamps.
///
/// Reads the local server clock but never hands out a value earlier than the
/// previous one, so sequentially ingested records keep non-decreasing dates
/// even if the wall clock steps backwards.
#[derive(Debug, Default)]
pub struct MessageClock {
    last: Mutex<Option<NaiveDateTime>>,
}

impl MessageClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> NaiveDateTime {
        self.observe(Local::now().naive_local())
    }

    /// Clamp a raw clock reading against the last issued timestamp
    pub fn observe(&self, reading: NaiveDateTime) -> NaiveDateTime {
        let mut last = self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let issued = match *last {
            Some(prev) if prev > reading => prev,
            _ => reading,
        };
        *last = Some(issued);
        issued
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32, micro: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_micro_opt(h, m, s, micro)
            .unwrap()
    }

    #[test]
    fn test_stamp_formats_microseconds() {
        let stored = SubmittedMessage::new("alice", "hi").stamp(at(7, 5, 3, 42));

        assert_eq!(stored.date, "2024-03-09 07:05:03.000042");
        assert_eq!(stored.username, "alice");
        assert_eq!(stored.message, "hi");
    }

    #[test]
    fn test_is_valid_requires_both_fields() {
        assert!(SubmittedMessage::new("alice", "hi").is_valid());
        assert!(!SubmittedMessage::new("", "hi").is_valid());
        assert!(!SubmittedMessage::new("alice", "").is_valid());
    }

    #[test]
    fn test_clock_never_goes_backwards() {
        let clock = MessageClock::new();

        assert_eq!(clock.observe(at(10, 0, 0, 5)), at(10, 0, 0, 5));
        assert_eq!(clock.observe(at(9, 59, 59, 0)), at(10, 0, 0, 5));
        assert_eq!(clock.observe(at(10, 0, 1, 0)), at(10, 0, 1, 0));
    }

    #[test]
    fn test_stored_message_json_field_order() {
        let stored = SubmittedMessage::new("bob", "yo").stamp(at(1, 2, 3, 4));
        let json = serde_json::to_string(&stored).unwrap();

        assert_eq!(
            json,
            r#"{"date":"2024-03-09 01:02:03.000004","username":"bob","message":"yo"}"#
        );
    }
}
