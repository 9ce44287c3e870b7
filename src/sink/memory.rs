//! In-process sink

use super::{MessageSink, SinkError};
use crate::message::StoredMessage;
use std::sync::{Arc, Mutex};

/// Sink holding records in memory.
///
/// Clones share the same storage, so a test can keep one handle and give
/// another to the ingest server.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<StoredMessage>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all inserted records, in insertion order
    pub fn records(&self) -> Vec<StoredMessage> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MessageSink for MemorySink {
    fn insert(&self, record: &StoredMessage) -> Result<(), SinkError> {
        let mut records = self
            .records
            .lock()
            .map_err(|e| SinkError::Unavailable(e.to_string()))?;
        records.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_storage() {
        let sink = MemorySink::new();
        let handle = sink.clone();

        sink.insert(&StoredMessage {
            date: "2024-01-01 00:00:00.000000".to_string(),
            username: "alice".to_string(),
            message: "hi".to_string(),
        })
        .unwrap();

        assert_eq!(handle.len(), 1);
        assert_eq!(handle.records()[0].username, "alice");
    }
}
