//! Per-message ingest stages: parse → stamp → persist → journal.
//!
//! Each stage fails with its own [`IngestError`] variant so a sink outage is
//! distinguishable from a journal problem in the logs. The pipeline is
//! synchronous and runs on the blocking pool.

use chrono::NaiveDateTime;
use std::sync::{Arc, Mutex};

use super::{IngestError, IngestOutcome};
use crate::journal::BackupJournal;
use crate::message::StoredMessage;
use crate::sink::MessageSink;
use crate::wire;

pub struct IngestPipeline {
    sink: Arc<dyn MessageSink>,
    // Single writer for the read-modify-write journal cycle
    journal: Mutex<BackupJournal>,
}

impl IngestPipeline {
    pub fn new(sink: Arc<dyn MessageSink>, journal: BackupJournal) -> Self {
        Self {
            sink,
            journal: Mutex::new(journal),
        }
    }

    /// Process one received payload.
    ///
    /// An empty payload is skipped. The journal is only written after the
    /// sink accepted the record.
    pub fn process(
        &self,
        payload: &[u8],
        accepted_at: NaiveDateTime,
    ) -> Result<IngestOutcome, IngestError> {
        if payload.is_empty() {
            return Ok(IngestOutcome::Skipped);
        }

        let submitted = wire::decode(payload).map_err(IngestError::Malformed)?;
        let record = submitted.stamp(accepted_at);

        self.sink.insert(&record).map_err(IngestError::Sink)?;
        self.backup(&record)?;

        Ok(IngestOutcome::Stored(record))
    }

    fn backup(&self, record: &StoredMessage) -> Result<(), IngestError> {
        let journal = self
            .journal
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match journal.append(record) {
            Ok(count) => {
                tracing::debug!("Journal {} now holds {} records", journal.path().display(), count);
                Ok(())
            }
            Err(source) => Err(IngestError::Journal {
                record: record.clone(),
                source,
            }),
        }
    }
}
