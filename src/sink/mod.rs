//! Persistence sink: the durable store every ingested message is appended to.
//!
//! The ingest server only ever inserts; records are never read back. The
//! Diesel-backed [`Database`] is the production sink, [`MemorySink`] keeps
//! records in process for tests and local runs.

pub mod database;
pub mod memory;

use crate::message::StoredMessage;
use std::fmt;

pub use database::{Database, DatabaseConfig, Pool, PooledConnection, MESSAGES_TABLE};
pub use memory::MemorySink;

/// Error type for sink operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    Pool(String),
    Query(String),
    Unavailable(String),
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::Pool(msg) => write!(f, "Sink pool error: {}", msg),
            SinkError::Query(msg) => write!(f, "Sink query error: {}", msg),
            SinkError::Unavailable(msg) => write!(f, "Sink unavailable: {}", msg),
        }
    }
}

impl std::error::Error for SinkError {}

impl From<r2d2::Error> for SinkError {
    fn from(err: r2d2::Error) -> Self {
        SinkError::Pool(err.to_string())
    }
}

impl From<diesel::result::Error> for SinkError {
    fn from(err: diesel::result::Error) -> Self {
        SinkError::Query(err.to_string())
    }
}

/// Append-only store for stored messages
pub trait MessageSink: Send + Sync {
    /// Insert one record. Any sink-assigned identifier stays inside the sink.
    fn insert(&self, record: &StoredMessage) -> Result<(), SinkError>;
}
