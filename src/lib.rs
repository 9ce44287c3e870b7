//! # msgrelay: Message Intake and Ingest Pipeline
//!
//! Short messages submitted through a web form are relayed over a private TCP
//! channel to an ingest process, which stamps each one with server time and
//! records it durably.
//!
//! ```text
//! browser form → intake (HTTP POST) → TCP → ingest → sink + backup journal
//! ```
//!
//! ## Components
//!
//! - **Intake** ([`intake`]): axum endpoint that validates `username` and
//!   `message` and relays them as one JSON payload per TCP connection
//! - **Ingest** ([`ingest`]): sequential TCP server that parses, stamps and
//!   persists each payload
//! - **Sink** ([`sink`]): append-only store behind the [`MessageSink`] trait
//!   (Diesel database or in-memory)
//! - **Journal** ([`journal`]): local JSON array file mirroring every
//!   persisted record
//!
//! Delivery is fire-and-forget: the intake learns whether the relay write
//! succeeded, never whether the record was persisted.

pub mod config;
pub mod ingest;
pub mod intake;
pub mod journal;
pub mod message;
pub mod sink;
pub mod wire;

// Re-export key types
pub use config::{ConfigError, IngestConfig, IntakeConfig, RelayConfig};
pub use ingest::{IngestError, IngestOutcome, IngestPipeline, IngestServer};
pub use intake::{IntakeService, RelayClient, RelayError, SubmitError};
pub use journal::{BackupJournal, JournalError};
pub use message::{MessageClock, StoredMessage, SubmittedMessage, TIMESTAMP_FORMAT};
pub use sink::{Database, DatabaseConfig, MemorySink, MessageSink, SinkError};
pub use wire::WireError;
