//! Ingest server: receives relayed messages over TCP and persists them.
//!
//! Connections are handled strictly one at a time: accept, read one payload,
//! parse, persist to the sink, append to the backup journal, close. Nothing is
//! sent back to the sender. Every failure is logged per stage and the loop
//! moves on to the next connection.

pub mod pipeline;

use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::Instrument;
use uuid::Uuid;

use crate::config::IngestConfig;
use crate::journal::{BackupJournal, JournalError};
use crate::message::{MessageClock, StoredMessage};
use crate::sink::{MessageSink, SinkError};
use crate::wire::{self, WireError};

pub use pipeline::IngestPipeline;

/// Successful result of handling one connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The sender closed without writing anything
    Skipped,
    Stored(StoredMessage),
}

/// Per-stage ingest failure
#[derive(Debug)]
pub enum IngestError {
    Read(io::Error),
    Timeout,
    Malformed(WireError),
    Sink(SinkError),
    /// The record reached the sink but the backup journal write failed
    Journal {
        record: StoredMessage,
        source: JournalError,
    },
    Task(String),
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::Read(e) => write!(f, "Read failed: {}", e),
            IngestError::Timeout => write!(f, "Sender sent no data before the read timeout"),
            IngestError::Malformed(e) => write!(f, "{}", e),
            IngestError::Sink(e) => write!(f, "{}", e),
            IngestError::Journal { record, source } => {
                write!(f, "Record dated {} persisted but not journaled: {}", record.date, source)
            }
            IngestError::Task(msg) => write!(f, "Ingest task failed: {}", msg),
        }
    }
}

impl std::error::Error for IngestError {}

/// Sequential TCP ingest server
pub struct IngestServer {
    listener: TcpListener,
    pipeline: Arc<IngestPipeline>,
    clock: MessageClock,
    read_timeout: Duration,
    max_payload: usize,
}

impl IngestServer {
    /// Bind the listening socket and prepare the pipeline
    pub async fn bind(config: &IngestConfig, sink: Arc<dyn MessageSink>) -> io::Result<Self> {
        let listener = TcpListener::bind(&config.bind).await?;
        let journal = BackupJournal::new(&config.journal_path);

        tracing::info!("Ingest server listening on {}", listener.local_addr()?);
        tracing::info!("Backup journal at {}", journal.path().display());

        Ok(Self {
            listener,
            pipeline: Arc::new(IngestPipeline::new(sink, journal)),
            clock: MessageClock::new(),
            read_timeout: config.read_timeout,
            max_payload: config.max_payload,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the accept loop forever
    pub async fn serve(self) -> io::Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Run the accept loop until `shutdown` resolves.
    ///
    /// A connection already being handled is finished before shutdown is
    /// observed.
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Ingest server shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => self.handle_connection(stream, peer).await,
                        Err(e) => {
                            // EMFILE and friends; back off instead of spinning
                            tracing::error!("Accept failed: {}", e);
                            tokio::time::sleep(Duration::from_millis(100)).await;
                        }
                    }
                }
            }
        }
    }

    async fn handle_connection(&self, mut stream: TcpStream, peer: SocketAddr) {
        let connection_id = Uuid::new_v4();
        let span = tracing::info_span!("ingest", %connection_id, %peer);

        async {
            let result = self.ingest(&mut stream).await;
            report(&result);
        }
        .instrument(span)
        .await;
    }

    async fn ingest(&self, stream: &mut TcpStream) -> Result<IngestOutcome, IngestError> {
        let accepted_at = self.clock.now();
        let payload = read_payload(stream, self.max_payload, self.read_timeout).await?;

        let pipeline = Arc::clone(&self.pipeline);
        tokio::task::spawn_blocking(move || pipeline.process(&payload, accepted_at))
            .await
            .map_err(|e| IngestError::Task(e.to_string()))?
    }
}

/// Read one payload from a relay connection.
///
/// Reads until the sender closes, a complete JSON value has arrived, or the
/// timeout expires. More than `max_payload` bytes is rejected. A complete value
/// that is not a valid message is returned as-is for the decoder to reject.
pub async fn read_payload<R>(
    reader: &mut R,
    max_payload: usize,
    timeout: Duration,
) -> Result<Vec<u8>, IngestError>
where
    R: AsyncRead + Unpin,
{
    let deadline = tokio::time::Instant::now() + timeout;
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    loop {
        match tokio::time::timeout_at(deadline, reader.read(&mut chunk)).await {
            Err(_) if buf.is_empty() => return Err(IngestError::Timeout),
            // Partial data; let the decoder decide
            Err(_) => break,
            Ok(Err(e)) => return Err(IngestError::Read(e)),
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => {
                if buf.len() + n > max_payload {
                    return Err(IngestError::Malformed(WireError::TooLarge { limit: max_payload }));
                }
                buf.extend_from_slice(&chunk[..n]);
                if wire::is_complete(&buf) {
                    break;
                }
            }
        }
    }

    Ok(buf)
}

fn report(result: &Result<IngestOutcome, IngestError>) {
    match result {
        Ok(IngestOutcome::Skipped) => tracing::debug!("Empty payload, connection skipped"),
        Ok(IngestOutcome::Stored(record)) => {
            tracing::info!(date = %record.date, "Saved message");
            tracing::debug!(?record, "Saved record");
        }
        Err(e @ (IngestError::Read(_) | IngestError::Timeout)) => {
            tracing::warn!("Dropped connection: {}", e)
        }
        Err(e @ IngestError::Malformed(_)) => {
            tracing::warn!("Dropped malformed payload: {}", e)
        }
        Err(e @ IngestError::Sink(_)) => {
            tracing::error!("Failed to persist message, message lost: {}", e)
        }
        Err(e @ IngestError::Journal { .. }) => {
            tracing::error!("Backup journal write failed: {}", e)
        }
        Err(e @ IngestError::Task(_)) => tracing::error!("{}", e),
    }
}
