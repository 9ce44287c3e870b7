//! Intake service: validates form submissions and relays them to the ingest
//! server.
//!
//! The relay is fire-and-forget: a fresh TCP connection per message, one JSON
//! payload written, connection shut down, nothing read back. A successful
//! submit therefore only means the payload was handed to the ingest server's
//! socket, not that it was persisted.

pub mod routes;

use std::fmt;
use std::io;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::config::IntakeConfig;
use crate::message::SubmittedMessage;
use crate::wire::{self, WireError};

pub use routes::{router, AppState};

/// Error type for relaying a payload to the ingest server
#[derive(Debug)]
pub enum RelayError {
    Encode(WireError),
    Connect(io::Error),
    ConnectTimeout,
    Write(io::Error),
    WriteTimeout,
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::Encode(e) => write!(f, "Failed to encode payload: {}", e),
            RelayError::Connect(e) => write!(f, "Connection to ingest server failed: {}", e),
            RelayError::ConnectTimeout => write!(f, "Connection to ingest server timed out"),
            RelayError::Write(e) => write!(f, "Write to ingest server failed: {}", e),
            RelayError::WriteTimeout => write!(f, "Write to ingest server timed out"),
        }
    }
}

impl std::error::Error for RelayError {}

/// Error type for a form submission
#[derive(Debug)]
pub enum SubmitError {
    /// Username or message missing or empty
    InvalidInput,
    RelayUnavailable(RelayError),
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitError::InvalidInput => write!(f, "Invalid input"),
            SubmitError::RelayUnavailable(e) => write!(f, "Relay unavailable: {}", e),
        }
    }
}

impl std::error::Error for SubmitError {}

impl From<RelayError> for SubmitError {
    fn from(err: RelayError) -> Self {
        SubmitError::RelayUnavailable(err)
    }
}

/// One-shot TCP client for the ingest server
#[derive(Debug, Clone)]
pub struct RelayClient {
    addr: String,
    connect_timeout: Duration,
    write_timeout: Duration,
}

impl RelayClient {
    pub fn new(addr: impl Into<String>, connect_timeout: Duration, write_timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout,
            write_timeout,
        }
    }

    pub fn from_config(config: &IntakeConfig) -> Self {
        Self::new(
            config.ingest_addr.clone(),
            config.connect_timeout,
            config.write_timeout,
        )
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Open a connection, write the payload in full and close
    pub async fn send(&self, message: &SubmittedMessage) -> Result<(), RelayError> {
        let payload = wire::encode(message).map_err(RelayError::Encode)?;

        let mut stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(self.addr.as_str()))
            .await
            .map_err(|_| RelayError::ConnectTimeout)?
            .map_err(RelayError::Connect)?;

        tokio::time::timeout(self.write_timeout, async {
            stream.write_all(&payload).await?;
            stream.shutdown().await
        })
        .await
        .map_err(|_| RelayError::WriteTimeout)?
        .map_err(RelayError::Write)?;

        tracing::debug!("Relayed {} bytes to {}", payload.len(), self.addr);
        Ok(())
    }
}

/// Validating front for the relay
#[derive(Debug, Clone)]
pub struct IntakeService {
    relay: RelayClient,
}

impl IntakeService {
    pub fn new(relay: RelayClient) -> Self {
        Self { relay }
    }

    pub fn relay(&self) -> &RelayClient {
        &self.relay
    }

    /// Validate and relay one submission.
    ///
    /// Empty input never opens a connection.
    pub async fn submit(&self, username: &str, message: &str) -> Result<(), SubmitError> {
        let submitted = SubmittedMessage::new(username, message);
        if !submitted.is_valid() {
            return Err(SubmitError::InvalidInput);
        }

        self.relay.send(&submitted).await.map_err(|e| {
            tracing::error!("Socket error: {}", e);
            SubmitError::from(e)
        })
    }
}
