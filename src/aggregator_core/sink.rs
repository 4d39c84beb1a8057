//! Rollup sink backends
//!
//! The aggregation loop hands completed rollups to a `RollupSink`. Two
//! backends are provided: an append-only JSONL file for the standalone
//! agent, and a channel sink for embedding the aggregator in a larger
//! process (or in tests).

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::payload::StatsPayload;

#[derive(Debug)]
pub enum SinkError {
    Io(std::io::Error),
    Serialization(serde_json::Error),
    Channel(String),
}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        SinkError::Io(err)
    }
}

impl From<serde_json::Error> for SinkError {
    fn from(err: serde_json::Error) -> Self {
        SinkError::Serialization(err)
    }
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::Io(e) => write!(f, "IO error: {}", e),
            SinkError::Serialization(e) => write!(f, "Serialization error: {}", e),
            SinkError::Channel(e) => write!(f, "Channel error: {}", e),
        }
    }
}

impl std::error::Error for SinkError {}

/// Downstream consumer of completed rollups.
#[async_trait]
pub trait RollupSink: Send {
    /// Deliver one rollup. Called inline from the aggregation worker, so a
    /// slow sink delays flushing but never corrupts window state.
    async fn emit(&mut self, payload: StatsPayload) -> Result<(), SinkError>;

    /// Flush pending deliveries.
    async fn flush(&mut self) -> Result<(), SinkError>;

    /// Backend name for logging.
    fn sink_type(&self) -> &'static str;
}

/// Appends one JSON line per rollup to a file.
pub struct JsonlRollupSink {
    writer: BufWriter<std::fs::File>,
    path: PathBuf,
    last_flush: Instant,
}

impl JsonlRollupSink {
    pub fn new(path: PathBuf) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        log::info!("writing rollups to: {}", path.display());
        Ok(Self {
            writer: BufWriter::new(file),
            path,
            last_flush: Instant::now(),
        })
    }

    fn write_line(&mut self, payload: &StatsPayload) -> Result<(), SinkError> {
        let line = serde_json::to_string(payload)?;
        writeln!(self.writer, "{}", line)?;

        // flush at most every 5 seconds
        if self.last_flush.elapsed() > Duration::from_secs(5) {
            self.writer.flush()?;
            self.last_flush = Instant::now();
        }
        Ok(())
    }
}

impl Drop for JsonlRollupSink {
    fn drop(&mut self) {
        if let Err(e) = self.writer.flush() {
            log::error!("failed to flush rollups to {}: {}", self.path.display(), e);
        }
    }
}

#[async_trait]
impl RollupSink for JsonlRollupSink {
    async fn emit(&mut self, payload: StatsPayload) -> Result<(), SinkError> {
        self.write_line(&payload)
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        self.last_flush = Instant::now();
        Ok(())
    }

    fn sink_type(&self) -> &'static str {
        "JSONL"
    }
}

/// Hands rollups to an in-process consumer over a channel.
pub struct ChannelRollupSink {
    tx: mpsc::Sender<StatsPayload>,
}

impl ChannelRollupSink {
    pub fn new(tx: mpsc::Sender<StatsPayload>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl RollupSink for ChannelRollupSink {
    async fn emit(&mut self, payload: StatsPayload) -> Result<(), SinkError> {
        self.tx
            .send(payload)
            .await
            .map_err(|_| SinkError::Channel("rollup channel closed".to_string()))
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    fn sink_type(&self) -> &'static str {
        "channel"
    }
}
