//! Tail reader for the JSONL client-payload stream
//!
//! The transport collaborator appends one JSON client payload per line; this
//! reader follows the file (rotation-aware) and hands parsed payloads to the
//! aggregator. Unparseable lines are logged and skipped, the same isolation
//! policy the aggregator applies to corrupt summary entries.

use std::io::SeekFrom;
use std::path::PathBuf;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::time::sleep;

#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

use crate::payload::ClientStatsPayload;

pub struct PayloadTailReader {
    path: PathBuf,
    file: Option<BufReader<File>>,
    inode: Option<u64>,
    poll_interval: Duration,
    parse_failures: u64,
}

impl PayloadTailReader {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            file: None,
            inode: None,
            poll_interval: Duration::from_millis(100),
            parse_failures: 0,
        }
    }

    /// Open the stream and seek to its end; only payloads appended after
    /// this point are read.
    pub async fn start(&mut self) -> std::io::Result<()> {
        let file = File::open(&self.path).await?;

        #[cfg(unix)]
        {
            let metadata = file.metadata().await?;
            self.inode = Some(metadata.ino());
        }

        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::End(0)).await?;
        self.file = Some(reader);

        log::info!("tailing client payload stream: {}", self.path.display());
        Ok(())
    }

    /// Next parseable client payload, waiting for new lines as needed.
    pub async fn next_payload(&mut self) -> std::io::Result<ClientStatsPayload> {
        loop {
            let line = self.next_line().await?;
            match serde_json::from_str::<ClientStatsPayload>(&line) {
                Ok(payload) => return Ok(payload),
                Err(e) => {
                    self.parse_failures += 1;
                    log::warn!(
                        "skipping unparseable payload line ({} so far): {}",
                        self.parse_failures,
                        e
                    );
                }
            }
        }
    }

    pub fn parse_failures(&self) -> u64 {
        self.parse_failures
    }

    async fn next_line(&mut self) -> std::io::Result<String> {
        loop {
            if self.detect_rotation().await? {
                log::info!("input stream rotated, reopening: {}", self.path.display());
                self.start().await?;
            }

            let reader = self.file.as_mut().ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::NotFound, "stream not opened")
            })?;

            let mut line = String::new();
            if reader.read_line(&mut line).await? == 0 {
                // nothing new yet
                sleep(self.poll_interval).await;
                continue;
            }
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                return Ok(trimmed.to_string());
            }
        }
    }

    /// The file was rotated if the path now points at a different inode.
    async fn detect_rotation(&self) -> std::io::Result<bool> {
        #[cfg(unix)]
        {
            let metadata = tokio::fs::metadata(&self.path).await?;
            Ok(self.inode.map_or(false, |old| old != metadata.ino()))
        }

        #[cfg(not(unix))]
        {
            Ok(false)
        }
    }
}
