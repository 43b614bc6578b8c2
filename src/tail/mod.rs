//! Incremental tailing of the server's append-only log file.
//!
//! The log is rotated out from under us by the server on every boot, so the
//! reader watches the file size between polls: a shrink (or the path going
//! missing) means rotation, and the file is reopened seeked to its current
//! end. Lines appended in the gap between the last successful read and the
//! reopen are lost; that at-most-once-ish behavior is a documented property
//! of the rotation contract, not a bug.

use std::io::SeekFrom;
use std::path::PathBuf;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tracing::{debug, info, warn};

/// Result of one poll cycle against the log file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailRead {
    /// A complete line (trailing newline stripped).
    Line(String),
    /// No new data; the caller should sleep its poll delay and retry.
    Idle,
}

/// Tailing cursor over the server log file.
///
/// Owns the file handle exclusively. Never returns an error to the caller:
/// all I/O failures degrade to [`TailRead::Idle`] and the handle is retried
/// on the next cycle.
#[derive(Debug)]
pub struct LogTail {
    path: PathBuf,
    reader: Option<BufReader<File>>,
    last_size: u64,
}

impl LogTail {
    /// Create a tail cursor for `path`. The file is opened lazily on the
    /// first poll and may not exist yet.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            reader: None,
            last_size: 0,
        }
    }

    /// Perform one poll cycle: deliver the next appended line, or report
    /// that the caller should back off.
    pub async fn next_read(&mut self) -> TailRead {
        if self.reader.is_none() && !self.open_at_end().await {
            return TailRead::Idle;
        }

        loop {
            let Some(reader) = self.reader.as_mut() else {
                return TailRead::Idle;
            };

            let mut line = String::new();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    // End of file. Either nothing new was appended, or the
                    // file was rotated and this handle is stale.
                    if self.rotation_occurred().await {
                        info!(path = %self.path.display(), "log rotated, reopening");
                        self.reader = None;
                        self.open_at_end().await;
                    }
                    return TailRead::Idle;
                }
                Ok(_) => {
                    let trimmed = line.trim_end_matches(['\n', '\r']);
                    if trimmed.is_empty() {
                        // Blank line, keep draining.
                        continue;
                    }
                    return TailRead::Line(trimmed.to_owned());
                }
                Err(e) => {
                    warn!(error = %e, "log read failed, dropping handle");
                    self.reader = None;
                    return TailRead::Idle;
                }
            }
        }
    }

    /// Open the file and seek to its end. Returns `false` when the file does
    /// not exist (or cannot be opened) yet.
    async fn open_at_end(&mut self) -> bool {
        let mut file = match File::open(&self.path).await {
            Ok(f) => f,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "log not openable yet");
                return false;
            }
        };

        let end = match file.seek(SeekFrom::End(0)).await {
            Ok(pos) => pos,
            Err(e) => {
                warn!(error = %e, "failed to seek log to end");
                return false;
            }
        };

        info!(path = %self.path.display(), position = end, "log opened");
        self.last_size = end;
        self.reader = Some(BufReader::new(file));
        true
    }

    /// Compare the on-disk size with the last observed size. A shrink or a
    /// missing file means the handle no longer points at the live log.
    async fn rotation_occurred(&mut self) -> bool {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) => {
                let current = meta.len();
                let shrunk = current < self.last_size;
                self.last_size = current;
                shrunk
            }
            Err(_) => {
                info!(path = %self.path.display(), "log file missing, reopen required");
                true
            }
        }
    }
}
