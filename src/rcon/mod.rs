//! FIFO command transport over the server's remote-console endpoint.
//!
//! A single worker task owns the TCP connection; callers talk to it through
//! a cloneable [`RconHandle`]. Concurrent `send` calls are serialized in
//! submission order, so exactly one command is ever in flight on the
//! stateful protocol connection.
//!
//! The connection is opened lazily on first use. When a send fails the
//! worker discards the stale connection, reconnects once, and retries that
//! single command; if the retry fails too, both errors are surfaced to the
//! caller as one failure.

mod codec;

use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::config::RconConfig;

/// Errors surfaced by the command transport.
#[derive(Debug, thiserror::Error)]
pub enum RconError {
    /// Network or protocol-level I/O failure.
    #[error("rcon i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// The server rejected the configured password.
    #[error("rcon authentication rejected")]
    AuthRejected,
    /// The worker task is gone; no further commands can be delivered.
    #[error("rcon transport is shut down")]
    TransportClosed,
    /// A send failed and so did the single reconnect retry.
    #[error("command failed: {first}; while retrying after reconnect: {second}")]
    RetryFailed {
        /// Error from the original attempt.
        first: String,
        /// Error from the post-reconnect retry.
        second: String,
    },
}

/// One queued command awaiting its single terminal resolution.
struct PendingCommand {
    command: String,
    reply: oneshot::Sender<Result<String, RconError>>,
}

enum Request {
    Exec(PendingCommand),
    Close,
}

/// Cheaply cloneable handle to the transport worker.
///
/// One worker exists per process; every collaborator receives a clone of
/// the same handle rather than opening a competing connection.
#[derive(Clone)]
pub struct RconHandle {
    tx: mpsc::Sender<Request>,
}

impl RconHandle {
    /// Spawn the transport worker and return a handle to it.
    ///
    /// No connection is opened until the first [`send`](Self::send).
    pub fn spawn(config: RconConfig) -> Self {
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(run_worker(config, rx));
        Self { tx }
    }

    /// Execute one command and wait for its response.
    ///
    /// Safe to call concurrently; commands run strictly in submission order.
    ///
    /// # Errors
    ///
    /// Returns [`RconError::TransportClosed`] when the worker is gone, or
    /// the terminal error of the command itself.
    pub async fn send(&self, command: &str) -> Result<String, RconError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Request::Exec(PendingCommand {
                command: command.to_owned(),
                reply: reply_tx,
            }))
            .await
            .map_err(|_| RconError::TransportClosed)?;
        reply_rx.await.map_err(|_| RconError::TransportClosed)?
    }

    /// Tear down the current connection. A later `send` reconnects
    /// transparently.
    pub async fn close(&self) {
        let _ = self.tx.send(Request::Close).await;
    }
}

async fn run_worker(config: RconConfig, mut rx: mpsc::Receiver<Request>) {
    let mut conn: Option<RconConnection> = None;

    while let Some(request) = rx.recv().await {
        match request {
            Request::Close => {
                conn = None;
                debug!("rcon connection dropped on request");
            }
            Request::Exec(pending) => {
                let result = execute(&config, &mut conn, &pending.command).await;
                // Caller may have given up waiting; nothing to do then.
                let _ = pending.reply.send(result);
            }
        }
    }

    debug!("rcon worker exiting, all handles dropped");
}

/// Run one command with the reconnect-once retry policy.
async fn execute(
    config: &RconConfig,
    conn: &mut Option<RconConnection>,
    command: &str,
) -> Result<String, RconError> {
    let first = match attempt(config, conn, command).await {
        Ok(response) => return Ok(response),
        Err(e) => e,
    };

    *conn = None;
    warn!(error = %first, "rcon send failed, reconnecting once");

    match attempt(config, conn, command).await {
        Ok(response) => Ok(response),
        Err(second) => {
            *conn = None;
            Err(RconError::RetryFailed {
                first: first.to_string(),
                second: second.to_string(),
            })
        }
    }
}

/// Single attempt: connect lazily if needed, then execute.
async fn attempt(
    config: &RconConfig,
    conn: &mut Option<RconConnection>,
    command: &str,
) -> Result<String, RconError> {
    if conn.is_none() {
        let established =
            RconConnection::connect(&config.host, config.port, &config.password).await?;
        *conn = Some(established);
    }

    match conn.as_mut() {
        Some(c) => c.exec(command).await,
        None => Err(RconError::Io(std::io::Error::new(
            std::io::ErrorKind::NotConnected,
            "rcon connection unavailable",
        ))),
    }
}

/// An authenticated protocol connection.
struct RconConnection {
    stream: TcpStream,
    id_counter: i32,
}

impl RconConnection {
    /// Open a TCP connection and authenticate.
    async fn connect(host: &str, port: u16, password: &str) -> Result<Self, RconError> {
        let stream = TcpStream::connect((host, port)).await?;
        let mut conn = Self {
            stream,
            id_counter: 0,
        };

        let id = conn.next_id();
        codec::write_packet(&mut conn.stream, id, codec::TYPE_AUTH, password).await?;
        let reply = codec::read_packet(&mut conn.stream).await?;
        // Auth failure is signalled by a response id of -1.
        if reply.id == -1 {
            return Err(RconError::AuthRejected);
        }

        debug!(host, port, "rcon connected and authenticated");
        Ok(conn)
    }

    fn next_id(&mut self) -> i32 {
        self.id_counter = self.id_counter.wrapping_add(1);
        self.id_counter
    }

    /// Execute one command and read its response.
    async fn exec(&mut self, command: &str) -> Result<String, RconError> {
        let id = self.next_id();
        codec::write_packet(&mut self.stream, id, codec::TYPE_EXEC, command).await?;
        let reply = codec::read_packet(&mut self.stream).await?;
        Ok(reply.body)
    }
}
