//! Process launcher boundary.
//!
//! The supervisor only needs "issue start" and "issue stop"; how the server
//! process actually comes up is opaque behind [`Launcher`]. The real
//! implementation types commands into the server's tmux console pane.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;

use crate::config::ServerConfig;

/// Opaque start/stop control over the supervised process.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Issue the launch command. Returns once the command is issued, not
    /// once the server is up.
    async fn start(&self) -> Result<()>;

    /// Issue the clean-shutdown command.
    async fn stop(&self) -> Result<()>;
}

/// Launcher that types into the server's tmux console pane.
#[derive(Debug, Clone)]
pub struct TmuxLauncher {
    session: String,
    start_command: String,
    stop_command: String,
}

impl TmuxLauncher {
    /// Build a launcher targeting the configured tmux session.
    pub fn new(server: &ServerConfig) -> Self {
        Self {
            session: server.tmux_session.clone(),
            start_command: server.start_command.clone(),
            stop_command: server.stop_command.clone(),
        }
    }

    /// Send one line of keystrokes into the console pane.
    async fn send_keys(&self, text: &str) -> Result<()> {
        let status = Command::new("tmux")
            .args(["send-keys", "-t", &self.session, text, "Enter"])
            .status()
            .await
            .context("failed to spawn tmux")?;

        if !status.success() {
            bail!("tmux send-keys exited with {status}");
        }
        Ok(())
    }
}

#[async_trait]
impl Launcher for TmuxLauncher {
    async fn start(&self) -> Result<()> {
        info!(session = %self.session, "issuing server start command");
        self.send_keys(&self.start_command).await
    }

    async fn stop(&self) -> Result<()> {
        info!(session = %self.session, "issuing server stop command");
        self.send_keys(&self.stop_command).await
    }
}
