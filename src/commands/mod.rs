//! Chat-platform administrative command surface.
//!
//! Thin adapter between the platform's command handlers and the core:
//! lifecycle commands go to the supervisor, game commands go over the
//! transport, event toggles mutate the shared action set. Every method
//! resolves to exactly one short human-readable status string; permission
//! gating happens on the platform side before any of these are reached.

pub mod tellraw;

use std::sync::Arc;

use regex::Regex;
use tokio::sync::Mutex;
use tracing::info;

use crate::classifier::ActionSet;
use crate::rcon::RconHandle;
use crate::supervisor::SupervisorHandle;

/// The administrative command surface.
pub struct CommandSurface {
    supervisor: SupervisorHandle,
    rcon: RconHandle,
    actions: Arc<Mutex<ActionSet>>,
    lockout: Mutex<Option<String>>,
}

impl CommandSurface {
    /// Build the surface over the process-wide supervisor, transport, and
    /// action set handles.
    pub fn new(
        supervisor: SupervisorHandle,
        rcon: RconHandle,
        actions: Arc<Mutex<ActionSet>>,
    ) -> Self {
        Self {
            supervisor,
            rcon,
            actions,
            lockout: Mutex::new(None),
        }
    }

    // ── lifecycle (supervisor-backed) ───────────────────────────

    /// Start the server.
    pub async fn startup(&self) -> String {
        self.supervisor.startup().await
    }

    /// Cleanly stop the server.
    pub async fn shutdown(&self) -> String {
        self.supervisor.shutdown().await
    }

    /// Cancel an active restart countdown.
    pub async fn cancel_restart(&self) -> String {
        self.supervisor.cancel_restart().await
    }

    /// Skip the next `count` scheduled restarts.
    pub async fn skip_restart(&self, count: u32) -> String {
        self.supervisor.skip_restart(count).await
    }

    /// Start (or replace) a restart countdown of `seconds`.
    pub async fn queue_restart(&self, seconds: u64) -> String {
        self.supervisor.queue_restart(seconds).await
    }

    /// Force the session online or offline.
    pub async fn set_state(&self, online: bool) -> String {
        self.supervisor.set_state(online).await
    }

    /// Clear the crash-loop lock.
    pub async fn unlock(&self) -> String {
        self.supervisor.unlock().await
    }

    /// Describe the daily restart schedule.
    pub async fn reboot_schedule(&self) -> String {
        self.supervisor.reboot_schedule().await
    }

    /// Describe the current session state.
    pub async fn status(&self) -> String {
        self.supervisor.status().await
    }

    // ── game commands (transport-backed) ────────────────────────

    /// Query the list of players currently online.
    pub async fn list_players(&self) -> String {
        match self.rcon.send("list").await {
            Ok(response) if response.is_empty() => "The server gave no response.".to_owned(),
            Ok(response) => response,
            Err(e) => format!("Failed to query the player list: {e}"),
        }
    }

    /// Add a player to the whitelist.
    pub async fn whitelist(&self, username: &str) -> String {
        if let Some(reason) = self.lockout.lock().await.as_ref() {
            return format!("Server is locked out: {reason}");
        }
        if username.is_empty()
            || !username
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return "Player name must be alphanumeric, but may include underscores.".to_owned();
        }
        match self.rcon.send(&format!("whitelist add {username}")).await {
            Ok(response) => response,
            Err(e) => format!("Failed to whitelist player: {e}"),
        }
    }

    /// Lock the server out: enable the whitelist, clear every player from
    /// it, and refuse further whitelist additions.
    pub async fn lockout(&self, reason: &str) -> String {
        if let Err(e) = self.rcon.send("whitelist on").await {
            return format!("Failed to lock out the server: {e}");
        }
        let listing = match self.rcon.send("whitelist list").await {
            Ok(response) => response,
            Err(e) => return format!("Failed to lock out the server: {e}"),
        };

        if !listing.starts_with("There are no whitelisted players") {
            for player in parse_whitelisted(&listing) {
                if let Err(e) = self.rcon.send(&format!("whitelist remove {player}")).await {
                    return format!("Failed to clear the whitelist: {e}");
                }
            }
        }

        info!(reason, "server locked out");
        *self.lockout.lock().await = Some(reason.to_owned());
        "Server has been locked out.".to_owned()
    }

    /// Release the lockout, optionally disabling the whitelist entirely.
    pub async fn cancel_lockout(&self, disable_whitelist: bool) -> String {
        if self.lockout.lock().await.is_none() {
            return "Server is not locked out.".to_owned();
        }

        let mut disabled = false;
        if disable_whitelist {
            match self.rcon.send("whitelist off").await {
                Ok(response) => disabled = response.ends_with("turned off"),
                Err(e) => return format!("Failed to unlock the server: {e}"),
            }
        }

        *self.lockout.lock().await = None;
        if disabled {
            "Server unlocked, whitelist disabled.".to_owned()
        } else {
            "Server unlocked.".to_owned()
        }
    }

    /// Run an arbitrary console command.
    pub async fn custom_command(&self, command: &str) -> String {
        match self.rcon.send(command).await {
            Ok(response) if response.is_empty() => {
                "Command executed successfully. Or not. There was no response.".to_owned()
            }
            Ok(response) => response,
            Err(e) => format!("Failed to send command to server: {e}"),
        }
    }

    /// Relay a chat-platform message into the game as a tellraw broadcast.
    pub async fn relay_chat(&self, author: &str, author_id: u64, message: &str) -> String {
        if !self.supervisor.is_running().await {
            return "Server is not running; message not delivered.".to_owned();
        }
        match self
            .rcon
            .send(&tellraw::chat_relay(author, author_id, message))
            .await
        {
            Ok(_) => "Delivered.".to_owned(),
            Err(e) => format!("Failed to relay message: {e}"),
        }
    }

    // ── event toggles ───────────────────────────────────────────

    /// Enable or disable a classification action by name.
    pub async fn set_action(&self, name: &str, enabled: bool) -> String {
        let mut actions = self.actions.lock().await;
        if actions.is_enabled(name).is_none() {
            return format!("Unknown action '{name}'.");
        }
        if enabled {
            actions.enable(name);
        } else {
            actions.disable(name);
        }
        format!(
            "Action '{name}' is now {}.",
            if enabled { "enabled" } else { "disabled" }
        )
    }

    /// Report the enabled state of one action.
    pub async fn action_status(&self, name: &str) -> String {
        match self.actions.lock().await.is_enabled(name) {
            Some(true) => format!("Action '{name}' is currently enabled."),
            Some(false) => format!("Action '{name}' is currently disabled."),
            None => format!("Unknown action '{name}'."),
        }
    }

    /// List every registered action in test order.
    pub async fn list_actions(&self) -> String {
        self.actions.lock().await.names().join("\n")
    }
}

/// Pull usernames out of a `whitelist list` response.
fn parse_whitelisted(listing: &str) -> Vec<String> {
    let Ok(pattern) = Regex::new(r"There are \d+ whitelisted players?: (.+)") else {
        return Vec::new();
    };
    pattern
        .captures(listing)
        .and_then(|caps| caps.get(1))
        .map(|names| {
            names
                .as_str()
                .split(", ")
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}
