//! Configuration loading and management.
//!
//! Loads bridge configuration from `./bridgekeeper.toml` (or
//! `$BRIDGEKEEPER_CONFIG_PATH`). Environment variables override file values;
//! file values override defaults.
//!
//! Precedence: env vars > config file > defaults.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{FixedOffset, NaiveTime};
use serde::Deserialize;

/// Top-level bridge configuration loaded from TOML.
///
/// Path: `./bridgekeeper.toml` or `$BRIDGEKEEPER_CONFIG_PATH`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Supervised server settings (`[server]`).
    pub server: ServerConfig,
    /// Remote-console endpoint settings (`[rcon]`).
    pub rcon: RconConfig,
    /// Server log tailing settings (`[log]`).
    pub log: LogConfig,
    /// Chat-platform webhook settings (`[webhook]`).
    pub webhook: WebhookConfig,
    /// Per-event enabled flags, keyed by binding name (`[actions]`).
    ///
    /// Bindings absent from the map stay enabled.
    pub actions: HashMap<String, bool>,
}

impl BridgeConfig {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// Config file path: `$BRIDGEKEEPER_CONFIG_PATH` or `./bridgekeeper.toml`.
    /// A missing file is not an error; defaults apply.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from TOML file only, no env overrides.
    fn load_from_file() -> Result<Self> {
        let path = Self::config_path_with(|key| std::env::var(key).ok());
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                let config: BridgeConfig =
                    toml::from_str(&contents).context("failed to parse config TOML")?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("no config file found, using defaults");
                Ok(BridgeConfig::default())
            }
            Err(e) => Err(anyhow::anyhow!("failed to read config file: {e}")),
        }
    }

    /// Resolve config path using a custom env resolver (for testing).
    fn config_path_with(env: impl Fn(&str) -> Option<String>) -> PathBuf {
        if let Some(p) = env("BRIDGEKEEPER_CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("bridgekeeper.toml")
    }

    /// Apply environment variable overrides (env > config > defaults).
    ///
    /// Takes a resolver function for testability.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("BRIDGEKEEPER_RCON_HOST") {
            self.rcon.host = v;
        }
        if let Some(v) = env("BRIDGEKEEPER_RCON_PORT") {
            match v.parse() {
                Ok(port) => self.rcon.port = port,
                Err(_) => tracing::warn!(
                    var = "BRIDGEKEEPER_RCON_PORT",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
        if let Some(v) = env("BRIDGEKEEPER_RCON_PASSWORD") {
            self.rcon.password = v;
        }
        if let Some(v) = env("BRIDGEKEEPER_LOG_PATH") {
            self.log.path = PathBuf::from(v);
        }
        if let Some(v) = env("BRIDGEKEEPER_WEBHOOK_URL") {
            self.webhook.url = v;
        }
        if let Some(v) = env("BRIDGEKEEPER_TMUX_SESSION") {
            self.server.tmux_session = v;
        }
    }
}

/// Settings for the supervised game-server process (`[server]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Display name used in chat-facing messages.
    pub name: String,
    /// Shell command typed into the console pane to launch the server.
    pub start_command: String,
    /// Console command that asks the server to shut down cleanly.
    pub stop_command: String,
    /// Substring looked for in the process table to confirm liveness.
    pub process_signature: String,
    /// tmux session that holds the server console pane.
    pub tmux_session: String,
    /// Daily restart time of day, `HH:MM`.
    pub restart_time: String,
    /// Timezone of `restart_time` as a UTC offset, e.g. `+02:00`.
    pub utc_offset: String,
    /// Countdown length in seconds once the daily trigger fires.
    pub restart_delay_secs: u64,
    /// Rolling window within which repeated crashes count toward lockout.
    pub crash_window_secs: u64,
    /// Consecutive crashes within the window that trigger the lockout.
    pub crash_threshold: u32,
    /// Interval between liveness probes of the process table.
    pub liveness_interval_secs: u64,
    /// Grace period between stop and start during a scheduled restart.
    pub shutdown_grace_secs: u64,
    /// Whether the daily restart trigger is armed at all.
    pub auto_restart: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "Minecraft Server".to_owned(),
            start_command: "java -jar server.jar nogui".to_owned(),
            stop_command: "stop".to_owned(),
            process_signature: "java".to_owned(),
            tmux_session: "minecraft".to_owned(),
            restart_time: "04:00".to_owned(),
            utc_offset: "+00:00".to_owned(),
            restart_delay_secs: 300,
            crash_window_secs: 300,
            crash_threshold: 5,
            liveness_interval_secs: 5,
            shutdown_grace_secs: 120,
            auto_restart: true,
        }
    }
}

impl ServerConfig {
    /// Compile `restart_time` into a daily cron schedule.
    ///
    /// # Errors
    ///
    /// Returns an error when `restart_time` is not a valid `HH:MM` time.
    pub fn restart_schedule(&self) -> Result<cron::Schedule> {
        let time = NaiveTime::parse_from_str(&self.restart_time, "%H:%M")
            .with_context(|| format!("invalid restart_time '{}'", self.restart_time))?;
        let expr = format!(
            "0 {} {} * * *",
            chrono::Timelike::minute(&time),
            chrono::Timelike::hour(&time)
        );
        cron::Schedule::from_str(&expr).context("failed to build restart cron schedule")
    }

    /// Parse `utc_offset` into a fixed timezone offset.
    ///
    /// # Errors
    ///
    /// Returns an error when `utc_offset` is not of the form `+HH:MM`.
    pub fn timezone(&self) -> Result<FixedOffset> {
        self.utc_offset
            .parse::<FixedOffset>()
            .map_err(|e| anyhow::anyhow!("invalid utc_offset '{}': {e}", self.utc_offset))
    }
}

/// Remote-console endpoint settings (`[rcon]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RconConfig {
    /// RCON host.
    pub host: String,
    /// RCON port.
    pub port: u16,
    /// RCON password.
    pub password: String,
}

impl Default for RconConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 25575,
            password: String::new(),
        }
    }
}

/// Server log tailing settings (`[log]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Absolute path of the server's append-only log file.
    pub path: PathBuf,
    /// Delay between poll cycles when no new data is available.
    pub poll_delay_ms: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("latest.log"),
            poll_delay_ms: 20,
        }
    }
}

/// Chat-platform webhook settings (`[webhook]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Webhook URL events are delivered to. Empty disables delivery.
    pub url: String,
    /// Base URL for player avatar images, keyed by UUID.
    pub avatar_lookup_url: String,
    /// Base URL for username-to-UUID resolution.
    pub uuid_lookup_url: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            avatar_lookup_url: "https://crafatar.com/avatars/".to_owned(),
            uuid_lookup_url: "https://api.mojang.com/users/profiles/minecraft/".to_owned(),
        }
    }
}
