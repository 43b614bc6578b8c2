#![allow(missing_docs)]

//! Bridgekeeper binary: wires the supervisor, log tail, classifier,
//! transport, and notifier together and runs them until interrupted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::AsyncBufReadExt;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{info, warn};

use bridgekeeper::classifier::ActionSet;
use bridgekeeper::commands::CommandSurface;
use bridgekeeper::config::{BridgeConfig, LogConfig};
use bridgekeeper::launcher::{Launcher, TmuxLauncher};
use bridgekeeper::notifier::{self, Notifier, WebhookNotifier};
use bridgekeeper::rcon::RconHandle;
use bridgekeeper::supervisor::{self, ProcessProbe, SupervisorDeps, TmuxProcessProbe};
use bridgekeeper::logging;
use bridgekeeper::tail::{LogTail, TailRead};

#[derive(Parser)]
#[command(name = "bridgekeeper", version, about)]
struct Cli {
    /// Path to the configuration file (default: ./bridgekeeper.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run the bridge.
    Start {
        /// Directory for bridgekeeper's own rotated log files.
        #[arg(long, default_value = "logs")]
        logs_dir: PathBuf,
    },
    /// Validate the configuration and exit.
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if let Some(path) = &cli.config {
        std::env::set_var("BRIDGEKEEPER_CONFIG_PATH", path);
    }

    match cli.command {
        Cmd::CheckConfig => {
            logging::init_cli();
            let config = BridgeConfig::load().context("failed to load configuration")?;
            config.server.restart_schedule()?;
            config.server.timezone()?;
            println!("configuration ok");
            Ok(())
        }
        Cmd::Start { logs_dir } => run(logs_dir).await,
    }
}

async fn run(logs_dir: PathBuf) -> Result<()> {
    let config = BridgeConfig::load().context("failed to load configuration")?;
    let _logging_guard = logging::init_production(&logs_dir)?;
    info!("bridgekeeper starting");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Exactly one transport worker per process; everything else clones
    // this handle.
    let rcon = RconHandle::spawn(config.rcon.clone());
    let launcher: Arc<dyn Launcher> = Arc::new(TmuxLauncher::new(&config.server));
    let probe: Arc<dyn ProcessProbe> = Arc::new(TmuxProcessProbe::new(
        config.server.tmux_session.clone(),
        config.server.process_signature.clone(),
    ));

    // Liveness is re-derived from the OS, not from any persisted state.
    let initially_running = match probe.is_alive().await {
        Ok(alive) => alive,
        Err(e) => {
            warn!(error = %e, "initial probe failed, assuming offline");
            false
        }
    };
    info!(initially_running, "initial liveness inferred");

    let (notice_tx, notice_rx) = mpsc::channel(64);
    let supervisor = supervisor::spawn(
        SupervisorDeps {
            server: config.server.clone(),
            launcher,
            probe,
            rcon: rcon.clone(),
            notices: notice_tx,
        },
        initially_running,
        shutdown_rx.clone(),
    )?;

    let actions = Arc::new(Mutex::new(ActionSet::with_defaults(&config.actions)));
    let notifier: Arc<dyn Notifier> = Arc::new(WebhookNotifier::new(
        config.webhook.clone(),
        config.server.name.clone(),
    ));

    let tail_task = tokio::spawn(run_tail(
        config.log.clone(),
        Arc::clone(&actions),
        Arc::clone(&notifier),
        shutdown_rx.clone(),
    ));
    let notice_task = tokio::spawn(run_notices(notice_rx, Arc::clone(&notifier)));

    let surface = Arc::new(CommandSurface::new(supervisor, rcon.clone(), actions));
    let console_task = tokio::spawn(run_console(Arc::clone(&surface), shutdown_rx));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
    rcon.close().await;

    let _ = tail_task.await;
    let _ = notice_task.await;
    // stdin reads cannot be interrupted portably; drop the console task.
    console_task.abort();

    info!("bridgekeeper stopped");
    Ok(())
}

/// Tail the server log, classify each line, and hand events to the notifier.
async fn run_tail(
    config: LogConfig,
    actions: Arc<Mutex<ActionSet>>,
    notifier: Arc<dyn Notifier>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut log = LogTail::new(config.path.clone());
    let delay = Duration::from_millis(config.poll_delay_ms.max(1));
    info!(path = %config.path.display(), "log tailing started");

    loop {
        tokio::select! {
            read = log.next_read() => match read {
                TailRead::Line(line) => {
                    if let Some(event) = actions.lock().await.classify(&line) {
                        notifier::dispatch(Arc::clone(&notifier), event);
                    }
                }
                TailRead::Idle => tokio::time::sleep(delay).await,
            },
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
    info!("log tailing stopped");
}

/// Forward supervisor notices to the chat platform.
async fn run_notices(mut notices: mpsc::Receiver<String>, notifier: Arc<dyn Notifier>) {
    while let Some(text) = notices.recv().await {
        notifier.announce(&text).await;
    }
}

/// Minimal operator console on stdin, mirroring the chat-platform command
/// surface for local administration.
async fn run_console(surface: Arc<CommandSurface>, mut shutdown_rx: watch::Receiver<bool>) {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let response = handle_console_line(&surface, line.trim()).await;
                    if !response.is_empty() {
                        println!("{response}");
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "console read failed");
                    break;
                }
            },
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}

async fn handle_console_line(surface: &CommandSurface, line: &str) -> String {
    let mut parts = line.splitn(2, ' ');
    let verb = parts.next().unwrap_or_default();
    let rest = parts.next().unwrap_or_default().trim();

    match verb {
        "" => String::new(),
        "startup" => surface.startup().await,
        "shutdown" => surface.shutdown().await,
        "cancel-restart" => surface.cancel_restart().await,
        "skip-restart" => match rest.parse() {
            Ok(count) => surface.skip_restart(count).await,
            Err(_) => "Usage: skip-restart <count>".to_owned(),
        },
        "queue-restart" => match rest.parse() {
            Ok(seconds) => surface.queue_restart(seconds).await,
            Err(_) => "Usage: queue-restart <seconds>".to_owned(),
        },
        "set-state" => match rest {
            "online" => surface.set_state(true).await,
            "offline" => surface.set_state(false).await,
            _ => "Usage: set-state <online|offline>".to_owned(),
        },
        "unlock" => surface.unlock().await,
        "reboot-schedule" => surface.reboot_schedule().await,
        "status" => surface.status().await,
        "list" => surface.list_players().await,
        "whitelist" => surface.whitelist(rest).await,
        "lockout" => surface.lockout(rest).await,
        "cancel-lockout" => surface.cancel_lockout(rest == "disable-whitelist").await,
        "actions" => surface.list_actions().await,
        "enable-action" => surface.set_action(rest, true).await,
        "disable-action" => surface.set_action(rest, false).await,
        "say" => surface.relay_chat("Operator", 0, rest).await,
        "cmd" => surface.custom_command(rest).await,
        other => format!("Unknown command '{other}'."),
    }
}
