//! Tests for `src/commands/mod.rs` over a fake console endpoint that
//! answers with canned server responses, plus a real supervisor actor
//! backed by mock process control.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use anyhow::Result;
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, Mutex};

use bridgekeeper::classifier::ActionSet;
use bridgekeeper::commands::CommandSurface;
use bridgekeeper::config::{RconConfig, ServerConfig};
use bridgekeeper::launcher::Launcher;
use bridgekeeper::rcon::RconHandle;
use bridgekeeper::supervisor::{self, ProcessProbe, SupervisorDeps};

/// Canned vanilla-style responses for the commands these tests issue.
fn respond(command: &str) -> String {
    match command {
        "whitelist on" => "Whitelist is now turned on".to_owned(),
        "whitelist off" => "Whitelist is now turned off".to_owned(),
        "whitelist list" => "There are 2 whitelisted players: alpha, beta".to_owned(),
        "list" => "There are 0 of a max of 20 players online:".to_owned(),
        cmd => {
            if let Some(name) = cmd.strip_prefix("whitelist add ") {
                format!("Added {name} to the whitelist")
            } else if let Some(name) = cmd.strip_prefix("whitelist remove ") {
                format!("Removed {name} from the whitelist")
            } else {
                String::new()
            }
        }
    }
}

struct FakeConsole {
    addr: SocketAddr,
    commands: Arc<StdMutex<Vec<String>>>,
}

impl FakeConsole {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake console");
        let addr = listener.local_addr().expect("local addr");
        let commands = Arc::new(StdMutex::new(Vec::new()));

        let log = Arc::clone(&commands);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                serve(stream, Arc::clone(&log)).await;
            }
        });

        Self { addr, commands }
    }

    fn config(&self) -> RconConfig {
        RconConfig {
            host: "127.0.0.1".to_owned(),
            port: self.addr.port(),
            password: String::new(),
        }
    }

    fn commands_seen(&self) -> Vec<String> {
        self.commands.lock().expect("command log").clone()
    }
}

async fn serve(mut stream: TcpStream, log: Arc<StdMutex<Vec<String>>>) {
    // Accept any password.
    let Some((id, _)) = read_frame(&mut stream).await else {
        return;
    };
    write_frame(&mut stream, id, 2, "").await;

    while let Some((id, command)) = read_frame(&mut stream).await {
        log.lock().expect("command log").push(command.clone());
        write_frame(&mut stream, id, 0, &respond(&command)).await;
    }
}

async fn read_frame(stream: &mut TcpStream) -> Option<(i32, String)> {
    let frame_len = stream.read_i32_le().await.ok()?;
    let id = stream.read_i32_le().await.ok()?;
    let _ptype = stream.read_i32_le().await.ok()?;

    let body_len = usize::try_from(frame_len).ok()?.saturating_sub(10);
    let mut body = vec![0_u8; body_len];
    stream.read_exact(&mut body).await.ok()?;
    let mut terminator = [0_u8; 2];
    stream.read_exact(&mut terminator).await.ok()?;

    Some((id, String::from_utf8_lossy(&body).into_owned()))
}

async fn write_frame(stream: &mut TcpStream, id: i32, ptype: i32, body: &str) {
    let frame_len = i32::try_from(body.len().saturating_add(10)).expect("frame length fits");
    let mut buf = Vec::new();
    buf.extend_from_slice(&frame_len.to_le_bytes());
    buf.extend_from_slice(&id.to_le_bytes());
    buf.extend_from_slice(&ptype.to_le_bytes());
    buf.extend_from_slice(body.as_bytes());
    buf.extend_from_slice(&[0, 0]);
    let _ = stream.write_all(&buf).await;
}

struct NullLauncher;

#[async_trait]
impl Launcher for NullLauncher {
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }
}

struct FlagProbe {
    alive: Arc<AtomicBool>,
}

#[async_trait]
impl ProcessProbe for FlagProbe {
    async fn is_alive(&self) -> Result<bool> {
        Ok(self.alive.load(Ordering::SeqCst))
    }
}

/// Build a surface over a fake console and a supervisor seeded with the
/// given liveness.
async fn surface(running: bool) -> (CommandSurface, FakeConsole, watch::Sender<bool>) {
    let console = FakeConsole::start().await;
    let rcon = RconHandle::spawn(console.config());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (notice_tx, _notice_rx) = mpsc::channel(64);
    let supervisor = supervisor::spawn(
        SupervisorDeps {
            server: ServerConfig {
                auto_restart: false,
                ..ServerConfig::default()
            },
            launcher: Arc::new(NullLauncher),
            probe: Arc::new(FlagProbe {
                alive: Arc::new(AtomicBool::new(running)),
            }),
            rcon: rcon.clone(),
            notices: notice_tx,
        },
        running,
        shutdown_rx,
    )
    .expect("default schedule is valid");

    let actions = Arc::new(Mutex::new(ActionSet::default()));
    (
        CommandSurface::new(supervisor, rcon, actions),
        console,
        shutdown_tx,
    )
}

#[tokio::test]
async fn whitelist_rejects_invalid_usernames_without_touching_the_server() {
    let (surface, console, _shutdown) = surface(true).await;

    let reply = surface.whitelist("bad name!").await;
    assert_eq!(
        reply,
        "Player name must be alphanumeric, but may include underscores."
    );
    assert_eq!(surface.whitelist("").await, reply);
    assert!(console.commands_seen().is_empty());

    assert_eq!(
        surface.whitelist("Steve_1").await,
        "Added Steve_1 to the whitelist"
    );
}

#[tokio::test]
async fn lockout_clears_the_whitelist_and_blocks_additions() {
    let (surface, console, _shutdown) = surface(true).await;

    assert_eq!(
        surface.lockout("maintenance").await,
        "Server has been locked out."
    );
    assert_eq!(
        console.commands_seen(),
        vec![
            "whitelist on",
            "whitelist list",
            "whitelist remove alpha",
            "whitelist remove beta",
        ]
    );

    assert_eq!(
        surface.whitelist("Steve").await,
        "Server is locked out: maintenance"
    );

    assert_eq!(
        surface.cancel_lockout(true).await,
        "Server unlocked, whitelist disabled."
    );
    assert_eq!(
        surface.whitelist("Steve").await,
        "Added Steve to the whitelist"
    );
    assert_eq!(
        surface.cancel_lockout(false).await,
        "Server is not locked out."
    );
}

#[tokio::test]
async fn chat_relay_requires_a_running_server() {
    let (surface, console, _shutdown) = surface(false).await;

    assert_eq!(
        surface.relay_chat("Friend", 42, "hello world").await,
        "Server is not running; message not delivered."
    );
    assert!(console.commands_seen().is_empty());

    surface.set_state(true).await;
    assert_eq!(
        surface.relay_chat("Friend", 42, "hello world").await,
        "Delivered."
    );
    let commands = console.commands_seen();
    assert_eq!(commands.len(), 1);
    assert!(commands[0].starts_with("tellraw @a"), "{}", commands[0]);
}

#[tokio::test]
async fn silent_console_commands_get_a_placeholder_reply() {
    let (surface, _console, _shutdown) = surface(true).await;
    assert_eq!(
        surface.custom_command("time set day").await,
        "Command executed successfully. Or not. There was no response."
    );
}

#[tokio::test]
async fn action_toggles_report_and_mutate_state() {
    let (surface, _console, _shutdown) = surface(true).await;

    assert_eq!(
        surface.action_status("player_joined").await,
        "Action 'player_joined' is currently enabled."
    );
    assert_eq!(
        surface.set_action("player_joined", false).await,
        "Action 'player_joined' is now disabled."
    );
    assert_eq!(
        surface.action_status("player_joined").await,
        "Action 'player_joined' is currently disabled."
    );
    assert_eq!(
        surface.set_action("no_such_action", true).await,
        "Unknown action 'no_such_action'."
    );
    assert!(surface.list_actions().await.contains("player_chat"));
}
