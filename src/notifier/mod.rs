//! Delivery of classified events to the chat platform.
//!
//! The [`Notifier`] boundary is deliberately narrow: the classification loop
//! hands an event over and moves on. [`WebhookNotifier`] renders events as
//! webhook payloads (player messages impersonate the player, server events
//! become colored embeds) and posts them with `reqwest`. Delivery failures
//! are logged and dropped; they never stall tailing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::classifier::GameEvent;
use crate::config::WebhookConfig;

/// Consumer of classified events and operator notices.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one classified event.
    async fn notify(&self, event: &GameEvent);

    /// Deliver one operator-facing notice as a plain server message.
    async fn announce(&self, text: &str);
}

/// Fire-and-continue dispatch used by the classification loop.
///
/// Spawns the delivery so the caller never waits on the network.
pub fn dispatch(notifier: Arc<dyn Notifier>, event: GameEvent) {
    tokio::spawn(async move {
        notifier.notify(&event).await;
    });
}

#[derive(Debug, Serialize)]
struct WebhookPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    embeds: Vec<Embed>,
}

#[derive(Debug, Serialize)]
struct Embed {
    color: u32,
    description: String,
}

#[derive(Debug, Deserialize)]
struct UuidResponse {
    id: String,
}

/// Webhook-backed notifier.
pub struct WebhookNotifier {
    http: reqwest::Client,
    config: WebhookConfig,
    server_name: String,
    avatar_cache: Mutex<HashMap<String, String>>,
}

impl WebhookNotifier {
    /// Build a notifier posting to the configured webhook URL.
    pub fn new(config: WebhookConfig, server_name: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            server_name,
            avatar_cache: Mutex::new(HashMap::new()),
        }
    }

    async fn post(&self, payload: &WebhookPayload) {
        if self.config.url.is_empty() {
            debug!("webhook url not configured, dropping event");
            return;
        }
        match self.http.post(&self.config.url).json(payload).send().await {
            Ok(response) if !response.status().is_success() => {
                warn!(status = %response.status(), "webhook delivery rejected");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "webhook delivery failed"),
        }
    }

    async fn player_message(&self, username: &str, content: String, embeds: Vec<Embed>) {
        let avatar_url = self.avatar_for(username).await;
        self.post(&WebhookPayload {
            content: Some(content),
            username: Some(username.to_owned()),
            avatar_url,
            embeds,
        })
        .await;
    }

    async fn server_message(&self, content: Option<String>, embeds: Vec<Embed>) {
        self.post(&WebhookPayload {
            content,
            username: Some(self.server_name.clone()),
            avatar_url: None,
            embeds,
        })
        .await;
    }

    /// Resolve (and cache) a player's avatar URL. Failures resolve to `None`
    /// so the message still goes out, just without an avatar.
    async fn avatar_for(&self, username: &str) -> Option<String> {
        if let Some(cached) = self.avatar_cache.lock().await.get(username) {
            return Some(cached.clone());
        }

        let lookup = format!("{}{username}", self.config.uuid_lookup_url);
        let response = match self.http.get(&lookup).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                debug!(username, status = %r.status(), "uuid lookup miss");
                return None;
            }
            Err(e) => {
                debug!(username, error = %e, "uuid lookup failed");
                return None;
            }
        };

        let uuid: UuidResponse = match response.json().await {
            Ok(u) => u,
            Err(e) => {
                debug!(username, error = %e, "uuid response unparsable");
                return None;
            }
        };

        let avatar = format!(
            "{}{}.png?size=128&default=MHF_Steve",
            self.config.avatar_lookup_url, uuid.id
        );
        self.avatar_cache
            .lock()
            .await
            .insert(username.to_owned(), avatar.clone());
        Some(avatar)
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &GameEvent) {
        match event {
            GameEvent::PlayerChat {
                username,
                message,
                reply,
            } => {
                let embeds = reply
                    .as_ref()
                    .map(|r| {
                        vec![Embed {
                            color: 0x0000_00ff,
                            description: format!(
                                ":leftwards_arrow_with_hook: In reply to message {}",
                                r.message_id
                            ),
                        }]
                    })
                    .unwrap_or_default();
                self.player_message(username, message.clone(), embeds).await;
            }
            GameEvent::PlayerJoined { username } => {
                self.server_message(
                    None,
                    vec![Embed {
                        color: 0x0000_ff00,
                        description: format!(":inbox_tray: **{username}** joined the game."),
                    }],
                )
                .await;
            }
            GameEvent::PlayerLeft { username } => {
                self.server_message(
                    None,
                    vec![Embed {
                        color: 0x00ff_0000,
                        description: format!(":outbox_tray: **{username}** left the game."),
                    }],
                )
                .await;
            }
            GameEvent::ServerStarting => {
                self.server_message(
                    None,
                    vec![Embed {
                        color: 0x00cc_dd00,
                        description: ":yellow_circle: **The server is starting up...**".to_owned(),
                    }],
                )
                .await;
            }
            GameEvent::ServerStarted => {
                self.server_message(
                    None,
                    vec![Embed {
                        color: 0x0055_dd55,
                        description: ":green_circle: **The server has started.**".to_owned(),
                    }],
                )
                .await;
            }
            GameEvent::ServerStopping => {
                self.server_message(
                    None,
                    vec![Embed {
                        color: 0x00dd_5555,
                        description: ":red_circle: **The server has closed.**".to_owned(),
                    }],
                )
                .await;
            }
            GameEvent::PlayerList {
                current,
                max,
                names,
            } => {
                self.server_message(
                    None,
                    vec![Embed {
                        color: 0x00b8_00b5,
                        description: format!(
                            ":information_source: **There are {current}/{max} players online: {}**",
                            names.join(", ")
                        ),
                    }],
                )
                .await;
            }
            GameEvent::ConsoleBroadcast { message } => {
                self.post(&WebhookPayload {
                    content: Some(message.clone()),
                    username: Some("Console".to_owned()),
                    avatar_url: None,
                    embeds: Vec::new(),
                })
                .await;
            }
            GameEvent::AdvancementEarned {
                username,
                advancement,
            } => {
                self.server_message(
                    None,
                    vec![Embed {
                        color: 0x00cc_00cc,
                        description: format!(
                            ":medal: {username} has made the advancement {advancement}!"
                        ),
                    }],
                )
                .await;
            }
        }
    }

    async fn announce(&self, text: &str) {
        self.server_message(Some(text.to_owned()), Vec::new()).await;
    }
}
