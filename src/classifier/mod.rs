//! Log-line classification into typed game events.
//!
//! An [`ActionSet`] holds an ordered list of regex bindings. Bindings are
//! tested most-recently-registered first, so specific patterns layered on
//! top of general ones win. At most one event fires per line; disabled
//! bindings are skipped but stay registered. Matching is pure, which keeps
//! the whole module testable with literal log lines.

use std::collections::HashMap;

use regex::{Captures, Regex};
use tracing::debug;

/// Timestamp/thread/logger prefix shared by every dedicated-server log line.
const LOG_PREFIX: &str = r"^\[\d\d:\d\d:\d\d\] \[Server thread/INFO\] \[net\.minecraft\.server\.dedicated\.DedicatedServer\]: ";

/// Correlation data for a chat message that replies to a platform message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyRef {
    /// Platform message id being replied to.
    pub message_id: u64,
    /// Whether the replied-to author should be pinged.
    pub ping: bool,
}

/// A typed domain event classified from one log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    /// A player spoke in chat, optionally replying to a platform message.
    PlayerChat {
        /// Player username.
        username: String,
        /// Chat text.
        message: String,
        /// Reply correlation, when the chat mod emitted one.
        reply: Option<ReplyRef>,
    },
    /// A player connected.
    PlayerJoined {
        /// Player username.
        username: String,
    },
    /// A player disconnected.
    PlayerLeft {
        /// Player username.
        username: String,
    },
    /// The server began booting.
    ServerStarting,
    /// The server finished booting.
    ServerStarted,
    /// The server began shutting down.
    ServerStopping,
    /// Response to a `list` query.
    PlayerList {
        /// Players currently online.
        current: u32,
        /// Server player cap.
        max: u32,
        /// Usernames currently online.
        names: Vec<String>,
    },
    /// A broadcast issued from the console (`say`).
    ConsoleBroadcast {
        /// Broadcast text.
        message: String,
    },
    /// A player earned an advancement.
    AdvancementEarned {
        /// Player username.
        username: String,
        /// Advancement display name.
        advancement: String,
    },
}

type Extract = fn(&Captures<'_>) -> Option<GameEvent>;

/// One (pattern, extractor, enabled) binding in the classification stack.
#[derive(Debug)]
pub struct ActionBinding {
    name: &'static str,
    pattern: Regex,
    extract: Extract,
    enabled: bool,
}

impl ActionBinding {
    fn new(name: &'static str, body: &str, extract: Extract) -> Self {
        let pattern = format!("{LOG_PREFIX}{body}");
        Self {
            name,
            // Built-in patterns only; never built from user input.
            pattern: Regex::new(&pattern).expect("built-in pattern must compile"),
            extract,
            enabled: true,
        }
    }

    /// Binding name, used for enable/disable toggles.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the binding currently participates in classification.
    pub fn enabled(&self) -> bool {
        self.enabled
    }
}

/// Ordered, runtime-toggleable set of log-line bindings.
///
/// Index 0 is the most recently registered binding and is tested first.
#[derive(Debug)]
pub struct ActionSet {
    bindings: Vec<ActionBinding>,
}

impl ActionSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }

    /// Build the default binding stack, seeding enabled flags from config.
    ///
    /// Bindings absent from `enabled` default to enabled. Unknown keys in
    /// the map are ignored.
    pub fn with_defaults(enabled: &HashMap<String, bool>) -> Self {
        let mut set = Self::new();

        // Registered general-first so the later, more specific bindings
        // are tested before them.
        set.register(ActionBinding::new(
            "console_broadcast",
            r"\[(?:Server|Rcon)\] (.+)$",
            extract_console_broadcast,
        ));
        set.register(ActionBinding::new(
            "advancement",
            r"(\w+) has made the advancement \[(.+)\]$",
            extract_advancement,
        ));
        set.register(ActionBinding::new(
            "player_list",
            r"There are (\d+) of a max of (\d+) players online:? ?(.*)$",
            extract_player_list,
        ));
        set.register(ActionBinding::new(
            "server_stopping",
            r"Stopping (?:the )?server$",
            |_| Some(GameEvent::ServerStopping),
        ));
        set.register(ActionBinding::new(
            "server_started",
            r#"Done \([0-9.]+s\)! For help, type "help""#,
            |_| Some(GameEvent::ServerStarted),
        ));
        set.register(ActionBinding::new(
            "server_starting",
            r"Starting minecraft server version .+$",
            |_| Some(GameEvent::ServerStarting),
        ));
        set.register(ActionBinding::new(
            "player_left",
            r"(\w+) left the game$",
            extract_player_left,
        ));
        set.register(ActionBinding::new(
            "player_joined",
            r"(\w+) joined the game$",
            extract_player_joined,
        ));
        set.register(ActionBinding::new(
            "player_chat",
            r"(?:\[.*?\] )?<(\w+)> (.+)$",
            extract_player_chat,
        ));
        set.register(ActionBinding::new(
            "player_chat_reply",
            r"\[reply:(\d+):(pingon|pingoff)\] <(\w+)> (.+)$",
            extract_player_chat_reply,
        ));

        for (name, flag) in enabled {
            if !flag {
                set.disable(name);
            }
        }

        set
    }

    /// Push a binding onto the top of the stack (tested first).
    pub fn register(&mut self, binding: ActionBinding) {
        self.bindings.insert(0, binding);
    }

    /// Classify one raw log line.
    ///
    /// Tests enabled bindings in stack order and stops at the first
    /// structural match; there is no fallthrough to later bindings.
    pub fn classify(&self, line: &str) -> Option<GameEvent> {
        for binding in &self.bindings {
            if !binding.enabled {
                continue;
            }
            if let Some(caps) = binding.pattern.captures(line) {
                debug!(binding = binding.name, "log line matched");
                return (binding.extract)(&caps);
            }
        }
        None
    }

    /// Enable a binding by name. Unknown names are a no-op.
    pub fn enable(&mut self, name: &str) {
        self.set_enabled(name, true);
    }

    /// Disable a binding by name. Unknown names are a no-op.
    pub fn disable(&mut self, name: &str) {
        self.set_enabled(name, false);
    }

    fn set_enabled(&mut self, name: &str, enabled: bool) {
        for binding in &mut self.bindings {
            if binding.name == name {
                binding.enabled = enabled;
                return;
            }
        }
    }

    /// Current enabled flag for a binding, if it exists.
    pub fn is_enabled(&self, name: &str) -> Option<bool> {
        self.bindings
            .iter()
            .find(|b| b.name == name)
            .map(|b| b.enabled)
    }

    /// Binding names in test order (most recently registered first).
    pub fn names(&self) -> Vec<&'static str> {
        self.bindings.iter().map(|b| b.name).collect()
    }
}

impl Default for ActionSet {
    fn default() -> Self {
        Self::with_defaults(&HashMap::new())
    }
}

fn extract_player_chat(caps: &Captures<'_>) -> Option<GameEvent> {
    Some(GameEvent::PlayerChat {
        username: caps.get(1)?.as_str().to_owned(),
        message: caps.get(2)?.as_str().to_owned(),
        reply: None,
    })
}

fn extract_player_chat_reply(caps: &Captures<'_>) -> Option<GameEvent> {
    Some(GameEvent::PlayerChat {
        username: caps.get(3)?.as_str().to_owned(),
        message: caps.get(4)?.as_str().to_owned(),
        reply: Some(ReplyRef {
            message_id: caps.get(1)?.as_str().parse().ok()?,
            ping: caps.get(2)?.as_str() == "pingon",
        }),
    })
}

fn extract_player_joined(caps: &Captures<'_>) -> Option<GameEvent> {
    Some(GameEvent::PlayerJoined {
        username: caps.get(1)?.as_str().to_owned(),
    })
}

fn extract_player_left(caps: &Captures<'_>) -> Option<GameEvent> {
    Some(GameEvent::PlayerLeft {
        username: caps.get(1)?.as_str().to_owned(),
    })
}

fn extract_player_list(caps: &Captures<'_>) -> Option<GameEvent> {
    let names = caps.get(3).map_or_else(Vec::new, |m| {
        m.as_str()
            .split(", ")
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect()
    });
    Some(GameEvent::PlayerList {
        current: caps.get(1)?.as_str().parse().ok()?,
        max: caps.get(2)?.as_str().parse().ok()?,
        names,
    })
}

fn extract_console_broadcast(caps: &Captures<'_>) -> Option<GameEvent> {
    Some(GameEvent::ConsoleBroadcast {
        message: caps.get(1)?.as_str().to_owned(),
    })
}

fn extract_advancement(caps: &Captures<'_>) -> Option<GameEvent> {
    Some(GameEvent::AdvancementEarned {
        username: caps.get(1)?.as_str().to_owned(),
        advancement: caps.get(2)?.as_str().to_owned(),
    })
}
