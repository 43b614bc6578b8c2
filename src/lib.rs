//! Bridgekeeper — supervises a Minecraft-style game server and bridges it
//! to a chat platform.
//!
//! Single Rust binary. Tails the server log and forwards classified events
//! to a webhook; accepts administrative commands and relays them to the
//! server over RCON; keeps the server process alive, restarts it on a daily
//! schedule, and locks startup out when the server crash-loops.
//!
//! See `DESIGN.md` for full architecture documentation.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod classifier;
pub mod commands;
pub mod config;
pub mod launcher;
pub mod logging;
pub mod notifier;
pub mod rcon;
pub mod supervisor;
pub mod tail;
