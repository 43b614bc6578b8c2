//! Rendering chat-platform messages as in-game `tellraw` payloads.

use serde_json::json;

/// Render a relayed chat message as a `tellraw @a` console command.
///
/// The author segment carries an insertion of the author's platform mention
/// so shift-clicking it in-game starts a reply.
pub fn chat_relay(author: &str, author_id: u64, message: &str) -> String {
    let parts = json!([
        { "text": "[" },
        {
            "text": "Discord",
            "color": "blue",
            "bold": true,
            "hoverEvent": {
                "action": "show_text",
                "contents": { "text": "This message was sent from Discord!", "color": "light_purple" }
            }
        },
        { "text": "] " },
        {
            "text": author,
            "insertion": format!("<@{author_id}> "),
            "hoverEvent": {
                "action": "show_text",
                "contents": { "text": "Click to reply!", "color": "yellow" }
            }
        },
        { "text": format!(": {message}") },
    ]);
    format!("tellraw @a {parts}")
}
