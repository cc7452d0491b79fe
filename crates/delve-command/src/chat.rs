//! Chat broadcast.

use delve_protocol::ServerPacket;
use delve_session::{SessionState, SessionStore};

/// Sends `text` to every playing session and every listening console.
///
/// Returns the number of recipients.
pub fn broadcast(store: &mut SessionStore, text: &str) -> usize {
    let packet = ServerPacket::Message {
        text: text.to_owned(),
    };
    let mut sent = 0;
    for session in store.iter_mut() {
        match session.state() {
            SessionState::Playing => {
                if session.send(&packet).is_ok() {
                    sent += 1;
                }
            }
            SessionState::Console if session.console.authenticated && session.console.listening => {
                session.send_line(text);
                sent += 1;
            }
            _ => {}
        }
    }
    tracing::debug!(recipients = sent, "chat broadcast");
    sent
}

/// Formats a player's chat line.
pub fn player_line(nick: &str, text: &str) -> String {
    format!("{nick}: {text}")
}

/// Formats an operator announcement.
pub fn admin_line(text: &str) -> String {
    format!("[Server Admin] {text}")
}
