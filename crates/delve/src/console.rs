//! Operator console.
//!
//! A console is a plain-text, line-based session. The first line must be
//! the console password; after that each line is one command. Replies are
//! raw text lines with no packet framing.

use delve_command::{Simulation, chat, lifecycle};
use delve_session::{SessionId, SessionState, SessionStore};
use tracing::{info, warn};

const HELP: &[&str] = &[
    "Commands:",
    "  help          this list",
    "  who           list sessions",
    "  msg <text>    broadcast a message",
    "  kick <nick>   disconnect a player",
    "  listen        toggle chat echo",
    "  shutdown      stop the server",
];

/// Something the reactor must act on after a console pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConsoleEffect {
    None,
    Shutdown,
}

/// Runs every complete line waiting on console `id`.
pub(crate) fn process_console<S: Simulation>(
    store: &mut SessionStore,
    sim: &mut S,
    id: SessionId,
    password: Option<&str>,
) -> ConsoleEffect {
    let lines = match store.get_mut(id) {
        Some(session) if session.state() == SessionState::Console => take_lines(&mut session.inbound),
        _ => return ConsoleEffect::None,
    };

    let mut effect = ConsoleEffect::None;
    for line in lines {
        let Some(session) = store.get_mut(id) else {
            break;
        };
        if !session.console.authenticated {
            if password.is_some_and(|p| p == line) {
                session.console.authenticated = true;
                session.send_line("Authenticated");
                info!(session = %id, "console authenticated");
                continue;
            }
            warn!(session = %id, "console password rejected");
            lifecycle::destroy(store, sim, id, "Invalid password");
            break;
        }
        if run_command(store, sim, id, &line) == ConsoleEffect::Shutdown {
            effect = ConsoleEffect::Shutdown;
        }
    }
    effect
}

/// Splits off complete lines, leaving a trailing partial line in `inbound`.
fn take_lines(inbound: &mut Vec<u8>) -> Vec<String> {
    let Some(last_newline) = inbound.iter().rposition(|&b| b == b'\n') else {
        return Vec::new();
    };
    let rest = inbound.split_off(last_newline + 1);
    let complete = std::mem::replace(inbound, rest);
    String::from_utf8_lossy(&complete)
        .lines()
        .map(|l| l.trim().to_owned())
        .collect()
}

fn reply(store: &mut SessionStore, id: SessionId, line: &str) {
    if let Some(session) = store.get_mut(id) {
        session.send_line(line);
    }
}

fn run_command<S: Simulation>(
    store: &mut SessionStore,
    sim: &mut S,
    id: SessionId,
    line: &str,
) -> ConsoleEffect {
    let (command, arg) = line.split_once(' ').unwrap_or((line, ""));
    let arg = arg.trim();

    match command {
        "" => {}
        "help" => {
            for text in HELP {
                reply(store, id, text);
            }
        }
        "who" => {
            let rows: Vec<String> = store
                .iter()
                .filter(|s| s.state() != SessionState::Console)
                .map(|s| format!("{} {} {}", s.id(), s.nick(), s.state()))
                .collect();
            reply(store, id, &format!("{} player(s)", rows.len()));
            for row in rows {
                reply(store, id, &row);
            }
        }
        "msg" if !arg.is_empty() => {
            info!(session = %id, text = arg, "console broadcast");
            chat::broadcast(store, &chat::admin_line(arg));
            reply(store, id, "Message sent");
        }
        "kick" if !arg.is_empty() => match store.find_by_nick(arg) {
            Some(target) => {
                info!(session = %id, %target, nick = arg, "console kick");
                lifecycle::destroy(store, sim, target, "Kicked by server admin");
                reply(store, id, "Kicked player");
            }
            None => reply(store, id, "No such player"),
        },
        "listen" => {
            if let Some(session) = store.get_mut(id) {
                session.console.listening = !session.console.listening;
                let text = if session.console.listening {
                    "Listening on"
                } else {
                    "Listening off"
                };
                session.send_line(text);
            }
        }
        "shutdown" => {
            info!(session = %id, "console requested shutdown");
            reply(store, id, "Shutting down");
            return ConsoleEffect::Shutdown;
        }
        _ => reply(store, id, "Unknown command"),
    }
    ConsoleEffect::None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_lines_keeps_partial_tail() {
        let mut inbound = b"who\r\nmsg hi\nkic".to_vec();
        assert_eq!(take_lines(&mut inbound), vec!["who", "msg hi"]);
        assert_eq!(inbound, b"kic");
    }

    #[test]
    fn test_take_lines_without_newline_takes_nothing() {
        let mut inbound = b"secret".to_vec();
        assert!(take_lines(&mut inbound).is_empty());
        assert_eq!(inbound, b"secret");
    }
}
