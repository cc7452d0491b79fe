//! Per-session command processing with the energy gate.
//!
//! Each tick, a session's retry queue is put back in front of its newly read
//! bytes and the combined stream is dispatched packet by packet:
//!
//! ```text
//!  retry: [Walk 6]            inbound: [Keepalive][Walk 4][Wal
//!          ──────────────────────────────────────────────
//!  input:  [Walk 6][Keepalive][Walk 4][Wal
//!            │        │         │       └─ incomplete → back to inbound
//!            │        │         └─ blocked → retry (behind Walk 6)
//!            │        └─ free → runs
//!            └─ no energy → Deferred → retry, blocks consuming commands
//! ```
//!
//! Once a turn-consuming command is deferred, every later turn-consuming
//! command in the same pass is deferred behind it, so commands reach the
//! simulation in the order the client sent them.

use delve_protocol::{ClientPacket, PacketKind, PacketReader};
use delve_session::{DeferredCommand, SessionId, SessionState, SessionStore};
use tracing::{debug, trace};

use crate::{DispatchContext, Dispatcher, HandlerResult, Route, Simulation, lifecycle};

/// Counters for one session's pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub executed: usize,
    pub ignored: usize,
    pub deferred: usize,
    /// The session was destroyed during the pass.
    pub destroyed: bool,
}

impl<S: Simulation> Dispatcher<S> {
    /// Dispatches every complete packet waiting for `id`.
    ///
    /// Sessions outside `SETUP` and `PLAYING` are left untouched.
    pub fn process_pending_commands(
        &self,
        store: &mut SessionStore,
        sim: &mut S,
        id: SessionId,
        now: u64,
    ) -> ProcessOutcome {
        let mut outcome = ProcessOutcome::default();
        let Some(session) = store.get_mut(id) else {
            return outcome;
        };
        if self.table(session.state()).is_none() {
            return outcome;
        }

        let mut input = session.retry.drain_bytes();
        input.append(&mut session.inbound);

        let mut pos = 0;
        let mut blocked = false;
        while pos < input.len() {
            let Some(state) = store.get(id).map(|s| s.state()) else {
                outcome.destroyed = true;
                return outcome;
            };
            let Some(table) = self.table(state) else {
                break;
            };

            let start = pos;
            let tag = input[start];
            let Some(kind) = PacketKind::from_tag(tag) else {
                debug!(session = %id, tag, "unknown packet type");
                lifecycle::destroy(store, sim, id, "Unknown packet type");
                outcome.destroyed = true;
                return outcome;
            };
            let handler = match table.route(kind) {
                Route::Handle(handler) => handler,
                Route::Refuse => {
                    debug!(session = %id, %kind, %state, "packet refused");
                    let reason = format!("{kind} not allowed in {state}");
                    lifecycle::destroy(store, sim, id, &reason);
                    outcome.destroyed = true;
                    return outcome;
                }
            };

            let mut r = PacketReader::new(&input[start + 1..]);
            let packet = match ClientPacket::decode_body(kind, &mut r) {
                Ok(packet) => packet,
                Err(e) if e.is_incomplete() => break,
                Err(e) => {
                    debug!(session = %id, %kind, error = %e, "malformed packet");
                    let reason = format!("Malformed {kind} packet");
                    lifecycle::destroy(store, sim, id, &reason);
                    outcome.destroyed = true;
                    return outcome;
                }
            };
            let end = start + 1 + r.position();
            pos = end;

            let consuming = kind.turn_cost().is_consuming();
            if blocked && consuming {
                defer(store, id, &input[start..end]);
                outcome.deferred += 1;
                continue;
            }

            let mut ctx = DispatchContext {
                store: &mut *store,
                sim: &mut *sim,
                session: id,
                now,
                settings: &self.settings,
            };
            match handler(&mut ctx, packet) {
                HandlerResult::Executed => outcome.executed += 1,
                HandlerResult::Ignored => outcome.ignored += 1,
                HandlerResult::Deferred => {
                    trace!(session = %id, %kind, "deferred");
                    defer(store, id, &input[start..end]);
                    outcome.deferred += 1;
                    if consuming {
                        blocked = true;
                    }
                }
                HandlerResult::Error(reason) => {
                    lifecycle::destroy(store, sim, id, &reason);
                    outcome.destroyed = true;
                    return outcome;
                }
            }
        }

        match store.get_mut(id) {
            Some(session) if matches!(session.state(), SessionState::Setup | SessionState::Playing) => {
                session.inbound = input.split_off(pos);
            }
            Some(_) => {}
            None => outcome.destroyed = true,
        }
        outcome
    }
}

fn defer(store: &mut SessionStore, id: SessionId, packet: &[u8]) {
    if let (Some(session), Some(command)) = (store.get_mut(id), DeferredCommand::from_packet(packet)) {
        session.retry.push(command);
    }
}
