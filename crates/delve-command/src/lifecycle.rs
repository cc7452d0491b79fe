//! Session teardown: destroy, graceful quit, and the timeout reaper.
//!
//! Every path that ends a session funnels through [`destroy`], so the
//! entity bindings and the simulation's entity table stay in step.

use delve_protocol::ServerPacket;
use delve_session::{Session, SessionId, SessionState, SessionStore};
use delve_transport::Connection;
use tracing::{debug, info};

use crate::Simulation;

/// Reason used by the reaper.
pub const REASON_TIMEOUT: &str = "Timeout";

/// Writes whatever is queued plus a final `Quit(reason)`, without waiting.
///
/// Consoles get the reason as a text line instead.
fn farewell(session: &mut Session, reason: &str) {
    if session.is_detached() {
        return;
    }
    match session.state() {
        SessionState::Console => session.send_line(reason),
        _ => {
            let quit = ServerPacket::Quit {
                reason: reason.to_owned(),
            };
            if session.send(&quit).is_ok() {
                let _ = session.send(&ServerPacket::End);
            }
        }
    }
    let bytes = std::mem::take(&mut session.outbound);
    if let Some(conn) = session.connection_mut() {
        // Best effort: the connection closes right after either way.
        let _ = conn.write_nonblocking(&bytes);
    }
}

/// Ends a session now and frees its slot.
///
/// Returns `false` if `id` was not live.
pub fn destroy<S: Simulation>(
    store: &mut SessionStore,
    sim: &mut S,
    id: SessionId,
    reason: &str,
) -> bool {
    let Some(session) = store.get_mut(id) else {
        return false;
    };
    farewell(session, reason);
    info!(
        session = %id,
        nick = %session.nick(),
        state = %session.state(),
        reason,
        "goodbye"
    );

    if let Some(entity) = store.release(id) {
        if let Some(moved) = sim.detach_entity(entity) {
            let owner = store.relocate_entity(moved, entity);
            debug!(from = %moved, to = %entity, ?owner, "entity relocated");
        }
    }
    true
}

/// Handles a client-initiated quit or a lost peer.
///
/// The connection is closed in every case. A playing entity outside a safe
/// location stays in the world, in `QUIT`, for `quit_timeout` ticks.
pub fn do_quit<S: Simulation>(
    store: &mut SessionStore,
    sim: &mut S,
    id: SessionId,
    now: u64,
    quit_timeout: u64,
    reason: &str,
) {
    let Some(state) = store.get(id).map(Session::state) else {
        return;
    };
    match state {
        SessionState::Playing => {
            let safe = store
                .entity_for_session(id)
                .is_none_or(|entity| sim.entity_is_in_safe_location(entity));
            if safe {
                destroy(store, sim, id, reason);
                return;
            }
            if let Some(session) = store.get_mut(id) {
                farewell(session, reason);
            }
            if store.begin_quit(id, reason, now, quit_timeout).is_err() {
                destroy(store, sim, id, reason);
            }
        }
        SessionState::Quit => {
            if let Some(session) = store.get_mut(id) {
                session.detach();
            }
        }
        SessionState::Setup | SessionState::Console | SessionState::Free => {
            destroy(store, sim, id, reason);
        }
    }
}

/// Destroys every session idle past its state's limit. Returns how many.
pub fn reap<S: Simulation>(store: &mut SessionStore, sim: &mut S, now: u64) -> usize {
    let expired = store.timed_out(now);
    for &id in &expired {
        destroy(store, sim, id, REASON_TIMEOUT);
    }
    expired.len()
}

/// Destroys every live session with the same reason.
pub fn destroy_all<S: Simulation>(store: &mut SessionStore, sim: &mut S, reason: &str) {
    for id in store.ids() {
        destroy(store, sim, id, reason);
    }
}
