//! Per-tick socket I/O for established sessions.
//!
//! Input is drained until the socket would block. Output is accumulated in
//! each session's outbound buffer during the tick and written once, in the
//! output phase, terminated by an `End` marker. A write that is not taken
//! in full ends the session: there is no partial-write resume.

use delve_command::{Simulation, lifecycle};
use delve_protocol::ServerPacket;
use delve_session::{SessionId, SessionState, SessionStore};
use delve_transport::{Connection, ReadOutcome, WriteOutcome};
use tracing::{debug, trace};

const READ_CHUNK: usize = 4096;

enum ReadEnd {
    Drained,
    Closed(&'static str),
    Overflow,
}

/// Reads everything available for `id` into its inbound buffer.
///
/// Bytes waiting in the retry queue count against `max_inbound` too, so a
/// client cannot grow the queue by sending commands faster than its energy
/// allows. Overflow destroys the session here.
///
/// A peer close or read error is returned instead of handled, so the bytes
/// that arrived before it are still dispatched this tick. The caller then
/// passes the reason to [`lifecycle::do_quit`].
pub(crate) fn read_input<S: Simulation>(
    store: &mut SessionStore,
    sim: &mut S,
    id: SessionId,
    now: u64,
    max_inbound: usize,
) -> Option<&'static str> {
    let session = store.get_mut(id)?;
    let mut chunk = [0u8; READ_CHUNK];
    let mut received = 0;

    let end = loop {
        let held = session.inbound.len() + session.retry.byte_len();
        let Some(conn) = session.connection_mut() else {
            break ReadEnd::Drained;
        };
        match conn.read_nonblocking(&mut chunk) {
            Ok(ReadOutcome::Data(n)) => {
                received += n;
                if held + n > max_inbound {
                    break ReadEnd::Overflow;
                }
                session.inbound.extend_from_slice(&chunk[..n]);
            }
            Ok(ReadOutcome::WouldBlock) => break ReadEnd::Drained,
            Ok(ReadOutcome::Closed) => break ReadEnd::Closed("Client closed"),
            Err(e) => {
                debug!(session = %id, error = %e, "read failed");
                break ReadEnd::Closed("Read error");
            }
        }
    };

    if received > 0 {
        session.touch(now);
        trace!(session = %id, bytes = received, "input");
    }
    match end {
        ReadEnd::Drained => None,
        ReadEnd::Overflow => {
            lifecycle::destroy(store, sim, id, "Input overflow");
            None
        }
        ReadEnd::Closed(reason) => Some(reason),
    }
}

/// Writes the session's queued output in one operation.
///
/// Gameplay sessions get an `End` marker appended; consoles are raw text.
/// An empty buffer writes nothing.
pub(crate) fn flush_output<S: Simulation>(store: &mut SessionStore, sim: &mut S, id: SessionId) {
    let Some(session) = store.get_mut(id) else {
        return;
    };
    if session.outbound.is_empty() {
        return;
    }
    if session.is_detached() {
        session.outbound.clear();
        return;
    }
    if session.state() != SessionState::Console && session.send(&ServerPacket::End).is_err() {
        session.outbound.clear();
        return;
    }

    let bytes = std::mem::take(&mut session.outbound);
    let Some(conn) = session.connection_mut() else {
        return;
    };
    let failure = match conn.write_nonblocking(&bytes) {
        Ok(WriteOutcome::Written(n)) if n == bytes.len() => None,
        Ok(WriteOutcome::Written(n)) => Some(format!("short write {n}/{}", bytes.len())),
        Ok(WriteOutcome::WouldBlock) => Some("socket buffer full".to_owned()),
        Err(e) => Some(e.to_string()),
    };
    if let Some(detail) = failure {
        debug!(session = %id, detail = %detail, "write failed");
        lifecycle::destroy(store, sim, id, "Write error");
    }
}
