//! Output phase: per-session screen rows.

use delve_protocol::ServerPacket;
use delve_session::{SessionState, SessionStore};

use crate::{ScreenView, Simulation, lifecycle};

/// Asks the simulation for each playing session's changed rows and queues
/// them as `LineInfo` packets in the session's pinned RLE mode.
///
/// A row that cannot be encoded in that mode destroys the session.
pub fn render_screens<S: Simulation>(store: &mut SessionStore, sim: &mut S) {
    let mut failed = Vec::new();

    for id in store.ids() {
        let Some(entity) = store.entity_for_session(id) else {
            continue;
        };
        let Some(session) = store.get(id) else {
            continue;
        };
        if session.state() != SessionState::Playing || session.is_detached() {
            continue;
        }
        let Some(screen) = session.screen else {
            continue;
        };
        let view = ScreenView {
            visuals: session.visuals(),
            cols: screen.cols,
            rows: screen.rows,
            full_redraw: session.redraw_pending,
        };
        let lines = sim.screen_updates(entity, &view);

        let Some(session) = store.get_mut(id) else {
            continue;
        };
        session.redraw_pending = false;
        for line in lines {
            let packet = ServerPacket::LineInfo {
                row: line.row,
                cells: line.cells,
            };
            if let Err(e) = session.send(&packet) {
                tracing::warn!(session = %id, error = %e, "screen row rejected");
                failed.push(id);
                break;
            }
        }
    }

    for id in failed {
        lifecycle::destroy(store, sim, id, "Screen encode failed");
    }
}
