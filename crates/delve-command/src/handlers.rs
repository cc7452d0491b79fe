//! Packet handlers referenced by the dispatch tables.
//!
//! Each handler receives an already decoded packet of the kind its table
//! slot names. Anything else is a bug in the table, reported as an error
//! so the session dies instead of the reactor.

use delve_protocol::{ClientPacket, ServerPacket, StatusCode};
use delve_session::{ScreenSetup, SessionState};
use tracing::{debug, info};

use crate::{DispatchContext, Execution, HandlerResult, Simulation, chat, lifecycle};

fn unexpected(packet: &ClientPacket) -> HandlerResult {
    HandlerResult::Error(format!("Unexpected {} packet", packet.kind()))
}

fn send<S>(ctx: &mut DispatchContext<'_, S>, packet: &ServerPacket) -> HandlerResult {
    let Some(session) = ctx.store.get_mut(ctx.session) else {
        return HandlerResult::Ignored;
    };
    match session.send(packet) {
        Ok(()) => HandlerResult::Executed,
        Err(e) => HandlerResult::Error(e.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Both states
// ---------------------------------------------------------------------------

pub(crate) fn quit<S: Simulation>(ctx: &mut DispatchContext<'_, S>, _: ClientPacket) -> HandlerResult {
    lifecycle::do_quit(
        ctx.store,
        ctx.sim,
        ctx.session,
        ctx.now,
        ctx.settings.timeouts.quit,
        "Client quit",
    );
    HandlerResult::Executed
}

pub(crate) fn keepalive<S: Simulation>(
    ctx: &mut DispatchContext<'_, S>,
    packet: ClientPacket,
) -> HandlerResult {
    let ClientPacket::Keepalive { stamp } = packet else {
        return unexpected(&packet);
    };
    send(ctx, &ServerPacket::Keepalive { stamp })
}

pub(crate) fn end<S: Simulation>(_: &mut DispatchContext<'_, S>, _: ClientPacket) -> HandlerResult {
    HandlerResult::Ignored
}

pub(crate) fn options<S: Simulation>(
    ctx: &mut DispatchContext<'_, S>,
    packet: ClientPacket,
) -> HandlerResult {
    let ClientPacket::Options { flags } = packet else {
        return unexpected(&packet);
    };
    if let Some(session) = ctx.store.get_mut(ctx.session) {
        session.options = flags;
    }
    HandlerResult::Executed
}

// ---------------------------------------------------------------------------
// SETUP
// ---------------------------------------------------------------------------

pub(crate) fn client_setup<S: Simulation>(
    ctx: &mut DispatchContext<'_, S>,
    packet: ClientPacket,
) -> HandlerResult {
    let ClientPacket::ClientSetup { cols, rows, rle } = packet else {
        return unexpected(&packet);
    };
    let Some(session) = ctx.store.get_mut(ctx.session) else {
        return HandlerResult::Ignored;
    };
    session.screen = Some(ScreenSetup { cols, rows, rle });
    debug!(session = %ctx.session, cols, rows, %rle, "client setup");
    HandlerResult::Executed
}

pub(crate) fn visuals<S: Simulation>(
    ctx: &mut DispatchContext<'_, S>,
    packet: ClientPacket,
) -> HandlerResult {
    let ClientPacket::Visuals {
        kind,
        offset,
        entries,
    } = packet
    else {
        return unexpected(&packet);
    };
    let size = ctx.settings.visual_table_size;
    let Some(session) = ctx.store.get_mut(ctx.session) else {
        return HandlerResult::Ignored;
    };
    if session
        .visuals_or_alloc(size)
        .write(kind, offset as usize, &entries)
    {
        HandlerResult::Executed
    } else {
        HandlerResult::Error(format!(
            "Visual table overflow ({} entries at {offset}, size {size})",
            entries.len()
        ))
    }
}

/// Moves a configured client into the world.
pub(crate) fn enter_play<S: Simulation>(
    ctx: &mut DispatchContext<'_, S>,
    _: ClientPacket,
) -> HandlerResult {
    let Some(session) = ctx.store.get(ctx.session) else {
        return HandlerResult::Ignored;
    };
    let Some(screen) = session.screen else {
        return HandlerResult::Error("Client setup missing".into());
    };
    let limits = ctx.sim.screen_limits();
    if !limits.accepts(screen.cols, screen.rows) {
        return HandlerResult::Error(format!(
            "Incompatible screen size {}x{} (min {}x{}, max {}x{})",
            screen.cols,
            screen.rows,
            limits.min_cols,
            limits.min_rows,
            limits.max_cols,
            limits.max_rows
        ));
    }

    let nick = session.nick().to_owned();
    let account_id = session.account.account_id;
    let existing = ctx
        .store
        .iter()
        .find(|s| {
            s.id() != ctx.session
                && s.state() != SessionState::Console
                && s.nick().eq_ignore_ascii_case(&nick)
        })
        .map(|s| (s.id(), s.account.account_id));
    if let Some((other, other_account)) = existing {
        if other_account != account_id {
            return HandlerResult::Error("Name already in use".into());
        }
        info!(session = %ctx.session, replaced = %other, nick = %nick, "resuming connection");
        lifecycle::destroy(ctx.store, ctx.sim, other, "Resume connection");
    }

    let entity = match ctx.sim.attach_entity(ctx.session, &nick) {
        Ok(entity) => entity,
        Err(reason) => return HandlerResult::Error(reason),
    };
    if let Err(e) = ctx
        .store
        .enter_play(ctx.session, entity, ctx.now, ctx.settings.timeouts.play)
    {
        if let Some(moved) = ctx.sim.detach_entity(entity) {
            ctx.store.relocate_entity(moved, entity);
        }
        return HandlerResult::Error(e.to_string());
    }

    if let Some(session) = ctx.store.get_mut(ctx.session) {
        session.redraw_pending = true;
    }
    send(
        ctx,
        &ServerPacket::Play {
            status: StatusCode::Success,
        },
    )
}

// ---------------------------------------------------------------------------
// PLAYING
// ---------------------------------------------------------------------------

pub(crate) fn message<S: Simulation>(
    ctx: &mut DispatchContext<'_, S>,
    packet: ClientPacket,
) -> HandlerResult {
    let ClientPacket::Message { text } = packet else {
        return unexpected(&packet);
    };
    if text.trim().is_empty() {
        return HandlerResult::Ignored;
    }
    let Some(nick) = ctx.store.get(ctx.session).map(|s| s.nick().to_owned()) else {
        return HandlerResult::Ignored;
    };
    info!(session = %ctx.session, nick = %nick, text = %text, "chat");
    chat::broadcast(ctx.store, &chat::player_line(&nick, &text));
    HandlerResult::Executed
}

pub(crate) fn redraw<S: Simulation>(ctx: &mut DispatchContext<'_, S>, _: ClientPacket) -> HandlerResult {
    if let Some(session) = ctx.store.get_mut(ctx.session) {
        session.redraw_pending = true;
    }
    HandlerResult::Executed
}

/// Every turn-consuming command.
pub(crate) fn action<S: Simulation>(
    ctx: &mut DispatchContext<'_, S>,
    packet: ClientPacket,
) -> HandlerResult {
    let ClientPacket::Action(action) = packet else {
        return unexpected(&packet);
    };
    let Some(entity) = ctx.store.entity_for_session(ctx.session) else {
        return HandlerResult::Error("No entity bound".into());
    };
    if !ctx.sim.has_energy(entity) {
        return HandlerResult::Deferred;
    }
    match ctx.sim.try_execute(entity, &action) {
        Execution::Executed => HandlerResult::Executed,
        Execution::Deferred => HandlerResult::Deferred,
    }
}
