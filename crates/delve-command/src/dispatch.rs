//! Per-state dispatch tables.
//!
//! A session in `SETUP` and a session in `PLAYING` accept different
//! packets. Each state has its own [`DispatchTable`] with one [`Route`] per
//! [`PacketKind`]: a handler, or an explicit refusal. A packet whose route is
//! a refusal is a protocol violation and destroys the session.
//!
//! Both tables are checked for full coverage when the [`Dispatcher`] is
//! built, so a new packet kind cannot silently fall through.

use delve_protocol::{ClientPacket, PacketKind};
use delve_session::{SessionId, SessionState, SessionStore, TimeoutTicks};

use crate::{CommandError, Simulation, handlers};

// ---------------------------------------------------------------------------
// Handler types
// ---------------------------------------------------------------------------

/// What a handler did with its packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerResult {
    /// The command ran this tick.
    Executed,
    /// Benign no-op.
    Ignored,
    /// Valid, but the entity lacks energy. Keep the bytes and retry.
    Deferred,
    /// Protocol violation or failed check. Destroy with this reason.
    Error(String),
}

/// Everything a handler may touch.
pub struct DispatchContext<'a, S> {
    pub store: &'a mut SessionStore,
    pub sim: &'a mut S,
    /// The session whose packet is being handled.
    pub session: SessionId,
    /// Current tick.
    pub now: u64,
    pub settings: &'a DispatchSettings,
}

/// A packet handler.
pub type Handler<S> = fn(&mut DispatchContext<'_, S>, ClientPacket) -> HandlerResult;

/// Table entry for one packet kind.
pub enum Route<S> {
    Handle(Handler<S>),
    /// Not allowed in this state.
    Refuse,
}

// fn pointers are Copy for any S; derive would demand S: Copy.
impl<S> Clone for Route<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for Route<S> {}

impl<S> std::fmt::Debug for Route<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Handle(_) => f.write_str("Handle"),
            Self::Refuse => f.write_str("Refuse"),
        }
    }
}

// ---------------------------------------------------------------------------
// DispatchTable
// ---------------------------------------------------------------------------

/// Tag → route map for one session state.
pub struct DispatchTable<S> {
    state: SessionState,
    routes: [Option<Route<S>>; PacketKind::COUNT],
}

impl<S: Simulation> DispatchTable<S> {
    /// A table with no routes. Fill it with [`on`](Self::on) and
    /// [`refuse`](Self::refuse).
    pub fn empty(state: SessionState) -> Self {
        Self {
            state,
            routes: [None; PacketKind::COUNT],
        }
    }

    pub fn on(mut self, kind: PacketKind, handler: Handler<S>) -> Self {
        self.routes[kind.index()] = Some(Route::Handle(handler));
        self
    }

    pub fn refuse(mut self, kind: PacketKind) -> Self {
        self.routes[kind.index()] = Some(Route::Refuse);
        self
    }

    /// Packets accepted while a client is configuring itself.
    pub fn setup() -> Self {
        use PacketKind::*;
        Self::empty(SessionState::Setup)
            .on(Play, handlers::enter_play)
            .on(Quit, handlers::quit)
            .on(Keepalive, handlers::keepalive)
            .on(End, handlers::end)
            .on(ClientSetup, handlers::client_setup)
            .on(Visuals, handlers::visuals)
            .on(Options, handlers::options)
            .refuse(Undefined)
            .refuse(Message)
            .refuse(Redraw)
            .refuse(Walk)
            .refuse(Run)
            .refuse(Tunnel)
            .refuse(Cast)
            .refuse(UseItem)
            .refuse(Rest)
            .refuse(LineInfo)
    }

    /// Packets accepted once the entity is in the world.
    pub fn playing() -> Self {
        use PacketKind::*;
        Self::empty(SessionState::Playing)
            .on(Quit, handlers::quit)
            .on(Keepalive, handlers::keepalive)
            .on(End, handlers::end)
            .on(Options, handlers::options)
            .on(Message, handlers::message)
            .on(Redraw, handlers::redraw)
            .on(Walk, handlers::action)
            .on(Run, handlers::action)
            .on(Tunnel, handlers::action)
            .on(Cast, handlers::action)
            .on(UseItem, handlers::action)
            .on(Rest, handlers::action)
            .refuse(Undefined)
            .refuse(Play)
            .refuse(ClientSetup)
            .refuse(Visuals)
            .refuse(LineInfo)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The route for `kind`. An uncovered kind is refused.
    pub fn route(&self, kind: PacketKind) -> Route<S> {
        self.routes[kind.index()].unwrap_or(Route::Refuse)
    }

    /// Fails on the first kind with no route.
    pub fn validate(&self) -> Result<(), CommandError> {
        match PacketKind::ALL
            .iter()
            .find(|kind| self.routes[kind.index()].is_none())
        {
            Some(&kind) => Err(CommandError::UncoveredTag {
                state: self.state,
                kind,
            }),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Fixed values handlers need.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub timeouts: TimeoutTicks,
    /// Entries per visual table, allocated on first use.
    pub visual_table_size: usize,
}

/// Owns both tables. See [`process_pending_commands`](Self::process_pending_commands).
pub struct Dispatcher<S> {
    pub(crate) setup: DispatchTable<S>,
    pub(crate) playing: DispatchTable<S>,
    pub(crate) settings: DispatchSettings,
}

impl<S: Simulation> Dispatcher<S> {
    /// Builds the standard tables and checks their coverage.
    pub fn new(settings: DispatchSettings) -> Result<Self, CommandError> {
        Self::with_tables(DispatchTable::setup(), DispatchTable::playing(), settings)
    }

    pub fn with_tables(
        setup: DispatchTable<S>,
        playing: DispatchTable<S>,
        settings: DispatchSettings,
    ) -> Result<Self, CommandError> {
        setup.validate()?;
        playing.validate()?;
        Ok(Self {
            setup,
            playing,
            settings,
        })
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// The table for `state`, or `None` if that state does not dispatch.
    pub fn table(&self, state: SessionState) -> Option<&DispatchTable<S>> {
        match state {
            SessionState::Setup => Some(&self.setup),
            SessionState::Playing => Some(&self.playing),
            _ => None,
        }
    }
}
