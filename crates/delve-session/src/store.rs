//! Fixed-capacity session table.
//!
//! [`SessionStore`] owns every session slot plus the entity bindings. It
//! is the single place that moves a slot between lifecycle states, so the
//! invariants below hold after every public call:
//!
//! - a `SessionId` handed out is live until [`SessionStore::release`];
//! - `entity_for_session(id)` is `Some` exactly when `id` is `PLAYING`;
//! - a `QUIT` session keeps its entity bound (as a lingering entity) until
//!   it is released.

use delve_transport::Connection;

use crate::{
    AccountInfo, Credentials, EntityBindings, EntityId, Session, SessionError, SessionId,
    SessionState,
};

/// Arena of session slots with a free-list.
#[derive(Debug)]
pub struct SessionStore {
    slots: Vec<Session>,
    /// Free slot indices, lowest last so it is reused first.
    free: Vec<u16>,
    bindings: EntityBindings,
}

impl SessionStore {
    /// Creates a table with `capacity` slots (clamped to `1..=u16::MAX`).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, u16::MAX as usize) as u16;
        Self {
            slots: (0..capacity).map(|i| Session::vacant(SessionId(i))).collect(),
            free: (0..capacity).rev().collect(),
            bindings: EntityBindings::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.free.is_empty()
    }

    /// Takes a free slot for a freshly accepted connection.
    ///
    /// `state` must be `SETUP` or `CONSOLE`.
    pub fn open(
        &mut self,
        state: SessionState,
        conn: Box<dyn Connection>,
        credentials: Credentials,
        account: AccountInfo,
        now: u64,
        timeout_ticks: u64,
    ) -> Result<SessionId, SessionError> {
        let Some(&index) = self.free.last() else {
            return Err(SessionError::TableFull {
                capacity: self.capacity(),
            });
        };
        let id = SessionId(index);
        if !SessionState::Free.can_transition_to(state) {
            return Err(SessionError::InvalidTransition {
                id,
                from: SessionState::Free,
                to: state,
            });
        }
        self.free.pop();

        let session = &mut self.slots[id.index()];
        session.attach(conn);
        session.credentials = credentials;
        session.account = account;
        session.set_state(state, now, timeout_ticks);

        tracing::info!(session = %id, %state, nick = %session.credentials.nick, "session opened");
        Ok(id)
    }

    /// The live session at `id`.
    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.slots.get(id.index()).filter(|s| s.state().is_live())
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.slots
            .get_mut(id.index())
            .filter(|s| s.state().is_live())
    }

    /// Ids of live sessions, in slot order.
    ///
    /// A snapshot, so the caller may destroy sessions while walking it.
    pub fn ids(&self) -> Vec<SessionId> {
        self.iter().map(Session::id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.slots.iter().filter(|s| s.state().is_live())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.slots.iter_mut().filter(|s| s.state().is_live())
    }

    /// Finds a live non-console session by nick, ignoring case.
    pub fn find_by_nick(&self, nick: &str) -> Option<SessionId> {
        self.iter()
            .find(|s| s.state() != SessionState::Console && s.nick().eq_ignore_ascii_case(nick))
            .map(Session::id)
    }

    fn live_state(&self, id: SessionId) -> Result<SessionState, SessionError> {
        self.get(id)
            .map(Session::state)
            .ok_or(SessionError::NotFound(id))
    }

    /// `SETUP → PLAYING`, binding `entity` in the same step.
    pub fn enter_play(
        &mut self,
        id: SessionId,
        entity: EntityId,
        now: u64,
        timeout_ticks: u64,
    ) -> Result<(), SessionError> {
        let from = self.live_state(id)?;
        if from != SessionState::Setup {
            return Err(SessionError::InvalidTransition {
                id,
                from,
                to: SessionState::Playing,
            });
        }
        self.bindings.bind(id, entity)?;
        self.slots[id.index()].set_state(SessionState::Playing, now, timeout_ticks);
        tracing::info!(session = %id, %entity, "session entered play");
        Ok(())
    }

    /// `PLAYING → QUIT`. The entity stays bound until release.
    pub fn begin_quit(
        &mut self,
        id: SessionId,
        reason: &str,
        now: u64,
        timeout_ticks: u64,
    ) -> Result<(), SessionError> {
        let from = self.live_state(id)?;
        if !from.can_transition_to(SessionState::Quit) {
            return Err(SessionError::InvalidTransition {
                id,
                from,
                to: SessionState::Quit,
            });
        }
        let session = &mut self.slots[id.index()];
        session.detach();
        session.quit_reason = Some(reason.to_owned());
        session.set_state(SessionState::Quit, now, timeout_ticks);
        tracing::info!(session = %id, reason, "session lingering");
        Ok(())
    }

    /// Frees the slot and returns the entity that was bound to it.
    ///
    /// The caller must detach that entity from the simulation and report
    /// any compaction back through [`relocate_entity`](Self::relocate_entity).
    pub fn release(&mut self, id: SessionId) -> Option<EntityId> {
        let session = self.get_mut(id)?;
        session.wipe();
        self.free.push(id.0);
        // Keep lowest indices at the end so they are reused first.
        self.free.sort_unstable_by(|a, b| b.cmp(a));
        self.bindings.unbind_session(id)
    }

    /// The bound entity of a `PLAYING` session.
    pub fn entity_for_session(&self, id: SessionId) -> Option<EntityId> {
        match self.get(id)?.state() {
            SessionState::Playing => self.bindings.entity_of(id),
            _ => None,
        }
    }

    /// The entity left behind by a `QUIT` session.
    pub fn lingering_entity(&self, id: SessionId) -> Option<EntityId> {
        match self.get(id)?.state() {
            SessionState::Quit => self.bindings.entity_of(id),
            _ => None,
        }
    }

    pub fn session_for_entity(&self, entity: EntityId) -> Option<SessionId> {
        self.bindings.session_of(entity)
    }

    /// Applies a swap-remove done by the simulation.
    pub fn relocate_entity(&mut self, from: EntityId, to: EntityId) -> Option<SessionId> {
        self.bindings.relocate(from, to)
    }

    pub fn bindings(&self) -> &EntityBindings {
        &self.bindings
    }

    /// Reaper scan: live sessions past their idle limit.
    ///
    /// `CONSOLE` sessions never time out.
    pub fn timed_out(&self, now: u64) -> Vec<SessionId> {
        self.iter()
            .filter(|s| s.state() != SessionState::Console && s.is_expired(now))
            .map(Session::id)
            .collect()
    }
}
