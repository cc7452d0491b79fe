//! Two-way mapping between sessions and simulation entities.
//!
//! The simulation keeps its entity table dense: removing entity `k`
//! moves the last entity into slot `k`. Both directions of the mapping are
//! updated together through [`EntityBindings::relocate`], so neither side
//! ever points at a stale index.

use std::collections::BTreeMap;
use std::fmt;

use crate::{SessionError, SessionId};

/// Index of an entity in the simulation's own table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity-{}", self.0)
    }
}

/// `session ↔ entity`, kept consistent in both directions.
#[derive(Debug, Clone, Default)]
pub struct EntityBindings {
    by_session: BTreeMap<SessionId, EntityId>,
    by_entity: BTreeMap<EntityId, SessionId>,
}

impl EntityBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `session` to `entity`. Neither may already be bound.
    pub fn bind(&mut self, session: SessionId, entity: EntityId) -> Result<(), SessionError> {
        if self.by_session.contains_key(&session) || self.by_entity.contains_key(&entity) {
            return Err(SessionError::AlreadyBound { session, entity });
        }
        self.by_session.insert(session, entity);
        self.by_entity.insert(entity, session);
        Ok(())
    }

    /// Removes the binding of `session`, returning its entity.
    pub fn unbind_session(&mut self, session: SessionId) -> Option<EntityId> {
        let entity = self.by_session.remove(&session)?;
        self.by_entity.remove(&entity);
        Some(entity)
    }

    pub fn entity_of(&self, session: SessionId) -> Option<EntityId> {
        self.by_session.get(&session).copied()
    }

    pub fn session_of(&self, entity: EntityId) -> Option<SessionId> {
        self.by_entity.get(&entity).copied()
    }

    /// Records that the entity formerly at `from` now lives at `to`.
    ///
    /// `to` must be unbound (its previous occupant was just removed).
    /// Returns the session whose back-reference was rewritten, if any.
    pub fn relocate(&mut self, from: EntityId, to: EntityId) -> Option<SessionId> {
        if from == to {
            return self.session_of(to);
        }
        let session = self.by_entity.remove(&from)?;
        debug_assert!(
            !self.by_entity.contains_key(&to),
            "relocating {from} onto bound slot {to}"
        );
        self.by_entity.insert(to, session);
        self.by_session.insert(session, to);
        tracing::debug!(%session, %from, %to, "entity relocated");
        Some(session)
    }

    pub fn len(&self) -> usize {
        self.by_session.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_session.is_empty()
    }

    /// Every `(session, entity)` pair, ordered by session.
    pub fn iter(&self) -> impl Iterator<Item = (SessionId, EntityId)> + '_ {
        self.by_session.iter().map(|(s, e)| (*s, *e))
    }
}
