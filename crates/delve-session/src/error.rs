//! Error types for the session layer.

use crate::{EntityId, SessionId, SessionState};

/// Errors that can occur during session management.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Every slot in the session table is in use.
    #[error("session table full ({capacity} slots)")]
    TableFull { capacity: usize },

    /// No live session has this id.
    #[error("no live session {0}")]
    NotFound(SessionId),

    /// The lifecycle state machine does not allow this move.
    #[error("session {id} cannot go from {from} to {to}")]
    InvalidTransition {
        id: SessionId,
        from: SessionState,
        to: SessionState,
    },

    /// The session or the entity already has a binding.
    #[error("session {session} or entity {entity} is already bound")]
    AlreadyBound { session: SessionId, entity: EntityId },

    /// A nick, real name, or host failed validation.
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// The account validator refused the credentials.
    #[error("account rejected: {0}")]
    AccountRejected(String),
}
