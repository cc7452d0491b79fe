//! Error types for the protocol layer.
//!
//! Decoding distinguishes two very different situations. Running out of
//! bytes mid-packet is normal on a stream socket and only means "try again
//! once more bytes arrive" ([`DecodeError::Incomplete`]). Anything else is a
//! protocol violation and fatal to the connection.

use crate::RleMode;

/// Errors produced while decoding bytes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The buffer ends before the field does. Not fatal.
    #[error("incomplete packet: {needed} more byte(s) needed")]
    Incomplete {
        /// Minimum number of extra bytes required to make progress.
        needed: usize,
    },

    /// The first byte of a packet is not in the catalogue.
    #[error("unknown packet type {0:#04x}")]
    UnknownTag(u8),

    /// A field is out of its declared bounds.
    #[error("malformed packet: {0}")]
    Malformed(String),
}

impl DecodeError {
    /// Returns `true` for the retry-later case.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::Incomplete { .. })
    }

    /// Returns `true` when the connection must be torn down.
    pub fn is_fatal(&self) -> bool {
        !self.is_incomplete()
    }
}

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Decoding failed.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A screen cell's attribute overlaps the run marker bit of the
    /// negotiated RLE mode, so it could not be told apart from a run.
    #[error("attribute {attr:#06x} collides with the {mode} run marker")]
    AttrOutOfRange {
        /// The offending attribute.
        attr: u16,
        /// Mode the stream is pinned to.
        mode: RleMode,
    },

    /// The message is well-formed but not valid here.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
