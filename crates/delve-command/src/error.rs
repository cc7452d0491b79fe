//! Error types for the command layer.

use delve_protocol::PacketKind;
use delve_session::SessionState;

/// Errors raised while building dispatch tables.
///
/// Per-connection faults never surface as a `CommandError`; they become a
/// destroy reason instead.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// A dispatch table has no route for this kind.
    #[error("{state} dispatch table has no route for {kind}")]
    UncoveredTag {
        state: SessionState,
        kind: PacketKind,
    },
}
