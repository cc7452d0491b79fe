use crate::ConnectionId;

/// Socket-level failures. The reactor turns every one of these into a
/// session teardown.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("could not bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),

    #[error("read failed: {0}")]
    Read(#[source] std::io::Error),

    #[error("write failed: {0}")]
    Write(#[source] std::io::Error),

    /// Write attempted after the connection was closed by either side.
    #[error("{0} is closed")]
    Closed(ConnectionId),
}
