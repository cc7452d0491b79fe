//! Transport abstraction layer for Delve.
//!
//! The reactor never awaits on a socket. It polls every connection once per
//! tick through the non-blocking [`Connection`] trait, where "would block"
//! simply means "nothing yet". Only accepting new sockets is async
//! ([`Transport::accept`]), and that runs on its own task.
//!
//! # Feature Flags
//!
//! - `tcp` (default): plain TCP stream transport via `tokio::net`

#![allow(async_fn_in_trait)]

mod error;
pub mod memory;
#[cfg(feature = "tcp")]
mod tcp;

pub use error::TransportError;
#[cfg(feature = "tcp")]
pub use tcp::{TcpConnection, TcpTransport};

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique tag for a socket, used in logs.
///
/// Unlike a session id it is never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates a fresh, process-unique id.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Result of a non-blocking read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` bytes were copied into the buffer (`n > 0`).
    Data(usize),
    /// Nothing available right now. Not an error.
    WouldBlock,
    /// The peer closed its write side.
    Closed,
}

/// Result of a non-blocking write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// `n` bytes were accepted by the kernel (possibly fewer than offered).
    Written(usize),
    /// The socket buffer is full.
    WouldBlock,
}

/// Accepts new incoming connections.
pub trait Transport: Send + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;

    /// Waits for and accepts the next incoming connection.
    async fn accept(&mut self) -> Result<Self::Connection, TransportError>;

    /// Returns the address the transport is listening on.
    fn local_addr(&self) -> std::io::Result<SocketAddr>;
}

/// A single stream connection polled by the reactor.
///
/// All methods return immediately. Implementations must never block the
/// calling thread.
pub trait Connection: Send + 'static {
    /// Reads whatever is available into `buf`.
    fn read_nonblocking(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, TransportError>;

    /// Writes as much of `buf` as the socket accepts right now.
    fn write_nonblocking(&mut self, buf: &[u8]) -> Result<WriteOutcome, TransportError>;

    /// Closes the connection. Further reads report [`ReadOutcome::Closed`].
    fn close(&mut self);

    fn id(&self) -> ConnectionId;

    /// Returns the remote address, when known.
    fn peer_addr(&self) -> Option<SocketAddr>;
}

impl<C: Connection + ?Sized> Connection for Box<C> {
    fn read_nonblocking(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, TransportError> {
        (**self).read_nonblocking(buf)
    }

    fn write_nonblocking(&mut self, buf: &[u8]) -> Result<WriteOutcome, TransportError> {
        (**self).write_nonblocking(buf)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn id(&self) -> ConnectionId {
        (**self).id()
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        (**self).peer_addr()
    }
}
