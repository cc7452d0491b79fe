//! In-memory connections for deterministic tests.
//!
//! [`pair`] returns the server half (a [`Connection`]) and the client half
//! ([`MemoryPeer`]). Both share one buffer pair behind a mutex, so a test
//! can push bytes, run a reactor tick, and inspect what the server wrote
//! without any sockets or sleeping.

use std::collections::VecDeque;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::{Connection, ConnectionId, ReadOutcome, TransportError, WriteOutcome};

#[derive(Debug, Default)]
struct Pipe {
    to_server: VecDeque<u8>,
    to_client: Vec<u8>,
    client_closed: bool,
    server_closed: bool,
    /// Maximum bytes accepted per write. `None` accepts everything.
    write_limit: Option<usize>,
}

fn lock(pipe: &Mutex<Pipe>) -> MutexGuard<'_, Pipe> {
    pipe.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Creates a connected pair whose peer address is `127.0.0.1:0`.
pub fn pair() -> (MemoryConnection, MemoryPeer) {
    pair_with_addr(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))
}

/// Creates a connected pair reporting `peer` as the remote address.
pub fn pair_with_addr(peer: SocketAddr) -> (MemoryConnection, MemoryPeer) {
    let pipe = Arc::new(Mutex::new(Pipe::default()));
    let id = ConnectionId::next();
    (
        MemoryConnection {
            id,
            peer,
            pipe: Arc::clone(&pipe),
        },
        MemoryPeer { id, pipe },
    )
}

/// Server half of an in-memory connection.
#[derive(Debug)]
pub struct MemoryConnection {
    id: ConnectionId,
    peer: SocketAddr,
    pipe: Arc<Mutex<Pipe>>,
}

impl Connection for MemoryConnection {
    fn read_nonblocking(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, TransportError> {
        let mut pipe = lock(&self.pipe);
        if pipe.server_closed {
            return Ok(ReadOutcome::Closed);
        }
        if pipe.to_server.is_empty() {
            return Ok(if pipe.client_closed {
                ReadOutcome::Closed
            } else {
                ReadOutcome::WouldBlock
            });
        }
        let n = buf.len().min(pipe.to_server.len());
        for (slot, byte) in buf.iter_mut().zip(pipe.to_server.drain(..n)) {
            *slot = byte;
        }
        Ok(ReadOutcome::Data(n))
    }

    fn write_nonblocking(&mut self, buf: &[u8]) -> Result<WriteOutcome, TransportError> {
        let mut pipe = lock(&self.pipe);
        if pipe.server_closed || pipe.client_closed {
            return Err(TransportError::Closed(self.id));
        }
        let n = pipe.write_limit.map_or(buf.len(), |limit| limit.min(buf.len()));
        if n == 0 && !buf.is_empty() {
            return Ok(WriteOutcome::WouldBlock);
        }
        pipe.to_client.extend_from_slice(&buf[..n]);
        Ok(WriteOutcome::Written(n))
    }

    fn close(&mut self) {
        lock(&self.pipe).server_closed = true;
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        Some(self.peer)
    }
}

/// Client half of an in-memory connection.
#[derive(Debug, Clone)]
pub struct MemoryPeer {
    id: ConnectionId,
    pipe: Arc<Mutex<Pipe>>,
}

impl MemoryPeer {
    /// Id of the matching server half.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queues bytes for the server to read.
    pub fn send(&self, bytes: &[u8]) {
        lock(&self.pipe).to_server.extend(bytes.iter().copied());
    }

    /// Takes everything the server has written so far.
    pub fn take_received(&self) -> Vec<u8> {
        std::mem::take(&mut lock(&self.pipe).to_client)
    }

    /// Closes the client's write side. The server reads `Closed` once the
    /// queued bytes are drained.
    pub fn close(&self) {
        lock(&self.pipe).client_closed = true;
    }

    /// Returns `true` once the server has closed its half.
    pub fn is_closed_by_server(&self) -> bool {
        lock(&self.pipe).server_closed
    }

    /// Caps how many bytes each server write may accept, to simulate a
    /// full socket buffer. `Some(0)` makes every write block.
    pub fn set_write_limit(&self, limit: Option<usize>) {
        lock(&self.pipe).write_limit = limit;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_read_empty_would_block() {
        let (mut conn, _peer) = pair();
        let mut buf = [0u8; 4];
        assert_eq!(conn.read_nonblocking(&mut buf).unwrap(), ReadOutcome::WouldBlock);
    }

    #[test]
    fn test_memory_read_partial_then_rest() {
        let (mut conn, peer) = pair();
        peer.send(b"abcdef");
        let mut buf = [0u8; 4];
        assert_eq!(conn.read_nonblocking(&mut buf).unwrap(), ReadOutcome::Data(4));
        assert_eq!(&buf, b"abcd");
        assert_eq!(conn.read_nonblocking(&mut buf).unwrap(), ReadOutcome::Data(2));
        assert_eq!(&buf[..2], b"ef");
    }

    #[test]
    fn test_memory_client_close_drains_before_closed() {
        let (mut conn, peer) = pair();
        peer.send(b"x");
        peer.close();
        let mut buf = [0u8; 4];
        assert_eq!(conn.read_nonblocking(&mut buf).unwrap(), ReadOutcome::Data(1));
        assert_eq!(conn.read_nonblocking(&mut buf).unwrap(), ReadOutcome::Closed);
    }

    #[test]
    fn test_memory_write_limit_short_write() {
        let (mut conn, peer) = pair();
        peer.set_write_limit(Some(3));
        assert_eq!(
            conn.write_nonblocking(b"hello").unwrap(),
            WriteOutcome::Written(3)
        );
        assert_eq!(peer.take_received(), b"hel");

        peer.set_write_limit(Some(0));
        assert_eq!(conn.write_nonblocking(b"lo").unwrap(), WriteOutcome::WouldBlock);
    }

    #[test]
    fn test_memory_server_close_visible_to_peer() {
        let (mut conn, peer) = pair();
        assert!(!peer.is_closed_by_server());
        conn.close();
        assert!(peer.is_closed_by_server());
        assert!(conn.write_nonblocking(b"late").is_err());
    }

    #[test]
    fn test_memory_pair_with_addr_reports_peer() {
        let addr: SocketAddr = "10.0.0.9:4000".parse().unwrap();
        let (conn, _peer) = pair_with_addr(addr);
        assert_eq!(conn.peer_addr(), Some(addr));
    }
}
