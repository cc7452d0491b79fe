//! Plain TCP transport using `tokio::net`.

use std::io;
use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};

use crate::{Connection, ConnectionId, ReadOutcome, Transport, TransportError, WriteOutcome};

/// A TCP [`Transport`] that listens for incoming stream connections.
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    /// Binds a new TCP transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: addr.to_owned(),
                source,
            })?;
        tracing::info!(addr, "TCP transport listening");
        Ok(Self { listener })
    }
}

impl Transport for TcpTransport {
    type Connection = TcpConnection;

    async fn accept(&mut self) -> Result<Self::Connection, TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::Accept)?;

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(%addr, error = %e, "could not set TCP_NODELAY");
        }

        let id = ConnectionId::next();
        tracing::debug!(%id, %addr, "accepted TCP connection");

        Ok(TcpConnection {
            id,
            peer: addr,
            stream: Some(stream),
        })
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

/// A single TCP connection.
///
/// `stream` is `None` once the connection has been closed locally.
pub struct TcpConnection {
    id: ConnectionId,
    peer: SocketAddr,
    stream: Option<TcpStream>,
}

impl Connection for TcpConnection {
    fn read_nonblocking(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, TransportError> {
        let Some(stream) = self.stream.as_ref() else {
            return Ok(ReadOutcome::Closed);
        };
        match stream.try_read(buf) {
            Ok(0) if !buf.is_empty() => Ok(ReadOutcome::Closed),
            Ok(n) => Ok(ReadOutcome::Data(n)),
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::Interrupted =>
            {
                Ok(ReadOutcome::WouldBlock)
            }
            Err(e) => Err(TransportError::Read(e)),
        }
    }

    fn write_nonblocking(&mut self, buf: &[u8]) -> Result<WriteOutcome, TransportError> {
        let Some(stream) = self.stream.as_ref() else {
            return Err(TransportError::Closed(self.id));
        };
        match stream.try_write(buf) {
            Ok(n) => Ok(WriteOutcome::Written(n)),
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::Interrupted =>
            {
                Ok(WriteOutcome::WouldBlock)
            }
            Err(e) => Err(TransportError::Write(e)),
        }
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!(id = %self.id, peer = %self.peer, "closed TCP connection");
        }
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        Some(self.peer)
    }
}
