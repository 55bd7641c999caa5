//! Transport error types.

use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Errors raised by the datagram transports.
///
/// Construction errors are fatal at startup. Send and receive errors are
/// recoverable: the loops log them and move on to the next cycle.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Cannot create socket for {addr}: {source}")]
    Socket {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Cannot bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Cannot join multicast group {group}: {source}")]
    MulticastJoin {
        group: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("SO_TXTIME setup failed: {0}")]
    TxTime(#[source] io::Error),

    #[error("Send to {addr} failed: {source}")]
    Send {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Receive failed: {0}")]
    Receive(#[source] io::Error),

    #[error("Transport queue full ({capacity} datagrams)")]
    QueueFull { capacity: usize },

    #[error("Transport closed")]
    Closed,

    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
}

/// Result alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
