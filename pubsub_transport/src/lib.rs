//! # PubSub transports
//!
//! Datagram transports consumed by the publisher and subscriber loops.
//! Each loop owns its transport exclusively; nothing here is shared
//! between threads.
//!
//! - [`UdpSender`] / [`UdpReceiver`]: UDP unicast or multicast, with
//!   optional `SO_TXTIME` launch times on Linux.
//! - [`memory::channel`]: bounded in-memory queue for tests and local
//!   loopback.
//!
//! Closing a transport is dropping it.

pub mod error;
pub mod memory;
#[cfg(target_os = "linux")]
mod txtime;
pub mod udp;

pub use error::{TransportError, TransportResult};
pub use memory::{MemoryReceiver, MemorySender};
pub use udp::{UdpReceiver, UdpSender};

use pubsub_common::clock::Deadline;

/// Outgoing datagram transport.
pub trait SendTransport: Send {
    /// Send one datagram.
    ///
    /// `tx_time` is the cycle deadline on the monotonic time line. A
    /// transport with launch-time support converts it to its own clock;
    /// others send immediately.
    fn send(&mut self, payload: &[u8], tx_time: Option<Deadline>) -> TransportResult<usize>;
}

/// Incoming datagram transport.
pub trait ReceiveTransport: Send {
    /// Receive one datagram into `buf` without blocking.
    ///
    /// `Ok(None)` means no datagram is pending. A datagram longer than
    /// `buf` is truncated to `buf.len()`.
    fn try_receive(&mut self, buf: &mut [u8]) -> TransportResult<Option<usize>>;
}

impl<T: SendTransport + ?Sized> SendTransport for Box<T> {
    fn send(&mut self, payload: &[u8], tx_time: Option<Deadline>) -> TransportResult<usize> {
        (**self).send(payload, tx_time)
    }
}

impl<T: ReceiveTransport + ?Sized> ReceiveTransport for Box<T> {
    fn try_receive(&mut self, buf: &mut [u8]) -> TransportResult<Option<usize>> {
        (**self).try_receive(buf)
    }
}
