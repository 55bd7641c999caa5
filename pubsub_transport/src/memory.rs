//! In-memory datagram queue.
//!
//! [`channel`] returns a sender and a receiver sharing one bounded FIFO of
//! datagrams. Both ends are `Clone`, so a test can keep a handle on the
//! side it does not hand to a loop. The sender records the launch time of
//! every datagram for inspection.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use pubsub_common::clock::Deadline;

use crate::error::{TransportError, TransportResult};
use crate::{ReceiveTransport, SendTransport};

#[derive(Debug)]
struct Shared {
    queue: Mutex<VecDeque<Vec<u8>>>,
    tx_times: Mutex<Vec<Option<Deadline>>>,
    capacity: usize,
    closed: AtomicBool,
    failing: AtomicBool,
}

/// Sending end of an in-memory queue.
#[derive(Debug, Clone)]
pub struct MemorySender {
    shared: Arc<Shared>,
}

/// Receiving end of an in-memory queue.
#[derive(Debug, Clone)]
pub struct MemoryReceiver {
    shared: Arc<Shared>,
}

/// Create a queue holding at most `capacity` datagrams.
pub fn channel(capacity: usize) -> (MemorySender, MemoryReceiver) {
    let shared = Arc::new(Shared {
        queue: Mutex::new(VecDeque::with_capacity(capacity)),
        tx_times: Mutex::new(Vec::new()),
        capacity,
        closed: AtomicBool::new(false),
        failing: AtomicBool::new(false),
    });
    (
        MemorySender {
            shared: Arc::clone(&shared),
        },
        MemoryReceiver { shared },
    )
}

impl MemorySender {
    /// Queue a datagram without a launch time.
    pub fn push(&self, payload: &[u8]) -> TransportResult<usize> {
        self.enqueue(payload, None)
    }

    /// Make every following send fail until cleared.
    pub fn set_failing(&self, failing: bool) {
        self.shared.failing.store(failing, Ordering::Release);
    }

    /// Close both ends.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
    }

    /// Launch times passed to successful sends, oldest first.
    pub fn tx_times(&self) -> Vec<Option<Deadline>> {
        self.shared.tx_times.lock().clone()
    }

    fn enqueue(&self, payload: &[u8], tx_time: Option<Deadline>) -> TransportResult<usize> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        if self.shared.failing.load(Ordering::Acquire) {
            return Err(TransportError::Send {
                addr: ([127, 0, 0, 1], 0).into(),
                source: std::io::Error::other("injected send failure"),
            });
        }
        let mut queue = self.shared.queue.lock();
        if queue.len() >= self.shared.capacity {
            return Err(TransportError::QueueFull {
                capacity: self.shared.capacity,
            });
        }
        queue.push_back(payload.to_vec());
        self.shared.tx_times.lock().push(tx_time);
        Ok(payload.len())
    }
}

impl SendTransport for MemorySender {
    fn send(&mut self, payload: &[u8], tx_time: Option<Deadline>) -> TransportResult<usize> {
        self.enqueue(payload, tx_time)
    }
}

impl MemoryReceiver {
    /// Pop the oldest datagram, if any.
    pub fn pop(&self) -> Option<Vec<u8>> {
        self.shared.queue.lock().pop_front()
    }

    /// Number of queued datagrams.
    pub fn len(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// True when no datagram is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReceiveTransport for MemoryReceiver {
    /// Datagrams longer than `buf` are truncated, as a UDP socket would.
    fn try_receive(&mut self, buf: &mut [u8]) -> TransportResult<Option<usize>> {
        let Some(frame) = self.pop() else {
            if self.shared.closed.load(Ordering::Acquire) {
                return Err(TransportError::Closed);
            }
            return Ok(None);
        };
        let n = frame.len().min(buf.len());
        buf[..n].copy_from_slice(&frame[..n]);
        Ok(Some(n))
    }
}
