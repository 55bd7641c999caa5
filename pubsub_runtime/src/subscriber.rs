//! Subscriber loop.
//!
//! Each iteration sleeps until the retry deadline (if one is pending),
//! then tries one non-blocking receive:
//! - no datagram: the retry deadline advances by the wait increment, so
//!   the loop never spins; a late-reception warning is logged once per
//!   silent episode
//! - a datagram: it is decoded completely, then every value is written to
//!   the cache under one lock
//!
//! A truncated or malformed datagram is dropped as a whole. Receive errors
//! are logged and the loop carries on.

use std::sync::Arc;

use pubsub_cache::{Cache, SetError};
use pubsub_common::clock::{Clock, Deadline};
use pubsub_common::consts::STATS_REPORT_INTERVAL;
use pubsub_common::pubsub::config::{RtConfig, SubscriberConfig};
use pubsub_common::types::{DataValue, NodeId};
use pubsub_transport::ReceiveTransport;
use tracing::{debug, info, warn};

use crate::decoder::{FrameDecoder, decoder_for};
use crate::error::SubscriberError;
use crate::latch::WarnLatch;
use crate::state::{LoopControl, LoopHandle};
use crate::stats::SubscriberStats;

/// Running subscriber thread.
pub type Subscriber = LoopHandle<SubscriberStats, SubscriberError>;

/// What one [`SubscriberLoop::poll`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// No datagram; the next attempt is scheduled at `retry_at`.
    Idle { retry_at: Deadline },
    /// A datagram was decoded and written.
    Frame {
        /// Values stored in the cache.
        written: usize,
        /// Values the cache refused.
        refused: usize,
        /// Decoded items no target claimed.
        ignored: usize,
    },
    /// A datagram was dropped without touching the cache.
    Discarded,
    /// The transport reported an error.
    ReceiveError { retry_at: Deadline },
}

/// Subscriber state for one connection. Owns its transport and clock.
pub struct SubscriberLoop<R, C> {
    name: String,
    cache: Arc<Cache>,
    transport: R,
    clock: C,
    decoder: Box<dyn FrameDecoder>,
    buffer: Vec<u8>,
    max_message_size: usize,
    wait_increment_us: u64,
    late_after_us: u64,
    retry_deadline: Option<Deadline>,
    last_frame: Option<Deadline>,
    late_latch: WarnLatch,
    decode_latch: WarnLatch,
    refused_latch: WarnLatch,
    receive_latch: WarnLatch,
    values: Vec<(NodeId, DataValue)>,
    stats: SubscriberStats,
}

impl<R: ReceiveTransport, C: Clock> SubscriberLoop<R, C> {
    /// Build the subscriber for `cfg`.
    ///
    /// # Errors
    ///
    /// Invalid configuration or a reader field missing from the cache.
    pub fn new(
        cfg: &SubscriberConfig,
        cache: Arc<Cache>,
        transport: R,
        clock: C,
    ) -> Result<Self, SubscriberError> {
        cfg.validate()?;
        for field in cfg.reader.iter().flat_map(|r| r.field.iter()) {
            if !cache.contains(&field.node_id) {
                return Err(SubscriberError::UnknownField(field.node_id.clone()));
            }
        }
        let decoder = decoder_for(cfg)?;
        let values_hint = cfg.reader.iter().map(|r| r.field.len()).sum();

        info!(
            subscriber = %cfg.name,
            encoding = ?cfg.encoding,
            readers = cfg.reader.len(),
            wait_increment_us = cfg.wait_increment_us,
            "Subscriber ready"
        );
        Ok(Self {
            name: cfg.name.clone(),
            cache,
            transport,
            clock,
            decoder,
            // One spare byte tells a full datagram from a truncated one.
            buffer: vec![0u8; cfg.max_message_size + 1],
            max_message_size: cfg.max_message_size,
            wait_increment_us: cfg.wait_increment_us,
            late_after_us: cfg.late_after_us,
            retry_deadline: None,
            last_frame: None,
            late_latch: WarnLatch::new(),
            decode_latch: WarnLatch::new(),
            refused_latch: WarnLatch::new(),
            receive_latch: WarnLatch::new(),
            values: Vec::with_capacity(values_hint),
            stats: SubscriberStats::default(),
        })
    }

    /// Replace the decoder chosen from the configuration.
    pub fn with_decoder(mut self, decoder: Box<dyn FrameDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Connection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Counters so far.
    pub fn stats(&self) -> &SubscriberStats {
        &self.stats
    }

    /// Pending retry deadline.
    pub fn retry_deadline(&self) -> Option<Deadline> {
        self.retry_deadline
    }

    /// Run one iteration.
    pub fn poll(&mut self) -> PollOutcome {
        let mut now = self.clock.now();
        if let Some(retry) = self.retry_deadline
            && !retry.is_expired(now)
        {
            self.clock.sleep_until(retry);
            now = self.clock.now();
        }
        let silent_since = *self.last_frame.get_or_insert(now);
        self.stats.iterations += 1;

        let outcome = match self.transport.try_receive(&mut self.buffer) {
            Ok(Some(len)) => {
                self.retry_deadline = None;
                self.last_frame = Some(now);
                self.late_latch.reset();
                self.receive_latch.reset();
                self.handle_frame(len)
            }
            Ok(None) => {
                self.receive_latch.reset();
                self.stats.idle += 1;
                let retry_at = self.schedule_retry(now);
                self.check_late(now, silent_since);
                PollOutcome::Idle { retry_at }
            }
            Err(e) => {
                self.stats.receive_errors += 1;
                if self.receive_latch.trip() {
                    warn!(subscriber = %self.name, "Receive failed: {e}");
                }
                let retry_at = self.schedule_retry(now);
                PollOutcome::ReceiveError { retry_at }
            }
        };

        if self.stats.iterations % STATS_REPORT_INTERVAL == 0 {
            debug!(
                subscriber = %self.name,
                iterations = self.stats.iterations,
                frames = self.stats.frames,
                discarded = self.stats.discarded,
                values_written = self.stats.values_written,
                "Subscriber statistics"
            );
        }
        outcome
    }

    /// Advance the retry deadline by one increment, re-anchoring on `now`
    /// when the previous one is too far behind.
    fn schedule_retry(&mut self, now: Deadline) -> Deadline {
        let next = match self.retry_deadline {
            Some(prev) => prev.after(self.wait_increment_us),
            None => now.after(self.wait_increment_us),
        };
        let next = if next.is_expired(now) {
            now.after(self.wait_increment_us)
        } else {
            next
        };
        self.retry_deadline = Some(next);
        next
    }

    fn check_late(&mut self, now: Deadline, silent_since: Deadline) {
        let silent_us = now.micros_since(silent_since);
        if self.late_after_us > 0 && silent_us >= self.late_after_us && self.late_latch.trip() {
            self.stats.late_warnings += 1;
            warn!(
                subscriber = %self.name,
                silent_us,
                late_after_us = self.late_after_us,
                "No datagram received within the expected window"
            );
        }
    }

    fn handle_frame(&mut self, len: usize) -> PollOutcome {
        self.stats.frames += 1;
        if len > self.max_message_size {
            self.stats.discarded += 1;
            if self.decode_latch.trip() {
                warn!(
                    subscriber = %self.name,
                    max_message_size = self.max_message_size,
                    "Datagram exceeds max_message_size, dropped"
                );
            }
            return PollOutcome::Discarded;
        }

        self.values.clear();
        let ignored = match self.decoder.decode(&self.buffer[..len], &mut self.values) {
            Ok(ignored) => ignored,
            Err(e) => {
                self.values.clear();
                self.stats.discarded += 1;
                if self.decode_latch.trip() {
                    warn!(subscriber = %self.name, bytes = len, "Malformed datagram dropped: {e}");
                } else {
                    debug!(subscriber = %self.name, bytes = len, "Malformed datagram dropped: {e}");
                }
                return PollOutcome::Discarded;
            }
        };
        self.decode_latch.reset();

        let mut written = 0;
        let mut refused = 0;
        let mut first_refusal: Option<SetError> = None;
        {
            let mut guard = self.cache.lock();
            for (node_id, value) in self.values.drain(..) {
                match guard.try_set(&node_id, value) {
                    Ok(()) => written += 1,
                    Err(e) => {
                        refused += 1;
                        first_refusal.get_or_insert(e);
                    }
                }
            }
        }

        match first_refusal {
            Some(e) => {
                if self.refused_latch.trip() {
                    warn!(subscriber = %self.name, refused, "Cache refused received values: {e}");
                }
            }
            None => self.refused_latch.reset(),
        }

        self.stats.values_written += written as u64;
        self.stats.values_refused += refused as u64;
        self.stats.values_ignored += ignored as u64;
        PollOutcome::Frame {
            written,
            refused,
            ignored,
        }
    }

    /// Iterate until `control` leaves `Running`.
    pub fn run(&mut self, control: &LoopControl) -> Result<SubscriberStats, SubscriberError> {
        info!(subscriber = %self.name, "Subscriber loop started");
        while control.is_running() {
            self.poll();
        }
        info!(
            subscriber = %self.name,
            frames = self.stats.frames,
            discarded = self.stats.discarded,
            "Subscriber loop stopping"
        );
        Ok(self.stats.clone())
    }
}

impl<R, C> SubscriberLoop<R, C>
where
    R: ReceiveTransport + 'static,
    C: Clock,
{
    /// Start the loop on its own thread.
    pub fn spawn(mut self, rt: Option<RtConfig>) -> Result<Subscriber, SubscriberError> {
        let name = format!("sub-{}", self.name);
        LoopHandle::spawn(&name, rt, move |control| self.run(control))
    }
}
