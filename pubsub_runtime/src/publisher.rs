//! Publisher loop.
//!
//! One cycle:
//! 1. read `now`; the first cycle schedules its deadline at `now + period`
//! 2. copy every published field from the cache under one lock
//! 3. encode into the preallocated send buffer
//! 4. send, passing the cycle deadline as launch time when enabled
//! 5. `next_deadline = deadline + period` (absolute, never `now + period`)
//! 6. if `next_deadline` has already passed, warn once per overrun
//!    episode and skip the sleep, otherwise sleep until it
//!
//! Send failures are logged (once per episode) and the loop goes on.
//! Encode failures are configuration errors and end the loop.

use std::sync::Arc;

use pubsub_cache::Cache;
use pubsub_common::clock::{Clock, Deadline};
use pubsub_common::consts::STATS_REPORT_INTERVAL;
use pubsub_common::pubsub::config::{Encoding, PublisherConfig, RtConfig};
use pubsub_common::pubsub::types::ContentFlags;
use pubsub_common::types::{DateTime, NodeId, StatusCode};
use pubsub_message::{NetworkMessage, NetworkMessageError, text};
use pubsub_transport::SendTransport;
use tracing::{debug, info, warn};

use crate::error::PublisherError;
use crate::latch::WarnLatch;
use crate::state::{LoopControl, LoopHandle};
use crate::stats::PublisherStats;

/// Running publisher thread.
pub type Publisher = LoopHandle<PublisherStats, PublisherError>;

/// Where one cache entry lands in the NetworkMessage.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PublishedField {
    node_id: NodeId,
    dataset: usize,
    index: usize,
}

/// What one [`PublisherLoop::cycle`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleOutcome {
    /// Deadline of this cycle (the launch time passed to the transport).
    pub deadline: Deadline,
    /// Deadline of the next cycle.
    pub next_deadline: Deadline,
    /// Bytes handed to the transport, `None` if the send failed.
    pub sent: Option<usize>,
    /// The next deadline had already passed when the cycle ended.
    pub overrun: bool,
    /// An overrun warning was logged by this cycle.
    pub warned: bool,
}

/// Publisher state for one connection. Owns its transport and clock.
pub struct PublisherLoop<T, C> {
    name: String,
    cache: Arc<Cache>,
    transport: T,
    clock: C,
    period_us: u64,
    encoding: Encoding,
    tx_time: bool,
    message: NetworkMessage,
    fields: Vec<PublishedField>,
    buffer: Vec<u8>,
    stamp_datasets: bool,
    sequence: u16,
    next_deadline: Option<Deadline>,
    overrun_latch: WarnLatch,
    send_latch: WarnLatch,
    stats: PublisherStats,
}

impl<T: SendTransport, C: Clock> PublisherLoop<T, C> {
    /// Build the NetworkMessage for `cfg` and check that it encodes.
    ///
    /// # Errors
    ///
    /// Invalid configuration, a published field missing from the cache,
    /// or a message that does not fit `max_message_size`.
    pub fn new(
        cfg: &PublisherConfig,
        cache: Arc<Cache>,
        transport: T,
        clock: C,
    ) -> Result<Self, PublisherError> {
        cfg.validate()?;

        let mut message = NetworkMessage::with_shape(cfg.dataset.iter().map(|ds| ds.field.len()))?;
        message.set_header(
            cfg.publisher_id.clone(),
            cfg.group_id,
            cfg.group_version,
            cfg.version,
        )?;

        let mut fields = Vec::with_capacity(cfg.field_count());
        let mut stamp_datasets = false;
        for (dataset, ds) in cfg.dataset.iter().enumerate() {
            let mask = ds.content_mask.to_mask();
            stamp_datasets |= mask.has(ContentFlags::TIMESTAMP);
            message.set_writer_id(dataset, ds.writer_id)?;
            message.set_content_mask(dataset, mask)?;
            for (index, field) in ds.field.iter().enumerate() {
                if !cache.contains(&field.node_id) {
                    return Err(PublisherError::UnknownField(field.node_id.clone()));
                }
                fields.push(PublishedField {
                    node_id: field.node_id.clone(),
                    dataset,
                    index,
                });
            }
        }

        let mut publisher = Self {
            name: cfg.name.clone(),
            cache,
            transport,
            clock,
            period_us: cfg.period_us,
            encoding: cfg.encoding,
            tx_time: cfg.tx_time.is_some(),
            message,
            fields,
            buffer: vec![0u8; cfg.max_message_size],
            stamp_datasets,
            sequence: 0,
            next_deadline: None,
            overrun_latch: WarnLatch::new(),
            send_latch: WarnLatch::new(),
            stats: PublisherStats::default(),
        };

        // Dry run with the current cache content: a message that cannot
        // be encoded now is a configuration error, not a runtime one.
        publisher.fill_message()?;
        let size = publisher.encode()?;
        publisher.message.clear_fields();
        publisher.sequence = 0;

        info!(
            publisher = %publisher.name,
            period_us = publisher.period_us,
            datasets = cfg.dataset.len(),
            fields = publisher.fields.len(),
            encoded_bytes = size,
            max_message_size = cfg.max_message_size,
            "Publisher ready"
        );
        Ok(publisher)
    }

    /// Connection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Deadline of the next cycle, `None` before the first cycle.
    pub fn next_deadline(&self) -> Option<Deadline> {
        self.next_deadline
    }

    /// Counters so far.
    pub fn stats(&self) -> &PublisherStats {
        &self.stats
    }

    /// The message as filled by the last cycle.
    pub fn message(&self) -> &NetworkMessage {
        &self.message
    }

    /// The transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Copy the published fields under one cache lock and refresh the
    /// DataSetMessage headers.
    fn fill_message(&mut self) -> Result<(), NetworkMessageError> {
        self.message.clear_fields();
        {
            let guard = self.cache.lock();
            for f in &self.fields {
                if let Some(value) = guard.get(&f.node_id) {
                    self.message.set_field_value(f.dataset, f.index, value)?;
                }
            }
        }

        self.sequence = self.sequence.wrapping_add(1);
        let timestamp = if self.stamp_datasets {
            DateTime::now()
        } else {
            DateTime::MIN
        };
        for dataset in 0..self.message.datasets().len() {
            let ds = self.message.dataset_mut(dataset)?;
            ds.sequence_number = self.sequence;
            ds.status = StatusCode::GOOD;
            ds.timestamp = timestamp;
        }
        Ok(())
    }

    fn encode(&mut self) -> Result<usize, NetworkMessageError> {
        encode_frame(self.encoding, &self.message, &self.fields, &mut self.buffer)
    }

    /// Run one cycle without sleeping.
    ///
    /// # Errors
    ///
    /// Only encoding errors; they are fatal to the loop.
    pub fn cycle(&mut self) -> Result<CycleOutcome, PublisherError> {
        let start = self.clock.now();
        let (deadline, latency_us) = match self.next_deadline {
            Some(deadline) => (deadline, start.micros_since(deadline)),
            None => (start.after(self.period_us), 0),
        };

        self.fill_message()?;
        let len = self.encode()?;

        let tx_time = self.tx_time.then_some(deadline);
        let sent = match self.transport.send(&self.buffer[..len], tx_time) {
            Ok(n) => {
                self.stats.sent += 1;
                self.send_latch.reset();
                Some(n)
            }
            Err(e) => {
                self.stats.send_failures += 1;
                if self.send_latch.trip() {
                    warn!(publisher = %self.name, "Send failed: {e}");
                }
                None
            }
        };

        let next_deadline = deadline.after(self.period_us);
        self.next_deadline = Some(next_deadline);

        let end = self.clock.now();
        self.stats.cycles.record(end.micros_since(start), latency_us);

        let overrun = next_deadline.is_expired(end);
        let mut warned = false;
        if overrun {
            self.stats.overruns += 1;
            if self.overrun_latch.trip() {
                warned = true;
                self.stats.overrun_warnings += 1;
                warn!(
                    publisher = %self.name,
                    deadline_us = next_deadline.as_micros(),
                    late_us = end.micros_since(next_deadline),
                    period_us = self.period_us,
                    "Publisher cycle overran its period"
                );
            }
        } else {
            self.overrun_latch.reset();
        }

        let count = self.stats.cycles.cycle_count;
        if count % STATS_REPORT_INTERVAL == 0 {
            debug!(
                publisher = %self.name,
                cycles = count,
                avg_us = self.stats.cycles.avg_cycle_us(),
                max_us = self.stats.cycles.max_cycle_us,
                overruns = self.stats.overruns,
                send_failures = self.stats.send_failures,
                "Publisher statistics"
            );
        }

        Ok(CycleOutcome {
            deadline,
            next_deadline,
            sent,
            overrun,
            warned,
        })
    }

    /// Cycle until `control` leaves `Running`.
    pub fn run(&mut self, control: &LoopControl) -> Result<PublisherStats, PublisherError> {
        info!(publisher = %self.name, "Publisher loop started");
        while control.is_running() {
            let outcome = self.cycle()?;
            if !outcome.overrun {
                self.clock.sleep_until(outcome.next_deadline);
            }
        }
        info!(
            publisher = %self.name,
            cycles = self.stats.cycles.cycle_count,
            overruns = self.stats.overruns,
            "Publisher loop stopping"
        );
        Ok(self.stats.clone())
    }
}

impl<T, C> PublisherLoop<T, C>
where
    T: SendTransport + 'static,
    C: Clock,
{
    /// Start the loop on its own thread.
    pub fn spawn(mut self, rt: Option<RtConfig>) -> Result<Publisher, PublisherError> {
        let name = format!("pub-{}", self.name);
        LoopHandle::spawn(&name, rt, move |control| self.run(control))
    }
}

fn encode_frame(
    encoding: Encoding,
    message: &NetworkMessage,
    fields: &[PublishedField],
    out: &mut [u8],
) -> Result<usize, NetworkMessageError> {
    match encoding {
        Encoding::Uadp => message.encode_to_slice(out),
        Encoding::Text => {
            message.check_complete()?;
            let pairs = fields.iter().filter_map(|f| {
                let name = f.node_id.as_str_id()?;
                let value = message.datasets().get(f.dataset)?.field(f.index)?;
                Some((name, &value.value))
            });
            text::encode_pairs(pairs, out)
        }
    }
}
