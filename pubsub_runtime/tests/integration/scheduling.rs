//! Publisher scheduling on the manual clock.
//!
//! A scripted transport advances the clock on every send, standing in for
//! the time a cycle spends on copy, encode and transmit.

use std::collections::VecDeque;
use std::sync::Arc;

use pubsub_cache::Cache;
use pubsub_common::clock::{Clock, Deadline, ManualClock};
use pubsub_common::pubsub::config::{Encoding, PubSubConfig};
use pubsub_common::types::BuiltinType;
use pubsub_runtime::{CycleOutcome, PublisherLoop};
use pubsub_transport::{SendTransport, TransportResult};

use super::{field, publisher_config};

const START_US: u64 = 1_000;
const PERIOD_US: u64 = 100;

/// Transport whose sends take a scripted amount of clock time.
struct ScriptedTransport {
    clock: ManualClock,
    delays: VecDeque<u64>,
}

impl SendTransport for ScriptedTransport {
    fn send(&mut self, payload: &[u8], _tx_time: Option<Deadline>) -> TransportResult<usize> {
        self.clock.advance(self.delays.pop_front().unwrap_or(0));
        Ok(payload.len())
    }
}

fn scripted_publisher(
    delays: &[u64],
) -> (PublisherLoop<ScriptedTransport, ManualClock>, ManualClock) {
    let cfg = publisher_config(
        "sched",
        Encoding::Uadp,
        vec![field(1, "Counter", BuiltinType::UInt32)],
    );
    let config = PubSubConfig {
        publisher: vec![cfg.clone()],
        ..Default::default()
    };
    let cache = Arc::new(Cache::initialize(&config).unwrap());
    let clock = ManualClock::new(START_US);
    let transport = ScriptedTransport {
        clock: clock.clone(),
        delays: delays.iter().copied().collect(),
    };
    let publisher = PublisherLoop::new(&cfg, cache, transport, clock.clone()).unwrap();
    (publisher, clock)
}

/// One iteration of the publisher loop body.
fn step(
    publisher: &mut PublisherLoop<ScriptedTransport, ManualClock>,
    clock: &ManualClock,
) -> CycleOutcome {
    let outcome = publisher.cycle().unwrap();
    if !outcome.overrun {
        clock.sleep_until(outcome.next_deadline);
    }
    outcome
}

fn grid(k: u64) -> Deadline {
    Deadline::from_micros(START_US + k * PERIOD_US)
}

// ─── Drift ───

#[test]
fn deadlines_stay_on_the_period_grid() {
    let delays: Vec<u64> = (0..200).map(|k| (k * 37) % PERIOD_US).collect();
    let (mut publisher, clock) = scripted_publisher(&delays);

    for k in 1..=200 {
        let outcome = step(&mut publisher, &clock);
        assert_eq!(outcome.deadline, grid(k), "cycle {k}");
        assert_eq!(outcome.next_deadline, grid(k + 1), "cycle {k}");
        assert!(!outcome.overrun, "cycle {k}");
    }
    assert_eq!(publisher.stats().overruns, 0);
    assert_eq!(publisher.stats().sent, 200);
}

#[test]
fn long_cycle_catches_up_without_shifting_the_grid() {
    let (mut publisher, clock) = scripted_publisher(&[0, 350, 0, 0, 0]);

    let outcomes: Vec<CycleOutcome> = (0..5).map(|_| step(&mut publisher, &clock)).collect();

    let deadlines: Vec<Deadline> = outcomes.iter().map(|o| o.deadline).collect();
    assert_eq!(deadlines, (1..=5).map(grid).collect::<Vec<_>>());

    let overruns: Vec<bool> = outcomes.iter().map(|o| o.overrun).collect();
    assert_eq!(overruns, [false, true, true, true, false]);
    assert_eq!(publisher.stats().overrun_warnings, 1);
    assert_eq!(clock.now(), grid(6));
}

// ─── Overrun warnings ───

#[test]
fn overrun_warning_once_per_episode() {
    // Cycle 1 on time, cycles 2-7 take exactly one period, cycle 8 recovers,
    // cycle 11 overruns again.
    let delays = [0, 100, 100, 100, 100, 100, 100, 50, 0, 0, 100];
    let (mut publisher, clock) = scripted_publisher(&delays);

    let outcomes: Vec<CycleOutcome> = (0..delays.len()).map(|_| step(&mut publisher, &clock)).collect();

    let overrun_cycles: Vec<usize> = outcomes
        .iter()
        .enumerate()
        .filter(|(_, o)| o.overrun)
        .map(|(i, _)| i + 1)
        .collect();
    assert_eq!(overrun_cycles, [2, 3, 4, 5, 6, 7, 11]);

    let warned_cycles: Vec<usize> = outcomes
        .iter()
        .enumerate()
        .filter(|(_, o)| o.warned)
        .map(|(i, _)| i + 1)
        .collect();
    assert_eq!(warned_cycles, [2, 11]);

    let stats = publisher.stats();
    assert_eq!(stats.overruns, 7);
    assert_eq!(stats.overrun_warnings, 2);

    // Exactly-one-period cycles never fall behind the grid.
    for (k, outcome) in outcomes.iter().enumerate() {
        assert_eq!(outcome.deadline, grid(k as u64 + 1));
    }
}

#[test]
fn cycle_statistics_track_processing_time() {
    let (mut publisher, clock) = scripted_publisher(&[10, 30, 20]);
    for _ in 0..3 {
        step(&mut publisher, &clock);
    }
    let cycles = &publisher.stats().cycles;
    assert_eq!(cycles.cycle_count, 3);
    assert_eq!(cycles.min_cycle_us, 10);
    assert_eq!(cycles.max_cycle_us, 30);
    assert_eq!(cycles.avg_cycle_us(), 20);
    assert_eq!(cycles.max_latency_us, 0);
}
