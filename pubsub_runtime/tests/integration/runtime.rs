//! Threaded runtime over in-memory transports.

use std::time::{Duration, Instant};

use pubsub_common::clock::MonotonicClock;
use pubsub_common::pubsub::config::{Encoding, PubSubConfig};
use pubsub_common::types::{BuiltinType, NodeId, Variant};
use pubsub_message::text;
use pubsub_runtime::{PubSubRuntime, RuntimeError};
use pubsub_transport::memory::{self, MemoryReceiver, MemorySender};

use super::{any_reader, field, publisher_config, subscriber_config};

const TIMEOUT: Duration = Duration::from_secs(5);

/// Text publisher and text subscriber sharing the fields A and B.
fn mirror_config() -> PubSubConfig {
    let fields = || {
        vec![
            field(1, "A", BuiltinType::UInt32),
            field(1, "B", BuiltinType::UInt32),
        ]
    };
    let mut publisher = publisher_config("out", Encoding::Text, fields());
    publisher.period_us = 200;
    PubSubConfig {
        publisher: vec![publisher],
        subscriber: vec![subscriber_config("in", Encoding::Text, any_reader(fields()))],
        ..Default::default()
    }
}

struct Wiring {
    inbound: MemorySender,
    outbound: MemoryReceiver,
}

fn start(runtime: &mut PubSubRuntime) -> Wiring {
    let (out_tx, out_rx) = memory::channel(256);
    let (in_tx, in_rx) = memory::channel(256);
    runtime
        .start_with(vec![out_tx], vec![in_rx], MonotonicClock::new())
        .unwrap();
    Wiring {
        inbound: in_tx,
        outbound: out_rx,
    }
}

/// Parse a published `A:x,B:y,` frame.
fn published_pair(frame: &[u8]) -> (u32, u32) {
    let pairs = text::decode_datagram(frame).unwrap();
    let get = |name: &str| -> u32 {
        pairs
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.parse().unwrap())
            .unwrap()
    };
    (get("A"), get("B"))
}

#[test]
fn values_flow_through_running_loops() {
    let mut runtime = PubSubRuntime::initialize(mirror_config()).unwrap();
    let wiring = start(&mut runtime);
    assert!(runtime.is_started());

    wiring.inbound.push(b"A:7,B:7,").unwrap();

    let a = NodeId::string(1, "A");
    let deadline = Instant::now() + TIMEOUT;
    while runtime.cache().get(&a).map(|dv| dv.value) != Some(Variant::from(7u32)) {
        assert!(Instant::now() < deadline, "subscriber never wrote A");
        std::thread::sleep(Duration::from_millis(1));
    }

    let mut seen = false;
    while !seen {
        assert!(Instant::now() < deadline, "publisher never sent A=7");
        match wiring.outbound.pop() {
            Some(frame) => seen = published_pair(&frame) == (7, 7),
            None => std::thread::sleep(Duration::from_millis(1)),
        }
    }

    let report = runtime.stop();
    assert!(!runtime.is_started());
    assert!(report.is_clean());
    let publisher = report.publishers[0].result.as_ref().unwrap();
    assert!(publisher.sent > 0);
    let subscriber = report.subscribers[0].result.as_ref().unwrap();
    assert_eq!(subscriber.frames, 1);
    assert_eq!(subscriber.values_written, 2);
    assert_eq!(report.publishers[0].name, "pub-out");
    assert_eq!(report.subscribers[0].name, "sub-in");
}

#[test]
fn published_frames_never_mix_two_writes() {
    let mut runtime = PubSubRuntime::initialize(mirror_config()).unwrap();
    let wiring = start(&mut runtime);

    let mut checked = 0;
    let mut n = 1u32;
    let deadline = Instant::now() + TIMEOUT;
    while n <= 2_000 && Instant::now() < deadline {
        let frame = format!("A:{n},B:{n},");
        if wiring.inbound.push(frame.as_bytes()).is_ok() {
            n += 1;
        }
        while let Some(frame) = wiring.outbound.pop() {
            let (a, b) = published_pair(&frame);
            assert_eq!(a, b, "torn read in published frame");
            checked += 1;
        }
    }

    let report = runtime.stop();
    while let Some(frame) = wiring.outbound.pop() {
        let (a, b) = published_pair(&frame);
        assert_eq!(a, b, "torn read in published frame");
        checked += 1;
    }
    assert!(report.is_clean());
    assert!(checked > 0);
}

#[test]
fn second_start_rejected() {
    let mut runtime = PubSubRuntime::initialize(mirror_config()).unwrap();
    let _wiring = start(&mut runtime);

    let (tx, _rx) = memory::channel(1);
    let (_in_tx, in_rx) = memory::channel(1);
    let err = runtime
        .start_with(vec![tx], vec![in_rx], MonotonicClock::new())
        .unwrap_err();
    assert!(matches!(err, RuntimeError::AlreadyStarted));
    assert!(runtime.stop().is_clean());
}

#[test]
fn construction_failure_starts_nothing() {
    let mut config = mirror_config();
    let mut big = publisher_config(
        "big",
        Encoding::Uadp,
        (0..40).map(|i| field(1, &format!("F{i}"), BuiltinType::UInt64)).collect(),
    );
    big.max_message_size = 64;
    config.publisher.push(big);

    let mut runtime = PubSubRuntime::initialize(config).unwrap();
    let (a, _ra) = memory::channel(1);
    let (b, _rb) = memory::channel(1);
    let (_in_tx, in_rx) = memory::channel(1);
    let err = runtime
        .start_with(vec![a, b], vec![in_rx], MonotonicClock::new())
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Publisher { ref name, .. } if name == "big"));
    assert!(!runtime.is_started());
    assert!(runtime.finished_loops().is_empty());
}

#[test]
fn shutdown_clears_the_cache() {
    let mut runtime = PubSubRuntime::initialize(mirror_config()).unwrap();
    let cache = std::sync::Arc::clone(runtime.cache());
    let _wiring = start(&mut runtime);

    let report = runtime.shutdown();
    assert!(report.is_clean());
    assert!(cache.is_empty());
    assert_eq!(cache.get(&NodeId::string(1, "A")), None);
    assert!(!cache.contains(&NodeId::string(1, "A")));
    assert_eq!(cache.field_type(&NodeId::string(1, "B")), None);
}
