//! Wire to cache to wire, driven one step at a time.

use std::sync::Arc;

use pubsub_cache::Cache;
use pubsub_common::clock::ManualClock;
use pubsub_common::pubsub::config::{Encoding, PubSubConfig, ReaderConfig};
use pubsub_common::pubsub::types::PublisherId;
use pubsub_common::types::{BuiltinType, DataValue, NodeId, StatusCode, Variant};
use pubsub_message::uadp;
use pubsub_runtime::{PollOutcome, PublisherLoop, SubscriberLoop};
use pubsub_transport::memory;

use super::{any_reader, field, publisher_config, subscriber_config};

fn counter() -> NodeId {
    NodeId::string(1, "Counter")
}

/// Text subscriber writing Counter and Speed, UADP publisher sending
/// Speed then Counter, both on one cache.
fn gateway_config() -> PubSubConfig {
    PubSubConfig {
        publisher: vec![publisher_config(
            "out",
            Encoding::Uadp,
            vec![
                field(1, "Speed", BuiltinType::Double),
                field(1, "Counter", BuiltinType::UInt32),
            ],
        )],
        subscriber: vec![subscriber_config(
            "in",
            Encoding::Text,
            any_reader(vec![
                field(1, "Counter", BuiltinType::UInt32),
                field(1, "Speed", BuiltinType::Double),
            ]),
        )],
        ..Default::default()
    }
}

#[test]
fn text_value_reaches_the_next_published_frame() {
    let config = gateway_config();
    config.validate().unwrap();
    let cache = Arc::new(Cache::initialize(&config).unwrap());
    let clock = ManualClock::new(10_000);

    let (gateway_tx, gateway_rx) = memory::channel(8);
    let (wire_tx, wire_rx) = memory::channel(8);
    let mut subscriber =
        SubscriberLoop::new(&config.subscriber[0], Arc::clone(&cache), gateway_rx, clock.clone())
            .unwrap();
    let mut publisher =
        PublisherLoop::new(&config.publisher[0], Arc::clone(&cache), wire_tx, clock.clone())
            .unwrap();

    gateway_tx.push(b"Counter:7,").unwrap();
    assert_eq!(
        subscriber.poll(),
        PollOutcome::Frame {
            written: 1,
            refused: 0,
            ignored: 0
        }
    );
    let stored = cache.get(&counter()).unwrap();
    assert_eq!(stored.value, Variant::from(7u32));
    assert_eq!(stored.value.builtin_type(), Some(BuiltinType::UInt32));

    publisher.cycle().unwrap();
    let frame = uadp::decode(&wire_rx.pop().unwrap()).unwrap();
    let fields = &frame.datasets[0].fields;
    assert_eq!(fields.len(), 2);
    assert_eq!(fields[1].value, Variant::from(7u32));
    assert_eq!(fields[0].value, Variant::from(0.0f64));
}

#[test]
fn rejected_frames_leave_published_values_alone() {
    let config = gateway_config();
    let cache = Arc::new(Cache::initialize(&config).unwrap());
    let clock = ManualClock::new(10_000);
    let (gateway_tx, gateway_rx) = memory::channel(8);
    let (wire_tx, wire_rx) = memory::channel(8);
    let mut subscriber =
        SubscriberLoop::new(&config.subscriber[0], Arc::clone(&cache), gateway_rx, clock.clone())
            .unwrap();
    let mut publisher =
        PublisherLoop::new(&config.publisher[0], Arc::clone(&cache), wire_tx, clock).unwrap();

    gateway_tx.push(b"Counter:7,Speed:2.5,").unwrap();
    subscriber.poll();

    // Bad value for Counter: the Speed pair in the same frame is dropped too.
    gateway_tx.push(b"Speed:9.5,Counter:seven,").unwrap();
    assert_eq!(subscriber.poll(), PollOutcome::Discarded);
    gateway_tx.push(b"Counter 8").unwrap();
    assert_eq!(subscriber.poll(), PollOutcome::Discarded);
    // Names no reader knows are skipped.
    gateway_tx.push(b"Pressure:3,").unwrap();
    assert_eq!(
        subscriber.poll(),
        PollOutcome::Frame {
            written: 0,
            refused: 0,
            ignored: 1
        }
    );

    publisher.cycle().unwrap();
    let frame = uadp::decode(&wire_rx.pop().unwrap()).unwrap();
    assert_eq!(frame.datasets[0].fields[0].value, Variant::from(2.5f64));
    assert_eq!(frame.datasets[0].fields[1].value, Variant::from(7u32));
    assert_eq!(subscriber.stats().discarded, 2);
}

#[test]
fn uadp_loopback_between_two_caches() {
    let publisher_cfg = publisher_config(
        "cell",
        Encoding::Uadp,
        vec![
            field(1, "Counter", BuiltinType::UInt32),
            field(1, "Label", BuiltinType::String),
        ],
    );
    let reader = ReaderConfig {
        publisher_id: Some(PublisherId::UInt64(7)),
        group_id: Some(100),
        writer_id: 1,
        field: vec![
            field(2, "RemoteCounter", BuiltinType::UInt32),
            field(2, "RemoteLabel", BuiltinType::String),
        ],
    };
    let subscriber_cfg = subscriber_config("mirror", Encoding::Uadp, reader);

    let local = Arc::new(
        Cache::initialize(&PubSubConfig {
            publisher: vec![publisher_cfg.clone()],
            ..Default::default()
        })
        .unwrap(),
    );
    let remote = Arc::new(
        Cache::initialize(&PubSubConfig {
            subscriber: vec![subscriber_cfg.clone()],
            ..Default::default()
        })
        .unwrap(),
    );

    let clock = ManualClock::new(0);
    let (tx, rx) = memory::channel(4);
    let mut publisher =
        PublisherLoop::new(&publisher_cfg, Arc::clone(&local), tx, clock.clone()).unwrap();
    let mut subscriber =
        SubscriberLoop::new(&subscriber_cfg, Arc::clone(&remote), rx, clock).unwrap();

    local.set(&counter(), DataValue::new(41u32));
    local.set(&NodeId::string(1, "Label"), DataValue::new("ready"));
    publisher.cycle().unwrap();

    assert_eq!(
        subscriber.poll(),
        PollOutcome::Frame {
            written: 2,
            refused: 0,
            ignored: 0
        }
    );
    let mirrored = remote.get(&NodeId::string(2, "RemoteCounter")).unwrap();
    assert_eq!(mirrored.value, Variant::from(41u32));
    assert_eq!(mirrored.status, StatusCode::GOOD);
    assert_eq!(
        remote.get(&NodeId::string(2, "RemoteLabel")).unwrap().value,
        Variant::from("ready")
    );
}

#[test]
fn uadp_frames_from_other_writers_are_ignored() {
    let publisher_cfg = publisher_config("cell", Encoding::Uadp, vec![field(1, "Counter", BuiltinType::UInt32)]);
    let reader = ReaderConfig {
        publisher_id: None,
        group_id: None,
        writer_id: 99,
        field: vec![field(1, "Counter", BuiltinType::UInt32)],
    };
    let subscriber_cfg = subscriber_config("picky", Encoding::Uadp, reader);
    let config = PubSubConfig {
        publisher: vec![publisher_cfg.clone()],
        subscriber: vec![subscriber_cfg.clone()],
        ..Default::default()
    };
    let cache = Arc::new(Cache::initialize(&config).unwrap());
    let clock = ManualClock::new(0);
    let (tx, rx) = memory::channel(4);
    let mut publisher =
        PublisherLoop::new(&publisher_cfg, Arc::clone(&cache), tx, clock.clone()).unwrap();
    let mut subscriber = SubscriberLoop::new(&subscriber_cfg, Arc::clone(&cache), rx, clock).unwrap();

    publisher.cycle().unwrap();
    assert_eq!(
        subscriber.poll(),
        PollOutcome::Frame {
            written: 0,
            refused: 0,
            ignored: 1
        }
    );
    assert_eq!(subscriber.stats().values_ignored, 1);
}

#[test]
fn non_ascii_values_are_discarded_and_reception_continues() {
    let config = gateway_config();
    let cache = Arc::new(Cache::initialize(&config).unwrap());
    let (gateway_tx, gateway_rx) = memory::channel(8);
    let mut subscriber =
        SubscriberLoop::new(&config.subscriber[0], Arc::clone(&cache), gateway_rx, ManualClock::new(0))
            .unwrap();

    for frame in ["Counter:€1,", "Counter:0x€,", "Speed:1.5,Counter:٣,"] {
        gateway_tx.push(frame.as_bytes()).unwrap();
        assert_eq!(subscriber.poll(), PollOutcome::Discarded, "{frame}");
    }
    assert_eq!(cache.get(&counter()).unwrap().value, Variant::from(0u32));

    gateway_tx.push(b"Counter:3,").unwrap();
    assert_eq!(
        subscriber.poll(),
        PollOutcome::Frame {
            written: 1,
            refused: 0,
            ignored: 0
        }
    );
    assert_eq!(cache.get(&counter()).unwrap().value, Variant::from(3u32));
    assert_eq!(subscriber.stats().discarded, 3);
}
