//! UADP encode/decode integration tests.
//!
//! Messages built through the public builder API are decoded back and
//! compared header by header, DataSetMessage by DataSetMessage.

use pubsub_common::pubsub::types::{
    ContentFlags, DataSetContentMask, DataSetMessageType, FieldEncoding, PublisherId,
};
use pubsub_common::types::{
    BuiltinType, DataValue, DateTime, Scalar, ScalarArray, StatusCode, Variant,
};
use pubsub_message::{NetworkMessage, NetworkMessageError, uadp};

fn two_dataset_message() -> NetworkMessage {
    let mut msg = NetworkMessage::with_shape([3, 2]).unwrap();
    msg.set_header(PublisherId::UInt32(0xDEAD_BEEF), Some(12), Some(99), 1)
        .unwrap();

    msg.set_writer_id(0, 100).unwrap();
    msg.set_content_mask(
        0,
        DataSetContentMask::key_frame(
            ContentFlags::SEQUENCE_NUMBER
                | ContentFlags::STATUS
                | ContentFlags::TIMESTAMP
                | ContentFlags::PICOSECONDS,
        ),
    )
    .unwrap();
    {
        let ds = msg.dataset_mut(0).unwrap();
        ds.sequence_number = 4242;
        ds.status = StatusCode::UNCERTAIN;
        ds.timestamp = DateTime(133_000_000_000_000_000);
        ds.picoseconds = 17;
    }
    msg.set_field(0, 0, Variant::from(7u32)).unwrap();
    msg.set_field(0, 1, Variant::from(-3.5f64)).unwrap();
    let array = ScalarArray::new(BuiltinType::Int32, vec![Scalar::Int32(1), Scalar::Int32(-2)])
        .unwrap();
    msg.set_field(0, 2, Variant::Array(array)).unwrap();

    msg.set_writer_id(1, 200).unwrap();
    msg.set_content_mask(
        1,
        DataSetContentMask {
            flags: ContentFlags::empty(),
            field_encoding: FieldEncoding::DataValue,
            message_type: DataSetMessageType::KeyFrame,
        },
    )
    .unwrap();
    msg.set_field_value(
        1,
        0,
        DataValue::new("running").with_status(StatusCode::BAD_NO_DATA),
    )
    .unwrap();
    msg.set_field_value(
        1,
        1,
        DataValue::new(vec![1u8, 2, 3]).with_source_timestamp(DateTime(5)),
    )
    .unwrap();
    msg
}

// ─── Round-trip ─────────────────────────────────────────────────────

#[test]
fn header_survives_roundtrip() {
    let bytes = two_dataset_message().encode(1500).unwrap();
    let decoded = uadp::decode(&bytes).unwrap();

    assert_eq!(decoded.header.version, 1);
    assert_eq!(decoded.header.publisher_id, Some(PublisherId::UInt32(0xDEAD_BEEF)));
    assert_eq!(decoded.header.group_id, Some(12));
    assert_eq!(decoded.header.group_version, Some(99));
    assert_eq!(decoded.datasets.len(), 2);
}

#[test]
fn dataset_headers_follow_content_mask() {
    let bytes = two_dataset_message().encode(1500).unwrap();
    let decoded = uadp::decode(&bytes).unwrap();

    let first = &decoded.datasets[0];
    assert_eq!(first.writer_id, Some(100));
    assert_eq!(first.sequence_number, Some(4242));
    assert_eq!(first.status, Some(StatusCode::UNCERTAIN));
    assert_eq!(first.timestamp, Some(DateTime(133_000_000_000_000_000)));
    assert_eq!(first.picoseconds, Some(17));
    assert_eq!(first.content_mask.field_encoding, FieldEncoding::Variant);

    let second = &decoded.datasets[1];
    assert_eq!(second.writer_id, Some(200));
    assert_eq!(second.sequence_number, None);
    assert_eq!(second.status, None);
    assert_eq!(second.timestamp, None);
    assert_eq!(second.content_mask.field_encoding, FieldEncoding::DataValue);
}

#[test]
fn fields_survive_roundtrip() {
    let msg = two_dataset_message();
    let bytes = msg.encode(1500).unwrap();
    let decoded = uadp::decode(&bytes).unwrap();

    for (sent, received) in msg.datasets().iter().zip(&decoded.datasets) {
        assert_eq!(sent.field_count(), received.fields.len());
        for (i, field) in received.fields.iter().enumerate() {
            let original = sent.field(i).unwrap();
            assert_eq!(field.value, original.value);
        }
    }
    // DataValue encoding carries status and timestamps per field.
    assert_eq!(decoded.datasets[1].fields[0].status, StatusCode::BAD_NO_DATA);
    assert_eq!(decoded.datasets[1].fields[1].source_timestamp, Some(DateTime(5)));
}

#[test]
fn string_publisher_id() {
    let mut msg = NetworkMessage::create(1, 1).unwrap();
    msg.set_header(PublisherId::String("cell-7".into()), None, None, 1)
        .unwrap();
    msg.set_field(0, 0, Variant::from(1u8)).unwrap();
    let decoded = uadp::decode(&msg.encode(1500).unwrap()).unwrap();
    assert_eq!(
        decoded.header.publisher_id,
        Some(PublisherId::String("cell-7".into()))
    );
    assert_eq!(decoded.header.group_id, None);
}

// ─── Ceiling ────────────────────────────────────────────────────────

#[test]
fn ceiling_applies_to_whole_message() {
    let msg = two_dataset_message();
    let len = msg.encode(1500).unwrap().len();
    let mut buf = vec![0u8; len];
    assert_eq!(msg.encode_to_slice(&mut buf), Ok(len));
    assert!(matches!(
        msg.encode_to_slice(&mut buf[..len - 1]),
        Err(NetworkMessageError::BufferTooSmall { .. })
    ));
}
