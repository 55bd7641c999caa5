//! Shared builders for the integration tests.

mod gateway;
mod runtime;
mod scheduling;
mod startup;

use pubsub_common::pubsub::config::{
    ContentMaskConfig, DataSetConfig, Encoding, FieldConfig, PublisherConfig, ReaderConfig,
    SubscriberConfig,
};
use pubsub_common::pubsub::types::PublisherId;
use pubsub_common::types::{BuiltinType, NodeId};

pub fn field(ns: u16, name: &str, ty: BuiltinType) -> FieldConfig {
    FieldConfig {
        node_id: NodeId::string(ns, name),
        data_type: ty,
        value_rank: -1,
    }
}

pub fn publisher_config(name: &str, encoding: Encoding, fields: Vec<FieldConfig>) -> PublisherConfig {
    PublisherConfig {
        name: name.into(),
        address: "127.0.0.1:4840".parse().unwrap(),
        interface: None,
        period_us: 100,
        publisher_id: PublisherId::UInt16(7),
        version: 1,
        group_id: Some(100),
        group_version: None,
        max_message_size: 1500,
        encoding,
        tx_time: None,
        rt: None,
        dataset: vec![DataSetConfig {
            writer_id: 1,
            content_mask: ContentMaskConfig {
                sequence_number: true,
                status: true,
                ..ContentMaskConfig::default()
            },
            field: fields,
        }],
    }
}

pub fn subscriber_config(
    name: &str,
    encoding: Encoding,
    reader: ReaderConfig,
) -> SubscriberConfig {
    SubscriberConfig {
        name: name.into(),
        address: "127.0.0.1:5000".parse().unwrap(),
        interface: None,
        encoding,
        max_message_size: 1500,
        wait_increment_us: 100,
        late_after_us: 100_000,
        text_namespace: 1,
        rt: None,
        reader: vec![reader],
    }
}

pub fn any_reader(fields: Vec<FieldConfig>) -> ReaderConfig {
    ReaderConfig {
        publisher_id: None,
        group_id: None,
        writer_id: 0,
        field: fields,
    }
}
