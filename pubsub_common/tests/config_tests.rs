//! Configuration file tests.
//!
//! Loads complete `pubsub.toml` files from disk and checks parsing,
//! defaults, and cross-connection validation.

use pubsub_common::config::{ConfigError, ConfigLoader, LogLevel};
use pubsub_common::pubsub::config::{Encoding, PubSubConfig, TxClock};
use pubsub_common::pubsub::types::{ContentFlags, FieldEncoding, PublisherId};
use pubsub_common::types::{BuiltinType, NodeId, ValueRank};
use std::fs;
use tempfile::TempDir;

const FULL: &str = r#"
[shared]
log_level = "debug"
service_name = "cell-7"

[[publisher]]
name = "plc-out"
address = "239.0.0.1:4840"
interface = "192.168.1.10"
period_us = 500
publisher_id = "plc-7"
group_id = 1
group_version = 42
tx_time = { clock = "tai", lead_us = 50 }
rt = { cpu_core = 2 }

[[publisher.dataset]]
writer_id = 1
content_mask = { sequence_number = true, timestamp = true, field_encoding = "data_value" }

[[publisher.dataset.field]]
node_id = "ns=1;s=Counter"
data_type = "UInt32"

[[publisher.dataset.field]]
node_id = "ns=1;i=1001"
data_type = "Double"
value_rank = 1

[[publisher.dataset]]
writer_id = 2
content_mask = { message_type = "keep_alive" }

[[subscriber]]
name = "gw-in"
address = "127.0.0.1:5000"
encoding = "text"
wait_increment_us = 250

[[subscriber.reader]]

[[subscriber.reader.field]]
node_id = "ns=1;s=Counter"
data_type = "UInt32"

[[subscriber.reader.field]]
node_id = "ns=1;s=Setpoint"
data_type = "Float"
"#;

fn write_config(dir: &TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("pubsub.toml");
    fs::write(&path, content).unwrap();
    path
}

// ─── Loading ────────────────────────────────────────────────────────

#[test]
fn full_config_loads_and_validates() {
    let dir = TempDir::new().unwrap();
    let config = PubSubConfig::load(&write_config(&dir, FULL)).unwrap();
    config.validate().unwrap();

    assert_eq!(config.shared.log_level, LogLevel::Debug);
    assert_eq!(config.shared.service_name, "cell-7");

    let p = &config.publisher[0];
    assert_eq!(p.period_us, 500);
    assert_eq!(p.publisher_id, PublisherId::String("plc-7".into()));
    assert_eq!(p.group_version, Some(42));
    assert_eq!(p.tx_time.unwrap().clock, TxClock::Tai);
    assert_eq!(p.rt.unwrap().priority, 80);
    assert_eq!(p.field_count(), 2);

    let mask = p.dataset[0].content_mask.to_mask();
    assert!(mask.has(ContentFlags::SEQUENCE_NUMBER | ContentFlags::TIMESTAMP));
    assert!(!mask.has(ContentFlags::STATUS));
    assert_eq!(mask.field_encoding, FieldEncoding::DataValue);

    let s = &config.subscriber[0];
    assert_eq!(s.encoding, Encoding::Text);
    assert_eq!(s.wait_increment_us, 250);
    assert_eq!(s.text_namespace, 1);
    assert_eq!(s.reader[0].writer_id, 0);
}

#[test]
fn cache_fields_are_deduplicated_in_declaration_order() {
    let config = PubSubConfig::from_toml_str(FULL).unwrap();
    let fields = config.cache_fields().unwrap();
    let ids: Vec<_> = fields.iter().map(|(id, _)| id.clone()).collect();
    assert_eq!(
        ids,
        vec![
            NodeId::string(1, "Counter"),
            NodeId::numeric(1, 1001),
            NodeId::string(1, "Setpoint"),
        ]
    );
    assert_eq!(fields[1].1.builtin, BuiltinType::Double);
    assert_eq!(fields[1].1.rank, ValueRank::Array);
}

#[test]
fn missing_file_reports_not_found() {
    let dir = TempDir::new().unwrap();
    let result = PubSubConfig::load(&dir.path().join("absent.toml"));
    assert!(matches!(result, Err(ConfigError::FileNotFound)));
}

// ─── Validation ─────────────────────────────────────────────────────

#[test]
fn bad_node_id_is_parse_error() {
    let content = FULL.replace("ns=1;i=1001", "ns=1;q=1001");
    assert!(matches!(
        PubSubConfig::from_toml_str(&content),
        Err(ConfigError::ParseError(_))
    ));
}

#[test]
fn unknown_data_type_is_parse_error() {
    let content = FULL.replace("\"Double\"", "\"Guid\"");
    assert!(matches!(
        PubSubConfig::from_toml_str(&content),
        Err(ConfigError::ParseError(_))
    ));
}

#[test]
fn duplicate_connection_names_rejected() {
    let content = FULL.replace("name = \"gw-in\"", "name = \"plc-out\"");
    let config = PubSubConfig::from_toml_str(&content).unwrap();
    assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
}

#[test]
fn subscriber_type_conflict_rejected() {
    let content = FULL.replace(
        "node_id = \"ns=1;s=Setpoint\"\ndata_type = \"Float\"",
        "node_id = \"ns=1;s=Counter\"\ndata_type = \"Int32\"",
    );
    let config = PubSubConfig::from_toml_str(&content).unwrap();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("ns=1;s=Counter"));
}

#[test]
fn text_publisher_requires_string_node_ids() {
    let content = FULL.replace(
        "period_us = 500",
        "period_us = 500\nencoding = \"text\"",
    );
    let config = PubSubConfig::from_toml_str(&content).unwrap();
    assert!(config.validate().is_err());
}
