//! Configuration loading and runtime initialization.

use std::io::Write;
use std::path::Path;

use pubsub_common::config::{ConfigError, ConfigLoader};
use pubsub_common::pubsub::config::{Encoding, PubSubConfig};
use pubsub_common::types::{BuiltinType, NodeId, Variant};
use pubsub_runtime::{PubSubRuntime, RuntimeError};
use tempfile::NamedTempFile;

const SAMPLE_TOML: &str = include_str!("../../config/pubsub.toml");

#[test]
fn sample_config_initializes() {
    let config = PubSubConfig::from_toml_str(SAMPLE_TOML).expect("sample config parse");
    config.validate().expect("sample config validation");
    assert_eq!(config.publisher[0].encoding, Encoding::Uadp);
    assert_eq!(config.subscriber[0].encoding, Encoding::Text);

    let runtime = PubSubRuntime::initialize(config).unwrap();
    let cache = runtime.cache();
    // Counter and Speed are shared between publisher and subscriber.
    assert_eq!(cache.len(), 3);
    let flag = cache.get(&NodeId::numeric(1, 5001)).unwrap();
    assert_eq!(flag.value, Variant::from(false));
    assert_eq!(
        cache.field_type(&NodeId::string(1, "Speed")).map(|ty| ty.builtin),
        Some(BuiltinType::Double)
    );
}

#[test]
fn config_loads_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(SAMPLE_TOML.as_bytes()).unwrap();

    let config = PubSubConfig::load(file.path()).unwrap();
    assert_eq!(config.shared.service_name, "pubsub-rt-01");
    assert_eq!(config.publisher[0].period_us, 1000);
}

#[test]
fn missing_file_reported() {
    let err = PubSubConfig::load(Path::new("/nonexistent/pubsub.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::FileNotFound));
}

#[test]
fn empty_config_gives_empty_cache() {
    let config = PubSubConfig::from_toml_str("").unwrap();
    let runtime = PubSubRuntime::initialize(config).unwrap();
    assert!(runtime.cache().is_empty());
    assert_eq!(runtime.cache().get(&NodeId::string(1, "Counter")), None);
}

#[test]
fn conflicting_types_rejected_before_anything_runs() {
    let toml = r#"
[[publisher]]
name = "a"
address = "239.0.0.1:4840"
publisher_id = 1

[[publisher.dataset]]
writer_id = 1

[[publisher.dataset.field]]
node_id = "ns=1;s=Counter"
data_type = "UInt32"

[[subscriber]]
name = "b"
address = "127.0.0.1:5000"
encoding = "text"

[[subscriber.reader]]

[[subscriber.reader.field]]
node_id = "ns=1;s=Counter"
data_type = "Int64"
"#;
    let config = PubSubConfig::from_toml_str(toml).unwrap();
    let err = PubSubRuntime::initialize(config).err().unwrap();
    assert!(matches!(err, RuntimeError::Config(ConfigError::ValidationError(_))));
}
