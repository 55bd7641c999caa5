//! PubSub configuration types.
//!
//! - `PubSubConfig` - root of `pubsub.toml`
//! - `PublisherConfig` / `DataSetConfig` - writer side
//! - `SubscriberConfig` / `ReaderConfig` - reader side
//! - `FieldConfig` - one (NodeId, type, value rank) entry
//!
//! The configuration is consumed read-only. [`PubSubConfig::validate`] must
//! pass before the cache or any loop is built.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::net::{Ipv4Addr, SocketAddr};

use super::types::{ContentFlags, DataSetContentMask, DataSetMessageType, FieldEncoding, PublisherId};
use crate::config::{ConfigError, SharedConfig};
use crate::consts::{
    DEFAULT_LATE_AFTER_US, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_PERIOD_US, DEFAULT_TEXT_NAMESPACE,
    DEFAULT_WAIT_INCREMENT_US, MAX_MESSAGE_SIZE, MIN_MESSAGE_SIZE,
};
use crate::types::{BuiltinType, FieldType, NodeId};

fn default_period_us() -> u64 {
    DEFAULT_PERIOD_US
}

fn default_max_message_size() -> usize {
    DEFAULT_MAX_MESSAGE_SIZE
}

fn default_wait_increment_us() -> u64 {
    DEFAULT_WAIT_INCREMENT_US
}

fn default_late_after_us() -> u64 {
    DEFAULT_LATE_AFTER_US
}

fn default_text_namespace() -> u16 {
    DEFAULT_TEXT_NAMESPACE
}

fn default_uadp_version() -> u8 {
    1
}

fn default_value_rank() -> i32 {
    -1
}

fn default_rt_priority() -> i32 {
    80
}

/// Wire format of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// Binary UADP NetworkMessage.
    #[default]
    Uadp,
    /// Comma separated `Name:Value` pairs (UDP gateway).
    Text,
}

/// Root configuration loaded from `pubsub.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PubSubConfig {
    /// Common settings.
    #[serde(default)]
    pub shared: SharedConfig,

    /// Publisher connections.
    #[serde(default)]
    pub publisher: Vec<PublisherConfig>,

    /// Subscriber connections.
    #[serde(default)]
    pub subscriber: Vec<SubscriberConfig>,
}

/// One field of a DataSet: target variable and its declared type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldConfig {
    /// Cache key.
    pub node_id: NodeId,
    /// Built-in type name, e.g. `"UInt32"`.
    pub data_type: BuiltinType,
    /// OPC UA value rank (-1 scalar, 0/1 array, 2 matrix).
    #[serde(default = "default_value_rank")]
    pub value_rank: i32,
}

impl FieldConfig {
    /// Declared type of this field.
    pub fn field_type(&self) -> Result<FieldType, ConfigError> {
        FieldType::from_value_rank(self.data_type, self.value_rank).map_err(|e| {
            ConfigError::ValidationError(format!("field {}: {e}", self.node_id))
        })
    }
}

/// DataSetMessage content mask as written in TOML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContentMaskConfig {
    pub sequence_number: bool,
    pub status: bool,
    pub timestamp: bool,
    pub picoseconds: bool,
    pub field_encoding: FieldEncoding,
    pub message_type: DataSetMessageType,
}

impl ContentMaskConfig {
    /// Wire-level mask.
    pub fn to_mask(&self) -> DataSetContentMask {
        let mut flags = ContentFlags::empty();
        flags.set(ContentFlags::SEQUENCE_NUMBER, self.sequence_number);
        flags.set(ContentFlags::STATUS, self.status);
        flags.set(ContentFlags::TIMESTAMP, self.timestamp);
        flags.set(ContentFlags::PICOSECONDS, self.picoseconds);
        DataSetContentMask {
            flags,
            field_encoding: self.field_encoding,
            message_type: self.message_type,
        }
    }
}

/// One DataSetWriter of a publisher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataSetConfig {
    /// DataSetWriterId.
    pub writer_id: u16,
    /// Optional header fields and encoding.
    #[serde(default)]
    pub content_mask: ContentMaskConfig,
    /// Ordered fields.
    #[serde(default)]
    pub field: Vec<FieldConfig>,
}

/// Clock on which SO_TXTIME transmit times are expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxClock {
    /// CLOCK_MONOTONIC.
    #[default]
    Monotonic,
    /// CLOCK_TAI (required by the `etf` qdisc).
    Tai,
}

/// Transmit-time scheduling settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TxTimeConfig {
    /// Clock the kernel uses to interpret the TX time.
    #[serde(default)]
    pub clock: TxClock,
    /// Offset added to the cycle deadline [µs].
    #[serde(default)]
    pub lead_us: u64,
}

/// Real-time thread settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RtConfig {
    /// CPU core the loop thread is pinned to.
    pub cpu_core: usize,
    /// SCHED_FIFO priority (1-99).
    #[serde(default = "default_rt_priority")]
    pub priority: i32,
}

/// Publisher connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PublisherConfig {
    /// Connection name used in logs.
    pub name: String,

    /// Destination `ip:port` (unicast or multicast).
    pub address: SocketAddr,

    /// IPv4 address of the outgoing multicast interface.
    #[serde(default)]
    pub interface: Option<Ipv4Addr>,

    /// Cycle period [µs].
    #[serde(default = "default_period_us")]
    pub period_us: u64,

    /// PublisherId written in every NetworkMessage header.
    pub publisher_id: PublisherId,

    /// UADP version (0..=15).
    #[serde(default = "default_uadp_version")]
    pub version: u8,

    /// WriterGroupId.
    #[serde(default)]
    pub group_id: Option<u16>,

    /// WriterGroup version.
    #[serde(default)]
    pub group_version: Option<u32>,

    /// Ceiling of one encoded message [bytes].
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Wire format.
    #[serde(default)]
    pub encoding: Encoding,

    /// Transmit-time scheduling (Linux SO_TXTIME).
    #[serde(default)]
    pub tx_time: Option<TxTimeConfig>,

    /// Real-time thread setup.
    #[serde(default)]
    pub rt: Option<RtConfig>,

    /// DataSetWriters, encoded in this order.
    #[serde(default)]
    pub dataset: Vec<DataSetConfig>,
}

/// DataSetReader: selects one DataSetMessage and maps its fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReaderConfig {
    /// Expected PublisherId. `None` accepts any publisher.
    #[serde(default)]
    pub publisher_id: Option<PublisherId>,

    /// Expected WriterGroupId. `None` accepts any group.
    #[serde(default)]
    pub group_id: Option<u16>,

    /// Expected DataSetWriterId. 0 accepts any writer.
    #[serde(default)]
    pub writer_id: u16,

    /// Target variables, in DataSet field order.
    #[serde(default)]
    pub field: Vec<FieldConfig>,
}

/// Subscriber connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubscriberConfig {
    /// Connection name used in logs.
    pub name: String,

    /// Local `ip:port` to bind; multicast addresses are joined.
    pub address: SocketAddr,

    /// IPv4 address of the interface used for the multicast join.
    #[serde(default)]
    pub interface: Option<Ipv4Addr>,

    /// Wire format.
    #[serde(default)]
    pub encoding: Encoding,

    /// Receive buffer size [bytes].
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Retry increment when no datagram is available [µs].
    #[serde(default = "default_wait_increment_us")]
    pub wait_increment_us: u64,

    /// Time without data before a late-reception warning [µs].
    #[serde(default = "default_late_after_us")]
    pub late_after_us: u64,

    /// Namespace of `ns=<n>;s=<name>` keys built by the text decoder.
    #[serde(default = "default_text_namespace")]
    pub text_namespace: u16,

    /// Real-time thread setup.
    #[serde(default)]
    pub rt: Option<RtConfig>,

    /// DataSetReaders.
    #[serde(default)]
    pub reader: Vec<ReaderConfig>,
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(msg.into())
}

fn check_message_size(owner: &str, size: usize) -> Result<(), ConfigError> {
    if !(MIN_MESSAGE_SIZE..=MAX_MESSAGE_SIZE).contains(&size) {
        return Err(invalid(format!(
            "{owner}: max_message_size {size} outside {MIN_MESSAGE_SIZE}..={MAX_MESSAGE_SIZE}"
        )));
    }
    Ok(())
}

fn check_rt(owner: &str, rt: Option<&RtConfig>) -> Result<(), ConfigError> {
    if let Some(rt) = rt
        && !(1..=99).contains(&rt.priority)
    {
        return Err(invalid(format!(
            "{owner}: rt priority {} outside 1..=99",
            rt.priority
        )));
    }
    Ok(())
}

impl PublisherConfig {
    /// Validate this publisher in isolation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(invalid("publisher name cannot be empty"));
        }
        let owner = format!("publisher '{}'", self.name);
        if self.period_us == 0 {
            return Err(invalid(format!("{owner}: period_us must be > 0")));
        }
        if self.version > 0x0F {
            return Err(invalid(format!("{owner}: version {} exceeds 15", self.version)));
        }
        check_message_size(&owner, self.max_message_size)?;
        check_rt(&owner, self.rt.as_ref())?;
        if self.dataset.is_empty() {
            return Err(invalid(format!("{owner}: at least one dataset is required")));
        }
        if self.dataset.len() > usize::from(u8::MAX) {
            return Err(invalid(format!("{owner}: too many datasets")));
        }

        let mut writer_ids = HashSet::new();
        for ds in &self.dataset {
            if ds.writer_id == 0 {
                return Err(invalid(format!("{owner}: writer_id 0 is reserved")));
            }
            if !writer_ids.insert(ds.writer_id) {
                return Err(invalid(format!(
                    "{owner}: duplicate writer_id {}",
                    ds.writer_id
                )));
            }
            match ds.content_mask.message_type {
                DataSetMessageType::KeyFrame if ds.field.is_empty() => {
                    return Err(invalid(format!(
                        "{owner}: key frame dataset {} has no fields",
                        ds.writer_id
                    )));
                }
                DataSetMessageType::KeepAlive if !ds.field.is_empty() => {
                    return Err(invalid(format!(
                        "{owner}: keep-alive dataset {} cannot carry fields",
                        ds.writer_id
                    )));
                }
                _ => {}
            }
            if ds.field.len() > usize::from(u16::MAX) {
                return Err(invalid(format!("{owner}: dataset {} has too many fields", ds.writer_id)));
            }
            for field in &ds.field {
                field.field_type()?;
                if self.encoding == Encoding::Text && field.node_id.as_str_id().is_none() {
                    return Err(invalid(format!(
                        "{owner}: text encoding needs String NodeIds, got {}",
                        field.node_id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Total number of fields across all datasets.
    pub fn field_count(&self) -> usize {
        self.dataset.iter().map(|ds| ds.field.len()).sum()
    }
}

impl SubscriberConfig {
    /// Validate this subscriber in isolation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(invalid("subscriber name cannot be empty"));
        }
        let owner = format!("subscriber '{}'", self.name);
        if self.wait_increment_us == 0 {
            return Err(invalid(format!("{owner}: wait_increment_us must be > 0")));
        }
        check_message_size(&owner, self.max_message_size)?;
        check_rt(&owner, self.rt.as_ref())?;
        if self.reader.is_empty() {
            return Err(invalid(format!("{owner}: at least one reader is required")));
        }
        for reader in &self.reader {
            if reader.field.is_empty() {
                return Err(invalid(format!(
                    "{owner}: reader for writer {} has no fields",
                    reader.writer_id
                )));
            }
            for field in &reader.field {
                field.field_type()?;
                if self.encoding == Encoding::Text {
                    let in_text_ns = field.node_id.as_str_id().is_some()
                        && field.node_id.namespace() == self.text_namespace;
                    if !in_text_ns {
                        return Err(invalid(format!(
                            "{owner}: text encoding maps names to ns={};s=<name>, got {}",
                            self.text_namespace, field.node_id
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

impl PubSubConfig {
    /// Validate the whole configuration.
    ///
    /// # Errors
    ///
    /// `ConfigError::ValidationError` on the first violated rule, including
    /// one NodeId declared with two different types.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        let mut names = HashSet::new();
        for publisher in &self.publisher {
            publisher.validate()?;
            if !names.insert(publisher.name.as_str()) {
                return Err(invalid(format!("duplicate connection name '{}'", publisher.name)));
            }
        }
        for subscriber in &self.subscriber {
            subscriber.validate()?;
            if !names.insert(subscriber.name.as_str()) {
                return Err(invalid(format!("duplicate connection name '{}'", subscriber.name)));
            }
        }

        self.cache_fields().map(|_| ())
    }

    /// Every distinct cache key with its declared type, in declaration order
    /// (publishers first).
    ///
    /// A NodeId used by several fields with the same type yields one entry.
    pub fn cache_fields(&self) -> Result<Vec<(NodeId, FieldType)>, ConfigError> {
        let publisher_fields = self
            .publisher
            .iter()
            .flat_map(|p| p.dataset.iter())
            .flat_map(|ds| ds.field.iter());
        let subscriber_fields = self
            .subscriber
            .iter()
            .flat_map(|s| s.reader.iter())
            .flat_map(|r| r.field.iter());

        let mut seen: HashMap<&NodeId, FieldType> = HashMap::new();
        let mut fields = Vec::new();
        for field in publisher_fields.chain(subscriber_fields) {
            let ty = field.field_type()?;
            match seen.get(&field.node_id) {
                Some(existing) if *existing != ty => {
                    return Err(invalid(format!(
                        "{} declared as {:?}/{:?} and {:?}/{:?}",
                        field.node_id, existing.builtin, existing.rank, ty.builtin, ty.rank
                    )));
                }
                Some(_) => {}
                None => {
                    seen.insert(&field.node_id, ty);
                    fields.push((field.node_id.clone(), ty));
                }
            }
        }
        Ok(fields)
    }
}
