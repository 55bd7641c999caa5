//! Frame decoders: one datagram in, `(NodeId, DataValue)` pairs out.
//!
//! A decoder validates the whole datagram before the subscriber touches
//! the cache. Any error means the frame is dropped as a unit.

use std::collections::HashMap;

use pubsub_common::config::ConfigError;
use pubsub_common::pubsub::config::{Encoding, ReaderConfig, SubscriberConfig};
use pubsub_common::pubsub::types::{DataSetMessageType, PublisherId};
use pubsub_common::types::{DataValue, FieldType, NodeId, Scalar, ValueRank, Variant};
use pubsub_message::uadp::{self, DecodedDataSetMessage, DecodedHeader};
use pubsub_message::{DecodeError, DecodeResult, text};

/// Datagram decoder used by the subscriber loop.
pub trait FrameDecoder: Send {
    /// Decode `frame`, appending the values to write to `out`.
    ///
    /// Returns how many decoded items (text pairs, DataSetMessages) no
    /// configured target claimed. On error the caller discards `out`.
    fn decode(&mut self, frame: &[u8], out: &mut Vec<(NodeId, DataValue)>) -> DecodeResult<usize>;
}

/// Build the decoder for a subscriber connection.
pub fn decoder_for(cfg: &SubscriberConfig) -> Result<Box<dyn FrameDecoder>, ConfigError> {
    Ok(match cfg.encoding {
        Encoding::Uadp => Box::new(UadpDecoder::from_config(cfg)?),
        Encoding::Text => Box::new(TextDecoder::from_config(cfg)?),
    })
}

// ─── Text gateway ───────────────────────────────────────────────────

/// `Name:Value` decoder. `Name` maps to `ns=<namespace>;s=Name`.
#[derive(Debug, Clone)]
pub struct TextDecoder {
    targets: HashMap<String, (NodeId, FieldType)>,
}

impl TextDecoder {
    /// Decoder for the given targets; only String NodeIds in `namespace`
    /// can be addressed by name.
    pub fn new<I>(namespace: u16, targets: I) -> Self
    where
        I: IntoIterator<Item = (NodeId, FieldType)>,
    {
        let targets = targets
            .into_iter()
            .filter(|(id, _)| id.namespace() == namespace)
            .filter_map(|(id, ty)| Some((id.as_str_id()?.to_string(), (id, ty))))
            .collect();
        Self { targets }
    }

    /// Decoder for every reader field of a subscriber connection.
    pub fn from_config(cfg: &SubscriberConfig) -> Result<Self, ConfigError> {
        let mut targets = Vec::new();
        for field in cfg.reader.iter().flat_map(|r| r.field.iter()) {
            targets.push((field.node_id.clone(), field.field_type()?));
        }
        Ok(Self::new(cfg.text_namespace, targets))
    }

    /// Number of addressable names.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// True when no name is addressable.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl FrameDecoder for TextDecoder {
    fn decode(&mut self, frame: &[u8], out: &mut Vec<(NodeId, DataValue)>) -> DecodeResult<usize> {
        let pairs = text::decode_datagram(frame)?;
        let mut ignored = 0;
        for (name, value) in pairs {
            let Some((node_id, ty)) = self.targets.get(name) else {
                ignored += 1;
                continue;
            };
            let invalid = || DecodeError::InvalidValue {
                name: name.to_string(),
                expected: ty.builtin,
            };
            if ty.rank != ValueRank::Scalar {
                return Err(invalid());
            }
            let scalar = Scalar::parse(ty.builtin, value).map_err(|_| invalid())?;
            out.push((node_id.clone(), DataValue::new(Variant::Scalar(scalar))));
        }
        Ok(ignored)
    }
}

// ─── UADP ───────────────────────────────────────────────────────────

/// DataSetReader: selects DataSetMessages and names their fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderBinding {
    publisher_id: Option<PublisherId>,
    group_id: Option<u16>,
    writer_id: u16,
    fields: Vec<(NodeId, FieldType)>,
}

impl ReaderBinding {
    /// Reader from configuration.
    pub fn from_config(cfg: &ReaderConfig) -> Result<Self, ConfigError> {
        let fields = cfg
            .field
            .iter()
            .map(|f| Ok((f.node_id.clone(), f.field_type()?)))
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(Self {
            publisher_id: cfg.publisher_id.clone(),
            group_id: cfg.group_id,
            writer_id: cfg.writer_id,
            fields,
        })
    }

    fn accepts(&self, header: &DecodedHeader, ds: &DecodedDataSetMessage) -> bool {
        let publisher_ok = match (&self.publisher_id, &header.publisher_id) {
            (None, _) => true,
            (Some(expected), Some(actual)) => expected.matches(actual),
            (Some(_), None) => false,
        };
        let group_ok = self.group_id.is_none() || self.group_id == header.group_id;
        let writer_ok = self.writer_id == 0 || ds.writer_id == Some(self.writer_id);
        publisher_ok && group_ok && writer_ok
    }
}

/// UADP NetworkMessage decoder with reader matching.
///
/// DataSetMessage status and timestamp propagate into the field values:
/// a Good field takes the message status, a field without source
/// timestamp takes the message timestamp.
#[derive(Debug, Clone, Default)]
pub struct UadpDecoder {
    readers: Vec<ReaderBinding>,
}

impl UadpDecoder {
    /// Decoder for explicit readers.
    pub fn new(readers: Vec<ReaderBinding>) -> Self {
        Self { readers }
    }

    /// Decoder for the readers of a subscriber connection.
    pub fn from_config(cfg: &SubscriberConfig) -> Result<Self, ConfigError> {
        let readers = cfg
            .reader
            .iter()
            .map(ReaderBinding::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(readers))
    }
}

impl FrameDecoder for UadpDecoder {
    fn decode(&mut self, frame: &[u8], out: &mut Vec<(NodeId, DataValue)>) -> DecodeResult<usize> {
        let msg = uadp::decode(frame)?;
        let mut ignored = 0;
        for ds in &msg.datasets {
            if !ds.valid {
                ignored += 1;
                continue;
            }
            // Keep-alives carry no fields.
            if ds.content_mask.message_type == DataSetMessageType::KeepAlive {
                continue;
            }
            let mut claimed = false;
            for reader in self.readers.iter().filter(|r| r.accepts(&msg.header, ds)) {
                claimed = true;
                if ds.fields.len() != reader.fields.len() {
                    return Err(DecodeError::FieldCount {
                        writer_id: ds.writer_id.unwrap_or(0),
                        expected: reader.fields.len(),
                        actual: ds.fields.len(),
                    });
                }
                for ((node_id, ty), field) in reader.fields.iter().zip(&ds.fields) {
                    if !ty.matches(&field.value) {
                        return Err(DecodeError::InvalidValue {
                            name: node_id.to_string(),
                            expected: ty.builtin,
                        });
                    }
                    let mut value = field.clone();
                    if let Some(status) = ds.status
                        && value.status.is_good()
                    {
                        value.status = status;
                    }
                    if value.source_timestamp.is_none() {
                        value.source_timestamp = ds.timestamp;
                    }
                    out.push((node_id.clone(), value));
                }
            }
            if !claimed {
                ignored += 1;
            }
        }
        Ok(ignored)
    }
}
