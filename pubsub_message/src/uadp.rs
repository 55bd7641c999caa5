//! UADP NetworkMessage binary layout.
//!
//! ```text
//! UADPFlags        u8   version (bits 0-3), PublisherId, GroupHeader,
//!                       PayloadHeader, ExtendedFlags1
//! ExtendedFlags1   u8   PublisherId type (bits 0-2), ...      (optional)
//! PublisherId      u8 | u16 | u32 | u64 | String              (optional)
//! GroupHeader      flags u8, WriterGroupId u16, GroupVersion u32
//! PayloadHeader    count u8, DataSetWriterId u16 * count
//! Sizes            u16 * count                                 (count > 1)
//! DataSetMessage * count
//! ```
//!
//! Each DataSetMessage starts with DataSetFlags1 (valid, field encoding,
//! sequence number, status, flags2) and optionally DataSetFlags2 (message
//! type, timestamp, picoseconds), followed by the enabled header fields and,
//! for key frames, a u16 field count and the fields. Security, chunking,
//! promoted fields, raw field encoding, delta frames and events are not
//! supported.

use pubsub_common::pubsub::types::{
    ContentFlags, DataSetContentMask, DataSetMessageType, FieldEncoding, PublisherId,
};
use pubsub_common::types::{DataValue, DateTime, StatusCode};

use crate::binary::{Decoder, Encoder};
use crate::error::{DecodeError, DecodeResult, NetworkMessageError};
use crate::network_message::{DataSetMessage, NetworkMessage};

// UADPFlags
const VERSION_MASK: u8 = 0x0F;
const PUBLISHER_ID_ENABLED: u8 = 0x10;
const GROUP_HEADER_ENABLED: u8 = 0x20;
const PAYLOAD_HEADER_ENABLED: u8 = 0x40;
const EXTENDED_FLAGS1_ENABLED: u8 = 0x80;

// ExtendedFlags1
const PUBLISHER_ID_TYPE_MASK: u8 = 0x07;
const DATASET_CLASS_ID_ENABLED: u8 = 0x08;
const SECURITY_ENABLED: u8 = 0x10;
const NM_TIMESTAMP_ENABLED: u8 = 0x20;
const NM_PICOSECONDS_ENABLED: u8 = 0x40;
const EXTENDED_FLAGS2_ENABLED: u8 = 0x80;

// ExtendedFlags2
const CHUNK_MESSAGE: u8 = 0x01;
const PROMOTED_FIELDS_ENABLED: u8 = 0x02;
const NM_TYPE_MASK: u8 = 0x1C;

// GroupFlags
const WRITER_GROUP_ID_ENABLED: u8 = 0x01;
const GROUP_VERSION_ENABLED: u8 = 0x02;
const NETWORK_MESSAGE_NUMBER_ENABLED: u8 = 0x04;
const GROUP_SEQUENCE_NUMBER_ENABLED: u8 = 0x08;

// DataSetFlags1
const DSM_VALID: u8 = 0x01;
const FIELD_ENCODING_SHIFT: u8 = 1;
const FIELD_ENCODING_MASK: u8 = 0x06;
const DSM_SEQUENCE_NUMBER_ENABLED: u8 = 0x08;
const DSM_STATUS_ENABLED: u8 = 0x10;
const DSM_MAJOR_VERSION_ENABLED: u8 = 0x20;
const DSM_MINOR_VERSION_ENABLED: u8 = 0x40;
const DSM_FLAGS2_ENABLED: u8 = 0x80;

// DataSetFlags2
const DSM_TYPE_MASK: u8 = 0x0F;
const DSM_TIMESTAMP_ENABLED: u8 = 0x10;
const DSM_PICOSECONDS_ENABLED: u8 = 0x20;

const FIELD_ENCODING_VARIANT: u8 = 0;
const FIELD_ENCODING_RAW: u8 = 1;
const FIELD_ENCODING_DATA_VALUE: u8 = 2;

const DSM_TYPE_KEY_FRAME: u8 = 0;
const DSM_TYPE_KEEP_ALIVE: u8 = 3;

fn publisher_id_type(id: &PublisherId) -> u8 {
    match id {
        PublisherId::Byte(_) => 0,
        PublisherId::UInt16(_) => 1,
        PublisherId::UInt32(_) => 2,
        PublisherId::UInt64(_) => 3,
        PublisherId::String(_) => 4,
    }
}

/// Encode `msg` into `out`; see [`NetworkMessage::encode_to_slice`].
pub(crate) fn encode(msg: &NetworkMessage, out: &mut [u8]) -> Result<usize, NetworkMessageError> {
    msg.check_complete()?;

    let header = msg.header();
    let datasets = msg.datasets();
    let mut enc = Encoder::new(out);

    let pid_type = publisher_id_type(&header.publisher_id);
    let has_group = header.group_id.is_some() || header.group_version.is_some();

    let mut flags = (header.version & VERSION_MASK) | PUBLISHER_ID_ENABLED | PAYLOAD_HEADER_ENABLED;
    if has_group {
        flags |= GROUP_HEADER_ENABLED;
    }
    if pid_type != 0 {
        flags |= EXTENDED_FLAGS1_ENABLED;
    }
    enc.write_u8(flags);
    if pid_type != 0 {
        enc.write_u8(pid_type);
    }

    match &header.publisher_id {
        PublisherId::Byte(v) => enc.write_u8(*v),
        PublisherId::UInt16(v) => enc.write_u16(*v),
        PublisherId::UInt32(v) => enc.write_u32(*v),
        PublisherId::UInt64(v) => enc.write_u64(*v),
        PublisherId::String(s) => enc.write_byte_string(s.as_bytes()),
    }

    if has_group {
        let mut group_flags = 0u8;
        if header.group_id.is_some() {
            group_flags |= WRITER_GROUP_ID_ENABLED;
        }
        if header.group_version.is_some() {
            group_flags |= GROUP_VERSION_ENABLED;
        }
        enc.write_u8(group_flags);
        if let Some(id) = header.group_id {
            enc.write_u16(id);
        }
        if let Some(version) = header.group_version {
            enc.write_u32(version);
        }
    }

    // Shape was checked at creation: 1..=255 DataSetMessages.
    enc.write_u8(datasets.len() as u8);
    for ds in datasets {
        enc.write_u16(ds.writer_id);
    }

    let sizes_at = enc.position();
    if datasets.len() > 1 {
        for _ in datasets {
            enc.write_u16(0);
        }
    }

    for (index, ds) in datasets.iter().enumerate() {
        let start = enc.position();
        encode_dataset_message(&mut enc, index, ds)?;
        if datasets.len() > 1 {
            let size = enc.position() - start;
            let size = u16::try_from(size).map_err(|_| {
                NetworkMessageError::InvalidShape(format!(
                    "DataSetMessage {index} is {size} bytes (max 65535)"
                ))
            })?;
            enc.patch_u16(sizes_at + 2 * index, size);
        }
    }

    if enc.overflowed() {
        return Err(NetworkMessageError::BufferTooSmall {
            required: enc.position(),
            max: enc.capacity(),
        });
    }
    Ok(enc.position())
}

fn encode_dataset_message(
    enc: &mut Encoder<'_>,
    index: usize,
    ds: &DataSetMessage,
) -> Result<(), NetworkMessageError> {
    let mask = &ds.content_mask;
    let encoding = match mask.field_encoding {
        FieldEncoding::Variant => FIELD_ENCODING_VARIANT,
        FieldEncoding::DataValue => FIELD_ENCODING_DATA_VALUE,
    };
    let msg_type = match mask.message_type {
        DataSetMessageType::KeyFrame => DSM_TYPE_KEY_FRAME,
        DataSetMessageType::KeepAlive => DSM_TYPE_KEEP_ALIVE,
    };

    let mut flags2 = msg_type;
    if mask.has(ContentFlags::TIMESTAMP) {
        flags2 |= DSM_TIMESTAMP_ENABLED;
    }
    if mask.has(ContentFlags::PICOSECONDS) {
        flags2 |= DSM_PICOSECONDS_ENABLED;
    }

    let mut flags1 = DSM_VALID | (encoding << FIELD_ENCODING_SHIFT);
    if mask.has(ContentFlags::SEQUENCE_NUMBER) {
        flags1 |= DSM_SEQUENCE_NUMBER_ENABLED;
    }
    if mask.has(ContentFlags::STATUS) {
        flags1 |= DSM_STATUS_ENABLED;
    }
    if flags2 != 0 {
        flags1 |= DSM_FLAGS2_ENABLED;
    }

    enc.write_u8(flags1);
    if flags2 != 0 {
        enc.write_u8(flags2);
    }
    if mask.has(ContentFlags::SEQUENCE_NUMBER) {
        enc.write_u16(ds.sequence_number);
    }
    if mask.has(ContentFlags::TIMESTAMP) {
        enc.write_i64(ds.timestamp.ticks());
    }
    if mask.has(ContentFlags::PICOSECONDS) {
        enc.write_u16(ds.picoseconds);
    }
    if mask.has(ContentFlags::STATUS) {
        enc.write_u16(ds.status.high_word());
    }

    if mask.message_type == DataSetMessageType::KeepAlive {
        return Ok(());
    }

    enc.write_u16(ds.field_count() as u16);
    for (field, slot) in ds.slots().iter().enumerate() {
        let value = slot
            .as_ref()
            .ok_or(NetworkMessageError::IncompleteMessage { dataset: index, field })?;
        match mask.field_encoding {
            FieldEncoding::Variant => enc.write_variant(&value.value),
            FieldEncoding::DataValue => enc.write_data_value(value),
        }
    }
    Ok(())
}

/// Header of a received NetworkMessage.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DecodedHeader {
    /// UADP version.
    pub version: u8,
    /// PublisherId, when present.
    pub publisher_id: Option<PublisherId>,
    /// WriterGroupId, when present.
    pub group_id: Option<u16>,
    /// WriterGroup version, when present.
    pub group_version: Option<u32>,
}

/// One received DataSetMessage.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedDataSetMessage {
    /// DataSetWriterId from the payload header, when present.
    pub writer_id: Option<u16>,
    /// False when the publisher flagged the message invalid; `fields` is
    /// then empty.
    pub valid: bool,
    /// Reconstructed content mask.
    pub content_mask: DataSetContentMask,
    /// Sequence number, when present.
    pub sequence_number: Option<u16>,
    /// DataSetMessage timestamp, when present.
    pub timestamp: Option<DateTime>,
    /// Picoseconds, when present.
    pub picoseconds: Option<u16>,
    /// Status, when present.
    pub status: Option<StatusCode>,
    /// Fields in DataSet order. Variant-encoded fields come back as Good
    /// DataValues without timestamps.
    pub fields: Vec<DataValue>,
}

/// A received NetworkMessage.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedNetworkMessage {
    /// Header.
    pub header: DecodedHeader,
    /// DataSetMessages in payload order.
    pub datasets: Vec<DecodedDataSetMessage>,
}

/// Decode one UADP datagram.
///
/// Any structural problem fails the whole datagram.
pub fn decode(bytes: &[u8]) -> DecodeResult<DecodedNetworkMessage> {
    let mut dec = Decoder::new(bytes);

    let flags = dec.read_u8()?;
    let mut header = DecodedHeader {
        version: flags & VERSION_MASK,
        ..DecodedHeader::default()
    };

    let ext1 = if flags & EXTENDED_FLAGS1_ENABLED != 0 {
        dec.read_u8()?
    } else {
        0
    };
    if ext1 & DATASET_CLASS_ID_ENABLED != 0 {
        return Err(DecodeError::UnsupportedFeature("DataSetClassId"));
    }
    if ext1 & SECURITY_ENABLED != 0 {
        return Err(DecodeError::UnsupportedFeature("security"));
    }
    if ext1 & EXTENDED_FLAGS2_ENABLED != 0 {
        let ext2 = dec.read_u8()?;
        if ext2 & CHUNK_MESSAGE != 0 {
            return Err(DecodeError::UnsupportedFeature("chunked message"));
        }
        if ext2 & PROMOTED_FIELDS_ENABLED != 0 {
            return Err(DecodeError::UnsupportedFeature("promoted fields"));
        }
        if ext2 & NM_TYPE_MASK != 0 {
            return Err(DecodeError::UnsupportedFeature("discovery message"));
        }
    }

    if flags & PUBLISHER_ID_ENABLED != 0 {
        header.publisher_id = Some(match ext1 & PUBLISHER_ID_TYPE_MASK {
            0 => PublisherId::Byte(dec.read_u8()?),
            1 => PublisherId::UInt16(dec.read_u16()?),
            2 => PublisherId::UInt32(dec.read_u32()?),
            3 => PublisherId::UInt64(dec.read_u64()?),
            4 => {
                let bytes = dec.read_byte_string()?;
                let text = std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)?;
                PublisherId::String(text.to_string())
            }
            other => return Err(DecodeError::UnknownPublisherIdType(other)),
        });
    }

    if flags & GROUP_HEADER_ENABLED != 0 {
        let group_flags = dec.read_u8()?;
        if group_flags & WRITER_GROUP_ID_ENABLED != 0 {
            header.group_id = Some(dec.read_u16()?);
        }
        if group_flags & GROUP_VERSION_ENABLED != 0 {
            header.group_version = Some(dec.read_u32()?);
        }
        if group_flags & NETWORK_MESSAGE_NUMBER_ENABLED != 0 {
            dec.read_u16()?;
        }
        if group_flags & GROUP_SEQUENCE_NUMBER_ENABLED != 0 {
            dec.read_u16()?;
        }
    }

    let writer_ids: Vec<Option<u16>> = if flags & PAYLOAD_HEADER_ENABLED != 0 {
        let count = dec.read_u8()?;
        (0..count)
            .map(|_| dec.read_u16().map(Some))
            .collect::<DecodeResult<_>>()?
    } else {
        vec![None]
    };

    if ext1 & NM_TIMESTAMP_ENABLED != 0 {
        dec.read_i64()?;
    }
    if ext1 & NM_PICOSECONDS_ENABLED != 0 {
        dec.read_u16()?;
    }

    let sizes: Option<Vec<usize>> = if writer_ids.len() > 1 {
        Some(
            writer_ids
                .iter()
                .map(|_| dec.read_u16().map(usize::from))
                .collect::<DecodeResult<_>>()?,
        )
    } else {
        None
    };

    let mut datasets = Vec::with_capacity(writer_ids.len());
    for (index, writer_id) in writer_ids.into_iter().enumerate() {
        let start = dec.position();
        let declared = sizes.as_ref().map(|s| s[index]);
        let ds = decode_dataset_message(&mut dec, writer_id, declared)?;
        if let Some(declared) = declared {
            let actual = dec.position() - start;
            if actual != declared {
                return Err(DecodeError::SizeMismatch {
                    index,
                    declared,
                    actual,
                });
            }
        }
        datasets.push(ds);
    }

    if dec.remaining() != 0 {
        return Err(DecodeError::TrailingBytes(dec.remaining()));
    }

    Ok(DecodedNetworkMessage { header, datasets })
}

fn decode_dataset_message(
    dec: &mut Decoder<'_>,
    writer_id: Option<u16>,
    declared_size: Option<usize>,
) -> DecodeResult<DecodedDataSetMessage> {
    let start = dec.position();
    let flags1 = dec.read_u8()?;

    if flags1 & DSM_VALID == 0 {
        // Skip the body: to the declared size, or to the end of the datagram.
        let skip = match declared_size {
            Some(size) => size.saturating_sub(dec.position() - start),
            None => dec.remaining(),
        };
        dec.read_bytes(skip)?;
        return Ok(DecodedDataSetMessage {
            writer_id,
            valid: false,
            content_mask: DataSetContentMask::default(),
            sequence_number: None,
            timestamp: None,
            picoseconds: None,
            status: None,
            fields: Vec::new(),
        });
    }

    let field_encoding = match (flags1 & FIELD_ENCODING_MASK) >> FIELD_ENCODING_SHIFT {
        FIELD_ENCODING_VARIANT => FieldEncoding::Variant,
        FIELD_ENCODING_DATA_VALUE => FieldEncoding::DataValue,
        FIELD_ENCODING_RAW => return Err(DecodeError::UnsupportedFeature("raw field encoding")),
        _ => return Err(DecodeError::UnsupportedFeature("reserved field encoding")),
    };

    let flags2 = if flags1 & DSM_FLAGS2_ENABLED != 0 {
        dec.read_u8()?
    } else {
        0
    };
    let message_type = match flags2 & DSM_TYPE_MASK {
        DSM_TYPE_KEY_FRAME => DataSetMessageType::KeyFrame,
        DSM_TYPE_KEEP_ALIVE => DataSetMessageType::KeepAlive,
        _ => return Err(DecodeError::UnsupportedFeature("delta frame or event message")),
    };

    let mut content_flags = ContentFlags::empty();
    let sequence_number = if flags1 & DSM_SEQUENCE_NUMBER_ENABLED != 0 {
        content_flags |= ContentFlags::SEQUENCE_NUMBER;
        Some(dec.read_u16()?)
    } else {
        None
    };
    let timestamp = if flags2 & DSM_TIMESTAMP_ENABLED != 0 {
        content_flags |= ContentFlags::TIMESTAMP;
        Some(DateTime(dec.read_i64()?))
    } else {
        None
    };
    let picoseconds = if flags2 & DSM_PICOSECONDS_ENABLED != 0 {
        content_flags |= ContentFlags::PICOSECONDS;
        Some(dec.read_u16()?)
    } else {
        None
    };
    let status = if flags1 & DSM_STATUS_ENABLED != 0 {
        content_flags |= ContentFlags::STATUS;
        Some(StatusCode::from_high_word(dec.read_u16()?))
    } else {
        None
    };
    if flags1 & DSM_MAJOR_VERSION_ENABLED != 0 {
        dec.read_u32()?;
    }
    if flags1 & DSM_MINOR_VERSION_ENABLED != 0 {
        dec.read_u32()?;
    }

    let mut fields = Vec::new();
    if message_type == DataSetMessageType::KeyFrame {
        let count = usize::from(dec.read_u16()?);
        if count > dec.remaining() {
            return Err(DecodeError::InvalidLength(count as i64));
        }
        fields.reserve_exact(count);
        for _ in 0..count {
            fields.push(match field_encoding {
                FieldEncoding::Variant => DataValue::new(dec.read_variant()?),
                FieldEncoding::DataValue => dec.read_data_value()?,
            });
        }
    }

    Ok(DecodedDataSetMessage {
        writer_id,
        valid: true,
        content_mask: DataSetContentMask {
            flags: content_flags,
            field_encoding,
            message_type,
        },
        sequence_number,
        timestamp,
        picoseconds,
        status,
        fields,
    })
}
