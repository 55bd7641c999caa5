//! In-memory NetworkMessage: one header and a fixed set of DataSetMessages.
//!
//! The shape (number of DataSetMessages and fields per message) is fixed
//! when the message is created. Every field slot must be filled before
//! [`NetworkMessage::encode`]; the publisher clears the slots at the start
//! of each cycle and refills them from the cache.

use pubsub_common::pubsub::types::{DataSetContentMask, PublisherId};
use pubsub_common::types::{DataValue, DateTime, StatusCode, Variant};

use crate::error::NetworkMessageError;
use crate::uadp;

/// NetworkMessage header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkMessageHeader {
    /// PublisherId.
    pub publisher_id: PublisherId,
    /// UADP version (4 bits).
    pub version: u8,
    /// WriterGroupId.
    pub group_id: Option<u16>,
    /// WriterGroup version.
    pub group_version: Option<u32>,
}

impl Default for NetworkMessageHeader {
    fn default() -> Self {
        Self {
            publisher_id: PublisherId::Byte(0),
            version: 1,
            group_id: None,
            group_version: None,
        }
    }
}

/// One DataSetMessage with positional field slots.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataSetMessage {
    /// DataSetWriterId.
    pub writer_id: u16,
    /// Optional header fields and encoding.
    pub content_mask: DataSetContentMask,
    /// Written when the mask has `SEQUENCE_NUMBER`.
    pub sequence_number: u16,
    /// Written (high word) when the mask has `STATUS`.
    pub status: StatusCode,
    /// Written when the mask has `TIMESTAMP`.
    pub timestamp: DateTime,
    /// Written when the mask has `PICOSECONDS`.
    pub picoseconds: u16,
    fields: Vec<Option<DataValue>>,
}

impl DataSetMessage {
    /// Number of field slots.
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Field at `index`, if set.
    pub fn field(&self, index: usize) -> Option<&DataValue> {
        self.fields.get(index).and_then(Option::as_ref)
    }

    /// Index of the first unset slot.
    pub fn first_unset(&self) -> Option<usize> {
        self.fields.iter().position(Option::is_none)
    }

    pub(crate) fn slots(&self) -> &[Option<DataValue>] {
        &self.fields
    }
}

/// NetworkMessage under construction.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NetworkMessage {
    header: NetworkMessageHeader,
    datasets: Vec<DataSetMessage>,
}

impl NetworkMessage {
    /// Message with `nb_dataset_messages` DataSetMessages of
    /// `nb_fields_per_message` fields each.
    pub fn create(
        nb_dataset_messages: usize,
        nb_fields_per_message: usize,
    ) -> Result<Self, NetworkMessageError> {
        Self::with_shape(std::iter::repeat_n(nb_fields_per_message, nb_dataset_messages))
    }

    /// Message whose DataSetMessages have the given field counts.
    pub fn with_shape<I>(field_counts: I) -> Result<Self, NetworkMessageError>
    where
        I: IntoIterator<Item = usize>,
    {
        let field_counts: Vec<usize> = field_counts.into_iter().collect();
        let nb = field_counts.len();
        if nb == 0 || nb > usize::from(u8::MAX) {
            return Err(NetworkMessageError::InvalidShape(format!(
                "{nb} DataSetMessages (expected 1..=255)"
            )));
        }
        if let Some(n) = field_counts.iter().find(|n| **n > usize::from(u16::MAX)) {
            return Err(NetworkMessageError::InvalidShape(format!(
                "{n} fields in one DataSetMessage (max 65535)"
            )));
        }

        let mut datasets = Vec::new();
        datasets
            .try_reserve_exact(nb)
            .map_err(|_| NetworkMessageError::AllocationFailed { datasets: nb })?;
        for count in field_counts {
            let mut fields = Vec::new();
            fields
                .try_reserve_exact(count)
                .map_err(|_| NetworkMessageError::AllocationFailed { datasets: nb })?;
            fields.resize(count, None);
            datasets.push(DataSetMessage {
                fields,
                ..DataSetMessage::default()
            });
        }

        Ok(Self {
            header: NetworkMessageHeader::default(),
            datasets,
        })
    }

    /// Set the header fields.
    pub fn set_header(
        &mut self,
        publisher_id: PublisherId,
        group_id: Option<u16>,
        group_version: Option<u32>,
        version: u8,
    ) -> Result<(), NetworkMessageError> {
        if version > 0x0F {
            return Err(NetworkMessageError::InvalidHeader(format!(
                "version {version} does not fit in 4 bits"
            )));
        }
        self.header = NetworkMessageHeader {
            publisher_id,
            version,
            group_id,
            group_version,
        };
        Ok(())
    }

    /// Header.
    pub fn header(&self) -> &NetworkMessageHeader {
        &self.header
    }

    /// All DataSetMessages, in encoding order.
    pub fn datasets(&self) -> &[DataSetMessage] {
        &self.datasets
    }

    /// Mutable access to one DataSetMessage.
    pub fn dataset_mut(&mut self, index: usize) -> Result<&mut DataSetMessage, NetworkMessageError> {
        self.datasets
            .get_mut(index)
            .ok_or(NetworkMessageError::IndexOutOfRange {
                dataset: index,
                field: None,
            })
    }

    /// Set the DataSetWriterId of one DataSetMessage.
    pub fn set_writer_id(&mut self, dataset: usize, writer_id: u16) -> Result<(), NetworkMessageError> {
        self.dataset_mut(dataset)?.writer_id = writer_id;
        Ok(())
    }

    /// Set the content mask of one DataSetMessage.
    pub fn set_content_mask(
        &mut self,
        dataset: usize,
        mask: DataSetContentMask,
    ) -> Result<(), NetworkMessageError> {
        self.dataset_mut(dataset)?.content_mask = mask;
        Ok(())
    }

    /// Set one field from a Variant. Setting a slot twice overwrites it.
    pub fn set_field(
        &mut self,
        dataset: usize,
        field: usize,
        value: Variant,
    ) -> Result<(), NetworkMessageError> {
        self.set_field_value(dataset, field, DataValue::new(value))
    }

    /// Set one field from a DataValue (status and timestamps are used by
    /// the DataValue field encoding).
    pub fn set_field_value(
        &mut self,
        dataset: usize,
        field: usize,
        value: DataValue,
    ) -> Result<(), NetworkMessageError> {
        let slot = self
            .dataset_mut(dataset)?
            .fields
            .get_mut(field)
            .ok_or(NetworkMessageError::IndexOutOfRange {
                dataset,
                field: Some(field),
            })?;
        *slot = Some(value);
        Ok(())
    }

    /// Unset every field slot, keeping the shape and headers.
    pub fn clear_fields(&mut self) {
        for ds in &mut self.datasets {
            ds.fields.iter_mut().for_each(|slot| *slot = None);
        }
    }

    /// `Err(IncompleteMessage)` naming the first unset slot.
    pub fn check_complete(&self) -> Result<(), NetworkMessageError> {
        for (dataset, ds) in self.datasets.iter().enumerate() {
            if let Some(field) = ds.first_unset() {
                return Err(NetworkMessageError::IncompleteMessage { dataset, field });
            }
        }
        Ok(())
    }

    /// Encode into `out`, returning the number of bytes written.
    ///
    /// `out.len()` is the size ceiling: a larger message fails with
    /// [`NetworkMessageError::BufferTooSmall`].
    pub fn encode_to_slice(&self, out: &mut [u8]) -> Result<usize, NetworkMessageError> {
        uadp::encode(self, out)
    }

    /// Encode into a new buffer of at most `max_size` bytes.
    ///
    /// Deterministic: the same fully populated message always yields the
    /// same bytes.
    pub fn encode(&self, max_size: usize) -> Result<Vec<u8>, NetworkMessageError> {
        let mut buf = vec![0u8; max_size];
        let len = self.encode_to_slice(&mut buf)?;
        buf.truncate(len);
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pubsub_common::pubsub::types::ContentFlags;

    fn filled(nb_ds: usize, nb_fields: usize) -> NetworkMessage {
        let mut msg = NetworkMessage::create(nb_ds, nb_fields).unwrap();
        for ds in 0..nb_ds {
            msg.set_writer_id(ds, ds as u16 + 1).unwrap();
            for f in 0..nb_fields {
                msg.set_field(ds, f, Variant::from((ds * 10 + f) as u32)).unwrap();
            }
        }
        msg
    }

    #[test]
    fn create_rejects_bad_shapes() {
        assert!(matches!(
            NetworkMessage::create(0, 1),
            Err(NetworkMessageError::InvalidShape(_))
        ));
        assert!(matches!(
            NetworkMessage::create(256, 1),
            Err(NetworkMessageError::InvalidShape(_))
        ));
        assert!(NetworkMessage::create(1, 0).is_ok());
    }

    #[test]
    fn encode_requires_every_field() {
        let mut msg = NetworkMessage::create(2, 3).unwrap();
        msg.set_field(0, 0, Variant::from(1u32)).unwrap();
        msg.set_field(0, 1, Variant::from(1u32)).unwrap();
        msg.set_field(0, 2, Variant::from(1u32)).unwrap();
        msg.set_field(1, 0, Variant::from(1u32)).unwrap();
        msg.set_field(1, 2, Variant::from(1u32)).unwrap();
        assert_eq!(
            msg.encode(1500),
            Err(NetworkMessageError::IncompleteMessage { dataset: 1, field: 1 })
        );
    }

    #[test]
    fn set_field_out_of_range() {
        let mut msg = NetworkMessage::create(1, 2).unwrap();
        assert_eq!(
            msg.set_field(0, 2, Variant::from(1u32)),
            Err(NetworkMessageError::IndexOutOfRange {
                dataset: 0,
                field: Some(2)
            })
        );
        assert_eq!(
            msg.set_writer_id(1, 5),
            Err(NetworkMessageError::IndexOutOfRange {
                dataset: 1,
                field: None
            })
        );
    }

    #[test]
    fn overwriting_a_field_keeps_last_value() {
        let mut msg = NetworkMessage::create(1, 1).unwrap();
        msg.set_field(0, 0, Variant::from(1u32)).unwrap();
        msg.set_field(0, 0, Variant::from(2u32)).unwrap();
        assert_eq!(msg.datasets()[0].field(0).unwrap().value, Variant::from(2u32));
    }

    #[test]
    fn encode_is_deterministic() {
        let mut msg = filled(2, 4);
        msg.set_header(PublisherId::UInt16(9), Some(3), Some(77), 1).unwrap();
        msg.set_content_mask(
            1,
            DataSetContentMask::key_frame(ContentFlags::SEQUENCE_NUMBER | ContentFlags::STATUS),
        )
        .unwrap();
        let a = msg.encode(1500).unwrap();
        let b = msg.encode(1500).unwrap();
        assert_eq!(a, b);
        assert!(!a.is_empty());
    }

    #[test]
    fn oversized_message_reports_required_size() {
        let msg = filled(1, 64);
        let full = msg.encode(65_507).unwrap();
        let err = msg.encode(full.len() - 1).unwrap_err();
        assert_eq!(
            err,
            NetworkMessageError::BufferTooSmall {
                required: full.len(),
                max: full.len() - 1
            }
        );
        assert_eq!(msg.encode(full.len()).unwrap(), full);
    }

    #[test]
    fn clear_fields_makes_message_incomplete() {
        let mut msg = filled(1, 2);
        assert!(msg.check_complete().is_ok());
        msg.clear_fields();
        assert_eq!(
            msg.check_complete(),
            Err(NetworkMessageError::IncompleteMessage { dataset: 0, field: 0 })
        );
    }

    #[test]
    fn header_version_limited_to_four_bits() {
        let mut msg = NetworkMessage::create(1, 1).unwrap();
        assert!(matches!(
            msg.set_header(PublisherId::Byte(1), None, None, 16),
            Err(NetworkMessageError::InvalidHeader(_))
        ));
    }
}
