//! The NodeId → DataValue cache.
//!
//! The key space is closed: it is populated once by [`Cache::initialize`]
//! and later writes to unknown keys are refused. Each slot pairs the
//! declared field type with the current value; only values are mutated
//! until [`Cache::clear`] drops the whole key space.
//!
//! Single-entry [`Cache::get`] / [`Cache::set`] take the lock themselves.
//! Multi-entry sequences that must be observed atomically go through
//! [`Cache::lock`], which hands out a [`CacheGuard`]. The lock is never
//! held across blocking calls and is not re-entrant.

use parking_lot::{Mutex, MutexGuard};
use pubsub_common::pubsub::config::PubSubConfig;
use pubsub_common::types::{DataValue, FieldType, NodeId, ValueRank};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

use crate::error::{CacheError, CacheResult, SetError};

#[derive(Debug)]
struct Slot {
    ty: FieldType,
    value: DataValue,
}

/// Shared process-variable store.
#[derive(Debug)]
pub struct Cache {
    entries: Mutex<HashMap<NodeId, Slot>>,
}

impl Cache {
    /// Build the key space from the static configuration.
    ///
    /// One entry per distinct published or subscribed field, holding the
    /// default value of its declared type and rank. An empty configuration
    /// yields an empty, valid cache.
    pub fn initialize(config: &PubSubConfig) -> CacheResult<Self> {
        let fields = config.cache_fields()?;
        let cache = Self::from_fields(fields)?;
        info!(entries = cache.len(), "Cache initialized");
        Ok(cache)
    }

    /// Build the key space from explicit (NodeId, type) pairs.
    ///
    /// Repeating a NodeId with the same type is accepted; a different type
    /// is [`CacheError::ConflictingType`].
    pub fn from_fields<I>(fields: I) -> CacheResult<Self>
    where
        I: IntoIterator<Item = (NodeId, FieldType)>,
    {
        let fields = fields.into_iter();
        let hint = fields.size_hint().0;

        let mut entries: HashMap<NodeId, Slot> = HashMap::new();
        entries
            .try_reserve(hint)
            .map_err(|_| CacheError::CapacityExhausted { requested: hint })?;

        for (node_id, ty) in fields {
            if let Some(first) = entries.get(&node_id) {
                if first.ty != ty {
                    return Err(CacheError::ConflictingType {
                        node_id,
                        first: first.ty,
                        second: ty,
                    });
                }
                continue;
            }
            entries
                .try_reserve(1)
                .map_err(|_| CacheError::CapacityExhausted {
                    requested: entries.len() + 1,
                })?;
            debug!(node_id = %node_id, builtin = ?ty.builtin, rank = ?ty.rank, "Cache entry registered");
            let value = DataValue::default_for(ty);
            entries.insert(node_id, Slot { ty, value });
        }

        Ok(Self {
            entries: Mutex::new(entries),
        })
    }

    /// Number of registered keys.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when no key is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Declared type of a key.
    pub fn field_type(&self, node_id: &NodeId) -> Option<FieldType> {
        self.entries.lock().get(node_id).map(|slot| slot.ty)
    }

    /// Whether `node_id` is registered.
    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.entries.lock().contains_key(node_id)
    }

    /// Acquire the cache lock for a multi-entry sequence.
    pub fn lock(&self) -> CacheGuard<'_> {
        CacheGuard {
            entries: self.entries.lock(),
        }
    }

    /// Copy of the current value, `None` if the key is absent.
    pub fn get(&self, node_id: &NodeId) -> Option<DataValue> {
        self.lock().get(node_id)
    }

    /// Replace the value of a registered key.
    ///
    /// Returns `false` and leaves the cache unchanged if the key is unknown
    /// or the value does not carry the declared type.
    pub fn set(&self, node_id: &NodeId, value: DataValue) -> bool {
        self.lock().set(node_id, value)
    }

    /// Like [`Cache::set`], reporting why a write was refused.
    pub fn try_set(&self, node_id: &NodeId, value: DataValue) -> Result<(), SetError> {
        self.lock().try_set(node_id, value)
    }

    /// Copies of several values read under one lock acquisition.
    pub fn get_many(&self, node_ids: &[NodeId]) -> Vec<Option<DataValue>> {
        let guard = self.lock();
        node_ids.iter().map(|id| guard.get(id)).collect()
    }

    /// Write several values under one lock acquisition.
    ///
    /// Returns the number of writes refused.
    pub fn set_many<I>(&self, values: I) -> usize
    where
        I: IntoIterator<Item = (NodeId, DataValue)>,
    {
        let mut guard = self.lock();
        let mut refused = 0;
        for (id, value) in values {
            if !guard.set(&id, value) {
                refused += 1;
            }
        }
        refused
    }

    /// Visit every entry under the lock, in unspecified order.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&NodeId, &DataValue),
    {
        let guard = self.lock();
        for (id, value) in guard.iter() {
            f(id, value);
        }
    }

    /// Drop every entry and its declared type. Subsequent reads return
    /// `None`, writes fail and the key space is empty.
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        let count = entries.len();
        entries.clear();
        entries.shrink_to_fit();
        info!(entries = count, "Cache cleared");
    }

    /// Human-readable listing of all entries, sorted by NodeId.
    ///
    /// Holds the lock for the whole listing.
    pub fn dump(&self) -> String {
        warn!("Dumping the cache may break real-time operations");

        let guard = self.lock();
        let mut sorted: Vec<_> = guard.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));

        let mut out = String::new();
        for (id, dv) in sorted {
            let rank = match guard.field_type(id).map(|ty| ty.rank) {
                Some(ValueRank::Array) => "[ARR] ",
                Some(ValueRank::Matrix) => "[MAT] ",
                _ => "",
            };
            let ty = match dv.value.builtin_type() {
                Some(ty) => format!("{ty:?}"),
                None => "Null".to_string(),
            };
            out.push_str(&format!(
                "- {id} ; Status = {} ; {rank}Type={ty} ; Val = {}\n",
                dv.status, dv.value
            ));
        }
        out
    }

    /// JSON object keyed by the textual NodeId.
    pub fn snapshot_json(&self) -> serde_json::Result<String> {
        let guard = self.lock();
        let sorted: BTreeMap<String, &DataValue> =
            guard.iter().map(|(id, dv)| (id.to_string(), dv)).collect();
        serde_json::to_string_pretty(&sorted)
    }
}

/// Scoped cache lock. Released on drop.
pub struct CacheGuard<'a> {
    entries: MutexGuard<'a, HashMap<NodeId, Slot>>,
}

impl CacheGuard<'_> {
    /// Copy of the current value.
    pub fn get(&self, node_id: &NodeId) -> Option<DataValue> {
        self.get_ref(node_id).cloned()
    }

    /// Borrow the current value without copying.
    pub fn get_ref(&self, node_id: &NodeId) -> Option<&DataValue> {
        self.entries.get(node_id).map(|slot| &slot.value)
    }

    /// Declared type of a key.
    pub fn field_type(&self, node_id: &NodeId) -> Option<FieldType> {
        self.entries.get(node_id).map(|slot| slot.ty)
    }

    /// Replace a value; see [`Cache::set`].
    pub fn set(&mut self, node_id: &NodeId, value: DataValue) -> bool {
        self.try_set(node_id, value).is_ok()
    }

    /// Replace a value; see [`Cache::try_set`].
    pub fn try_set(&mut self, node_id: &NodeId, value: DataValue) -> Result<(), SetError> {
        let slot = self
            .entries
            .get_mut(node_id)
            .ok_or_else(|| SetError::UnknownKey(node_id.clone()))?;
        if !slot.ty.matches(&value.value) {
            return Err(SetError::TypeMismatch {
                node_id: node_id.clone(),
                expected: slot.ty.builtin,
                expected_rank: slot.ty.rank,
                found: value.value.builtin_type(),
                found_rank: value.value.value_rank(),
            });
        }
        slot.value = value;
        Ok(())
    }

    /// Iterate over all entries.
    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &DataValue)> {
        self.entries.iter().map(|(id, slot)| (id, &slot.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pubsub_common::types::{BuiltinType, StatusCode, Variant};

    fn counter() -> NodeId {
        NodeId::string(1, "Counter")
    }

    fn cache_with_counter() -> Cache {
        Cache::from_fields([(counter(), FieldType::scalar(BuiltinType::UInt32))]).unwrap()
    }

    #[test]
    fn defaults_follow_declared_type() {
        let cache = Cache::from_fields([
            (counter(), FieldType::scalar(BuiltinType::UInt32)),
            (
                NodeId::numeric(1, 5),
                FieldType {
                    builtin: BuiltinType::Double,
                    rank: ValueRank::Matrix,
                },
            ),
        ])
        .unwrap();

        assert_eq!(cache.get(&counter()).unwrap().value, Variant::from(0u32));
        let matrix = cache.get(&NodeId::numeric(1, 5)).unwrap();
        assert_eq!(matrix.value.value_rank(), Some(ValueRank::Matrix));
        assert!(matrix.status.is_good());
    }

    #[test]
    fn set_then_get_roundtrip() {
        let cache = cache_with_counter();
        let dv = DataValue::new(7u32).with_status(StatusCode::UNCERTAIN);
        assert!(cache.set(&counter(), dv.clone()));
        assert_eq!(cache.get(&counter()), Some(dv));
    }

    #[test]
    fn unknown_key_is_refused() {
        let cache = cache_with_counter();
        let before = cache.get(&counter());
        assert!(!cache.set(&NodeId::string(1, "Other"), DataValue::new(1u32)));
        assert_eq!(cache.get(&NodeId::string(1, "Other")), None);
        assert_eq!(cache.get(&counter()), before);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn wrong_type_is_refused() {
        let cache = cache_with_counter();
        let err = cache
            .try_set(&counter(), DataValue::new(-1i32))
            .unwrap_err();
        assert!(matches!(err, SetError::TypeMismatch { .. }));
        assert_eq!(cache.get(&counter()).unwrap().value, Variant::from(0u32));
    }

    #[test]
    fn conflicting_registration_rejected() {
        let result = Cache::from_fields([
            (counter(), FieldType::scalar(BuiltinType::UInt32)),
            (counter(), FieldType::scalar(BuiltinType::Int32)),
        ]);
        assert!(matches!(result, Err(CacheError::ConflictingType { .. })));
    }

    #[test]
    fn duplicate_registration_shares_entry() {
        let cache = Cache::from_fields([
            (counter(), FieldType::scalar(BuiltinType::UInt32)),
            (counter(), FieldType::scalar(BuiltinType::UInt32)),
        ])
        .unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn empty_config_gives_empty_cache() {
        let cache = Cache::initialize(&PubSubConfig::default()).unwrap();
        assert!(cache.is_empty());
        assert_eq!(cache.get(&counter()), None);
    }

    #[test]
    fn batched_access() {
        let cache = cache_with_counter();
        let ignored = cache.set_many([
            (counter(), DataValue::new(3u32)),
            (NodeId::string(1, "Missing"), DataValue::new(4u32)),
        ]);
        assert_eq!(ignored, 1);

        let values = cache.get_many(&[counter(), NodeId::string(1, "Missing")]);
        assert_eq!(values[0].as_ref().unwrap().value, Variant::from(3u32));
        assert!(values[1].is_none());
    }

    #[test]
    fn guard_groups_writes() {
        let cache = cache_with_counter();
        {
            let mut guard = cache.lock();
            assert!(guard.set(&counter(), DataValue::new(1u32)));
            assert!(guard.set(&counter(), DataValue::new(2u32)));
            assert_eq!(guard.get_ref(&counter()).unwrap().value, Variant::from(2u32));
        }
        assert_eq!(cache.get(&counter()).unwrap().value, Variant::from(2u32));
    }

    #[test]
    fn clear_ends_lifetime() {
        let cache = cache_with_counter();
        cache.clear();
        assert_eq!(cache.get(&counter()), None);
        assert!(!cache.set(&counter(), DataValue::new(1u32)));
        assert!(cache.is_empty());
        assert_eq!(cache.len(), 0);
        assert!(!cache.contains(&counter()));
        assert_eq!(cache.field_type(&counter()), None);
        assert_eq!(cache.dump(), "");
    }

    #[test]
    fn dump_lists_entries() {
        let cache = cache_with_counter();
        cache.set(&counter(), DataValue::new(7u32));
        let dump = cache.dump();
        assert_eq!(
            dump,
            "- ns=1;s=Counter ; Status = GOOD ; Type=UInt32 ; Val = 7\n"
        );
    }

    #[test]
    fn snapshot_is_json_object() {
        let cache = cache_with_counter();
        let json: serde_json::Value = serde_json::from_str(&cache.snapshot_json().unwrap()).unwrap();
        assert!(json.get("ns=1;s=Counter").is_some());
        assert_eq!(json["ns=1;s=Counter"]["value"]["Scalar"]["UInt32"], 0);
    }

    #[test]
    fn for_each_visits_all() {
        let cache = Cache::from_fields(
            (0..10).map(|i| (NodeId::numeric(2, i), FieldType::scalar(BuiltinType::Int64))),
        )
        .unwrap();
        let mut count = 0;
        cache.for_each(|_, dv| {
            assert_eq!(dv.value, Variant::from(0i64));
            count += 1;
        });
        assert_eq!(count, 10);
    }
}
