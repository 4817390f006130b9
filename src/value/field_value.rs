use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::fmt::{self, Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::model::{DatabaseId, DocumentKey, GeoPoint, Timestamp};
use crate::util::assert::hard_fail;
use crate::util::comparison::{compare_doubles, compare_mixed_number};
use crate::value::SortedMap;

/// Map payload of an object-typed value, ordered by field name.
pub type FieldMap = SortedMap<String, FieldValue>;

/// Sentinel written in place of a field whose final value the backend
/// assigns. Carries the local write time so the sentinel still sorts
/// deterministically, plus the value the field held before the write.
#[derive(Clone, Debug, PartialEq)]
pub struct ServerTimestampValue {
    pub local_write_time: Timestamp,
    pub previous_value: Option<FieldValue>,
}

/// A pointer to another document, scoped to its database.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ReferenceValue {
    pub database_id: DatabaseId,
    pub key: DocumentKey,
}

#[derive(Clone, Debug)]
pub enum ValueKind {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    Timestamp(Timestamp),
    ServerTimestamp(ServerTimestampValue),
    String(String),
    Blob(Vec<u8>),
    Reference(ReferenceValue),
    GeoPoint(GeoPoint),
    Array(Vec<FieldValue>),
    Map(FieldMap),
}

/// Rank of a value's type in the cross-type total order. Integers and
/// doubles share the number rank; server timestamps sort with timestamps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum TypeRank {
    Null,
    Boolean,
    Number,
    Timestamp,
    String,
    Blob,
    Reference,
    GeoPoint,
    Array,
    Map,
}

/// An immutable document field value. Cloning bumps a reference count; the
/// payload itself is shared.
///
/// Equality is structural: `Integer(3)` and `Double(3.0)` are distinct even
/// though [`FieldValue::compare`] orders them as equal, doubles compare by
/// bit pattern with all NaNs equal, and `0.0` differs from `-0.0`.
#[derive(Clone)]
pub struct FieldValue {
    kind: Arc<ValueKind>,
}

impl FieldValue {
    fn wrap(kind: ValueKind) -> Self {
        Self { kind: Arc::new(kind) }
    }

    pub fn null() -> Self {
        Self::wrap(ValueKind::Null)
    }

    pub fn from_bool(value: bool) -> Self {
        Self::wrap(ValueKind::Boolean(value))
    }

    pub fn from_integer(value: i64) -> Self {
        Self::wrap(ValueKind::Integer(value))
    }

    pub fn from_double(value: f64) -> Self {
        Self::wrap(ValueKind::Double(value))
    }

    pub fn from_timestamp(value: Timestamp) -> Self {
        Self::wrap(ValueKind::Timestamp(value))
    }

    pub fn from_server_timestamp(
        local_write_time: Timestamp,
        previous_value: Option<FieldValue>,
    ) -> Self {
        Self::wrap(ValueKind::ServerTimestamp(ServerTimestampValue {
            local_write_time,
            previous_value,
        }))
    }

    pub fn from_string(value: impl Into<String>) -> Self {
        Self::wrap(ValueKind::String(value.into()))
    }

    pub fn from_blob(value: impl Into<Vec<u8>>) -> Self {
        Self::wrap(ValueKind::Blob(value.into()))
    }

    pub fn from_reference(database_id: DatabaseId, key: DocumentKey) -> Self {
        Self::wrap(ValueKind::Reference(ReferenceValue { database_id, key }))
    }

    pub fn from_geo_point(value: GeoPoint) -> Self {
        Self::wrap(ValueKind::GeoPoint(value))
    }

    pub fn from_array(values: Vec<FieldValue>) -> Self {
        Self::wrap(ValueKind::Array(values))
    }

    pub fn from_map(map: FieldMap) -> Self {
        Self::wrap(ValueKind::Map(map))
    }

    pub fn empty_map() -> Self {
        Self::from_map(FieldMap::new())
    }

    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    pub fn is_null(&self) -> bool {
        matches!(self.kind(), ValueKind::Null)
    }

    pub fn is_nan(&self) -> bool {
        matches!(self.kind(), ValueKind::Double(d) if d.is_nan())
    }

    pub fn is_map(&self) -> bool {
        matches!(self.kind(), ValueKind::Map(_))
    }

    /// Whether the two values belong to the same rank of the cross-type
    /// order. Relational filters only ever match comparable values.
    pub fn comparable_with(&self, other: &FieldValue) -> bool {
        self.rank() == other.rank()
    }

    fn rank(&self) -> TypeRank {
        match self.kind() {
            ValueKind::Null => TypeRank::Null,
            ValueKind::Boolean(_) => TypeRank::Boolean,
            ValueKind::Integer(_) | ValueKind::Double(_) => TypeRank::Number,
            ValueKind::Timestamp(_) | ValueKind::ServerTimestamp(_) => TypeRank::Timestamp,
            ValueKind::String(_) => TypeRank::String,
            ValueKind::Blob(_) => TypeRank::Blob,
            ValueKind::Reference(_) => TypeRank::Reference,
            ValueKind::GeoPoint(_) => TypeRank::GeoPoint,
            ValueKind::Array(_) => TypeRank::Array,
            ValueKind::Map(_) => TypeRank::Map,
        }
    }

    /// Total order across all values. Values of different type ranks order
    /// by rank; within a rank the payloads decide. NaN sorts before every
    /// other number and equal to itself, and a server timestamp sorts after
    /// every concrete timestamp.
    pub fn compare(&self, other: &FieldValue) -> Ordering {
        let rank_order = self.rank().cmp(&other.rank());
        if rank_order != Ordering::Equal {
            return rank_order;
        }
        use ValueKind::*;
        match (self.kind(), other.kind()) {
            (Null, Null) => Ordering::Equal,
            (Boolean(lhs), Boolean(rhs)) => lhs.cmp(rhs),
            (Integer(lhs), Integer(rhs)) => lhs.cmp(rhs),
            (Double(lhs), Double(rhs)) => compare_doubles(*lhs, *rhs),
            (Double(lhs), Integer(rhs)) => compare_mixed_number(*lhs, *rhs),
            (Integer(lhs), Double(rhs)) => compare_mixed_number(*rhs, *lhs).reverse(),
            (Timestamp(lhs), Timestamp(rhs)) => lhs.cmp(rhs),
            (Timestamp(_), ServerTimestamp(_)) => Ordering::Less,
            (ServerTimestamp(_), Timestamp(_)) => Ordering::Greater,
            (ServerTimestamp(lhs), ServerTimestamp(rhs)) => {
                lhs.local_write_time.cmp(&rhs.local_write_time)
            }
            (String(lhs), String(rhs)) => lhs.cmp(rhs),
            (Blob(lhs), Blob(rhs)) => lhs.cmp(rhs),
            (Reference(lhs), Reference(rhs)) => lhs
                .database_id
                .cmp(&rhs.database_id)
                .then_with(|| lhs.key.cmp(&rhs.key)),
            (GeoPoint(lhs), GeoPoint(rhs)) => lhs.compare(rhs),
            (Array(lhs), Array(rhs)) => compare_arrays(lhs, rhs),
            (Map(lhs), Map(rhs)) => compare_maps(lhs, rhs),
            _ => hard_fail("compare reached values of mismatched type rank"),
        }
    }
}

fn compare_arrays(lhs: &[FieldValue], rhs: &[FieldValue]) -> Ordering {
    for (l, r) in lhs.iter().zip(rhs.iter()) {
        let element_order = l.compare(r);
        if element_order != Ordering::Equal {
            return element_order;
        }
    }
    lhs.len().cmp(&rhs.len())
}

fn compare_maps(lhs: &FieldMap, rhs: &FieldMap) -> Ordering {
    let mut lhs_entries = lhs.iter();
    let mut rhs_entries = rhs.iter();
    loop {
        match (lhs_entries.next(), rhs_entries.next()) {
            (Some((lk, lv)), Some((rk, rv))) => {
                let entry_order = lk.cmp(rk).then_with(|| lv.compare(rv));
                if entry_order != Ordering::Equal {
                    return entry_order;
                }
            }
            (Some(_), None) => return Ordering::Greater,
            (None, Some(_)) => return Ordering::Less,
            (None, None) => return Ordering::Equal,
        }
    }
}

/// Bit pattern used for double equality and hashing, with every NaN
/// collapsed to the canonical one.
fn double_bits(value: f64) -> u64 {
    if value.is_nan() {
        f64::NAN.to_bits()
    } else {
        value.to_bits()
    }
}

impl PartialEq for ValueKind {
    fn eq(&self, other: &Self) -> bool {
        use ValueKind::*;
        match (self, other) {
            (Null, Null) => true,
            (Boolean(lhs), Boolean(rhs)) => lhs == rhs,
            (Integer(lhs), Integer(rhs)) => lhs == rhs,
            (Double(lhs), Double(rhs)) => double_bits(*lhs) == double_bits(*rhs),
            (Timestamp(lhs), Timestamp(rhs)) => lhs == rhs,
            (ServerTimestamp(lhs), ServerTimestamp(rhs)) => lhs == rhs,
            (String(lhs), String(rhs)) => lhs == rhs,
            (Blob(lhs), Blob(rhs)) => lhs == rhs,
            (Reference(lhs), Reference(rhs)) => lhs == rhs,
            (GeoPoint(lhs), GeoPoint(rhs)) => {
                double_bits(lhs.latitude()) == double_bits(rhs.latitude())
                    && double_bits(lhs.longitude()) == double_bits(rhs.longitude())
            }
            (Array(lhs), Array(rhs)) => lhs == rhs,
            (Map(lhs), Map(rhs)) => lhs == rhs,
            _ => false,
        }
    }
}

impl Eq for ValueKind {}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.kind, &other.kind) || self.kind() == other.kind()
    }
}

impl Eq for FieldValue {}

impl Hash for FieldValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind().hash(state);
    }
}

impl Hash for ValueKind {
    fn hash<H: Hasher>(&self, state: &mut H) {
        use ValueKind::*;
        match self {
            Null => state.write_u8(0),
            Boolean(value) => {
                state.write_u8(1);
                value.hash(state);
            }
            Integer(value) => {
                state.write_u8(2);
                value.hash(state);
            }
            Double(value) => {
                state.write_u8(3);
                state.write_u64(double_bits(*value));
            }
            Timestamp(value) => {
                state.write_u8(4);
                value.hash(state);
            }
            ServerTimestamp(value) => {
                state.write_u8(5);
                value.local_write_time.hash(state);
                value.previous_value.hash(state);
            }
            String(value) => {
                state.write_u8(6);
                value.hash(state);
            }
            Blob(value) => {
                state.write_u8(7);
                value.hash(state);
            }
            Reference(value) => {
                state.write_u8(8);
                value.hash(state);
            }
            GeoPoint(value) => {
                state.write_u8(9);
                state.write_u64(double_bits(value.latitude()));
                state.write_u64(double_bits(value.longitude()));
            }
            Array(values) => {
                state.write_u8(10);
                values.hash(state);
            }
            // entry order must not matter, so combine per-entry hashes
            // with a commutative sum
            Map(map) => {
                state.write_u8(11);
                state.write_usize(map.len());
                let mut combined: u64 = 0;
                for entry in map.iter() {
                    let mut entry_hasher = DefaultHasher::new();
                    entry.hash(&mut entry_hasher);
                    combined = combined.wrapping_add(entry_hasher.finish());
                }
                state.write_u64(combined);
            }
        }
    }
}

impl Debug for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.kind().fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(value: &FieldValue) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    fn map_of(entries: &[(&str, FieldValue)]) -> FieldMap {
        entries
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn integers_and_doubles_share_a_number_order() {
        let three = FieldValue::from_integer(3);
        let three_point_zero = FieldValue::from_double(3.0);
        let pi = FieldValue::from_double(3.14);
        assert_eq!(three.compare(&three_point_zero), Ordering::Equal);
        assert_eq!(three.compare(&pi), Ordering::Less);
        assert_eq!(pi.compare(&three), Ordering::Greater);
    }

    #[test]
    fn equality_is_structural_not_numeric() {
        let three = FieldValue::from_integer(3);
        let three_point_zero = FieldValue::from_double(3.0);
        assert_ne!(three, three_point_zero);

        let nan = FieldValue::from_double(f64::NAN);
        assert_eq!(nan, FieldValue::from_double(f64::NAN));
        assert_ne!(
            FieldValue::from_double(0.0),
            FieldValue::from_double(-0.0)
        );
    }

    #[test]
    fn nan_sorts_before_every_number_and_equal_to_itself() {
        let nan = FieldValue::from_double(f64::NAN);
        assert_eq!(nan.compare(&FieldValue::from_double(f64::NEG_INFINITY)), Ordering::Less);
        assert_eq!(nan.compare(&FieldValue::from_integer(i64::MIN)), Ordering::Less);
        assert_eq!(nan.compare(&nan), Ordering::Equal);
    }

    #[test]
    fn server_timestamps_sort_after_concrete_timestamps() {
        let early = FieldValue::from_timestamp(Timestamp::new(10, 0));
        let late = FieldValue::from_timestamp(Timestamp::new(9_000_000, 0));
        let pending = FieldValue::from_server_timestamp(Timestamp::new(1, 0), None);
        assert_eq!(late.compare(&pending), Ordering::Less);
        assert_eq!(pending.compare(&early), Ordering::Greater);
        let pending_later = FieldValue::from_server_timestamp(Timestamp::new(2, 0), None);
        assert_eq!(pending.compare(&pending_later), Ordering::Less);
    }

    #[test]
    fn arrays_compare_elementwise_then_by_length() {
        let short = FieldValue::from_array(vec![FieldValue::from_integer(1)]);
        let longer = FieldValue::from_array(vec![
            FieldValue::from_integer(1),
            FieldValue::from_integer(2),
        ]);
        let greater = FieldValue::from_array(vec![FieldValue::from_integer(5)]);
        assert_eq!(short.compare(&longer), Ordering::Less);
        assert_eq!(longer.compare(&greater), Ordering::Less);
    }

    #[test]
    fn maps_compare_entrywise_in_key_order() {
        let ab = FieldValue::from_map(map_of(&[
            ("a", FieldValue::from_integer(1)),
            ("b", FieldValue::from_integer(2)),
        ]));
        let ac = FieldValue::from_map(map_of(&[
            ("a", FieldValue::from_integer(1)),
            ("c", FieldValue::from_integer(0)),
        ]));
        let a = FieldValue::from_map(map_of(&[("a", FieldValue::from_integer(1))]));
        assert_eq!(ab.compare(&ac), Ordering::Less);
        assert_eq!(a.compare(&ab), Ordering::Less);
    }

    #[test]
    fn equal_maps_hash_alike_regardless_of_insertion_order() {
        let forward = FieldValue::from_map(
            [("a", 1), ("b", 2), ("c", 3)]
                .into_iter()
                .map(|(k, v)| (k.to_string(), FieldValue::from_integer(v)))
                .collect(),
        );
        let backward = FieldValue::from_map(
            [("c", 3), ("b", 2), ("a", 1)]
                .into_iter()
                .map(|(k, v)| (k.to_string(), FieldValue::from_integer(v)))
                .collect(),
        );
        assert_eq!(forward, backward);
        assert_eq!(hash_of(&forward), hash_of(&backward));
    }

    #[test]
    fn ranks_order_across_types() {
        let ordered = [
            FieldValue::null(),
            FieldValue::from_bool(true),
            FieldValue::from_integer(i64::MAX),
            FieldValue::from_timestamp(Timestamp::new(0, 0)),
            FieldValue::from_string("apple"),
            FieldValue::from_blob(vec![0xFF]),
            FieldValue::from_reference(
                DatabaseId::new("p", "d"),
                DocumentKey::from_string("rooms/a").unwrap(),
            ),
            FieldValue::from_geo_point(GeoPoint::new(90.0, 180.0).unwrap()),
            FieldValue::from_array(vec![]),
            FieldValue::empty_map(),
        ];
        for window in ordered.windows(2) {
            assert_eq!(
                window[0].compare(&window[1]),
                Ordering::Less,
                "{:?} should sort before {:?}",
                window[0],
                window[1]
            );
        }
    }
}
