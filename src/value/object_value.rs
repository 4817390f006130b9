use crate::model::FieldPath;
use crate::util::assert::{hard_assert, hard_fail};
use crate::value::{FieldMap, FieldValue, ValueKind};

/// Structured contents of a document: a map value with access by dotted
/// field path. All edits return a new object and share unchanged subtrees
/// with the receiver.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectValue {
    value: FieldValue,
}

impl ObjectValue {
    pub fn empty() -> Self {
        Self {
            value: FieldValue::empty_map(),
        }
    }

    pub fn from_map(map: FieldMap) -> Self {
        Self {
            value: FieldValue::from_map(map),
        }
    }

    /// Wraps an existing value, which must be map-typed.
    pub fn from_field_value(value: FieldValue) -> Self {
        hard_assert(value.is_map(), "ObjectValue requires a map-typed value");
        Self { value }
    }

    pub fn as_field_value(&self) -> &FieldValue {
        &self.value
    }

    pub fn field_map(&self) -> &FieldMap {
        match self.value.kind() {
            ValueKind::Map(map) => map,
            _ => hard_fail("ObjectValue holds a non-map value"),
        }
    }

    /// The value at the path, or None when the path or any parent is
    /// missing or a parent is not a map.
    pub fn get(&self, path: &FieldPath) -> Option<&FieldValue> {
        let mut current = &self.value;
        for segment in path.segments() {
            match current.kind() {
                ValueKind::Map(map) => current = map.get(segment)?,
                _ => return None,
            }
        }
        Some(current)
    }

    /// Returns a copy with the value stored at the path, creating
    /// intermediate maps as needed and overwriting any non-map value that
    /// stands in the way.
    pub fn set(&self, path: &FieldPath, value: FieldValue) -> ObjectValue {
        Self::from_map(set_at_path(self.field_map(), path.segments(), value))
    }

    /// Returns a copy without the field at the path. Deleting a missing
    /// field, or a path whose parent is not a map, changes nothing.
    pub fn delete(&self, path: &FieldPath) -> ObjectValue {
        Self::from_map(delete_at_path(self.field_map(), path.segments()))
    }
}

impl Default for ObjectValue {
    fn default() -> Self {
        Self::empty()
    }
}

fn set_at_path(map: &FieldMap, segments: &[String], value: FieldValue) -> FieldMap {
    match segments {
        [] => map.clone(),
        [leaf] => map.insert(leaf.clone(), value),
        [head, rest @ ..] => {
            let child = match map.get(head).map(FieldValue::kind) {
                Some(ValueKind::Map(existing)) => existing.clone(),
                _ => FieldMap::new(),
            };
            map.insert(
                head.clone(),
                FieldValue::from_map(set_at_path(&child, rest, value)),
            )
        }
    }
}

fn delete_at_path(map: &FieldMap, segments: &[String]) -> FieldMap {
    match segments {
        [] => map.clone(),
        [leaf] => map.remove(leaf),
        [head, rest @ ..] => match map.get(head).map(FieldValue::kind) {
            Some(ValueKind::Map(existing)) => map.insert(
                head.clone(),
                FieldValue::from_map(delete_at_path(existing, rest)),
            ),
            _ => map.clone(),
        },
    }
}
