//! Document values: an immutable tagged union with a total order, and the
//! persistent map it is built on.

mod field_value;
mod object_value;
mod sorted_map;

pub use field_value::{FieldMap, FieldValue, ReferenceValue, ServerTimestampValue, ValueKind};
pub use object_value::ObjectValue;
pub use sorted_map::SortedMap;
