use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};

use crate::model::{Document, FieldPath};
use crate::util::assert::hard_fail;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

impl Direction {
    pub fn apply(self, result: Ordering) -> Ordering {
        match self {
            Direction::Ascending => result,
            Direction::Descending => result.reverse(),
        }
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Ascending => write!(f, "asc"),
            Direction::Descending => write!(f, "desc"),
        }
    }
}

/// One component of a query's ordering: a field and a direction. Ordering
/// on the reserved key field compares document keys instead of field
/// values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderBy {
    field: FieldPath,
    direction: Direction,
}

impl OrderBy {
    pub fn new(field: FieldPath, direction: Direction) -> Self {
        Self { field, direction }
    }

    pub fn ascending(field: FieldPath) -> Self {
        Self::new(field, Direction::Ascending)
    }

    pub fn descending(field: FieldPath) -> Self {
        Self::new(field, Direction::Descending)
    }

    pub fn field(&self) -> &FieldPath {
        &self.field
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn compare(&self, lhs: &Document, rhs: &Document) -> Ordering {
        let result = if self.field.is_key_field_path() {
            lhs.key().cmp(rhs.key())
        } else {
            match (lhs.field(&self.field), rhs.field(&self.field)) {
                (Some(lhs_value), Some(rhs_value)) => lhs_value.compare(rhs_value),
                _ => hard_fail("Trying to compare documents on fields that don't exist."),
            }
        };
        self.direction.apply(result)
    }
}

impl Display for OrderBy {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field.canonical_string(), self.direction)
    }
}
