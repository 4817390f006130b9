use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};

use crate::model::{Document, DocumentKey, FieldPath};
use crate::util::assert::{hard_assert, hard_fail};
use crate::value::{FieldValue, ValueKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    LessThan,
    LessThanOrEqual,
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    ArrayContains,
    In,
    ArrayContainsAny,
    NotIn,
}

impl Operator {
    /// Inequality operators constrain a query to one field and pin the
    /// first explicit ordering to that field.
    pub fn is_inequality(self) -> bool {
        matches!(
            self,
            Operator::LessThan
                | Operator::LessThanOrEqual
                | Operator::GreaterThan
                | Operator::GreaterThanOrEqual
                | Operator::NotEqual
                | Operator::NotIn
        )
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let token = match self {
            Operator::LessThan => "<",
            Operator::LessThanOrEqual => "<=",
            Operator::Equal => "==",
            Operator::NotEqual => "!=",
            Operator::GreaterThan => ">",
            Operator::GreaterThanOrEqual => ">=",
            Operator::ArrayContains => "array_contains",
            Operator::In => "in",
            Operator::ArrayContainsAny => "array_contains_any",
            Operator::NotIn => "not_in",
        };
        write!(f, "{token}")
    }
}

/// Compares a document field against a fixed value. Filters on the
/// reserved key field compare document keys against reference values.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldFilter {
    field: FieldPath,
    op: Operator,
    value: FieldValue,
}

impl FieldFilter {
    pub fn field(&self) -> &FieldPath {
        &self.field
    }

    pub fn op(&self) -> Operator {
        self.op
    }

    pub fn value(&self) -> &FieldValue {
        &self.value
    }

    pub fn matches(&self, doc: &Document) -> bool {
        if self.field.is_key_field_path() {
            self.matches_key(doc.key())
        } else {
            match doc.field(&self.field) {
                Some(value) => self.matches_value(value),
                None => false,
            }
        }
    }

    fn matches_key(&self, key: &DocumentKey) -> bool {
        match self.op {
            Operator::In | Operator::NotIn => {
                let contained = self.members().iter().any(|member| match member.kind() {
                    ValueKind::Reference(reference) => reference.key == *key,
                    _ => hard_fail("Comparing on key, but filter value not a Reference"),
                });
                (self.op == Operator::In) == contained
            }
            Operator::ArrayContains | Operator::ArrayContainsAny => {
                hard_fail("arrayContains queries don't make sense on document keys.")
            }
            _ => match self.value.kind() {
                ValueKind::Reference(reference) => {
                    self.matches_comparison(key.cmp(&reference.key))
                }
                _ => hard_fail("Comparing on key, but filter value not a Reference"),
            },
        }
    }

    fn matches_value(&self, value: &FieldValue) -> bool {
        match self.op {
            Operator::ArrayContains => match value.kind() {
                ValueKind::Array(elements) => elements.contains(&self.value),
                _ => false,
            },
            Operator::In => self.members().contains(value),
            Operator::ArrayContainsAny => match value.kind() {
                ValueKind::Array(elements) => {
                    elements.iter().any(|element| self.members().contains(element))
                }
                _ => false,
            },
            // null and NaN never match a negated membership test
            Operator::NotIn => {
                !value.is_null() && !value.is_nan() && !self.members().contains(value)
            }
            Operator::NotEqual => {
                !value.is_null()
                    && !value.is_nan()
                    && !(value.comparable_with(&self.value)
                        && value.compare(&self.value) == Ordering::Equal)
            }
            // relational comparisons only apply within one type rank
            _ => {
                value.comparable_with(&self.value)
                    && self.matches_comparison(value.compare(&self.value))
            }
        }
    }

    fn matches_comparison(&self, result: Ordering) -> bool {
        match self.op {
            Operator::LessThan => result == Ordering::Less,
            Operator::LessThanOrEqual => result != Ordering::Greater,
            Operator::Equal => result == Ordering::Equal,
            Operator::NotEqual => result != Ordering::Equal,
            Operator::GreaterThan => result == Ordering::Greater,
            Operator::GreaterThanOrEqual => result != Ordering::Less,
            _ => hard_fail("matches_comparison called for a membership operator"),
        }
    }

    fn members(&self) -> &[FieldValue] {
        match self.value.kind() {
            ValueKind::Array(values) => values,
            _ => hard_fail("Filter value for a membership operator must be an array"),
        }
    }
}

impl Display for FieldFilter {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {:?}",
            self.field.canonical_string(),
            self.op,
            self.value
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOperator {
    IsNull,
    IsNan,
}

/// Tests a field for null or NaN, the two values equality filters cannot
/// reach.
#[derive(Clone, Debug, PartialEq)]
pub struct UnaryFilter {
    field: FieldPath,
    op: UnaryOperator,
}

impl UnaryFilter {
    pub fn field(&self) -> &FieldPath {
        &self.field
    }

    pub fn op(&self) -> UnaryOperator {
        self.op
    }

    pub fn matches(&self, doc: &Document) -> bool {
        match doc.field(&self.field) {
            Some(value) => match self.op {
                UnaryOperator::IsNull => value.is_null(),
                UnaryOperator::IsNan => value.is_nan(),
            },
            None => false,
        }
    }
}

impl Display for UnaryFilter {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.op {
            UnaryOperator::IsNull => write!(f, "{} is null", self.field.canonical_string()),
            UnaryOperator::IsNan => write!(f, "{} is nan", self.field.canonical_string()),
        }
    }
}

/// Conjunction of child filters.
#[derive(Clone, Debug, PartialEq)]
pub struct CompositeFilter {
    filters: Vec<Filter>,
}

impl CompositeFilter {
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.filters.iter().all(|filter| filter.matches(doc))
    }
}

impl Display for CompositeFilter {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "and(")?;
        for (index, filter) in self.filters.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{filter}")?;
        }
        write!(f, ")")
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    Field(FieldFilter),
    Unary(UnaryFilter),
    Composite(CompositeFilter),
}

impl Filter {
    pub fn field(field: FieldPath, op: Operator, value: FieldValue) -> Filter {
        if field.is_key_field_path() {
            match op {
                Operator::ArrayContains | Operator::ArrayContainsAny => {
                    hard_fail("arrayContains queries don't make sense on document keys.")
                }
                Operator::In | Operator::NotIn => hard_assert(
                    matches!(value.kind(), ValueKind::Array(_)),
                    "Comparing on key with in/not-in, but filter value not an array",
                ),
                _ => hard_assert(
                    matches!(value.kind(), ValueKind::Reference(_)),
                    "Comparing on key, but filter value not a Reference",
                ),
            }
        } else if matches!(
            op,
            Operator::In | Operator::NotIn | Operator::ArrayContainsAny
        ) {
            hard_assert(
                matches!(value.kind(), ValueKind::Array(_)),
                "Filter value for a membership operator must be an array",
            );
        }
        Filter::Field(FieldFilter { field, op, value })
    }

    /// Reassembles a decoded field filter without revalidating constructor
    /// invariants.
    pub(crate) fn from_parts(field: FieldPath, op: Operator, value: FieldValue) -> Filter {
        Filter::Field(FieldFilter { field, op, value })
    }

    pub fn is_null(field: FieldPath) -> Filter {
        Filter::Unary(UnaryFilter {
            field,
            op: UnaryOperator::IsNull,
        })
    }

    pub fn is_nan(field: FieldPath) -> Filter {
        Filter::Unary(UnaryFilter {
            field,
            op: UnaryOperator::IsNan,
        })
    }

    pub fn and(filters: Vec<Filter>) -> Filter {
        Filter::Composite(CompositeFilter { filters })
    }

    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::Field(filter) => filter.matches(doc),
            Filter::Unary(filter) => filter.matches(doc),
            Filter::Composite(filter) => filter.matches(doc),
        }
    }

    /// The field constrained by the first inequality in this filter tree,
    /// if any.
    pub fn first_inequality_field(&self) -> Option<&FieldPath> {
        match self {
            Filter::Field(filter) if filter.op().is_inequality() => Some(filter.field()),
            Filter::Field(_) | Filter::Unary(_) => None,
            Filter::Composite(composite) => composite
                .filters()
                .iter()
                .find_map(Filter::first_inequality_field),
        }
    }
}

impl Display for Filter {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Field(filter) => filter.fmt(f),
            Filter::Unary(filter) => filter.fmt(f),
            Filter::Composite(filter) => filter.fmt(f),
        }
    }
}
