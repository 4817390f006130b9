use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};

use once_cell::sync::OnceCell;

use crate::model::{is_document_key, Document, FieldPath, ResourcePath};
use crate::query::{Direction, Filter, OrderBy};
use crate::util::assert::hard_assert;

/// A declarative query over the document cache: a path scope plus filters
/// and ordering. Immutable; the builder methods return extended copies.
#[derive(Clone, Debug)]
pub struct Query {
    path: ResourcePath,
    collection_group: Option<String>,
    filters: Vec<Filter>,
    explicit_order_bys: Vec<OrderBy>,
    // derived ordering, computed once per query instance
    memoized_order_bys: OnceCell<Vec<OrderBy>>,
}

impl Query {
    /// A query over the collection or single document at the path.
    pub fn new(path: ResourcePath) -> Self {
        Self::with_collection_group(path, None)
    }

    /// A query over every collection with the given id under the path.
    pub fn with_collection_group(path: ResourcePath, collection_group: Option<String>) -> Self {
        Self {
            path,
            collection_group,
            filters: Vec::new(),
            explicit_order_bys: Vec::new(),
            memoized_order_bys: OnceCell::new(),
        }
    }

    /// Reassembles a decoded query without revalidating builder invariants;
    /// the encoder only ever persists valid queries.
    pub(crate) fn from_parts(
        path: ResourcePath,
        collection_group: Option<String>,
        filters: Vec<Filter>,
        explicit_order_bys: Vec<OrderBy>,
    ) -> Self {
        Self {
            path,
            collection_group,
            filters,
            explicit_order_bys,
            memoized_order_bys: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &ResourcePath {
        &self.path
    }

    pub fn collection_group(&self) -> Option<&str> {
        self.collection_group.as_deref()
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn explicit_order_bys(&self) -> &[OrderBy] {
        &self.explicit_order_bys
    }

    /// Whether this query addresses a single document by its exact path.
    pub fn is_document_query(&self) -> bool {
        is_document_key(&self.path) && self.collection_group.is_none() && self.filters.is_empty()
    }

    pub fn is_collection_group_query(&self) -> bool {
        self.collection_group.is_some()
    }

    /// The field constrained by this query's inequality filter, if any.
    pub fn inequality_filter_field(&self) -> Option<&FieldPath> {
        self.filters.iter().find_map(Filter::first_inequality_field)
    }

    pub fn first_order_by_field(&self) -> Option<&FieldPath> {
        self.explicit_order_bys.first().map(OrderBy::field)
    }

    /// The full ordering: the explicit order-bys plus an implicit trailing
    /// order on the document key, in the direction of the last explicit
    /// entry. A query with an inequality but no explicit ordering orders by
    /// the inequality field first. Memoized; repeated calls return the
    /// identical slice.
    pub fn order_bys(&self) -> &[OrderBy] {
        self.memoized_order_bys.get_or_init(|| self.derive_order_bys())
    }

    fn derive_order_bys(&self) -> Vec<OrderBy> {
        let inequality_field = self.inequality_filter_field();
        let first_order_by_field = self.first_order_by_field();
        match (inequality_field, first_order_by_field) {
            (Some(inequality), None) => {
                // the implicit key ordering alone is not a valid ordering
                // for an inequality query, so the inequality field leads
                if inequality.is_key_field_path() {
                    vec![OrderBy::ascending(FieldPath::key_field_path().clone())]
                } else {
                    vec![
                        OrderBy::ascending(inequality.clone()),
                        OrderBy::ascending(FieldPath::key_field_path().clone()),
                    ]
                }
            }
            (inequality, first_field) => {
                hard_assert(
                    inequality.is_none() || inequality == first_field,
                    "First orderBy must match inequality field.",
                );
                let mut result = self.explicit_order_bys.clone();
                let has_key_order = result
                    .iter()
                    .any(|order_by| order_by.field().is_key_field_path());
                if !has_key_order {
                    let direction = result
                        .last()
                        .map_or(Direction::Ascending, OrderBy::direction);
                    result.push(OrderBy::new(FieldPath::key_field_path().clone(), direction));
                }
                result
            }
        }
    }

    /// Returns an extended query with the filter appended.
    pub fn adding_filter(&self, filter: Filter) -> Query {
        hard_assert(
            !self.is_document_query(),
            "No filter is allowed for document query",
        );
        if let (Some(new_field), Some(existing)) =
            (filter.first_inequality_field(), self.inequality_filter_field())
        {
            hard_assert(
                new_field == existing,
                "Query must only have one inequality field.",
            );
        }
        let mut filters = self.filters.clone();
        filters.push(filter);
        Query {
            path: self.path.clone(),
            collection_group: self.collection_group.clone(),
            filters,
            explicit_order_bys: self.explicit_order_bys.clone(),
            memoized_order_bys: OnceCell::new(),
        }
    }

    /// Returns an extended query with the ordering appended.
    pub fn adding_order_by(&self, order_by: OrderBy) -> Query {
        hard_assert(
            !self.is_document_query(),
            "No ordering is allowed for document query",
        );
        if self.explicit_order_bys.is_empty() {
            if let Some(inequality) = self.inequality_filter_field() {
                hard_assert(
                    inequality == order_by.field(),
                    "First OrderBy must match inequality field.",
                );
            }
        }
        let mut explicit_order_bys = self.explicit_order_bys.clone();
        explicit_order_bys.push(order_by);
        Query {
            path: self.path.clone(),
            collection_group: self.collection_group.clone(),
            filters: self.filters.clone(),
            explicit_order_bys,
            memoized_order_bys: OnceCell::new(),
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.matches_path(doc) && self.matches_order_by(doc) && self.matches_filters(doc)
    }

    fn matches_path(&self, doc: &Document) -> bool {
        let doc_path = doc.key().path();
        if let Some(collection_id) = &self.collection_group {
            doc.key().has_collection_id(collection_id) && self.path.is_prefix_of(doc_path)
        } else if is_document_key(&self.path) {
            *doc_path == self.path
        } else {
            // the document must be an immediate child of the query path
            self.path.is_prefix_of(doc_path) && doc_path.len() == self.path.len() + 1
        }
    }

    fn matches_filters(&self, doc: &Document) -> bool {
        self.filters.iter().all(|filter| filter.matches(doc))
    }

    /// A document that is missing a sorted-on field cannot be ordered and
    /// is excluded from the result set.
    fn matches_order_by(&self, doc: &Document) -> bool {
        self.explicit_order_bys.iter().all(|order_by| {
            order_by.field().is_key_field_path() || doc.field(order_by.field()).is_some()
        })
    }

    /// Orders two matching documents per the derived order-by list, with
    /// the trailing key ordering guaranteeing a total order.
    pub fn compare(&self, lhs: &Document, rhs: &Document) -> Ordering {
        for order_by in self.order_bys() {
            let result = order_by.compare(lhs, rhs);
            if result != Ordering::Equal {
                return result;
            }
        }
        Ordering::Equal
    }
}

impl PartialEq for Query {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
            && self.collection_group == other.collection_group
            && self.filters == other.filters
            && self.order_bys() == other.order_bys()
    }
}

impl Eq for Query {}

impl Display for Query {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Query({}", self.path.canonical_string())?;
        if let Some(collection_group) = &self.collection_group {
            write!(f, "|cg:{collection_group}")?;
        }
        if !self.filters.is_empty() {
            write!(f, " where ")?;
            for (index, filter) in self.filters.iter().enumerate() {
                if index > 0 {
                    write!(f, " and ")?;
                }
                write!(f, "{filter}")?;
            }
        }
        if !self.explicit_order_bys.is_empty() {
            write!(f, " order by ")?;
            for (index, order_by) in self.explicit_order_bys.iter().enumerate() {
                if index > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{order_by}")?;
            }
        }
        write!(f, ")")
    }
}
