//! Declarative queries and the matching rules that run them against
//! cached documents.

mod filter;
mod order_by;
mod query;

pub use filter::{CompositeFilter, FieldFilter, Filter, Operator, UnaryFilter, UnaryOperator};
pub use order_by::{Direction, OrderBy};
pub use query::Query;
