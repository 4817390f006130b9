//! Client-side document cache with offline persistence and query support.
//!
//! The crate keeps a local mirror of remote documents, layers not-yet-acked
//! mutations on top of it, and answers structured queries against the merged
//! view. [`local`] holds the persistence layer (serialization, overlay and
//! target caches, garbage collection), [`model`] and [`value`] the document
//! and field-value types, [`query`] the filter and ordering machinery, and
//! [`wire`] the byte-level codec the persistence layer stores records with.

pub mod bloom_filter;
pub mod credentials;
pub mod error;
pub mod local;
pub mod model;
pub mod query;
pub mod util;
pub mod value;
pub mod wire;
