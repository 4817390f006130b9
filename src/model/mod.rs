//! Core document model: paths, keys, versions, documents and mutations.

mod database_id;
mod document;
mod document_key;
mod field_path;
mod geo_point;
mod mutation;
mod resource_path;
mod snapshot_version;
mod timestamp;

pub use database_id::{DatabaseId, DEFAULT_DATABASE_ID};
pub use document::{Document, MaybeDocument, NoDocument, UnknownDocument};
pub use document_key::{is_document_key, DocumentKey};
pub use field_path::{FieldPath, IntoFieldPath, KEY_FIELD_NAME};
pub use geo_point::GeoPoint;
pub use mutation::{FieldMask, Mutation, Precondition};
pub use resource_path::ResourcePath;
pub use snapshot_version::SnapshotVersion;
pub use timestamp::Timestamp;

/// Identifies a listened-to query in the target cache. Assigned by the
/// client and stable for the lifetime of the listen.
pub type TargetId = i32;

/// Identifies a mutation batch within the mutation queue.
pub type BatchId = i32;

/// Monotonic logical clock stamped on cache-touching operations. The
/// garbage collector's only notion of age.
pub type ListenSequenceNumber = i64;
