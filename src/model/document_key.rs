use std::fmt::{Display, Formatter};

use crate::error::{invalid_argument, StoreResult};
use crate::model::ResourcePath;

/// Path to a document, always an even, non-zero number of segments.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentKey {
    path: ResourcePath,
}

/// Whether a path names a document rather than a collection.
pub fn is_document_key(path: &ResourcePath) -> bool {
    !path.is_empty() && path.len() % 2 == 0
}

impl DocumentKey {
    pub fn from_path(path: ResourcePath) -> StoreResult<Self> {
        if !is_document_key(&path) {
            return Err(invalid_argument(
                "Document keys must point to a document (even number of segments)",
            ));
        }
        Ok(Self { path })
    }

    pub fn from_string(path: &str) -> StoreResult<Self> {
        Self::from_path(ResourcePath::from_string(path)?)
    }

    pub fn from_segments<I, S>(segments: I) -> StoreResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_path(ResourcePath::from_segments(segments))
    }

    pub fn path(&self) -> &ResourcePath {
        &self.path
    }

    /// The collection the document lives in.
    pub fn collection_path(&self) -> ResourcePath {
        self.path.without_last()
    }

    /// The id of the document's parent collection.
    pub fn collection_id(&self) -> &str {
        // at least two segments by construction
        self.path[self.path.len() - 2].as_str()
    }

    /// Whether the document sits in a collection with the given id, at any
    /// nesting depth.
    pub fn has_collection_id(&self, collection_id: &str) -> bool {
        self.collection_id() == collection_id
    }

    pub fn id(&self) -> &str {
        self.path[self.path.len() - 1].as_str()
    }
}

impl Display for DocumentKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_even_segments() {
        let err = DocumentKey::from_string("rooms").unwrap_err();
        assert_eq!(err.code_str(), "localstore/invalid-argument");
        let err = DocumentKey::from_string("").unwrap_err();
        assert_eq!(err.code_str(), "localstore/invalid-argument");
    }

    #[test]
    fn parses_valid_path() {
        let key = DocumentKey::from_string("rooms/eros").unwrap();
        assert_eq!(key.id(), "eros");
        assert_eq!(key.collection_path().canonical_string(), "rooms");
    }

    #[test]
    fn collection_id_is_the_parent_collection() {
        let key = DocumentKey::from_string("rooms/eros/messages/1").unwrap();
        assert_eq!(key.collection_id(), "messages");
        assert!(key.has_collection_id("messages"));
        assert!(!key.has_collection_id("rooms"));
    }

    #[test]
    fn keys_order_by_path() {
        let a = DocumentKey::from_string("rooms/a").unwrap();
        let b = DocumentKey::from_string("rooms/b").unwrap();
        let nested = DocumentKey::from_string("rooms/a/messages/1").unwrap();
        assert!(a < b);
        assert!(a < nested);
        assert!(nested < b);
    }
}
