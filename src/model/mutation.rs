use crate::model::{Document, DocumentKey, FieldPath, MaybeDocument, NoDocument, SnapshotVersion};
use crate::value::{FieldValue, ObjectValue};

/// The set of field paths a patch writes, sorted and deduplicated. Paths in
/// the mask that are absent from the patch data are deletes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldMask {
    paths: Vec<FieldPath>,
}

impl FieldMask {
    pub fn new(mut paths: Vec<FieldPath>) -> Self {
        paths.sort();
        paths.dedup();
        Self { paths }
    }

    pub fn paths(&self) -> &[FieldPath] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Guard a mutation applies against the current state of the document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Precondition {
    /// Applies unconditionally.
    None,
    /// Requires the document to exist (true) or not exist (false).
    Exists(bool),
    /// Requires the document to exist at exactly this version.
    UpdateTime(SnapshotVersion),
}

impl Precondition {
    pub fn is_none(&self) -> bool {
        matches!(self, Precondition::None)
    }

    pub fn is_valid_for(&self, base: Option<&MaybeDocument>) -> bool {
        let exists = matches!(base, Some(doc) if doc.is_document());
        match self {
            Precondition::None => true,
            Precondition::Exists(expected) => exists == *expected,
            Precondition::UpdateTime(update_time) => {
                exists && base.map(MaybeDocument::version) == Some(*update_time)
            }
        }
    }
}

/// A pending local write. Applying a mutation over the latest cached base
/// document yields the view local listeners should see before the backend
/// acknowledges the write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mutation {
    Set {
        key: DocumentKey,
        value: ObjectValue,
        precondition: Precondition,
    },
    Patch {
        key: DocumentKey,
        data: ObjectValue,
        mask: FieldMask,
        precondition: Precondition,
    },
    Delete {
        key: DocumentKey,
        precondition: Precondition,
    },
}

impl Mutation {
    pub fn set(key: DocumentKey, value: ObjectValue, precondition: Precondition) -> Self {
        Mutation::Set {
            key,
            value,
            precondition,
        }
    }

    pub fn patch(
        key: DocumentKey,
        data: ObjectValue,
        mask: FieldMask,
        precondition: Precondition,
    ) -> Self {
        Mutation::Patch {
            key,
            data,
            mask,
            precondition,
        }
    }

    pub fn delete(key: DocumentKey, precondition: Precondition) -> Self {
        Mutation::Delete { key, precondition }
    }

    pub fn key(&self) -> &DocumentKey {
        match self {
            Mutation::Set { key, .. } | Mutation::Patch { key, .. } | Mutation::Delete { key, .. } => {
                key
            }
        }
    }

    pub fn precondition(&self) -> &Precondition {
        match self {
            Mutation::Set { precondition, .. }
            | Mutation::Patch { precondition, .. }
            | Mutation::Delete { precondition, .. } => precondition,
        }
    }

    /// Applies the mutation to the latest cached state of its document.
    /// When the precondition fails, the base state passes through unchanged.
    pub fn apply_to_local_view(&self, base: Option<&MaybeDocument>) -> Option<MaybeDocument> {
        if !self.precondition().is_valid_for(base) {
            return base.cloned();
        }
        match self {
            Mutation::Set { key, value, .. } => Some(
                Document::new(key.clone(), post_mutation_version(base), value.clone()).into(),
            ),
            Mutation::Patch { key, data, mask, .. } => {
                let patched = patch_object(base_data(base), data, mask);
                Some(Document::new(key.clone(), post_mutation_version(base), patched).into())
            }
            // locally deleted documents have no meaningful version yet
            Mutation::Delete { key, .. } => {
                Some(NoDocument::new(key.clone(), SnapshotVersion::NONE).into())
            }
        }
    }
}

fn post_mutation_version(base: Option<&MaybeDocument>) -> SnapshotVersion {
    match base {
        Some(MaybeDocument::Document(doc)) => doc.version(),
        _ => SnapshotVersion::NONE,
    }
}

fn base_data(base: Option<&MaybeDocument>) -> ObjectValue {
    match base {
        Some(MaybeDocument::Document(doc)) => doc.data().clone(),
        _ => ObjectValue::empty(),
    }
}

fn patch_object(mut object: ObjectValue, data: &ObjectValue, mask: &FieldMask) -> ObjectValue {
    for path in mask.paths() {
        object = match data.get(path) {
            Some(value) => object.set(path, value.clone()),
            None => object.delete(path),
        };
    }
    object
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Timestamp;

    fn key(path: &str) -> DocumentKey {
        DocumentKey::from_string(path).unwrap()
    }

    fn field(dotted: &str) -> FieldPath {
        FieldPath::from_dot_separated(dotted).unwrap()
    }

    fn version(seconds: i64) -> SnapshotVersion {
        SnapshotVersion::new(Timestamp::new(seconds, 0))
    }

    fn base_doc(seconds: i64, fields: &[(&str, i64)]) -> MaybeDocument {
        let mut data = ObjectValue::empty();
        for (name, value) in fields {
            data = data.set(&field(name), FieldValue::from_integer(*value));
        }
        Document::new(key("rooms/eros"), version(seconds), data).into()
    }

    #[test]
    fn set_replaces_document_contents() {
        let base = base_doc(4, &[("old", 1)]);
        let mutation = Mutation::set(
            key("rooms/eros"),
            ObjectValue::empty().set(&field("new"), FieldValue::from_integer(2)),
            Precondition::None,
        );
        let applied = mutation.apply_to_local_view(Some(&base)).unwrap();
        let doc = applied.as_document().unwrap();
        assert_eq!(doc.field(&field("old")), None);
        assert_eq!(doc.field(&field("new")), Some(&FieldValue::from_integer(2)));
        assert_eq!(doc.version(), version(4));
    }

    #[test]
    fn patch_applies_only_masked_paths() {
        let base = base_doc(4, &[("kept", 1), ("patched", 2), ("dropped", 3)]);
        let data = ObjectValue::empty()
            .set(&field("patched"), FieldValue::from_integer(20))
            .set(&field("unmasked"), FieldValue::from_integer(99));
        let mask = FieldMask::new(vec![field("patched"), field("dropped")]);
        let mutation = Mutation::patch(key("rooms/eros"), data, mask, Precondition::None);

        let applied = mutation.apply_to_local_view(Some(&base)).unwrap();
        let doc = applied.as_document().unwrap();
        assert_eq!(doc.field(&field("kept")), Some(&FieldValue::from_integer(1)));
        assert_eq!(
            doc.field(&field("patched")),
            Some(&FieldValue::from_integer(20))
        );
        // masked but absent from the patch data: deleted
        assert_eq!(doc.field(&field("dropped")), None);
        // present in the patch data but unmasked: ignored
        assert_eq!(doc.field(&field("unmasked")), None);
    }

    #[test]
    fn patch_on_missing_document_builds_from_empty() {
        let data = ObjectValue::empty().set(&field("a"), FieldValue::from_integer(1));
        let mask = FieldMask::new(vec![field("a")]);
        let mutation = Mutation::patch(key("rooms/eros"), data, mask, Precondition::None);
        let applied = mutation.apply_to_local_view(None).unwrap();
        let doc = applied.as_document().unwrap();
        assert_eq!(doc.field(&field("a")), Some(&FieldValue::from_integer(1)));
        assert_eq!(doc.version(), SnapshotVersion::NONE);
    }

    #[test]
    fn delete_leaves_a_tombstone() {
        let base = base_doc(4, &[("a", 1)]);
        let mutation = Mutation::delete(key("rooms/eros"), Precondition::None);
        let applied = mutation.apply_to_local_view(Some(&base)).unwrap();
        assert_eq!(
            applied,
            NoDocument::new(key("rooms/eros"), SnapshotVersion::NONE).into()
        );
    }

    #[test]
    fn failed_precondition_passes_base_through() {
        let mutation = Mutation::set(
            key("rooms/eros"),
            ObjectValue::empty(),
            Precondition::Exists(true),
        );
        assert_eq!(mutation.apply_to_local_view(None), None);

        let base = base_doc(4, &[("a", 1)]);
        let stale = Mutation::patch(
            key("rooms/eros"),
            ObjectValue::empty(),
            FieldMask::new(vec![]),
            Precondition::UpdateTime(version(99)),
        );
        assert_eq!(stale.apply_to_local_view(Some(&base)), Some(base));
    }

    #[test]
    fn update_time_precondition_matches_exact_version() {
        let base = base_doc(7, &[("a", 1)]);
        assert!(Precondition::UpdateTime(version(7)).is_valid_for(Some(&base)));
        assert!(!Precondition::UpdateTime(version(8)).is_valid_for(Some(&base)));
        assert!(!Precondition::UpdateTime(version(7)).is_valid_for(None));
        assert!(Precondition::Exists(false).is_valid_for(None));
    }

    #[test]
    fn field_mask_sorts_and_deduplicates() {
        let mask = FieldMask::new(vec![field("b"), field("a"), field("b")]);
        assert_eq!(mask.paths(), &[field("a"), field("b")]);
        assert_eq!(mask.len(), 2);
    }
}
