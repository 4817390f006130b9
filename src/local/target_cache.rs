//! In-memory registry of active and recently active query targets.
//!
//! Tracks the metadata for every target the SDK has listened to, the set of
//! document keys each target matched last, and the high-water marks for
//! target ids and sequence numbers. Garbage collection drives off this
//! registry when it picks targets to evict.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::local::target_data::TargetData;
use crate::model::{DocumentKey, ListenSequenceNumber, TargetId};
use crate::query::Query;

#[derive(Default)]
pub struct MemoryTargetCache {
    targets: BTreeMap<TargetId, TargetData>,
    references: BTreeMap<DocumentKey, BTreeSet<TargetId>>,
    highest_target_id: TargetId,
    highest_sequence_number: ListenSequenceNumber,
}

impl MemoryTargetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the metadata for a target and advances the
    /// high-water marks.
    pub fn add_target_data(&mut self, data: TargetData) {
        if data.target_id() > self.highest_target_id {
            self.highest_target_id = data.target_id();
        }
        if data.sequence_number() > self.highest_sequence_number {
            self.highest_sequence_number = data.sequence_number();
        }
        self.targets.insert(data.target_id(), data);
    }

    pub fn remove_target_data(&mut self, target_id: TargetId) {
        self.targets.remove(&target_id);
        self.remove_references_for_target(target_id);
    }

    pub fn target_data(&self, target_id: TargetId) -> Option<&TargetData> {
        self.targets.get(&target_id)
    }

    pub fn target_data_for_query(&self, query: &Query) -> Option<&TargetData> {
        self.targets.values().find(|data| data.query() == query)
    }

    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    pub fn highest_target_id(&self) -> TargetId {
        self.highest_target_id
    }

    pub fn highest_listen_sequence_number(&self) -> ListenSequenceNumber {
        self.highest_sequence_number
    }

    pub fn for_each_target(&self, mut callback: impl FnMut(&TargetData)) {
        for data in self.targets.values() {
            callback(data);
        }
    }

    pub fn add_matching_keys(&mut self, keys: &[DocumentKey], target_id: TargetId) {
        for key in keys {
            self.references
                .entry(key.clone())
                .or_default()
                .insert(target_id);
        }
    }

    pub fn remove_matching_keys(&mut self, keys: &[DocumentKey], target_id: TargetId) {
        for key in keys {
            if let Some(targets) = self.references.get_mut(key) {
                targets.remove(&target_id);
                if targets.is_empty() {
                    self.references.remove(key);
                }
            }
        }
    }

    /// True while any target still references the document.
    pub fn contains_key(&self, key: &DocumentKey) -> bool {
        self.references.contains_key(key)
    }

    /// Drops every target whose sequence number is at or below `upper_bound`
    /// and whose id is not in `live_targets`, along with its document
    /// references. Returns how many targets were dropped.
    pub fn remove_targets_through_sequence_number(
        &mut self,
        upper_bound: ListenSequenceNumber,
        live_targets: &HashSet<TargetId>,
    ) -> usize {
        let doomed: Vec<TargetId> = self
            .targets
            .values()
            .filter(|data| {
                data.sequence_number() <= upper_bound
                    && !live_targets.contains(&data.target_id())
            })
            .map(|data| data.target_id())
            .collect();
        for target_id in &doomed {
            self.targets.remove(target_id);
            self.remove_references_for_target(*target_id);
        }
        doomed.len()
    }

    fn remove_references_for_target(&mut self, target_id: TargetId) {
        self.references.retain(|_, targets| {
            targets.remove(&target_id);
            !targets.is_empty()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::target_data::QueryPurpose;
    use crate::model::ResourcePath;

    fn target(id: TargetId, sequence_number: ListenSequenceNumber) -> TargetData {
        TargetData::new(
            Query::new(ResourcePath::from_string("rooms").unwrap()),
            id,
            sequence_number,
            QueryPurpose::Listen,
        )
    }

    fn key(path: &str) -> DocumentKey {
        DocumentKey::from_string(path).unwrap()
    }

    #[test]
    fn tracks_high_water_marks() {
        let mut cache = MemoryTargetCache::new();
        cache.add_target_data(target(2, 10));
        cache.add_target_data(target(7, 4));
        assert_eq!(cache.highest_target_id(), 7);
        assert_eq!(cache.highest_listen_sequence_number(), 10);
        assert_eq!(cache.target_count(), 2);
    }

    #[test]
    fn adding_again_replaces_the_entry() {
        let mut cache = MemoryTargetCache::new();
        cache.add_target_data(target(2, 10));
        cache.add_target_data(target(2, 12));
        assert_eq!(cache.target_count(), 1);
        assert_eq!(cache.target_data(2).map(|d| d.sequence_number()), Some(12));
    }

    #[test]
    fn finds_targets_by_query() {
        let mut cache = MemoryTargetCache::new();
        cache.add_target_data(target(2, 10));
        let query = Query::new(ResourcePath::from_string("rooms").unwrap());
        assert_eq!(
            cache.target_data_for_query(&query).map(|d| d.target_id()),
            Some(2)
        );
        let other = Query::new(ResourcePath::from_string("halls").unwrap());
        assert!(cache.target_data_for_query(&other).is_none());
    }

    #[test]
    fn removal_respects_the_live_target_set() {
        let mut cache = MemoryTargetCache::new();
        cache.add_target_data(target(1, 5));
        cache.add_target_data(target(2, 6));
        cache.add_target_data(target(3, 20));
        let live: HashSet<TargetId> = [2].into_iter().collect();

        let removed = cache.remove_targets_through_sequence_number(10, &live);
        assert_eq!(removed, 1);
        assert!(cache.target_data(1).is_none());
        assert!(cache.target_data(2).is_some());
        assert!(cache.target_data(3).is_some());
    }

    #[test]
    fn removing_a_target_releases_its_document_references() {
        let mut cache = MemoryTargetCache::new();
        cache.add_target_data(target(1, 5));
        cache.add_target_data(target(2, 6));
        cache.add_matching_keys(&[key("rooms/eros"), key("rooms/other")], 1);
        cache.add_matching_keys(&[key("rooms/eros")], 2);

        cache.remove_target_data(1);
        assert!(cache.contains_key(&key("rooms/eros")));
        assert!(!cache.contains_key(&key("rooms/other")));

        cache.remove_matching_keys(&[key("rooms/eros")], 2);
        assert!(!cache.contains_key(&key("rooms/eros")));
    }
}
