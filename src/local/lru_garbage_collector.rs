//! Least-recently-used eviction of cached targets and orphaned documents.
//!
//! The collector never touches storage directly. It ranks everything by
//! listen sequence number through a delegate, picks an upper bound at a
//! configured percentile, then asks the delegate to drop stale targets and,
//! after that, documents no target or mutation still references. Targets go
//! first so that orphan detection sees the post-removal reference set.

use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::local::listen_sequence::ListenSequence;
use crate::local::serializer::LocalSerializer;
use crate::local::target_cache::MemoryTargetCache;
use crate::local::target_data::TargetData;
use crate::model::{DocumentKey, ListenSequenceNumber, TargetId};
use crate::util::work_queue::{DelayedTask, TimerId, WorkQueue};

/// Threshold value that turns collection off entirely.
pub const CACHE_SIZE_UNLIMITED: i64 = -1;

const INITIAL_GC_DELAY: Duration = Duration::from_secs(60);
const REGULAR_GC_DELAY: Duration = Duration::from_secs(5 * 60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LruParams {
    /// Collection is skipped while the cache stays under this many bytes.
    pub min_bytes_threshold: i64,
    /// Portion of targets, by age, eligible for eviction in one cycle.
    pub percentile_to_collect: i32,
    /// Upper limit on sequence numbers collected per cycle.
    pub maximum_sequence_numbers_to_collect: i32,
}

impl LruParams {
    pub fn with_cache_size(cache_size: i64) -> Self {
        Self {
            min_bytes_threshold: cache_size,
            ..Self::default()
        }
    }

    pub fn disabled() -> Self {
        Self::with_cache_size(CACHE_SIZE_UNLIMITED)
    }
}

impl Default for LruParams {
    fn default() -> Self {
        Self {
            min_bytes_threshold: 100 * 1024 * 1024,
            percentile_to_collect: 10,
            maximum_sequence_numbers_to_collect: 1000,
        }
    }
}

/// Outcome of one collection cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LruResults {
    pub did_run: bool,
    pub sequence_numbers_collected: i32,
    pub targets_removed: usize,
    pub documents_removed: usize,
}

impl LruResults {
    fn did_not_run() -> Self {
        Self {
            did_run: false,
            sequence_numbers_collected: 0,
            targets_removed: 0,
            documents_removed: 0,
        }
    }
}

/// Capability set through which the collector reaches the persistence layer.
pub trait LruDelegate {
    fn target_count(&self) -> usize;

    /// Approximate serialized size of everything the cache holds.
    fn byte_size(&self) -> i64;

    fn enumerate_targets(&self, callback: &mut dyn FnMut(&TargetData));

    /// Visits the sequence number of every document with no remaining
    /// target reference.
    fn enumerate_orphaned_documents(
        &self,
        callback: &mut dyn FnMut(&DocumentKey, ListenSequenceNumber),
    );

    /// Drops targets at or below `upper_bound` that are not live. Returns
    /// how many were dropped.
    fn remove_targets(
        &mut self,
        upper_bound: ListenSequenceNumber,
        live_targets: &HashSet<TargetId>,
    ) -> usize;

    /// Drops documents at or below `upper_bound` with neither a target nor a
    /// mutation still referencing them. Returns how many were dropped.
    fn remove_orphaned_documents(&mut self, upper_bound: ListenSequenceNumber) -> usize;
}

/// Keeps the `max_elements` smallest values it has been fed, so its largest
/// retained value is the n-th smallest overall. Ties keep the value seen
/// first.
pub struct RollingSequenceNumberBuffer {
    buffer: BinaryHeap<ListenSequenceNumber>,
    max_elements: usize,
}

impl RollingSequenceNumberBuffer {
    pub fn new(max_elements: usize) -> Self {
        Self {
            buffer: BinaryHeap::new(),
            max_elements,
        }
    }

    pub fn add_element(&mut self, sequence_number: ListenSequenceNumber) {
        if self.buffer.len() < self.max_elements {
            self.buffer.push(sequence_number);
        } else if let Some(&largest) = self.buffer.peek() {
            if sequence_number < largest {
                self.buffer.pop();
                self.buffer.push(sequence_number);
            }
        }
    }

    pub fn max_value(&self) -> ListenSequenceNumber {
        self.buffer
            .peek()
            .copied()
            .unwrap_or(ListenSequence::INVALID)
    }
}

pub struct LruGarbageCollector<D> {
    params: LruParams,
    delegate: D,
}

impl<D: LruDelegate> LruGarbageCollector<D> {
    pub fn new(params: LruParams, delegate: D) -> Self {
        Self { params, delegate }
    }

    pub fn delegate(&self) -> &D {
        &self.delegate
    }

    pub fn delegate_mut(&mut self) -> &mut D {
        &mut self.delegate
    }

    /// Number of targets making up the oldest `percentile` percent.
    pub fn query_count_for_percentile(&self, percentile: i32) -> i32 {
        (self.delegate.target_count() as i64 * i64::from(percentile) / 100) as i32
    }

    /// Sequence number of the `query_count`-th oldest entry, considering
    /// both target and orphaned-document sequence numbers.
    pub fn sequence_number_for_query_count(
        &self,
        query_count: i32,
    ) -> ListenSequenceNumber {
        let mut buffer = RollingSequenceNumberBuffer::new(query_count.max(0) as usize);
        self.delegate.enumerate_targets(&mut |target| {
            buffer.add_element(target.sequence_number());
        });
        self.delegate.enumerate_orphaned_documents(&mut |_, sequence_number| {
            buffer.add_element(sequence_number);
        });
        buffer.max_value()
    }

    pub fn remove_targets(
        &mut self,
        upper_bound: ListenSequenceNumber,
        live_targets: &HashSet<TargetId>,
    ) -> usize {
        self.delegate.remove_targets(upper_bound, live_targets)
    }

    pub fn remove_orphaned_documents(&mut self, upper_bound: ListenSequenceNumber) -> usize {
        self.delegate.remove_orphaned_documents(upper_bound)
    }

    /// Runs one full collection cycle unless collection is disabled or the
    /// cache is still under the size threshold.
    pub fn collect(&mut self, live_targets: &HashSet<TargetId>) -> LruResults {
        if self.params.min_bytes_threshold == CACHE_SIZE_UNLIMITED {
            log::debug!("Garbage collection skipped; disabled");
            return LruResults::did_not_run();
        }
        let size = self.delegate.byte_size();
        if size < self.params.min_bytes_threshold {
            log::debug!(
                "Garbage collection skipped; cache size {size} is below the threshold {}",
                self.params.min_bytes_threshold
            );
            return LruResults::did_not_run();
        }
        self.run_collection(live_targets)
    }

    fn run_collection(&mut self, live_targets: &HashSet<TargetId>) -> LruResults {
        let mut sequence_numbers =
            self.query_count_for_percentile(self.params.percentile_to_collect);
        if sequence_numbers > self.params.maximum_sequence_numbers_to_collect {
            log::debug!(
                "Capping sequence numbers to collect at {} (was {sequence_numbers})",
                self.params.maximum_sequence_numbers_to_collect
            );
            sequence_numbers = self.params.maximum_sequence_numbers_to_collect;
        }
        let upper_bound = self.sequence_number_for_query_count(sequence_numbers);
        let targets_removed = self.remove_targets(upper_bound, live_targets);
        let documents_removed = self.remove_orphaned_documents(upper_bound);
        log::debug!(
            "Garbage collection removed {targets_removed} targets and {documents_removed} documents"
        );
        LruResults {
            did_run: true,
            sequence_numbers_collected: sequence_numbers,
            targets_removed,
            documents_removed,
        }
    }
}

/// Reference-tracking delegate over the in-memory target cache.
///
/// Documents are pinned while any target matches them or a local mutation
/// still touches them; everything else ages out by sequence number.
pub struct MemoryLruDelegate {
    serializer: LocalSerializer,
    target_cache: MemoryTargetCache,
    sequence_numbers: BTreeMap<DocumentKey, ListenSequenceNumber>,
    mutation_references: BTreeSet<DocumentKey>,
}

impl MemoryLruDelegate {
    pub fn new(serializer: LocalSerializer) -> Self {
        Self {
            serializer,
            target_cache: MemoryTargetCache::new(),
            sequence_numbers: BTreeMap::new(),
            mutation_references: BTreeSet::new(),
        }
    }

    pub fn target_cache(&self) -> &MemoryTargetCache {
        &self.target_cache
    }

    pub fn target_cache_mut(&mut self) -> &mut MemoryTargetCache {
        &mut self.target_cache
    }

    /// Stamps a document with the sequence number of its latest use.
    pub fn mark_document_used(
        &mut self,
        key: DocumentKey,
        sequence_number: ListenSequenceNumber,
    ) {
        self.sequence_numbers.insert(key, sequence_number);
    }

    pub fn add_mutation_reference(&mut self, key: DocumentKey) {
        self.mutation_references.insert(key);
    }

    pub fn remove_mutation_reference(&mut self, key: &DocumentKey) {
        self.mutation_references.remove(key);
    }

    pub fn document_count(&self) -> usize {
        self.sequence_numbers.len()
    }

    fn is_pinned(&self, key: &DocumentKey) -> bool {
        self.mutation_references.contains(key) || self.target_cache.contains_key(key)
    }
}

impl LruDelegate for MemoryLruDelegate {
    fn target_count(&self) -> usize {
        self.target_cache.target_count()
    }

    fn byte_size(&self) -> i64 {
        let mut total = 0i64;
        self.target_cache.for_each_target(|target| {
            total += self.serializer.encode_target_data(target).len() as i64;
        });
        total
    }

    fn enumerate_targets(&self, callback: &mut dyn FnMut(&TargetData)) {
        self.target_cache.for_each_target(callback);
    }

    fn enumerate_orphaned_documents(
        &self,
        callback: &mut dyn FnMut(&DocumentKey, ListenSequenceNumber),
    ) {
        for (key, sequence_number) in &self.sequence_numbers {
            if !self.target_cache.contains_key(key) {
                callback(key, *sequence_number);
            }
        }
    }

    fn remove_targets(
        &mut self,
        upper_bound: ListenSequenceNumber,
        live_targets: &HashSet<TargetId>,
    ) -> usize {
        self.target_cache
            .remove_targets_through_sequence_number(upper_bound, live_targets)
    }

    fn remove_orphaned_documents(&mut self, upper_bound: ListenSequenceNumber) -> usize {
        let doomed: Vec<DocumentKey> = self
            .sequence_numbers
            .iter()
            .filter(|(key, sequence_number)| {
                **sequence_number <= upper_bound && !self.is_pinned(key)
            })
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            self.sequence_numbers.remove(key);
        }
        doomed.len()
    }
}

struct SchedulerState {
    started: bool,
    task: Option<DelayedTask>,
}

/// Periodically runs a collection callback on the work queue: once shortly
/// after startup, then at a regular cadence until stopped.
pub struct LruScheduler {
    queue: Arc<WorkQueue>,
    state: Arc<Mutex<SchedulerState>>,
}

impl LruScheduler {
    pub fn new(queue: Arc<WorkQueue>) -> Self {
        Self {
            queue,
            state: Arc::new(Mutex::new(SchedulerState {
                started: false,
                task: None,
            })),
        }
    }

    pub fn start(&self, run_collection: impl FnMut() + Send + 'static) {
        {
            let mut state = self.state.lock().unwrap();
            if state.started {
                return;
            }
            state.started = true;
        }
        log::debug!("Garbage collection scheduled in {INITIAL_GC_DELAY:?}");
        schedule(
            &self.queue,
            &self.state,
            Arc::new(Mutex::new(run_collection)),
            INITIAL_GC_DELAY,
        );
    }

    pub fn stop(&self) {
        let mut state = self.state.lock().unwrap();
        if let Some(task) = state.task.take() {
            task.cancel();
        }
        if state.started {
            state.started = false;
            log::debug!("Garbage collection scheduler stopped");
        }
    }
}

fn schedule(
    queue: &Arc<WorkQueue>,
    state: &Arc<Mutex<SchedulerState>>,
    run_collection: Arc<Mutex<dyn FnMut() + Send>>,
    delay: Duration,
) {
    let queue_in_task = Arc::clone(queue);
    let state_in_task = Arc::clone(state);
    let collection_in_task = Arc::clone(&run_collection);
    let task = queue.enqueue_after(delay, TimerId::GarbageCollectionDelay, move || {
        {
            let mut state = state_in_task.lock().unwrap();
            if !state.started {
                return;
            }
            state.task = None;
        }
        (collection_in_task.lock().unwrap())();
        if state_in_task.lock().unwrap().started {
            schedule(
                &queue_in_task,
                &state_in_task,
                collection_in_task,
                REGULAR_GC_DELAY,
            );
        }
    });
    state.lock().unwrap().task = Some(task);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::target_data::QueryPurpose;
    use crate::model::{DatabaseId, ResourcePath};
    use crate::query::Query;

    fn delegate() -> MemoryLruDelegate {
        MemoryLruDelegate::new(LocalSerializer::new(DatabaseId::new("p", "(default)")))
    }

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

    fn collector_with_targets(
        params: LruParams,
        sequence_numbers: impl IntoIterator<Item = ListenSequenceNumber>,
    ) -> LruGarbageCollector<MemoryLruDelegate> {
        let mut delegate = delegate();
        for (index, sequence_number) in sequence_numbers.into_iter().enumerate() {
            delegate
                .target_cache_mut()
                .add_target_data(target(index as TargetId + 1, sequence_number));
        }
        LruGarbageCollector::new(params, delegate)
    }

    #[test]
    fn rolling_buffer_tracks_the_nth_smallest() {
        let mut buffer = RollingSequenceNumberBuffer::new(3);
        for value in [9, 5, 7, 1, 12] {
            buffer.add_element(value);
        }
        assert_eq!(buffer.max_value(), 7);
    }

    #[test]
    fn rolling_buffer_underfilled_returns_its_largest() {
        let mut buffer = RollingSequenceNumberBuffer::new(5);
        buffer.add_element(4);
        buffer.add_element(2);
        assert_eq!(buffer.max_value(), 4);
    }

    #[test]
    fn rolling_buffer_empty_returns_the_invalid_sentinel() {
        let buffer = RollingSequenceNumberBuffer::new(3);
        assert_eq!(buffer.max_value(), ListenSequence::INVALID);
    }

    #[test]
    fn percentile_counts_floor() {
        let collector = collector_with_targets(LruParams::default(), 1..=100);
        assert_eq!(collector.query_count_for_percentile(10), 10);
        assert_eq!(collector.query_count_for_percentile(0), 0);
        assert_eq!(collector.query_count_for_percentile(100), 100);

        let collector = collector_with_targets(LruParams::default(), 1..=47);
        assert_eq!(collector.query_count_for_percentile(10), 4);
    }

    #[test]
    fn upper_bound_is_the_nth_smallest_sequence_number() {
        let collector = collector_with_targets(LruParams::default(), 1..=10);
        assert_eq!(collector.sequence_number_for_query_count(3), 3);
        assert_eq!(collector.sequence_number_for_query_count(0), ListenSequence::INVALID);
    }

    #[test]
    fn upper_bound_considers_orphaned_documents() {
        let mut collector = collector_with_targets(LruParams::default(), [1, 5]);
        collector
            .delegate_mut()
            .mark_document_used(key("rooms/eros"), 3);
        assert_eq!(collector.sequence_number_for_query_count(2), 3);
    }

    #[test]
    fn live_targets_survive_regardless_of_age() {
        let mut collector = collector_with_targets(LruParams::default(), [1, 2, 3]);
        let live: HashSet<TargetId> = [1, 2].into_iter().collect();

        let removed = collector.remove_targets(100, &live);
        assert_eq!(removed, 1);
        let cache = collector.delegate().target_cache();
        assert!(cache.target_data(1).is_some());
        assert!(cache.target_data(2).is_some());
        assert!(cache.target_data(3).is_none());
    }

    #[test]
    fn documents_become_orphaned_only_after_their_target_goes() {
        let mut collector = collector_with_targets(LruParams::default(), [2]);
        let eros = key("rooms/eros");
        collector
            .delegate_mut()
            .target_cache_mut()
            .add_matching_keys(&[eros.clone()], 1);
        collector.delegate_mut().mark_document_used(eros.clone(), 2);

        assert_eq!(collector.remove_orphaned_documents(10), 0);

        collector.remove_targets(10, &HashSet::new());
        assert_eq!(collector.remove_orphaned_documents(10), 1);
        assert_eq!(collector.delegate().document_count(), 0);
    }

    #[test]
    fn mutation_references_pin_documents() {
        let mut collector = collector_with_targets(LruParams::default(), [1]);
        let eros = key("rooms/eros");
        collector.delegate_mut().mark_document_used(eros.clone(), 1);
        collector.delegate_mut().add_mutation_reference(eros.clone());

        assert_eq!(collector.remove_orphaned_documents(10), 0);

        collector.delegate_mut().remove_mutation_reference(&eros);
        assert_eq!(collector.remove_orphaned_documents(10), 1);
    }

    #[test]
    fn collect_skips_when_disabled() {
        let mut collector = collector_with_targets(LruParams::disabled(), 1..=10);
        let results = collector.collect(&HashSet::new());
        assert!(!results.did_run);
        assert_eq!(collector.delegate().target_count(), 10);
    }

    #[test]
    fn collect_skips_under_the_size_threshold() {
        let mut collector = collector_with_targets(LruParams::with_cache_size(1 << 30), 1..=10);
        let results = collector.collect(&HashSet::new());
        assert!(!results.did_run);
    }

    #[test]
    fn collect_removes_the_oldest_percentile() {
        let mut params = LruParams::with_cache_size(0);
        params.percentile_to_collect = 20;
        let mut collector = collector_with_targets(params, 1..=10);

        let results = collector.collect(&HashSet::new());
        assert!(results.did_run);
        assert_eq!(results.sequence_numbers_collected, 2);
        assert_eq!(results.targets_removed, 2);
        assert_eq!(collector.delegate().target_count(), 8);
    }

    #[test]
    fn collect_caps_the_sequence_numbers_per_cycle() {
        let mut params = LruParams::with_cache_size(0);
        params.percentile_to_collect = 50;
        params.maximum_sequence_numbers_to_collect = 3;
        let mut collector = collector_with_targets(params, 1..=10);

        let results = collector.collect(&HashSet::new());
        assert_eq!(results.sequence_numbers_collected, 3);
        assert_eq!(results.targets_removed, 3);
    }

    #[test]
    fn collect_drops_documents_orphaned_by_the_same_cycle() {
        let mut params = LruParams::with_cache_size(0);
        params.percentile_to_collect = 50;
        let mut collector = collector_with_targets(params, [1, 10]);
        let eros = key("rooms/eros");
        collector
            .delegate_mut()
            .target_cache_mut()
            .add_matching_keys(&[eros.clone()], 1);
        collector.delegate_mut().mark_document_used(eros, 1);

        let results = collector.collect(&HashSet::new());
        assert!(results.did_run);
        assert_eq!(results.targets_removed, 1);
        assert_eq!(results.documents_removed, 1);
    }

    #[test]
    fn scheduler_reschedules_after_each_cycle() {
        let queue = Arc::new(WorkQueue::new());
        let scheduler = LruScheduler::new(Arc::clone(&queue));
        let runs = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&runs);
        scheduler.start(move || {
            *counter.lock().unwrap() += 1;
        });

        queue.run_delayed_tasks_until(TimerId::GarbageCollectionDelay);
        assert_eq!(*runs.lock().unwrap(), 1);
        queue.run_delayed_tasks_until(TimerId::GarbageCollectionDelay);
        assert_eq!(*runs.lock().unwrap(), 2);

        scheduler.stop();
        queue.run_delayed_tasks_until(TimerId::All);
        assert_eq!(*runs.lock().unwrap(), 2);
    }

    #[test]
    fn stopped_scheduler_never_collects() {
        let queue = Arc::new(WorkQueue::new());
        let scheduler = LruScheduler::new(Arc::clone(&queue));
        let runs = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&runs);
        scheduler.start(move || {
            *counter.lock().unwrap() += 1;
        });
        scheduler.stop();

        queue.run_delayed_tasks_until(TimerId::All);
        assert_eq!(*runs.lock().unwrap(), 0);
    }

    #[test]
    fn scheduler_drives_a_real_collector() {
        let queue = Arc::new(WorkQueue::new());
        let scheduler = LruScheduler::new(Arc::clone(&queue));
        let collector = Arc::new(Mutex::new(collector_with_targets(
            LruParams::with_cache_size(0),
            1..=10,
        )));
        let for_task = Arc::clone(&collector);
        scheduler.start(move || {
            for_task.lock().unwrap().collect(&HashSet::new());
        });

        queue.run_delayed_tasks_until(TimerId::GarbageCollectionDelay);
        scheduler.stop();
        assert_eq!(collector.lock().unwrap().delegate().target_count(), 9);
    }
}
