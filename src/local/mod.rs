//! Local persistence: transactional storage, order-preserving key
//! encodings, the record serializer, and the caches and garbage collection
//! built on top of them.

mod keys;
mod listen_sequence;
mod lru_garbage_collector;
mod overlay_cache;
mod serializer;
mod storage;
mod target_cache;
mod target_data;

pub use listen_sequence::ListenSequence;
pub use lru_garbage_collector::{
    LruDelegate, LruGarbageCollector, LruParams, LruResults, LruScheduler, MemoryLruDelegate,
    RollingSequenceNumberBuffer, CACHE_SIZE_UNLIMITED,
};
pub use overlay_cache::{DocumentOverlayCache, Overlay};
pub use serializer::LocalSerializer;
pub use storage::{MemoryStorage, StorageIterator, Transaction};
pub use target_cache::MemoryTargetCache;
pub use target_data::{QueryPurpose, TargetData};
