use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::error::StoreResult;

/// One transaction's buffered view of the key-value store. Writes become
/// durable when the enclosing `run_transaction` commits; an error return
/// rolls the whole transaction back.
pub trait Transaction {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    fn put(&mut self, key: Vec<u8>, value: Vec<u8>);

    fn delete(&mut self, key: &[u8]);

    /// An ordered cursor over the transaction's current view. The cursor
    /// is a snapshot: writes issued after its creation are not reflected.
    fn new_iterator(&self) -> Box<dyn StorageIterator>;
}

/// Ordered, prefix-seekable cursor over raw key/value pairs.
///
/// `key` and `value` must only be consulted while `valid` returns true.
pub trait StorageIterator {
    /// Positions the cursor at the first key at or after the prefix.
    fn seek(&mut self, prefix: &[u8]);

    fn valid(&self) -> bool;

    fn key(&self) -> &[u8];

    fn value(&self) -> &[u8];

    fn next(&mut self);
}

/// In-memory storage engine with buffered-write transactions, ordered like
/// its on-disk counterparts so prefix scans behave identically.
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the body inside a transaction. The body's writes are buffered
    /// and applied atomically on success; an error discards them.
    pub fn run_transaction<T>(
        &self,
        label: &str,
        body: impl FnOnce(&mut dyn Transaction) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut entries = self.entries.lock().unwrap();
        let mut transaction = MemoryTransaction {
            base: &mut entries,
            writes: BTreeMap::new(),
        };
        let result = body(&mut transaction)?;
        let changes = transaction.writes.len();
        transaction.commit();
        log::debug!("Committing transaction: {label} ({changes} changes)");
        Ok(result)
    }
}

struct MemoryTransaction<'a> {
    base: &'a mut BTreeMap<Vec<u8>, Vec<u8>>,
    // None marks a buffered deletion
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl MemoryTransaction<'_> {
    fn commit(self) {
        for (key, write) in self.writes {
            match write {
                Some(value) => {
                    self.base.insert(key, value);
                }
                None => {
                    self.base.remove(&key);
                }
            }
        }
    }
}

impl Transaction for MemoryTransaction<'_> {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.writes.get(key) {
            Some(write) => write.clone(),
            None => self.base.get(key).cloned(),
        }
    }

    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.writes.insert(key, Some(value));
    }

    fn delete(&mut self, key: &[u8]) {
        self.writes.insert(key.to_vec(), None);
    }

    fn new_iterator(&self) -> Box<dyn StorageIterator> {
        let mut merged = self.base.clone();
        for (key, write) in &self.writes {
            match write {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        Box::new(MemoryIterator {
            entries: merged.into_iter().collect(),
            position: 0,
        })
    }
}

struct MemoryIterator {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    position: usize,
}

impl StorageIterator for MemoryIterator {
    fn seek(&mut self, prefix: &[u8]) {
        self.position = self
            .entries
            .partition_point(|(key, _)| key.as_slice() < prefix);
    }

    fn valid(&self) -> bool {
        self.position < self.entries.len()
    }

    fn key(&self) -> &[u8] {
        self.entries
            .get(self.position)
            .map_or(&[], |(key, _)| key.as_slice())
    }

    fn value(&self) -> &[u8] {
        self.entries
            .get(self.position)
            .map_or(&[], |(_, value)| value.as_slice())
    }

    fn next(&mut self) {
        if self.position < self.entries.len() {
            self.position += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::internal_error;

    fn scan(txn: &dyn Transaction, prefix: &[u8]) -> Vec<Vec<u8>> {
        let mut iter = txn.new_iterator();
        iter.seek(prefix);
        let mut keys = Vec::new();
        while iter.valid() && iter.key().starts_with(prefix) {
            keys.push(iter.key().to_vec());
            iter.next();
        }
        keys
    }

    #[test]
    fn committed_writes_are_visible_to_later_transactions() {
        let storage = MemoryStorage::new();
        storage
            .run_transaction("write", |txn| {
                txn.put(b"a".to_vec(), b"1".to_vec());
                Ok(())
            })
            .unwrap();
        storage
            .run_transaction("read", |txn| {
                assert_eq!(txn.get(b"a"), Some(b"1".to_vec()));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn an_error_rolls_the_transaction_back() {
        let storage = MemoryStorage::new();
        let result: StoreResult<()> = storage.run_transaction("doomed", |txn| {
            txn.put(b"a".to_vec(), b"1".to_vec());
            Err(internal_error("boom"))
        });
        assert!(result.is_err());
        storage
            .run_transaction("read", |txn| {
                assert_eq!(txn.get(b"a"), None);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn reads_see_writes_buffered_in_the_same_transaction() {
        let storage = MemoryStorage::new();
        storage
            .run_transaction("buffered", |txn| {
                txn.put(b"a".to_vec(), b"1".to_vec());
                assert_eq!(txn.get(b"a"), Some(b"1".to_vec()));
                txn.delete(b"a");
                assert_eq!(txn.get(b"a"), None);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn iterators_merge_base_and_buffered_writes() {
        let storage = MemoryStorage::new();
        storage
            .run_transaction("seed", |txn| {
                txn.put(b"p/a".to_vec(), b"old".to_vec());
                txn.put(b"p/b".to_vec(), b"kept".to_vec());
                txn.put(b"q/z".to_vec(), b"other".to_vec());
                Ok(())
            })
            .unwrap();
        storage
            .run_transaction("scan", |txn| {
                txn.delete(b"p/a");
                txn.put(b"p/c".to_vec(), b"new".to_vec());
                assert_eq!(scan(txn, b"p/"), vec![b"p/b".to_vec(), b"p/c".to_vec()]);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn seek_lands_on_the_first_key_at_or_after_the_prefix() {
        let storage = MemoryStorage::new();
        storage
            .run_transaction("seed", |txn| {
                txn.put(b"a".to_vec(), vec![]);
                txn.put(b"c".to_vec(), vec![]);
                Ok(())
            })
            .unwrap();
        storage
            .run_transaction("seek", |txn| {
                let mut iter = txn.new_iterator();
                iter.seek(b"b");
                assert!(iter.valid());
                assert_eq!(iter.key(), b"c");
                iter.next();
                assert!(!iter.valid());
                Ok(())
            })
            .unwrap();
    }
}
