//! Per-user cache of the net local mutation for each document.
//!
//! An overlay is the single mutation that, applied to the last known server
//! state of a document, yields the local view of that document. Saving an
//! overlay for a key that already has one replaces it; overlays never merge.
//!
//! Rows live in two tables: the primary table keyed by document path and the
//! secondary index keyed by batch id, which serves batch removal and the
//! batch-ordered collection-group scan.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::credentials::User;
use crate::error::{data_loss, StoreResult};
use crate::local::keys;
use crate::local::keys::OverlayKeyParts;
use crate::local::serializer::LocalSerializer;
use crate::local::storage::Transaction;
use crate::model::{BatchId, DocumentKey, Mutation, ResourcePath};

#[derive(Clone, Debug, PartialEq)]
pub struct Overlay {
    largest_batch_id: BatchId,
    mutation: Mutation,
}

impl Overlay {
    pub fn new(largest_batch_id: BatchId, mutation: Mutation) -> Self {
        Self {
            largest_batch_id,
            mutation,
        }
    }

    /// Id of the most recent mutation batch folded into this overlay.
    pub fn largest_batch_id(&self) -> BatchId {
        self.largest_batch_id
    }

    pub fn mutation(&self) -> &Mutation {
        &self.mutation
    }

    pub fn key(&self) -> &DocumentKey {
        self.mutation.key()
    }
}

pub struct DocumentOverlayCache {
    user_id: String,
    serializer: LocalSerializer,
}

impl DocumentOverlayCache {
    pub fn new(user: &User, serializer: LocalSerializer) -> Self {
        Self {
            user_id: user.uid().unwrap_or_default().to_string(),
            serializer,
        }
    }

    pub fn get_overlay(
        &self,
        txn: &dyn Transaction,
        key: &DocumentKey,
    ) -> StoreResult<Option<Overlay>> {
        let prefix = keys::overlay_document_prefix(&self.user_id, key);
        let mut iterator = txn.new_iterator();
        iterator.seek(&prefix);
        if !iterator.valid() || !iterator.key().starts_with(&prefix) {
            return Ok(None);
        }
        let parts = keys::decode_overlay_key(iterator.key())?;
        let mutation = self.decode_mutation(iterator.value())?;
        Ok(Some(Overlay::new(parts.largest_batch_id, mutation)))
    }

    /// Records `mutation` as the overlay for its document key, replacing any
    /// overlay the key had before.
    pub fn save_overlay(
        &self,
        txn: &mut dyn Transaction,
        largest_batch_id: BatchId,
        mutation: &Mutation,
    ) -> StoreResult<()> {
        let key = mutation.key();
        if let Some(existing) = self.get_overlay(&*txn, key)? {
            txn.delete(&keys::overlay_key(
                &self.user_id,
                key,
                existing.largest_batch_id(),
            ));
            txn.delete(&keys::overlay_index_key(
                &self.user_id,
                existing.largest_batch_id(),
                key,
            ));
        }
        txn.put(
            keys::overlay_key(&self.user_id, key, largest_batch_id),
            self.serializer.encode_mutation(mutation).to_vec(),
        );
        txn.put(
            keys::overlay_index_key(&self.user_id, largest_batch_id, key),
            Vec::new(),
        );
        Ok(())
    }

    pub fn save_overlays(
        &self,
        txn: &mut dyn Transaction,
        largest_batch_id: BatchId,
        mutations: &[Mutation],
    ) -> StoreResult<()> {
        for mutation in mutations {
            self.save_overlay(txn, largest_batch_id, mutation)?;
        }
        Ok(())
    }

    pub fn remove_overlays_for_batch_id(
        &self,
        txn: &mut dyn Transaction,
        batch_id: BatchId,
    ) -> StoreResult<()> {
        let prefix = keys::overlay_index_batch_prefix(&self.user_id, batch_id);
        // the iterator snapshots the transaction, so deleting under it is safe
        let mut iterator = txn.new_iterator();
        iterator.seek(&prefix);
        while iterator.valid() && iterator.key().starts_with(&prefix) {
            let parts = keys::decode_overlay_index_key(iterator.key())?;
            let key = document_key(parts)?;
            txn.delete(&keys::overlay_key(&self.user_id, &key, batch_id));
            txn.delete(iterator.key());
            iterator.next();
        }
        Ok(())
    }

    /// Returns the overlays for immediate children of `collection` written
    /// after `since_batch_id`, by scanning the user's whole overlay keyspace.
    pub fn get_overlays_for_collection(
        &self,
        txn: &dyn Transaction,
        collection: &ResourcePath,
        since_batch_id: BatchId,
    ) -> StoreResult<BTreeMap<DocumentKey, Overlay>> {
        let prefix = keys::overlay_user_prefix(&self.user_id);
        let mut iterator = txn.new_iterator();
        iterator.seek(&prefix);
        let mut overlays = BTreeMap::new();
        while iterator.valid() && iterator.key().starts_with(&prefix) {
            let parts = keys::decode_overlay_key(iterator.key())?;
            if parts.largest_batch_id > since_batch_id
                && parts.path.len() == collection.len() + 1
                && collection.is_prefix_of(&parts.path)
            {
                let largest_batch_id = parts.largest_batch_id;
                let key = document_key(parts)?;
                let mutation = self.decode_mutation(iterator.value())?;
                overlays.insert(key, Overlay::new(largest_batch_id, mutation));
            }
            iterator.next();
        }
        Ok(overlays)
    }

    /// Returns overlays in collections named `collection_group` written after
    /// `since_batch_id`, in ascending batch order. Batches are never split:
    /// once the result reaches `count` entries the scan still finishes the
    /// batch it is in, so the result can exceed `count`.
    pub fn get_overlays_for_collection_group(
        &self,
        txn: &dyn Transaction,
        collection_group: &str,
        since_batch_id: BatchId,
        count: usize,
    ) -> StoreResult<BTreeMap<DocumentKey, Overlay>> {
        let user_prefix = keys::overlay_index_user_prefix(&self.user_id);
        let mut iterator = txn.new_iterator();
        iterator.seek(&keys::overlay_index_batch_prefix(
            &self.user_id,
            since_batch_id + 1,
        ));
        let mut overlays = BTreeMap::new();
        let mut current_batch_id = None;
        while iterator.valid() && iterator.key().starts_with(&user_prefix) {
            let parts = keys::decode_overlay_index_key(iterator.key())?;
            if overlays.len() >= count && current_batch_id != Some(parts.largest_batch_id) {
                break;
            }
            current_batch_id = Some(parts.largest_batch_id);
            let largest_batch_id = parts.largest_batch_id;
            let key = document_key(parts)?;
            if key.has_collection_id(collection_group) {
                let primary = keys::overlay_key(&self.user_id, &key, largest_batch_id);
                let value = txn.get(&primary).ok_or_else(|| {
                    data_loss("Overlay index entry has no matching overlay row")
                })?;
                let mutation = self.decode_mutation(&value)?;
                overlays.insert(key, Overlay::new(largest_batch_id, mutation));
            }
            iterator.next();
        }
        Ok(overlays)
    }

    /// Number of overlay rows stored for this user.
    pub fn overlay_count(&self, txn: &dyn Transaction) -> usize {
        count_rows(txn, keys::overlay_user_prefix(&self.user_id))
    }

    /// Number of batch-index rows stored for this user.
    pub fn index_entry_count(&self, txn: &dyn Transaction) -> usize {
        count_rows(txn, keys::overlay_index_user_prefix(&self.user_id))
    }

    fn decode_mutation(&self, value: &[u8]) -> StoreResult<Mutation> {
        self.serializer
            .decode_mutation(Bytes::copy_from_slice(value))
            .map_err(|err| {
                log::warn!("Failed to decode overlay mutation: {err}");
                err
            })
    }
}

fn count_rows(txn: &dyn Transaction, prefix: Vec<u8>) -> usize {
    let mut iterator = txn.new_iterator();
    iterator.seek(&prefix);
    let mut rows = 0;
    while iterator.valid() && iterator.key().starts_with(&prefix) {
        rows += 1;
        iterator.next();
    }
    rows
}

fn document_key(parts: OverlayKeyParts) -> StoreResult<DocumentKey> {
    DocumentKey::from_path(parts.path)
        .map_err(|err| data_loss(format!("Invalid overlay key path: {}", err.message())))
}
