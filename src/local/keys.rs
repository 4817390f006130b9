//! Storage key layouts for the overlay table and its batch-id index.
//!
//! Keys are order-preserving byte strings: NUL-terminated text segments
//! followed by a big-endian batch id, so that prefix scans walk one user's
//! rows grouped by document path (primary table) or by batch id (index).
//!
//! ```text
//! overlay            | user | document path | batch id
//! overlay_batch_index| user | batch id      | document path
//! ```

use crate::error::{data_loss, StoreResult};
use crate::model::{BatchId, DocumentKey, ResourcePath};

const OVERLAY_TABLE: &[u8] = b"overlay";
const OVERLAY_INDEX_TABLE: &[u8] = b"overlay_batch_index";

fn push_segment(buffer: &mut Vec<u8>, segment: &[u8]) {
    buffer.extend_from_slice(segment);
    buffer.push(0);
}

// batch ids are assigned sequentially from zero, so the unsigned
// big-endian form preserves their order
fn push_batch_id(buffer: &mut Vec<u8>, batch_id: BatchId) {
    buffer.extend_from_slice(&(batch_id as u32).to_be_bytes());
}

pub(crate) fn overlay_key(
    user_id: &str,
    key: &DocumentKey,
    largest_batch_id: BatchId,
) -> Vec<u8> {
    let mut buffer = overlay_document_prefix(user_id, key);
    push_batch_id(&mut buffer, largest_batch_id);
    buffer
}

pub(crate) fn overlay_document_prefix(user_id: &str, key: &DocumentKey) -> Vec<u8> {
    let mut buffer = overlay_user_prefix(user_id);
    push_segment(&mut buffer, key.path().canonical_string().as_bytes());
    buffer
}

pub(crate) fn overlay_user_prefix(user_id: &str) -> Vec<u8> {
    let mut buffer = Vec::new();
    push_segment(&mut buffer, OVERLAY_TABLE);
    push_segment(&mut buffer, user_id.as_bytes());
    buffer
}

pub(crate) fn overlay_index_key(
    user_id: &str,
    largest_batch_id: BatchId,
    key: &DocumentKey,
) -> Vec<u8> {
    let mut buffer = overlay_index_batch_prefix(user_id, largest_batch_id);
    push_segment(&mut buffer, key.path().canonical_string().as_bytes());
    buffer
}

pub(crate) fn overlay_index_batch_prefix(user_id: &str, largest_batch_id: BatchId) -> Vec<u8> {
    let mut buffer = overlay_index_user_prefix(user_id);
    push_batch_id(&mut buffer, largest_batch_id);
    buffer
}

pub(crate) fn overlay_index_user_prefix(user_id: &str) -> Vec<u8> {
    let mut buffer = Vec::new();
    push_segment(&mut buffer, OVERLAY_INDEX_TABLE);
    push_segment(&mut buffer, user_id.as_bytes());
    buffer
}

/// Splits off one NUL-terminated segment.
fn take_segment(bytes: &[u8]) -> Option<(&[u8], &[u8])> {
    let terminator = bytes.iter().position(|byte| *byte == 0)?;
    Some((&bytes[..terminator], &bytes[terminator + 1..]))
}

fn take_batch_id(bytes: &[u8]) -> Option<(BatchId, &[u8])> {
    let raw: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
    Some((u32::from_be_bytes(raw) as BatchId, &bytes[4..]))
}

fn utf8_segment(segment: &[u8]) -> StoreResult<&str> {
    std::str::from_utf8(segment).map_err(|_| data_loss("Invalid UTF-8 in storage key"))
}

#[derive(Debug)]
pub(crate) struct OverlayKeyParts {
    pub user_id: String,
    pub path: ResourcePath,
    pub largest_batch_id: BatchId,
}

pub(crate) fn decode_overlay_key(key: &[u8]) -> StoreResult<OverlayKeyParts> {
    let parse = || -> Option<StoreResult<OverlayKeyParts>> {
        let (table, rest) = take_segment(key)?;
        if table != OVERLAY_TABLE {
            return None;
        }
        let (user, rest) = take_segment(rest)?;
        let (path, rest) = take_segment(rest)?;
        let (largest_batch_id, rest) = take_batch_id(rest)?;
        if !rest.is_empty() {
            return None;
        }
        Some(decode_parts(user, path, largest_batch_id))
    };
    parse().unwrap_or_else(|| Err(data_loss("Malformed overlay key")))
}

pub(crate) fn decode_overlay_index_key(key: &[u8]) -> StoreResult<OverlayKeyParts> {
    let parse = || -> Option<StoreResult<OverlayKeyParts>> {
        let (table, rest) = take_segment(key)?;
        if table != OVERLAY_INDEX_TABLE {
            return None;
        }
        let (user, rest) = take_segment(rest)?;
        let (largest_batch_id, rest) = take_batch_id(rest)?;
        let (path, rest) = take_segment(rest)?;
        if !rest.is_empty() {
            return None;
        }
        Some(decode_parts(user, path, largest_batch_id))
    };
    parse().unwrap_or_else(|| Err(data_loss("Malformed overlay index key")))
}

fn decode_parts(user: &[u8], path: &[u8], largest_batch_id: BatchId) -> StoreResult<OverlayKeyParts> {
    Ok(OverlayKeyParts {
        user_id: utf8_segment(user)?.to_string(),
        path: ResourcePath::from_string(utf8_segment(path)?)?,
        largest_batch_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(path: &str) -> DocumentKey {
        DocumentKey::from_string(path).unwrap()
    }

    #[test]
    fn primary_key_round_trips() {
        let encoded = overlay_key("alice", &doc("rooms/eros"), 42);
        let parts = decode_overlay_key(&encoded).unwrap();
        assert_eq!(parts.user_id, "alice");
        assert_eq!(parts.path.canonical_string(), "rooms/eros");
        assert_eq!(parts.largest_batch_id, 42);
    }

    #[test]
    fn index_key_round_trips() {
        let encoded = overlay_index_key("", 7, &doc("rooms/eros/messages/1"));
        let parts = decode_overlay_index_key(&encoded).unwrap();
        assert_eq!(parts.user_id, "");
        assert_eq!(parts.path.canonical_string(), "rooms/eros/messages/1");
        assert_eq!(parts.largest_batch_id, 7);
    }

    #[test]
    fn primary_keys_group_by_user_then_path() {
        let alice = overlay_key("alice", &doc("rooms/a"), 9);
        let alice_later_doc = overlay_key("alice", &doc("rooms/b"), 1);
        let bob = overlay_key("bob", &doc("rooms/a"), 1);
        assert!(alice < alice_later_doc);
        assert!(alice_later_doc < bob);
        assert!(alice.starts_with(&overlay_user_prefix("alice")));
        assert!(!bob.starts_with(&overlay_user_prefix("alice")));
    }

    #[test]
    fn index_keys_order_by_batch_id() {
        let early = overlay_index_key("u", 2, &doc("rooms/z"));
        let late = overlay_index_key("u", 10, &doc("rooms/a"));
        assert!(early < late);
        assert!(late.starts_with(&overlay_index_batch_prefix("u", 10)));
    }

    #[test]
    fn table_prefixes_do_not_collide() {
        let primary = overlay_user_prefix("u");
        let index = overlay_index_user_prefix("u");
        assert!(!index.starts_with(&primary));
        assert!(!primary.starts_with(&index));
    }

    #[test]
    fn malformed_keys_fail_with_data_loss() {
        let err = decode_overlay_key(b"garbage").unwrap_err();
        assert_eq!(err.code_str(), "localstore/data-loss");
        let err = decode_overlay_index_key(&overlay_key("u", &doc("rooms/a"), 1)).unwrap_err();
        assert_eq!(err.code_str(), "localstore/data-loss");
    }
}
