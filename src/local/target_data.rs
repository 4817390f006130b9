use bytes::Bytes;

use crate::model::{ListenSequenceNumber, SnapshotVersion, TargetId};
use crate::query::Query;

/// Why a target is being listened to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryPurpose {
    /// Serving a user-issued listen.
    Listen,
    /// Re-running a query whose existence filter disagreed with the cache.
    ExistenceFilterMismatch,
    /// Resolving whether a single possibly-deleted document still exists.
    LimboResolution,
}

/// Persisted record of a listened-to query: its assigned target id, sync
/// state, and the sequence number it last touched the cache at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetData {
    query: Query,
    target_id: TargetId,
    sequence_number: ListenSequenceNumber,
    purpose: QueryPurpose,
    snapshot_version: SnapshotVersion,
    resume_token: Bytes,
}

impl TargetData {
    pub fn new(
        query: Query,
        target_id: TargetId,
        sequence_number: ListenSequenceNumber,
        purpose: QueryPurpose,
    ) -> Self {
        Self {
            query,
            target_id,
            sequence_number,
            purpose,
            snapshot_version: SnapshotVersion::NONE,
            resume_token: Bytes::new(),
        }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn target_id(&self) -> TargetId {
        self.target_id
    }

    pub fn sequence_number(&self) -> ListenSequenceNumber {
        self.sequence_number
    }

    pub fn purpose(&self) -> QueryPurpose {
        self.purpose
    }

    pub fn snapshot_version(&self) -> SnapshotVersion {
        self.snapshot_version
    }

    /// Opaque backend token that lets a listen resume where it left off.
    pub fn resume_token(&self) -> &Bytes {
        &self.resume_token
    }

    pub fn with_sequence_number(&self, sequence_number: ListenSequenceNumber) -> TargetData {
        TargetData {
            sequence_number,
            ..self.clone()
        }
    }

    pub fn with_resume_token(
        &self,
        resume_token: Bytes,
        snapshot_version: SnapshotVersion,
    ) -> TargetData {
        TargetData {
            resume_token,
            snapshot_version,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ResourcePath, Timestamp};

    #[test]
    fn builders_replace_only_their_fields() {
        let query = Query::new(ResourcePath::from_string("rooms").unwrap());
        let target = TargetData::new(query.clone(), 2, 10, QueryPurpose::Listen);
        assert_eq!(target.snapshot_version(), SnapshotVersion::NONE);
        assert!(target.resume_token().is_empty());

        let resumed = target.with_resume_token(
            Bytes::from_static(b"token"),
            SnapshotVersion::new(Timestamp::new(30, 0)),
        );
        assert_eq!(resumed.resume_token().as_ref(), b"token");
        assert_eq!(resumed.target_id(), 2);
        assert_eq!(resumed.sequence_number(), 10);

        let touched = resumed.with_sequence_number(99);
        assert_eq!(touched.sequence_number(), 99);
        assert_eq!(touched.query(), &query);
        assert_eq!(touched.resume_token().as_ref(), b"token");
    }
}
