use std::fmt::{Display, Formatter};

use crate::model::Timestamp;

/// Version of a document or query snapshot as reported by the backend.
///
/// `NONE` (the epoch) marks state whose server version is unknown, such as
/// documents produced purely by local mutations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SnapshotVersion(Timestamp);

impl SnapshotVersion {
    pub const NONE: SnapshotVersion = SnapshotVersion(Timestamp {
        seconds: 0,
        nanos: 0,
    });

    pub fn new(timestamp: Timestamp) -> Self {
        Self(timestamp)
    }

    pub fn timestamp(&self) -> Timestamp {
        self.0
    }

    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }
}

impl From<Timestamp> for SnapshotVersion {
    fn from(timestamp: Timestamp) -> Self {
        Self::new(timestamp)
    }
}

impl Display for SnapshotVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_the_epoch() {
        assert!(SnapshotVersion::NONE.is_none());
        assert!(!SnapshotVersion::new(Timestamp::new(1, 0)).is_none());
    }

    #[test]
    fn orders_by_time() {
        let older = SnapshotVersion::new(Timestamp::new(1, 0));
        let newer = SnapshotVersion::new(Timestamp::new(1, 1));
        assert!(older < newer);
        assert!(SnapshotVersion::NONE < older);
    }
}
