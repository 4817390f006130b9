use crate::model::ListenSequenceNumber;

/// Monotonic logical clock ordering targets and documents by recency of use.
///
/// Every target update and document access is stamped with the next sequence
/// number, so "least recently used" reduces to "smallest sequence number".
#[derive(Debug)]
pub struct ListenSequence {
    previous: ListenSequenceNumber,
}

impl ListenSequence {
    /// Sentinel ordered before every real sequence number.
    pub const INVALID: ListenSequenceNumber = -1;

    pub fn new(starting_after: ListenSequenceNumber) -> Self {
        Self {
            previous: starting_after,
        }
    }

    pub fn next(&mut self) -> ListenSequenceNumber {
        self.previous += 1;
        self.previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_increase_from_the_starting_point() {
        let mut sequence = ListenSequence::new(41);
        assert_eq!(sequence.next(), 42);
        assert_eq!(sequence.next(), 43);
        assert_eq!(sequence.next(), 44);
    }

    #[test]
    fn resuming_after_a_restart_continues_past_persisted_numbers() {
        let mut sequence = ListenSequence::new(0);
        let mut last = 0;
        for _ in 0..10 {
            last = sequence.next();
        }
        let mut resumed = ListenSequence::new(last);
        assert!(resumed.next() > last);
    }
}
