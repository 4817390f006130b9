//! Space-efficient membership test over document names.
//!
//! The backend sends a bloom filter with an existence-filter mismatch so the
//! client can work out which cached documents the server no longer matches,
//! without re-downloading the result set. False positives are possible and
//! tolerated; false negatives never happen.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use md5::{Digest, Md5};

use crate::error::{invalid_argument, StoreResult};

/// 128-bit digest split into the two 64-bit halves the index formula uses.
struct DoubleHash {
    h1: u64,
    h2: u64,
}

fn md5_double_hash(value: &str) -> DoubleHash {
    let digest = Md5::digest(value.as_bytes());
    let mut h1 = [0u8; 8];
    let mut h2 = [0u8; 8];
    h1.copy_from_slice(&digest[0..8]);
    h2.copy_from_slice(&digest[8..16]);
    DoubleHash {
        h1: u64::from_le_bytes(h1),
        h2: u64::from_le_bytes(h2),
    }
}

#[derive(Clone)]
pub struct BloomFilter {
    bitmap: Vec<u8>,
    bit_count: usize,
    hash_count: i32,
}

impl BloomFilter {
    /// Builds a filter over `bitmap` with the trailing `padding` bits of the
    /// last byte unused. Parameters arrive from the backend, so violations
    /// are recoverable errors rather than assertions.
    pub fn new(bitmap: Vec<u8>, padding: i32, hash_count: i32) -> StoreResult<Self> {
        if !(0..8).contains(&padding) {
            return Err(invalid_argument(format!("Invalid padding: {padding}")));
        }
        if hash_count < 0 {
            return Err(invalid_argument(format!("Invalid hash count: {hash_count}")));
        }
        if !bitmap.is_empty() && hash_count == 0 {
            return Err(invalid_argument(format!("Invalid hash count: {hash_count}")));
        }
        if bitmap.is_empty() && padding != 0 {
            return Err(invalid_argument(format!(
                "Expected padding of 0 when bitmap length is 0, but got {padding}"
            )));
        }
        let bit_count = bitmap.len() * 8 - padding as usize;
        Ok(Self {
            bitmap,
            bit_count,
            hash_count,
        })
    }

    pub fn bit_count(&self) -> usize {
        self.bit_count
    }

    pub fn hash_count(&self) -> i32 {
        self.hash_count
    }

    /// True when `value` may be in the set; false means definitely not.
    pub fn might_contain(&self, value: &str) -> bool {
        if self.bit_count == 0 {
            return false;
        }
        let hash = md5_double_hash(value);
        (0..self.hash_count).all(|i| self.is_bit_set(self.bit_index(&hash, i)))
    }

    /// `(h1 + i * h2) mod bit_count`, in wrapping 64-bit arithmetic.
    fn bit_index(&self, hash: &DoubleHash, i: i32) -> usize {
        let combined = hash.h1.wrapping_add(hash.h2.wrapping_mul(i as u64));
        (combined % self.bit_count as u64) as usize
    }

    fn is_bit_set(&self, index: usize) -> bool {
        self.bitmap[index / 8] & (1 << (index % 8)) != 0
    }
}

/// Two filters are interchangeable when they agree on every bit that is in
/// range; the padding bits of the last byte do not participate.
impl PartialEq for BloomFilter {
    fn eq(&self, other: &Self) -> bool {
        self.bit_count == other.bit_count
            && self.hash_count == other.hash_count
            && (0..self.bit_count).all(|index| self.is_bit_set(index) == other.is_bit_set(index))
    }
}

impl Eq for BloomFilter {}

impl fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BloomFilter")
            .field("bit_count", &self.bit_count)
            .field("hash_count", &self.hash_count)
            .field("bitmap", &STANDARD.encode(&self.bitmap))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreErrorCode;

    #[test]
    fn rejects_padding_outside_a_byte() {
        for padding in [-1, 8, 9] {
            let err = BloomFilter::new(vec![0xFF], padding, 1).unwrap_err();
            assert_eq!(err.code, StoreErrorCode::InvalidArgument);
            assert_eq!(err.message(), format!("Invalid padding: {padding}"));
        }
    }

    #[test]
    fn rejects_negative_hash_counts() {
        let err = BloomFilter::new(vec![0xFF], 0, -1).unwrap_err();
        assert_eq!(err.code, StoreErrorCode::InvalidArgument);
        assert_eq!(err.message(), "Invalid hash count: -1");
    }

    #[test]
    fn rejects_zero_hashes_over_a_non_empty_bitmap() {
        let err = BloomFilter::new(vec![0xFF], 0, 0).unwrap_err();
        assert_eq!(err.message(), "Invalid hash count: 0");
    }

    #[test]
    fn rejects_padding_on_an_empty_bitmap() {
        let err = BloomFilter::new(Vec::new(), 3, 1).unwrap_err();
        assert_eq!(
            err.message(),
            "Expected padding of 0 when bitmap length is 0, but got 3"
        );
    }

    #[test]
    fn empty_filter_contains_nothing() {
        let filter = BloomFilter::new(Vec::new(), 0, 0).unwrap();
        assert_eq!(filter.bit_count(), 0);
        assert!(!filter.might_contain(""));
        assert!(!filter.might_contain("abc"));
    }

    #[test]
    fn matches_the_reference_membership_vector() {
        let filter = BloomFilter::new(vec![0xED, 0x05], 5, 8).unwrap();
        assert_eq!(filter.bit_count(), 11);
        assert!(filter.might_contain("ÀÒ∑"));
        assert!(!filter.might_contain("Ò∑À"));
    }

    #[test]
    fn saturated_bitmap_matches_everything() {
        let filter = BloomFilter::new(vec![0xFF, 0xFF], 0, 5).unwrap();
        for value in ["", "a", "abc", "never inserted"] {
            assert!(filter.might_contain(value));
        }
    }

    #[test]
    fn equality_ignores_bits_past_the_padding() {
        let lhs = BloomFilter::new(vec![0x81], 7, 2).unwrap();
        let rhs = BloomFilter::new(vec![0x01], 7, 2).unwrap();
        assert_eq!(lhs, rhs);

        let longer = BloomFilter::new(vec![0x01], 6, 2).unwrap();
        assert_ne!(lhs, longer);

        let different_hashes = BloomFilter::new(vec![0x01], 7, 3).unwrap();
        assert_ne!(lhs, different_hashes);
    }
}
