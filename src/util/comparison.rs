use std::cmp::Ordering;

// 2^63 is exactly representable as a double; it is also the first value too
// large for i64. Its negation is exactly i64::MIN.
const I64_RANGE_MAX: f64 = 9_223_372_036_854_775_808.0;
const I64_RANGE_MIN: f64 = -9_223_372_036_854_775_808.0;

/// Total order over doubles: NaN sorts before every other number and equal
/// to itself, so the relation never reports "unordered".
pub fn compare_doubles(lhs: f64, rhs: f64) -> Ordering {
    if lhs < rhs {
        Ordering::Less
    } else if lhs > rhs {
        Ordering::Greater
    } else if lhs == rhs {
        Ordering::Equal
    } else {
        // One or both sides is NaN.
        if lhs.is_nan() {
            if rhs.is_nan() {
                Ordering::Equal
            } else {
                Ordering::Less
            }
        } else {
            Ordering::Greater
        }
    }
}

/// Compare a double against an i64 by numeric value, exactly.
///
/// A plain cast in either direction loses precision for magnitudes above
/// 2^53, so the comparison is staged: range check, integral comparison of
/// the truncated double, then a double-space tie-break to account for any
/// fractional part.
pub fn compare_mixed_number(double_value: f64, integer_value: i64) -> Ordering {
    if double_value.is_nan() {
        return Ordering::Less;
    }
    if double_value < I64_RANGE_MIN {
        return Ordering::Less;
    }
    if double_value >= I64_RANGE_MAX {
        return Ordering::Greater;
    }
    let double_as_integer = double_value as i64;
    match double_as_integer.cmp(&integer_value) {
        Ordering::Equal => compare_doubles(double_value, integer_value as f64),
        ordering => ordering,
    }
}
