/// Panic with an internal assertion message when the condition is false.
///
/// Used for caller contract violations (never for data errors, which are
/// reported as [`StoreError`](crate::error::StoreError) values).
pub fn hard_assert(condition: bool, message: impl AsRef<str>) {
    if !condition {
        panic!("{}", assertion_error(message));
    }
}

/// Panic unconditionally with an internal assertion message.
pub fn hard_fail(message: impl AsRef<str>) -> ! {
    panic!("{}", assertion_error(message));
}

/// Build the string used when raising assertion errors.
pub fn assertion_error(message: impl AsRef<str>) -> String {
    format!("localstore INTERNAL ASSERT FAILED: {}", message.as_ref())
}
