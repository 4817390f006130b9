pub mod assert;
pub mod comparison;
pub mod work_queue;

pub use assert::{assertion_error, hard_assert, hard_fail};
pub use comparison::{compare_doubles, compare_mixed_number};
pub use work_queue::{DelayedTask, TimerId, WorkQueue};
