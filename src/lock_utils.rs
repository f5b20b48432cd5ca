//! Lock poisoning recovery for monitor-shared state.
//!
//! Background monitors and the foreground analysis share score/indicator
//! state behind mutexes. A panic in one task must not take the whole
//! session's scoring down with it, so locks are recovered rather than
//! propagated; the event is logged for monitoring, and readers accept that
//! the guarded data may be mid-update.

use std::sync::{Mutex, MutexGuard};
use tracing::error;

/// Acquire a Mutex lock, recovering from poisoning if necessary.
///
/// # Arguments
/// * `mutex` - The Mutex to lock
/// * `context` - A description of what the lock protects (for logging)
pub fn lock_or_recover<'a, T>(mutex: &'a Mutex<T>, context: &str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            error!(
                "mutex poisoned for '{}', recovering with potentially stale data",
                context
            );
            poisoned.into_inner()
        }
    }
}
