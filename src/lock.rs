use std::sync::{Mutex, MutexGuard};
use tracing::warn;

/// Acquire `lock`, recovering the guard if a previous holder panicked.
///
/// A poller that panics mid-update must not wedge the display or the key queue
/// for every other thread.
pub(crate) fn lock_or_recover<'a, T>(lock: &'a Mutex<T>, context: &str) -> MutexGuard<'a, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("Mutex poisoned in {context}; recovering");
            poisoned.into_inner()
        }
    }
}
