mod arc;
mod expiring_lru;

pub use arc::ArcCache;
pub use expiring_lru::ExpiringLruCache;

use std::sync::{Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
