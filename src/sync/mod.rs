//! Spin-backed `Mutex`/`RwLock` wrappers over [`lock_api`], matching the
//! short-held-lock-per-subsystem policy of §5: buddy pools, the page map,
//! scheduler runqueues, clock-event device lists and the Xentium dispatch
//! state each get one of these.

mod mutex;
mod rwlock;

pub use lock_api::{MappedMutexGuard, MappedRwLockReadGuard, MappedRwLockWriteGuard, MutexGuard, RwLockReadGuard, RwLockWriteGuard};

/// A spinlock-protected value. IRQs must be disabled by the caller around the
/// critical section per §5; this type only provides mutual exclusion.
pub type Mutex<T> = lock_api::Mutex<mutex::RawSpinMutex, T>;

/// A spinlock-protected reader/writer value.
pub type RwLock<T> = lock_api::RwLock<rwlock::RawSpinRwLock, T>;
