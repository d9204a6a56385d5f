//! Counting policies of control blocks.
//!
//! All policies start at count of 1 and satisfy the same {acquire, release, count} contract.
//! They differ only in what is allowed to happen concurrently.
use log::*;
use std::cell::Cell;

#[cfg(feature = "sync")]
use std::sync::atomic::{self, AtomicU32, Ordering};

/// Number of live owners of a control block.
pub trait Counter: Sized + 'static {
    /// Counter with count of 1.
    fn new() -> Self;

    /// Adds one owner.
    fn acquire(&self);

    /// Removes one owner.
    /// True if this was the last one.
    fn release(&self) -> bool;

    fn count(&self) -> u32;
}

/// Counters whose acquire/release may be called concurrently from multiple threads.
///
/// UNSAFE: implementors must guarantee that no update is lost under concurrent use,
/// and that release returning true happens-after every other release.
pub unsafe trait ThreadSafe: Counter + Send + Sync {}

/// Values of type X may be carried, and eventually dropped, by control blocks of this policy.
pub trait Admits<X: ?Sized> {}

#[cold]
#[inline(never)]
fn overflow() -> ! {
    error!("Reference count overflow, aborting.");
    std::process::abort()
}

/// Plain, unsynchronized, counter.
/// Concurrent use is prevented by it not being Sync.
#[derive(Debug)]
pub struct Single(Cell<u32>);

impl Counter for Single {
    fn new() -> Self {
        Self(Cell::new(1))
    }

    #[inline]
    fn acquire(&self) {
        let count = self.0.get();
        if count == u32::MAX {
            overflow();
        }
        self.0.set(count + 1);
    }

    #[inline]
    fn release(&self) -> bool {
        let count = self.0.get();
        debug_assert!(count > 0, "Released dead counter");
        self.0.set(count - 1);
        count == 1
    }

    fn count(&self) -> u32 {
        self.0.get()
    }
}

impl<X: ?Sized> Admits<X> for Single {}

/// Leaves room for threads that have incremented but not yet checked.
#[cfg(feature = "sync")]
const MAX_ATOMIC_COUNT: u32 = i32::MAX as u32;

/// Atomically updated counter.
/// Only ownership bookkeeping is synchronized, not access to the resource.
#[cfg(feature = "sync")]
#[derive(Debug)]
pub struct Atomic(AtomicU32);

#[cfg(feature = "sync")]
impl Counter for Atomic {
    fn new() -> Self {
        Self(AtomicU32::new(1))
    }

    #[inline]
    fn acquire(&self) {
        // New owner can only come from an existing one so there is nothing to synchronize with.
        if self.0.fetch_add(1, Ordering::Relaxed) > MAX_ATOMIC_COUNT {
            overflow();
        }
    }

    #[inline]
    fn release(&self) -> bool {
        if self.0.fetch_sub(1, Ordering::Release) != 1 {
            return false;
        }
        // Disposal must observe all uses of the resource by other owners.
        atomic::fence(Ordering::Acquire);
        true
    }

    fn count(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }
}

#[cfg(feature = "sync")]
unsafe impl ThreadSafe for Atomic {}

#[cfg(feature = "sync")]
impl<X: Send + Sync + ?Sized> Admits<X> for Atomic {}

/// Counter guarded by a mutex.
#[cfg(feature = "sync")]
#[derive(Debug)]
pub struct Locked(parking_lot::Mutex<u32>);

#[cfg(feature = "sync")]
impl Counter for Locked {
    fn new() -> Self {
        Self(parking_lot::Mutex::new(1))
    }

    fn acquire(&self) {
        let mut count = self.0.lock();
        if *count == u32::MAX {
            overflow();
        }
        *count += 1;
    }

    fn release(&self) -> bool {
        let mut count = self.0.lock();
        debug_assert!(*count > 0, "Released dead counter");
        *count -= 1;
        *count == 0
    }

    fn count(&self) -> u32 {
        *self.0.lock()
    }
}

// Mutex release/lock pairs order every release before the last one.
#[cfg(feature = "sync")]
unsafe impl ThreadSafe for Locked {}

#[cfg(feature = "sync")]
impl<X: Send + Sync + ?Sized> Admits<X> for Locked {}

#[cfg(test)]
mod tests {
    use super::*;

    fn acquire_release<C: Counter>() {
        let counter = C::new();
        assert_eq!(counter.count(), 1);

        counter.acquire();
        counter.acquire();
        assert_eq!(counter.count(), 3);

        assert!(!counter.release());
        assert!(!counter.release());
        assert_eq!(counter.count(), 1);
        assert!(counter.release());
        assert_eq!(counter.count(), 0);
    }

    #[test]
    fn single() {
        acquire_release::<Single>();
    }

    #[cfg(feature = "sync")]
    #[test]
    fn atomic() {
        acquire_release::<Atomic>();
    }

    #[cfg(feature = "sync")]
    #[test]
    fn locked() {
        acquire_release::<Locked>();
    }

    #[cfg(feature = "sync")]
    fn concurrent<C: ThreadSafe>() {
        let threads = 8;
        let repetitions = 10_000;
        let counter = std::sync::Arc::new(C::new());

        let handles = (0..threads)
            .map(|_| {
                let counter = counter.clone();
                std::thread::spawn(move || {
                    for _ in 0..repetitions {
                        counter.acquire();
                    }
                    for _ in 0..repetitions {
                        assert!(!counter.release());
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(counter.count(), 1);
        assert!(counter.release());
    }

    #[cfg(feature = "sync")]
    #[test]
    fn atomic_concurrent() {
        concurrent::<Atomic>();
    }

    #[cfg(feature = "sync")]
    #[test]
    fn locked_concurrent() {
        concurrent::<Locked>();
    }
}
