use crate::core::{Allocator, Global};
use ahash::AHashMap;
use getset::CopyGetters;
use log::*;
use parking_lot::Mutex;
use std::{alloc::Layout, ptr::NonNull, sync::Arc};

#[derive(CopyGetters, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[getset(get_copy = "pub")]
pub struct AllocStats {
    allocations: usize,
    deallocations: usize,
    /// Allocations refused because of failure budget.
    failures: usize,
    live_bytes: usize,
}

#[derive(Default)]
struct State {
    live: AHashMap<usize, Layout>,
    /// Zero sized allocations share dangling addresses, so they are only counted.
    live_zero_sized: usize,
    stats: AllocStats,
    /// Number of allocations that will still succeed.
    budget: Option<usize>,
}

/// Allocator that records every live allocation, for finding leaks and
/// double frees of control blocks. Can be told to start failing.
///
/// Clones share the same record.
#[derive(Clone, Default)]
pub struct TrackingAlloc(Arc<Mutex<State>>);

impl TrackingAlloc {
    pub fn new() -> Self {
        Self::default()
    }

    /// After n more allocations succeed, all following will fail.
    pub fn fail_after(&self, n: usize) {
        self.0.lock().budget = Some(n);
    }

    pub fn never_fail(&self) {
        self.0.lock().budget = None;
    }

    pub fn stats(&self) -> AllocStats {
        self.0.lock().stats
    }

    /// Number of live allocations.
    pub fn live(&self) -> usize {
        let state = self.0.lock();
        state.live.len() + state.live_zero_sized
    }

    pub fn is_leak_free(&self) -> bool {
        let state = self.0.lock();
        let live = state.live.len() + state.live_zero_sized;
        if live != 0 {
            warn!(
                "{} allocations of {} bytes are still live.",
                live, state.stats.live_bytes
            );
        }
        live == 0
    }

    /// True if both share the same record.
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Allocator for TrackingAlloc {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        let mut guard = self.0.lock();
        let state = &mut *guard;
        match &mut state.budget {
            Some(0) => {
                state.stats.failures += 1;
                debug!("Refusing allocation of {:?}", layout);
                return None;
            }
            Some(budget) => *budget -= 1,
            None => (),
        }

        let ptr = Global.allocate(layout)?;
        state.stats.allocations += 1;
        if layout.size() == 0 {
            state.live_zero_sized += 1;
            return Some(ptr);
        }
        let previous = state.live.insert(ptr.as_ptr() as usize, layout);
        assert!(previous.is_none(), "Allocated live address {:p}", ptr);
        state.stats.live_bytes += layout.size();
        Some(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        let mut state = self.0.lock();
        if layout.size() == 0 {
            assert!(
                state.live_zero_sized > 0,
                "Deallocating zero sized {:p} which isn't live",
                ptr
            );
            state.live_zero_sized -= 1;
        } else {
            match state.live.remove(&(ptr.as_ptr() as usize)) {
                Some(recorded) if recorded == layout => (),
                Some(recorded) => panic!(
                    "Deallocating {:p} with {:?}, but it was allocated with {:?}",
                    ptr, layout, recorded
                ),
                None => panic!("Deallocating {:p} which isn't live", ptr),
            }
        }
        state.stats.deallocations += 1;
        state.stats.live_bytes -= layout.size();
        drop(state);

        Global.deallocate(ptr, layout);
    }
}

impl std::fmt::Debug for TrackingAlloc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TrackingAlloc").field(&self.stats()).finish()
    }
}
