//! Per-thread slot tables mapping pool ids to generation arena pairs

use std::cell::UnsafeCell;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::arena::Arena;
use crate::registry::registry;
use crate::{PoolId, MAX_POOLS};

/// Short-lived spinlock serializing first-touch arena creation in one slot.
///
/// The critical section is "double-check the cell and write a freshly
/// constructed arena". It is entered at most once per (thread, pool,
/// generation) and never held while calling user code.
pub(crate) struct SpinLock {
    locked: AtomicBool,
}

impl SpinLock {
    const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    fn lock(&self) {
        while self.locked.swap(true, Ordering::Acquire) {
            std::hint::spin_loop();
        }
    }

    fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }
}

/// Holder for one generation's arena inside a thread's slot table.
///
/// The owning thread reads and writes the cell on the allocation path; pool
/// maintenance (`clean`, `gc`, pool drop) reaches the same cell from other
/// threads through the registry, which guards every such access with the
/// per-id lock and requires the pool to be quiescent.
pub(crate) struct ArenaCell {
    inner: UnsafeCell<Option<Arena>>,
    /// Mirrors registry membership. Flipped only under the per-id registry
    /// lock; lets thread teardown skip untouched slots without locking.
    bound: AtomicBool,
}

// Cells cross threads only through the registry, whose per-id lock and
// bind/unbind protocol gate every dereference.
unsafe impl Send for ArenaCell {}
unsafe impl Sync for ArenaCell {}

impl ArenaCell {
    const fn new() -> Self {
        Self {
            inner: UnsafeCell::new(None),
            bound: AtomicBool::new(false),
        }
    }

    /// # Safety
    ///
    /// The caller must be the owning thread (allocation path, with pool
    /// maintenance excluded by the quiescence contract) or hold the per-id
    /// registry lock with this cell still bound.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn arena_mut(&self) -> &mut Option<Arena> {
        unsafe { &mut *self.inner.get() }
    }

    pub(crate) fn is_bound(&self) -> bool {
        self.bound.load(Ordering::Relaxed)
    }

    /// Called by the registry while it holds the per-id lock.
    pub(crate) fn set_bound(&self, bound: bool) {
        self.bound.store(bound, Ordering::Relaxed);
    }

    #[cfg(test)]
    pub(crate) fn new_for_tests() -> Self {
        Self::new()
    }
}

/// One slot of the per-thread table: the two generation cells for a pool id
/// plus the lock guarding their first-time creation.
pub(crate) struct SlotEntry {
    gens: [ArenaCell; 2],
    init_lock: SpinLock,
}

impl SlotEntry {
    const fn new() -> Self {
        Self {
            gens: [ArenaCell::new(), ArenaCell::new()],
            init_lock: SpinLock::new(),
        }
    }

    /// The arena for `generation`, creating and registering it on first
    /// touch. Creating an empty arena allocates nothing, so first touch
    /// cannot fail and never leaves a partial bind behind.
    pub(crate) fn ensure_arena(&self, pool_id: PoolId, generation: usize) -> &Arena {
        let cell = &self.gens[generation];
        // SAFETY: we are the owning thread and maintenance on this pool is
        // excluded while an allocation is in flight.
        let slot = unsafe { cell.arena_mut() };
        if slot.is_none() {
            self.init_lock.lock();
            if slot.is_none() {
                *slot = Some(Arena::new());
                registry().bind(pool_id, cell, generation);
            }
            self.init_lock.unlock();
        }
        slot.as_ref().expect("slot initialized on first touch")
    }

    pub(crate) fn cell(&self, generation: usize) -> &ArenaCell {
        &self.gens[generation]
    }
}

/// Per-thread table of `MAX_POOLS` slot entries, created on the thread's
/// first allocation and destroyed on thread exit.
struct SlotTable {
    entries: Box<[SlotEntry; MAX_POOLS]>,
}

impl SlotTable {
    fn new() -> Self {
        Self {
            entries: Box::new(std::array::from_fn(|_| SlotEntry::new())),
        }
    }
}

impl Drop for SlotTable {
    fn drop(&mut self) {
        // The registry must see the unbind before each arena drops,
        // otherwise a concurrent walk over the pool would reach a dangling
        // cell. `unbind_and_release` removes the cell and drops its arena in
        // one per-id critical section.
        for (id, entry) in self.entries.iter().enumerate() {
            for generation in 0..2 {
                let cell = entry.cell(generation);
                if cell.is_bound() {
                    registry().unbind_and_release(id as PoolId, cell, generation);
                }
            }
        }
    }
}

thread_local! {
    static SLOT_TABLE: SlotTable = SlotTable::new();
}

/// Run `f` against the calling thread's slot entry for `pool_id`.
#[inline]
pub(crate) fn with_entry<R>(pool_id: PoolId, f: impl FnOnce(&SlotEntry) -> R) -> R {
    SLOT_TABLE.with(|table| f(&table.entries[pool_id as usize]))
}

/// Address of the calling thread's slot entry for `pool_id`.
///
/// The entry lives until the thread exits; callers that retain the pointer
/// must not outlive the thread.
pub(crate) fn entry_ptr(pool_id: PoolId) -> NonNull<SlotEntry> {
    SLOT_TABLE.with(|table| NonNull::from(&table.entries[pool_id as usize]))
}
