//! Process-global registry of pool ids and the arena cells bound to them

use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::slots::ArenaCell;
use crate::{PoolId, MAX_POOLS};

/// Address of an [`ArenaCell`] inside some thread's slot table.
///
/// The registry never owns the cell. The owning slot table removes the
/// address (under the per-id lock) before the cell is torn down, so a
/// registered address is always safe to dereference while that lock is held.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct CellAddr(*const ArenaCell);

// Addresses cross threads only as set keys; dereferencing is gated by the
// per-id lock and the bind/unbind protocol.
unsafe impl Send for CellAddr {}

struct PoolEntry {
    /// Bound cells for generation 0 and 1. The lock covers set membership
    /// only, never the contents of the arenas behind the cells.
    bindings: Mutex<[HashSet<CellAddr>; 2]>,
}

impl PoolEntry {
    fn new() -> Self {
        Self {
            bindings: Mutex::new([HashSet::new(), HashSet::new()]),
        }
    }
}

pub(crate) struct PoolRegistry {
    /// Ordered free set; `acquire_id` always hands out the smallest member,
    /// keeping live ids dense in `[0, MAX_POOLS)`.
    free_ids: Mutex<BTreeSet<PoolId>>,
    entries: [PoolEntry; MAX_POOLS],
}

static REGISTRY: LazyLock<PoolRegistry> = LazyLock::new(PoolRegistry::new);

/// The process-wide registry instance.
pub(crate) fn registry() -> &'static PoolRegistry {
    &REGISTRY
}

impl PoolRegistry {
    fn new() -> Self {
        Self {
            free_ids: Mutex::new((0..MAX_POOLS as PoolId).collect()),
            entries: std::array::from_fn(|_| PoolEntry::new()),
        }
    }

    /// Take the smallest free pool id.
    pub(crate) fn acquire_id(&self) -> Result<PoolId> {
        self.free_ids.lock().pop_first().ok_or(Error::PoolExhausted)
    }

    /// Return an id to the free set. Every cell for the id must already be
    /// unbound; pool teardown guarantees this by draining first.
    pub(crate) fn release_id(&self, id: PoolId) {
        debug_assert!(
            self.entries[id as usize]
                .bindings
                .lock()
                .iter()
                .all(HashSet::is_empty),
            "pool id released while cells remain bound"
        );
        let newly_freed = self.free_ids.lock().insert(id);
        debug_assert!(newly_freed, "pool id double-released");
    }

    /// Record `cell` as holding a live arena for `(id, generation)`. Called
    /// the first time a thread writes an arena into that slot.
    pub(crate) fn bind(&self, id: PoolId, cell: &ArenaCell, generation: usize) {
        let mut bindings = self.entries[id as usize].bindings.lock();
        let inserted = bindings[generation].insert(CellAddr(cell));
        debug_assert!(inserted, "cell bound twice");
        cell.set_bound(true);
    }

    /// Remove `cell` from `(id, generation)` and drop its arena, if it is
    /// still bound. Thread teardown runs this for every bound slot; doing
    /// both steps in one critical section means a pool walking or draining
    /// the same generation can never reach a dangling cell.
    pub(crate) fn unbind_and_release(&self, id: PoolId, cell: &ArenaCell, generation: usize) {
        let mut bindings = self.entries[id as usize].bindings.lock();
        if bindings[generation].remove(&CellAddr(cell)) {
            cell.set_bound(false);
            // SAFETY: membership proved the arena live and we hold the lock.
            unsafe { cell.arena_mut().take() };
        }
    }

    /// Run `f` for every cell bound to `(id, generation)` while holding the
    /// per-id lock. `f` may touch the arena behind the cell because callers
    /// guarantee the owning threads are not allocating on this pool. User
    /// code is never invoked under this lock.
    pub(crate) fn for_each(&self, id: PoolId, generation: usize, mut f: impl FnMut(&ArenaCell)) {
        let bindings = self.entries[id as usize].bindings.lock();
        for addr in &bindings[generation] {
            // SAFETY: bound addresses stay valid until unbound, and unbind
            // takes this same lock.
            f(unsafe { &*addr.0 });
        }
    }

    /// Drop every arena bound to `(id, generation)` and clear the set.
    ///
    /// Pool teardown uses this; the owning threads keep their now-empty
    /// cells and recreate arenas on first touch if the id is reused.
    pub(crate) fn drain(&self, id: PoolId, generation: usize) {
        let mut bindings = self.entries[id as usize].bindings.lock();
        for addr in bindings[generation].drain() {
            // SAFETY: as above; the set is cleared in the same critical
            // section, keeping membership and cell state in step.
            let cell = unsafe { &*addr.0 };
            cell.set_bound(false);
            unsafe { cell.arena_mut().take() };
        }
    }
}
