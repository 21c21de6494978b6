//! The user-facing pool handle: allocation entry points, bulk reclamation
//! and the generational flip

use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::Result;
use crate::registry::registry;
use crate::slots;
use crate::PoolId;

type GcCallback = Box<dyn FnMut(&Pool) + Send>;

/// An allocation domain with two generations per thread and bulk-only
/// reclamation.
///
/// Every thread that allocates through a pool gets its own pair of arenas
/// for it, so the hot path is lock-free after the thread's first touch.
/// Individual objects are never freed; memory comes back through
/// [`Pool::clean`], [`Pool::clean_temp`] or the [`Pool::gc`] flip, each of
/// which releases whole generations across all threads at once.
///
/// `clean`, `clean_temp` and `gc` require quiescence: no other thread may be
/// allocating on this pool while they run. The usual pattern is to pause the
/// workers, collect, and resume.
pub struct Pool {
    id: PoolId,
    /// Which generation default allocations hit. Written only by `gc`, which
    /// already requires quiescence; atomic so concurrent readers are formally
    /// race-free anyway.
    active: AtomicUsize,
    gc: Mutex<Option<GcCallback>>,
    #[cfg(debug_assertions)]
    maintenance: std::sync::atomic::AtomicBool,
}

impl Pool {
    /// Create a pool, taking the smallest free id.
    ///
    /// Fails with [`Error::PoolExhausted`](crate::Error::PoolExhausted) when
    /// all [`MAX_POOLS`](crate::MAX_POOLS) ids are live; no id is reserved in
    /// that case.
    pub fn new() -> Result<Self> {
        let id = registry().acquire_id()?;
        trace!(pool = id, "created pool");
        Ok(Self {
            id,
            active: AtomicUsize::new(0),
            gc: Mutex::new(None),
            #[cfg(debug_assertions)]
            maintenance: std::sync::atomic::AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> PoolId {
        self.id
    }

    pub(crate) fn active_generation(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Allocate from the active generation of the calling thread's arena.
    ///
    /// Lock-free after the thread's first allocation for this pool and
    /// generation. The returned bytes stay valid until this generation is
    /// released by `clean` or a `gc` cycle that retires it.
    #[inline]
    pub fn alloc(&self, layout: Layout) -> Result<NonNull<u8>> {
        self.alloc_in(self.active_generation(), layout)
    }

    /// Allocate scratch from the inactive (temporary) generation.
    ///
    /// Temp bytes survive only until the next [`Pool::clean_temp`],
    /// [`Pool::clean`] or [`Pool::gc`].
    #[inline]
    pub fn alloc_temp(&self, layout: Layout) -> Result<NonNull<u8>> {
        self.alloc_in(1 - self.active_generation(), layout)
    }

    #[inline]
    pub(crate) fn alloc_in(&self, generation: usize, layout: Layout) -> Result<NonNull<u8>> {
        #[cfg(debug_assertions)]
        debug_assert!(
            !self.maintenance.load(Ordering::Relaxed),
            "allocation raced clean/gc on pool {}",
            self.id
        );
        slots::with_entry(self.id, |entry| {
            entry.ensure_arena(self.id, generation).allocate(layout)
        })
    }

    /// Install (or replace) the callback [`Pool::gc`] drives.
    ///
    /// The callback receives the pool with the generation flip already done:
    /// default allocations land in the fresh generation, while everything
    /// allocated before the flip is still readable. Its job is to copy the
    /// data that should survive and update the caller's roots.
    pub fn register_gc(&self, callback: impl FnMut(&Pool) + Send + 'static) {
        *self.gc.lock() = Some(Box::new(callback));
    }

    /// Release both generations on every thread. No flip happens; every
    /// pointer this pool ever produced becomes invalid. Idempotent.
    pub fn clean(&self) {
        let active = self.active_generation();
        self.release_generation(active);
        self.release_generation(1 - active);
        debug!(pool = self.id, "clean: released both generations");
    }

    /// Release only the temporary generation; the primary survives.
    /// Idempotent.
    pub fn clean_temp(&self) {
        self.release_generation(1 - self.active_generation());
    }

    /// Cooperative generational collection.
    ///
    /// With no callback registered this is exactly [`Pool::clean`]. With one,
    /// the pool discards the temporary generation, flips the active bit so
    /// the empty side becomes primary, and invokes the callback to copy
    /// reachable data across; afterwards the pre-flip primary is released,
    /// invalidating every pre-GC pointer. While the callback runs both
    /// generations hold live data and no registry lock is held, so the
    /// callback may allocate freely.
    ///
    /// The caller must guarantee no other thread is allocating on this pool
    /// for the whole call.
    pub fn gc(&self) {
        let callback = self.gc.lock().take();
        let Some(mut callback) = callback else {
            self.clean();
            return;
        };

        let old_active = self.active_generation();
        debug!(pool = self.id, from = old_active, "gc: flipping generation");

        // Discard existing scratch, then flip so default allocations land in
        // the freshly emptied side.
        self.release_generation(1 - old_active);
        self.active.store(1 - old_active, Ordering::Relaxed);

        callback(self);

        // Retire the pre-flip primary, now the inactive side.
        self.release_generation(old_active);
        debug!(pool = self.id, "gc: retired old generation");

        // A callback installed from inside the callback wins over the one we
        // took out.
        let mut slot = self.gc.lock();
        if slot.is_none() {
            *slot = Some(callback);
        }
    }

    /// Bytes currently allocated in the (active, temporary) generations
    /// across all threads that have touched this pool. Meaningful only at a
    /// quiescent point.
    pub fn allocated_bytes(&self) -> (usize, usize) {
        let active = self.active_generation();
        (
            self.generation_bytes(active),
            self.generation_bytes(1 - active),
        )
    }

    fn generation_bytes(&self, generation: usize) -> usize {
        let mut total = 0;
        registry().for_each(self.id, generation, |cell| {
            // SAFETY: per-id lock held by `for_each`; quiescence is the
            // caller's contract.
            if let Some(arena) = unsafe { cell.arena_mut() }.as_ref() {
                total += arena.allocated_bytes();
            }
        });
        total
    }

    fn release_generation(&self, generation: usize) {
        #[cfg(debug_assertions)]
        self.maintenance.store(true, Ordering::Relaxed);

        registry().for_each(self.id, generation, |cell| {
            // SAFETY: per-id lock held by `for_each`; the owning threads are
            // quiescent on this pool.
            if let Some(arena) = unsafe { cell.arena_mut() }.as_mut() {
                arena.release();
            }
        });

        #[cfg(debug_assertions)]
        self.maintenance.store(false, Ordering::Relaxed);
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        // Dropping the arenas (not just releasing them) lets the id be
        // reused from a blank slate; threads recreate on first touch.
        registry().drain(self.id, 0);
        registry().drain(self.id, 1);
        registry().release_id(self.id);
        trace!(pool = self.id, "dropped pool");
    }
}
