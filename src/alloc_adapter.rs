//! Allocator-trait adapters so standard containers can live in pool memory

use std::alloc::Layout;
use std::marker::PhantomData;
use std::ptr::NonNull;

use allocator_api2::alloc::{AllocError, Allocator};

use crate::pool::Pool;
use crate::slots::{self, SlotEntry};
use crate::{PoolId, Result};

/// Compile-time choice of which generation an adapter allocates from.
///
/// The policy is fixed at each allocation site; there is no runtime branch
/// between the two entry points.
pub trait AllocPolicy {
    #[doc(hidden)]
    fn allocate(pool: &Pool, layout: Layout) -> Result<NonNull<u8>>;
}

/// Route allocations to the active (primary) generation.
pub struct DefaultPolicy;

/// Route allocations to the inactive (temporary) generation.
pub struct TempPolicy;

impl AllocPolicy for DefaultPolicy {
    fn allocate(pool: &Pool, layout: Layout) -> Result<NonNull<u8>> {
        pool.alloc(layout)
    }
}

impl AllocPolicy for TempPolicy {
    fn allocate(pool: &Pool, layout: Layout) -> Result<NonNull<u8>> {
        pool.alloc_temp(layout)
    }
}

/// Standard-allocator adapter over a pool.
///
/// `allocate` routes through the policy's entry point; `deallocate` is a
/// no-op by contract; the bytes come back when the generation is released.
/// The adapter is freely clonable and works for any element type, so
/// containers can rebind it as they please.
pub struct PoolAllocator<'p, P: AllocPolicy = DefaultPolicy> {
    pool: &'p Pool,
    _policy: PhantomData<P>,
}

impl<'p, P: AllocPolicy> PoolAllocator<'p, P> {
    pub fn new(pool: &'p Pool) -> Self {
        Self {
            pool,
            _policy: PhantomData,
        }
    }
}

impl<P: AllocPolicy> Clone for PoolAllocator<'_, P> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool,
            _policy: PhantomData,
        }
    }
}

unsafe impl<P: AllocPolicy> Allocator for PoolAllocator<'_, P> {
    fn allocate(&self, layout: Layout) -> std::result::Result<NonNull<[u8]>, AllocError> {
        let ptr = P::allocate(self.pool, layout).map_err(|_| AllocError)?;
        Ok(NonNull::slice_from_raw_parts(ptr, layout.size()))
    }

    unsafe fn deallocate(&self, _ptr: NonNull<u8>, _layout: Layout) {
        // Per-object free is a no-op; whole-generation release reclaims.
    }
}

/// Allocator bound to the calling thread's arena for one pool.
///
/// Construction resolves the thread-local lookup once (forcing first touch)
/// and pins the generation that was chosen, so every later allocation is a
/// plain bump with no thread-local access. The adapter is not `Send`: the
/// captured slot belongs to the constructing thread, and the adapter must
/// not outlive that thread or the pool it was built from.
pub struct ThreadBoundAllocator {
    entry: NonNull<SlotEntry>,
    pool_id: PoolId,
    generation: usize,
    _not_send: PhantomData<*const ()>,
}

impl ThreadBoundAllocator {
    /// Bind to the calling thread's arena for `pool`'s active generation.
    pub fn new(pool: &Pool) -> Self {
        Self::bind(pool, pool.active_generation())
    }

    /// Bind to the calling thread's arena for `pool`'s temporary generation.
    pub fn new_temp(pool: &Pool) -> Self {
        Self::bind(pool, 1 - pool.active_generation())
    }

    fn bind(pool: &Pool, generation: usize) -> Self {
        let entry = slots::entry_ptr(pool.id());
        // Force first touch so the arena exists and is registered before the
        // adapter starts bypassing the lookup.
        // SAFETY: the pointer was just produced for the calling thread.
        unsafe { entry.as_ref() }.ensure_arena(pool.id(), generation);
        Self {
            entry,
            pool_id: pool.id(),
            generation,
            _not_send: PhantomData,
        }
    }
}

unsafe impl Allocator for ThreadBoundAllocator {
    fn allocate(&self, layout: Layout) -> std::result::Result<NonNull<[u8]>, AllocError> {
        // SAFETY: !Send keeps us on the owning thread, and the slot entry
        // lives for the thread's lifetime.
        let entry = unsafe { self.entry.as_ref() };
        let ptr = entry
            .ensure_arena(self.pool_id, self.generation)
            .allocate(layout)
            .map_err(|_| AllocError)?;
        Ok(NonNull::slice_from_raw_parts(ptr, layout.size()))
    }

    unsafe fn deallocate(&self, _ptr: NonNull<u8>, _layout: Layout) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use allocator_api2::vec::Vec as PoolVec;

    #[test]
    fn test_vec_grows_in_pool_memory() {
        let pool = Pool::new().unwrap();
        let mut v = PoolVec::new_in(PoolAllocator::<DefaultPolicy>::new(&pool));
        for i in 0..1000u64 {
            v.push(i);
        }
        assert_eq!(v.len(), 1000);
        assert_eq!(v[999], 999);
        assert!(pool.allocated_bytes().0 >= 1000 * 8);
    }

    #[test]
    fn test_temp_policy_targets_temp_generation() {
        let pool = Pool::new().unwrap();
        let mut v = PoolVec::new_in(PoolAllocator::<TempPolicy>::new(&pool));
        v.extend_from_slice(&[1u8; 256]);

        let (primary, temp) = pool.allocated_bytes();
        assert_eq!(primary, 0);
        assert!(temp >= 256);

        drop(v);
        pool.clean_temp();
        assert_eq!(pool.allocated_bytes().1, 0);
    }

    #[test]
    fn test_dealloc_is_noop() {
        let pool = Pool::new().unwrap();
        let before = {
            let mut v = PoolVec::new_in(PoolAllocator::<DefaultPolicy>::new(&pool));
            for i in 0..64u64 {
                v.push(i);
            }
            pool.allocated_bytes().0
        };
        // Dropping the vec returned nothing to the arena.
        assert_eq!(pool.allocated_bytes().0, before);
    }

    #[test]
    fn test_thread_bound_allocator_bumps_same_arena() {
        let pool = Pool::new().unwrap();
        let bound = ThreadBoundAllocator::new(&pool);

        let layout = Layout::from_size_align(32, 8).unwrap();
        let a = bound.allocate(layout).unwrap();
        let b = pool.alloc(layout).unwrap();
        // Both went to this thread's active arena.
        assert!(pool.allocated_bytes().0 >= 64);
        assert_ne!(a.cast::<u8>().as_ptr(), b.as_ptr());
    }
}
