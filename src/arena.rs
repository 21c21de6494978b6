//! Monotonic bump arena backing one generation of one pool on one thread

use std::alloc::Layout;
use std::ptr::NonNull;

use bumpalo::Bump;

use crate::error::{Error, Result};

/// A monotonic region allocator.
///
/// Grows by taking bytes from internal chunks; [`Arena::release`] returns
/// every chunk in one step, so reclamation cost is proportional to the number
/// of chunks, not the number of objects. An arena is owned by exactly one
/// (thread, pool, generation) slot and is never shared, so it carries no
/// synchronization of its own.
pub(crate) struct Arena {
    bump: Bump,
}

impl Arena {
    /// Create an empty arena. No chunk is allocated until the first
    /// allocation, so construction cannot fail.
    pub(crate) fn new() -> Self {
        Self { bump: Bump::new() }
    }

    /// Bump-allocate `layout.size()` bytes aligned to `layout.align()`.
    ///
    /// Fails with [`Error::OutOfMemory`] when the underlying chunk allocator
    /// refuses to grow. Previously returned pointers are unaffected and the
    /// arena stays usable.
    pub(crate) fn allocate(&self, layout: Layout) -> Result<NonNull<u8>> {
        self.bump.try_alloc_layout(layout).map_err(|_| Error::OutOfMemory {
            requested: layout.size(),
        })
    }

    /// Invalidate every pointer handed out so far and return the arena to an
    /// empty state ready for reuse. The largest chunk is retained so the next
    /// fill avoids fresh system allocations.
    pub(crate) fn release(&mut self) {
        self.bump.reset();
    }

    /// Bytes currently allocated out of this arena's chunks.
    pub(crate) fn allocated_bytes(&self) -> usize {
        self.bump.allocated_bytes()
    }
}
