//! # genpool
//!
//! Multi-pool, thread-local bump allocation with generational reclamation,
//! for workloads that build many small objects across many threads and throw
//! them away in bulk: graph builders, parsers, tree rewriters.
//!
//! ## Features
//!
//! - **Lock-free hot path**: after a thread's first allocation on a pool,
//!   allocating is a bump-pointer move with no synchronization
//! - **Bulk reclamation**: per-object free is a no-op; memory comes back a
//!   whole generation at a time, O(chunks) not O(objects)
//! - **Cooperative copy-GC**: two generations per (thread, pool); `gc()`
//!   flips them and drives a user callback that copies live data across
//! - **Dense pool ids**: up to [`MAX_POOLS`] pools live at once, ids reused
//!   smallest-first, so per-thread state stays one small table
//! - **Container interop**: a standard allocator adapter with a compile-time
//!   Default/Temporary policy and a no-op `deallocate`
//!
//! ## Quick start
//!
//! ```rust
//! use genpool::Pool;
//!
//! # fn main() -> genpool::Result<()> {
//! let pool = Pool::new()?;
//!
//! let node = pool.new_object(42u64)?;
//! assert_eq!(unsafe { node.as_ptr().read() }, 42);
//!
//! // Individual frees are no-ops; release the whole generation instead.
//! genpool::free(node.as_ptr());
//! pool.clean();
//! # Ok(())
//! # }
//! ```
//!
//! ## Generations and GC
//!
//! Each (thread, pool) pair owns two arenas. Default allocations go to the
//! *active* generation, [`Pool::alloc_temp`] goes to the other one. A
//! [`Pool::gc`] call discards the temporary side, flips the bit, and invokes
//! the registered callback; while the callback runs, both generations are
//! valid, so it can walk the old data with ordinary code and re-allocate
//! what should survive. Afterwards the old generation is released in bulk.
//!
//! `clean`, `clean_temp` and `gc` are **not** safe against concurrent
//! allocation on the same pool: pause the workers, collect, resume.

mod alloc_adapter;
mod arena;
mod error;
mod pool;
mod registry;
mod slots;
mod typed;

pub use alloc_adapter::{
    AllocPolicy, DefaultPolicy, PoolAllocator, TempPolicy, ThreadBoundAllocator,
};
pub use error::{Error, Result};
pub use pool::Pool;
pub use typed::{destroy_array, destroy_object, free};

/// Compile-time upper bound on simultaneously live pools.
///
/// Kept small so each thread's slot table is a single modest allocation.
pub const MAX_POOLS: usize = 64;

/// Dense pool identifier in `[0, MAX_POOLS)`, issued smallest-first.
pub type PoolId = u16;
