//! Typed construction helpers over the raw allocation entry points
//!
//! Constructors place values into pool memory and hand back raw pointers;
//! the matching destroy functions run destructors only. Nothing here frees
//! bytes; that is the pool's job, a generation at a time.

use std::alloc::Layout;
use std::mem;
use std::ptr::{self, NonNull};

use crate::error::{Error, Result};
use crate::pool::Pool;

fn array_layout<T>(len: usize) -> Result<Layout> {
    Layout::array::<T>(len).map_err(|_| Error::OutOfMemory {
        requested: len.saturating_mul(mem::size_of::<T>()),
    })
}

/// Write `len` elements produced by `make` into freshly allocated memory.
///
/// # Safety
///
/// `ptr` must point to uninitialized pool memory with room for `len` `T`s.
unsafe fn init_with<T>(ptr: NonNull<T>, len: usize, mut make: impl FnMut() -> T) {
    for i in 0..len {
        unsafe { ptr.as_ptr().add(i).write(make()) };
    }
}

impl Pool {
    /// Move `value` into the active generation.
    ///
    /// The object is never freed individually. Run [`destroy_object`] before
    /// the generation is released if `T`'s destructor matters; otherwise the
    /// bytes simply vanish with the generation.
    pub fn new_object<T>(&self, value: T) -> Result<NonNull<T>> {
        let ptr = self.alloc(Layout::new::<T>())?.cast::<T>();
        // SAFETY: freshly allocated and aligned for T.
        unsafe { ptr.as_ptr().write(value) };
        Ok(ptr)
    }

    /// Move `value` into the temporary generation.
    pub fn new_object_temp<T>(&self, value: T) -> Result<NonNull<T>> {
        let ptr = self.alloc_temp(Layout::new::<T>())?.cast::<T>();
        // SAFETY: freshly allocated and aligned for T.
        unsafe { ptr.as_ptr().write(value) };
        Ok(ptr)
    }

    /// Allocate a default-initialized array of `len` elements in the active
    /// generation.
    pub fn new_array<T: Default>(&self, len: usize) -> Result<NonNull<T>> {
        let ptr = self.alloc(array_layout::<T>(len)?)?.cast::<T>();
        // SAFETY: room for `len` Ts was just allocated.
        unsafe { init_with(ptr, len, T::default) };
        Ok(ptr)
    }

    /// Temporary-generation variant of [`Pool::new_array`].
    pub fn new_array_temp<T: Default>(&self, len: usize) -> Result<NonNull<T>> {
        let ptr = self.alloc_temp(array_layout::<T>(len)?)?.cast::<T>();
        // SAFETY: room for `len` Ts was just allocated.
        unsafe { init_with(ptr, len, T::default) };
        Ok(ptr)
    }

    /// Allocate an array of `len` clones of `prototype` in the active
    /// generation.
    pub fn new_array_from<T: Clone>(&self, len: usize, prototype: &T) -> Result<NonNull<T>> {
        let ptr = self.alloc(array_layout::<T>(len)?)?.cast::<T>();
        // SAFETY: room for `len` Ts was just allocated.
        unsafe { init_with(ptr, len, || prototype.clone()) };
        Ok(ptr)
    }

    /// Temporary-generation variant of [`Pool::new_array_from`].
    pub fn new_array_from_temp<T: Clone>(&self, len: usize, prototype: &T) -> Result<NonNull<T>> {
        let ptr = self.alloc_temp(array_layout::<T>(len)?)?.cast::<T>();
        // SAFETY: room for `len` Ts was just allocated.
        unsafe { init_with(ptr, len, || prototype.clone()) };
        Ok(ptr)
    }
}

/// No-op free, provided for adapter compatibility.
///
/// Pool pointers stay valid until the generation that produced them is
/// released, regardless of how often they are "freed".
pub fn free<T: ?Sized>(_ptr: *mut T) {}

/// Run `T`'s destructor in place without releasing its bytes.
///
/// # Safety
///
/// `ptr` must come from a typed constructor on a generation that has not yet
/// been released, and the object must not be destroyed twice or used again.
pub unsafe fn destroy_object<T>(ptr: NonNull<T>) {
    unsafe { ptr::drop_in_place(ptr.as_ptr()) };
}

/// Run the destructors of an array built by [`Pool::new_array`] or
/// [`Pool::new_array_from`] without releasing its bytes.
///
/// # Safety
///
/// Same rules as [`destroy_object`], and `len` must be the constructed
/// length.
pub unsafe fn destroy_array<T>(ptr: NonNull<T>, len: usize) {
    unsafe { ptr::drop_in_place(ptr::slice_from_raw_parts_mut(ptr.as_ptr(), len)) };
}
