//! Low-level primitives for owned allocation blocks.
//!
//! This is the only module that turns addresses back into boxes or
//! borrowed slices. Every `unsafe` block carries a `// SAFETY:` comment
//! tying it to the adoption contract of [`Block::adopt`].

#![allow(unsafe_code)]

use std::alloc::{self, Layout};
use std::ptr::{self, NonNull};
use std::slice;

use crate::entry::Shape;
use crate::error::TrackError;

/// Sole owner of one tracked heap allocation.
///
/// Dropping a block releases the allocation through the path matching its
/// variant: `Box<T>` for scalars, `Box<[T]>` for arrays.
pub(crate) enum Block<T> {
    Scalar(NonNull<T>),
    Array { ptr: NonNull<T>, len: usize },
}

impl<T> Block<T> {
    /// Take ownership of the allocation at `ptr`.
    ///
    /// # Safety
    ///
    /// For [`Shape::Scalar`], `ptr` must be a `Box<T>` allocation (global
    /// allocator, `Layout::new::<T>()`) holding an initialised value. For
    /// [`Shape::Array`], it must be the data pointer of a `Box<[T]>` (or
    /// `Box<[T; len]>`) of exactly `len` initialised elements. No other
    /// owner may release it afterwards.
    pub(crate) unsafe fn adopt(ptr: NonNull<T>, shape: Shape) -> Self {
        match shape {
            Shape::Scalar => Self::Scalar(ptr),
            Shape::Array { len } => Self::Array { ptr, len },
        }
    }

    pub(crate) fn ptr(&self) -> NonNull<T> {
        match *self {
            Self::Scalar(ptr) | Self::Array { ptr, .. } => ptr,
        }
    }

    pub(crate) fn address(&self) -> usize {
        address_of(self.ptr())
    }

    pub(crate) fn shape(&self) -> Shape {
        match *self {
            Self::Scalar(_) => Shape::Scalar,
            Self::Array { len, .. } => Shape::Array { len },
        }
    }
}

impl<T> Drop for Block<T> {
    fn drop(&mut self) {
        match *self {
            Self::Scalar(ptr) => {
                // SAFETY: `adopt` guarantees a uniquely owned `Box<T>`.
                drop(unsafe { Box::from_raw(ptr.as_ptr()) });
            }
            Self::Array { ptr, len } => {
                let parts = ptr::slice_from_raw_parts_mut(ptr.as_ptr(), len);
                // SAFETY: `adopt` guarantees a uniquely owned `Box<[T]>` of
                // `len` elements.
                drop(unsafe { Box::from_raw(parts) });
            }
        }
    }
}

pub(crate) fn address_of<T>(ptr: NonNull<T>) -> usize {
    ptr.as_ptr().addr()
}

/// Heap-allocate `value` the way `Box::new` would, reporting allocator
/// failure instead of aborting.
///
/// `T` must not be zero-sized.
pub(crate) fn alloc_scalar<T>(value: T) -> Result<NonNull<T>, TrackError> {
    let layout = Layout::new::<T>();
    debug_assert!(layout.size() != 0, "zero-sized types are not tracked");
    // SAFETY: layout has nonzero size.
    let raw = unsafe { alloc::alloc(layout) }.cast::<T>();
    let Some(ptr) = NonNull::new(raw) else {
        return Err(TrackError::AllocationFailed {
            elements: 1,
            bytes: layout.size(),
        });
    };
    // SAFETY: freshly allocated with `T`'s layout, so aligned and writable.
    unsafe { ptr.as_ptr().write(value) };
    Ok(ptr)
}

/// Heap-allocate `len` elements produced by `fill`, reporting allocator
/// failure instead of aborting.
pub(crate) fn alloc_array<T>(
    len: usize,
    fill: impl FnMut(usize) -> T,
) -> Result<NonNull<T>, TrackError> {
    let mut items = Vec::new();
    items
        .try_reserve_exact(len)
        .map_err(|_| TrackError::AllocationFailed {
            elements: len,
            bytes: len.saturating_mul(std::mem::size_of::<T>()),
        })?;
    items.extend((0..len).map(fill));
    Ok(leak_slice(items.into_boxed_slice()))
}

/// Give up a boxed slice and return its data pointer.
pub(crate) fn leak_slice<T>(items: Box<[T]>) -> NonNull<T> {
    NonNull::from(Box::leak(items)).cast::<T>()
}

/// Borrow `len` elements starting at `ptr`.
///
/// # Safety
///
/// `ptr` must point to `len` initialised elements that stay allocated and
/// unaliased by `&mut` for `'a`.
pub(crate) unsafe fn region<'a, T>(ptr: NonNull<T>, len: usize) -> &'a [T] {
    // SAFETY: upheld by the caller.
    unsafe { slice::from_raw_parts(ptr.as_ptr(), len) }
}

/// Mutably borrow `len` elements starting at `ptr`.
///
/// # Safety
///
/// As [`region`], and no other reference to those elements may exist for
/// `'a`.
pub(crate) unsafe fn region_mut<'a, T>(ptr: NonNull<T>, len: usize) -> &'a mut [T] {
    // SAFETY: upheld by the caller.
    unsafe { slice::from_raw_parts_mut(ptr.as_ptr(), len) }
}
