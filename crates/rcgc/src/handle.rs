//! Reference-counted handles over tracked allocations.
//!
//! A [`Tracked<T, N>`] is bound to at most one allocation of its family.
//! It never owns memory itself: the registry entry for the address does,
//! and the entry's count is the number of handles bound to it. Cloning,
//! reassigning, and dropping handles adjust that count; dropping also runs
//! a collection pass.
//!
//! A handle starts [`Binding::Empty`] and only touches the registry once
//! it is bound, so construction never inspects an address that was never
//! assigned.

#![allow(unsafe_code)]

use std::fmt;
use std::ops::{Deref, Index};
use std::ptr::{self, NonNull};

use crate::cursor::Cursor;
use crate::entry::Shape;
use crate::error::TrackError;
use crate::raw::{self, address_of};
use crate::registry::Registry;

/// What a handle currently refers to.
enum Binding<T> {
    Empty,
    /// Bound to `ptr` since registry epoch `epoch`.
    Bound { ptr: NonNull<T>, epoch: u64 },
}

impl<T> Clone for Binding<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Binding<T> {}

/// A reference-counted handle to a tracked scalar (`N == 0`) or array of
/// `N` elements.
///
/// Handles are `!Send` and `!Sync`, like the registry they point into.
pub struct Tracked<T, const N: usize = 0> {
    registry: Registry<T, N>,
    binding: Binding<T>,
}

impl<T, const N: usize> Tracked<T, N> {
    const SHAPE: Shape = Shape::of_family(N);

    const SIZED: () = assert!(
        std::mem::size_of::<T>() != 0,
        "zero-sized types have no distinct addresses to track"
    );
    const SCALAR: () = assert!(N == 0, "scalar constructors need a scalar family (N = 0)");
    const ARRAY: () = assert!(N > 0, "array constructors need an array family (N > 0)");

    /// A handle bound to nothing.
    pub fn empty(registry: &Registry<T, N>) -> Self {
        Self {
            registry: registry.clone(),
            binding: Binding::Empty,
        }
    }

    /// Start tracking the raw allocation at `address`.
    ///
    /// If `address` is already tracked by `registry`, the new handle shares
    /// its entry; otherwise a new entry with a count of one is registered.
    ///
    /// # Errors
    ///
    /// [`TrackError::NullAddress`] if `address` is null.
    ///
    /// # Safety
    ///
    /// Either `address` is already tracked by `registry`, or it comes from
    /// `Box::<T>::into_raw` (scalar family) or is the data pointer of a
    /// `Box<[T]>` / `Box<[T; N]>` of exactly `N` elements (array family),
    /// and the caller gives up ownership of it.
    ///
    /// When `address` is already tracked, no `&mut` borrow obtained through
    /// [`Tracked::as_mut_slice`], [`Tracked::get_mut`] or
    /// [`Tracked::element_mut`] on a handle to it may be alive.
    pub unsafe fn from_raw(registry: &Registry<T, N>, address: *mut T) -> Result<Self, TrackError> {
        let () = Self::SIZED;
        let ptr = NonNull::new(address).ok_or(TrackError::NullAddress)?;
        let mut handle = Self::empty(registry);
        // SAFETY: forwarded from the caller.
        unsafe { handle.rebind(ptr)? };
        Ok(handle)
    }

    /// Move `value` to the heap and track it.
    ///
    /// # Errors
    ///
    /// [`TrackError::AllocationFailed`] if the allocator refuses.
    pub fn new(registry: &Registry<T, N>, value: T) -> Result<Self, TrackError> {
        let () = Self::SCALAR;
        let () = Self::SIZED;
        let ptr = raw::alloc_scalar(value)?;
        // SAFETY: fresh `Box<T>`-compatible allocation, owned by nobody else.
        unsafe { Self::from_raw(registry, ptr.as_ptr()) }
    }

    /// Track an existing boxed value.
    pub fn from_box(registry: &Registry<T, N>, value: Box<T>) -> Result<Self, TrackError> {
        let () = Self::SCALAR;
        let () = Self::SIZED;
        let address = Box::into_raw(value);
        // SAFETY: `address` came from `Box::into_raw` and is given up here.
        unsafe { Self::from_raw(registry, address) }
    }

    /// Track an existing boxed array.
    pub fn from_array(registry: &Registry<T, N>, items: Box<[T; N]>) -> Result<Self, TrackError> {
        let () = Self::ARRAY;
        let () = Self::SIZED;
        let address = Box::into_raw(items).cast::<T>();
        // SAFETY: data pointer of a `Box<[T; N]>`, given up here.
        unsafe { Self::from_raw(registry, address) }
    }

    /// Track an existing boxed slice of exactly `N` elements.
    ///
    /// # Errors
    ///
    /// [`TrackError::LengthMismatch`] if `items.len() != N`. The slice is
    /// dropped in that case.
    pub fn from_boxed_slice(registry: &Registry<T, N>, items: Box<[T]>) -> Result<Self, TrackError> {
        let () = Self::ARRAY;
        let () = Self::SIZED;
        if items.len() != N {
            return Err(TrackError::LengthMismatch {
                expected: N,
                actual: items.len(),
            });
        }
        let ptr = raw::leak_slice(items);
        // SAFETY: data pointer of a `Box<[T]>` of `N` elements, given up here.
        unsafe { Self::from_raw(registry, ptr.as_ptr()) }
    }

    /// Allocate `N` elements, filling slot `i` with `fill(i)`, and track
    /// them.
    ///
    /// # Errors
    ///
    /// [`TrackError::AllocationFailed`] if the allocator refuses.
    pub fn try_from_fn(
        registry: &Registry<T, N>,
        fill: impl FnMut(usize) -> T,
    ) -> Result<Self, TrackError> {
        let () = Self::ARRAY;
        let () = Self::SIZED;
        let ptr = raw::alloc_array(N, fill)?;
        // SAFETY: fresh `Box<[T]>` of `N` elements, owned by nobody else.
        unsafe { Self::from_raw(registry, ptr.as_ptr()) }
    }

    /// Rebind this handle to the raw allocation at `address` and return
    /// that address.
    ///
    /// The previous allocation loses one reference; it is not collected
    /// until the next collection pass.
    ///
    /// # Errors
    ///
    /// [`TrackError::NullAddress`] if `address` is null; the handle keeps
    /// its previous binding in that case.
    ///
    /// # Safety
    ///
    /// Same contract as [`Tracked::from_raw`].
    pub unsafe fn assign_raw(&mut self, address: *mut T) -> Result<*mut T, TrackError> {
        let ptr = NonNull::new(address).ok_or(TrackError::NullAddress)?;
        // SAFETY: forwarded from the caller.
        unsafe { self.rebind(ptr)? };
        Ok(address)
    }

    /// Rebind this handle to a freshly allocated `value` and return its
    /// address.
    pub fn assign(&mut self, value: T) -> Result<*mut T, TrackError> {
        let () = Self::SCALAR;
        let () = Self::SIZED;
        let ptr = raw::alloc_scalar(value)?;
        // SAFETY: fresh `Box<T>`-compatible allocation, owned by nobody else.
        unsafe { self.assign_raw(ptr.as_ptr()) }
    }

    /// Rebind this handle to a boxed array and return its address.
    pub fn assign_array(&mut self, items: Box<[T; N]>) -> Result<*mut T, TrackError> {
        let () = Self::ARRAY;
        let () = Self::SIZED;
        let address = Box::into_raw(items).cast::<T>();
        // SAFETY: data pointer of a `Box<[T; N]>`, given up here.
        unsafe { self.assign_raw(address) }
    }

    /// Rebind this handle to whatever `other` is bound to.
    ///
    /// The handle also moves to `other`'s registry. If `other` is empty or
    /// stale, this handle ends up empty.
    pub fn assign_from(&mut self, other: &Self) {
        let source = other.live_ptr();
        self.unbind();
        self.registry = other.registry.clone();
        if let Some(ptr) = source {
            self.share(ptr);
        }
    }

    /// Shared view of the tracked region: one element for scalars, `N`
    /// for arrays.
    ///
    /// # Errors
    ///
    /// [`TrackError::EmptyHandle`] or [`TrackError::StaleHandle`].
    pub fn as_slice(&self) -> Result<&[T], TrackError> {
        let ptr = self.current_ptr()?;
        // SAFETY: a current-epoch binding holds one of the entry's counts,
        // so the allocation cannot be swept while `self` is borrowed.
        // Mutable views need `&mut self` and sole ownership.
        Ok(unsafe { raw::region(ptr, Self::SHAPE.element_count()) })
    }

    /// Mutable view of the tracked region, available only while this is
    /// the sole handle to the allocation.
    ///
    /// # Errors
    ///
    /// [`TrackError::SharedAllocation`] if other handles alias it, plus the
    /// errors of [`Tracked::as_slice`].
    pub fn as_mut_slice(&mut self) -> Result<&mut [T], TrackError> {
        let ptr = self.current_ptr()?;
        let refcount = self.registry.refcount_of(address_of(ptr)).unwrap_or(0);
        if refcount != 1 {
            return Err(TrackError::SharedAllocation { refcount });
        }
        // SAFETY: this handle holds the only count, and `&mut self`
        // excludes every other borrow obtained through it.
        Ok(unsafe { raw::region_mut(ptr, Self::SHAPE.element_count()) })
    }

    /// The referenced value (element 0 for arrays).
    pub fn get(&self) -> Result<&T, TrackError> {
        Ok(&self.as_slice()?[0])
    }

    /// Mutable access to the referenced value, sole owner only.
    pub fn get_mut(&mut self) -> Result<&mut T, TrackError> {
        Ok(&mut self.as_mut_slice()?[0])
    }

    /// Element `index` of a tracked array.
    ///
    /// # Errors
    ///
    /// [`TrackError::NotAnArray`] for scalar families,
    /// [`TrackError::IndexOutOfBounds`] for `index >= N`.
    pub fn element(&self, index: usize) -> Result<&T, TrackError> {
        let region = self.array_region()?;
        region
            .get(index)
            .ok_or(TrackError::IndexOutOfBounds { index, len: N })
    }

    /// Mutable element `index` of a tracked array, sole owner only.
    pub fn element_mut(&mut self, index: usize) -> Result<&mut T, TrackError> {
        if !Self::SHAPE.is_array() {
            return Err(TrackError::NotAnArray);
        }
        self.as_mut_slice()?
            .get_mut(index)
            .ok_or(TrackError::IndexOutOfBounds { index, len: N })
    }

    /// Cursor at the first element of the region.
    pub fn begin(&self) -> Result<Cursor<'_, T>, TrackError> {
        Ok(Cursor::begin(self.as_slice()?))
    }

    /// Cursor one past the last element of the region.
    pub fn end(&self) -> Result<Cursor<'_, T>, TrackError> {
        Ok(Cursor::end(self.as_slice()?))
    }

    /// Address this handle is bound to, or null when empty or stale.
    pub fn as_ptr(&self) -> *const T {
        self.live_ptr()
            .map_or(ptr::null(), |ptr| ptr.as_ptr().cast_const())
    }

    /// Whether the handle refers to no usable allocation.
    pub fn is_empty(&self) -> bool {
        self.live_ptr().is_none()
    }

    /// Number of handles sharing this handle's allocation, 0 when empty or
    /// stale.
    pub fn refcount(&self) -> usize {
        self.live_ptr()
            .and_then(|ptr| self.registry.refcount_of(address_of(ptr)))
            .unwrap_or(0)
    }

    /// Whether both handles are bound to the same allocation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self.live_ptr(), other.live_ptr()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Layout of allocations in this family.
    pub const fn shape(&self) -> Shape {
        Self::SHAPE
    }

    /// Whether this family tracks arrays.
    pub const fn is_array(&self) -> bool {
        Self::SHAPE.is_array()
    }

    /// `N` for array families, 0 for scalars.
    pub const fn array_size(&self) -> usize {
        Self::SHAPE.array_size()
    }

    /// The registry this handle counts against.
    pub fn registry(&self) -> &Registry<T, N> {
        &self.registry
    }

    fn array_region(&self) -> Result<&[T], TrackError> {
        if !Self::SHAPE.is_array() {
            return Err(TrackError::NotAnArray);
        }
        self.as_slice()
    }

    fn current_ptr(&self) -> Result<NonNull<T>, TrackError> {
        match self.binding {
            Binding::Empty => Err(TrackError::EmptyHandle),
            Binding::Bound { ptr, epoch } => {
                let current = self.registry.epoch();
                if epoch == current {
                    Ok(ptr)
                } else {
                    Err(TrackError::StaleHandle {
                        handle_epoch: epoch,
                        registry_epoch: current,
                    })
                }
            }
        }
    }

    fn live_ptr(&self) -> Option<NonNull<T>> {
        self.current_ptr().ok()
    }

    /// Bind an empty handle to an address its registry already tracks.
    fn share(&mut self, ptr: NonNull<T>) {
        if self.registry.retain(address_of(ptr)).is_some() {
            self.binding = Binding::Bound {
                ptr,
                epoch: self.registry.epoch(),
            };
        }
    }

    /// Give up the current binding without collecting.
    fn unbind(&mut self) {
        if let Some(ptr) = self.live_ptr() {
            self.registry.release(address_of(ptr));
        }
        self.binding = Binding::Empty;
    }

    /// # Safety
    ///
    /// Same contract as [`Tracked::from_raw`].
    unsafe fn rebind(&mut self, ptr: NonNull<T>) -> Result<(), TrackError> {
        self.unbind();
        // SAFETY: forwarded from the caller.
        unsafe { self.registry.attach(ptr)? };
        self.binding = Binding::Bound {
            ptr,
            epoch: self.registry.epoch(),
        };
        Ok(())
    }
}

impl<T, const N: usize> Clone for Tracked<T, N> {
    /// A new handle sharing this one's allocation. Cloning an empty or
    /// stale handle yields an empty one.
    fn clone(&self) -> Self {
        let mut copy = Self::empty(&self.registry);
        if let Some(ptr) = self.live_ptr() {
            copy.share(ptr);
        }
        copy
    }

    fn clone_from(&mut self, source: &Self) {
        self.assign_from(source);
    }
}

impl<T, const N: usize> Drop for Tracked<T, N> {
    fn drop(&mut self) {
        self.unbind();
        if self.registry.collect_on_release() {
            self.registry.collect();
        }
    }
}

impl<T, const N: usize> Deref for Tracked<T, N> {
    type Target = T;

    /// # Panics
    ///
    /// Panics if the handle is empty or stale; see [`Tracked::get`].
    fn deref(&self) -> &T {
        match self.get() {
            Ok(value) => value,
            Err(err) => panic!("cannot dereference tracked handle: {err}"),
        }
    }
}

impl<T, const N: usize> Index<usize> for Tracked<T, N> {
    type Output = T;

    /// # Panics
    ///
    /// Panics on any error from [`Tracked::element`].
    fn index(&self, index: usize) -> &T {
        match self.element(index) {
            Ok(value) => value,
            Err(err) => panic!("cannot index tracked handle: {err}"),
        }
    }
}

impl<T: 'static, const N: usize> Default for Tracked<T, N> {
    /// An empty handle on the calling thread's global registry.
    fn default() -> Self {
        Self::empty(&Registry::global())
    }
}

impl<T, const N: usize> fmt::Debug for Tracked<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracked")
            .field("address", &self.as_ptr())
            .field("shape", &Self::SHAPE)
            .field("refcount", &self.refcount())
            .finish()
    }
}
