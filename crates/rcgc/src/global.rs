//! Per-thread singleton registries, one per family.
//!
//! [`Registry::global`] hands out the calling thread's registry for a
//! `(T, N)` family, creating it on first use. The first creation of a
//! family anywhere in the process installs the exit hook for it.
//!
//! Teardown: when the owning thread exits, its family table forces a
//! shutdown of every registry it holds. At process exit the hook does the
//! same for the exiting thread if its table is still reachable. Whichever
//! runs first releases the memory; the other finds nothing left.

#![allow(unsafe_code)]

use std::any::{type_name, Any, TypeId};
use std::cell::RefCell;
use std::marker::PhantomData;

use tracing::debug;

use crate::error::TrackError;
use crate::exit;
use crate::registry::Registry;

/// Type-level key for the `(T, N)` family.
struct Family<T, const N: usize>(PhantomData<T>);

pub(crate) fn family_id<T: 'static, const N: usize>() -> TypeId {
    TypeId::of::<Family<T, N>>()
}

/// Object-safe view of a `Registry<T, N>` for the type-erased table.
trait FamilyRegistry {
    fn as_any(&self) -> &dyn Any;

    /// # Safety
    ///
    /// Same contract as [`Registry::shutdown`].
    unsafe fn force_shutdown(&self) -> usize;
}

impl<T: 'static, const N: usize> FamilyRegistry for Registry<T, N> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    unsafe fn force_shutdown(&self) -> usize {
        // SAFETY: forwarded from the caller.
        unsafe { self.shutdown() }
    }
}

struct FamilyTable {
    registries: Vec<(TypeId, Box<dyn FamilyRegistry>)>,
}

impl FamilyTable {
    const fn new() -> Self {
        Self {
            registries: Vec::new(),
        }
    }

    fn get<T: 'static, const N: usize>(&self) -> Option<Registry<T, N>> {
        let id = family_id::<T, N>();
        self.registries
            .iter()
            .find(|(family, _)| *family == id)
            .and_then(|(_, registry)| registry.as_any().downcast_ref::<Registry<T, N>>())
            .cloned()
    }
}

impl Drop for FamilyTable {
    fn drop(&mut self) {
        for (_, registry) in self.registries.drain(..) {
            // SAFETY: the owning thread is exiting; its stack frames, and
            // every borrow they held, are gone.
            unsafe { registry.force_shutdown() };
        }
    }
}

thread_local! {
    static FAMILIES: RefCell<FamilyTable> = const { RefCell::new(FamilyTable::new()) };
}

/// The calling thread's registry for `(T, N)`, created on first use.
pub(crate) fn registry<T: 'static, const N: usize>() -> Result<Registry<T, N>, TrackError> {
    let (registry, created) = FAMILIES
        .try_with(|table| {
            let mut table = table
                .try_borrow_mut()
                .map_err(|_| TrackError::RegistryUnavailable)?;
            if let Some(existing) = table.get::<T, N>() {
                return Ok((existing, false));
            }
            let registry = Registry::<T, N>::new();
            table
                .registries
                .push((family_id::<T, N>(), Box::new(registry.clone())));
            Ok((registry, true))
        })
        .map_err(|_| TrackError::RegistryUnavailable)??;

    if created {
        debug!(
            family = type_name::<T>(),
            array_size = N,
            "created global family registry"
        );
        exit::install::<T, N>();
    }
    Ok(registry)
}

/// Force a shutdown of the calling thread's `(T, N)` registry, if it still
/// exists. Returns how many allocations were freed.
///
/// # Safety
///
/// Same contract as [`Registry::shutdown`].
pub(crate) unsafe fn shutdown_family<T: 'static, const N: usize>() -> usize {
    let registry = FAMILIES
        .try_with(|table| table.try_borrow().ok().and_then(|t| t.get::<T, N>()))
        .ok()
        .flatten();
    match registry {
        // SAFETY: forwarded from the caller.
        Some(registry) => unsafe { registry.shutdown() },
        None => 0,
    }
}

impl<T: 'static, const N: usize> Registry<T, N> {
    /// The calling thread's shared registry for this family.
    ///
    /// Created with the default configuration on first use; the first
    /// creation in the process also installs a process-exit hook that
    /// forces a final shutdown of the family.
    ///
    /// # Panics
    ///
    /// Panics if called while the thread's family table is being torn
    /// down. Use [`Registry::try_global`] where that can happen.
    pub fn global() -> Self {
        match Self::try_global() {
            Ok(registry) => registry,
            Err(err) => panic!("global registry for {}: {err}", type_name::<T>()),
        }
    }

    /// Fallible form of [`Registry::global`].
    pub fn try_global() -> Result<Self, TrackError> {
        registry::<T, N>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::Tracked;
    use rcgc_test_utils::{DropLedger, Probe};
    use std::thread;

    #[test]
    fn global_is_shared_within_a_thread() {
        struct Marker(#[allow(dead_code)] u8);
        let a = Registry::<Marker>::global();
        let b = Registry::<Marker>::global();
        assert!(a.ptr_eq(&b));
    }

    #[test]
    fn array_sizes_get_separate_globals() {
        let scalar = Registry::<u16, 0>::global();
        let array = Registry::<u16, 4>::global();
        let _h = Tracked::<u16, 4>::from_array(&array, Box::new([1, 2, 3, 4])).unwrap();
        assert_eq!(array.len(), 1);
        assert!(scalar.is_empty());
    }

    #[test]
    fn each_thread_has_its_own_global() {
        let registry = Registry::<u32>::global();
        let _h = Tracked::new(&registry, 7u32).unwrap();
        let other_len = thread::spawn(|| Registry::<u32>::global().len())
            .join()
            .unwrap();
        assert_eq!(other_len, 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn thread_exit_forces_shutdown_of_leaked_handles() {
        let ledger = DropLedger::new();
        let observer = ledger.clone();
        thread::spawn(move || {
            let registry = Registry::<Probe>::global();
            let handle = Tracked::new(&registry, ledger.probe(1)).unwrap();
            let copy = handle.clone();
            std::mem::forget(handle);
            std::mem::forget(copy);
            assert_eq!(ledger.dropped(), 0);
        })
        .join()
        .unwrap();
        assert_eq!(observer.dropped(), 1);
    }

    #[test]
    fn shutdown_family_without_registry_frees_nothing() {
        struct Unused(#[allow(dead_code)] u8);
        // SAFETY: no registry exists for this family, nothing is released.
        assert_eq!(unsafe { shutdown_family::<Unused, 0>() }, 0);
    }
}
