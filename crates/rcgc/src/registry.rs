//! Per-family allocation registry and the sweep pass.
//!
//! A [`Registry<T, N>`] maps allocation addresses to tracking entries for
//! one family: element type `T` with fixed array size `N` (`N == 0` for
//! scalars). Handles adjust entry counts; entries whose count reaches zero
//! are dead and wait for the next [`Registry::sweep`].
//!
//! The registry is a cheap `Rc` handle. Every [`Tracked`](crate::Tracked)
//! keeps its registry alive, so the table outlives all handles into it.

#![allow(unsafe_code)]

use std::any::type_name;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::ptr::NonNull;
use std::rc::Rc;

use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::{debug, info, trace};

use crate::config::RegistryConfig;
use crate::entry::{EntryInfo, Shape};
use crate::error::TrackError;
use crate::raw::{address_of, Block};

/// A tracking entry: the owned allocation plus its handle count.
struct Slot<T> {
    block: Block<T>,
    refcount: usize,
}

impl<T> Slot<T> {
    fn info(&self) -> EntryInfo {
        EntryInfo {
            address: self.block.address(),
            refcount: self.refcount,
            shape: self.block.shape(),
        }
    }
}

/// The entry table behind a registry.
///
/// Keyed by address; iteration follows registration order so listings are
/// stable between calls.
pub(crate) struct RegistryState<T> {
    slots: IndexMap<usize, Slot<T>>,
}

impl<T> RegistryState<T> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: IndexMap::with_capacity(capacity),
        }
    }

    pub(crate) fn find(&self, address: usize) -> Option<EntryInfo> {
        self.slots.get(&address).map(Slot::info)
    }

    /// Insert a fresh entry with a count of one.
    ///
    /// Callers must `find` first. A duplicate is reported and the incoming
    /// block is forgotten, since the existing entry already owns that
    /// allocation.
    pub(crate) fn register(&mut self, block: Block<T>) -> Result<EntryInfo, TrackError> {
        let address = block.address();
        if self.slots.contains_key(&address) {
            std::mem::forget(block);
            return Err(TrackError::AlreadyTracked { address });
        }
        let slot = Slot { block, refcount: 1 };
        let info = slot.info();
        self.slots.insert(address, slot);
        Ok(info)
    }

    /// Returns the new count, or `None` if the address is untracked.
    pub(crate) fn increment(&mut self, address: usize) -> Option<usize> {
        let slot = self.slots.get_mut(&address)?;
        slot.refcount += 1;
        Some(slot.refcount)
    }

    /// Returns the new count, or `None` if the address is untracked.
    /// A count that is already zero stays zero.
    pub(crate) fn decrement(&mut self, address: usize) -> Option<usize> {
        let slot = self.slots.get_mut(&address)?;
        if slot.refcount > 0 {
            slot.refcount -= 1;
        }
        Some(slot.refcount)
    }

    /// Remove every dead entry and hand back their blocks.
    ///
    /// Blocks are returned rather than dropped so element destructors run
    /// after the caller has released its borrow of the table.
    pub(crate) fn take_dead(&mut self) -> SmallVec<[Block<T>; 4]> {
        let dead: SmallVec<[usize; 8]> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.refcount == 0)
            .map(|(&address, _)| address)
            .collect();
        dead.iter()
            .filter_map(|address| self.slots.shift_remove(address))
            .map(|slot| slot.block)
            .collect()
    }

    /// Force every count to zero. Returns how many entries were still live.
    pub(crate) fn zero_all(&mut self) -> usize {
        let mut live = 0;
        for slot in self.slots.values_mut() {
            if slot.refcount > 0 {
                live += 1;
                slot.refcount = 0;
            }
        }
        live
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn entries(&self) -> Vec<EntryInfo> {
        self.slots.values().map(Slot::info).collect()
    }
}

struct RegistryCore<T> {
    state: RefCell<RegistryState<T>>,
    /// Advanced by every forced shutdown; bindings from older epochs are
    /// stale.
    epoch: Cell<u64>,
    config: RegistryConfig,
}

impl<T> Drop for RegistryCore<T> {
    fn drop(&mut self) {
        let remaining = self.state.get_mut().len();
        if remaining > 0 {
            debug!(
                family = type_name::<T>(),
                remaining, "registry dropped, releasing remaining allocations"
            );
        }
    }
}

/// Shared table of tracking entries for the `(T, N)` family.
///
/// Cloning a registry shares the table. Not thread-safe: a registry and
/// its handles stay on the thread that created them.
pub struct Registry<T, const N: usize = 0> {
    core: Rc<RegistryCore<T>>,
}

impl<T, const N: usize> Registry<T, N> {
    /// Create an empty registry with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create an empty registry with the given configuration.
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            core: Rc::new(RegistryCore {
                state: RefCell::new(RegistryState::with_capacity(config.initial_capacity)),
                epoch: Cell::new(0),
                config,
            }),
        }
    }

    /// The configuration this registry was created with.
    pub fn config(&self) -> &RegistryConfig {
        &self.core.config
    }

    /// Shape every allocation in this family has.
    pub const fn shape() -> Shape {
        Shape::of_family(N)
    }

    /// Number of entries currently in the table, dead ones included.
    pub fn len(&self) -> usize {
        self.core.state.borrow().len()
    }

    /// Whether the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every entry, in registration order.
    ///
    /// Read-only: no collection happens as a side effect.
    pub fn entries(&self) -> Vec<EntryInfo> {
        self.core.state.borrow().entries()
    }

    /// Look up the entry for `address`.
    pub fn find(&self, address: *const T) -> Option<EntryInfo> {
        self.core.state.borrow().find(address.addr())
    }

    /// Release every dead entry. Returns how many allocations were freed.
    ///
    /// Element destructors run after the table borrow ends and may drop
    /// further handles, killing more entries; the pass repeats until a scan
    /// finds nothing dead, so every allocation that is dead by the time
    /// this returns has been freed.
    pub fn sweep(&self) -> usize {
        let mut freed = 0;
        loop {
            let dead = self.core.state.borrow_mut().take_dead();
            if dead.is_empty() {
                break;
            }
            freed += dead.len();
            drop(dead);
        }
        if freed > 0 {
            debug!(
                family = type_name::<T>(),
                array_size = N,
                freed,
                remaining = self.len(),
                "sweep released allocations"
            );
        }
        freed
    }

    /// Run a collection pass. Returns `true` if at least one allocation
    /// was freed by this call.
    pub fn collect(&self) -> bool {
        self.sweep() > 0
    }

    /// Force every entry's count to zero and sweep.
    ///
    /// All handles bound before the call become stale: their accessors
    /// return [`TrackError::StaleHandle`] and their drops are no-ops.
    /// Returns how many allocations were freed.
    ///
    /// # Safety
    ///
    /// No reference obtained from a handle of this registry (through
    /// `get`, `as_slice`, a cursor, `Deref`, ...) may be alive, since the
    /// memory behind it is released.
    pub unsafe fn shutdown(&self) -> usize {
        let live = self.core.state.borrow_mut().zero_all();
        self.core.epoch.set(self.core.epoch.get() + 1);
        let freed = self.sweep();
        if freed > 0 {
            info!(
                family = type_name::<T>(),
                array_size = N,
                live,
                freed,
                "forced shutdown released outstanding allocations"
            );
        }
        freed
    }

    /// Whether two registries share the same table.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.core, &other.core)
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.core.epoch.get()
    }

    pub(crate) fn collect_on_release(&self) -> bool {
        self.core.config.collect_on_release
    }

    pub(crate) fn refcount_of(&self, address: usize) -> Option<usize> {
        self.core.state.borrow().find(address).map(|info| info.refcount)
    }

    /// Count one more handle for `ptr`, registering it if untracked.
    ///
    /// # Safety
    ///
    /// If `ptr` is untracked it must satisfy [`Block::adopt`] for this
    /// family's shape; ownership moves into the registry.
    pub(crate) unsafe fn attach(&self, ptr: NonNull<T>) -> Result<usize, TrackError> {
        let address = address_of(ptr);
        let mut state = self.core.state.borrow_mut();
        if let Some(refcount) = state.increment(address) {
            trace!(
                family = type_name::<T>(),
                address = format_args!("{address:#x}"),
                refcount,
                "attached to tracked allocation"
            );
            return Ok(refcount);
        }
        // SAFETY: untracked, so the caller's adoption contract applies.
        let block = unsafe { Block::adopt(ptr, Self::shape()) };
        let info = state.register(block)?;
        trace!(
            family = type_name::<T>(),
            address = format_args!("{address:#x}"),
            shape = %info.shape,
            "registered allocation"
        );
        Ok(info.refcount)
    }

    /// Count one more handle for an already tracked address.
    pub(crate) fn retain(&self, address: usize) -> Option<usize> {
        let refcount = self.core.state.borrow_mut().increment(address);
        trace!(
            family = type_name::<T>(),
            address = format_args!("{address:#x}"),
            ?refcount,
            "retained"
        );
        refcount
    }

    /// Count one handle fewer. A miss or a zero count is a no-op.
    pub(crate) fn release(&self, address: usize) -> Option<usize> {
        let refcount = self.core.state.borrow_mut().decrement(address);
        trace!(
            family = type_name::<T>(),
            address = format_args!("{address:#x}"),
            ?refcount,
            "released"
        );
        refcount
    }
}

impl<T, const N: usize> Clone for Registry<T, N> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
        }
    }
}

impl<T, const N: usize> Default for Registry<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> fmt::Debug for Registry<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("family", &type_name::<T>())
            .field("array_size", &N)
            .field("len", &self.len())
            .field("epoch", &self.epoch())
            .finish()
    }
}
