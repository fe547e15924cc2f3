//! Reference-counted tracking and deferred release of manual heap
//! allocations.
//!
//! Handles ([`Tracked`]) count how many of them refer to each allocation;
//! a per-family [`Registry`] owns the allocations and frees those nobody
//! references during a collection pass. This is reference counting with
//! deferred release, not a tracing collector: cycles are never reclaimed.
//!
//! # Architecture
//!
//! ```text
//! Registry<T, N> (Rc, one table per family)
//! ├── RegistryState: IndexMap<address, Slot>
//! │   └── Slot { Block::Scalar | Block::Array { len }, refcount }
//! ├── epoch (advanced by forced shutdown, invalidates older bindings)
//! └── RegistryConfig (collect on release, initial capacity)
//!
//! Tracked<T, N> ──▶ Registry<T, N> + Binding { ptr, epoch }
//!   └── Cursor<'_, T> (bounds-checked walk over the region)
//!
//! thread-local family table ── Registry::global() per (T, N)
//!   └── process-exit hook, installed once per family
//! ```
//!
//! # Families
//!
//! `N == 0` tracks single values released as `Box<T>`; `N > 0` tracks
//! arrays of exactly `N` elements released as `Box<[T]>`. The release path
//! is picked by the entry's [`Shape`], never by a separate flag.
//!
//! # Collection
//!
//! Dropping a handle decrements its entry and, unless configured
//! otherwise, runs [`Registry::collect`]. A sweep releases every dead entry,
//! including entries killed by element destructors during the same sweep.
//! Reassigning a handle only decrements; the old allocation waits for the
//! next pass.
//!
//! # Safety
//!
//! Unsafe code lives in `raw`, `registry`, `handle`, `global` and `exit`,
//! each opting in at module level. The public unsafe surface is adopting a
//! raw address ([`Tracked::from_raw`], [`Tracked::assign_raw`]) and forcing
//! a shutdown ([`Registry::shutdown`]).

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod config;
pub mod cursor;
pub mod entry;
pub mod error;
mod exit;
mod global;
pub mod handle;
mod raw;
pub mod registry;

// Public re-exports for the primary API surface.
pub use config::RegistryConfig;
pub use cursor::Cursor;
pub use entry::{EntryInfo, Shape};
pub use error::TrackError;
pub use handle::Tracked;
pub use registry::Registry;
