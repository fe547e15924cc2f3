//! Test utilities for rcgc development.
//!
//! Tracked allocations are released by the registry, not by the test, so
//! tests observe release through element destructors. A [`DropLedger`]
//! counts how many [`Probe`] elements have been dropped.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

pub use fixtures::{DropLedger, Probe};
