//! Benchmark workloads for rcgc.
//!
//! Each workload builds its own registry so runs are independent:
//!
//! - [`churn`]: clone and drop handles over a small pool of allocations
//! - [`populate_dead`]: fill a deferred registry with dead entries to sweep
//! - [`sum_array`]: walk a tracked array through its cursor

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use rcgc::{Registry, RegistryConfig, TrackError, Tracked};

/// Elements per tracked array in the array workloads.
pub const ARRAY_LEN: usize = 256;

/// Allocate `pool` scalars, then clone and drop handles `rounds` times,
/// cycling through the pool. Returns the registry's entry count at the end.
pub fn churn(pool: usize, rounds: usize) -> Result<usize, TrackError> {
    let registry: Registry<u64> = Registry::new();
    let handles = (0..pool as u64)
        .map(|i| Tracked::new(&registry, i))
        .collect::<Result<Vec<_>, _>>()?;
    for round in 0..rounds {
        if let Some(handle) = handles.get(round % pool.max(1)) {
            let copy = handle.clone();
            drop(copy);
        }
    }
    Ok(registry.len())
}

/// A deferred registry holding `count` array entries, all dead.
pub fn populate_dead(count: usize) -> Result<Registry<u64, ARRAY_LEN>, TrackError> {
    let registry = Registry::with_config(RegistryConfig::deferred());
    for i in 0..count {
        let handle = Tracked::try_from_fn(&registry, |j| (i * ARRAY_LEN + j) as u64)?;
        drop(handle);
    }
    Ok(registry)
}

/// A tracked array of `ARRAY_LEN` ascending values.
pub fn ascending_array(
    registry: &Registry<u64, ARRAY_LEN>,
) -> Result<Tracked<u64, ARRAY_LEN>, TrackError> {
    Tracked::try_from_fn(registry, |i| i as u64)
}

/// Sum the array by stepping a cursor from begin to end.
pub fn sum_array(handle: &Tracked<u64, ARRAY_LEN>) -> Result<u64, TrackError> {
    let mut cursor = handle.begin()?;
    let mut total = 0;
    while !cursor.is_at_end() {
        total += *cursor.get()?;
        cursor.advance()?;
    }
    Ok(total)
}
