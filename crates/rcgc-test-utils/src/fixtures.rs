//! Drop-counting element fixtures.
//!
//! - [`DropLedger`]: shared counter of dropped probes.
//! - [`Probe`]: an element that records its own drop in a ledger.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared count of dropped [`Probe`]s.
///
/// Cloning a ledger shares the counter. Uses `AtomicUsize` so probes can
/// be created on one thread and observed from another.
#[derive(Clone, Default)]
pub struct DropLedger {
    dropped: Arc<AtomicUsize>,
}

impl DropLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a probe carrying `value` that reports to this ledger.
    pub fn probe(&self, value: i64) -> Probe {
        Probe {
            value,
            ledger: Arc::clone(&self.dropped),
        }
    }

    /// `len` probes with values `0..len`.
    pub fn probes(&self, len: usize) -> Vec<Probe> {
        (0..len).map(|i| self.probe(i as i64)).collect()
    }

    /// How many probes from this ledger have been dropped.
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for DropLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DropLedger")
            .field("dropped", &self.dropped())
            .finish()
    }
}

/// An element that increments its ledger exactly once when dropped.
pub struct Probe {
    pub value: i64,
    ledger: Arc<AtomicUsize>,
}

impl Drop for Probe {
    fn drop(&mut self) {
        self.ledger.fetch_add(1, Ordering::SeqCst);
    }
}

impl fmt::Debug for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Probe({})", self.value)
    }
}
