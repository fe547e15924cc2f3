//! End-to-end handle lifecycles: sharing, reassignment, cascading release
//! and forced shutdown, observed through drop ledgers.

use rcgc::{Registry, RegistryConfig, Shape, TrackError, Tracked};
use rcgc_test_utils::{DropLedger, Probe};

/// A list node whose successor lives in the same family.
struct Node {
    _probe: Probe,
    next: Option<Tracked<Node>>,
}

fn chain(registry: &Registry<Node>, ledger: &DropLedger, len: usize) -> Tracked<Node> {
    let mut head: Option<Tracked<Node>> = None;
    for i in 0..len {
        let node = Node {
            _probe: ledger.probe(i as i64),
            next: head.take(),
        };
        head = Some(Tracked::new(registry, node).unwrap());
    }
    head.unwrap()
}

#[test]
fn shared_array_is_released_with_its_last_handle() {
    let ledger = DropLedger::new();
    let registry: Registry<Probe, 5> = Registry::new();

    let items = ledger.probes(5).into_boxed_slice();
    let a = Tracked::from_boxed_slice(&registry, items).unwrap();
    let entries = registry.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].refcount, 1);
    assert_eq!(entries[0].shape, Shape::Array { len: 5 });

    let b = a.clone();
    assert_eq!(registry.entries()[0].refcount, 2);

    drop(b);
    assert_eq!(registry.entries()[0].refcount, 1);
    assert_eq!(ledger.dropped(), 0);

    drop(a);
    assert!(registry.is_empty());
    assert_eq!(ledger.dropped(), 5);
}

#[test]
fn reassigned_allocation_is_swept_on_next_collection() {
    let ledger = DropLedger::new();
    let registry: Registry<Probe> = Registry::new();

    let mut p = Tracked::new(&registry, ledger.probe(1)).unwrap();
    let x = p.as_ptr();
    let y = p.assign(ledger.probe(2)).unwrap();

    assert_eq!(registry.find(x).map(|e| e.refcount), Some(0));
    assert_eq!(registry.find(y).map(|e| e.refcount), Some(1));

    // Any later drop triggers the pass that frees X.
    drop(Tracked::new(&registry, ledger.probe(3)).unwrap());
    assert!(registry.find(x).is_none());
    assert_eq!(ledger.dropped(), 2);
    assert_eq!(p.value, 2);
}

#[test]
fn forced_shutdown_frees_shared_allocation_once() {
    let ledger = DropLedger::new();
    let registry: Registry<Probe> = Registry::new();
    let a = Tracked::new(&registry, ledger.probe(1)).unwrap();
    let b = a.clone();
    assert_eq!(a.refcount(), 2);

    // SAFETY: no references into the tracked values are alive.
    let freed = unsafe { registry.shutdown() };
    assert_eq!(freed, 1);
    assert_eq!(ledger.dropped(), 1);
    assert!(registry.is_empty());

    drop(a);
    drop(b);
    assert_eq!(ledger.dropped(), 1);
}

#[test]
fn stale_handles_report_errors_instead_of_data() {
    let registry: Registry<u32, 2> = Registry::new();
    let a = Tracked::from_array(&registry, Box::new([1, 2])).unwrap();
    // SAFETY: no references into the tracked values are alive.
    unsafe { registry.shutdown() };
    assert!(matches!(a.as_slice(), Err(TrackError::StaleHandle { .. })));
    assert!(matches!(a.begin(), Err(TrackError::StaleHandle { .. })));
    assert!(a.clone().is_empty());
}

#[test]
fn nested_handles_are_released_in_one_sweep() {
    let ledger = DropLedger::new();
    let registry: Registry<Node> = Registry::with_config(RegistryConfig::deferred());
    let head = chain(&registry, &ledger, 4);
    assert_eq!(registry.len(), 4);

    drop(head);
    assert_eq!(registry.sweep(), 4);
    assert!(registry.is_empty());
    assert_eq!(ledger.dropped(), 4);
}

#[test]
fn nested_handles_cascade_on_drop() {
    let ledger = DropLedger::new();
    let registry: Registry<Node> = Registry::new();
    let head = chain(&registry, &ledger, 3);
    let tail_alias = head.next.as_ref().unwrap().clone();

    drop(head);
    assert_eq!(ledger.dropped(), 1);
    assert_eq!(registry.len(), 2);

    drop(tail_alias);
    assert_eq!(ledger.dropped(), 3);
    assert!(registry.is_empty());
}

#[test]
fn cross_family_elements_release_inner_handles() {
    let ledger = DropLedger::new();
    let inner: Registry<Probe, 2> = Registry::new();
    let outer: Registry<Tracked<Probe, 2>, 3> = Registry::new();

    let shared = Tracked::try_from_fn(&inner, |i| ledger.probe(i as i64)).unwrap();
    let holders = Tracked::try_from_fn(&outer, |_| shared.clone()).unwrap();
    assert_eq!(shared.refcount(), 4);

    drop(holders);
    assert_eq!(shared.refcount(), 1);
    drop(shared);
    assert_eq!(ledger.dropped(), 2);
    assert!(inner.is_empty() && outer.is_empty());
}

#[test]
fn counts_never_underflow_through_empty_assignments() {
    let registry: Registry<i64> = Registry::with_config(RegistryConfig::deferred());
    let mut a = Tracked::new(&registry, 1).unwrap();
    let empty = Tracked::empty(&registry);
    let address = a.as_ptr();

    for _ in 0..3 {
        a.assign_from(&empty);
        a.clone_from(&empty);
    }
    drop(a);
    drop(empty);

    let entry = registry.find(address).unwrap();
    assert_eq!(entry.refcount, 0);
    assert!(entry.is_dead());
    assert!(registry.collect());
    assert!(!registry.collect());
}

#[test]
fn cursor_walks_scalar_as_single_element() {
    let registry: Registry<char> = Registry::new();
    let p = Tracked::new(&registry, 'x').unwrap();
    let mut cursor = p.begin().unwrap();
    assert_eq!(cursor.upper_bound(), 1);
    assert_eq!(cursor.get(), Ok(&'x'));
    cursor.advance().unwrap();
    assert_eq!(cursor, p.end().unwrap());
    assert!(cursor.get().is_err());
}

#[test]
fn cursor_over_array_is_restartable() {
    let registry: Registry<u8, 4> = Registry::new();
    let p = Tracked::from_array(&registry, Box::new([4, 3, 2, 1])).unwrap();
    let first: Vec<u8> = p.begin().unwrap().copied().collect();
    let second: u32 = p.begin().unwrap().map(|&b| u32::from(b)).sum();
    assert_eq!(first, vec![4, 3, 2, 1]);
    assert_eq!(second, 10);
}

#[test]
fn default_handle_uses_thread_global_registry() {
    let handle: Tracked<u64, 3> = Tracked::default();
    assert!(handle.is_empty());
    assert!(handle.registry().ptr_eq(&Registry::<u64, 3>::global()));
    assert_eq!(handle.get(), Err(TrackError::EmptyHandle));
}
