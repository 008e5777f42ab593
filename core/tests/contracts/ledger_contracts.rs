// Binding Ledger Contract Tests
//
// These tests verify ledger invariants. The ledger is the audit record of
// every grant the service ever made; release annotates, deregistration
// cascades, but history is never rewritten.
//
// **Problem**: LLM "cleans up" released rows, or "helpfully" shrinks a
//              binding on partial release
// **Solution**: Contract tests that enforce append-mostly history and
//              exact-match release

use std::collections::BTreeMap;
use tempfile::TempDir;

use gatekeeper_core::{
    AuditLog, Binding, FileStore, GatekeeperError, Instance, LeaseStore, PortRange, PortSelector,
};

fn open_store(temp: &TempDir) -> FileStore {
    FileStore::open_at(
        temp.path().join("state.json"),
        temp.path().join("ledger.jsonl"),
        PortRange::new(8000, 8010).unwrap(),
    )
    .unwrap()
}

fn register(store: &FileStore, id: &str) {
    store
        .register_instance(Instance::new(id, id, BTreeMap::new()))
        .unwrap();
}

/// WHY: Released bindings stay in the ledger with released_at set
/// REASON: The ledger answers "who held port X last Tuesday" - deletion destroys that
/// BREAKS: Incident forensics and the full annotated port listing
/// SACRIFICES: If this fails, history is being rewritten
#[test]
fn release_annotates_history_instead_of_deleting_it() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    register(&store, "web-1");

    let binding = store.reserve("web-1", 1).unwrap();
    store.release(PortSelector::Port(8000), None).unwrap();

    let snapshot = store.snapshot().unwrap();
    assert_eq!(snapshot.ledger.all().len(), 1, "released binding must remain");

    let row = &snapshot.ledger.all()[0];
    assert_eq!(row.id, binding.id);
    assert!(row.released_at.is_some(), "release must set released_at");
    assert!(!row.is_active());
    assert_eq!(row.port_numbers, vec![8000], "ports must survive release untouched");

    // If this test fails:
    // - Rows are being deleted or their ports rewritten
    // - The port history listing is now lying
}

/// WHY: A binding's port set is immutable for its whole lifetime
/// REASON: Partial release would shrink a granted range in place
/// BREAKS: The caller's view of what it owns
/// SACRIFICES: If this fails, grants and reality diverge silently
#[test]
fn partial_release_is_rejected_and_names_the_covering_binding() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    register(&store, "web-1");

    let binding = store.reserve("web-1", 3).unwrap();
    assert_eq!(binding.port_numbers, vec![8000, 8001, 8002]);

    // A strict subset of the granted range must bounce
    let err = store
        .release(PortSelector::Range { start: 8000, end: 8001 }, None)
        .unwrap_err();
    match err {
        GatekeeperError::Conflict(msg) => {
            assert!(
                msg.contains(&binding.id),
                "conflict must name the covering binding, got: {}",
                msg
            );
            assert!(msg.contains("partial release"), "got: {}", msg);
        }
        other => panic!("expected Conflict, got {:?}", other),
    }

    // A single inner port must bounce the same way
    let err = store.release(PortSelector::Port(8001), None).unwrap_err();
    assert!(matches!(err, GatekeeperError::Conflict(_)));

    // The binding must still be fully active
    let snapshot = store.snapshot().unwrap();
    assert!(snapshot.ledger.all()[0].is_active());
    assert!(snapshot.pool.is_reserved(8000));
    assert!(snapshot.pool.is_reserved(8001));
    assert!(snapshot.pool.is_reserved(8002));

    // If this test fails:
    // - Release is matching by overlap instead of exact bounds
    // - Bindings can now shrink, and the immutability guarantee is gone
}

/// WHY: Releasing an already-released binding is a conflict, not a success
/// REASON: The second caller is operating on stale knowledge and must find out
/// BREAKS: At-most-once release semantics
/// SACRIFICES: If this fails, double releases are silently absorbed
#[test]
fn double_release_is_a_conflict_not_a_not_found() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    register(&store, "web-1");

    store.reserve("web-1", 1).unwrap();
    store.release(PortSelector::Port(8000), None).unwrap();

    let err = store.release(PortSelector::Port(8000), None).unwrap_err();
    match err {
        GatekeeperError::Conflict(msg) => {
            assert!(msg.contains("already released"), "got: {}", msg);
        }
        other => panic!("expected Conflict, got {:?}", other),
    }

    // A selector that never matched any grant is a different failure
    let err = store.release(PortSelector::Port(8005), None).unwrap_err();
    assert!(
        matches!(err, GatekeeperError::NotFound(_)),
        "never-granted selector must be NotFound, not Conflict"
    );

    // If this test fails:
    // - Double release and never-granted are collapsing into one error
    // - Callers can no longer distinguish stale state from a typo
}

/// WHY: The optional instance_id on release is an ownership assertion
/// REASON: Orchestrators release on behalf of instances and must not cross wires
/// BREAKS: Ownership if a mismatched claim is honored
/// SACRIFICES: If this fails, any caller can release anyone's ports
#[test]
fn owner_mismatch_on_release_is_a_conflict() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    register(&store, "web-1");
    register(&store, "web-2");

    store.reserve("web-1", 1).unwrap();

    let err = store
        .release(PortSelector::Port(8000), Some("web-2"))
        .unwrap_err();
    match err {
        GatekeeperError::Conflict(msg) => {
            assert!(msg.contains("web-1"), "conflict must name the real owner, got: {}", msg);
        }
        other => panic!("expected Conflict, got {:?}", other),
    }

    // The binding survives the failed attempt
    let snapshot = store.snapshot().unwrap();
    assert!(snapshot.pool.is_reserved(8000));

    // The correct owner claim still works
    store.release(PortSelector::Port(8000), Some("web-1")).unwrap();

    // If this test fails:
    // - The ownership check is gone or inverted
    // - Cross-instance releases are possible
}

/// WHY: Bindings hold a contiguous ascending port run, always
/// REASON: Start/end bounds summarize the binding everywhere (selectors, listings, wire)
/// BREAKS: Every consumer that reconstructs the set from its bounds
/// SACRIFICES: If this fails, bounds and contents disagree
#[test]
fn binding_construction_rejects_gaps_and_disorder() {
    assert!(Binding::new("b-1", "web-1", vec![8000, 8001, 8002]).is_ok());
    assert!(Binding::new("b-2", "web-1", vec![8000]).is_ok());

    let gap = Binding::new("b-3", "web-1", vec![8000, 8002]).unwrap_err();
    assert!(matches!(gap, GatekeeperError::Validation(_)));

    let descending = Binding::new("b-4", "web-1", vec![8001, 8000]).unwrap_err();
    assert!(matches!(descending, GatekeeperError::Validation(_)));

    let empty = Binding::new("b-5", "web-1", vec![]).unwrap_err();
    assert!(matches!(empty, GatekeeperError::Validation(_)));

    // If this test fails:
    // - Non-contiguous bindings are representable
    // - (start, end) selectors no longer identify a unique port set
}

/// WHY: Every mutation leaves a transaction-stamped audit event
/// REASON: The JSONL trail is the cross-process record of what happened in what order
/// BREAKS: External audit tooling that replays the trail
/// SACRIFICES: If this fails, the trail and the state file disagree
#[test]
fn mutations_append_audit_events_in_order() {
    let temp = TempDir::new().unwrap();
    let ledger_path = temp.path().join("ledger.jsonl");
    let store = FileStore::open_at(
        temp.path().join("state.json"),
        &ledger_path,
        PortRange::new(8000, 8010).unwrap(),
    )
    .unwrap();

    register(&store, "web-1");
    store.reserve("web-1", 2).unwrap();
    store
        .release(PortSelector::Range { start: 8000, end: 8001 }, None)
        .unwrap();
    store.deregister_instance("web-1").unwrap();

    let audit = AuditLog::new(&ledger_path);
    let events = audit.read_all().unwrap();
    let kinds: Vec<String> = events
        .iter()
        .map(|e| serde_json::to_value(&e.event).unwrap().as_str().unwrap().to_string())
        .collect();
    assert_eq!(kinds, vec!["register", "reserve", "release", "deregister"]);

    for event in &events {
        assert!(!event.tx_id.is_empty(), "every event carries a transaction id");
        assert_eq!(event.instance_id, "web-1");
    }

    // If this test fails:
    // - Mutations are skipping the audit trail
    // - Or events are written out of commit order
}

/// WHY: Deregistration cascades but still only annotates
/// REASON: The instance row goes away; its binding history must not
/// BREAKS: Attribution of historical grants to departed instances
/// SACRIFICES: If this fails, deregistration erases history
#[test]
fn deregistration_releases_but_preserves_rows() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    register(&store, "web-1");

    store.reserve("web-1", 1).unwrap();
    store.reserve("web-1", 2).unwrap();

    let outcome = store.deregister_instance("web-1").unwrap();
    assert_eq!(outcome.released.len(), 2);

    let snapshot = store.snapshot().unwrap();
    assert!(snapshot.instances.get("web-1").is_none());
    assert_eq!(snapshot.ledger.all().len(), 2, "history must survive the cascade");
    assert!(snapshot.ledger.all().iter().all(|b| !b.is_active()));
    assert_eq!(snapshot.pool.reserved_count(), 0);

    // If this test fails:
    // - The cascade is deleting rows instead of releasing them
    // - Departed instances vanish from the audit record
}
