//! Integration tests for the full lease lifecycle
//!
//! Tests the complete workflow:
//! 1. Register instances
//! 2. Reserve single ports and contiguous ranges
//! 3. Observe and reconcile
//! 4. Deregister with cascading release
//! 5. Verify the pool recycles and state survives a reopen

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

use gatekeeper_core::{
    Binding, DeregisterOutcome, FileStore, GatekeeperConfig, GatekeeperError, Instance,
    InstancePatch, LeaseStore, PortRange, PortSelector, RangeAllocator, StoreSnapshot,
};

/// Helper to build a service home inside a temp dir
fn test_config(temp: &TempDir, start: u16, end: u16) -> GatekeeperConfig {
    let mut config = GatekeeperConfig::defaults(temp.path());
    config.port_range_start = start;
    config.port_range_end = end;
    config
}

fn register(store: &dyn LeaseStore, id: &str, name: &str) {
    store
        .register_instance(Instance::new(id, name, BTreeMap::new()))
        .unwrap();
}

#[test]
fn test_complete_lease_lifecycle() {
    use gatekeeper_core::{Gatekeeper, RegisterRequest, ReserveRequest};

    let temp = TempDir::new().unwrap();
    let gatekeeper = Gatekeeper::open(test_config(&temp, 8000, 8010)).unwrap();

    println!("\n=== Lease Lifecycle Test ===\n");

    // Step 1: Register two co-located instances
    println!("Step 1: Registering instances");
    gatekeeper
        .register(RegisterRequest {
            instance_id: "web-1".to_string(),
            name: "Web frontend".to_string(),
            metadata: BTreeMap::from([("team".to_string(), "edge".to_string())]),
        })
        .unwrap();
    gatekeeper
        .register(RegisterRequest {
            instance_id: "worker-1".to_string(),
            name: "Background worker".to_string(),
            metadata: BTreeMap::new(),
        })
        .unwrap();
    assert_eq!(gatekeeper.instances().unwrap().len(), 2);
    println!("  ✓ web-1 and worker-1 registered");

    // Step 2: Reserve a single port and a range
    println!("\nStep 2: Reserving ports");
    let single = gatekeeper
        .reserve(ReserveRequest {
            instance_id: "web-1".to_string(),
            range_size: 1,
        })
        .unwrap();
    assert_eq!((single.start_port, single.end_port), (8000, 8000));
    println!("  ✓ web-1 granted port {}", single.start_port);

    let range = gatekeeper
        .reserve(ReserveRequest {
            instance_id: "worker-1".to_string(),
            range_size: 4,
        })
        .unwrap();
    assert_eq!((range.start_port, range.end_port), (8001, 8004));
    println!("  ✓ worker-1 granted ports {}-{}", range.start_port, range.end_port);

    // Step 3: The annotated listing reflects both grants
    println!("\nStep 3: Listing ports");
    let ports = gatekeeper.ports().unwrap();
    assert_eq!(ports.len(), 11);
    let reserved: Vec<u16> = ports
        .iter()
        .filter(|p| p.is_reserved)
        .map(|p| p.port_number)
        .collect();
    assert_eq!(reserved, vec![8000, 8001, 8002, 8003, 8004]);
    println!("  ✓ {} of {} ports reserved", reserved.len(), ports.len());

    // Step 4: Deregister worker-1; its range cascades back to the pool
    println!("\nStep 4: Deregistering worker-1");
    let outcome: DeregisterOutcome = gatekeeper.deregister("worker-1").unwrap();
    assert_eq!(outcome.released.len(), 1);
    assert_eq!(outcome.released[0].port_numbers, vec![8001, 8002, 8003, 8004]);
    println!("  ✓ cascade released {:?}", outcome.released[0].port_numbers);

    // Step 5: The freed run is immediately grantable again
    println!("\nStep 5: Re-reserving the freed range");
    let reuse = gatekeeper
        .reserve(ReserveRequest {
            instance_id: "web-1".to_string(),
            range_size: 3,
        })
        .unwrap();
    assert_eq!((reuse.start_port, reuse.end_port), (8001, 8003));
    println!("  ✓ web-1 granted recycled ports {}-{}", reuse.start_port, reuse.end_port);

    // History keeps all three bindings
    let history = gatekeeper.bindings(None, true).unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history.iter().filter(|b| b.is_active()).count(), 2);
    println!("\n✓ Lifecycle complete: {} bindings in history", history.len());
}

#[test]
fn test_state_survives_reopen() {
    let temp = TempDir::new().unwrap();
    let state_path = temp.path().join("state.json");
    let ledger_path = temp.path().join("ledger.jsonl");
    let range = PortRange::new(8000, 8005).unwrap();

    println!("\n=== Reopen Test ===\n");

    // Step 1: Seed a store and take a lease
    println!("Step 1: Seeding store and reserving");
    {
        let store = FileStore::open_at(&state_path, &ledger_path, range).unwrap();
        register(&store, "web-1", "Web frontend");
        store
            .update_instance(
                "web-1",
                InstancePatch {
                    name: Some("Web frontend (blue)".to_string()),
                    metadata: None,
                },
            )
            .unwrap();
        let binding = store.reserve("web-1", 2).unwrap();
        assert_eq!(binding.port_numbers, vec![8000, 8001]);
        println!("  ✓ reserved {:?}", binding.port_numbers);
    }

    // Step 2: Reopen from disk; everything is still there
    println!("\nStep 2: Reopening from disk");
    let store = FileStore::open_at(&state_path, &ledger_path, range).unwrap();
    let snapshot: StoreSnapshot = store.snapshot().unwrap();
    assert_eq!(snapshot.instances.get("web-1").unwrap().name, "Web frontend (blue)");
    assert!(snapshot.pool.is_reserved(8000));
    assert!(snapshot.pool.is_reserved(8001));
    assert_eq!(snapshot.ledger.active().count(), 1);
    println!("  ✓ instance, pool, and ledger survived");

    // Step 3: Allocation continues where it left off
    println!("\nStep 3: Continuing allocation");
    let next = store.reserve("web-1", 1).unwrap();
    assert_eq!(next.port_numbers, vec![8002]);
    println!("  ✓ next grant is {:?}", next.port_numbers);

    // Step 4: Release by exact range still matches the pre-reopen binding
    store
        .release(PortSelector::Range { start: 8000, end: 8001 }, Some("web-1"))
        .unwrap();
    let snapshot = store.snapshot().unwrap();
    assert!(!snapshot.pool.is_reserved(8000));
    assert!(snapshot.pool.is_reserved(8002));
    println!("\n✓ Reopen preserved full lease semantics");
}

#[test]
fn test_concurrent_reservations_never_overlap() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(
        FileStore::open_at(
            temp.path().join("state.json"),
            temp.path().join("ledger.jsonl"),
            PortRange::new(8000, 8100).unwrap(),
        )
        .unwrap(),
    );

    println!("\n=== Concurrent Reservation Test ===\n");

    for i in 0..4 {
        register(store.as_ref(), &format!("inst-{}", i), "worker");
    }

    // 4 threads x 5 reservations of size 1-3, all racing the same pool
    let mut handles = Vec::new();
    for i in 0..4 {
        let store = store.clone();
        handles.push(std::thread::spawn(move || {
            let instance_id = format!("inst-{}", i);
            let mut granted: Vec<Binding> = Vec::new();
            for round in 0..5 {
                let size = (round % 3) + 1;
                granted.push(store.reserve(&instance_id, size as u16).unwrap());
            }
            granted
        }));
    }

    let mut seen: BTreeSet<u16> = BTreeSet::new();
    let mut total_ports = 0usize;
    for handle in handles {
        for binding in handle.join().unwrap() {
            for port in &binding.port_numbers {
                assert!(
                    seen.insert(*port),
                    "port {} granted to two concurrent reservations",
                    port
                );
                total_ports += 1;
            }
        }
    }

    println!("  ✓ {} ports granted across 4 threads with no overlap", total_ports);

    // The pool agrees with the union of all grants
    let snapshot = store.snapshot().unwrap();
    assert_eq!(snapshot.pool.reserved_count(), total_ports);
    println!("✓ Pool reserved count matches granted ports");
}

/// Store wrapper that fails the first N mutations with a retryable error
struct OutageStore {
    inner: FileStore,
    failures_left: AtomicU32,
}

impl OutageStore {
    fn new(inner: FileStore, failures: u32) -> Self {
        Self {
            inner,
            failures_left: AtomicU32::new(failures),
        }
    }

    fn maybe_fail(&self) -> Result<(), GatekeeperError> {
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(GatekeeperError::StoreUnavailable(
                "simulated outage".to_string(),
            ));
        }
        Ok(())
    }
}

impl LeaseStore for OutageStore {
    fn register_instance(&self, instance: Instance) -> Result<Instance, GatekeeperError> {
        self.inner.register_instance(instance)
    }

    fn update_instance(
        &self,
        instance_id: &str,
        patch: InstancePatch,
    ) -> Result<Instance, GatekeeperError> {
        self.inner.update_instance(instance_id, patch)
    }

    fn deregister_instance(&self, instance_id: &str) -> Result<DeregisterOutcome, GatekeeperError> {
        self.inner.deregister_instance(instance_id)
    }

    fn reserve(&self, instance_id: &str, range_size: u16) -> Result<Binding, GatekeeperError> {
        self.maybe_fail()?;
        self.inner.reserve(instance_id, range_size)
    }

    fn release(
        &self,
        selector: PortSelector,
        instance_id: Option<&str>,
    ) -> Result<Binding, GatekeeperError> {
        self.maybe_fail()?;
        self.inner.release(selector, instance_id)
    }

    fn snapshot(&self) -> Result<StoreSnapshot, GatekeeperError> {
        self.inner.snapshot()
    }
}

#[test]
fn test_allocator_rides_out_a_single_transient_outage() {
    let temp = TempDir::new().unwrap();
    let inner = FileStore::open_at(
        temp.path().join("state.json"),
        temp.path().join("ledger.jsonl"),
        PortRange::new(8000, 8010).unwrap(),
    )
    .unwrap();
    register(&inner, "web-1", "Web frontend");

    println!("\n=== Transient Outage Test ===\n");

    // One failure: the retry makes the caller never see it
    let store = Arc::new(OutageStore::new(inner, 1));
    let allocator = RangeAllocator::new(store.clone());
    let response = allocator.reserve("web-1", 2).unwrap();
    assert_eq!(response.port_numbers, vec![8000, 8001]);
    println!("  ✓ one outage absorbed by the retry");

    // Two consecutive failures: the second attempt fails too, error surfaces
    store.failures_left.store(2, Ordering::SeqCst);
    let err = allocator.reserve("web-1", 1).unwrap_err();
    assert!(matches!(err, GatekeeperError::StoreUnavailable(_)));
    println!("  ✓ back-to-back outages surface StoreUnavailable");

    // Terminal errors are never retried: the failure budget stays untouched
    store.failures_left.store(0, Ordering::SeqCst);
    let err = allocator.reserve("ghost", 1).unwrap_err();
    assert!(matches!(err, GatekeeperError::NotFound(_)));
    assert_eq!(store.failures_left.load(Ordering::SeqCst), 0);
    println!("✓ terminal errors pass straight through");
}

#[test]
fn test_config_resolution_precedence() {
    use gatekeeper_core::ConfigFile;

    let temp = TempDir::new().unwrap();

    println!("\n=== Config Resolution Test ===\n");

    // Step 1: Defaults
    let mut config = GatekeeperConfig::defaults(temp.path());
    assert_eq!(config.port_range_start, 8000);
    assert_eq!(config.port_range_end, 10000);
    assert_eq!(config.observe_interval_secs, 30);
    println!("Step 1: ✓ defaults are 8000-10000 / 30s");

    // Step 2: A config file overrides defaults
    config.port_range_start = 9000;
    config.save_file().unwrap();
    let loaded = ConfigFile::load(config.config_path()).unwrap();
    loaded.validate().unwrap();
    let mut from_file = GatekeeperConfig::defaults(temp.path());
    from_file.port_range_start = loaded.spec.port_range_start;
    assert_eq!(from_file.port_range_start, 9000);
    println!("Step 2: ✓ YAML file overrides defaults");

    // Step 3: Environment overrides the file
    from_file
        .apply_env(|key| match key {
            "PORT_RANGE_START" => Some("9500".to_string()),
            "OBSERVE_INTERVAL_SECS" => Some("5".to_string()),
            _ => None,
        })
        .unwrap();
    assert_eq!(from_file.port_range_start, 9500);
    assert_eq!(from_file.observe_interval_secs, 5);
    println!("Step 3: ✓ environment overrides the file");

    // Step 4: Inverted ranges are rejected with every problem listed
    let mut bad = GatekeeperConfig::defaults(temp.path());
    bad.port_range_start = 9000;
    bad.port_range_end = 8000;
    bad.observe_interval_secs = 0;
    let err = bad.validate().unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("portRangeStart"));
    assert!(msg.contains("observeIntervalSecs"));
    println!("Step 4: ✓ validation reports all problems at once");

    // Step 5: Malformed env values fail loudly, not silently
    let mut config = GatekeeperConfig::defaults(temp.path());
    let err = config
        .apply_env(|key| match key {
            "PORT_RANGE_START" => Some("not-a-port".to_string()),
            _ => None,
        })
        .unwrap_err();
    assert!(matches!(err, GatekeeperError::Config(_)));
    println!("Step 5: ✓ malformed environment values are rejected");
}

#[test]
fn test_facade_validates_before_touching_the_store() {
    use gatekeeper_core::{Gatekeeper, RegisterRequest, ReleaseRequest, ReserveRequest};

    let temp = TempDir::new().unwrap();
    let gatekeeper = Gatekeeper::open(test_config(&temp, 8000, 8010)).unwrap();

    println!("\n=== Boundary Validation Test ===\n");

    // Malformed instance id never reaches the store
    let err = gatekeeper
        .register(RegisterRequest {
            instance_id: "bad id with spaces".to_string(),
            name: "x".to_string(),
            metadata: BTreeMap::new(),
        })
        .unwrap_err();
    assert!(matches!(err, GatekeeperError::Validation(_)));
    assert!(gatekeeper.instances().unwrap().is_empty());
    println!("  ✓ malformed instance id rejected at the boundary");

    // Zero-size reservation rejected before the store sees it
    let err = gatekeeper
        .reserve(ReserveRequest {
            instance_id: "web-1".to_string(),
            range_size: 0,
        })
        .unwrap_err();
    assert!(matches!(err, GatekeeperError::Validation(_)));
    println!("  ✓ zero-size reservation rejected at the boundary");

    // A release request must carry exactly one selector form
    let err = gatekeeper
        .release(ReleaseRequest {
            port_number: Some(8000),
            start_port: Some(8000),
            end_port: Some(8001),
            instance_id: None,
        })
        .unwrap_err();
    assert!(matches!(err, GatekeeperError::Validation(_)));

    let err = gatekeeper
        .release(ReleaseRequest {
            port_number: None,
            start_port: Some(8001),
            end_port: None,
            instance_id: None,
        })
        .unwrap_err();
    assert!(matches!(err, GatekeeperError::Validation(_)));
    println!("  ✓ ambiguous and half-formed selectors rejected");

    println!("\n✓ Boundary holds: no invalid request reached the store");
}
