//! Gatekeeper facade
//!
//! Single entry point the CLI, daemon and tests drive. Owns the store
//! plus the allocator and reconciliation layers over it, and performs
//! the one-time boundary validation of every request before anything
//! touches the registry or pool.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::alloc::RangeAllocator;
use crate::api::{
    validate_instance_id, BindingSummary, ObserveRequest, ObserveResponse, PortView,
    RegisterRequest, ReleaseRequest, ReleaseResponse, ReserveRequest, ReserveResponse,
    UpdateRequest,
};
use crate::config::GatekeeperConfig;
use crate::errors::Result;
use crate::reconcile::{DriftReport, ReconciliationEngine};
use crate::registry::Instance;
use crate::store::{DeregisterOutcome, FileStore, LeaseStore, StoreSnapshot};

pub struct Gatekeeper {
    config: GatekeeperConfig,
    store: Arc<dyn LeaseStore>,
    allocator: RangeAllocator,
    engine: ReconciliationEngine,
}

impl Gatekeeper {
    /// Open the service over the file store under the configured home.
    pub fn open(config: GatekeeperConfig) -> Result<Self> {
        let store: Arc<dyn LeaseStore> = Arc::new(FileStore::open(&config)?);
        Ok(Self::with_store(config, store))
    }

    /// Wire the service over any store implementation.
    pub fn with_store(config: GatekeeperConfig, store: Arc<dyn LeaseStore>) -> Self {
        let allocator = RangeAllocator::new(store.clone());
        let engine = ReconciliationEngine::new(store.clone());
        Self {
            config,
            store,
            allocator,
            engine,
        }
    }

    pub fn config(&self) -> &GatekeeperConfig {
        &self.config
    }

    /// Register a new instance.
    pub fn register(&self, request: RegisterRequest) -> Result<Instance> {
        request.validate()?;
        self.store.register_instance(Instance::new(
            &request.instance_id,
            &request.name,
            request.metadata,
        ))
    }

    /// Partially update an instance.
    pub fn update(&self, request: UpdateRequest) -> Result<Instance> {
        request.validate()?;
        self.store
            .update_instance(&request.instance_id, request.to_patch())
    }

    /// Deregister an instance, cascading the release of its bindings.
    pub fn deregister(&self, instance_id: &str) -> Result<DeregisterOutcome> {
        validate_instance_id(instance_id)?;
        self.store.deregister_instance(instance_id)
    }

    pub fn instances(&self) -> Result<Vec<Instance>> {
        Ok(self.store.snapshot()?.instances.list())
    }

    /// Reserve a contiguous run for an instance.
    pub fn reserve(&self, request: ReserveRequest) -> Result<ReserveResponse> {
        request.validate()?;
        let binding = self
            .allocator
            .reserve(&request.instance_id, request.range_size)?;
        Ok(ReserveResponse::from_binding(&binding))
    }

    /// Release the binding the request's selector names exactly.
    pub fn release(&self, request: ReleaseRequest) -> Result<ReleaseResponse> {
        request.validate()?;
        let selector = request.selector()?;
        let binding = self
            .allocator
            .release(selector, request.instance_id.as_deref())?;
        ReleaseResponse::from_binding(&binding)
    }

    /// All ports with their binding annotations.
    pub fn ports(&self) -> Result<Vec<PortView>> {
        self.allocator.list_ports()
    }

    /// Binding summaries, optionally filtered by instance, active-only
    /// unless released history is asked for.
    pub fn bindings(
        &self,
        instance_id: Option<&str>,
        include_released: bool,
    ) -> Result<Vec<BindingSummary>> {
        if let Some(id) = instance_id {
            validate_instance_id(id)?;
        }
        let snapshot = self.store.snapshot()?;
        Ok(snapshot
            .ledger
            .all()
            .iter()
            .filter(|b| include_released || b.is_active())
            .filter(|b| instance_id.map_or(true, |id| b.instance_id == id))
            .map(BindingSummary::from_binding)
            .collect())
    }

    /// Classify one observation, returned as the wire response.
    pub fn observe(&self, request: ObserveRequest) -> Result<ObserveResponse> {
        request.validate()?;
        let observed: BTreeSet<u16> = request.used_ports.iter().copied().collect();
        let report = self.engine.observe(&request.instance_id, &observed)?;
        Ok(ObserveResponse::from(&report))
    }

    /// Classify one observation, returned as the raw drift report.
    /// The daemon consumes this form so it can apply its grace period.
    pub fn drift(&self, instance_id: &str, observed: &BTreeSet<u16>) -> Result<DriftReport> {
        validate_instance_id(instance_id)?;
        self.engine.observe(instance_id, observed)
    }

    /// Consistent snapshot pass-through for read-side consumers.
    pub fn snapshot(&self) -> Result<StoreSnapshot> {
        self.store.snapshot()
    }
}
