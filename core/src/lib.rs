//! # Gatekeeper Core - Port Lease Allocation & Reconciliation
//!
//! Gatekeeper leases TCP port ranges out of a bounded pool to named
//! service instances, tracks lease lifecycle in an append-mostly
//! ledger, and reconciles leased state against what host agents report
//! as actually listening.
//!
//! ## Core Principle
//!
//! **The ledger is the source of truth**: a port is reserved exactly
//! when an active binding contains it. Observations never mutate lease
//! state; they only classify drift for operators to act on.
//!
//! ## Key Features
//!
//! - First-fit contiguous-range allocation with deterministic
//!   lowest-start tie-break
//! - Append-mostly binding ledger (releases stamp a timestamp, records
//!   are never deleted)
//! - Reconciliation of agent-observed ports into confirmed / leaked /
//!   rogue sets, with a consumer-side grace period in the daemon
//! - Named transactional store operations behind a repository trait
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   requests    ┌───────────────────────────────┐
//! │  gk (CLI)  ├──────────────▶│   Gatekeeper (service facade) │
//! └────────────┘               │  api validation at the edge   │
//! ┌────────────┐  spool files  ├───────────┬───────────────────┤
//! │   agents   ├──────────────▶│ Allocator │ Reconciliation    │
//! └────────────┘  (observer)   ├───────────┴───────────────────┤
//!                              │  LeaseStore (transactional)   │
//!                              │  pool + registry + ledger     │
//!                              └───────────────────────────────┘
//! ```

pub mod alloc;
pub mod api;
pub mod config;
pub mod errors;
pub mod ledger;
pub mod observer;
pub mod pool;
pub mod reconcile;
pub mod registry;
pub mod service;
pub mod store;

pub use alloc::{find_first_fit, RangeAllocator};
pub use api::{
    validate_instance_id, BindingSummary, ObserveRequest, ObserveResponse, PortView,
    RegisterRequest, ReleaseRequest, ReleaseResponse, ReserveRequest, ReserveResponse,
    UpdateRequest,
};
pub use config::{ConfigFile, ConfigSpec, GatekeeperConfig};
pub use errors::{ErrorKind, GatekeeperError, Result};
pub use ledger::{
    generate_tx_id, AuditLog, Binding, BindingLedger, LedgerEvent, LedgerEventKind, PortSelector,
};
pub use observer::{ObservationReport, ObserverDaemon};
pub use pool::{PortPool, PortRange};
pub use reconcile::{classify, DriftReport, ReconciliationEngine};
pub use registry::{Instance, InstancePatch, InstanceTable};
pub use service::Gatekeeper;
pub use store::{DeregisterOutcome, FileStore, LeaseStore, StoreSnapshot, StoreState};

/// Crate version surfaced by the CLI.
pub const VERSION: &str = "1.1.2";

/// Default lower bound of the managed port range.
pub const DEFAULT_PORT_RANGE_START: u16 = 8000;

/// Default upper bound (inclusive) of the managed port range.
pub const DEFAULT_PORT_RANGE_END: u16 = 10000;

/// Default agent report interval, which also sets the grace period.
pub const DEFAULT_OBSERVE_INTERVAL_SECS: u64 = 30;
