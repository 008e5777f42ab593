//! Lease store trait for gatekeeper
//!
//! Defines the abstract repository interface every backend must
//! implement. All mutations pass through named transactional
//! operations; there is no ambient session state to leave half
//! written. Implementations include:
//! - FileStore (JSON state snapshot + JSONL audit trail)
//! - Test doubles wrapping another store to inject faults

use chrono::{DateTime, Utc};

use crate::errors::Result;
use crate::ledger::{Binding, BindingLedger, PortSelector};
use crate::pool::PortPool;
use crate::registry::{Instance, InstancePatch, InstanceTable};

/// Consistent point-in-time view of the whole store.
///
/// Cloned out under the store's isolation so readers never see a
/// mid-transaction state. Reconciliation and listings compute over
/// this without holding any lock.
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    pub taken_at: DateTime<Utc>,
    pub pool: PortPool,
    pub instances: InstanceTable,
    pub ledger: BindingLedger,
}

/// Result of a cascading deregistration.
#[derive(Debug, Clone)]
pub struct DeregisterOutcome {
    pub instance: Instance,
    pub released: Vec<Binding>,
}

/// Lease store trait
///
/// Backends serialize the named mutations below against each other
/// (equivalent to serializable isolation over the pool's
/// reserved-state read-modify-write), and either commit a whole
/// operation or leave state untouched.
///
/// # Protocol Compliance
///
/// Stores must:
/// - Keep the pool's reserved flags derived from active bindings
/// - Never physically delete a binding record
/// - Surface backend failures as `StoreUnavailable` (the retryable
///   kind), never as partial writes
pub trait LeaseStore: Send + Sync {
    /// Insert a new instance record.
    ///
    /// # Returns
    ///
    /// The stored instance.
    ///
    /// # Protocol Semantics
    ///
    /// - `DuplicateInstance` when the id is already registered
    /// - No binding or pool state is touched
    fn register_instance(&self, instance: Instance) -> Result<Instance>;

    /// Apply a partial update to an instance.
    ///
    /// # Protocol Semantics
    ///
    /// - `NotFound` when the id is unknown
    /// - Bindings are unaffected by updates
    fn update_instance(&self, instance_id: &str, patch: InstancePatch) -> Result<Instance>;

    /// Remove an instance, releasing all of its active bindings first.
    ///
    /// # Returns
    ///
    /// The removed instance plus every binding the cascade released.
    ///
    /// # Protocol Semantics
    ///
    /// - `NotFound` when the id is unknown
    /// - After return, no active binding references the instance
    /// - Released bindings stay in the ledger with `released_at` set
    fn deregister_instance(&self, instance_id: &str) -> Result<DeregisterOutcome>;

    /// Reserve a contiguous run of `range_size` free ports for the
    /// instance (first-fit, lowest start).
    ///
    /// # Returns
    ///
    /// The newly created active binding.
    ///
    /// # Protocol Semantics
    ///
    /// - `NotFound` when the instance is unregistered; pool untouched
    /// - `PoolExhausted` when no sufficiently long free run exists
    /// - Two concurrent reserves can never be granted overlapping runs
    fn reserve(&self, instance_id: &str, range_size: u16) -> Result<Binding>;

    /// Release the unique active binding that exactly matches the
    /// selector.
    ///
    /// # Arguments
    ///
    /// * `selector` - single port or explicit (start, end) pair
    /// * `instance_id` - optional owner claim, checked when present
    ///
    /// # Protocol Semantics
    ///
    /// - Exact match only: a selector inside a larger run is a
    ///   `Conflict` (partial release is not supported)
    /// - Owner mismatch and double release are `Conflict`
    /// - `NotFound` when no binding ever matched the selector
    fn release(&self, selector: PortSelector, instance_id: Option<&str>) -> Result<Binding>;

    /// Consistent snapshot for reads (listings, reconciliation).
    fn snapshot(&self) -> Result<StoreSnapshot>;
}
