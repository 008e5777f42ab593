//! Range allocator: first-fit contiguous reservation over the pool
//!
//! Strategy: scan port numbers ascending, tracking the length of the
//! current free run; the first run long enough wins and the grant
//! takes its lowest ports. Lowest-start tie-break keeps fragmentation
//! drift down and makes allocation deterministic.
//!
//! The scan itself is a pure function the store calls inside its
//! transaction; `RangeAllocator` is the caller-facing layer that adds
//! the single transparent retry on a transient store failure.

use std::sync::Arc;

use crate::api::{BindingSummary, PortView};
use crate::errors::Result;
use crate::ledger::{Binding, PortSelector};
use crate::pool::PortPool;
use crate::store::LeaseStore;

/// Find the lowest start of a free run of `range_size` contiguous
/// ports, or None when the pool has no such run.
pub fn find_first_fit(pool: &PortPool, range_size: u16) -> Option<u16> {
    if range_size == 0 {
        return None;
    }

    let mut run_start: Option<u16> = None;
    let mut run_len: u16 = 0;

    for (port, reserved) in pool.ports() {
        if reserved {
            run_start = None;
            run_len = 0;
            continue;
        }

        if run_start.is_none() {
            run_start = Some(port);
            run_len = 0;
        }
        run_len += 1;

        if run_len >= range_size {
            return run_start;
        }
    }

    None
}

/// Caller-facing allocation layer over the store.
pub struct RangeAllocator {
    store: Arc<dyn LeaseStore>,
}

impl RangeAllocator {
    pub fn new(store: Arc<dyn LeaseStore>) -> Self {
        Self { store }
    }

    /// Reserve a contiguous run for the instance. A transient store
    /// failure is retried once before surfacing; terminal errors
    /// (NotFound, PoolExhausted, ...) surface immediately.
    pub fn reserve(&self, instance_id: &str, range_size: u16) -> Result<Binding> {
        retry_once(|| self.store.reserve(instance_id, range_size))
    }

    /// Release by exact selector, optionally checking the owner.
    /// Transient store failures get the same single retry.
    pub fn release(&self, selector: PortSelector, instance_id: Option<&str>) -> Result<Binding> {
        retry_once(|| self.store.release(selector, instance_id))
    }

    /// Every port in the pool, annotated with its current and past
    /// bindings. Read-only.
    pub fn list_ports(&self) -> Result<Vec<PortView>> {
        let snapshot = self.store.snapshot()?;
        let views = snapshot
            .pool
            .ports()
            .map(|(port, reserved)| PortView {
                port_number: port,
                is_reserved: reserved,
                bindings: snapshot
                    .ledger
                    .bindings_for_port(port)
                    .into_iter()
                    .map(BindingSummary::from_binding)
                    .collect(),
            })
            .collect();
        Ok(views)
    }
}

fn retry_once<T>(op: impl Fn() -> Result<T>) -> Result<T> {
    match op() {
        Err(e) if e.is_retryable() => {
            tracing::warn!(error = %e, "store unavailable, retrying once");
            op()
        }
        other => other,
    }
}
