//! Reconciliation engine: leased state vs observed reality
//!
//! Agents report which ports an instance actually listens on; the
//! engine diffs that against the ledger's active bindings and hands
//! back three sets. It never mutates lease state on its own: a leak
//! right after a fresh grant is an expected race with process
//! bind-up, and acting on it automatically would tear down healthy
//! leases. Consumers decide, with a grace period.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::api::ObserveResponse;
use crate::errors::{GatekeeperError, Result};
use crate::store::{LeaseStore, StoreSnapshot};

/// Drift classification for one observation.
///
/// - `confirmed`: leased and observed listening
/// - `leaked`: leased but not observed (failed to bind, or not yet up)
/// - `rogue`: observed but not leased to this instance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriftReport {
    pub instance_id: String,
    pub taken_at: DateTime<Utc>,
    pub confirmed: BTreeSet<u16>,
    pub leaked: BTreeSet<u16>,
    pub rogue: BTreeSet<u16>,
}

impl DriftReport {
    pub fn is_clean(&self) -> bool {
        self.leaked.is_empty() && self.rogue.is_empty()
    }
}

impl From<&DriftReport> for ObserveResponse {
    fn from(report: &DriftReport) -> Self {
        ObserveResponse {
            confirmed: report.confirmed.iter().copied().collect(),
            leaked: report.leaked.iter().copied().collect(),
            rogue: report.rogue.iter().copied().collect(),
        }
    }
}

/// Pure set arithmetic behind every report.
pub fn classify(
    active: &BTreeSet<u16>,
    observed: &BTreeSet<u16>,
) -> (BTreeSet<u16>, BTreeSet<u16>, BTreeSet<u16>) {
    let confirmed = active.intersection(observed).copied().collect();
    let leaked = active.difference(observed).copied().collect();
    let rogue = observed.difference(active).copied().collect();
    (confirmed, leaked, rogue)
}

/// Read-side engine over the store.
pub struct ReconciliationEngine {
    store: Arc<dyn LeaseStore>,
}

impl ReconciliationEngine {
    pub fn new(store: Arc<dyn LeaseStore>) -> Self {
        Self { store }
    }

    /// Classify one observation against a fresh consistent snapshot.
    pub fn observe(&self, instance_id: &str, observed: &BTreeSet<u16>) -> Result<DriftReport> {
        let snapshot = self.store.snapshot()?;
        Self::classify_snapshot(&snapshot, instance_id, observed)
    }

    /// Classify against a snapshot the caller already holds, so one
    /// snapshot can serve both the report and any follow-up the
    /// consumer derives from it.
    pub fn classify_snapshot(
        snapshot: &StoreSnapshot,
        instance_id: &str,
        observed: &BTreeSet<u16>,
    ) -> Result<DriftReport> {
        if !snapshot.instances.contains(instance_id) {
            return Err(GatekeeperError::NotFound(format!(
                "instance {}",
                instance_id
            )));
        }

        let active = snapshot.ledger.active_ports_for_instance(instance_id);
        let (confirmed, leaked, rogue) = classify(&active, observed);

        Ok(DriftReport {
            instance_id: instance_id.to_string(),
            taken_at: snapshot.taken_at,
            confirmed,
            leaked,
            rogue,
        })
    }
}
