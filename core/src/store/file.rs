/**
 * file.rs
 * File-backed lease store: state.json snapshot + ledger.jsonl trail
 *
 * Isolation model: one mutex serializes every mutation. A transaction
 * clones the current state, applies the operation to the clone,
 * persists the clone atomically (temp file + rename) and only then
 * swaps it in. Domain failures and persist failures both leave the
 * committed state exactly as it was.
 *
 * The audit trail is appended after commit; the state snapshot is the
 * source of truth, the trail is history.
 */
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::alloc::find_first_fit;
use crate::config::GatekeeperConfig;
use crate::errors::{GatekeeperError, Result};
use crate::ledger::{generate_tx_id, AuditLog, Binding, BindingLedger, LedgerEvent, PortSelector};
use crate::pool::{PortPool, PortRange};
use crate::registry::{Instance, InstancePatch, InstanceTable};
use crate::store::{DeregisterOutcome, LeaseStore, StoreSnapshot};

/// Persisted state.json shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreState {
    pub pool: PortPool,
    pub instances: InstanceTable,
    pub ledger: BindingLedger,
}

impl StoreState {
    fn seed(range: PortRange) -> Self {
        Self {
            pool: PortPool::new(range),
            instances: InstanceTable::new(),
            ledger: BindingLedger::new(),
        }
    }
}

/// File-backed store.
pub struct FileStore {
    state_path: PathBuf,
    audit: AuditLog,
    state: Mutex<StoreState>,
}

impl FileStore {
    /// Open (or seed) the store under the configured home directory.
    pub fn open(config: &GatekeeperConfig) -> Result<Self> {
        let range = PortRange::new(config.port_range_start, config.port_range_end)?;
        Self::open_at(config.state_path(), config.ledger_path(), range)
    }

    /// Open (or seed) the store at explicit paths.
    ///
    /// The pool is seeded once: when a state file already exists its
    /// recorded range stays authoritative, and a differing configured
    /// range is only warned about. Ports are never created or
    /// destroyed after seeding.
    pub fn open_at<P: AsRef<Path>, Q: AsRef<Path>>(
        state_path: P,
        ledger_path: Q,
        range: PortRange,
    ) -> Result<Self> {
        let state_path = state_path.as_ref().to_path_buf();

        let state = if state_path.exists() {
            let content = fs::read_to_string(&state_path)?;
            let state: StoreState = serde_json::from_str(&content)?;
            if state.pool.range() != range {
                tracing::warn!(
                    seeded = %state.pool.range(),
                    configured = %range,
                    "state file was seeded with a different port range; keeping the seeded range"
                );
            }
            state
        } else {
            let state = StoreState::seed(range);
            persist_state(&state_path, &state)?;
            state
        };

        Ok(Self {
            state_path,
            audit: AuditLog::new(ledger_path.as_ref()),
            state: Mutex::new(state),
        })
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Run one transaction: clone, apply, persist, swap. Events are
    /// appended to the audit trail only after the swap; a trail write
    /// failure is logged, not surfaced, since state.json already
    /// committed.
    fn transact<T>(
        &self,
        op: impl FnOnce(&mut StoreState) -> Result<(T, Vec<LedgerEvent>)>,
    ) -> Result<T> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| GatekeeperError::StoreUnavailable("state lock poisoned".to_string()))?;

        let mut next = guard.clone();
        let (value, events) = op(&mut next)?;

        persist_state(&self.state_path, &next)?;
        *guard = next;
        drop(guard);

        for event in &events {
            if let Err(e) = self.audit.append(event) {
                tracing::warn!(error = %e, "failed to append audit event");
            }
        }

        Ok(value)
    }
}

impl LeaseStore for FileStore {
    fn register_instance(&self, instance: Instance) -> Result<Instance> {
        self.transact(|state| {
            let stored = state.instances.register(instance)?;
            let events = vec![LedgerEvent::register(&stored.id)];
            Ok((stored, events))
        })
    }

    fn update_instance(&self, instance_id: &str, patch: InstancePatch) -> Result<Instance> {
        self.transact(|state| {
            let updated = state.instances.update(instance_id, &patch)?;
            let events = vec![LedgerEvent::update(instance_id)];
            Ok((updated, events))
        })
    }

    fn deregister_instance(&self, instance_id: &str) -> Result<DeregisterOutcome> {
        self.transact(|state| {
            if !state.instances.contains(instance_id) {
                return Err(GatekeeperError::NotFound(format!(
                    "instance {}",
                    instance_id
                )));
            }

            // Cascade: release every active binding before the record
            // goes away, so nothing active ever references a removed
            // instance.
            let binding_ids: Vec<String> = state
                .ledger
                .active_for_instance(instance_id)
                .map(|b| b.id.clone())
                .collect();

            let now = Utc::now();
            let mut released = Vec::with_capacity(binding_ids.len());
            let mut events = Vec::with_capacity(binding_ids.len() + 1);

            for binding_id in binding_ids {
                let binding = state.ledger.release_binding(&binding_id, now)?;
                state.pool.mark_free(&binding.port_numbers)?;
                events.push(LedgerEvent::release(&binding));
                released.push(binding);
            }

            let instance = state.instances.remove(instance_id)?;
            events.push(LedgerEvent::deregister(instance_id));

            Ok((DeregisterOutcome { instance, released }, events))
        })
    }

    fn reserve(&self, instance_id: &str, range_size: u16) -> Result<Binding> {
        self.transact(|state| {
            if range_size == 0 {
                return Err(GatekeeperError::Validation(
                    "range_size must be >= 1".to_string(),
                ));
            }
            if !state.instances.contains(instance_id) {
                return Err(GatekeeperError::NotFound(format!(
                    "instance {}",
                    instance_id
                )));
            }

            let start = find_first_fit(&state.pool, range_size).ok_or_else(|| {
                GatekeeperError::PoolExhausted(format!(
                    "no contiguous run of {} free ports in {}",
                    range_size,
                    state.pool.range()
                ))
            })?;

            let ports: Vec<u16> = (0..range_size).map(|i| start + i).collect();
            let binding = Binding::new(&generate_tx_id(), instance_id, ports)?;

            state.pool.mark_reserved(&binding.port_numbers)?;
            state.ledger.append(binding.clone());

            tracing::debug!(
                instance = instance_id,
                binding = %binding.id,
                start = binding.start_port(),
                end = binding.end_port(),
                "reserved port run"
            );

            let events = vec![LedgerEvent::reserve(&binding)];
            Ok((binding, events))
        })
    }

    fn release(&self, selector: PortSelector, instance_id: Option<&str>) -> Result<Binding> {
        self.transact(|state| {
            let matched = state
                .ledger
                .find_active_by_selector(&selector)
                .map(|b| (b.id.clone(), b.instance_id.clone()));

            let (binding_id, owner) = match matched {
                Some(found) => found,
                None => return Err(release_miss(state, &selector)),
            };

            if let Some(claimed) = instance_id {
                if claimed != owner {
                    return Err(GatekeeperError::Conflict(format!(
                        "{} is bound to instance {}, not {}",
                        selector, owner, claimed
                    )));
                }
            }

            let released = state.ledger.release_binding(&binding_id, Utc::now())?;
            state.pool.mark_free(&released.port_numbers)?;

            tracing::debug!(
                instance = %owner,
                binding = %released.id,
                "released port run"
            );

            let events = vec![LedgerEvent::release(&released)];
            Ok((released, events))
        })
    }

    fn snapshot(&self) -> Result<StoreSnapshot> {
        let guard = self
            .state
            .lock()
            .map_err(|_| GatekeeperError::StoreUnavailable("state lock poisoned".to_string()))?;

        Ok(StoreSnapshot {
            taken_at: Utc::now(),
            pool: guard.pool.clone(),
            instances: guard.instances.clone(),
            ledger: guard.ledger.clone(),
        })
    }
}

/// Classify a release selector that matched no active binding.
fn release_miss(state: &StoreState, selector: &PortSelector) -> GatekeeperError {
    if let Some(covering) = state.ledger.find_active_covering(selector) {
        return GatekeeperError::Conflict(format!(
            "{} is part of binding {} covering [{}, {}]; partial release is not supported",
            selector,
            covering.id,
            covering.start_port(),
            covering.end_port()
        ));
    }
    if let Some(released) = state.ledger.find_released_by_selector(selector) {
        return GatekeeperError::Conflict(format!(
            "{} was already released (binding {})",
            selector, released.id
        ));
    }
    GatekeeperError::NotFound(format!("no active binding matches {}", selector))
}

/// Write the state snapshot atomically. Any failure here is a
/// `StoreUnavailable`: the caller keeps the previous committed state.
fn persist_state(path: &Path, state: &StoreState) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            GatekeeperError::StoreUnavailable(format!("failed to create state dir: {}", e))
        })?;
    }

    let json = serde_json::to_string_pretty(state)
        .map_err(|e| GatekeeperError::StoreUnavailable(format!("failed to serialize state: {}", e)))?;

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)
        .map_err(|e| GatekeeperError::StoreUnavailable(format!("failed to write state: {}", e)))?;
    fs::rename(&tmp, path)
        .map_err(|e| GatekeeperError::StoreUnavailable(format!("failed to commit state: {}", e)))?;

    tracing::debug!(path = %path.display(), "persisted state snapshot");
    Ok(())
}
