/**
 * table.rs
 * In-memory instance table composed into the store state
 *
 * Holds the registry semantics (duplicate detection, patching,
 * removal); the store wraps these in transactions and drives the
 * binding cascade on deregistration.
 */
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::{GatekeeperError, Result};
use crate::registry::{Instance, InstancePatch};

/// Instance records keyed by id, iterated in id order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct InstanceTable {
    instances: BTreeMap<String, Instance>,
}

impl InstanceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new instance. Fails with DuplicateInstance when the id
    /// is already taken.
    pub fn register(&mut self, instance: Instance) -> Result<Instance> {
        if self.instances.contains_key(&instance.id) {
            return Err(GatekeeperError::DuplicateInstance(instance.id));
        }
        self.instances.insert(instance.id.clone(), instance.clone());
        Ok(instance)
    }

    /// Apply a partial update to an existing instance.
    pub fn update(&mut self, id: &str, patch: &InstancePatch) -> Result<Instance> {
        let instance = self
            .instances
            .get_mut(id)
            .ok_or_else(|| GatekeeperError::NotFound(format!("instance {}", id)))?;
        patch.apply(instance);
        Ok(instance.clone())
    }

    /// Remove an instance record, returning it.
    pub fn remove(&mut self, id: &str) -> Result<Instance> {
        self.instances
            .remove(id)
            .ok_or_else(|| GatekeeperError::NotFound(format!("instance {}", id)))
    }

    pub fn get(&self, id: &str) -> Option<&Instance> {
        self.instances.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.instances.contains_key(id)
    }

    pub fn list(&self) -> Vec<Instance> {
        self.instances.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}
