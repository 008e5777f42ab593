/**
 * book.rs
 * Append-mostly ledger of bindings, active and released
 *
 * Grants append; release stamps released_at in place. Records are
 * never removed, so the ledger doubles as the audit view the port
 * listing annotates from.
 */
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::errors::{GatekeeperError, Result};
use crate::ledger::{Binding, PortSelector};

/// All bindings ever granted, in grant order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct BindingLedger {
    bindings: Vec<Binding>,
}

impl BindingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, binding: Binding) {
        self.bindings.push(binding);
    }

    pub fn all(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn active(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.iter().filter(|b| b.is_active())
    }

    pub fn active_for_instance<'a>(
        &'a self,
        instance_id: &'a str,
    ) -> impl Iterator<Item = &'a Binding> {
        self.active().filter(move |b| b.instance_id == instance_id)
    }

    /// Union of the instance's active port runs.
    pub fn active_ports_for_instance(&self, instance_id: &str) -> BTreeSet<u16> {
        self.active_for_instance(instance_id)
            .flat_map(|b| b.port_numbers.iter().copied())
            .collect()
    }

    pub fn find_active_by_selector(&self, selector: &PortSelector) -> Option<&Binding> {
        self.active().find(|b| b.matches_selector(selector))
    }

    pub fn find_released_by_selector(&self, selector: &PortSelector) -> Option<&Binding> {
        self.bindings
            .iter()
            .filter(|b| !b.is_active())
            .find(|b| b.matches_selector(selector))
    }

    /// An active binding that strictly covers the selector, if any.
    /// Its existence means the caller asked for a partial release.
    pub fn find_active_covering(&self, selector: &PortSelector) -> Option<&Binding> {
        self.active().find(|b| b.covers_selector(selector))
    }

    /// Stamp released_at on the identified binding.
    pub fn release_binding(&mut self, binding_id: &str, at: DateTime<Utc>) -> Result<Binding> {
        let binding = self
            .bindings
            .iter_mut()
            .find(|b| b.id == binding_id)
            .ok_or_else(|| GatekeeperError::NotFound(format!("binding {}", binding_id)))?;

        if !binding.is_active() {
            return Err(GatekeeperError::Conflict(format!(
                "binding {} was already released",
                binding_id
            )));
        }

        binding.release(at);
        Ok(binding.clone())
    }

    /// Every binding, current or past, whose run contains the port.
    /// Used to annotate the port listing.
    pub fn bindings_for_port(&self, port: u16) -> Vec<&Binding> {
        self.bindings.iter().filter(|b| b.contains(port)).collect()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
