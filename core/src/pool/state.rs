/**
 * state.rs
 * Reserved/free bookkeeping for every port in the configured range
 *
 * The pool is the source of truth for the `reserved` flag. Mutations
 * happen only inside store transactions driven by the allocator; no
 * external caller flips a flag directly. The reserved set is kept
 * consistent with the ledger's active bindings by construction.
 */
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::errors::{GatekeeperError, Result};
use crate::pool::PortRange;

/// Fixed universe of port numbers with their reserved state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortPool {
    range: PortRange,
    reserved: BTreeSet<u16>,
}

impl PortPool {
    /// Seed a pool from the configured range; every port starts free.
    pub fn new(range: PortRange) -> Self {
        Self {
            range,
            reserved: BTreeSet::new(),
        }
    }

    pub fn range(&self) -> PortRange {
        self.range
    }

    /// A port outside the managed range is never free: it is not part
    /// of the pool's universe at all.
    pub fn is_free(&self, port: u16) -> bool {
        self.range.contains(port) && !self.reserved.contains(&port)
    }

    pub fn is_reserved(&self, port: u16) -> bool {
        self.range.contains(port) && self.reserved.contains(&port)
    }

    /// Flip the given ports to reserved. Every port must be in range
    /// and currently free; otherwise nothing is changed and a Conflict
    /// is returned, since a double-reserve means an invariant broke
    /// upstream.
    pub fn mark_reserved(&mut self, ports: &[u16]) -> Result<()> {
        for &port in ports {
            if !self.range.contains(port) {
                return Err(GatekeeperError::Conflict(format!(
                    "port {} is outside the pool range {}",
                    port, self.range
                )));
            }
            if self.reserved.contains(&port) {
                return Err(GatekeeperError::Conflict(format!(
                    "port {} is already reserved",
                    port
                )));
            }
        }
        for &port in ports {
            self.reserved.insert(port);
        }
        Ok(())
    }

    /// Flip the given ports back to free. Every port must be in range
    /// and currently reserved; otherwise nothing is changed and a
    /// Conflict is returned.
    pub fn mark_free(&mut self, ports: &[u16]) -> Result<()> {
        for &port in ports {
            if !self.range.contains(port) {
                return Err(GatekeeperError::Conflict(format!(
                    "port {} is outside the pool range {}",
                    port, self.range
                )));
            }
            if !self.reserved.contains(&port) {
                return Err(GatekeeperError::Conflict(format!(
                    "port {} is already free",
                    port
                )));
            }
        }
        for &port in ports {
            self.reserved.remove(&port);
        }
        Ok(())
    }

    pub fn reserved_count(&self) -> usize {
        self.reserved.len()
    }

    pub fn free_count(&self) -> usize {
        self.range.len() - self.reserved.len()
    }

    /// Ascending view of (port number, reserved) for listings.
    pub fn ports(&self) -> impl Iterator<Item = (u16, bool)> + '_ {
        self.range
            .iter()
            .map(move |port| (port, self.reserved.contains(&port)))
    }

    /// Ascending view of the reserved port numbers.
    pub fn reserved_ports(&self) -> impl Iterator<Item = u16> + '_ {
        self.reserved.iter().copied()
    }
}
