/**
 * range.rs
 * Inclusive port range [start, end] bounding the pool
 */
use serde::{Deserialize, Serialize};

use crate::errors::{GatekeeperError, Result};

/// Inclusive range of port numbers under management.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    /// Build a validated range. `start` must be at least 1 and must not
    /// exceed `end`.
    pub fn new(start: u16, end: u16) -> Result<Self> {
        if start == 0 {
            return Err(GatekeeperError::Validation(
                "port range start must be >= 1".to_string(),
            ));
        }
        if start > end {
            return Err(GatekeeperError::Validation(format!(
                "port range start ({}) must be <= end ({})",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Check if port is within this range
    pub fn contains(&self, port: u16) -> bool {
        port >= self.start && port <= self.end
    }

    /// Number of ports in the range (inclusive of both ends).
    pub fn len(&self) -> usize {
        (self.end - self.start) as usize + 1
    }

    pub fn is_empty(&self) -> bool {
        false // a validated range always holds at least one port
    }

    /// Ascending iteration over every port number in the range.
    pub fn iter(&self) -> impl Iterator<Item = u16> {
        self.start..=self.end
    }
}

impl std::fmt::Display for PortRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}
