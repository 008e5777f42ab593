/**
 * binding.rs
 * Lease records: a contiguous port run granted to one instance
 *
 * A binding's port run is immutable once granted. Release never edits
 * the run, it only stamps released_at; the record stays in the ledger
 * as audit history.
 */
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{GatekeeperError, Result};

/// A granted lease over a contiguous ascending run of ports.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Binding {
    pub id: String,
    pub instance_id: String,
    pub port_numbers: Vec<u16>,
    pub bound_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
}

/// Release target: one port, or an explicit inclusive range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSelector {
    Port(u16),
    Range { start: u16, end: u16 },
}

impl Binding {
    /// Create an active binding over the given run. The run must be
    /// non-empty, ascending and contiguous.
    pub fn new(id: &str, instance_id: &str, port_numbers: Vec<u16>) -> Result<Self> {
        if port_numbers.is_empty() {
            return Err(GatekeeperError::Validation(
                "binding requires at least one port".to_string(),
            ));
        }
        if !is_contiguous_ascending(&port_numbers) {
            return Err(GatekeeperError::Validation(format!(
                "binding ports must be a contiguous ascending run, got {:?}",
                port_numbers
            )));
        }
        Ok(Self {
            id: id.to_string(),
            instance_id: instance_id.to_string(),
            port_numbers,
            bound_at: Utc::now(),
            released_at: None,
        })
    }

    pub fn is_active(&self) -> bool {
        self.released_at.is_none()
    }

    pub fn start_port(&self) -> u16 {
        self.port_numbers[0]
    }

    pub fn end_port(&self) -> u16 {
        self.port_numbers[self.port_numbers.len() - 1]
    }

    pub fn range_size(&self) -> usize {
        self.port_numbers.len()
    }

    pub fn contains(&self, port: u16) -> bool {
        port >= self.start_port() && port <= self.end_port()
    }

    /// Exact match: the selector must cover precisely this binding's
    /// run, nothing less and nothing more.
    pub fn matches_selector(&self, selector: &PortSelector) -> bool {
        let (start, end) = selector.bounds();
        self.start_port() == start && self.end_port() == end
    }

    /// True when the selector falls entirely inside this binding's run
    /// without matching it exactly. Used to reject partial release
    /// with a pointer at the covering binding.
    pub fn covers_selector(&self, selector: &PortSelector) -> bool {
        let (start, end) = selector.bounds();
        self.contains(start) && self.contains(end) && !self.matches_selector(selector)
    }

    /// Stamp the release time. The run itself never changes.
    pub fn release(&mut self, at: DateTime<Utc>) {
        self.released_at = Some(at);
    }
}

impl PortSelector {
    /// Normalized (start, end) bounds; a single port selects the
    /// one-port range.
    pub fn bounds(&self) -> (u16, u16) {
        match self {
            PortSelector::Port(p) => (*p, *p),
            PortSelector::Range { start, end } => (*start, *end),
        }
    }
}

impl std::fmt::Display for PortSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortSelector::Port(p) => write!(f, "port {}", p),
            PortSelector::Range { start, end } => write!(f, "range [{}, {}]", start, end),
        }
    }
}

fn is_contiguous_ascending(ports: &[u16]) -> bool {
    ports
        .windows(2)
        .all(|pair| pair[0].checked_add(1) == Some(pair[1]))
}
