//! Boundary request/response types
//!
//! Every request is validated exactly once, here, before it reaches
//! the registry or allocator. Transport adapters (CLI today, HTTP
//! kept out of scope) construct these structs and map error kinds to
//! their own codes; nothing deeper in the crate re-validates shape.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::{GatekeeperError, Result};
use crate::ledger::{Binding, PortSelector};
use crate::registry::InstancePatch;

static INSTANCE_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,63}$").expect("instance id pattern compiles")
});

/// Validate an instance id against the accepted shape: alphanumeric
/// start, then up to 63 more of `[A-Za-z0-9._-]`.
pub fn validate_instance_id(id: &str) -> Result<()> {
    if INSTANCE_ID_RE.is_match(id) {
        Ok(())
    } else {
        Err(GatekeeperError::Validation(format!(
            "instance id '{}' must match {}",
            id,
            INSTANCE_ID_RE.as_str()
        )))
    }
}

fn default_range_size() -> u16 {
    1
}

/// register {instance_id, name, metadata}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegisterRequest {
    pub instance_id: String,
    pub name: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<()> {
        validate_instance_id(&self.instance_id)?;
        if self.name.trim().is_empty() {
            return Err(GatekeeperError::Validation(
                "name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// update {instance_id, name?, metadata?}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpdateRequest {
    pub instance_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
}

impl UpdateRequest {
    pub fn validate(&self) -> Result<()> {
        validate_instance_id(&self.instance_id)?;
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(GatekeeperError::Validation(
                    "name cannot be empty".to_string(),
                ));
            }
        }
        if self.name.is_none() && self.metadata.is_none() {
            return Err(GatekeeperError::Validation(
                "update requires at least one of name, metadata".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_patch(&self) -> InstancePatch {
        InstancePatch {
            name: self.name.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// reserve {instance_id, range_size?=1}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReserveRequest {
    pub instance_id: String,
    #[serde(default = "default_range_size")]
    pub range_size: u16,
}

impl ReserveRequest {
    pub fn validate(&self) -> Result<()> {
        validate_instance_id(&self.instance_id)?;
        if self.range_size == 0 {
            return Err(GatekeeperError::Validation(
                "range_size must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// reserve response {binding_id, start_port, end_port, instance_id}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReserveResponse {
    pub binding_id: String,
    pub start_port: u16,
    pub end_port: u16,
    pub instance_id: String,
}

impl ReserveResponse {
    pub fn from_binding(binding: &Binding) -> Self {
        Self {
            binding_id: binding.id.clone(),
            start_port: binding.start_port(),
            end_port: binding.end_port(),
            instance_id: binding.instance_id.clone(),
        }
    }
}

/// release {port_number?} | {start_port, end_port} {instance_id?}
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReleaseRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_number: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
}

impl ReleaseRequest {
    pub fn validate(&self) -> Result<()> {
        self.selector()?;
        if let Some(id) = &self.instance_id {
            validate_instance_id(id)?;
        }
        Ok(())
    }

    /// The selector this request names. Exactly one form must be
    /// present: a single port, or both ends of a range.
    pub fn selector(&self) -> Result<PortSelector> {
        match (self.port_number, self.start_port, self.end_port) {
            (Some(port), None, None) => Ok(PortSelector::Port(port)),
            (None, Some(start), Some(end)) => {
                if start > end {
                    return Err(GatekeeperError::Validation(format!(
                        "start_port ({}) must be <= end_port ({})",
                        start, end
                    )));
                }
                Ok(PortSelector::Range { start, end })
            }
            (None, None, None) => Err(GatekeeperError::Validation(
                "release requires port_number or start_port/end_port".to_string(),
            )),
            (None, Some(_), None) | (None, None, Some(_)) => Err(GatekeeperError::Validation(
                "start_port and end_port must be supplied together".to_string(),
            )),
            _ => Err(GatekeeperError::Validation(
                "supply either port_number or start_port/end_port, not both".to_string(),
            )),
        }
    }
}

/// release response {binding_id, released_at}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReleaseResponse {
    pub binding_id: String,
    pub released_at: DateTime<Utc>,
}

impl ReleaseResponse {
    pub fn from_binding(binding: &Binding) -> Result<Self> {
        let released_at = binding.released_at.ok_or_else(|| {
            GatekeeperError::Conflict(format!("binding {} is still active", binding.id))
        })?;
        Ok(Self {
            binding_id: binding.id.clone(),
            released_at,
        })
    }
}

/// observe {instance_id, used_ports}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObserveRequest {
    pub instance_id: String,
    pub used_ports: Vec<u16>,
}

impl ObserveRequest {
    pub fn validate(&self) -> Result<()> {
        validate_instance_id(&self.instance_id)
    }
}

/// observe response {confirmed, leaked, rogue}, each sorted ascending
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObserveResponse {
    pub confirmed: Vec<u16>,
    pub leaked: Vec<u16>,
    pub rogue: Vec<u16>,
}

/// One entry in the port listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortView {
    pub port_number: u16,
    pub is_reserved: bool,
    pub bindings: Vec<BindingSummary>,
}

/// Compact binding annotation attached to ports and listings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BindingSummary {
    pub binding_id: String,
    pub instance_id: String,
    pub start_port: u16,
    pub end_port: u16,
    pub bound_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub released_at: Option<DateTime<Utc>>,
}

impl BindingSummary {
    pub fn from_binding(binding: &Binding) -> Self {
        Self {
            binding_id: binding.id.clone(),
            instance_id: binding.instance_id.clone(),
            start_port: binding.start_port(),
            end_port: binding.end_port(),
            bound_at: binding.bound_at,
            released_at: binding.released_at,
        }
    }

    pub fn is_active(&self) -> bool {
        self.released_at.is_none()
    }
}
