/**
 * instance.rs
 * Logical named consumers of port leases
 *
 * An instance is bookkeeping identity only: not a process, not a
 * container. Agents report observations against the same ids.
 */
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A registered consumer that may hold port bindings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instance {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub registered_at: DateTime<Utc>,
}

impl Instance {
    pub fn new(id: &str, name: &str, metadata: BTreeMap<String, String>) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            metadata,
            registered_at: Utc::now(),
        }
    }
}

/// Partial update for an instance. Absent fields are left untouched;
/// a present metadata mapping replaces the whole mapping.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InstancePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
}

impl InstancePatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.metadata.is_none()
    }

    pub fn apply(&self, instance: &mut Instance) {
        if let Some(name) = &self.name {
            instance.name = name.clone();
        }
        if let Some(metadata) = &self.metadata {
            instance.metadata = metadata.clone();
        }
    }
}
