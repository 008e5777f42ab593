/**
 * report.rs
 * Observation report files agents drop into the spool
 *
 * Format (one JSON object per file):
 * ```json
 * {
 *   "instance_id": "web-1",
 *   "used_ports": [8000, 8001],
 *   "reported_at": "2026-08-23T10:15:00Z"
 * }
 * ```
 */
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::errors::Result;

/// One agent report: which ports an instance was seen listening on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObservationReport {
    pub instance_id: String,
    pub used_ports: Vec<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reported_at: Option<DateTime<Utc>>,
}

impl ObservationReport {
    pub fn new(instance_id: &str, used_ports: Vec<u16>) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            used_ports,
            reported_at: Some(Utc::now()),
        }
    }

    /// Load a report from a spool file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let report: ObservationReport = serde_json::from_str(&content)?;
        Ok(report)
    }

    /// Write the report as a spool file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        Ok(())
    }
}
