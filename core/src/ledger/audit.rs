/**
 * audit.rs
 * Append-only JSONL audit trail for ledger mutations
 *
 * One JSON object per line, appended under an advisory flock so
 * concurrent writers (daemon + CLI) interleave whole lines, never
 * fragments. The trail is write-mostly; reads exist for inspection
 * and tests.
 */
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{GatekeeperError, Result};
use crate::ledger::Binding;

/// What happened, recorded alongside who and which ports.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LedgerEventKind {
    Register,
    Update,
    Deregister,
    Reserve,
    Release,
}

/// Single audit line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEvent {
    pub tx_id: String,
    pub at: DateTime<Utc>,
    pub event: LedgerEventKind,
    pub instance_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binding_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ports: Option<Vec<u16>>,
}

impl LedgerEvent {
    fn new(event: LedgerEventKind, instance_id: &str) -> Self {
        Self {
            tx_id: generate_tx_id(),
            at: Utc::now(),
            event,
            instance_id: instance_id.to_string(),
            binding_id: None,
            ports: None,
        }
    }

    pub fn register(instance_id: &str) -> Self {
        Self::new(LedgerEventKind::Register, instance_id)
    }

    pub fn update(instance_id: &str) -> Self {
        Self::new(LedgerEventKind::Update, instance_id)
    }

    pub fn deregister(instance_id: &str) -> Self {
        Self::new(LedgerEventKind::Deregister, instance_id)
    }

    pub fn reserve(binding: &Binding) -> Self {
        let mut event = Self::new(LedgerEventKind::Reserve, &binding.instance_id);
        event.binding_id = Some(binding.id.clone());
        event.ports = Some(binding.port_numbers.clone());
        event
    }

    pub fn release(binding: &Binding) -> Self {
        let mut event = Self::new(LedgerEventKind::Release, &binding.instance_id);
        event.binding_id = Some(binding.id.clone());
        event.ports = Some(binding.port_numbers.clone());
        event
    }
}

/// Appender over the ledger.jsonl trail.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event as a single JSON line.
    pub fn append(&self, event: &LedgerEvent) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let line = serde_json::to_string(event)?;

        use std::fs::OpenOptions;
        use std::io::Write;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;

            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;

            let fd = file.as_raw_fd();

            // Advisory exclusive lock; blocks until available.
            unsafe {
                if libc::flock(fd, libc::LOCK_EX) != 0 {
                    return Err(GatekeeperError::Io(std::io::Error::last_os_error()));
                }
            }

            let write_result = writeln!(file, "{}", line);

            unsafe {
                libc::flock(fd, libc::LOCK_UN);
            }

            write_result?;
        }

        #[cfg(not(unix))]
        {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;

            writeln!(file, "{}", line)?;
        }

        Ok(())
    }

    /// Read the whole trail back, skipping blank lines. A missing file
    /// is an empty trail.
    pub fn read_all(&self) -> Result<Vec<LedgerEvent>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path)?;
        let mut events = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let event: LedgerEvent = serde_json::from_str(line)?;
            events.push(event);
        }
        Ok(events)
    }
}

/// Generate a transaction id: compact UTC timestamp plus an 8-char hex
/// short id.
///
/// Format: `yymmddHHMMSSf-shortId`
/// - yy: 2-digit year
/// - mm: 2-digit month
/// - dd: 2-digit day
/// - HH: 2-digit hour
/// - MM: 2-digit minute
/// - SS: 2-digit second
/// - f: 1-digit decisecond (milliseconds / 100)
/// - shortId: 8-character hex string
pub fn generate_tx_id() -> String {
    let now = Utc::now();

    let yy = format!("{:02}", now.year() % 100);
    let mm = format!("{:02}", now.month());
    let dd = format!("{:02}", now.day());
    let hh = format!("{:02}", now.hour());
    let min = format!("{:02}", now.minute());
    let ss = format!("{:02}", now.second());
    let f = format!("{}", now.timestamp_subsec_millis() / 100);

    use rand::Rng;
    let mut rng = rand::thread_rng();
    let random_bytes: [u8; 4] = rng.gen();
    let short_id = hex::encode(random_bytes);

    format!("{}{}{}{}{}{}{}-{}", yy, mm, dd, hh, min, ss, f, short_id)
}
