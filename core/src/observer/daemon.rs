/**
 * daemon.rs
 * Spool-watching observer loop
 *
 * Agents drop observation reports into the spool directory; the
 * daemon feeds each one through reconciliation and logs the drift.
 * Event-driven via the notify crate with a polling fallback, shutdown
 * through a shared atomic flag.
 *
 * Grace period: the engine reports raw sets, and a lease younger than
 * one report interval is expected to look leaked while its process
 * binds up. The daemon logs those ports as "settling" and only calls
 * the rest "leaked".
 */
use chrono::{DateTime, Utc};
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::channel;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::errors::Result;
use crate::ledger::BindingLedger;
use crate::observer::ObservationReport;
use crate::reconcile::{DriftReport, ReconciliationEngine};
use crate::service::Gatekeeper;

pub struct ObserverDaemon {
    gatekeeper: Arc<Gatekeeper>,
    spool_dir: PathBuf,
    interval: Duration,
    log_file: Mutex<fs::File>,
}

impl ObserverDaemon {
    /// Create the daemon, preparing the spool directory and log file.
    pub fn new(gatekeeper: Arc<Gatekeeper>, spool_dir: PathBuf, interval: Duration) -> Result<Self> {
        fs::create_dir_all(&spool_dir)?;

        let log_path = gatekeeper.config().home.join("observer.log");
        if let Some(parent) = log_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let log_file = OpenOptions::new().create(true).append(true).open(log_path)?;

        Ok(Self {
            gatekeeper,
            spool_dir,
            interval,
            log_file: Mutex::new(log_file),
        })
    }

    pub fn spool_dir(&self) -> &Path {
        &self.spool_dir
    }

    /// Start watching the spool (event-driven with notify crate)
    ///
    /// Uses filesystem events for instant pickup with fallback polling.
    pub async fn start(&self, shutdown: Arc<AtomicBool>) -> Result<()> {
        self.log(&format!(
            "[Observer] Watching spool: {} (event-driven)",
            self.spool_dir.display()
        ));
        self.log(&format!(
            "[Observer] Report interval / grace period: {}s",
            self.interval.as_secs()
        ));

        // Process reports that arrived before we started.
        self.drain_spool();

        let (tx, rx) = channel();
        let mut watcher = match RecommendedWatcher::new(tx, NotifyConfig::default()) {
            Ok(w) => Some(w),
            Err(e) => {
                self.log(&format!(
                    "[Observer] Warning: Could not create watcher, falling back to polling: {}",
                    e
                ));
                None
            }
        };

        if let Some(ref mut w) = watcher {
            if let Err(e) = w.watch(&self.spool_dir, RecursiveMode::NonRecursive) {
                self.log(&format!(
                    "[Observer] Warning: Could not watch spool, falling back to polling: {}",
                    e
                ));
                watcher = None;
            }
        }

        if watcher.is_some() {
            self.log("[Observer] Ready - Waiting for filesystem events");

            let mut last_drain = Instant::now();
            loop {
                if shutdown.load(Ordering::SeqCst) {
                    self.log("[Observer] Received shutdown signal, exiting gracefully");
                    break;
                }

                match rx.recv_timeout(Duration::from_millis(1000)) {
                    Ok(Ok(event)) => {
                        if is_report_event(&event) {
                            self.drain_spool();
                            last_drain = Instant::now();
                        }
                    }
                    Ok(Err(e)) => {
                        self.log(&format!("[Observer] Watcher error: {}", e));
                    }
                    Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                        // Sweep on the report interval in case an event
                        // was missed or a transient failure left a
                        // report behind.
                        if last_drain.elapsed() >= self.interval {
                            self.drain_spool();
                            last_drain = Instant::now();
                        }
                    }
                    Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                        self.log("[Observer] Watcher channel closed, exiting");
                        break;
                    }
                }
            }
        } else {
            self.log("[Observer] Using polling mode (500ms interval)");

            loop {
                if shutdown.load(Ordering::SeqCst) {
                    self.log("[Observer] Received shutdown signal, exiting gracefully");
                    break;
                }

                self.drain_spool();
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }

        self.log("[Observer] Stopped");
        Ok(())
    }

    /// Process every report currently in the spool, oldest file name
    /// first. Processed and malformed reports are removed; reports
    /// that hit a transient store failure stay for the next sweep.
    /// Returns how many reports were processed.
    pub fn drain_spool(&self) -> usize {
        let entries = match fs::read_dir(&self.spool_dir) {
            Ok(entries) => entries,
            Err(e) => {
                self.log(&format!("[Observer] Warning: Cannot read spool: {}", e));
                return 0;
            }
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("json"))
            .collect();
        files.sort();

        let mut processed = 0;
        for path in files {
            match self.process_report(&path) {
                Ok(()) => {
                    processed += 1;
                    self.remove_report(&path);
                }
                Err(e) if e.is_retryable() => {
                    self.log(&format!(
                        "[Observer] Store unavailable for {}, keeping report: {}",
                        path.display(),
                        e
                    ));
                }
                Err(e) => {
                    self.log(&format!(
                        "[Observer] Dropping report {}: {}",
                        path.display(),
                        e
                    ));
                    self.remove_report(&path);
                }
            }
        }

        if processed > 0 {
            tracing::debug!(processed, "drained observation spool");
        }
        processed
    }

    fn process_report(&self, path: &Path) -> Result<()> {
        let report = ObservationReport::load(path)?;
        let observed: BTreeSet<u16> = report.used_ports.iter().copied().collect();

        // One snapshot serves both the classification and the binding
        // ages the grace split needs.
        let snapshot = self.gatekeeper.snapshot()?;
        let drift =
            ReconciliationEngine::classify_snapshot(&snapshot, &report.instance_id, &observed)?;

        let (settling, leaked) =
            split_settling(&drift, &snapshot.ledger, self.interval, Utc::now());

        if drift.is_clean() {
            self.log(&format!(
                "[Observer] [{}] clean: {} port(s) confirmed",
                drift.instance_id,
                drift.confirmed.len()
            ));
            return Ok(());
        }

        if !settling.is_empty() {
            self.log(&format!(
                "[Observer] [{}] settling (leased < {}s ago, not listening yet): {:?}",
                drift.instance_id,
                self.interval.as_secs(),
                settling
            ));
        }
        if !leaked.is_empty() {
            self.log(&format!(
                "[Observer] [{}] leaked (leased but not listening): {:?}",
                drift.instance_id, leaked
            ));
        }
        if !drift.rogue.is_empty() {
            self.log(&format!(
                "[Observer] [{}] rogue (listening but not leased): {:?}",
                drift.instance_id, drift.rogue
            ));
        }

        Ok(())
    }

    fn remove_report(&self, path: &Path) {
        if let Err(e) = fs::remove_file(path) {
            self.log(&format!(
                "[Observer] Warning: Could not remove {}: {}",
                path.display(),
                e
            ));
        }
    }

    fn log(&self, msg: &str) {
        println!("{}", msg);
        if let Ok(mut file) = self.log_file.lock() {
            writeln!(file, "{}", msg).ok();
        }
    }
}

/// Split leaked ports into those still inside the grace period
/// (binding younger than one report interval) and those actionable.
fn split_settling(
    report: &DriftReport,
    ledger: &BindingLedger,
    grace: Duration,
    now: DateTime<Utc>,
) -> (BTreeSet<u16>, BTreeSet<u16>) {
    let mut settling = BTreeSet::new();
    let mut actionable = BTreeSet::new();

    for &port in &report.leaked {
        let young = ledger
            .active_for_instance(&report.instance_id)
            .find(|binding| binding.contains(port))
            .map(|binding| {
                let age = now
                    .signed_duration_since(binding.bound_at)
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                age < grace
            })
            .unwrap_or(false);

        if young {
            settling.insert(port);
        } else {
            actionable.insert(port);
        }
    }

    (settling, actionable)
}

fn is_report_event(event: &Event) -> bool {
    let is_relevant = matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_));
    if !is_relevant {
        return false;
    }

    event.paths.iter().any(|path| {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext == "json")
            .unwrap_or(false)
    })
}
