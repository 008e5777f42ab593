/**
 * observer module
 * Spool feed of agent observations and the daemon that drains it
 */

pub mod daemon;
pub mod report;

pub use daemon::ObserverDaemon;
pub use report::ObservationReport;
