/**
 * ledger module
 * Append-mostly lease history: grants, releases, audit trail
 */

pub mod audit;
pub mod binding;
pub mod book;

pub use audit::{generate_tx_id, AuditLog, LedgerEvent, LedgerEventKind};
pub use binding::{Binding, PortSelector};
pub use book::BindingLedger;
