/**
 * store module
 * Transactional repository over pool + registry + ledger state
 */

pub mod file;
pub mod traits;

pub use file::{FileStore, StoreState};
pub use traits::{DeregisterOutcome, LeaseStore, StoreSnapshot};
