/**
 * registry module
 * Named logical consumers that may hold port leases
 */

pub mod instance;
pub mod table;

pub use instance::{Instance, InstancePatch};
pub use table::InstanceTable;
