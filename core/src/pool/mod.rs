/**
 * pool module
 * Bounded universe of allocatable ports and their reserved/free state
 */

pub mod range;
pub mod state;

pub use range::PortRange;
pub use state::PortPool;
