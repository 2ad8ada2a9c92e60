#[cfg(any(test, feature = "fault_injection"))]
pub mod fault;
pub mod memory;
pub mod postgres;
pub mod traits;

#[cfg(any(test, feature = "fault_injection"))]
pub use fault::*;
pub use memory::*;
pub use postgres::*;
pub use traits::*;
