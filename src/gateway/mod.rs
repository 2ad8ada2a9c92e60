//! Narrow interfaces to collaborators outside the core: access policy
//! derivation and event delivery.

pub mod notification;
pub mod policy;

pub use notification::*;
pub use policy::*;
