pub mod application;
pub mod binding;
pub mod common;
pub mod event;
pub mod page;
pub mod policy;
pub mod user_context;

pub use application::*;
pub use binding::*;
pub use common::*;
pub use event::*;
pub use page::*;
pub use policy::*;
pub use user_context::*;
