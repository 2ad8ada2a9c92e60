pub mod application_lifecycle;
pub mod clone;
pub mod concurrency;
pub mod context;
pub mod page_lifecycle;
pub mod publish;
pub mod resolver;
pub mod saga;

pub use application_lifecycle::ApplicationLifecycle;
pub use clone::{CloneEngine, CloneTarget};
pub use concurrency::{update_application, ApplicationLocks, ApplicationUpdate};
pub use context::ServiceContext;
pub use page_lifecycle::PageLifecycle;
pub use publish::PublishEngine;
pub use resolver::IdentityResolver;
pub use saga::{Compensation, Saga};
