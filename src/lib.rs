pub mod api;
pub mod config;
pub mod error;
pub mod gateway;
pub mod logic;
pub mod model;
pub mod seed;
pub mod store;

// Export the service surface
pub use api::ApplicationPageService;

pub use config::{AppConfig, NameTieBreak, ServiceSettings};
pub use error::{CompositeOp, ConflictKind, ServiceError, ServiceResult};

// Export engine types
pub use logic::{
    ApplicationLifecycle, CloneEngine, CloneTarget, IdentityResolver, PageLifecycle,
    PublishEngine, ServiceContext,
};

// Export all model types
pub use model::*;

// Export store types
pub use store::{MemoryStore, PostgresStore, Store, StoreError};

/// Build a service backed by PostgreSQL from loaded configuration,
/// creating the schema if needed.
pub async fn connect(config: &AppConfig) -> anyhow::Result<ApplicationPageService<PostgresStore>> {
    let database_url = config.database_url()?;
    let store = PostgresStore::new(&database_url, config.max_connections()).await?;
    store.migrate().await?;
    Ok(ApplicationPageService::new(
        std::sync::Arc::new(store),
        config.service.clone(),
    ))
}
