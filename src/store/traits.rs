use thiserror::Error;

use crate::model::{Application, BindingKey, BranchBinding, EntityKind, Id, Page};

/// Failures reported by the persistence boundary
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} '{id}' does not exist")]
    NotFound { entity: EntityKind, id: Id },

    /// Compare-and-swap failed: someone else saved since `expected` was read
    #[error("write conflict on {entity} '{id}' (expected version {expected})")]
    Conflict {
        entity: EntityKind,
        id: Id,
        expected: u64,
    },

    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Application records.
///
/// `save_application` inserts when `version == 0` (conflict if the id is
/// taken) and otherwise compare-and-swaps on `version`. The returned copy
/// carries the new version.
#[async_trait::async_trait]
pub trait ApplicationStore: Send + Sync {
    async fn get_application(&self, id: &Id) -> StoreResult<Option<Application>>;
    async fn list_applications_by_name(&self, name: &str) -> StoreResult<Vec<Application>>;
    async fn save_application(&self, application: Application) -> StoreResult<Application>;
    /// Unconditional write, only for compensating actions
    async fn restore_application(&self, application: Application) -> StoreResult<()>;
    async fn delete_application(&self, id: &Id) -> StoreResult<bool>;
}

/// Page records, same save contract as applications
#[async_trait::async_trait]
pub trait PageStore: Send + Sync {
    async fn get_page(&self, id: &Id) -> StoreResult<Option<Page>>;
    /// Every page owned by the application, including ones pending deletion
    async fn list_pages_for_application(&self, application_id: &Id) -> StoreResult<Vec<Page>>;
    async fn save_page(&self, page: Page) -> StoreResult<Page>;
    async fn restore_page(&self, page: Page) -> StoreResult<()>;
    async fn delete_page(&self, id: &Id) -> StoreResult<bool>;
}

/// The (default id, branch) -> concrete id index
#[async_trait::async_trait]
pub trait BindingStore: Send + Sync {
    async fn get_binding(&self, key: &BindingKey) -> StoreResult<Option<BranchBinding>>;
    /// Claim the key for `binding`. `Conflict` when the key is already bound.
    async fn insert_binding(&self, binding: BranchBinding) -> StoreResult<()>;
    /// Insert or replace the binding for its key, only for compensating actions
    async fn put_binding(&self, binding: BranchBinding) -> StoreResult<()>;
    async fn remove_binding(&self, key: &BindingKey) -> StoreResult<bool>;
}

pub trait Store: ApplicationStore + PageStore + BindingStore + Send + Sync {}

impl<T: ApplicationStore + PageStore + BindingStore + Send + Sync> Store for T {}
