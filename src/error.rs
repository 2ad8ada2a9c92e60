use std::fmt;

use thiserror::Error;

use crate::model::{EntityKind, Id};
use crate::store::StoreError;

/// Why a request collided with existing state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictKind {
    /// A concurrent writer changed the entity and retries ran out
    WriteCollision { entity: EntityKind, id: Id },
    /// Published pages leave only through a publish cycle
    PublishedPageNotDeletable { page_id: Id },
    /// The logical application already has a copy on that branch
    BranchExists { default_application_id: Id, branch_name: String },
    /// More than one application carries the name and the tie-break refuses to pick
    AmbiguousName { name: String, candidates: usize },
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictKind::WriteCollision { entity, id } => {
                write!(f, "concurrent modification of {} '{}'", entity, id)
            }
            ConflictKind::PublishedPageNotDeletable { page_id } => write!(
                f,
                "page '{}' has been published and can only be removed by publishing",
                page_id
            ),
            ConflictKind::BranchExists {
                default_application_id,
                branch_name,
            } => write!(
                f,
                "application '{}' already exists on branch '{}'",
                default_application_id, branch_name
            ),
            ConflictKind::AmbiguousName { name, candidates } => {
                write!(f, "{} applications are named '{}'", candidates, name)
            }
        }
    }
}

/// Composite operations that run as sagas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeOp {
    CreateApplication,
    CloneApplication,
    ClonePage,
    CreatePage,
    DeletePage,
    Publish,
    DeleteApplication,
}

impl fmt::Display for CompositeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompositeOp::CreateApplication => "create application",
            CompositeOp::CloneApplication => "clone application",
            CompositeOp::ClonePage => "clone page",
            CompositeOp::CreatePage => "create page",
            CompositeOp::DeletePage => "delete page",
            CompositeOp::Publish => "publish",
            CompositeOp::DeleteApplication => "delete application",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by every lifecycle operation
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: EntityKind, id: String },

    #[error("conflict: {0}")]
    Conflict(ConflictKind),

    /// The operation started writing, failed, and was fully undone; retry it from scratch
    #[error("{operation} failed and was rolled back: {cause}")]
    PartialFailureRolledBack { operation: CompositeOp, cause: String },

    #[error("storage failure: {0}")]
    Storage(#[source] anyhow::Error),
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(message.into())
    }

    pub fn not_found(entity: EntityKind, id: impl fmt::Display) -> Self {
        ServiceError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ServiceError::Conflict(_))
    }

    pub fn is_rolled_back(&self) -> bool {
        matches!(self, ServiceError::PartialFailureRolledBack { .. })
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => ServiceError::NotFound { entity, id },
            StoreError::Conflict { entity, id, .. } => {
                ServiceError::Conflict(ConflictKind::WriteCollision { entity, id })
            }
            StoreError::Io(e) => ServiceError::Storage(e),
        }
    }
}
