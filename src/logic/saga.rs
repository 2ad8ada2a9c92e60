//! Compensating-action runner for operations that write several records.
//!
//! Each forward write that succeeds records the action that undoes it. On
//! failure the recorded actions run newest first, and the caller receives a
//! single `PartialFailureRolledBack` error. Readers may see intermediate
//! state while a saga is in flight; they never see it after the saga ends.

use crate::error::{CompositeOp, ConflictKind, ServiceError};
use crate::model::{Application, BindingKey, BranchBinding, Id, Page};
use crate::store::traits::{Store, StoreResult};

/// Undo action for one completed forward step
#[derive(Debug, Clone)]
pub enum Compensation {
    RestoreApplication(Application),
    RestorePage(Page),
    DeleteApplication(Id),
    DeletePage(Id),
    RestoreBinding(BranchBinding),
    RemoveBinding(BindingKey),
}

impl Compensation {
    /// Put `before` back over a record that was saved at `saved_version`.
    /// The restored copy gets a version no reader holds, so stale writers
    /// still collide.
    pub fn restore_application(mut before: Application, saved_version: u64) -> Self {
        before.version = saved_version + 1;
        Compensation::RestoreApplication(before)
    }

    pub fn restore_page(mut before: Page, saved_version: u64) -> Self {
        before.version = saved_version + 1;
        Compensation::RestorePage(before)
    }

    fn describe(&self) -> String {
        match self {
            Compensation::RestoreApplication(a) => format!("restore application {}", a.id),
            Compensation::RestorePage(p) => format!("restore page {}", p.id),
            Compensation::DeleteApplication(id) => format!("delete application {}", id),
            Compensation::DeletePage(id) => format!("delete page {}", id),
            Compensation::RestoreBinding(b) => {
                format!("restore {} binding {}@{}", b.kind, b.default_id, b.branch_name)
            }
            Compensation::RemoveBinding(k) => {
                format!("remove {} binding {}@{}", k.kind, k.default_id, k.branch_name)
            }
        }
    }
}

pub struct Saga<'a, S: Store> {
    store: &'a S,
    operation: CompositeOp,
    compensations: Vec<Compensation>,
}

impl<'a, S: Store> Saga<'a, S> {
    pub fn new(store: &'a S, operation: CompositeOp) -> Self {
        Self {
            store,
            operation,
            compensations: Vec::new(),
        }
    }

    pub fn record(&mut self, compensation: Compensation) {
        self.compensations.push(compensation);
    }

    pub fn len(&self) -> usize {
        self.compensations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compensations.is_empty()
    }

    /// Forget the compensations; the operation is done
    pub fn complete(self) {
        log::debug!(
            "{} completed after {} steps",
            self.operation,
            self.compensations.len()
        );
    }

    /// Undo every recorded step and turn `err` into the error to return.
    ///
    /// Errors raised before anything was written (validation, lookups,
    /// collisions on the first write) pass through unchanged. Storage
    /// failures always become `PartialFailureRolledBack`. A lost branch
    /// claim comes back as `BranchExists` once the rollback is done.
    pub async fn abort(mut self, err: ServiceError) -> ServiceError {
        if self.compensations.is_empty() && !matches!(err, ServiceError::Storage(_)) {
            return err;
        }

        log::warn!(
            "{} failed after {} steps, rolling back: {}",
            self.operation,
            self.compensations.len(),
            err
        );

        while let Some(compensation) = self.compensations.pop() {
            if let Err(e) = self.compensate(&compensation).await {
                log::error!(
                    "Compensation '{}' for {} failed: {}",
                    compensation.describe(),
                    self.operation,
                    e
                );
            }
        }

        if matches!(err, ServiceError::Conflict(ConflictKind::BranchExists { .. })) {
            return err;
        }
        ServiceError::PartialFailureRolledBack {
            operation: self.operation,
            cause: err.to_string(),
        }
    }

    async fn compensate(&self, compensation: &Compensation) -> StoreResult<()> {
        match compensation {
            Compensation::RestoreApplication(application) => {
                self.store.restore_application(application.clone()).await
            }
            Compensation::RestorePage(page) => self.store.restore_page(page.clone()).await,
            Compensation::DeleteApplication(id) => {
                self.store.delete_application(id).await.map(|_| ())
            }
            Compensation::DeletePage(id) => self.store.delete_page(id).await.map(|_| ()),
            Compensation::RestoreBinding(binding) => self.store.put_binding(binding.clone()).await,
            Compensation::RemoveBinding(key) => self.store.remove_binding(key).await.map(|_| ()),
        }
    }
}
