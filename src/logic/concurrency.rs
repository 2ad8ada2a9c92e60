use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::error::ServiceResult;
use crate::logic::context::ServiceContext;
use crate::model::{Application, Id};
use crate::store::traits::{Store, StoreError};

/// One async mutex per application id. Operations on different
/// applications never wait on each other.
#[derive(Debug, Clone, Default)]
pub struct ApplicationLocks {
    locks: Arc<Mutex<HashMap<Id, Arc<AsyncMutex<()>>>>>,
}

impl ApplicationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, application_id: &Id) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            // Entries only the table still references are idle
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(application_id.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Number of applications with a lock currently held or awaited
    pub fn active(&self) -> usize {
        self.locks
            .lock()
            .values()
            .filter(|lock| Arc::strong_count(lock) > 1)
            .count()
    }
}

/// Outcome of a read-modify-write on an application
#[derive(Debug)]
pub struct ApplicationUpdate<T> {
    /// The copy the successful attempt started from
    pub before: Application,
    pub after: Application,
    pub output: T,
}

/// Load, mutate and compare-and-swap an application, reloading and
/// re-applying `mutate` when another writer got there first.
pub async fn update_application<S, T, F>(
    ctx: &ServiceContext<S>,
    application_id: &Id,
    mut mutate: F,
) -> ServiceResult<ApplicationUpdate<T>>
where
    S: Store,
    F: FnMut(&mut Application) -> ServiceResult<T>,
{
    let mut attempt = 0;
    loop {
        let before = ctx.load_application(application_id).await?;
        let mut application = before.clone();
        let output = mutate(&mut application)?;
        application.touch();

        match ctx.store.save_application(application).await {
            Ok(after) => {
                return Ok(ApplicationUpdate {
                    before,
                    after,
                    output,
                })
            }
            Err(StoreError::Conflict { .. }) if attempt < ctx.settings.max_write_retries => {
                attempt += 1;
                log::debug!(
                    "Write collision on application {}, retrying ({}/{})",
                    application_id,
                    attempt,
                    ctx.settings.max_write_retries
                );
            }
            Err(e) => return Err(e.into()),
        }
    }
}
