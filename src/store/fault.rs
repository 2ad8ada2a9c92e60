//! Store wrapper that fails a chosen call, used to exercise saga rollback.

use anyhow::anyhow;
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::model::{Application, BindingKey, BranchBinding, Id, Page};
use crate::store::traits::{ApplicationStore, BindingStore, PageStore, StoreResult};

/// Operations a fault can be injected into. Restores are never faulted so
/// compensations always get through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    SaveApplication,
    DeleteApplication,
    SavePage,
    DeletePage,
    InsertBinding,
    RemoveBinding,
}

#[derive(Debug)]
pub struct FaultyStore<S> {
    inner: S,
    /// Fail the n-th (1-based) call of each listed point, once
    plan: Mutex<HashMap<FaultPoint, usize>>,
    calls: Mutex<HashMap<FaultPoint, usize>>,
}

impl<S> FaultyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            plan: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Arm a failure for the `nth` call of `point`, counted from now
    pub fn fail_on(&self, point: FaultPoint, nth: usize) {
        self.calls.lock().remove(&point);
        self.plan.lock().insert(point, nth);
    }

    pub fn disarm(&self) {
        self.plan.lock().clear();
        self.calls.lock().clear();
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn check(&self, point: FaultPoint) -> StoreResult<()> {
        let count = {
            let mut calls = self.calls.lock();
            let count = calls.entry(point).or_insert(0);
            *count += 1;
            *count
        };

        let mut plan = self.plan.lock();
        if plan.get(&point) == Some(&count) {
            plan.remove(&point);
            return Err(anyhow!("injected failure on {:?} call {}", point, count).into());
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl<S: ApplicationStore> ApplicationStore for FaultyStore<S> {
    async fn get_application(&self, id: &Id) -> StoreResult<Option<Application>> {
        self.inner.get_application(id).await
    }

    async fn list_applications_by_name(&self, name: &str) -> StoreResult<Vec<Application>> {
        self.inner.list_applications_by_name(name).await
    }

    async fn save_application(&self, application: Application) -> StoreResult<Application> {
        self.check(FaultPoint::SaveApplication)?;
        self.inner.save_application(application).await
    }

    async fn restore_application(&self, application: Application) -> StoreResult<()> {
        self.inner.restore_application(application).await
    }

    async fn delete_application(&self, id: &Id) -> StoreResult<bool> {
        self.check(FaultPoint::DeleteApplication)?;
        self.inner.delete_application(id).await
    }
}

#[async_trait::async_trait]
impl<S: PageStore> PageStore for FaultyStore<S> {
    async fn get_page(&self, id: &Id) -> StoreResult<Option<Page>> {
        self.inner.get_page(id).await
    }

    async fn list_pages_for_application(&self, application_id: &Id) -> StoreResult<Vec<Page>> {
        self.inner.list_pages_for_application(application_id).await
    }

    async fn save_page(&self, page: Page) -> StoreResult<Page> {
        self.check(FaultPoint::SavePage)?;
        self.inner.save_page(page).await
    }

    async fn restore_page(&self, page: Page) -> StoreResult<()> {
        self.inner.restore_page(page).await
    }

    async fn delete_page(&self, id: &Id) -> StoreResult<bool> {
        self.check(FaultPoint::DeletePage)?;
        self.inner.delete_page(id).await
    }
}

#[async_trait::async_trait]
impl<S: BindingStore> BindingStore for FaultyStore<S> {
    async fn get_binding(&self, key: &BindingKey) -> StoreResult<Option<BranchBinding>> {
        self.inner.get_binding(key).await
    }

    async fn insert_binding(&self, binding: BranchBinding) -> StoreResult<()> {
        self.check(FaultPoint::InsertBinding)?;
        self.inner.insert_binding(binding).await
    }

    async fn put_binding(&self, binding: BranchBinding) -> StoreResult<()> {
        self.inner.put_binding(binding).await
    }

    async fn remove_binding(&self, key: &BindingKey) -> StoreResult<bool> {
        self.check(FaultPoint::RemoveBinding)?;
        self.inner.remove_binding(key).await
    }
}
