use parking_lot::RwLock;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use crate::model::{Application, BindingKey, BranchBinding, EntityKind, Id, Page};
use crate::store::traits::{ApplicationStore, BindingStore, PageStore, StoreError, StoreResult};

#[derive(Debug, Default)]
struct MemoryState {
    applications: HashMap<Id, Application>,
    pages: HashMap<Id, Page>,
    bindings: HashMap<BindingKey, BranchBinding>,
}

/// Process-local store used by tests and embedded deployments
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn application_count(&self) -> usize {
        self.state.read().applications.len()
    }

    pub fn page_count(&self) -> usize {
        self.state.read().pages.len()
    }

    pub fn binding_count(&self) -> usize {
        self.state.read().bindings.len()
    }
}

/// Shared insert/compare-and-swap logic for versioned records
fn versioned_save<T: Clone>(
    map: &mut HashMap<Id, T>,
    entity: EntityKind,
    id: &Id,
    mut record: T,
    version_of: impl Fn(&T) -> u64,
    set_version: impl Fn(&mut T, u64),
) -> StoreResult<T> {
    let expected = version_of(&record);
    match map.get(id) {
        None if expected == 0 => {}
        None => {
            return Err(StoreError::NotFound {
                entity,
                id: id.clone(),
            })
        }
        Some(stored) if version_of(stored) == expected && expected != 0 => {}
        Some(_) => {
            return Err(StoreError::Conflict {
                entity,
                id: id.clone(),
                expected,
            })
        }
    }

    set_version(&mut record, expected + 1);
    map.insert(id.clone(), record.clone());
    Ok(record)
}

#[async_trait::async_trait]
impl ApplicationStore for MemoryStore {
    async fn get_application(&self, id: &Id) -> StoreResult<Option<Application>> {
        Ok(self.state.read().applications.get(id).cloned())
    }

    async fn list_applications_by_name(&self, name: &str) -> StoreResult<Vec<Application>> {
        let state = self.state.read();
        let mut found: Vec<Application> = state
            .applications
            .values()
            .filter(|app| app.name == name)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(found)
    }

    async fn save_application(&self, application: Application) -> StoreResult<Application> {
        let mut state = self.state.write();
        let id = application.id.clone();
        versioned_save(
            &mut state.applications,
            EntityKind::Application,
            &id,
            application,
            |a| a.version,
            |a, v| a.version = v,
        )
    }

    async fn restore_application(&self, application: Application) -> StoreResult<()> {
        let mut state = self.state.write();
        state
            .applications
            .insert(application.id.clone(), application);
        Ok(())
    }

    async fn delete_application(&self, id: &Id) -> StoreResult<bool> {
        Ok(self.state.write().applications.remove(id).is_some())
    }
}

#[async_trait::async_trait]
impl PageStore for MemoryStore {
    async fn get_page(&self, id: &Id) -> StoreResult<Option<Page>> {
        Ok(self.state.read().pages.get(id).cloned())
    }

    async fn list_pages_for_application(&self, application_id: &Id) -> StoreResult<Vec<Page>> {
        let state = self.state.read();
        let mut pages: Vec<Page> = state
            .pages
            .values()
            .filter(|page| &page.application_id == application_id)
            .cloned()
            .collect();
        pages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(pages)
    }

    async fn save_page(&self, page: Page) -> StoreResult<Page> {
        let mut state = self.state.write();
        let id = page.id.clone();
        versioned_save(
            &mut state.pages,
            EntityKind::Page,
            &id,
            page,
            |p| p.version,
            |p, v| p.version = v,
        )
    }

    async fn restore_page(&self, page: Page) -> StoreResult<()> {
        self.state.write().pages.insert(page.id.clone(), page);
        Ok(())
    }

    async fn delete_page(&self, id: &Id) -> StoreResult<bool> {
        Ok(self.state.write().pages.remove(id).is_some())
    }
}

#[async_trait::async_trait]
impl BindingStore for MemoryStore {
    async fn get_binding(&self, key: &BindingKey) -> StoreResult<Option<BranchBinding>> {
        Ok(self.state.read().bindings.get(key).cloned())
    }

    async fn insert_binding(&self, binding: BranchBinding) -> StoreResult<()> {
        match self.state.write().bindings.entry(binding.key()) {
            Entry::Vacant(slot) => {
                slot.insert(binding);
                Ok(())
            }
            Entry::Occupied(_) => Err(StoreError::Conflict {
                entity: binding.kind,
                id: binding.key().to_string(),
                expected: 0,
            }),
        }
    }

    async fn put_binding(&self, binding: BranchBinding) -> StoreResult<()> {
        self.state.write().bindings.insert(binding.key(), binding);
        Ok(())
    }

    async fn remove_binding(&self, key: &BindingKey) -> StoreResult<bool> {
        Ok(self.state.write().bindings.remove(key).is_some())
    }
}
