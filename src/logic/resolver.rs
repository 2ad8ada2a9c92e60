use crate::error::{ServiceError, ServiceResult};
use crate::model::{Application, BindingKey, BranchBinding, EntityKind, EntityRef, Id, Page};
use crate::store::traits::{Store, StoreResult};

/// Maps logical ids on a branch to the concrete copy living there.
///
/// Resolution runs once, where a request enters the core; everything below
/// works with concrete ids only.
pub struct IdentityResolver;

impl IdentityResolver {
    /// Normalize a reference to a concrete id. Concrete ids pass through
    /// untouched, without a store lookup.
    pub async fn resolve<S: Store>(
        store: &S,
        kind: EntityKind,
        reference: &EntityRef,
    ) -> ServiceResult<Id> {
        match reference {
            EntityRef::Concrete(id) => Ok(id.clone()),
            EntityRef::Branched {
                default_id,
                branch_name,
            } => Self::binding_for(store, kind, default_id, branch_name)
                .await?
                .ok_or_else(|| ServiceError::not_found(kind, reference)),
        }
    }

    pub async fn resolve_application<S: Store>(store: &S, reference: &EntityRef) -> ServiceResult<Id> {
        Self::resolve(store, EntityKind::Application, reference).await
    }

    pub async fn resolve_page<S: Store>(store: &S, reference: &EntityRef) -> ServiceResult<Id> {
        Self::resolve(store, EntityKind::Page, reference).await
    }

    /// Concrete id bound to `default_id` on `branch_name`, if any
    pub async fn binding_for<S: Store>(
        store: &S,
        kind: EntityKind,
        default_id: &str,
        branch_name: &str,
    ) -> ServiceResult<Option<Id>> {
        let key = BindingKey::new(kind, default_id, branch_name);
        Ok(store.get_binding(&key).await?.map(|b| b.concrete_id))
    }

    /// Claim the application's (default id, branch) key. Fails with a store
    /// `Conflict` when another copy already holds it.
    pub async fn bind_application<S: Store>(
        store: &S,
        application: &Application,
    ) -> StoreResult<BranchBinding> {
        let binding = BranchBinding::for_application(application);
        store.insert_binding(binding.clone()).await?;
        Ok(binding)
    }

    pub async fn bind_page<S: Store>(store: &S, page: &Page) -> StoreResult<BranchBinding> {
        let binding = BranchBinding::for_page(page);
        store.insert_binding(binding.clone()).await?;
        Ok(binding)
    }

    /// Drop the binding, but only while it still points at `concrete_id`
    pub async fn unbind<S: Store>(store: &S, binding: &BranchBinding) -> StoreResult<bool> {
        let key = binding.key();
        match store.get_binding(&key).await? {
            Some(current) if current.concrete_id == binding.concrete_id => {
                store.remove_binding(&key).await
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewApplication, NewPage};
    use crate::store::{BindingStore, MemoryStore};

    #[tokio::test]
    async fn test_concrete_ids_pass_through() {
        let store = MemoryStore::new();
        let id = IdentityResolver::resolve_application(&store, &EntityRef::concrete("anything"))
            .await
            .unwrap();
        assert_eq!(id, "anything");
    }

    #[tokio::test]
    async fn test_branched_lookup() {
        let store = MemoryStore::new();
        let mut app = NewApplication::named("CRM").into_application("org".into(), "main".into());
        IdentityResolver::bind_application(&store, &app).await.unwrap();

        let on_main = EntityRef::branched(app.default_application_id.clone(), "main");
        assert_eq!(
            IdentityResolver::resolve_application(&store, &on_main).await.unwrap(),
            app.id
        );

        let missing = EntityRef::branched(app.default_application_id.clone(), "feature");
        let err = IdentityResolver::resolve_application(&store, &missing)
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        // Kinds do not share bindings
        assert!(IdentityResolver::resolve_page(&store, &on_main).await.is_err());

        app.branch_name = "feature".into();
        let page = NewPage::named("Home").into_page(&app);
        IdentityResolver::bind_page(&store, &page).await.unwrap();
        let page_ref = EntityRef::branched(page.default_page_id.clone(), "feature");
        assert_eq!(
            IdentityResolver::resolve_page(&store, &page_ref).await.unwrap(),
            page.id
        );
    }

    #[tokio::test]
    async fn test_unbind_leaves_rebound_keys_alone() {
        let store = MemoryStore::new();
        let app = NewApplication::named("CRM").into_application("org".into(), "main".into());
        let binding = IdentityResolver::bind_application(&store, &app).await.unwrap();

        let mut newer = binding.clone();
        newer.concrete_id = "replacement".into();
        store.put_binding(newer).await.unwrap();

        assert!(!IdentityResolver::unbind(&store, &binding).await.unwrap());
        let still = IdentityResolver::binding_for(&store, EntityKind::Application, &app.id, "main")
            .await
            .unwrap();
        assert_eq!(still.as_deref(), Some("replacement"));
    }
}
