use std::sync::Arc;

use crate::config::ServiceSettings;
use crate::error::ServiceResult;
use crate::gateway::{EventSink, PolicyGateway};
use crate::logic::{
    ApplicationLifecycle, CloneEngine, CloneTarget, IdentityResolver, PageLifecycle,
    PublishEngine, ServiceContext,
};
use crate::model::{
    Application, ApplicationPagesDto, EntityRef, Id, Layout, NewApplication, NewPage, Page,
    PageDto, UserContext,
};
use crate::store::traits::Store;

/// Entry point for callers of the lifecycle core.
///
/// Every operation accepts an `EntityRef`, so a caller may address an entity
/// either by its concrete id or by logical id plus branch. The reference is
/// resolved here, once; the engines below only see concrete ids.
pub struct ApplicationPageService<S: Store> {
    ctx: ServiceContext<S>,
}

impl<S: Store> ApplicationPageService<S> {
    pub fn new(store: Arc<S>, settings: ServiceSettings) -> Self {
        Self {
            ctx: ServiceContext::new(store, settings),
        }
    }

    pub fn with_gateways(
        store: Arc<S>,
        settings: ServiceSettings,
        policies: Arc<dyn PolicyGateway>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            ctx: ServiceContext::new(store, settings)
                .with_policies(policies)
                .with_events(events),
        }
    }

    pub fn context(&self) -> &ServiceContext<S> {
        &self.ctx
    }

    pub fn store(&self) -> &Arc<S> {
        &self.ctx.store
    }

    async fn application_id(&self, reference: &EntityRef) -> ServiceResult<Id> {
        IdentityResolver::resolve_application(self.ctx.store.as_ref(), reference).await
    }

    async fn page_id(&self, reference: &EntityRef) -> ServiceResult<Id> {
        IdentityResolver::resolve_page(self.ctx.store.as_ref(), reference).await
    }

    // Applications

    pub async fn create_application(
        &self,
        application: NewApplication,
        org_id: &str,
        owner: &UserContext,
    ) -> ServiceResult<Application> {
        ApplicationLifecycle::create_application(&self.ctx, application, org_id, owner).await
    }

    pub async fn get_application(&self, application: &EntityRef) -> ServiceResult<Application> {
        let id = self.application_id(application).await?;
        ApplicationLifecycle::get_application(&self.ctx, &id).await
    }

    pub async fn delete_application(&self, application: &EntityRef) -> ServiceResult<Application> {
        let id = self.application_id(application).await?;
        ApplicationLifecycle::delete_application(&self.ctx, &id).await
    }

    pub fn set_application_policies(
        &self,
        owner: &UserContext,
        org_id: &str,
        application: Application,
    ) -> Application {
        ApplicationLifecycle::set_application_policies(&self.ctx, owner, org_id, application)
    }

    pub fn generate_and_set_page_policies(&self, application: &Application, page: &mut Page) {
        ApplicationLifecycle::generate_and_set_page_policies(application, page)
    }

    pub async fn clone_application(
        &self,
        application: &EntityRef,
        target: CloneTarget,
    ) -> ServiceResult<Application> {
        let id = self.application_id(application).await?;
        CloneEngine::clone_application(&self.ctx, &id, target).await
    }

    pub async fn publish(
        &self,
        application: &EntityRef,
        published_manually: bool,
    ) -> ServiceResult<Application> {
        let id = self.application_id(application).await?;
        PublishEngine::publish(&self.ctx, &id, published_manually).await
    }

    pub async fn send_application_published_event(&self, application: &Application) {
        PublishEngine::send_application_published_event(&self.ctx, application).await
    }

    // Pages

    pub async fn create_page(
        &self,
        application: &EntityRef,
        page: NewPage,
    ) -> ServiceResult<Page> {
        let id = self.application_id(application).await?;
        PageLifecycle::create_page(&self.ctx, &id, page).await
    }

    pub async fn get_page(&self, page: &EntityRef, view_mode: bool) -> ServiceResult<PageDto> {
        let id = self.page_id(page).await?;
        PageLifecycle::get_page(&self.ctx, &id, view_mode).await
    }

    pub async fn get_page_by_name(
        &self,
        application_name: &str,
        page_name: &str,
        view_mode: bool,
    ) -> ServiceResult<PageDto> {
        PageLifecycle::get_page_by_name(&self.ctx, application_name, page_name, view_mode).await
    }

    pub async fn list_pages(
        &self,
        application: &EntityRef,
        view_mode: bool,
    ) -> ServiceResult<ApplicationPagesDto> {
        let id = self.application_id(application).await?;
        PageLifecycle::list_pages(&self.ctx, &id, view_mode).await
    }

    pub async fn rename_page(&self, page: &EntityRef, name: String) -> ServiceResult<Page> {
        let id = self.page_id(page).await?;
        PageLifecycle::rename_page(&self.ctx, &id, name).await
    }

    pub async fn update_page_layout(&self, page: &EntityRef, layout: Layout) -> ServiceResult<Page> {
        let id = self.page_id(page).await?;
        PageLifecycle::update_page_layout(&self.ctx, &id, layout).await
    }

    pub async fn delete_unpublished_page(&self, page: &EntityRef) -> ServiceResult<Page> {
        let id = self.page_id(page).await?;
        PageLifecycle::delete_unpublished_page(&self.ctx, &id).await
    }

    pub async fn delete_page(&self, page: &EntityRef) -> ServiceResult<Page> {
        let id = self.page_id(page).await?;
        PageLifecycle::delete_page(&self.ctx, &id).await
    }

    pub async fn clone_page(&self, page: &EntityRef) -> ServiceResult<Page> {
        let id = self.page_id(page).await?;
        CloneEngine::clone_page(&self.ctx, &id).await
    }

    /// Move a page within its application. Both references resolve on their
    /// own; a page that resolves outside the application is `NotFound`.
    pub async fn reorder_page(
        &self,
        application: &EntityRef,
        page: &EntityRef,
        order: i64,
    ) -> ServiceResult<ApplicationPagesDto> {
        let application_id = self.application_id(application).await?;
        let page_id = self.page_id(page).await?;
        PageLifecycle::reorder_page(&self.ctx, &application_id, &page_id, order).await
    }

    /// Same reference rules as `reorder_page`
    pub async fn make_page_default(
        &self,
        application: &EntityRef,
        page: &EntityRef,
    ) -> ServiceResult<Application> {
        let application_id = self.application_id(application).await?;
        let page_id = self.page_id(page).await?;
        PageLifecycle::make_page_default(&self.ctx, &application_id, &page_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::store::MemoryStore;

    fn service() -> ApplicationPageService<MemoryStore> {
        ApplicationPageService::new(Arc::new(MemoryStore::new()), ServiceSettings::default())
    }

    #[tokio::test]
    async fn test_branched_and_concrete_refs_reach_the_same_page() {
        let service = service();
        let app = service
            .create_application(NewApplication::named("Wiki"), "org-1", &UserContext::system())
            .await
            .unwrap();
        let page = service
            .create_page(
                &EntityRef::branched(app.default_application_id.clone(), "main"),
                NewPage::named("Start"),
            )
            .await
            .unwrap();

        let by_id = service.get_page(&EntityRef::from(page.id.clone()), false).await.unwrap();
        let by_branch = service
            .get_page(&EntityRef::branched(page.default_page_id.clone(), "main"), false)
            .await
            .unwrap();
        assert_eq!(by_id, by_branch);
        assert!(by_id.is_default);

        let err = service
            .get_page(&EntityRef::branched(page.default_page_id.clone(), "other"), false)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_create_page_under_blank_application_ref_is_invalid() {
        let service = service();
        let err = service
            .create_page(&EntityRef::from(""), NewPage::named("Home"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn test_page_ref_resolves_on_its_own_branch() {
        let service = service();
        let app = service
            .create_application(NewApplication::named("Wiki"), "org-1", &UserContext::system())
            .await
            .unwrap();
        let app_ref = EntityRef::from(app.id.clone());
        let first = service.create_page(&app_ref, NewPage::named("A")).await.unwrap();
        service.create_page(&app_ref, NewPage::named("B")).await.unwrap();
        service
            .clone_application(&app_ref, CloneTarget::branch("b"))
            .await
            .unwrap();

        let on_b = EntityRef::branched(app.default_application_id.clone(), "b");
        let main_page = EntityRef::branched(first.default_page_id.clone(), "main");
        let err = service.reorder_page(&on_b, &main_page, 1).await.unwrap_err();
        assert!(err.is_not_found());

        let branch_page = EntityRef::branched(first.default_page_id.clone(), "b");
        let dto = service.reorder_page(&on_b, &branch_page, 1).await.unwrap();
        let names: Vec<&str> = dto.pages.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["B", "A"]);
    }
}
