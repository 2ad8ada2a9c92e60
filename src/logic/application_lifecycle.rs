use crate::error::{CompositeOp, ServiceError, ServiceResult};
use crate::logic::context::ServiceContext;
use crate::logic::resolver::IdentityResolver;
use crate::logic::saga::{Compensation, Saga};
use crate::model::{
    Application, BranchBinding, DomainEvent, Id, NewApplication, Page, UserContext,
};
use crate::store::traits::Store;

/// Creation, deletion and access policies of applications
pub struct ApplicationLifecycle;

impl ApplicationLifecycle {
    /// Create a new logical application on the default branch.
    ///
    /// When `new_application.id` names an application that already exists in
    /// the same org, that application is returned instead, so a timed-out
    /// create can be retried.
    pub async fn create_application<S: Store>(
        ctx: &ServiceContext<S>,
        new_application: NewApplication,
        org_id: &str,
        owner: &UserContext,
    ) -> ServiceResult<Application> {
        if new_application.name.trim().is_empty() {
            return Err(ServiceError::validation("application name must not be empty"));
        }
        if org_id.trim().is_empty() {
            return Err(ServiceError::validation("org id must not be empty"));
        }

        if let Some(id) = &new_application.id {
            if let Some(existing) = ctx.store.get_application(id).await? {
                if existing.org_id == org_id {
                    log::debug!("Application {} already exists, returning it", id);
                    return Ok(existing);
                }
                return Err(ServiceError::validation(format!(
                    "application id '{}' is already in use",
                    id
                )));
            }
        }

        let application = new_application
            .into_application(org_id.to_string(), ctx.settings.default_branch_name.clone());
        let application = Self::set_application_policies(ctx, owner, org_id, application);

        let mut saga = Saga::new(ctx.store.as_ref(), CompositeOp::CreateApplication);
        let saved = match Self::insert_and_bind(ctx, &mut saga, application).await {
            Ok(saved) => saved,
            Err(e) => return Err(saga.abort(e).await),
        };
        saga.complete();

        log::info!(
            "Created application {} '{}' in org {}",
            saved.id,
            saved.name,
            saved.org_id
        );
        ctx.notify(DomainEvent::application_created(&saved)).await;
        Ok(saved)
    }

    async fn insert_and_bind<S: Store>(
        ctx: &ServiceContext<S>,
        saga: &mut Saga<'_, S>,
        application: Application,
    ) -> ServiceResult<Application> {
        let saved = ctx.store.save_application(application).await?;
        saga.record(Compensation::DeleteApplication(saved.id.clone()));

        let binding = IdentityResolver::bind_application(ctx.store.as_ref(), &saved).await?;
        saga.record(Compensation::RemoveBinding(binding.key()));
        Ok(saved)
    }

    pub async fn get_application<S: Store>(
        ctx: &ServiceContext<S>,
        application_id: &Id,
    ) -> ServiceResult<Application> {
        ctx.load_application(application_id).await
    }

    /// Delete an application and every page it owns, published or not.
    /// Either everything goes or, on failure, everything is put back.
    pub async fn delete_application<S: Store>(
        ctx: &ServiceContext<S>,
        application_id: &Id,
    ) -> ServiceResult<Application> {
        let _guard = ctx.locks.acquire(application_id).await;
        let application = ctx.load_application(application_id).await?;
        let pages = ctx
            .store
            .list_pages_for_application(&application.id)
            .await?;

        let mut saga = Saga::new(ctx.store.as_ref(), CompositeOp::DeleteApplication);
        if let Err(e) = Self::cascade_delete(ctx, &mut saga, &application, &pages).await {
            return Err(saga.abort(e).await);
        }
        saga.complete();

        log::info!(
            "Deleted application {} with {} pages",
            application.id,
            pages.len()
        );
        ctx.notify(DomainEvent::ApplicationDeleted {
            application_id: application.id.clone(),
            default_application_id: application.default_application_id.clone(),
            deleted_pages: pages.len(),
        })
        .await;
        Ok(application)
    }

    async fn cascade_delete<S: Store>(
        ctx: &ServiceContext<S>,
        saga: &mut Saga<'_, S>,
        application: &Application,
        pages: &[Page],
    ) -> ServiceResult<()> {
        let store = ctx.store.as_ref();

        for page in pages {
            if store.delete_page(&page.id).await? {
                saga.record(Compensation::RestorePage(page.clone()));
            }
            let binding = BranchBinding::for_page(page);
            if IdentityResolver::unbind(store, &binding).await? {
                saga.record(Compensation::RestoreBinding(binding));
            }
        }

        let binding = BranchBinding::for_application(application);
        if IdentityResolver::unbind(store, &binding).await? {
            saga.record(Compensation::RestoreBinding(binding));
        }

        if store.delete_application(&application.id).await? {
            saga.record(Compensation::RestoreApplication(application.clone()));
        }
        Ok(())
    }

    /// Merge the policies derived for `owner` in `org_id` onto the application.
    /// Pure: the caller persists the result.
    pub fn set_application_policies<S: Store>(
        ctx: &ServiceContext<S>,
        owner: &UserContext,
        org_id: &str,
        mut application: Application,
    ) -> Application {
        let derived = ctx.policies.derive_policies(owner, org_id);
        application.policies = ctx.policies.merge_policies(&application.policies, &derived);
        application
    }

    /// A page gets a copy of its application's principal sets as they are now
    pub fn generate_and_set_page_policies(application: &Application, page: &mut Page) {
        page.policies = application.policies.clone();
    }
}
