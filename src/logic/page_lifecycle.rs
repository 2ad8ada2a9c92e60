use std::collections::HashMap;

use itertools::Itertools;
use tokio::sync::OwnedMutexGuard;

use crate::config::NameTieBreak;
use crate::error::{CompositeOp, ConflictKind, ServiceError, ServiceResult};
use crate::logic::application_lifecycle::ApplicationLifecycle;
use crate::logic::concurrency::update_application;
use crate::logic::context::ServiceContext;
use crate::logic::resolver::IdentityResolver;
use crate::logic::saga::{Compensation, Saga};
use crate::model::{
    Application, ApplicationPage, ApplicationPagesDto, BranchBinding, DomainEvent, EntityKind,
    Id, Layout, NewPage, Page, PageDto, PageNameIdDto,
};
use crate::store::traits::Store;

/// Page creation, lookup, editing, ordering and removal within one application
pub struct PageLifecycle;

impl PageLifecycle {
    /// Create a page and append it to the application's working order.
    /// The application's first page becomes its default page.
    pub async fn create_page<S: Store>(
        ctx: &ServiceContext<S>,
        application_id: &Id,
        new_page: NewPage,
    ) -> ServiceResult<Page> {
        validate_page_name(&new_page.name)?;
        if application_id.trim().is_empty() {
            return Err(ServiceError::validation("application id must not be empty"));
        }

        let _guard = ctx.locks.acquire(application_id).await;
        let application = ctx.load_application(application_id).await?;

        if let Some(id) = &new_page.id {
            if let Some(existing) = ctx.store.get_page(id).await? {
                if existing.application_id == application.id && existing.pending_deletion {
                    return Err(ServiceError::validation(format!(
                        "page id '{}' belongs to a page pending deletion",
                        id
                    )));
                }
                if existing.application_id == application.id {
                    log::debug!("Page {} already exists, returning it", id);
                    return Ok(existing);
                }
                return Err(ServiceError::validation(format!(
                    "page id '{}' is already in use",
                    id
                )));
            }
        }

        let siblings = ctx
            .store
            .list_pages_for_application(&application.id)
            .await?;
        ensure_unique_name(&siblings, &new_page.name, None)?;

        let mut page = new_page.into_page(&application);
        ApplicationLifecycle::generate_and_set_page_policies(&application, &mut page);

        let mut saga = Saga::new(ctx.store.as_ref(), CompositeOp::CreatePage);
        let saved = match Self::insert_page(ctx, &mut saga, page).await {
            Ok(saved) => saved,
            Err(e) => return Err(saga.abort(e).await),
        };
        saga.complete();

        log::info!(
            "Created page {} '{}' in application {}",
            saved.id,
            saved.name,
            saved.application_id
        );
        ctx.notify(DomainEvent::page_created(&saved)).await;
        Ok(saved)
    }

    /// Write a new page, its binding and its entry in the owning
    /// application, recording an undo step for each write.
    pub(crate) async fn insert_page<S: Store>(
        ctx: &ServiceContext<S>,
        saga: &mut Saga<'_, S>,
        page: Page,
    ) -> ServiceResult<Page> {
        let saved = ctx.store.save_page(page).await?;
        saga.record(Compensation::DeletePage(saved.id.clone()));

        let binding = IdentityResolver::bind_page(ctx.store.as_ref(), &saved).await?;
        saga.record(Compensation::RemoveBinding(binding.key()));

        let update = update_application(ctx, &saved.application_id, |application| {
            application.add_page(&saved);
            Ok(())
        })
        .await?;
        saga.record(Compensation::restore_application(
            update.before,
            update.after.version,
        ));
        Ok(saved)
    }

    pub async fn get_page<S: Store>(
        ctx: &ServiceContext<S>,
        page_id: &Id,
        view_mode: bool,
    ) -> ServiceResult<PageDto> {
        let page = ctx.load_page(page_id).await?;
        let application = ctx.load_application(&page.application_id).await?;
        let is_default = is_default_in(&application, &page.id, view_mode);

        page.to_dto(view_mode, is_default)
            .ok_or_else(|| ServiceError::not_found(EntityKind::Page, page_id))
    }

    /// Look a page up by application name and page name. Several
    /// applications may share a name; the configured tie-break picks one.
    pub async fn get_page_by_name<S: Store>(
        ctx: &ServiceContext<S>,
        application_name: &str,
        page_name: &str,
        view_mode: bool,
    ) -> ServiceResult<PageDto> {
        let candidates = ctx.store.list_applications_by_name(application_name).await?;
        let application = pick_application(
            candidates,
            application_name,
            ctx.settings.page_name_resolution,
        )?;

        let pages = ctx
            .store
            .list_pages_for_application(&application.id)
            .await?;
        let page = pages
            .into_iter()
            .find(|page| {
                if view_mode {
                    page.published.as_ref().is_some_and(|p| p.name == page_name)
                } else {
                    !page.pending_deletion && page.name == page_name
                }
            })
            .ok_or_else(|| {
                ServiceError::not_found(
                    EntityKind::Page,
                    format!("{}/{}", application_name, page_name),
                )
            })?;

        let is_default = is_default_in(&application, &page.id, view_mode);
        page.to_dto(view_mode, is_default)
            .ok_or_else(|| ServiceError::not_found(EntityKind::Page, &page.id))
    }

    pub async fn rename_page<S: Store>(
        ctx: &ServiceContext<S>,
        page_id: &Id,
        name: String,
    ) -> ServiceResult<Page> {
        validate_page_name(&name)?;
        let (_guard, mut page) = Self::lock_working_page(ctx, page_id).await?;

        let siblings = ctx
            .store
            .list_pages_for_application(&page.application_id)
            .await?;
        ensure_unique_name(&siblings, &name, Some(&page.id))?;

        page.name = name;
        page.touch();
        let saved = ctx.store.save_page(page).await?;
        log::debug!("Renamed page {} to '{}'", saved.id, saved.name);
        Ok(saved)
    }

    /// Replace the working layout. The published layout is untouched until
    /// the next publish.
    pub async fn update_page_layout<S: Store>(
        ctx: &ServiceContext<S>,
        page_id: &Id,
        layout: Layout,
    ) -> ServiceResult<Page> {
        let (_guard, mut page) = Self::lock_working_page(ctx, page_id).await?;
        page.layout_working = layout;
        page.touch();
        Ok(ctx.store.save_page(page).await?)
    }

    /// Physically delete a page that has never been published
    pub async fn delete_unpublished_page<S: Store>(
        ctx: &ServiceContext<S>,
        page_id: &Id,
    ) -> ServiceResult<Page> {
        let (_guard, page) = Self::lock_page(ctx, page_id).await?;
        if page.is_published() {
            return Err(ServiceError::Conflict(
                ConflictKind::PublishedPageNotDeletable {
                    page_id: page.id.clone(),
                },
            ));
        }
        Self::remove_unpublished(ctx, page).await
    }

    /// Remove a page from the working copy. Unpublished pages go right away;
    /// published ones stay visible in view mode until the next publish.
    pub async fn delete_page<S: Store>(
        ctx: &ServiceContext<S>,
        page_id: &Id,
    ) -> ServiceResult<Page> {
        let (_guard, page) = Self::lock_page(ctx, page_id).await?;
        if page.pending_deletion {
            return Ok(page);
        }
        if !page.is_published() {
            return Self::remove_unpublished(ctx, page).await;
        }

        let mut saga = Saga::new(ctx.store.as_ref(), CompositeOp::DeletePage);
        let marked = match Self::mark_for_deletion(ctx, &mut saga, page).await {
            Ok(marked) => marked,
            Err(e) => return Err(saga.abort(e).await),
        };
        saga.complete();

        log::info!(
            "Page {} marked for deletion on next publish of {}",
            marked.id,
            marked.application_id
        );
        ctx.notify(DomainEvent::PageDeleted {
            application_id: marked.application_id.clone(),
            page_id: marked.id.clone(),
            deferred: true,
        })
        .await;
        Ok(marked)
    }

    async fn mark_for_deletion<S: Store>(
        ctx: &ServiceContext<S>,
        saga: &mut Saga<'_, S>,
        mut page: Page,
    ) -> ServiceResult<Page> {
        let update = update_application(ctx, &page.application_id, |application| {
            application.remove_page(&page.id);
            Ok(())
        })
        .await?;
        saga.record(Compensation::restore_application(
            update.before,
            update.after.version,
        ));

        page.pending_deletion = true;
        page.touch();
        Ok(ctx.store.save_page(page).await?)
    }

    async fn remove_unpublished<S: Store>(
        ctx: &ServiceContext<S>,
        page: Page,
    ) -> ServiceResult<Page> {
        let mut saga = Saga::new(ctx.store.as_ref(), CompositeOp::DeletePage);
        if let Err(e) = Self::remove_page_records(ctx, &mut saga, &page).await {
            return Err(saga.abort(e).await);
        }
        saga.complete();

        log::info!(
            "Deleted page {} from application {}",
            page.id,
            page.application_id
        );
        ctx.notify(DomainEvent::PageDeleted {
            application_id: page.application_id.clone(),
            page_id: page.id.clone(),
            deferred: false,
        })
        .await;
        Ok(page)
    }

    async fn remove_page_records<S: Store>(
        ctx: &ServiceContext<S>,
        saga: &mut Saga<'_, S>,
        page: &Page,
    ) -> ServiceResult<()> {
        let update = update_application(ctx, &page.application_id, |application| {
            Ok(application.remove_page(&page.id))
        })
        .await?;
        if update.output {
            saga.record(Compensation::restore_application(
                update.before,
                update.after.version,
            ));
        }

        let store = ctx.store.as_ref();
        if store.delete_page(&page.id).await? {
            saga.record(Compensation::RestorePage(page.clone()));
        }
        let binding = BranchBinding::for_page(page);
        if IdentityResolver::unbind(store, &binding).await? {
            saga.record(Compensation::RestoreBinding(binding));
        }
        Ok(())
    }

    /// Move a page to a zero-based position in the working order. Positions
    /// past the end land on the last slot; the default page stays default.
    pub async fn reorder_page<S: Store>(
        ctx: &ServiceContext<S>,
        application_id: &Id,
        page_id: &Id,
        order: i64,
    ) -> ServiceResult<ApplicationPagesDto> {
        if order < 0 {
            return Err(ServiceError::validation(format!(
                "page order must not be negative, got {}",
                order
            )));
        }
        let target = usize::try_from(order).unwrap_or(usize::MAX);

        let _guard = ctx.locks.acquire(application_id).await;
        let update = update_application(ctx, application_id, |application| {
            if application.move_page(page_id, target) {
                Ok(())
            } else {
                Err(ServiceError::not_found(EntityKind::Page, page_id))
            }
        })
        .await?;

        log::debug!(
            "Moved page {} to position {} in application {}",
            page_id,
            target,
            application_id
        );
        Self::pages_dto(ctx, &update.after, false).await
    }

    pub async fn make_page_default<S: Store>(
        ctx: &ServiceContext<S>,
        application_id: &Id,
        page_id: &Id,
    ) -> ServiceResult<Application> {
        let _guard = ctx.locks.acquire(application_id).await;
        let update = update_application(ctx, application_id, |application| {
            if application.make_default(page_id) {
                Ok(())
            } else {
                Err(ServiceError::not_found(EntityKind::Page, page_id))
            }
        })
        .await?;
        Ok(update.after)
    }

    pub async fn list_pages<S: Store>(
        ctx: &ServiceContext<S>,
        application_id: &Id,
        view_mode: bool,
    ) -> ServiceResult<ApplicationPagesDto> {
        let application = ctx.load_application(application_id).await?;
        Self::pages_dto(ctx, &application, view_mode).await
    }

    async fn pages_dto<S: Store>(
        ctx: &ServiceContext<S>,
        application: &Application,
        view_mode: bool,
    ) -> ServiceResult<ApplicationPagesDto> {
        let pages: HashMap<Id, Page> = ctx
            .store
            .list_pages_for_application(&application.id)
            .await?
            .into_iter()
            .map(|page| (page.id.clone(), page))
            .collect();

        let entries = if view_mode {
            &application.published_pages
        } else {
            &application.pages
        };

        let pages = entries
            .iter()
            .filter_map(|entry| {
                let page = pages.get(&entry.id)?;
                let name = if view_mode {
                    page.published.as_ref()?.name.clone()
                } else {
                    page.name.clone()
                };
                Some(PageNameIdDto {
                    id: entry.id.clone(),
                    default_page_id: entry.default_page_id.clone(),
                    name,
                    is_default: entry.is_default,
                })
            })
            .collect();

        Ok(ApplicationPagesDto {
            application_id: application.id.clone(),
            default_application_id: application.default_application_id.clone(),
            branch_name: application.branch_name.clone(),
            view_mode,
            pages,
        })
    }

    /// Load a page, take its application's lock and reload it under the lock
    async fn lock_page<S: Store>(
        ctx: &ServiceContext<S>,
        page_id: &Id,
    ) -> ServiceResult<(OwnedMutexGuard<()>, Page)> {
        let page = ctx.load_page(page_id).await?;
        let guard = ctx.locks.acquire(&page.application_id).await;
        let page = ctx.load_page(page_id).await?;
        Ok((guard, page))
    }

    /// Like `lock_page`, but pages waiting for deletion count as gone
    pub(crate) async fn lock_working_page<S: Store>(
        ctx: &ServiceContext<S>,
        page_id: &Id,
    ) -> ServiceResult<(OwnedMutexGuard<()>, Page)> {
        let (guard, page) = Self::lock_page(ctx, page_id).await?;
        if page.pending_deletion {
            return Err(ServiceError::not_found(EntityKind::Page, page_id));
        }
        Ok((guard, page))
    }
}

fn validate_page_name(name: &str) -> ServiceResult<()> {
    if name.trim().is_empty() {
        return Err(ServiceError::validation("page name must not be empty"));
    }
    Ok(())
}

/// Working names are unique among the pages still in the working copy
fn ensure_unique_name(siblings: &[Page], name: &str, except: Option<&Id>) -> ServiceResult<()> {
    let taken = siblings.iter().any(|page| {
        !page.pending_deletion && page.name == name && except != Some(&page.id)
    });
    if taken {
        return Err(ServiceError::validation(format!(
            "a page named '{}' already exists in this application",
            name
        )));
    }
    Ok(())
}

fn is_default_in(application: &Application, page_id: &str, view_mode: bool) -> bool {
    let entries: &[ApplicationPage] = if view_mode {
        &application.published_pages
    } else {
        &application.pages
    };
    entries.iter().any(|entry| entry.id == page_id && entry.is_default)
}

fn pick_application(
    candidates: Vec<Application>,
    name: &str,
    tie_break: NameTieBreak,
) -> ServiceResult<Application> {
    let count = candidates.len();
    if count > 1 && tie_break == NameTieBreak::Reject {
        return Err(ServiceError::Conflict(ConflictKind::AmbiguousName {
            name: name.to_string(),
            candidates: count,
        }));
    }

    let mut ordered = candidates.into_iter().sorted_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    let picked = match tie_break {
        NameTieBreak::OldestCreated => ordered.next(),
        NameTieBreak::MostRecentlyCreated | NameTieBreak::Reject => ordered.last(),
    };

    if count > 1 {
        log::debug!(
            "{} applications named '{}', picked {:?} by {:?}",
            count,
            name,
            picked.as_ref().map(|a| &a.id),
            tie_break
        );
    }
    picked.ok_or_else(|| ServiceError::not_found(EntityKind::Application, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceSettings;
    use crate::logic::publish::PublishEngine;
    use crate::model::{NewApplication, UserContext};
    use crate::store::{
        ApplicationStore, BindingStore, FaultPoint, FaultyStore, MemoryStore, PageStore,
    };
    use std::sync::Arc;

    fn context() -> ServiceContext<MemoryStore> {
        ServiceContext::new(Arc::new(MemoryStore::new()), ServiceSettings::default())
    }

    async fn application<S: Store>(ctx: &ServiceContext<S>, name: &str) -> Application {
        ApplicationLifecycle::create_application(
            ctx,
            NewApplication::named(name),
            "org-1",
            &UserContext::new("owner".into()),
        )
        .await
        .unwrap()
    }

    async fn pages<S: Store>(ctx: &ServiceContext<S>, app: &Application, names: &[&str]) -> Vec<Page> {
        let mut created = Vec::new();
        for name in names {
            created.push(
                PageLifecycle::create_page(ctx, &app.id, NewPage::named(*name))
                    .await
                    .unwrap(),
            );
        }
        created
    }

    fn order(dto: &ApplicationPagesDto) -> Vec<String> {
        dto.pages.iter().map(|p| p.name.clone()).collect()
    }

    fn default_count(app: &Application) -> usize {
        app.pages.iter().filter(|p| p.is_default).count()
    }

    #[tokio::test]
    async fn test_first_page_becomes_default() {
        let ctx = context();
        let app = application(&ctx, "Shop").await;
        let created = pages(&ctx, &app, &["Home", "About"]).await;

        let app = ctx.load_application(&app.id).await.unwrap();
        assert_eq!(app.pages.len(), 2);
        assert_eq!(default_count(&app), 1);
        assert_eq!(app.default_page().unwrap().id, created[0].id);
        assert_eq!(created[1].policies, app.policies);

        let binding = IdentityResolver::binding_for(
            ctx.store.as_ref(),
            EntityKind::Page,
            &created[1].default_page_id,
            "main",
        )
        .await
        .unwrap();
        assert_eq!(binding, Some(created[1].id.clone()));
    }

    #[tokio::test]
    async fn test_create_page_validation() {
        let ctx = context();
        let app = application(&ctx, "Shop").await;
        pages(&ctx, &app, &["Home"]).await;

        let err = PageLifecycle::create_page(&ctx, &app.id, NewPage::named(""))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let err = PageLifecycle::create_page(&ctx, &app.id, NewPage::named("Home"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        for blank in ["", "   "] {
            let err = PageLifecycle::create_page(&ctx, &blank.to_string(), NewPage::named("X"))
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::Validation(_)), "{:?}", err);
        }

        let err = PageLifecycle::create_page(&ctx, &"missing".to_string(), NewPage::named("X"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_create_page_with_client_id_is_retry_safe() {
        let ctx = context();
        let app = application(&ctx, "Shop").await;
        let request = NewPage {
            id: Some("page-fixed".into()),
            name: "Home".into(),
            layout: None,
        };
        let first = PageLifecycle::create_page(&ctx, &app.id, request.clone())
            .await
            .unwrap();
        let again = PageLifecycle::create_page(&ctx, &app.id, request)
            .await
            .unwrap();
        assert_eq!(first, again);
        assert_eq!(ctx.load_application(&app.id).await.unwrap().pages.len(), 1);
    }

    #[tokio::test]
    async fn test_create_page_retry_does_not_return_a_page_pending_deletion() {
        let ctx = context();
        let app = application(&ctx, "Shop").await;
        let request = NewPage {
            id: Some("page-fixed".into()),
            name: "Home".into(),
            layout: None,
        };
        let first = PageLifecycle::create_page(&ctx, &app.id, request.clone())
            .await
            .unwrap();
        PublishEngine::publish(&ctx, &app.id, true).await.unwrap();
        PageLifecycle::delete_page(&ctx, &first.id).await.unwrap();
        assert!(ctx.load_page(&first.id).await.unwrap().pending_deletion);

        let err = PageLifecycle::create_page(&ctx, &app.id, request)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)), "{:?}", err);
        assert!(ctx.load_application(&app.id).await.unwrap().pages.is_empty());
    }

    #[tokio::test]
    async fn test_create_page_rolls_back_when_application_update_fails() {
        let store = Arc::new(FaultyStore::new(MemoryStore::new()));
        let ctx = ServiceContext::new(store.clone(), ServiceSettings::default());
        let app = application(&ctx, "Shop").await;

        store.fail_on(FaultPoint::SaveApplication, 1);
        let err = PageLifecycle::create_page(&ctx, &app.id, NewPage::named("Home"))
            .await
            .unwrap_err();
        assert!(err.is_rolled_back());
        assert_eq!(store.inner().page_count(), 0);
        assert_eq!(store.inner().binding_count(), 1);
        assert!(store.get_application(&app.id).await.unwrap().unwrap().pages.is_empty());
    }

    #[tokio::test]
    async fn test_view_mode_needs_publish() {
        let ctx = context();
        let app = application(&ctx, "Shop").await;
        let created = pages(&ctx, &app, &["Home"]).await;

        let err = PageLifecycle::get_page(&ctx, &created[0].id, true)
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        PublishEngine::publish(&ctx, &app.id, true).await.unwrap();
        PageLifecycle::update_page_layout(&ctx, &created[0].id, serde_json::json!({"v": 2}))
            .await
            .unwrap();

        let view = PageLifecycle::get_page(&ctx, &created[0].id, true).await.unwrap();
        assert!(view.is_default);
        assert_eq!(view.layout, crate::model::empty_layout());

        let edit = PageLifecycle::get_page(&ctx, &created[0].id, false).await.unwrap();
        assert_eq!(edit.layout, serde_json::json!({"v": 2}));
    }

    #[tokio::test]
    async fn test_rename_checks_siblings() {
        let ctx = context();
        let app = application(&ctx, "Shop").await;
        let created = pages(&ctx, &app, &["Home", "About"]).await;

        let err = PageLifecycle::rename_page(&ctx, &created[1].id, "Home".into())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        // Renaming to its own name is fine
        PageLifecycle::rename_page(&ctx, &created[1].id, "About".into())
            .await
            .unwrap();
        let renamed = PageLifecycle::rename_page(&ctx, &created[1].id, "Team".into())
            .await
            .unwrap();
        assert_eq!(renamed.name, "Team");
        assert_eq!(renamed.version, 3);
    }

    #[tokio::test]
    async fn test_get_page_by_name_tie_break() {
        let ctx = context();
        let older = application(&ctx, "Shop").await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let newer = application(&ctx, "Shop").await;
        pages(&ctx, &older, &["Home"]).await;
        pages(&ctx, &newer, &["Home"]).await;

        let found = PageLifecycle::get_page_by_name(&ctx, "Shop", "Home", false)
            .await
            .unwrap();
        assert_eq!(found.application_id, newer.id);

        let oldest = ServiceContext::new(
            ctx.store.clone(),
            ServiceSettings {
                page_name_resolution: NameTieBreak::OldestCreated,
                ..ServiceSettings::default()
            },
        );
        let found = PageLifecycle::get_page_by_name(&oldest, "Shop", "Home", false)
            .await
            .unwrap();
        assert_eq!(found.application_id, older.id);

        let strict = ServiceContext::new(
            ctx.store.clone(),
            ServiceSettings {
                page_name_resolution: NameTieBreak::Reject,
                ..ServiceSettings::default()
            },
        );
        let err = PageLifecycle::get_page_by_name(&strict, "Shop", "Home", false)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Conflict(ConflictKind::AmbiguousName { candidates: 2, .. })
        ));

        let err = PageLifecycle::get_page_by_name(&ctx, "Nope", "Home", false)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_unpublished_page_promotes_next_default() {
        let ctx = context();
        let app = application(&ctx, "Shop").await;
        let created = pages(&ctx, &app, &["Home", "About"]).await;

        PageLifecycle::delete_unpublished_page(&ctx, &created[0].id)
            .await
            .unwrap();

        let app = ctx.load_application(&app.id).await.unwrap();
        assert_eq!(app.pages.len(), 1);
        assert_eq!(app.default_page().unwrap().id, created[1].id);
        assert!(ctx.store.get_page(&created[0].id).await.unwrap().is_none());
        let key = BranchBinding::for_page(&created[0]).key();
        assert!(ctx.store.get_binding(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_published_page_is_only_marked() {
        let ctx = context();
        let app = application(&ctx, "Shop").await;
        let created = pages(&ctx, &app, &["Home", "About"]).await;
        PublishEngine::publish(&ctx, &app.id, true).await.unwrap();

        let err = PageLifecycle::delete_unpublished_page(&ctx, &created[1].id)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Conflict(ConflictKind::PublishedPageNotDeletable { .. })
        ));

        let marked = PageLifecycle::delete_page(&ctx, &created[1].id).await.unwrap();
        assert!(marked.pending_deletion);
        // Marking twice is a no-op
        let again = PageLifecycle::delete_page(&ctx, &created[1].id).await.unwrap();
        assert_eq!(again.version, marked.version);

        let edit = PageLifecycle::list_pages(&ctx, &app.id, false).await.unwrap();
        assert_eq!(order(&edit), vec!["Home"]);
        let view = PageLifecycle::list_pages(&ctx, &app.id, true).await.unwrap();
        assert_eq!(order(&view), vec!["Home", "About"]);

        assert!(PageLifecycle::get_page(&ctx, &created[1].id, false).await.unwrap_err().is_not_found());
        assert!(PageLifecycle::get_page(&ctx, &created[1].id, true).await.is_ok());
        let err = PageLifecycle::rename_page(&ctx, &created[1].id, "Gone".into())
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        // The name is free again in the working copy
        PageLifecycle::create_page(&ctx, &app.id, NewPage::named("About"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_reorder_clamps_and_keeps_default() {
        let ctx = context();
        let app = application(&ctx, "Shop").await;
        let created = pages(&ctx, &app, &["P1", "P2", "P3"]).await;

        let dto = PageLifecycle::reorder_page(&ctx, &app.id, &created[0].id, 99)
            .await
            .unwrap();
        assert_eq!(order(&dto), vec!["P2", "P3", "P1"]);
        assert!(dto.pages[2].is_default);

        let dto = PageLifecycle::reorder_page(&ctx, &app.id, &created[2].id, 0)
            .await
            .unwrap();
        assert_eq!(order(&dto), vec!["P3", "P2", "P1"]);

        let err = PageLifecycle::reorder_page(&ctx, &app.id, &created[0].id, -1)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let err = PageLifecycle::reorder_page(&ctx, &app.id, &"missing".to_string(), 0)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_make_page_default() {
        let ctx = context();
        let app = application(&ctx, "Shop").await;
        let created = pages(&ctx, &app, &["P1", "P2"]).await;

        let app = PageLifecycle::make_page_default(&ctx, &app.id, &created[1].id)
            .await
            .unwrap();
        assert_eq!(default_count(&app), 1);
        assert_eq!(app.default_page().unwrap().id, created[1].id);

        let err = PageLifecycle::make_page_default(&ctx, &app.id, &"missing".to_string())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_concurrent_creates_keep_every_page() {
        let ctx = Arc::new(context());
        let app = application(ctx.as_ref(), "Shop").await;

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let ctx = ctx.clone();
                let app_id = app.id.clone();
                tokio::spawn(async move {
                    PageLifecycle::create_page(ctx.as_ref(), &app_id, NewPage::named(format!("Page {}", i)))
                        .await
                        .unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let app = ctx.load_application(&app.id).await.unwrap();
        assert_eq!(app.pages.len(), 8);
        assert_eq!(default_count(&app), 1);
    }
}
