use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::error::{CompositeOp, ServiceResult};
use crate::logic::context::ServiceContext;
use crate::logic::resolver::IdentityResolver;
use crate::logic::saga::{Compensation, Saga};
use crate::model::{Application, BranchBinding, DomainEvent, Id, Page, PublishedSnapshot};
use crate::store::traits::Store;

/// Turns an application's working copy into its published copy
pub struct PublishEngine;

impl PublishEngine {
    /// Publish every working page, drop pages marked for deletion and record
    /// the published page order. On failure the previous published view is
    /// put back.
    pub async fn publish<S: Store>(
        ctx: &ServiceContext<S>,
        application_id: &Id,
        published_manually: bool,
    ) -> ServiceResult<Application> {
        let _guard = ctx.locks.acquire(application_id).await;
        let application = ctx.load_application(application_id).await?;
        let pages = ctx
            .store
            .list_pages_for_application(&application.id)
            .await?;

        let mut saga = Saga::new(ctx.store.as_ref(), CompositeOp::Publish);
        let published =
            match Self::publish_steps(ctx, &mut saga, application, pages, published_manually).await
            {
                Ok(published) => published,
                Err(e) => return Err(saga.abort(e).await),
            };
        saga.complete();

        log::info!(
            "Published application {} ({} pages, snapshot {})",
            published.id,
            published.published_pages.len(),
            published
                .published_snapshot
                .as_ref()
                .map(|s| s.snapshot_ref.as_str())
                .unwrap_or_default()
        );
        Self::send_application_published_event(ctx, &published).await;
        Ok(published)
    }

    async fn publish_steps<S: Store>(
        ctx: &ServiceContext<S>,
        saga: &mut Saga<'_, S>,
        mut application: Application,
        pages: Vec<Page>,
        published_manually: bool,
    ) -> ServiceResult<Application> {
        let store = ctx.store.as_ref();
        let (doomed, working): (Vec<Page>, Vec<Page>) =
            pages.into_iter().partition(|page| page.pending_deletion);

        let mut published_pages = Vec::with_capacity(working.len());
        for page in working {
            let before = page.clone();
            let mut page = page;
            page.publish();
            let saved = store.save_page(page).await?;
            saga.record(Compensation::restore_page(before, saved.version));
            published_pages.push(saved);
        }

        for page in doomed {
            if store.delete_page(&page.id).await? {
                saga.record(Compensation::RestorePage(page.clone()));
            }
            let binding = BranchBinding::for_page(&page);
            if IdentityResolver::unbind(store, &binding).await? {
                saga.record(Compensation::RestoreBinding(binding));
            }
            log::debug!("Removed page {} pending deletion", page.id);
        }

        let before = application.clone();
        application.published_pages = application.pages.clone();
        application.published_snapshot = Some(PublishedSnapshot {
            snapshot_ref: snapshot_ref(&application, &published_pages),
            published_at: Utc::now(),
            published_manually,
        });
        application.touch();
        let saved = store.save_application(application).await?;
        saga.record(Compensation::restore_application(before, saved.version));

        Ok(saved)
    }

    /// Emit `PublishCompleted` for an application that has been published.
    /// Applications without a snapshot are skipped.
    pub async fn send_application_published_event<S: Store>(
        ctx: &ServiceContext<S>,
        application: &Application,
    ) {
        match DomainEvent::publish_completed(application) {
            Some(event) => ctx.notify(event).await,
            None => log::debug!(
                "Application {} has never been published, no event sent",
                application.id
            ),
        }
    }
}

/// Content hash of the published view: page order, default page, names and
/// layouts, keyed by logical ids so branch copies with equal content match.
fn snapshot_ref(application: &Application, pages: &[Page]) -> String {
    let content: Vec<serde_json::Value> = application
        .published_pages
        .iter()
        .filter_map(|entry| {
            let page = pages.iter().find(|p| p.id == entry.id)?;
            let published = page.published.as_ref()?;
            Some(serde_json::json!({
                "default_page_id": entry.default_page_id,
                "is_default": entry.is_default,
                "name": published.name,
                "layout": published.layout,
            }))
        })
        .collect();
    let document = serde_json::json!({
        "default_application_id": application.default_application_id,
        "pages": content,
    });

    let mut hasher = Sha256::new();
    hasher.update(document.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceSettings;
    use crate::gateway::BroadcastEventSink;
    use crate::logic::application_lifecycle::ApplicationLifecycle;
    use crate::logic::page_lifecycle::PageLifecycle;
    use crate::model::{NewApplication, NewPage, UserContext};
    use crate::store::{FaultPoint, FaultyStore, MemoryStore, PageStore};
    use std::sync::Arc;

    async fn seeded<S: Store>(ctx: &ServiceContext<S>, names: &[&str]) -> (Application, Vec<Page>) {
        let app = ApplicationLifecycle::create_application(
            ctx,
            NewApplication::named("Docs"),
            "org-1",
            &UserContext::new("owner".into()),
        )
        .await
        .unwrap();
        let mut pages = Vec::new();
        for name in names {
            pages.push(
                PageLifecycle::create_page(
                    ctx,
                    &app.id,
                    NewPage::named(*name).with_layout(serde_json::json!({ "title": name })),
                )
                .await
                .unwrap(),
            );
        }
        (app, pages)
    }

    fn context() -> ServiceContext<MemoryStore> {
        ServiceContext::new(Arc::new(MemoryStore::new()), ServiceSettings::default())
    }

    #[tokio::test]
    async fn test_publish_copies_working_state() {
        let events = Arc::new(BroadcastEventSink::new(16));
        let ctx = context().with_events(events.clone());
        let (app, pages) = seeded(&ctx, &["Intro", "Setup"]).await;
        let mut rx = events.subscribe();

        let published = PublishEngine::publish(&ctx, &app.id, false).await.unwrap();
        assert_eq!(published.published_pages, published.pages);
        let snapshot = published.published_snapshot.clone().unwrap();
        assert!(!snapshot.published_manually);
        assert_eq!(snapshot.snapshot_ref.len(), 64);

        for page in &pages {
            let stored = ctx.load_page(&page.id).await.unwrap();
            let half = stored.published.unwrap();
            assert_eq!(half.name, page.name);
            assert_eq!(half.layout, page.layout_working);
        }

        match rx.recv().await.unwrap() {
            DomainEvent::PublishCompleted { snapshot_ref, .. } => {
                assert_eq!(snapshot_ref, snapshot.snapshot_ref)
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_publish_is_deterministic() {
        let ctx = context();
        let (app, pages) = seeded(&ctx, &["Intro", "Setup"]).await;

        let first = PublishEngine::publish(&ctx, &app.id, true).await.unwrap();
        let layouts_first: Vec<_> = ctx
            .store
            .list_pages_for_application(&app.id)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.published.unwrap().layout)
            .collect();

        let second = PublishEngine::publish(&ctx, &app.id, true).await.unwrap();
        let layouts_second: Vec<_> = ctx
            .store
            .list_pages_for_application(&app.id)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.published.unwrap().layout)
            .collect();

        assert_eq!(layouts_first, layouts_second);
        assert_eq!(
            first.published_snapshot.unwrap().snapshot_ref,
            second.published_snapshot.clone().unwrap().snapshot_ref
        );

        PageLifecycle::update_page_layout(&ctx, &pages[0].id, serde_json::json!({"v": 2}))
            .await
            .unwrap();
        let third = PublishEngine::publish(&ctx, &app.id, true).await.unwrap();
        assert_ne!(
            second.published_snapshot.unwrap().snapshot_ref,
            third.published_snapshot.unwrap().snapshot_ref
        );
    }

    #[tokio::test]
    async fn test_publish_removes_pages_marked_for_deletion() {
        let ctx = context();
        let (app, pages) = seeded(&ctx, &["Intro", "Setup"]).await;
        PublishEngine::publish(&ctx, &app.id, true).await.unwrap();

        PageLifecycle::delete_page(&ctx, &pages[0].id).await.unwrap();
        // Still served in view mode until the next publish
        assert!(PageLifecycle::get_page(&ctx, &pages[0].id, true).await.is_ok());

        let published = PublishEngine::publish(&ctx, &app.id, true).await.unwrap();
        assert!(ctx.store.get_page(&pages[0].id).await.unwrap().is_none());
        assert_eq!(published.published_pages.len(), 1);
        assert!(published.published_pages[0].is_default);
        assert_eq!(published.published_pages[0].id, pages[1].id);
    }

    #[tokio::test]
    async fn test_failed_publish_keeps_previous_view() {
        let store = Arc::new(FaultyStore::new(MemoryStore::new()));
        let ctx = ServiceContext::new(store.clone(), ServiceSettings::default());
        let (app, pages) = seeded(&ctx, &["Intro", "Setup"]).await;
        let first = PublishEngine::publish(&ctx, &app.id, true).await.unwrap();

        PageLifecycle::update_page_layout(&ctx, &pages[0].id, serde_json::json!({"v": 2}))
            .await
            .unwrap();
        PageLifecycle::delete_page(&ctx, &pages[1].id).await.unwrap();

        // Page copies and the deletion go through; the application write fails
        store.fail_on(FaultPoint::SaveApplication, 1);
        let err = PublishEngine::publish(&ctx, &app.id, true).await.unwrap_err();
        assert!(err.is_rolled_back());

        let view = PageLifecycle::get_page(&ctx, &pages[0].id, true).await.unwrap();
        assert_eq!(view.layout, serde_json::json!({ "title": "Intro" }));
        let marked = ctx.load_page(&pages[1].id).await.unwrap();
        assert!(marked.pending_deletion);
        assert!(marked.published.is_some());

        let after = ctx.load_application(&app.id).await.unwrap();
        assert_eq!(after.published_snapshot, first.published_snapshot);
        assert_eq!(after.published_pages.len(), 2);

        // A retry publishes cleanly over the restored state
        let retried = PublishEngine::publish(&ctx, &app.id, true).await.unwrap();
        assert_eq!(retried.published_pages.len(), 1);
    }

    #[tokio::test]
    async fn test_event_for_unpublished_application_is_skipped() {
        let events = Arc::new(BroadcastEventSink::new(4));
        let ctx = context().with_events(events.clone());
        let (app, _) = seeded(&ctx, &[]).await;
        let mut rx = events.subscribe();

        PublishEngine::send_application_published_event(&ctx, &app).await;
        assert!(rx.try_recv().is_err());
    }
}
