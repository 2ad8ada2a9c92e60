use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{CompositeOp, ConflictKind, ServiceError, ServiceResult};
use crate::logic::application_lifecycle::ApplicationLifecycle;
use crate::logic::context::ServiceContext;
use crate::logic::page_lifecycle::PageLifecycle;
use crate::logic::resolver::IdentityResolver;
use crate::logic::saga::{Compensation, Saga};
use crate::model::{
    reconcile_default_page, Application, ApplicationPage, DomainEvent, EntityKind, Id, Page,
};
use crate::store::traits::{Store, StoreError};

/// Where a cloned application lands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloneTarget {
    /// Same logical application on another branch
    Branch(String),
    /// A new logical application; the name defaults to the source name plus
    /// the configured clone suffix
    Standalone { name: Option<String> },
}

impl CloneTarget {
    pub fn branch(name: impl Into<String>) -> Self {
        CloneTarget::Branch(name.into())
    }

    pub fn standalone() -> Self {
        CloneTarget::Standalone { name: None }
    }

    fn keeps_lineage(&self) -> bool {
        matches!(self, CloneTarget::Branch(_))
    }
}

/// Forks applications and pages. Clones carry the working copy only.
pub struct CloneEngine;

impl CloneEngine {
    pub async fn clone_application<S: Store>(
        ctx: &ServiceContext<S>,
        source_id: &Id,
        target: CloneTarget,
    ) -> ServiceResult<Application> {
        let _guard = ctx.locks.acquire(source_id).await;
        let source = ctx.load_application(source_id).await?;

        let (name, branch_name) = match &target {
            CloneTarget::Branch(branch) => {
                if branch.trim().is_empty() {
                    return Err(ServiceError::validation("branch name must not be empty"));
                }
                (source.name.clone(), branch.clone())
            }
            CloneTarget::Standalone { name } => {
                let name = name
                    .clone()
                    .unwrap_or_else(|| format!("{}{}", source.name, ctx.settings.clone_name_suffix));
                if name.trim().is_empty() {
                    return Err(ServiceError::validation("application name must not be empty"));
                }
                (name, ctx.settings.default_branch_name.clone())
            }
        };

        // Serialize branch clones of one logical application, whichever copy they start from
        let _branch_guard = match &target {
            CloneTarget::Branch(branch) => Some(
                ctx.locks
                    .acquire(&format!("{}@{}", source.default_application_id, branch))
                    .await,
            ),
            CloneTarget::Standalone { .. } => None,
        };
        if target.keeps_lineage() {
            let existing = IdentityResolver::binding_for(
                ctx.store.as_ref(),
                EntityKind::Application,
                &source.default_application_id,
                &branch_name,
            )
            .await?;
            if existing.is_some() {
                return Err(ServiceError::Conflict(ConflictKind::BranchExists {
                    default_application_id: source.default_application_id.clone(),
                    branch_name,
                }));
            }
        }

        let mut clone = Application::new(name, source.org_id.clone(), branch_name);
        if target.keeps_lineage() {
            clone.default_application_id = source.default_application_id.clone();
        }
        clone.policies = source.policies.clone();

        let mut source_pages: HashMap<Id, Page> = ctx
            .store
            .list_pages_for_application(&source.id)
            .await?
            .into_iter()
            .map(|page| (page.id.clone(), page))
            .collect();

        let mut pages = Vec::with_capacity(source.pages.len());
        for entry in &source.pages {
            let Some(page) = source_pages.remove(&entry.id) else {
                log::warn!(
                    "Application {} lists page {} which does not exist, skipping it",
                    source.id,
                    entry.id
                );
                continue;
            };
            let copy = copy_page(&page, &clone, target.keeps_lineage());
            clone.pages.push(ApplicationPage {
                is_default: entry.is_default,
                ..ApplicationPage::for_page(&copy)
            });
            pages.push(copy);
        }
        reconcile_default_page(&mut clone.pages, None);

        let mut saga = Saga::new(ctx.store.as_ref(), CompositeOp::CloneApplication);
        let saved = match Self::write_clone(ctx, &mut saga, clone, pages).await {
            Ok(saved) => saved,
            Err(e) => return Err(saga.abort(e).await),
        };
        saga.complete();

        log::info!(
            "Cloned application {} into {} on branch '{}' ({} pages)",
            source.id,
            saved.id,
            saved.branch_name,
            saved.pages.len()
        );
        ctx.notify(DomainEvent::ApplicationCloned {
            source_application_id: source.id.clone(),
            application_id: saved.id.clone(),
            default_application_id: saved.default_application_id.clone(),
            branch_name: saved.branch_name.clone(),
        })
        .await;
        Ok(saved)
    }

    /// Pages first, then the application, then every binding. The
    /// application binding is claimed before the page bindings; losing that
    /// claim to another writer is `BranchExists`.
    async fn write_clone<S: Store>(
        ctx: &ServiceContext<S>,
        saga: &mut Saga<'_, S>,
        clone: Application,
        pages: Vec<Page>,
    ) -> ServiceResult<Application> {
        let store = ctx.store.as_ref();

        let mut saved_pages = Vec::with_capacity(pages.len());
        for page in pages {
            let saved = store.save_page(page).await?;
            saga.record(Compensation::DeletePage(saved.id.clone()));
            saved_pages.push(saved);
        }

        let saved = store.save_application(clone).await?;
        saga.record(Compensation::DeleteApplication(saved.id.clone()));

        let branch_taken = |e: StoreError| match e {
            StoreError::Conflict { .. } => ServiceError::Conflict(ConflictKind::BranchExists {
                default_application_id: saved.default_application_id.clone(),
                branch_name: saved.branch_name.clone(),
            }),
            other => other.into(),
        };

        let binding = IdentityResolver::bind_application(store, &saved)
            .await
            .map_err(branch_taken)?;
        saga.record(Compensation::RemoveBinding(binding.key()));
        for page in &saved_pages {
            let binding = IdentityResolver::bind_page(store, page)
                .await
                .map_err(branch_taken)?;
            saga.record(Compensation::RemoveBinding(binding.key()));
        }

        Ok(saved)
    }

    /// Copy a page inside its own application under a fresh logical id
    /// and a unique "<name> Copy" name. The copy is appended, never default.
    pub async fn clone_page<S: Store>(
        ctx: &ServiceContext<S>,
        page_id: &Id,
    ) -> ServiceResult<Page> {
        let (_guard, source) = PageLifecycle::lock_working_page(ctx, page_id).await?;
        let application = ctx.load_application(&source.application_id).await?;
        let siblings = ctx
            .store
            .list_pages_for_application(&application.id)
            .await?;

        let name = unique_copy_name(&siblings, &source.name, &ctx.settings.clone_name_suffix);
        let mut copy = Page::new(&application, name, source.layout_working.clone());
        ApplicationLifecycle::generate_and_set_page_policies(&application, &mut copy);

        let mut saga = Saga::new(ctx.store.as_ref(), CompositeOp::ClonePage);
        let saved = match PageLifecycle::insert_page(ctx, &mut saga, copy).await {
            Ok(saved) => saved,
            Err(e) => return Err(saga.abort(e).await),
        };
        saga.complete();

        log::info!("Cloned page {} into {} '{}'", source.id, saved.id, saved.name);
        ctx.notify(DomainEvent::page_created(&saved)).await;
        Ok(saved)
    }
}

/// Working copy of `page` owned by `application`. Branch copies keep the
/// logical page id; anything else starts a new lineage.
fn copy_page(page: &Page, application: &Application, keep_lineage: bool) -> Page {
    let mut copy = Page::new(application, page.name.clone(), page.layout_working.clone());
    if keep_lineage {
        copy.default_page_id = page.default_page_id.clone();
    }
    copy.policies = page.policies.clone();
    copy
}

fn unique_copy_name(siblings: &[Page], name: &str, suffix: &str) -> String {
    let taken = |candidate: &str| {
        siblings
            .iter()
            .any(|page| !page.pending_deletion && page.name == candidate)
    };

    let base = format!("{}{}", name, suffix);
    if !taken(&base) {
        return base;
    }
    (2..)
        .map(|n| format!("{} {}", base, n))
        .find(|candidate| !taken(candidate))
        .unwrap_or(base)
}
