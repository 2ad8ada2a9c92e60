use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Application, Id, Page};

/// Notifications handed to the event sink after a lifecycle operation succeeds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    ApplicationCreated {
        application_id: Id,
        default_application_id: Id,
        org_id: Id,
        name: String,
    },
    ApplicationDeleted {
        application_id: Id,
        default_application_id: Id,
        deleted_pages: usize,
    },
    ApplicationCloned {
        source_application_id: Id,
        application_id: Id,
        default_application_id: Id,
        branch_name: String,
    },
    PageCreated {
        application_id: Id,
        page_id: Id,
        default_page_id: Id,
    },
    PageDeleted {
        application_id: Id,
        page_id: Id,
        /// true when the page was only marked and waits for the next publish
        deferred: bool,
    },
    PublishCompleted {
        application_id: Id,
        default_application_id: Id,
        org_id: Id,
        snapshot_ref: String,
        published_manually: bool,
        published_at: DateTime<Utc>,
    },
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::ApplicationCreated { .. } => "application_created",
            DomainEvent::ApplicationDeleted { .. } => "application_deleted",
            DomainEvent::ApplicationCloned { .. } => "application_cloned",
            DomainEvent::PageCreated { .. } => "page_created",
            DomainEvent::PageDeleted { .. } => "page_deleted",
            DomainEvent::PublishCompleted { .. } => "publish_completed",
        }
    }

    pub fn application_created(application: &Application) -> Self {
        DomainEvent::ApplicationCreated {
            application_id: application.id.clone(),
            default_application_id: application.default_application_id.clone(),
            org_id: application.org_id.clone(),
            name: application.name.clone(),
        }
    }

    pub fn page_created(page: &Page) -> Self {
        DomainEvent::PageCreated {
            application_id: page.application_id.clone(),
            page_id: page.id.clone(),
            default_page_id: page.default_page_id.clone(),
        }
    }

    /// None when the application has never been published
    pub fn publish_completed(application: &Application) -> Option<Self> {
        let snapshot = application.published_snapshot.as_ref()?;
        Some(DomainEvent::PublishCompleted {
            application_id: application.id.clone(),
            default_application_id: application.default_application_id.clone(),
            org_id: application.org_id.clone(),
            snapshot_ref: snapshot.snapshot_ref.clone(),
            published_manually: snapshot.published_manually,
            published_at: snapshot.published_at,
        })
    }
}
