use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{generate_id, Id, Page, PolicySet};

/// Branch every freshly created application lives on
pub const DEFAULT_BRANCH_NAME: &str = "main";

/// One entry of an application's ordered page list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationPage {
    pub id: Id,
    pub default_page_id: Id,
    pub is_default: bool,
}

impl ApplicationPage {
    pub fn for_page(page: &Page) -> Self {
        Self {
            id: page.id.clone(),
            default_page_id: page.default_page_id.clone(),
            is_default: false,
        }
    }
}

/// Record of the last successful publish
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedSnapshot {
    /// Hex SHA-256 of the published page content, stable across identical publishes
    pub snapshot_ref: String,
    pub published_at: DateTime<Utc>,
    pub published_manually: bool,
}

/// One branch copy of a logical application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: Id,
    /// Logical id shared by every branch copy of this application
    pub default_application_id: Id,
    pub branch_name: String,
    pub name: String,
    pub org_id: Id,
    /// Working page order
    pub pages: Vec<ApplicationPage>,
    /// Page order as of the last publish
    pub published_pages: Vec<ApplicationPage>,
    pub policies: PolicySet,
    pub published_snapshot: Option<PublishedSnapshot>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency counter, 0 until first persisted
    #[serde(default)]
    pub version: u64,
}

impl Application {
    /// Start a new logical application: the concrete id doubles as its default id
    pub fn new(name: String, org_id: Id, branch_name: String) -> Self {
        Self::new_with_id(generate_id(), name, org_id, branch_name)
    }

    pub fn new_with_id(id: Id, name: String, org_id: Id, branch_name: String) -> Self {
        let now = Utc::now();
        Self {
            default_application_id: id.clone(),
            id,
            branch_name,
            name,
            org_id,
            pages: Vec::new(),
            published_pages: Vec::new(),
            policies: PolicySet::default(),
            published_snapshot: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn is_published(&self) -> bool {
        self.published_snapshot.is_some()
    }

    pub fn default_page(&self) -> Option<&ApplicationPage> {
        self.pages.iter().find(|p| p.is_default)
    }

    pub fn published_default_page(&self) -> Option<&ApplicationPage> {
        self.published_pages.iter().find(|p| p.is_default)
    }

    pub fn page_position(&self, page_id: &str) -> Option<usize> {
        self.pages.iter().position(|p| p.id == page_id)
    }

    pub fn contains_page(&self, page_id: &str) -> bool {
        self.page_position(page_id).is_some()
    }

    /// Append a page to the working order. The first page becomes default.
    pub fn add_page(&mut self, page: &Page) {
        if self.contains_page(&page.id) {
            return;
        }
        self.pages.push(ApplicationPage::for_page(page));
        reconcile_default_page(&mut self.pages, None);
    }

    /// Remove a page from the working order, promoting a new default if needed
    pub fn remove_page(&mut self, page_id: &str) -> bool {
        let Some(index) = self.page_position(page_id) else {
            return false;
        };
        self.pages.remove(index);
        reconcile_default_page(&mut self.pages, None);
        true
    }

    pub fn make_default(&mut self, page_id: &str) -> bool {
        if !self.contains_page(page_id) {
            return false;
        }
        reconcile_default_page(&mut self.pages, Some(page_id));
        true
    }

    /// Move a page to `target`, clamped to the last position. Returns false if
    /// the page is not part of the working order.
    pub fn move_page(&mut self, page_id: &str, target: usize) -> bool {
        let Some(index) = self.page_position(page_id) else {
            return false;
        };
        let entry = self.pages.remove(index);
        let target = target.min(self.pages.len());
        self.pages.insert(target, entry);
        reconcile_default_page(&mut self.pages, None);
        true
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Restore the "exactly one default page" invariant.
///
/// The default is `preferred` when it names a page in the list, otherwise the
/// first page already flagged default, otherwise the first page.
pub fn reconcile_default_page(pages: &mut [ApplicationPage], preferred: Option<&str>) {
    if pages.is_empty() {
        return;
    }

    let target = preferred
        .filter(|id| pages.iter().any(|p| p.id == *id))
        .map(|id| id.to_string())
        .or_else(|| pages.iter().find(|p| p.is_default).map(|p| p.id.clone()))
        .unwrap_or_else(|| pages[0].id.clone());

    for page in pages.iter_mut() {
        page.is_default = page.id == target;
    }
}

/// Input model for creating a new application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewApplication {
    /// Client-chosen id; makes create safe to retry
    #[serde(default)]
    pub id: Option<Id>,
    pub name: String,
}

impl NewApplication {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }

    /// Convert to a full Application with server-generated fields
    pub fn into_application(self, org_id: Id, branch_name: String) -> Application {
        match self.id {
            Some(id) => Application::new_with_id(id, self.name, org_id, branch_name),
            None => Application::new(self.name, org_id, branch_name),
        }
    }
}

/// Page list of one application, as seen in edit or view mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationPagesDto {
    pub application_id: Id,
    pub default_application_id: Id,
    pub branch_name: String,
    pub view_mode: bool,
    pub pages: Vec<PageNameIdDto>,
}

impl ApplicationPagesDto {
    pub fn page_ids(&self) -> Vec<Id> {
        self.pages.iter().map(|p| p.id.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageNameIdDto {
    pub id: Id,
    pub default_page_id: Id,
    pub name: String,
    pub is_default: bool,
}
