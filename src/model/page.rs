use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{generate_id, Application, Id, Layout, PolicySet};

/// Layout given to pages created without one
pub fn empty_layout() -> Layout {
    serde_json::json!({ "type": "CANVAS", "children": [] })
}

/// Frozen view of a page as of the last publish
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedPage {
    pub name: String,
    pub layout: Layout,
}

/// One branch copy of a logical page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: Id,
    /// Logical id shared by every branch copy of this page
    pub default_page_id: Id,
    pub application_id: Id,
    pub branch_name: String,
    pub name: String,
    pub layout_working: Layout,
    pub published: Option<PublishedPage>,
    /// Removed from the working copy; physically deleted by the next publish
    #[serde(default)]
    pub pending_deletion: bool,
    pub policies: PolicySet,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub version: u64,
}

impl Page {
    /// New logical page owned by `application`
    pub fn new(application: &Application, name: String, layout: Layout) -> Self {
        Self::new_with_id(generate_id(), application, name, layout)
    }

    pub fn new_with_id(id: Id, application: &Application, name: String, layout: Layout) -> Self {
        let now = Utc::now();
        Self {
            default_page_id: id.clone(),
            id,
            application_id: application.id.clone(),
            branch_name: application.branch_name.clone(),
            name,
            layout_working: layout,
            published: None,
            pending_deletion: false,
            policies: PolicySet::default(),
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn is_published(&self) -> bool {
        self.published.is_some()
    }

    /// Copy the working name and layout into the published half
    pub fn publish(&mut self) {
        self.published = Some(PublishedPage {
            name: self.name.clone(),
            layout: self.layout_working.clone(),
        });
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Project the page for edit (`view_mode = false`) or view mode.
    /// Returns None when the requested half does not exist.
    pub fn to_dto(&self, view_mode: bool, is_default: bool) -> Option<PageDto> {
        let (name, layout) = if view_mode {
            let published = self.published.as_ref()?;
            (published.name.clone(), published.layout.clone())
        } else {
            if self.pending_deletion {
                return None;
            }
            (self.name.clone(), self.layout_working.clone())
        };

        Some(PageDto {
            id: self.id.clone(),
            default_page_id: self.default_page_id.clone(),
            application_id: self.application_id.clone(),
            branch_name: self.branch_name.clone(),
            name,
            layout,
            is_default,
            view_mode,
            policies: self.policies.clone(),
        })
    }
}

/// Input model for creating a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPage {
    /// Client-chosen id; makes create safe to retry
    #[serde(default)]
    pub id: Option<Id>,
    pub name: String,
    #[serde(default)]
    pub layout: Option<Layout>,
}

impl NewPage {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            layout: None,
        }
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn into_page(self, application: &Application) -> Page {
        let layout = self.layout.unwrap_or_else(empty_layout);
        match self.id {
            Some(id) => Page::new_with_id(id, application, self.name, layout),
            None => Page::new(application, self.name, layout),
        }
    }
}

/// A page as returned to readers, in either edit or view mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageDto {
    pub id: Id,
    pub default_page_id: Id,
    pub application_id: Id,
    pub branch_name: String,
    pub name: String,
    pub layout: Layout,
    pub is_default: bool,
    pub view_mode: bool,
    pub policies: PolicySet,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DEFAULT_BRANCH_NAME;

    fn app() -> Application {
        Application::new("app".into(), "org".into(), DEFAULT_BRANCH_NAME.into())
    }

    #[test]
    fn test_view_mode_requires_publish() {
        let mut page = NewPage::named("Home").into_page(&app());
        assert!(page.to_dto(true, true).is_none());

        page.publish();
        page.layout_working = serde_json::json!({"edited": true});
        page.name = "Landing".into();

        let view = page.to_dto(true, true).unwrap();
        assert_eq!(view.name, "Home");
        assert_eq!(view.layout, empty_layout());

        let edit = page.to_dto(false, true).unwrap();
        assert_eq!(edit.name, "Landing");
        assert_eq!(edit.layout, serde_json::json!({"edited": true}));
    }

    #[test]
    fn test_pending_deletion_hides_working_copy() {
        let mut page = NewPage::named("Home").into_page(&app());
        page.publish();
        page.pending_deletion = true;

        assert!(page.to_dto(false, false).is_none());
        assert!(page.to_dto(true, false).is_some());
    }

    #[test]
    fn test_new_page_inherits_branch() {
        let mut owner = app();
        owner.branch_name = "feature".into();
        let page = NewPage::named("Home").into_page(&owner);
        assert_eq!(page.branch_name, "feature");
        assert_eq!(page.application_id, owner.id);
        assert_eq!(page.id, page.default_page_id);
    }
}
