use serde::{Deserialize, Serialize};

use crate::model::{Application, EntityKind, Id, Page};

/// Index entry mapping a logical id on one branch to the physical copy
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BranchBinding {
    pub kind: EntityKind,
    pub default_id: Id,
    pub branch_name: String,
    pub concrete_id: Id,
}

impl BranchBinding {
    pub fn for_application(application: &Application) -> Self {
        Self {
            kind: EntityKind::Application,
            default_id: application.default_application_id.clone(),
            branch_name: application.branch_name.clone(),
            concrete_id: application.id.clone(),
        }
    }

    pub fn for_page(page: &Page) -> Self {
        Self {
            kind: EntityKind::Page,
            default_id: page.default_page_id.clone(),
            branch_name: page.branch_name.clone(),
            concrete_id: page.id.clone(),
        }
    }

    pub fn key(&self) -> BindingKey {
        BindingKey {
            kind: self.kind,
            default_id: self.default_id.clone(),
            branch_name: self.branch_name.clone(),
        }
    }
}

/// Lookup key of a binding
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BindingKey {
    pub kind: EntityKind,
    pub default_id: Id,
    pub branch_name: String,
}

impl std::fmt::Display for BindingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.default_id, self.branch_name)
    }
}

impl BindingKey {
    pub fn new(kind: EntityKind, default_id: &str, branch_name: &str) -> Self {
        Self {
            kind,
            default_id: default_id.to_string(),
            branch_name: branch_name.to_string(),
        }
    }
}
