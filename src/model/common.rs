use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type Id = String;

/// Arbitrary JSON layout tree owned by a page (widgets, bindings, etc.)
pub type Layout = serde_json::Value;

pub fn generate_id() -> Id {
    Uuid::new_v4().to_string()
}

/// The two kinds of branch-aware entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Application,
    Page,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Application => "application",
            EntityKind::Page => "page",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to an entity as supplied by a caller: either the physical id of
/// one branch copy, or the logical id plus the branch to look it up on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityRef {
    Concrete(Id),
    Branched { default_id: Id, branch_name: String },
}

impl EntityRef {
    pub fn concrete(id: impl Into<Id>) -> Self {
        EntityRef::Concrete(id.into())
    }

    pub fn branched(default_id: impl Into<Id>, branch_name: impl Into<String>) -> Self {
        EntityRef::Branched {
            default_id: default_id.into(),
            branch_name: branch_name.into(),
        }
    }
}

impl From<Id> for EntityRef {
    fn from(id: Id) -> Self {
        EntityRef::Concrete(id)
    }
}

impl From<&str> for EntityRef {
    fn from(id: &str) -> Self {
        EntityRef::Concrete(id.to_string())
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Concrete(id) => f.write_str(id),
            EntityRef::Branched {
                default_id,
                branch_name,
            } => write!(f, "{}@{}", default_id, branch_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_ref_display() {
        assert_eq!(EntityRef::concrete("abc").to_string(), "abc");
        assert_eq!(EntityRef::branched("abc", "feature").to_string(), "abc@feature");
    }

    #[test]
    fn test_entity_ref_json_shape() {
        let json = serde_json::to_value(EntityRef::branched("app-1", "main")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"branched": {"default_id": "app-1", "branch_name": "main"}})
        );
    }
}
