use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Access policy attached to an application or page.
///
/// Principals are opaque strings (`user:<id>`, `org:<id>:admin`, ...). The
/// core never evaluates them; it only derives, merges and copies them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySet {
    pub editors: BTreeSet<String>,
    pub viewers: BTreeSet<String>,
}

impl PolicySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_editor(mut self, principal: impl Into<String>) -> Self {
        self.editors.insert(principal.into());
        self
    }

    pub fn with_viewer(mut self, principal: impl Into<String>) -> Self {
        self.viewers.insert(principal.into());
        self
    }

    /// Union of both sets; the result grants everything either side granted
    pub fn union(&self, other: &PolicySet) -> PolicySet {
        PolicySet {
            editors: self.editors.union(&other.editors).cloned().collect(),
            viewers: self.viewers.union(&other.viewers).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.editors.is_empty() && self.viewers.is_empty()
    }
}
