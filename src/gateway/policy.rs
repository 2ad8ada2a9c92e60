use crate::model::{PolicySet, UserContext};

/// Derives and merges access policies. Evaluation happens elsewhere.
pub trait PolicyGateway: Send + Sync {
    fn derive_policies(&self, owner: &UserContext, org_id: &str) -> PolicySet;

    fn merge_policies(&self, current: &PolicySet, derived: &PolicySet) -> PolicySet {
        current.union(derived)
    }
}

/// Owner and org admins edit, org members view
#[derive(Debug, Clone, Copy, Default)]
pub struct OrgPolicyGateway;

impl OrgPolicyGateway {
    pub fn admin_principal(org_id: &str) -> String {
        format!("org:{}:admin", org_id)
    }

    pub fn member_principal(org_id: &str) -> String {
        format!("org:{}:member", org_id)
    }
}

impl PolicyGateway for OrgPolicyGateway {
    fn derive_policies(&self, owner: &UserContext, org_id: &str) -> PolicySet {
        let editors = PolicySet::new()
            .with_editor(owner.principal())
            .with_editor(Self::admin_principal(org_id));

        PolicySet {
            viewers: editors
                .editors
                .iter()
                .cloned()
                .chain(std::iter::once(Self::member_principal(org_id)))
                .collect(),
            editors: editors.editors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_editors_can_also_view() {
        let owner = UserContext::new("alice".into());
        let policies = OrgPolicyGateway.derive_policies(&owner, "acme");

        assert!(policies.editors.contains("user:alice"));
        assert!(policies.editors.contains("org:acme:admin"));
        assert!(policies.viewers.is_superset(&policies.editors));
        assert!(policies.viewers.contains("org:acme:member"));
        assert!(!policies.editors.contains("org:acme:member"));
    }

    #[test]
    fn test_merge_is_union() {
        let owner = UserContext::new("bob".into());
        let existing = PolicySet::new().with_viewer("user:guest");
        let derived = OrgPolicyGateway.derive_policies(&owner, "acme");

        let merged = OrgPolicyGateway.merge_policies(&existing, &derived);
        assert!(merged.viewers.contains("user:guest"));
        assert!(merged.editors.contains("user:bob"));
    }
}
