use serde::{Deserialize, Serialize};

/// The user on whose behalf an operation runs; owner of newly created applications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    pub user_email: Option<String>,
    pub user_name: Option<String>,
}

impl UserContext {
    pub fn new(user_id: String) -> Self {
        Self {
            user_id,
            user_email: None,
            user_name: None,
        }
    }

    pub fn with_details(user_id: String, email: Option<String>, name: Option<String>) -> Self {
        Self {
            user_id,
            user_email: email,
            user_name: name,
        }
    }

    /// Context for seeding and maintenance jobs
    pub fn system() -> Self {
        Self {
            user_id: "system".to_string(),
            user_email: Some("system@pageforge.internal".to_string()),
            user_name: Some("System".to_string()),
        }
    }

    /// Principal string used in policy sets
    pub fn principal(&self) -> String {
        format!("user:{}", self.user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_principal_format() {
        let ctx = UserContext::with_details(
            "user123".to_string(),
            Some("user@example.com".to_string()),
            None,
        );
        assert_eq!(ctx.principal(), "user:user123");
        assert_eq!(UserContext::system().principal(), "user:system");
    }
}
