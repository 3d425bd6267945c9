use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ApiError;
use crate::users::repo::User;

/// Closed set of account roles. Wire and storage use the kebab-case names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(type_name = "user_role", rename_all = "kebab-case")]
pub enum Role {
    User,
    Guide,
    LeadGuide,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Guide => "guide",
            Role::LeadGuide => "lead-guide",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pure role-membership check. No IO, no mutation; composed after the
/// session guard on routes that need it.
pub fn require_role(user: &User, allowed: &[Role]) -> Result<(), ApiError> {
    if allowed.contains(&user.role) {
        Ok(())
    } else {
        warn!(user_id = %user.id, role = %user.role, "role not permitted");
        Err(ApiError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_allow_list_rejects_regular_user() {
        let user = User::fixture(Role::User);
        let err = require_role(&user, &[Role::Admin]).unwrap_err();
        assert!(matches!(err, ApiError::Forbidden));
    }

    #[test]
    fn admin_allow_list_accepts_admin() {
        let admin = User::fixture(Role::Admin);
        assert!(require_role(&admin, &[Role::Admin]).is_ok());
    }

    #[test]
    fn multi_role_allow_list_accepts_any_member() {
        let lead = User::fixture(Role::LeadGuide);
        assert!(require_role(&lead, &[Role::Admin, Role::LeadGuide]).is_ok());
        let guide = User::fixture(Role::Guide);
        assert!(require_role(&guide, &[Role::Admin, Role::LeadGuide]).is_err());
    }

    #[test]
    fn roles_serialize_to_kebab_case() {
        assert_eq!(serde_json::to_string(&Role::LeadGuide).unwrap(), "\"lead-guide\"");
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert_eq!(Role::LeadGuide.to_string(), "lead-guide");
    }
}
