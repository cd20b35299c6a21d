use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Hr,
    TeamMember,
    Requester,
    Candidate,
}

impl Role {
    pub fn is_hr_or_admin(self) -> bool {
        matches!(self, Role::Admin | Role::Hr)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Hr => "hr",
            Role::TeamMember => "team_member",
            Role::Requester => "requester",
            Role::Candidate => "candidate",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated user on whose behalf a coordinator call runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub id: String,
    pub role: Role,
}

impl Caller {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    /// Capability check shared by every coordinator entry point.
    pub fn assert_role(&self, allowed: &[Role]) -> Result<()> {
        if allowed.is_empty() || allowed.contains(&self.role) {
            Ok(())
        } else {
            tracing::warn!(caller = %self.id, role = %self.role, "role check failed");
            Err(Error::Unauthorized(format!(
                "role {} is not permitted; requires one of: {}",
                self.role,
                allowed
                    .iter()
                    .map(|r| r.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )))
        }
    }
}

pub const HR_ROLES: &[Role] = &[Role::Admin, Role::Hr];
pub const ADMIN_ONLY: &[Role] = &[Role::Admin];
pub const EVALUATOR_ROLES: &[Role] = &[Role::Admin, Role::Hr, Role::TeamMember];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn assert_role_accepts_listed_roles() {
        let hr = Caller::new("u1", Role::Hr);
        assert!(hr.assert_role(HR_ROLES).is_ok());
        assert!(hr.assert_role(&[]).is_ok());
    }

    #[test]
    fn assert_role_rejects_with_authorization_kind() {
        let member = Caller::new("u2", Role::TeamMember);
        let err = member.assert_role(HR_ROLES).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
    }

    #[test]
    fn roles_use_snake_case_on_the_wire() {
        assert_eq!(serde_json::to_string(&Role::TeamMember).unwrap(), "\"team_member\"");
        let r: Role = serde_json::from_str("\"hr\"").unwrap();
        assert_eq!(r, Role::Hr);
    }
}
