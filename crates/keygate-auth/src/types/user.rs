//! Users and organization memberships.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(default)]
    pub is_superadmin: bool,
    /// Inactive users cannot obtain or refresh tokens.
    pub active: bool,
}

impl User {
    #[must_use]
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            is_superadmin: false,
            active: true,
        }
    }

    #[must_use]
    pub fn superadmin(email: impl Into<String>) -> Self {
        Self {
            is_superadmin: true,
            ..Self::new(email)
        }
    }
}

/// Membership status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    Active,
    Invited,
    Suspended,
}

impl MembershipStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Invited => "invited",
            Self::Suspended => "suspended",
        }
    }

    /// Parses the stored representation.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "invited" => Some(Self::Invited),
            "suspended" => Some(Self::Suspended),
            _ => None,
        }
    }
}

/// A user's membership in an organization. References exactly one role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub role_id: Uuid,
    pub status: MembershipStatus,
}

impl Membership {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == MembershipStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            MembershipStatus::Active,
            MembershipStatus::Invited,
            MembershipStatus::Suspended,
        ] {
            assert_eq!(MembershipStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(MembershipStatus::parse("deleted"), None);
    }

    #[test]
    fn test_superadmin_constructor() {
        let user = User::superadmin("root@example.com");
        assert!(user.is_superadmin);
        assert!(user.active);
    }
}
