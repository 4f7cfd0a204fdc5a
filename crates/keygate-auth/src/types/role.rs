//! Roles and permissions.
//!
//! Two disjoint universes exist. System roles and permissions are global
//! (`is_system = true`, no organization). Custom roles and permissions are
//! owned by exactly one organization (`is_system = false`,
//! `organization_id = Some(..)`).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name of the pseudo-role resolved for superadmins.
pub const SUPERADMIN_ROLE: &str = "superadmin";

// =============================================================================
// Permission
// =============================================================================

/// A permission that can be assigned to roles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission {
    pub id: Uuid,

    /// Permission string placed into tokens, e.g. `documents:write`.
    pub name: String,

    #[serde(default)]
    pub is_system: bool,

    /// Owning organization for custom permissions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<Uuid>,
}

impl Permission {
    /// Creates a global system permission.
    #[must_use]
    pub fn system(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            is_system: true,
            organization_id: None,
        }
    }

    /// Creates a custom permission owned by `organization_id`.
    #[must_use]
    pub fn custom(name: impl Into<String>, organization_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            is_system: false,
            organization_id: Some(organization_id),
        }
    }

    /// Returns `true` for a well-formed global system permission.
    #[must_use]
    pub fn is_system_global(&self) -> bool {
        self.is_system && self.organization_id.is_none()
    }

    /// Returns `true` if this permission may appear in a token scoped to `organization_id`.
    #[must_use]
    pub fn is_visible_in(&self, organization_id: Uuid) -> bool {
        self.is_system_global()
            || (!self.is_system && self.organization_id == Some(organization_id))
    }
}

// =============================================================================
// Role
// =============================================================================

/// A role referenced by memberships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,

    pub name: String,

    #[serde(default)]
    pub is_system: bool,

    /// Owning organization; required for custom roles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<Uuid>,
}

impl Role {
    /// Creates a global system role.
    #[must_use]
    pub fn system(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            is_system: true,
            organization_id: None,
        }
    }

    /// Creates a custom role owned by `organization_id`.
    #[must_use]
    pub fn custom(name: impl Into<String>, organization_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            is_system: false,
            organization_id: Some(organization_id),
        }
    }

    /// The pseudo-role reported for superadmins. It is never stored.
    #[must_use]
    pub fn superadmin() -> Self {
        Self {
            id: Uuid::nil(),
            name: SUPERADMIN_ROLE.to_string(),
            is_system: true,
            organization_id: None,
        }
    }

    /// Returns `true` for a custom role owned by `organization_id`.
    #[must_use]
    pub fn is_custom_for(&self, organization_id: Uuid) -> bool {
        !self.is_system && self.organization_id == Some(organization_id)
    }
}
