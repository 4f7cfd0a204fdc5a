//! Two-tier permission resolver.
//!
//! # Isolation rules
//!
//! - A superadmin resolves to the `superadmin` pseudo-role and every global
//!   system permission. Organization-custom permissions are never included,
//!   whatever organization context is supplied.
//! - Any other user needs an organization context and an active membership
//!   in it; without either, the result is empty rather than an error.
//! - A membership must reference a custom role owned by that organization.
//!   Anything else is an invalid data state and fails resolution.
//! - The role's permissions are filtered to system-global permissions and
//!   custom permissions owned by the token's organization. Permissions of any
//!   other organization are dropped.

use std::collections::BTreeSet;
use std::sync::Arc;

use uuid::Uuid;

use crate::AuthResult;
use crate::context::RequestContext;
use crate::error::AuthError;
use crate::storage::{RoleStorage, UserStorage};
use crate::types::{Permission, Role, User};

/// Roles and permission names resolved for one principal and organization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedPermissions {
    /// Role names, sorted.
    pub roles: Vec<String>,
    /// Permission names, sorted and deduplicated.
    pub permissions: Vec<String>,
}

impl ResolvedPermissions {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty() && self.permissions.is_empty()
    }

    fn from_parts(roles: &[Role], permissions: impl IntoIterator<Item = Permission>) -> Self {
        let roles: BTreeSet<String> = roles.iter().map(|r| r.name.clone()).collect();
        let permissions: BTreeSet<String> = permissions.into_iter().map(|p| p.name).collect();
        Self {
            roles: roles.into_iter().collect(),
            permissions: permissions.into_iter().collect(),
        }
    }
}

/// Computes the roles and permissions a principal may carry in a token.
pub struct PermissionResolver {
    users: Arc<dyn UserStorage>,
    roles: Arc<dyn RoleStorage>,
}

impl PermissionResolver {
    #[must_use]
    pub fn new(users: Arc<dyn UserStorage>, roles: Arc<dyn RoleStorage>) -> Self {
        Self { users, roles }
    }

    /// Resolves the roles of `user` in `organization_id`.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the membership references a missing role, a
    /// system role or another organization's role.
    pub async fn resolve_roles(
        &self,
        ctx: &RequestContext,
        user: &User,
        organization_id: Option<Uuid>,
    ) -> AuthResult<Vec<Role>> {
        if user.is_superadmin {
            return Ok(vec![Role::superadmin()]);
        }
        let Some(org_id) = organization_id else {
            return Ok(Vec::new());
        };
        Ok(self
            .membership_role(ctx, user.id, org_id)
            .await?
            .into_iter()
            .collect())
    }

    /// Resolves the permission names of `user` in `organization_id`.
    ///
    /// # Errors
    ///
    /// Same as [`PermissionResolver::resolve_roles`].
    pub async fn resolve_permissions(
        &self,
        ctx: &RequestContext,
        user: &User,
        organization_id: Option<Uuid>,
    ) -> AuthResult<Vec<String>> {
        Ok(self.resolve(ctx, user, organization_id).await?.permissions)
    }

    /// Resolves roles and permissions together.
    ///
    /// # Errors
    ///
    /// Same as [`PermissionResolver::resolve_roles`].
    pub async fn resolve(
        &self,
        ctx: &RequestContext,
        user: &User,
        organization_id: Option<Uuid>,
    ) -> AuthResult<ResolvedPermissions> {
        if user.is_superadmin {
            let system = ctx.run(self.roles.list_system_permissions()).await?;
            return Ok(ResolvedPermissions::from_parts(
                &[Role::superadmin()],
                system.into_iter().filter(Permission::is_system_global),
            ));
        }

        let Some(org_id) = organization_id else {
            return Ok(ResolvedPermissions::default());
        };
        let Some(role) = self.membership_role(ctx, user.id, org_id).await? else {
            return Ok(ResolvedPermissions::default());
        };

        let assigned = ctx.run(self.roles.get_role_permissions(role.id)).await?;
        let total = assigned.len();
        let visible: Vec<Permission> = assigned
            .into_iter()
            .filter(|p| p.is_visible_in(org_id))
            .collect();
        if visible.len() != total {
            tracing::warn!(
                user_id = %user.id,
                org_id = %org_id,
                role_id = %role.id,
                dropped = total - visible.len(),
                "Dropped permissions owned by another organization"
            );
        }

        Ok(ResolvedPermissions::from_parts(&[role], visible))
    }

    async fn membership_role(
        &self,
        ctx: &RequestContext,
        user_id: Uuid,
        org_id: Uuid,
    ) -> AuthResult<Option<Role>> {
        let Some(membership) = ctx
            .run(self.users.get_active_membership(org_id, user_id))
            .await?
        else {
            return Ok(None);
        };

        let role = ctx
            .run(self.roles.get_role(membership.role_id))
            .await?
            .ok_or_else(|| {
                AuthError::internal(format!(
                    "membership references missing role {}",
                    membership.role_id
                ))
            })?;

        if role.is_system {
            tracing::error!(
                user_id = %user_id,
                org_id = %org_id,
                role_id = %role.id,
                "Membership references a system role"
            );
            return Err(AuthError::internal("membership references a system role"));
        }
        if !role.is_custom_for(org_id) {
            tracing::error!(
                user_id = %user_id,
                org_id = %org_id,
                role_id = %role.id,
                "Membership references another organization's role"
            );
            return Err(AuthError::internal(
                "membership references another organization's role",
            ));
        }

        Ok(Some(role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::{InMemoryRoleStorage, InMemoryUserStorage};
    use crate::types::{Membership, MembershipStatus};

    struct Fixture {
        users: Arc<InMemoryUserStorage>,
        roles: Arc<InMemoryRoleStorage>,
        resolver: PermissionResolver,
    }

    fn fixture() -> Fixture {
        let users = Arc::new(InMemoryUserStorage::default());
        let roles = Arc::new(InMemoryRoleStorage::default());
        let resolver = PermissionResolver::new(users.clone(), roles.clone());
        Fixture {
            users,
            roles,
            resolver,
        }
    }

    fn join(f: &Fixture, user: &User, org: Uuid, role: &Role, status: MembershipStatus) {
        f.users.insert_membership(Membership {
            organization_id: org,
            user_id: user.id,
            role_id: role.id,
            status,
        });
    }

    #[tokio::test]
    async fn test_member_gets_filtered_permissions() {
        let f = fixture();
        let ctx = RequestContext::background();
        let org_a = Uuid::new_v4();
        let org_b = Uuid::new_v4();

        let system = Permission::system("users:read");
        let own = Permission::custom("docs:write", org_a);
        let foreign = Permission::custom("billing:admin", org_b);
        let editor = Role::custom("editor", org_a);
        for p in [&system, &own, &foreign] {
            f.roles.insert_permission(p.clone());
            f.roles.assign(editor.id, p.id);
        }
        f.roles.insert_role(editor.clone());

        let user = User::new("alice@example.com");
        f.users.insert_user(user.clone());
        join(&f, &user, org_a, &editor, MembershipStatus::Active);

        let resolved = f.resolver.resolve(&ctx, &user, Some(org_a)).await.unwrap();
        assert_eq!(resolved.roles, vec!["editor".to_string()]);
        assert_eq!(
            resolved.permissions,
            vec!["docs:write".to_string(), "users:read".to_string()]
        );
    }

    #[tokio::test]
    async fn test_no_org_or_membership_yields_empty() {
        let f = fixture();
        let ctx = RequestContext::background();
        let org = Uuid::new_v4();
        let user = User::new("bob@example.com");

        assert!(f.resolver.resolve(&ctx, &user, None).await.unwrap().is_empty());
        assert!(
            f.resolver
                .resolve(&ctx, &user, Some(org))
                .await
                .unwrap()
                .is_empty()
        );

        let role = Role::custom("viewer", org);
        f.roles.insert_role(role.clone());
        join(&f, &user, org, &role, MembershipStatus::Suspended);
        assert!(
            f.resolver
                .resolve_roles(&ctx, &user, Some(org))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_superadmin_gets_system_permissions_only() {
        let f = fixture();
        let ctx = RequestContext::background();
        let org = Uuid::new_v4();
        f.roles.insert_permission(Permission::system("users:read"));
        f.roles.insert_permission(Permission::system("orgs:manage"));
        f.roles
            .insert_permission(Permission::custom("docs:write", org));

        let admin = User::superadmin("root@example.com");
        for org_ctx in [None, Some(org)] {
            let resolved = f.resolver.resolve(&ctx, &admin, org_ctx).await.unwrap();
            assert_eq!(resolved.roles, vec!["superadmin".to_string()]);
            assert_eq!(
                resolved.permissions,
                vec!["orgs:manage".to_string(), "users:read".to_string()]
            );
        }
    }

    #[tokio::test]
    async fn test_system_role_membership_is_rejected() {
        let f = fixture();
        let ctx = RequestContext::background();
        let org = Uuid::new_v4();
        let role = Role::system("admin");
        f.roles.insert_role(role.clone());
        let user = User::new("carol@example.com");
        join(&f, &user, org, &role, MembershipStatus::Active);

        assert!(matches!(
            f.resolver.resolve_permissions(&ctx, &user, Some(org)).await,
            Err(AuthError::Internal { .. })
        ));
    }

    #[tokio::test]
    async fn test_foreign_role_membership_is_rejected() {
        let f = fixture();
        let ctx = RequestContext::background();
        let org_a = Uuid::new_v4();
        let org_b = Uuid::new_v4();
        let role = Role::custom("editor", org_b);
        f.roles.insert_role(role.clone());
        let user = User::new("dave@example.com");
        join(&f, &user, org_a, &role, MembershipStatus::Active);

        assert!(matches!(
            f.resolver.resolve_roles(&ctx, &user, Some(org_a)).await,
            Err(AuthError::Internal { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_role_is_rejected() {
        let f = fixture();
        let ctx = RequestContext::background();
        let org = Uuid::new_v4();
        let user = User::new("erin@example.com");
        f.users.insert_membership(Membership {
            organization_id: org,
            user_id: user.id,
            role_id: Uuid::new_v4(),
            status: MembershipStatus::Active,
        });

        assert!(f.resolver.resolve(&ctx, &user, Some(org)).await.is_err());
    }
}
