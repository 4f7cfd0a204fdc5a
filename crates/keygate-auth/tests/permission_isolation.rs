//! Organization isolation of roles and permissions in issued tokens.

mod common;

use common::{Harness, ctx};
use keygate_auth::prelude::*;
use keygate_auth::types::SUPERADMIN_ROLE;
use uuid::Uuid;

struct Tenant {
    org: Uuid,
    role: Role,
}

fn seed_tenant(h: &Harness, role_name: &str, permission: &str) -> Tenant {
    let org = Uuid::new_v4();
    let role = Role::custom(role_name, org);
    let custom = Permission::custom(permission, org);
    let shared = Permission::system("profile:read");
    h.stores.roles.insert_role(role.clone());
    h.stores.roles.insert_permission(custom.clone());
    h.stores.roles.insert_permission(shared.clone());
    h.stores.roles.assign(role.id, custom.id);
    h.stores.roles.assign(role.id, shared.id);
    Tenant { org, role }
}

fn join(h: &Harness, user: &User, tenant: &Tenant) {
    h.stores.users.insert_membership(Membership {
        organization_id: tenant.org,
        user_id: user.id,
        role_id: tenant.role.id,
        status: MembershipStatus::Active,
    });
}

#[tokio::test]
async fn test_tokens_carry_only_the_selected_org() {
    let h = Harness::new();
    let a = seed_tenant(&h, "editor", "documents:write");
    let b = seed_tenant(&h, "auditor", "reports:export");
    join(&h, &h.user, &a);
    join(&h, &h.user, &b);

    let response = h.login(Some(a.org)).await;
    let claims = h.signer.verify(&response.access_token).unwrap();
    assert_eq!(claims.org_id, Some(a.org));
    assert_eq!(claims.roles, vec!["editor".to_string()]);
    assert_eq!(
        claims.permissions,
        vec!["documents:write".to_string(), "profile:read".to_string()]
    );
    assert!(!claims.permissions.contains(&"reports:export".to_string()));
}

#[tokio::test]
async fn test_foreign_permission_on_role_is_dropped() {
    let h = Harness::new();
    let a = seed_tenant(&h, "editor", "documents:write");
    let other_org = Uuid::new_v4();
    let leaked = Permission::custom("billing:admin", other_org);
    h.stores.roles.insert_permission(leaked.clone());
    h.stores.roles.assign(a.role.id, leaked.id);
    join(&h, &h.user, &a);

    let resolved = h
        .engine
        .resolve_permissions(&ctx(), &h.user, Some(a.org))
        .await
        .unwrap();
    assert!(!resolved.permissions.contains(&"billing:admin".to_string()));
    assert!(resolved.permissions.contains(&"documents:write".to_string()));
}

#[tokio::test]
async fn test_non_member_gets_empty_claims() {
    let h = Harness::new();
    let a = seed_tenant(&h, "editor", "documents:write");

    let response = h.login(Some(a.org)).await;
    let claims = h.signer.verify(&response.access_token).unwrap();
    assert!(claims.roles.is_empty());
    assert!(claims.permissions.is_empty());
}

#[tokio::test]
async fn test_suspended_membership_blocks_refresh() {
    let h = Harness::new();
    let a = seed_tenant(&h, "editor", "documents:write");
    join(&h, &h.user, &a);
    let response = h.login(Some(a.org)).await;

    h.stores.users.insert_membership(Membership {
        organization_id: a.org,
        user_id: h.user.id,
        role_id: a.role.id,
        status: MembershipStatus::Suspended,
    });

    let err = h
        .engine
        .refresh_access_token(&ctx(), &response.refresh_token, common::CLIENT_ID)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidGrant { .. }));
}

#[tokio::test]
async fn test_superadmin_gets_system_permissions_only() {
    let h = Harness::new();
    let a = seed_tenant(&h, "editor", "documents:write");
    let admin = User::superadmin("root@example.com");
    h.stores.users.insert_user(admin.clone());

    let resolved = h
        .engine
        .resolve_permissions(&ctx(), &admin, Some(a.org))
        .await
        .unwrap();
    assert_eq!(resolved.roles, vec![SUPERADMIN_ROLE.to_string()]);
    assert!(resolved.permissions.contains(&"profile:read".to_string()));
    assert!(!resolved.permissions.contains(&"documents:write".to_string()));
}
