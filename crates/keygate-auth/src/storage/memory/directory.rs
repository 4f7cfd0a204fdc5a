use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::AuthResult;
use crate::storage::{ClientStorage, RoleStorage, UserStorage};
use crate::types::{ClientApp, Membership, Permission, Role, User};

/// In-memory client registry.
#[derive(Default)]
pub struct InMemoryClientStorage {
    clients: DashMap<String, ClientApp>,
}

impl InMemoryClientStorage {
    pub fn insert(&self, client: ClientApp) {
        self.clients.insert(client.client_id.clone(), client);
    }
}

#[async_trait]
impl ClientStorage for InMemoryClientStorage {
    async fn find_by_client_id(&self, client_id: &str) -> AuthResult<Option<ClientApp>> {
        Ok(self.clients.get(client_id).map(|c| c.clone()))
    }
}

/// In-memory users and memberships.
#[derive(Default)]
pub struct InMemoryUserStorage {
    users: DashMap<Uuid, User>,
    memberships: DashMap<(Uuid, Uuid), Membership>,
}

impl InMemoryUserStorage {
    pub fn insert_user(&self, user: User) {
        self.users.insert(user.id, user);
    }

    /// Inserts or replaces the membership for `(organization_id, user_id)`.
    pub fn insert_membership(&self, membership: Membership) {
        self.memberships.insert(
            (membership.organization_id, membership.user_id),
            membership,
        );
    }

    /// Flips a user's `active` flag. Returns `false` if the user is unknown.
    pub fn set_user_active(&self, user_id: Uuid, active: bool) -> bool {
        match self.users.get_mut(&user_id) {
            Some(mut user) => {
                user.active = active;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl UserStorage for InMemoryUserStorage {
    async fn get_user(&self, user_id: Uuid) -> AuthResult<Option<User>> {
        Ok(self.users.get(&user_id).map(|u| u.clone()))
    }

    async fn get_active_membership(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> AuthResult<Option<Membership>> {
        Ok(self
            .memberships
            .get(&(organization_id, user_id))
            .filter(|m| m.is_active())
            .map(|m| m.clone()))
    }
}

/// In-memory roles, permissions and role-permission assignments.
#[derive(Default)]
pub struct InMemoryRoleStorage {
    roles: DashMap<Uuid, Role>,
    permissions: DashMap<Uuid, Permission>,
    assignments: DashMap<Uuid, Vec<Uuid>>,
}

impl InMemoryRoleStorage {
    pub fn insert_role(&self, role: Role) {
        self.roles.insert(role.id, role);
    }

    pub fn insert_permission(&self, permission: Permission) {
        self.permissions.insert(permission.id, permission);
    }

    /// Assigns a permission to a role. Both must already be inserted.
    ///
    /// No ownership check is made here, so tests can reproduce a bad join
    /// that attaches another organization's permission to a role.
    pub fn assign(&self, role_id: Uuid, permission_id: Uuid) {
        let mut entry = self.assignments.entry(role_id).or_default();
        if !entry.contains(&permission_id) {
            entry.push(permission_id);
        }
    }
}

#[async_trait]
impl RoleStorage for InMemoryRoleStorage {
    async fn get_role(&self, role_id: Uuid) -> AuthResult<Option<Role>> {
        Ok(self.roles.get(&role_id).map(|r| r.clone()))
    }

    async fn get_role_permissions(&self, role_id: Uuid) -> AuthResult<Vec<Permission>> {
        let Some(ids) = self.assignments.get(&role_id).map(|ids| ids.clone()) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| self.permissions.get(id).map(|p| p.clone()))
            .collect())
    }

    async fn list_system_permissions(&self) -> AuthResult<Vec<Permission>> {
        Ok(self
            .permissions
            .iter()
            .filter(|p| p.is_system_global())
            .map(|p| p.clone())
            .collect())
    }
}
