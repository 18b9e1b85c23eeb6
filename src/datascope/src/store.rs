//! Role suppliers and identity resolution
//!
//! The engine only reads roles; these traits are the seams to the
//! role-management subsystem and the authentication middleware.

use crate::error::{DataScopeError, Result};
use crate::types::{Role, RoleId, TenantId, UserId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "postgres")]
pub use postgres::PostgresRoleStore;

/// Supplies the roles assigned to a principal within one tenant
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Roles assigned to `user_id`, enabled or not, in a stable order
    async fn roles_for_user(&self, tenant_id: &str, user_id: &str) -> Result<Vec<Role>>;
}

/// Yields the current principal from ambient request state
pub trait IdentityResolver: Send + Sync {
    /// Current principal identifier, if authenticated
    fn current_user_id(&self) -> Option<UserId>;
}

/// Identity fixed at construction (e.g., taken from a verified token)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticIdentity {
    user_id: Option<UserId>,
}

impl StaticIdentity {
    /// An authenticated principal
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
        }
    }

    /// No authenticated principal
    pub fn anonymous() -> Self {
        Self::default()
    }
}

impl IdentityResolver for StaticIdentity {
    fn current_user_id(&self) -> Option<UserId> {
        self.user_id.clone()
    }
}

/// In-memory role store (for testing and embedding)
///
/// Lock order is always `roles` before `assignments`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRoleStore {
    roles: Arc<RwLock<HashMap<RoleId, Role>>>,
    assignments: Arc<RwLock<HashMap<(TenantId, UserId), Vec<RoleId>>>>,
}

impl InMemoryRoleStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a role
    pub async fn upsert_role(&self, role: Role) {
        self.roles.write().await.insert(role.id.clone(), role);
    }

    /// Assign a role to a user; the role must exist in the same tenant
    pub async fn assign_role(&self, tenant_id: &str, user_id: &str, role_id: &str) -> Result<()> {
        {
            let roles = self.roles.read().await;
            let role = roles
                .get(role_id)
                .ok_or_else(|| DataScopeError::InvalidInput(format!("Role not found: {}", role_id)))?;

            if role.tenant_id != tenant_id {
                return Err(DataScopeError::InvalidInput(format!(
                    "Role {} does not belong to tenant {}",
                    role_id, tenant_id
                )));
            }
        }

        let mut assignments = self.assignments.write().await;
        let assigned = assignments
            .entry((tenant_id.to_string(), user_id.to_string()))
            .or_default();
        if !assigned.iter().any(|id| id == role_id) {
            assigned.push(role_id.to_string());
        }
        Ok(())
    }

    /// Remove a role assignment
    pub async fn revoke_role(&self, tenant_id: &str, user_id: &str, role_id: &str) {
        let key = (tenant_id.to_string(), user_id.to_string());
        if let Some(assigned) = self.assignments.write().await.get_mut(&key) {
            assigned.retain(|id| id != role_id);
        }
    }
}

#[async_trait]
impl RoleStore for InMemoryRoleStore {
    async fn roles_for_user(&self, tenant_id: &str, user_id: &str) -> Result<Vec<Role>> {
        let key = (tenant_id.to_string(), user_id.to_string());
        let roles = self.roles.read().await;
        let assignments = self.assignments.read().await;

        Ok(assignments
            .get(&key)
            .into_iter()
            .flatten()
            .filter_map(|role_id| roles.get(role_id))
            .filter(|role| role.tenant_id == tenant_id)
            .cloned()
            .collect())
    }
}

/// Decodes scope values stored as a JSON array of strings
///
/// Blank or malformed input decodes to an empty list, which CUSTOM and
/// WAREHOUSE scopes treat as "no rows".
pub fn decode_scope_values(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Vec::new();
    };

    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(values) => values,
        Err(e) => {
            warn!(error = %e, "Malformed scope values, treating as empty");
            Vec::new()
        }
    }
}
