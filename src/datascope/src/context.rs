//! Per-request scope context and read-only scope queries

use crate::error::{DataScopeError, Result};
use crate::filter::PredicateBuilder;
use crate::merge::{merge_scopes, EffectiveScopeMap};
use crate::query::ScopeQuery;
use crate::registry::ResourceRegistry;
use crate::store::{IdentityResolver, RoleStore};
use crate::types::{Role, ScopeType, UserId};
use tracing::debug;

impl EffectiveScopeMap {
    /// Returns true if the resource is unconfigured or has ALL scope
    pub fn can_access_all(&self, resource: &str) -> bool {
        self.get(resource)
            .map_or(true, |scope| scope.scope_type == ScopeType::All)
    }

    /// Warehouse IDs for a resource under WAREHOUSE scope
    ///
    /// `None` means the resource is not warehouse-governed (unrestricted, or
    /// restricted some other way).
    pub fn warehouse_ids(&self, resource: &str) -> Option<&[String]> {
        self.get(resource)
            .filter(|scope| scope.scope_type == ScopeType::Warehouse)
            .map(|scope| scope.scope_values.as_slice())
    }

    /// Returns true unless a WAREHOUSE scope excludes `warehouse_id`
    ///
    /// Only the WAREHOUSE type restricts warehouse access; every other scope
    /// type leaves it open.
    pub fn has_warehouse_access(&self, resource: &str, warehouse_id: &str) -> bool {
        self.warehouse_ids(resource)
            .map_or(true, |ids| ids.iter().any(|id| id == warehouse_id))
    }

    /// Effective scope type, ALL when unconfigured
    pub fn scope_type(&self, resource: &str) -> ScopeType {
        self.get(resource)
            .map_or(ScopeType::All, |scope| scope.scope_type.clone())
    }

    /// Returns true if a scope is configured for the resource
    pub fn has_scope(&self, resource: &str) -> bool {
        self.get(resource).is_some()
    }

    /// Returns true if the resource is under WAREHOUSE scope
    pub fn is_warehouse_scoped(&self, resource: &str) -> bool {
        self.warehouse_ids(resource).is_some()
    }

    /// Returns true if the effective scope reaches at least `minimum`
    ///
    /// Unconfigured resources count as ALL.
    pub fn meets_minimum_scope(&self, resource: &str, minimum: &ScopeType) -> bool {
        self.scope_type(resource).meets(minimum)
    }
}

/// Returns true if both identifiers are present and equal
pub fn is_owner(owner_id: Option<&str>, current_user_id: Option<&str>) -> bool {
    match (present(owner_id), present(current_user_id)) {
        (Some(owner), Some(current)) => owner == current,
        _ => false,
    }
}

fn present(id: Option<&str>) -> Option<&str> {
    id.filter(|id| !id.is_empty())
}

/// Immutable per-request scope state
///
/// Carries the current principal and the merged scopes explicitly through
/// the call chain. Create one per request and drop it afterwards.
///
/// # Examples
///
/// ```
/// use erp_datascope::{DataScope, Role, ScopeContext, ScopeFilter};
///
/// let keeper = Role::new("t1", "keeper", "Warehouse keeper").unwrap()
///     .with_data_scope(DataScope::warehouse("stock_batch", vec!["w1".into()]).unwrap());
///
/// let ctx = ScopeContext::from_roles(Some("u1".to_string()), &[keeper]);
/// assert!(ctx.has_warehouse_access("stock_batch", "w1"));
/// assert!(!ctx.has_warehouse_access("stock_batch", "w2"));
///
/// let filter = ctx.apply(ScopeFilter::new(), "stock_batch");
/// assert_eq!(filter.to_string(), r#"warehouse_id IN ("w1")"#);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeContext {
    user_id: Option<UserId>,
    scopes: EffectiveScopeMap,
}

impl ScopeContext {
    /// Creates a context from an already merged scope map
    pub fn new(user_id: Option<UserId>, scopes: EffectiveScopeMap) -> Self {
        Self {
            user_id: user_id.filter(|id| !id.is_empty()),
            scopes,
        }
    }

    /// Creates a context by merging the given roles
    pub fn from_roles(user_id: Option<UserId>, roles: &[Role]) -> Self {
        Self::new(user_id, merge_scopes(roles))
    }

    /// Loads the current principal's roles and merges them
    ///
    /// Fails when no principal is authenticated, since there is no role set
    /// to evaluate.
    pub async fn load<S, I>(store: &S, identity: &I, tenant_id: &str) -> Result<Self>
    where
        S: RoleStore + ?Sized,
        I: IdentityResolver + ?Sized,
    {
        let user_id = identity
            .current_user_id()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| DataScopeError::InvalidInput("no authenticated principal".to_string()))?;

        let roles = store.roles_for_user(tenant_id, &user_id).await?;
        debug!(
            tenant_id,
            user_id = %user_id,
            roles = roles.len(),
            "Loaded roles for scope context"
        );

        Ok(Self::from_roles(Some(user_id), &roles))
    }

    /// Current principal, if any
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Merged scopes
    pub fn scopes(&self) -> &EffectiveScopeMap {
        &self.scopes
    }

    /// Applies the scope for `resource` using the process-wide registry
    pub fn apply<Q: ScopeQuery>(&self, query: Q, resource: &str) -> Q {
        self.apply_with(&PredicateBuilder::new(ResourceRegistry::global()), query, resource)
    }

    /// Applies the scope for `resource` with a specific builder
    pub fn apply_with<Q: ScopeQuery>(&self, builder: &PredicateBuilder<'_>, query: Q, resource: &str) -> Q {
        builder.apply(query, resource, &self.scopes, self.user_id())
    }

    /// See [`EffectiveScopeMap::can_access_all`]
    pub fn can_access_all(&self, resource: &str) -> bool {
        self.scopes.can_access_all(resource)
    }

    /// Returns true if the current principal owns a record
    pub fn is_owner(&self, owner_id: Option<&str>) -> bool {
        is_owner(owner_id, self.user_id())
    }

    /// See [`EffectiveScopeMap::warehouse_ids`]
    pub fn warehouse_ids(&self, resource: &str) -> Option<&[String]> {
        self.scopes.warehouse_ids(resource)
    }

    /// See [`EffectiveScopeMap::has_warehouse_access`]
    pub fn has_warehouse_access(&self, resource: &str, warehouse_id: &str) -> bool {
        self.scopes.has_warehouse_access(resource, warehouse_id)
    }

    /// See [`EffectiveScopeMap::scope_type`]
    pub fn scope_type(&self, resource: &str) -> ScopeType {
        self.scopes.scope_type(resource)
    }

    /// See [`EffectiveScopeMap::has_scope`]
    pub fn has_scope(&self, resource: &str) -> bool {
        self.scopes.has_scope(resource)
    }

    /// See [`EffectiveScopeMap::is_warehouse_scoped`]
    pub fn is_warehouse_scoped(&self, resource: &str) -> bool {
        self.scopes.is_warehouse_scoped(resource)
    }

    /// See [`EffectiveScopeMap::meets_minimum_scope`]
    pub fn meets_minimum_scope(&self, resource: &str, minimum: &ScopeType) -> bool {
        self.scopes.meets_minimum_scope(resource, minimum)
    }
}
