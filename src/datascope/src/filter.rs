//! Predicate builder
//!
//! Turns the effective scope of a resource into predicates on a
//! [`ScopeQuery`]. Every branch yields a well-defined query:
//!
//! | Scope type   | Predicate                                              |
//! |--------------|--------------------------------------------------------|
//! | none         | unchanged                                              |
//! | ALL          | unchanged                                              |
//! | SELF         | `created_by = user`, or no rows without a user         |
//! | DEPARTMENT   | same as SELF                                           |
//! | WAREHOUSE    | `warehouse_id IN values`, or no rows if values empty   |
//! | CUSTOM       | `field IN values`, `created_by IN values` if the field |
//! |              | is not permitted, or no rows if values empty           |
//! | unrecognized | per [`UnrecognizedScopePolicy`] (unchanged by default) |

use crate::config::UnrecognizedScopePolicy;
use crate::merge::EffectiveScopeMap;
use crate::query::ScopeQuery;
use crate::registry::{ResourceRegistry, OWNER_FIELD};
use crate::types::ScopeType;
use tracing::{debug, warn};

/// Applies effective scopes to queries using a resource registry
#[derive(Debug, Clone, Copy)]
pub struct PredicateBuilder<'r> {
    registry: &'r ResourceRegistry,
    unrecognized: UnrecognizedScopePolicy,
}

impl<'r> PredicateBuilder<'r> {
    /// Creates a builder with the default (allow) unrecognized-scope policy
    pub fn new(registry: &'r ResourceRegistry) -> Self {
        Self {
            registry,
            unrecognized: UnrecognizedScopePolicy::default(),
        }
    }

    /// Sets the handling of unrecognized scope types
    pub fn with_unrecognized_policy(mut self, policy: UnrecognizedScopePolicy) -> Self {
        self.unrecognized = policy;
        self
    }

    /// Registry used for field resolution
    pub fn registry(&self) -> &'r ResourceRegistry {
        self.registry
    }

    /// Appends the predicate for `resource` to `query`
    pub fn apply<Q: ScopeQuery>(
        &self,
        query: Q,
        resource: &str,
        scopes: &EffectiveScopeMap,
        user_id: Option<&str>,
    ) -> Q {
        let Some(scope) = scopes.get(resource) else {
            return query;
        };

        match &scope.scope_type {
            ScopeType::All => query,

            // Department hierarchy is not modeled; DEPARTMENT restricts to own rows
            ScopeType::SelfOnly | ScopeType::Department => owner_only(query, resource, user_id),

            ScopeType::Warehouse => {
                if scope.scope_values.is_empty() {
                    debug!(resource, "Warehouse scope has no warehouses, denying all rows");
                    return query.filter_none();
                }
                query.filter_in(self.registry.warehouse_field(resource), &scope.scope_values)
            }

            ScopeType::Custom => {
                if scope.scope_values.is_empty() {
                    debug!(resource, "Custom scope has no values, denying all rows");
                    return query.filter_none();
                }

                match self.registry.custom_field(resource, scope.field_override()) {
                    Some(field) => query.filter_in(field, &scope.scope_values),
                    None => {
                        warn!(
                            resource,
                            scope_field = scope.field_override().unwrap_or(""),
                            "Custom scope field not permitted, falling back to owner"
                        );
                        query.filter_in(OWNER_FIELD, &scope.scope_values)
                    }
                }
            }

            ScopeType::Unrecognized(name) => match self.unrecognized {
                UnrecognizedScopePolicy::Allow => {
                    warn!(resource, scope_type = %name, "Unrecognized scope type, not restricting");
                    query
                }
                UnrecognizedScopePolicy::Deny => {
                    warn!(resource, scope_type = %name, "Unrecognized scope type, denying all rows");
                    query.filter_none()
                }
            },
        }
    }
}

fn owner_only<Q: ScopeQuery>(query: Q, resource: &str, user_id: Option<&str>) -> Q {
    match user_id.filter(|id| !id.is_empty()) {
        Some(id) => query.filter_eq(OWNER_FIELD, id),
        None => {
            debug!(resource, "No current user for owner scope, denying all rows");
            query.filter_none()
        }
    }
}

/// Applies the effective scope for `resource` using the process-wide
/// registry
///
/// # Examples
///
/// ```
/// use erp_datascope::{apply, merge_scopes, DataScope, Role, ScopeFilter, ScopeType};
///
/// let role = Role::new("t1", "clerk", "Clerk").unwrap()
///     .with_data_scope(DataScope::new("sales_order", ScopeType::SelfOnly).unwrap());
/// let scopes = merge_scopes(&[role]);
///
/// let filter = apply(ScopeFilter::new(), "sales_order", &scopes, Some("u1"));
/// assert_eq!(filter.to_string(), r#"created_by = "u1""#);
/// ```
pub fn apply<Q: ScopeQuery>(
    query: Q,
    resource: &str,
    scopes: &EffectiveScopeMap,
    user_id: Option<&str>,
) -> Q {
    PredicateBuilder::new(ResourceRegistry::global()).apply(query, resource, scopes, user_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Predicate, ScopeFilter};
    use crate::registry::ScopeField;
    use crate::types::DataScope;

    fn values(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    fn map_of(scopes: Vec<DataScope>) -> EffectiveScopeMap {
        scopes.into_iter().collect()
    }

    fn raw_scope(resource: &str, scope_type: ScopeType, field: Option<&str>, vals: &[&str]) -> DataScope {
        DataScope {
            resource: resource.to_string(),
            scope_type,
            scope_field: field.map(str::to_string),
            scope_values: values(vals),
            description: String::new(),
        }
    }

    fn run(scopes: &EffectiveScopeMap, resource: &str, user: Option<&str>) -> ScopeFilter {
        apply(ScopeFilter::new(), resource, scopes, user)
    }

    #[test]
    fn test_unconfigured_resource_unchanged() {
        let filter = run(&EffectiveScopeMap::new(), "sales_order", Some("u1"));
        assert!(filter.is_unrestricted());
    }

    #[test]
    fn test_all_scope_unchanged() {
        let scopes = map_of(vec![raw_scope("sales_order", ScopeType::All, None, &[])]);
        assert!(run(&scopes, "sales_order", None).is_unrestricted());
    }

    #[test]
    fn test_self_scope() {
        let scopes = map_of(vec![raw_scope("sales_order", ScopeType::SelfOnly, None, &[])]);

        assert_eq!(run(&scopes, "sales_order", Some("u1")).to_string(), r#"created_by = "u1""#);
        assert!(run(&scopes, "sales_order", None).matches_nothing());
        assert!(run(&scopes, "sales_order", Some("")).matches_nothing());
    }

    #[test]
    fn test_department_aliases_self() {
        let scopes = map_of(vec![raw_scope("sales_order", ScopeType::Department, None, &[])]);

        assert_eq!(run(&scopes, "sales_order", Some("u1")).to_string(), r#"created_by = "u1""#);
        assert!(run(&scopes, "sales_order", None).matches_nothing());
    }

    #[test]
    fn test_warehouse_scope() {
        let scopes = map_of(vec![raw_scope("stock_batch", ScopeType::Warehouse, None, &["w1", "w2"])]);

        let filter = run(&scopes, "stock_batch", None);
        assert_eq!(filter.to_string(), r#"warehouse_id IN ("w1","w2")"#);
    }

    #[test]
    fn test_warehouse_scope_empty_values() {
        let scopes = map_of(vec![raw_scope("stock_batch", ScopeType::Warehouse, None, &[])]);
        assert_eq!(run(&scopes, "stock_batch", Some("u1")).predicates(), &[Predicate::Never]);
    }

    #[test]
    fn test_custom_scope_with_permitted_override() {
        let scopes = map_of(vec![raw_scope("customer", ScopeType::Custom, Some("region_id"), &["r1"])]);
        assert_eq!(run(&scopes, "customer", None).to_string(), r#"region_id IN ("r1")"#);
    }

    #[test]
    fn test_custom_scope_registry_default() {
        let scopes = map_of(vec![raw_scope("inventory", ScopeType::Custom, None, &["w9"])]);
        assert_eq!(run(&scopes, "inventory", None).to_string(), r#"warehouse_id IN ("w9")"#);
    }

    #[test]
    fn test_custom_scope_unresolved_field_falls_back_to_owner() {
        let scopes = map_of(vec![raw_scope("customer", ScopeType::Custom, None, &["u7"])]);
        assert_eq!(run(&scopes, "customer", None).to_string(), r#"created_by IN ("u7")"#);
    }

    #[test]
    fn test_custom_scope_injection_attempt() {
        let scopes = map_of(vec![raw_scope(
            "inventory",
            ScopeType::Custom,
            Some("id; DROP TABLE x"),
            &["u7"],
        )]);

        let rendered = run(&scopes, "inventory", None).to_string();
        assert_eq!(rendered, r#"created_by IN ("u7")"#);
        assert!(!rendered.contains("DROP"));
    }

    #[test]
    fn test_custom_scope_empty_values() {
        let scopes = map_of(vec![raw_scope("customer", ScopeType::Custom, Some("region_id"), &[])]);
        assert!(run(&scopes, "customer", Some("u1")).matches_nothing());
    }

    #[test]
    fn test_custom_scope_narrowed_registry() {
        let registry = ResourceRegistry::new()
            .with_warehouse_resource("inventory", ScopeField::WarehouseId)
            .with_allowed_field(ScopeField::RegionId);
        let builder = PredicateBuilder::new(&registry);

        let scopes = map_of(vec![raw_scope("inventory", ScopeType::Custom, None, &["w1"])]);
        let filter = builder.apply(ScopeFilter::new(), "inventory", &scopes, None);
        assert_eq!(filter.to_string(), r#"created_by IN ("w1")"#);
    }

    #[test]
    fn test_unrecognized_scope_policies() {
        let scopes = map_of(vec![raw_scope(
            "sales_order",
            ScopeType::Unrecognized("team".to_string()),
            None,
            &[],
        )]);
        let registry = ResourceRegistry::sample();

        let allow = PredicateBuilder::new(&registry);
        assert!(allow.apply(ScopeFilter::new(), "sales_order", &scopes, None).is_unrestricted());

        let deny = allow.with_unrecognized_policy(UnrecognizedScopePolicy::Deny);
        assert!(deny.apply(ScopeFilter::new(), "sales_order", &scopes, None).matches_nothing());
    }

    #[test]
    fn test_apply_preserves_existing_predicates() {
        let scopes = map_of(vec![raw_scope("sales_order", ScopeType::SelfOnly, None, &[])]);
        let base = ScopeFilter::new().filter_eq(ScopeField::DepartmentId, "d1");

        let filter = apply(base, "sales_order", &scopes, Some("u1"));
        assert_eq!(filter.to_string(), r#"department_id = "d1" AND created_by = "u1""#);
    }

    #[test]
    fn test_other_resource_unaffected() {
        let scopes = map_of(vec![raw_scope("sales_order", ScopeType::SelfOnly, None, &[])]);
        assert!(run(&scopes, "product", None).is_unrestricted());
    }
}
