//! Scope merge resolver
//!
//! Combines the data scopes of every enabled role into one effective scope
//! per resource. The higher-ranked scope type wins:
//!
//! ```text
//! ALL(100) > DEPARTMENT(50) > WAREHOUSE(45) > CUSTOM(40) > SELF(10) > unrecognized(0)
//! ```
//!
//! Equal-rank conflicts are settled without looking at role order. Scopes
//! that restrict the same column are unioned (values sorted and
//! de-duplicated); otherwise the scope with the smaller `(type, column)` key
//! is kept. WAREHOUSE scopes always restrict the resource's warehouse
//! column, so they union regardless of any stored field override.

use crate::registry::{ResourceRegistry, ScopeField, OWNER_FIELD};
use crate::types::{DataScope, Role, ScopeType};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::btree_map::{self, BTreeMap, Entry};
use tracing::debug;

/// Resource -> effective data scope, the result of a merge
///
/// Built per request and never persisted. Iteration is in resource-name
/// order, so two merges of the same input compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EffectiveScopeMap {
    scopes: BTreeMap<String, DataScope>,
}

impl EffectiveScopeMap {
    /// Creates an empty map (every resource unrestricted)
    pub fn new() -> Self {
        Self::default()
    }

    /// Effective scope for a resource
    pub fn get(&self, resource: &str) -> Option<&DataScope> {
        self.scopes.get(resource)
    }

    /// Number of configured resources
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    /// Returns true if no resource is configured
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Iterates over (resource, scope) pairs in resource order
    pub fn iter(&self) -> btree_map::Iter<'_, String, DataScope> {
        self.scopes.iter()
    }

    /// Folds one scope into the map according to precedence, resolving
    /// custom-scope columns through the process-wide registry
    pub fn absorb(&mut self, incoming: &DataScope) {
        self.absorb_with(ResourceRegistry::global(), incoming);
    }

    /// Folds one scope into the map, resolving custom-scope columns
    /// through `registry`
    pub fn absorb_with(&mut self, registry: &ResourceRegistry, incoming: &DataScope) {
        match self.scopes.entry(incoming.resource.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(incoming.clone());
            }
            Entry::Occupied(mut entry) => {
                let existing = entry.get_mut();
                let level = compare_scope_level(&incoming.scope_type, &existing.scope_type);
                match level.cmp(&0) {
                    Ordering::Greater => *existing = incoming.clone(),
                    Ordering::Less => {}
                    Ordering::Equal => resolve_tie(registry, existing, incoming),
                }
            }
        }
    }
}

impl FromIterator<DataScope> for EffectiveScopeMap {
    fn from_iter<I: IntoIterator<Item = DataScope>>(iter: I) -> Self {
        let mut map = Self::new();
        for scope in iter {
            map.absorb(&scope);
        }
        map
    }
}

impl<'a> IntoIterator for &'a EffectiveScopeMap {
    type Item = (&'a String, &'a DataScope);
    type IntoIter = btree_map::Iter<'a, String, DataScope>;

    fn into_iter(self) -> Self::IntoIter {
        self.scopes.iter()
    }
}

/// Merges the data scopes of all enabled roles
///
/// # Examples
///
/// ```
/// use erp_datascope::{merge_scopes, DataScope, Role, ScopeType};
///
/// let clerk = Role::new("t1", "clerk", "Clerk").unwrap()
///     .with_data_scope(DataScope::new("sales_order", ScopeType::SelfOnly).unwrap());
/// let auditor = Role::new("t1", "auditor", "Auditor").unwrap()
///     .with_data_scope(DataScope::new("sales_order", ScopeType::All).unwrap());
///
/// let merged = merge_scopes(&[clerk, auditor]);
/// assert_eq!(merged.get("sales_order").unwrap().scope_type, ScopeType::All);
/// ```
pub fn merge_scopes(roles: &[Role]) -> EffectiveScopeMap {
    merge_scopes_with(ResourceRegistry::global(), roles)
}

/// Merges the data scopes of all enabled roles against a specific registry
pub fn merge_scopes_with(registry: &ResourceRegistry, roles: &[Role]) -> EffectiveScopeMap {
    let mut merged = EffectiveScopeMap::new();

    for role in roles {
        if !role.is_enabled {
            debug!(role_id = %role.id, "Skipping disabled role during scope merge");
            continue;
        }

        for scope in &role.data_scopes {
            merged.absorb_with(registry, scope);
        }
    }

    merged
}

/// Merges bare scope lists, keeping the highest permission level
pub fn merge_scope_lists<'a, I>(lists: I) -> EffectiveScopeMap
where
    I: IntoIterator<Item = &'a [DataScope]>,
{
    let mut merged = EffectiveScopeMap::new();
    for scope in lists.into_iter().flatten() {
        merged.absorb(scope);
    }
    merged
}

/// Compares two scope types by precedence
///
/// Positive if `a` grants more access than `b`, negative if less, zero if
/// equal.
pub fn compare_scope_level(a: &ScopeType, b: &ScopeType) -> i32 {
    a.rank() - b.rank()
}

/// Canonical ordering key of a scope for tie-breaking
///
/// The column is the one the predicate builder would restrict: none for
/// owner, ALL and WAREHOUSE scopes (fixed per resource), the resolved
/// field for CUSTOM scopes.
fn tie_key<'s>(registry: &ResourceRegistry, scope: &'s DataScope) -> (&'s str, Option<ScopeField>) {
    let column = match scope.scope_type {
        ScopeType::Custom => Some(
            registry
                .custom_field(&scope.resource, scope.field_override())
                .unwrap_or(OWNER_FIELD),
        ),
        _ => None,
    };
    (scope.scope_type.as_str(), column)
}

fn resolve_tie(registry: &ResourceRegistry, existing: &mut DataScope, incoming: &DataScope) {
    let ordering = tie_key(registry, incoming).cmp(&tie_key(registry, existing));
    match ordering {
        Ordering::Less => *existing = incoming.clone(),
        Ordering::Greater => {}
        Ordering::Equal => {
            debug!(
                resource = %existing.resource,
                scope_type = %existing.scope_type,
                "Unioning equal-rank scope values"
            );

            existing.scope_values.extend(incoming.scope_values.iter().cloned());
            existing.scope_values.sort();
            existing.scope_values.dedup();

            if incoming.scope_field < existing.scope_field {
                existing.scope_field = incoming.scope_field.clone();
            }
            if incoming.description < existing.description {
                existing.description = incoming.description.clone();
            }
        }
    }
}
