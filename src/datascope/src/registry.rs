//! Resource registry
//!
//! Static table of which resources can be scoped by warehouse, and the closed
//! set of column names that custom scopes may filter on. A scope field only
//! ever reaches a predicate as a [`ScopeField`], so an arbitrary string from
//! policy data can never be interpolated into a query.

use crate::error::{DataScopeError, Result};
use crate::types::DataScope;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Resources that support warehouse-level scoping in the sample domain
const SAMPLE_WAREHOUSE_RESOURCES: [&str; 9] = [
    "inventory",
    "sales_order",
    "purchase_order",
    "stock_batch",
    "stock_lock",
    "sales_return",
    "purchase_return",
    "stock_take",
    "stock_transfer",
];

/// Column used by owner-based predicates (SELF scope and custom fallbacks)
pub const OWNER_FIELD: ScopeField = ScopeField::CreatedBy;

/// A column that scope predicates are allowed to reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeField {
    WarehouseId,
    RegionId,
    DepartmentId,
    CreatedBy,
    OwnerId,
    AssignedTo,
}

impl ScopeField {
    /// Every known scope field
    pub const ALL: [ScopeField; 6] = [
        ScopeField::WarehouseId,
        ScopeField::RegionId,
        ScopeField::DepartmentId,
        ScopeField::CreatedBy,
        ScopeField::OwnerId,
        ScopeField::AssignedTo,
    ];

    /// Column name as it appears in storage
    pub fn column(self) -> &'static str {
        match self {
            Self::WarehouseId => "warehouse_id",
            Self::RegionId => "region_id",
            Self::DepartmentId => "department_id",
            Self::CreatedBy => "created_by",
            Self::OwnerId => "owner_id",
            Self::AssignedTo => "assigned_to",
        }
    }

    /// Look up a field by its exact column name
    pub fn from_column(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.column() == name)
    }
}

impl FromStr for ScopeField {
    type Err = DataScopeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_column(s).ok_or_else(|| DataScopeError::InvalidScopeField(s.to_string()))
    }
}

impl fmt::Display for ScopeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// Registry of scoped resources and permitted custom-scope fields
///
/// # Examples
///
/// ```
/// use erp_datascope::registry::{ResourceRegistry, ScopeField};
///
/// let registry = ResourceRegistry::sample();
/// assert!(registry.is_warehouse_scoped("stock_batch"));
/// assert_eq!(registry.default_scope_field("inventory"), Some(ScopeField::WarehouseId));
/// assert!(!registry.is_whitelisted_field("id; DROP TABLE x"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceRegistry {
    /// Warehouse-scoped resource -> field holding the warehouse identifier
    warehouse_resources: BTreeMap<String, ScopeField>,
    /// Fields custom scopes may filter on
    allowed_fields: BTreeSet<ScopeField>,
}

impl ResourceRegistry {
    /// Creates an empty registry (no scoped resources, no permitted fields)
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry for the sample ERP domain: inventory-facing resources keyed
    /// by `warehouse_id`, and every [`ScopeField`] permitted
    pub fn sample() -> Self {
        let registry = SAMPLE_WAREHOUSE_RESOURCES
            .into_iter()
            .fold(Self::new(), |registry, resource| {
                registry.with_warehouse_resource(resource, ScopeField::WarehouseId)
            });

        ScopeField::ALL
            .into_iter()
            .fold(registry, |registry, field| registry.with_allowed_field(field))
    }

    /// Process-wide sample registry
    pub fn global() -> &'static ResourceRegistry {
        static GLOBAL: OnceLock<ResourceRegistry> = OnceLock::new();
        GLOBAL.get_or_init(Self::sample)
    }

    /// Registers a warehouse-scoped resource
    pub fn with_warehouse_resource(mut self, resource: impl Into<String>, field: ScopeField) -> Self {
        self.warehouse_resources.insert(resource.into(), field);
        self
    }

    /// Permits a field in custom-scope predicates
    pub fn with_allowed_field(mut self, field: ScopeField) -> Self {
        self.allowed_fields.insert(field);
        self
    }

    /// Returns true if the resource supports warehouse-level scoping
    pub fn is_warehouse_scoped(&self, resource: &str) -> bool {
        self.warehouse_resources.contains_key(resource)
    }

    /// Default scope field for a resource, if it is registered
    pub fn default_scope_field(&self, resource: &str) -> Option<ScopeField> {
        self.warehouse_resources.get(resource).copied()
    }

    /// Field holding the warehouse identifier for a resource
    ///
    /// Resources outside the registry fall back to `warehouse_id`.
    pub fn warehouse_field(&self, resource: &str) -> ScopeField {
        self.default_scope_field(resource)
            .unwrap_or(ScopeField::WarehouseId)
    }

    /// Returns true if `field` names a permitted custom-scope column
    pub fn is_whitelisted_field(&self, field: &str) -> bool {
        self.resolve_field(field).is_some()
    }

    /// Resolves a raw field name into a permitted [`ScopeField`]
    pub fn resolve_field(&self, field: &str) -> Option<ScopeField> {
        ScopeField::from_column(field).filter(|f| self.allowed_fields.contains(f))
    }

    /// Returns true if the typed field is permitted
    pub fn allows(&self, field: ScopeField) -> bool {
        self.allowed_fields.contains(&field)
    }

    /// Permitted field a CUSTOM scope on `resource` filters on
    ///
    /// An explicit override must itself be permitted; it never falls
    /// through to the resource default. `None` means the owner column
    /// applies instead.
    pub fn custom_field(&self, resource: &str, field_override: Option<&str>) -> Option<ScopeField> {
        match field_override {
            Some(name) => self.resolve_field(name),
            None => self
                .default_scope_field(resource)
                .filter(|field| self.allows(*field)),
        }
    }

    /// Registered warehouse-scoped resources, in name order
    pub fn warehouse_resources(&self) -> impl Iterator<Item = (&str, ScopeField)> + '_ {
        self.warehouse_resources
            .iter()
            .map(|(resource, field)| (resource.as_str(), *field))
    }

    /// Permitted custom-scope fields
    pub fn allowed_fields(&self) -> impl Iterator<Item = ScopeField> + '_ {
        self.allowed_fields.iter().copied()
    }

    /// Builds one WAREHOUSE scope per warehouse-scoped resource
    ///
    /// Used to give a warehouse role consistent access across every
    /// inventory-facing resource. Returns no scopes when `warehouse_ids` is
    /// empty.
    pub fn warehouse_scopes_for_role(&self, warehouse_ids: &[String]) -> Result<Vec<DataScope>> {
        if warehouse_ids.is_empty() {
            return Ok(Vec::new());
        }

        self.warehouse_resources
            .keys()
            .map(|resource| DataScope::warehouse(resource, warehouse_ids.to_vec()))
            .collect()
    }
}

/// Returns true if the resource supports warehouse-level scoping in the
/// process-wide registry
pub fn is_resource_warehouse_scoped(resource: &str) -> bool {
    ResourceRegistry::global().is_warehouse_scoped(resource)
}
