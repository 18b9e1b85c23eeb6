//! Core data scope types

use crate::error::{DataScopeError, Result};
use crate::registry::ScopeField;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use uuid::Uuid;

/// Unique role identifier
pub type RoleId = String;

/// Tenant identifier
pub type TenantId = String;

/// Principal (user) identifier
pub type UserId = String;

/// Maximum length of a resource name
const MAX_RESOURCE_LEN: usize = 50;

/// Category of row-level restriction
///
/// Serialized as a lowercase string. Names outside the known set decode to
/// [`ScopeType::Unrecognized`] rather than failing, so policy written by a
/// newer role-management service can still be evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ScopeType {
    /// Every row within the tenant
    All,
    /// Only rows the principal created
    SelfOnly,
    /// Rows within the principal's department
    Department,
    /// Rows whose scope field is in an explicit value list
    Custom,
    /// Rows within assigned warehouses
    Warehouse,
    /// A scope type this engine does not know
    Unrecognized(String),
}

impl ScopeType {
    /// Lenient parse: unknown names become [`ScopeType::Unrecognized`]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Self::All,
            "self" => Self::SelfOnly,
            "department" => Self::Department,
            "custom" => Self::Custom,
            "warehouse" => Self::Warehouse,
            _ => Self::Unrecognized(s.to_string()),
        }
    }

    /// Wire name of the scope type
    pub fn as_str(&self) -> &str {
        match self {
            Self::All => "all",
            Self::SelfOnly => "self",
            Self::Department => "department",
            Self::Custom => "custom",
            Self::Warehouse => "warehouse",
            Self::Unrecognized(name) => name,
        }
    }

    /// Precedence rank used when merging scopes; higher grants more access
    pub fn rank(&self) -> i32 {
        match self {
            Self::All => 100,
            Self::Department => 50,
            Self::Warehouse => 45,
            Self::Custom => 40,
            Self::SelfOnly => 10,
            Self::Unrecognized(_) => 0,
        }
    }

    /// Returns true if this scope type grants at least as much as `minimum`
    pub fn meets(&self, minimum: &ScopeType) -> bool {
        self.rank() >= minimum.rank()
    }

    /// Returns false for [`ScopeType::Unrecognized`]
    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }
}

impl FromStr for ScopeType {
    type Err = DataScopeError;

    /// Strict parse: unknown names are an error
    fn from_str(s: &str) -> Result<Self> {
        match Self::parse(s) {
            Self::Unrecognized(name) => Err(DataScopeError::InvalidScopeType(name)),
            scope_type => Ok(scope_type),
        }
    }
}

impl From<String> for ScopeType {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<ScopeType> for String {
    fn from(scope_type: ScopeType) -> Self {
        scope_type.as_str().to_string()
    }
}

impl fmt::Display for ScopeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row-level policy entry for one resource
///
/// Fields are public because instances usually arrive from the role store
/// as-is; the constructors validate what an administrator is allowed to
/// configure, while the engine tolerates anything that arrives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataScope {
    /// Resource name (e.g., "sales_order")
    pub resource: String,

    /// Scope type
    pub scope_type: ScopeType,

    /// Explicit field override for custom scopes (e.g., "region_id")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_field: Option<String>,

    /// Scope values, usually identifiers (e.g., warehouse IDs)
    #[serde(default)]
    pub scope_values: Vec<String>,

    /// Human-readable description
    #[serde(default)]
    pub description: String,
}

impl DataScope {
    /// Create a new data scope
    pub fn new(resource: &str, scope_type: ScopeType) -> Result<Self> {
        let resource = normalize_resource(resource)?;
        if let ScopeType::Unrecognized(name) = &scope_type {
            return Err(DataScopeError::InvalidScopeType(name.clone()));
        }

        Ok(Self {
            resource,
            scope_type,
            scope_field: None,
            scope_values: Vec::new(),
            description: String::new(),
        })
    }

    /// Create a custom scope restricted to the given values
    pub fn custom(resource: &str, scope_values: Vec<String>) -> Result<Self> {
        let mut scope = Self::new(resource, ScopeType::Custom)?;
        if scope_values.is_empty() {
            return Err(DataScopeError::InvalidScopeValues(
                "Custom data scope must have at least one scope value".to_string(),
            ));
        }

        scope.scope_values = scope_values;
        Ok(scope)
    }

    /// Create a custom scope filtering on an explicit field
    pub fn custom_with_field(resource: &str, scope_field: &str, scope_values: Vec<String>) -> Result<Self> {
        let mut scope = Self::custom(resource, scope_values)?;

        let scope_field = scope_field.trim();
        if scope_field.is_empty() {
            return Err(DataScopeError::InvalidScopeField(
                "Scope field cannot be empty for custom data scope with field".to_string(),
            ));
        }

        scope.scope_field = Some(scope_field.to_string());
        Ok(scope)
    }

    /// Create a warehouse scope for the given warehouse IDs
    pub fn warehouse(resource: &str, warehouse_ids: Vec<String>) -> Result<Self> {
        let mut scope = Self::new(resource, ScopeType::Warehouse)?;
        if warehouse_ids.is_empty() {
            return Err(DataScopeError::InvalidScopeValues(
                "Warehouse data scope must have at least one warehouse ID".to_string(),
            ));
        }

        scope.scope_field = Some(ScopeField::WarehouseId.column().to_string());
        scope.scope_values = warehouse_ids;
        Ok(scope)
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Field override with blank values treated as absent
    pub fn field_override(&self) -> Option<&str> {
        self.scope_field
            .as_deref()
            .map(str::trim)
            .filter(|field| !field.is_empty())
    }
}

/// A permission bundle carrying data scopes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Role identifier
    pub id: RoleId,

    /// Owning tenant
    pub tenant_id: TenantId,

    /// Short code (e.g., "WAREHOUSE_KEEPER")
    #[serde(default)]
    pub code: String,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Disabled roles contribute nothing to a merge
    pub is_enabled: bool,

    /// Data scopes, at most one per resource
    #[serde(default)]
    pub data_scopes: Vec<DataScope>,
}

impl Role {
    /// Create a new enabled role with no data scopes
    pub fn new(tenant_id: impl Into<String>, code: &str, name: &str) -> Result<Self> {
        let code = code.trim();
        if code.is_empty() {
            return Err(DataScopeError::InvalidInput("Role code cannot be empty".to_string()));
        }

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.into(),
            code: code.to_uppercase(),
            name: name.trim().to_string(),
            is_enabled: true,
            data_scopes: Vec::new(),
        })
    }

    /// Builder-style variant of [`Role::set_data_scope`]
    pub fn with_data_scope(mut self, scope: DataScope) -> Self {
        self.set_data_scope(scope);
        self
    }

    /// Set the data scope for a resource, replacing any existing one
    pub fn set_data_scope(&mut self, scope: DataScope) {
        match self.data_scopes.iter_mut().find(|s| s.resource == scope.resource) {
            Some(existing) => *existing = scope,
            None => self.data_scopes.push(scope),
        }
    }

    /// Remove the data scope for a resource
    pub fn remove_data_scope(&mut self, resource: &str) -> Result<()> {
        let resource = resource.trim().to_lowercase();
        let before = self.data_scopes.len();
        self.data_scopes.retain(|s| s.resource != resource);

        if self.data_scopes.len() == before {
            return Err(DataScopeError::InvalidInput(format!(
                "Role has no data scope for resource '{}'",
                resource
            )));
        }
        Ok(())
    }

    /// Data scope for a resource, if configured
    pub fn data_scope(&self, resource: &str) -> Option<&DataScope> {
        let resource = resource.trim().to_lowercase();
        self.data_scopes.iter().find(|s| s.resource == resource)
    }

    /// Enable the role
    pub fn enable(&mut self) {
        self.is_enabled = true;
    }

    /// Disable the role
    pub fn disable(&mut self) {
        self.is_enabled = false;
    }
}

fn normalize_resource(resource: &str) -> Result<String> {
    let resource = resource.trim();
    if resource.is_empty() {
        return Err(DataScopeError::InvalidInput(
            "Data scope resource cannot be empty".to_string(),
        ));
    }
    if resource.len() > MAX_RESOURCE_LEN {
        return Err(DataScopeError::InvalidInput(format!(
            "Data scope resource cannot exceed {} characters",
            MAX_RESOURCE_LEN
        )));
    }

    let resource = resource.to_lowercase();
    if !resource_pattern().is_match(&resource) {
        return Err(DataScopeError::InvalidInput(format!(
            "Data scope resource '{}' must start with a letter and contain only lowercase letters, numbers, and underscores",
            resource
        )));
    }
    Ok(resource)
}

fn resource_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("resource pattern is valid"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_type_wire_names() {
        for (name, expected) in [
            ("all", ScopeType::All),
            ("self", ScopeType::SelfOnly),
            ("department", ScopeType::Department),
            ("custom", ScopeType::Custom),
            ("warehouse", ScopeType::Warehouse),
        ] {
            assert_eq!(ScopeType::parse(name), expected);
            assert_eq!(expected.as_str(), name);
        }

        assert_eq!(ScopeType::parse(" ALL "), ScopeType::All);
    }

    #[test]
    fn test_meets_minimum() {
        use ScopeType::*;

        let cases = [
            (All, All, true),
            (All, SelfOnly, true),
            (All, Department, true),
            (Department, SelfOnly, true),
            (SelfOnly, SelfOnly, true),
            (SelfOnly, All, false),
            (SelfOnly, Department, false),
            (Department, All, false),
            (Custom, SelfOnly, true),
            (Custom, Department, false),
            (Warehouse, Custom, true),
            (Custom, Warehouse, false),
        ];

        for (actual, minimum, expected) in cases {
            assert_eq!(actual.meets(&minimum), expected, "{actual} meets {minimum}");
        }

        let future = ScopeType::Unrecognized("team".to_string());
        assert!(!future.meets(&SelfOnly));
        assert!(SelfOnly.meets(&future));
    }

    #[test]
    fn test_unrecognized_scope_type() {
        let scope_type = ScopeType::parse("region_tree");
        assert_eq!(scope_type, ScopeType::Unrecognized("region_tree".to_string()));
        assert!(!scope_type.is_recognized());
        assert_eq!(scope_type.rank(), 0);

        assert!(matches!(
            "region_tree".parse::<ScopeType>(),
            Err(DataScopeError::InvalidScopeType(_))
        ));
    }

    #[test]
    fn test_scope_type_serde() {
        let json = serde_json::to_string(&ScopeType::SelfOnly).unwrap();
        assert_eq!(json, "\"self\"");

        let parsed: ScopeType = serde_json::from_str("\"future_kind\"").unwrap();
        assert_eq!(parsed, ScopeType::Unrecognized("future_kind".to_string()));
    }

    #[test]
    fn test_data_scope_creation() {
        let scope = DataScope::new("  Sales_Order ", ScopeType::SelfOnly).unwrap();
        assert_eq!(scope.resource, "sales_order");
        assert!(scope.scope_field.is_none());
        assert!(scope.scope_values.is_empty());

        assert!(DataScope::new("", ScopeType::All).is_err());
        assert!(DataScope::new(&"x".repeat(51), ScopeType::All).is_err());
        assert!(DataScope::new("order", ScopeType::Unrecognized("x".to_string())).is_err());
    }

    #[test]
    fn test_custom_scope_validation() {
        assert!(matches!(
            DataScope::custom("customer", vec![]),
            Err(DataScopeError::InvalidScopeValues(_))
        ));
        assert!(matches!(
            DataScope::custom_with_field("customer", "  ", vec!["r1".to_string()]),
            Err(DataScopeError::InvalidScopeField(_))
        ));

        let scope = DataScope::custom_with_field("customer", " region_id ", vec!["r1".to_string()])
            .unwrap()
            .with_description("north region");
        assert_eq!(scope.field_override(), Some("region_id"));
        assert_eq!(scope.description, "north region");
    }

    #[test]
    fn test_warehouse_scope() {
        let scope = DataScope::warehouse("inventory", vec!["w1".to_string()]).unwrap();
        assert_eq!(scope.scope_type, ScopeType::Warehouse);
        assert_eq!(scope.field_override(), Some("warehouse_id"));

        assert!(matches!(
            DataScope::warehouse("inventory", vec![]),
            Err(DataScopeError::InvalidScopeValues(_))
        ));
    }

    #[test]
    fn test_resource_name_format() {
        for valid in ["inventory", "stock_take", "Sales_Order", "report2", "a"] {
            assert!(DataScope::new(valid, ScopeType::All).is_ok(), "{valid}");
        }

        for invalid in ["sales order; x", "2fa_device", "_hidden", "sales-order", "order.items", "crème"] {
            assert!(
                matches!(DataScope::new(invalid, ScopeType::All), Err(DataScopeError::InvalidInput(_))),
                "{invalid}"
            );
        }
    }

    #[test]
    fn test_blank_field_override_is_absent() {
        let mut scope = DataScope::new("customer", ScopeType::Custom).unwrap();
        scope.scope_field = Some("   ".to_string());
        assert_eq!(scope.field_override(), None);
    }

    #[test]
    fn test_role_data_scopes() {
        let mut role = Role::new("tenant-1", "sales", "Sales").unwrap();
        assert_eq!(role.code, "SALES");
        assert!(role.is_enabled);

        role.set_data_scope(DataScope::new("sales_order", ScopeType::SelfOnly).unwrap());
        role.set_data_scope(DataScope::new("sales_order", ScopeType::All).unwrap());
        assert_eq!(role.data_scopes.len(), 1);
        assert_eq!(role.data_scope("SALES_ORDER").unwrap().scope_type, ScopeType::All);

        role.remove_data_scope("sales_order").unwrap();
        assert!(role.data_scope("sales_order").is_none());
        assert!(role.remove_data_scope("sales_order").is_err());

        role.disable();
        assert!(!role.is_enabled);
        role.enable();
        assert!(role.is_enabled);

        assert!(Role::new("tenant-1", " ", "Blank").is_err());
    }

    #[test]
    fn test_role_deserializes_partial_scope() {
        let json = r#"{
            "id": "r1",
            "tenant_id": "t1",
            "is_enabled": true,
            "data_scopes": [{"resource": "stock_batch", "scope_type": "warehouse"}]
        }"#;

        let role: Role = serde_json::from_str(json).unwrap();
        assert_eq!(role.data_scopes[0].scope_type, ScopeType::Warehouse);
        assert!(role.data_scopes[0].scope_values.is_empty());
    }
}
