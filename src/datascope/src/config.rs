//! Engine configuration
//!
//! Loaded from JSON, with environment overrides:
//!
//! - `DATASCOPE_UNRECOGNIZED_SCOPE` - `allow` (default) or `deny`

use crate::error::{DataScopeError, Result};
use crate::registry::{ResourceRegistry, ScopeField};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

/// Environment variable overriding [`DataScopeConfig::unrecognized_scope`]
pub const ENV_UNRECOGNIZED_SCOPE: &str = "DATASCOPE_UNRECOGNIZED_SCOPE";

/// What to do with a scope type the engine does not recognize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnrecognizedScopePolicy {
    /// Leave the query unrestricted (forward compatible)
    #[default]
    Allow,
    /// Match no rows
    Deny,
}

impl FromStr for UnrecognizedScopePolicy {
    type Err = DataScopeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(Self::Allow),
            "deny" => Ok(Self::Deny),
            other => Err(DataScopeError::InvalidConfig(format!(
                "unknown unrecognized-scope policy '{}', expected 'allow' or 'deny'",
                other
            ))),
        }
    }
}

/// Serializable form of a [`ResourceRegistry`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Warehouse-scoped resource -> warehouse field name
    #[serde(default)]
    pub warehouse_scoped_resources: BTreeMap<String, String>,

    /// Field names custom scopes may filter on
    #[serde(default)]
    pub allowed_fields: Vec<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::from(&ResourceRegistry::sample())
    }
}

impl From<&ResourceRegistry> for RegistryConfig {
    fn from(registry: &ResourceRegistry) -> Self {
        Self {
            warehouse_scoped_resources: registry
                .warehouse_resources()
                .map(|(resource, field)| (resource.to_string(), field.column().to_string()))
                .collect(),
            allowed_fields: registry
                .allowed_fields()
                .map(|field| field.column().to_string())
                .collect(),
        }
    }
}

impl RegistryConfig {
    /// Builds the registry, rejecting any field name outside [`ScopeField`]
    pub fn build(&self) -> Result<ResourceRegistry> {
        let mut registry = ResourceRegistry::new();

        for (resource, field) in &self.warehouse_scoped_resources {
            let resource = resource.trim();
            if resource.is_empty() {
                return Err(DataScopeError::InvalidConfig(
                    "warehouse-scoped resource name cannot be empty".to_string(),
                ));
            }
            registry = registry.with_warehouse_resource(resource, parse_field(field)?);
        }

        for field in &self.allowed_fields {
            registry = registry.with_allowed_field(parse_field(field)?);
        }

        Ok(registry)
    }
}

fn parse_field(name: &str) -> Result<ScopeField> {
    ScopeField::from_column(name).ok_or_else(|| {
        DataScopeError::InvalidConfig(format!("'{}' is not a supported scope field", name))
    })
}

/// Data scope engine configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataScopeConfig {
    /// Resource registry
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Handling of unrecognized scope types
    #[serde(default)]
    pub unrecognized_scope: UnrecognizedScopePolicy,
}

impl DataScopeConfig {
    /// Parses a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.registry.build()?;
        Ok(config)
    }

    /// Reads a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides()
    }

    /// Applies overrides from the process environment
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary key lookup
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_UNRECOGNIZED_SCOPE) {
            self.unrecognized_scope = value.parse()?;
        }
        Ok(self)
    }

    /// Builds the configured resource registry
    pub fn build_registry(&self) -> Result<ResourceRegistry> {
        self.registry.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_sample_registry() {
        let config = DataScopeConfig::default();

        assert_eq!(config.unrecognized_scope, UnrecognizedScopePolicy::Allow);
        assert_eq!(config.build_registry().unwrap(), ResourceRegistry::sample());
    }

    #[test]
    fn test_from_json() {
        let config = DataScopeConfig::from_json(
            r#"{
                "registry": {
                    "warehouse_scoped_resources": {"delivery_note": "warehouse_id"},
                    "allowed_fields": ["region_id"]
                },
                "unrecognized_scope": "deny"
            }"#,
        )
        .unwrap();

        let registry = config.build_registry().unwrap();
        assert!(registry.is_warehouse_scoped("delivery_note"));
        assert!(!registry.is_warehouse_scoped("inventory"));
        assert!(registry.is_whitelisted_field("region_id"));
        assert!(!registry.is_whitelisted_field("created_by"));
        assert_eq!(config.unrecognized_scope, UnrecognizedScopePolicy::Deny);
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config = DataScopeConfig::from_json("{}").unwrap();
        assert_eq!(config, DataScopeConfig::default());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = DataScopeConfig::from_json(
            r#"{"registry": {"allowed_fields": ["id; DROP TABLE x"]}}"#,
        );
        assert!(matches!(result, Err(DataScopeError::InvalidConfig(_))));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            DataScopeConfig::from_json("{"),
            Err(DataScopeError::Serialization(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let config = DataScopeConfig::default()
            .with_overrides_from(|key| (key == ENV_UNRECOGNIZED_SCOPE).then(|| "DENY".to_string()))
            .unwrap();
        assert_eq!(config.unrecognized_scope, UnrecognizedScopePolicy::Deny);

        let result = DataScopeConfig::default()
            .with_overrides_from(|_| Some("maybe".to_string()));
        assert!(matches!(result, Err(DataScopeError::InvalidConfig(_))));

        let untouched = DataScopeConfig::default().with_overrides_from(|_| None).unwrap();
        assert_eq!(untouched, DataScopeConfig::default());
    }
}
