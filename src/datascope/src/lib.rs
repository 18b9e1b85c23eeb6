//! # ERP Data Scope Engine
//!
//! Row-level access control for multi-tenant ERP queries. Decides, per
//! resource and per request, which rows a principal may see based on the
//! data scopes attached to their roles.
//!
//! ## Features
//!
//! - **Scope merging** across roles with a fixed precedence order
//! - **Predicate building** on any query type implementing [`ScopeQuery`]
//! - **Closed field registry**: custom scopes can only name known columns
//! - **Fail-closed** on empty value sets and missing identity
//! - **Pure and synchronous**: no I/O, no shared state, safe under any
//!   concurrency
//!
//! ## Example
//!
//! ```rust
//! use erp_datascope::{DataScope, Role, ScopeContext, ScopeFilter, ScopeType};
//!
//! let clerk = Role::new("tenant-1", "clerk", "Sales clerk").unwrap()
//!     .with_data_scope(DataScope::new("sales_order", ScopeType::SelfOnly).unwrap());
//!
//! let ctx = ScopeContext::from_roles(Some("u1".to_string()), &[clerk]);
//! let filter = ctx.apply(ScopeFilter::new(), "sales_order");
//!
//! assert_eq!(filter.to_string(), r#"created_by = "u1""#);
//! assert!(ctx.apply(ScopeFilter::new(), "product").is_unrestricted());
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod filter;
pub mod merge;
pub mod query;
pub mod registry;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use config::{DataScopeConfig, RegistryConfig, UnrecognizedScopePolicy};
pub use context::{is_owner, ScopeContext};
pub use error::{DataScopeError, Result};
pub use filter::{apply, PredicateBuilder};
pub use merge::{compare_scope_level, merge_scope_lists, merge_scopes, merge_scopes_with, EffectiveScopeMap};
pub use query::{Predicate, ScopeFilter, ScopeQuery, SqlFragment};
pub use registry::{is_resource_warehouse_scoped, ResourceRegistry, ScopeField, OWNER_FIELD};
pub use store::{IdentityResolver, InMemoryRoleStore, RoleStore, StaticIdentity};
pub use types::{DataScope, Role, RoleId, ScopeType, TenantId, UserId};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
