//! Query abstraction consumed by the predicate builder
//!
//! The engine never issues SQL. It appends predicates through [`ScopeQuery`],
//! which any composable query builder can implement. Columns only ever enter
//! as a [`ScopeField`], so predicate text is built from a closed set of names.

use crate::registry::ScopeField;
use serde::{Deserialize, Serialize};
use std::fmt;

#[cfg(feature = "postgres")]
pub use self::postgres::PgScopedQuery;

/// A query that data scope predicates can be appended to (AND semantics)
pub trait ScopeQuery: Sized {
    /// Adds `field = value`
    fn filter_eq(self, field: ScopeField, value: &str) -> Self;

    /// Adds `field IN (values)`
    ///
    /// An empty value list must match no rows.
    fn filter_in(self, field: ScopeField, values: &[String]) -> Self;

    /// Adds a predicate no row satisfies
    fn filter_none(self) -> Self;
}

/// A single scope predicate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    /// `field = value`
    Eq { field: ScopeField, value: String },
    /// `field IN (values)`
    In { field: ScopeField, values: Vec<String> },
    /// Always false
    Never,
}

impl Predicate {
    fn matches<F>(&self, lookup: &F) -> bool
    where
        F: Fn(ScopeField) -> Option<String>,
    {
        match self {
            Self::Eq { field, value } => lookup(*field).as_deref() == Some(value.as_str()),
            Self::In { field, values } => lookup(*field)
                .map(|actual| values.iter().any(|v| *v == actual))
                .unwrap_or(false),
            Self::Never => false,
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eq { field, value } => write!(f, "{} = {:?}", field, value),
            Self::In { field, values } => {
                write!(f, "{} IN (", field)?;
                for (idx, value) in values.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{:?}", value)?;
                }
                f.write_str(")")
            }
            Self::Never => f.write_str("1 = 0"),
        }
    }
}

/// Parameterised SQL rendering of a [`ScopeFilter`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlFragment {
    /// Condition text with `$n` placeholders
    pub sql: String,
    /// Values for the placeholders, in order
    pub params: Vec<String>,
}

/// Storage-agnostic conjunction of scope predicates
///
/// # Examples
///
/// ```
/// use erp_datascope::query::{ScopeFilter, ScopeQuery};
/// use erp_datascope::registry::ScopeField;
///
/// let filter = ScopeFilter::new()
///     .filter_in(ScopeField::WarehouseId, &["w1".to_string(), "w2".to_string()]);
/// assert_eq!(filter.to_string(), r#"warehouse_id IN ("w1","w2")"#);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeFilter {
    predicates: Vec<Predicate>,
}

impl ScopeFilter {
    /// Creates a filter with no predicates
    pub fn new() -> Self {
        Self::default()
    }

    /// Predicates in the order they were added
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Returns true if no predicate was added
    pub fn is_unrestricted(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Returns true if the filter can match no row at all
    pub fn matches_nothing(&self) -> bool {
        self.predicates.iter().any(|p| matches!(p, Predicate::Never))
    }

    /// Evaluates the filter against one row
    ///
    /// `lookup` returns the row's value for a column, or `None` when the
    /// column is null or absent.
    pub fn matches<F>(&self, lookup: F) -> bool
    where
        F: Fn(ScopeField) -> Option<String>,
    {
        self.predicates.iter().all(|p| p.matches(&lookup))
    }

    /// Renders the filter as SQL with `$n` placeholders starting at
    /// `first_param`
    ///
    /// Returns `None` for an unrestricted filter.
    pub fn to_sql(&self, first_param: usize) -> Option<SqlFragment> {
        if self.predicates.is_empty() {
            return None;
        }

        let mut next = first_param;
        let mut params = Vec::new();
        let mut clauses = Vec::with_capacity(self.predicates.len());

        for predicate in &self.predicates {
            let clause = match predicate {
                Predicate::Eq { field, value } => {
                    params.push(value.clone());
                    next += 1;
                    format!("{} = ${}", field, next - 1)
                }
                Predicate::In { field, values } => {
                    let placeholders: Vec<String> = values
                        .iter()
                        .map(|value| {
                            params.push(value.clone());
                            next += 1;
                            format!("${}", next - 1)
                        })
                        .collect();
                    format!("{} IN ({})", field, placeholders.join(", "))
                }
                Predicate::Never => "1 = 0".to_string(),
            };
            clauses.push(clause);
        }

        Some(SqlFragment {
            sql: clauses.join(" AND "),
            params,
        })
    }
}

impl ScopeQuery for ScopeFilter {
    fn filter_eq(mut self, field: ScopeField, value: &str) -> Self {
        self.predicates.push(Predicate::Eq {
            field,
            value: value.to_string(),
        });
        self
    }

    fn filter_in(mut self, field: ScopeField, values: &[String]) -> Self {
        if values.is_empty() {
            return self.filter_none();
        }

        self.predicates.push(Predicate::In {
            field,
            values: values.to_vec(),
        });
        self
    }

    fn filter_none(mut self) -> Self {
        self.predicates.push(Predicate::Never);
        self
    }
}

impl fmt::Display for ScopeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, predicate) in self.predicates.iter().enumerate() {
            if idx > 0 {
                f.write_str(" AND ")?;
            }
            write!(f, "{}", predicate)?;
        }
        Ok(())
    }
}

#[cfg(feature = "postgres")]
mod postgres {
    use super::ScopeQuery;
    use crate::registry::ScopeField;
    use sqlx::{Postgres, QueryBuilder};

    /// `sqlx::QueryBuilder` wrapper that appends scope predicates as bound
    /// parameters
    ///
    /// Scope values are bound as text.
    pub struct PgScopedQuery<'args> {
        builder: QueryBuilder<'args, Postgres>,
        has_where: bool,
    }

    impl<'args> PgScopedQuery<'args> {
        /// Starts from a base statement without a WHERE clause
        pub fn new(base_sql: impl Into<String>) -> Self {
            Self {
                builder: QueryBuilder::new(base_sql),
                has_where: false,
            }
        }

        /// Starts from a base statement that already has a WHERE clause
        pub fn with_where(base_sql: impl Into<String>) -> Self {
            Self {
                builder: QueryBuilder::new(base_sql),
                has_where: true,
            }
        }

        /// SQL built so far
        pub fn sql(&self) -> &str {
            self.builder.sql()
        }

        /// Hands the builder back for execution
        pub fn into_builder(self) -> QueryBuilder<'args, Postgres> {
            self.builder
        }

        fn push_connective(&mut self) {
            if self.has_where {
                self.builder.push(" AND ");
            } else {
                self.builder.push(" WHERE ");
                self.has_where = true;
            }
        }
    }

    impl<'args> ScopeQuery for PgScopedQuery<'args> {
        fn filter_eq(mut self, field: ScopeField, value: &str) -> Self {
            self.push_connective();
            self.builder
                .push(field.column())
                .push(" = ")
                .push_bind(value.to_string());
            self
        }

        fn filter_in(mut self, field: ScopeField, values: &[String]) -> Self {
            if values.is_empty() {
                return self.filter_none();
            }

            self.push_connective();
            self.builder.push(field.column()).push(" IN (");
            {
                let mut separated = self.builder.separated(", ");
                for value in values {
                    separated.push_bind(value.clone());
                }
            }
            self.builder.push(")");
            self
        }

        fn filter_none(mut self) -> Self {
            self.push_connective();
            self.builder.push("1 = 0");
            self
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_pg_query_predicates() {
            let query = PgScopedQuery::new("SELECT * FROM stock_batches")
                .filter_in(ScopeField::WarehouseId, &["w1".to_string(), "w2".to_string()])
                .filter_eq(ScopeField::CreatedBy, "u1");

            assert_eq!(
                query.sql(),
                "SELECT * FROM stock_batches WHERE warehouse_id IN ($1, $2) AND created_by = $3"
            );
        }

        #[test]
        fn test_pg_query_deny_all() {
            let query = PgScopedQuery::with_where("SELECT * FROM sales_orders WHERE tenant_id = 't1'")
                .filter_in(ScopeField::WarehouseId, &[]);

            assert_eq!(
                query.sql(),
                "SELECT * FROM sales_orders WHERE tenant_id = 't1' AND 1 = 0"
            );
        }
    }
}
