//! Core traits for the document-store engine.
//!
//! This module defines the two seams every backend plugs into:
//!
//! - [`Dialect`]: SQL syntax strategy (quoting, JSON path selection,
//!   filter-operator compilation, table DDL)
//! - [`Backend`]: statement execution over one live connection
//!
//! # Design Patterns
//!
//! - **Strategy**: `Dialect` provides interchangeable SQL syntax rules,
//!   selected once at driver construction and held by the query builder.
//! - The backends are object-safe async traits so the collection layer is
//!   database-agnostic.

use async_trait::async_trait;
use serde_json::Value;

use crate::config::DbKind;
use crate::error::{DriverError, Result};
use crate::query::FilterOp;

/// SQL syntax strategy for a database engine.
pub trait Dialect: Send + Sync {
    /// Get the dialect identifier (e.g. "mysql", "postgres").
    fn name(&self) -> &'static str;

    /// Quote an identifier (table or column name).
    ///
    /// - MySQL: `` `identifier` ``
    /// - PostgreSQL: `"identifier"`
    fn quote_ident(&self, name: &str) -> String;

    /// Quote a string as a SQL literal with dialect-correct escaping.
    fn quote_str(&self, value: &str) -> String;

    /// Build the expression extracting a (possibly dotted) field path from
    /// the document column. `as_text` selects the text-typed form; the
    /// JSON-typed form is required by containment and length operators.
    fn path_selector(&self, field: &str, as_text: bool) -> String;

    /// Compile one filter operator into a boolean SQL expression.
    /// `Ok(None)` means the operator contributes no condition.
    fn compile_operator(&self, op: FilterOp, field: &str, value: &Value) -> Result<Option<String>>;

    /// DDL creating the collection table if absent, including the unique
    /// `_id` constraint.
    fn build_create_table(&self, table: &str) -> String;

    /// The SELECT expression for the document column, typed as text.
    fn document_column(&self) -> String {
        self.quote_ident("document")
    }

    /// Quote a scalar JSON value as a SQL literal. Non-scalar input is a
    /// compile error.
    fn quote_value(&self, value: &Value) -> Result<String> {
        Ok(self.quote_str(&scalar_literal(value)?))
    }

    /// Quote a list of scalar values as a comma-separated literal list.
    fn quote_values(&self, values: &[Value]) -> Result<String> {
        let quoted = values
            .iter()
            .map(|v| self.quote_value(v))
            .collect::<Result<Vec<_>>>()?;
        Ok(quoted.join(", "))
    }
}

/// Execute SQL over one live connection.
///
/// One backend instance owns exactly one physical connection for the
/// lifetime of its driver. All statements arrive fully rendered; failures
/// are wrapped as [`DriverError::Execution`] carrying the SQL text.
#[async_trait]
pub trait Backend: Send + Sync {
    /// The connection kind this backend serves.
    fn kind(&self) -> DbKind;

    /// Run a DML statement, returning the affected row count.
    async fn execute(&self, sql: &str) -> Result<u64>;

    /// Run a DDL script (may contain multiple statements).
    async fn execute_ddl(&self, sql: &str) -> Result<()>;

    /// Run a SELECT over a single text column, returning the row values.
    async fn query_column(&self, sql: &str) -> Result<Vec<String>>;

    /// Run a SELECT returning one integer scalar (e.g. COUNT).
    async fn query_scalar(&self, sql: &str) -> Result<Option<i64>>;

    /// The raw server version string.
    async fn server_version(&self) -> Result<String>;

    /// Close the connection.
    async fn close(&self) -> Result<()>;
}

/// Coerce a scalar JSON value to the string the SQL literal is built from.
/// Mirrors the original engine's string casts: numbers in decimal form,
/// `true` as `"1"`, `false` and `null` as the empty string.
pub(crate) fn scalar_literal(value: &Value) -> Result<String> {
    match value {
        Value::Null => Ok(String::new()),
        Value::Bool(true) => Ok("1".to_string()),
        Value::Bool(false) => Ok(String::new()),
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => Ok(s.clone()),
        other => Err(DriverError::NonScalarValue(other.to_string())),
    }
}

/// Wrap a LIKE needle in `%` wildcards, escaping embedded `_` and `%`.
pub(crate) fn wrap_like(value: &str) -> String {
    let escaped = value.replace('_', "\\_").replace('%', "\\%");
    format!("%{}%", escaped)
}

/// Shape check shared by the list operators.
pub(crate) fn expect_array(op: FilterOp, value: &Value) -> Result<&Vec<Value>> {
    value.as_array().ok_or_else(|| DriverError::InvalidArgument {
        op: op.as_str().to_string(),
        reason: "value must be an array".to_string(),
    })
}

/// Build an invalid-argument error for an operator.
pub(crate) fn invalid_argument(op: FilterOp, reason: &str) -> DriverError {
    DriverError::InvalidArgument {
        op: op.as_str().to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_scalar_literal_coercion() {
        assert_eq!(scalar_literal(&json!("abc")).unwrap(), "abc");
        assert_eq!(scalar_literal(&json!(42)).unwrap(), "42");
        assert_eq!(scalar_literal(&json!(1.5)).unwrap(), "1.5");
        assert_eq!(scalar_literal(&json!(true)).unwrap(), "1");
        assert_eq!(scalar_literal(&json!(false)).unwrap(), "");
        assert_eq!(scalar_literal(&Value::Null).unwrap(), "");
    }

    #[test]
    fn test_scalar_literal_rejects_non_scalar() {
        assert!(matches!(
            scalar_literal(&json!([1, 2])),
            Err(DriverError::NonScalarValue(_))
        ));
        assert!(matches!(
            scalar_literal(&json!({"a": 1})),
            Err(DriverError::NonScalarValue(_))
        ));
    }

    #[test]
    fn test_wrap_like_escapes_wildcards() {
        assert_eq!(wrap_like("abc"), "%abc%");
        assert_eq!(wrap_like("a_b%c"), "%a\\_b\\%c%");
    }
}
