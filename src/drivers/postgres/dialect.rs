//! PostgreSQL SQL dialect (Strategy pattern).
//!
//! Documents live in a `jsonb` column. Field access uses the `#>>`/`#>`
//! path operators; containment tests use the jsonb `?` and `?&` operators
//! (statements are rendered without bound placeholders, so the question
//! marks reach the server untouched).

use serde_json::Value;

use crate::core::document::truthy;
use crate::core::traits::{
    expect_array, invalid_argument, scalar_literal, wrap_like, Dialect,
};
use crate::error::{DriverError, Result};
use crate::query::FilterOp;

/// PostgreSQL dialect implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Create a new PostgreSQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn quote_ident(&self, name: &str) -> String {
        // Double quotes, embedded quotes doubled
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn quote_str(&self, value: &str) -> String {
        let escaped = value.replace('\'', "''");
        if value.contains('\\') {
            // Escape-string literal; standard_conforming_strings leaves
            // backslashes alone in plain literals
            format!("E'{}'", escaped.replace('\\', "\\\\"))
        } else {
            format!("'{}'", escaped)
        }
    }

    fn path_selector(&self, field: &str, as_text: bool) -> String {
        let path = format!("{{{}}}", field.replace('.', ","));
        format!(
            "{} {} {}",
            self.quote_ident("document"),
            if as_text { "#>>" } else { "#>" },
            self.quote_str(&path)
        )
    }

    fn compile_operator(&self, op: FilterOp, field: &str, value: &Value) -> Result<Option<String>> {
        let text_selector = self.path_selector(field, true);
        let json_selector = self.path_selector(field, false);

        let sql = match op {
            FilterOp::Eq => format!("{} = {}", text_selector, self.quote_value(value)?),
            FilterOp::Ne => format!("{} <> {}", text_selector, self.quote_value(value)?),
            FilterOp::Gte => format!("{} >= {}", text_selector, self.quote_value(value)?),
            FilterOp::Gt => format!("{} > {}", text_selector, self.quote_value(value)?),
            FilterOp::Lte => format!("{} <= {}", text_selector, self.quote_value(value)?),
            FilterOp::Lt => format!("{} < {}", text_selector, self.quote_value(value)?),

            FilterOp::In | FilterOp::Nin => {
                let items = expect_array(op, value)?;
                if items.is_empty() {
                    match op {
                        FilterOp::In => "1 = 0".to_string(),
                        _ => "1 = 1".to_string(),
                    }
                } else {
                    let list = self.quote_values(items)?;
                    match op {
                        FilterOp::In => format!("{} IN ({})", text_selector, list),
                        _ => format!("{} NOT IN ({})", text_selector, list),
                    }
                }
            }

            FilterOp::Has => {
                if value.is_array() || value.is_object() {
                    return Err(invalid_argument(op, "array values are not supported"));
                }
                format!("{} ? {}", json_selector, self.quote_value(value)?)
            }

            FilterOp::All => {
                let items = expect_array(op, value)?;
                format!(
                    "{} ?& array[{}]",
                    json_selector,
                    self.quote_values(items)?
                )
            }

            // ~* is the case-insensitive POSIX regex match
            FilterOp::Regex => {
                let pattern = scalar_literal(value)?;
                format!(
                    "{} ~* {}",
                    text_selector,
                    self.quote_str(pattern.trim_matches('/'))
                )
            }

            FilterOp::Size => format!(
                "jsonb_array_length({}) = {}",
                json_selector,
                self.quote_value(value)?
            ),

            FilterOp::Mod => {
                let items = expect_array(op, value)?;
                let divisor = items
                    .first()
                    .ok_or_else(|| invalid_argument(op, "missing divisor"))?;
                let remainder = items.get(1).cloned().unwrap_or_else(|| Value::from(0));
                format!(
                    "({})::int % {} = {}",
                    text_selector,
                    self.quote_value(divisor)?,
                    self.quote_value(&remainder)?
                )
            }

            // Warning: tests for SQL NULL, not for key presence
            FilterOp::Exists => {
                if truthy(value) {
                    format!("{} IS NOT NULL", text_selector)
                } else {
                    format!("{} IS NULL", text_selector)
                }
            }

            FilterOp::Text => {
                if value.is_array() || value.is_object() {
                    return Err(invalid_argument(op, "search options are not supported"));
                }
                format!(
                    "({})::text LIKE {}",
                    text_selector,
                    self.quote_str(&wrap_like(&scalar_literal(value)?))
                )
            }

            FilterOp::Func | FilterOp::Fuzzy => {
                return Err(DriverError::UnsupportedOperator(op.as_str().to_string()))
            }

            FilterOp::Options => return Ok(None),
        };

        Ok(Some(sql))
    }

    fn build_create_table(&self, table: &str) -> String {
        // Expression indexes cannot be declared inside CREATE TABLE, so the
        // unique _id lookup index is a second statement. Generated columns
        // would need PostgreSQL 12+; the functional index works on 9.5+.
        format!(
            "CREATE TABLE IF NOT EXISTS {table} (\n    \
             {id} serial NOT NULL,\n    \
             {document} jsonb NOT NULL,\n    \
             PRIMARY KEY ({id})\n\
             );\n\
             CREATE UNIQUE INDEX IF NOT EXISTS {index} ON {table} ((({document} ->> '_id')::text));",
            table = self.quote_ident(table),
            id = self.quote_ident("id"),
            document = self.quote_ident("document"),
            index = self.quote_ident(&format!("idx_{}_id", table)),
        )
    }

    fn document_column(&self) -> String {
        // Cast so every backend hands the cursor a text row
        format!("{}::text", self.quote_ident("document"))
    }
}
