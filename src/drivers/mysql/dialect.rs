//! MySQL/MariaDB SQL dialect (Strategy pattern).
//!
//! JSON field access uses the `->>` shorthand, available on MySQL 5.7.9+.
//! MariaDB 10.2 lacks the shorthand but accepts the equivalent
//! `JSON_UNQUOTE(JSON_EXTRACT(...))`; the driver gates on 10.2.6+ where the
//! generated `_id` column works either way.

use serde_json::Value;

use crate::core::document::truthy;
use crate::core::traits::{
    expect_array, invalid_argument, scalar_literal, wrap_like, Dialect,
};
use crate::error::{DriverError, Result};
use crate::query::FilterOp;

/// MySQL/MariaDB dialect implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlDialect;

impl MysqlDialect {
    /// Create a new MySQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for MysqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_ident(&self, name: &str) -> String {
        // Backticks, embedded backticks doubled
        format!("`{}`", name.replace('`', "``"))
    }

    fn quote_str(&self, value: &str) -> String {
        // Matches the server's string literal rules with backslash escapes
        // enabled (the connection does not set NO_BACKSLASH_ESCAPES)
        let mut out = String::with_capacity(value.len() + 2);
        out.push('\'');
        for c in value.chars() {
            match c {
                '\'' => out.push_str("\\'"),
                '"' => out.push_str("\\\""),
                '\\' => out.push_str("\\\\"),
                '\0' => out.push_str("\\0"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\x1a' => out.push_str("\\Z"),
                c => out.push(c),
            }
        }
        out.push('\'');
        out
    }

    fn path_selector(&self, field: &str, _as_text: bool) -> String {
        // ->> unquotes, so the text and JSON forms coincide; the JSON
        // functions accept the unquoted text of a nested array/object
        format!(
            "{} ->> {}",
            self.quote_ident("document"),
            self.quote_str(&format!("$.{}", field))
        )
    }

    fn compile_operator(&self, op: FilterOp, field: &str, value: &Value) -> Result<Option<String>> {
        let selector = self.path_selector(field, true);

        let sql = match op {
            FilterOp::Eq => format!("{} = {}", selector, self.quote_value(value)?),
            FilterOp::Ne => format!("{} <> {}", selector, self.quote_value(value)?),
            FilterOp::Gte => format!("{} >= {}", selector, self.quote_value(value)?),
            FilterOp::Gt => format!("{} > {}", selector, self.quote_value(value)?),
            FilterOp::Lte => format!("{} <= {}", selector, self.quote_value(value)?),
            FilterOp::Lt => format!("{} < {}", selector, self.quote_value(value)?),

            // When the stored value is an array these evaluate to false;
            // JSON_OVERLAPS would handle that but is MySQL 8+ only
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
                        FilterOp::In => format!("{} IN ({})", selector, list),
                        _ => format!("{} NOT IN ({})", selector, list),
                    }
                }
            }

            FilterOp::Has => {
                if value.is_array() || value.is_object() {
                    return Err(invalid_argument(op, "array values are not supported"));
                }
                format!(
                    "JSON_CONTAINS({}, JSON_QUOTE({}))",
                    selector,
                    self.quote_value(value)?
                )
            }

            FilterOp::All => {
                let items = expect_array(op, value)?;
                format!(
                    "JSON_CONTAINS({}, JSON_ARRAY({}))",
                    selector,
                    self.quote_values(items)?
                )
            }

            // Case-insensitive by lowercasing both sides; leading ^ anchors
            // do not survive the REGEXP/LOWER combination on older servers
            FilterOp::Regex => {
                let pattern = scalar_literal(value)?.replace('\\', "\\\\");
                format!(
                    "LOWER({}) REGEXP LOWER({})",
                    selector,
                    self.quote_str(pattern.trim_matches('/'))
                )
            }

            FilterOp::Size => format!(
                "JSON_LENGTH({}) = {}",
                selector,
                self.quote_value(value)?
            ),

            FilterOp::Mod => {
                let items = expect_array(op, value)?;
                let divisor = items
                    .first()
                    .ok_or_else(|| invalid_argument(op, "missing divisor"))?;
                let remainder = items.get(1).and_then(Value::as_i64).unwrap_or(0);
                format!(
                    "MOD({}, {}) = {}",
                    selector,
                    self.quote_value(divisor)?,
                    remainder
                )
            }

            // Warning: tests for SQL NULL, not for key presence
            FilterOp::Exists => {
                if truthy(value) {
                    format!("{} IS NOT NULL", selector)
                } else {
                    format!("{} IS NULL", selector)
                }
            }

            FilterOp::Text => {
                if value.is_array() || value.is_object() {
                    return Err(invalid_argument(op, "search options are not supported"));
                }
                format!(
                    "{} LIKE {}",
                    selector,
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
        // Unique lookups on _id go through a generated column; CHECK
        // constraints cannot index and functional indexes are 8.0.13+
        format!(
            "CREATE TABLE IF NOT EXISTS {table} (\n    \
             {id} INT NOT NULL AUTO_INCREMENT,\n    \
             {document} JSON NOT NULL,\n    \
             {id_virtual} VARCHAR(24) GENERATED ALWAYS AS ({selector}) NOT NULL UNIQUE COMMENT 'Id',\n    \
             PRIMARY KEY ({id})\n\
             ) ENGINE=InnoDB COLLATE 'utf8mb4_unicode_ci'",
            table = self.quote_ident(table),
            id = self.quote_ident("id"),
            document = self.quote_ident("document"),
            id_virtual = self.quote_ident("_id_virtual"),
            selector = self.path_selector("_id", true),
        )
    }
}
