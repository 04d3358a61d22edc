//! Filter-tree to SQL compilation.
//!
//! The recursion over combinators and field groups is dialect-agnostic and
//! lives here; every per-operator expression is delegated to the dialect.

use serde_json::{Map, Value};

use crate::core::traits::Dialect;
use crate::drivers::DialectImpl;
use crate::error::{DriverError, Result};

use super::{FilterOp, FilterTree};

const GLUE_AND: &str = " AND ";
const GLUE_OR: &str = " OR ";

/// Compiles filter trees, sort specs and limits into SQL fragments for one
/// dialect, chosen at driver construction.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    dialect: DialectImpl,
}

impl QueryBuilder {
    /// Create a query builder over a dialect.
    pub fn new(dialect: DialectImpl) -> Self {
        Self { dialect }
    }

    /// The dialect this builder compiles for.
    pub fn dialect(&self) -> &DialectImpl {
        &self.dialect
    }

    /// Quote an identifier through the dialect.
    pub fn quote_ident(&self, name: &str) -> String {
        self.dialect.quote_ident(name)
    }

    /// Build a `WHERE ...` fragment, or `None` when the criteria are empty
    /// or compile to nothing.
    pub fn build_where(&self, criteria: &FilterTree) -> Result<Option<String>> {
        let segments = self.build_segments(criteria)?;
        if segments.is_empty() {
            return Ok(None);
        }
        Ok(Some(format!("WHERE {}", segments.join(GLUE_AND))))
    }

    /// Compile a criteria tree into boolean segments, one per top-level key.
    fn build_segments(&self, criteria: &FilterTree) -> Result<Vec<String>> {
        let mut segments = Vec::new();

        // Keys are either the combinators or field names
        for (key, value) in criteria {
            match key.as_str() {
                "$and" | "$or" => {
                    let glue = if key == "$and" { GLUE_AND } else { GLUE_OR };
                    let subtrees = value.as_array().ok_or_else(|| {
                        DriverError::InvalidArgument {
                            op: key.clone(),
                            reason: "value must be an array of filter objects".to_string(),
                        }
                    })?;

                    let mut parts = Vec::new();
                    for subtree in subtrees {
                        let tree = subtree.as_object().ok_or_else(|| {
                            DriverError::InvalidArgument {
                                op: key.clone(),
                                reason: "every element must be a filter object".to_string(),
                            }
                        })?;
                        let inner = self.build_segments(tree)?;
                        if !inner.is_empty() {
                            parts.push(format!("({})", inner.join(GLUE_AND)));
                        }
                    }
                    if !parts.is_empty() {
                        segments.push(format!("({})", parts.join(glue)));
                    }
                }

                field => {
                    if let Some(segment) = self.build_field(field, value)? {
                        segments.push(segment);
                    }
                }
            }
        }

        Ok(segments)
    }

    /// Compile one field entry: structural `$not`, an operator map, or a
    /// literal treated as `$eq`.
    fn build_field(&self, field: &str, value: &Value) -> Result<Option<String>> {
        if let Some(conditions) = value.as_object() {
            // A lone $not key negates the compiled condition for this field.
            // A scalar inside $not falls back to a $regex match.
            if conditions.len() == 1 {
                if let Some(inner) = conditions.get("$not") {
                    let compiled = match inner {
                        Value::Object(inner_conditions) => {
                            self.build_field_group(field, inner_conditions)?
                        }
                        scalar => {
                            let mut regex = Map::new();
                            regex.insert("$regex".to_string(), scalar.clone());
                            self.build_field_group(field, &regex)?
                        }
                    };
                    return Ok(compiled.map(|sql| format!("NOT ({})", sql)));
                }
            }
            return self.build_field_group(field, conditions);
        }

        if value.is_array() {
            return Err(DriverError::InvalidCondition(format!(
                "field {} cannot be matched against a bare array; use $in, $all or $has",
                field
            )));
        }

        let mut eq = Map::new();
        eq.insert("$eq".to_string(), value.clone());
        self.build_field_group(field, &eq)
    }

    /// Compile an operator map for one field. Multiple operators AND together.
    fn build_field_group(
        &self,
        field: &str,
        conditions: &Map<String, Value>,
    ) -> Result<Option<String>> {
        let mut parts = Vec::new();

        for (key, value) in conditions {
            let op = FilterOp::parse(key)?;
            match op {
                // Requires host-language callback execution; cannot be
                // pushed down. Report the operator as the caller spelled it.
                FilterOp::Func | FilterOp::Fuzzy => {
                    return Err(DriverError::UnsupportedOperator(key.clone()))
                }
                FilterOp::Options => continue,
                _ => {}
            }
            if let Some(sql) = self.dialect.compile_operator(op, field, value)? {
                parts.push(sql);
            }
        }

        Ok(if parts.is_empty() {
            None
        } else {
            Some(parts.join(GLUE_AND))
        })
    }

    /// Build an `ORDER BY ...` fragment, or `None` for an empty spec.
    /// Direction -1 sorts descending; any other value ascending.
    pub fn build_order_by(&self, sort: Option<&[(String, i32)]>) -> Option<String> {
        let sort = sort?;
        if sort.is_empty() {
            return None;
        }

        let segments = sort
            .iter()
            .map(|(field, direction)| {
                format!(
                    "{} {}",
                    self.dialect.path_selector(field, true),
                    if *direction == -1 { "DESC" } else { "ASC" }
                )
            })
            .collect::<Vec<_>>();

        Some(format!("ORDER BY {}", segments.join(", ")))
    }

    /// Build a `LIMIT ...` fragment, or `None` when no limit is set.
    /// A skip without a limit is not expressible and is ignored.
    pub fn build_limit(&self, limit: Option<u64>, skip: Option<u64>) -> Option<String> {
        let limit = match limit {
            None | Some(0) => return None,
            Some(n) => n,
        };
        match skip {
            None | Some(0) => Some(format!("LIMIT {}", limit)),
            Some(offset) => Some(format!("LIMIT {} OFFSET {}", limit, offset)),
        }
    }

    /// Assemble the SELECT over the document column.
    pub fn build_select(
        &self,
        table: &str,
        where_sql: Option<&str>,
        order_by_sql: Option<&str>,
        limit_sql: Option<&str>,
    ) -> String {
        let mut sql = format!(
            "SELECT {} FROM {}",
            self.dialect.document_column(),
            self.quote_ident(table)
        );
        for fragment in [where_sql, order_by_sql, limit_sql].into_iter().flatten() {
            sql.push(' ');
            sql.push_str(fragment);
        }
        sql
    }

    /// DDL creating the collection table if absent.
    pub fn build_create_table(&self, table: &str) -> String {
        self.dialect.build_create_table(table)
    }
}
