//! Filter expression model and query compilation.

mod builder;

pub use builder::QueryBuilder;

use std::fmt;

use serde_json::{Map, Value};

use crate::core::document::Document;
use crate::error::{DriverError, Result};

/// A filter expression tree: field → condition mappings, combined by
/// implicit AND at the top level and explicit `$and`/`$or` combinators.
pub type FilterTree = Map<String, Value>;

/// An opaque per-document predicate. Never translated to SQL; always
/// executed in-process after the queried rows are materialized.
pub type PredicateFn = dyn Fn(&Document) -> bool + Send + Sync;

/// What a find/update/delete call matches against.
pub enum Filter {
    /// An expression tree, compiled to a SQL WHERE clause.
    Expr(FilterTree),
    /// A host predicate evaluated per decoded document.
    Predicate(Box<PredicateFn>),
}

impl Filter {
    /// The match-everything filter.
    pub fn empty() -> Self {
        Filter::Expr(Map::new())
    }

    /// Wrap a host predicate.
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&Document) -> bool + Send + Sync + 'static,
    {
        Filter::Predicate(Box::new(f))
    }

    /// Whether this filter matches every document.
    pub fn is_empty(&self) -> bool {
        matches!(self, Filter::Expr(tree) if tree.is_empty())
    }
}

impl Default for Filter {
    fn default() -> Self {
        Filter::empty()
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Expr(tree) => f.debug_tuple("Expr").field(tree).finish(),
            Filter::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl From<FilterTree> for Filter {
    fn from(tree: FilterTree) -> Self {
        Filter::Expr(tree)
    }
}

impl TryFrom<Value> for Filter {
    type Error = DriverError;

    /// A JSON object becomes an expression tree; `null` matches everything.
    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(tree) => Ok(Filter::Expr(tree)),
            Value::Null => Ok(Filter::empty()),
            other => Err(DriverError::InvalidCondition(format!(
                "filter must be a JSON object, got {}",
                other
            ))),
        }
    }
}

/// The closed set of filter operators the SQL engine understands.
///
/// Parsed from the `$`-keys of a condition map; alias keys fold onto one
/// variant (`$regex`/`$match`/`$preg`, `$func`/`$fn`/`$f`). Unrecognized
/// keys fail fast with [`DriverError::InvalidCondition`] instead of hitting
/// a runtime default case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
    Has,
    All,
    Regex,
    Size,
    Mod,
    Exists,
    Text,
    /// Host-callback operators; never expressible in SQL.
    Func,
    /// Fuzzy search; never expressible in SQL.
    Fuzzy,
    /// `$regex` companion accepted as a no-op for API compatibility.
    Options,
}

impl FilterOp {
    /// Parse an operator key.
    pub fn parse(key: &str) -> Result<FilterOp> {
        Ok(match key {
            "$eq" => FilterOp::Eq,
            "$ne" => FilterOp::Ne,
            "$gt" => FilterOp::Gt,
            "$gte" => FilterOp::Gte,
            "$lt" => FilterOp::Lt,
            "$lte" => FilterOp::Lte,
            "$in" => FilterOp::In,
            "$nin" => FilterOp::Nin,
            "$has" => FilterOp::Has,
            "$all" => FilterOp::All,
            "$regex" | "$match" | "$preg" => FilterOp::Regex,
            "$size" => FilterOp::Size,
            "$mod" => FilterOp::Mod,
            "$exists" => FilterOp::Exists,
            "$text" => FilterOp::Text,
            "$func" | "$fn" | "$f" => FilterOp::Func,
            "$fuzzy" => FilterOp::Fuzzy,
            "$options" => FilterOp::Options,
            other => {
                return Err(DriverError::InvalidCondition(format!(
                    "unknown operator {}",
                    other
                )))
            }
        })
    }

    /// Canonical operator name, for error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "$eq",
            FilterOp::Ne => "$ne",
            FilterOp::Gt => "$gt",
            FilterOp::Gte => "$gte",
            FilterOp::Lt => "$lt",
            FilterOp::Lte => "$lte",
            FilterOp::In => "$in",
            FilterOp::Nin => "$nin",
            FilterOp::Has => "$has",
            FilterOp::All => "$all",
            FilterOp::Regex => "$regex",
            FilterOp::Size => "$size",
            FilterOp::Mod => "$mod",
            FilterOp::Exists => "$exists",
            FilterOp::Text => "$text",
            FilterOp::Func => "$func",
            FilterOp::Fuzzy => "$fuzzy",
            FilterOp::Options => "$options",
        }
    }
}

/// Options accepted by every find-like call.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Ordered sort specification: field name → direction (1 ascending,
    /// -1 descending).
    pub sort: Option<Vec<(String, i32)>>,
    /// Maximum number of documents to return.
    pub limit: Option<u64>,
    /// Number of matching documents to pass over first.
    pub skip: Option<u64>,
    /// Projection mask: field name → include (truthy) or exclude (falsy).
    pub fields: Option<Map<String, Value>>,
}

impl FindOptions {
    /// Options limited to the first match.
    pub fn first() -> Self {
        FindOptions {
            limit: Some(1),
            ..Default::default()
        }
    }
}
