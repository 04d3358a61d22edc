//! # mongo-sql
//!
//! MongoDB-like document collections stored as JSON rows in MySQL or
//! PostgreSQL.
//!
//! Every collection is one table with a surrogate key and a single JSON
//! column holding the full document. The MongoDB-style filter language
//! (`$eq`, `$in`, `$regex`, `$and`/`$or`, ...) is compiled to
//! dialect-specific SQL and pushed down; host-language predicate filters
//! run in-process instead. On top sit the document-store verbs: find with
//! sort/limit/skip/projection, insert, merge-update, replace, delete,
//! count, and hasOne/hasMany relationship population.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mongo_sql::{ConnectionOptions, Driver, Filter, FindOptions};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> mongo_sql::Result<()> {
//!     let options = ConnectionOptions::load("storage.yaml")?;
//!     let driver = Driver::connect(&options).await?;
//!
//!     driver.insert("posts", json!({"title": "Hello", "_o": 1})).await?;
//!
//!     let posts = driver
//!         .find(
//!             "posts",
//!             Filter::try_from(json!({"title": {"$regex": "hell.*"}}))?,
//!             FindOptions {
//!                 sort: Some(vec![("_o".to_string(), -1)]),
//!                 limit: Some(10),
//!                 ..Default::default()
//!             },
//!         )
//!         .await?
//!         .to_array()
//!         .await?;
//!
//!     println!("found {} posts", posts.len());
//!     Ok(())
//! }
//! ```

pub mod collection;
pub mod config;
pub mod core;
pub mod cursor;
pub mod driver;
pub mod drivers;
pub mod error;
pub mod populate;
pub mod query;

#[cfg(test)]
pub(crate) mod testutil;

// Re-exports for convenient access
pub use crate::collection::Collection;
pub use crate::config::{ConnectionOptions, DbKind};
pub use crate::core::document::Document;
pub use crate::core::id::object_id;
pub use crate::cursor::Cursor;
pub use crate::driver::{Driver, Inserted};
pub use crate::error::{DriverError, Result};
pub use crate::populate::ResultIterator;
pub use crate::query::{Filter, FilterOp, FilterTree, FindOptions, QueryBuilder};
