//! Database driver implementations.
//!
//! Each driver module implements the two core traits for its engine:
//!
//! - [`mysql`]: MySQL/MariaDB (dialect + backend over `mysql_async`)
//! - [`postgres`]: PostgreSQL (dialect + backend over `tokio-postgres`)
//! - [`common`]: shared utilities (server version gating)
//!
//! # Dispatch
//!
//! Dialects are dispatched through the [`DialectImpl`] enum instead of
//! `Box<dyn Dialect>` - the compiler generates a match statement, keeping
//! the hot compilation path free of vtable calls. Backends are held as
//! `Arc<dyn Backend>`: there is exactly one per driver and every call ends
//! in network I/O anyway.
//!
//! # Adding New Databases
//!
//! 1. Create a new module under `drivers/` (e.g. `drivers/sqlite/`)
//! 2. Implement `Dialect` and `Backend`
//! 3. Add the enum variant to `DialectImpl` and the arm in [`connect`]
//! 4. Add the kind to `DbKind` in the config module

pub mod common;
pub mod mysql;
pub mod postgres;

pub use mysql::{MysqlBackend, MysqlDialect};
pub use postgres::{PostgresBackend, PostgresDialect};

use std::sync::Arc;

use serde_json::Value;

use crate::config::{ConnectionOptions, DbKind};
use crate::core::traits::{Backend, Dialect};
use crate::error::Result;
use crate::query::FilterOp;

/// Enum-based static dispatch for dialects.
#[derive(Debug, Clone)]
pub enum DialectImpl {
    Mysql(MysqlDialect),
    Postgres(PostgresDialect),
}

impl DialectImpl {
    /// The dialect for a connection kind.
    pub fn for_kind(kind: DbKind) -> Self {
        match kind {
            DbKind::Mysql => DialectImpl::Mysql(MysqlDialect::new()),
            DbKind::Postgres => DialectImpl::Postgres(PostgresDialect::new()),
        }
    }
}

impl Dialect for DialectImpl {
    fn name(&self) -> &'static str {
        match self {
            DialectImpl::Mysql(d) => d.name(),
            DialectImpl::Postgres(d) => d.name(),
        }
    }

    fn quote_ident(&self, name: &str) -> String {
        match self {
            DialectImpl::Mysql(d) => d.quote_ident(name),
            DialectImpl::Postgres(d) => d.quote_ident(name),
        }
    }

    fn quote_str(&self, value: &str) -> String {
        match self {
            DialectImpl::Mysql(d) => d.quote_str(value),
            DialectImpl::Postgres(d) => d.quote_str(value),
        }
    }

    fn path_selector(&self, field: &str, as_text: bool) -> String {
        match self {
            DialectImpl::Mysql(d) => d.path_selector(field, as_text),
            DialectImpl::Postgres(d) => d.path_selector(field, as_text),
        }
    }

    fn compile_operator(&self, op: FilterOp, field: &str, value: &Value) -> Result<Option<String>> {
        match self {
            DialectImpl::Mysql(d) => d.compile_operator(op, field, value),
            DialectImpl::Postgres(d) => d.compile_operator(op, field, value),
        }
    }

    fn build_create_table(&self, table: &str) -> String {
        match self {
            DialectImpl::Mysql(d) => d.build_create_table(table),
            DialectImpl::Postgres(d) => d.build_create_table(table),
        }
    }

    fn document_column(&self) -> String {
        match self {
            DialectImpl::Mysql(d) => d.document_column(),
            DialectImpl::Postgres(d) => d.document_column(),
        }
    }
}

/// Open the single connection for the configured kind and pair it with its
/// dialect. The backend performs its server-version gate before returning.
pub(crate) async fn connect(
    options: &ConnectionOptions,
) -> Result<(Arc<dyn Backend>, DialectImpl)> {
    options.validate()?;

    let backend: Arc<dyn Backend> = match options.connection {
        DbKind::Mysql => Arc::new(MysqlBackend::connect(options).await?),
        DbKind::Postgres => Arc::new(PostgresBackend::connect(options).await?),
    };

    Ok((backend, DialectImpl::for_kind(options.connection)))
}
