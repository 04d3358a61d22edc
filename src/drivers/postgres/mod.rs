//! PostgreSQL backend over one `tokio-postgres` client.
//!
//! Requires PostgreSQL 9.5+ (`jsonb` plus `CREATE INDEX IF NOT EXISTS`).

mod dialect;

pub use dialect::PostgresDialect;

use async_trait::async_trait;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, error, info};

use crate::config::{ConnectionOptions, DbKind};
use crate::core::traits::Backend;
use crate::drivers::common::assert_version_supported;
use crate::error::{DriverError, Result};

const MIN_SERVER_VERSION: &str = "9.5";

/// One exclusively-owned PostgreSQL client. The connection task runs in the
/// background and ends when the client drops.
pub struct PostgresBackend {
    client: Client,
}

impl PostgresBackend {
    /// Open the connection and gate on the server version.
    pub async fn connect(options: &ConnectionOptions) -> Result<Self> {
        let conn_string = connection_string(options);

        let (client, connection) = tokio_postgres::connect(&conn_string, NoTls)
            .await
            .map_err(|e| DriverError::config(format!("PostgreSQL connection failed: {}", e)))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("postgres connection task ended: {}", e);
            }
        });

        let backend = Self { client };

        let version = backend.server_version().await?;
        assert_version_supported("PostgreSQL", &version, MIN_SERVER_VERSION)?;

        info!(
            "connected to PostgreSQL server at {}:{}/{}",
            options.host,
            options.port(),
            options.dbname
        );
        Ok(backend)
    }
}

/// Build the tokio-postgres connection string, including the recognized
/// pass-through driver options.
fn connection_string(options: &ConnectionOptions) -> String {
    let mut parts = vec![
        format!("host={}", options.host),
        format!("port={}", options.port()),
        format!("dbname={}", options.dbname),
        format!("user={}", options.username),
        format!("client_encoding={}", options.charset()),
    ];
    if !options.password.is_empty() {
        parts.push(format!("password={}", options.password));
    }
    for key in ["application_name", "connect_timeout", "options"] {
        if let Some(value) = options.driver_option_str(key) {
            parts.push(format!("{}={}", key, value));
        } else if let Some(value) = options.driver_option_u64(key) {
            parts.push(format!("{}={}", key, value));
        }
    }
    parts.join(" ")
}

fn wrap_execution(sql: &str, err: tokio_postgres::Error) -> DriverError {
    let code = err.code().map(|state| state.code().to_string());
    DriverError::execution(sql, code, err.to_string())
}

#[async_trait]
impl Backend for PostgresBackend {
    fn kind(&self) -> DbKind {
        DbKind::Postgres
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        debug!("postgres execute: {}", sql);
        self.client
            .execute(sql, &[])
            .await
            .map_err(|e| wrap_execution(sql, e))
    }

    async fn execute_ddl(&self, sql: &str) -> Result<()> {
        debug!("postgres ddl: {}", sql);
        self.client
            .batch_execute(sql)
            .await
            .map_err(|e| wrap_execution(sql, e))
    }

    async fn query_column(&self, sql: &str) -> Result<Vec<String>> {
        debug!("postgres query: {}", sql);
        let rows = self
            .client
            .query(sql, &[])
            .await
            .map_err(|e| wrap_execution(sql, e))?;
        rows.into_iter()
            .map(|row| row.try_get::<_, String>(0).map_err(|e| wrap_execution(sql, e)))
            .collect()
    }

    async fn query_scalar(&self, sql: &str) -> Result<Option<i64>> {
        debug!("postgres query: {}", sql);
        let row = self
            .client
            .query_opt(sql, &[])
            .await
            .map_err(|e| wrap_execution(sql, e))?;
        match row {
            Some(row) => Ok(Some(
                row.try_get::<_, i64>(0).map_err(|e| wrap_execution(sql, e))?,
            )),
            None => Ok(None),
        }
    }

    async fn server_version(&self) -> Result<String> {
        let sql = "SHOW server_version";
        let row = self
            .client
            .query_one(sql, &[])
            .await
            .map_err(|e| wrap_execution(sql, e))?;
        row.try_get::<_, String>(0).map_err(|e| wrap_execution(sql, e))
    }

    async fn close(&self) -> Result<()> {
        // Dropping the client ends the background connection task; there is
        // no explicit shutdown handshake to run.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn options() -> ConnectionOptions {
        ConnectionOptions {
            connection: DbKind::Postgres,
            host: "localhost".to_string(),
            port: None,
            dbname: "app".to_string(),
            charset: None,
            username: "app".to_string(),
            password: "secret".to_string(),
            driver_options: BTreeMap::new(),
        }
    }

    #[test]
    fn test_connection_string_defaults() {
        assert_eq!(
            connection_string(&options()),
            "host=localhost port=5432 dbname=app user=app client_encoding=UTF8 password=secret"
        );
    }

    #[test]
    fn test_connection_string_passthrough_options() {
        let mut options = options();
        options.password.clear();
        options
            .driver_options
            .insert("application_name".to_string(), "cms".into());
        options
            .driver_options
            .insert("connect_timeout".to_string(), 10.into());
        options
            .driver_options
            .insert("unrelated".to_string(), "x".into());
        assert_eq!(
            connection_string(&options),
            "host=localhost port=5432 dbname=app user=app client_encoding=UTF8 application_name=cms connect_timeout=10"
        );
    }
}
